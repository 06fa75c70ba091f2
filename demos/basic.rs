//! A small user API showing routes, middleware and route-scoped services.
//!
//! Run with:
//!   RUST_LOG=info cargo run --example basic
//!
//! Try:
//!   curl http://localhost:8080/users/1
//!   curl -H 'Authorization: token123' http://localhost:8080/protected/2
//!   curl -X POST http://localhost:8080/users \
//!        -H 'content-type: application/json' \
//!        -d '{"name":"dana","email":"dana@example.com"}'
//!   curl -i http://localhost:8080/cookie
//!   curl http://localhost:8080/error

use std::collections::{HashMap, HashSet};

use lumora::middleware::{CorsOptions, cors, error_handler, logging, use_service, use_services};
use lumora::{App, Context, Cookie, Error, Response, service};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing_subscriber::EnvFilter;

struct UserService {
    users: HashMap<String, String>,
}

impl UserService {
    fn new() -> Self {
        let users = [("1", "Alice"), ("2", "Bob"), ("3", "Charlie")]
            .map(|(id, name)| (id.to_owned(), name.to_owned()));
        Self { users: users.into() }
    }

    fn get_user(&self, id: &str) -> Option<&str> {
        self.users.get(id).map(String::as_str)
    }
}

struct AuthService {
    tokens: HashSet<String>,
}

impl AuthService {
    fn new() -> Self {
        Self { tokens: ["token123", "token456"].map(String::from).into() }
    }

    fn validate_token(&self, token: &str) -> bool {
        self.tokens.contains(token)
    }
}

#[derive(Deserialize, Serialize)]
struct NewUser {
    name: String,
    email: String,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let app = App::new()
        .middleware(cors(CorsOptions::default()))
        .middleware(logging())
        .middleware(error_handler())
        .get("/", index, &[])
        .get("/users/:id", get_user, &[use_service("userService", UserService::new())])
        .get(
            "/protected/:id",
            get_protected,
            // The route's authService shadows the app-level one.
            &[use_services([
                ("userService", service(UserService::new())),
                ("authService", service(AuthService::new())),
            ])],
        )
        .post("/users", create_user, &[use_service("userService", UserService::new())])
        .get("/text", text, &[])
        .get("/cookie", cookie, &[])
        .get("/error", fail, &[]);

    app.services().register("authService", AuthService::new());

    app.start("0.0.0.0:8080").await
}

async fn index(_ctx: Context) -> Response {
    Response::new().with_body(json!({ "message": "Hello, World!", "version": "1.0.0" }))
}

async fn get_user(ctx: Context) -> Response {
    let users = ctx.must_service_as::<UserService>("userService");
    let id = ctx.param("id");
    match users.get_user(id) {
        Some(name) => Response::new().with_body(json!({ "id": id, "name": name })),
        None => Response::error(404, "User not found"),
    }
}

async fn get_protected(ctx: Context) -> Response {
    let users = ctx.must_service_as::<UserService>("userService");
    let auth = ctx.must_service_as::<AuthService>("authService");

    if !auth.validate_token(ctx.header("authorization")) {
        return Response::error(401, "Unauthorized");
    }

    let id = ctx.param("id");
    match users.get_user(id) {
        Some(name) => Response::new().with_body(json!({ "id": id, "name": name, "auth": "validated" })),
        None => Response::error(404, "User not found"),
    }
}

async fn create_user(ctx: Context) -> Response {
    let Ok(user) = ctx.bind_json::<NewUser>() else {
        return Response::error(400, "Invalid JSON");
    };
    Response::new()
        .with_status(201)
        .with_body(json!({ "message": "User created", "user": user }))
}

async fn text(_ctx: Context) -> Response {
    Response::new()
        .with_header("Content-Type", "text/plain")
        .with_body("This is a plain text response")
}

async fn cookie(_ctx: Context) -> Response {
    Response::new()
        .with_cookie(Cookie::new("session", "abc123").path("/").http_only(true).max_age(3600))
        .with_body(json!({ "message": "Cookie set" }))
}

async fn fail(_ctx: Context) -> Result<Response, Error> {
    Err(Error::new(500, "This is an error example"))
}
