//! Request logging.
//!
//! Every request produces a start event and then a completion or failure
//! event. By default they go to `tracing`, so the output format (text,
//! JSON, ...) and destination are whatever the installed subscriber does,
//! e.g. `tracing_subscriber::fmt().json()`. Plug in a [`Logger`] to send
//! them somewhere else.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{error, info};

use crate::context::Context;

use super::Middleware;

/// Which point of the request a [`RequestLog`] describes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestEvent {
    Started,
    Completed,
    Failed,
}

/// One request event as handed to a [`Logger`].
#[derive(Clone, Debug)]
pub struct RequestLog {
    pub event: RequestEvent,
    pub method: String,
    pub path: String,
    /// Peer address, or `""` when the transport does not know it.
    pub remote: String,
    /// `None` for [`RequestEvent::Started`].
    pub status: Option<u16>,
    pub duration: Option<Duration>,
    /// The downstream error, for [`RequestEvent::Failed`].
    pub error: Option<String>,
}

/// A destination for request events.
pub trait Logger: Send + Sync {
    fn log(&self, record: &RequestLog);
}

/// The default [`Logger`]: `INFO` events for start and completion, `ERROR`
/// for failures.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn log(&self, r: &RequestLog) {
        let duration_ms = r.duration.map(|d| d.as_millis() as u64);
        match r.event {
            RequestEvent::Started => {
                info!(method = %r.method, path = %r.path, remote = %r.remote, "request started");
            }
            RequestEvent::Completed => {
                info!(method = %r.method, path = %r.path, status = r.status, duration_ms, "request completed");
            }
            RequestEvent::Failed => {
                error!(
                    method = %r.method,
                    path = %r.path,
                    status = r.status,
                    duration_ms,
                    error = r.error.as_deref().unwrap_or(""),
                    "request failed"
                );
            }
        }
    }
}

/// Knobs for [`logging_with`].
#[derive(Clone)]
pub struct LoggingOptions {
    /// Where events go. Defaults to [`TracingLogger`].
    pub logger: Arc<dyn Logger>,
}

impl Default for LoggingOptions {
    fn default() -> Self {
        Self { logger: Arc::new(TracingLogger) }
    }
}

impl fmt::Debug for LoggingOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoggingOptions").finish_non_exhaustive()
    }
}

/// [`logging_with`] using the default options.
pub fn logging() -> Middleware {
    logging_with(LoggingOptions::default())
}

/// Logs every request with method, path, remote address, status and latency.
///
/// Register it before [`error_handler`](super::error_handler) to see the raw
/// downstream error; after it, to see the translated status.
pub fn logging_with(options: LoggingOptions) -> Middleware {
    let logger = options.logger;
    Middleware::from_fn(move |ctx: Context, next| {
        let logger = Arc::clone(&logger);
        async move {
            let start = Instant::now();
            let mut record = RequestLog {
                event: RequestEvent::Started,
                method: ctx.method().to_string(),
                path: ctx.path().to_owned(),
                remote: ctx.remote_addr().map(|a| a.to_string()).unwrap_or_default(),
                status: None,
                duration: None,
                error: None,
            };
            logger.log(&record);

            let outcome = next.run(ctx.clone()).await;
            record.duration = Some(start.elapsed());

            match &outcome {
                Ok(response) => {
                    record.event = RequestEvent::Completed;
                    record.status = Some(
                        response.as_ref()
                            .map(|r| r.status())
                            .or_else(|| ctx.status_code())
                            .unwrap_or(200),
                    );
                }
                Err(e) => {
                    record.event = RequestEvent::Failed;
                    record.status = Some(e.http_status().map_or(500, |(code, _)| code));
                    record.error = Some(e.to_string());
                }
            }
            logger.log(&record);
            outcome
        }
    })
}
