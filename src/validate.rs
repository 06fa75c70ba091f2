//! Schema validation for decoded request data.
//!
//! Decoding is serde's job; this trait adds the field-level rules serde
//! cannot express. The body and header middleware call it after a
//! successful decode and turn any issues into a `400`.

use std::fmt;

/// One failed rule on one field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Issue {
    pub field: String,
    pub message: String,
}

impl Issue {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self { field: field.into(), message: message.into() }
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.field.is_empty() {
            f.write_str(&self.message)
        } else {
            write!(f, "{}: {}", self.field, self.message)
        }
    }
}

/// Field-level rules for a decoded value.
///
/// The default accepts everything, so a plain `impl Validate for T {}` opts
/// a type into the middleware with decode-only checking.
///
/// ```rust
/// use lumora::{Issue, Validate};
///
/// #[derive(serde::Deserialize)]
/// struct CreateUser { name: String }
///
/// impl Validate for CreateUser {
///     fn validate(&self) -> Result<(), Vec<Issue>> {
///         if self.name.len() < 3 {
///             return Err(vec![Issue::new("name", "must be at least 3 characters")]);
///         }
///         Ok(())
///     }
/// }
/// ```
pub trait Validate {
    fn validate(&self) -> Result<(), Vec<Issue>> {
        Ok(())
    }
}

/// Collects issues across several checks so a type can report them all at once.
#[derive(Debug, Default)]
pub struct Issues(Vec<Issue>);

impl Issues {
    pub fn new() -> Self { Self::default() }

    /// Records an issue for `field` unless `ok` holds.
    pub fn check(&mut self, ok: bool, field: &str, message: &str) -> &mut Self {
        if !ok {
            self.0.push(Issue::new(field, message));
        }
        self
    }

    pub fn finish(self) -> Result<(), Vec<Issue>> {
        if self.0.is_empty() { Ok(()) } else { Err(self.0) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issues_collects_only_failures() {
        let mut issues = Issues::new();
        issues
            .check(true, "name", "is required")
            .check(false, "email", "must contain @")
            .check(false, "age", "must be positive");
        let err = issues.finish().unwrap_err();
        assert_eq!(err, vec![Issue::new("email", "must contain @"), Issue::new("age", "must be positive")]);
    }

    #[test]
    fn fieldless_issue_prints_message_only() {
        assert_eq!(Issue::new("", "body must be an object").to_string(), "body must be an object");
        assert_eq!(Issue::new("x", "bad").to_string(), "x: bad");
    }
}
