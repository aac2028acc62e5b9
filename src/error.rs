//! Structured error types for configuration resolution.

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

/// A single path-qualified problem found while resolving configuration.
///
/// Used for schema violations as well as per-source load failures, where the
/// path is the source key instead of a dotted configuration path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigIssue {
    pub path: String,
    pub message: String,
}

impl ConfigIssue {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "(root): {}", self.message)
        } else {
            write!(f, "{}: {}", self.path, self.message)
        }
    }
}

/// Errors raised by the configuration engine.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {origin}: {message}")]
    Parse { origin: String, message: String },

    #[error("unsupported configuration format for {0}")]
    UnsupportedFormat(PathBuf),

    #[error("request to {url} failed: {message}")]
    Http { url: String, message: String },

    #[error("required environment variable {0} is not set")]
    MissingRequired(String),

    #[error("configuration is invalid ({} issue(s))", .0.len())]
    Validation(Vec<ConfigIssue>),

    #[error("invalid configuration path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("configuration manager has been destroyed")]
    Destroyed,

    #[error("file watcher error: {0}")]
    Watch(String),
}

impl ConfigError {
    pub fn parse(origin: impl fmt::Display, err: impl fmt::Display) -> Self {
        Self::Parse {
            origin: origin.to_string(),
            message: err.to_string(),
        }
    }

    pub fn invalid_path(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// Validation issues carried by this error, if any.
    pub fn issues(&self) -> &[ConfigIssue] {
        match self {
            ConfigError::Validation(issues) => issues,
            _ => &[],
        }
    }
}

impl From<notify::Error> for ConfigError {
    fn from(err: notify::Error) -> Self {
        ConfigError::Watch(err.to_string())
    }
}

/// Result type for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_display() {
        let issue = ConfigIssue::new("contact.email", "expected an email address");
        assert_eq!(issue.to_string(), "contact.email: expected an email address");

        let root = ConfigIssue::new("", "expected an object");
        assert_eq!(root.to_string(), "(root): expected an object");
    }

    #[test]
    fn test_validation_error_exposes_issues() {
        let err = ConfigError::Validation(vec![
            ConfigIssue::new("a", "bad"),
            ConfigIssue::new("b", "worse"),
        ]);
        assert_eq!(err.issues().len(), 2);
        assert_eq!(err.to_string(), "configuration is invalid (2 issue(s))");
        assert!(ConfigError::Destroyed.issues().is_empty());
    }
}
