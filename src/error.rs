//! Error types shared by the store, the API layer and the HTTP server.

use std::path::PathBuf;
use thiserror::Error;

/// Everything that can go wrong while serving a habit request.
#[derive(Error, Debug)]
pub enum Error {
    /// No session token, or a token that doesn't resolve to a user
    #[error("Unauthorized: sign in to continue")]
    Unauthorized,

    /// The targeted habit doesn't exist (or belongs to someone else)
    #[error("Habit {0} not found")]
    NotFound(String),

    /// Malformed or invalid input, rejected before touching the store
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Query error: {0}")]
    Query(#[from] diesel::result::Error),

    /// Couldn't build the connection pool or check a connection out of it
    #[error("Pool error: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),

    /// `.habitual/config.toml` exists but doesn't parse
    #[error("Invalid config {}: {source}", .path.display())]
    Config {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// `habitual init` couldn't set up the project folder
    #[error("{0}")]
    Init(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A stored timestamp that isn't valid RFC 3339
    #[error("Invalid timestamp '{value}': {source}")]
    Timestamp {
        value: String,
        #[source]
        source: chrono::ParseError,
    },
}

impl Error {
    /// HTTP status code the API server answers with for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Error::Unauthorized => 401,
            Error::NotFound(_) => 404,
            Error::Validation(_) | Error::Json(_) => 400,
            _ => 500,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(Error::Unauthorized.status_code(), 401);
        assert_eq!(Error::NotFound("abc".into()).status_code(), 404);
        assert_eq!(Error::Validation("empty".into()).status_code(), 400);
        assert_eq!(Error::Init("Could not create .habitual/".into()).status_code(), 500);
    }

    #[test]
    fn test_json_errors_are_client_errors() {
        let err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        assert_eq!(Error::from(err).status_code(), 400);
    }

    #[test]
    fn test_display_messages() {
        assert_eq!(Error::NotFound("h1".into()).to_string(), "Habit h1 not found");
        assert_eq!(
            Error::Validation("name must not be empty".into()).to_string(),
            "Validation error: name must not be empty"
        );
    }

    #[test]
    fn test_init_errors_have_no_io_prefix() {
        let err = Error::Init("Could not create database: disk full".into());
        assert_eq!(err.to_string(), "Could not create database: disk full");
    }

    #[test]
    fn test_config_error_names_the_file() {
        let source = toml::from_str::<toml::Value>("port = ").unwrap_err();
        let err = Error::Config {
            path: PathBuf::from(".habitual/config.toml"),
            source,
        };
        assert_eq!(err.status_code(), 500);
        assert!(err.to_string().starts_with("Invalid config .habitual/config.toml: "));
    }
}
