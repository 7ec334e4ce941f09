//! Stream source error types

use thiserror::Error;

/// Message fragments that mark an error as a cursor problem.
///
/// The hosted stream service only reports these as text, so classification
/// matches on the exact phrases it emits. `nogroup` is the Redis equivalent:
/// the consumer group behind the cursor no longer exists.
const CURSOR_ERROR_MARKERS: &[&str] = &["outside retention period", "invalid cursor", "nogroup"];

#[derive(Error, Debug)]
pub enum StreamError {
    #[error("Stream configuration error: {0}")]
    Config(String),

    #[error("Stream connection error: {0}")]
    Connection(String),

    #[error("Cursor error: {0}")]
    Cursor(String),

    #[error("Stream read failed: {0}")]
    Read(String),

    #[error("Redis error: {0}")]
    Redis(#[from] deadpool_redis::redis::RedisError),

    #[error("Redis pool error: {0}")]
    Pool(#[from] deadpool_redis::PoolError),
}

impl StreamError {
    /// Whether the error means the cursor expired or became invalid.
    ///
    /// The structured `Cursor` variant always counts; other variants are
    /// classified by their message text.
    pub fn is_cursor_error(&self) -> bool {
        if matches!(self, StreamError::Cursor(_)) {
            return true;
        }
        let text = self.to_string().to_lowercase();
        CURSOR_ERROR_MARKERS
            .iter()
            .any(|marker| text.contains(marker))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cursor_variant_is_cursor_error() {
        let err = StreamError::Cursor("expired".to_string());
        assert!(err.is_cursor_error());
        assert_eq!(err.to_string(), "Cursor error: expired");
    }

    #[test]
    fn test_retention_message_is_cursor_error() {
        let err = StreamError::Read("The cursor is OUTSIDE RETENTION PERIOD".to_string());
        assert!(err.is_cursor_error());
    }

    #[test]
    fn test_invalid_cursor_message_is_cursor_error() {
        let err = StreamError::Read("400: Invalid cursor supplied".to_string());
        assert!(err.is_cursor_error());
    }

    #[test]
    fn test_nogroup_message_is_cursor_error() {
        let err = StreamError::Read("NOGROUP No such key or consumer group".to_string());
        assert!(err.is_cursor_error());
    }

    #[test]
    fn test_other_errors_are_not_cursor_errors() {
        assert!(!StreamError::Read("connection reset by peer".to_string()).is_cursor_error());
        assert!(!StreamError::Connection("timeout".to_string()).is_cursor_error());
        assert!(!StreamError::Config("missing url".to_string()).is_cursor_error());
    }

    #[test]
    fn test_config_error_display() {
        let err = StreamError::Config("stream name required".to_string());
        assert_eq!(
            err.to_string(),
            "Stream configuration error: stream name required"
        );
    }
}
