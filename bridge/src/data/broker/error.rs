//! Broker sink error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BrokerError {
    #[error("Broker configuration error: {0}")]
    Config(String),

    #[error("Broker connection error: {0}")]
    Connection(String),

    #[error("Publish failed: {0}")]
    Publish(String),

    #[error("Flush failed: {0}")]
    Flush(String),

    #[error("Redis error: {0}")]
    Redis(#[from] deadpool_redis::redis::RedisError),

    #[error("Redis pool error: {0}")]
    Pool(#[from] deadpool_redis::PoolError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_error_display() {
        let err = BrokerError::Publish("topic is empty".to_string());
        assert_eq!(err.to_string(), "Publish failed: topic is empty");
    }

    #[test]
    fn test_flush_error_display() {
        let err = BrokerError::Flush("timed out".to_string());
        assert_eq!(err.to_string(), "Flush failed: timed out");
    }

    #[test]
    fn test_config_error_display() {
        let err = BrokerError::Config("url required".to_string());
        assert_eq!(err.to_string(), "Broker configuration error: url required");
    }
}
