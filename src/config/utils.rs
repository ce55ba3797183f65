//! Configuration validation helpers.

use crate::config::ServiceConfig;
use crate::error::CoreError;

/// Validate a loaded configuration, catching obviously broken settings
/// before the server or worker binaries start accepting traffic.
pub fn validate_config(config: &ServiceConfig) -> Result<(), CoreError> {
    if config.database_url.is_empty() {
        return Err(CoreError::Validation {
            field: "database_url",
            reason: "DATABASE_URL must not be empty".to_string(),
        });
    }

    if config.redis_url.is_empty() {
        return Err(CoreError::Validation {
            field: "redis_url",
            reason: "REDIS_URL must not be empty".to_string(),
        });
    }

    if config.workflow_address.is_empty() {
        return Err(CoreError::Validation {
            field: "workflow_address",
            reason: "WORKFLOW_ADDRESS must not be empty".to_string(),
        });
    }

    if config.http_bind_addr.parse::<std::net::SocketAddr>().is_err() {
        return Err(CoreError::Validation {
            field: "http_bind_addr",
            reason: format!("'{}' is not a valid socket address", config.http_bind_addr),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_config_valid() {
        let config = ServiceConfig::local();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validate_config_empty_database_url() {
        let mut config = ServiceConfig::local();
        config.database_url = String::new();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_config_bad_bind_addr() {
        let config = ServiceConfig::local().with_http_bind_addr("not-an-address");
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_with_workflow_task_queue() {
        let config = ServiceConfig::local().with_workflow_task_queue("custom-queue");
        assert_eq!(config.workflow_task_queue, "custom-queue");
    }
}
