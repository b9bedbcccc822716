//! Configuration validation.

use super::StoreConfig;
use crate::error::{Result, StoreError};

/// Validate the configuration.
pub fn validate(config: &StoreConfig) -> Result<()> {
    match config.connector.url.as_deref() {
        None => return Err(StoreError::config("connector.url is required")),
        Some(url) if url.trim().is_empty() => {
            return Err(StoreError::config("connector.url is required"))
        }
        Some(url) if !url.contains("://") => {
            return Err(StoreError::config(format!(
                "connector.url must be a driver URL (scheme://...), got '{}'",
                url
            )))
        }
        Some(_) => {}
    }

    validate_credentials(config)?;

    if let Some(0) = config.pool.max_size {
        return Err(StoreError::config("pool.max_size must be at least 1"));
    }
    if let Some(0) = config.pool.connection_timeout_secs {
        return Err(StoreError::config(
            "pool.connection_timeout_secs must be at least 1",
        ));
    }
    if let Some(q) = &config.pool.validation_query {
        if q.trim().is_empty() {
            return Err(StoreError::config(
                "pool.validation_query cannot be empty when set",
            ));
        }
    }
    if let Some(0) = config.fetch_size {
        return Err(StoreError::config("fetch_size must be at least 1"));
    }

    Ok(())
}

/// Credentials must be present; empty strings are allowed.
pub fn validate_credentials(config: &StoreConfig) -> Result<()> {
    let creds = config
        .credentials
        .as_ref()
        .ok_or_else(|| StoreError::config("credentials are required"))?;
    if creds.user.is_none() {
        return Err(StoreError::config("credentials.user is required"));
    }
    if creds.password.is_none() {
        return Err(StoreError::config("credentials.password is required"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConnectorConfig, Credentials, PoolConfig};

    fn valid_config() -> StoreConfig {
        StoreConfig {
            connector: ConnectorConfig {
                url: Some("postgres://localhost:5432/app".to_string()),
            },
            credentials: Some(Credentials::new("app", "password")),
            pool: PoolConfig::default(),
            fetch_size: None,
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(validate(&valid_config()).is_ok());
    }

    #[test]
    fn test_missing_url() {
        let mut config = valid_config();
        config.connector.url = None;
        assert!(validate(&config).is_err());

        config.connector.url = Some("  ".to_string());
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_url_without_scheme() {
        let mut config = valid_config();
        config.connector.url = Some("localhost:5432".to_string());
        let err = validate(&config).unwrap_err().to_string();
        assert!(err.contains("scheme"));
    }

    #[test]
    fn test_credentials_required_but_may_be_empty() {
        let mut config = valid_config();
        config.credentials = None;
        assert!(validate(&config).is_err());

        config.credentials = Some(Credentials {
            user: Some(String::new()),
            password: None,
        });
        assert!(validate(&config).is_err());

        config.credentials = Some(Credentials::new("", ""));
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_zero_pool_size() {
        let mut config = valid_config();
        config.pool.max_size = Some(0);
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_credentials_debug_redacts_password() {
        let creds = Credentials::new("app", "super_secret_password_123");
        let debug_output = format!("{:?}", creds);
        assert!(
            debug_output.contains("[REDACTED]"),
            "Debug output should contain [REDACTED]"
        );
        assert!(
            !debug_output.contains("super_secret_password_123"),
            "Debug output should not contain actual password value"
        );
    }
}
