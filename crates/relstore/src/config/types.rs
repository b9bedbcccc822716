//! Configuration type definitions.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Where to connect.
    pub connector: ConnectorConfig,

    /// Login credentials. Required, though both fields may be empty strings.
    #[serde(default)]
    pub credentials: Option<Credentials>,

    /// Connection pool tuning.
    #[serde(default)]
    pub pool: PoolConfig,

    /// Rows buffered per round trip for scans that do not set their own.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fetch_size: Option<usize>,
}

impl StoreConfig {
    /// Effective default fetch size.
    pub fn get_fetch_size(&self) -> usize {
        self.fetch_size.unwrap_or(100)
    }
}

/// Connector endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectorConfig {
    /// Driver URL, e.g. `postgres://db.internal:5432/app` or `memory://`.
    #[serde(default)]
    pub url: Option<String>,
}

/// Login credentials.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct Credentials {
    /// Username.
    #[serde(default)]
    pub user: Option<String>,

    /// Password.
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
}

impl Credentials {
    /// Credentials with both fields present.
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: Some(user.into()),
            password: Some(password.into()),
        }
    }

    /// Username, empty if unset.
    pub fn user(&self) -> &str {
        self.user.as_deref().unwrap_or_default()
    }

    /// Password, empty if unset.
    pub fn password(&self) -> &str {
        self.password.as_deref().unwrap_or_default()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Connection pool tuning.
///
/// Every field is optional; the `get_*` accessors return the effective value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Maximum number of pooled connections.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_size: Option<usize>,

    /// Seconds to wait for a connection before failing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_timeout_secs: Option<u64>,

    /// Seconds a connection may sit unused before it is discarded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idle_timeout_secs: Option<u64>,

    /// Seconds after which a connection is retired regardless of use.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_lifetime_secs: Option<u64>,

    /// Whether each statement commits on its own (default: true).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_commit: Option<bool>,

    /// Query run to validate a connection before reuse.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_query: Option<String>,

    /// Pool name used in logs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl PoolConfig {
    pub fn get_max_size(&self) -> usize {
        self.max_size.unwrap_or(10)
    }

    pub fn get_connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_secs.unwrap_or(30))
    }

    pub fn get_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs.unwrap_or(600))
    }

    pub fn get_max_lifetime(&self) -> Duration {
        Duration::from_secs(self.max_lifetime_secs.unwrap_or(1800))
    }

    pub fn get_auto_commit(&self) -> bool {
        self.auto_commit.unwrap_or(true)
    }

    pub fn get_name(&self) -> &str {
        self.name.as_deref().unwrap_or("relstore")
    }
}
