//! Connection configuration.

use crate::error::{OrmError, OrmResult};
use std::time::Duration;

/// Environment variable read by [`ConnectConfig::from_env`].
pub const DATABASE_URL_ENV: &str = "DATABASE_URL";

/// Settings for [`crate::Db::connect_with`] and, with the `pool` feature,
/// [`crate::create_pool`].
#[derive(Debug, Clone)]
pub struct ConnectConfig {
    /// `postgres://` URL or key-value connection string.
    pub database_url: String,
    /// Reported to the server as `application_name`.
    pub application_name: Option<String>,
    pub connect_timeout: Option<Duration>,
    /// Upper bound on pooled connections.
    pub max_pool_size: usize,
}

impl ConnectConfig {
    pub const DEFAULT_MAX_POOL_SIZE: usize = 16;

    /// Create a configuration with defaults.
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            application_name: None,
            connect_timeout: None,
            max_pool_size: Self::DEFAULT_MAX_POOL_SIZE,
        }
    }

    /// Read the URL from `DATABASE_URL`.
    pub fn from_env() -> OrmResult<Self> {
        std::env::var(DATABASE_URL_ENV)
            .map(Self::new)
            .map_err(|e| OrmError::configuration(format!("{DATABASE_URL_ENV}: {e}")))
    }

    pub fn application_name(mut self, name: impl Into<String>) -> Self {
        self.application_name = Some(name.into());
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    pub fn max_pool_size(mut self, size: usize) -> Self {
        self.max_pool_size = size;
        self
    }

    /// Parse into a driver configuration with the overrides applied.
    ///
    /// A malformed URL is a [`OrmError::Configuration`] error.
    pub fn to_pg_config(&self) -> OrmResult<tokio_postgres::Config> {
        let mut config: tokio_postgres::Config = self.database_url.parse().map_err(
            |e: tokio_postgres::Error| {
                OrmError::configuration(format!("invalid database url: {e}"))
            },
        )?;
        if let Some(name) = &self.application_name {
            config.application_name(name);
        }
        if let Some(timeout) = self.connect_timeout {
            config.connect_timeout(timeout);
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_apply_to_driver_config() {
        let config = ConnectConfig::new("postgres://app@localhost:5433/orders")
            .application_name("billing")
            .connect_timeout(Duration::from_secs(3))
            .to_pg_config()
            .unwrap();
        assert_eq!(config.get_application_name(), Some("billing"));
        assert_eq!(config.get_connect_timeout(), Some(&Duration::from_secs(3)));
        assert_eq!(config.get_dbname(), Some("orders"));
        assert_eq!(config.get_ports(), &[5433]);
    }

    #[test]
    fn malformed_url_is_configuration_error() {
        let err = ConnectConfig::new("postgres://localhost:notaport/db")
            .to_pg_config()
            .unwrap_err();
        assert!(matches!(err, OrmError::Configuration(_)));
    }

    #[test]
    fn defaults() {
        let config = ConnectConfig::new("postgres://localhost/db");
        assert_eq!(config.max_pool_size, 16);
        assert!(config.application_name.is_none());
    }
}
