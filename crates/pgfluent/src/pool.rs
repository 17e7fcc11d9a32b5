//! Connection pool utilities

use crate::config::ConnectConfig;
use crate::db::Db;
use crate::error::{OrmError, OrmResult};
use crate::pg::PgConnection;
use deadpool_postgres::{Manager, ManagerConfig, Pool, PoolBuilder, RecyclingMethod};
use tokio_postgres::NoTls;

/// Create a `NoTls` connection pool sized by [`ConnectConfig::max_pool_size`].
///
/// # Example
///
/// ```ignore
/// let pool = pgfluent::create_pool(&ConnectConfig::from_env()?)?;
/// let db = Db::from_pool(&pool).await?;
/// ```
pub fn create_pool(config: &ConnectConfig) -> OrmResult<Pool> {
    let max_size = config.max_pool_size;
    create_pool_with_manager_config(config, default_manager_config(), |builder| {
        builder.max_size(max_size)
    })
}

/// Create a pool with an injected `ManagerConfig` and `PoolBuilder` tuning
/// (timeouts, recycling strategy, size).
pub fn create_pool_with_manager_config(
    config: &ConnectConfig,
    manager_config: ManagerConfig,
    configure_pool: impl FnOnce(PoolBuilder) -> PoolBuilder,
) -> OrmResult<Pool> {
    let pg_config = config.to_pg_config()?;
    let mgr = Manager::from_config(pg_config, NoTls, manager_config);
    configure_pool(Pool::builder(mgr))
        .build()
        .map_err(|e| OrmError::Pool(e.to_string()))
}

fn default_manager_config() -> ManagerConfig {
    ManagerConfig {
        recycling_method: RecyclingMethod::Fast,
    }
}

impl PgConnection {
    /// Check a connection out of `pool`. It returns to the pool when the last
    /// clone is dropped.
    pub async fn from_pool(pool: &Pool) -> OrmResult<Self> {
        let object = pool.get().await?;
        Ok(Self::from_pooled(object))
    }
}

impl Db<PgConnection> {
    pub async fn from_pool(pool: &Pool) -> OrmResult<Self> {
        PgConnection::from_pool(pool).await.map(Db::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_takes_size_from_config() {
        let config = ConnectConfig::new("postgres://localhost/app").max_pool_size(4);
        let pool = create_pool(&config).unwrap();
        assert_eq!(pool.status().max_size, 4);
    }

    #[test]
    fn malformed_url_fails_before_pooling() {
        let err = create_pool(&ConnectConfig::new("postgres://localhost:x/app")).unwrap_err();
        assert!(matches!(err, OrmError::Configuration(_)));
    }
}
