//! PostgreSQL pool setup for clone runs.
//!
//! Every row worker of a phase holds one connection while it writes, and the
//! orchestrator reads between phases, so the pool is sized from the worker
//! count rather than left at a fixed default.

use std::time::{Duration, Instant};

use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{debug, info, warn};

use tenantclone_core::defaults::{
    DB_CONNECT_TIMEOUT_SECS, DB_IDLE_TIMEOUT_SECS, DB_MAX_CONNECTIONS, DB_MAX_LIFETIME_SECS,
};
use tenantclone_core::{Error, Result};

/// Pool sizing and timeouts.
#[derive(Debug, Clone, PartialEq)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    /// How long a row worker waits for a free connection.
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
    pub max_lifetime: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: DB_MAX_CONNECTIONS,
            min_connections: 1,
            acquire_timeout: Duration::from_secs(DB_CONNECT_TIMEOUT_SECS),
            idle_timeout: Duration::from_secs(DB_IDLE_TIMEOUT_SECS),
            max_lifetime: Duration::from_secs(DB_MAX_LIFETIME_SECS),
        }
    }
}

impl PoolConfig {
    /// Read overrides from the environment.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `DB_MAX_CONNECTIONS` | `10` |
    /// | `DB_CONNECT_TIMEOUT_SECS` | `30` |
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(n) = std::env::var("DB_MAX_CONNECTIONS")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
        {
            config.max_connections = n.max(1);
        }
        if let Some(secs) = std::env::var("DB_CONNECT_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
        {
            config.acquire_timeout = Duration::from_secs(secs);
        }
        config
    }

    /// A pool of exactly one connection, so session state such as
    /// `search_path` applies to every query.
    pub fn single_connection() -> Self {
        Self {
            max_connections: 1,
            min_connections: 1,
            ..Self::default()
        }
    }

    /// Grow the pool to fit `workers` concurrent row writes plus one
    /// connection for phase reads. Never shrinks it.
    pub fn with_row_workers(mut self, workers: usize) -> Self {
        let needed = u32::try_from(workers).unwrap_or(u32::MAX).saturating_add(1);
        self.max_connections = self.max_connections.max(needed);
        self
    }

    fn options(&self) -> PgPoolOptions {
        PgPoolOptions::new()
            .max_connections(self.max_connections)
            .min_connections(self.min_connections.min(self.max_connections))
            .acquire_timeout(self.acquire_timeout)
            .idle_timeout(self.idle_timeout)
            .max_lifetime(self.max_lifetime)
    }
}

/// Connect a pool to `database_url`.
pub async fn create_pool(database_url: &str, config: &PoolConfig) -> Result<PgPool> {
    let start = Instant::now();
    let pool = config
        .options()
        .connect(database_url)
        .await
        .map_err(Error::Database)?;

    info!(
        subsystem = "db",
        component = "pool",
        op = "connect",
        max_connections = config.max_connections,
        acquire_timeout_secs = config.acquire_timeout.as_secs(),
        pool_size = pool.size(),
        duration_ms = start.elapsed().as_millis() as u64,
        "Database pool connected"
    );
    Ok(pool)
}

/// Log connection usage after a clone run.
pub fn log_pool_metrics(pool: &PgPool) {
    let size = pool.size();
    let idle = pool.num_idle() as u32;
    let in_use = size.saturating_sub(idle);

    debug!(
        subsystem = "db",
        component = "pool",
        op = "metrics",
        pool_size = size,
        pool_idle = idle,
        pool_in_use = in_use,
        "Pool usage"
    );

    if in_use > 0 {
        warn!(
            subsystem = "db",
            component = "pool",
            pool_in_use = in_use,
            "Connections still checked out after the clone run finished"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PoolConfig::default();
        assert_eq!(config.max_connections, 10);
        assert_eq!(config.acquire_timeout, Duration::from_secs(30));
        assert_eq!(config.max_lifetime, Duration::from_secs(1800));
    }

    #[test]
    fn test_row_workers_grow_the_pool() {
        assert_eq!(PoolConfig::default().with_row_workers(16).max_connections, 17);
        assert_eq!(PoolConfig::default().with_row_workers(4).max_connections, 10);
        assert_eq!(
            PoolConfig::single_connection().with_row_workers(1).max_connections,
            2
        );
    }

    #[test]
    fn test_single_connection() {
        let config = PoolConfig::single_connection();
        assert_eq!(config.max_connections, 1);
        assert_eq!(config.min_connections, 1);
        assert_eq!(config.acquire_timeout, PoolConfig::default().acquire_timeout);
    }
}
