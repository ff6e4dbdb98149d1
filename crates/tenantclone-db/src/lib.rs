//! # tenantclone-db
//!
//! PostgreSQL storage layer for the tenant clone engine.
//!
//! This crate provides:
//! - Connection pool management
//! - [`PgEntityStore`], the generic row adapter the engine clones through
//! - [`PgCloneAuditRepository`] for finished clone jobs
//! - [`InMemoryStore`] for exercising the engine without a database
//!
//! ## Example
//!
//! ```rust,ignore
//! use tenantclone_db::{Database, EntityStore, OrganizationId};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::connect("postgres://localhost/tenants").await?;
//!     let org = db.entities.get_organization(OrganizationId::new(uuid::Uuid::nil())).await?;
//!     println!("{:?}", org);
//!     Ok(())
//! }
//! ```
pub mod audit;
pub mod memory;
pub mod pool;
pub mod store;

// Note: Always compiled so integration tests (in tests/) can use DEFAULT_TEST_DATABASE_URL
pub mod test_fixtures;

// Re-export core types
pub use tenantclone_core::*;

pub use audit::PgCloneAuditRepository;
pub use memory::{InMemoryAuditRepository, InMemoryStore};
pub use pool::{create_pool, log_pool_metrics, PoolConfig};
pub use store::PgEntityStore;

/// Combined database context.
pub struct Database {
    /// The underlying connection pool.
    pub pool: sqlx::Pool<sqlx::Postgres>,
    /// Tenant row adapter used by the clone engine.
    pub entities: PgEntityStore,
    /// Finished clone job records.
    pub audit: PgCloneAuditRepository,
}

impl Database {
    /// Create a new Database instance from a connection pool.
    pub fn new(pool: sqlx::Pool<sqlx::Postgres>) -> Self {
        Self {
            entities: PgEntityStore::new(pool.clone()),
            audit: PgCloneAuditRepository::new(pool.clone()),
            pool,
        }
    }

    /// Create a new Database instance by connecting to the given URL.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = create_pool(url, &PoolConfig::default()).await?;
        Ok(Self::new(pool))
    }

    /// Create with custom pool configuration.
    pub async fn connect_with_config(url: &str, config: PoolConfig) -> Result<Self> {
        let pool = create_pool(url, &config).await?;
        Ok(Self::new(pool))
    }

    /// Run pending migrations.
    #[cfg(feature = "migrations")]
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &sqlx::Pool<sqlx::Postgres> {
        &self.pool
    }
}
