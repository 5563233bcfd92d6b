//! Postgres access for the bracket store.
//!
//! The pool backs [`crate::store::PgBracketStore`]; the schema it expects lives
//! in `migrations/0001_bracket_engine.sql`.

use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;

pub mod config;
pub mod timeouts;

pub use config::DatabaseConfig;

/// Bracket engine schema
pub const SCHEMA: &str = include_str!("../../migrations/0001_bracket_engine.sql");

/// Shared Postgres pool for the bracket store
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Connect using the pool limits from `config`
    ///
    /// ```no_run
    /// use bracket_engine::db::{Database, DatabaseConfig};
    ///
    /// # async fn connect() -> Result<(), sqlx::Error> {
    /// let db = Database::new(&DatabaseConfig::development()).await?;
    /// db.apply_schema().await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn new(config: &DatabaseConfig) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connection_timeout_secs))
            .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
            .max_lifetime(Duration::from_secs(config.max_lifetime_secs))
            .connect(&config.database_url)
            .await?;

        Ok(Self { pool })
    }

    /// Create the tournament, battle and question tables if they are missing
    pub async fn apply_schema(&self) -> Result<(), sqlx::Error> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Round-trip a trivial query; used by the server's `/health`
    pub async fn health_check(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(&self.pool).await.map(|_| ())
    }

    /// Wait for checked-out connections to return, then close the pool
    pub async fn close(self) {
        self.pool.close().await;
    }
}
