//! Connection pooling over the sqlx::Postgres driver.
//!
//! Tests run against an in-memory SQLite pool behind the same interface, so
//! the loader logic is exercised without a live Postgres server.

use anyhow::{Context, Result};
use derive_builder::Builder;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};

use crate::config::CONNECT_TIMEOUT;

/// Inner pool variants
#[derive(Debug, Clone)]
enum PoolInner {
    Postgres(sqlx::PgPool),
    #[cfg(test)]
    Sqlite(sqlx::SqlitePool),
}

/// Connection that can be either Postgres or SQLite
pub enum PoolConnection {
    Postgres(sqlx::pool::PoolConnection<sqlx::Postgres>),
    #[cfg(test)]
    Sqlite(sqlx::pool::PoolConnection<sqlx::Sqlite>),
}

// Wrap pool implementations behind one handle so the loader does not care
// which backend it talks to.
#[derive(Debug, Clone)]
pub struct Pool {
    inner: PoolInner,
}

#[derive(Builder)]
pub struct DbArgs {
    #[builder(setter(into))]
    username: String,
    #[builder(setter(into))]
    password: String,
    #[builder(setter(into), default = "\"localhost\".to_string()")]
    host: String,
    #[builder(default = "5432")]
    port: u16,
    #[builder(setter(into))]
    database: String,
    #[builder(default = "8")]
    max_connections: u32,
}

pub async fn pool(args: DbArgs) -> Result<Pool> {
    let DbArgs {
        username,
        password,
        host,
        port,
        database,
        max_connections,
    } = args;

    let connect_options = PgConnectOptions::new()
        .host(&host)
        .port(port)
        .username(&username)
        .password(&password)
        .database(&database);

    let pg_pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(CONNECT_TIMEOUT)
        .connect_with(connect_options)
        .await
        .with_context(|| format!("Failed to connect to postgres at {host}:{port}/{database}"))?;

    Ok(Pool {
        inner: PoolInner::Postgres(pg_pool),
    })
}

impl Pool {
    /// Create an in-memory SQLite pool for testing
    #[cfg(test)]
    pub async fn sqlite_in_memory() -> Result<Self, sqlx::Error> {
        let sqlite_pool = sqlx::sqlite::SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;

        Ok(Pool {
            inner: PoolInner::Sqlite(sqlite_pool),
        })
    }

    pub async fn acquire(&self) -> Result<PoolConnection, sqlx::Error> {
        match &self.inner {
            PoolInner::Postgres(pool) => Ok(PoolConnection::Postgres(pool.acquire().await?)),
            #[cfg(test)]
            PoolInner::Sqlite(pool) => Ok(PoolConnection::Sqlite(pool.acquire().await?)),
        }
    }

    /// Execute a statement (DDL and similar) - works for both Postgres and SQLite
    pub async fn execute(&self, sql: &str) -> Result<(), sqlx::Error> {
        match &self.inner {
            PoolInner::Postgres(pool) => {
                sqlx::query(sql).execute(pool).await?;
                Ok(())
            }
            #[cfg(test)]
            PoolInner::Sqlite(pool) => {
                sqlx::query(sql).execute(pool).await?;
                Ok(())
            }
        }
    }

}
