//! # SQLite Database methods
//!
//! This module contains "low-level" SQLite database interactions.
//!
//! All these interactions are simple functions (rather than stateful structs) that accept a `&mut SqliteConnection`
//! argument. Callers can obtain a connection from a pool, or open a transaction and pass `&mut *tx` without any other
//! changes.
//!
//! Dates are bound as `NaiveDate` and stored in ISO form. Date arithmetic happens in Rust, never in SQL.
use std::env;

use log::info;
use sqlx::{
    migrate::{MigrateDatabase, MigrateError, Migrator},
    sqlite::SqlitePoolOptions,
    Error as SqlxError,
    Sqlite,
    SqlitePool,
};

pub mod orders;
pub mod payments;
pub mod suppliers;

const SQLITE_DB_URL: &str = "sqlite://data/resale_ledger.db";

pub fn db_url() -> String {
    let result = env::var("RSL_DATABASE_URL").unwrap_or_else(|_| {
        info!("RSL_DATABASE_URL is not set. Using the default.");
        SQLITE_DB_URL.to_string()
    });
    info!("Using database URL: {result}");
    result
}

/// The ledger schema, embedded in the binary.
pub static MIGRATOR: Migrator = sqlx::migrate!("./src/sqlite/migrations");

pub async fn create_database_if_not_exist(url: &str) -> Result<bool, SqlxError> {
    if Sqlite::database_exists(url).await? {
        return Ok(false);
    }
    info!("Creating new database at: {url}");
    Sqlite::create_database(url).await?;
    Ok(true)
}

pub async fn run_migrations(pool: &SqlitePool) -> Result<(), MigrateError> {
    MIGRATOR.run(pool).await?;
    info!("Database migrations complete");
    Ok(())
}

pub async fn new_pool(url: &str, max_connections: u32) -> Result<SqlitePool, SqlxError> {
    let pool = SqlitePoolOptions::new().max_connections(max_connections).connect(url).await?;
    Ok(pool)
}
