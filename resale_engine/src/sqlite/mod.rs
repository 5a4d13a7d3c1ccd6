//! SQLite backend for the reseller ledger.
mod backup;
mod sqlite_impl;

pub mod db;
pub use backup::SqliteBackup;
pub use sqlite_impl::SqliteDatabase;
