use std::path::{Path, PathBuf};

use chrono::Utc;
use log::*;
use sqlx::SqlitePool;

use crate::ledger_api::capabilities::{BackupError, BackupService};

/// Backs the ledger up with `VACUUM INTO`, writing a timestamped copy of the database into a directory.
#[derive(Clone, Debug)]
pub struct SqliteBackup {
    pool: SqlitePool,
    dir: PathBuf,
}

impl SqliteBackup {
    pub fn new<P: AsRef<Path>>(pool: SqlitePool, dir: P) -> Self {
        Self { pool, dir: dir.as_ref().to_path_buf() }
    }

    pub fn dir(&self) -> &Path {
        self.dir.as_path()
    }

    fn next_backup_path(&self) -> PathBuf {
        let stamp = Utc::now().format("%Y%m%d_%H%M%S%.3f");
        self.dir.join(format!("resale_ledger_{stamp}.db"))
    }
}

impl BackupService for SqliteBackup {
    async fn backup_now(&self) -> Result<(), BackupError> {
        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| BackupError::Destination(e.to_string()))?;
        let path = self.next_backup_path();
        let target = path.to_str().ok_or_else(|| BackupError::Destination(format!("{path:?} is not valid UTF-8")))?;
        sqlx::query("VACUUM INTO ?").bind(target).execute(&self.pool).await.map_err(|e| BackupError::Failed(e.to_string()))?;
        info!("🗃️ Database backed up to {target}");
        Ok(())
    }
}
