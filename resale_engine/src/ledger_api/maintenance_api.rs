use std::fmt::Debug;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use log::*;

use crate::{
    ledger_api::{capabilities::BackupService, errors::LedgerApiError},
    traits::{MaintenanceReport, ReconciliationDatabase},
};

/// When the daily job last completed. Owned by whoever schedules the job, so the job itself keeps no state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaintenanceJobState {
    pub last_success: Option<NaiveDate>,
}

impl MaintenanceJobState {
    /// The job is due once the local time passes `run_at`, unless it has already succeeded today.
    pub fn is_due(&self, now: NaiveDateTime, run_at: NaiveTime) -> bool {
        now.time() >= run_at && self.last_success.map(|d| d < now.date()).unwrap_or(true)
    }

    pub fn record_success(&mut self, day: NaiveDate) {
        self.last_success = Some(day);
    }
}

/// Runs the daily maintenance sweep, followed by a best-effort backup.
pub struct MaintenanceApi<B, K> {
    db: B,
    backup: K,
    run_at: NaiveTime,
}

impl<B, K> Debug for MaintenanceApi<B, K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MaintenanceApi (runs at {})", self.run_at)
    }
}

impl<B, K> MaintenanceApi<B, K> {
    pub fn new(db: B, backup: K, run_at: NaiveTime) -> Self {
        Self { db, backup, run_at }
    }

    pub fn run_at(&self) -> NaiveTime {
        self.run_at
    }
}

impl<B, K> MaintenanceApi<B, K>
where
    B: ReconciliationDatabase,
    K: BackupService,
{
    /// Runs the sweep for `today`. A failed sweep has been rolled back in full and is returned as an error. A failed
    /// backup is only logged.
    pub async fn run(&self, today: NaiveDate) -> Result<MaintenanceReport, LedgerApiError> {
        let report = self.db.run_daily_maintenance(today).await.map_err(|e| {
            error!("🕰️ Daily maintenance for {today} failed and was rolled back. {e}");
            LedgerApiError::from(e)
        })?;
        info!(
            "🕰️ Daily maintenance for {today}: {} archived, {} moved to renewal, {} expired",
            report.archived.len(),
            report.moved_to_renewal.len(),
            report.expired.len()
        );
        debug!("🕰️ Archived: {:?}", report.archived);
        if let Err(e) = self.backup.backup_now().await {
            warn!("🕰️ Post-maintenance backup failed. The maintenance run itself succeeded. {e}");
        }
        Ok(report)
    }

    /// Runs the sweep if it is due, and records the success in `state`.
    pub async fn run_if_due(
        &self,
        state: &mut MaintenanceJobState,
        now: NaiveDateTime,
    ) -> Result<Option<MaintenanceReport>, LedgerApiError> {
        if !state.is_due(now, self.run_at) {
            return Ok(None);
        }
        let report = self.run(now.date()).await?;
        state.record_success(now.date());
        Ok(Some(report))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn at(day: u32, h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, day).unwrap().and_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn job_runs_once_per_day_after_its_time() {
        let run_at = NaiveTime::from_hms_opt(0, 5, 0).unwrap();
        let mut state = MaintenanceJobState::default();
        assert!(!state.is_due(at(5, 0, 4), run_at));
        assert!(state.is_due(at(5, 0, 5), run_at));
        state.record_success(at(5, 0, 5).date());
        assert!(!state.is_due(at(5, 23, 0), run_at));
        assert!(!state.is_due(at(6, 0, 1), run_at));
        assert!(state.is_due(at(6, 9, 0), run_at));
    }

    #[test]
    fn missed_days_are_caught_up() {
        let run_at = NaiveTime::from_hms_opt(0, 5, 0).unwrap();
        let state = MaintenanceJobState { last_success: Some(NaiveDate::from_ymd_opt(2025, 3, 1).unwrap()) };
        assert!(state.is_due(at(5, 12, 0), run_at));
    }
}
