use std::sync::{Arc, PoisonError, RwLock};

use chrono::FixedOffset;
use log::*;
use resale_engine::{MaintenanceApi, MaintenanceJobState, NoticeApi, NoticeJobState, SqliteDatabase};
use tokio::task::JoinHandle;

use crate::{
    capabilities::{ServerBackup, ServerNotifier},
    config::ScheduleConfig,
    helpers::local_now,
};

/// The maintenance job's progress, published by the maintenance worker for the notice worker.
pub type SharedJobState = Arc<RwLock<MaintenanceJobState>>;

fn latest(progress: &RwLock<MaintenanceJobState>) -> MaintenanceJobState {
    *progress.read().unwrap_or_else(PoisonError::into_inner)
}

fn publish(progress: &RwLock<MaintenanceJobState>, state: MaintenanceJobState) {
    *progress.write().unwrap_or_else(PoisonError::into_inner) = state;
}

/// Starts the daily maintenance worker. Do not await the returned JoinHandle, as it will run indefinitely.
///
/// The worker wakes up every tick and runs the job once the local time passes the configured time of day. A failed run
/// is rolled back by the engine and tried again on the next tick.
pub fn start_maintenance_worker(
    db: SqliteDatabase,
    backup: ServerBackup,
    schedule: ScheduleConfig,
    offset: FixedOffset,
    progress: SharedJobState,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(schedule.tick);
        let api = MaintenanceApi::new(db, backup, schedule.maintenance_at);
        let mut state = latest(&progress);
        info!("🕰️ Daily maintenance worker started. The job runs at {} local time.", api.run_at());
        loop {
            timer.tick().await;
            let now = local_now(offset);
            match api.run_if_due(&mut state, now).await {
                Ok(Some(report)) => {
                    publish(&progress, state);
                    info!(
                        "🕰️ Daily maintenance complete. {} archived, {} to renewal, {} expired.",
                        report.archived.len(),
                        report.moved_to_renewal.len(),
                        report.expired.len()
                    );
                },
                Ok(None) => trace!("🕰️ Daily maintenance is not due"),
                Err(e) => error!("🕰️ Daily maintenance failed. It will be retried. {e}"),
            }
        }
    })
}

/// Starts the advance-notice worker. Do not await the returned JoinHandle, as it will run indefinitely.
///
/// Notices go out once a day, after that day's maintenance run has succeeded. Delivery failures are logged by the
/// engine and not retried.
pub fn start_notice_worker(
    db: SqliteDatabase,
    notifier: ServerNotifier,
    schedule: ScheduleConfig,
    offset: FixedOffset,
    progress: SharedJobState,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(schedule.tick);
        let api = NoticeApi::new(db, notifier);
        let run_at = schedule.notices_at;
        let mut state = NoticeJobState::default();
        let mut waiting = false;
        info!("📣️ Advance notice worker started. Notices go out at {run_at} local time.");
        loop {
            timer.tick().await;
            let now = local_now(offset);
            let maintenance = latest(&progress);
            if !state.is_due(now, run_at, &maintenance) {
                let blocked = state.is_waiting_for_maintenance(now, run_at, &maintenance);
                if blocked && !waiting {
                    warn!("📣️ Today's notices are waiting for the daily maintenance run to succeed");
                }
                waiting = blocked;
                continue;
            }
            waiting = false;
            let runs = api.send_all(now.date()).await;
            for run in &runs {
                debug!("📣️ {:?}: {} orders, delivered: {}", run.kind, run.selected, run.delivered);
            }
            state.record_sent(now.date());
        }
    })
}
