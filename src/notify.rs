//! Periodic scan for overdue and upcoming tasks.
//!
//! Read-only: the scan only ever calls [`Store::all_non_completed_tasks`] and
//! reports through the log.

use crate::storage::GraphStore;
use crate::store::Store;
use crate::types::{Task, TaskId};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::time::{MissedTickBehavior, interval};

/// Default time between scans.
pub const DEFAULT_NOTIFY_INTERVAL: std::time::Duration = std::time::Duration::from_secs(60);

/// Default look-ahead for upcoming tasks.
pub const DEFAULT_UPCOMING_HOURS: i64 = 24;

/// Outcome of one scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotificationReport {
    pub overdue: Vec<TaskId>,
    pub upcoming: Vec<TaskId>,
}

/// Classify tasks as overdue or upcoming and log each one.
///
/// A task that is overdue is never also reported as upcoming.
pub fn scan(tasks: &[Task], now: DateTime<Utc>, window: Duration) -> NotificationReport {
    let mut report = NotificationReport::default();

    for task in tasks {
        if task.is_overdue(now) {
            log::warn!(
                "Task overdue: id={}, title={}, due={}",
                task.id,
                task.title,
                fmt_due(task)
            );
            report.overdue.push(task.id);
        } else if task.is_upcoming(now, window) {
            log::info!(
                "Task upcoming: id={}, title={}, due={}",
                task.id,
                task.title,
                fmt_due(task)
            );
            report.upcoming.push(task.id);
        }
    }

    report
}

fn fmt_due(task: &Task) -> String {
    task.due_at.map(|d| d.to_rfc3339()).unwrap_or_default()
}

/// Scan the store once.
pub fn scan_store<S: GraphStore>(store: &Store<S>, window: Duration) -> crate::Result<NotificationReport> {
    let tasks = store.all_non_completed_tasks()?;
    Ok(scan(&tasks, Utc::now(), window))
}

/// Run the scan on a fixed interval until `shutdown` is set.
///
/// The first scan runs immediately. Store reads happen on the blocking pool.
/// A zero interval disables the notifier.
pub async fn run_notifier<S>(
    store: Arc<Store<S>>,
    every: std::time::Duration,
    window: Duration,
    shutdown: Arc<AtomicBool>,
) where
    S: GraphStore + Send + Sync + 'static,
{
    if every.is_zero() {
        log::warn!("Notification scan interval is zero; notifier disabled");
        return;
    }

    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        if shutdown.load(Ordering::Relaxed) {
            break;
        }

        log::info!("Running scheduled scan for upcoming/overdue tasks");
        let store = Arc::clone(&store);
        match tokio::task::spawn_blocking(move || scan_store(&store, window)).await {
            Ok(Ok(report)) => log::debug!(
                "Scan found {} overdue and {} upcoming task(s)",
                report.overdue.len(),
                report.upcoming.len()
            ),
            Ok(Err(e)) => log::error!("Notification scan failed: {}", e),
            Err(e) => log::error!("Notification scan panicked: {}", e),
        }
    }

    log::info!("Notifier stopped");
}
