//! Freshness and concurrency policy around the aggregator.
//!
//! Manual and timer-driven refreshes share one guarded path: if an
//! aggregation is already in flight the new request is dropped, not queued.
//! The auto-refresh loop only listens for cancellation while it sleeps, so a
//! tick that already started always runs to completion.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::aggregator::{AggregateResult, ScheduleAggregator};
use crate::dates::DateRange;
use crate::error::CoreError;
use crate::models::Priority;

/// Parameters of the aggregation a view keeps fresh
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateQuery {
    pub user_id: String,
    pub range: DateRange,
    pub priority_filter: Option<Priority>,
}

impl AggregateQuery {
    pub fn new(user_id: &str, range: DateRange) -> Self {
        Self {
            user_id: user_id.to_string(),
            range,
            priority_filter: None,
        }
    }

    pub fn with_priority(mut self, priority: Option<Priority>) -> Self {
        self.priority_filter = priority;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RefreshState {
    pub auto_refresh_enabled: bool,
    pub last_refresh_at: Option<DateTime<Utc>>,
    pub is_refreshing: bool,
}

/// Latest published aggregation
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScheduleSnapshot {
    pub result: AggregateResult,
    /// None until the first successful refresh
    pub refreshed_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
pub enum RefreshOutcome {
    /// Another refresh was in flight; nothing ran
    Skipped,
    Refreshed(Arc<ScheduleSnapshot>),
    Failed(CoreError),
}

impl RefreshOutcome {
    pub fn is_skipped(&self) -> bool {
        matches!(self, RefreshOutcome::Skipped)
    }
}

struct RefreshInner {
    aggregator: Arc<ScheduleAggregator>,
    query: RwLock<AggregateQuery>,
    is_refreshing: AtomicBool,
    auto_refresh_enabled: AtomicBool,
    last_refresh_at: RwLock<Option<DateTime<Utc>>>,
    /// Set by teardown; a refresh still in flight then leaves the reset state alone
    torn_down: AtomicBool,
    /// Aggregations actually executed (skips excluded)
    executed: AtomicU64,
    snapshot_tx: watch::Sender<Arc<ScheduleSnapshot>>,
}

/// Held for the duration of one refresh; completion bookkeeping runs on
/// drop so it also happens if the refresh future is dropped early.
struct InFlight<'a> {
    inner: &'a RefreshInner,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.inner.torn_down.load(Ordering::SeqCst) {
            *self.inner.last_refresh_at.write() = Some(Utc::now());
        }
        self.inner.is_refreshing.store(false, Ordering::SeqCst);
    }
}

impl RefreshInner {
    async fn guarded_refresh(&self) -> RefreshOutcome {
        if self
            .is_refreshing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Refresh already in flight, skipping");
            return RefreshOutcome::Skipped;
        }
        self.torn_down.store(false, Ordering::SeqCst);
        let _in_flight = InFlight { inner: self };
        self.executed.fetch_add(1, Ordering::SeqCst);

        let query = self.query.read().clone();
        match self
            .aggregator
            .aggregate(&query.user_id, &query.range, query.priority_filter)
            .await
        {
            Ok(result) => {
                if result.is_partial() {
                    warn!(
                        warnings = result.warnings.len(),
                        "Refresh completed with unavailable sources"
                    );
                }
                let snapshot = Arc::new(ScheduleSnapshot {
                    result,
                    refreshed_at: Some(Utc::now()),
                });
                self.snapshot_tx.send_replace(snapshot.clone());
                RefreshOutcome::Refreshed(snapshot)
            }
            Err(e) => {
                warn!(error = %e, "Refresh failed");
                RefreshOutcome::Failed(e)
            }
        }
    }
}

/// Dropping the sender (or sending `true`) stops the loop
struct AutoRefreshTimer {
    cancel_tx: watch::Sender<bool>,
}

impl AutoRefreshTimer {
    fn cancel(self) {
        let _ = self.cancel_tx.send(true);
    }
}

async fn run_auto_refresh(
    inner: Arc<RefreshInner>,
    interval: Duration,
    mut cancel_rx: watch::Receiver<bool>,
) {
    debug!("Auto-refresh armed every {:?}", interval);
    loop {
        tokio::select! {
            biased;
            changed = cancel_rx.changed() => {
                if changed.is_err() || *cancel_rx.borrow() {
                    break;
                }
            }
            _ = tokio::time::sleep(interval) => {
                if *cancel_rx.borrow() {
                    break;
                }
                if inner.guarded_refresh().await.is_skipped() {
                    debug!("Auto-refresh tick skipped");
                }
            }
        }
    }
    debug!("Auto-refresh loop stopped");
}

/// Refresh policy for one aggregation view.
///
/// Owns the view's `RefreshState`. The timer is cancelled on `teardown`
/// and on drop.
pub struct RefreshController {
    inner: Arc<RefreshInner>,
    interval: Duration,
    timer: Mutex<Option<AutoRefreshTimer>>,
}

impl RefreshController {
    pub fn new(aggregator: Arc<ScheduleAggregator>, query: AggregateQuery, interval: Duration) -> Self {
        let (snapshot_tx, _) = watch::channel(Arc::new(ScheduleSnapshot::default()));
        Self {
            inner: Arc::new(RefreshInner {
                aggregator,
                query: RwLock::new(query),
                is_refreshing: AtomicBool::new(false),
                auto_refresh_enabled: AtomicBool::new(false),
                last_refresh_at: RwLock::new(None),
                torn_down: AtomicBool::new(false),
                executed: AtomicU64::new(0),
                snapshot_tx,
            }),
            interval,
            timer: Mutex::new(None),
        }
    }

    // ===== Getters =====

    pub fn state(&self) -> RefreshState {
        RefreshState {
            auto_refresh_enabled: self.inner.auto_refresh_enabled.load(Ordering::SeqCst),
            last_refresh_at: *self.inner.last_refresh_at.read(),
            is_refreshing: self.inner.is_refreshing.load(Ordering::SeqCst),
        }
    }

    pub fn query(&self) -> AggregateQuery {
        self.inner.query.read().clone()
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Number of aggregations executed so far
    pub fn refresh_count(&self) -> u64 {
        self.inner.executed.load(Ordering::SeqCst)
    }

    /// Receiver that sees every published snapshot
    pub fn subscribe(&self) -> watch::Receiver<Arc<ScheduleSnapshot>> {
        self.inner.snapshot_tx.subscribe()
    }

    pub fn latest(&self) -> Arc<ScheduleSnapshot> {
        self.inner.snapshot_tx.borrow().clone()
    }

    // ===== Mutations =====

    /// Replace the query used by subsequent refreshes
    pub fn set_query(&self, query: AggregateQuery) {
        *self.inner.query.write() = query;
    }

    /// Run one guarded refresh. A no-op while another refresh is in flight.
    pub async fn manual_refresh(&self) -> RefreshOutcome {
        self.inner.guarded_refresh().await
    }

    /// Arm or cancel the recurring refresh. Any previous timer is cancelled
    /// first, so at most one is ever armed.
    ///
    /// Arming needs a Tokio runtime; returns whether a timer is now armed.
    pub fn set_auto_refresh(&self, enabled: bool) -> bool {
        let mut timer = self.timer.lock();
        if let Some(previous) = timer.take() {
            previous.cancel();
        }

        if !enabled {
            self.inner.auto_refresh_enabled.store(false, Ordering::SeqCst);
            info!("Auto-refresh disabled");
            return false;
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("Auto-refresh requested outside a Tokio runtime");
            self.inner.auto_refresh_enabled.store(false, Ordering::SeqCst);
            return false;
        };
        let (cancel_tx, cancel_rx) = watch::channel(false);
        runtime.spawn(run_auto_refresh(self.inner.clone(), self.interval, cancel_rx));
        *timer = Some(AutoRefreshTimer { cancel_tx });
        self.inner.auto_refresh_enabled.store(true, Ordering::SeqCst);
        info!("Auto-refresh enabled every {}s", self.interval.as_secs());
        true
    }

    /// Cancel the timer and reset the view's refresh state. An in-flight
    /// refresh is left to finish.
    pub fn teardown(&self) {
        if let Some(timer) = self.timer.lock().take() {
            timer.cancel();
        }
        self.inner.auto_refresh_enabled.store(false, Ordering::SeqCst);
        self.inner.torn_down.store(true, Ordering::SeqCst);
        *self.inner.last_refresh_at.write() = None;
    }
}

impl Drop for RefreshController {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.lock().take() {
            timer.cancel();
        }
    }
}
