// src/scheduler.rs
//! Refresh control loop.
//!
//! One process-wide `last_ingestion` clock guarded by a tokio mutex. The
//! due-check, the ingestion run and the clock update form one critical
//! section, so concurrent callers inside the same interval trigger exactly one
//! ingestion. A successful run chains a best-effort digest report after the
//! lock is released. Status readers see a published copy of the clock and
//! never wait for a run in progress.
//!
//! Two drivers share the same check:
//! - passive: callers invoke [`RefreshScheduler::check_and_refresh`] (the HTTP
//!   `/ask` handler does this on every request);
//! - active: [`RefreshScheduler::spawn`] runs it on a `tokio::time::interval`
//!   until [`SchedulerHandle::stop`].

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Local};
use metrics::{counter, describe_counter, describe_gauge, gauge};
use once_cell::sync::OnceCell;
use serde::Serialize;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::error::{AgentError, Result};
use crate::ingest::{IngestStats, Ingestor};
use crate::report::{ReportGenerator, NO_RECENT_NEWS};

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(3600);

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("refresh_runs_total", "Ingestion runs started by the refresh scheduler.");
        describe_counter!("refresh_skipped_total", "Refresh checks that found nothing due.");
        describe_gauge!("refresh_last_run_ts", "Unix ts of the last successful ingestion.");
    });
}

#[derive(Debug, Default, Clone, Copy)]
struct RefreshState {
    last_ingestion: Option<DateTime<Local>>,
}

/// What happened to the chained report after a refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum ReportChain {
    Saved(String),
    Skipped(String),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RefreshOutcome {
    NotDue {
        last_run: DateTime<Local>,
        next_run: DateTime<Local>,
    },
    Refreshed {
        stats: IngestStats,
        report: ReportChain,
    },
}

impl RefreshOutcome {
    pub fn refreshed(&self) -> bool {
        matches!(self, RefreshOutcome::Refreshed { .. })
    }
}

pub struct RefreshScheduler {
    state: Mutex<RefreshState>,
    /// Copy of `state.last_ingestion`, written under the lock.
    published: watch::Sender<Option<DateTime<Local>>>,
    interval: Duration,
    ingestor: Arc<dyn Ingestor>,
    auto_report: Option<Arc<ReportGenerator>>,
}

impl RefreshScheduler {
    pub fn new(ingestor: Arc<dyn Ingestor>) -> Self {
        ensure_metrics_described();
        Self {
            state: Mutex::new(RefreshState::default()),
            published: watch::Sender::new(None),
            interval: DEFAULT_INTERVAL,
            ingestor,
            auto_report: None,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Chain a digest after every successful refresh.
    pub fn with_auto_report(mut self, reports: Arc<ReportGenerator>) -> Self {
        self.auto_report = Some(reports);
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub async fn last_ingestion_time(&self) -> Option<DateTime<Local>> {
        *self.published.borrow()
    }

    /// `None` while a run is pending (never ran, or force-reset).
    pub async fn next_run(&self) -> Option<DateTime<Local>> {
        let last = (*self.published.borrow())?;
        Some(last + self.chrono_interval())
    }

    /// Forget the last run so the next check is due.
    pub async fn reset(&self) {
        let mut state = self.state.lock().await;
        state.last_ingestion = None;
        self.published.send_replace(None);
        tracing::info!(target: "refresh", "refresh clock reset");
    }

    /// Reset, then check. Always ingests unless the ingestion itself fails.
    pub async fn force_refresh(&self) -> Result<RefreshOutcome> {
        self.reset().await;
        self.check_and_refresh().await
    }

    /// Run ingestion if the interval has elapsed (or it never ran).
    pub async fn check_and_refresh(&self) -> Result<RefreshOutcome> {
        let stats = {
            let mut state = self.state.lock().await;
            let now = Local::now();
            if let Some(last) = state.last_ingestion {
                if now - last <= self.chrono_interval() {
                    counter!("refresh_skipped_total").increment(1);
                    return Ok(RefreshOutcome::NotDue {
                        last_run: last,
                        next_run: last + self.chrono_interval(),
                    });
                }
            }

            tracing::info!(target: "refresh", ingestor = self.ingestor.name(), "refresh due, ingesting");
            counter!("refresh_runs_total").increment(1);
            let stats = self.ingestor.ingest().await.inspect_err(|e| {
                tracing::warn!(target: "refresh", error = %e, "ingestion failed; refresh stays due");
            })?;

            let done = Local::now();
            state.last_ingestion = Some(done);
            self.published.send_replace(Some(done));
            gauge!("refresh_last_run_ts").set(done.timestamp() as f64);
            stats
        };

        let report = self.chain_report().await;
        tracing::info!(target: "refresh", chunks = stats.chunks, report = ?report, "refresh complete");
        Ok(RefreshOutcome::Refreshed { stats, report })
    }

    async fn chain_report(&self) -> ReportChain {
        let Some(reports) = &self.auto_report else {
            return ReportChain::Skipped("auto-report disabled".to_string());
        };
        match reports.generate_and_save().await {
            Ok(Some((_, saved))) => ReportChain::Saved(saved.path.display().to_string()),
            Ok(None) => ReportChain::Skipped(NO_RECENT_NEWS.to_string()),
            Err(e) => {
                tracing::warn!(target: "refresh", error = %e, "auto-report failed");
                ReportChain::Failed(e.to_string())
            }
        }
    }

    fn chrono_interval(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.interval).unwrap_or_else(|_| chrono::Duration::days(36_500))
    }

    /// Run `check_and_refresh` every `tick` in a background task. The first
    /// tick fires immediately.
    pub fn spawn(self: Arc<Self>, tick: Duration) -> SchedulerHandle {
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let join = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(tick.max(Duration::from_millis(1)));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            tracing::info!(target: "refresh", tick_secs = tick.as_secs_f64(), "background refresh loop started");
            // A dropped handle detaches the loop; only an explicit stop ends it.
            let mut attached = true;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = self.check_and_refresh().await {
                            tracing::warn!(target: "refresh", error = %e, "background refresh failed");
                        }
                    }
                    changed = stop_rx.changed(), if attached => {
                        match changed {
                            Ok(()) if *stop_rx.borrow() => break,
                            Ok(()) => {}
                            Err(_) => attached = false,
                        }
                    }
                }
            }
            tracing::info!(target: "refresh", "background refresh loop stopped");
        });
        SchedulerHandle { stop: stop_tx, join }
    }
}

pub struct SchedulerHandle {
    stop: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Signal the loop and wait for it. An in-flight refresh completes first.
    pub async fn stop(self) {
        let _ = self.stop.send(true);
        if let Err(e) = self.join.await {
            tracing::warn!(target: "refresh", error = %e, "refresh loop ended abnormally");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}

/// Test ingestor: counts calls, optionally sleeps or fails.
#[derive(Default)]
pub struct MockIngestor {
    calls: AtomicUsize,
    delay: Duration,
    fail_with: Option<String>,
    stats: IngestStats,
}

impl MockIngestor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn failing(msg: impl Into<String>) -> Self {
        Self {
            fail_with: Some(msg.into()),
            ..Self::default()
        }
    }

    pub fn with_stats(mut self, stats: IngestStats) -> Self {
        self.stats = stats;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Ingestor for MockIngestor {
    async fn ingest(&self) -> Result<IngestStats> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match &self.fail_with {
            Some(msg) => Err(AgentError::TransientServiceFailure(msg.clone())),
            None => Ok(self.stats),
        }
    }

    fn name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn first_check_is_due_then_idle() {
        let ing = Arc::new(MockIngestor::new());
        let s = RefreshScheduler::new(ing.clone());
        assert!(s.next_run().await.is_none());

        let first = s.check_and_refresh().await.unwrap();
        assert!(first.refreshed());
        let second = s.check_and_refresh().await.unwrap();
        assert!(matches!(second, RefreshOutcome::NotDue { .. }));
        assert_eq!(ing.calls(), 1);

        let last = s.last_ingestion_time().await.unwrap();
        assert_eq!(s.next_run().await.unwrap(), last + chrono::Duration::hours(1));
    }

    #[tokio::test]
    async fn failed_ingestion_leaves_refresh_due() {
        let ing = Arc::new(MockIngestor::failing("feeds down"));
        let s = RefreshScheduler::new(ing.clone());
        assert!(s.check_and_refresh().await.is_err());
        assert!(s.last_ingestion_time().await.is_none());
        assert!(s.check_and_refresh().await.is_err());
        assert_eq!(ing.calls(), 2);
    }

    #[tokio::test]
    async fn elapsed_interval_makes_check_due_again() {
        let ing = Arc::new(MockIngestor::new());
        let s = RefreshScheduler::new(ing.clone()).with_interval(Duration::from_millis(20));
        s.check_and_refresh().await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(s.check_and_refresh().await.unwrap().refreshed());
        assert_eq!(ing.calls(), 2);
    }

    #[tokio::test]
    async fn without_generator_report_chain_is_skipped() {
        let s = RefreshScheduler::new(Arc::new(MockIngestor::new()));
        match s.check_and_refresh().await.unwrap() {
            RefreshOutcome::Refreshed { report, .. } => {
                assert!(matches!(report, ReportChain::Skipped(_)));
            }
            other => panic!("expected refresh, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn background_loop_ingests_and_stops() {
        let ing = Arc::new(MockIngestor::new());
        let s = Arc::new(RefreshScheduler::new(ing.clone()));
        let handle = s.clone().spawn(Duration::from_millis(100));
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(!handle.is_finished());
        handle.stop().await;
        // Many ticks, one ingestion: the hour has not elapsed.
        assert_eq!(ing.calls(), 1);
        assert!(s.last_ingestion_time().await.is_some());
    }
}
