//! Keeps one up-to-date [`TripReport`] per trip.
//!
//! Every trip gets a slot with an async gate, so at most one fetch or write
//! touches a trip at a time. Each refresh request takes a ticket; a result is
//! only published if no newer ticket was issued while it was being fetched,
//! so a slow, stale response never overwrites a newer one. The same check
//! guards the optional [`ReportSink`], so cached figures only ever come from
//! the current report.

use anyhow::{anyhow, Result};
use chrono::Utc;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::finance::{compute_agent_shares, compute_trip_financials_with, NumericMode, ValidationError};
use crate::models::{Trip, TripReport};
use crate::services::repository::TripRepository;

pub const MIN_POLL_INTERVAL: Duration = Duration::from_secs(10);
pub const MAX_POLL_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub enum RefreshOutcome {
    Published(Arc<TripReport>),
    /// A newer request for the same trip was issued; this one was dropped.
    Superseded,
    NotFound,
}

struct TripSlot {
    gate: tokio::sync::Mutex<()>,
    issued: AtomicU64,
    tx: watch::Sender<Option<Arc<TripReport>>>,
}

impl TripSlot {
    fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        TripSlot {
            gate: tokio::sync::Mutex::new(()),
            issued: AtomicU64::new(0),
            tx,
        }
    }

    fn next_ticket(&self) -> u64 {
        self.issued.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn is_current(&self, ticket: u64) -> bool {
        self.issued.load(Ordering::SeqCst) == ticket
    }
}

/// Receives every report that is about to be published, inside the trip's gate.
pub trait ReportSink: Send + Sync {
    fn store(&self, report: &TripReport) -> Result<()>;
}

pub fn build_report(trip: &Trip, mode: NumericMode) -> Result<TripReport, ValidationError> {
    let financials = compute_trip_financials_with(trip, mode)?;
    let sharing = compute_agent_shares(financials.net_result, &trip.agents);
    Ok(TripReport {
        trip_id: trip.id.clone(),
        trip_name: trip.name.clone(),
        status: trip.status,
        financials,
        sharing,
        generated_at: Utc::now(),
    })
}

pub fn clamp_poll_interval(interval: Duration) -> Duration {
    interval.clamp(MIN_POLL_INTERVAL, MAX_POLL_INTERVAL)
}

pub struct TripRefresher {
    repo: Arc<dyn TripRepository>,
    sink: Option<Arc<dyn ReportSink>>,
    mode: NumericMode,
    slots: Mutex<HashMap<String, Arc<TripSlot>>>,
}

impl TripRefresher {
    pub fn new(repo: Arc<dyn TripRepository>, mode: NumericMode) -> Self {
        TripRefresher {
            repo,
            sink: None,
            mode,
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn ReportSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn repository(&self) -> Arc<dyn TripRepository> {
        self.repo.clone()
    }

    fn slot(&self, trip_id: &str) -> Result<Arc<TripSlot>> {
        let mut slots = self.slots.lock().map_err(|_| anyhow!("Refresher lock"))?;
        Ok(slots
            .entry(trip_id.to_string())
            .or_insert_with(|| Arc::new(TripSlot::new()))
            .clone())
    }

    pub fn subscribe(&self, trip_id: &str) -> Result<watch::Receiver<Option<Arc<TripReport>>>> {
        Ok(self.slot(trip_id)?.tx.subscribe())
    }

    pub fn latest(&self, trip_id: &str) -> Option<Arc<TripReport>> {
        let slots = self.slots.lock().ok()?;
        slots.get(trip_id).and_then(|slot| slot.tx.borrow().clone())
    }

    /// Drops the slot for `trip_id` when no request holds it and nobody subscribes.
    pub fn prune(&self, trip_id: &str) -> bool {
        let Ok(mut slots) = self.slots.lock() else {
            return false;
        };
        let idle = slots
            .get(trip_id)
            .is_some_and(|slot| Arc::strong_count(slot) == 1 && slot.tx.receiver_count() == 0);
        if idle {
            slots.remove(trip_id);
            debug!(trip_id, "pruned idle trip slot");
        }
        idle
    }

    pub async fn refresh(&self, trip_id: &str) -> Result<RefreshOutcome> {
        let slot = self.slot(trip_id)?;
        let ticket = slot.next_ticket();
        let _gate = slot.gate.lock().await;

        if !slot.is_current(ticket) {
            debug!(trip_id, ticket, "refresh superseded before fetch");
            return Ok(RefreshOutcome::Superseded);
        }
        self.fetch_and_publish(&slot, trip_id, ticket).await
    }

    /// Runs `op` with the trip's gate held, then refetches and publishes.
    ///
    /// Refreshes queued before the write are superseded by it. Once `op` has
    /// succeeded its value is always returned; a failed refetch only shows up
    /// in the outcome.
    pub async fn write<T, F, Fut>(&self, trip_id: &str, op: F) -> Result<(T, Result<RefreshOutcome>)>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let slot = self.slot(trip_id)?;
        let _gate = slot.gate.lock().await;
        let ticket = slot.next_ticket();

        let value = op().await?;
        let outcome = self.fetch_and_publish(&slot, trip_id, ticket).await;
        if let Err(err) = &outcome {
            warn!(trip_id, "refresh after write failed: {:#}", err);
        }
        Ok((value, outcome))
    }

    async fn fetch_and_publish(&self, slot: &TripSlot, trip_id: &str, ticket: u64) -> Result<RefreshOutcome> {
        let Some(trip) = self.repo.load_trip(trip_id).await? else {
            return Ok(RefreshOutcome::NotFound);
        };
        let report = Arc::new(build_report(&trip, self.mode)?);

        if !slot.is_current(ticket) {
            debug!(trip_id, ticket, "discarding stale trip snapshot");
            return Ok(RefreshOutcome::Superseded);
        }
        if let Some(sink) = &self.sink {
            if let Err(err) = sink.store(&report) {
                warn!(trip_id, "could not store trip report: {:#}", err);
            }
        }
        slot.tx.send_replace(Some(report.clone()));
        Ok(RefreshOutcome::Published(report))
    }

    /// Refreshes `trip_id` on a fixed cadence until the task is aborted.
    pub fn spawn_polling(self: &Arc<Self>, trip_id: &str, interval: Duration) -> JoinHandle<()> {
        let refresher = Arc::clone(self);
        let trip_id = trip_id.to_string();
        let interval = clamp_poll_interval(interval);
        info!(trip_id = %trip_id, ?interval, "starting trip polling");

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                match refresher.refresh(&trip_id).await {
                    Ok(RefreshOutcome::NotFound) => warn!(trip_id = %trip_id, "polled trip no longer exists"),
                    Ok(_) => {}
                    Err(err) => warn!(trip_id = %trip_id, "trip refresh failed: {:#}", err),
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BuyInOutRecord, RollingRecord, TripAgent, TripCustomer, TripStatus};
    use async_trait::async_trait;
    use chrono::{DateTime, NaiveDate};
    use std::sync::atomic::AtomicUsize;

    /// Serves a trip whose single customer's rolling amount is bumped on every fetch.
    struct CountingRepo {
        fetches: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        delay: Duration,
    }

    impl CountingRepo {
        fn new(delay: Duration) -> Self {
            CountingRepo {
                fetches: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
                delay,
            }
        }
    }

    #[async_trait]
    impl TripRepository for CountingRepo {
        async fn load_trip(&self, trip_id: &str) -> Result<Option<Trip>> {
            if trip_id == "missing" {
                return Ok(None);
            }
            if trip_id == "offline" {
                return Err(anyhow!("backend unreachable"));
            }
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            let n = self.fetches.fetch_add(1, Ordering::SeqCst) + 1;
            tokio::time::sleep(self.delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            let mut customer = TripCustomer::new(trip_id, "c1");
            customer.rolling_amount = (n as f64 * 1_000.0).into();
            Ok(Some(Trip {
                id: trip_id.to_string(),
                name: "Macau March".to_string(),
                start_date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
                end_date: None,
                status: TripStatus::Ongoing,
                customers: vec![customer],
                agents: vec![TripAgent {
                    trip_id: trip_id.to_string(),
                    agent_id: "a1".to_string(),
                    agent_name: None,
                    share_percentage: 40.0,
                    calculated_share: 0.0,
                    active: true,
                }],
                expenses: Vec::new(),
                totals: None,
                created_at: String::new(),
                updated_at: String::new(),
            }))
        }

        async fn rolling_records(&self, _: &str, _: Option<DateTime<Utc>>) -> Result<Vec<RollingRecord>> {
            Ok(Vec::new())
        }

        async fn cash_records(&self, _: &str, _: Option<DateTime<Utc>>) -> Result<Vec<BuyInOutRecord>> {
            Ok(Vec::new())
        }
    }

    /// Remembers the rolling total of every report it is handed.
    #[derive(Default)]
    struct RecordingSink {
        stored: Mutex<Vec<f64>>,
    }

    impl ReportSink for RecordingSink {
        fn store(&self, report: &TripReport) -> Result<()> {
            self.stored.lock().unwrap().push(report.financials.total_rolling);
            Ok(())
        }
    }

    fn published_rolling(outcome: &RefreshOutcome) -> Option<f64> {
        match outcome {
            RefreshOutcome::Published(report) => Some(report.financials.total_rolling),
            _ => None,
        }
    }

    #[tokio::test]
    async fn refresh_publishes_report_with_shares() {
        let repo = Arc::new(CountingRepo::new(Duration::from_millis(1)));
        let refresher = TripRefresher::new(repo, NumericMode::Lenient);
        let mut rx = refresher.subscribe("t1").unwrap();

        let outcome = refresher.refresh("t1").await.unwrap();
        assert_eq!(published_rolling(&outcome), Some(1_000.0));
        rx.changed().await.unwrap();
        let report = rx.borrow().clone().unwrap();
        assert_eq!(report.sharing.agents.len(), 1);
        assert_eq!(report.sharing.company_percentage, 60.0);
        assert!(refresher.latest("t1").is_some());
    }

    #[tokio::test]
    async fn concurrent_refreshes_keep_only_the_newest() {
        let repo = Arc::new(CountingRepo::new(Duration::from_millis(20)));
        let refresher = TripRefresher::new(repo.clone(), NumericMode::Lenient);

        let (first, second, third) = tokio::join!(
            refresher.refresh("t1"),
            refresher.refresh("t1"),
            refresher.refresh("t1"),
        );

        assert!(matches!(first.unwrap(), RefreshOutcome::Superseded));
        assert!(matches!(second.unwrap(), RefreshOutcome::Superseded));
        assert_eq!(published_rolling(&third.unwrap()), Some(2_000.0));
        assert_eq!(repo.fetches.load(Ordering::SeqCst), 2);
        assert_eq!(repo.max_in_flight.load(Ordering::SeqCst), 1);
        assert_eq!(refresher.latest("t1").unwrap().financials.total_rolling, 2_000.0);
    }

    #[tokio::test]
    async fn trips_refresh_independently() {
        let repo = Arc::new(CountingRepo::new(Duration::from_millis(5)));
        let refresher = TripRefresher::new(repo, NumericMode::Lenient);

        let (a, b) = tokio::join!(refresher.refresh("t1"), refresher.refresh("t2"));
        assert!(matches!(a.unwrap(), RefreshOutcome::Published(_)));
        assert!(matches!(b.unwrap(), RefreshOutcome::Published(_)));
    }

    #[tokio::test]
    async fn write_supersedes_queued_refresh() {
        let repo = Arc::new(CountingRepo::new(Duration::from_millis(10)));
        let refresher = TripRefresher::new(repo.clone(), NumericMode::Lenient);

        let write = refresher.write("t1", || async { Ok::<_, anyhow::Error>("saved") });
        let (written, refreshed) = tokio::join!(write, refresher.refresh("t1"));

        let (value, outcome) = written.unwrap();
        assert_eq!(value, "saved");
        assert!(matches!(outcome.unwrap(), RefreshOutcome::Superseded));
        assert!(matches!(refreshed.unwrap(), RefreshOutcome::Published(_)));
        assert_eq!(repo.max_in_flight.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_write_publishes_nothing() {
        let repo = Arc::new(CountingRepo::new(Duration::from_millis(1)));
        let refresher = TripRefresher::new(repo.clone(), NumericMode::Lenient);

        let result = refresher
            .write("t1", || async { Err::<(), _>(anyhow!("share rejected")) })
            .await;
        assert!(result.is_err());
        assert_eq!(repo.fetches.load(Ordering::SeqCst), 0);
        assert!(refresher.latest("t1").is_none());
    }

    #[tokio::test]
    async fn missing_trip_is_reported() {
        let repo = Arc::new(CountingRepo::new(Duration::from_millis(1)));
        let refresher = TripRefresher::new(repo, NumericMode::Lenient);
        assert!(matches!(
            refresher.refresh("missing").await.unwrap(),
            RefreshOutcome::NotFound
        ));
    }

    #[tokio::test]
    async fn only_current_reports_reach_the_sink() {
        let repo = Arc::new(CountingRepo::new(Duration::from_millis(10)));
        let sink = Arc::new(RecordingSink::default());
        let refresher = TripRefresher::new(repo, NumericMode::Lenient).with_sink(sink.clone());

        // The write fetches first but a refresh queues behind it, so its report is stale.
        let write = refresher.write("t1", || async { Ok::<_, anyhow::Error>(()) });
        let (written, refreshed) = tokio::join!(write, refresher.refresh("t1"));

        assert!(matches!(written.unwrap().1.unwrap(), RefreshOutcome::Superseded));
        assert_eq!(published_rolling(&refreshed.unwrap()), Some(2_000.0));
        assert_eq!(*sink.stored.lock().unwrap(), vec![2_000.0]);

        let (a, b, c) = tokio::join!(refresher.refresh("t1"), refresher.refresh("t1"), refresher.refresh("t1"));
        assert!(matches!(a.unwrap(), RefreshOutcome::Superseded));
        assert!(matches!(b.unwrap(), RefreshOutcome::Superseded));
        assert_eq!(published_rolling(&c.unwrap()), Some(4_000.0));
        let stored = sink.stored.lock().unwrap().clone();
        assert_eq!(stored.last(), Some(&refresher.latest("t1").unwrap().financials.total_rolling));
    }

    #[tokio::test]
    async fn write_keeps_its_value_when_refetch_fails() {
        let repo = Arc::new(CountingRepo::new(Duration::from_millis(1)));
        let refresher = TripRefresher::new(repo, NumericMode::Lenient);

        let (value, outcome) = refresher
            .write("offline", || async { Ok::<_, anyhow::Error>(42) })
            .await
            .unwrap();
        assert_eq!(value, 42);
        assert!(outcome.is_err());
        assert!(refresher.latest("offline").is_none());
    }

    #[tokio::test]
    async fn idle_slots_are_pruned() {
        let repo = Arc::new(CountingRepo::new(Duration::from_millis(1)));
        let refresher = TripRefresher::new(repo, NumericMode::Lenient);

        let rx = refresher.subscribe("t1").unwrap();
        refresher.refresh("t1").await.unwrap();
        assert!(!refresher.prune("t1"));
        assert!(refresher.latest("t1").is_some());

        drop(rx);
        assert!(refresher.prune("t1"));
        assert!(refresher.latest("t1").is_none());
        assert!(!refresher.prune("t1"));
    }

    #[test]
    fn poll_interval_is_clamped() {
        assert_eq!(clamp_poll_interval(Duration::from_secs(1)), MIN_POLL_INTERVAL);
        assert_eq!(clamp_poll_interval(Duration::from_secs(20)), Duration::from_secs(20));
        assert_eq!(clamp_poll_interval(Duration::from_secs(300)), MAX_POLL_INTERVAL);
    }
}
