use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};

use crate::db::Database;
use crate::finance::apply_calculated_shares;
use crate::models::{BuyInOutRecord, RollingRecord, Trip, TripReport};
use crate::services::refresher::ReportSink;

/// Read side of the ledger: everything the finance core needs for one trip.
///
/// Implementations hand out owned values. Callers treat what they get as an
/// immutable snapshot and fetch again for fresh numbers.
#[async_trait]
pub trait TripRepository: Send + Sync {
    async fn load_trip(&self, trip_id: &str) -> Result<Option<Trip>>;

    async fn rolling_records(&self, customer_id: &str, since: Option<DateTime<Utc>>) -> Result<Vec<RollingRecord>>;

    async fn cash_records(&self, customer_id: &str, since: Option<DateTime<Utc>>) -> Result<Vec<BuyInOutRecord>>;
}

pub struct SqliteRepository {
    db: Arc<Mutex<Database>>,
}

impl SqliteRepository {
    pub fn new(db: Arc<Mutex<Database>>) -> Self {
        SqliteRepository { db }
    }
}

#[async_trait]
impl TripRepository for SqliteRepository {
    async fn load_trip(&self, trip_id: &str) -> Result<Option<Trip>> {
        let db = self.db.lock().map_err(|_| anyhow!("DB lock poisoned"))?;
        Ok(db.get_trip(trip_id)?)
    }

    async fn rolling_records(&self, customer_id: &str, since: Option<DateTime<Utc>>) -> Result<Vec<RollingRecord>> {
        let db = self.db.lock().map_err(|_| anyhow!("DB lock poisoned"))?;
        Ok(db.get_rolling_records(customer_id, since)?)
    }

    async fn cash_records(&self, customer_id: &str, since: Option<DateTime<Utc>>) -> Result<Vec<BuyInOutRecord>> {
        let db = self.db.lock().map_err(|_| anyhow!("DB lock poisoned"))?;
        Ok(db.get_cash_records(customer_id, since)?)
    }
}

/// Caches the derived totals and calculated shares on the trip rows.
impl ReportSink for SqliteRepository {
    fn store(&self, report: &TripReport) -> Result<()> {
        let db = self.db.lock().map_err(|_| anyhow!("DB lock poisoned"))?;
        db.store_trip_totals(&report.trip_id, &report.financials)?;
        let mut agents = db.get_trip_agents(&report.trip_id)?;
        apply_calculated_shares(&mut agents, &report.sharing);
        db.replace_trip_agents(&report.trip_id, &agents)?;
        Ok(())
    }
}
