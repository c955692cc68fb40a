use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use crate::models::{BuyInOutRecord, Expense, RollingRecord, Trip, TripAgent, TripCustomer, TripStatus};
use crate::services::repository::TripRepository;

#[derive(Deserialize)]
struct TripRow {
    id: String,
    name: String,
    start_date: NaiveDate,
    #[serde(default)]
    end_date: Option<NaiveDate>,
    status: TripStatus,
    #[serde(default)]
    created_at: String,
    #[serde(default)]
    updated_at: String,
}

/// Reads trips from a PostgREST endpoint (Supabase exposes one at `/rest/v1`).
///
/// Table and column names mirror the local SQLite schema.
pub struct RestTripSource {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl RestTripSource {
    pub fn new(base_url: &str, api_key: &str) -> Self {
        RestTripSource {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    async fn fetch_rows<T: DeserializeOwned>(&self, table: &str, query: &[(String, String)]) -> Result<Vec<T>> {
        let url = self.table_url(table);
        debug!(table, ?query, "fetching rows");

        let response = self
            .client
            .get(&url)
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .query(query)
            .send()
            .await
            .with_context(|| format!("GET {}", url))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Backend error {} on {}: {}", status, table, body));
        }

        response
            .json::<Vec<T>>()
            .await
            .with_context(|| format!("Decode rows of {}", table))
    }
}

fn eq_filter(column: &str, value: &str) -> (String, String) {
    (column.to_string(), format!("eq.{}", value))
}

fn record_query(customer_id: &str, since: Option<DateTime<Utc>>) -> Vec<(String, String)> {
    let mut query = vec![
        ("select".to_string(), "*".to_string()),
        eq_filter("customer_id", customer_id),
        ("order".to_string(), "recorded_at.asc".to_string()),
    ];
    if let Some(start) = since {
        query.push((
            "recorded_at".to_string(),
            format!("gte.{}", start.to_rfc3339_opts(SecondsFormat::Secs, true)),
        ));
    }
    query
}

#[async_trait]
impl TripRepository for RestTripSource {
    async fn load_trip(&self, trip_id: &str) -> Result<Option<Trip>> {
        let select = ("select".to_string(), "*".to_string());
        let by_trip = eq_filter("trip_id", trip_id);

        let rows: Vec<TripRow> = self
            .fetch_rows("trips", &[select.clone(), eq_filter("id", trip_id)])
            .await?;
        let Some(row) = rows.into_iter().next() else {
            return Ok(None);
        };

        let customers: Vec<TripCustomer> = self
            .fetch_rows("trip_customers", &[select.clone(), by_trip.clone()])
            .await?;
        let agents: Vec<TripAgent> = self
            .fetch_rows("trip_agents", &[select.clone(), by_trip.clone()])
            .await?;
        let expenses: Vec<Expense> = self.fetch_rows("trip_expenses", &[select, by_trip]).await?;

        Ok(Some(Trip {
            id: row.id,
            name: row.name,
            start_date: row.start_date,
            end_date: row.end_date,
            status: row.status,
            customers,
            agents,
            expenses,
            totals: None,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }))
    }

    async fn rolling_records(&self, customer_id: &str, since: Option<DateTime<Utc>>) -> Result<Vec<RollingRecord>> {
        self.fetch_rows("rolling_records", &record_query(customer_id, since))
            .await
    }

    async fn cash_records(&self, customer_id: &str, since: Option<DateTime<Utc>>) -> Result<Vec<BuyInOutRecord>> {
        self.fetch_rows("buy_in_out_records", &record_query(customer_id, since))
            .await
    }
}
