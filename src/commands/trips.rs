use anyhow::anyhow;
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

use crate::finance::{
    compute_agent_shares, deactivate_agent_share, remove_agent_share, set_agent_share, summarize_customer_records,
    ValidationError,
};
use crate::models::{Expense, Numeric, ShareBreakdown, Trip, TripAgent, TripCustomer, TripReport, TripStatus};
use crate::services::refresher::RefreshOutcome;
use crate::services::state::AppState;
use crate::utils::{new_id, now_rfc3339, parse_date, start_of_day};

#[derive(Debug, Deserialize)]
pub struct CreateTripPayload {
    pub name: String,
    pub start_date: String,
    pub end_date: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateSharePayload {
    pub trip_id: String,
    pub agent_id: String,
    pub share_percentage: f64,
}

#[derive(Debug, Deserialize)]
pub struct AddTripCustomerPayload {
    pub trip_id: String,
    pub customer_id: String,
    pub rolling_percentage: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct AddExpensePayload {
    pub trip_id: String,
    pub amount: f64,
    pub category: String,
    pub description: Option<String>,
    pub recorded_by: Option<String>,
}

pub async fn create_trip(payload: CreateTripPayload, state: &AppState) -> Result<Trip, String> {
    let name = payload.name.trim();
    if name.is_empty() {
        return Err("Trip name is required".to_string());
    }
    let start_date = parse_date(&payload.start_date).map_err(|e| e.to_string())?;
    let end_date = payload
        .end_date
        .as_deref()
        .map(parse_date)
        .transpose()
        .map_err(|e| e.to_string())?;
    if end_date.is_some_and(|end| end < start_date) {
        return Err("Trip cannot end before it starts".to_string());
    }
    let status = match payload.status.as_deref() {
        Some(raw) => raw.parse::<TripStatus>()?,
        None => TripStatus::Planned,
    };

    let now = now_rfc3339();
    let trip = Trip {
        id: new_id(),
        name: name.to_string(),
        start_date,
        end_date,
        status,
        customers: Vec::new(),
        agents: Vec::new(),
        expenses: Vec::new(),
        totals: None,
        created_at: now.clone(),
        updated_at: now,
    };

    let db = state.db.lock().map_err(|_| "DB lock".to_string())?;
    db.insert_trip(&trip).map_err(|e| e.to_string())?;
    info!(trip_id = %trip.id, name = %trip.name, "trip created");
    Ok(trip)
}

pub async fn list_trips(state: &AppState) -> Result<Vec<Trip>, String> {
    let db = state.db.lock().map_err(|_| "DB lock".to_string())?;
    db.list_trips().map_err(|e| e.to_string())
}

pub async fn get_trip(trip_id: &str, state: &AppState) -> Result<Trip, String> {
    let db = state.db.lock().map_err(|_| "DB lock".to_string())?;
    db.get_trip(trip_id)
        .map_err(|e| e.to_string())?
        .ok_or_else(|| "Trip not found".to_string())
}

pub async fn set_trip_status(trip_id: &str, status: &str, state: &AppState) -> Result<(), String> {
    let status = status.parse::<TripStatus>()?;
    let db = state.db.lock().map_err(|_| "DB lock".to_string())?;
    let updated = db.set_trip_status(trip_id, status).map_err(|e| e.to_string())?;
    if updated == 0 {
        return Err("Trip not found".to_string());
    }
    Ok(())
}

/// Current figures for a trip, freshly fetched.
pub async fn get_trip_statistics(trip_id: &str, state: &AppState) -> Result<TripReport, String> {
    let outcome = state.refresher.refresh(trip_id).await.map_err(|e| e.to_string())?;
    let report = resolve(trip_id, outcome, state)?;
    Ok((*report).clone())
}

pub async fn get_trip_sharing(trip_id: &str, state: &AppState) -> Result<ShareBreakdown, String> {
    Ok(get_trip_statistics(trip_id, state).await?.sharing)
}

/// Sets an agent's share of a trip. Rejected edits leave the shares as they were.
pub async fn update_agent_commission(payload: UpdateSharePayload, state: &AppState) -> Result<ShareBreakdown, String> {
    let db = state.db.clone();
    let trip_id = payload.trip_id.clone();
    let (_, outcome) = state
        .refresher
        .write(&trip_id, || async move {
            let db = db.lock().map_err(|_| anyhow!("DB lock poisoned"))?;
            if db.get_agent(&payload.agent_id)?.is_none() {
                return Err(anyhow!("Agent not found"));
            }
            let mut agents = db.get_trip_agents(&payload.trip_id)?;
            set_agent_share(
                &mut agents,
                &payload.trip_id,
                &payload.agent_id,
                payload.share_percentage,
            )?;
            db.replace_trip_agents(&payload.trip_id, &agents)?;
            info!(
                trip_id = %payload.trip_id,
                agent_id = %payload.agent_id,
                share = payload.share_percentage,
                "agent share updated"
            );
            Ok(())
        })
        .await
        .map_err(|e| e.to_string())?;

    sharing_after_write(&trip_id, outcome, state)
}

pub async fn remove_trip_agent(trip_id: &str, agent_id: &str, state: &AppState) -> Result<ShareBreakdown, String> {
    edit_agents(trip_id, state, |agents| Ok(remove_agent_share(agents, agent_id))).await
}

pub async fn deactivate_trip_agent(trip_id: &str, agent_id: &str, state: &AppState) -> Result<ShareBreakdown, String> {
    edit_agents(trip_id, state, |agents| Ok(deactivate_agent_share(agents, agent_id))).await
}

async fn edit_agents<F>(trip_id: &str, state: &AppState, edit: F) -> Result<ShareBreakdown, String>
where
    F: FnOnce(&mut Vec<TripAgent>) -> Result<bool, ValidationError>,
{
    let db = state.db.clone();
    let id = trip_id.to_string();
    let (found, outcome) = state
        .refresher
        .write(trip_id, || async move {
            let db = db.lock().map_err(|_| anyhow!("DB lock poisoned"))?;
            let mut agents = db.get_trip_agents(&id)?;
            let found = edit(&mut agents)?;
            if found {
                db.replace_trip_agents(&id, &agents)?;
            }
            Ok(found)
        })
        .await
        .map_err(|e| e.to_string())?;

    if !found {
        return Err("Agent is not on this trip".to_string());
    }
    sharing_after_write(trip_id, outcome, state)
}

pub async fn add_trip_customer(payload: AddTripCustomerPayload, state: &AppState) -> Result<TripCustomer, String> {
    let db = state.db.clone();
    let trip_id = payload.trip_id.clone();
    let (link, _) = state
        .refresher
        .write(&trip_id, || async move {
            let db = db.lock().map_err(|_| anyhow!("DB lock poisoned"))?;
            let customer = db
                .get_customer(&payload.customer_id)?
                .ok_or_else(|| anyhow!("Customer not found"))?;
            let rate = payload.rolling_percentage.unwrap_or(customer.rolling_percentage);
            if !(0.0..=100.0).contains(&rate) {
                return Err(ValidationError::PercentageOutOfRange {
                    field: "rolling_percentage",
                    owner: format!("customer {}", customer.id),
                    value: rate,
                }
                .into());
            }
            let link = TripCustomer {
                customer_name: Some(customer.name),
                rolling_percentage: Numeric::Value(rate),
                ..TripCustomer::new(&payload.trip_id, &payload.customer_id)
            };
            db.upsert_trip_customer(&link)?;
            Ok(link)
        })
        .await
        .map_err(|e| e.to_string())?;
    Ok(link)
}

/// Rebuilds one customer's per-trip figures from their records since the trip started.
pub async fn sync_trip_customer(trip_id: &str, customer_id: &str, state: &AppState) -> Result<TripCustomer, String> {
    let repo = state.refresher.repository();
    let db = state.db.clone();
    let (id, customer_id) = (trip_id.to_string(), customer_id.to_string());

    let (link, _) = state
        .refresher
        .write(trip_id, || async move {
            let trip_id = id;
            let trip = repo
                .load_trip(&trip_id)
                .await?
                .ok_or_else(|| anyhow!("Trip not found"))?;
            let since = Some(start_of_day(trip.start_date));
            let rolling = repo.rolling_records(&customer_id, since).await?;
            let cash = repo.cash_records(&customer_id, since).await?;
            let totals = summarize_customer_records(&customer_id, &rolling, &cash, since);

            let base = match trip.customers.iter().find(|c| c.customer_id == customer_id) {
                Some(existing) => existing.clone(),
                None => {
                    let db = db.lock().map_err(|_| anyhow!("DB lock poisoned"))?;
                    let rate = db
                        .get_customer(&customer_id)?
                        .map(|c| c.rolling_percentage)
                        .unwrap_or(0.0);
                    TripCustomer {
                        rolling_percentage: Numeric::Value(rate),
                        ..TripCustomer::new(&trip_id, &customer_id)
                    }
                }
            };
            let link = base.with_totals(&totals);
            let db = db.lock().map_err(|_| anyhow!("DB lock poisoned"))?;
            db.upsert_trip_customer(&link)?;
            Ok(link)
        })
        .await
        .map_err(|e| e.to_string())?;
    Ok(link)
}

pub async fn add_expense(payload: AddExpensePayload, state: &AppState) -> Result<Expense, String> {
    if !payload.amount.is_finite() || payload.amount <= 0.0 {
        return Err(ValidationError::NonPositiveAmount {
            field: "amount",
            value: payload.amount,
        }
        .to_string());
    }
    let category = payload.category.trim();
    if category.is_empty() {
        return Err("Expense category is required".to_string());
    }

    let expense = Expense {
        id: new_id(),
        trip_id: payload.trip_id.clone(),
        amount: Numeric::Value(payload.amount),
        category: category.to_string(),
        description: payload.description.clone(),
        recorded_at: chrono::Utc::now(),
        recorded_by: payload.recorded_by.clone(),
    };

    let db = state.db.clone();
    let to_insert = expense.clone();
    state
        .refresher
        .write(&payload.trip_id, || async move {
            let db = db.lock().map_err(|_| anyhow!("DB lock poisoned"))?;
            db.insert_expense(&to_insert)?;
            Ok(())
        })
        .await
        .map_err(|e| e.to_string())?;
    Ok(expense)
}

fn resolve(trip_id: &str, outcome: RefreshOutcome, state: &AppState) -> Result<Arc<TripReport>, String> {
    match outcome {
        RefreshOutcome::Published(report) => Ok(report),
        RefreshOutcome::Superseded => state
            .refresher
            .latest(trip_id)
            .ok_or_else(|| "Trip refresh superseded before any report was published".to_string()),
        RefreshOutcome::NotFound => Err("Trip not found".to_string()),
    }
}

/// Shares as they stand after a committed write. When the refetch failed, or lost
/// to a newer one before anything was published, the stored trip is used instead.
fn sharing_after_write(
    trip_id: &str,
    outcome: anyhow::Result<RefreshOutcome>,
    state: &AppState,
) -> Result<ShareBreakdown, String> {
    match outcome {
        Ok(RefreshOutcome::Published(report)) => return Ok(report.sharing.clone()),
        Ok(RefreshOutcome::NotFound) => return Err("Trip not found".to_string()),
        Ok(RefreshOutcome::Superseded) => {
            if let Some(report) = state.refresher.latest(trip_id) {
                return Ok(report.sharing.clone());
            }
        }
        Err(_) => {}
    }

    let db = state.db.lock().map_err(|_| "DB lock".to_string())?;
    let trip = db
        .get_trip(trip_id)
        .map_err(|e| e.to_string())?
        .ok_or_else(|| "Trip not found".to_string())?;
    let net_result = trip.totals.map(|t| t.net_result).unwrap_or(0.0);
    Ok(compute_agent_shares(net_result, &trip.agents))
}
