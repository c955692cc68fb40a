use serde::Deserialize;
use tracing::info;

use crate::finance::summarize_customer_records;
use crate::models::{Customer, CustomerTotals};
use crate::services::state::AppState;
use crate::utils::{new_id, now_rfc3339, parse_date, start_of_day};

#[derive(Debug, Deserialize)]
pub struct CreateCustomerPayload {
    pub name: String,
    pub agent_id: Option<String>,
    pub rolling_percentage: Option<f64>,
}

pub async fn create_customer(payload: CreateCustomerPayload, state: &AppState) -> Result<Customer, String> {
    let name = payload.name.trim();
    if name.is_empty() {
        return Err("Customer name is required".to_string());
    }
    let rolling_percentage = payload.rolling_percentage.unwrap_or(0.0);
    if !rolling_percentage.is_finite() || !(0.0..=100.0).contains(&rolling_percentage) {
        return Err(format!(
            "Rolling percentage must be between 0 and 100, got {}",
            rolling_percentage
        ));
    }

    let db = state.db.lock().map_err(|_| "DB lock".to_string())?;
    if let Some(agent_id) = payload.agent_id.as_deref() {
        if db.get_agent(agent_id).map_err(|e| e.to_string())?.is_none() {
            return Err("Agent not found".to_string());
        }
    }

    let customer = Customer {
        id: new_id(),
        name: name.to_string(),
        agent_id: payload.agent_id.clone(),
        rolling_percentage,
        active: true,
        created_at: now_rfc3339(),
    };
    db.insert_customer(&customer).map_err(|e| e.to_string())?;
    info!(customer_id = %customer.id, "customer created");
    Ok(customer)
}

pub async fn list_customers(agent_id: Option<&str>, state: &AppState) -> Result<Vec<Customer>, String> {
    let db = state.db.lock().map_err(|_| "DB lock".to_string())?;
    db.list_customers(agent_id).map_err(|e| e.to_string())
}

/// A customer's rolled-up session and cash figures, optionally from a date on.
pub async fn get_customer_totals(
    customer_id: &str,
    since: Option<&str>,
    state: &AppState,
) -> Result<CustomerTotals, String> {
    let since = since
        .map(parse_date)
        .transpose()
        .map_err(|e| e.to_string())?
        .map(start_of_day);

    let db = state.db.lock().map_err(|_| "DB lock".to_string())?;
    if db.get_customer(customer_id).map_err(|e| e.to_string())?.is_none() {
        return Err("Customer not found".to_string());
    }
    let rolling = db
        .get_rolling_records(customer_id, since)
        .map_err(|e| e.to_string())?;
    let cash = db
        .get_cash_records(customer_id, since)
        .map_err(|e| e.to_string())?;
    Ok(summarize_customer_records(customer_id, &rolling, &cash, since))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::Settings;
    use crate::services::crypto::SecretBox;

    fn state() -> AppState {
        AppState::new(Database::open_in_memory().unwrap(), Settings::default(), SecretBox::new(b"test"))
    }

    #[tokio::test]
    async fn customer_needs_a_known_agent() {
        let state = state();
        let result = create_customer(
            CreateCustomerPayload {
                name: "Mr. Chan".to_string(),
                agent_id: Some("nobody".to_string()),
                rolling_percentage: None,
            },
            &state,
        )
        .await;
        assert_eq!(result.unwrap_err(), "Agent not found");
    }

    #[tokio::test]
    async fn rolling_percentage_is_bounded() {
        let state = state();
        let result = create_customer(
            CreateCustomerPayload {
                name: "Mr. Chan".to_string(),
                agent_id: None,
                rolling_percentage: Some(140.0),
            },
            &state,
        )
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn new_customer_has_empty_totals() {
        let state = state();
        let customer = create_customer(
            CreateCustomerPayload {
                name: " Mr. Chan ".to_string(),
                agent_id: None,
                rolling_percentage: Some(1.2),
            },
            &state,
        )
        .await
        .unwrap();
        assert_eq!(customer.name, "Mr. Chan");
        assert_eq!(list_customers(None, &state).await.unwrap().len(), 1);

        let totals = get_customer_totals(&customer.id, Some("2024-03-01"), &state)
            .await
            .unwrap();
        assert_eq!(totals.session_count, 0);
        assert_eq!(totals.rolling_amount, 0.0);
    }
}
