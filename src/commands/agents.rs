use serde::Deserialize;
use tracing::info;

use crate::finance::compute_agent_profit;
use crate::models::{Agent, AgentProfit};
use crate::services::state::AppState;
use crate::utils::{new_id, now_rfc3339};

#[derive(Debug, Deserialize)]
pub struct CreateAgentPayload {
    pub name: String,
    pub commission_rate: Option<f64>,
}

pub async fn create_agent(payload: CreateAgentPayload, state: &AppState) -> Result<Agent, String> {
    let name = payload.name.trim();
    if name.is_empty() {
        return Err("Agent name is required".to_string());
    }
    let commission_rate = payload.commission_rate.unwrap_or(0.0);
    if !commission_rate.is_finite() || !(0.0..=100.0).contains(&commission_rate) {
        return Err(format!(
            "Commission rate must be between 0 and 100, got {}",
            commission_rate
        ));
    }

    let agent = Agent {
        id: new_id(),
        name: name.to_string(),
        commission_rate,
        active: true,
        created_at: now_rfc3339(),
    };
    let db = state.db.lock().map_err(|_| "DB lock".to_string())?;
    db.insert_agent(&agent).map_err(|e| e.to_string())?;
    info!(agent_id = %agent.id, "agent created");
    Ok(agent)
}

pub async fn list_agents(state: &AppState) -> Result<Vec<Agent>, String> {
    let db = state.db.lock().map_err(|_| "DB lock".to_string())?;
    db.list_agents().map_err(|e| e.to_string())
}

/// Rolling commission an agent earned across every customer they referred.
pub async fn get_agent_profit(agent_id: &str, state: &AppState) -> Result<AgentProfit, String> {
    let db = state.db.lock().map_err(|_| "DB lock".to_string())?;
    let agent = db
        .get_agent(agent_id)
        .map_err(|e| e.to_string())?
        .ok_or_else(|| "Agent not found".to_string())?;
    let customers = db
        .get_agent_customer_rolling(agent_id)
        .map_err(|e| e.to_string())?;
    Ok(compute_agent_profit(&agent, &customers))
}
