use super::error::ValidationError;
use crate::models::{AgentShare, ShareBreakdown, TripAgent};

/// Slack allowed when comparing a share total against 100%.
const SHARE_EPSILON: f64 = 1e-9;

/// Splits `net_result` between the trip's active agents and the company.
///
/// Percentages are taken as already validated; the company gets whatever the
/// agents do not.
pub fn compute_agent_shares(net_result: f64, agents: &[TripAgent]) -> ShareBreakdown {
    let shares: Vec<AgentShare> = agents
        .iter()
        .filter(|agent| agent.active)
        .map(|agent| AgentShare {
            agent_id: agent.agent_id.clone(),
            agent_name: agent.agent_name.clone(),
            share_percentage: agent.share_percentage,
            calculated_share: net_result * agent.share_percentage / 100.0,
        })
        .collect();

    let allocated_percentage = allocated_percentage(agents);
    let company_percentage = 100.0 - allocated_percentage;

    ShareBreakdown {
        net_result,
        agents: shares,
        allocated_percentage,
        company_percentage,
        company_share: net_result * company_percentage / 100.0,
    }
}

pub fn allocated_percentage(agents: &[TripAgent]) -> f64 {
    agents
        .iter()
        .filter(|agent| agent.active)
        .map(|agent| agent.share_percentage)
        .sum()
}

pub fn validate_share_percentage(percentage: f64) -> Result<f64, ValidationError> {
    if !percentage.is_finite() || percentage <= 0.0 || percentage > 100.0 {
        return Err(ValidationError::InvalidSharePercentage(percentage));
    }
    Ok(percentage)
}

/// Sets one agent's share on a trip, adding the agent if needed.
///
/// Rejects the edit, leaving `agents` untouched, when the percentage is out
/// of range or the active shares would go above 100%.
pub fn set_agent_share(
    agents: &mut Vec<TripAgent>,
    trip_id: &str,
    agent_id: &str,
    percentage: f64,
) -> Result<(), ValidationError> {
    let percentage = validate_share_percentage(percentage)?;

    let others: f64 = agents
        .iter()
        .filter(|agent| agent.active && agent.agent_id != agent_id)
        .map(|agent| agent.share_percentage)
        .sum();
    let total = others + percentage;
    if total > 100.0 + SHARE_EPSILON {
        return Err(ValidationError::ShareCapExceeded { total });
    }

    match agents.iter_mut().find(|agent| agent.agent_id == agent_id) {
        Some(agent) => {
            agent.share_percentage = percentage;
            agent.active = true;
        }
        None => agents.push(TripAgent {
            trip_id: trip_id.to_string(),
            agent_id: agent_id.to_string(),
            agent_name: None,
            share_percentage: percentage,
            calculated_share: 0.0,
            active: true,
        }),
    }
    Ok(())
}

pub fn remove_agent_share(agents: &mut Vec<TripAgent>, agent_id: &str) -> bool {
    let before = agents.len();
    agents.retain(|agent| agent.agent_id != agent_id);
    agents.len() != before
}

pub fn deactivate_agent_share(agents: &mut [TripAgent], agent_id: &str) -> bool {
    match agents.iter_mut().find(|agent| agent.agent_id == agent_id) {
        Some(agent) => {
            agent.active = false;
            agent.calculated_share = 0.0;
            true
        }
        None => false,
    }
}

/// Copies derived amounts from a breakdown onto the agent links.
pub fn apply_calculated_shares(agents: &mut [TripAgent], breakdown: &ShareBreakdown) {
    for agent in agents.iter_mut() {
        agent.calculated_share = breakdown
            .agents
            .iter()
            .find(|share| share.agent_id == agent.agent_id)
            .map(|share| share.calculated_share)
            .unwrap_or(0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent(id: &str, pct: f64) -> TripAgent {
        TripAgent {
            trip_id: "trip-1".to_string(),
            agent_id: id.to_string(),
            agent_name: None,
            share_percentage: pct,
            calculated_share: 0.0,
            active: true,
        }
    }

    fn assert_close(actual: f64, expected: f64) {
        assert!((actual - expected).abs() < 1e-6, "expected {} but got {}", expected, actual);
    }

    #[test]
    fn two_agents_and_company_residual() {
        let agents = vec![agent("a1", 30.0), agent("a2", 20.0)];
        let breakdown = compute_agent_shares(1_600.0, &agents);

        assert_close(breakdown.agents[0].calculated_share, 480.0);
        assert_close(breakdown.agents[1].calculated_share, 320.0);
        assert_close(breakdown.company_percentage, 50.0);
        assert_close(breakdown.company_share, 800.0);
        let total: f64 = breakdown.agents.iter().map(|a| a.calculated_share).sum::<f64>() + breakdown.company_share;
        assert_close(total, 1_600.0);
    }

    #[test]
    fn shares_conserve_negative_results() {
        let agents = vec![agent("a1", 12.5), agent("a2", 33.3), agent("a3", 54.2)];
        let breakdown = compute_agent_shares(-9_875.5, &agents);
        let total: f64 = breakdown.agents.iter().map(|a| a.calculated_share).sum::<f64>() + breakdown.company_share;
        assert_close(total, -9_875.5);
        assert_close(breakdown.company_share, 0.0);
    }

    #[test]
    fn no_agents_leaves_everything_to_the_company() {
        let breakdown = compute_agent_shares(1_600.0, &[]);
        assert!(breakdown.agents.is_empty());
        assert_close(breakdown.company_share, 1_600.0);
    }

    #[test]
    fn inactive_agents_are_ignored() {
        let mut agents = vec![agent("a1", 30.0), agent("a2", 20.0)];
        assert!(deactivate_agent_share(&mut agents, "a2"));
        let breakdown = compute_agent_shares(1_000.0, &agents);
        assert_eq!(breakdown.agents.len(), 1);
        assert_close(breakdown.company_share, 700.0);
    }

    #[test]
    fn out_of_range_updates_leave_shares_unchanged() {
        let mut agents = vec![agent("a1", 30.0)];
        for bad in [0.0, -5.0, 100.5, f64::NAN] {
            assert!(set_agent_share(&mut agents, "trip-1", "a1", bad).is_err());
            assert_eq!(agents.len(), 1);
            assert_eq!(agents[0].share_percentage, 30.0);
        }
    }

    #[test]
    fn updates_that_break_the_cap_are_rejected() {
        let mut agents = vec![agent("a1", 60.0), agent("a2", 30.0)];
        let err = set_agent_share(&mut agents, "trip-1", "a3", 15.0).unwrap_err();
        assert_eq!(err, ValidationError::ShareCapExceeded { total: 105.0 });
        assert_eq!(agents.len(), 2);

        // Replacing an existing share only counts the others.
        set_agent_share(&mut agents, "trip-1", "a2", 40.0).unwrap();
        assert_eq!(agents[1].share_percentage, 40.0);
    }

    #[test]
    fn new_agents_are_appended() {
        let mut agents = Vec::new();
        set_agent_share(&mut agents, "trip-1", "a1", 100.0).unwrap();
        assert_eq!(agents.len(), 1);
        assert!(agents[0].active);
    }

    #[test]
    fn removing_the_last_agent_is_allowed() {
        let mut agents = vec![agent("a1", 25.0)];
        assert!(remove_agent_share(&mut agents, "a1"));
        assert!(agents.is_empty());
        assert!(!remove_agent_share(&mut agents, "a1"));
    }

    #[test]
    fn calculated_shares_are_written_back() {
        let mut agents = vec![agent("a1", 30.0), agent("a2", 20.0)];
        agents[1].active = false;
        let breakdown = compute_agent_shares(1_600.0, &agents);
        apply_calculated_shares(&mut agents, &breakdown);
        assert_close(agents[0].calculated_share, 480.0);
        assert_eq!(agents[1].calculated_share, 0.0);
    }
}
