use super::numeric::NumericMode;
use crate::models::{Agent, AgentProfit, CustomerCommission, CustomerRolling};

/// Rebate owed on rolling volume, independent of win/loss.
pub fn rolling_commission(rolling_amount: f64, rate_percentage: f64) -> f64 {
    rolling_amount * rate_percentage / 100.0
}

/// Commission an agent earns across the customers they brought in.
pub fn compute_agent_profit(agent: &Agent, customers: &[CustomerRolling]) -> AgentProfit {
    let mode = NumericMode::Lenient;
    let mut total_rolling = 0.0;
    let mut total_commission = 0.0;

    let breakdown: Vec<CustomerCommission> = customers
        .iter()
        .map(|customer| {
            let owner = format!("customer {}", customer.customer_id);
            let rolling_amount = mode
                .amount(&customer.rolling_amount, "rolling_amount", &owner)
                .unwrap_or(0.0);
            let commission_rate = mode
                .percentage(&customer.commission_rate, "commission_rate", &owner)
                .unwrap_or(0.0);
            let commission_earned = rolling_commission(rolling_amount, commission_rate);
            total_rolling += rolling_amount;
            total_commission += commission_earned;
            CustomerCommission {
                customer_id: customer.customer_id.clone(),
                customer_name: customer.customer_name.clone(),
                rolling_amount,
                commission_rate,
                commission_earned,
            }
        })
        .collect();

    AgentProfit {
        agent_id: agent.id.clone(),
        agent_name: agent.name.clone(),
        customers: breakdown,
        total_rolling,
        total_commission,
    }
}
