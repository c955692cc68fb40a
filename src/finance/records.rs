use chrono::{DateTime, Utc};

use super::error::ValidationError;
use crate::models::{BuyInOutRecord, CashDirection, CustomerTotals, RollingRecord};

/// Rolls a customer's session and cash records up into per-trip totals.
///
/// Only records for `customer_id` recorded at or after `since` count. Buy-ins
/// and buy-outs come from both the session fields of rolling records and the
/// standalone cash records.
pub fn summarize_customer_records(
    customer_id: &str,
    rolling: &[RollingRecord],
    cash: &[BuyInOutRecord],
    since: Option<DateTime<Utc>>,
) -> CustomerTotals {
    let in_window = |at: &DateTime<Utc>| since.map_or(true, |start| *at >= start);
    let mut totals = CustomerTotals {
        customer_id: customer_id.to_string(),
        ..CustomerTotals::default()
    };

    for record in rolling
        .iter()
        .filter(|r| r.customer_id == customer_id && in_window(&r.recorded_at))
    {
        totals.rolling_amount += record.rolling_amount;
        totals.win_loss += record.win_loss;
        totals.buy_in_amount += record.buy_in_amount;
        totals.buy_out_amount += record.buy_out_amount;
        totals.session_count += 1;
    }

    for record in cash
        .iter()
        .filter(|r| r.customer_id == customer_id && in_window(&r.recorded_at))
    {
        match record.direction {
            CashDirection::BuyIn => totals.buy_in_amount += record.amount,
            CashDirection::BuyOut => totals.buy_out_amount += record.amount,
        }
    }

    totals
}

pub fn validate_rolling_record(record: &RollingRecord) -> Result<(), ValidationError> {
    let checks = [
        ("rolling_amount", record.rolling_amount),
        ("buy_in_amount", record.buy_in_amount),
        ("buy_out_amount", record.buy_out_amount),
    ];
    for (field, value) in checks {
        if !value.is_finite() || value < 0.0 {
            return Err(ValidationError::NegativeAmount { field, value });
        }
    }
    if !record.win_loss.is_finite() {
        return Err(ValidationError::InvalidNumber {
            field: "win_loss",
            owner: format!("rolling record {}", record.id),
            raw: record.win_loss.to_string(),
        });
    }
    Ok(())
}

pub fn validate_cash_record(record: &BuyInOutRecord) -> Result<(), ValidationError> {
    if !record.amount.is_finite() || record.amount <= 0.0 {
        return Err(ValidationError::NonPositiveAmount {
            field: "amount",
            value: record.amount,
        });
    }
    Ok(())
}
