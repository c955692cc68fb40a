use super::commission::rolling_commission;
use super::error::ValidationError;
use super::numeric::NumericMode;
use crate::models::{Expense, FinancialSummary, Trip, TripCustomer};

/// Trip totals with upstream numbers coerced leniently. Never fails.
pub fn compute_trip_financials(trip: &Trip) -> FinancialSummary {
    summarize(&trip.customers, &trip.expenses, NumericMode::Lenient).unwrap_or_default()
}

pub fn compute_trip_financials_strict(trip: &Trip) -> Result<FinancialSummary, ValidationError> {
    summarize(&trip.customers, &trip.expenses, NumericMode::Strict)
}

pub fn compute_trip_financials_with(trip: &Trip, mode: NumericMode) -> Result<FinancialSummary, ValidationError> {
    summarize(&trip.customers, &trip.expenses, mode)
}

pub fn summarize(
    customers: &[TripCustomer],
    expenses: &[Expense],
    mode: NumericMode,
) -> Result<FinancialSummary, ValidationError> {
    let mut total_rolling = 0.0;
    let mut total_win_loss = 0.0;
    let mut total_buy_in = 0.0;
    let mut total_buy_out = 0.0;
    let mut commission = 0.0;

    for customer in customers {
        let owner = format!("customer {}", customer.customer_id);
        let rolling = mode.amount(&customer.rolling_amount, "rolling_amount", &owner)?;
        let rate = mode.percentage(&customer.rolling_percentage, "rolling_percentage", &owner)?;

        total_rolling += rolling;
        total_win_loss += mode.amount(&customer.win_loss, "win_loss", &owner)?;
        total_buy_in += mode.amount(&customer.buy_in_amount, "buy_in_amount", &owner)?;
        total_buy_out += mode.amount(&customer.buy_out_amount, "buy_out_amount", &owner)?;
        commission += rolling_commission(rolling, rate);
    }

    let mut total_expenses = 0.0;
    for expense in expenses {
        total_expenses += mode.amount(&expense.amount, "amount", &format!("expense {}", expense.id))?;
    }

    // Win/loss is stored from the customer's side; the house wins what they lose.
    let house_gross_win = 0.0 - total_win_loss;
    let house_net_win = house_gross_win - commission;

    Ok(FinancialSummary {
        total_rolling,
        total_win_loss,
        total_buy_in,
        total_buy_out,
        total_expenses,
        net_cash_flow: total_buy_out - total_buy_in,
        rolling_commission: commission,
        house_gross_win,
        house_net_win,
        net_result: house_net_win - total_expenses,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Numeric, TripStatus};
    use chrono::{NaiveDate, TimeZone, Utc};

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-6,
            "expected {} but got {}",
            expected,
            actual
        );
    }

    fn trip() -> Trip {
        Trip {
            id: "trip-1".to_string(),
            name: "Macau March".to_string(),
            start_date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            end_date: None,
            status: TripStatus::Ongoing,
            customers: Vec::new(),
            agents: Vec::new(),
            expenses: Vec::new(),
            totals: None,
            created_at: "2024-03-01T00:00:00Z".to_string(),
            updated_at: "2024-03-01T00:00:00Z".to_string(),
        }
    }

    fn customer(id: &str, rolling: f64, win_loss: f64, rate: f64, buy_in: f64, buy_out: f64) -> TripCustomer {
        TripCustomer {
            rolling_amount: rolling.into(),
            win_loss: win_loss.into(),
            rolling_percentage: rate.into(),
            buy_in_amount: buy_in.into(),
            buy_out_amount: buy_out.into(),
            ..TripCustomer::new("trip-1", id)
        }
    }

    fn expense(id: &str, amount: Numeric) -> Expense {
        Expense {
            id: id.to_string(),
            trip_id: "trip-1".to_string(),
            amount,
            category: "hotel".to_string(),
            description: None,
            recorded_at: Utc.with_ymd_and_hms(2024, 3, 2, 12, 0, 0).unwrap(),
            recorded_by: Some("staff-1".to_string()),
        }
    }

    #[test]
    fn empty_trip_is_all_zero() {
        let summary = compute_trip_financials(&trip());
        assert_eq!(summary, FinancialSummary::default());
        assert!(summary.house_gross_win.is_sign_positive());
    }

    #[test]
    fn single_customer_scenario() {
        let mut trip = trip();
        trip.customers.push(customer("c1", 100_000.0, -5_000.0, 1.4, 50_000.0, 45_000.0));
        trip.expenses.push(expense("e1", Numeric::Value(2_000.0)));

        let summary = compute_trip_financials(&trip);
        assert_close(summary.total_rolling, 100_000.0);
        assert_close(summary.total_win_loss, -5_000.0);
        assert_close(summary.total_buy_in, 50_000.0);
        assert_close(summary.total_buy_out, 45_000.0);
        assert_close(summary.total_expenses, 2_000.0);
        assert_close(summary.rolling_commission, 1_400.0);
        assert_close(summary.house_gross_win, 5_000.0);
        assert_close(summary.house_net_win, 3_600.0);
        assert_close(summary.net_result, 1_600.0);
        assert_close(summary.net_cash_flow, -5_000.0);
    }

    #[test]
    fn identities_hold_across_customers() {
        let mut trip = trip();
        trip.customers.push(customer("c1", 250_000.0, 12_000.0, 1.2, 80_000.0, 92_000.0));
        trip.customers.push(customer("c2", 40_000.0, -30_000.0, 0.8, 60_000.0, 30_000.0));
        trip.expenses.push(expense("e1", Numeric::Value(1_500.0)));
        trip.expenses.push(expense("e2", Numeric::Value(700.0)));

        let s = compute_trip_financials(&trip);
        assert_close(s.net_cash_flow, s.total_buy_out - s.total_buy_in);
        assert_close(s.house_net_win, -s.total_win_loss - s.rolling_commission);
        assert_close(s.net_result, s.house_net_win - s.total_expenses);
        assert_close(s.rolling_commission, 250_000.0 * 1.2 / 100.0 + 40_000.0 * 0.8 / 100.0);
    }

    #[test]
    fn unusable_numbers_count_as_zero() {
        let mut trip = trip();
        let mut c = TripCustomer::new("trip-1", "c1");
        c.rolling_amount = Numeric::Malformed("lots".to_string());
        c.win_loss = Numeric::Value(f64::NAN);
        c.buy_in_amount = Numeric::Value(10_000.0);
        trip.customers.push(c);
        trip.expenses.push(expense("e1", Numeric::Missing));

        let s = compute_trip_financials(&trip);
        assert_eq!(s.total_rolling, 0.0);
        assert_eq!(s.total_win_loss, 0.0);
        assert_eq!(s.total_buy_in, 10_000.0);
        assert_eq!(s.total_expenses, 0.0);
        assert_eq!(s.net_cash_flow, -10_000.0);
    }

    #[test]
    fn strict_mode_reports_the_offending_field() {
        let mut trip = trip();
        let mut c = customer("c9", 1_000.0, 0.0, 1.0, 0.0, 0.0);
        c.win_loss = Numeric::Malformed("12,3,4".to_string());
        trip.customers.push(c);

        let err = compute_trip_financials_strict(&trip).unwrap_err();
        assert_eq!(
            err,
            ValidationError::InvalidNumber {
                field: "win_loss",
                owner: "customer c9".to_string(),
                raw: "12,3,4".to_string(),
            }
        );
    }

    #[test]
    fn lenient_clamps_rolling_percentage() {
        let mut trip = trip();
        trip.customers.push(customer("c1", 10_000.0, 0.0, 150.0, 0.0, 0.0));
        let s = compute_trip_financials(&trip);
        assert_close(s.rolling_commission, 10_000.0);
        assert!(compute_trip_financials_strict(&trip).is_err());
    }

    #[test]
    fn repeated_runs_are_identical() {
        let mut trip = trip();
        trip.customers.push(customer("c1", 100_000.0, -5_000.0, 1.4, 50_000.0, 45_000.0));
        trip.expenses.push(expense("e1", Numeric::Value(2_000.0)));
        assert_eq!(compute_trip_financials(&trip), compute_trip_financials(&trip));
    }
}
