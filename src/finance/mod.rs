//! Trip financial aggregation and agent profit sharing.
//!
//! Everything in here is a pure function of its inputs. Callers fetch a
//! snapshot, hand it over, and get numbers back; nothing is cached between
//! calls.

pub mod aggregator;
pub mod allocator;
pub mod commission;
pub mod error;
pub mod numeric;
pub mod records;

pub use aggregator::{compute_trip_financials, compute_trip_financials_strict, compute_trip_financials_with};
pub use allocator::{
    apply_calculated_shares, compute_agent_shares, deactivate_agent_share, remove_agent_share, set_agent_share,
    validate_share_percentage,
};
pub use commission::{compute_agent_profit, rolling_commission};
pub use error::ValidationError;
pub use numeric::{safe_number, NumericMode};
pub use records::{summarize_customer_records, validate_cash_record, validate_rolling_record};
