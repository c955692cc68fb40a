use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("{field} of {owner} is not a valid number: {raw}")]
    InvalidNumber {
        field: &'static str,
        owner: String,
        raw: String,
    },

    #[error("{field} of {owner} must be between 0 and 100, got {value}")]
    PercentageOutOfRange {
        field: &'static str,
        owner: String,
        value: f64,
    },

    #[error("share percentage must be greater than 0 and at most 100, got {0}")]
    InvalidSharePercentage(f64),

    #[error("agent shares would total {total}%, above 100%")]
    ShareCapExceeded { total: f64 },

    #[error("{field} must be greater than 0, got {value}")]
    NonPositiveAmount { field: &'static str, value: f64 },

    #[error("{field} must not be negative, got {value}")]
    NegativeAmount { field: &'static str, value: f64 },
}
