use serde::{Deserialize, Serialize};

use super::error::ValidationError;
use crate::models::Numeric;

/// How upstream numeric fields are turned into amounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NumericMode {
    /// Missing, malformed and non-finite values count as zero; percentages are clamped.
    #[default]
    Lenient,
    /// Malformed and non-finite values are rejected; missing values still count as zero.
    Strict,
}

impl NumericMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            NumericMode::Lenient => "lenient",
            NumericMode::Strict => "strict",
        }
    }

    pub fn amount(self, value: &Numeric, field: &'static str, owner: &str) -> Result<f64, ValidationError> {
        match (self, value) {
            (_, Numeric::Missing) => Ok(0.0),
            (_, Numeric::Value(v)) if v.is_finite() => Ok(*v),
            (NumericMode::Lenient, _) => Ok(0.0),
            (NumericMode::Strict, Numeric::Value(v)) => Err(ValidationError::InvalidNumber {
                field,
                owner: owner.to_string(),
                raw: v.to_string(),
            }),
            (NumericMode::Strict, Numeric::Malformed(raw)) => Err(ValidationError::InvalidNumber {
                field,
                owner: owner.to_string(),
                raw: raw.clone(),
            }),
        }
    }

    pub fn percentage(self, value: &Numeric, field: &'static str, owner: &str) -> Result<f64, ValidationError> {
        let pct = self.amount(value, field, owner)?;
        match self {
            NumericMode::Lenient => Ok(pct.clamp(0.0, 100.0)),
            NumericMode::Strict if (0.0..=100.0).contains(&pct) => Ok(pct),
            NumericMode::Strict => Err(ValidationError::PercentageOutOfRange {
                field,
                owner: owner.to_string(),
                value: pct,
            }),
        }
    }
}

impl std::str::FromStr for NumericMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lenient" => Ok(NumericMode::Lenient),
            "strict" => Ok(NumericMode::Strict),
            other => Err(format!("Unknown numeric mode: {}", other)),
        }
    }
}

pub fn safe_number(value: &Numeric) -> f64 {
    value.as_option().unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lenient_zeroes_anything_unusable() {
        let mode = NumericMode::Lenient;
        assert_eq!(mode.amount(&Numeric::Missing, "x", "o").unwrap(), 0.0);
        assert_eq!(mode.amount(&Numeric::Value(f64::NAN), "x", "o").unwrap(), 0.0);
        assert_eq!(mode.amount(&Numeric::Value(f64::INFINITY), "x", "o").unwrap(), 0.0);
        assert_eq!(mode.amount(&Numeric::Malformed("abc".into()), "x", "o").unwrap(), 0.0);
        assert_eq!(mode.amount(&Numeric::Value(-12.5), "x", "o").unwrap(), -12.5);
    }

    #[test]
    fn strict_rejects_malformed_and_non_finite() {
        let mode = NumericMode::Strict;
        assert_eq!(mode.amount(&Numeric::Missing, "x", "o").unwrap(), 0.0);
        let err = mode
            .amount(&Numeric::Malformed("12abc".into()), "win_loss", "customer c1")
            .unwrap_err();
        assert_eq!(
            err,
            ValidationError::InvalidNumber {
                field: "win_loss",
                owner: "customer c1".to_string(),
                raw: "12abc".to_string(),
            }
        );
        assert!(mode.amount(&Numeric::Value(f64::NAN), "x", "o").is_err());
    }

    #[test]
    fn percentages_clamp_or_reject() {
        let value = Numeric::Value(140.0);
        assert_eq!(NumericMode::Lenient.percentage(&value, "p", "o").unwrap(), 100.0);
        assert_eq!(NumericMode::Lenient.percentage(&Numeric::Value(-3.0), "p", "o").unwrap(), 0.0);
        assert!(matches!(
            NumericMode::Strict.percentage(&value, "p", "o"),
            Err(ValidationError::PercentageOutOfRange { .. })
        ));
        assert_eq!(NumericMode::Strict.percentage(&Numeric::Value(1.4), "p", "o").unwrap(), 1.4);
    }

    #[test]
    fn safe_number_falls_back_to_zero() {
        assert_eq!(safe_number(&Numeric::Value(3.5)), 3.5);
        assert_eq!(safe_number(&Numeric::Malformed("-".into())), 0.0);
    }
}
