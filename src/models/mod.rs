use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::finance::NumericMode;
use crate::utils::parse_decimal;

/// A numeric field as it arrives from upstream data.
///
/// Rows fetched from the backend may omit a column, send `null`, send the
/// number as a string, or carry garbage. The finance layer decides what each
/// of these means through [`NumericMode`].
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Numeric {
    #[default]
    Missing,
    Value(f64),
    Malformed(String),
}

impl Numeric {
    pub fn as_option(&self) -> Option<f64> {
        match self {
            Numeric::Value(v) if v.is_finite() => Some(*v),
            _ => None,
        }
    }
}

impl From<f64> for Numeric {
    fn from(value: f64) -> Self {
        Numeric::Value(value)
    }
}

impl From<Option<f64>> for Numeric {
    fn from(value: Option<f64>) -> Self {
        value.map(Numeric::Value).unwrap_or(Numeric::Missing)
    }
}

/// Decodes a plain amount column the way [`Numeric`] does and settles it to a
/// number: anything missing or unreadable counts as 0.
pub fn lenient_amount<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    Ok(Numeric::deserialize(deserializer)?.as_option().unwrap_or(0.0))
}

impl Serialize for Numeric {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Numeric::Missing => serializer.serialize_none(),
            Numeric::Value(v) => serializer.serialize_f64(*v),
            Numeric::Malformed(raw) => serializer.serialize_str(raw),
        }
    }
}

impl<'de> Deserialize<'de> for Numeric {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Option::<Value>::deserialize(deserializer)?;
        Ok(match value {
            None | Some(Value::Null) => Numeric::Missing,
            Some(Value::Number(n)) => match n.as_f64() {
                Some(v) => Numeric::Value(v),
                None => Numeric::Malformed(n.to_string()),
            },
            Some(Value::String(raw)) => {
                let trimmed = raw.trim();
                if trimmed.is_empty() {
                    Numeric::Missing
                } else {
                    match parse_decimal(trimmed) {
                        Ok(v) => Numeric::Value(v),
                        Err(_) => Numeric::Malformed(raw),
                    }
                }
            }
            Some(other) => Numeric::Malformed(other.to_string()),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TripStatus {
    Planned,
    Ongoing,
    Completed,
}

impl TripStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TripStatus::Planned => "planned",
            TripStatus::Ongoing => "ongoing",
            TripStatus::Completed => "completed",
        }
    }
}

impl std::str::FromStr for TripStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "planned" => Ok(TripStatus::Planned),
            "ongoing" => Ok(TripStatus::Ongoing),
            "completed" => Ok(TripStatus::Completed),
            other => Err(format!("Unknown trip status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trip {
    pub id: String,
    pub name: String,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub status: TripStatus,
    #[serde(default)]
    pub customers: Vec<TripCustomer>,
    #[serde(default)]
    pub agents: Vec<TripAgent>,
    #[serde(default)]
    pub expenses: Vec<Expense>,
    #[serde(default)]
    pub totals: Option<FinancialSummary>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TripCustomer {
    pub trip_id: String,
    pub customer_id: String,
    #[serde(default)]
    pub customer_name: Option<String>,
    #[serde(default)]
    pub rolling_amount: Numeric,
    #[serde(default)]
    pub win_loss: Numeric,
    #[serde(default)]
    pub buy_in_amount: Numeric,
    #[serde(default)]
    pub buy_out_amount: Numeric,
    #[serde(default)]
    pub rolling_percentage: Numeric,
}

impl TripCustomer {
    pub fn new(trip_id: &str, customer_id: &str) -> Self {
        TripCustomer {
            trip_id: trip_id.to_string(),
            customer_id: customer_id.to_string(),
            customer_name: None,
            rolling_amount: Numeric::Missing,
            win_loss: Numeric::Missing,
            buy_in_amount: Numeric::Missing,
            buy_out_amount: Numeric::Missing,
            rolling_percentage: Numeric::Missing,
        }
    }

    /// Replaces the per-trip financial fields with totals rolled up from records.
    /// The rolling percentage is kept.
    pub fn with_totals(&self, totals: &CustomerTotals) -> TripCustomer {
        TripCustomer {
            rolling_amount: totals.rolling_amount.into(),
            win_loss: totals.win_loss.into(),
            buy_in_amount: totals.buy_in_amount.into(),
            buy_out_amount: totals.buy_out_amount.into(),
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TripAgent {
    pub trip_id: String,
    pub agent_id: String,
    #[serde(default)]
    pub agent_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_amount")]
    pub share_percentage: f64,
    #[serde(default, deserialize_with = "lenient_amount")]
    pub calculated_share: f64,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Expense {
    pub id: String,
    pub trip_id: String,
    #[serde(default)]
    pub amount: Numeric,
    pub category: String,
    #[serde(default)]
    pub description: Option<String>,
    pub recorded_at: DateTime<Utc>,
    #[serde(default)]
    pub recorded_by: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    pub id: String,
    pub name: String,
    pub agent_id: Option<String>,
    pub rolling_percentage: f64,
    pub active: bool,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    pub name: String,
    pub commission_rate: f64,
    pub active: bool,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Staff {
    pub id: String,
    pub name: String,
    pub role: String,
    pub active: bool,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollingRecord {
    pub id: String,
    pub customer_id: String,
    pub trip_id: Option<String>,
    pub staff_id: String,
    #[serde(default, deserialize_with = "lenient_amount")]
    pub rolling_amount: f64,
    #[serde(default, deserialize_with = "lenient_amount")]
    pub win_loss: f64,
    #[serde(default, deserialize_with = "lenient_amount")]
    pub buy_in_amount: f64,
    #[serde(default, deserialize_with = "lenient_amount")]
    pub buy_out_amount: f64,
    pub game_type: Option<String>,
    pub venue: Option<String>,
    pub table_number: Option<String>,
    pub receipt_hash: Option<String>,
    pub ocr_data: Option<ReceiptExtraction>,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CashDirection {
    #[serde(rename = "buy-in")]
    BuyIn,
    #[serde(rename = "buy-out")]
    BuyOut,
}

impl CashDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            CashDirection::BuyIn => "buy-in",
            CashDirection::BuyOut => "buy-out",
        }
    }
}

impl std::str::FromStr for CashDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "buy-in" | "buyin" | "in" => Ok(CashDirection::BuyIn),
            "buy-out" | "buyout" | "out" => Ok(CashDirection::BuyOut),
            other => Err(format!("Unknown cash direction: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuyInOutRecord {
    pub id: String,
    pub customer_id: String,
    pub trip_id: Option<String>,
    pub staff_id: String,
    pub direction: CashDirection,
    #[serde(default, deserialize_with = "lenient_amount")]
    pub amount: f64,
    pub venue: Option<String>,
    pub table_number: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FinancialSummary {
    pub total_rolling: f64,
    pub total_win_loss: f64,
    pub total_buy_in: f64,
    pub total_buy_out: f64,
    pub total_expenses: f64,
    pub net_cash_flow: f64,
    pub rolling_commission: f64,
    pub house_gross_win: f64,
    pub house_net_win: f64,
    pub net_result: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentShare {
    pub agent_id: String,
    pub agent_name: Option<String>,
    pub share_percentage: f64,
    pub calculated_share: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShareBreakdown {
    pub net_result: f64,
    pub agents: Vec<AgentShare>,
    pub allocated_percentage: f64,
    pub company_percentage: f64,
    pub company_share: f64,
}

/// Rolling volume of one customer under an agent, input to the profit view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerRolling {
    pub customer_id: String,
    pub customer_name: Option<String>,
    #[serde(default)]
    pub rolling_amount: Numeric,
    #[serde(default)]
    pub commission_rate: Numeric,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerCommission {
    pub customer_id: String,
    pub customer_name: Option<String>,
    pub rolling_amount: f64,
    pub commission_rate: f64,
    pub commission_earned: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentProfit {
    pub agent_id: String,
    pub agent_name: String,
    pub customers: Vec<CustomerCommission>,
    pub total_rolling: f64,
    pub total_commission: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CustomerTotals {
    pub customer_id: String,
    pub rolling_amount: f64,
    pub win_loss: f64,
    pub buy_in_amount: f64,
    pub buy_out_amount: f64,
    pub session_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TripReport {
    pub trip_id: String,
    pub trip_name: String,
    pub status: TripStatus,
    pub financials: FinancialSummary,
    pub sharing: ShareBreakdown,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub backend_url: Option<String>,
    pub backend_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub poll_interval_secs: u64,
    pub numeric_mode: NumericMode,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            backend_url: None,
            backend_api_key: None,
            openai_api_key: None,
            poll_interval_secs: 15,
            numeric_mode: NumericMode::Lenient,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiptExtraction {
    pub rolling_amount: Option<f64>,
    pub win_loss: Option<f64>,
    pub buy_in_amount: Option<f64>,
    pub buy_out_amount: Option<f64>,
    pub game_type: Option<String>,
    pub venue: Option<String>,
    pub table_number: Option<String>,
    pub extraction_notes: String,
    pub confidence_score: Option<f64>,
}
