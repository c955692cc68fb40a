use chrono::Utc;
use serde::Deserialize;
use tracing::{info, warn};

use crate::commands::trips::sync_trip_customer;
use crate::finance::{validate_cash_record, validate_rolling_record};
use crate::models::{BuyInOutRecord, CashDirection, ReceiptExtraction, RollingRecord};
use crate::services::state::AppState;
use crate::utils::{new_id, sha256_bytes};

#[derive(Debug, Clone, Deserialize)]
pub struct RollingPayload {
    pub customer_id: String,
    pub trip_id: Option<String>,
    pub staff_id: String,
    pub rolling_amount: f64,
    pub win_loss: f64,
    #[serde(default)]
    pub buy_in_amount: f64,
    #[serde(default)]
    pub buy_out_amount: f64,
    pub game_type: Option<String>,
    pub venue: Option<String>,
    pub table_number: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CashPayload {
    pub customer_id: String,
    pub trip_id: Option<String>,
    pub staff_id: String,
    pub direction: String,
    pub amount: f64,
    pub venue: Option<String>,
    pub table_number: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReceiptPayload {
    pub customer_id: String,
    pub trip_id: Option<String>,
    pub staff_id: String,
    pub image: Vec<u8>,
    pub mime_type: String,
}

pub async fn record_rolling(payload: RollingPayload, state: &AppState) -> Result<RollingRecord, String> {
    let record = RollingRecord {
        id: new_id(),
        customer_id: payload.customer_id,
        trip_id: payload.trip_id,
        staff_id: payload.staff_id,
        rolling_amount: payload.rolling_amount,
        win_loss: payload.win_loss,
        buy_in_amount: payload.buy_in_amount,
        buy_out_amount: payload.buy_out_amount,
        game_type: payload.game_type,
        venue: payload.venue,
        table_number: payload.table_number,
        receipt_hash: None,
        ocr_data: None,
        recorded_at: Utc::now(),
    };
    store_rolling(record, state).await
}

pub async fn record_buy_in_out(payload: CashPayload, state: &AppState) -> Result<BuyInOutRecord, String> {
    let record = BuyInOutRecord {
        id: new_id(),
        customer_id: payload.customer_id,
        trip_id: payload.trip_id,
        staff_id: payload.staff_id,
        direction: payload.direction.parse::<CashDirection>()?,
        amount: payload.amount,
        venue: payload.venue,
        table_number: payload.table_number,
        recorded_at: Utc::now(),
    };
    validate_cash_record(&record).map_err(|e| e.to_string())?;

    {
        let db = state.db.lock().map_err(|_| "DB lock".to_string())?;
        ensure_customer(&db, &record.customer_id)?;
        ensure_staff(&db, &record.staff_id)?;
        db.insert_cash_record(&record).map_err(|e| e.to_string())?;
    }
    info!(
        record_id = %record.id,
        customer_id = %record.customer_id,
        direction = record.direction.as_str(),
        amount = record.amount,
        "cash record saved"
    );

    sync_after_insert(record.trip_id.as_deref(), &record.customer_id, state).await;
    Ok(record)
}

/// Reads a table receipt and saves the session it describes.
///
/// The extraction is stored alongside the record together with a hash of the
/// image, so the same receipt can be traced back later.
pub async fn record_rolling_from_receipt(payload: ReceiptPayload, state: &AppState) -> Result<RollingRecord, String> {
    if payload.image.is_empty() {
        return Err("Receipt image is empty".to_string());
    }
    let reader = state
        .receipt_reader()
        .ok_or_else(|| "Receipt reading is not configured".to_string())?;

    let extraction = reader
        .read_receipt(&payload.image, &payload.mime_type)
        .await
        .map_err(|e| e.to_string())?;
    let record = record_from_receipt(&payload, extraction)?;
    store_rolling(record, state).await
}

fn record_from_receipt(payload: &ReceiptPayload, extraction: ReceiptExtraction) -> Result<RollingRecord, String> {
    let (Some(rolling_amount), Some(win_loss)) = (extraction.rolling_amount, extraction.win_loss) else {
        warn!(notes = %extraction.extraction_notes, "receipt missing rolling or win/loss");
        return Err("Receipt is missing the rolling amount or win/loss; enter the session manually".to_string());
    };
    Ok(RollingRecord {
        id: new_id(),
        customer_id: payload.customer_id.clone(),
        trip_id: payload.trip_id.clone(),
        staff_id: payload.staff_id.clone(),
        rolling_amount,
        win_loss,
        buy_in_amount: extraction.buy_in_amount.unwrap_or(0.0),
        buy_out_amount: extraction.buy_out_amount.unwrap_or(0.0),
        game_type: extraction.game_type.clone(),
        venue: extraction.venue.clone(),
        table_number: extraction.table_number.clone(),
        receipt_hash: Some(sha256_bytes(&payload.image)),
        ocr_data: Some(extraction),
        recorded_at: Utc::now(),
    })
}

async fn store_rolling(record: RollingRecord, state: &AppState) -> Result<RollingRecord, String> {
    validate_rolling_record(&record).map_err(|e| e.to_string())?;
    {
        let db = state.db.lock().map_err(|_| "DB lock".to_string())?;
        ensure_customer(&db, &record.customer_id)?;
        ensure_staff(&db, &record.staff_id)?;
        db.insert_rolling_record(&record).map_err(|e| e.to_string())?;
    }
    info!(
        record_id = %record.id,
        customer_id = %record.customer_id,
        rolling = record.rolling_amount,
        win_loss = record.win_loss,
        "rolling record saved"
    );

    sync_after_insert(record.trip_id.as_deref(), &record.customer_id, state).await;
    Ok(record)
}

/// The record is already saved at this point, so a failed trip sync is only logged.
/// The next sync of the same customer picks the record up.
async fn sync_after_insert(trip_id: Option<&str>, customer_id: &str, state: &AppState) {
    let Some(trip_id) = trip_id else {
        return;
    };
    if let Err(err) = sync_trip_customer(trip_id, customer_id, state).await {
        warn!(trip_id, customer_id, "trip sync after record failed: {}", err);
    }
}

fn ensure_customer(db: &crate::db::Database, customer_id: &str) -> Result<(), String> {
    match db.get_customer(customer_id).map_err(|e| e.to_string())? {
        Some(_) => Ok(()),
        None => Err("Customer not found".to_string()),
    }
}

fn ensure_staff(db: &crate::db::Database, staff_id: &str) -> Result<(), String> {
    match db.get_staff(staff_id).map_err(|e| e.to_string())? {
        Some(staff) if staff.active => Ok(()),
        Some(_) => Err("Staff member is inactive".to_string()),
        None => Err("Staff not found".to_string()),
    }
}
