use serde::Deserialize;

use crate::models::Staff;
use crate::services::state::AppState;
use crate::utils::{new_id, now_rfc3339};

#[derive(Debug, Deserialize)]
pub struct CreateStaffPayload {
    pub name: String,
    pub role: Option<String>,
}

pub async fn create_staff(payload: CreateStaffPayload, state: &AppState) -> Result<Staff, String> {
    let name = payload.name.trim();
    if name.is_empty() {
        return Err("Staff name is required".to_string());
    }
    let staff = Staff {
        id: new_id(),
        name: name.to_string(),
        role: payload
            .role
            .as_deref()
            .map(str::trim)
            .filter(|role| !role.is_empty())
            .unwrap_or("host")
            .to_string(),
        active: true,
        created_at: now_rfc3339(),
    };
    let db = state.db.lock().map_err(|_| "DB lock".to_string())?;
    db.insert_staff(&staff).map_err(|e| e.to_string())?;
    Ok(staff)
}

pub async fn list_staff(state: &AppState) -> Result<Vec<Staff>, String> {
    let db = state.db.lock().map_err(|_| "DB lock".to_string())?;
    db.list_staff().map_err(|e| e.to_string())
}
