use serde::Deserialize;

use crate::db::Database;
use crate::finance::NumericMode;
use crate::models::Settings;
use crate::services::crypto::SecretBox;
use crate::services::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct SettingsPayload {
    pub backend_url: Option<String>,
    pub backend_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub poll_interval_secs: Option<u64>,
    pub numeric_mode: Option<String>,
}

pub fn load_settings(db: &Database) -> Settings {
    let defaults = Settings::default();
    let backend_url = db.get_setting("backend_url").ok().flatten();
    let backend_api_key = db.get_setting("backend_api_key").ok().flatten();
    let openai_api_key = db.get_setting("openai_api_key").ok().flatten();
    let poll_interval_secs = db
        .get_setting("poll_interval_secs")
        .ok()
        .flatten()
        .and_then(|value| value.parse::<u64>().ok())
        .unwrap_or(defaults.poll_interval_secs);
    let numeric_mode = db
        .get_setting("numeric_mode")
        .ok()
        .flatten()
        .and_then(|value| value.parse::<NumericMode>().ok())
        .unwrap_or(defaults.numeric_mode);
    Settings {
        backend_url,
        backend_api_key,
        openai_api_key,
        poll_interval_secs,
        numeric_mode,
    }
}

/// Settings as stored; credentials stay sealed.
pub async fn get_settings(state: &AppState) -> Result<Settings, String> {
    let db = state.db.lock().map_err(|_| "DB lock".to_string())?;
    Ok(load_settings(&db))
}

pub async fn save_settings(payload: SettingsPayload, state: &AppState) -> Result<Settings, String> {
    {
        let db = state.db.lock().map_err(|_| "DB lock".to_string())?;

        if let Some(value) = payload.backend_url.as_deref() {
            db.set_setting("backend_url", value.trim()).map_err(|e| e.to_string())?;
        }
        if let Some(value) = payload.poll_interval_secs {
            if !(10..=30).contains(&value) {
                return Err(format!("Poll interval must be between 10 and 30 seconds, got {}", value));
            }
            db.set_setting("poll_interval_secs", &value.to_string())
                .map_err(|e| e.to_string())?;
        }
        if let Some(value) = payload.numeric_mode.as_deref() {
            let mode = value.parse::<NumericMode>()?;
            db.set_setting("numeric_mode", mode.as_str()).map_err(|e| e.to_string())?;
        }
        for (key, secret) in [
            ("backend_api_key", payload.backend_api_key.as_deref()),
            ("openai_api_key", payload.openai_api_key.as_deref()),
        ] {
            if let Some(secret) = secret.filter(|s| !s.trim().is_empty()) {
                let sealed = seal(&state.secrets, secret.trim())?;
                db.set_setting(key, &sealed).map_err(|e| e.to_string())?;
            }
        }
    }

    let settings = get_settings(state).await?;
    state
        .update_settings(settings.clone())
        .map_err(|e| e.to_string())?;
    Ok(settings)
}

fn seal(secrets: &SecretBox, value: &str) -> Result<String, String> {
    secrets.seal(value).map_err(|e| e.to_string())
}
