use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::info;

use crate::db::Database;
use crate::models::Settings;
use crate::services::crypto::SecretBox;
use crate::services::receipt::{OpenAiReceiptReader, ReceiptReader};
use crate::services::refresher::TripRefresher;
use crate::services::repository::SqliteRepository;

pub struct AppState {
    pub db: Arc<Mutex<Database>>,
    pub settings: Arc<Mutex<Settings>>,
    pub refresher: Arc<TripRefresher>,
    pub secrets: SecretBox,
    receipts: Mutex<Option<Arc<dyn ReceiptReader>>>,
    pollers: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl AppState {
    pub fn new(db: Database, settings: Settings, secrets: SecretBox) -> Self {
        let db = Arc::new(Mutex::new(db));
        let repo = Arc::new(SqliteRepository::new(db.clone()));
        let refresher = Arc::new(TripRefresher::new(repo.clone(), settings.numeric_mode).with_sink(repo));
        let state = AppState {
            db,
            settings: Arc::new(Mutex::new(settings)),
            refresher,
            secrets,
            receipts: Mutex::new(None),
            pollers: Mutex::new(HashMap::new()),
        };
        state.install_receipt_reader();
        state
    }

    pub fn update_settings(&self, settings: Settings) -> Result<()> {
        let interval = Duration::from_secs(settings.poll_interval_secs);
        {
            let mut locked = self.settings.lock().map_err(|_| anyhow!("Settings lock"))?;
            *locked = settings;
        }
        self.install_receipt_reader();
        self.restart_polling(interval)
    }

    pub fn set_receipt_reader(&self, reader: Arc<dyn ReceiptReader>) {
        if let Ok(mut guard) = self.receipts.lock() {
            *guard = Some(reader);
        }
    }

    pub fn receipt_reader(&self) -> Option<Arc<dyn ReceiptReader>> {
        self.receipts.lock().ok().and_then(|guard| guard.clone())
    }

    fn install_receipt_reader(&self) {
        let sealed = self
            .settings
            .lock()
            .ok()
            .and_then(|settings| settings.openai_api_key.clone());
        let Some(sealed) = sealed else {
            return;
        };
        match self.secrets.open(&sealed) {
            Ok(key) => self.set_receipt_reader(Arc::new(OpenAiReceiptReader::new(&key))),
            Err(err) => tracing::warn!("OpenAI key could not be opened: {}", err),
        }
    }

    pub fn poll_interval(&self) -> Result<Duration> {
        let settings = self.settings.lock().map_err(|_| anyhow!("Settings lock"))?;
        Ok(Duration::from_secs(settings.poll_interval_secs))
    }

    /// Starts polling `trip_id`, replacing any poller already running for it.
    pub fn watch_trip(&self, trip_id: &str) -> Result<()> {
        let interval = self.poll_interval()?;
        let handle = self.refresher.spawn_polling(trip_id, interval);
        let mut pollers = self.pollers.lock().map_err(|_| anyhow!("Poller lock"))?;
        if let Some(previous) = pollers.insert(trip_id.to_string(), handle) {
            previous.abort();
        }
        Ok(())
    }

    pub fn unwatch_trip(&self, trip_id: &str) -> Result<bool> {
        let handle = {
            let mut pollers = self.pollers.lock().map_err(|_| anyhow!("Poller lock"))?;
            pollers.remove(trip_id)
        };
        let watched = handle.is_some();
        if let Some(handle) = handle {
            handle.abort();
        }
        self.refresher.prune(trip_id);
        Ok(watched)
    }

    fn restart_polling(&self, interval: Duration) -> Result<()> {
        let mut pollers = self.pollers.lock().map_err(|_| anyhow!("Poller lock"))?;
        let trips: Vec<String> = pollers.keys().cloned().collect();
        for trip_id in trips {
            if let Some(handle) = pollers.remove(&trip_id) {
                handle.abort();
            }
            pollers.insert(trip_id.clone(), self.refresher.spawn_polling(&trip_id, interval));
        }
        if !pollers.is_empty() {
            info!(count = pollers.len(), ?interval, "restarted trip polling");
        }
        Ok(())
    }
}

impl Drop for AppState {
    fn drop(&mut self) {
        if let Ok(pollers) = self.pollers.lock() {
            for handle in pollers.values() {
                handle.abort();
            }
        }
    }
}
