use std::path::Path;
use std::sync::Arc;

use async_broadcast::{broadcast, InactiveReceiver, Sender, TrySendError};

use crate::domain::repositories::PartyStore;
use crate::infrastructure::auth::JwtService;
use crate::infrastructure::config::{AppConfig, StoreKind};
use crate::infrastructure::database::repositories::{InMemoryPartyStore, SqlitePartyStore};

/// Capacity of the activity feed; slow listeners lose the oldest events
const EVENT_BUS_CAPACITY: usize = 1000;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,

    /// JWT service for token management
    pub jwt_service: Arc<JwtService>,

    /// Real-time party store
    pub party_store: Arc<dyn PartyStore>,

    /// Activity feed for SSE
    pub event_sender: Sender<PartyEvent>,
    /// Keeps the feed open while nobody listens
    pub event_receiver: InactiveReceiver<PartyEvent>,
}

impl AppState {
    /// Build state from environment configuration
    pub async fn new() -> anyhow::Result<Self> {
        Self::from_config(AppConfig::from_env()?).await
    }

    pub async fn from_config(config: AppConfig) -> anyhow::Result<Self> {
        let party_store: Arc<dyn PartyStore> = match config.store {
            StoreKind::Memory => {
                tracing::info!("Using in-memory party store");
                Arc::new(InMemoryPartyStore::new())
            }
            StoreKind::Sqlite => {
                ensure_database_dir(&config.database_url).await?;
                tracing::info!("Connecting to database: {}", config.database_url);
                Arc::new(SqlitePartyStore::connect(&config.database_url).await?)
            }
        };

        let jwt_service = Arc::new(JwtService::new(config.jwt_secret.clone()));

        let (mut event_sender, event_receiver) = broadcast(EVENT_BUS_CAPACITY);
        event_sender.set_overflow(true);
        let event_receiver = event_receiver.deactivate();

        Ok(Self {
            config,
            jwt_service,
            party_store,
            event_sender,
            event_receiver,
        })
    }

    /// Broadcast an event to all connected SSE clients
    pub fn broadcast_event(&self, event: PartyEvent) {
        let receiver_count = self.event_sender.receiver_count();
        tracing::debug!(
            "Broadcasting event '{}' for party {} to {} receivers",
            event.action,
            event.party_code,
            receiver_count
        );
        match self.event_sender.try_broadcast(event) {
            Ok(None) => {}
            Ok(Some(_)) => {
                tracing::debug!("Event broadcast successfully with overflow");
            }
            Err(TrySendError::Inactive(_)) => {
                tracing::debug!("Event broadcast but no active receivers");
            }
            Err(e) => {
                tracing::warn!("Failed to broadcast event: {:?}", e);
            }
        }
    }
}

/// Create the parent directory of a file-backed sqlite url
async fn ensure_database_dir(database_url: &str) -> anyhow::Result<()> {
    if database_url.contains(":memory:") {
        return Ok(());
    }
    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:");
    let path = path.split('?').next().unwrap_or(path);

    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    Ok(())
}

/// Party activity event for SSE broadcasting
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PartyEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub party_code: String,
    pub user_id: Option<String>,
    pub action: String,
    /// Additional data fields (flattened into root)
    #[serde(flatten)]
    pub data: serde_json::Value,
    pub timestamp: i64,
}

impl PartyEvent {
    pub fn new(party_code: &str, action: &str, user_id: Option<String>) -> Self {
        Self {
            event_type: "partyUpdate".to_string(),
            party_code: party_code.to_string(),
            user_id,
            action: action.to_string(),
            data: serde_json::Value::Object(serde_json::Map::new()),
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }
}
