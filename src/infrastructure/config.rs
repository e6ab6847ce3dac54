use std::time::Duration;

use crate::application::party::DEFAULT_ALLOCATION_ATTEMPTS;

const DEFAULT_DATABASE_URL: &str = "sqlite:./data/tideparty.db";
const DEFAULT_JWT_SECRET: &str = "tideparty-secret-key-change-in-production";

/// Which party store backs the server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Sqlite,
    Memory,
}

impl StoreKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreKind::Sqlite => "sqlite",
            StoreKind::Memory => "memory",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" => Some(StoreKind::Sqlite),
            "memory" => Some(StoreKind::Memory),
            _ => None,
        }
    }
}

/// Server configuration, read from the environment
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub jwt_secret: String,
    pub port: u16,
    pub store: StoreKind,
    pub code_allocation_attempts: u32,
    pub finished_party_ttl: Duration,
    pub abandoned_party_ttl: Duration,
    pub reaper_interval: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            jwt_secret: DEFAULT_JWT_SECRET.to_string(),
            port: 9999,
            store: StoreKind::Sqlite,
            code_allocation_attempts: DEFAULT_ALLOCATION_ATTEMPTS,
            finished_party_ttl: Duration::from_secs(60 * 60),
            abandoned_party_ttl: Duration::from_secs(6 * 60 * 60),
            reaper_interval: Duration::from_secs(60),
        }
    }
}

impl AppConfig {
    /// Build from environment variables, falling back to defaults.
    /// Call `dotenvy::dotenv()` first to pick up a `.env` file.
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();

        let database_url = std::env::var("DATABASE_URL")
            .or_else(|_| std::env::var("DB_PATH"))
            .map(|path| {
                // Ensure path has sqlite: prefix
                if path.starts_with("sqlite:") {
                    path
                } else {
                    format!("sqlite:{}", path)
                }
            })
            .unwrap_or(defaults.database_url);

        let jwt_secret = std::env::var("JWT_SECRET").unwrap_or(defaults.jwt_secret);

        let store = match std::env::var("PARTY_STORE") {
            Ok(value) => StoreKind::from_str(&value)
                .ok_or_else(|| anyhow::anyhow!("PARTY_STORE must be 'sqlite' or 'memory', got '{}'", value))?,
            Err(_) => defaults.store,
        };

        Ok(Self {
            database_url,
            jwt_secret,
            port: env_parse("PORT")?.unwrap_or(defaults.port),
            store,
            code_allocation_attempts: env_parse("CODE_ALLOCATION_ATTEMPTS")?
                .unwrap_or(defaults.code_allocation_attempts),
            finished_party_ttl: env_secs("FINISHED_PARTY_TTL_SECS")?
                .unwrap_or(defaults.finished_party_ttl),
            abandoned_party_ttl: env_secs("ABANDONED_PARTY_TTL_SECS")?
                .unwrap_or(defaults.abandoned_party_ttl),
            reaper_interval: env_secs("REAPER_INTERVAL_SECS")?.unwrap_or(defaults.reaper_interval),
        })
    }

    /// In-memory store, no reaper pressure. Used by tests.
    pub fn in_memory() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            store: StoreKind::Memory,
            ..Self::default()
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> anyhow::Result<Option<T>> {
    match std::env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| anyhow::anyhow!("{} has an invalid value: '{}'", key, value)),
        Err(_) => Ok(None),
    }
}

fn env_secs(key: &str) -> anyhow::Result<Option<Duration>> {
    Ok(env_parse::<u64>(key)?.map(Duration::from_secs))
}
