use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub whatsapp: WhatsAppConfig,
    pub events: EventsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub max_connections: u32,
    pub connect_timeout_secs: u64,
}

/// Outbound WhatsApp Cloud API credentials. When phone number id or token is
/// absent the server falls back to the no-op gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhatsAppConfig {
    pub api_base: String,
    pub phone_number_id: Option<String>,
    pub access_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsConfig {
    /// Broadcast channel capacity; slow subscribers lag past this.
    pub buffer: usize,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        // Environment defaults first, specific env vars override.
        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        if let Ok(v) = env::var("PORT") {
            self.server.port = v.parse().unwrap_or(self.server.port);
        }
        if let Ok(v) = env::var("DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = v.parse().unwrap_or(self.database.max_connections);
        }
        if let Ok(v) = env::var("DATABASE_CONNECT_TIMEOUT") {
            self.database.connect_timeout_secs =
                v.parse().unwrap_or(self.database.connect_timeout_secs);
        }
        if let Ok(v) = env::var("WHATSAPP_API_BASE") {
            self.whatsapp.api_base = v;
        }
        if let Ok(v) = env::var("WHATSAPP_PHONE_NUMBER_ID") {
            self.whatsapp.phone_number_id = Some(v);
        }
        if let Ok(v) = env::var("WHATSAPP_ACCESS_TOKEN") {
            self.whatsapp.access_token = Some(v);
        }
        if let Ok(v) = env::var("EVENTS_BUFFER") {
            self.events.buffer = v.parse().unwrap_or(self.events.buffer);
        }
        self
    }

    fn development() -> Self {
        Self {
            environment: Environment::Development,
            server: ServerConfig { port: 3000 },
            database: DatabaseConfig { max_connections: 10, connect_timeout_secs: 30 },
            whatsapp: WhatsAppConfig {
                api_base: "https://graph.facebook.com/v19.0".to_string(),
                phone_number_id: None,
                access_token: None,
            },
            events: EventsConfig { buffer: 256 },
        }
    }

    fn staging() -> Self {
        Self {
            environment: Environment::Staging,
            server: ServerConfig { port: 3000 },
            database: DatabaseConfig { max_connections: 20, connect_timeout_secs: 10 },
            whatsapp: WhatsAppConfig {
                api_base: "https://graph.facebook.com/v19.0".to_string(),
                phone_number_id: None,
                access_token: None,
            },
            events: EventsConfig { buffer: 512 },
        }
    }

    fn production() -> Self {
        Self {
            environment: Environment::Production,
            server: ServerConfig { port: 3000 },
            database: DatabaseConfig { max_connections: 50, connect_timeout_secs: 5 },
            whatsapp: WhatsAppConfig {
                api_base: "https://graph.facebook.com/v19.0".to_string(),
                phone_number_id: None,
                access_token: None,
            },
            events: EventsConfig { buffer: 1024 },
        }
    }
}

// Global singleton config - initialized once at startup
pub static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

pub fn config() -> &'static AppConfig {
    &CONFIG
}
