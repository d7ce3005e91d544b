use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub app: AppSettings,
    pub database: DatabaseSettings,
    pub jwt: JwtSettings,
    pub dispatch: DispatchSettings,
    pub email: EmailSettings,
    pub notification: NotificationSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppSettings {
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseSettings {
    pub url: String,
    pub name: String,
    pub max_pool_size: Option<u32>,
    pub min_pool_size: Option<u32>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct JwtSettings {
    pub secret: String,
    pub access_token_ttl_secs: u64,
    pub refresh_token_ttl_secs: u64,
    pub issuer: String,
}

/// Delayed-message dispatch service (holds a payload and calls our webhook
/// back at the scheduled instant, at-least-once).
#[derive(Debug, Deserialize, Clone)]
pub struct DispatchSettings {
    pub base_url: String,
    pub token: String,
    /// Secret used to verify the signature on inbound webhook calls.
    pub webhook_secret: String,
    /// Public URL the dispatch service calls back on.
    pub callback_url: String,
    /// Use the in-memory mock client instead of HTTP (tests, local dev).
    pub mock: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmailSettings {
    pub base_url: String,
    pub api_key: String,
    pub from: String,
    /// Use the in-memory mock provider instead of HTTP (tests, local dev).
    pub mock: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct NotificationSettings {
    /// Fallback "HH:MM" send time (UTC) when a request supplies none and the
    /// target instant has no useful time-of-day.
    pub default_send_time: Option<String>,
}

impl Settings {
    pub fn load() -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(
                Environment::default()
                    .separator("__")
                    .prefix("TASKHUB"),
            )
            .set_default("app.host", "0.0.0.0")?
            .set_default("app.port", 3000)?
            .set_default("app.cors_origins", Vec::<String>::new())?
            .set_default("database.url", "mongodb://localhost:27017")?
            .set_default("database.name", "taskhub")?
            .set_default("jwt.secret", "change-me-in-production")?
            .set_default("jwt.access_token_ttl_secs", 3600)?
            .set_default("jwt.refresh_token_ttl_secs", 604800)?
            .set_default("jwt.issuer", "taskhub")?
            .set_default("dispatch.base_url", "https://dispatch.example.com")?
            .set_default("dispatch.token", "")?
            .set_default("dispatch.webhook_secret", "")?
            .set_default("dispatch.callback_url", "http://localhost:3000/api/webhook/dispatch")?
            .set_default("dispatch.mock", false)?
            .set_default("email.base_url", "https://api.resend.com")?
            .set_default("email.api_key", "")?
            .set_default("email.from", "Taskhub <notifications@taskhub.app>")?
            .set_default("email.mock", false)?
            .set_default("notification.default_send_time", None::<String>)?
            .build()?;

        config.try_deserialize()
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::load().expect("Failed to load default settings")
    }
}
