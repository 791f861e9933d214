use config::{Config, ConfigError, Environment};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub booking: BookingConfig,
    pub catalog: CatalogConfig,
    pub email: EmailConfig,
    pub translate: TranslateConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub rust_log: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// Postgres URL, or the literal "memory" for the in-process store.
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BookingConfig {
    /// IANA zone the storefront's wall-clock inputs are interpreted in.
    pub timezone: String,
    /// Shared secret for owner approve/decline actions. Empty means the
    /// owner workflow is disabled and answers 500.
    pub owner_action_token: String,
    /// Submissions completed faster than this are treated as non-human.
    pub min_fill_ms: i64,
    pub idempotency_ttl_hours: i64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CatalogConfig {
    pub base_url: String,
    pub api_token: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmailConfig {
    pub resend_api_key: String,
    pub notify_from: String,
    pub notify_to: String,
    /// Address used in the manual-fallback mailto link on intake errors.
    pub fallback_to: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TranslateConfig {
    pub api_url: String,
    pub api_key: String,
    pub model: String,
}

impl AppConfig {
    pub fn build() -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 3000)?
            .set_default("server.rust_log", "info,sharmar_booking=debug")?
            .set_default("database.url", "memory")?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 2)?
            .set_default("database.connect_timeout", 30)?
            .set_default("booking.timezone", "Europe/Podgorica")?
            .set_default("booking.owner_action_token", "")?
            .set_default("booking.min_fill_ms", 1200)?
            .set_default("booking.idempotency_ttl_hours", 24)?
            .set_default("catalog.base_url", "http://localhost:1337")?
            .set_default("catalog.api_token", "")?
            .set_default("email.resend_api_key", "")?
            .set_default("email.notify_from", "Sharmar <no-reply@sharmar.me>")?
            .set_default("email.notify_to", "")?
            .set_default("email.fallback_to", "booking@sharmar.local")?
            .set_default("translate.api_url", "https://api.openai.com/v1/chat/completions")?
            .set_default("translate.api_key", "")?
            .set_default("translate.model", "gpt-4.1-mini")?
            // E.g. `APP_BOOKING__OWNER_ACTION_TOKEN=...` sets `booking.owner_action_token`.
            .add_source(Environment::default().separator("__").prefix("APP"));

        builder.build()?.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_complete() {
        let config = AppConfig::build().expect("defaults should satisfy every field");
        assert_eq!(config.booking.timezone, "Europe/Podgorica");
        assert_eq!(config.booking.min_fill_ms, 1200);
        assert_eq!(config.booking.idempotency_ttl_hours, 24);
        assert_eq!(config.database.url, "memory");
    }
}
