use dotenvy::dotenv;
use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server_port: u16,
    pub database_url: String,
    pub gateway_base_url: String,
    pub gateway_server_key: String,
    /// Shared secret for HMAC verification of gateway callbacks.
    pub gateway_webhook_secret: String,
    pub admin_token: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv().ok(); // Load .env file if present

        Ok(Config {
            server_port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()?,
            database_url: env::var("DATABASE_URL")?,
            gateway_base_url: env::var("GATEWAY_BASE_URL")?,
            gateway_server_key: env::var("GATEWAY_SERVER_KEY")?,
            gateway_webhook_secret: env::var("GATEWAY_WEBHOOK_SECRET")?,
            admin_token: env::var("ADMIN_TOKEN")?,
        })
    }
}
