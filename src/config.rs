use anyhow::Result;
use dotenvy::dotenv;
use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server_port: u16,
    pub database_url: String,
    pub frontend_base_url: String,
    pub gateway_pay_url: String,
    pub gateway_merchant_code: String,
    pub gateway_hash_secret: String,
    pub gateway_return_url: String,
    pub email_service_url: Option<String>,
    pub qr_service_url: Option<String>,
    pub hold_ttl_secs: i64,
    pub sweep_interval_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok(); // Load .env file if present

        Ok(Config {
            server_port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()?,
            database_url: env::var("DATABASE_URL")?,
            frontend_base_url: env::var("FRONTEND_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            gateway_pay_url: env::var("GATEWAY_PAY_URL")?,
            gateway_merchant_code: env::var("GATEWAY_MERCHANT_CODE")?,
            gateway_hash_secret: env::var("GATEWAY_HASH_SECRET")?,
            gateway_return_url: env::var("GATEWAY_RETURN_URL")?,
            email_service_url: env::var("EMAIL_SERVICE_URL").ok(),
            qr_service_url: env::var("QR_SERVICE_URL").ok(),
            hold_ttl_secs: env::var("HOLD_TTL_SECS")
                .unwrap_or_else(|_| "900".to_string())
                .parse()?,
            sweep_interval_secs: env::var("SWEEP_INTERVAL_SECS")
                .unwrap_or_else(|_| "60".to_string())
                .parse()?,
        })
    }
}
