// Service configuration, loaded with the 'config' crate after '.env'

use anyhow::Result;
use config::{Config, Environment, File};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server_address: String,

    // Managed backend (REST + auth admin API)
    pub backend_url: Option<String>,
    pub backend_api_key: Option<String>,
    pub backend_jwt_secret: Option<String>, // Used to verify admin access tokens
    pub webhook_secret: Option<String>, // Shared secret for change webhooks

    // Payment gateway
    pub payment_public_key: Option<String>,
    pub payment_secret_key: Option<String>, // Only needed for server-side verification
    pub payment_api_url: String,
    pub currency: String,
    pub payment_options: String,
    pub store_title: String,
    pub store_description: String,
    pub store_logo: String,
    pub verify_payments: bool,

    // Storefront
    pub whatsapp_number: String,
    pub placeholder_image: String,

    // Catalog fetch retry policy
    pub fetch_max_attempts: u32,
    pub fetch_base_delay_ms: u64,
}

impl Settings {
    pub fn new() -> Result<Self> {
        dotenv::dotenv().ok(); // Load .env file if present

        let builder = Config::builder()
            .set_default("server_address", "127.0.0.1:3000")?
            .set_default("currency", "NGN")?
            .set_default("payment_api_url", "https://api.flutterwave.com/v3")?
            .set_default("payment_options", "card,mobilemoney,ussd,bank_transfer")?
            .set_default("store_title", "Prosperous Motors")?
            .set_default("store_description", "Premium Luxury Vehicle Purchase")?
            .set_default("store_logo", "https://prospermotors.com/assets/logo.png")?
            .set_default("verify_payments", false)?
            .set_default("whatsapp_number", "2348012345678")?
            .set_default("placeholder_image", "/placeholder.jpg")?
            .set_default("fetch_max_attempts", 3)?
            .set_default("fetch_base_delay_ms", 1000)?
            // Load from a configuration file (e.g., config.toml)
            .add_source(File::with_name("config").required(false))
            // Load from environment variables (e.g., APP_BACKEND_URL, APP_PAYMENT_PUBLIC_KEY)
            .add_source(Environment::with_prefix("APP").separator("__"));

        let settings = builder.build()?.try_deserialize()?;
        Ok(settings)
    }
}

#[cfg(test)]
impl Settings {
    // Settings for unit tests: no external credentials except a gateway key
    pub fn for_tests() -> Self {
        Settings {
            server_address: "127.0.0.1:0".to_string(),
            backend_url: None,
            backend_api_key: None,
            backend_jwt_secret: Some("test-secret".to_string()),
            webhook_secret: Some("hook-secret".to_string()),
            payment_public_key: Some("FLWPUBK_TEST-abc".to_string()),
            payment_secret_key: None,
            payment_api_url: "https://api.flutterwave.com/v3".to_string(),
            currency: "NGN".to_string(),
            payment_options: "card,mobilemoney,ussd,bank_transfer".to_string(),
            store_title: "Prosperous Motors".to_string(),
            store_description: "Premium Luxury Vehicle Purchase".to_string(),
            store_logo: "https://prospermotors.com/assets/logo.png".to_string(),
            verify_payments: false,
            whatsapp_number: "2348012345678".to_string(),
            placeholder_image: "/placeholder.jpg".to_string(),
            fetch_max_attempts: 3,
            fetch_base_delay_ms: 1,
        }
    }
}
