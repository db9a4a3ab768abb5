use std::env;
use std::path::PathBuf;

use crate::error::{Result, ShopError};

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// MongoDB connection string. The in-memory store is used when unset.
    pub database_url: Option<String>,
    pub database_name: String,
    pub jwt_secret: String,
    pub token_ttl_hours: i64,
    /// JSON catalog loaded into the store at startup.
    pub seed_file: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let host = optional("HOST").unwrap_or_else(|| "127.0.0.1".to_string());
        let port = parse_or("PORT", 8080u16)?;
        let database_url = optional("DATABASE_URL");
        let database_name =
            optional("DATABASE_NAME").unwrap_or_else(|| "honey_kitchen".to_string());
        let jwt_secret = optional("JWT_SECRET")
            .ok_or_else(|| ShopError::Config("JWT_SECRET must be set".to_string()))?;
        let token_ttl_hours = parse_or("TOKEN_TTL_HOURS", 1i64)?;
        if token_ttl_hours < 1 {
            return Err(ShopError::Config(
                "TOKEN_TTL_HOURS must be at least 1".to_string(),
            ));
        }
        let seed_file = optional("SEED_FILE").map(PathBuf::from);

        log::info!("Configuration loaded, binding to {host}:{port}");

        Ok(Self {
            host,
            port,
            database_url,
            database_name,
            jwt_secret,
            token_ttl_hours,
            seed_file,
        })
    }

    /// Settings for tests and local tooling: memory store, fixed secret.
    pub fn for_tests() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            database_url: None,
            database_name: "honey_kitchen_test".to_string(),
            jwt_secret: "test-secret".to_string(),
            token_ttl_hours: 1,
            seed_file: None,
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_or<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match optional(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| ShopError::Config(format!("Invalid {key} value {raw:?}: {e}"))),
        None => Ok(default),
    }
}
