#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![forbid(unsafe_code)]

//! Environment-driven configuration with computed defaults.

use crate::error::{NeighborlyError, Result};

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    /// Organizational email domains admitted by the verifier gate.
    pub allowed_domains: Vec<String>,
    pub verifier_endpoint: String,
    pub classifier_endpoint: Option<String>,
    pub classifier_api_key: Option<String>,
    pub classifier_model: String,
    pub classifier_timeout_ms: u64,
    pub store_connect_timeout_ms: u64,
}

impl Config {
    /// Load from the process environment.
    ///
    /// # Errors
    /// Returns a configuration error when no email domain is
    /// configured: an empty allow-list would admit nobody and a
    /// missing one must not admit everybody.
    pub fn from_env() -> Result<Self> {
        let allowed_domains: Vec<String> = non_empty_env_var("NEIGHBORLY_ALLOWED_DOMAINS")
            .map(|raw| {
                raw.split(',')
                    .map(|d| d.trim().to_string())
                    .filter(|d| !d.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        if allowed_domains.is_empty() {
            return Err(NeighborlyError::ConfigError(
                "NEIGHBORLY_ALLOWED_DOMAINS must list at least one email domain".to_string(),
            ));
        }

        Ok(Self {
            database_url: resolve_database_url(),
            port: parsed_env_var("NEIGHBORLY_PORT").unwrap_or(8080),
            allowed_domains,
            verifier_endpoint: non_empty_env_var("NEIGHBORLY_VERIFIER_URL").unwrap_or_else(
                || "https://www.googleapis.com/oauth2/v3/userinfo".to_string(),
            ),
            classifier_endpoint: non_empty_env_var("NEIGHBORLY_CLASSIFIER_URL"),
            classifier_api_key: non_empty_env_var("NEIGHBORLY_CLASSIFIER_KEY"),
            classifier_model: non_empty_env_var("NEIGHBORLY_CLASSIFIER_MODEL")
                .unwrap_or_else(|| "gpt-4o-mini".to_string()),
            classifier_timeout_ms: parsed_env_var("NEIGHBORLY_CLASSIFIER_TIMEOUT_MS")
                .unwrap_or(8_000),
            store_connect_timeout_ms: parsed_env_var("NEIGHBORLY_DB_CONNECT_TIMEOUT_MS")
                .unwrap_or(3_000),
        })
    }
}

/// DATABASE_URL wins so local shell config works immediately;
/// otherwise the URL is computed from NEIGHBORLY_DB_* parts.
fn resolve_database_url() -> String {
    non_empty_env_var("DATABASE_URL").unwrap_or_else(computed_default_database_url)
}

fn computed_default_database_url() -> String {
    let user = std::env::var("NEIGHBORLY_DB_USER").unwrap_or_else(|_| "neighborly".to_string());
    let pass = std::env::var("NEIGHBORLY_DB_PASSWORD").unwrap_or_else(|_| "neighborly".to_string());
    let host = std::env::var("NEIGHBORLY_DB_HOST").unwrap_or_else(|_| "localhost".to_string());
    let port = std::env::var("NEIGHBORLY_DB_PORT").unwrap_or_else(|_| "5432".to_string());
    let db = std::env::var("NEIGHBORLY_DB_NAME").unwrap_or_else(|_| "neighborly_db".to_string());
    format!("postgres://{user}:{pass}@{host}:{port}/{db}")
}

fn non_empty_env_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parsed_env_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    non_empty_env_var(name).and_then(|value| value.parse::<T>().ok())
}
