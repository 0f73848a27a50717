//! Configuration management

use std::str::FromStr;

use anyhow::{self, Context, Result};

const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// NATS server URL
    pub nats_url: String,

    /// `postgres` or `memory`
    pub store_backend: String,

    /// PostgreSQL connection string (required by the postgres backend)
    pub database_url: Option<String>,

    /// Branches created at startup
    pub seed_branches: Vec<String>,

    /// JWT secret key shared with the identity provider
    pub jwt_secret: String,

    /// Start processing right after upload
    pub background_processing: bool,

    /// Upload cap for spreadsheets and documents
    pub max_upload_bytes: usize,

    pub import_progress_every: usize,
    pub import_retry_attempts: u32,
    pub import_retry_delay_ms: u64,

    /// Blob store root for membership documents
    pub documents_dir: String,
    pub documents_base_url: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let nats_url = var("NATS_URL").unwrap_or_else(|| "nats://localhost:4222".to_string());

        let store_backend = var("STORE_BACKEND")
            .map(|b| b.trim().to_ascii_lowercase())
            .unwrap_or_else(|| "postgres".to_string());

        let database_url = var("DATABASE_URL");
        if store_backend == "postgres" && database_url.is_none() {
            anyhow::bail!("DATABASE_URL must be set when STORE_BACKEND=postgres");
        }

        let seed_branches = var("SEED_BRANCHES")
            .map(|list| {
                list.split(',')
                    .map(str::trim)
                    .filter(|b| !b.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let jwt_secret = var("JWT_SECRET")
            .context("JWT_SECRET must be set to the identity provider's signing key")?;

        if jwt_secret.len() < 32 {
            anyhow::bail!(
                "JWT_SECRET must be at least 32 bytes (current: {} bytes)",
                jwt_secret.len()
            );
        }

        const KNOWN_DEV_SECRETS: &[&str] = &["dev-secret-change-in-production-min-32-bytes!!"];
        if KNOWN_DEV_SECRETS.contains(&jwt_secret.as_str()) {
            tracing::warn!("JWT_SECRET matches a known default, change it for production!");
        }

        let background_processing = match var("BACKGROUND_PROCESSING") {
            Some(v) => parse_bool(&v)
                .with_context(|| format!("BACKGROUND_PROCESSING must be true or false, got '{}'", v))?,
            None => true,
        };

        Ok(Self {
            nats_url,
            store_backend,
            database_url,
            seed_branches,
            jwt_secret,
            background_processing,
            max_upload_bytes: parse_or(var("MAX_UPLOAD_BYTES"), "MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES)?,
            import_progress_every: parse_or(var("IMPORT_PROGRESS_EVERY"), "IMPORT_PROGRESS_EVERY", 10)?,
            import_retry_attempts: parse_or(var("IMPORT_RETRY_ATTEMPTS"), "IMPORT_RETRY_ATTEMPTS", 2)?,
            import_retry_delay_ms: parse_or(var("IMPORT_RETRY_DELAY_MS"), "IMPORT_RETRY_DELAY_MS", 1000)?,
            documents_dir: var("DOCUMENTS_DIR").unwrap_or_else(|| "./documents".to_string()),
            documents_base_url: var("DOCUMENTS_BASE_URL").unwrap_or_else(|| "/documents".to_string()),
        })
    }
}

fn parse_or<T>(value: Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match value {
        Some(v) => v
            .trim()
            .parse()
            .with_context(|| format!("{} has an invalid value '{}'", key, v)),
        None => Ok(default),
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const SECRET: &str = "test-secret-key-for-jwt-at-least-32-bytes-long";

    fn load(vars: &[(&str, &str)]) -> Result<Config> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_config_defaults_for_memory_backend() {
        let config = load(&[("STORE_BACKEND", "memory"), ("JWT_SECRET", SECRET)]).unwrap();
        assert_eq!(config.nats_url, "nats://localhost:4222");
        assert_eq!(config.store_backend, "memory");
        assert!(config.database_url.is_none());
        assert!(config.background_processing);
        assert_eq!(config.max_upload_bytes, 10 * 1024 * 1024);
        assert_eq!(config.import_progress_every, 10);
        assert_eq!(config.import_retry_attempts, 2);
        assert_eq!(config.import_retry_delay_ms, 1000);
        assert_eq!(config.documents_dir, "./documents");
        assert_eq!(config.documents_base_url, "/documents");
    }

    #[test]
    fn test_config_postgres_requires_database_url() {
        assert!(load(&[("JWT_SECRET", SECRET)]).is_err());
        let config = load(&[("JWT_SECRET", SECRET), ("DATABASE_URL", "postgres://test")]).unwrap();
        assert_eq!(config.store_backend, "postgres");
        assert_eq!(config.database_url.as_deref(), Some("postgres://test"));
    }

    #[test]
    fn test_config_rejects_short_or_missing_secret() {
        assert!(load(&[("STORE_BACKEND", "memory")]).is_err());
        assert!(load(&[("STORE_BACKEND", "memory"), ("JWT_SECRET", "short")]).is_err());
    }

    #[test]
    fn test_config_parses_overrides() {
        let config = load(&[
            ("STORE_BACKEND", "Memory"),
            ("JWT_SECRET", SECRET),
            ("SEED_BRANCHES", "Downtown, Uptown,,"),
            ("BACKGROUND_PROCESSING", "false"),
            ("MAX_UPLOAD_BYTES", "2048"),
            ("IMPORT_PROGRESS_EVERY", "25"),
        ])
        .unwrap();
        assert_eq!(config.store_backend, "memory");
        assert_eq!(config.seed_branches, vec!["Downtown", "Uptown"]);
        assert!(!config.background_processing);
        assert_eq!(config.max_upload_bytes, 2048);
        assert_eq!(config.import_progress_every, 25);
    }

    #[test]
    fn test_config_rejects_malformed_numbers() {
        let err = load(&[
            ("STORE_BACKEND", "memory"),
            ("JWT_SECRET", SECRET),
            ("IMPORT_RETRY_ATTEMPTS", "many"),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("IMPORT_RETRY_ATTEMPTS"));
    }
}
