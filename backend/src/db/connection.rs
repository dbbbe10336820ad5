use anyhow::Result;
use sqlx::{PgPool, postgres::PgPoolOptions};
use std::env;
use std::time::Duration;
use dotenvy::dotenv;
use crate::constants::{
    DEFAULT_DB_ACQUIRE_TIMEOUT_SECS, DEFAULT_DB_MAX_CONNECTIONS, MAINTENANCE_DB_MAX_CONNECTIONS,
};

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub database_url: String,
    pub max_connections: u32,
}

impl DatabaseConfig {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        Ok(Self {
            database_url: lookup("DATABASE_URL")
                .ok_or_else(|| anyhow::anyhow!("DATABASE_URL must be set"))?,
            max_connections: lookup("DB_MAX_CONNECTIONS")
                .and_then(|value| value.parse().ok())
                .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS),
        })
    }

    /// Config for one-off maintenance tools. Prefers DATABASE_PUBLIC_URL (prod
    /// access from outside the private network) and falls back to DATABASE_URL.
    pub fn for_maintenance() -> Result<Self> {
        dotenv().ok();
        Self::maintenance_from_lookup(|key| env::var(key).ok())
    }

    pub fn maintenance_from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let database_url = match lookup("DATABASE_PUBLIC_URL") {
            Some(public_url) => {
                tracing::info!("Using DATABASE_PUBLIC_URL for production database access");
                public_url
            }
            None => {
                tracing::info!("Using DATABASE_URL (DATABASE_PUBLIC_URL not set)");
                lookup("DATABASE_URL").ok_or_else(|| {
                    anyhow::anyhow!("DATABASE_PUBLIC_URL or DATABASE_URL must be set")
                })?
            }
        };

        Ok(Self {
            database_url,
            max_connections: MAINTENANCE_DB_MAX_CONNECTIONS,
        })
    }
}

pub async fn get_db_pool(config: &DatabaseConfig) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(DEFAULT_DB_ACQUIRE_TIMEOUT_SECS))
        .connect(&config.database_url)
        .await?;

    tracing::debug!("Database pool ready (max {} connections)", config.max_connections);
    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn test_pool_size_default() {
        let config = DatabaseConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://db/q5"),
            ("DB_MAX_CONNECTIONS", "lots"),
        ]))
        .unwrap();
        assert_eq!(config.max_connections, DEFAULT_DB_MAX_CONNECTIONS);
        assert!(DatabaseConfig::from_lookup(lookup(&[])).is_err());
    }

    #[test]
    fn test_maintenance_accepts_public_url_alone() {
        let config = DatabaseConfig::maintenance_from_lookup(lookup(&[(
            "DATABASE_PUBLIC_URL",
            "postgres://public/q5",
        )]))
        .unwrap();
        assert_eq!(config.database_url, "postgres://public/q5");
        assert_eq!(config.max_connections, MAINTENANCE_DB_MAX_CONNECTIONS);
    }

    #[test]
    fn test_maintenance_prefers_public_url() {
        let config = DatabaseConfig::maintenance_from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://private/q5"),
            ("DATABASE_PUBLIC_URL", "postgres://public/q5"),
        ]))
        .unwrap();
        assert_eq!(config.database_url, "postgres://public/q5");
    }

    #[test]
    fn test_maintenance_falls_back_to_database_url() {
        let config = DatabaseConfig::maintenance_from_lookup(lookup(&[(
            "DATABASE_URL",
            "postgres://private/q5",
        )]))
        .unwrap();
        assert_eq!(config.database_url, "postgres://private/q5");
        assert!(DatabaseConfig::maintenance_from_lookup(lookup(&[])).is_err());
    }
}
