use reader_badge_core::error::CoreError;

use crate::sql::{Tables, DEFAULT_TABLE_PREFIX};

/// Default pool size.
pub const DEFAULT_MAX_CONNECTIONS: u32 = 20;

/// Database configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub tables: Tables,
}

impl DbConfig {
    /// Load configuration from the environment, reading `.env` first if present.
    ///
    /// | Env Var               | Default  |
    /// |-----------------------|----------|
    /// | `DATABASE_URL`        | required |
    /// | `DB_MAX_CONNECTIONS`  | `20`     |
    /// | `READER_TABLE_PREFIX` | `mdl_`   |
    pub fn from_env() -> Result<Self, CoreError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, CoreError> {
        let database_url = lookup("DATABASE_URL")
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| CoreError::Config("DATABASE_URL must be set".to_string()))?;

        let max_connections = match lookup("DB_MAX_CONNECTIONS") {
            Some(v) => v.trim().parse::<u32>().map_err(|_| {
                CoreError::Config(format!("DB_MAX_CONNECTIONS must be a valid u32, got '{v}'"))
            })?,
            None => DEFAULT_MAX_CONNECTIONS,
        };

        let prefix = lookup("READER_TABLE_PREFIX").unwrap_or_else(|| {
            tracing::debug!(
                prefix = DEFAULT_TABLE_PREFIX,
                "READER_TABLE_PREFIX not set, using default"
            );
            DEFAULT_TABLE_PREFIX.to_string()
        });
        let tables = Tables::new(prefix.trim())?;

        Ok(Self {
            database_url,
            max_connections,
            tables,
        })
    }
}
