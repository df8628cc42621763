use anyhow::Context;
use serde::Deserialize;

/// Upper bound for `JWT_TTL_MINUTES` (30 days).
pub const MAX_JWT_TTL_MINUTES: i64 = 60 * 24 * 30;
/// Upper bound for `RESET_TOKEN_TTL_HOURS` (30 days).
pub const MAX_RESET_TTL_HOURS: i64 = 24 * 30;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
}

/// Where user and token rows live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Postgres,
    Memory,
}

impl std::str::FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "pg" => Ok(Self::Postgres),
            "memory" | "mem" => Ok(Self::Memory),
            other => anyhow::bail!("unknown STORAGE_BACKEND `{other}`"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MailConfig {
    pub from: String,
    /// Prefix the reset token is appended to in recovery emails.
    pub reset_url_base: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub storage: StorageBackend,
    pub database_url: String,
    pub db_max_connections: u32,
    pub jwt: JwtConfig,
    pub reset_token_ttl_hours: i64,
    pub mail: MailConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let storage = std::env::var("STORAGE_BACKEND")
            .unwrap_or_else(|_| "postgres".into())
            .parse::<StorageBackend>()?;
        let database_url = match storage {
            StorageBackend::Postgres => std::env::var("DATABASE_URL").context("DATABASE_URL")?,
            StorageBackend::Memory => std::env::var("DATABASE_URL").unwrap_or_default(),
        };
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET").context("JWT_SECRET")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "libris".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "libris-users".into()),
            ttl_minutes: env_parse("JWT_TTL_MINUTES", 60),
        };
        let mail = MailConfig {
            from: std::env::var("MAIL_FROM").unwrap_or_else(|_| "no-reply@libris.local".into()),
            reset_url_base: std::env::var("RESET_URL_BASE")
                .unwrap_or_else(|_| "http://localhost:3000/reset-password?token=".into()),
        };
        let config = Self {
            storage,
            database_url,
            db_max_connections: env_parse("DB_MAX_CONNECTIONS", 10),
            jwt,
            reset_token_ttl_hours: env_parse("RESET_TOKEN_TTL_HOURS", 24),
            mail,
        };
        config.validate()?;
        Ok(config)
    }

    /// Rejects lifetimes that would expire instantly or overflow timestamp math.
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            (1..=MAX_RESET_TTL_HOURS).contains(&self.reset_token_ttl_hours),
            "RESET_TOKEN_TTL_HOURS must be within 1..={MAX_RESET_TTL_HOURS}, got {}",
            self.reset_token_ttl_hours
        );
        anyhow::ensure!(
            (1..=MAX_JWT_TTL_MINUTES).contains(&self.jwt.ttl_minutes),
            "JWT_TTL_MINUTES must be within 1..={MAX_JWT_TTL_MINUTES}, got {}",
            self.jwt.ttl_minutes
        );
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}
