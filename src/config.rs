use std::time::Duration;

use anyhow::Context;
use axum::http::HeaderValue;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub ttl_hours: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CookieConfig {
    pub secure: bool,
}

/// Where uploaded covers and PDFs end up.
#[derive(Debug, Clone, Deserialize)]
pub enum StorageConfig {
    Local {
        root: String,
    },
    S3 {
        endpoint: String,
        bucket: String,
        access_key: String,
        secret_key: String,
        region: String,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub jwt: JwtConfig,
    pub cookie: CookieConfig,
    pub cors_origin: String,
    pub store_timeout_secs: u64,
    pub storage: StorageConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;

        let secret = std::env::var("SECRET").context("SECRET must be set")?;
        anyhow::ensure!(!secret.trim().is_empty(), "SECRET must not be empty");
        let jwt = JwtConfig {
            secret,
            ttl_hours: check_ttl_hours(parse_or("JWT_TTL_HOURS", 72))?,
        };

        let cookie = CookieConfig {
            secure: std::env::var("COOKIE_SECURE")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
        };

        let storage = match std::env::var("STORAGE_BACKEND").as_deref() {
            Ok("s3") => StorageConfig::S3 {
                endpoint: std::env::var("S3_ENDPOINT").context("S3_ENDPOINT must be set")?,
                bucket: std::env::var("S3_BUCKET").context("S3_BUCKET must be set")?,
                access_key: std::env::var("S3_ACCESS_KEY").context("S3_ACCESS_KEY must be set")?,
                secret_key: std::env::var("S3_SECRET_KEY").context("S3_SECRET_KEY must be set")?,
                region: std::env::var("S3_REGION").unwrap_or_else(|_| "us-east-1".into()),
            },
            Ok("local") | Err(_) => StorageConfig::Local {
                root: std::env::var("UPLOAD_DIR").unwrap_or_else(|_| "uploads".into()),
            },
            Ok(other) => anyhow::bail!("unknown STORAGE_BACKEND {other:?}"),
        };

        let cors_origin =
            std::env::var("CORS_ORIGIN").unwrap_or_else(|_| "http://localhost:5173".into());
        check_cors_origin(&cors_origin)?;

        Ok(Self {
            database_url,
            jwt,
            cookie,
            cors_origin,
            store_timeout_secs: parse_or("STORE_TIMEOUT_SECS", 5),
            storage,
        })
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_secs(self.store_timeout_secs)
    }
}

/// One year.
const MAX_TTL_HOURS: i64 = 24 * 365;

fn check_ttl_hours(hours: i64) -> anyhow::Result<i64> {
    anyhow::ensure!(
        (1..=MAX_TTL_HOURS).contains(&hours),
        "JWT_TTL_HOURS must be between 1 and {MAX_TTL_HOURS}, got {hours}"
    );
    Ok(hours)
}

/// Credentialed CORS needs one concrete origin.
fn check_cors_origin(origin: &str) -> anyhow::Result<()> {
    anyhow::ensure!(
        origin.trim() != "*",
        "CORS_ORIGIN must name an origin, not \"*\", since cookies are sent"
    );
    HeaderValue::from_str(origin).context("CORS_ORIGIN is not a valid header value")?;
    Ok(())
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}
