use crate::time_utils::{parse_zone, LocalZone};
use anyhow::{bail, Context, Result};
use base64::{engine::general_purpose, Engine as _};

const MIN_SESSION_KEY_BYTES: usize = 32;

#[derive(Debug, Clone)]
pub struct BootstrapAdmin {
    pub email: String,
    pub code: String,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub session_key: Vec<u8>,
    pub zone: LocalZone,
    pub bind_addr: String,
    pub admin: Option<BootstrapAdmin>,
    pub production: bool,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup<F>(get: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = get("DATABASE_URL").filter(|url| !url.trim().is_empty());

        let max_connections = match get("DB_MAX_CONNECTIONS") {
            Some(raw) => raw
                .trim()
                .parse::<u32>()
                .with_context(|| format!("DB_MAX_CONNECTIONS must be a positive integer, got {raw:?}"))?,
            None => 10,
        };

        let session_key_b64 = get("SESSION_KEY").context("SESSION_KEY missing")?;
        let session_key = general_purpose::STANDARD
            .decode(session_key_b64.trim())
            .context("SESSION_KEY must be base64")?;
        if session_key.len() < MIN_SESSION_KEY_BYTES {
            bail!(
                "SESSION_KEY must decode to at least {} bytes, got {}",
                MIN_SESSION_KEY_BYTES,
                session_key.len()
            );
        }

        let zone = match get("APP_TIMEZONE") {
            Some(raw) => parse_zone(&raw)
                .with_context(|| format!("APP_TIMEZONE is not a known zone: {raw:?}"))?,
            None => LocalZone::default(),
        };

        let bind_addr = get("BIND_ADDR").unwrap_or_else(|| {
            let port = get("PORT").unwrap_or_else(|| "3000".to_string());
            format!("0.0.0.0:{}", port)
        });

        let admin = match (get("ADMIN_EMAIL"), get("ADMIN_CODE")) {
            (Some(email), Some(code)) => Some(BootstrapAdmin {
                email: email.trim().to_lowercase(),
                code,
                name: get("ADMIN_NAME").unwrap_or_else(|| "Administrator".to_string()),
            }),
            (Some(_), None) => bail!("ADMIN_EMAIL is set but ADMIN_CODE is missing"),
            _ => None,
        };

        Ok(Self {
            database_url,
            max_connections,
            session_key,
            zone,
            bind_addr,
            admin,
            production: get("PRODUCTION").is_some(),
        })
    }
}
