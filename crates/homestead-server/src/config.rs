use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;

const DEFAULT_ORIGINS: &str = "http://localhost:3000,http://localhost:5173";

#[derive(Debug, Clone)]
pub struct Config {
    pub jwt_secret: String,
    pub db_path: PathBuf,
    pub host: String,
    pub port: u16,
    pub upload_dir: PathBuf,
    pub allowed_origins: Vec<String>,
    pub cookie_secure: bool,
    pub typing_timeout: Duration,
    /// Lowercased.
    pub admin_emails: Vec<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let port = var("HOMESTEAD_PORT", "3001")
            .parse()
            .context("HOMESTEAD_PORT must be a port number")?;
        let typing_secs: u64 = var("HOMESTEAD_TYPING_TIMEOUT_SECS", "5")
            .parse()
            .context("HOMESTEAD_TYPING_TIMEOUT_SECS must be a whole number of seconds")?;

        Ok(Self {
            jwt_secret: var("HOMESTEAD_JWT_SECRET", "dev-secret-change-me"),
            db_path: var("HOMESTEAD_DB_PATH", "homestead.db").into(),
            host: var("HOMESTEAD_HOST", "0.0.0.0"),
            port,
            upload_dir: var("HOMESTEAD_UPLOAD_DIR", "uploads").into(),
            allowed_origins: split_list(&var("HOMESTEAD_ALLOWED_ORIGINS", DEFAULT_ORIGINS)),
            cookie_secure: parse_flag(&var("HOMESTEAD_COOKIE_SECURE", "false")),
            typing_timeout: Duration::from_secs(typing_secs.max(1)),
            admin_emails: split_list(&var("HOMESTEAD_ADMIN_EMAILS", ""))
                .into_iter()
                .map(|e| e.to_lowercase())
                .collect(),
        })
    }

    pub fn addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", self.host, self.port))
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
