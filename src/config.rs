use std::{fmt::Display, path::PathBuf, str::FromStr};

use anyhow::Context;
use tracing::info;

/// Runtime settings, read from the environment (and `.env`) at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Port the HTTP server listens on.
    pub port: u16,
    /// sqlx connection string for the SQLite database.
    pub database_url: String,
    /// Externally visible origin, used for mailed links, OAuth redirects and object URLs.
    pub public_url: String,
    /// Directory holding uploaded objects, one sub-directory per bucket.
    pub storage_dir: PathBuf,
    /// JSON file with OAuth client credentials per provider.
    pub oauth_clients: Option<PathBuf>,
    pub session_idle_minutes: i64,
    /// Delay before a signed-out visitor of the sell page is sent to `/auth`.
    pub sell_redirect_seconds: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            database_url: "sqlite://goodneighbor.db?mode=rwc".to_owned(),
            public_url: "http://localhost:8080".to_owned(),
            storage_dir: PathBuf::from("storage"),
            oauth_clients: None,
            session_idle_minutes: 60,
            sell_redirect_seconds: 2,
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Config::default();

        let port: u16 = load("PORT", defaults.port)?;
        let public_url = dotenv::var("PUBLIC_URL")
            .unwrap_or_else(|_| format!("http://localhost:{port}"))
            .trim_end_matches('/')
            .to_owned();

        Ok(Self {
            port,
            database_url: dotenv::var("DATABASE_URL").unwrap_or(defaults.database_url),
            public_url,
            storage_dir: dotenv::var("STORAGE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.storage_dir),
            oauth_clients: dotenv::var("OAUTH_CLIENTS").ok().map(PathBuf::from),
            session_idle_minutes: load("SESSION_IDLE_MINUTES", defaults.session_idle_minutes)?,
            sell_redirect_seconds: load("SELL_REDIRECT_SECONDS", defaults.sell_redirect_seconds)?,
        })
    }
}

fn load<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr + Display,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match dotenv::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .with_context(|| format!("{key} is not valid: {value:?}")),
        Err(_) => {
            info!("{key} not set, using default: {default}");
            Ok(default)
        }
    }
}
