use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result};
use zeroize::Zeroizing;

/// The application's configuration.
#[derive(Clone)]
pub struct Config {
    /// The URL of the PostgreSQL database.
    pub database_url: String,
    /// Maximum number of pooled connections.
    pub db_pool_size: usize,
    /// The address the HTTP server binds to.
    pub bind_addr: SocketAddr,
    /// Whether cookies are marked `secure`.
    pub production: bool,
    /// The lifetime of a session in hours.
    pub session_duration_hours: i64,
    /// Seconds between expired-session sweeps.
    pub session_cleanup_interval_secs: u64,
    /// The email that is promoted to Admin on first sign-in.
    pub admin_email: Option<String>,
    /// Identity provider settings.
    pub oauth: OAuthConfig,
    /// Where uploaded checklist images are written.
    pub upload_dir: PathBuf,
    /// The largest accepted image, in bytes.
    pub max_image_bytes: usize,
    /// Prefix of issued document numbers.
    pub document_prefix: String,
}

/// The identity provider registration.
#[derive(Clone)]
pub struct OAuthConfig {
    pub client_id: String,
    pub tenant_id: String,
    pub client_secret: Zeroizing<String>,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
}

impl Config {
    /// Creates a new `Config` from environment variables.
    pub fn from_env() -> Result<Self> {
        let admin_email = env::var("ADMIN_EMAIL")
            .ok()
            .map(|e| e.trim().to_lowercase())
            .filter(|e| !e.is_empty());

        let scopes = env::var("OAUTH_SCOPES")
            .unwrap_or_else(|_| "openid profile email offline_access User.Read".to_string())
            .split_whitespace()
            .map(str::to_string)
            .collect();

        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            db_pool_size: parse_var("DB_POOL_SIZE", 10)?,
            bind_addr: parse_var("BIND_ADDR", SocketAddr::from(([127, 0, 0, 1], 6060)))?,
            production: env::var("APP_ENV").unwrap_or_else(|_| "development".to_string())
                == "production",
            session_duration_hours: parse_var("SESSION_DURATION_HOURS", 24)?,
            session_cleanup_interval_secs: parse_var("SESSION_CLEANUP_INTERVAL_SECS", 3600)?,
            admin_email,
            oauth: OAuthConfig {
                client_id: env::var("AZURE_CLIENT_ID").context("AZURE_CLIENT_ID must be set")?,
                tenant_id: env::var("AZURE_TENANT_ID").context("AZURE_TENANT_ID must be set")?,
                client_secret: Zeroizing::new(
                    env::var("AZURE_CLIENT_SECRET").context("AZURE_CLIENT_SECRET must be set")?,
                ),
                redirect_uri: env::var("REDIRECT_URI")
                    .unwrap_or_else(|_| "http://localhost:6060/auth/callback".to_string()),
                scopes,
            },
            upload_dir: env::var("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("public/uploads")),
            max_image_bytes: parse_var("MAX_IMAGE_BYTES", 5 * 1024 * 1024)?,
            document_prefix: env::var("DOCUMENT_PREFIX").unwrap_or_else(|_| "AMC".to_string()),
        })
    }

    /// Session lifetime as a `chrono` duration.
    pub fn session_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.session_duration_hours)
    }
}

fn parse_var<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid {}", name)),
        Err(_) => Ok(default),
    }
}
