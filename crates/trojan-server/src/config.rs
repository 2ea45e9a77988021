//! Server configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the server can start with zero
//! configuration for local development.

use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;

use rand::rngs::OsRng;
use rand::RngCore;
use trojan_shared::constants::{
    DEFAULT_HTTP_PORT, DEFAULT_MEDIA_URL_TTL_SECS, DEFAULT_SESSION_TTL_HOURS,
    KDF_CONTEXT_MEDIA_KEY, KDF_CONTEXT_SESSION_KEY, MAX_MEDIA_URL_TTL_SECS, MAX_SESSION_TTL_HOURS,
    MAX_UPLOAD_SIZE, MAX_UPLOAD_SIZE_LIMIT,
};

/// Server configuration.
#[derive(Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP (axum) API server.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:6000`
    pub http_addr: SocketAddr,

    /// SQLite database file.
    /// Env: `DATABASE_PATH`
    /// Default: `./trojan-trade.db`
    pub database_path: PathBuf,

    /// Directory where uploaded images are stored.
    /// Env: `MEDIA_STORAGE_PATH`
    /// Default: `./media`
    pub media_storage_path: PathBuf,

    /// Maximum size of a single uploaded image in bytes.
    /// Env: `MAX_UPLOAD_SIZE`
    /// Default: 10 MiB
    pub max_upload_size: usize,

    /// Externally reachable base URL, used to build signed media URLs.
    /// Env: `PUBLIC_BASE_URL`
    /// Default: `http://localhost:6000`
    pub public_base_url: String,

    /// Frontend origin allowed to make credentialed CORS requests.
    /// Env: `APP_URL`
    /// Default: none (any origin, no credentials).
    pub app_url: Option<String>,

    /// Root secret from which the session and media keys are derived.
    /// Env: `SECRET_KEY` (64 hex chars)
    /// Default: random per process (sessions do not survive a restart).
    pub secret_key: [u8; 32],

    /// Lifetime of a signed media URL.
    /// Env: `MEDIA_URL_TTL_SECS`
    /// Default: `3600`
    pub media_url_ttl_secs: u64,

    /// Lifetime of a session token.
    /// Env: `SESSION_TTL_HOURS`
    /// Default: `168`
    pub session_ttl_hours: i64,

    /// Mark session cookies `Secure`.
    /// Env: `APP_ENV` (`production` enables it)
    /// Default: `false`
    pub secure_cookies: bool,

    /// SMTP settings; `None` logs e-mails instead of sending them.
    /// Env: `SMTP_HOST`, `SMTP_USERNAME`, `SMTP_PASSWORD`, `EMAIL_FROM`
    pub smtp: Option<SmtpConfig>,

    /// Picture shown for users who never uploaded one.
    /// Env: `DEFAULT_PROFILE_PICTURE_URL`
    pub default_profile_picture_url: String,
}

#[derive(Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub username: String,
    pub password: String,
    pub from: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], DEFAULT_HTTP_PORT).into(),
            database_path: PathBuf::from("./trojan-trade.db"),
            media_storage_path: PathBuf::from("./media"),
            max_upload_size: MAX_UPLOAD_SIZE,
            public_base_url: format!("http://localhost:{DEFAULT_HTTP_PORT}"),
            app_url: None,
            secret_key: random_secret(),
            media_url_ttl_secs: DEFAULT_MEDIA_URL_TTL_SECS,
            session_ttl_hours: DEFAULT_SESSION_TTL_HOURS,
            secure_cookies: false,
            smtp: None,
            default_profile_picture_url: format!(
                "http://localhost:{DEFAULT_HTTP_PORT}/static/default-profile.png"
            ),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("HTTP_ADDR") {
            if let Ok(parsed) = addr.parse::<SocketAddr>() {
                config.http_addr = parsed;
            } else {
                tracing::warn!(value = %addr, "Invalid HTTP_ADDR, using default");
            }
        }

        if let Ok(path) = std::env::var("DATABASE_PATH") {
            config.database_path = PathBuf::from(path);
        }

        if let Ok(path) = std::env::var("MEDIA_STORAGE_PATH") {
            config.media_storage_path = PathBuf::from(path);
        }

        if let Ok(val) = std::env::var("MAX_UPLOAD_SIZE") {
            match val.parse::<usize>() {
                Ok(n) if n > 0 => {
                    config.max_upload_size = capped("MAX_UPLOAD_SIZE", n, MAX_UPLOAD_SIZE_LIMIT)
                }
                _ => tracing::warn!(value = %val, "Invalid MAX_UPLOAD_SIZE, using default"),
            }
        }

        if let Ok(url) = std::env::var("PUBLIC_BASE_URL") {
            config.public_base_url = url.trim_end_matches('/').to_string();
        }

        if let Ok(url) = std::env::var("APP_URL") {
            if !url.is_empty() {
                config.app_url = Some(url.trim_end_matches('/').to_string());
            }
        }

        match std::env::var("SECRET_KEY") {
            Ok(hex_key) => match parse_hex_key(&hex_key) {
                Ok(key) => config.secret_key = key,
                Err(e) => tracing::warn!(
                    error = %e,
                    "Invalid SECRET_KEY, using a random key (sessions will not survive restart)"
                ),
            },
            Err(_) => tracing::warn!(
                "SECRET_KEY not set, using a random key (sessions will not survive restart)"
            ),
        }

        if let Ok(val) = std::env::var("MEDIA_URL_TTL_SECS") {
            match val.parse::<u64>() {
                Ok(n) if n > 0 => {
                    config.media_url_ttl_secs =
                        capped("MEDIA_URL_TTL_SECS", n, MAX_MEDIA_URL_TTL_SECS)
                }
                _ => tracing::warn!(value = %val, "Invalid MEDIA_URL_TTL_SECS, using default"),
            }
        }

        if let Ok(val) = std::env::var("SESSION_TTL_HOURS") {
            match val.parse::<i64>() {
                Ok(n) if n > 0 => {
                    config.session_ttl_hours = capped("SESSION_TTL_HOURS", n, MAX_SESSION_TTL_HOURS)
                }
                _ => tracing::warn!(value = %val, "Invalid SESSION_TTL_HOURS, using default"),
            }
        }

        if let Ok(val) = std::env::var("APP_ENV") {
            config.secure_cookies = val.eq_ignore_ascii_case("production");
        }

        config.smtp = smtp_from_env();

        if let Ok(url) = std::env::var("DEFAULT_PROFILE_PICTURE_URL") {
            config.default_profile_picture_url = url;
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter,
        // so we do not store it here.

        config
    }

    /// Ed25519 seed for signing session tokens.
    pub fn session_key(&self) -> [u8; 32] {
        blake3::derive_key(KDF_CONTEXT_SESSION_KEY, &self.secret_key)
    }

    /// BLAKE3 key for signing media URLs.
    pub fn media_key(&self) -> [u8; 32] {
        blake3::derive_key(KDF_CONTEXT_MEDIA_KEY, &self.secret_key)
    }
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("http_addr", &self.http_addr)
            .field("database_path", &self.database_path)
            .field("media_storage_path", &self.media_storage_path)
            .field("max_upload_size", &self.max_upload_size)
            .field("public_base_url", &self.public_base_url)
            .field("app_url", &self.app_url)
            .field("secret_key", &"<redacted>")
            .field("media_url_ttl_secs", &self.media_url_ttl_secs)
            .field("session_ttl_hours", &self.session_ttl_hours)
            .field("secure_cookies", &self.secure_cookies)
            .field("smtp_host", &self.smtp.as_ref().map(|s| s.host.as_str()))
            .finish()
    }
}

fn smtp_from_env() -> Option<SmtpConfig> {
    let var = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());
    match (
        var("SMTP_HOST"),
        var("SMTP_USERNAME"),
        var("SMTP_PASSWORD"),
        var("EMAIL_FROM"),
    ) {
        (Some(host), Some(username), Some(password), Some(from)) => Some(SmtpConfig {
            host,
            username,
            password,
            from,
        }),
        (None, None, None, None) => None,
        _ => {
            tracing::warn!("Incomplete SMTP settings, e-mails will only be logged");
            None
        }
    }
}

fn capped<T: PartialOrd + fmt::Display>(name: &str, value: T, max: T) -> T {
    if value > max {
        tracing::warn!(value = %value, max = %max, "{name} too large, capping");
        max
    } else {
        value
    }
}

fn random_secret() -> [u8; 32] {
    let mut key = [0u8; 32];
    OsRng.fill_bytes(&mut key);
    key
}

/// Parse a 64-character hex string into a 32-byte array.
fn parse_hex_key(hex: &str) -> Result<[u8; 32], String> {
    let hex = hex.trim();
    if hex.len() != 64 {
        return Err(format!("expected 64 hex chars, got {}", hex.len()));
    }
    let bytes = hex::decode(hex).map_err(|e| format!("invalid hex: {e}"))?;
    let mut key = [0u8; 32];
    key.copy_from_slice(&bytes);
    Ok(key)
}
