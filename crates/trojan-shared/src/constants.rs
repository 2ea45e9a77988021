/// Application name
pub const APP_NAME: &str = "Trojan Trade";

/// Name of the cookie carrying the session token
pub const SESSION_COOKIE: &str = "token";

/// Maximum message length in characters
pub const MAX_MESSAGE_LENGTH: usize = 2000;

/// Maximum number of supplemental images accepted per upload
pub const MAX_SUPPLEMENTAL_IMAGES: usize = 10;

/// Number of listings returned by the "top listings" query
pub const TOP_LISTINGS_LIMIT: u32 = 4;

/// Lifetime of a pre-signed media URL, in seconds
pub const DEFAULT_MEDIA_URL_TTL_SECS: u64 = 3600;

/// Upper bound for a configured media URL lifetime (one week)
pub const MAX_MEDIA_URL_TTL_SECS: u64 = 7 * 24 * 3600;

/// Lifetime of a session token, in hours (one week)
pub const DEFAULT_SESSION_TTL_HOURS: i64 = 24 * 7;

/// Upper bound for a configured session lifetime (one year)
pub const MAX_SESSION_TTL_HOURS: i64 = 24 * 365;

/// Default HTTP API port
pub const DEFAULT_HTTP_PORT: u16 = 6000;

/// Maximum size of a single uploaded image (10 MiB)
pub const MAX_UPLOAD_SIZE: usize = 10 * 1024 * 1024;

/// Upper bound for a configured upload size (100 MiB)
pub const MAX_UPLOAD_SIZE_LIMIT: usize = 100 * 1024 * 1024;

/// Key derivation contexts (BLAKE3)
pub const KDF_CONTEXT_SESSION_KEY: &str = "trojan-trade-session-key-v1";
pub const KDF_CONTEXT_MEDIA_KEY: &str = "trojan-trade-media-key-v1";
