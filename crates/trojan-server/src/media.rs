//! Uploaded image storage and signed, expiring media URLs.
//!
//! Images live on local disk under a generated object key. Listings and
//! users persist only the key; every response turns keys into URLs signed
//! with a BLAKE3 keyed hash, and `GET /media/:key` checks that signature
//! before serving bytes.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tokio::fs;
use tracing::{debug, info};

use trojan_shared::constants::MAX_MEDIA_URL_TTL_SECS;

use crate::error::ServerError;

/// Verify that a resolved path stays within the expected base directory.
fn ensure_within(base: &Path, target: &Path) -> Result<PathBuf, ServerError> {
    let canonical_base = base.canonicalize().unwrap_or_else(|_| base.to_path_buf());
    let mut resolved = canonical_base.clone();
    for component in target
        .strip_prefix(base)
        .unwrap_or(target)
        .components()
    {
        match component {
            std::path::Component::Normal(c) => resolved.push(c),
            std::path::Component::ParentDir => {
                return Err(ServerError::Validation("Path traversal detected".to_string()));
            }
            _ => {}
        }
    }
    if !resolved.starts_with(&canonical_base) {
        return Err(ServerError::Validation("Path traversal detected".to_string()));
    }
    Ok(resolved)
}

/// Keep only characters that are safe in both a file name and a URL path.
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .take(100)
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned.to_string()
    }
}

/// A key we generated: non-empty, no separators, no traversal.
fn is_valid_key(key: &str) -> bool {
    !key.is_empty()
        && !key.starts_with('.')
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
}

pub fn content_type_for(key: &str) -> &'static str {
    let ext = key.rsplit('.').next().unwrap_or("").to_ascii_lowercase();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "avif" => "image/avif",
        "svg" => "image/svg+xml",
        _ => "application/octet-stream",
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct MediaStore {
    base_path: PathBuf,
    max_size: usize,
}

impl MediaStore {
    pub async fn new(base_path: PathBuf, max_size: usize) -> Result<Self, ServerError> {
        fs::create_dir_all(&base_path).await.map_err(|e| {
            ServerError::MediaStorage(format!(
                "Failed to create media directory '{}': {}",
                base_path.display(),
                e
            ))
        })?;

        info!(path = %base_path.display(), "Media store initialized");

        Ok(Self {
            base_path,
            max_size,
        })
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Write an upload and return its key, `<unix-millis>_<file name>`.
    pub async fn store(&self, original_name: &str, data: &[u8]) -> Result<String, ServerError> {
        if data.is_empty() {
            return Err(ServerError::Validation(format!(
                "Uploaded file '{original_name}' is empty"
            )));
        }
        if data.len() > self.max_size {
            return Err(ServerError::PayloadTooLarge {
                size: data.len(),
                max: self.max_size,
            });
        }

        let name = sanitize_file_name(original_name);
        let millis = Utc::now().timestamp_millis();
        let mut key = format!("{millis}_{name}");
        let mut attempt = 1;
        while fs::try_exists(self.object_path(&key)?).await.unwrap_or(false) {
            key = format!("{millis}_{attempt}_{name}");
            attempt += 1;
        }

        let path = self.object_path(&key)?;
        fs::write(&path, data).await.map_err(|e| {
            ServerError::MediaStorage(format!("Failed to write media {key}: {e}"))
        })?;

        debug!(key = %key, size = data.len(), "Stored media object");
        Ok(key)
    }

    pub async fn get(&self, key: &str) -> Result<Vec<u8>, ServerError> {
        let path = self.object_path(key)?;

        if !fs::try_exists(&path).await.unwrap_or(false) {
            return Err(ServerError::NotFound(format!("Media {key} not found")));
        }

        let data = fs::read(&path).await.map_err(|e| {
            ServerError::MediaStorage(format!("Failed to read media {key}: {e}"))
        })?;

        debug!(key = %key, size = data.len(), "Read media object");
        Ok(data)
    }

    pub async fn delete(&self, key: &str) -> Result<(), ServerError> {
        let path = self.object_path(key)?;

        if !fs::try_exists(&path).await.unwrap_or(false) {
            return Err(ServerError::NotFound(format!("Media {key} not found")));
        }

        fs::remove_file(&path).await.map_err(|e| {
            ServerError::MediaStorage(format!("Failed to delete media {key}: {e}"))
        })?;

        debug!(key = %key, "Deleted media object");
        Ok(())
    }

    /// Delete every key, logging instead of failing. Used to clean up after
    /// a rejected write or once a listing no longer references an image.
    pub async fn delete_all(&self, keys: &[String]) {
        for key in keys {
            if let Err(e) = self.delete(key).await {
                tracing::warn!(key = %key, error = %e, "Failed to delete media object");
            }
        }
    }

    fn object_path(&self, key: &str) -> Result<PathBuf, ServerError> {
        if !is_valid_key(key) {
            return Err(ServerError::Validation(format!("Invalid media key: {key:?}")));
        }
        ensure_within(&self.base_path, &self.base_path.join(key))
    }
}

// ---------------------------------------------------------------------------
// Signer
// ---------------------------------------------------------------------------

/// Builds and checks expiring media URLs.
#[derive(Clone)]
pub struct MediaSigner {
    key: [u8; 32],
    public_base_url: String,
    ttl_secs: u64,
}

impl MediaSigner {
    pub fn new(key: [u8; 32], public_base_url: &str, ttl_secs: u64) -> Self {
        Self {
            key,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
            ttl_secs: ttl_secs.min(MAX_MEDIA_URL_TTL_SECS),
        }
    }

    /// A URL for `key` valid for the configured lifetime.
    pub fn presign(&self, key: &str) -> String {
        self.presign_at(key, Utc::now())
    }

    pub fn presign_at(&self, key: &str, now: DateTime<Utc>) -> String {
        let ttl = i64::try_from(self.ttl_secs).unwrap_or(i64::MAX);
        let expires = now.timestamp().saturating_add(ttl);
        let sig = self.signature(key, expires);
        format!(
            "{}/media/{}?expires={}&sig={}",
            self.public_base_url,
            key,
            expires,
            sig.to_hex()
        )
    }

    /// `true` if `sig` was produced by this signer for `key` and `expires`
    /// and the expiry has not passed.
    pub fn verify(&self, key: &str, expires: i64, sig: &str) -> bool {
        if Utc::now().timestamp() > expires {
            return false;
        }
        let Ok(bytes) = hex::decode(sig) else {
            return false;
        };
        let Ok(bytes) = <[u8; 32]>::try_from(bytes.as_slice()) else {
            return false;
        };
        // blake3::Hash equality is constant-time.
        blake3::Hash::from(bytes) == self.signature(key, expires)
    }

    fn signature(&self, key: &str, expires: i64) -> blake3::Hash {
        let mut hasher = blake3::Hasher::new_keyed(&self.key);
        hasher.update(key.as_bytes());
        hasher.update(b"\n");
        hasher.update(expires.to_string().as_bytes());
        hasher.finalize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn test_store() -> (MediaStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = MediaStore::new(dir.path().to_path_buf(), 1024).await.unwrap();
        (store, dir)
    }

    fn query_param<'a>(url: &'a str, name: &str) -> &'a str {
        let query = url.split('?').nth(1).unwrap();
        query
            .split('&')
            .find_map(|pair| pair.strip_prefix(&format!("{name}=")))
            .unwrap()
    }

    #[tokio::test]
    async fn test_store_and_get() {
        let (store, _dir) = test_store().await;

        let key = store.store("desk photo.JPG", b"jpeg-bytes").await.unwrap();
        assert!(key.ends_with("_desk_photo.JPG"));
        assert_eq!(store.get(&key).await.unwrap(), b"jpeg-bytes");
    }

    #[tokio::test]
    async fn test_same_name_gets_distinct_keys() {
        let (store, _dir) = test_store().await;
        let a = store.store("lamp.png", b"a").await.unwrap();
        let b = store.store("lamp.png", b"b").await.unwrap();
        assert_ne!(a, b);
        assert_eq!(store.get(&a).await.unwrap(), b"a");
        assert_eq!(store.get(&b).await.unwrap(), b"b");
    }

    #[tokio::test]
    async fn test_delete() {
        let (store, _dir) = test_store().await;
        let key = store.store("x.png", b"delete-me").await.unwrap();

        store.delete(&key).await.unwrap();
        assert!(matches!(store.get(&key).await, Err(ServerError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_rejects_empty_and_oversized() {
        let (store, _dir) = test_store().await;
        assert!(matches!(
            store.store("a.png", b"").await,
            Err(ServerError::Validation(_))
        ));
        assert!(matches!(
            store.store("a.png", &[0u8; 2048]).await,
            Err(ServerError::PayloadTooLarge { size: 2048, max: 1024 })
        ));
    }

    #[tokio::test]
    async fn test_traversal_keys_rejected() {
        let (store, _dir) = test_store().await;
        for key in ["../etc/passwd", "a/b.png", "..", ""] {
            assert!(store.get(key).await.is_err(), "{key}");
        }
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("my desk (1).jpg"), "my_desk__1_.jpg");
        assert_eq!(sanitize_file_name("../../evil.png"), "evil.png");
        assert_eq!(sanitize_file_name("C:\\photos\\a.png"), "a.png");
        assert_eq!(sanitize_file_name(".."), "upload");
        assert_eq!(sanitize_file_name(""), "upload");
    }

    #[test]
    fn test_content_type_for() {
        assert_eq!(content_type_for("1_a.JPG"), "image/jpeg");
        assert_eq!(content_type_for("1_a.png"), "image/png");
        assert_eq!(content_type_for("1_a"), "application/octet-stream");
    }

    #[test]
    fn test_presign_and_verify() {
        let signer = MediaSigner::new([3; 32], "http://localhost:6000/", 3600);
        let url = signer.presign("1700000000000_desk.jpg");
        assert!(url.starts_with("http://localhost:6000/media/1700000000000_desk.jpg?expires="));

        let expires: i64 = query_param(&url, "expires").parse().unwrap();
        let sig = query_param(&url, "sig");
        assert!(signer.verify("1700000000000_desk.jpg", expires, sig));
    }

    #[test]
    fn test_oversized_ttl_is_clamped() {
        let signer = MediaSigner::new([3; 32], "http://localhost:6000", u64::MAX);
        let now = Utc::now();
        let url = signer.presign_at("1_desk.jpg", now);
        let expires: i64 = query_param(&url, "expires").parse().unwrap();
        assert_eq!(expires, now.timestamp() + MAX_MEDIA_URL_TTL_SECS as i64);
        assert!(signer.verify("1_desk.jpg", expires, query_param(&url, "sig")));
    }

    #[test]
    fn test_verify_rejects_wrong_key_object_or_expiry() {
        let signer = MediaSigner::new([3; 32], "http://localhost:6000", 3600);
        let url = signer.presign("1_desk.jpg");
        let expires: i64 = query_param(&url, "expires").parse().unwrap();
        let sig = query_param(&url, "sig");

        let other = MediaSigner::new([4; 32], "http://localhost:6000", 3600);
        assert!(!other.verify("1_desk.jpg", expires, sig));
        assert!(!signer.verify("1_lamp.jpg", expires, sig));
        assert!(!signer.verify("1_desk.jpg", expires + 1, sig));
        assert!(!signer.verify("1_desk.jpg", expires, "zz"));

        let stale = signer.presign_at("1_desk.jpg", Utc::now() - chrono::Duration::hours(2));
        let stale_expires: i64 = query_param(&stale, "expires").parse().unwrap();
        assert!(!signer.verify("1_desk.jpg", stale_expires, query_param(&stale, "sig")));
    }
}
