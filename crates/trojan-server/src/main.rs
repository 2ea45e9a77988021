//! # trojan-server
//!
//! HTTP backend for the Trojan Trade student marketplace.
//!
//! This binary provides:
//! - **Listings**: create, edit and delete with image uploads, plus browse,
//!   search and top-listing queries
//! - **Likes** with a per-listing counter kept in step with each user's
//!   liked set
//! - **Conversations** between buyers and sellers, one thread per listing,
//!   with e-mail notifications
//! - **Accounts**: signup, login and Ed25519-signed session cookies
//! - **Media**: local image storage served through expiring signed URLs

mod api;
mod config;
mod error;
mod form;
mod mailer;
mod media;
mod password;
mod session;
mod views;

use std::sync::{Arc, Mutex};

use tracing::info;
use tracing_subscriber::EnvFilter;
use trojan_store::Database;

use crate::api::AppState;
use crate::config::ServerConfig;
use crate::mailer::Mailer;
use crate::media::{MediaSigner, MediaStore};
use crate::session::SessionManager;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,trojan_server=debug")),
        )
        .init();

    info!("Starting Trojan Trade server v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");

    // -----------------------------------------------------------------------
    // 3. Initialize subsystems
    // -----------------------------------------------------------------------

    // Database (creates the file and runs migrations)
    let db = Database::open_at(&config.database_path)?;
    info!(path = %config.database_path.display(), "Database ready");

    // Media store (creates directory if missing)
    let media = Arc::new(
        MediaStore::new(config.media_storage_path.clone(), config.max_upload_size).await?,
    );

    let signer = Arc::new(MediaSigner::new(
        config.media_key(),
        &config.public_base_url,
        config.media_url_ttl_secs,
    ));

    let sessions = Arc::new(SessionManager::new(
        config.session_key(),
        config.session_ttl_hours,
        config.secure_cookies,
    ));

    let mailer = Mailer::from_config(config.smtp.as_ref())?;

    let http_addr = config.http_addr;
    let app_state = AppState {
        db: Arc::new(Mutex::new(db)),
        media,
        signer,
        sessions,
        mailer,
        config: Arc::new(config),
    };

    // -----------------------------------------------------------------------
    // 4. Run the HTTP API server (blocks until shutdown)
    // -----------------------------------------------------------------------
    tokio::select! {
        result = api::serve(app_state, http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
