use std::sync::{Arc, Mutex};

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use trojan_shared::constants::MAX_SUPPLEMENTAL_IMAGES;
use trojan_store::Database;

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::mailer::Mailer;
use crate::media::{MediaSigner, MediaStore};
use crate::session::SessionManager;
use crate::views::MediaResolver;

mod accounts;
mod listings;
mod messaging;
mod uploads;


#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Mutex<Database>>,
    pub media: Arc<MediaStore>,
    pub signer: Arc<MediaSigner>,
    pub sessions: Arc<SessionManager>,
    pub mailer: Mailer,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    /// Run a synchronous store call under the database lock.
    pub fn with_db<T>(
        &self,
        f: impl FnOnce(&mut Database) -> Result<T, ServerError>,
    ) -> Result<T, ServerError> {
        let mut db = self
            .db
            .lock()
            .map_err(|_| ServerError::Internal("database lock poisoned".into()))?;
        f(&mut *db)
    }

    pub fn resolver(&self) -> MediaResolver<'_> {
        MediaResolver {
            signer: &self.signer,
            default_profile_picture_url: &self.config.default_profile_picture_url,
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let body_limit = state
        .config
        .max_upload_size
        .saturating_mul(MAX_SUPPLEMENTAL_IMAGES + 2);

    let api = Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        // Accounts
        .route("/signup", post(accounts::signup))
        .route("/login", post(accounts::login))
        .route("/logout", post(accounts::logout))
        .route("/user", get(accounts::current_user))
        .route("/upload-profile-picture", post(accounts::upload_profile_picture))
        .route("/get-seller-details", post(accounts::seller_details))
        // Listings
        .route("/addlisting", post(listings::add_listing))
        .route("/edit-listing", post(listings::edit_listing))
        .route("/remove-listing", post(listings::remove_listing))
        .route("/like", post(listings::like))
        .route("/unlike", post(listings::unlike))
        .route("/all-listings", get(listings::all_listings))
        .route("/search", get(listings::search))
        .route("/top-listings", get(listings::top_listings))
        .route("/listing/:id", get(listings::get_listing))
        .route("/seller-listings/:user_id", get(listings::seller_listings))
        .route("/liked-listings/:user_id", get(listings::liked_listings))
        .route("/categories", get(listings::categories))
        // Messaging
        .route("/sendMessage", post(messaging::send_message))
        .route("/conversations", get(messaging::list_conversations))
        .route("/conversations/:id", get(messaging::get_conversation))
        // Media
        .route("/upload", post(uploads::upload))
        .route("/generatePresignedUrls", post(uploads::generate_presigned_urls))
        .route("/make-presignedURLs", post(uploads::sign_listings));

    Router::new()
        .nest("/api", api)
        .route("/media/:key", get(uploads::serve_media))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors_layer(&state.config))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(config: &ServerConfig) -> CorsLayer {
    let methods = [Method::GET, Method::POST, Method::OPTIONS];

    if let Some(origin) = &config.app_url {
        match HeaderValue::from_str(origin) {
            Ok(origin) => {
                return CorsLayer::new()
                    .allow_origin(origin)
                    .allow_methods(methods)
                    .allow_headers([header::CONTENT_TYPE])
                    .allow_credentials(true);
            }
            Err(e) => warn!(origin = %origin, error = %e, "Invalid APP_URL, allowing any origin"),
        }
    }

    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(methods)
        .allow_headers(Any)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn root() -> &'static str {
    "Trojan Trade API is running"
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
