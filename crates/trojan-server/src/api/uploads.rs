//! Raw image upload, URL presigning and signed media delivery.

use axum::{
    extract::{Multipart, Path, Query, State},
    http::header,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info};
use trojan_store::object_key;

use super::AppState;
use crate::error::ServerError;
use crate::form::MultipartForm;
use crate::media::content_type_for;

#[derive(Deserialize)]
pub struct PresignRequest {
    #[serde(default)]
    thumbnails: Vec<String>,
}

#[derive(Deserialize)]
pub struct SignListingsRequest {
    #[serde(default)]
    listings: Vec<Map<String, Value>>,
}

#[derive(Deserialize)]
pub struct SignatureParams {
    expires: Option<i64>,
    sig: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    success: bool,
    key: String,
    image_url: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PresignedUrl {
    original_url: String,
    presigned_url: String,
}

pub async fn upload(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<UploadResponse>, ServerError> {
    let form = MultipartForm::read(multipart, state.media.max_size()).await?;
    let file = form
        .file("listing")
        .ok_or_else(|| ServerError::Validation("listing image is required".into()))?;

    let key = state.media.store(&file.file_name, &file.data).await?;
    info!(key = %key, size = file.data.len(), "Image uploaded");

    Ok(Json(UploadResponse {
        success: true,
        image_url: state.signer.presign(&key),
        key,
    }))
}

pub async fn generate_presigned_urls(
    State(state): State<AppState>,
    Json(req): Json<PresignRequest>,
) -> Json<Vec<PresignedUrl>> {
    let urls = req
        .thumbnails
        .into_iter()
        .map(|original| PresignedUrl {
            presigned_url: state.signer.presign(object_key(&original)),
            original_url: original,
        })
        .collect();
    Json(urls)
}

/// Attach fresh `thumbnailUrl` and `supplementalImagesUrls` to listing
/// objects the client already holds. Other fields pass through untouched.
pub async fn sign_listings(
    State(state): State<AppState>,
    Json(req): Json<SignListingsRequest>,
) -> Result<Json<Vec<Map<String, Value>>>, ServerError> {
    let presign = |reference: &Value| {
        reference
            .as_str()
            .map(|r| Value::String(state.signer.presign(object_key(r))))
            .ok_or_else(|| ServerError::Validation("image references must be strings".into()))
    };

    let mut signed = Vec::with_capacity(req.listings.len());
    for mut listing in req.listings {
        let thumbnail_url = match listing.get("thumbnail") {
            Some(thumbnail) => presign(thumbnail)?,
            None => return Err(ServerError::Validation("every listing needs a thumbnail".into())),
        };
        let supplemental_urls = match listing.get("supplementalImages") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(images)) => images.iter().map(presign).collect::<Result<_, _>>()?,
            Some(_) => {
                return Err(ServerError::Validation(
                    "supplementalImages must be an array".into(),
                ))
            }
        };
        listing.insert("thumbnailUrl".into(), thumbnail_url);
        listing.insert("supplementalImagesUrls".into(), Value::Array(supplemental_urls));
        signed.push(listing);
    }
    Ok(Json(signed))
}

pub async fn serve_media(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(params): Query<SignatureParams>,
) -> Result<impl IntoResponse, ServerError> {
    let (Some(expires), Some(sig)) = (params.expires, params.sig) else {
        return Err(ServerError::Forbidden("Missing media signature".into()));
    };
    if !state.signer.verify(&key, expires, &sig) {
        debug!(key = %key, "Rejected media request with bad or expired signature");
        return Err(ServerError::Forbidden("Invalid or expired media signature".into()));
    }

    let data = state.media.get(&key).await?;
    Ok((
        [
            (header::CONTENT_TYPE, content_type_for(&key)),
            (header::CACHE_CONTROL, "private, max-age=300"),
        ],
        data,
    ))
}
