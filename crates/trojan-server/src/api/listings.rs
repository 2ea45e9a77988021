//! Listing lifecycle, likes and browse endpoints.

use std::collections::HashSet;

use axum::{
    extract::{Multipart, Path, Query, State},
    http::HeaderMap,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use trojan_shared::constants::{MAX_SUPPLEMENTAL_IMAGES, TOP_LISTINGS_LIMIT};
use trojan_shared::{Category, ListingId, UserId};
use trojan_store::{object_key, DeleteReport, Listing, ListingPatch, ListingQuery, NewListing};

use super::AppState;
use crate::error::ServerError;
use crate::form::{MultipartForm, UploadedFile};
use crate::media::MediaStore;
use crate::views::ListingView;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveListingRequest {
    #[serde(default)]
    listing_id: String,
    #[serde(default)]
    user_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LikeRequest {
    #[serde(default)]
    listing_id: String,
}

#[derive(Deserialize)]
pub struct BrowseParams {
    category: Option<String>,
    query: Option<String>,
}

#[derive(Serialize)]
pub struct CreatedResponse {
    success: bool,
    name: String,
    listing: ListingView,
}

#[derive(Serialize)]
pub struct EditedResponse {
    message: &'static str,
    listing: ListingView,
}

#[derive(Serialize)]
pub struct RemovedResponse {
    message: &'static str,
    removed: DeleteReport,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LikeResponse {
    success: bool,
    liked: bool,
    num_likes: u32,
}

/// Write uploads to the media store. If any write fails the ones already
/// written are removed again.
async fn store_files(
    media: &MediaStore,
    files: &[&UploadedFile],
) -> Result<Vec<String>, ServerError> {
    let mut keys = Vec::with_capacity(files.len());
    for file in files {
        match media.store(&file.file_name, &file.data).await {
            Ok(key) => keys.push(key),
            Err(e) => {
                media.delete_all(&keys).await;
                return Err(e);
            }
        }
    }
    Ok(keys)
}

fn media_keys(listing: &Listing) -> Vec<String> {
    std::iter::once(listing.thumbnail.as_str())
        .chain(listing.supplemental_images.iter().map(String::as_str))
        .map(|reference| object_key(reference).to_string())
        .collect()
}

/// The session user acts on listings. A `userId` sent by the client must
/// name that same user.
fn acting_user(session_user: UserId, claimed: Option<&str>) -> Result<UserId, ServerError> {
    let Some(claimed) = claimed.filter(|c| !c.trim().is_empty()) else {
        return Ok(session_user);
    };
    if UserId::parse(claimed)? != session_user {
        return Err(ServerError::Forbidden(
            "userId does not match the signed-in user".into(),
        ));
    }
    Ok(session_user)
}

pub async fn add_listing(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<Json<CreatedResponse>, ServerError> {
    let token = state.sessions.authenticate(&headers)?;
    let form = MultipartForm::read(multipart, state.media.max_size()).await?;

    let seller = acting_user(token.user_id, form.text("userId"))?;
    let name = form.require("name")?.to_string();
    let price = form
        .price("price")?
        .ok_or_else(|| ServerError::Validation("price is required".into()))?;
    let category = form
        .category("category")?
        .ok_or_else(|| ServerError::Validation("category is required".into()))?;
    let condition = form.require("condition")?.to_string();
    let description = form.text("description").unwrap_or("").to_string();

    let thumbnail = form
        .file("thumbnail")
        .ok_or_else(|| ServerError::Validation("thumbnail image is required".into()))?;
    let mut files = vec![thumbnail];
    files.extend(form.files("supplementalImages"));
    if files.len() - 1 > MAX_SUPPLEMENTAL_IMAGES {
        return Err(ServerError::Validation(format!(
            "at most {MAX_SUPPLEMENTAL_IMAGES} supplemental images are allowed"
        )));
    }

    // Fail before touching the media store if the seller is unknown.
    state.with_db(|db| Ok(db.get_user(seller).map(|_| ())?))?;

    let written = store_files(&state.media, &files).await?;
    let thumbnail_key = written[0].clone();
    let supplemental_images = written[1..].to_vec();

    let created = state.with_db(|db| {
        Ok(db.create_listing(NewListing {
            seller,
            name,
            thumbnail: thumbnail_key,
            supplemental_images,
            category,
            price,
            condition,
            description,
        })?)
    });
    let listing = match created {
        Ok(listing) => listing,
        Err(e) => {
            state.media.delete_all(&written).await;
            return Err(e);
        }
    };

    info!(listing = %listing.id, seller = %seller, name = %listing.name, "Listing created");
    Ok(Json(CreatedResponse {
        success: true,
        name: listing.name.clone(),
        listing: state.resolver().listing(listing),
    }))
}

pub async fn edit_listing(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<Json<EditedResponse>, ServerError> {
    let token = state.sessions.authenticate(&headers)?;
    let form = MultipartForm::read(multipart, state.media.max_size()).await?;

    let user_id = acting_user(token.user_id, form.text("userId"))?;
    let listing_id = ListingId::parse(form.text("listingId").unwrap_or(""))?;
    let mut patch = ListingPatch {
        name: form.text("name").map(str::to_string),
        description: form.text("description").map(str::to_string),
        price: form.price("price")?,
        category: form.category("category")?,
        condition: form.text("condition").map(str::to_string),
        thumbnail: None,
        available: form.flag("available")?,
    };
    let images_to_remove = form.string_list("imagesToRemove")?;

    // Ownership is checked again inside the store transaction; checking here
    // keeps a rejected edit from writing files.
    let before = state.with_db(|db| Ok(db.get_listing(listing_id)?))?;
    if before.seller != user_id {
        return Err(ServerError::Forbidden(
            "Only the seller can edit this listing".into(),
        ));
    }

    let new_thumbnail = form.file("thumbnail");
    let mut files: Vec<&UploadedFile> = new_thumbnail.into_iter().collect();
    files.extend(form.files("supplementalImages"));
    let written = store_files(&state.media, &files).await?;

    let mut added = written.clone();
    if new_thumbnail.is_some() {
        patch.thumbnail = Some(added.remove(0));
    }

    let edited = state.with_db(|db| {
        Ok(db.edit_listing(listing_id, user_id, patch, added, &images_to_remove)?)
    });
    let listing = match edited {
        Ok(listing) => listing,
        Err(e) => {
            state.media.delete_all(&written).await;
            return Err(e);
        }
    };

    let still_used: HashSet<String> = media_keys(&listing).into_iter().collect();
    let orphaned: Vec<String> = media_keys(&before)
        .into_iter()
        .filter(|key| !still_used.contains(key))
        .collect();
    state.media.delete_all(&orphaned).await;

    info!(listing = %listing.id, user = %user_id, orphaned = orphaned.len(), "Listing updated");
    Ok(Json(EditedResponse {
        message: "Listing updated successfully",
        listing: state.resolver().listing(listing),
    }))
}

pub async fn remove_listing(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<RemoveListingRequest>,
) -> Result<Json<RemovedResponse>, ServerError> {
    let token = state.sessions.authenticate(&headers)?;
    let listing_id = ListingId::parse(&req.listing_id)?;
    let user_id = acting_user(token.user_id, Some(req.user_id.as_str()))?;

    let (keys, report) = state.with_db(|db| {
        let listing = db.get_listing(listing_id)?;
        let report = db.delete_listing(listing_id, user_id)?;
        Ok((media_keys(&listing), report))
    })?;

    state.media.delete_all(&keys).await;

    info!(listing = %listing_id, user = %user_id, ?report, "Listing removed");
    Ok(Json(RemovedResponse {
        message: "Listing deleted successfully",
        removed: report,
    }))
}

pub async fn like(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<LikeRequest>,
) -> Result<Json<LikeResponse>, ServerError> {
    let token = state.sessions.authenticate(&headers)?;
    let listing_id = ListingId::parse(&req.listing_id)?;
    let outcome = state.with_db(|db| Ok(db.like(token.user_id, listing_id)?))?;
    Ok(Json(LikeResponse {
        success: true,
        liked: outcome.liked,
        num_likes: outcome.num_likes,
    }))
}

pub async fn unlike(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<LikeRequest>,
) -> Result<Json<LikeResponse>, ServerError> {
    let token = state.sessions.authenticate(&headers)?;
    let listing_id = ListingId::parse(&req.listing_id)?;
    let outcome = state.with_db(|db| Ok(db.unlike(token.user_id, listing_id)?))?;
    Ok(Json(LikeResponse {
        success: true,
        liked: outcome.liked,
        num_likes: outcome.num_likes,
    }))
}

pub async fn all_listings(
    State(state): State<AppState>,
    Query(params): Query<BrowseParams>,
) -> Result<Json<Vec<ListingView>>, ServerError> {
    let query = ListingQuery {
        category: Category::parse_filter(params.category.as_deref())?,
        text: None,
    };
    let listings = state.with_db(|db| Ok(db.list_listings(&query)?))?;
    Ok(Json(state.resolver().listings(listings)))
}

pub async fn search(
    State(state): State<AppState>,
    Query(params): Query<BrowseParams>,
) -> Result<Json<Vec<ListingView>>, ServerError> {
    let query = ListingQuery {
        category: Category::parse_filter(params.category.as_deref())?,
        text: params
            .query
            .map(|q| q.trim().to_string())
            .filter(|q| !q.is_empty()),
    };
    let listings = state.with_db(|db| Ok(db.list_listings(&query)?))?;
    Ok(Json(state.resolver().listings(listings)))
}

pub async fn top_listings(
    State(state): State<AppState>,
) -> Result<Json<Vec<ListingView>>, ServerError> {
    let listings = state.with_db(|db| Ok(db.top_listings(TOP_LISTINGS_LIMIT)?))?;
    Ok(Json(state.resolver().listings(listings)))
}

pub async fn get_listing(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ListingView>, ServerError> {
    let id = ListingId::parse(&id)?;
    let listing = state.with_db(|db| Ok(db.get_listing(id)?))?;
    Ok(Json(state.resolver().listing(listing)))
}

pub async fn seller_listings(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<ListingView>>, ServerError> {
    let user_id = UserId::parse(&user_id)?;
    let listings = state.with_db(|db| Ok(db.listings_by_seller(user_id)?))?;
    Ok(Json(state.resolver().listings(listings)))
}

pub async fn liked_listings(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<ListingView>>, ServerError> {
    let user_id = UserId::parse(&user_id)?;
    let listings = state.with_db(|db| Ok(db.liked_listings(user_id)?))?;
    Ok(Json(state.resolver().listings(listings)))
}

pub async fn categories() -> Json<Vec<&'static str>> {
    Json(Category::ALL.iter().map(Category::as_str).collect())
}
