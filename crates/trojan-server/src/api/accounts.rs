//! Signup, login and profile endpoints.

use axum::{
    extract::{Multipart, State},
    http::{header, HeaderMap},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use trojan_shared::UserId;
use trojan_store::NewUser;

use super::AppState;
use crate::error::ServerError;
use crate::form::MultipartForm;
use crate::mailer::welcome_email;
use crate::password::{hash_password_blocking, verify_password_blocking};
use crate::views::{SellerView, UserView};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupRequest {
    #[serde(default)]
    first_name: String,
    #[serde(default)]
    last_name: String,
    #[serde(default)]
    username: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

#[derive(Deserialize)]
pub struct SellerRequest {
    #[serde(default)]
    seller: String,
}

#[derive(Serialize)]
pub struct AuthResponse {
    success: bool,
    message: &'static str,
    user: UserId,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfilePictureResponse {
    success: bool,
    profile_picture_url: String,
}

pub async fn signup(
    State(state): State<AppState>,
    Json(req): Json<SignupRequest>,
) -> Result<impl IntoResponse, ServerError> {
    if req.password.is_empty() {
        return Err(ServerError::Validation("password is required".into()));
    }
    if state.with_db(|db| Ok(db.find_user_by_email(&req.email)?))?.is_some() {
        return Err(trojan_store::StoreError::EmailTaken.into());
    }

    let password_hash = hash_password_blocking(req.password).await?;
    let user = state.with_db(|db| {
        Ok(db.create_user(NewUser {
            first_name: req.first_name,
            last_name: req.last_name,
            username: req.username,
            email: req.email,
            password_hash,
        })?)
    })?;

    let token = state.sessions.issue(user.id, &user.email);
    let cookie = state.sessions.session_cookie(&token)?;
    state
        .mailer
        .dispatch(welcome_email(&user.email, &user.first_name));

    info!(user = %user.id, "Account created");
    Ok((
        [(header::SET_COOKIE, cookie)],
        Json(AuthResponse {
            success: true,
            message: "User registered successfully",
            user: user.id,
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ServerError> {
    let rejected = || ServerError::Unauthorized("Incorrect email or password".into());

    let user = state
        .with_db(|db| Ok(db.find_user_by_email(&req.email)?))?
        .ok_or_else(rejected)?;

    if !verify_password_blocking(req.password, user.password_hash.clone()).await? {
        debug!(user = %user.id, "Login rejected: wrong password");
        return Err(rejected());
    }

    let token = state.sessions.issue(user.id, &user.email);
    let cookie = state.sessions.session_cookie(&token)?;

    info!(user = %user.id, "Logged in");
    Ok((
        [(header::SET_COOKIE, cookie)],
        Json(AuthResponse {
            success: true,
            message: "Login successful",
            user: user.id,
        }),
    ))
}

pub async fn logout(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::SET_COOKIE, state.sessions.removal_cookie())],
        Json(serde_json::json!({ "success": true })),
    )
}

pub async fn current_user(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<UserView>, ServerError> {
    let token = state.sessions.authenticate(&headers)?;
    let profile = state.with_db(|db| Ok(db.user_profile(token.user_id)?))?;
    Ok(Json(state.resolver().user(profile)))
}

pub async fn upload_profile_picture(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<Json<ProfilePictureResponse>, ServerError> {
    let token = state.sessions.authenticate(&headers)?;
    let form = MultipartForm::read(multipart, state.media.max_size()).await?;
    let file = form
        .file("profilePicture")
        .ok_or_else(|| ServerError::Validation("profilePicture file is required".into()))?;

    let key = state.media.store(&file.file_name, &file.data).await?;

    let updated = state.with_db(|db| {
        let previous = db.get_user(token.user_id)?.profile_picture;
        let user = db.set_profile_picture(token.user_id, &key)?;
        Ok((previous, user))
    });
    let (previous, user) = match updated {
        Ok(pair) => pair,
        Err(e) => {
            state.media.delete_all(std::slice::from_ref(&key)).await;
            return Err(e);
        }
    };
    if let Some(previous) = previous {
        state.media.delete_all(&[previous]).await;
    }

    info!(user = %user.id, key = %key, "Profile picture updated");
    Ok(Json(ProfilePictureResponse {
        success: true,
        profile_picture_url: state.resolver().profile_picture(&user),
    }))
}

pub async fn seller_details(
    State(state): State<AppState>,
    Json(req): Json<SellerRequest>,
) -> Result<Json<SellerView>, ServerError> {
    let seller = UserId::parse(&req.seller)?;
    let (user, listing_data) =
        state.with_db(|db| Ok((db.get_user(seller)?, db.listing_data(seller)?)))?;
    Ok(Json(state.resolver().seller(user, listing_data)))
}
