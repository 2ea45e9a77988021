//! Session tokens carried in the `token` cookie.
//!
//! A token names the user and an expiry and is signed with the server's
//! Ed25519 key. It travels as base64url-encoded JSON, so the server keeps
//! no session table: any token that verifies and has not expired is a
//! valid login.

use axum::http::{header, HeaderMap};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use cookie::{Cookie, SameSite};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use tracing::debug;
use trojan_shared::constants::{MAX_SESSION_TTL_HOURS, SESSION_COOKIE};
use trojan_shared::UserId;

use crate::error::ServerError;

/// Signed claim that `user_id` is logged in until `valid_until`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionToken {
    pub user_id: UserId,
    pub email: String,
    pub valid_until: DateTime<Utc>,
    pub signature: Vec<u8>,
}

/// Issues and verifies session tokens and renders the cookie headers.
#[derive(Clone)]
pub struct SessionManager {
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
    ttl: Duration,
    secure_cookies: bool,
}

impl SessionManager {
    pub fn new(seed: [u8; 32], ttl_hours: i64, secure_cookies: bool) -> Self {
        let signing_key = SigningKey::from_bytes(&seed);
        let verifying_key = signing_key.verifying_key();
        Self {
            signing_key,
            verifying_key,
            ttl: Duration::hours(ttl_hours.clamp(1, MAX_SESSION_TTL_HOURS)),
            secure_cookies,
        }
    }

    /// Issue a token valid for the configured lifetime.
    pub fn issue(&self, user_id: UserId, email: &str) -> SessionToken {
        self.issue_until(user_id, email, Utc::now() + self.ttl)
    }

    pub fn issue_until(
        &self,
        user_id: UserId,
        email: &str,
        valid_until: DateTime<Utc>,
    ) -> SessionToken {
        let signature = self
            .signing_key
            .sign(&signing_payload(user_id, email, valid_until));
        SessionToken {
            user_id,
            email: email.to_string(),
            valid_until,
            signature: signature.to_bytes().to_vec(),
        }
    }

    /// `true` if the token was signed by this server and has not expired.
    pub fn verify(&self, token: &SessionToken) -> bool {
        if Utc::now() > token.valid_until {
            return false;
        }

        let Ok(signature) = Signature::from_slice(&token.signature) else {
            return false;
        };

        let payload = signing_payload(token.user_id, &token.email, token.valid_until);
        self.verifying_key.verify(&payload, &signature).is_ok()
    }

    pub fn encode(&self, token: &SessionToken) -> Result<String, ServerError> {
        let json = serde_json::to_vec(token)
            .map_err(|e| ServerError::Internal(format!("Failed to encode session: {e}")))?;
        Ok(URL_SAFE_NO_PAD.encode(json))
    }

    pub fn decode(&self, raw: &str) -> Option<SessionToken> {
        let bytes = URL_SAFE_NO_PAD.decode(raw.trim()).ok()?;
        serde_json::from_slice(&bytes).ok()
    }

    /// Resolve the caller from the `token` cookie.
    pub fn authenticate(&self, headers: &HeaderMap) -> Result<SessionToken, ServerError> {
        let raw = session_cookie_value(headers)
            .ok_or_else(|| ServerError::Unauthorized("Not logged in".into()))?;

        let token = self
            .decode(&raw)
            .ok_or_else(|| ServerError::Unauthorized("Malformed session token".into()))?;

        if !self.verify(&token) {
            debug!(user = %token.user_id, "Rejected invalid or expired session token");
            return Err(ServerError::Unauthorized("Invalid or expired session".into()));
        }

        Ok(token)
    }

    /// `Set-Cookie` value that installs the session.
    pub fn session_cookie(&self, token: &SessionToken) -> Result<String, ServerError> {
        let cookie = Cookie::build((SESSION_COOKIE, self.encode(token)?))
            .http_only(true)
            .secure(self.secure_cookies)
            .same_site(SameSite::Strict)
            .path("/")
            .max_age(cookie::time::Duration::seconds(self.ttl.num_seconds()))
            .build();
        Ok(cookie.to_string())
    }

    /// `Set-Cookie` value that clears the session.
    pub fn removal_cookie(&self) -> String {
        let mut cookie = Cookie::build((SESSION_COOKIE, ""))
            .http_only(true)
            .secure(self.secure_cookies)
            .same_site(SameSite::Strict)
            .path("/")
            .build();
        cookie.make_removal();
        cookie.to_string()
    }
}

// payload = user_id || email || valid_until (rfc3339)
fn signing_payload(user_id: UserId, email: &str, valid_until: DateTime<Utc>) -> Vec<u8> {
    let mut payload = Vec::new();
    payload.extend_from_slice(user_id.0.as_bytes());
    payload.extend_from_slice(email.as_bytes());
    payload.extend_from_slice(valid_until.to_rfc3339().as_bytes());
    payload
}

fn session_cookie_value(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(Cookie::split_parse)
        .filter_map(Result::ok)
        .find(|cookie| cookie.name() == SESSION_COOKIE)
        .map(|cookie| cookie.value().to_string())
}
