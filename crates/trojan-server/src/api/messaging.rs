//! Buyer/seller conversations.

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use trojan_shared::{ConversationId, ListingId, UserId};

use super::AppState;
use crate::error::ServerError;
use crate::mailer::message_notification;
use crate::views::ConversationView;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    #[serde(default)]
    content: String,
    #[serde(default)]
    listing_id: String,
    #[serde(default)]
    recipient_id: String,
}

#[derive(Serialize)]
pub struct SendMessageResponse {
    success: bool,
    conversation: ConversationView,
}

pub async fn send_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<SendMessageRequest>,
) -> Result<Json<SendMessageResponse>, ServerError> {
    let token = state.sessions.authenticate(&headers)?;
    if req.content.trim().is_empty() || req.listing_id.is_empty() || req.recipient_id.is_empty() {
        return Err(ServerError::Validation("Missing required fields".into()));
    }
    let recipient = UserId::parse(&req.recipient_id)?;
    let listing = ListingId::parse(&req.listing_id)?;
    let sender = token.user_id;

    let resolver = state.resolver();
    let (conversation, notification) = state.with_db(|db| {
        let conversation = db.send_message(sender, recipient, listing, &req.content)?;
        let from = db.get_user(sender)?;
        let to = db.get_user(recipient)?;
        let about = db.get_listing(listing)?;
        let view = resolver.conversation(db, conversation)?;
        Ok((view, message_notification(&to.email, &from.username, &about.name)))
    })?;

    state.mailer.dispatch(notification);

    info!(
        conversation = %conversation.id,
        sender = %sender,
        recipient = %recipient,
        "Message sent"
    );
    Ok(Json(SendMessageResponse {
        success: true,
        conversation,
    }))
}

pub async fn list_conversations(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<ConversationView>>, ServerError> {
    let token = state.sessions.authenticate(&headers)?;
    let resolver = state.resolver();
    let conversations = state.with_db(|db| {
        let conversations = db.list_conversations(token.user_id)?;
        let views = conversations
            .into_iter()
            .map(|c| resolver.conversation(db, c))
            .collect::<trojan_store::Result<Vec<_>>>()?;
        Ok(views)
    })?;
    Ok(Json(conversations))
}

pub async fn get_conversation(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<ConversationView>, ServerError> {
    let token = state.sessions.authenticate(&headers)?;
    let id = ConversationId::parse(&id)?;
    let resolver = state.resolver();
    let conversation = state.with_db(|db| {
        let conversation = db.get_conversation(id)?;
        if !conversation.has_participant(token.user_id) {
            return Err(ServerError::Forbidden(
                "Not a participant in this conversation".into(),
            ));
        }
        Ok(resolver.conversation(db, conversation)?)
    })?;
    Ok(Json(conversation))
}
