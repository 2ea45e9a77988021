//! Domain model structs persisted in the marketplace database.
//!
//! Models serialize with camelCase field names; they double as the JSON
//! shapes the HTTP layer hands to the frontend.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use trojan_shared::{Category, ConversationId, ListingId, MessageId, UserId};

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// A registered account.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub first_name: String,
    pub last_name: String,
    pub username: String,
    pub email: String,
    /// Argon2 PHC string. Never leaves the server.
    #[serde(skip_serializing)]
    pub password_hash: String,
    /// Media key of the uploaded picture, `None` for the default picture.
    pub profile_picture: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Fields needed to register an account.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub first_name: String,
    pub last_name: String,
    pub username: String,
    pub email: String,
    pub password_hash: String,
}

/// A user together with the denormalized listing copies and liked set.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(flatten)]
    pub user: User,
    /// Seller's copy of each listing they own, keyed by listing id.
    pub listing_data: BTreeMap<ListingId, Listing>,
    /// Liked listing ids, oldest like first.
    pub liked_listings: Vec<ListingId>,
}

// ---------------------------------------------------------------------------
// Listing
// ---------------------------------------------------------------------------

/// An item for sale. The `listings` table row is the source of truth.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Listing {
    pub id: ListingId,
    pub seller: UserId,
    pub name: String,
    /// Media key of the main image.
    pub thumbnail: String,
    /// Media keys of the additional images, in upload order.
    pub supplemental_images: Vec<String>,
    pub category: Category,
    /// Whole currency units.
    pub price: u32,
    pub condition: String,
    pub description: String,
    pub num_likes: u32,
    pub created_at: DateTime<Utc>,
    pub available: bool,
}

/// Attributes supplied by a seller when creating a listing.
#[derive(Debug, Clone)]
pub struct NewListing {
    pub seller: UserId,
    pub name: String,
    pub thumbnail: String,
    pub supplemental_images: Vec<String>,
    pub category: Category,
    pub price: u32,
    pub condition: String,
    pub description: String,
}

/// A partial update. `None` leaves the field untouched.
#[derive(Debug, Clone, Default)]
pub struct ListingPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<u32>,
    pub category: Option<Category>,
    pub condition: Option<String>,
    pub thumbnail: Option<String>,
    pub available: Option<bool>,
}


/// Browse filter for listing queries.
#[derive(Debug, Clone, Default)]
pub struct ListingQuery {
    pub category: Option<Category>,
    /// Case-insensitive substring matched against name and description.
    pub text: Option<String>,
}

/// Per-step result of a listing delete cascade.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteReport {
    pub likes_removed: usize,
    pub conversations_removed: usize,
    pub messages_removed: usize,
    pub snapshots_removed: usize,
}

/// State of the like ledger for one (user, listing) pair after a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LikeOutcome {
    /// Whether the user now likes the listing.
    pub liked: bool,
    /// Whether this call changed anything.
    pub changed: bool,
    pub num_likes: u32,
}

// ---------------------------------------------------------------------------
// Conversation / Message
// ---------------------------------------------------------------------------

/// A message thread between two users about one listing.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: ConversationId,
    /// The two participants in canonical (sorted) order.
    pub participants: [UserId; 2],
    pub listing: ListingId,
    /// Chronological, oldest first.
    pub messages: Vec<Message>,
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    pub fn has_participant(&self, user: UserId) -> bool {
        self.participants.contains(&user)
    }

    /// The participant that is not `user`.
    #[cfg(test)]
    pub fn counterpart(&self, user: UserId) -> Option<UserId> {
        match self.participants {
            [a, b] if a == user => Some(b),
            [a, b] if b == user => Some(a),
            _ => None,
        }
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Timestamp used to order inboxes; `None` for threads without messages.
    pub fn last_activity(&self) -> Option<DateTime<Utc>> {
        self.last_message().map(|m| m.timestamp)
    }
}

/// A single immutable chat message.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub sender: UserId,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}
