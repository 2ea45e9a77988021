//! JSON shapes returned to the frontend.
//!
//! Stored records carry media keys; views carry signed URLs next to them and
//! swap user ids for the usernames and pictures the UI displays.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::Serialize;
use trojan_shared::{ConversationId, ListingId, MessageId, UserId};
use trojan_store::{Conversation, Database, Listing, User, UserProfile};

use crate::media::MediaSigner;

/// Turns stored media keys into URLs.
pub struct MediaResolver<'a> {
    pub signer: &'a MediaSigner,
    pub default_profile_picture_url: &'a str,
}

impl MediaResolver<'_> {
    pub fn listing(&self, listing: Listing) -> ListingView {
        ListingView {
            thumbnail_url: self.signer.presign(&listing.thumbnail),
            supplemental_images_urls: listing
                .supplemental_images
                .iter()
                .map(|key| self.signer.presign(key))
                .collect(),
            listing,
        }
    }

    pub fn listings(&self, listings: Vec<Listing>) -> Vec<ListingView> {
        listings.into_iter().map(|l| self.listing(l)).collect()
    }

    pub fn profile_picture(&self, user: &User) -> String {
        match &user.profile_picture {
            Some(key) => self.signer.presign(key),
            None => self.default_profile_picture_url.to_string(),
        }
    }

    pub fn user(&self, profile: UserProfile) -> UserView {
        UserView {
            profile_picture_url: self.profile_picture(&profile.user),
            profile,
        }
    }

    pub fn seller(&self, user: User, listing_data: BTreeMap<ListingId, Listing>) -> SellerView {
        let listing_data: BTreeMap<ListingId, ListingView> = listing_data
            .into_iter()
            .map(|(id, listing)| (id, self.listing(listing)))
            .collect();
        SellerView {
            id: user.id,
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            username: user.username.clone(),
            profile_picture_url: self.profile_picture(&user),
            listing_data_size: listing_data.len(),
            listing_data,
            created_at: user.created_at,
        }
    }

    fn participant(&self, user: &User) -> ParticipantView {
        ParticipantView {
            id: user.id,
            username: user.username.clone(),
            profile_picture_url: self.profile_picture(user),
        }
    }

    /// Populate a conversation's participants, listing and message senders.
    pub fn conversation(
        &self,
        db: &Database,
        conversation: Conversation,
    ) -> trojan_store::Result<ConversationView> {
        let mut participants = HashMap::with_capacity(2);
        for id in conversation.participants {
            participants.insert(id, self.participant(&db.get_user(id)?));
        }
        let listing = db.get_listing(conversation.listing)?;

        let messages = conversation
            .messages
            .into_iter()
            .map(|m| MessageView {
                id: m.id,
                sender: participants
                    .get(&m.sender)
                    .cloned()
                    .unwrap_or_else(|| ParticipantView::unknown(m.sender)),
                content: m.content,
                timestamp: m.timestamp,
            })
            .collect();

        Ok(ConversationView {
            id: conversation.id,
            participants: conversation
                .participants
                .iter()
                .filter_map(|id| participants.get(id).cloned())
                .collect(),
            listing: ListingSummary {
                id: listing.id,
                name: listing.name.clone(),
                thumbnail_url: self.signer.presign(&listing.thumbnail),
            },
            messages,
            created_at: conversation.created_at,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingView {
    #[serde(flatten)]
    pub listing: Listing,
    pub thumbnail_url: String,
    pub supplemental_images_urls: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    #[serde(flatten)]
    pub profile: UserProfile,
    pub profile_picture_url: String,
}

/// What a buyer may see about a seller.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SellerView {
    pub id: UserId,
    pub first_name: String,
    pub last_name: String,
    pub username: String,
    pub profile_picture_url: String,
    pub listing_data: BTreeMap<ListingId, ListingView>,
    pub listing_data_size: usize,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantView {
    pub id: UserId,
    pub username: String,
    pub profile_picture_url: String,
}

impl ParticipantView {
    fn unknown(id: UserId) -> Self {
        Self {
            id,
            username: String::new(),
            profile_picture_url: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingSummary {
    pub id: ListingId,
    pub name: String,
    pub thumbnail_url: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageView {
    pub id: MessageId,
    pub sender: ParticipantView,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationView {
    pub id: ConversationId,
    pub participants: Vec<ParticipantView>,
    pub listing: ListingSummary,
    pub messages: Vec<MessageView>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use trojan_shared::Category;
    use trojan_store::{NewListing, NewUser};

    fn resolver(signer: &MediaSigner) -> MediaResolver<'_> {
        MediaResolver {
            signer,
            default_profile_picture_url: "http://cdn/default.png",
        }
    }

    fn seed(db: &mut Database) -> (User, User, Listing) {
        let user = |name: &str| {
            db.create_user(NewUser {
                first_name: name.to_string(),
                last_name: "Trojan".to_string(),
                username: name.to_lowercase(),
                email: format!("{}@usc.edu", name.to_lowercase()),
                password_hash: "x".to_string(),
            })
            .unwrap()
        };
        let seller = user("Seller");
        let buyer = user("Buyer");
        let listing = db
            .create_listing(NewListing {
                seller: seller.id,
                name: "Desk".to_string(),
                thumbnail: "1_desk.jpg".to_string(),
                supplemental_images: vec!["2_side.jpg".to_string()],
                category: Category::Furniture,
                price: 120,
                condition: "Used - good".to_string(),
                description: String::new(),
            })
            .unwrap();
        (seller, buyer, listing)
    }

    #[test]
    fn listing_view_adds_signed_urls() {
        let mut db = Database::open_in_memory().unwrap();
        let (_, _, listing) = seed(&mut db);
        let signer = MediaSigner::new([1; 32], "http://api", 60);

        let json = serde_json::to_value(resolver(&signer).listing(listing)).unwrap();
        assert_eq!(json["thumbnail"], "1_desk.jpg");
        assert!(json["thumbnailUrl"]
            .as_str()
            .unwrap()
            .starts_with("http://api/media/1_desk.jpg?expires="));
        assert_eq!(json["supplementalImagesUrls"].as_array().unwrap().len(), 1);
        assert_eq!(json["numLikes"], 0);
    }

    #[test]
    fn default_profile_picture_when_unset() {
        let mut db = Database::open_in_memory().unwrap();
        let (seller, _, _) = seed(&mut db);
        let signer = MediaSigner::new([1; 32], "http://api", 60);
        let resolver = resolver(&signer);

        assert_eq!(resolver.profile_picture(&seller), "http://cdn/default.png");
        let updated = db.set_profile_picture(seller.id, "9_me.png").unwrap();
        assert!(resolver.profile_picture(&updated).contains("/media/9_me.png?"));
    }

    #[test]
    fn seller_view_hides_private_fields() {
        let mut db = Database::open_in_memory().unwrap();
        let (seller, _, listing) = seed(&mut db);
        let signer = MediaSigner::new([1; 32], "http://api", 60);

        let data = db.listing_data(seller.id).unwrap();
        let json = serde_json::to_value(resolver(&signer).seller(seller, data)).unwrap();
        assert!(json.get("email").is_none());
        assert_eq!(json["listingDataSize"], 1);
        assert!(json["listingData"][listing.id.to_string()]["thumbnailUrl"].is_string());
    }

    #[test]
    fn conversation_view_populates_people_and_listing() {
        let mut db = Database::open_in_memory().unwrap();
        let (seller, buyer, listing) = seed(&mut db);
        let conversation = db
            .send_message(buyer.id, seller.id, listing.id, "Is this available?")
            .unwrap();
        let signer = MediaSigner::new([1; 32], "http://api", 60);

        let view = resolver(&signer).conversation(&db, conversation).unwrap();
        assert_eq!(view.participants.len(), 2);
        assert_eq!(view.listing.name, "Desk");
        assert_eq!(view.messages.len(), 1);
        assert_eq!(view.messages[0].sender.username, "buyer");
        assert_eq!(view.messages[0].content, "Is this available?");
    }
}
