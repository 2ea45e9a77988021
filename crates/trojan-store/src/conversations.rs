//! Conversation threading.
//!
//! A conversation is identified by an unordered participant pair plus a
//! listing. Rows store the pair sorted, so "find or create" is one equality
//! lookup and the unique index guarantees a single thread per triple.

use rusqlite::{params, Connection, OptionalExtension};
use trojan_shared::constants::MAX_MESSAGE_LENGTH;
use trojan_shared::{ConversationId, ListingId, MessageId, UserId};

use crate::database::{format_ts, now, ts_col, uuid_col, Database};
use crate::error::{Result, StoreError};
use crate::listings::fetch_listing;
use crate::messages::{insert_message, messages_for_conversation};
use crate::models::{Conversation, Message};
use crate::users::ensure_user;

/// Header row of a conversation, before its messages are attached.
struct ConversationRow {
    id: ConversationId,
    participants: [UserId; 2],
    listing: ListingId,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl Database {
    // ------------------------------------------------------------------
    // Write
    // ------------------------------------------------------------------

    /// Append a message to the thread between `sender` and `recipient` about
    /// `listing`, opening the thread on first contact.
    pub fn send_message(
        &mut self,
        sender: UserId,
        recipient: UserId,
        listing: ListingId,
        content: &str,
    ) -> Result<Conversation> {
        let content = content.trim();
        if content.is_empty() {
            return Err(StoreError::Validation("message content is required".into()));
        }
        if content.chars().count() > MAX_MESSAGE_LENGTH {
            return Err(StoreError::Validation(format!(
                "message content exceeds {MAX_MESSAGE_LENGTH} characters"
            )));
        }
        if sender == recipient {
            return Err(StoreError::Validation(
                "cannot start a conversation with yourself".into(),
            ));
        }

        let tx = self.conn_mut().transaction()?;
        ensure_user(&tx, sender)?;
        ensure_user(&tx, recipient)?;
        fetch_listing(&tx, listing)?;

        let [low, high] = canonical_pair(sender, recipient);
        let existing: Option<String> = tx
            .query_row(
                "SELECT id FROM conversations
                 WHERE participant_low = ?1 AND participant_high = ?2 AND listing_id = ?3",
                params![low.to_string(), high.to_string(), listing.to_string()],
                |row| row.get(0),
            )
            .optional()?;

        let conversation_id = match existing {
            Some(id) => ConversationId::parse(&id)?,
            None => {
                let id = ConversationId::new();
                tx.execute(
                    "INSERT INTO conversations
                        (id, participant_low, participant_high, listing_id, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        id.to_string(),
                        low.to_string(),
                        high.to_string(),
                        listing.to_string(),
                        format_ts(&now()),
                    ],
                )?;
                tracing::info!(
                    conversation = %id,
                    listing = %listing,
                    "conversation opened"
                );
                id
            }
        };

        let message = Message {
            id: MessageId::new(),
            sender,
            content: content.to_string(),
            timestamp: now(),
        };
        insert_message(&tx, conversation_id, &message)?;

        let conversation = load_conversation(&tx, conversation_id)?;
        tx.commit()?;

        tracing::debug!(
            conversation = %conversation_id,
            sender = %sender,
            messages = conversation.messages.len(),
            "message appended"
        );
        Ok(conversation)
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    pub fn get_conversation(&self, id: ConversationId) -> Result<Conversation> {
        load_conversation(self.conn(), id)
    }

    /// Every conversation `user` takes part in, most recent activity first.
    /// Threads without messages come last.
    pub fn list_conversations(&self, user: UserId) -> Result<Vec<Conversation>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, participant_low, participant_high, listing_id, created_at
             FROM conversations
             WHERE participant_low = ?1 OR participant_high = ?1",
        )?;
        let rows = stmt.query_map(params![user.to_string()], row_to_conversation)?;

        let mut conversations = Vec::new();
        for row in rows {
            conversations.push(attach_messages(self.conn(), row?)?);
        }

        conversations.sort_by(|a, b| {
            b.last_activity()
                .cmp(&a.last_activity())
                .then_with(|| b.created_at.cmp(&a.created_at))
        });
        Ok(conversations)
    }

    /// Conversations that reference a listing.
    #[cfg(test)]
    pub fn conversations_for_listing(&self, listing: ListingId) -> Result<Vec<ConversationId>> {
        let mut stmt = self
            .conn()
            .prepare("SELECT id FROM conversations WHERE listing_id = ?1")?;
        let rows = stmt.query_map(params![listing.to_string()], |row| {
            Ok(ConversationId(uuid_col(row, 0)?))
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }

    /// Total number of stored messages.
    #[cfg(test)]
    pub fn message_count(&self) -> Result<usize> {
        let count: i64 = self
            .conn()
            .query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn canonical_pair(a: UserId, b: UserId) -> [UserId; 2] {
    if a.to_string() < b.to_string() {
        [a, b]
    } else {
        [b, a]
    }
}

fn load_conversation(conn: &Connection, id: ConversationId) -> Result<Conversation> {
    let row = conn
        .query_row(
            "SELECT id, participant_low, participant_high, listing_id, created_at
             FROM conversations WHERE id = ?1",
            params![id.to_string()],
            row_to_conversation,
        )
        .optional()?
        .ok_or(StoreError::NotFound("conversation"))?;
    attach_messages(conn, row)
}

fn attach_messages(conn: &Connection, row: ConversationRow) -> Result<Conversation> {
    let messages = messages_for_conversation(conn, row.id)?;
    Ok(Conversation {
        id: row.id,
        participants: row.participants,
        listing: row.listing,
        messages,
        created_at: row.created_at,
    })
}

fn row_to_conversation(row: &rusqlite::Row<'_>) -> rusqlite::Result<ConversationRow> {
    Ok(ConversationRow {
        id: ConversationId(uuid_col(row, 0)?),
        participants: [UserId(uuid_col(row, 1)?), UserId(uuid_col(row, 2)?)],
        listing: ListingId(uuid_col(row, 3)?),
        created_at: ts_col(row, 4)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{new_listing, seed_user};

    // Stored timestamps have microsecond precision.
    fn pause() {
        std::thread::sleep(std::time::Duration::from_millis(2));
    }

    #[test]
    fn replies_share_one_thread() {
        let mut db = Database::open_in_memory().unwrap();
        let a = seed_user(&db, "Alice");
        let b = seed_user(&db, "Bob");
        let desk = db.create_listing(new_listing(b.id, "Desk", 40)).unwrap();

        let first = db.send_message(a.id, b.id, desk.id, "hi").unwrap();
        let second = db.send_message(b.id, a.id, desk.id, "yo").unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.messages.len(), 2);
        assert_eq!(second.messages[0].content, "hi");
        assert_eq!(second.messages[0].sender, a.id);
        assert_eq!(second.messages[1].content, "yo");
        assert_eq!(second.messages[1].sender, b.id);
        assert!(second.has_participant(a.id) && second.has_participant(b.id));
        assert_eq!(second.counterpart(a.id), Some(b.id));
        assert_eq!(db.list_conversations(a.id).unwrap().len(), 1);
    }

    #[test]
    fn separate_listings_get_separate_threads() {
        let mut db = Database::open_in_memory().unwrap();
        let a = seed_user(&db, "Alice");
        let b = seed_user(&db, "Bob");
        let desk = db.create_listing(new_listing(b.id, "Desk", 40)).unwrap();
        let sofa = db.create_listing(new_listing(b.id, "Sofa", 90)).unwrap();

        let one = db.send_message(a.id, b.id, desk.id, "desk?").unwrap();
        let two = db.send_message(a.id, b.id, sofa.id, "sofa?").unwrap();
        assert_ne!(one.id, two.id);
    }

    #[test]
    fn inbox_orders_by_last_message() {
        let mut db = Database::open_in_memory().unwrap();
        let a = seed_user(&db, "Alice");
        let b = seed_user(&db, "Bob");
        let c = seed_user(&db, "Carol");
        let desk = db.create_listing(new_listing(a.id, "Desk", 40)).unwrap();

        let with_b = db.send_message(b.id, a.id, desk.id, "first").unwrap();
        pause();
        let with_c = db.send_message(c.id, a.id, desk.id, "second").unwrap();

        let inbox = db.list_conversations(a.id).unwrap();
        assert_eq!(
            inbox.iter().map(|c| c.id).collect::<Vec<_>>(),
            vec![with_c.id, with_b.id]
        );

        pause();
        db.send_message(a.id, b.id, desk.id, "bump").unwrap();
        let inbox = db.list_conversations(a.id).unwrap();
        assert_eq!(inbox[0].id, with_b.id);

        assert_eq!(db.list_conversations(c.id).unwrap().len(), 1);
    }

    #[test]
    fn empty_threads_sort_last() {
        let mut db = Database::open_in_memory().unwrap();
        let a = seed_user(&db, "Alice");
        let b = seed_user(&db, "Bob");
        let c = seed_user(&db, "Carol");
        let desk = db.create_listing(new_listing(a.id, "Desk", 40)).unwrap();

        let active = db.send_message(b.id, a.id, desk.id, "hello").unwrap();

        // A thread whose messages are gone still exists until its listing is deleted.
        let empty = db.send_message(c.id, a.id, desk.id, "tmp").unwrap();
        db.conn()
            .execute(
                "DELETE FROM messages WHERE conversation_id = ?1",
                params![empty.id.to_string()],
            )
            .unwrap();

        let inbox = db.list_conversations(a.id).unwrap();
        assert_eq!(inbox.len(), 2);
        assert_eq!(inbox[0].id, active.id);
        assert_eq!(inbox[1].id, empty.id);
        assert!(inbox[1].last_activity().is_none());
    }

    #[test]
    fn send_message_validation() {
        let mut db = Database::open_in_memory().unwrap();
        let a = seed_user(&db, "Alice");
        let b = seed_user(&db, "Bob");
        let desk = db.create_listing(new_listing(b.id, "Desk", 40)).unwrap();

        assert!(matches!(
            db.send_message(a.id, b.id, desk.id, "   "),
            Err(StoreError::Validation(_))
        ));
        assert!(matches!(
            db.send_message(a.id, a.id, desk.id, "hi"),
            Err(StoreError::Validation(_))
        ));
        let long = "x".repeat(MAX_MESSAGE_LENGTH + 1);
        assert!(matches!(
            db.send_message(a.id, b.id, desk.id, &long),
            Err(StoreError::Validation(_))
        ));
        assert!(matches!(
            db.send_message(a.id, UserId::new(), desk.id, "hi"),
            Err(StoreError::NotFound("user"))
        ));
        assert!(matches!(
            db.send_message(a.id, b.id, ListingId::new(), "hi"),
            Err(StoreError::NotFound("listing"))
        ));
        assert!(db.list_conversations(a.id).unwrap().is_empty());
        assert_eq!(db.message_count().unwrap(), 0);
    }

    #[test]
    fn unknown_conversation_is_not_found() {
        let db = Database::open_in_memory().unwrap();
        assert!(matches!(
            db.get_conversation(ConversationId::new()),
            Err(StoreError::NotFound("conversation"))
        ));
    }

    #[test]
    fn delete_listing_removes_threads_likes_and_messages() {
        let mut db = Database::open_in_memory().unwrap();
        let u1 = seed_user(&db, "Seller");
        let u2 = seed_user(&db, "Buyer2");
        let u3 = seed_user(&db, "Buyer3");
        let desk = db.create_listing(new_listing(u1.id, "Desk", 40)).unwrap();
        let lamp = db.create_listing(new_listing(u1.id, "Lamp", 10)).unwrap();

        db.like(u2.id, desk.id).unwrap();
        db.like(u3.id, desk.id).unwrap();
        db.like(u3.id, lamp.id).unwrap();
        db.send_message(u2.id, u1.id, desk.id, "still available?").unwrap();
        db.send_message(u1.id, u2.id, desk.id, "yes").unwrap();
        db.send_message(u3.id, u1.id, desk.id, "40 firm?").unwrap();
        let kept = db.send_message(u3.id, u1.id, lamp.id, "lamp?").unwrap();

        let report = db.delete_listing(desk.id, u1.id).unwrap();
        assert_eq!(report.likes_removed, 2);
        assert_eq!(report.conversations_removed, 2);
        assert_eq!(report.messages_removed, 3);

        assert!(matches!(
            db.get_listing(desk.id),
            Err(StoreError::NotFound("listing"))
        ));
        assert!(db.liked_listing_ids(u2.id).unwrap().is_empty());
        assert_eq!(db.liked_listing_ids(u3.id).unwrap(), vec![lamp.id]);
        assert!(db.conversations_for_listing(desk.id).unwrap().is_empty());
        assert!(!db.listing_data(u1.id).unwrap().contains_key(&desk.id));

        // Only the lamp thread and its single message survive.
        assert_eq!(db.message_count().unwrap(), 1);
        let inbox = db.list_conversations(u1.id).unwrap();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].id, kept.id);
        assert_eq!(db.get_listing(lamp.id).unwrap().num_likes, 1);
    }
}
