//! Account records and the user-facing side of the denormalized listing data.

use std::collections::BTreeMap;

use rusqlite::{params, Connection, OptionalExtension};
use trojan_shared::{ListingId, UserId};

use crate::database::{format_ts, now, ts_col, uuid_col, Database};
use crate::error::{Result, StoreError};
use crate::models::{Listing, NewUser, User, UserProfile};

const USER_COLUMNS: &str =
    "id, first_name, last_name, username, email, password_hash, profile_picture, created_at";

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Register a new account. Emails are unique, compared case-insensitively.
    pub fn create_user(&self, new: NewUser) -> Result<User> {
        let email = new.email.trim().to_string();
        let username = new.username.trim().to_string();
        if email.is_empty() || !email.contains('@') {
            return Err(StoreError::Validation("a valid email is required".into()));
        }
        if username.is_empty() {
            return Err(StoreError::Validation("username is required".into()));
        }

        if self.find_user_by_email(&email)?.is_some() {
            return Err(StoreError::EmailTaken);
        }

        let user = User {
            id: UserId::new(),
            first_name: new.first_name.trim().to_string(),
            last_name: new.last_name.trim().to_string(),
            username,
            email,
            password_hash: new.password_hash,
            profile_picture: None,
            created_at: now(),
        };

        let inserted = self.conn().execute(
            "INSERT INTO users (id, first_name, last_name, username, email, password_hash,
                                profile_picture, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                user.id.to_string(),
                user.first_name,
                user.last_name,
                user.username,
                user.email,
                user.password_hash,
                user.profile_picture,
                format_ts(&user.created_at),
            ],
        );

        match inserted {
            Ok(_) => {}
            // Lost a race with a concurrent signup for the same email.
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                return Err(StoreError::EmailTaken);
            }
            Err(e) => return Err(e.into()),
        }

        tracing::info!(user = %user.id, username = %user.username, "user registered");
        Ok(user)
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    pub fn get_user(&self, id: UserId) -> Result<User> {
        fetch_user(self.conn(), id)
    }

    pub fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let user = self
            .conn()
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1 COLLATE NOCASE"),
                params![email.trim()],
                row_to_user,
            )
            .optional()?;
        Ok(user)
    }

    /// The seller's copy of every listing they own.
    pub fn listing_data(&self, user: UserId) -> Result<BTreeMap<ListingId, Listing>> {
        let mut stmt = self
            .conn()
            .prepare("SELECT snapshot FROM listing_snapshots WHERE user_id = ?1")?;
        let rows = stmt.query_map(params![user.to_string()], |row| row.get::<_, String>(0))?;

        let mut data = BTreeMap::new();
        for row in rows {
            let listing: Listing = serde_json::from_str(&row?)?;
            data.insert(listing.id, listing);
        }
        Ok(data)
    }

    /// The user record plus `listingData` and `likedListings`.
    pub fn user_profile(&self, id: UserId) -> Result<UserProfile> {
        let user = self.get_user(id)?;
        let listing_data = self.listing_data(id)?;
        let liked_listings = self.liked_listing_ids(id)?;
        Ok(UserProfile {
            user,
            listing_data,
            liked_listings,
        })
    }

    // ------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------

    /// Point the user's profile picture at a stored media key.
    pub fn set_profile_picture(&self, id: UserId, media_key: &str) -> Result<User> {
        let affected = self.conn().execute(
            "UPDATE users SET profile_picture = ?1 WHERE id = ?2",
            params![media_key, id.to_string()],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound("user"));
        }
        self.get_user(id)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

pub(crate) fn fetch_user(conn: &Connection, id: UserId) -> Result<User> {
    conn.query_row(
        &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
        params![id.to_string()],
        row_to_user,
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound("user"),
        other => StoreError::Sqlite(other),
    })
}

pub(crate) fn ensure_user(conn: &Connection, id: UserId) -> Result<()> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM users WHERE id = ?1)",
        params![id.to_string()],
        |row| row.get(0),
    )?;
    if exists {
        Ok(())
    } else {
        Err(StoreError::NotFound("user"))
    }
}

fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: UserId(uuid_col(row, 0)?),
        first_name: row.get(1)?,
        last_name: row.get(2)?,
        username: row.get(3)?,
        email: row.get(4)?,
        password_hash: row.get(5)?,
        profile_picture: row.get(6)?,
        created_at: ts_col(row, 7)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::new_user;

    #[test]
    fn create_and_fetch_user() {
        let db = Database::open_in_memory().unwrap();
        let user = db.create_user(new_user("Tommy")).unwrap();

        let fetched = db.get_user(user.id).unwrap();
        assert_eq!(fetched, user);
        assert!(fetched.profile_picture.is_none());

        let by_email = db.find_user_by_email("TOMMY@usc.edu").unwrap();
        assert_eq!(by_email.map(|u| u.id), Some(user.id));
    }

    #[test]
    fn duplicate_email_rejected() {
        let db = Database::open_in_memory().unwrap();
        db.create_user(new_user("Tommy")).unwrap();

        let mut dup = new_user("Other");
        dup.email = "Tommy@USC.edu".to_string();
        assert!(matches!(db.create_user(dup), Err(StoreError::EmailTaken)));
    }

    #[test]
    fn missing_user_is_not_found() {
        let db = Database::open_in_memory().unwrap();
        assert!(matches!(
            db.get_user(UserId::new()),
            Err(StoreError::NotFound("user"))
        ));
        assert!(matches!(
            db.set_profile_picture(UserId::new(), "k.png"),
            Err(StoreError::NotFound("user"))
        ));
    }

    #[test]
    fn profile_picture_update() {
        let db = Database::open_in_memory().unwrap();
        let user = db.create_user(new_user("Tommy")).unwrap();
        let updated = db.set_profile_picture(user.id, "1700000000000_me.png").unwrap();
        assert_eq!(updated.profile_picture.as_deref(), Some("1700000000000_me.png"));
    }

    #[test]
    fn password_hash_never_serialized() {
        let db = Database::open_in_memory().unwrap();
        let user = db.create_user(new_user("Tommy")).unwrap();
        let json = serde_json::to_value(db.user_profile(user.id).unwrap()).unwrap();
        assert!(json.get("passwordHash").is_none());
        assert_eq!(json["username"], "tommy");
        assert!(json["listingData"].as_object().unwrap().is_empty());
    }
}
