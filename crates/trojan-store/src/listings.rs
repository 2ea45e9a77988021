//! Listing lifecycle: create, edit, delete and browse.
//!
//! The seller's `listingData` copy lives in `listing_snapshots`. Every
//! mutation of a listing row goes through [`write_snapshot`] inside the same
//! transaction, so the copy cannot drift from the source row.

use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use trojan_shared::{Category, ListingId, UserId};

use crate::database::{conversion_failure, format_ts, now, ts_col, uuid_col, Database};
use crate::error::{Result, StoreError};
use crate::models::{DeleteReport, Listing, ListingPatch, ListingQuery, NewListing};
use crate::users::{ensure_user, fetch_user};

const LISTING_COLUMNS: &str = "id, seller_id, name, thumbnail, supplemental_images, category, \
                               price, condition, description, num_likes, created_at, available";

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Persist a new listing and record the seller's copy of it.
    pub fn create_listing(&mut self, new: NewListing) -> Result<Listing> {
        let name = required("name", &new.name)?;
        let thumbnail = required("thumbnail", &new.thumbnail)?;
        let condition = required("condition", &new.condition)?;

        let listing = Listing {
            id: ListingId::new(),
            seller: new.seller,
            name,
            thumbnail,
            supplemental_images: new.supplemental_images,
            category: new.category,
            price: new.price,
            condition,
            description: new.description.trim().to_string(),
            num_likes: 0,
            created_at: now(),
            available: true,
        };

        let tx = self.conn_mut().transaction()?;
        ensure_user(&tx, listing.seller)?;

        tx.execute(
            &format!("INSERT INTO listings ({LISTING_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"),
            params![
                listing.id.to_string(),
                listing.seller.to_string(),
                listing.name,
                listing.thumbnail,
                serde_json::to_string(&listing.supplemental_images)?,
                listing.category.as_str(),
                listing.price,
                listing.condition,
                listing.description,
                listing.num_likes,
                format_ts(&listing.created_at),
                listing.available,
            ],
        )?;
        write_snapshot(&tx, &listing)?;
        tx.commit()?;

        tracing::info!(
            listing = %listing.id,
            seller = %listing.seller,
            name = %listing.name,
            "listing created"
        );
        Ok(listing)
    }

    // ------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------

    /// Apply a partial update on behalf of the listing's seller.
    ///
    /// New supplemental images are appended; any existing image whose object
    /// key matches an entry of `images_to_remove` is dropped (references are
    /// compared without query string or URL prefix). The seller's copy is
    /// then replaced with the persisted row.
    pub fn edit_listing(
        &mut self,
        listing_id: ListingId,
        user_id: UserId,
        patch: ListingPatch,
        images_to_add: Vec<String>,
        images_to_remove: &[String],
    ) -> Result<Listing> {
        let tx = self.conn_mut().transaction()?;

        let mut listing = fetch_listing(&tx, listing_id)?;
        ensure_user(&tx, user_id)?;
        if listing.seller != user_id {
            return Err(StoreError::Forbidden(format!(
                "listing {listing_id} is not owned by user {user_id}"
            )));
        }

        if let Some(name) = patch.name {
            listing.name = required("name", &name)?;
        }
        if let Some(description) = patch.description {
            listing.description = description.trim().to_string();
        }
        if let Some(price) = patch.price {
            listing.price = price;
        }
        if let Some(category) = patch.category {
            listing.category = category;
        }
        if let Some(condition) = patch.condition {
            listing.condition = required("condition", &condition)?;
        }
        if let Some(thumbnail) = patch.thumbnail {
            listing.thumbnail = required("thumbnail", &thumbnail)?;
        }
        if let Some(available) = patch.available {
            listing.available = available;
        }

        listing.supplemental_images.extend(images_to_add);
        if !images_to_remove.is_empty() {
            let before = listing.supplemental_images.len();
            listing.supplemental_images.retain(|img| {
                !images_to_remove
                    .iter()
                    .any(|r| object_key(r) == object_key(img))
            });
            tracing::debug!(
                listing = %listing_id,
                removed = before - listing.supplemental_images.len(),
                "removed supplemental images"
            );
        }

        tx.execute(
            "UPDATE listings
             SET name = ?1, thumbnail = ?2, supplemental_images = ?3, category = ?4,
                 price = ?5, condition = ?6, description = ?7, available = ?8
             WHERE id = ?9",
            params![
                listing.name,
                listing.thumbnail,
                serde_json::to_string(&listing.supplemental_images)?,
                listing.category.as_str(),
                listing.price,
                listing.condition,
                listing.description,
                listing.available,
                listing_id.to_string(),
            ],
        )?;

        let updated = fetch_listing(&tx, listing_id)?;
        write_snapshot(&tx, &updated)?;
        tx.commit()?;

        tracing::info!(listing = %listing_id, seller = %user_id, "listing updated");
        Ok(updated)
    }

    // ------------------------------------------------------------------
    // Delete
    // ------------------------------------------------------------------

    /// Remove a listing and everything that references it: likes, the
    /// seller's copy, conversations and their messages. Runs as a single
    /// transaction; the foreign keys refuse to commit if a step was missed.
    pub fn delete_listing(&mut self, listing_id: ListingId, user_id: UserId) -> Result<DeleteReport> {
        let tx = self.conn_mut().transaction()?;

        let listing = fetch_listing(&tx, listing_id)?;
        ensure_user(&tx, user_id)?;
        if listing.seller != user_id {
            return Err(StoreError::Forbidden(format!(
                "listing {listing_id} is not owned by user {user_id}"
            )));
        }

        let id = listing_id.to_string();
        let mut report = DeleteReport::default();

        report.messages_removed = step(listing_id, "messages", || {
            tx.execute(
                "DELETE FROM messages WHERE conversation_id IN
                    (SELECT id FROM conversations WHERE listing_id = ?1)",
                params![id],
            )
        })?;
        report.conversations_removed = step(listing_id, "conversations", || {
            tx.execute("DELETE FROM conversations WHERE listing_id = ?1", params![id])
        })?;
        report.likes_removed = step(listing_id, "likes", || {
            tx.execute("DELETE FROM liked_listings WHERE listing_id = ?1", params![id])
        })?;
        report.snapshots_removed = step(listing_id, "snapshots", || {
            tx.execute("DELETE FROM listing_snapshots WHERE listing_id = ?1", params![id])
        })?;
        step(listing_id, "listing", || {
            tx.execute("DELETE FROM listings WHERE id = ?1", params![id])
        })?;

        tx.commit()?;

        tracing::info!(
            listing = %listing_id,
            seller = %user_id,
            likes = report.likes_removed,
            conversations = report.conversations_removed,
            messages = report.messages_removed,
            "listing deleted"
        );
        Ok(report)
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    pub fn get_listing(&self, id: ListingId) -> Result<Listing> {
        fetch_listing(self.conn(), id)
    }

    /// Browse or search listings, newest first.
    pub fn list_listings(&self, query: &ListingQuery) -> Result<Vec<Listing>> {
        let mut clauses = Vec::new();
        let mut args: Vec<String> = Vec::new();

        if let Some(category) = query.category {
            args.push(category.as_str().to_string());
            clauses.push(format!("category = ?{}", args.len()));
        }
        if let Some(text) = query.text.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            args.push(format!("%{}%", escape_like(text)));
            let n = args.len();
            clauses.push(format!(
                "(name LIKE ?{n} ESCAPE '\\' OR description LIKE ?{n} ESCAPE '\\')"
            ));
        }

        let where_clause = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };

        let mut stmt = self.conn().prepare(&format!(
            "SELECT {LISTING_COLUMNS} FROM listings {where_clause} ORDER BY created_at DESC"
        ))?;
        let rows = stmt.query_map(params_from_iter(args.iter()), row_to_listing)?;
        collect(rows)
    }

    /// The most liked listings, ties broken by recency.
    pub fn top_listings(&self, limit: u32) -> Result<Vec<Listing>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {LISTING_COLUMNS} FROM listings
             ORDER BY num_likes DESC, created_at DESC
             LIMIT ?1"
        ))?;
        let rows = stmt.query_map(params![limit], row_to_listing)?;
        collect(rows)
    }

    /// Listings sold by one user, read from the source table.
    pub fn listings_by_seller(&self, seller: UserId) -> Result<Vec<Listing>> {
        fetch_user(self.conn(), seller)?;
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {LISTING_COLUMNS} FROM listings WHERE seller_id = ?1 ORDER BY created_at DESC"
        ))?;
        let rows = stmt.query_map(params![seller.to_string()], row_to_listing)?;
        collect(rows)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

pub(crate) fn fetch_listing(conn: &Connection, id: ListingId) -> Result<Listing> {
    conn.query_row(
        &format!("SELECT {LISTING_COLUMNS} FROM listings WHERE id = ?1"),
        params![id.to_string()],
        row_to_listing,
    )
    .optional()?
    .ok_or(StoreError::NotFound("listing"))
}

/// Replace the seller's copy of `listing` with the given state.
pub(crate) fn write_snapshot(conn: &Connection, listing: &Listing) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO listing_snapshots (user_id, listing_id, snapshot)
         VALUES (?1, ?2, ?3)",
        params![
            listing.seller.to_string(),
            listing.id.to_string(),
            serde_json::to_string(listing)?,
        ],
    )?;
    Ok(())
}

/// Re-read a listing and rewrite its snapshot. Used after counter changes.
pub(crate) fn refresh_snapshot(conn: &Connection, id: ListingId) -> Result<Listing> {
    let listing = fetch_listing(conn, id)?;
    write_snapshot(conn, &listing)?;
    Ok(listing)
}

/// Object key of a stored reference: strips any query string and any URL
/// prefix, so a signed URL and the raw key compare equal.
pub fn object_key(reference: &str) -> &str {
    let base = reference.split('?').next().unwrap_or(reference);
    base.rsplit('/').next().unwrap_or(base)
}

fn required(field: &str, value: &str) -> Result<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(StoreError::Validation(format!("{field} is required")));
    }
    Ok(value.to_string())
}

fn escape_like(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Run one delete-cascade step, logging its outcome separately so an
/// operator can tell which step failed.
fn step<F>(listing: ListingId, name: &'static str, f: F) -> Result<usize>
where
    F: FnOnce() -> rusqlite::Result<usize>,
{
    match f() {
        Ok(n) => {
            tracing::debug!(listing = %listing, step = name, removed = n, "delete step done");
            Ok(n)
        }
        Err(e) => {
            tracing::error!(listing = %listing, step = name, error = %e, "delete step failed");
            Err(e.into())
        }
    }
}

fn collect<I>(rows: I) -> Result<Vec<Listing>>
where
    I: Iterator<Item = rusqlite::Result<Listing>>,
{
    rows.collect::<std::result::Result<Vec<_>, _>>()
        .map_err(StoreError::Sqlite)
}

pub(crate) fn row_to_listing(row: &rusqlite::Row<'_>) -> rusqlite::Result<Listing> {
    let images_json: String = row.get(4)?;
    let supplemental_images: Vec<String> =
        serde_json::from_str(&images_json).map_err(|e| conversion_failure(4, e))?;

    let category_str: String = row.get(5)?;
    let category: Category = category_str.parse().map_err(|e| conversion_failure(5, e))?;

    Ok(Listing {
        id: ListingId(uuid_col(row, 0)?),
        seller: UserId(uuid_col(row, 1)?),
        name: row.get(2)?,
        thumbnail: row.get(3)?,
        supplemental_images,
        category,
        price: row.get(6)?,
        condition: row.get(7)?,
        description: row.get(8)?,
        num_likes: row.get(9)?,
        created_at: ts_col(row, 10)?,
        available: row.get(11)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{new_listing, seed_user};

    #[test]
    fn create_listing_writes_seller_copy() {
        let mut db = Database::open_in_memory().unwrap();
        let seller = seed_user(&db, "Seller");

        let listing = db.create_listing(new_listing(seller.id, "Desk", 40)).unwrap();
        assert_eq!(listing.num_likes, 0);
        assert!(listing.available);

        let data = db.listing_data(seller.id).unwrap();
        assert_eq!(data.get(&listing.id), Some(&listing));
        assert_eq!(db.get_listing(listing.id).unwrap(), listing);
    }

    #[test]
    fn create_listing_requires_fields() {
        let mut db = Database::open_in_memory().unwrap();
        let seller = seed_user(&db, "Seller");

        let mut missing_name = new_listing(seller.id, "Desk", 40);
        missing_name.name = "   ".to_string();
        assert!(matches!(
            db.create_listing(missing_name),
            Err(StoreError::Validation(_))
        ));

        let mut missing_thumb = new_listing(seller.id, "Desk", 40);
        missing_thumb.thumbnail.clear();
        assert!(matches!(
            db.create_listing(missing_thumb),
            Err(StoreError::Validation(_))
        ));

        assert!(matches!(
            db.create_listing(new_listing(UserId::new(), "Desk", 40)),
            Err(StoreError::NotFound("user"))
        ));
        assert!(db.list_listings(&ListingQuery::default()).unwrap().is_empty());
    }

    #[test]
    fn edit_listing_syncs_seller_copy() {
        let mut db = Database::open_in_memory().unwrap();
        let seller = seed_user(&db, "Seller");
        let mut new = new_listing(seller.id, "Desk", 40);
        new.supplemental_images = vec!["1_a.png".into(), "2_b.png".into()];
        let listing = db.create_listing(new).unwrap();

        let patch = ListingPatch {
            name: Some("Standing desk".into()),
            price: Some(55),
            category: Some(Category::Other),
            ..Default::default()
        };
        let updated = db
            .edit_listing(
                listing.id,
                seller.id,
                patch,
                vec!["3_c.png".into()],
                &["http://localhost:6000/media/1_a.png".into()],
            )
            .unwrap();

        assert_eq!(updated.name, "Standing desk");
        assert_eq!(updated.price, 55);
        assert_eq!(updated.condition, listing.condition);
        assert_eq!(updated.supplemental_images, vec!["2_b.png", "3_c.png"]);

        let persisted = db.get_listing(listing.id).unwrap();
        assert_eq!(persisted, updated);
        assert_eq!(db.listing_data(seller.id).unwrap()[&listing.id], persisted);
    }

    #[test]
    fn edit_listing_errors() {
        let mut db = Database::open_in_memory().unwrap();
        let seller = seed_user(&db, "Seller");
        let other = seed_user(&db, "Other");
        let listing = db.create_listing(new_listing(seller.id, "Desk", 40)).unwrap();

        assert!(matches!(
            db.edit_listing(ListingId::new(), seller.id, ListingPatch::default(), vec![], &[]),
            Err(StoreError::NotFound("listing"))
        ));
        assert!(matches!(
            db.edit_listing(listing.id, UserId::new(), ListingPatch::default(), vec![], &[]),
            Err(StoreError::NotFound("user"))
        ));
        assert!(matches!(
            db.edit_listing(listing.id, other.id, ListingPatch::default(), vec![], &[]),
            Err(StoreError::Forbidden(_))
        ));

        // A rejected edit leaves the row untouched.
        let bad = ListingPatch {
            name: Some(String::new()),
            price: Some(1),
            ..Default::default()
        };
        assert!(db.edit_listing(listing.id, seller.id, bad, vec![], &[]).is_err());
        assert_eq!(db.get_listing(listing.id).unwrap().price, 40);
    }

    #[test]
    fn delete_requires_owner() {
        let mut db = Database::open_in_memory().unwrap();
        let seller = seed_user(&db, "Seller");
        let other = seed_user(&db, "Other");
        let listing = db.create_listing(new_listing(seller.id, "Desk", 40)).unwrap();

        assert!(matches!(
            db.delete_listing(listing.id, other.id),
            Err(StoreError::Forbidden(_))
        ));
        assert!(matches!(
            db.delete_listing(ListingId::new(), seller.id),
            Err(StoreError::NotFound("listing"))
        ));
        assert!(db.get_listing(listing.id).is_ok());

        let report = db.delete_listing(listing.id, seller.id).unwrap();
        assert_eq!(report.snapshots_removed, 1);
        assert!(matches!(
            db.get_listing(listing.id),
            Err(StoreError::NotFound("listing"))
        ));
        assert!(db.listing_data(seller.id).unwrap().is_empty());
    }

    #[test]
    fn browse_and_search() {
        let mut db = Database::open_in_memory().unwrap();
        let seller = seed_user(&db, "Seller");

        let mut lamp = new_listing(seller.id, "Desk lamp", 15);
        lamp.category = Category::Electronics;
        lamp.description = "Warm LED, 100% working".into();
        db.create_listing(lamp).unwrap();
        db.create_listing(new_listing(seller.id, "Desk", 40)).unwrap();
        db.create_listing(new_listing(seller.id, "Sofa", 90)).unwrap();

        let all = db.list_listings(&ListingQuery::default()).unwrap();
        assert_eq!(all.len(), 3);

        let electronics = db
            .list_listings(&ListingQuery {
                category: Some(Category::Electronics),
                text: None,
            })
            .unwrap();
        assert_eq!(electronics.len(), 1);

        let desks = db
            .list_listings(&ListingQuery {
                category: None,
                text: Some("DESK".into()),
            })
            .unwrap();
        assert_eq!(desks.len(), 2);

        let percent = db
            .list_listings(&ListingQuery {
                category: None,
                text: Some("100%".into()),
            })
            .unwrap();
        assert_eq!(percent.len(), 1);
        assert_eq!(percent[0].name, "Desk lamp");

        assert_eq!(db.listings_by_seller(seller.id).unwrap().len(), 3);
    }

    #[test]
    fn object_key_strips_prefix_and_query() {
        assert_eq!(object_key("1_a.png"), "1_a.png");
        assert_eq!(object_key("1_a.png?expires=1&sig=ab"), "1_a.png");
        assert_eq!(
            object_key("https://host/media/1_a.png?expires=1&sig=ab"),
            "1_a.png"
        );
    }
}
