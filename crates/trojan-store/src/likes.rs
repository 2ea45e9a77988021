//! The like ledger: a user's liked set and each listing's `num_likes`
//! counter, always written together in one transaction.

use rusqlite::params;
use trojan_shared::{ListingId, UserId};

use crate::database::{format_ts, now, uuid_col, Database};
use crate::error::{Result, StoreError};
use crate::listings::{fetch_listing, refresh_snapshot, row_to_listing};
use crate::models::{LikeOutcome, Listing};
use crate::users::ensure_user;

impl Database {
    /// Add `listing_id` to the user's liked set. Liking twice is a no-op.
    ///
    /// Sellers may like their own listings.
    pub fn like(&mut self, user_id: UserId, listing_id: ListingId) -> Result<LikeOutcome> {
        let tx = self.conn_mut().transaction()?;
        ensure_user(&tx, user_id)?;
        let listing = fetch_listing(&tx, listing_id)?;

        let inserted = tx.execute(
            "INSERT OR IGNORE INTO liked_listings (user_id, listing_id, liked_at)
             VALUES (?1, ?2, ?3)",
            params![user_id.to_string(), listing_id.to_string(), format_ts(&now())],
        )?;

        let num_likes = if inserted == 1 {
            tx.execute(
                "UPDATE listings SET num_likes = num_likes + 1 WHERE id = ?1",
                params![listing_id.to_string()],
            )?;
            refresh_snapshot(&tx, listing_id)?.num_likes
        } else {
            listing.num_likes
        };
        tx.commit()?;

        if inserted == 1 {
            tracing::debug!(user = %user_id, listing = %listing_id, num_likes, "listing liked");
        }
        Ok(LikeOutcome {
            liked: true,
            changed: inserted == 1,
            num_likes,
        })
    }

    /// Remove `listing_id` from the user's liked set. Unliking a listing
    /// that is not liked is a no-op.
    pub fn unlike(&mut self, user_id: UserId, listing_id: ListingId) -> Result<LikeOutcome> {
        let tx = self.conn_mut().transaction()?;
        ensure_user(&tx, user_id)?;
        let listing = fetch_listing(&tx, listing_id)?;

        let removed = tx.execute(
            "DELETE FROM liked_listings WHERE user_id = ?1 AND listing_id = ?2",
            params![user_id.to_string(), listing_id.to_string()],
        )?;

        let num_likes = if removed == 1 {
            tx.execute(
                "UPDATE listings SET num_likes = MAX(num_likes - 1, 0) WHERE id = ?1",
                params![listing_id.to_string()],
            )?;
            refresh_snapshot(&tx, listing_id)?.num_likes
        } else {
            listing.num_likes
        };
        tx.commit()?;

        if removed == 1 {
            tracing::debug!(user = %user_id, listing = %listing_id, num_likes, "listing unliked");
        }
        Ok(LikeOutcome {
            liked: false,
            changed: removed == 1,
            num_likes,
        })
    }

    #[cfg(test)]
    pub fn is_liked(&self, user_id: UserId, listing_id: ListingId) -> Result<bool> {
        let liked = self.conn().query_row(
            "SELECT EXISTS(SELECT 1 FROM liked_listings WHERE user_id = ?1 AND listing_id = ?2)",
            params![user_id.to_string(), listing_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(liked)
    }

    /// Ids of the listings a user likes, oldest like first.
    pub fn liked_listing_ids(&self, user_id: UserId) -> Result<Vec<ListingId>> {
        let mut stmt = self.conn().prepare(
            "SELECT listing_id FROM liked_listings
             WHERE user_id = ?1
             ORDER BY liked_at ASC, rowid ASC",
        )?;
        let rows = stmt.query_map(params![user_id.to_string()], |row| {
            Ok(ListingId(uuid_col(row, 0)?))
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }

    /// The listings a user likes, oldest like first.
    pub fn liked_listings(&self, user_id: UserId) -> Result<Vec<Listing>> {
        ensure_user(self.conn(), user_id)?;
        let mut stmt = self.conn().prepare(
            "SELECT l.id, l.seller_id, l.name, l.thumbnail, l.supplemental_images, l.category,
                    l.price, l.condition, l.description, l.num_likes, l.created_at, l.available
             FROM liked_listings ll
             JOIN listings l ON l.id = ll.listing_id
             WHERE ll.user_id = ?1
             ORDER BY ll.liked_at ASC, ll.rowid ASC",
        )?;
        let rows = stmt.query_map(params![user_id.to_string()], row_to_listing)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }

    /// Number of users whose liked set contains the listing.
    #[cfg(test)]
    pub fn count_likes(&self, listing_id: ListingId) -> Result<u32> {
        let count = self.conn().query_row(
            "SELECT COUNT(*) FROM liked_listings WHERE listing_id = ?1",
            params![listing_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{new_listing, seed_user};

    #[test]
    fn desk_like_scenario() {
        let mut db = Database::open_in_memory().unwrap();
        let u1 = seed_user(&db, "Seller");
        let u2 = seed_user(&db, "Buyer");
        let desk = db.create_listing(new_listing(u1.id, "Desk", 40)).unwrap();

        let first = db.like(u2.id, desk.id).unwrap();
        assert_eq!(first, LikeOutcome { liked: true, changed: true, num_likes: 1 });
        assert_eq!(db.liked_listing_ids(u2.id).unwrap(), vec![desk.id]);

        let second = db.like(u2.id, desk.id).unwrap();
        assert_eq!(second, LikeOutcome { liked: true, changed: false, num_likes: 1 });
        assert_eq!(db.get_listing(desk.id).unwrap().num_likes, 1);

        let unliked = db.unlike(u2.id, desk.id).unwrap();
        assert_eq!(unliked, LikeOutcome { liked: false, changed: true, num_likes: 0 });
        assert!(db.liked_listing_ids(u2.id).unwrap().is_empty());
        assert_eq!(db.get_listing(desk.id).unwrap().num_likes, 0);
    }

    #[test]
    fn unlike_when_not_liked_is_noop() {
        let mut db = Database::open_in_memory().unwrap();
        let seller = seed_user(&db, "Seller");
        let buyer = seed_user(&db, "Buyer");
        let desk = db.create_listing(new_listing(seller.id, "Desk", 40)).unwrap();

        let outcome = db.unlike(buyer.id, desk.id).unwrap();
        assert!(!outcome.changed);
        assert_eq!(db.get_listing(desk.id).unwrap().num_likes, 0);

        db.like(buyer.id, desk.id).unwrap();
        db.unlike(buyer.id, desk.id).unwrap();
        db.unlike(buyer.id, desk.id).unwrap();
        assert_eq!(db.get_listing(desk.id).unwrap().num_likes, 0);
    }

    #[test]
    fn counter_matches_liked_sets() {
        let mut db = Database::open_in_memory().unwrap();
        let seller = seed_user(&db, "Seller");
        let users: Vec<_> = ["A", "B", "C", "D"]
            .iter()
            .map(|n| seed_user(&db, n))
            .collect();
        let desk = db.create_listing(new_listing(seller.id, "Desk", 40)).unwrap();
        let sofa = db.create_listing(new_listing(seller.id, "Sofa", 90)).unwrap();

        let ops = [
            (0, desk.id, true),
            (1, desk.id, true),
            (0, desk.id, true),
            (2, sofa.id, true),
            (1, desk.id, false),
            (3, desk.id, true),
            (2, sofa.id, false),
            (2, sofa.id, false),
            (0, sofa.id, true),
        ];
        for (user, listing, like) in ops {
            if like {
                db.like(users[user].id, listing).unwrap();
            } else {
                db.unlike(users[user].id, listing).unwrap();
            }
        }

        for listing in [desk.id, sofa.id] {
            let stored = db.get_listing(listing).unwrap();
            let holders = users
                .iter()
                .filter(|u| db.liked_listing_ids(u.id).unwrap().contains(&listing))
                .count() as u32;
            assert_eq!(stored.num_likes, holders);
            assert_eq!(db.count_likes(listing).unwrap(), holders);
        }
        assert_eq!(db.get_listing(desk.id).unwrap().num_likes, 2);
        assert_eq!(db.get_listing(sofa.id).unwrap().num_likes, 1);
    }

    #[test]
    fn like_refreshes_seller_copy() {
        let mut db = Database::open_in_memory().unwrap();
        let seller = seed_user(&db, "Seller");
        let buyer = seed_user(&db, "Buyer");
        let desk = db.create_listing(new_listing(seller.id, "Desk", 40)).unwrap();

        db.like(buyer.id, desk.id).unwrap();
        assert_eq!(db.listing_data(seller.id).unwrap()[&desk.id].num_likes, 1);
        db.unlike(buyer.id, desk.id).unwrap();
        assert_eq!(db.listing_data(seller.id).unwrap()[&desk.id].num_likes, 0);
    }

    #[test]
    fn seller_may_like_own_listing() {
        let mut db = Database::open_in_memory().unwrap();
        let seller = seed_user(&db, "Seller");
        let desk = db.create_listing(new_listing(seller.id, "Desk", 40)).unwrap();

        assert!(db.like(seller.id, desk.id).unwrap().changed);
        assert!(db.is_liked(seller.id, desk.id).unwrap());
    }

    #[test]
    fn like_missing_records() {
        let mut db = Database::open_in_memory().unwrap();
        let seller = seed_user(&db, "Seller");
        let desk = db.create_listing(new_listing(seller.id, "Desk", 40)).unwrap();

        assert!(matches!(
            db.like(UserId::new(), desk.id),
            Err(StoreError::NotFound("user"))
        ));
        assert!(matches!(
            db.like(seller.id, ListingId::new()),
            Err(StoreError::NotFound("listing"))
        ));
        assert_eq!(db.get_listing(desk.id).unwrap().num_likes, 0);
    }

    #[test]
    fn liked_listings_in_like_order() {
        let mut db = Database::open_in_memory().unwrap();
        let seller = seed_user(&db, "Seller");
        let buyer = seed_user(&db, "Buyer");
        let desk = db.create_listing(new_listing(seller.id, "Desk", 40)).unwrap();
        let sofa = db.create_listing(new_listing(seller.id, "Sofa", 90)).unwrap();

        db.like(buyer.id, sofa.id).unwrap();
        db.like(buyer.id, desk.id).unwrap();

        let names: Vec<_> = db
            .liked_listings(buyer.id)
            .unwrap()
            .into_iter()
            .map(|l| l.name)
            .collect();
        assert_eq!(names, vec!["Sofa", "Desk"]);
    }
}
