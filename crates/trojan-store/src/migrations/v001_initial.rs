//! v001 -- Initial schema creation.
//!
//! Creates the account and listing tables: `users`, `listings`,
//! `listing_snapshots` (the per-seller `listingData` cache) and
//! `liked_listings` (the like ledger).

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Users
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS users (
    id              TEXT PRIMARY KEY NOT NULL,   -- UUID v4
    first_name      TEXT NOT NULL DEFAULT '',
    last_name       TEXT NOT NULL DEFAULT '',
    username        TEXT NOT NULL,
    email           TEXT NOT NULL UNIQUE COLLATE NOCASE,
    password_hash   TEXT NOT NULL,               -- argon2 PHC string
    profile_picture TEXT,                        -- media key, NULL = default picture
    created_at      TEXT NOT NULL                -- RFC-3339, microsecond precision
);

-- ----------------------------------------------------------------
-- Listings (source of truth)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS listings (
    id                  TEXT PRIMARY KEY NOT NULL,  -- UUID v4
    seller_id           TEXT NOT NULL,              -- FK -> users(id)
    name                TEXT NOT NULL,
    thumbnail           TEXT NOT NULL,              -- media key
    supplemental_images TEXT NOT NULL DEFAULT '[]', -- JSON array of media keys
    category            TEXT NOT NULL,
    price               INTEGER NOT NULL CHECK (price >= 0),
    condition           TEXT NOT NULL,
    description         TEXT NOT NULL DEFAULT '',
    num_likes           INTEGER NOT NULL DEFAULT 0 CHECK (num_likes >= 0),
    created_at          TEXT NOT NULL,
    available           INTEGER NOT NULL DEFAULT 1, -- boolean 0/1

    FOREIGN KEY (seller_id) REFERENCES users(id)
);

CREATE INDEX IF NOT EXISTS idx_listings_seller ON listings(seller_id);
CREATE INDEX IF NOT EXISTS idx_listings_category ON listings(category);
CREATE INDEX IF NOT EXISTS idx_listings_likes ON listings(num_likes DESC);

-- ----------------------------------------------------------------
-- Listing snapshots: a seller's copy of each listing they own.
-- Rewritten after every listing mutation, removed on delete.
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS listing_snapshots (
    user_id    TEXT NOT NULL,                  -- FK -> users(id)
    listing_id TEXT NOT NULL,                  -- FK -> listings(id)
    snapshot   TEXT NOT NULL,                  -- JSON-encoded listing

    PRIMARY KEY (user_id, listing_id),
    FOREIGN KEY (user_id) REFERENCES users(id),
    FOREIGN KEY (listing_id) REFERENCES listings(id)
);

-- ----------------------------------------------------------------
-- Liked listings (user side of the like ledger)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS liked_listings (
    user_id    TEXT NOT NULL,                  -- FK -> users(id)
    listing_id TEXT NOT NULL,                  -- FK -> listings(id)
    liked_at   TEXT NOT NULL,

    PRIMARY KEY (user_id, listing_id),
    FOREIGN KEY (user_id) REFERENCES users(id),
    FOREIGN KEY (listing_id) REFERENCES listings(id)
);

CREATE INDEX IF NOT EXISTS idx_liked_listings_listing ON liked_listings(listing_id);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
