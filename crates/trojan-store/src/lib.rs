//! # trojan-store
//!
//! Persistent storage for the Trojan Trade marketplace, backed by SQLite.
//!
//! The crate exposes a synchronous [`Database`] handle that wraps a
//! `rusqlite::Connection` and provides typed operations for every domain
//! model. Operations that touch more than one table (listing create / edit /
//! delete, like / unlike, sending a message) each run in a single
//! transaction, which is how the cross-table invariants are kept:
//!
//! - a listing's `num_likes` equals the number of users that like it;
//! - a seller's `listingData` copy equals the listing row;
//! - one conversation per unordered participant pair and listing;
//! - deleting a listing leaves no likes, copies, conversations or messages
//!   pointing at it.

pub mod conversations;
pub mod database;
pub mod likes;
pub mod listings;
pub mod migrations;
pub mod models;
pub mod users;

mod error;
mod messages;

pub use database::Database;
pub use error::{Result, StoreError};
pub use listings::object_key;
pub use models::*;
