//! # trojan-shared
//!
//! Types shared by the Trojan Trade store and server: strongly typed entity
//! identifiers, the listing [`Category`](types::Category) set and
//! application-wide constants.

pub mod constants;
pub mod error;
pub mod types;

pub use error::{CategoryError, IdError};
pub use types::{Category, ConversationId, ListingId, MessageId, UserId};
