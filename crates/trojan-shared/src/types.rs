use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CategoryError, IdError};

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Parse a client-supplied id, distinguishing "absent" from "malformed".
            pub fn parse(s: &str) -> Result<Self, IdError> {
                let s = s.trim();
                if s.is_empty() {
                    return Err(IdError::Missing { kind: $kind });
                }
                Uuid::parse_str(s).map(Self).map_err(|_| IdError::Malformed {
                    kind: $kind,
                    value: s.to_string(),
                })
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }
    };
}

entity_id!(
    /// Identifier of a registered account.
    UserId,
    "user"
);
entity_id!(
    /// Identifier of an item for sale.
    ListingId,
    "listing"
);
entity_id!(ConversationId, "conversation");
entity_id!(MessageId, "message");

/// Listing categories offered by the marketplace.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Category {
    Electronics,
    Furniture,
    Clothing,
    Books,
    Other,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Electronics,
        Category::Furniture,
        Category::Clothing,
        Category::Books,
        Category::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Electronics => "Electronics",
            Category::Furniture => "Furniture",
            Category::Clothing => "Clothing",
            Category::Books => "Books",
            Category::Other => "Other",
        }
    }

    /// Parse a browse/search filter. Absent, empty and `"All"` mean no filter.
    pub fn parse_filter(raw: Option<&str>) -> Result<Option<Self>, CategoryError> {
        match raw.map(str::trim) {
            None | Some("") => Ok(None),
            Some(s) if s.eq_ignore_ascii_case("all") => Ok(None),
            Some(s) => s.parse().map(Some),
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = CategoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Category::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| CategoryError(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_distinguishes_missing_from_malformed() {
        assert_eq!(
            ListingId::parse("  "),
            Err(IdError::Missing { kind: "listing" })
        );
        assert!(matches!(
            UserId::parse("not-a-uuid"),
            Err(IdError::Malformed { kind: "user", .. })
        ));

        let id = ListingId::new();
        assert_eq!(ListingId::parse(&id.to_string()), Ok(id));
    }

    #[test]
    fn ids_serialize_as_plain_strings() {
        let id = ConversationId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id.0));
    }

    #[test]
    fn category_parsing_is_case_insensitive() {
        assert_eq!("books".parse::<Category>(), Ok(Category::Books));
        assert_eq!(" Furniture ".parse::<Category>(), Ok(Category::Furniture));
        assert!("Cars".parse::<Category>().is_err());
    }

    #[test]
    fn category_filter_treats_all_as_none() {
        assert_eq!(Category::parse_filter(None), Ok(None));
        assert_eq!(Category::parse_filter(Some("All")), Ok(None));
        assert_eq!(Category::parse_filter(Some("")), Ok(None));
        assert_eq!(
            Category::parse_filter(Some("Clothing")),
            Ok(Some(Category::Clothing))
        );
    }
}
