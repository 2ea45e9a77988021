use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdError {
    #[error("Missing {kind} id")]
    Missing { kind: &'static str },

    #[error("Invalid {kind} id: {value:?}")]
    Malformed { kind: &'static str, value: String },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown category: {0:?}")]
pub struct CategoryError(pub String);
