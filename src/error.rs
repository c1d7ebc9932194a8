use thiserror::Error;

/// Failure of a single round trip to the users API.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HttpError {
    #[error("request failed: {0}")]
    Network(String),

    #[error("API error {code}: {message}")]
    Status { code: u16, message: String },

    #[error("unexpected response body: {0}")]
    Decode(String),
}

impl HttpError {
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { code, .. } => Some(*code),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("Login failed. Please check your credentials.")]
    InvalidCredentials,

    #[error("{0} is required")]
    MissingField(&'static str),

    /// The token was issued but could not be written to durable storage.
    #[error("Could not save the session. Please try again.")]
    StorageFailed,
}

/// A page fetch failed; previously resident users are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Failed to load users. Please try again.")]
pub struct LoadFailed;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UpdateError {
    #[error("Failed to update user. Please try again.")]
    RemoteRejected,

    #[error("{0} is required")]
    MissingField(&'static str),

    #[error("user {0} is not on the current page")]
    UnknownUser(u64),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeleteError {
    #[error("Failed to delete user. Please try again.")]
    RemoteRejected,

    #[error("user {0} is not on the current page")]
    UnknownUser(u64),
}
