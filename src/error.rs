//! Error types for configuration, authentication, fetching and export.

use std::{fmt, time::Duration};

use thiserror::Error;

use crate::types::Library;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("token cache I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("token cache is corrupt: {0}")]
    Serde(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("authorization was denied: {0}")]
    ConsentDenied(String),
    #[error("authorization timed out after {} seconds", .0.as_secs())]
    ConsentTimeout(Duration),
    #[error("invalid authorization callback: {0}")]
    InvalidCallback(String),
    #[error("cannot start the callback server: {0}")]
    CallbackServer(#[source] std::io::Error),
    #[error("authorization code was rejected: {0}")]
    CodeRejected(String),
    #[error("refresh token was rejected: {0}")]
    RefreshRejected(String),
    #[error("token response did not contain a refresh token")]
    MissingRefreshToken,
    #[error("access token has expired")]
    Expired,
    #[error("token request failed: {0}")]
    Transport(String),
    #[error("unexpected token response: {0}")]
    InvalidResponse(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// A failed request against the Web API, before it is tied to a page.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    #[error("rate limited by the provider")]
    RateLimited { retry_after: Option<Duration> },
    #[error("access token was rejected")]
    Unauthorized,
    #[error("provider returned status {status}: {message}")]
    Status { status: u16, message: String },
    #[error("request failed: {0}")]
    Transport(String),
    #[error("malformed response: {0}")]
    Decode(String),
}

impl ApiError {
    /// Whether a second attempt at the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::RateLimited { .. } | ApiError::Transport(_) => true,
            ApiError::Status { status, .. } => *status >= 500,
            ApiError::Unauthorized | ApiError::Decode(_) => false,
        }
    }
}

/// The two collections of a user's library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Playlists,
    SavedTracks,
}

impl Collection {
    pub fn path(&self) -> &'static str {
        match self {
            Collection::Playlists => "/me/playlists",
            Collection::SavedTracks => "/me/tracks",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Collection::Playlists => write!(f, "playlists"),
            Collection::SavedTracks => write!(f, "saved tracks"),
        }
    }
}

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("rate limited while fetching {collection} at offset {offset}")]
    RateLimited {
        collection: Collection,
        offset: u32,
        retry_after: Option<Duration>,
    },
    #[error("network failure while fetching {collection} at offset {offset}: {message}")]
    Network {
        collection: Collection,
        offset: u32,
        message: String,
    },
    #[error("fetching {collection} at offset {offset} failed with status {status}: {message}")]
    Status {
        collection: Collection,
        offset: u32,
        status: u16,
        message: String,
    },
    #[error("cannot decode {collection} page at offset {offset}: {message}")]
    Decode {
        collection: Collection,
        offset: u32,
        message: String,
    },
    #[error(transparent)]
    Auth(#[from] AuthError),
}

impl FetchError {
    pub fn from_api(err: ApiError, collection: Collection, offset: u32) -> Self {
        match err {
            ApiError::RateLimited { retry_after } => FetchError::RateLimited {
                collection,
                offset,
                retry_after,
            },
            ApiError::Unauthorized => FetchError::Status {
                collection,
                offset,
                status: 401,
                message: "access token was rejected".to_string(),
            },
            ApiError::Status { status, message } => FetchError::Status {
                collection,
                offset,
                status,
                message,
            },
            ApiError::Transport(message) => FetchError::Network {
                collection,
                offset,
                message,
            },
            ApiError::Decode(message) => FetchError::Decode {
                collection,
                offset,
                message,
            },
        }
    }
}

/// A fetch that stopped early, with everything gathered before the failure.
#[derive(Error, Debug)]
#[error("{error}")]
pub struct FetchFailure {
    #[source]
    pub error: FetchError,
    pub partial: Library,
}

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("cannot write export file: {0}")]
    Io(#[from] std::io::Error),
    #[error("cannot write CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("cannot write JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("cannot infer export format from {0}, pass --format")]
    UnknownFormat(String),
}
