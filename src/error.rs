//! Error types for the fan-art refresh pipeline.

use thiserror::Error;

/// The shared cancellation signal fired while a caller was waiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("operation cancelled")]
pub struct Cancelled;

/// Failure of one streamed HTTP download to a local file.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("request to {url} failed: {source}")]
    Network {
        url: String,
        source: reqwest::Error,
    },

    #[error("HTTP {status} for {url}")]
    HttpStatus { status: u16, url: String },

    #[error("{operation} '{path}': {source}")]
    Io {
        operation: &'static str,
        path: String,
        source: std::io::Error,
    },

    #[error("download cancelled")]
    Cancelled,
}

impl From<Cancelled> for TransferError {
    fn from(_: Cancelled) -> Self {
        Self::Cancelled
    }
}

/// Errors raised while downloading a manifest to disk.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Network {
        url: String,
        source: reqwest::Error,
    },

    #[error("fanart service returned HTTP {status} for {url}")]
    HttpStatus { status: u16, url: String },

    #[error("{operation} '{path}': {source}")]
    Io {
        operation: &'static str,
        path: String,
        source: std::io::Error,
    },

    #[error("external id '{0}' cannot be used as a manifest key")]
    InvalidSubjectId(String),

    #[error("manifest fetch cancelled")]
    Cancelled,
}

impl From<Cancelled> for FetchError {
    fn from(_: Cancelled) -> Self {
        Self::Cancelled
    }
}

impl From<TransferError> for FetchError {
    fn from(error: TransferError) -> Self {
        match error {
            TransferError::Network { url, source } => Self::Network { url, source },
            TransferError::HttpStatus { status, url } => Self::HttpStatus { status, url },
            TransferError::Io {
                operation,
                path,
                source,
            } => Self::Io {
                operation,
                path,
                source,
            },
            TransferError::Cancelled => Self::Cancelled,
        }
    }
}

/// Errors raised while loading a stored manifest.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("failed to read manifest '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("malformed manifest '{path}': {message}")]
    Malformed { path: String, message: String },

    #[error("manifest '{path}' has no root element")]
    Empty { path: String },
}

/// Errors raised by the image persistence collaborator.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("image request to {url} failed: {source}")]
    Network {
        url: String,
        source: reqwest::Error,
    },

    #[error("image host returned HTTP {status} for {url}")]
    HttpStatus { status: u16, url: String },

    #[error("{operation} '{path}': {source}")]
    Io {
        operation: &'static str,
        path: String,
        source: std::io::Error,
    },

    #[error("invalid image file name '{0}'")]
    InvalidFileName(String),

    #[error("image download cancelled")]
    Cancelled,
}

impl From<Cancelled> for StoreError {
    fn from(_: Cancelled) -> Self {
        Self::Cancelled
    }
}

impl From<TransferError> for StoreError {
    fn from(error: TransferError) -> Self {
        match error {
            TransferError::Network { url, source } => Self::Network { url, source },
            TransferError::HttpStatus { status, url } => Self::HttpStatus { status, url },
            TransferError::Io {
                operation,
                path,
                source,
            } => Self::Io {
                operation,
                path,
                source,
            },
            TransferError::Cancelled => Self::Cancelled,
        }
    }
}

/// Terminal outcome of a refresh cycle that did not complete.
#[derive(Debug, Error)]
pub enum RefreshError {
    #[error(transparent)]
    Fetch(FetchError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("refresh cancelled")]
    Cancelled,
}

impl RefreshError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<FetchError> for RefreshError {
    fn from(error: FetchError) -> Self {
        match error {
            FetchError::Cancelled => Self::Cancelled,
            other => Self::Fetch(other),
        }
    }
}

impl From<Cancelled> for RefreshError {
    fn from(_: Cancelled) -> Self {
        Self::Cancelled
    }
}
