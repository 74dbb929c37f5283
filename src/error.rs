//! Unified error type.

use std::net::AddrParseError;
use std::string::FromUtf8Error;

use http::StatusCode;

/// Boxed application error carried by [`Error::Handler`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Shorthand used across the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// The error type returned by weir's fallible operations.
///
/// Routing misses are not errors: they fall through to the adapter's
/// not-found response. Everything here either stops the request (and is
/// turned into a status by [`App::handler`](crate::App::handler)) or is an
/// infrastructure failure surfaced by [`Server`](crate::Server).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid socket address: {0}")]
    Addr(#[from] AddrParseError),

    /// A handler invoked its `next` continuation more than once, or tried to
    /// move the cursor backwards. Always a bug in the calling handler.
    #[error("next() called more than once (handler index {index})")]
    NextCalledTwice { index: usize },

    #[error("malformed percent-encoding in path parameter `{name}`")]
    MalformedParam {
        name: String,
        #[source]
        source: FromUtf8Error,
    },

    #[error("invalid header name: {0}")]
    InvalidHeaderName(#[from] http::header::InvalidHeaderName),

    #[error("invalid header value: {0}")]
    InvalidHeaderValue(#[from] http::header::InvalidHeaderValue),

    #[error("request body is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("handler failed: {0}")]
    Handler(#[source] BoxError),
}

impl Error {
    /// Wraps an application error so it can be returned from a handler with `?`.
    pub fn handler(err: impl Into<BoxError>) -> Self {
        Self::Handler(err.into())
    }

    /// The status the composition root answers with when this error escapes
    /// the pipeline.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MalformedParam { .. } => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
