//! Query Errors
//!
//! Error taxonomy for query workers. None of these are returned to the caller
//! of [`QueryContext::query`](crate::QueryContext::query); every failure is
//! routed into the context's [`ErrorCollector`](crate::ErrorCollector) and the
//! affected query publishes an empty result instead.

use thiserror::Error;

use crate::result::ParseError;

/// Coarse classification of a [`QueryError`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum QueryErrorKind {
    /// The backend call itself failed
    Transport,
    /// The backend answered but the body was not JSON
    Decode,
    /// The body was JSON but not a recognizable query response
    Parse,
}

impl std::fmt::Display for QueryErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transport => write!(f, "transport"),
            Self::Decode => write!(f, "decode"),
            Self::Parse => write!(f, "parse"),
        }
    }
}

/// Failure of a single query
///
/// Every variant carries the query text so that a snapshot of collected
/// errors can be attributed back to the query that produced it.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum QueryError {
    /// Request construction failure, network failure, timeout or non-success status
    #[error("error fetching query {query:?}: {message}")]
    Transport {
        /// The query that failed
        query: String,
        /// HTTP status code, when the backend answered
        status: Option<u16>,
        /// Human-readable failure description
        message: String,
    },

    /// Response body is not valid JSON
    #[error("error decoding response for query {query:?}: {message}")]
    Decode {
        /// The query that failed
        query: String,
        /// Decoder error description
        message: String,
    },

    /// Response JSON does not match the expected query response shape
    #[error("error parsing response for query {query:?}: {source}")]
    Parse {
        /// The query that failed
        query: String,
        /// Shape mismatch details
        #[source]
        source: ParseError,
    },
}

impl QueryError {
    pub(crate) fn transport(
        query: impl Into<String>,
        status: Option<u16>,
        message: impl Into<String>,
    ) -> Self {
        Self::Transport {
            query: query.into(),
            status,
            message: message.into(),
        }
    }

    /// The query this error belongs to
    #[must_use]
    pub fn query(&self) -> &str {
        match self {
            Self::Transport { query, .. } | Self::Decode { query, .. } | Self::Parse { query, .. } => {
                query
            }
        }
    }

    /// Classification of this error
    #[must_use]
    pub fn kind(&self) -> QueryErrorKind {
        match self {
            Self::Transport { .. } => QueryErrorKind::Transport,
            Self::Decode { .. } => QueryErrorKind::Decode,
            Self::Parse { .. } => QueryErrorKind::Parse,
        }
    }

    /// HTTP status returned by the backend, if the failure carried one
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Transport { status, .. } => *status,
            _ => None,
        }
    }
}
