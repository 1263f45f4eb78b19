//! Query Requests
//!
//! What a worker sends to the backend: an instant query against
//! `/api/v1/query`, or a range query against `/api/v1/query_range`.

use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Url;

use crate::client::{BackendRequest, PromClient};

/// Prefix shared by every Prometheus HTTP API endpoint
pub const API_PREFIX: &str = "/api/v1";
/// Instant query endpoint
pub const QUERY_ENDPOINT: &str = "/api/v1/query";
/// Range query endpoint
pub const QUERY_RANGE_ENDPOINT: &str = "/api/v1/query_range";

/// Evaluation window of a range query
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueryRange {
    /// Inclusive start
    pub start: DateTime<Utc>,
    /// Inclusive end
    pub end: DateTime<Utc>,
    /// Resolution step
    pub step: Duration,
}

impl QueryRange {
    /// Create a range; the backend rejects `end < start` or a zero step
    #[must_use]
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>, step: Duration) -> Self {
        Self { start, end, step }
    }
}

/// One query as handed to a worker
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct QueryRequest {
    pub(crate) query: String,
    pub(crate) range: Option<QueryRange>,
}

impl QueryRequest {
    pub(crate) fn instant(query: String) -> Self {
        Self { query, range: None }
    }

    pub(crate) fn range(query: String, range: QueryRange) -> Self {
        Self {
            query,
            range: Some(range),
        }
    }

    fn endpoint(&self) -> &'static str {
        if self.range.is_some() {
            QUERY_RANGE_ENDPOINT
        } else {
            QUERY_ENDPOINT
        }
    }

    /// URL-escaped `POST` with every parameter in the query string
    pub(crate) fn to_backend_request(&self, client: &dyn PromClient) -> BackendRequest {
        let mut url: Url = client.url(self.endpoint());
        {
            let mut params = url.query_pairs_mut();
            params.append_pair("query", &self.query);
            if let Some(range) = &self.range {
                params
                    .append_pair("start", &range.start.to_rfc3339_opts(SecondsFormat::AutoSi, true))
                    .append_pair("end", &range.end.to_rfc3339_opts(SecondsFormat::AutoSi, true))
                    .append_pair("step", &range.step.as_secs_f64().to_string());
            }
        }
        BackendRequest::post(url)
    }
}
