//! Query Dispatcher
//!
//! [`QueryContext`] fans a batch of queries out to one task each, bounds the
//! backend calls with an [`AdmissionGate`], and hands back one
//! [`QueryResultsReceiver`] per query in submission order. Failures are never
//! returned to the caller directly; they accumulate in the context's
//! [`ErrorCollector`] and the failed query publishes empty results.
//!
//! # Worker Lifecycle
//!
//! ```text
//! created -> awaiting-permit -> in-flight-request -> decoding -> parsing -> published
//!                  |                    |               |           |
//!                  +--------------------+---------------+-----------+--> report error,
//!                                                                        publish empty
//! ```
//!
//! Only the in-flight phase holds a permit; decoding and parsing run outside
//! the gate. Every worker publishes exactly once, whatever happens.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, info, trace};

use crate::client::PromClient;
use crate::collector::ErrorCollector;
use crate::config::QueryConfig;
use crate::error::QueryError;
use crate::gate::{AdmissionGate, GateError, GateStats, DEFAULT_CAPACITY};
use crate::receiver::QueryResultsReceiver;
use crate::request::{QueryRange, QueryRequest};
use crate::result::QueryResults;

/// Longest excerpt of an error body quoted in a transport error
const MAX_ERROR_BODY_CHARS: usize = 256;

/// State shared by every worker of one context
struct Shared {
    client: Arc<dyn PromClient>,
    gate: AdmissionGate,
    errors: ErrorCollector,
    request_timeout: Duration,
}

/// Concurrent query session against one backend
///
/// Cheap to clone; clones share the gate and the error collector.
#[derive(Clone)]
pub struct QueryContext {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for QueryContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryContext")
            .field("client", &self.shared.client.name())
            .field("gate", &self.shared.gate)
            .field("errors", &self.shared.errors.len())
            .field("request_timeout", &self.shared.request_timeout)
            .finish()
    }
}

impl QueryContext {
    /// Create a context with the default capacity (20) and request timeout
    pub fn new(client: impl PromClient + 'static) -> Self {
        Self::with_shared_client(
            Arc::new(client),
            DEFAULT_CAPACITY,
            crate::client::DEFAULT_REQUEST_TIMEOUT,
        )
    }

    /// Create a context using the concurrency and timeout from `config`
    pub fn from_config(client: impl PromClient + 'static, config: &QueryConfig) -> Self {
        Self::with_shared_client(
            Arc::new(client),
            config.max_concurrency,
            config.request_timeout,
        )
    }

    /// Create a context around an already shared client
    pub fn with_shared_client(
        client: Arc<dyn PromClient>,
        max_concurrency: usize,
        request_timeout: Duration,
    ) -> Self {
        let gate = AdmissionGate::new(max_concurrency);
        info!(
            client = client.name(),
            max_concurrency = gate.capacity(),
            ?request_timeout,
            "Query context created"
        );

        Self {
            shared: Arc::new(Shared {
                client,
                gate,
                errors: ErrorCollector::new(),
                request_timeout,
            }),
        }
    }

    /// Run every query concurrently
    ///
    /// The i-th receiver carries the results of the i-th query. Completion
    /// order is unspecified.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn query_all<I, S>(&self, queries: I) -> Vec<QueryResultsReceiver>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        queries.into_iter().map(|q| self.query(q)).collect()
    }

    /// Start one query and return its result channel immediately
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn query(&self, query: impl Into<String>) -> QueryResultsReceiver {
        self.spawn(QueryRequest::instant(query.into()))
    }

    /// Range-query counterpart of [`query_all`](Self::query_all)
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn query_range_all<I, S>(&self, queries: I, range: QueryRange) -> Vec<QueryResultsReceiver>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        queries
            .into_iter()
            .map(|q| self.query_range(q, range))
            .collect()
    }

    /// Start one range query over `range`
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn query_range(&self, query: impl Into<String>, range: QueryRange) -> QueryResultsReceiver {
        self.spawn(QueryRequest::range(query.into(), range))
    }

    /// Snapshot of every error reported by this context's workers
    pub fn errors(&self) -> Vec<QueryError> {
        self.shared.errors.errors()
    }

    /// The shared error collector
    pub fn error_collector(&self) -> &ErrorCollector {
        &self.shared.errors
    }

    /// Admission gate usage
    pub fn gate_stats(&self) -> GateStats {
        self.shared.gate.stats()
    }

    /// Change how many backend requests may be in flight
    ///
    /// See [`AdmissionGate::set_capacity`] for how shrinking interacts with
    /// requests already running.
    pub async fn set_max_concurrency(&self, max_concurrency: usize) -> Result<(), GateError> {
        self.shared.gate.set_capacity(max_concurrency).await
    }

    fn spawn(&self, request: QueryRequest) -> QueryResultsReceiver {
        let (tx, rx) = QueryResultsReceiver::channel(&request.query);
        // Built outside the task so it is dropped even if the task never runs
        let publisher = Publisher {
            tx: Some(tx),
            shared: Arc::clone(&self.shared),
            query: request.query.clone(),
        };

        tokio::spawn(async move {
            let mut publisher = publisher;
            let results = publisher.shared.run(&request).await;
            publisher.publish(results);
        });

        rx
    }
}

/// Sending half of a worker's result channel
///
/// A worker torn down before publishing (panic, runtime shutdown) reports a
/// Transport error on drop, so every lost query still has one error entry.
struct Publisher {
    tx: Option<oneshot::Sender<QueryResults>>,
    shared: Arc<Shared>,
    query: String,
}

impl Publisher {
    fn publish(&mut self, results: QueryResults) {
        if let Some(tx) = self.tx.take() {
            if tx.send(results).is_err() {
                trace!(query = %self.query, "Result receiver dropped before publish");
            }
        }
    }
}

impl Drop for Publisher {
    fn drop(&mut self) {
        if self.tx.is_some() {
            self.shared.errors.report(QueryError::transport(
                self.query.as_str(),
                None,
                "query worker exited without publishing results",
            ));
        }
    }
}

impl Shared {
    /// Full worker lifecycle; always produces a value to publish
    async fn run(&self, request: &QueryRequest) -> QueryResults {
        let query = request.query.as_str();

        let body = match self.fetch(request).await {
            Ok(body) => body,
            Err(e) => {
                self.errors.report(e);
                return QueryResults::empty(query);
            }
        };

        trace!(query, bytes = body.len(), "Decoding response");
        let raw: Value = match serde_json::from_slice(&body) {
            Ok(raw) => raw,
            Err(e) => {
                self.errors.report(QueryError::Decode {
                    query: query.to_string(),
                    message: e.to_string(),
                });
                return QueryResults::empty(query);
            }
        };

        log_warnings(query, &raw);

        match QueryResults::parse(query, &raw) {
            Ok(results) => {
                trace!(query, series = results.results.len(), "Query parsed");
                results
            }
            Err(source) => {
                self.errors.report(QueryError::Parse {
                    query: query.to_string(),
                    source,
                });
                QueryResults::empty(query)
            }
        }
    }

    /// Gated network phase; returns the body of a successful response
    async fn fetch(&self, request: &QueryRequest) -> Result<Vec<u8>, QueryError> {
        let query = request.query.as_str();

        trace!(query, "Awaiting admission permit");
        let permit = self
            .gate
            .acquire()
            .await
            .map_err(|e| QueryError::transport(query, None, e.to_string()))?;

        let backend_request = request.to_backend_request(self.client.as_ref());
        trace!(query, url = %backend_request.url, "Sending query");

        let outcome = tokio::time::timeout(
            self.request_timeout,
            self.client.execute(backend_request),
        )
        .await;
        drop(permit);

        let response = match outcome {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return Err(QueryError::transport(query, None, e.to_string())),
            Err(_) => {
                return Err(QueryError::transport(
                    query,
                    None,
                    format!("request timed out after {:?}", self.request_timeout),
                ))
            }
        };

        if !response.status.is_success() {
            return Err(QueryError::transport(
                query,
                Some(response.status.as_u16()),
                format!(
                    "backend returned {}: {}",
                    response.status,
                    error_detail(&response.body)
                ),
            ));
        }

        Ok(response.body)
    }
}

/// Backend warnings are advisory; they only reach the debug log
fn log_warnings(query: &str, raw: &Value) {
    let Some(warnings) = raw.get("warnings").and_then(Value::as_array) else {
        return;
    };
    for warning in warnings.iter().filter_map(Value::as_str) {
        debug!(query, warning, "Backend warning for query");
    }
}

/// Best description of a non-success response body
fn error_detail(body: &[u8]) -> String {
    if let Ok(raw) = serde_json::from_slice::<Value>(body) {
        if let Some(error) = raw.get("error").and_then(Value::as_str) {
            return error.to_string();
        }
    }

    let text = String::from_utf8_lossy(body);
    let text = text.trim();
    if text.is_empty() {
        "empty response body".to_string()
    } else {
        text.chars().take(MAX_ERROR_BODY_CHARS).collect()
    }
}
