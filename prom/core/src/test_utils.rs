//! In-Memory Backend for Tests
//!
//! [`MockClient`] answers requests from a table of canned responses keyed by
//! query text, records every request, and tracks how many calls are in
//! flight at once so tests can check the admission bound.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::{StatusCode, Url};
use serde_json::json;

use crate::client::{BackendRequest, BackendResponse, ClientError, PromClient};

/// How the mock answers one query
#[derive(Clone, Debug)]
pub(crate) enum MockResponse {
    /// Return this status and body
    Reply(StatusCode, Vec<u8>),
    /// Fail at the transport level
    Fail(String),
    /// Never answer
    Hang,
}

impl MockResponse {
    /// `200 OK` with a vector result holding one sample per `(job, value)`
    pub(crate) fn vector(series: &[(&str, &str)]) -> Self {
        let result: Vec<_> = series
            .iter()
            .map(|(job, value)| json!({"metric": {"job": job}, "value": [1_700_000_000, value]}))
            .collect();
        let body = json!({
            "status": "success",
            "data": {"resultType": "vector", "result": result}
        });
        Self::Reply(StatusCode::OK, body.to_string().into_bytes())
    }

    pub(crate) fn status(status: StatusCode, body: &str) -> Self {
        Self::Reply(status, body.as_bytes().to_vec())
    }
}

struct MockState {
    responses: Mutex<HashMap<String, MockResponse>>,
    fallback: Mutex<MockResponse>,
    delay: Mutex<Duration>,
    requests: Mutex<Vec<BackendRequest>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

/// Shared-state mock backend; clones observe the same state
#[derive(Clone)]
pub(crate) struct MockClient {
    state: Arc<MockState>,
}

impl MockClient {
    pub(crate) fn new() -> Self {
        Self {
            state: Arc::new(MockState {
                responses: Mutex::new(HashMap::new()),
                fallback: Mutex::new(MockResponse::vector(&[])),
                delay: Mutex::new(Duration::ZERO),
                requests: Mutex::new(Vec::new()),
                in_flight: AtomicUsize::new(0),
                peak_in_flight: AtomicUsize::new(0),
            }),
        }
    }

    /// Answer `query` with `response`
    pub(crate) fn respond(&self, query: &str, response: MockResponse) -> &Self {
        self.state
            .responses
            .lock()
            .insert(query.to_string(), response);
        self
    }

    /// Answer every unlisted query with `response`
    pub(crate) fn respond_default(&self, response: MockResponse) -> &Self {
        *self.state.fallback.lock() = response;
        self
    }

    /// Hold every call for `delay` before answering
    pub(crate) fn with_delay(&self, delay: Duration) -> &Self {
        *self.state.delay.lock() = delay;
        self
    }

    pub(crate) fn requests(&self) -> Vec<BackendRequest> {
        self.state.requests.lock().clone()
    }

    pub(crate) fn peak_in_flight(&self) -> usize {
        self.state.peak_in_flight.load(Ordering::SeqCst)
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl PromClient for MockClient {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn url(&self, endpoint: &str) -> Url {
        let mut url = Url::parse("http://mock.invalid").expect("static URL");
        url.set_path(endpoint);
        url
    }

    async fn execute(&self, request: BackendRequest) -> Result<BackendResponse, ClientError> {
        let state = &self.state;
        let current = state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        state.peak_in_flight.fetch_max(current, Ordering::SeqCst);
        let _in_flight = InFlight(&state.in_flight);

        let query = request.param("query").unwrap_or_default();
        state.requests.lock().push(request.clone());

        let response = state
            .responses
            .lock()
            .get(&query)
            .cloned()
            .unwrap_or_else(|| state.fallback.lock().clone());

        let delay = *state.delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        match response {
            MockResponse::Reply(status, body) => Ok(BackendResponse::new(status, body)),
            MockResponse::Fail(message) => Err(ClientError::Send {
                method: request.method,
                url: request.url.to_string(),
                message,
            }),
            MockResponse::Hang => std::future::pending().await,
        }
    }
}
