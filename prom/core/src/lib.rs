//! Prom Query - Bounded-Concurrency Query Dispatch for Prometheus
//!
//! This crate runs batches of read-only PromQL queries against a
//! Prometheus-compatible HTTP API. Every query runs in its own task, backend
//! calls are capped by a shared admission gate, results come back in
//! submission order, and failures are collected on the side for later
//! inspection.
//!
//! # Architecture
//!
//! ```text
//!   caller
//!     │  query_all(["up", "rate(x[5m])", "sum(y)"])
//!     ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        QueryContext                           │
//! │                                                               │
//! │   worker 0        worker 1        worker 2      (one task     │
//! │      │               │               │           per query)   │
//! │      └───────────────┼───────────────┘                        │
//! │                      ▼                                        │
//! │              ┌───────────────┐                                │
//! │              │ AdmissionGate │  <-- caps in-flight requests   │
//! │              └───────┬───────┘                                │
//! │                      ▼                                        │
//! │              ┌───────────────┐                                │
//! │              │  PromClient   │  <-- POST /api/v1/query        │
//! │              └───────────────┘                                │
//! │                                                               │
//! │   decode ─► parse ─► publish          failures ─► ErrorCollector
//! └──────────────────────────────────────────────────────────────┘
//!     │
//!     ▼
//!   [QueryResultsReceiver; 3]   (same order as the queries)
//! ```
//!
//! # Quick Start
//!
//! ```no_run
//! use prom_query::{read_all, HttpClient, QueryContext};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let client = HttpClient::new("http://localhost:9090")?;
//! let ctx = QueryContext::new(client);
//!
//! let receivers = ctx.query_all(["up", "sum(rate(http_requests_total[5m]))"]);
//! let results = read_all(receivers).await;
//!
//! for results in &results {
//!     println!("{}: {} series", results.query, results.results.len());
//! }
//! for error in ctx.errors() {
//!     eprintln!("{error}");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Module Overview
//!
//! - [`gate`]: Admission gate (counting semaphore with RAII permits)
//! - [`collector`]: Thread-safe error collector
//! - [`receiver`]: Per-query one-shot result channel
//! - [`dispatcher`]: The [`QueryContext`] fan-out
//! - [`result`]: Response parsing into [`QueryResults`]
//! - [`client`]: Backend seam ([`PromClient`]) and its `reqwest` implementation
//! - [`request`]: Instant and range request construction
//! - [`config`]: TOML / environment configuration
//! - [`error`]: Query error taxonomy

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod client;
pub mod collector;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod gate;
pub mod receiver;
pub mod request;
pub mod result;

#[cfg(test)]
mod test_utils;

// Re-exports for convenience
pub use client::{BackendRequest, BackendResponse, ClientError, HttpClient, PromClient};
pub use collector::ErrorCollector;
pub use config::{
    default_config_path, load_config, load_config_from_path, ConfigError, ConfigOverrides,
    ConfigToml, QueryConfig,
};
pub use dispatcher::QueryContext;
pub use error::{QueryError, QueryErrorKind};
pub use gate::{AdmissionGate, GateError, GatePermit, GateStats};
pub use receiver::{read_all, QueryResultsReceiver};
pub use request::{QueryRange, API_PREFIX, QUERY_ENDPOINT, QUERY_RANGE_ENDPOINT};
pub use result::{ParseError, QueryResult, QueryResults, ResultType, Sample};
