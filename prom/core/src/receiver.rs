//! Per-Query Result Channel
//!
//! Each query gets a one-shot channel with room for exactly one value. The
//! worker's send never waits for the reader, so a caller that drops or never
//! reads a receiver cannot strand the worker.

use futures::future::join_all;
use tokio::sync::oneshot;
use tracing::warn;

use crate::result::QueryResults;

/// Receiving end of one query's result channel
#[derive(Debug)]
pub struct QueryResultsReceiver {
    query: String,
    rx: oneshot::Receiver<QueryResults>,
}

impl QueryResultsReceiver {
    pub(crate) fn channel(query: &str) -> (oneshot::Sender<QueryResults>, Self) {
        let (tx, rx) = oneshot::channel();
        (
            tx,
            Self {
                query: query.to_string(),
                rx,
            },
        )
    }

    /// The query whose results this channel carries
    pub fn query(&self) -> &str {
        &self.query
    }

    /// Wait for the query's results, consuming the channel
    ///
    /// Failed queries yield empty results; their errors are in the context's
    /// error collector. A worker that went away without publishing (it
    /// panicked or its runtime shut down) has reported a Transport error
    /// there as well, and empty results are returned.
    pub async fn read(self) -> QueryResults {
        match self.rx.await {
            Ok(results) => results,
            Err(_) => {
                warn!(query = %self.query, "Query worker exited without publishing results");
                QueryResults::empty(self.query)
            }
        }
    }
}

/// Drain a batch of receivers, preserving their order
pub async fn read_all(receivers: Vec<QueryResultsReceiver>) -> Vec<QueryResults> {
    join_all(receivers.into_iter().map(QueryResultsReceiver::read)).await
}
