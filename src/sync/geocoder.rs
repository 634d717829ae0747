use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_stream::wrappers::WatchStream;
use tracing::warn;

use crate::client::geocode::{GeocodingService, Suggestion};
use crate::observability::metrics::Metrics;

/// Debounced forward-geocoding search.
///
/// Each keystroke resets the debounce timer by aborting the pending
/// request task, so a burst of typing issues at most one network call for
/// the final query. Every issued request carries a sequence number; a
/// response that is no longer the newest is dropped rather than displayed.
/// The debounce token is owned by this struct, so concurrent search boxes
/// never clobber each other.
pub struct AddressSearch {
    service: Arc<dyn GeocodingService>,
    metrics: Metrics,
    debounce: Duration,
    sequence: Arc<AtomicU64>,
    displayed: Arc<AtomicU64>,
    pending: Mutex<Option<JoinHandle<()>>>,
    suggestions_tx: Arc<watch::Sender<Vec<Suggestion>>>,
}

impl AddressSearch {
    pub fn new(service: Arc<dyn GeocodingService>, metrics: Metrics, debounce: Duration) -> Self {
        let (suggestions_tx, _rx) = watch::channel(Vec::new());
        Self {
            service,
            metrics,
            debounce,
            sequence: Arc::new(AtomicU64::new(0)),
            displayed: Arc::new(AtomicU64::new(0)),
            pending: Mutex::new(None),
            suggestions_tx: Arc::new(suggestions_tx),
        }
    }

    /// Stream of suggestion lists for the dropdown to render.
    pub fn suggestions(&self) -> WatchStream<Vec<Suggestion>> {
        WatchStream::new(self.suggestions_tx.subscribe())
    }

    pub fn current_suggestions(&self) -> Vec<Suggestion> {
        self.suggestions_tx.borrow().clone()
    }

    /// Feed one keystroke's worth of query text. Supersedes any pending
    /// search; an empty query just clears the suggestion list.
    pub fn input(&self, query: &str) {
        let seq = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;

        let mut pending = self.pending.lock().expect("pending lock poisoned");
        if let Some(task) = pending.take() {
            task.abort();
        }

        let query = query.trim().to_string();
        if query.is_empty() {
            self.displayed.store(seq, Ordering::SeqCst);
            let _ = self.suggestions_tx.send(Vec::new());
            return;
        }

        let service = self.service.clone();
        let metrics = self.metrics.clone();
        let debounce = self.debounce;
        let sequence = self.sequence.clone();
        let displayed = self.displayed.clone();
        let suggestions_tx = self.suggestions_tx.clone();

        *pending = Some(tokio::spawn(async move {
            sleep(debounce).await;

            metrics.geocode_requests_total.inc();
            let result = service.search(&query).await;

            // A newer query has been issued since; this response is stale.
            if sequence.load(Ordering::SeqCst) != seq {
                return;
            }

            match result {
                Ok(suggestions) => {
                    // Guard against an even older in-flight response racing
                    // in after us.
                    let newest = displayed.fetch_max(seq, Ordering::SeqCst).max(seq);
                    if newest == seq {
                        let _ = suggestions_tx.send(suggestions);
                    }
                }
                Err(err) => {
                    warn!(query = %query, error = %err, "geocoding search failed");
                }
            }
        }));
    }
}
