//! The signing collaborator seam.
//!
//! [`AssetSigner`] exchanges a `(document id, storage key)` pair for a
//! time-limited URL. [`HttpSigner`](crate::HttpSigner) talks to the REST API;
//! [`MemorySigner`] answers from a table and records every call.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::RwLock;

use crate::error::SigningError;
use crate::key::StorageKey;

/// Produces signed URLs for stored assets.
///
/// Implementations must be safe to share across concurrent signing requests
/// (`Send + Sync`); the resolver issues one call per distinct key and polls
/// them all at once.
#[async_trait::async_trait]
pub trait AssetSigner: Send + Sync + 'static {
    /// Return a directly fetchable, time-limited URL for `key`, scoped to the
    /// owning document.
    ///
    /// # Errors
    ///
    /// Any [`SigningError`]: unknown key, rejected session, transport failure.
    async fn sign(&self, document_id: &str, key: &StorageKey) -> Result<String, SigningError>;
}

/// A signer backed by an in-memory `key -> url` table.
///
/// Cloning shares the table and the call log.
#[derive(Debug, Clone, Default)]
pub struct MemorySigner {
    urls: Arc<RwLock<BTreeMap<String, String>>>,
    calls: Arc<RwLock<Vec<(String, StorageKey)>>>,
    in_flight: Arc<AtomicUsize>,
    peak_in_flight: Arc<AtomicUsize>,
}

impl MemorySigner {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the URL returned for `key`, for any document.
    pub async fn insert(&self, key: impl Into<String>, url: impl Into<String>) {
        self.urls.write().await.insert(key.into(), url.into());
    }

    /// Every `(document id, key)` pair signed so far, in call order.
    pub async fn calls(&self) -> Vec<(String, StorageKey)> {
        self.calls.read().await.clone()
    }

    /// Highest number of `sign` calls that were in progress at once.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl AssetSigner for MemorySigner {
    async fn sign(&self, document_id: &str, key: &StorageKey) -> Result<String, SigningError> {
        let guard = InFlight::enter(&self.in_flight);
        self.peak_in_flight.fetch_max(guard.count, Ordering::SeqCst);

        self.calls
            .write()
            .await
            .push((document_id.to_owned(), key.clone()));
        // Let sibling requests start before this one answers.
        tokio::task::yield_now().await;
        let url = self.urls.read().await.get(key.as_str()).cloned();

        drop(guard);
        url.ok_or_else(|| SigningError::NotFound {
            document_id: document_id.to_owned(),
            key: key.to_string(),
        })
    }
}

/// Counts one `sign` call as in progress until dropped, including when the
/// caller abandons the future part-way.
struct InFlight<'a> {
    counter: &'a AtomicUsize,
    count: usize,
}

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        let count = counter.fetch_add(1, Ordering::SeqCst) + 1;
        Self { counter, count }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}
