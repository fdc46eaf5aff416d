//! Attribute Cache: one fetch per entity per batch run
//!
//! Each key owns a `tokio::sync::OnceCell`. The first caller for a key runs
//! the fetch; callers arriving while it is in flight wait on the same cell, so
//! duplicate fetches are coalesced rather than raced. Failures are memoized
//! too: a failing entity is not retried within the run.

use crate::error::EntityError;
use crate::fetcher::AttributeFetcher;
use crate::EntityAttributes;
use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::debug;

pub type FetchOutcome = Result<Arc<EntityAttributes>, EntityError>;

pub struct AttributeCache {
    fetcher: Arc<dyn AttributeFetcher>,
    slots: DashMap<String, Arc<OnceCell<FetchOutcome>>>,
    fetches: AtomicUsize,
}

impl AttributeCache {
    pub fn new(fetcher: Arc<dyn AttributeFetcher>) -> Self {
        Self {
            fetcher,
            slots: DashMap::new(),
            fetches: AtomicUsize::new(0),
        }
    }

    /// Attributes of `item_id`, fetching them on first use.
    pub async fn get_or_fetch(&self, item_id: &str) -> FetchOutcome {
        // The map guard must not live across the await below.
        let slot = self
            .slots
            .entry(item_id.to_string())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .value()
            .clone();

        slot.get_or_init(|| async {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            debug!(item_id, "fetching entity attributes");
            self.fetcher.fetch(item_id).await.map(Arc::new)
        })
        .await
        .clone()
    }

    /// Already-resolved outcome for `item_id`, without fetching.
    pub fn get(&self, item_id: &str) -> Option<FetchOutcome> {
        self.slots.get(item_id).and_then(|slot| slot.value().get().cloned())
    }

    /// Number of resolved entries (successful or failed).
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.initialized()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of fetches issued to the underlying fetcher.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}
