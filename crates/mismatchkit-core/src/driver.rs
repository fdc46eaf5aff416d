//! Batch Filter Driver
//!
//! ```text
//! records ──► distinct item ids ──► cache.get_or_fetch (≤ N in flight)
//!    │                                      │
//!    └──────────── input order ─────────────┴──► evaluate ──► kept ids / failures
//! ```
//!
//! Inclusion is per entity: one flagged record keeps every record of that
//! entity in the output. Failures for one entity never stop the batch.

use crate::cache::AttributeCache;
use crate::classifier::{evaluate, ClassifierRules, Decision};
use crate::config::FilterConfig;
use crate::error::{EntityError, ErrorKind, MismatchError};
use crate::fetcher::AttributeFetcher;
use crate::MismatchRecord;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A record or entity that could not be classified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordFailure {
    pub item_id: String,
    pub statement_guid: String,
    pub kind: ErrorKind,
    pub message: String,
}

impl RecordFailure {
    fn from_entity(record: &MismatchRecord, error: &EntityError) -> Self {
        Self {
            item_id: record.item_id.clone(),
            statement_guid: record.statement_guid.clone(),
            kind: error.kind(),
            message: error.to_string(),
        }
    }

    fn from_record(record: &MismatchRecord, error: &MismatchError) -> Self {
        Self {
            item_id: record.item_id.clone(),
            statement_guid: record.statement_guid.clone(),
            kind: error.kind().unwrap_or(ErrorKind::MalformedRecord),
            message: error.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchStats {
    pub records: usize,
    pub entities: usize,
    pub kept_records: usize,
    pub dropped_records: usize,
    pub failed_records: usize,
    /// Records on which the occupation condition fired
    pub occupation_flags: usize,
    /// Records on which the birth-year condition fired
    pub birth_year_flags: usize,
}

#[derive(Debug, Clone, Default)]
pub struct BatchOutcome {
    /// Entities to report
    pub kept: BTreeSet<String>,
    pub failures: Vec<RecordFailure>,
    pub stats: BatchStats,
}

pub struct BatchFilter {
    cache: AttributeCache,
    rules: ClassifierRules,
    concurrency: usize,
}

impl BatchFilter {
    pub fn new(cache: AttributeCache, rules: ClassifierRules) -> Self {
        Self {
            cache,
            rules,
            concurrency: 1,
        }
    }

    pub fn from_config(fetcher: Arc<dyn AttributeFetcher>, config: &FilterConfig) -> Self {
        Self::new(AttributeCache::new(fetcher), config.rules())
            .with_concurrency(config.fetch_concurrency)
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn cache(&self) -> &AttributeCache {
        &self.cache
    }

    pub fn rules(&self) -> &ClassifierRules {
        &self.rules
    }

    pub async fn filter_batch(&self, records: &[MismatchRecord]) -> BatchOutcome {
        let mut seen = HashSet::new();
        let distinct: Vec<&str> = records
            .iter()
            .map(|r| r.item_id.as_str())
            .filter(|id| seen.insert(*id))
            .collect();

        let resolved: HashMap<&str, _> = stream::iter(distinct.iter().copied())
            .map(|item_id| async move { (item_id, self.cache.get_or_fetch(item_id).await) })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut outcome = BatchOutcome::default();
        outcome.stats.records = records.len();
        outcome.stats.entities = distinct.len();
        let mut reported_entities = HashSet::new();

        for record in records {
            let attrs = match &resolved[record.item_id.as_str()] {
                Ok(attrs) => attrs,
                Err(error) => {
                    outcome.stats.failed_records += 1;
                    if reported_entities.insert(record.item_id.as_str()) {
                        warn!(item_id = %record.item_id, kind = %error.kind(), %error, "entity skipped");
                        outcome.failures.push(RecordFailure::from_entity(record, error));
                    }
                    continue;
                }
            };

            match evaluate(record, attrs, &self.rules) {
                Ok(classification) => {
                    outcome.stats.occupation_flags += usize::from(classification.occupation_flagged);
                    outcome.stats.birth_year_flags += usize::from(classification.birth_year_flagged);
                    let decision = classification.decision();
                    debug!(
                        item_id = %record.item_id,
                        statement_guid = %record.statement_guid,
                        occupation = classification.occupation_flagged,
                        birth_year = classification.birth_year_flagged,
                        ?decision,
                        "classified"
                    );
                    match decision {
                        Decision::Keep => {
                            outcome.stats.kept_records += 1;
                            outcome.kept.insert(record.item_id.clone());
                        }
                        Decision::Drop => outcome.stats.dropped_records += 1,
                    }
                }
                Err(error) => {
                    outcome.stats.failed_records += 1;
                    warn!(item_id = %record.item_id, statement_guid = %record.statement_guid, %error, "record skipped");
                    outcome.failures.push(RecordFailure::from_record(record, &error));
                }
            }
        }

        info!(
            records = outcome.stats.records,
            entities = outcome.stats.entities,
            kept_entities = outcome.kept.len(),
            failures = outcome.failures.len(),
            fetches = self.cache.fetch_count(),
            "batch filtered"
        );
        outcome
    }
}

/// Every record whose entity is in `kept`, in input order.
pub fn records_for(records: &[MismatchRecord], kept: &BTreeSet<String>) -> Vec<MismatchRecord> {
    records
        .iter()
        .filter(|r| kept.contains(&r.item_id))
        .cloned()
        .collect()
}
