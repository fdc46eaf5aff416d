//! mismatchkit core: deciding which knowledge-base mismatches are worth reporting
//!
//! A mismatch file lists statements where an external source (e.g. a rating
//! database) disagrees with the knowledge base about a birth year. Many of
//! those rows are false positives. This crate narrows a batch down to the
//! entities that deserve human review.
//!
//! ## Pipeline
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────────┐   ┌──────────────┐
//! │ codec::load  │──►│ GUID fix     │──►│ BatchFilter      │──►│ records_for  │
//! │ (CSV rows)   │   │ (idempotent) │   │  ├─ cache        │   │ + codec::save│
//! └──────────────┘   └──────────────┘   │  │   └─ fetcher  │   └──────────────┘
//!                                       │  └─ classifier   │
//!                                       └────────┬─────────┘
//!                                                │ per-entity failures
//!                                                ▼
//!                                         RecordFailure list
//! ```
//!
//! - The classifier is pure: given a record and its entity's attributes it
//!   returns keep or drop.
//! - The fetcher is injected (`Arc<dyn AttributeFetcher>`), so the decision rule
//!   is testable without a network.
//! - The attribute cache is owned by one batch run and fetches each entity once.

pub mod cache;
pub mod classifier;
pub mod codec;
pub mod config;
pub mod driver;
pub mod error;
pub mod fetcher;
pub mod split;
pub mod validation;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

pub use cache::AttributeCache;
pub use classifier::{
    classify, evaluate, AbsentOccupationPolicy, Classification, ClassifierRules, Decision,
};
pub use codec::{normalize_guids, normalize_statement_guid, GuidFormat, LoadOptions, LoadedRecords};
pub use config::FilterConfig;
pub use driver::{records_for, BatchFilter, BatchOutcome, BatchStats, RecordFailure};
pub use error::{EntityError, ErrorKind, MismatchError};
pub use fetcher::{AttributeFetcher, MockStatementSource, StatementFetcher, StatementSource};

// ============================================================================
// Core Types
// ============================================================================

/// Knowledge-base entity identifier (e.g. `Q77168`)
pub type ItemId = String;

/// Attribute kind identifier (e.g. `P569`)
pub type PropertyId = String;

/// One row of a mismatch file.
///
/// Every column is kept as the verbatim cell text so that a load/save cycle
/// reproduces the file. Empty cells are empty strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MismatchRecord {
    pub item_id: ItemId,
    pub statement_guid: String,
    pub property_id: PropertyId,
    pub wikidata_value: String,
    pub meta_wikidata_value: String,
    pub external_value: String,
    pub external_url: String,
    #[serde(rename = "type")]
    pub record_type: String,
}

impl MismatchRecord {
    /// The external value read as a year.
    ///
    /// Accepts an optional leading `+` and a trailing `.0` (spreadsheet tools
    /// write integer columns with gaps as floats).
    pub fn external_year(&self) -> Option<i64> {
        let raw = self.external_value.trim();
        let raw = raw.strip_prefix('+').unwrap_or(raw);
        let raw = match raw.split_once('.') {
            Some((int, frac)) if !frac.is_empty() && frac.bytes().all(|b| b == b'0') => int,
            Some(_) => return None,
            None => raw,
        };
        raw.parse().ok()
    }

    /// Cells in column order.
    pub fn fields(&self) -> [&str; 8] {
        [
            &self.item_id,
            &self.statement_guid,
            &self.property_id,
            &self.wikidata_value,
            &self.meta_wikidata_value,
            &self.external_value,
            &self.external_url,
            &self.record_type,
        ]
    }

    /// Cell of the named column.
    pub fn field(&self, column: &str) -> Option<&str> {
        let index = codec::COLUMNS.iter().position(|c| *c == column)?;
        Some(self.fields()[index])
    }
}

/// Attribute bundle for one entity, as seen by the classifier.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EntityAttributes {
    /// `None` when the entity has no occupation statement at all.
    /// `Some` with an empty set is a different case (statements exist but none
    /// carries a concrete value).
    pub occupations: Option<BTreeSet<String>>,
    /// Every year found on the entity's birth-date statements.
    pub years_of_birth: BTreeSet<i64>,
}

impl EntityAttributes {
    pub fn new(
        occupations: Option<impl IntoIterator<Item = impl Into<String>>>,
        years_of_birth: impl IntoIterator<Item = i64>,
    ) -> Self {
        Self {
            occupations: occupations.map(|o| o.into_iter().map(Into::into).collect()),
            years_of_birth: years_of_birth.into_iter().collect(),
        }
    }
}

// ============================================================================
// Knowledge-base statements
// ============================================================================

/// A statement as returned by the knowledge base.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    pub id: String,
    pub value: StatementValue,
}

impl Statement {
    pub fn item(id: &str, target: &str) -> Self {
        Self {
            id: id.to_string(),
            value: StatementValue::Item(target.to_string()),
        }
    }

    pub fn time(id: &str, timestamp: &str) -> Self {
        Self {
            id: id.to_string(),
            value: StatementValue::Time(timestamp.to_string()),
        }
    }
}

/// Value carried by a statement's main snak.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StatementValue {
    /// Reference to another entity
    Item(String),
    /// Timestamp string such as `+1979-00-00T00:00:00Z`
    Time(String),
    /// "unknown value"
    SomeValue,
    /// "no value"
    NoValue,
    /// Any other concrete value shape
    Other(serde_json::Value),
}

/// Statements of one entity, grouped by property. A missing key means the
/// entity has no statement of that kind.
pub type EntityStatements = BTreeMap<PropertyId, Vec<Statement>>;
