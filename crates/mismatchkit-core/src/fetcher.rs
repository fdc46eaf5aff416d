//! Entity Attribute Fetcher
//!
//! Two seams:
//! - [`StatementSource`]: raw statements of an entity (HTTP in production,
//!   [`MockStatementSource`] in tests)
//! - [`AttributeFetcher`]: the reduced [`EntityAttributes`] bundle the
//!   classifier works on
//!
//! [`StatementFetcher`] turns the first into the second.

use crate::error::EntityError;
use crate::{EntityAttributes, EntityStatements, Statement, StatementValue};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::time::Duration;
use tracing::debug;

/// Read-only access to an entity's statements.
#[async_trait]
pub trait StatementSource: Send + Sync {
    /// Statements of `item_id` for the given properties. Properties without
    /// statements are absent from the returned map.
    async fn statements(
        &self,
        item_id: &str,
        property_ids: &[&str],
    ) -> Result<EntityStatements, EntityError>;
}

/// Resolves the attribute bundle of one entity.
#[async_trait]
pub trait AttributeFetcher: Send + Sync {
    async fn fetch(&self, item_id: &str) -> Result<EntityAttributes, EntityError>;
}

/// [`AttributeFetcher`] backed by a [`StatementSource`].
pub struct StatementFetcher<S> {
    source: S,
    occupation_property: String,
    birth_date_property: String,
}

impl<S: StatementSource> StatementFetcher<S> {
    pub fn new(source: S, occupation_property: &str, birth_date_property: &str) -> Self {
        Self {
            source,
            occupation_property: occupation_property.to_string(),
            birth_date_property: birth_date_property.to_string(),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }
}

#[async_trait]
impl<S: StatementSource> AttributeFetcher for StatementFetcher<S> {
    async fn fetch(&self, item_id: &str) -> Result<EntityAttributes, EntityError> {
        let statements = self
            .source
            .statements(
                item_id,
                &[
                    self.occupation_property.as_str(),
                    self.birth_date_property.as_str(),
                ],
            )
            .await?;
        extract_attributes(
            item_id,
            &statements,
            &self.occupation_property,
            &self.birth_date_property,
        )
    }
}

/// Reduce raw statements to the classifier's attribute bundle.
pub fn extract_attributes(
    item_id: &str,
    statements: &EntityStatements,
    occupation_property: &str,
    birth_date_property: &str,
) -> Result<EntityAttributes, EntityError> {
    let occupations = match statements.get(occupation_property) {
        None => None,
        Some(list) if list.is_empty() => None,
        Some(list) => {
            let mut set = BTreeSet::new();
            for statement in list {
                if let Some(occupation) = occupation_value(item_id, statement)? {
                    set.insert(occupation);
                }
            }
            Some(set)
        }
    };

    let mut years_of_birth = BTreeSet::new();
    for statement in statements.get(birth_date_property).into_iter().flatten() {
        if let Some(year) = parse_birth_year(item_id, statement)? {
            years_of_birth.insert(year);
        }
    }
    if years_of_birth.is_empty() {
        return Err(EntityError::MissingBirthYearStatements {
            item_id: item_id.to_string(),
        });
    }

    Ok(EntityAttributes {
        occupations,
        years_of_birth,
    })
}

fn occupation_value(item_id: &str, statement: &Statement) -> Result<Option<String>, EntityError> {
    match &statement.value {
        StatementValue::Item(target) => Ok(Some(target.clone())),
        StatementValue::SomeValue | StatementValue::NoValue => {
            debug!(item_id, statement_id = %statement.id, "skipping occupation without a concrete value");
            Ok(None)
        }
        other => Err(malformed(item_id, statement, other)),
    }
}

/// Year of a birth-date statement, `None` for unknown/no value.
pub fn parse_birth_year(item_id: &str, statement: &Statement) -> Result<Option<i64>, EntityError> {
    match &statement.value {
        StatementValue::Time(timestamp) => year_from_timestamp(timestamp)
            .map(Some)
            .ok_or_else(|| malformed(item_id, statement, &statement.value)),
        StatementValue::SomeValue | StatementValue::NoValue => {
            debug!(item_id, statement_id = %statement.id, "skipping birth date without a concrete value");
            Ok(None)
        }
        other => Err(malformed(item_id, statement, other)),
    }
}

/// Leading year of a timestamp like `+1979-00-00T00:00:00Z`.
///
/// At most one leading sign is accepted and dropped. The year must be all
/// digits and followed by a `-`.
pub fn year_from_timestamp(timestamp: &str) -> Option<i64> {
    let trimmed = timestamp.trim();
    let body = trimmed
        .strip_prefix('+')
        .or_else(|| trimmed.strip_prefix('-'))
        .unwrap_or(trimmed);
    let (year, _rest) = body.split_once('-')?;
    if year.is_empty() || !year.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    year.parse().ok()
}

fn malformed(item_id: &str, statement: &Statement, value: &StatementValue) -> EntityError {
    let value = match value {
        StatementValue::Item(v) | StatementValue::Time(v) => v.clone(),
        StatementValue::SomeValue => "somevalue".to_string(),
        StatementValue::NoValue => "novalue".to_string(),
        StatementValue::Other(v) => v.to_string(),
    };
    EntityError::MalformedAttributeValue {
        item_id: item_id.to_string(),
        statement_id: statement.id.clone(),
        value,
    }
}

// ============================================================================
// Mock source
// ============================================================================

/// In-memory [`StatementSource`] for tests and dry runs.
///
/// Unknown items fail with `EntityFetchFailed`. Every call is recorded.
#[derive(Default)]
pub struct MockStatementSource {
    entities: HashMap<String, EntityStatements>,
    failures: HashMap<String, String>,
    delay: Option<Duration>,
    calls: Mutex<Vec<String>>,
}

impl MockStatementSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entity(mut self, item_id: &str, statements: EntityStatements) -> Self {
        self.entities.insert(item_id.to_string(), statements);
        self
    }

    /// Convenience for the common case: occupation ids and birth timestamps.
    pub fn with_person(
        self,
        item_id: &str,
        occupation_property: &str,
        occupations: &[&str],
        birth_date_property: &str,
        birth_timestamps: &[&str],
    ) -> Self {
        let mut statements = EntityStatements::new();
        if !occupations.is_empty() {
            statements.insert(
                occupation_property.to_string(),
                occupations
                    .iter()
                    .enumerate()
                    .map(|(i, q)| Statement::item(&format!("{item_id}$occ-{i}"), q))
                    .collect(),
            );
        }
        if !birth_timestamps.is_empty() {
            statements.insert(
                birth_date_property.to_string(),
                birth_timestamps
                    .iter()
                    .enumerate()
                    .map(|(i, t)| Statement::time(&format!("{item_id}$dob-{i}"), t))
                    .collect(),
            );
        }
        self.with_entity(item_id, statements)
    }

    pub fn with_failure(mut self, item_id: &str, reason: &str) -> Self {
        self.failures.insert(item_id.to_string(), reason.to_string());
        self
    }

    /// Sleep before answering, to let concurrent callers overlap.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self, item_id: &str) -> usize {
        self.calls.lock().iter().filter(|c| *c == item_id).count()
    }
}

#[async_trait]
impl StatementSource for MockStatementSource {
    async fn statements(
        &self,
        item_id: &str,
        property_ids: &[&str],
    ) -> Result<EntityStatements, EntityError> {
        self.calls.lock().push(item_id.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(reason) = self.failures.get(item_id) {
            return Err(EntityError::fetch_failed(item_id, reason.clone()));
        }
        let entity = self
            .entities
            .get(item_id)
            .ok_or_else(|| EntityError::fetch_failed(item_id, "unknown item"))?;
        Ok(entity
            .iter()
            .filter(|(property, _)| property_ids.contains(&property.as_str()))
            .map(|(property, list)| (property.clone(), list.clone()))
            .collect())
    }
}
