use serde::{Deserialize, Serialize};
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// The failure categories a batch run reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    EntityFetchFailed,
    MalformedAttributeValue,
    MissingBirthYearStatements,
    MalformedRecord,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::EntityFetchFailed => "EntityFetchFailed",
            ErrorKind::MalformedAttributeValue => "MalformedAttributeValue",
            ErrorKind::MissingBirthYearStatements => "MissingBirthYearStatements",
            ErrorKind::MalformedRecord => "MalformedRecord",
        };
        f.write_str(name)
    }
}

/// Failure resolving one entity's attributes.
///
/// Cloneable so the attribute cache can hand the same outcome to every record
/// that references the entity.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EntityError {
    #[error("fetching {item_id} failed: {reason}")]
    EntityFetchFailed { item_id: String, reason: String },
    #[error("statement {statement_id} on {item_id} has a malformed value: {value}")]
    MalformedAttributeValue {
        item_id: String,
        statement_id: String,
        value: String,
    },
    #[error("{item_id} has no birth-year statements")]
    MissingBirthYearStatements { item_id: String },
}

impl EntityError {
    pub fn fetch_failed(item_id: &str, reason: impl Into<String>) -> Self {
        EntityError::EntityFetchFailed {
            item_id: item_id.to_string(),
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            EntityError::EntityFetchFailed { .. } => ErrorKind::EntityFetchFailed,
            EntityError::MalformedAttributeValue { .. } => ErrorKind::MalformedAttributeValue,
            EntityError::MissingBirthYearStatements { .. } => {
                ErrorKind::MissingBirthYearStatements
            }
        }
    }

    pub fn item_id(&self) -> &str {
        match self {
            EntityError::EntityFetchFailed { item_id, .. }
            | EntityError::MalformedAttributeValue { item_id, .. }
            | EntityError::MissingBirthYearStatements { item_id } => item_id,
        }
    }
}

/// Errors raised while loading, checking or filtering mismatch records.
#[derive(Debug, Error)]
pub enum MismatchError {
    #[error(transparent)]
    Entity(#[from] EntityError),
    #[error("malformed record{}: {reason}", describe_location(*line, item_id.as_deref(), statement_guid.as_deref()))]
    MalformedRecord {
        line: Option<u64>,
        item_id: Option<String>,
        statement_guid: Option<String>,
        reason: String,
    },
    #[error("unexpected mismatch file header: {found}")]
    InvalidHeader { found: String },
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("cannot split {}: {reason}", path.display())]
    Split { path: PathBuf, reason: String },
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl MismatchError {
    /// Category for errors that belong to a record or entity.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            MismatchError::Entity(e) => Some(e.kind()),
            MismatchError::MalformedRecord { .. } => Some(ErrorKind::MalformedRecord),
            _ => None,
        }
    }

    pub fn item_id(&self) -> Option<&str> {
        match self {
            MismatchError::Entity(e) => Some(e.item_id()),
            MismatchError::MalformedRecord { item_id, .. } => item_id.as_deref(),
            _ => None,
        }
    }
}

fn describe_location(line: Option<u64>, item_id: Option<&str>, guid: Option<&str>) -> String {
    let mut out = String::new();
    if let Some(line) = line {
        out.push_str(&format!(" at line {line}"));
    }
    match (item_id, guid) {
        (Some(item), Some(guid)) if !guid.is_empty() => out.push_str(&format!(" ({item}, {guid})")),
        (Some(item), _) if !item.is_empty() => out.push_str(&format!(" ({item})")),
        _ => {}
    }
    out
}
