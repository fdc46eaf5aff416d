//! Filter configuration
//!
//! Defaults target Wikidata birth-date mismatches against a chess rating
//! list. Every identifier can be overridden from a JSON file, the
//! environment, or the command line (in that order).

use crate::classifier::{AbsentOccupationPolicy, ClassifierRules};
use crate::codec::{GuidFormat, LoadOptions};
use crate::error::MismatchError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Occupation (P106)
pub const DEFAULT_OCCUPATION_PROPERTY: &str = "P106";
/// Date of birth (P569)
pub const DEFAULT_BIRTH_DATE_PROPERTY: &str = "P569";
/// Chess player (Q10873124)
pub const DEFAULT_CHESS_PLAYER: &str = "Q10873124";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub occupation_property: String,
    pub birth_date_property: String,
    pub chess_player_occupation: String,
    pub absent_occupation: AbsentOccupationPolicy,
    pub guid: GuidFormat,
    /// Maximum number of entity fetches in flight.
    pub fetch_concurrency: usize,
    /// Skip malformed rows at load time instead of failing the batch.
    pub partial_load: bool,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            occupation_property: DEFAULT_OCCUPATION_PROPERTY.to_string(),
            birth_date_property: DEFAULT_BIRTH_DATE_PROPERTY.to_string(),
            chess_player_occupation: DEFAULT_CHESS_PLAYER.to_string(),
            absent_occupation: AbsentOccupationPolicy::NoSignal,
            guid: GuidFormat::default(),
            fetch_concurrency: 1,
            partial_load: false,
        }
    }
}

impl FilterConfig {
    pub fn from_json_file(path: &Path) -> Result<Self, MismatchError> {
        let text = std::fs::read_to_string(path)?;
        serde_json::from_str(&text).map_err(|e| {
            MismatchError::Configuration(format!("{}: {e}", path.display()))
        })
    }

    /// Apply `MISMATCHKIT_*` environment overrides.
    pub fn with_env(self) -> Result<Self, MismatchError> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup (the environment in production).
    pub fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, MismatchError> {
        if let Some(v) = lookup("MISMATCHKIT_OCCUPATION_PROPERTY") {
            self.occupation_property = v;
        }
        if let Some(v) = lookup("MISMATCHKIT_BIRTH_DATE_PROPERTY") {
            self.birth_date_property = v;
        }
        if let Some(v) = lookup("MISMATCHKIT_CHESS_PLAYER") {
            self.chess_player_occupation = v;
        }
        if let Some(v) = lookup("MISMATCHKIT_FETCH_CONCURRENCY") {
            self.fetch_concurrency = v.trim().parse().map_err(|_| {
                MismatchError::Configuration(format!(
                    "MISMATCHKIT_FETCH_CONCURRENCY must be a positive integer, got '{v}'"
                ))
            })?;
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), MismatchError> {
        for (name, value) in [
            ("occupation_property", &self.occupation_property),
            ("birth_date_property", &self.birth_date_property),
            ("chess_player_occupation", &self.chess_player_occupation),
        ] {
            if value.trim().is_empty() {
                return Err(MismatchError::Configuration(format!("{name} must not be empty")));
            }
        }
        if self.occupation_property == self.birth_date_property {
            return Err(MismatchError::Configuration(
                "occupation_property and birth_date_property must differ".to_string(),
            ));
        }
        if self.guid.generic_separator == self.guid.statement_separator {
            return Err(MismatchError::Configuration(
                "GUID separators must differ".to_string(),
            ));
        }
        if self.fetch_concurrency == 0 {
            return Err(MismatchError::Configuration(
                "fetch_concurrency must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn rules(&self) -> ClassifierRules {
        ClassifierRules {
            chess_player_occupation: self.chess_player_occupation.clone(),
            absent_occupation: self.absent_occupation,
        }
    }

    pub fn load_options(&self) -> LoadOptions {
        LoadOptions {
            partial: self.partial_load,
        }
    }
}
