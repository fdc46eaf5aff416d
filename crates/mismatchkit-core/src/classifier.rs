//! Mismatch Classifier: the keep/drop decision for one record
//!
//! A record is kept when either condition fires (evaluated independently):
//!
//! ```text
//! occupation condition   occupations = Some(s) and (|s| > 1 or s = {x}, x ≠ chess player)
//! birth-year condition   external year ∉ years_of_birth
//! ```
//!
//! An entity with no occupation statement contributes no occupation signal
//! unless [`AbsentOccupationPolicy::Flag`] is configured.

use crate::config::DEFAULT_CHESS_PLAYER;
use crate::error::{EntityError, MismatchError};
use crate::{EntityAttributes, MismatchRecord};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Keep,
    Drop,
}

/// How to treat an entity that has no occupation statement at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AbsentOccupationPolicy {
    /// The occupation condition neither keeps nor drops.
    #[default]
    NoSignal,
    /// Treat the entity as not being a chess player.
    Flag,
}

impl std::str::FromStr for AbsentOccupationPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "no-signal" => Ok(AbsentOccupationPolicy::NoSignal),
            "flag" => Ok(AbsentOccupationPolicy::Flag),
            other => Err(format!(
                "unknown absent-occupation policy '{other}' (expected 'no-signal' or 'flag')"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifierRules {
    /// Occupation value that marks an entity as a plain chess player
    pub chess_player_occupation: String,
    pub absent_occupation: AbsentOccupationPolicy,
}

impl Default for ClassifierRules {
    fn default() -> Self {
        Self {
            chess_player_occupation: DEFAULT_CHESS_PLAYER.to_string(),
            absent_occupation: AbsentOccupationPolicy::default(),
        }
    }
}

/// Which conditions fired for a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Classification {
    pub occupation_flagged: bool,
    pub birth_year_flagged: bool,
}

impl Classification {
    pub fn decision(&self) -> Decision {
        if self.occupation_flagged || self.birth_year_flagged {
            Decision::Keep
        } else {
            Decision::Drop
        }
    }
}

pub fn occupation_flagged(occupations: Option<&BTreeSet<String>>, rules: &ClassifierRules) -> bool {
    match occupations {
        None => rules.absent_occupation == AbsentOccupationPolicy::Flag,
        Some(set) => match set.len() {
            0 => false,
            1 => !set.contains(&rules.chess_player_occupation),
            _ => true,
        },
    }
}

pub fn birth_year_flagged(external_year: i64, years_of_birth: &BTreeSet<i64>) -> bool {
    !years_of_birth.contains(&external_year)
}

/// Evaluate both conditions for `record` against its entity's attributes.
///
/// Fails when the record's external value is not a year, or when the
/// attributes carry no birth year (membership in an empty set would otherwise
/// keep every record).
pub fn evaluate(
    record: &MismatchRecord,
    attrs: &EntityAttributes,
    rules: &ClassifierRules,
) -> Result<Classification, MismatchError> {
    let external_year = record
        .external_year()
        .ok_or_else(|| MismatchError::MalformedRecord {
            line: None,
            item_id: Some(record.item_id.clone()),
            statement_guid: Some(record.statement_guid.clone()),
            reason: format!("external_value '{}' is not a year", record.external_value),
        })?;

    if attrs.years_of_birth.is_empty() {
        return Err(EntityError::MissingBirthYearStatements {
            item_id: record.item_id.clone(),
        }
        .into());
    }

    Ok(Classification {
        occupation_flagged: occupation_flagged(attrs.occupations.as_ref(), rules),
        birth_year_flagged: birth_year_flagged(external_year, &attrs.years_of_birth),
    })
}

pub fn classify(
    record: &MismatchRecord,
    attrs: &EntityAttributes,
    rules: &ClassifierRules,
) -> Result<Decision, MismatchError> {
    evaluate(record, attrs, rules).map(|c| c.decision())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    const CHESS: &str = "Q10873124";

    fn record(item: &str, external: &str) -> MismatchRecord {
        MismatchRecord {
            item_id: item.to_string(),
            statement_guid: format!("{item}$0000"),
            property_id: "P569".into(),
            wikidata_value: "+1971-00-00T00:00:00Z".into(),
            meta_wikidata_value: String::new(),
            external_value: external.to_string(),
            external_url: "https://ratings.fide.com/profile/1".into(),
            record_type: "statement".into(),
        }
    }

    #[test]
    fn test_chess_player_with_matching_alternative_year_is_dropped() {
        let attrs = EntityAttributes::new(Some([CHESS]), [1971, 1979]);
        let decision = classify(&record("Q77168", "1979"), &attrs, &ClassifierRules::default());
        assert_eq!(decision.unwrap(), Decision::Drop);
    }

    #[test]
    fn test_year_not_on_record_is_kept() {
        let attrs = EntityAttributes::new(None::<Vec<String>>, [1961]);
        let result = evaluate(&record("Q4363644", "1964"), &attrs, &ClassifierRules::default())
            .unwrap();
        assert!(result.birth_year_flagged);
        assert!(!result.occupation_flagged);
        assert_eq!(result.decision(), Decision::Keep);
    }

    #[test]
    fn test_multiple_occupations_keep_even_when_year_matches() {
        let attrs = EntityAttributes::new(Some([CHESS, "Q82955"]), [1950]);
        let result = evaluate(&record("Q1", "1950"), &attrs, &ClassifierRules::default()).unwrap();
        assert!(result.occupation_flagged);
        assert!(!result.birth_year_flagged);
        assert_eq!(result.decision(), Decision::Keep);
    }

    #[test]
    fn test_single_other_occupation_is_kept() {
        let attrs = EntityAttributes::new(Some(["Q82955"]), [1950]);
        assert_eq!(
            classify(&record("Q1", "1950"), &attrs, &ClassifierRules::default()).unwrap(),
            Decision::Keep
        );
    }

    #[test]
    fn test_absent_occupation_gives_no_signal_by_default() {
        let attrs = EntityAttributes::new(None::<Vec<String>>, [1950]);
        assert_eq!(
            classify(&record("Q1", "1950"), &attrs, &ClassifierRules::default()).unwrap(),
            Decision::Drop
        );
    }

    #[test]
    fn test_absent_occupation_flag_policy() {
        let rules = ClassifierRules {
            absent_occupation: AbsentOccupationPolicy::Flag,
            ..ClassifierRules::default()
        };
        let absent = EntityAttributes::new(None::<Vec<String>>, [1950]);
        assert_eq!(classify(&record("Q1", "1950"), &absent, &rules).unwrap(), Decision::Keep);

        // Present but empty is not "absent".
        let empty = EntityAttributes::new(Some(Vec::<String>::new()), [1950]);
        assert_eq!(classify(&record("Q1", "1950"), &empty, &rules).unwrap(), Decision::Drop);
    }

    #[test]
    fn test_custom_chess_player_identifier() {
        let rules = ClassifierRules {
            chess_player_occupation: "Q999".into(),
            ..ClassifierRules::default()
        };
        let attrs = EntityAttributes::new(Some(["Q999"]), [1950]);
        assert_eq!(classify(&record("Q1", "1950"), &attrs, &rules).unwrap(), Decision::Drop);

        let chess = EntityAttributes::new(Some([CHESS]), [1950]);
        assert_eq!(classify(&record("Q1", "1950"), &chess, &rules).unwrap(), Decision::Keep);
    }

    #[test]
    fn test_empty_birth_years_fail_loudly() {
        let attrs = EntityAttributes::new(Some([CHESS]), Vec::<i64>::new());
        let err = classify(&record("Q1", "1950"), &attrs, &ClassifierRules::default()).unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::MissingBirthYearStatements));
    }

    #[test]
    fn test_non_year_external_value_is_malformed_record() {
        let attrs = EntityAttributes::new(Some([CHESS]), [1950]);
        let err = classify(&record("Q1", "19xx"), &attrs, &ClassifierRules::default()).unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::MalformedRecord));
        assert_eq!(err.item_id(), Some("Q1"));
    }

    #[test]
    fn test_policy_from_str() {
        assert_eq!(
            "flag".parse::<AbsentOccupationPolicy>().unwrap(),
            AbsentOccupationPolicy::Flag
        );
        assert!("maybe".parse::<AbsentOccupationPolicy>().is_err());
    }
}
