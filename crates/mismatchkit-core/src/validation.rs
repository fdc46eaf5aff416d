//! Pre-upload checks for mismatch files.
//!
//! The Mismatch Finder import rejects files that break its formatting rules
//! (identifier shapes, required cells, URL validity, value lengths). Running
//! [`check_records`] first turns a failed upload into a list of rows to fix.
//!
//! [`check_path`] reads a file leniently: only a wrong header (rule 1) stops
//! the check; every other problem is reported against its row.

use crate::codec::{check_header, csv_reader, record_from_bytes, REQUIRED_COLUMNS};
use crate::error::MismatchError;
use crate::MismatchRecord;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::OnceLock;
use tracing::warn;

/// Largest file the import API accepts (10 MiB).
pub const IMPORT_SIZE_LIMIT: u64 = 10 * 1024 * 1024;

/// Longest accepted `wikidata_value`, `external_value` or `external_url`, in characters.
pub const MAX_VALUE_CHARS: usize = 1500;

const USER_GUIDE: &str = "https://github.com/wmde/wikidata-mismatch-finder/blob/main/docs/UserGuide.md#creating-a-mismatches-import-file";

/// Rows listed per rule in [`CheckReport::render`].
const RENDER_SAMPLE: usize = 10;

fn item_id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^Q\d+$").expect("static regex"))
}

fn property_id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^P\d+$").expect("static regex"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckRule {
    InvalidId,
    MissingValue,
    GuidWithoutValue,
    InvalidUrl,
    InvalidType,
    ValueTooLong,
    MalformedRow,
}

impl CheckRule {
    fn direction(self) -> &'static str {
        match self {
            CheckRule::InvalidId => "Please assure that the following columns have valid ids:",
            CheckRule::MissingValue => {
                "Please assure that the following columns do not have empty values:"
            }
            CheckRule::GuidWithoutValue => {
                "Please assure that `statement_guid` is empty only where `wikidata_value` is as well:"
            }
            CheckRule::InvalidUrl => {
                "Please check the following URLs in `external_url` to make sure that they're valid:"
            }
            CheckRule::InvalidType => {
                "Please check that the `type` column contains only: 'statement', 'qualifier' or an empty value:"
            }
            CheckRule::ValueTooLong => "Please assure that the following values are at most 1,500 characters:",
            CheckRule::MalformedRow => {
                "Please assure that the following rows have exactly 8 UTF-8 encoded fields:"
            }
        }
    }
}

/// One rule violation on one row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckIssue {
    pub rule: CheckRule,
    /// 1-based data row (the header is not counted).
    pub row: usize,
    pub column: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckReport {
    pub checked_rows: usize,
    pub issues: Vec<CheckIssue>,
}

impl CheckReport {
    pub fn is_ok(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn issues_for(&self, rule: CheckRule) -> impl Iterator<Item = &CheckIssue> {
        self.issues.iter().filter(move |issue| issue.rule == rule)
    }

    /// Human-readable correction directions, one numbered entry per failed rule.
    pub fn render(&self) -> String {
        if self.is_ok() {
            return format!(
                "All checks passed on {} rows. The file is ready to be uploaded to Mismatch Finder.",
                self.checked_rows
            );
        }

        let mut by_rule: BTreeMap<CheckRule, Vec<&CheckIssue>> = BTreeMap::new();
        for issue in &self.issues {
            by_rule.entry(issue.rule).or_default().push(issue);
        }

        let mut out = format!(
            "The mismatch file does not meet the import requirements. See the file creation directions:\n\n{USER_GUIDE}\n"
        );
        for (n, (rule, issues)) in by_rule.iter().enumerate() {
            let _ = write!(out, "\n{}. {}", n + 1, rule.direction());
            for issue in issues.iter().take(RENDER_SAMPLE) {
                let _ = write!(out, "\n    - row {} `{}`: {:?}", issue.row, issue.column, issue.value);
            }
            if issues.len() > RENDER_SAMPLE {
                let _ = write!(out, "\n    ... and {} more", issues.len() - RENDER_SAMPLE);
            }
            out.push('\n');
        }
        out
    }
}

/// Check every record against the import formatting rules.
pub fn check_records(records: &[MismatchRecord]) -> CheckReport {
    let mut report = CheckReport {
        checked_rows: records.len(),
        issues: Vec::new(),
    };
    for (index, record) in records.iter().enumerate() {
        check_record(index + 1, record, &mut report.issues);
    }
    report
}

/// Check a mismatch file. Fails only when the file cannot be read or its
/// header is not the expected column list.
pub fn check_path(path: &Path) -> Result<CheckReport, MismatchError> {
    check_reader(File::open(path)?)
}

pub fn check_reader<R: Read>(reader: R) -> Result<CheckReport, MismatchError> {
    let mut reader = csv_reader(reader);
    check_header(&mut reader)?;

    let mut report = CheckReport::default();
    for row in reader.byte_records() {
        let row = row?;
        report.checked_rows += 1;
        match record_from_bytes(&row) {
            Ok(record) => check_record(report.checked_rows, &record, &mut report.issues),
            Err(defect) => report.issues.push(CheckIssue {
                rule: CheckRule::MalformedRow,
                row: report.checked_rows,
                column: String::new(),
                value: defect.to_string(),
            }),
        }
    }
    Ok(report)
}

fn check_record(row: usize, record: &MismatchRecord, issues: &mut Vec<CheckIssue>) {
    let mut flag = |rule: CheckRule, column: &str, value: &str| {
        issues.push(CheckIssue {
            rule,
            row,
            column: column.to_string(),
            value: value.to_string(),
        });
    };

    for column in REQUIRED_COLUMNS {
        let value = record.field(column).unwrap_or_default();
        if value.trim().is_empty() {
            flag(CheckRule::MissingValue, column, value);
        }
    }

    if !record.item_id.is_empty() && !item_id_re().is_match(&record.item_id) {
        flag(CheckRule::InvalidId, "item_id", &record.item_id);
    }
    if !record.property_id.is_empty() && !property_id_re().is_match(&record.property_id) {
        flag(CheckRule::InvalidId, "property_id", &record.property_id);
    }

    if record.statement_guid.is_empty() && !record.wikidata_value.is_empty() {
        flag(CheckRule::GuidWithoutValue, "statement_guid", &record.wikidata_value);
    }

    if !record.external_url.is_empty() && !is_valid_url(&record.external_url) {
        flag(CheckRule::InvalidUrl, "external_url", &record.external_url);
    }

    if !matches!(record.record_type.as_str(), "" | "statement" | "qualifier") {
        flag(CheckRule::InvalidType, "type", &record.record_type);
    }

    for (column, value) in [
        ("wikidata_value", &record.wikidata_value),
        ("external_value", &record.external_value),
        ("external_url", &record.external_url),
    ] {
        let chars = value.chars().count();
        if chars > MAX_VALUE_CHARS {
            flag(CheckRule::ValueTooLong, column, &format!("{chars} characters"));
        }
    }
}

/// Absolute URL with a scheme and a host.
pub fn is_valid_url(value: &str) -> bool {
    match url::Url::parse(value.trim()) {
        Ok(url) => url.host_str().is_some_and(|h| !h.is_empty()),
        Err(_) => false,
    }
}

/// Whether `path` has a `.csv` extension (case-insensitive).
pub fn is_csv_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"))
}

/// Size of the file at `path` and whether it is under `limit` bytes.
pub fn check_file_size(path: &Path, limit: u64) -> Result<(u64, bool), MismatchError> {
    let size = std::fs::metadata(path)?.len();
    let within = size < limit;
    if !within {
        warn!(
            path = %path.display(),
            size,
            limit,
            "mismatch file exceeds the import size limit; split it before uploading"
        );
    }
    Ok((size, within))
}
