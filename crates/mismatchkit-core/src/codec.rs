//! Mismatch Record Codec
//!
//! Reads and writes mismatch files (CSV, UTF-8, fixed eight-column header, no
//! index column) and normalizes statement GUID delimiters.
//!
//! Cells are kept verbatim. Writing uses minimal quoting and `\n` line
//! endings, so a file produced that way comes back byte-for-byte.

use crate::error::MismatchError;
use crate::MismatchRecord;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use tracing::{debug, warn};

/// Column order of a mismatch file.
pub const COLUMNS: [&str; 8] = [
    "item_id",
    "statement_guid",
    "property_id",
    "wikidata_value",
    "meta_wikidata_value",
    "external_value",
    "external_url",
    "type",
];

/// Columns that must hold a value on every row.
pub const REQUIRED_COLUMNS: [&str; 3] = ["item_id", "property_id", "external_value"];

/// A data row that cannot be read as a record at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowDefect {
    FieldCount { found: usize },
    InvalidUtf8 { field: usize },
}

impl std::fmt::Display for RowDefect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RowDefect::FieldCount { found } => {
                write!(f, "expected {} fields, found {found}", COLUMNS.len())
            }
            RowDefect::InvalidUtf8 { field } => write!(
                f,
                "field {} ({}) is not valid UTF-8",
                field + 1,
                COLUMNS.get(*field).unwrap_or(&"?")
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LoadOptions {
    /// Collect malformed rows instead of failing on the first one.
    pub partial: bool,
}

#[derive(Debug, Default)]
pub struct LoadedRecords {
    pub records: Vec<MismatchRecord>,
    /// Rows skipped under partial loading.
    pub rejected: Vec<MismatchError>,
}

pub fn load_path(path: &Path, options: LoadOptions) -> Result<LoadedRecords, MismatchError> {
    let file = File::open(path)?;
    let loaded = load_reader(file, options)?;
    debug!(
        path = %path.display(),
        records = loaded.records.len(),
        rejected = loaded.rejected.len(),
        "loaded mismatch file"
    );
    Ok(loaded)
}

pub fn load_reader<R: Read>(reader: R, options: LoadOptions) -> Result<LoadedRecords, MismatchError> {
    let mut reader = csv_reader(reader);
    check_header(&mut reader)?;

    let mut loaded = LoadedRecords::default();
    for row in reader.byte_records() {
        let row = row?;
        match record_from_row(&row) {
            Ok(record) => loaded.records.push(record),
            Err(err) if options.partial => {
                warn!(error = %err, "skipping malformed row");
                loaded.rejected.push(err);
            }
            Err(err) => return Err(err),
        }
    }
    Ok(loaded)
}

pub(crate) fn csv_reader<R: Read>(reader: R) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader)
}

pub(crate) fn check_header<R: Read>(reader: &mut csv::Reader<R>) -> Result<(), MismatchError> {
    let headers = reader.byte_headers()?;
    let found: Vec<&[u8]> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| match i {
            0 => h.strip_prefix("\u{feff}".as_bytes()).unwrap_or(h),
            _ => h,
        })
        .collect();
    let expected: Vec<&[u8]> = COLUMNS.iter().map(|c| c.as_bytes()).collect();
    if found != expected {
        return Err(MismatchError::InvalidHeader {
            found: found
                .iter()
                .map(|h| String::from_utf8_lossy(h))
                .collect::<Vec<_>>()
                .join(","),
        });
    }
    Ok(())
}

/// Decode one data row. Cells are taken verbatim; no value is required.
pub fn record_from_bytes(row: &csv::ByteRecord) -> Result<MismatchRecord, RowDefect> {
    if row.len() != COLUMNS.len() {
        return Err(RowDefect::FieldCount { found: row.len() });
    }
    let mut cells = Vec::with_capacity(COLUMNS.len());
    for (field, bytes) in row.iter().enumerate() {
        let text = std::str::from_utf8(bytes).map_err(|_| RowDefect::InvalidUtf8 { field })?;
        cells.push(text.to_string());
    }
    let cells: [String; 8] = cells
        .try_into()
        .map_err(|cells: Vec<String>| RowDefect::FieldCount { found: cells.len() })?;
    let [item_id, statement_guid, property_id, wikidata_value, meta_wikidata_value, external_value, external_url, record_type] =
        cells;

    Ok(MismatchRecord {
        item_id,
        statement_guid,
        property_id,
        wikidata_value,
        meta_wikidata_value,
        external_value,
        external_url,
        record_type,
    })
}

fn record_from_row(row: &csv::ByteRecord) -> Result<MismatchRecord, MismatchError> {
    let line = row.position().map(|p| p.line());
    let lossy = |i: usize| row.get(i).map(|b| String::from_utf8_lossy(b).into_owned());
    let malformed = |reason: String| MismatchError::MalformedRecord {
        line,
        item_id: lossy(0),
        statement_guid: lossy(1),
        reason,
    };

    let record = record_from_bytes(row).map_err(|defect| malformed(defect.to_string()))?;
    for name in REQUIRED_COLUMNS {
        if record.field(name).map_or(true, |v| v.trim().is_empty()) {
            return Err(malformed(format!("empty {name}")));
        }
    }
    Ok(record)
}

pub fn save_path(records: &[MismatchRecord], path: &Path) -> Result<(), MismatchError> {
    let file = File::create(path)?;
    save_writer(records, file)?;
    debug!(path = %path.display(), records = records.len(), "wrote mismatch file");
    Ok(())
}

pub fn save_writer<W: Write>(records: &[MismatchRecord], writer: W) -> Result<(), MismatchError> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(writer);
    writer.write_record(COLUMNS)?;
    for record in records {
        writer.write_record(record.fields())?;
    }
    writer.flush()?;
    Ok(())
}

/// Render records as a CSV string.
pub fn to_csv_string(records: &[MismatchRecord]) -> Result<String, MismatchError> {
    let mut buf = Vec::new();
    save_writer(records, &mut buf)?;
    String::from_utf8(buf).map_err(|e| MismatchError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))
}

// ============================================================================
// Statement GUID delimiter fix
// ============================================================================

/// Separators used in statement GUIDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuidFormat {
    /// Separator written when the mismatch file was generated
    pub generic_separator: char,
    /// Separator the knowledge base requires between entity id and suffix
    pub statement_separator: char,
}

impl Default for GuidFormat {
    fn default() -> Self {
        Self {
            generic_separator: '-',
            statement_separator: '$',
        }
    }
}

/// Replace the first generic separator in `guid` with the statement separator.
///
/// Returns the input unchanged when the statement separator already appears
/// before any generic separator, or when there is no generic separator, so
/// applying it twice is the same as applying it once.
pub fn normalize_statement_guid<'a>(guid: &'a str, format: &GuidFormat) -> Cow<'a, str> {
    let generic = match guid.find(format.generic_separator) {
        Some(index) => index,
        None => return Cow::Borrowed(guid),
    };
    if let Some(statement) = guid.find(format.statement_separator) {
        if statement < generic {
            return Cow::Borrowed(guid);
        }
    }

    let mut fixed = String::with_capacity(guid.len());
    fixed.push_str(&guid[..generic]);
    fixed.push(format.statement_separator);
    fixed.push_str(&guid[generic + format.generic_separator.len_utf8()..]);
    Cow::Owned(fixed)
}

/// Normalize the GUID of every record in place; returns how many changed.
pub fn normalize_guids(records: &mut [MismatchRecord], format: &GuidFormat) -> usize {
    let mut changed = 0;
    for record in records.iter_mut() {
        if let Cow::Owned(fixed) = normalize_statement_guid(&record.statement_guid, format) {
            record.statement_guid = fixed;
            changed += 1;
        }
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    const HEADER: &str = "item_id,statement_guid,property_id,wikidata_value,meta_wikidata_value,external_value,external_url,type\n";

    fn sample() -> String {
        format!(
            "{HEADER}\
Q77168,Q77168-8F4A2C1E-4B9D-4C7A-9E8F-0A1B2C3D4E5F,P569,+1971-00-00T00:00:00Z,,1979,https://ratings.fide.com/profile/4100018,statement\n\
Q4363644,Q4363644$1D2C3B4A-0000-4000-8000-000000000001,P569,+1961-00-00T00:00:00Z,Q1985727,1964,https://ratings.fide.com/profile/4100019,statement\n\
Q12345,Q12345$ABC,P569,+1950-00-00T00:00:00Z,,1951,\"https://example.org/a,b\",\n\
Q98765,Q98765$DEF,P569,+1988-00-00T00:00:00Z,,1989,https://ratings.fide.com/profile/1,statement\n"
        )
    }

    #[test]
    fn test_load_reads_all_columns() {
        let loaded = load_reader(sample().as_bytes(), LoadOptions::default()).unwrap();
        assert_eq!(loaded.records.len(), 4);
        let first = &loaded.records[0];
        assert_eq!(first.item_id, "Q77168");
        assert_eq!(first.external_value, "1979");
        assert_eq!(first.meta_wikidata_value, "");
        assert_eq!(first.record_type, "statement");
        assert_eq!(loaded.records[2].external_url, "https://example.org/a,b");
        assert_eq!(loaded.records[2].record_type, "");
    }

    #[test]
    fn test_round_trip_is_byte_identical() {
        let input = sample();
        let loaded = load_reader(input.as_bytes(), LoadOptions::default()).unwrap();
        assert_eq!(to_csv_string(&loaded.records).unwrap(), input);
    }

    #[test]
    fn test_round_trip_preserves_non_ascii() {
        let input = format!(
            "{HEADER}Q1,Q1$A,P569,+1950-00-00T00:00:00Z,,1950,https://example.org/Müller_Jürgen,statement\n"
        );
        let loaded = load_reader(input.as_bytes(), LoadOptions::default()).unwrap();
        assert_eq!(to_csv_string(&loaded.records).unwrap(), input);
    }

    #[test]
    fn test_empty_file_round_trips_header() {
        let loaded = load_reader(HEADER.as_bytes(), LoadOptions::default()).unwrap();
        assert!(loaded.records.is_empty());
        assert_eq!(to_csv_string(&loaded.records).unwrap(), HEADER);
    }

    #[test]
    fn test_header_must_match_exactly() {
        let input = "Unnamed: 0,item_id,statement_guid,property_id,wikidata_value,meta_wikidata_value,external_value,external_url,type\n";
        let err = load_reader(input.as_bytes(), LoadOptions::default()).unwrap_err();
        assert!(matches!(err, MismatchError::InvalidHeader { .. }));
    }

    #[test]
    fn test_malformed_row_is_fatal_by_default() {
        let input = format!("{HEADER}Q1,Q1$A,P569,+1950-00-00T00:00:00Z,,,https://example.org,statement\n");
        let err = load_reader(input.as_bytes(), LoadOptions::default()).unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::MalformedRecord));
        assert_eq!(err.item_id(), Some("Q1"));
        assert!(err.to_string().contains("line 2"));
        assert!(err.to_string().contains("empty external_value"));
    }

    #[test]
    fn test_partial_load_collects_rejected_rows() {
        let input = format!(
            "{HEADER}\
Q1,Q1$A,P569,+1950-00-00T00:00:00Z,,1950,https://example.org,statement\n\
Q2,Q2$A,P569\n\
,Q3$A,P569,+1950-00-00T00:00:00Z,,1950,https://example.org,statement\n\
Q4,Q4$A,P569,+1950-00-00T00:00:00Z,,1951,https://example.org,statement\n"
        );
        let loaded = load_reader(input.as_bytes(), LoadOptions { partial: true }).unwrap();
        let ids: Vec<_> = loaded.records.iter().map(|r| r.item_id.as_str()).collect();
        assert_eq!(ids, vec!["Q1", "Q4"]);
        assert_eq!(loaded.rejected.len(), 2);
        assert!(loaded.rejected[0].to_string().contains("expected 8 fields, found 3"));
    }

    #[test]
    fn test_invalid_utf8_row_is_rejected_like_any_malformed_row() {
        let mut input = HEADER.as_bytes().to_vec();
        input.extend_from_slice(b"Q1,Q1$A,P569,+1950-00-00T00:00:00Z,,1950,https://example.org,statement\n");
        input.extend_from_slice(b"Q2,Q2$A,P569,\xff\xfe,,1950,https://example.org,statement\n");
        input.extend_from_slice(b"Q3,Q3$A,P569,+1950-00-00T00:00:00Z,,1951,https://example.org,statement\n");

        let loaded = load_reader(input.as_slice(), LoadOptions { partial: true }).unwrap();
        let ids: Vec<_> = loaded.records.iter().map(|r| r.item_id.as_str()).collect();
        assert_eq!(ids, vec!["Q1", "Q3"]);
        assert_eq!(loaded.rejected.len(), 1);
        let rejected = loaded.rejected[0].to_string();
        assert!(rejected.contains("line 3"), "{rejected}");
        assert!(rejected.contains("field 4 (wikidata_value) is not valid UTF-8"), "{rejected}");

        let err = load_reader(input.as_slice(), LoadOptions::default()).unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::MalformedRecord));
        assert_eq!(err.item_id(), Some("Q2"));
    }

    #[test]
    fn test_record_from_bytes_takes_cells_verbatim() {
        let row = csv::ByteRecord::from(vec!["", "", "", "", "", "", "", ""]);
        let record = record_from_bytes(&row).unwrap();
        assert!(record.item_id.is_empty());

        let short = csv::ByteRecord::from(vec!["Q1", "Q1$A"]);
        assert_eq!(record_from_bytes(&short).unwrap_err(), RowDefect::FieldCount { found: 2 });
    }

    #[test]
    fn test_guid_fix_replaces_first_generic_separator_only() {
        let format = GuidFormat::default();
        let fixed = normalize_statement_guid("Q77168-8F4A2C1E-4B9D", &format);
        assert_eq!(fixed, "Q77168$8F4A2C1E-4B9D");
        assert!(matches!(fixed, Cow::Owned(_)));
    }

    #[test]
    fn test_guid_fix_is_idempotent() {
        let format = GuidFormat::default();
        let once = normalize_statement_guid("Q1-AAAA-BBBB", &format).into_owned();
        let twice = normalize_statement_guid(&once, &format);
        assert_eq!(twice, once);
        assert!(matches!(twice, Cow::Borrowed(_)));
    }

    #[test]
    fn test_guid_fix_leaves_guids_without_generic_separator() {
        let format = GuidFormat::default();
        assert!(matches!(normalize_statement_guid("Q1$ABCD", &format), Cow::Borrowed(_)));
        assert!(matches!(normalize_statement_guid("", &format), Cow::Borrowed(_)));
    }

    #[test]
    fn test_normalize_guids_counts_changes() {
        let mut records = load_reader(sample().as_bytes(), LoadOptions::default())
            .unwrap()
            .records;
        let format = GuidFormat::default();
        assert_eq!(normalize_guids(&mut records, &format), 1);
        assert_eq!(
            records[0].statement_guid,
            "Q77168$8F4A2C1E-4B9D-4C7A-9E8F-0A1B2C3D4E5F"
        );
        assert_eq!(normalize_guids(&mut records, &format), 0);
    }

    #[test]
    fn test_save_and_load_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mismatches.csv");
        let records = load_reader(sample().as_bytes(), LoadOptions::default())
            .unwrap()
            .records;
        save_path(&records, &path).unwrap();
        let reloaded = load_path(&path, LoadOptions::default()).unwrap();
        assert_eq!(reloaded.records, records);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), sample());
    }
}
