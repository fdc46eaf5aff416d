//! Split an oversized mismatch file into parts that fit the import limit.
//!
//! Rows are divided into contiguous, near-equal chunks; each part repeats the
//! header. All parts are rendered in memory and checked against the limit
//! before anything is written, so a failed split leaves no partial output.

use crate::codec::{load_path, to_csv_string, LoadOptions};
use crate::error::MismatchError;
use crate::validation::{is_csv_path, IMPORT_SIZE_LIMIT};
use crate::MismatchRecord;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy)]
pub struct SplitOptions {
    /// Every part must be strictly smaller than this many bytes.
    pub limit: u64,
    /// Remove the input file once all parts are written.
    pub delete_input: bool,
}

impl Default for SplitOptions {
    fn default() -> Self {
        Self {
            limit: IMPORT_SIZE_LIMIT,
            delete_input: false,
        }
    }
}

/// Split `input` into `<stem>_<i>.csv` parts inside `out_dir`.
///
/// With no `out_dir` the parts go to `<input dir>/<stem>`, which must not
/// exist yet. A supplied directory is created when missing and must otherwise
/// be empty.
pub fn split_file(
    input: &Path,
    out_dir: Option<&Path>,
    options: &SplitOptions,
) -> Result<Vec<PathBuf>, MismatchError> {
    let fail = |reason: String| MismatchError::Split {
        path: input.to_path_buf(),
        reason,
    };

    if !is_csv_path(input) {
        return Err(fail("not a .csv file".to_string()));
    }
    let size = fs::metadata(input)?.len();
    if size < options.limit {
        return Err(fail(format!(
            "file is {size} bytes, already under the {} byte limit",
            options.limit
        )));
    }
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| fail("file name is not valid UTF-8".to_string()))?
        .to_string();

    let out_dir = match out_dir {
        Some(dir) => {
            if dir.exists() {
                if fs::read_dir(dir)?.next().is_some() {
                    return Err(fail(format!("output directory {} is not empty", dir.display())));
                }
            } else {
                debug!(dir = %dir.display(), "creating output directory");
            }
            dir.to_path_buf()
        }
        None => {
            let dir = input.parent().unwrap_or_else(|| Path::new("")).join(&stem);
            if dir.exists() {
                return Err(fail(format!(
                    "{} already exists; pass an output directory",
                    dir.display()
                )));
            }
            dir
        }
    };

    let records = load_path(input, LoadOptions::default())?.records;
    let parts = render_parts(&records, size, options.limit).map_err(fail)?;

    fs::create_dir_all(&out_dir)?;
    let mut written = Vec::with_capacity(parts.len());
    for (i, body) in parts.iter().enumerate() {
        let path = out_dir.join(format!("{stem}_{}.csv", i + 1));
        fs::write(&path, body)?;
        debug!(path = %path.display(), bytes = body.len(), "wrote part");
        written.push(path);
    }

    if options.delete_input {
        fs::remove_file(input)?;
        debug!(path = %input.display(), "deleted input");
    }
    info!(
        input = %input.display(),
        parts = written.len(),
        dir = %out_dir.display(),
        "split mismatch file"
    );
    Ok(written)
}

/// Render the smallest part count (starting from `ceil(size / limit)`) whose
/// parts all fit under `limit`.
fn render_parts(records: &[MismatchRecord], size: u64, limit: u64) -> Result<Vec<String>, String> {
    if records.is_empty() {
        return Err("file has no records".to_string());
    }
    let mut count = usize::try_from(size.div_ceil(limit.max(1)))
        .unwrap_or(usize::MAX)
        .clamp(1, records.len());

    loop {
        let parts = chunk_sizes(records.len(), count)
            .into_iter()
            .scan(0, |start, len| {
                let chunk = &records[*start..*start + len];
                *start += len;
                Some(chunk)
            })
            .map(to_csv_string)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| e.to_string())?;

        match parts.iter().position(|p| p.len() as u64 >= limit) {
            None => return Ok(parts),
            Some(_) if count == records.len() => {
                return Err(format!("a single row does not fit in {limit} bytes"));
            }
            Some(index) => {
                debug!(count, oversized_part = index + 1, "part over the limit, splitting further");
                count += 1;
            }
        }
    }
}

/// Lengths of `count` contiguous chunks over `len` rows; the first `len % count`
/// chunks hold one extra row.
pub fn chunk_sizes(len: usize, count: usize) -> Vec<usize> {
    let count = count.max(1);
    let (base, extra) = (len / count, len % count);
    (0..count).map(|i| base + usize::from(i < extra)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::save_path;

    fn records(n: usize) -> Vec<MismatchRecord> {
        (0..n)
            .map(|i| MismatchRecord {
                item_id: format!("Q{}", 1000 + i),
                statement_guid: format!("Q{}$5E0A1C2D-{i:04}", 1000 + i),
                property_id: "P569".into(),
                wikidata_value: "+1950-00-00T00:00:00Z".into(),
                meta_wikidata_value: String::new(),
                external_value: "1951".into(),
                external_url: format!("https://ratings.fide.com/profile/{i}"),
                record_type: "statement".into(),
            })
            .collect()
    }

    fn write_input(dir: &Path, n: usize) -> (PathBuf, Vec<MismatchRecord>) {
        let path = dir.join("fide.csv");
        let rows = records(n);
        save_path(&rows, &path).unwrap();
        (path, rows)
    }

    #[test]
    fn test_chunk_sizes() {
        assert_eq!(chunk_sizes(10, 3), vec![4, 3, 3]);
        assert_eq!(chunk_sizes(9, 3), vec![3, 3, 3]);
        assert_eq!(chunk_sizes(2, 4), vec![1, 1, 0, 0]);
        assert_eq!(chunk_sizes(5, 0), vec![5]);
    }

    #[test]
    fn test_split_into_default_directory() {
        let dir = tempfile::tempdir().unwrap();
        let (input, rows) = write_input(dir.path(), 60);
        let options = SplitOptions {
            limit: 1024,
            delete_input: false,
        };

        let parts = split_file(&input, None, &options).unwrap();
        assert!(parts.len() >= 2);
        assert_eq!(parts[0], dir.path().join("fide").join("fide_1.csv"));

        let mut rejoined = Vec::new();
        for part in &parts {
            assert!(fs::metadata(part).unwrap().len() < 1024);
            rejoined.extend(load_path(part, LoadOptions::default()).unwrap().records);
        }
        assert_eq!(rejoined, rows);
        assert!(input.exists());

        // The default directory now exists, so a second split is refused.
        let err = split_file(&input, None, &options).unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }

    #[test]
    fn test_split_into_supplied_directory_and_delete_input() {
        let dir = tempfile::tempdir().unwrap();
        let (input, _) = write_input(dir.path(), 30);
        let out = dir.path().join("nested").join("parts");
        let options = SplitOptions {
            limit: 2048,
            delete_input: true,
        };

        let parts = split_file(&input, Some(&out), &options).unwrap();
        assert!(parts.iter().all(|p| p.starts_with(&out)));
        assert!(!input.exists());
    }

    #[test]
    fn test_refusals() {
        let dir = tempfile::tempdir().unwrap();
        let (input, _) = write_input(dir.path(), 3);

        let small = split_file(&input, None, &SplitOptions::default()).unwrap_err();
        assert!(small.to_string().contains("already under"));

        let busy = dir.path().join("busy");
        fs::create_dir(&busy).unwrap();
        fs::write(busy.join("other.csv"), "x").unwrap();
        let options = SplitOptions {
            limit: 64,
            delete_input: false,
        };
        let not_empty = split_file(&input, Some(&busy), &options).unwrap_err();
        assert!(not_empty.to_string().contains("not empty"));

        let tsv = dir.path().join("fide.tsv");
        fs::write(&tsv, "x").unwrap();
        assert!(split_file(&tsv, None, &options).is_err());
    }

    #[test]
    fn test_row_larger_than_limit_fails_without_output() {
        let dir = tempfile::tempdir().unwrap();
        let (input, _) = write_input(dir.path(), 4);
        let options = SplitOptions {
            limit: 150,
            delete_input: true,
        };
        let err = split_file(&input, None, &options).unwrap_err();
        assert!(err.to_string().contains("single row"));
        assert!(!dir.path().join("fide").exists());
        assert!(input.exists());
    }
}
