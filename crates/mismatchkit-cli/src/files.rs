//! Local mismatch-file commands: `normalize-guids`, `check`, `split`.

use anyhow::{anyhow, Context, Result};
use colored::Colorize;
use mismatchkit_core::codec::{load_path, save_path, COLUMNS};
use mismatchkit_core::split::{split_file, SplitOptions};
use mismatchkit_core::validation::{check_file_size, check_path, is_csv_path, IMPORT_SIZE_LIMIT};
use mismatchkit_core::{normalize_guids, FilterConfig, LoadOptions, MismatchError};
use std::path::Path;

pub fn cmd_normalize_guids(input: &Path, output: &Path, config: Option<&Path>) -> Result<()> {
    let config = match config {
        Some(path) => FilterConfig::from_json_file(path)?,
        None => FilterConfig::default(),
    };
    config.validate()?;

    let mut records = load_path(input, LoadOptions::default())
        .with_context(|| format!("failed to load {}", input.display()))?
        .records;
    let fixed = normalize_guids(&mut records, &config.guid);
    save_path(&records, output).with_context(|| format!("failed to write {}", output.display()))?;

    eprintln!(
        "{} fixed {fixed} of {} statement GUIDs",
        "ok".green().bold(),
        records.len()
    );
    eprintln!("{} {}", "wrote".green().bold(), output.display().to_string().bold());
    Ok(())
}

/// Prints the check report; returns whether the file passed.
pub fn cmd_check(input: &Path) -> Result<bool> {
    let (passed, text) = check_output(input)?;
    println!("{text}");
    Ok(passed)
}

fn check_output(input: &Path) -> Result<(bool, String)> {
    if !is_csv_path(input) {
        return Err(anyhow!("{} is not a .csv file", input.display()));
    }
    let mut out = format!("{} {}\n", "Checking".green().bold(), input.display());

    let (size, within) = check_file_size(input, IMPORT_SIZE_LIMIT)?;
    if !within {
        out.push_str(&format!(
            "{} {} is {size} bytes, over the {IMPORT_SIZE_LIMIT} byte import limit; run `mismatchkit split` before uploading\n",
            "warning:".yellow().bold(),
            input.display()
        ));
    }

    let report = match check_path(input) {
        Ok(report) => report,
        Err(err @ MismatchError::InvalidHeader { .. }) => {
            out.push_str(&format!(
                "{} {err}\nPlease check that the columns are present in this exact order:\n    {}",
                "error:".red().bold(),
                COLUMNS.join(", ")
            ));
            return Ok((false, out));
        }
        Err(err) => {
            return Err(err).with_context(|| format!("failed to check {}", input.display()))
        }
    };

    if report.is_ok() {
        out.push_str(&format!("{} {}", "ok".green().bold(), report.render()));
    } else {
        out.push_str(&report.render());
    }
    Ok((report.is_ok() && within, out))
}

pub fn cmd_split(input: &Path, out_dir: Option<&Path>, limit_mb: u64, delete_input: bool) -> Result<()> {
    if limit_mb == 0 {
        return Err(anyhow!("--limit-mb must be at least 1"));
    }
    let options = SplitOptions {
        limit: limit_mb.saturating_mul(1024 * 1024),
        delete_input,
    };
    let parts = split_file(input, out_dir, &options)?;

    eprintln!(
        "{} split {} into {} files:",
        "ok".green().bold(),
        input.display(),
        parts.len()
    );
    for part in &parts {
        eprintln!("  {} {}", "→".yellow(), part.display());
    }
    if delete_input {
        eprintln!("{} {}", "deleted".yellow().bold(), input.display());
    }
    Ok(())
}
