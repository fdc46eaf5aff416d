//! `mismatchkit filter`

use crate::FilterArgs;
use anyhow::{Context, Result};
use colored::Colorize;
use mismatchkit_core::codec::{load_path, save_path};
use mismatchkit_core::{
    normalize_guids, records_for, BatchFilter, BatchOutcome, ErrorKind, FilterConfig,
    MismatchError, RecordFailure, StatementFetcher,
};
use mismatchkit_wikidata::{WikidataConfig, WikidataRestSource};
use std::path::Path;
use std::sync::Arc;

/// File config, then environment, then command-line flags.
pub fn resolve_config(args: &FilterArgs) -> Result<FilterConfig> {
    let config = match &args.config {
        Some(path) => FilterConfig::from_json_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => FilterConfig::default(),
    };
    let mut config = config.with_env()?;
    if let Some(concurrency) = args.concurrency {
        config.fetch_concurrency = concurrency;
    }
    if let Some(policy) = args.absent_occupation {
        config.absent_occupation = policy;
    }
    if args.partial {
        config.partial_load = true;
    }
    config.validate()?;
    Ok(config)
}

pub async fn cmd_filter(args: &FilterArgs) -> Result<()> {
    let config = resolve_config(args)?;

    let loaded = load_path(&args.input, config.load_options())
        .with_context(|| format!("failed to load {}", args.input.display()))?;
    let mut records = loaded.records;
    eprintln!(
        "{} {} ({} records)",
        "Loaded".green().bold(),
        args.input.display(),
        records.len()
    );
    if !loaded.rejected.is_empty() {
        eprintln!(
            "{} skipped {} malformed rows",
            "warning:".yellow().bold(),
            loaded.rejected.len()
        );
    }

    if !args.no_guid_fix {
        let fixed = normalize_guids(&mut records, &config.guid);
        if fixed > 0 {
            eprintln!("  {} fixed {fixed} statement GUIDs", "→".yellow());
        }
    }

    let source = WikidataRestSource::new(WikidataConfig::from_env()?)?;
    eprintln!(
        "{} {} (concurrency {})",
        "Fetching from".green().bold(),
        source.config().base_url,
        config.fetch_concurrency
    );
    let fetcher = Arc::new(StatementFetcher::new(
        source,
        &config.occupation_property,
        &config.birth_date_property,
    ));
    let outcome = BatchFilter::from_config(fetcher, &config)
        .filter_batch(&records)
        .await;

    let selected = records_for(&records, &outcome.kept);
    save_path(&selected, &args.output)
        .with_context(|| format!("failed to write {}", args.output.display()))?;
    print_summary(&outcome, selected.len());
    eprintln!("{} {}", "wrote".green().bold(), args.output.display().to_string().bold());

    if let Some(path) = &args.failures {
        let mut failures = load_failures(&loaded.rejected);
        failures.extend(outcome.failures.iter().cloned());
        write_failures(path, &failures)
            .with_context(|| format!("failed to write {}", path.display()))?;
        eprintln!("{} {}", "wrote".green().bold(), path.display().to_string().bold());
    }
    Ok(())
}

fn print_summary(outcome: &BatchOutcome, selected_rows: usize) {
    let stats = &outcome.stats;
    eprintln!(
        "{} {} entities kept of {} ({} rows of {})",
        "ok".green().bold(),
        outcome.kept.len(),
        stats.entities,
        selected_rows,
        stats.records
    );
    eprintln!(
        "  {} {} occupation flags, {} birth-year flags, {} rows dropped",
        "→".yellow(),
        stats.occupation_flags,
        stats.birth_year_flags,
        stats.dropped_records
    );
    if !outcome.failures.is_empty() {
        eprintln!(
            "{} {} rows could not be classified ({} failures)",
            "warning:".yellow().bold(),
            stats.failed_records,
            outcome.failures.len()
        );
    }
}

fn load_failures(rejected: &[MismatchError]) -> Vec<RecordFailure> {
    rejected
        .iter()
        .map(|err| RecordFailure {
            item_id: err.item_id().unwrap_or_default().to_string(),
            statement_guid: match err {
                MismatchError::MalformedRecord { statement_guid, .. } => {
                    statement_guid.clone().unwrap_or_default()
                }
                _ => String::new(),
            },
            kind: err.kind().unwrap_or(ErrorKind::MalformedRecord),
            message: err.to_string(),
        })
        .collect()
}

/// Failures as CSV: `item_id,statement_guid,kind,message`.
pub fn write_failures(path: &Path, failures: &[RecordFailure]) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_path(path)?;
    if failures.is_empty() {
        writer.write_record(["item_id", "statement_guid", "kind", "message"])?;
    }
    for failure in failures {
        writer.serialize(failure)?;
    }
    writer.flush()?;
    Ok(())
}
