//! `mismatchkit upload`

use crate::UploadArgs;
use anyhow::{anyhow, Result};
use colored::Colorize;
use mismatchkit_wikidata::finder::parse_expires;
use mismatchkit_wikidata::{ImportMetadata, MismatchFinderClient};
use std::time::Duration;

const TOKEN_ENV: &str = "MISMATCH_FINDER_TOKEN";

pub fn metadata_from_args(args: &UploadArgs) -> Result<ImportMetadata> {
    let mut metadata = ImportMetadata::new(args.external_source.clone());
    if let Some(description) = &args.description {
        metadata = metadata.with_description(description.clone());
    }
    if let Some(url) = &args.external_source_url {
        metadata = metadata.with_external_source_url(url.clone());
    }
    if let Some(expires) = &args.expires {
        metadata = metadata.with_expires(parse_expires(expires)?);
    }
    metadata.validate()?;
    Ok(metadata)
}

pub async fn cmd_upload(args: &UploadArgs) -> Result<()> {
    let token = args
        .access_token
        .clone()
        .or_else(|| std::env::var(TOKEN_ENV).ok())
        .ok_or_else(|| anyhow!("pass --access-token or set {TOKEN_ENV}"))?;
    let metadata = metadata_from_args(args)?;
    let client = MismatchFinderClient::new(token, Duration::from_secs(args.timeout_secs))?;

    if let Some(file) = &args.file {
        eprintln!("{} {}", "Uploading".green().bold(), file.display());
        let receipt = client.upload_file(file, &metadata).await?;
        eprintln!("{} HTTP {} {}", "ok".green().bold(), receipt.status, receipt.body);
        return Ok(());
    }

    let dir = args
        .dir
        .as_ref()
        .ok_or_else(|| anyhow!("pass --file or --dir"))?;
    eprintln!("{} files in {}", "Uploading".green().bold(), dir.display());
    let outcomes = client.upload_dir(dir, &metadata).await?;

    let mut failed = 0;
    for outcome in &outcomes {
        match &outcome.result {
            Ok(receipt) => eprintln!(
                "  {} {} (HTTP {})",
                "ok".green().bold(),
                outcome.path.display(),
                receipt.status
            ),
            Err(err) => {
                failed += 1;
                eprintln!("  {} {}: {err}", "failed".red().bold(), outcome.path.display());
            }
        }
    }
    if failed > 0 {
        return Err(anyhow!("{failed} of {} uploads failed", outcomes.len()));
    }
    eprintln!("{} uploaded {} files", "ok".green().bold(), outcomes.len());
    Ok(())
}
