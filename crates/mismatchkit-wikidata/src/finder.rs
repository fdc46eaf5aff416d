//! Mismatch Finder import client
//!
//! Uploads mismatch files to `POST /api/imports` as multipart form data
//! (`mismatch_file`), authenticated with a bearer token. Import metadata goes
//! in the query string.
//!
//! All files are checked before the first request: a directory upload either
//! passes the local checks as a whole or sends nothing. Once uploading, a
//! rejected file is recorded and the remaining files are still sent.

use chrono::{NaiveDate, Utc};
use mismatchkit_core::validation::{is_csv_path, is_valid_url, IMPORT_SIZE_LIMIT};
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

pub const DEFAULT_IMPORT_URL: &str = "https://mismatch-finder.toolforge.org/api/imports";

pub const MAX_EXTERNAL_SOURCE_CHARS: usize = 100;
pub const MAX_DESCRIPTION_CHARS: usize = 350;

#[derive(Debug, Error)]
pub enum FinderError {
    #[error("invalid upload: {0}")]
    Validation(String),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("import API returned {status}: {body}")]
    Api { status: u16, body: String },
    #[error(transparent)]
    Io(#[from] io::Error),
}

// ============================================================================
// Import metadata
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportMetadata {
    /// Name of the external source shown to reviewers (required)
    pub external_source: String,
    pub description: Option<String>,
    pub external_source_url: Option<String>,
    /// Date after which the import's mismatches are no longer shown
    pub expires: Option<NaiveDate>,
}

impl ImportMetadata {
    pub fn new(external_source: impl Into<String>) -> Self {
        Self {
            external_source: external_source.into(),
            description: None,
            external_source_url: None,
            expires: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_external_source_url(mut self, url: impl Into<String>) -> Self {
        self.external_source_url = Some(url.into());
        self
    }

    pub fn with_expires(mut self, expires: NaiveDate) -> Self {
        self.expires = Some(expires);
        self
    }

    /// Check the metadata against the API's limits, with `today` as the
    /// reference date for `expires`.
    pub fn validate_on(&self, today: NaiveDate) -> Result<(), FinderError> {
        let source = self.external_source.trim();
        if source.is_empty() {
            return Err(FinderError::Validation("external_source is required".to_string()));
        }
        if source.chars().count() > MAX_EXTERNAL_SOURCE_CHARS {
            return Err(FinderError::Validation(format!(
                "external_source must be at most {MAX_EXTERNAL_SOURCE_CHARS} characters"
            )));
        }
        if let Some(description) = &self.description {
            if description.chars().count() > MAX_DESCRIPTION_CHARS {
                return Err(FinderError::Validation(format!(
                    "description must be at most {MAX_DESCRIPTION_CHARS} characters"
                )));
            }
        }
        if let Some(url) = &self.external_source_url {
            if !is_valid_url(url) {
                return Err(FinderError::Validation(format!(
                    "external_source_url '{url}' is not a valid URL"
                )));
            }
        }
        if let Some(expires) = self.expires {
            if expires <= today {
                return Err(FinderError::Validation(format!(
                    "expires ({expires}) must be a future date"
                )));
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), FinderError> {
        self.validate_on(Utc::now().date_naive())
    }

    /// Query-string pairs, optional fields only when set.
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![("external_source", self.external_source.trim().to_string())];
        if let Some(description) = &self.description {
            pairs.push(("description", description.clone()));
        }
        if let Some(url) = &self.external_source_url {
            pairs.push(("external_source_url", url.clone()));
        }
        if let Some(expires) = self.expires {
            pairs.push(("expires", expires.format("%Y-%m-%d").to_string()));
        }
        pairs
    }
}

/// Parse an `expires` argument (`YYYY-MM-DD`).
pub fn parse_expires(raw: &str) -> Result<NaiveDate, FinderError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|e| {
        FinderError::Validation(format!("expires '{raw}' is not a YYYY-MM-DD date: {e}"))
    })
}

// ============================================================================
// Local file checks
// ============================================================================

/// Size of `path` after checking it is an uploadable mismatch file.
pub fn check_upload_file(path: &Path) -> Result<u64, FinderError> {
    let meta = std::fs::metadata(path)?;
    if !meta.is_file() {
        return Err(FinderError::Validation(format!("{} is not a file", path.display())));
    }
    if !is_csv_path(path) {
        return Err(FinderError::Validation(format!("{} is not a CSV file", path.display())));
    }
    if meta.len() >= IMPORT_SIZE_LIMIT {
        return Err(FinderError::Validation(format!(
            "{} is {} bytes, over the {IMPORT_SIZE_LIMIT} byte import limit; split it first",
            path.display(),
            meta.len()
        )));
    }
    Ok(meta.len())
}

/// The CSV files of `dir` in upload (sorted) order.
///
/// The directory must contain nothing but mismatch files, each within the size
/// limit; every offender is listed in the error.
pub fn collect_upload_files(dir: &Path) -> Result<Vec<PathBuf>, FinderError> {
    let mut files = Vec::new();
    let mut not_csv = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && is_csv_path(&path) {
            files.push(path);
        } else {
            not_csv.push(path.display().to_string());
        }
    }
    if !not_csv.is_empty() {
        not_csv.sort();
        return Err(FinderError::Validation(format!(
            "{} must contain only CSV files; found:\n  {}",
            dir.display(),
            not_csv.join("\n  ")
        )));
    }
    if files.is_empty() {
        return Err(FinderError::Validation(format!("{} has no CSV files", dir.display())));
    }
    files.sort();

    let too_large: Vec<String> = files
        .iter()
        .filter(|p| check_upload_file(p).is_err())
        .map(|p| p.display().to_string())
        .collect();
    if !too_large.is_empty() {
        return Err(FinderError::Validation(format!(
            "files over the {IMPORT_SIZE_LIMIT} byte import limit:\n  {}",
            too_large.join("\n  ")
        )));
    }
    Ok(files)
}

// ============================================================================
// Client
// ============================================================================

/// A successful import request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportReceipt {
    pub status: u16,
    /// Response body (import id and status as reported by the API)
    pub body: serde_json::Value,
}

#[derive(Debug)]
pub struct UploadOutcome {
    pub path: PathBuf,
    pub result: Result<ImportReceipt, FinderError>,
}

impl UploadOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

pub struct MismatchFinderClient {
    client: Client,
    endpoint: String,
    access_token: String,
}

impl MismatchFinderClient {
    pub fn new(access_token: impl Into<String>, timeout: Duration) -> Result<Self, FinderError> {
        let access_token = access_token.into();
        if access_token.trim().is_empty() {
            return Err(FinderError::Validation("an access token is required".to_string()));
        }
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(crate::DEFAULT_USER_AGENT)
            .build()?;
        Ok(Self {
            client,
            endpoint: DEFAULT_IMPORT_URL.to_string(),
            access_token,
        })
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub async fn upload_file(
        &self,
        path: &Path,
        metadata: &ImportMetadata,
    ) -> Result<ImportReceipt, FinderError> {
        metadata.validate()?;
        check_upload_file(path)?;
        self.send(path, metadata).await
    }

    /// Upload every CSV file of `dir` in sorted order.
    pub async fn upload_dir(
        &self,
        dir: &Path,
        metadata: &ImportMetadata,
    ) -> Result<Vec<UploadOutcome>, FinderError> {
        metadata.validate()?;
        let files = collect_upload_files(dir)?;
        info!(dir = %dir.display(), files = files.len(), "uploading mismatch files");

        let mut outcomes = Vec::with_capacity(files.len());
        for path in files {
            let result = self.send(&path, metadata).await;
            if let Err(error) = &result {
                warn!(path = %path.display(), %error, "upload failed");
            }
            outcomes.push(UploadOutcome { path, result });
        }
        Ok(outcomes)
    }

    async fn send(&self, path: &Path, metadata: &ImportMetadata) -> Result<ImportReceipt, FinderError> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("mismatches.csv")
            .to_string();
        debug!(path = %path.display(), bytes = bytes.len(), "sending import");

        let part = Part::bytes(bytes).file_name(file_name).mime_str("text/csv")?;
        let form = Form::new().part("mismatch_file", part);

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.access_token)
            .header(reqwest::header::ACCEPT, "application/json")
            .query(&metadata.query_pairs())
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(FinderError::Api {
                status: status.as_u16(),
                body: text,
            });
        }
        let body = serde_json::from_str(&text).unwrap_or(serde_json::Value::String(text));
        info!(path = %path.display(), status = status.as_u16(), "import accepted");
        Ok(ImportReceipt {
            status: status.as_u16(),
            body,
        })
    }
}
