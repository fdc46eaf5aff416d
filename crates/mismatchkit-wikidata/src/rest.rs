//! Wikibase REST API statement source
//!
//! `GET {base_url}/entities/items/{item_id}/statements` returns every
//! statement of the item grouped by property:
//!
//! ```json
//! { "P569": [ { "id": "Q77168$…",
//!               "property": { "id": "P569", "data_type": "time" },
//!               "value": { "type": "value",
//!                          "content": { "time": "+1979-00-00T00:00:00Z", "precision": 9 } } } ] }
//! ```
//!
//! Rate limits (429), server errors and transport failures are retried;
//! anything else fails the entity with `EntityFetchFailed`.

use crate::{ConfigError, WikidataConfig};
use async_trait::async_trait;
use mismatchkit_core::{EntityError, EntityStatements, Statement, StatementSource, StatementValue};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

/// Longest server-requested wait that is honoured.
const MAX_RETRY_AFTER: Duration = Duration::from_secs(60);

/// Error bodies are cut to this many characters in failure reasons.
const BODY_SNIPPET: usize = 200;

/// [`StatementSource`] over the Wikibase REST API.
///
/// Only item ids (`Q` followed by digits) are requested; any other id fails
/// with `EntityFetchFailed` before a request is made. Sources for other
/// knowledge bases implement [`StatementSource`] themselves.
pub struct WikidataRestSource {
    client: Client,
    config: WikidataConfig,
}

/// Result of a single request that did not produce a body.
enum Attempt {
    Retry {
        reason: String,
        wait: Option<Duration>,
    },
    Fatal(String),
}

impl WikidataRestSource {
    pub fn new(config: WikidataConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let client = Client::builder()
            .timeout(config.timeout())
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self { client, config })
    }

    /// Use a caller-built client; `config` still supplies the URL and retry policy.
    pub fn with_client(client: Client, config: WikidataConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &WikidataConfig {
        &self.config
    }

    pub fn statements_url(&self, item_id: &str) -> String {
        format!(
            "{}/entities/items/{}/statements",
            self.config.base_url.trim_end_matches('/'),
            item_id
        )
    }

    async fn request(&self, url: &str) -> Result<Value, Attempt> {
        let response = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| Attempt::Retry {
                reason: format!("request failed: {e}"),
                wait: None,
            })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let wait = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.trim().parse::<u64>().ok())
                .map(|secs| Duration::from_secs(secs).min(MAX_RETRY_AFTER));
            return Err(Attempt::Retry {
                reason: "rate limited (HTTP 429)".to_string(),
                wait,
            });
        }
        if status.is_server_error() {
            return Err(Attempt::Retry {
                reason: format!("HTTP {}", status.as_u16()),
                wait: None,
            });
        }
        if status == StatusCode::NOT_FOUND {
            return Err(Attempt::Fatal("item not found (HTTP 404)".to_string()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Attempt::Fatal(format!(
                "HTTP {}: {}",
                status.as_u16(),
                snippet(&body)
            )));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| Attempt::Fatal(format!("invalid JSON response: {e}")))
    }

    fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.config.retry_backoff_ms.saturating_mul(u64::from(attempt) + 1))
    }
}

#[async_trait]
impl StatementSource for WikidataRestSource {
    async fn statements(
        &self,
        item_id: &str,
        property_ids: &[&str],
    ) -> Result<EntityStatements, EntityError> {
        if !is_item_id(item_id) {
            return Err(EntityError::fetch_failed(item_id, "not an item id"));
        }
        let url = self.statements_url(item_id);

        let mut attempt = 0;
        let body = loop {
            match self.request(&url).await {
                Ok(body) => break body,
                Err(Attempt::Fatal(reason)) => return Err(EntityError::fetch_failed(item_id, reason)),
                Err(Attempt::Retry { reason, wait }) => {
                    if attempt >= self.config.max_retries {
                        return Err(EntityError::fetch_failed(
                            item_id,
                            format!("{reason} after {} attempts", attempt + 1),
                        ));
                    }
                    let wait = wait.unwrap_or_else(|| self.backoff(attempt));
                    warn!(item_id, %reason, attempt = attempt + 1, wait_ms = wait.as_millis() as u64, "retrying statements request");
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
            }
        };

        let statements = parse_statements(item_id, &body, property_ids)?;
        debug!(
            item_id,
            properties = statements.len(),
            statements = statements.values().map(Vec::len).sum::<usize>(),
            "fetched statements"
        );
        Ok(statements)
    }
}

fn is_item_id(item_id: &str) -> bool {
    item_id
        .strip_prefix('Q')
        .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
}

fn snippet(body: &str) -> String {
    let trimmed = body.trim();
    match trimmed.char_indices().nth(BODY_SNIPPET) {
        Some((cut, _)) => format!("{}…", &trimmed[..cut]),
        None => trimmed.to_string(),
    }
}

// ============================================================================
// Response parsing
// ============================================================================

/// Statements of the requested properties from a `/statements` response body.
///
/// Properties the item has no statements for are left out of the map.
pub fn parse_statements(
    item_id: &str,
    body: &Value,
    property_ids: &[&str],
) -> Result<EntityStatements, EntityError> {
    let by_property = body
        .as_object()
        .ok_or_else(|| EntityError::fetch_failed(item_id, "statements response is not a JSON object"))?;

    let mut out = EntityStatements::new();
    for &property in property_ids {
        let Some(raw) = by_property.get(property) else {
            continue;
        };
        let list = raw.as_array().ok_or_else(|| {
            EntityError::fetch_failed(item_id, format!("statements for {property} are not a list"))
        })?;
        let statements = list
            .iter()
            .map(|s| parse_statement(item_id, s))
            .collect::<Result<Vec<_>, _>>()?;
        out.insert(property.to_string(), statements);
    }
    Ok(out)
}

/// One statement object. The value shape is chosen from the property's
/// `data_type` when present, otherwise from the content itself.
pub fn parse_statement(item_id: &str, raw: &Value) -> Result<Statement, EntityError> {
    let id = raw.get("id").and_then(Value::as_str).unwrap_or_default().to_string();
    let malformed = || EntityError::MalformedAttributeValue {
        item_id: item_id.to_string(),
        statement_id: id.clone(),
        value: raw.get("value").unwrap_or(raw).to_string(),
    };

    let value = raw.get("value").ok_or_else(malformed)?;
    let value = match value.get("type").and_then(Value::as_str) {
        Some("somevalue") => StatementValue::SomeValue,
        Some("novalue") => StatementValue::NoValue,
        Some("value") => {
            let content = value.get("content").ok_or_else(malformed)?;
            let data_type = raw
                .get("property")
                .and_then(|p| p.get("data_type"))
                .and_then(Value::as_str);
            match data_type {
                Some("wikibase-item") => {
                    StatementValue::Item(content.as_str().ok_or_else(malformed)?.to_string())
                }
                Some("time") => StatementValue::Time(
                    content
                        .get("time")
                        .and_then(Value::as_str)
                        .ok_or_else(malformed)?
                        .to_string(),
                ),
                Some(_) => StatementValue::Other(content.clone()),
                None => infer_value(content),
            }
        }
        _ => return Err(malformed()),
    };

    Ok(Statement { id, value })
}

fn infer_value(content: &Value) -> StatementValue {
    if let Some(s) = content.as_str() {
        if is_item_id(s) {
            return StatementValue::Item(s.to_string());
        }
    }
    if let Some(time) = content.get("time").and_then(Value::as_str) {
        return StatementValue::Time(time.to_string());
    }
    StatementValue::Other(content.clone())
}
