//! Bounding of raw tool results before re-injection into model context.
//!
//! Remote lookups can return hundreds of records; feeding them back
//! verbatim blows the context budget and buries the signal. Search-style
//! results are paginated and trimmed; detail-style results pass through
//! with their media references validated for reachability.

use std::collections::HashSet;
use std::time::Duration;

use futures::future::join_all;
use serde_json::{json, Map, Value};

use super::artifacts::is_image_url;
use crate::mcp_client::ToolInvoker;

// ─── Constants ──────────────────────────────────────────────────────────────

/// Records returned when the caller does not ask for a page size.
pub const DEFAULT_PAGE_SIZE: usize = 10;

/// Hard ceiling on an explicitly requested page size.
pub const MAX_PAGE_SIZE: usize = 50;

/// Budget for a single media existence probe.
const MEDIA_PROBE_TIMEOUT: Duration = Duration::from_secs(3);

// ─── ResultMinimizer ────────────────────────────────────────────────────────

/// Bounds tool results by tool kind.
pub struct ResultMinimizer {
    http: reqwest::Client,
}

impl ResultMinimizer {
    pub fn new() -> Self {
        Self { http: reqwest::Client::new() }
    }

    /// Dispatch on tool kind. `get_term_info` is detail-style; everything
    /// else (search_terms, run_query) is treated as search-style.
    pub async fn minimize(
        &self,
        tool_name: &str,
        raw: Value,
        args: &Value,
        gateway: &dyn ToolInvoker,
    ) -> Value {
        match tool_name {
            "get_term_info" => self.minimize_term_info(raw).await,
            _ => self.minimize_search(raw, args, gateway).await,
        }
    }

    // ─── Search-style ───────────────────────────────────────────────────

    /// Paginate and trim a search-style result.
    ///
    /// An exact (case-insensitive) label match against the query collapses
    /// the list to that single record, with the term's detail eagerly
    /// fetched and attached; a fetch failure just omits the detail.
    pub async fn minimize_search(
        &self,
        raw: Value,
        args: &Value,
        gateway: &dyn ToolInvoker,
    ) -> Value {
        let Some(records) = search_records(&raw) else {
            // Not a recognizable list shape; nothing to bound.
            return raw;
        };
        let total = records.len();
        let query = args.get("query").and_then(Value::as_str).unwrap_or("");

        // Exact-match collapse.
        if !query.is_empty() {
            let hit = records
                .iter()
                .find(|r| record_label(r).is_some_and(|l| l.eq_ignore_ascii_case(query)));
            if let Some(record) = hit {
                let mut out = json!({
                    "exact_match": true,
                    "results": [trim_record(record)],
                    "shown": 1,
                    "total_available": total,
                    "can_request_more": false,
                });
                if let Some(id) = record_id(record) {
                    match gateway.call_tool("get_term_info", json!({ "id": id })).await {
                        Ok(detail) if detail.success => {
                            if let Some(info) = detail.result {
                                out["term_info"] = self.minimize_term_info(info).await;
                            }
                        }
                        Ok(detail) => {
                            tracing::debug!(id = %id, error = ?detail.error, "eager detail fetch reported failure");
                        }
                        Err(e) => {
                            tracing::debug!(id = %id, error = %e, "eager detail fetch failed");
                        }
                    }
                }
                return out;
            }
        }

        let offset = args
            .get("offset")
            .and_then(Value::as_u64)
            .map(|n| n as usize)
            .unwrap_or(0);
        let limit = args
            .get("limit")
            .and_then(Value::as_u64)
            .map(|n| (n as usize).clamp(1, MAX_PAGE_SIZE))
            .unwrap_or(DEFAULT_PAGE_SIZE);

        // At or under the page size, nothing to cut.
        if offset == 0 && total <= limit {
            return json!({
                "results": records,
                "shown": total,
                "total_available": total,
                "can_request_more": false,
                "truncated": false,
            });
        }

        let page: Vec<Value> = records
            .iter()
            .skip(offset)
            .take(limit)
            .map(trim_record)
            .collect();
        let shown = page.len();
        json!({
            "results": page,
            "shown": shown,
            "total_available": total,
            "can_request_more": offset + shown < total,
            "truncated": true,
        })
    }

    // ─── Detail-style ───────────────────────────────────────────────────

    /// Pass a detail result through, dropping media references that fail a
    /// lightweight existence probe. Better to lose a thumbnail than to
    /// surface a broken link.
    pub async fn minimize_term_info(&self, raw: Value) -> Value {
        let mut urls: HashSet<String> = HashSet::new();
        collect_image_urls(&raw, &mut urls);
        if urls.is_empty() {
            return raw;
        }

        let probes = urls.iter().map(|url| {
            let http = self.http.clone();
            let url = url.clone();
            async move {
                let alive = probe_media(&http, &url).await;
                (url, alive)
            }
        });
        let dead: HashSet<String> = join_all(probes)
            .await
            .into_iter()
            .filter_map(|(url, alive)| (!alive).then_some(url))
            .collect();

        if dead.is_empty() {
            raw
        } else {
            tracing::debug!(dropped = dead.len(), "unreachable media references removed");
            prune_dead_media(raw, &dead)
        }
    }
}

impl Default for ResultMinimizer {
    fn default() -> Self {
        Self::new()
    }
}

/// HEAD probe; anything but a 2xx inside the budget counts as dead.
async fn probe_media(http: &reqwest::Client, url: &str) -> bool {
    match http.head(url).timeout(MEDIA_PROBE_TIMEOUT).send().await {
        Ok(resp) => resp.status().is_success(),
        Err(_) => false,
    }
}

// ─── Record shaping ─────────────────────────────────────────────────────────

/// Locate the record list inside a search-style payload.
fn search_records(raw: &Value) -> Option<Vec<Value>> {
    match raw {
        Value::Array(items) => Some(items.clone()),
        Value::Object(map) => map
            .get("results")
            .or_else(|| map.get("terms"))
            .or_else(|| map.get("rows"))
            .and_then(Value::as_array)
            .cloned(),
        _ => None,
    }
}

fn record_id(record: &Value) -> Option<&str> {
    record
        .get("id")
        .or_else(|| record.get("short_form"))
        .and_then(Value::as_str)
}

fn record_label(record: &Value) -> Option<&str> {
    record
        .get("label")
        .or_else(|| record.get("name"))
        .and_then(Value::as_str)
}

/// Keep id, label, and one representative synonym.
fn trim_record(record: &Value) -> Value {
    let mut out = Map::new();
    if let Some(id) = record_id(record) {
        out.insert("id".into(), Value::String(id.to_string()));
    }
    if let Some(label) = record_label(record) {
        out.insert("label".into(), Value::String(label.to_string()));
    }
    if let Some(synonym) = record
        .get("synonyms")
        .and_then(Value::as_array)
        .and_then(|s| s.first())
        .and_then(Value::as_str)
    {
        out.insert("synonym".into(), Value::String(synonym.to_string()));
    }
    Value::Object(out)
}

/// Label→id pairs from a (minimized or raw) search result, for cache
/// ingestion.
pub fn extract_label_ids(value: &Value) -> Vec<(String, String)> {
    let Some(records) = search_records(value) else {
        return Vec::new();
    };
    records
        .iter()
        .filter_map(|r| {
            let label = record_label(r)?;
            let id = record_id(r)?;
            Some((label.to_string(), id.to_string()))
        })
        .collect()
}

// ─── Media pruning ──────────────────────────────────────────────────────────

fn collect_image_urls(value: &Value, urls: &mut HashSet<String>) {
    match value {
        Value::String(s) if is_image_url(s) => {
            urls.insert(s.clone());
        }
        Value::Array(items) => items.iter().for_each(|v| collect_image_urls(v, urls)),
        Value::Object(map) => map.values().for_each(|v| collect_image_urls(v, urls)),
        _ => {}
    }
}

/// Remove string values (and the object fields / array slots holding them)
/// that name a dead media URL.
fn prune_dead_media(value: Value, dead: &HashSet<String>) -> Value {
    match value {
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .filter(|v| !matches!(v, Value::String(s) if dead.contains(s)))
                .map(|v| prune_dead_media(v, dead))
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(_, v)| !matches!(v, Value::String(s) if dead.contains(s)))
                .map(|(k, v)| (k, prune_dead_media(v, dead)))
                .collect(),
        ),
        other => other,
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
