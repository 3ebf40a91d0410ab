//! Term-resolution cache — natural-language entity names ↔ canonical VFB IDs.
//!
//! Three maps: `lookup` (label → id), `reverse_lookup` (id → primary label),
//! and `normalized_lookup` (case-folded, separator-stripped label → id) for
//! fuzzy resolution. First writer wins on normalized keys so fuzzy lookups
//! stay deterministic. The cache grows monotonically for the process
//! lifetime — an accepted tradeoff, not a leak — and is snapshotted to disk
//! as an advisory warm-start file, never a source of truth.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Mutex, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::CacheError;

// ─── Constants ──────────────────────────────────────────────────────────────

/// Canonical ID prefixes recognized for automatic text-linking.
///
/// IDs with other prefixes are still cached but never linkified.
const RECOGNIZED_ID_PREFIXES: &[&str] = &["VFB_", "FBbt_", "FBgn_", "FBal_"];

/// Life-stage qualifiers stripped during normalization when the remainder
/// is non-trivial ("adult mushroom body" resolves like "mushroom body").
const LIFE_STAGE_PREFIXES: &[&str] = &["adult", "larval", "embryonic", "pupal"];

/// Persist the snapshot every N insertions.
const PERSIST_EVERY_N_INSERTS: u64 = 25;

/// Minimum remainder length for life-stage stripping to apply.
const MIN_STRIPPED_REMAINDER: usize = 3;

// Private-use sentinels bracketing protected spans during linkify.
const SPAN_OPEN: char = '\u{E000}';
const SPAN_CLOSE: char = '\u{E001}';

// ─── Snapshot ───────────────────────────────────────────────────────────────

/// On-disk snapshot shape. Rebuildable; read best-effort at startup.
#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    lookup: HashMap<String, String>,
    reverse_lookup: HashMap<String, String>,
    normalized_lookup: HashMap<String, String>,
    last_updated: DateTime<Utc>,
}

// ─── Cache internals ────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct CacheMaps {
    lookup: HashMap<String, String>,
    reverse_lookup: HashMap<String, String>,
    normalized_lookup: HashMap<String, String>,
    /// Insertion order per label, for deterministic tie-breaks.
    insert_seq: HashMap<String, u64>,
    seq: u64,
    inserts_since_persist: u64,
}

impl CacheMaps {
    /// Idempotent insert; first writer wins on every map.
    ///
    /// Returns true when the label was new.
    fn insert(&mut self, label: &str, id: &str) -> bool {
        if label.is_empty() || id.is_empty() {
            return false;
        }
        if self.lookup.contains_key(label) {
            return false;
        }
        self.lookup.insert(label.to_string(), id.to_string());
        self.insert_seq.insert(label.to_string(), self.seq);
        self.seq += 1;
        self.reverse_lookup.entry(id.to_string()).or_insert_with(|| label.to_string());
        let norm = normalize(label);
        if !norm.is_empty() {
            self.normalized_lookup.entry(norm).or_insert_with(|| id.to_string());
        }
        true
    }
}

// ─── TermLookupCache ────────────────────────────────────────────────────────

/// Shared label↔id cache, safe for concurrent turns.
///
/// Reads and writes go through an `RwLock`; only the snapshot write is
/// additionally serialized (single-writer) so concurrent persistence
/// triggers cannot corrupt the file.
pub struct TermLookupCache {
    maps: RwLock<CacheMaps>,
    snapshot_path: Option<PathBuf>,
    persist_lock: Mutex<()>,
}

impl TermLookupCache {
    /// An in-memory cache seeded with the built-in term set.
    pub fn new() -> Self {
        let mut maps = CacheMaps::default();
        for (label, id) in builtin_seed() {
            maps.insert(label, id);
        }
        Self {
            maps: RwLock::new(maps),
            snapshot_path: None,
            persist_lock: Mutex::new(()),
        }
    }

    /// A cache backed by a snapshot file.
    ///
    /// If the snapshot is unreadable or absent the cache starts from the
    /// built-in seed set and continues — persistence is advisory.
    pub fn with_snapshot(path: PathBuf) -> Self {
        let mut cache = match Self::load_snapshot(&path) {
            Ok(maps) => {
                tracing::info!(path = %path.display(), entries = maps.lookup.len(), "term cache snapshot loaded");
                Self {
                    maps: RwLock::new(maps),
                    snapshot_path: None,
                    persist_lock: Mutex::new(()),
                }
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "snapshot unavailable, starting from seed set");
                Self::new()
            }
        };
        cache.snapshot_path = Some(path);
        cache
    }

    fn load_snapshot(path: &PathBuf) -> Result<CacheMaps, CacheError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| CacheError::SnapshotRead { reason: e.to_string() })?;
        let snap: Snapshot = serde_json::from_str(&raw)
            .map_err(|e| CacheError::SnapshotRead { reason: e.to_string() })?;

        // Rebuild insertion order deterministically: sorted labels. The
        // original order is not stored; what matters is that ties break the
        // same way on every reload.
        let mut maps = CacheMaps {
            lookup: snap.lookup,
            reverse_lookup: snap.reverse_lookup,
            normalized_lookup: snap.normalized_lookup,
            ..CacheMaps::default()
        };
        let mut labels: Vec<String> = maps.lookup.keys().cloned().collect();
        labels.sort();
        for label in labels {
            maps.insert_seq.insert(label, maps.seq);
            maps.seq += 1;
        }
        Ok(maps)
    }

    /// Number of known labels.
    pub fn len(&self) -> usize {
        self.maps.read().expect("term cache lock poisoned").lookup.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The primary (first-seen) label for a canonical ID.
    pub fn primary_label(&self, id: &str) -> Option<String> {
        self.maps
            .read()
            .expect("term cache lock poisoned")
            .reverse_lookup
            .get(id)
            .cloned()
    }

    // ─── resolve ────────────────────────────────────────────────────────

    /// Resolve a natural-language term to its canonical ID.
    ///
    /// Tries, in order: exact label match, identity on canonical IDs,
    /// normalized-key match, substring match (longest label wins; equal
    /// lengths break to the first-inserted label). `None` means
    /// "unresolved", not an error.
    pub fn resolve(&self, term: &str) -> Option<String> {
        let term = term.trim();
        if term.is_empty() {
            return None;
        }
        let maps = self.maps.read().expect("term cache lock poisoned");

        // 1. Exact label
        if let Some(id) = maps.lookup.get(term) {
            return Some(id.clone());
        }

        // 2. Already a canonical ID
        if is_canonical_id(term) {
            return Some(term.to_string());
        }

        // 3. Normalized
        let norm = normalize(term);
        if !norm.is_empty() {
            if let Some(id) = maps.normalized_lookup.get(&norm) {
                return Some(id.clone());
            }
        }

        // 4. Substring against all known labels; longest label wins,
        //    first-inserted breaks equal lengths.
        let term_lower = term.to_lowercase();
        let mut best: Option<(&String, &String)> = None;
        for (label, id) in &maps.lookup {
            if !label.to_lowercase().contains(&term_lower) {
                continue;
            }
            best = match best {
                None => Some((label, id)),
                Some((cur_label, _)) => {
                    let newer_wins = label.len() > cur_label.len()
                        || (label.len() == cur_label.len()
                            && maps.insert_seq.get(label) < maps.insert_seq.get(cur_label));
                    if newer_wins {
                        Some((label, id))
                    } else {
                        best
                    }
                }
            };
        }
        best.map(|(_, id)| id.clone())
    }

    // ─── linkify ────────────────────────────────────────────────────────

    /// Replace whole-word occurrences of known labels with `[label](ID)`
    /// references, longest labels first. Already-present references are
    /// protected, so the operation is idempotent on its own output.
    ///
    /// Two passes are required: naive single-pass substitution nests
    /// replacements inside replacements once a short label appears within a
    /// longer one's link text.
    pub fn linkify(&self, text: &str) -> String {
        let maps = self.maps.read().expect("term cache lock poisoned");

        // Labels eligible for linking: recognized ID prefix only. All-digit
        // labels are excluded — they could collide with the numeric
        // placeholder indices used for span protection below.
        // Longest first; equal lengths by insertion order.
        let mut labels: Vec<(&String, &String)> = maps
            .lookup
            .iter()
            .filter(|(label, id)| {
                is_canonical_id(id) && !label.bytes().all(|b| b.is_ascii_digit())
            })
            .collect();
        labels.sort_by(|(a, _), (b, _)| {
            b.len()
                .cmp(&a.len())
                .then_with(|| maps.insert_seq.get(*a).cmp(&maps.insert_seq.get(*b)))
        });

        // Pass 1: protect existing [label](id) spans.
        let mut spans: Vec<String> = Vec::new();
        let mut working = protect_existing_spans(text, &mut spans);

        // Pass 2: longest-first whole-word substitution; every new link is
        // immediately protected so shorter labels cannot match inside it.
        for (label, id) in labels {
            working = substitute_whole_word(&working, label, id, &mut spans);
        }

        // Pass 3: restore placeholders.
        restore_spans(&working, &spans)
    }

    // ─── ingest ─────────────────────────────────────────────────────────

    /// Add a label→id mapping. Idempotent; every Nth insertion triggers a
    /// snapshot save. Persistence failures are logged and non-fatal.
    pub fn ingest(&self, label: &str, id: &str) {
        let should_persist = {
            let mut maps = self.maps.write().expect("term cache lock poisoned");
            if !maps.insert(label, id) {
                return;
            }
            maps.inserts_since_persist += 1;
            if maps.inserts_since_persist >= PERSIST_EVERY_N_INSERTS {
                maps.inserts_since_persist = 0;
                true
            } else {
                false
            }
        };

        if should_persist {
            if let Err(e) = self.persist() {
                tracing::warn!(error = %e, "term cache snapshot write failed (continuing in-memory)");
            }
        }
    }

    /// Write the snapshot now. Serialized through `persist_lock` so only one
    /// writer touches the file at a time.
    pub fn persist(&self) -> Result<(), CacheError> {
        let Some(ref path) = self.snapshot_path else {
            return Ok(()); // in-memory cache, nothing to do
        };

        let snap = {
            let maps = self.maps.read().expect("term cache lock poisoned");
            Snapshot {
                lookup: maps.lookup.clone(),
                reverse_lookup: maps.reverse_lookup.clone(),
                normalized_lookup: maps.normalized_lookup.clone(),
                last_updated: Utc::now(),
            }
        };

        let _writer = self.persist_lock.lock().expect("persist lock poisoned");
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| CacheError::SnapshotWrite { reason: e.to_string() })?;
        }
        let json = serde_json::to_string(&snap)
            .map_err(|e| CacheError::SnapshotWrite { reason: e.to_string() })?;
        std::fs::write(path, json)
            .map_err(|e| CacheError::SnapshotWrite { reason: e.to_string() })?;
        tracing::debug!(path = %path.display(), entries = snap.lookup.len(), "term cache snapshot written");
        Ok(())
    }
}

impl Default for TermLookupCache {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Helpers ────────────────────────────────────────────────────────────────

/// Whether an ID carries one of the recognized canonical prefixes.
pub fn is_canonical_id(s: &str) -> bool {
    RECOGNIZED_ID_PREFIXES.iter().any(|p| {
        s.len() > p.len()
            && s.starts_with(p)
            && s[p.len()..].chars().all(|c| c.is_ascii_alphanumeric())
    })
}

/// Normalize a label for fuzzy lookup: case-fold, strip a life-stage
/// qualifier when the remainder is non-trivial, drop separators.
fn normalize(label: &str) -> String {
    let lower = label.trim().to_lowercase();

    let stripped = LIFE_STAGE_PREFIXES
        .iter()
        .find_map(|prefix| {
            let rest = lower.strip_prefix(prefix)?;
            let rest = rest.trim_start_matches([' ', '-', '_']);
            // Only strip when something meaningful remains.
            (rest != lower && rest.len() >= MIN_STRIPPED_REMAINDER).then(|| rest.to_string())
        })
        .unwrap_or(lower);

    stripped.chars().filter(|c| c.is_alphanumeric()).collect()
}

/// Replace existing `[text](target)` spans with placeholders.
fn protect_existing_spans(text: &str, spans: &mut Vec<String>) -> String {
    let bytes = text.as_bytes();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'[' {
            if let Some(close) = text[i..].find(']').map(|p| i + p) {
                if bytes.get(close + 1) == Some(&b'(') {
                    if let Some(paren) = text[close + 1..].find(')').map(|p| close + 1 + p) {
                        spans.push(text[i..=paren].to_string());
                        out.push(SPAN_OPEN);
                        out.push_str(&(spans.len() - 1).to_string());
                        out.push(SPAN_CLOSE);
                        i = paren + 1;
                        continue;
                    }
                }
            }
        }
        let ch = text[i..].chars().next().expect("in-bounds char");
        out.push(ch);
        i += ch.len_utf8();
    }
    out
}

/// Substitute whole-word occurrences of `label` with a protected reference
/// placeholder, preserving the matched text's original casing.
fn substitute_whole_word(text: &str, label: &str, id: &str, spans: &mut Vec<String>) -> String {
    let lower_text = text.to_lowercase();
    let lower_label = label.to_lowercase();
    if lower_label.is_empty() {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    while let Some(rel) = lower_text[cursor..].find(&lower_label) {
        let start = cursor + rel;
        let end = start + lower_label.len();

        // Mixed casing can shift byte offsets between `text` and its
        // lowercase form; bail out of this occurrence if alignment broke.
        if !text.is_char_boundary(start) || !text.is_char_boundary(end) {
            out.push_str(&text[cursor..]);
            return out;
        }

        let before_ok = text[..start].chars().next_back().map_or(true, |c| !c.is_alphanumeric());
        let after_ok = text[end..].chars().next().map_or(true, |c| !c.is_alphanumeric());

        out.push_str(&text[cursor..start]);
        if before_ok && after_ok {
            spans.push(format!("[{}]({})", &text[start..end], id));
            out.push(SPAN_OPEN);
            out.push_str(&(spans.len() - 1).to_string());
            out.push(SPAN_CLOSE);
        } else {
            out.push_str(&text[start..end]);
        }
        cursor = end;
    }
    out.push_str(&text[cursor..]);
    out
}

/// Restore placeholders to their span text.
fn restore_spans(text: &str, spans: &[String]) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c == SPAN_OPEN {
            let mut idx = String::new();
            for d in chars.by_ref() {
                if d == SPAN_CLOSE {
                    break;
                }
                idx.push(d);
            }
            if let Ok(n) = idx.parse::<usize>() {
                if let Some(span) = spans.get(n) {
                    out.push_str(span);
                }
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Built-in seed set: common Drosophila neuroanatomy terms.
///
/// Used when no snapshot exists; keeps first-turn pre-resolution useful on
/// a cold start.
fn builtin_seed() -> &'static [(&'static str, &'static str)] {
    &[
        ("mushroom body", "FBbt_00003682"),
        ("Kenyon cell", "FBbt_00003686"),
        ("antennal lobe", "FBbt_00007401"),
        ("central complex", "FBbt_00003632"),
        ("fan-shaped body", "FBbt_00003679"),
        ("ellipsoid body", "FBbt_00003678"),
        ("protocerebral bridge", "FBbt_00003668"),
        ("optic lobe", "FBbt_00003701"),
        ("medulla", "FBbt_00003748"),
        ("adult brain", "FBbt_00003624"),
    ]
}

// ─── Tests ───────────────────────────────────────────────────────────────────
