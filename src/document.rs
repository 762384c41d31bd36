//! Document store seam and passage recovery from stored content.
//!
//! Uploaded documents are persisted elsewhere as `{ id, title, content }`
//! rows. `content` is usually the JSON written by [`InMemoryDocumentStore::insert_extraction`]
//! (`{ "passages": [...] }`), but older rows hold raw text, so recovery
//! degrades step by step instead of failing.

use crate::error::ForgeError;
use crate::output::ExtractionResult;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{PoisonError, RwLock};
use tracing::{debug, warn};

/// Blank-line chunks at or under this many characters are headings or noise.
pub const MIN_CHUNK_CHARS: usize = 40;

static BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n\s*\n").unwrap());

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRow {
    pub id: i64,
    pub title: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentContext {
    pub id: i64,
    pub title: String,
    pub passages: Vec<String>,
}

/// Read access to stored documents.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get_document(&self, id: i64) -> Result<Option<DocumentRow>, ForgeError>;
}

/// Load a document and recover its passages.
pub async fn get_document_context(
    store: &dyn DocumentStore,
    id: i64,
) -> Result<DocumentContext, ForgeError> {
    let row = store
        .get_document(id)
        .await?
        .ok_or(ForgeError::DocumentNotFound { id })?;
    Ok(context_from_row(row))
}

pub fn context_from_row(row: DocumentRow) -> DocumentContext {
    let passages = passages_from_content(&row.content);
    debug!("document {}: {} passages", row.id, passages.len());
    DocumentContext {
        id: row.id,
        title: row.title,
        passages,
    }
}

/// JSON `passages` first, then blank-line chunks over 40 characters, then
/// the whole trimmed content as a single passage.
pub fn passages_from_content(content: &str) -> Vec<String> {
    if let Some(from_json) = json_passages(content) {
        return from_json;
    }

    let chunks: Vec<String> = BLANK_LINES
        .split(content)
        .map(str::trim)
        .filter(|c| c.chars().count() > MIN_CHUNK_CHARS)
        .map(str::to_string)
        .collect();
    if !chunks.is_empty() {
        return chunks;
    }

    let whole = content.trim();
    if whole.is_empty() {
        Vec::new()
    } else {
        vec![whole.to_string()]
    }
}

fn json_passages(content: &str) -> Option<Vec<String>> {
    let value: Value = serde_json::from_str(content).ok()?;
    let items = value.get("passages")?.as_array()?;
    let passages: Vec<String> = items
        .iter()
        .filter_map(|item| match item {
            Value::String(s) => Some(s.as_str()),
            Value::Object(map) => map
                .get("passage")
                .or_else(|| map.get("text"))
                .and_then(Value::as_str),
            _ => None,
        })
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    (!passages.is_empty()).then_some(passages)
}

/// Process-local store for tests, the CLI and small deployments.
#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
    rows: RwLock<HashMap<i64, DocumentRow>>,
    next_id: AtomicI64,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a row and return its id.
    pub fn insert(&self, title: impl Into<String>, content: impl Into<String>) -> i64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let row = DocumentRow {
            id,
            title: title.into(),
            content: content.into(),
        };
        let mut rows = self.rows.write().unwrap_or_else(|poisoned| {
            warn!("document store lock was poisoned; recovering");
            poisoned.into_inner()
        });
        rows.insert(id, row);
        id
    }

    /// Store an extraction in the `{ passages, sources }` JSON shape.
    pub fn insert_extraction(&self, result: &ExtractionResult) -> i64 {
        let content = json!({
            "passages": result.passage_texts(),
            "sources": result.sources,
        });
        self.insert(result.title.clone(), content.to_string())
    }

    pub fn len(&self) -> usize {
        self.rows.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn get_document(&self, id: i64) -> Result<Option<DocumentRow>, ForgeError> {
        let rows = self.rows.read().unwrap_or_else(PoisonError::into_inner);
        Ok(rows.get(&id).cloned())
    }
}
