//! Domain types shared by the lexical and vector engines.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::Error;
use crate::traits::Entry;

/// The three record collections. Every entry belongs to exactly one.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    Paper,
    Book,
    Media,
}

impl EntryType {
    pub const ALL: [EntryType; 3] = [EntryType::Paper, EntryType::Book, EntryType::Media];

    pub fn as_str(self) -> &'static str {
        match self {
            EntryType::Paper => "paper",
            EntryType::Book => "book",
            EntryType::Media => "media",
        }
    }

    /// Plural name used for collection directories and log lines.
    pub fn collection_name(self) -> &'static str {
        match self {
            EntryType::Paper => "papers",
            EntryType::Book => "books",
            EntryType::Media => "media",
        }
    }
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntryType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "paper" | "papers" => Ok(EntryType::Paper),
            "book" | "books" => Ok(EntryType::Book),
            "media" => Ok(EntryType::Media),
            other => Err(Error::InvalidConfig(format!(
                "unknown entry type '{other}', expected one of: paper, book, media"
            ))),
        }
    }
}

/// A plain record with content fields and quotes.
///
/// Stands in for the full bibliographic models, which live outside this
/// workspace; only the fields that feed search are kept.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Record {
    pub id: String,
    pub entry_type: EntryType,
    #[serde(default)]
    pub fields: Vec<String>,
    #[serde(default)]
    pub quotes: Vec<String>,
}

impl Record {
    pub fn new(id: impl Into<String>, entry_type: EntryType) -> Self {
        Self { id: id.into(), entry_type, fields: Vec::new(), quotes: Vec::new() }
    }

    pub fn with_field(mut self, text: impl Into<String>) -> Self {
        self.fields.push(text.into());
        self
    }

    pub fn with_quote(mut self, text: impl Into<String>) -> Self {
        self.quotes.push(text.into());
        self
    }
}

impl Entry for Record {
    fn id(&self) -> &str {
        &self.id
    }

    fn entry_type(&self) -> EntryType {
        self.entry_type
    }

    fn searchable_text(&self) -> String {
        self.fields
            .iter()
            .chain(self.quotes.iter())
            .map(|s| s.as_str())
            .filter(|s| !s.trim().is_empty())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// A word window cut from one entry's searchable text.
///
/// - `chunk_index`: 0-based position within the entry, contiguous per entry
/// - `page_start`/`page_end`: from inline `[PAGE:N]` markers
/// - `section`: first `## Header` seen inside the window
/// - `line_start`/`line_end`: 1-based lines in the source text
/// - `embedding`: only set while an index is being built, never persisted
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    pub entry_id: String,
    pub entry_type: EntryType,
    pub chunk_index: usize,
    pub text: String,
    #[serde(default)]
    pub page_start: Option<u32>,
    #[serde(default)]
    pub page_end: Option<u32>,
    #[serde(default)]
    pub section: Option<String>,
    #[serde(default = "first_line")]
    pub line_start: usize,
    #[serde(default = "first_line")]
    pub line_end: usize,
    #[serde(skip)]
    pub embedding: Option<Vec<f32>>,
}

fn first_line() -> usize {
    1
}

/// A contiguous run of source lines shown to justify a match.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Fragment {
    pub line_start: usize,
    pub line_end: usize,
    pub lines: Vec<String>,
    pub matched_line_numbers: Vec<usize>,
}

/// Unit handed to the lexical ranker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LexicalDocument {
    pub id: String,
    pub content: String,
}

/// One hit returned by the lexical ranker. Higher score is better.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedDocument {
    pub id: String,
    pub content: String,
    pub score: f32,
}

/// Result surface shared by keyword and semantic search.
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub entry_id: String,
    pub score: f32,
    pub matched_content: String,
    pub entry_type: EntryType,
    pub entry: Option<Arc<dyn Entry>>,
    pub fragments: Vec<Fragment>,
}

/// Options shared by every search entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchOptions {
    pub top_k: usize,
    pub want_fragments: bool,
    pub context_lines: usize,
    pub max_fragments: usize,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            top_k: 10,
            want_fragments: false,
            context_lines: 3,
            max_fragments: crate::fragments::DEFAULT_MAX_FRAGMENTS,
        }
    }
}

impl SearchOptions {
    pub fn top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_fragments(mut self, context_lines: usize) -> Self {
        self.want_fragments = true;
        self.context_lines = context_lines;
        self
    }
}

/// Sorts results by descending score. The sort is stable so equal scores
/// keep their incoming order.
pub fn sort_by_score(results: &mut [SearchResult]) {
    results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
}
