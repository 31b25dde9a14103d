//! Word-window chunking with page, section and line provenance.

use std::collections::HashMap;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::{Chunk, EntryType};

pub const DEFAULT_CHUNK_SIZE: usize = 300;
pub const DEFAULT_OVERLAP: usize = 50;
pub const MIN_CHUNK_SIZE: usize = 100;

/// Window parameters, in words.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub overlap: usize,
    pub min_chunk_size: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self { chunk_size: DEFAULT_CHUNK_SIZE, overlap: DEFAULT_OVERLAP, min_chunk_size: MIN_CHUNK_SIZE }
    }
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::InvalidConfig("chunk_size must be greater than zero".into()));
        }
        if self.overlap >= self.chunk_size {
            return Err(Error::InvalidConfig(format!(
                "chunk overlap ({}) must be smaller than chunk_size ({})",
                self.overlap, self.chunk_size
            )));
        }
        Ok(())
    }

    fn step(&self) -> usize {
        self.chunk_size - self.overlap
    }
}

struct Word<'a> {
    text: &'a str,
    line: usize,
    page: Option<u32>,
    section: Option<&'a str>,
}

/// Splits searchable text into overlapping word windows.
#[derive(Debug, Clone)]
pub struct Chunker {
    config: ChunkingConfig,
    page_marker: Regex,
    section_header: Regex,
}

impl Chunker {
    pub fn new(chunk_size: usize, overlap: usize, min_chunk_size: usize) -> Result<Self> {
        Self::from_config(ChunkingConfig { chunk_size, overlap, min_chunk_size })
    }

    pub fn from_config(config: ChunkingConfig) -> Result<Self> {
        config.validate()?;
        let page_marker = Regex::new(r"\[PAGE:(\d+)\]").map_err(|e| Error::InvalidConfig(e.to_string()))?;
        let section_header = Regex::new(r"^##\s+(.+)$").map_err(|e| Error::InvalidConfig(e.to_string()))?;
        Ok(Self { config, page_marker, section_header })
    }

    pub fn config(&self) -> ChunkingConfig {
        self.config
    }

    /// Chunks `text` into windows numbered from 0 in document order.
    ///
    /// Words left over after the last full window (fewer than
    /// `min_chunk_size`) are appended to the final chunk so every word of
    /// the input lands in at least one chunk.
    pub fn chunk_text(&self, text: &str, entry_id: &str, entry_type: EntryType) -> Vec<Chunk> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let lines = self.annotate(text);
        let words: Vec<Word<'_>> = lines
            .iter()
            .flat_map(|l| {
                l.text.split_whitespace().map(move |w| Word {
                    text: w,
                    line: l.number,
                    page: l.page,
                    section: l.section.as_deref(),
                })
            })
            .collect();
        if words.is_empty() {
            return Vec::new();
        }

        let mut chunks = Vec::new();
        let mut covered_to = 0;
        let mut start = 0;
        while start < words.len() {
            let end = start.saturating_add(self.config.chunk_size).min(words.len());
            if end - start < self.config.min_chunk_size && !chunks.is_empty() {
                if let Some(last) = chunks.last_mut().filter(|_| covered_to < words.len()) {
                    extend_chunk(last, &words[covered_to..]);
                    tracing::trace!(entry_id, merged = words.len() - covered_to, "merged tail words into last chunk");
                }
                break;
            }
            chunks.push(build_chunk(&words[start..end], entry_id, entry_type, chunks.len()));
            covered_to = end;
            start += self.config.step();
        }

        tracing::debug!(
            entry_id,
            chunks = chunks.len(),
            avg_words = words.len() / chunks.len().max(1),
            "chunked entry"
        );
        chunks
    }

    fn annotate(&self, text: &str) -> Vec<Line> {
        let mut page = None;
        let mut section: Option<String> = None;
        text.lines()
            .enumerate()
            .map(|(idx, raw)| {
                let mut line = raw.to_string();
                if let Some(caps) = self.page_marker.captures(raw) {
                    page = caps.get(1).and_then(|m| m.as_str().parse::<u32>().ok()).or(page);
                    line = self.page_marker.replace_all(raw, "").trim().to_string();
                }
                if let Some(caps) = self.section_header.captures(&line) {
                    section = caps.get(1).map(|m| m.as_str().trim().to_string());
                }
                Line { number: idx + 1, text: line, page, section: section.clone() }
            })
            .collect()
    }
}

struct Line {
    number: usize,
    text: String,
    page: Option<u32>,
    section: Option<String>,
}

fn build_chunk(words: &[Word<'_>], entry_id: &str, entry_type: EntryType, chunk_index: usize) -> Chunk {
    let mut chunk = Chunk {
        entry_id: entry_id.to_string(),
        entry_type,
        chunk_index,
        text: String::new(),
        page_start: None,
        page_end: None,
        section: None,
        line_start: words.first().map_or(1, |w| w.line),
        line_end: words.first().map_or(1, |w| w.line),
        embedding: None,
    };
    extend_chunk(&mut chunk, words);
    chunk
}

fn extend_chunk(chunk: &mut Chunk, words: &[Word<'_>]) {
    for w in words {
        if !chunk.text.is_empty() {
            chunk.text.push(' ');
        }
        chunk.text.push_str(w.text);
        if let Some(p) = w.page {
            chunk.page_start = Some(chunk.page_start.map_or(p, |s| s.min(p)));
            chunk.page_end = Some(chunk.page_end.map_or(p, |e| e.max(p)));
        }
        if chunk.section.is_none() {
            chunk.section = w.section.map(str::to_string);
        }
        chunk.line_start = chunk.line_start.min(w.line);
        chunk.line_end = chunk.line_end.max(w.line);
    }
}

/// Splits chunks whose text exceeds an embedding model's character budget.
#[derive(Debug, Clone, Copy)]
pub struct CharacterLimitChunker {
    max_chars: usize,
}

impl CharacterLimitChunker {
    pub fn new(max_chars: usize) -> Result<Self> {
        if max_chars == 0 {
            return Err(Error::InvalidConfig("max_chars must be greater than zero".into()));
        }
        Ok(Self { max_chars })
    }

    /// Budget for a model with `max_input_tokens` at `chars_per_token`.
    pub fn for_token_budget(max_input_tokens: usize, chars_per_token: f64) -> Result<Self> {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
        let max_chars = (max_input_tokens as f64 * chars_per_token) as usize;
        Self::new(max_chars)
    }

    pub fn max_chars(&self) -> usize {
        self.max_chars
    }

    /// Oversized chunks become consecutive pieces of at most `max_chars`
    /// characters carrying the parent's provenance. `chunk_index` is
    /// renumbered per entry across the whole list.
    pub fn process_chunks(&self, chunks: Vec<Chunk>) -> Vec<Chunk> {
        let mut next_index: HashMap<String, usize> = HashMap::new();
        let mut out = Vec::with_capacity(chunks.len());
        let mut split = 0usize;

        for chunk in chunks {
            let pieces = if chunk.text.chars().count() > self.max_chars {
                split += 1;
                self.split_text(&chunk.text)
            } else {
                vec![chunk.text.clone()]
            };
            for text in pieces {
                let idx = next_index.entry(chunk.entry_id.clone()).or_insert(0);
                out.push(Chunk { chunk_index: *idx, text, embedding: None, ..chunk.clone() });
                *idx += 1;
            }
        }

        if split > 0 {
            tracing::debug!(split, total = out.len(), max_chars = self.max_chars, "split oversized chunks");
        }
        out
    }

    fn split_text(&self, text: &str) -> Vec<String> {
        let chars: Vec<char> = text.chars().collect();
        chars
            .chunks(self.max_chars)
            .map(|c| c.iter().collect::<String>())
            .filter(|s| !s.trim().is_empty())
            .collect()
    }
}
