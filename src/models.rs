//! Core data models for the book merge pipeline.
//!
//! This module contains the row types for the four input tables, the
//! intermediate and final merged rows, the derived lookup tables and the
//! run statistics shared by the binaries.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Identifiers
// ============================================================================

/// Catalog identifier (`book_id`). To-read events join on this key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BookId(pub i64);

/// Goodreads identifier (`goodreads_book_id`). Tag assignments join on this key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GoodreadsId(pub i64);

/// Tag dictionary identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagId(pub i64);

impl fmt::Display for BookId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for GoodreadsId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for TagId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Type Aliases
// ============================================================================

/// Number of to-read events per catalog book
pub type ToReadCounts = FxHashMap<BookId, u64>;

/// Ranked tag names per Goodreads book, best first
pub type TopTags = FxHashMap<GoodreadsId, Vec<String>>;

// ============================================================================
// Input Rows
// ============================================================================

/// Catalog row from books.csv (extra columns are ignored on load)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Book {
    pub book_id: BookId,
    pub goodreads_book_id: GoodreadsId,
    pub title: String,
    pub authors: String,
    pub average_rating: f64,
    pub ratings_count: i64,
}

/// One "to-read" signal from to_read.csv
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub struct ToReadEvent {
    pub book_id: BookId,
}

/// Book-to-tag assignment from book_tags.csv.
/// `count` is the assignment weight; sources without that column load as `None`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub struct TagAssignment {
    pub goodreads_book_id: GoodreadsId,
    pub tag_id: TagId,
    #[serde(default)]
    pub count: Option<i64>,
}

/// Tag dictionary row from tags.csv
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Tag {
    pub tag_id: TagId,
    pub tag_name: String,
}

// ============================================================================
// Output Rows
// ============================================================================

/// Catalog row after the left joins, before defaults are applied.
/// `None` marks a book with no match on that side of the join.
#[derive(Clone, Debug, PartialEq)]
pub struct MergedRow {
    pub book: Book,
    pub to_read_count: Option<u64>,
    pub tags: Option<Vec<String>>,
}

/// Final output row. Field order is the output column order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MergedBook {
    pub book_id: BookId,
    pub goodreads_book_id: GoodreadsId,
    pub title: String,
    pub authors: String,
    pub average_rating: f64,
    pub ratings_count: i64,
    pub to_read_count: u64,
    pub tag_list: String,
}

impl MergedBook {
    /// Tag names from `tag_list`, trimmed, empty entries skipped
    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.tag_list
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags().any(|t| t == tag)
    }
}

// ============================================================================
// Statistics (Instrumentation)
// ============================================================================

/// Per-phase counts for one merge run.
#[derive(Default, Debug, Clone, PartialEq, Serialize)]
pub struct RunStats {
    // Inputs
    pub books: usize,
    pub to_read_events: usize,
    pub tag_assignments: usize,
    pub tags: usize,

    // Phase 2: aggregation and ranking
    pub books_with_to_read: usize,
    pub dangling_tag_assignments: usize,
    pub goodreads_books_with_tags: usize,

    // Phase 3: merge
    pub merged_with_to_read: usize,
    pub merged_with_tags: usize,

    // Final totals
    pub output_rows: usize,

    // Timing
    pub elapsed_seconds: f64,
}

impl RunStats {
    /// Share of catalog rows that received a tag list, as a percentage
    pub fn tag_coverage(&self) -> f64 {
        if self.output_rows == 0 {
            0.0
        } else {
            100.0 * self.merged_with_tags as f64 / self.output_rows as f64
        }
    }

    /// Log stats to stderr in JSON format
    pub fn log_phase(&self, phase: &str) {
        if let Ok(json) = serde_json::to_string_pretty(self) {
            eprintln!("[STATS:{}]\n{}", phase, json);
        }
    }

    /// Write stats to a JSON file
    pub fn write_to_file(&self, path: &std::path::Path) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}
