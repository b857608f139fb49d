//! Left-preserving merge of the catalog with the derived tables.

use anyhow::{bail, Result};
use rustc_hash::FxHashSet;

use crate::models::{Book, BookId, MergedRow, ToReadCounts, TopTags};

/// Reject catalogs where a `book_id` occurs more than once.
///
/// A duplicate would make the to-read lookup ambiguous, so it fails the run
/// instead of silently attaching the same count to two rows.
pub fn ensure_unique_book_ids(books: &[Book]) -> Result<()> {
    let mut seen: FxHashSet<BookId> =
        FxHashSet::with_capacity_and_hasher(books.len(), Default::default());
    for book in books {
        if !seen.insert(book.book_id) {
            bail!(
                "Join cardinality violation: book_id {} appears more than once in books",
                book.book_id
            );
        }
    }
    Ok(())
}

/// Attach to-read counts (keyed by `book_id`) and ranked tags (keyed by
/// `goodreads_book_id`) to every catalog row.
///
/// Exactly one output row per input book, in catalog order. Books with no
/// match keep `None` on that side; defaults are applied by `finalize`.
pub fn merge_books(
    books: &[Book],
    to_read: &ToReadCounts,
    top_tags: &TopTags,
) -> Result<Vec<MergedRow>> {
    ensure_unique_book_ids(books)?;

    Ok(books
        .iter()
        .map(|book| MergedRow {
            to_read_count: to_read.get(&book.book_id).copied(),
            tags: top_tags.get(&book.goodreads_book_id).cloned(),
            book: book.clone(),
        })
        .collect())
}
