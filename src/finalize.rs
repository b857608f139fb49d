//! Default filling and column order for the final merged table.

use crate::models::{MergedBook, MergedRow};
use crate::tags::format_tag_list;

/// Output column order. `MergedBook` declares its fields in this order, so
/// serializing it through serde produces the same header.
pub const OUTPUT_COLUMNS: [&str; 8] = [
    "book_id",
    "goodreads_book_id",
    "title",
    "authors",
    "average_rating",
    "ratings_count",
    "to_read_count",
    "tag_list",
];

/// Missing `to_read_count` becomes 0, missing tags become an empty `tag_list`.
pub fn finalize_row(row: MergedRow) -> MergedBook {
    let MergedRow {
        book,
        to_read_count,
        tags,
    } = row;

    MergedBook {
        book_id: book.book_id,
        goodreads_book_id: book.goodreads_book_id,
        title: book.title,
        authors: book.authors,
        average_rating: book.average_rating,
        ratings_count: book.ratings_count,
        to_read_count: to_read_count.unwrap_or(0),
        tag_list: tags.map(|t| format_tag_list(&t)).unwrap_or_default(),
    }
}

pub fn finalize(rows: Vec<MergedRow>) -> Vec<MergedBook> {
    rows.into_iter().map(finalize_row).collect()
}
