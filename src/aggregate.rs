//! To-read popularity counts.

use crate::models::{ToReadCounts, ToReadEvent};

/// Count to-read events per `book_id`.
///
/// Books without events are simply absent from the result; the merge step
/// fills them with zero.
pub fn count_to_read(events: &[ToReadEvent]) -> ToReadCounts {
    let mut counts = ToReadCounts::default();
    for event in events {
        *counts.entry(event.book_id).or_default() += 1;
    }
    counts
}
