//! End-to-end merge: load, aggregate and rank in parallel, merge, finalize, write.

use anyhow::Result;
use std::time::Instant;

use crate::aggregate::count_to_read;
use crate::finalize::finalize;
use crate::io::{Loader, Writer};
use crate::merge::merge_books;
use crate::models::{Book, MergedBook, RunStats, Tag, TagAssignment, ToReadEvent};
use crate::progress::Phase;
use crate::tags::{rank_tags, RankOptions, TagWeighting, DEFAULT_TAG_LIMIT};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PipelineOptions {
    /// Tag names kept per book
    pub tag_limit: usize,
    pub weighting: TagWeighting,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            tag_limit: DEFAULT_TAG_LIMIT,
            weighting: TagWeighting::default(),
        }
    }
}

impl PipelineOptions {
    fn rank(self) -> RankOptions {
        RankOptions {
            limit: self.tag_limit,
            weighting: self.weighting,
        }
    }
}

/// The four source tables, fully loaded.
#[derive(Clone, Debug, Default)]
pub struct Tables {
    pub books: Vec<Book>,
    pub to_read: Vec<ToReadEvent>,
    pub book_tags: Vec<TagAssignment>,
    pub tags: Vec<Tag>,
}

impl Tables {
    pub fn load<L: Loader + ?Sized>(loader: &L) -> Result<Self> {
        Ok(Self {
            books: loader.books()?,
            to_read: loader.to_read()?,
            book_tags: loader.book_tags()?,
            tags: loader.tags()?,
        })
    }
}

/// Run the in-memory part of the pipeline.
///
/// To-read counting and tag ranking share nothing, so they run on the rayon
/// pool side by side; the merge starts once both are done.
pub fn build_merged(tables: &Tables, options: PipelineOptions) -> Result<(Vec<MergedBook>, RunStats)> {
    let mut stats = RunStats {
        books: tables.books.len(),
        to_read_events: tables.to_read.len(),
        tag_assignments: tables.book_tags.len(),
        tags: tables.tags.len(),
        ..Default::default()
    };

    let phase = Phase::open("Phase 2: Counting to-read and ranking tags");
    let (to_read, ranking) = rayon::join(
        || count_to_read(&tables.to_read),
        || rank_tags(&tables.book_tags, &tables.tags, options.rank()),
    );
    let ranking = ranking?;
    stats.books_with_to_read = to_read.len();
    stats.dangling_tag_assignments = ranking.dangling;
    stats.goodreads_books_with_tags = ranking.top.len();
    phase.finish(format!(
        "{} books with to-read events, {} with tags ({} dangling assignments)",
        stats.books_with_to_read, stats.goodreads_books_with_tags, stats.dangling_tag_assignments
    ));

    let phase = Phase::open("Phase 3: Merging");
    let merged = merge_books(&tables.books, &to_read, &ranking.top)?;
    stats.merged_with_to_read = merged.iter().filter(|r| r.to_read_count.is_some()).count();
    stats.merged_with_tags = merged.iter().filter(|r| r.tags.is_some()).count();

    let rows = finalize(merged);
    stats.output_rows = rows.len();
    phase.finish(format!("merged {} books", rows.len()));

    Ok((rows, stats))
}

/// Load every source, build the merged table and hand it to the writer.
pub fn run<L, W>(loader: &L, writer: &mut W, options: PipelineOptions) -> Result<RunStats>
where
    L: Loader + ?Sized,
    W: Writer + ?Sized,
{
    let start = Instant::now();

    let tables = Tables::load(loader)?;
    let (rows, mut stats) = build_merged(&tables, options)?;
    writer.write(&rows)?;

    stats.elapsed_seconds = start.elapsed().as_secs_f64();
    Ok(stats)
}
