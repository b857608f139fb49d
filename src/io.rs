//! Loading the four source tables and writing the merged table.
//!
//! The pipeline only sees the `Loader` and `Writer` traits. `CsvLoader`
//! reads the goodbooks CSV layout from a data directory; `CsvWriter` and
//! `SqliteWriter` persist the final rows.

use anyhow::{Context, Result};
use clap::ValueEnum;
use rusqlite::{params, Connection};
use serde::de::DeserializeOwned;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::models::{Book, MergedBook, Tag, TagAssignment, ToReadEvent};
use crate::progress::Phase;

const WRITE_BATCH_SIZE: usize = 10_000;

/// Logical input table
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Source {
    Books,
    ToRead,
    BookTags,
    Tags,
}

impl Source {
    pub const ALL: [Source; 4] = [Source::Books, Source::ToRead, Source::BookTags, Source::Tags];

    pub fn name(self) -> &'static str {
        match self {
            Source::Books => "books",
            Source::ToRead => "to_read",
            Source::BookTags => "book_tags",
            Source::Tags => "tags",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Boundary capability that produces parsed rows for each source.
pub trait Loader {
    fn books(&self) -> Result<Vec<Book>>;
    fn to_read(&self) -> Result<Vec<ToReadEvent>>;
    fn book_tags(&self) -> Result<Vec<TagAssignment>>;
    fn tags(&self) -> Result<Vec<Tag>>;
}

/// Boundary capability that persists the final rows.
pub trait Writer {
    fn write(&mut self, rows: &[MergedBook]) -> Result<()>;
}

// ============================================================================
// CSV Loader
// ============================================================================

/// File names of the four sources inside the data directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceFiles {
    pub books: String,
    pub to_read: String,
    pub book_tags: String,
    pub tags: String,
}

impl Default for SourceFiles {
    fn default() -> Self {
        Self {
            books: "books.csv".to_string(),
            to_read: "to_read.csv".to_string(),
            book_tags: "book_tags.csv".to_string(),
            tags: "tags.csv".to_string(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct CsvLoader {
    dir: PathBuf,
    files: SourceFiles,
}

impl CsvLoader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self::with_files(dir, SourceFiles::default())
    }

    pub fn with_files(dir: impl Into<PathBuf>, files: SourceFiles) -> Self {
        Self {
            dir: dir.into(),
            files,
        }
    }

    pub fn path(&self, source: Source) -> PathBuf {
        let file = match source {
            Source::Books => &self.files.books,
            Source::ToRead => &self.files.to_read,
            Source::BookTags => &self.files.book_tags,
            Source::Tags => &self.files.tags,
        };
        self.dir.join(file)
    }

    fn read_table<T: DeserializeOwned>(&self, source: Source) -> Result<Vec<T>> {
        let path = self.path(source);
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::Headers)
            .from_path(&path)
            .with_context(|| format!("Failed to open {} source at {}", source, path.display()))?;

        let phase = Phase::open(format!("Phase 1: Reading {}", source));
        let mut rows = Vec::new();
        for record in reader.deserialize() {
            let row: T = record.with_context(|| {
                format!("Malformed row in {} source ({})", source, path.display())
            })?;
            rows.push(row);
            phase.tick();
        }

        phase.finish(format!("read {} rows", rows.len()));
        Ok(rows)
    }
}

impl Loader for CsvLoader {
    fn books(&self) -> Result<Vec<Book>> {
        self.read_table(Source::Books)
    }

    fn to_read(&self) -> Result<Vec<ToReadEvent>> {
        self.read_table(Source::ToRead)
    }

    fn book_tags(&self) -> Result<Vec<TagAssignment>> {
        self.read_table(Source::BookTags)
    }

    fn tags(&self) -> Result<Vec<Tag>> {
        self.read_table(Source::Tags)
    }
}

/// Read a previously written merged CSV (used by the explore tool).
pub fn read_merged(path: &Path) -> Result<Vec<MergedBook>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open merged books at {}", path.display()))?;
    let mut rows = Vec::new();
    for record in reader.deserialize() {
        let row: MergedBook =
            record.with_context(|| format!("Malformed row in {}", path.display()))?;
        rows.push(row);
    }
    Ok(rows)
}

// ============================================================================
// Writers
// ============================================================================

/// Output encoding for the merged table
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Csv,
    Sqlite,
}

impl OutputFormat {
    /// `.sqlite3`, `.sqlite` and `.db` outputs are SQLite, everything else CSV.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("sqlite3" | "sqlite" | "db") => OutputFormat::Sqlite,
            _ => OutputFormat::Csv,
        }
    }

    pub fn writer(self, path: PathBuf) -> Box<dyn Writer> {
        match self {
            OutputFormat::Csv => Box::new(CsvWriter::new(path)),
            OutputFormat::Sqlite => Box::new(SqliteWriter::new(path)),
        }
    }
}

/// Serialize rows as CSV with a header row, in output column order.
pub fn write_csv<W: std::io::Write>(out: W, rows: &[MergedBook]) -> Result<()> {
    let mut writer = csv::Writer::from_writer(out);
    for row in rows {
        writer.serialize(row)?;
    }
    // An empty table still gets its header
    if rows.is_empty() {
        writer.write_record(crate::finalize::OUTPUT_COLUMNS)?;
    }
    writer.flush()?;
    Ok(())
}

pub struct CsvWriter {
    path: PathBuf,
}

impl CsvWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Writer for CsvWriter {
    fn write(&mut self, rows: &[MergedBook]) -> Result<()> {
        let phase = Phase::open("Phase 4: Writing CSV");
        let file = std::fs::File::create(&self.path)
            .with_context(|| format!("Failed to create output file {}", self.path.display()))?;
        write_csv(std::io::BufWriter::new(file), rows)
            .with_context(|| format!("Failed to write {}", self.path.display()))?;
        phase.finish(format!("wrote {} rows", rows.len()));
        Ok(())
    }
}

pub struct SqliteWriter {
    path: PathBuf,
}

impl SqliteWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Writer for SqliteWriter {
    fn write(&mut self, rows: &[MergedBook]) -> Result<()> {
        let mut conn = Connection::open(&self.path)
            .with_context(|| format!("Failed to create output database {}", self.path.display()))?;
        write_sqlite(&mut conn, rows)
            .with_context(|| format!("Failed to write {}", self.path.display()))
    }
}

fn write_sqlite(conn: &mut Connection, rows: &[MergedBook]) -> Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA temp_store = MEMORY;

        CREATE TABLE merged_books (
            book_id INTEGER PRIMARY KEY,
            goodreads_book_id INTEGER NOT NULL,
            title TEXT NOT NULL,
            authors TEXT NOT NULL,
            average_rating REAL NOT NULL,
            ratings_count INTEGER NOT NULL,
            to_read_count INTEGER NOT NULL,
            tag_list TEXT NOT NULL
        );

        CREATE INDEX idx_merged_books_goodreads ON merged_books(goodreads_book_id);",
    )?;

    let phase = Phase::rows("Phase 4: Writing SQLite", rows.len() as u64, WRITE_BATCH_SIZE as u64);

    for chunk in rows.chunks(WRITE_BATCH_SIZE) {
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO merged_books (book_id, goodreads_book_id, title, authors,
                     average_rating, ratings_count, to_read_count, tag_list)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )?;

            for row in chunk {
                stmt.execute(params![
                    row.book_id.0,
                    row.goodreads_book_id.0,
                    row.title,
                    row.authors,
                    row.average_rating,
                    row.ratings_count,
                    i64::try_from(row.to_read_count)?,
                    row.tag_list,
                ])?;
                phase.tick();
            }
        }
        tx.commit()?;
    }

    phase.finish(format!("wrote {} rows", rows.len()));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BookId, GoodreadsId, TagId};

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "goodbooks-merge-io-{}-{}",
            name,
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn merged(id: i64, tag_list: &str) -> MergedBook {
        MergedBook {
            book_id: BookId(id),
            goodreads_book_id: GoodreadsId(id * 10),
            title: format!("Title, with comma {}", id),
            authors: "A. Author".to_string(),
            average_rating: 4.25,
            ratings_count: 1200,
            to_read_count: 3,
            tag_list: tag_list.to_string(),
        }
    }

    #[test]
    fn test_load_books_ignores_extra_columns() {
        let dir = scratch_dir("books");
        std::fs::write(
            dir.join("books.csv"),
            "id,book_id,best_book_id,goodreads_book_id,isbn,authors,title,average_rating,ratings_count\n\
             1,1,2767052,2767052,439023483,Suzanne Collins,\"The Hunger Games (The Hunger Games, #1)\",4.34,4780653\n",
        )
        .unwrap();

        let books = CsvLoader::new(&dir).books().unwrap();
        assert_eq!(books.len(), 1);
        assert_eq!(books[0].book_id, BookId(1));
        assert_eq!(books[0].goodreads_book_id, GoodreadsId(2767052));
        assert_eq!(books[0].title, "The Hunger Games (The Hunger Games, #1)");
        assert_eq!(books[0].average_rating, 4.34);
        assert_eq!(books[0].ratings_count, 4780653);
    }

    #[test]
    fn test_load_tag_assignments_with_and_without_count() {
        let dir = scratch_dir("book_tags");
        std::fs::write(
            dir.join("book_tags.csv"),
            "goodreads_book_id,tag_id,count\n1,30574,167697\n1,11305,37174\n",
        )
        .unwrap();
        let rows = CsvLoader::new(&dir).book_tags().unwrap();
        assert_eq!(rows[0].tag_id, TagId(30574));
        assert_eq!(rows[0].count, Some(167697));

        let files = SourceFiles {
            book_tags: "bare_tags.csv".to_string(),
            ..Default::default()
        };
        std::fs::write(dir.join("bare_tags.csv"), "goodreads_book_id,tag_id\n1,5\n").unwrap();
        let rows = CsvLoader::with_files(&dir, files).book_tags().unwrap();
        assert_eq!(rows[0].count, None);
    }

    #[test]
    fn test_load_to_read_and_tags() {
        let dir = scratch_dir("to_read");
        std::fs::write(dir.join("to_read.csv"), "user_id,book_id\n9,8\n1,8\n").unwrap();
        std::fs::write(dir.join("tags.csv"), "tag_id,tag_name\n0,-\n1,--1-\n").unwrap();
        let loader = CsvLoader::new(&dir);
        assert_eq!(loader.to_read().unwrap().len(), 2);
        let tags = loader.tags().unwrap();
        assert_eq!(tags[1].tag_name, "--1-");
    }

    #[test]
    fn test_missing_source_names_source() {
        let dir = scratch_dir("missing");
        let err = CsvLoader::new(&dir).tags().unwrap_err();
        let msg = format!("{:#}", err);
        assert!(msg.contains("Failed to open tags source"));
        assert!(msg.contains("tags.csv"));
    }

    #[test]
    fn test_malformed_row_is_fatal() {
        let dir = scratch_dir("malformed");
        std::fs::write(dir.join("to_read.csv"), "user_id,book_id\n1,2\n1,not-a-number\n").unwrap();
        let err = CsvLoader::new(&dir).to_read().unwrap_err();
        assert!(err.to_string().contains("Malformed row in to_read source"));
    }

    #[test]
    fn test_short_row_is_fatal() {
        let dir = scratch_dir("short_row");
        std::fs::write(
            dir.join("books.csv"),
            "book_id,goodreads_book_id,title,authors,average_rating,ratings_count\n\
             1,100,A,Someone,4.1,10\n\
             2,200,B\n",
        )
        .unwrap();
        let err = CsvLoader::new(&dir).books().unwrap_err();
        assert!(err.to_string().contains("Malformed row in books source"));
        assert!(format!("{:#}", err).contains("line: 3"));
    }

    #[test]
    fn test_write_csv_header_and_quoting() {
        let mut out = Vec::new();
        write_csv(&mut out, &[merged(1, "fantasy, magic")]).unwrap();
        let text = String::from_utf8(out).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next().unwrap(),
            "book_id,goodreads_book_id,title,authors,average_rating,ratings_count,to_read_count,tag_list"
        );
        assert_eq!(
            lines.next().unwrap(),
            "1,10,\"Title, with comma 1\",A. Author,4.25,1200,3,\"fantasy, magic\""
        );
    }

    #[test]
    fn test_write_csv_empty_table_has_header() {
        let mut out = Vec::new();
        write_csv(&mut out, &[]).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("book_id,goodreads_book_id,"));
    }

    #[test]
    fn test_csv_writer_round_trips_through_read_merged() {
        let dir = scratch_dir("csv_writer");
        let path = dir.join("merged_books.csv");
        let rows = vec![merged(1, "a, b"), merged(2, "")];
        CsvWriter::new(&path).write(&rows).unwrap();
        assert_eq!(read_merged(&path).unwrap(), rows);
    }

    #[test]
    fn test_sqlite_writer() {
        let dir = scratch_dir("sqlite_writer");
        let path = dir.join("merged_books.sqlite3");
        SqliteWriter::new(&path)
            .write(&[merged(1, "x"), merged(2, "")])
            .unwrap();

        let conn = Connection::open(&path).unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM merged_books", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 2);
        let tag_list: String = conn
            .query_row(
                "SELECT tag_list FROM merged_books WHERE goodreads_book_id = 10",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(tag_list, "x");
    }

    #[test]
    fn test_output_format_from_path() {
        assert_eq!(OutputFormat::from_path(Path::new("a/merged.sqlite3")), OutputFormat::Sqlite);
        assert_eq!(OutputFormat::from_path(Path::new("merged.db")), OutputFormat::Sqlite);
        assert_eq!(OutputFormat::from_path(Path::new("merged_books.csv")), OutputFormat::Csv);
        assert_eq!(OutputFormat::from_path(Path::new("merged")), OutputFormat::Csv);
    }
}
