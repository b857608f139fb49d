//! Query a merged books table: genre co-occurrence, rating spread, book finder,
//! related books and the rating-vs-popularity view.
//!
//! Usage: explore-books <merged_books.csv> <COMMAND> [--json]

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;

use goodbooks_merge::explore::{
    find_books, genre_association, genre_options, genre_rating_boxes, rating_factors,
    related_books, top_books_for_tag, top_rated, BookFilter, ASSOCIATION_LIMIT,
    FINDER_CHART_LIMIT, RATING_FACTORS_LIMIT, TOP_BOOKS_LIMIT,
};
use goodbooks_merge::io::read_merged;
use goodbooks_merge::models::{BookId, MergedBook};

#[derive(Parser)]
#[command(name = "explore-books")]
#[command(about = "Explore a merged goodbooks table")]
struct Args {
    merged: PathBuf,

    /// Print results as JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List genres present in the table
    Genres,
    /// Genres that co-occur with GENRE, plus its top books
    Associate {
        genre: String,
        #[arg(long, default_value_t = ASSOCIATION_LIMIT)]
        limit: usize,
    },
    /// Rating five-number summary per genre
    Boxes,
    /// Filter books by rating, popularity and keyword
    Find {
        #[arg(long, default_value = "2.5")]
        min_rating: f64,
        #[arg(long, default_value = "10000")]
        min_count: i64,
        #[arg(long)]
        keyword: Option<String>,
        #[arg(long, default_value = "30")]
        limit: usize,
    },
    /// Books sharing a tag with BOOK_ID, with a rating trend line
    Related { book_id: i64 },
    /// Most rated books with their primary genre
    Factors {
        #[arg(long, default_value_t = RATING_FACTORS_LIMIT)]
        limit: usize,
    },
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_book(rank: usize, book: &MergedBook) {
    println!(
        "{:>3}. [{}] {} - {} ({:.2}, {} ratings, {} to-read)",
        rank, book.book_id, book.title, book.authors, book.average_rating, book.ratings_count, book.to_read_count
    );
}

fn main() -> Result<()> {
    let args = Args::parse();
    let rows = read_merged(&args.merged)?;
    eprintln!("Loaded {} merged books from {:?}", rows.len(), args.merged);

    match args.command {
        Command::Genres => {
            let genres = genre_options(&rows);
            if args.json {
                return print_json(&genres);
            }
            for genre in genres {
                println!("{}", genre);
            }
        }
        Command::Associate { genre, limit } => {
            let counts = genre_association(&rows, &genre, limit);
            let top = top_books_for_tag(&rows, &genre, TOP_BOOKS_LIMIT);
            if args.json {
                return print_json(&serde_json::json!({ "co_occurring": counts, "top_books": top }));
            }
            println!("Genres co-occurring with '{}':", genre);
            println!("{:-<60}", "");
            for c in &counts {
                println!("  {:<24} {}", c.genre, c.count);
            }
            println!("\nHighest rated:");
            for (i, book) in top.highest_rated.iter().enumerate() {
                print_book(i + 1, book);
            }
            println!("\nMost added to to-read:");
            for (i, book) in top.most_to_read.iter().enumerate() {
                print_book(i + 1, book);
            }
        }
        Command::Boxes => {
            let boxes = genre_rating_boxes(&rows);
            if args.json {
                return print_json(&boxes);
            }
            println!(
                "{:<20} {:>6} {:>6} {:>6} {:>6} {:>6} {:>6}",
                "genre", "books", "min", "q1", "median", "q3", "max"
            );
            for b in boxes {
                println!(
                    "{:<20} {:>6} {:>6.2} {:>6.2} {:>6.2} {:>6.2} {:>6.2}",
                    b.genre, b.books, b.min, b.q1, b.median, b.q3, b.max
                );
            }
        }
        Command::Find {
            min_rating,
            min_count,
            keyword,
            limit,
        } => {
            let filter = BookFilter {
                min_rating,
                min_ratings_count: min_count,
                keyword,
                limit,
            };
            let found = find_books(&rows, &filter)?;
            let best = top_rated(&found, FINDER_CHART_LIMIT);
            if args.json {
                return print_json(&serde_json::json!({ "matches": found, "top_rated": best }));
            }
            if found.is_empty() {
                println!("No books match.");
                return Ok(());
            }
            for (i, book) in found.iter().enumerate() {
                print_book(i + 1, book);
            }
            println!("\nTop {} by rating:", best.len());
            for (i, book) in best.iter().enumerate() {
                print_book(i + 1, book);
            }
        }
        Command::Related { book_id } => {
            let related = related_books(&rows, BookId(book_id))
                .with_context(|| format!("No book with book_id {}", book_id))?;
            if args.json {
                return print_json(&related);
            }
            println!("\"{}\" by {}", related.book.title, related.book.authors);
            println!("{} related books", related.neighbors.len());
            match related.trend {
                Some(line) => println!(
                    "Trend: rating {:.3} at {:.0} ratings -> {:.3} at {:.0} ratings (slope {:.3e})",
                    line.at(line.x_start),
                    line.x_start,
                    line.at(line.x_end),
                    line.x_end,
                    line.slope
                ),
                None => println!("Trend: not enough related books"),
            }
        }
        Command::Factors { limit } => {
            let factors = rating_factors(&rows, limit);
            if args.json {
                return print_json(&factors);
            }
            if let Some(p98) = factors.ratings_count_p98 {
                println!("98th percentile ratings count: {:.0}", p98);
            }
            println!("Max to-read: {}", factors.max_to_read);
            for (i, point) in factors.points.iter().enumerate() {
                println!(
                    "{:>3}. {} [{}] {:.2} / {} ratings / {} to-read",
                    i + 1,
                    point.book.title,
                    point.primary_genre,
                    point.book.average_rating,
                    point.book.ratings_count,
                    point.book.to_read_count
                );
            }
        }
    }

    Ok(())
}
