//! Exploratory queries over the merged table: genre co-occurrence, per-genre
//! rating spread, a filtered book finder, related books and the
//! rating-vs-popularity view.

use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::Serialize;
use std::collections::BTreeSet;
use unicode_normalization::UnicodeNormalization;

use crate::models::{BookId, MergedBook};

pub const ASSOCIATION_LIMIT: usize = 15;
pub const TOP_BOOKS_LIMIT: usize = 10;
pub const RATING_FACTORS_LIMIT: usize = 300;
pub const FINDER_CHART_LIMIT: usize = 10;

/// Tags treated as genres. Everything else in `tag_list` (shelf names such as
/// "to-read" or "owned") is ignored by the genre views.
pub static GENRE_WHITELIST: Lazy<FxHashSet<&'static str>> = Lazy::new(|| {
    [
        "fantasy",
        "science fiction",
        "romance",
        "mystery",
        "thriller",
        "historical fiction",
        "horror",
        "non-fiction",
        "young adult",
        "memoir",
        "biography",
        "children",
        "classic",
        "graphic novels",
        "poetry",
        "crime",
        "adventure",
        "philosophy",
        "middle grade",
        "new adult",
        "adult",
        "teen",
        "kids",
        "tween",
        "parenting",
    ]
    .into_iter()
    .collect()
});

pub fn is_genre(tag: &str) -> bool {
    GENRE_WHITELIST.contains(tag)
}

// ============================================================================
// Genre Association
// ============================================================================

/// Whitelisted genres that occur in at least one tag list, sorted.
pub fn genre_options(rows: &[MergedBook]) -> Vec<String> {
    rows.iter()
        .flat_map(MergedBook::tags)
        .filter(|t| is_genre(t))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(String::from)
        .collect()
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct GenreCount {
    pub genre: String,
    pub count: usize,
}

/// For books tagged `genre`, count how often each other genre appears
/// alongside it. Highest count first; equal counts keep first-seen order.
pub fn genre_association(rows: &[MergedBook], genre: &str, limit: usize) -> Vec<GenreCount> {
    let mut index: FxHashMap<&str, usize> = FxHashMap::default();
    let mut counts: Vec<GenreCount> = Vec::new();

    for row in rows.iter().filter(|r| r.has_tag(genre)) {
        for tag in row.tags().filter(|&t| t != genre && is_genre(t)) {
            match index.get(tag) {
                Some(&i) => counts[i].count += 1,
                None => {
                    index.insert(tag, counts.len());
                    counts.push(GenreCount {
                        genre: tag.to_string(),
                        count: 1,
                    });
                }
            }
        }
    }

    counts.sort_by(|a, b| b.count.cmp(&a.count));
    counts.truncate(limit);
    counts
}

#[derive(Debug, Serialize)]
pub struct TopBooks<'a> {
    pub highest_rated: Vec<&'a MergedBook>,
    pub most_to_read: Vec<&'a MergedBook>,
}

/// Highest rated and most wanted books carrying `tag`.
pub fn top_books_for_tag<'a>(rows: &'a [MergedBook], tag: &str, limit: usize) -> TopBooks<'a> {
    let tagged: Vec<&MergedBook> = rows.iter().filter(|r| r.has_tag(tag)).collect();

    let mut highest_rated = tagged.clone();
    highest_rated.sort_by(|a, b| b.average_rating.total_cmp(&a.average_rating));
    highest_rated.truncate(limit);

    let mut most_to_read = tagged;
    most_to_read.sort_by(|a, b| b.to_read_count.cmp(&a.to_read_count));
    most_to_read.truncate(limit);

    TopBooks {
        highest_rated,
        most_to_read,
    }
}

// ============================================================================
// Rating Distribution
// ============================================================================

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RatingBox {
    pub genre: String,
    pub books: usize,
    pub min: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub max: f64,
}

/// Quantile of an ascending slice with linear interpolation between ranks.
pub fn quantile(sorted: &[f64], p: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let pos = (sorted.len() - 1) as f64 * p.clamp(0.0, 1.0);
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64))
}

/// Five-number summary of `average_rating` per genre, in first-seen genre order.
pub fn genre_rating_boxes(rows: &[MergedBook]) -> Vec<RatingBox> {
    let mut order: Vec<&str> = Vec::new();
    let mut ratings: FxHashMap<&str, Vec<f64>> = FxHashMap::default();

    for row in rows {
        for tag in row.tags().filter(|t| is_genre(t)) {
            ratings
                .entry(tag)
                .or_insert_with(|| {
                    order.push(tag);
                    Vec::new()
                })
                .push(row.average_rating);
        }
    }

    order
        .into_iter()
        .filter_map(|genre| {
            let mut values = ratings.remove(genre)?;
            values.sort_by(f64::total_cmp);
            Some(RatingBox {
                genre: genre.to_string(),
                books: values.len(),
                min: values[0],
                q1: quantile(&values, 0.25)?,
                median: quantile(&values, 0.5)?,
                q3: quantile(&values, 0.75)?,
                max: values[values.len() - 1],
            })
        })
        .collect()
}

// ============================================================================
// Book Finder
// ============================================================================

fn is_combining_mark(c: char) -> bool {
    matches!(c, '\u{0300}'..='\u{036F}' | '\u{1AB0}'..='\u{1AFF}' |
             '\u{1DC0}'..='\u{1DFF}' | '\u{20D0}'..='\u{20FF}' |
             '\u{FE20}'..='\u{FE2F}')
}

/// Strip diacritics via NFKD so "Brontë" and "Bronte" compare equal.
pub fn fold_diacritics(s: &str) -> String {
    s.nfkd().filter(|c| !is_combining_mark(*c)).collect()
}

/// Case- and diacritic-insensitive substring matcher for title/author search.
pub struct KeywordMatcher {
    pattern: Regex,
}

impl KeywordMatcher {
    pub fn new(keyword: &str) -> anyhow::Result<Self> {
        let pattern = RegexBuilder::new(&regex::escape(&fold_diacritics(keyword.trim())))
            .case_insensitive(true)
            .build()?;
        Ok(Self { pattern })
    }

    pub fn matches(&self, text: &str) -> bool {
        self.pattern.is_match(&fold_diacritics(text))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct BookFilter {
    pub min_rating: f64,
    pub min_ratings_count: i64,
    pub keyword: Option<String>,
    pub limit: usize,
}

impl Default for BookFilter {
    fn default() -> Self {
        Self {
            min_rating: 2.5,
            min_ratings_count: 10_000,
            keyword: None,
            limit: 30,
        }
    }
}

/// Books passing the rating and popularity thresholds whose title or authors
/// contain the keyword, in catalog order, at most `filter.limit`.
pub fn find_books<'a>(rows: &'a [MergedBook], filter: &BookFilter) -> anyhow::Result<Vec<&'a MergedBook>> {
    let matcher = match filter.keyword.as_deref().map(str::trim) {
        Some(k) if !k.is_empty() => Some(KeywordMatcher::new(k)?),
        _ => None,
    };

    Ok(rows
        .iter()
        .filter(|r| r.average_rating >= filter.min_rating && r.ratings_count >= filter.min_ratings_count)
        .filter(|r| {
            matcher
                .as_ref()
                .map_or(true, |m| m.matches(&r.title) || m.matches(&r.authors))
        })
        .take(filter.limit)
        .collect())
}

/// Highest rated of the finder results, best first. Equal ratings keep
/// their finder order.
pub fn top_rated<'a>(found: &[&'a MergedBook], limit: usize) -> Vec<&'a MergedBook> {
    let mut ranked = found.to_vec();
    ranked.sort_by(|a, b| b.average_rating.total_cmp(&a.average_rating));
    ranked.truncate(limit);
    ranked
}

// ============================================================================
// Related Books
// ============================================================================

/// Least-squares fit of `average_rating` against `ratings_count`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct TrendLine {
    pub slope: f64,
    pub intercept: f64,
    pub x_start: f64,
    pub x_end: f64,
}

impl TrendLine {
    /// `None` for fewer than two points or when every x is identical.
    pub fn fit(points: &[(f64, f64)]) -> Option<Self> {
        if points.len() < 2 {
            return None;
        }
        let n = points.len() as f64;
        let x_mean = points.iter().map(|p| p.0).sum::<f64>() / n;
        let y_mean = points.iter().map(|p| p.1).sum::<f64>() / n;
        let num: f64 = points.iter().map(|(x, y)| (x - x_mean) * (y - y_mean)).sum();
        let den: f64 = points.iter().map(|(x, _)| (x - x_mean).powi(2)).sum();
        if den == 0.0 {
            return None;
        }
        let slope = num / den;
        Some(Self {
            slope,
            intercept: y_mean - slope * x_mean,
            x_start: points.iter().map(|p| p.0).fold(f64::INFINITY, f64::min),
            x_end: points.iter().map(|p| p.0).fold(f64::NEG_INFINITY, f64::max),
        })
    }

    pub fn at(&self, x: f64) -> f64 {
        self.slope * x + self.intercept
    }
}

#[derive(Debug, Serialize)]
pub struct RelatedBooks<'a> {
    pub book: &'a MergedBook,
    pub neighbors: Vec<&'a MergedBook>,
    pub trend: Option<TrendLine>,
}

/// Other rated books sharing at least one tag with `book_id`.
pub fn related_books(rows: &[MergedBook], book_id: BookId) -> Option<RelatedBooks<'_>> {
    let book = rows.iter().find(|r| r.book_id == book_id)?;
    let own: FxHashSet<&str> = book.tags().collect();

    let neighbors: Vec<&MergedBook> = rows
        .iter()
        .filter(|r| r.book_id != book_id && r.average_rating > 0.0 && r.ratings_count > 0)
        .filter(|r| r.tags().any(|t| own.contains(t)))
        .collect();

    let points: Vec<(f64, f64)> = neighbors
        .iter()
        .map(|r| (r.ratings_count as f64, r.average_rating))
        .collect();

    Some(RelatedBooks {
        book,
        trend: TrendLine::fit(&points),
        neighbors,
    })
}

// ============================================================================
// Rating Factors
// ============================================================================

#[derive(Debug, Serialize)]
pub struct RatingPoint<'a> {
    pub book: &'a MergedBook,
    /// First tag of the book, or "Other" when it has none
    pub primary_genre: &'a str,
}

#[derive(Debug, Serialize)]
pub struct RatingFactors<'a> {
    pub points: Vec<RatingPoint<'a>>,
    /// 98th percentile of `ratings_count` among the points, for axis scaling
    pub ratings_count_p98: Option<f64>,
    pub max_to_read: u64,
}

/// Most rated books (positive rating and count), most rated first.
pub fn rating_factors(rows: &[MergedBook], limit: usize) -> RatingFactors<'_> {
    let mut books: Vec<&MergedBook> = rows
        .iter()
        .filter(|r| r.average_rating > 0.0 && r.ratings_count > 0)
        .collect();
    books.sort_by(|a, b| b.ratings_count.cmp(&a.ratings_count));
    books.truncate(limit);

    let mut counts: Vec<f64> = books.iter().map(|r| r.ratings_count as f64).collect();
    counts.sort_by(f64::total_cmp);

    RatingFactors {
        ratings_count_p98: quantile(&counts, 0.98),
        max_to_read: books.iter().map(|r| r.to_read_count).max().unwrap_or(0),
        points: books
            .into_iter()
            .map(|book| RatingPoint {
                primary_genre: book.tags().next().unwrap_or("Other"),
                book,
            })
            .collect(),
    }
}
