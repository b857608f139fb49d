//! Tag ranking: join assignments to tag names and keep the heaviest tags per book.

use anyhow::{bail, Result};
use clap::ValueEnum;
use rayon::prelude::*;
use rustc_hash::FxHashMap;

use crate::models::{GoodreadsId, Tag, TagAssignment, TagId, TopTags};

/// Number of tag names kept per book by default
pub const DEFAULT_TAG_LIMIT: usize = 5;

/// Separator between tag names in the output `tag_list` column
pub const TAG_SEPARATOR: &str = ", ";

/// How an assignment contributes to its tag's rank.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum TagWeighting {
    /// Sum the assignment `count` column (rows without a count weigh 1)
    #[default]
    Count,
    /// Every assignment row weighs 1, regardless of `count`
    Occurrences,
}

impl TagWeighting {
    fn weight(self, assignment: &TagAssignment) -> i64 {
        match self {
            TagWeighting::Count => assignment.count.unwrap_or(1),
            TagWeighting::Occurrences => 1,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RankOptions {
    pub limit: usize,
    pub weighting: TagWeighting,
}

impl Default for RankOptions {
    fn default() -> Self {
        Self {
            limit: DEFAULT_TAG_LIMIT,
            weighting: TagWeighting::default(),
        }
    }
}

/// Result of ranking: top tags per Goodreads book plus the number of
/// assignments dropped because their `tag_id` is not in the dictionary.
#[derive(Debug, Default)]
pub struct TagRanking {
    pub top: TopTags,
    pub dangling: usize,
}

/// Per-book accumulator that remembers the order tags were first seen in.
#[derive(Default)]
struct TagTally<'a> {
    index: FxHashMap<&'a str, usize>,
    entries: Vec<(&'a str, i64)>,
}

impl<'a> TagTally<'a> {
    fn add(&mut self, name: &'a str, weight: i64) {
        match self.index.get(name) {
            Some(&i) => self.entries[i].1 += weight,
            None => {
                self.index.insert(name, self.entries.len());
                self.entries.push((name, weight));
            }
        }
    }

    /// Heaviest `limit` names. `sort_by` is stable, so equal weights keep first-seen order.
    fn top(mut self, limit: usize) -> Vec<String> {
        self.entries.sort_by(|a, b| b.1.cmp(&a.1));
        self.entries
            .into_iter()
            .take(limit)
            .map(|(name, _)| name.to_string())
            .collect()
    }
}

/// Build the `tag_id -> tag_name` lookup, rejecting duplicate ids.
pub fn tag_dictionary(tags: &[Tag]) -> Result<FxHashMap<TagId, &str>> {
    let mut names: FxHashMap<TagId, &str> =
        FxHashMap::with_capacity_and_hasher(tags.len(), Default::default());
    for tag in tags {
        if names.insert(tag.tag_id, tag.tag_name.as_str()).is_some() {
            bail!(
                "Join cardinality violation: tag_id {} appears more than once in tags",
                tag.tag_id
            );
        }
    }
    Ok(names)
}

/// Rank tag names per `goodreads_book_id`.
///
/// Assignments are inner-joined to the dictionary, so an unknown `tag_id`
/// is skipped (and counted in `TagRanking::dangling`) rather than failing.
/// Weights are accumulated per tag name, ranked descending and truncated
/// to `options.limit`.
pub fn rank_tags(
    assignments: &[TagAssignment],
    tags: &[Tag],
    options: RankOptions,
) -> Result<TagRanking> {
    let names = tag_dictionary(tags)?;

    let mut groups: FxHashMap<GoodreadsId, TagTally> = FxHashMap::default();
    let mut dangling = 0;

    for assignment in assignments {
        let Some(&name) = names.get(&assignment.tag_id) else {
            dangling += 1;
            continue;
        };
        groups
            .entry(assignment.goodreads_book_id)
            .or_default()
            .add(name, options.weighting.weight(assignment));
    }

    let groups_vec: Vec<_> = groups.into_iter().collect();
    let top: TopTags = groups_vec
        .into_par_iter()
        .map(|(id, tally)| (id, tally.top(options.limit)))
        .collect();

    Ok(TagRanking { top, dangling })
}

/// Join ranked tag names into the `tag_list` column value.
pub fn format_tag_list<S: AsRef<str>>(names: &[S]) -> String {
    names
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(TAG_SEPARATOR)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tag(id: i64, name: &str) -> Tag {
        Tag {
            tag_id: TagId(id),
            tag_name: name.to_string(),
        }
    }

    fn assign(book: i64, tag: i64, count: Option<i64>) -> TagAssignment {
        TagAssignment {
            goodreads_book_id: GoodreadsId(book),
            tag_id: TagId(tag),
            count,
        }
    }

    fn top_for(ranking: &TagRanking, book: i64) -> Vec<&str> {
        ranking.top[&GoodreadsId(book)]
            .iter()
            .map(String::as_str)
            .collect()
    }

    #[test]
    fn test_single_tag_repeated() {
        let ranking = rank_tags(
            &[assign(100, 5, None), assign(100, 5, None)],
            &[tag(5, "fiction")],
            RankOptions::default(),
        )
        .unwrap();
        assert_eq!(top_for(&ranking, 100), vec!["fiction"]);
        assert_eq!(ranking.dangling, 0);
    }

    #[test]
    fn test_ranked_by_total_count() {
        let tags = [tag(1, "to-read"), tag(2, "fantasy"), tag(3, "favorites")];
        let assignments = [
            assign(100, 1, Some(10)),
            assign(100, 2, Some(40)),
            assign(100, 3, Some(25)),
            assign(100, 1, Some(20)),
        ];
        let ranking = rank_tags(&assignments, &tags, RankOptions::default()).unwrap();
        assert_eq!(top_for(&ranking, 100), vec!["fantasy", "to-read", "favorites"]);
    }

    #[test]
    fn test_ties_keep_first_seen_order() {
        let tags = [tag(1, "c"), tag(2, "a"), tag(3, "b")];
        let assignments = [
            assign(7, 3, Some(5)),
            assign(7, 1, Some(5)),
            assign(7, 2, Some(5)),
        ];
        let ranking = rank_tags(&assignments, &tags, RankOptions::default()).unwrap();
        assert_eq!(top_for(&ranking, 7), vec!["b", "c", "a"]);
    }

    #[test]
    fn test_truncates_to_limit() {
        let tags: Vec<Tag> = (1..=8).map(|i| tag(i, &format!("t{}", i))).collect();
        let assignments: Vec<TagAssignment> =
            (1..=8).map(|i| assign(1, i, Some(100 - i))).collect();
        let ranking = rank_tags(&assignments, &tags, RankOptions::default()).unwrap();
        assert_eq!(top_for(&ranking, 1), vec!["t1", "t2", "t3", "t4", "t5"]);

        let three = RankOptions {
            limit: 3,
            ..Default::default()
        };
        let ranking = rank_tags(&assignments, &tags, three).unwrap();
        assert_eq!(top_for(&ranking, 1).len(), 3);
    }

    #[test]
    fn test_dangling_tag_ids_dropped() {
        let ranking = rank_tags(
            &[assign(1, 99, Some(1000)), assign(1, 2, Some(1)), assign(2, 98, None)],
            &[tag(2, "poetry")],
            RankOptions::default(),
        )
        .unwrap();
        assert_eq!(top_for(&ranking, 1), vec!["poetry"]);
        assert!(!ranking.top.contains_key(&GoodreadsId(2)));
        assert_eq!(ranking.dangling, 2);
    }

    #[test]
    fn test_occurrence_weighting_ignores_count() {
        let tags = [tag(1, "heavy"), tag(2, "frequent")];
        let assignments = [
            assign(1, 1, Some(500)),
            assign(1, 2, Some(1)),
            assign(1, 2, Some(1)),
        ];
        let by_count = rank_tags(&assignments, &tags, RankOptions::default()).unwrap();
        assert_eq!(top_for(&by_count, 1), vec!["heavy", "frequent"]);

        let occurrences = RankOptions {
            weighting: TagWeighting::Occurrences,
            ..Default::default()
        };
        let by_rows = rank_tags(&assignments, &tags, occurrences).unwrap();
        assert_eq!(top_for(&by_rows, 1), vec!["frequent", "heavy"]);
    }

    #[test]
    fn test_same_name_under_two_ids_is_merged() {
        let tags = [tag(1, "sci-fi"), tag(2, "sci-fi"), tag(3, "horror")];
        let assignments = [
            assign(1, 3, Some(3)),
            assign(1, 1, Some(2)),
            assign(1, 2, Some(2)),
        ];
        let ranking = rank_tags(&assignments, &tags, RankOptions::default()).unwrap();
        assert_eq!(top_for(&ranking, 1), vec!["sci-fi", "horror"]);
    }

    #[test]
    fn test_duplicate_tag_id_rejected() {
        let result = rank_tags(
            &[assign(1, 5, None)],
            &[tag(5, "fiction"), tag(5, "fantasy")],
            RankOptions::default(),
        );
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("tag_id 5 appears more than once"));
    }

    #[test]
    fn test_books_are_ranked_independently() {
        let tags = [tag(1, "a"), tag(2, "b")];
        let assignments = [
            assign(10, 1, Some(1)),
            assign(20, 2, Some(9)),
            assign(10, 2, Some(5)),
            assign(20, 1, Some(3)),
        ];
        let ranking = rank_tags(&assignments, &tags, RankOptions::default()).unwrap();
        assert_eq!(top_for(&ranking, 10), vec!["b", "a"]);
        assert_eq!(top_for(&ranking, 20), vec!["b", "a"]);
    }

    #[test]
    fn test_format_tag_list() {
        assert_eq!(format_tag_list(&["fantasy", "magic"]), "fantasy, magic");
        assert_eq!(format_tag_list(&["solo".to_string()]), "solo");
        assert_eq!(format_tag_list::<&str>(&[]), "");
    }
}
