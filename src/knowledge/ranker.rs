//! Lexical relevance ranking
//!
//! A row scores one point per distinct query token it contains
//! (case-insensitive substring match). Short tokens are dropped as noise.
//! Ties keep the table's original order.

use super::KnowledgeRow;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Anything that is not a letter, combining mark or digit separates tokens.
/// Marks are kept so scripts with dependent vowels stay in one piece.
static TOKEN_SEPARATOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\p{L}\p{M}\p{N}]+").expect("valid token separator pattern"));

/// What to supply as context when no row matches the query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackPolicy {
    /// The first `k` rows of the table, as general background.
    #[default]
    FirstK,
    /// No context at all.
    None,
}

impl FallbackPolicy {
    pub fn apply(&self, rows: &[KnowledgeRow], k: usize) -> Vec<KnowledgeRow> {
        match self {
            FallbackPolicy::FirstK => rows.iter().take(k).cloned().collect(),
            FallbackPolicy::None => Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Ranker {
    min_token_chars: usize,
}

impl Default for Ranker {
    fn default() -> Self {
        Self::new(3)
    }
}

impl Ranker {
    pub fn new(min_token_chars: usize) -> Self {
        Self { min_token_chars }
    }

    /// Distinct lowercase tokens of at least `min_token_chars` characters, in query order.
    pub fn tokenize(&self, query: &str) -> Vec<String> {
        let lowered = query.to_lowercase();
        let mut tokens: Vec<String> = Vec::new();
        for token in TOKEN_SEPARATOR.split(&lowered) {
            if token.chars().count() < self.min_token_chars {
                continue;
            }
            if !tokens.iter().any(|seen| seen == token) {
                tokens.push(token.to_string());
            }
        }
        tokens
    }

    /// Up to `k` rows with a non-zero score, best first.
    pub fn rank(&self, query: &str, rows: &[KnowledgeRow], k: usize) -> Vec<KnowledgeRow> {
        let tokens = self.tokenize(query);
        if tokens.is_empty() || k == 0 {
            return Vec::new();
        }

        let mut scored: Vec<(usize, &KnowledgeRow)> = rows
            .iter()
            .filter_map(|row| {
                let haystack = row.text().to_lowercase();
                let score = tokens
                    .iter()
                    .filter(|token| haystack.contains(token.as_str()))
                    .count();
                (score > 0).then_some((score, row))
            })
            .collect();

        // sort_by is stable, so equal scores keep table order
        scored.sort_by(|a, b| b.0.cmp(&a.0));

        scored
            .into_iter()
            .take(k)
            .map(|(_, row)| row.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(texts: &[&str]) -> Vec<KnowledgeRow> {
        texts.iter().map(|t| KnowledgeRow::new(*t)).collect()
    }

    fn texts(rows: &[KnowledgeRow]) -> Vec<&str> {
        rows.iter().map(|r| r.text()).collect()
    }

    #[test]
    fn test_tokenize_drops_short_and_duplicate_tokens() {
        let ranker = Ranker::new(3);
        let tokens = ranker.tokenize("What is the FEE, the fee? Of course!");
        assert_eq!(tokens, vec!["what", "the", "fee", "course"]);
    }

    #[test]
    fn test_tokenize_counts_characters_not_bytes() {
        let ranker = Ranker::new(3);
        assert_eq!(ranker.tokenize("ค่า ab"), vec!["ค่า"]);
        assert!(ranker.tokenize("éa").is_empty());
    }

    #[test]
    fn test_rank_orders_by_distinct_matches() {
        let ranker = Ranker::default();
        let table = rows(&[
            "Course: Nursing | Fee: 40000",
            "Course: Pharmacy | Fee: 60000 | Duration: 5 years",
            "Contact: office hours 9-17",
        ]);

        let ranked = ranker.rank("pharmacy fee duration", &table, 5);
        assert_eq!(
            texts(&ranked),
            vec![
                "Course: Pharmacy | Fee: 60000 | Duration: 5 years",
                "Course: Nursing | Fee: 40000",
            ]
        );
    }

    #[test]
    fn test_repeated_occurrences_do_not_raise_score() {
        let ranker = Ranker::default();
        let table = rows(&["fee fee fee fee", "fee and schedule"]);

        let ranked = ranker.rank("fee schedule", &table, 5);
        assert_eq!(texts(&ranked), vec!["fee and schedule", "fee fee fee fee"]);
    }

    #[test]
    fn test_ties_keep_table_order() {
        let ranker = Ranker::default();
        let table = rows(&["alpha fee", "beta fee", "gamma fee"]);

        let ranked = ranker.rank("fee", &table, 5);
        assert_eq!(texts(&ranked), vec!["alpha fee", "beta fee", "gamma fee"]);
    }

    #[test]
    fn test_case_insensitive_match() {
        let ranker = Ranker::default();
        let table = rows(&["ADMISSION opens in MAY"]);
        assert_eq!(ranker.rank("admission", &table, 1).len(), 1);
    }

    #[test]
    fn test_never_exceeds_k_and_excludes_zero_scores() {
        let ranker = Ranker::default();
        let table = rows(&["fee one", "nothing here", "fee two", "fee three"]);

        let ranked = ranker.rank("fee", &table, 2);
        assert_eq!(texts(&ranked), vec!["fee one", "fee two"]);
        assert!(ranker.rank("unrelated", &table, 2).is_empty());
    }

    #[test]
    fn test_rank_is_deterministic() {
        let ranker = Ranker::default();
        let table = rows(&["fee a", "fee schedule b", "schedule c", "fee d"]);
        let first = ranker.rank("fee schedule", &table, 3);
        let second = ranker.rank("fee schedule", &table, 3);
        assert_eq!(first, second);
    }

    #[test]
    fn test_short_only_query_matches_nothing() {
        let ranker = Ranker::default();
        let table = rows(&["is it ok"]);
        assert!(ranker.rank("is it", &table, 5).is_empty());
    }

    #[test]
    fn test_fallback_policies() {
        let table = rows(&["a", "b", "c"]);
        assert_eq!(texts(&FallbackPolicy::FirstK.apply(&table, 2)), vec!["a", "b"]);
        assert!(FallbackPolicy::None.apply(&table, 2).is_empty());
    }
}
