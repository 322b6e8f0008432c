//! Heuristic relevance scoring for triage candidates.

use std::collections::HashSet;

use async_trait::async_trait;

use rag_core::{CandidateScorer, Fragment, Result, ScoredCandidate, ScoringConfig};

const PUNCTUATION: &[char] = &[',', '.', '?', '!', '。', '，', '？', '！'];

/// Lower-cased whitespace tokens longer than one character, punctuation removed.
pub fn extract_keywords(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .replace(PUNCTUATION, " ")
        .split_whitespace()
        .filter(|word| word.chars().count() > 1)
        .map(str::to_string)
        .collect()
}

/// Fraction of query keywords present in the content; 0 for an empty query.
pub fn keyword_overlap(query: &HashSet<String>, content: &HashSet<String>) -> f64 {
    if query.is_empty() {
        return 0.0;
    }
    let matched = query.iter().filter(|word| content.contains(*word)).count();
    matched as f64 / query.len() as f64
}

/// Additive score from retrieval inclusion, keyword overlap, length shape
/// and metadata presence.
#[derive(Debug, Clone, Default)]
pub struct KeywordScorer {
    config: ScoringConfig,
}

impl KeywordScorer {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    pub fn score_fragment(&self, query_keywords: &HashSet<String>, fragment: &Fragment) -> f64 {
        let config = &self.config;
        let mut score = config.base;

        let content_keywords = extract_keywords(&fragment.content);
        score += config.keyword_weight * keyword_overlap(query_keywords, &content_keywords);

        let len = fragment.char_len();
        if (config.ideal_min_chars..=config.ideal_max_chars).contains(&len) {
            score += config.length_bonus;
        } else if len < config.short_chars {
            score -= config.short_penalty;
        }

        if fragment.has_metadata() {
            score += config.metadata_bonus;
        }

        score
    }
}

#[async_trait]
impl CandidateScorer for KeywordScorer {
    async fn score(&self, question: &str, candidates: &[ScoredCandidate]) -> Result<Vec<f64>> {
        let query_keywords = extract_keywords(question);
        Ok(candidates
            .iter()
            .map(|candidate| self.score_fragment(&query_keywords, &candidate.fragment))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_extract_keywords() {
        let words = extract_keywords("What is a Channel? Channels, in Go!");
        let expected: HashSet<String> = ["what", "is", "channel", "channels", "in", "go"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(words, expected);
    }

    #[test]
    fn test_extract_keywords_wide_punctuation() {
        let words = extract_keywords("什么是通道？通道，用于通信。");
        assert!(words.contains("什么是通道"));
        assert!(words.contains("通道"));
        assert!(words.contains("用于通信"));
    }

    #[test]
    fn test_keyword_overlap() {
        let query = extract_keywords("go channel buffer");
        let content = extract_keywords("A channel in Go.");
        assert!(approx(keyword_overlap(&query, &content), 2.0 / 3.0));
        assert_eq!(keyword_overlap(&HashSet::new(), &content), 0.0);
    }

    #[test]
    fn test_score_components() {
        let scorer = KeywordScorer::default();
        let query = extract_keywords("channel");

        // Short, no overlap, no metadata.
        let short = Fragment::new(1, "tiny");
        assert!(approx(scorer.score_fragment(&query, &short), 0.4));

        // Ideal length with full overlap and metadata.
        let mut rich = Fragment::new(2, format!("channel {}", "x".repeat(150)));
        rich.metadata = Some("{\"source\":\"docs\"}".to_string());
        assert!(approx(scorer.score_fragment(&query, &rich), 1.0));

        // Between the short limit and the ideal range.
        let medium = Fragment::new(3, "y".repeat(75));
        assert!(approx(scorer.score_fragment(&query, &medium), 0.5));

        // Over the ideal range.
        let long = Fragment::new(4, "z".repeat(501));
        assert!(approx(scorer.score_fragment(&query, &long), 0.5));
    }

    #[test]
    fn test_length_measured_in_chars() {
        let scorer = KeywordScorer::default();
        // 120 chars, 360 bytes.
        let fragment = Fragment::new(1, "通".repeat(120));
        assert!(approx(scorer.score_fragment(&HashSet::new(), &fragment), 0.6));
    }

    #[tokio::test]
    async fn test_scores_follow_candidate_order() {
        let scorer = KeywordScorer::default();
        let candidates: Vec<ScoredCandidate> = vec!["tiny".to_string(), "a".repeat(200)]
            .into_iter()
            .enumerate()
            .map(|(i, content)| ScoredCandidate {
                fragment: Fragment::new(i as i64, content),
                compressed_vector: Vec::new(),
                score: 0.0,
                is_expanded: false,
                token_count: 0,
                compressed_token_count: 1,
            })
            .collect();

        let scores = scorer.score("question", &candidates).await.unwrap();
        assert_eq!(scores.len(), 2);
        assert!(scores[0] < scores[1]);
    }
}
