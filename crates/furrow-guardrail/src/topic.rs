//! Keyword topics compiled to whole-word regexes.

use regex::{Regex, RegexBuilder};

use furrow_contracts::{
    config::TopicRule,
    error::{FurrowError, FurrowResult},
};

/// A `TopicRule` ready for matching.
#[derive(Debug)]
pub struct Topic {
    pub id: String,
    pub category: String,
    pattern: Regex,
}

impl Topic {
    /// Compile `rule` into a single case-insensitive alternation.
    ///
    /// Keywords are matched literally on word boundaries, so "rate" does not
    /// fire inside "moderate". Keywords ending in punctuation, like "c++",
    /// still match before a space or the end of the text.
    pub fn compile(rule: &TopicRule) -> FurrowResult<Self> {
        if rule.keywords.is_empty() {
            return Err(FurrowError::ConfigError {
                reason: format!("topic '{}' has no keywords", rule.id),
            });
        }
        let alternation = rule.keywords.iter().map(|k| bounded(k.trim())).collect::<Vec<_>>().join("|");
        let pattern = RegexBuilder::new(&format!("(?:{alternation})"))
            .case_insensitive(true)
            .build()
            .map_err(|e| FurrowError::ConfigError {
                reason: format!("topic '{}' does not compile: {}", rule.id, e),
            })?;
        Ok(Self { id: rule.id.clone(), category: rule.category.clone(), pattern })
    }

    /// Number of distinct keywords of this topic present in `text`.
    pub fn hits(&self, text: &str) -> usize {
        let mut seen: Vec<String> = self
            .pattern
            .find_iter(text)
            .map(|m| m.as_str().to_lowercase())
            .collect();
        seen.sort();
        seen.dedup();
        seen.len()
    }
}

/// `keyword` escaped, with a word boundary on each side that starts or ends
/// in a word character. `\b` next to "+" in "c++" would never match.
fn bounded(keyword: &str) -> String {
    let is_word = |c: char| c.is_alphanumeric() || c == '_';
    let lead = if keyword.chars().next().is_some_and(is_word) { r"\b" } else { "" };
    let trail = if keyword.chars().last().is_some_and(is_word) { r"\b" } else { "" };
    format!("{lead}{}{trail}", regex::escape(keyword))
}

/// The topic in `topics` with the most hits on `text`, if any hit at all.
pub fn best_match<'a>(topics: &'a [Topic], text: &str) -> Option<(&'a Topic, usize)> {
    topics
        .iter()
        .map(|t| (t, t.hits(text)))
        .filter(|(_, hits)| *hits > 0)
        .max_by_key(|(_, hits)| *hits)
}

#[cfg(test)]
mod tests {
    use furrow_contracts::config::TopicRule;

    use super::{best_match, Topic};

    fn rule(id: &str, keywords: &[&str]) -> TopicRule {
        TopicRule {
            id: id.to_string(),
            category: id.to_string(),
            keywords: keywords.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn matches_whole_words_only() {
        let topic = Topic::compile(&rule("rates", &["rate"])).unwrap();
        assert_eq!(topic.hits("What rate should I use?"), 1);
        assert_eq!(topic.hits("A moderate infestation"), 0);
    }

    #[test]
    fn counts_distinct_keywords() {
        let topic = Topic::compile(&rule("weeds", &["ryegrass", "weed"])).unwrap();
        assert_eq!(topic.hits("Ryegrass is a weed; ryegrass again"), 2);
    }

    #[test]
    fn multi_word_keywords_are_literal() {
        let topic = Topic::compile(&rule("weeds", &["wild radish", "c++"])).unwrap();
        assert_eq!(topic.hits("wild radish in canola"), 1);
        assert_eq!(topic.hits("help me debug this c++ program"), 1);
        assert_eq!(topic.hits("I only write c++"), 1);
        assert_eq!(topic.hits("abc++ is not a keyword"), 0);
    }

    #[test]
    fn best_match_prefers_more_hits() {
        let topics = vec![
            Topic::compile(&rule("weather", &["rain"])).unwrap(),
            Topic::compile(&rule("weeds", &["ryegrass", "herbicide"])).unwrap(),
        ];
        let (topic, hits) = best_match(&topics, "herbicide for ryegrass after rain").unwrap();
        assert_eq!(topic.id, "weeds");
        assert_eq!(hits, 2);
        assert!(best_match(&topics, "hello").is_none());
    }

    #[test]
    fn empty_keyword_list_is_rejected() {
        assert!(Topic::compile(&rule("empty", &[])).is_err());
    }
}
