//! Tiered relevance scoring over an escaped, literal-safe pattern.
//!
//! Tiers are evaluated in order and the first match wins:
//! exact name (100), name prefix (80), name substring (60), synonym (50 or 40
//! depending on [`SynonymRule`]), anything else the filter let through (10).

#![forbid(unsafe_code)]

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::DrugRecord;

pub const SCORE_EXACT: u32 = 100;
pub const SCORE_PREFIX: u32 = 80;
pub const SCORE_SUBSTRING: u32 = 60;
pub const SCORE_SYNONYM_EXACT: u32 = 50;
pub const SCORE_SYNONYM_CONTAINS: u32 = 40;
pub const SCORE_FALLBACK: u32 = 10;

/// How synonyms earn the synonym tier. Full search uses `Contains`,
/// autocomplete uses `Exact`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SynonymRule {
    #[default]
    Contains,
    Exact,
}

impl SynonymRule {
    pub fn score(self) -> u32 {
        match self {
            SynonymRule::Contains => SCORE_SYNONYM_CONTAINS,
            SynonymRule::Exact => SCORE_SYNONYM_EXACT,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PatternError {
    #[error("invalid pattern {pattern:?}: {source}")]
    Invalid {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Compiled matchers for one request. Build once, share across records.
#[derive(Debug, Clone)]
pub struct Scorer {
    exact: Regex,
    prefix: Regex,
    contains: Regex,
    rule: SynonymRule,
}

fn compile(src: String, pattern: &str) -> Result<Regex, PatternError> {
    RegexBuilder::new(&src)
        .case_insensitive(true)
        .build()
        .map_err(|source| PatternError::Invalid { pattern: pattern.to_string(), source })
}

impl Scorer {
    pub fn new(pattern: &str, rule: SynonymRule) -> Result<Self, PatternError> {
        Ok(Self {
            exact: compile(format!("^(?:{})$", pattern), pattern)?,
            prefix: compile(format!("^(?:{})", pattern), pattern)?,
            contains: compile(format!("(?:{})", pattern), pattern)?,
            rule,
        })
    }

    pub fn rule(&self) -> SynonymRule { self.rule }

    /// Partition filter: name prefix/substring or any synonym substring.
    pub fn matches(&self, rec: &DrugRecord) -> bool {
        self.contains.is_match(&rec.name) || rec.synonym_names().any(|s| self.contains.is_match(s))
    }

    pub fn score(&self, rec: &DrugRecord) -> u32 {
        let name = rec.name.as_str();
        if self.exact.is_match(name) {
            return SCORE_EXACT;
        }
        if self.prefix.is_match(name) {
            return SCORE_PREFIX;
        }
        if self.contains.is_match(name) {
            return SCORE_SUBSTRING;
        }
        let synonym_hit = match self.rule {
            SynonymRule::Exact => rec.synonym_names().any(|s| self.exact.is_match(s)),
            SynonymRule::Contains => rec.synonym_names().any(|s| self.contains.is_match(s)),
        };
        if synonym_hit { self.rule.score() } else { SCORE_FALLBACK }
    }

    /// Filter then score; `None` when the record is filtered out.
    pub fn rank(&self, rec: &DrugRecord) -> Option<u32> {
        self.matches(rec).then(|| self.score(rec))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Synonym;

    fn rec(name: &str, synonyms: &[&str]) -> DrugRecord {
        DrugRecord {
            name: name.to_string(),
            synonyms: if synonyms.is_empty() {
                None
            } else {
                Some(synonyms.iter().map(|s| Synonym { name: Some((*s).to_string()), language: None }).collect())
            },
            ..Default::default()
        }
    }

    #[test]
    fn name_tiers_outrank_synonyms() {
        let s = Scorer::new("aspirin", SynonymRule::Contains).unwrap();
        assert_eq!(s.rank(&rec("Aspirin", &[])), Some(SCORE_EXACT));
        assert_eq!(s.rank(&rec("Aspirin Complex", &[])), Some(SCORE_PREFIX));
        assert_eq!(s.rank(&rec("Baby Aspirin", &[])), Some(SCORE_SUBSTRING));
        assert_eq!(s.rank(&rec("X", &["Aspirin"])), Some(SCORE_SYNONYM_CONTAINS));
        assert_eq!(s.rank(&rec("Ibuprofen", &["Advil"])), None);
    }

    #[test]
    fn exact_synonym_rule_falls_back_on_partial_synonym() {
        let s = Scorer::new("aspirin", SynonymRule::Exact).unwrap();
        assert_eq!(s.rank(&rec("X", &["ASPIRIN"])), Some(SCORE_SYNONYM_EXACT));
        assert_eq!(s.rank(&rec("Y", &["Aspirin 81"])), Some(SCORE_FALLBACK));
    }

    #[test]
    fn escaped_metacharacters_are_literal() {
        let s = Scorer::new(r"a\+b", SynonymRule::Contains).unwrap();
        assert_eq!(s.rank(&rec("a+b", &[])), Some(SCORE_EXACT));
        assert_eq!(s.rank(&rec("aab", &[])), None);
        assert_eq!(s.rank(&rec("ab", &[])), None);
    }

    #[test]
    fn missing_synonym_names_are_ignored() {
        let s = Scorer::new("foo", SynonymRule::Contains).unwrap();
        let r = DrugRecord {
            name: "bar".into(),
            synonyms: Some(vec![Synonym { name: None, language: Some("english".into()) }]),
            ..Default::default()
        };
        assert_eq!(s.rank(&r), None);
    }

    #[test]
    fn unescaped_garbage_is_an_error_not_a_panic() {
        assert!(Scorer::new("(", SynonymRule::Contains).is_err());
    }
}
