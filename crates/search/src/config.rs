//! Search runtime configuration, read once from `RXS_*` environment variables.

use std::str::FromStr;
use std::time::Duration;

use anyhow::anyhow;
use rxsearch_core::SynonymRule;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Ordering of the merged, deduplicated sequence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeOrder {
    /// Stable re-sort by score desc, then name asc.
    #[default]
    Score,
    /// Partition order, then each partition's own order.
    Partition,
}

impl FromStr for MergeOrder {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "score" => Ok(MergeOrder::Score),
            "partition" => Ok(MergeOrder::Partition),
            other => Err(anyhow!("unknown merge order: {} (expect score|partition)", other)),
        }
    }
}

/// Per-partition call policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallPolicy {
    pub timeout: Duration,
    /// Extra attempts after the first failure.
    pub retries: u32,
    /// First backoff; doubles per retry.
    pub backoff: Duration,
}

impl Default for CallPolicy {
    fn default() -> Self {
        Self { timeout: Duration::from_millis(2_000), retries: 0, backoff: Duration::from_millis(50) }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchConfig {
    pub call: CallPolicy,
    pub min_query_len: usize,
    /// Longer normalized queries are truncated to this many chars.
    pub max_query_len: usize,
    pub default_limit: usize,
    pub max_limit: usize,
    pub autocomplete_limit: usize,
    pub merge_order: MergeOrder,
    pub search_synonyms: SynonymRule,
    pub autocomplete_synonyms: SynonymRule,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            call: CallPolicy::default(),
            min_query_len: 2,
            max_query_len: 256,
            default_limit: 10,
            max_limit: 100,
            autocomplete_limit: 10,
            merge_order: MergeOrder::Score,
            search_synonyms: SynonymRule::Contains,
            autocomplete_synonyms: SynonymRule::Exact,
        }
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(key, value = %raw, "ignoring unparsable setting");
            None
        }
    }
}

impl SearchConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        let timeout_ms = env_parse::<u64>("RXS_PARTITION_TIMEOUT_MS").unwrap_or(d.call.timeout.as_millis() as u64);
        let backoff_ms = env_parse::<u64>("RXS_RETRY_BACKOFF_MS").unwrap_or(d.call.backoff.as_millis() as u64);
        Self {
            call: CallPolicy {
                timeout: Duration::from_millis(timeout_ms.max(1)),
                retries: env_parse("RXS_PARTITION_RETRIES").unwrap_or(d.call.retries),
                backoff: Duration::from_millis(backoff_ms),
            },
            min_query_len: env_parse("RXS_MIN_QUERY_LEN").unwrap_or(d.min_query_len),
            max_query_len: env_parse::<usize>("RXS_MAX_QUERY_LEN").unwrap_or(d.max_query_len).max(1),
            default_limit: env_parse::<usize>("RXS_DEFAULT_LIMIT").unwrap_or(d.default_limit).max(1),
            max_limit: env_parse::<usize>("RXS_MAX_LIMIT").unwrap_or(d.max_limit).max(1),
            autocomplete_limit: env_parse::<usize>("RXS_AUTOCOMPLETE_LIMIT").unwrap_or(d.autocomplete_limit).max(1),
            merge_order: env_parse("RXS_MERGE_ORDER").unwrap_or(d.merge_order),
            ..d
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_order_parses_case_insensitively() {
        assert_eq!("Partition".parse::<MergeOrder>().unwrap(), MergeOrder::Partition);
        assert_eq!(" score ".parse::<MergeOrder>().unwrap(), MergeOrder::Score);
        assert!("random".parse::<MergeOrder>().is_err());
    }

    #[test]
    fn defaults_match_documented_values() {
        let c = SearchConfig::default();
        assert_eq!(c.call.timeout, Duration::from_secs(2));
        assert_eq!((c.min_query_len, c.default_limit, c.max_limit, c.autocomplete_limit), (2, 10, 100, 10));
        assert_eq!(c.max_query_len, 256);
        assert_eq!(c.search_synonyms, SynonymRule::Contains);
        assert_eq!(c.autocomplete_synonyms, SynonymRule::Exact);
    }
}
