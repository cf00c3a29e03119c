//! rxsearch search: federated drug-name query over a partition set.
//!
//! raw text -> normalize -> escape -> fan out (score, sort, window per
//! partition) -> merge/dedup -> paginate. Autocomplete asks the canonical
//! partition only and skips merge and pagination.

#![forbid(unsafe_code)]

use std::time::Instant;

use rxsearch_core::{DrugSummary, PartitionQuery, RankedDrug};
use rxsearch_store::PartitionSet;
use tracing::{info, warn};

pub mod config;
pub mod executor;
pub mod merge;
pub mod page;
pub mod query;

pub use config::{CallPolicy, MergeOrder, SearchConfig};
pub use page::{PageRequest, Pagination};
pub use query::{escape_pattern, normalize, Normalized};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SearchError {
    #[error("all {partitions} partitions failed")]
    AllPartitionsFailed { partitions: usize },
    #[error("canonical partition {partition} failed: {reason}")]
    CanonicalFailed { partition: String, reason: String },
}

/// Result of a full search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchOutcome {
    /// Normalized query shorter than the minimum; no pagination.
    TooShort,
    Page {
        items: Vec<DrugSummary>,
        pagination: Pagination,
        /// The normalized query that was searched.
        query: String,
    },
}

impl SearchOutcome {
    pub fn items(&self) -> &[DrugSummary] {
        match self {
            SearchOutcome::TooShort => &[],
            SearchOutcome::Page { items, .. } => items,
        }
    }
}

/// Request-scoped pipeline over a shared, read-only partition set.
#[derive(Debug, Clone)]
pub struct SearchEngine {
    parts: PartitionSet,
    cfg: SearchConfig,
}

fn strip_scores(hits: Vec<RankedDrug>) -> Vec<DrugSummary> {
    hits.into_iter().map(RankedDrug::into_summary).collect()
}

impl SearchEngine {
    pub fn new(parts: PartitionSet, cfg: SearchConfig) -> Self { Self { parts, cfg } }

    pub fn config(&self) -> &SearchConfig { &self.cfg }

    pub fn partitions(&self) -> &PartitionSet { &self.parts }

    /// Full search across every partition. Fails only when no partition
    /// answered; individual partition failures just shrink the result.
    pub async fn search(&self, raw: Option<&str>, page: PageRequest) -> Result<SearchOutcome, SearchError> {
        let started = Instant::now();
        metrics::counter!("search_requests_total", 1u64, "kind" => "search");
        let token = match normalize(raw, self.cfg.min_query_len, self.cfg.max_query_len) {
            Normalized::TooShort => return Ok(SearchOutcome::TooShort),
            Normalized::Token(t) => t,
        };
        let pattern = escape_pattern(&token);
        let query = PartitionQuery {
            pattern,
            skip: page.skip(),
            limit: page.limit(),
            synonym_rule: self.cfg.search_synonyms,
        };

        let (outcomes, count) = tokio::join!(
            executor::search_partitions(&self.parts, &query, &self.cfg.call),
            executor::count_canonical(&self.parts, &query.pattern, &self.cfg.call),
        );

        let answered = outcomes.iter().filter(|o| o.is_ok()).count();
        if answered == 0 {
            warn!(query = %token, partitions = outcomes.len(), "search failed on every partition");
            return Err(SearchError::AllPartitionsFailed { partitions: outcomes.len() });
        }
        let per_partition: Vec<Vec<RankedDrug>> = outcomes.into_iter().filter_map(|o| o.result.ok()).collect();
        let merged = merge::merge(per_partition, self.cfg.merge_order);
        if merged.dropped > 0 {
            metrics::counter!("search_dedup_dropped_total", merged.dropped as u64);
        }

        // Without a canonical count, report what this page proves exists.
        let total = count.unwrap_or_else(|_| query.skip.saturating_add(merged.items.len()) as u64);
        let (hits, pagination) = page::paginate(merged.items, total, page);
        let items = strip_scores(hits);

        let took = started.elapsed();
        metrics::histogram!("search_eval_ms", took.as_secs_f64() * 1_000.0);
        info!(query = %token, page = page.page(), limit = page.limit(), answered, returned = items.len(), total, took_ms = %took.as_millis(), "search ok");
        Ok(SearchOutcome::Page { items, pagination, query: token })
    }

    /// Typeahead: canonical partition only, exact-synonym tier, fixed limit.
    pub async fn autocomplete(&self, raw: Option<&str>) -> Result<Vec<DrugSummary>, SearchError> {
        let started = Instant::now();
        metrics::counter!("search_requests_total", 1u64, "kind" => "autocomplete");
        let token = match normalize(raw, self.cfg.min_query_len, self.cfg.max_query_len) {
            Normalized::TooShort => return Ok(Vec::new()),
            Normalized::Token(t) => t,
        };
        let query = PartitionQuery {
            pattern: escape_pattern(&token),
            skip: 0,
            limit: self.cfg.autocomplete_limit,
            synonym_rule: self.cfg.autocomplete_synonyms,
        };
        let out = executor::search_partition(self.parts.canonical(), &query, &self.cfg.call).await;
        let hits = out.result.map_err(|e| SearchError::CanonicalFailed { partition: out.partition, reason: e.to_string() })?;
        let items = strip_scores(hits);
        metrics::histogram!("autocomplete_eval_ms", started.elapsed().as_secs_f64() * 1_000.0);
        Ok(items)
    }
}
