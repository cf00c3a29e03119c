//! rxsearch public API façade (in-process).
//!
//! Request/response envelopes consumers (page renderers, chat glue, CLI)
//! depend on, plus the trait they call. Success bodies carry
//! `success: true`; failures are a `{success: false, message}` body with a
//! 5xx status, the internal cause only ever logged.

#![forbid(unsafe_code)]

use std::time::Instant;

use rxsearch_core::DrugSummary;
use rxsearch_search::{PageRequest, Pagination, SearchConfig, SearchEngine, SearchOutcome};
use rxsearch_store::{PartitionInfo, PartitionSet};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

pub use rxsearch_search::SearchError;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchRequest {
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub page: Option<i64>,
    #[serde(default)]
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutocompleteRequest {
    #[serde(default)]
    pub query: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub success: bool,
    pub data: Vec<DrugSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_query: Option<String>,
}

impl SearchResponse {
    pub fn empty() -> Self { Self { success: true, data: Vec::new(), pagination: None, search_query: None } }
}

impl From<SearchOutcome> for SearchResponse {
    fn from(o: SearchOutcome) -> Self {
        match o {
            SearchOutcome::TooShort => Self::empty(),
            SearchOutcome::Page { items, pagination, query } => Self {
                success: true,
                data: items,
                pagination: Some(pagination),
                search_query: Some(query),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutocompleteResponse {
    pub success: bool,
    pub data: Vec<DrugSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureBody {
    pub success: bool,
    pub message: String,
}

/// API errors. Display text is what callers see; causes stay in the logs.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum ApiError {
    #[error("Error searching drugs")]
    SearchFailed,
    #[error("Error fetching suggestions")]
    AutocompleteFailed,
    #[error("Search backend unavailable")]
    Unavailable,
}

impl ApiError {
    pub fn http_status(&self) -> u16 {
        match self {
            ApiError::SearchFailed | ApiError::AutocompleteFailed => 500,
            ApiError::Unavailable => 503,
        }
    }

    pub fn body(&self) -> FailureBody { FailureBody { success: false, message: self.to_string() } }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Turn an API result into `(status, json body)` for transport glue.
pub fn respond<T: Serialize>(res: &ApiResult<T>) -> (u16, serde_json::Value) {
    let encoded = match res {
        Ok(v) => serde_json::to_value(v).map(|b| (200, b)),
        Err(e) => serde_json::to_value(e.body()).map(|b| (e.http_status(), b)),
    };
    encoded.unwrap_or_else(|e| {
        error!(error = %e, "encoding response failed");
        (500, serde_json::json!({ "success": false, "message": ApiError::SearchFailed.to_string() }))
    })
}

/// Read-only drug search surface.
#[async_trait::async_trait]
pub trait DrugSearchApi: Send + Sync {
    async fn search(&self, req: SearchRequest) -> ApiResult<SearchResponse>;

    async fn autocomplete(&self, req: AutocompleteRequest) -> ApiResult<AutocompleteResponse>;

    /// Configured partitions, canonical first.
    async fn partitions(&self) -> ApiResult<Vec<PartitionInfo>>;
}

// ----------------- Mock implementation -----------------

/// Canned responses for consumers' tests.
#[derive(Debug, Clone, Default)]
pub struct MockApi {
    pub search: Option<SearchResponse>,
    pub suggestions: Vec<DrugSummary>,
    pub partitions: Vec<PartitionInfo>,
    pub fail: Option<ApiError>,
}

impl MockApi { pub fn new() -> Self { Self::default() } }

#[async_trait::async_trait]
impl DrugSearchApi for MockApi {
    async fn search(&self, _req: SearchRequest) -> ApiResult<SearchResponse> {
        if let Some(e) = &self.fail { return Err(e.clone()); }
        Ok(self.search.clone().unwrap_or_else(SearchResponse::empty))
    }

    async fn autocomplete(&self, _req: AutocompleteRequest) -> ApiResult<AutocompleteResponse> {
        if let Some(e) = &self.fail { return Err(e.clone()); }
        Ok(AutocompleteResponse { success: true, data: self.suggestions.clone() })
    }

    async fn partitions(&self) -> ApiResult<Vec<PartitionInfo>> {
        if let Some(e) = &self.fail { return Err(e.clone()); }
        Ok(self.partitions.clone())
    }
}

// ----------------- In-process implementation -----------------

/// In-process implementation over a [`SearchEngine`]. The partition set is
/// opened once and released with [`InProcApi::shutdown`].
#[derive(Debug, Clone)]
pub struct InProcApi {
    engine: SearchEngine,
}

impl InProcApi {
    pub fn new(engine: SearchEngine) -> Self { Self { engine } }

    /// Open partitions from `RXS_PARTITIONS` with `RXS_*` settings.
    pub fn open_from_env() -> anyhow::Result<Self> {
        let parts = PartitionSet::open_from_env()?;
        Ok(Self::new(SearchEngine::new(parts, SearchConfig::from_env())))
    }

    pub fn engine(&self) -> &SearchEngine { &self.engine }

    pub async fn shutdown(&self) { self.engine.partitions().close().await; }
}

#[async_trait::async_trait]
impl DrugSearchApi for InProcApi {
    async fn search(&self, req: SearchRequest) -> ApiResult<SearchResponse> {
        let t0 = Instant::now();
        let page = PageRequest::new(req.page, req.limit, self.engine.config());
        match self.engine.search(req.query.as_deref(), page).await {
            Ok(out) => {
                let resp = SearchResponse::from(out);
                info!(results = resp.data.len(), took_ms = %t0.elapsed().as_millis(), "api: search ok");
                Ok(resp)
            }
            Err(e) => {
                metrics::counter!("api_failures_total", 1u64, "op" => "search");
                error!(error = %e, query = ?req.query, "api: search failed");
                Err(ApiError::SearchFailed)
            }
        }
    }

    async fn autocomplete(&self, req: AutocompleteRequest) -> ApiResult<AutocompleteResponse> {
        match self.engine.autocomplete(req.query.as_deref()).await {
            Ok(data) => Ok(AutocompleteResponse { success: true, data }),
            Err(e) => {
                metrics::counter!("api_failures_total", 1u64, "op" => "autocomplete");
                error!(error = %e, query = ?req.query, "api: autocomplete failed");
                Err(ApiError::AutocompleteFailed)
            }
        }
    }

    async fn partitions(&self) -> ApiResult<Vec<PartitionInfo>> {
        Ok(self.engine.partitions().describe().await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use rxsearch_core::DrugRecord;
    use rxsearch_store::{MemoryPartition, Partition};

    fn api(records: Vec<serde_json::Value>) -> InProcApi {
        let recs: Vec<DrugRecord> = records.into_iter().map(|v| serde_json::from_value(v).unwrap()).collect();
        let parts: Vec<Arc<dyn Partition>> = vec![Arc::new(MemoryPartition::new("main", recs))];
        InProcApi::new(SearchEngine::new(PartitionSet::new(parts).unwrap(), SearchConfig::default()))
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn short_query_serializes_without_pagination() {
        let a = api(vec![serde_json::json!({"name": "Aspirin", "drugbank_id": "DB00945"})]);
        let res = a.search(SearchRequest { query: Some("a".into()), ..Default::default() }).await;
        assert_eq!(respond(&res), (200, serde_json::json!({"success": true, "data": []})));
        let res = a.autocomplete(AutocompleteRequest { query: None }).await;
        assert_eq!(respond(&res), (200, serde_json::json!({"success": true, "data": []})));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn search_response_shape() {
        let a = api(vec![serde_json::json!({
            "name": "Aspirin", "drugbank_id": [{"id": "DB00945", "primary": true}],
            "type": "small molecule", "unii": "R16CO5Y76E",
            "synonyms": [{"name": "ASA", "language": "english"}]
        })]);
        let res = a.search(SearchRequest { query: Some(" Aspirin ".into()), page: Some(0), limit: Some(-5) }).await;
        let (status, body) = respond(&res);
        assert_eq!(status, 200);
        assert_eq!(
            body,
            serde_json::json!({
                "success": true,
                "data": [{"name": "Aspirin", "drugbank_id": ["DB00945"], "type": "small molecule", "unii": "R16CO5Y76E"}],
                "pagination": {"total": 1, "page": 1, "limit": 10, "totalPages": 1},
                "searchQuery": "Aspirin"
            })
        );
    }

    #[tokio::test]
    async fn failures_are_structured_and_opaque() {
        let m = MockApi { fail: Some(ApiError::SearchFailed), ..MockApi::new() };
        let res = m.search(SearchRequest::default()).await;
        let (status, body) = respond(&res);
        assert_eq!(status, 500);
        assert_eq!(body, serde_json::json!({"success": false, "message": "Error searching drugs"}));
    }

    #[test]
    fn request_accepts_missing_fields() {
        let r: SearchRequest = serde_json::from_value(serde_json::json!({"query": "asp"})).unwrap();
        assert_eq!(r, SearchRequest { query: Some("asp".into()), page: None, limit: None });
    }
}
