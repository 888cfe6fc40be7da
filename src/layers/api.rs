use futures_util::future::join_all;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::layers::{RawPaper, SearchFilters, SearchRequest, SearchResponse};

pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
pub const SOURCES: [&str; 3] = ["crossref", "arxiv", "openalex"];
pub const FORMATS: [&str; 3] = ["apa", "ieee", "mla"];

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("backend returned {status}{}", .detail.as_deref().map(|d| format!(": {}", d)).unwrap_or_default())]
    Server {
        status: StatusCode,
        detail: Option<String>,
    },
    #[error("no response from backend: {0}")]
    NoResponse(#[source] reqwest::Error),
    #[error("malformed backend response: {0}")]
    Decode(#[source] reqwest::Error),
    #[error("invalid endpoint url: {0}")]
    Url(#[from] url::ParseError),
    #[error("failed to build http client: {0}")]
    Client(#[source] reqwest::Error),
}

impl ApiError {
    /// Text suitable for showing to a user.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Server { detail: Some(detail), .. } => detail.clone(),
            other => {
                let text = other.to_string();
                if text.is_empty() {
                    "An unexpected error occurred".to_string()
                } else {
                    text
                }
            }
        }
    }
}

/// Pulls `detail`, then `error`, out of an error body. Non-string details
/// (validation error lists) are kept as compact JSON.
fn error_detail(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    let field = value.get("detail").or_else(|| value.get("error"))?;
    match field {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReferenceRequest<'a> {
    pub literature: &'a Value,
    pub format: &'a str,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct FormattedReference {
    pub formatted_reference: String,
    #[serde(default)]
    pub format: Option<String>,
}

#[derive(Debug)]
pub struct BatchOutcome {
    pub keyword: String,
    pub result: Result<SearchResponse, ApiError>,
}

impl BatchOutcome {
    pub fn is_fulfilled(&self) -> bool {
        self.result.is_ok()
    }
}

#[derive(Debug, Clone)]
pub struct BackendClient {
    client: Client,
    base_url: Url,
    token: Option<String>,
}

impl BackendClient {
    pub fn new(mut base_url: Url) -> Result<Self, ApiError> {
        // Endpoints are joined relative to the base, so its path must end in a slash.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .default_headers(headers)
            .build()
            .map_err(ApiError::Client)?;
        Ok(Self { client, base_url, token: None })
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token.filter(|t| !t.is_empty());
        self
    }

    pub fn set_token(&mut self, token: Option<String>) {
        self.token = token.filter(|t| !t.is_empty());
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        Ok(self.base_url.join(path.trim_start_matches('/'))?)
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> Result<reqwest::Response, ApiError> {
        let resp = self.authorized(builder).send().await.map_err(|e| {
            tracing::error!("No response from backend: {}", e);
            ApiError::NoResponse(e)
        })?;

        let status = resp.status();
        if status.is_success() {
            tracing::debug!("Backend answered {} for {}", status, resp.url());
            return Ok(resp);
        }

        let url = resp.url().clone();
        let body = resp.text().await.unwrap_or_default();
        let detail = error_detail(&body);
        tracing::error!("Backend error {} for {}: {:?}", status, url, detail);
        Err(ApiError::Server { status, detail })
    }

    pub(crate) async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ApiError> {
        let url = self.endpoint(path)?;
        tracing::info!("GET {}", url);
        let resp = self.send(self.client.get(url).query(query)).await?;
        resp.json().await.map_err(ApiError::Decode)
    }

    pub(crate) async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let url = self.endpoint(path)?;
        tracing::info!("POST {}", url);
        let resp = self
            .send(self.client.post(url).header(CONTENT_TYPE, "application/json").json(body))
            .await?;
        resp.json().await.map_err(ApiError::Decode)
    }

    async fn post_bytes<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<Vec<u8>, ApiError> {
        let url = self.endpoint(path)?;
        tracing::info!("POST {}", url);
        let resp = self.send(self.client.post(url).json(body)).await?;
        let bytes = resp.bytes().await.map_err(ApiError::Decode)?;
        Ok(bytes.to_vec())
    }

    pub(crate) async fn post_form<T: DeserializeOwned>(
        &self,
        path: &str,
        form: &[(&str, &str)],
    ) -> Result<T, ApiError> {
        let url = self.endpoint(path)?;
        tracing::info!("POST {} (form)", url);
        let resp = self.send(self.client.post(url).form(form)).await?;
        resp.json().await.map_err(ApiError::Decode)
    }

    /// `true` when `/health` answers with a success status. Never fails.
    pub async fn health(&self) -> bool {
        match self.get_json::<Value>("/health", &[]).await {
            Ok(body) => {
                tracing::info!("Backend is healthy: {}", body);
                true
            }
            Err(e) => {
                tracing::warn!("Backend is not accessible: {}", e);
                false
            }
        }
    }

    pub async fn api_info(&self) -> Result<Value, ApiError> {
        self.get_json("/", &[]).await
    }

    pub async fn search(&self, request: &SearchRequest) -> Result<SearchResponse, ApiError> {
        self.post_json("/api/literature/search", request).await
    }

    /// Searches every source at once with optional filters.
    pub async fn search_all(
        &self,
        keyword: &str,
        limit: u32,
        filters: Option<&SearchFilters>,
    ) -> Result<SearchResponse, ApiError> {
        let body = json!({ "keyword": keyword, "limit": limit, "filters": filters });
        self.post_json("/api/literature/search-all", &body).await
    }

    /// Runs one search per keyword concurrently. Failures are reported per keyword.
    pub async fn batch_search(&self, keywords: &[String], limit: u32, source: &str) -> Vec<BatchOutcome> {
        let requests: Vec<SearchRequest> = keywords
            .iter()
            .map(|k| SearchRequest {
                limit,
                source: source.to_string(),
                ..SearchRequest::new(k.clone())
            })
            .collect();

        let results = join_all(requests.iter().map(|r| self.search(r))).await;

        keywords
            .iter()
            .cloned()
            .zip(results)
            .map(|(keyword, result)| {
                if let Err(e) = &result {
                    tracing::warn!("Batch search for \"{}\" failed: {}", keyword, e);
                }
                BatchOutcome { keyword, result }
            })
            .collect()
    }

    pub async fn literature_by_doi(&self, doi: &str) -> Result<RawPaper, ApiError> {
        let path = format!("/api/literature/doi/{}", urlencoding::encode(doi));
        self.get_json(&path, &[]).await
    }

    pub async fn paper_by_arxiv(&self, arxiv_id: &str) -> Result<RawPaper, ApiError> {
        let path = format!("/api/literature/arxiv/{}", urlencoding::encode(arxiv_id));
        self.get_json(&path, &[]).await
    }

    pub async fn work_by_openalex(&self, openalex_id: &str) -> Result<RawPaper, ApiError> {
        let path = format!("/api/literature/openalex/{}", urlencoding::encode(openalex_id));
        self.get_json(&path, &[]).await
    }

    pub async fn format_reference(&self, literature: &Value, format: &str) -> Result<FormattedReference, ApiError> {
        self.post_json("/api/literature/format-reference", &ReferenceRequest { literature, format })
            .await
    }

    pub async fn export_bibtex<T: Serialize>(&self, refs: &[T]) -> Result<Vec<u8>, ApiError> {
        self.post_bytes("/api/literature/export-bibtex", refs).await
    }

    pub async fn export_ris<T: Serialize>(&self, refs: &[T]) -> Result<Vec<u8>, ApiError> {
        self.post_bytes("/api/literature/export-ris", refs).await
    }

    pub async fn check_plagiarism(&self, text: &str, check_ai: bool) -> Result<Value, ApiError> {
        let body = json!({ "text": text, "check_ai": check_ai });
        self.post_json("/api/plagiarism/check", &body).await
    }

    pub async fn search_history(&self, limit: u32) -> Result<Value, ApiError> {
        self.get_json("/api/history/", &[("limit", limit.to_string())]).await
    }

    pub async fn trending_keywords(&self, days: u32, top_k: u32) -> Result<Value, ApiError> {
        self.get_json(
            "/api/history/trending",
            &[("days", days.to_string()), ("top_k", top_k.to_string())],
        )
        .await
    }

    pub async fn personalized_recommendations(&self, limit: u32) -> Result<Value, ApiError> {
        self.get_json("/api/recommendations/personalized", &[("limit", limit.to_string())])
            .await
    }

    pub async fn recommendations_by_interest(&self, interest: &str, limit: u32) -> Result<Value, ApiError> {
        let path = format!("/api/recommendations/by-interest/{}", urlencoding::encode(interest));
        self.get_json(&path, &[("limit", limit.to_string())]).await
    }

    pub async fn recommendations_health(&self) -> Value {
        self.get_json("/api/recommendations/health", &[])
            .await
            .unwrap_or_else(|e| {
                tracing::warn!("Recommendations health check failed: {}", e);
                json!({ "status": "unhealthy" })
            })
    }

    pub async fn citation_graph(&self, doi: &str, max_nodes: u32) -> Result<Value, ApiError> {
        let path = format!("/api/knowledge/citation-graph/{}", urlencoding::encode(doi));
        self.get_json(&path, &[("max_nodes", max_nodes.to_string())]).await
    }

    pub async fn author_network(&self, author_id: &str, limit: u32) -> Result<Value, ApiError> {
        let path = format!("/api/knowledge/author-network/{}", urlencoding::encode(author_id));
        self.get_json(&path, &[("limit", limit.to_string())]).await
    }

    pub async fn topic_evolution(&self, keyword: &str, years: u32) -> Result<Value, ApiError> {
        self.get_json(
            "/api/knowledge/topic-evolution",
            &[("keyword", keyword.to_string()), ("years", years.to_string())],
        )
        .await
    }
}
