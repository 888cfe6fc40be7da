use serde::{Deserialize, Serialize};

/// A search hit as the backend returns it. Every field may be missing.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct RawPaper {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub authors: Option<Vec<RawAuthor>>,
    #[serde(default, rename = "abstract")]
    pub abstract_text: Option<String>,
    #[serde(default)]
    pub journal: Option<String>,
    #[serde(default)]
    pub published_date: Option<String>,
    #[serde(default)]
    pub doi: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub citation_count: Option<u64>,
    #[serde(default)]
    pub source: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(untagged)]
pub enum RawAuthor {
    Named {
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        affiliation: Option<String>,
    },
    Plain(String),
}

impl RawAuthor {
    pub fn name(&self) -> Option<&str> {
        let name = match self {
            RawAuthor::Named { name, .. } => name.as_deref(),
            RawAuthor::Plain(name) => Some(name.as_str()),
        };
        name.filter(|n| !n.is_empty())
    }
}

/// Uniform display shape of a paper, rebuilt for every search response.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Paper {
    pub id: String,
    pub title: String,
    pub description: String,
    pub image: Option<String>,
    pub category: String,
    pub metadata: String,
    pub authors: Vec<String>,
    pub doi: Option<String>,
    pub url: Option<String>,
    pub source: Option<String>,
    pub citation_count: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SearchResponse {
    #[serde(default)]
    pub total: Option<u64>,
    #[serde(default)]
    pub results: Vec<RawPaper>,
    #[serde(default)]
    pub source: Option<String>,
}

/// Typed filter payload sent with advanced searches. Unset fields are omitted.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct SearchFilters {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year_from: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year_to: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub journal: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keywords: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub citation_min: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub citation_max: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub open_access: Option<bool>,
}

impl SearchFilters {
    pub fn is_empty(&self) -> bool {
        *self == SearchFilters::default()
    }
}

#[derive(Debug, Serialize, Clone)]
pub struct SearchRequest {
    pub keyword: String,
    pub limit: u32,
    pub source: String,
    pub sort_by: String,
    pub filters: Option<SearchFilters>,
}

impl SearchRequest {
    pub fn new(keyword: impl Into<String>) -> Self {
        Self {
            keyword: keyword.into(),
            limit: 10,
            source: "crossref".to_string(),
            sort_by: "relevance".to_string(),
            filters: None,
        }
    }
}

pub mod api;
pub mod auth;
pub mod browse;
pub mod collections;
pub mod dedup;
pub mod export;
pub mod normalize;
pub mod session;
pub mod storage;
pub mod subjects;
