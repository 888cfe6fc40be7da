//! Search state for one user: query history, source/sort choice, advanced
//! filters and the current result list.
//!
//! Every search gets a generation number. Only the response for the newest
//! generation is published; answers to superseded searches are dropped.

use std::collections::HashMap;

use crate::layers::api::{ApiError, BackendClient};
use crate::layers::dedup::deduplicate_papers;
use crate::layers::normalize::{detect_topic, normalize_all, Topic, FALLBACK_IMAGES};
use crate::layers::{Paper, SearchFilters, SearchRequest, SearchResponse};

const HISTORY_LIMIT: usize = 10;
const SEARCH_LIMIT: u32 = 50;
pub const NO_RESULTS: &str = "No results found. Try different keywords.";

/// Advanced search form as typed by the user; every field is free text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AdvancedFilters {
    pub author: String,
    pub year_from: String,
    pub year_to: String,
    pub journal: String,
    pub keywords: String,
    pub citation_min: String,
    pub citation_max: String,
    pub open_access: bool,
}

fn text(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

impl AdvancedFilters {
    pub fn has_active_filters(&self) -> bool {
        *self != AdvancedFilters::default()
    }

    /// Typed payload; unparsable numbers are left out. `None` when nothing is set.
    pub fn to_payload(&self) -> Option<SearchFilters> {
        let keywords: Vec<String> = self
            .keywords
            .split(',')
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_string)
            .collect();

        let filters = SearchFilters {
            author: text(&self.author),
            year_from: self.year_from.trim().parse().ok(),
            year_to: self.year_to.trim().parse().ok(),
            journal: text(&self.journal),
            keywords: (!keywords.is_empty()).then_some(keywords),
            citation_min: self.citation_min.trim().parse().ok(),
            citation_max: self.citation_max.trim().parse().ok(),
            open_access: self.open_access.then_some(true),
        };
        (!filters.is_empty()).then_some(filters)
    }
}

#[derive(Debug, Clone)]
pub struct SearchTicket {
    generation: u64,
    pub topic: Topic,
    pub request: SearchRequest,
}

#[derive(Debug)]
pub struct SearchSession {
    pub source: String,
    pub sort_by: String,
    pub filters: AdvancedFilters,
    topic_images: HashMap<Topic, Vec<String>>,
    history: Vec<String>,
    generation: u64,
    papers: Vec<Paper>,
    error: Option<String>,
    performed: bool,
}

impl Default for SearchSession {
    fn default() -> Self {
        Self::new()
    }
}

impl SearchSession {
    pub fn new() -> Self {
        Self {
            source: "all".to_string(),
            sort_by: "relevance".to_string(),
            filters: AdvancedFilters::default(),
            topic_images: HashMap::new(),
            history: Vec::new(),
            generation: 0,
            papers: Vec::new(),
            error: None,
            performed: false,
        }
    }

    pub fn with_topic_images(mut self, topic_images: HashMap<Topic, Vec<String>>) -> Self {
        self.topic_images = topic_images;
        self
    }

    pub fn history(&self) -> &[String] {
        &self.history
    }

    pub fn papers(&self) -> &[Paper] {
        &self.papers
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn search_performed(&self) -> bool {
        self.performed
    }

    pub fn total_results(&self) -> usize {
        self.papers.len()
    }

    fn record_query(&mut self, query: &str) {
        self.history.retain(|q| q != query);
        self.history.insert(0, query.to_string());
        self.history.truncate(HISTORY_LIMIT);
    }

    /// Clears results when the query box is emptied after a search.
    pub fn clear(&mut self) {
        self.papers.clear();
        self.error = None;
        self.performed = false;
    }

    /// Starts a search. Blank queries start nothing.
    pub fn begin(&mut self, query: &str) -> Option<SearchTicket> {
        if query.trim().is_empty() {
            return None;
        }
        self.record_query(query);
        self.generation += 1;
        self.error = None;
        self.performed = true;

        let request = SearchRequest {
            keyword: query.to_string(),
            limit: SEARCH_LIMIT,
            source: self.source.clone(),
            sort_by: self.sort_by.clone(),
            filters: self.filters.to_payload(),
        };
        let topic = detect_topic(query);
        tracing::info!("Searching \"{}\" (topic {}, generation {})", query, topic.key(), self.generation);
        Some(SearchTicket { generation: self.generation, topic, request })
    }

    fn images_for(&self, topic: Topic) -> Vec<String> {
        self.topic_images
            .get(&topic)
            .or_else(|| self.topic_images.get(&Topic::Ai))
            .filter(|list| !list.is_empty())
            .cloned()
            .unwrap_or_else(|| FALLBACK_IMAGES.iter().map(|s| s.to_string()).collect())
    }

    /// Publishes the outcome of `ticket`. Returns `false` and changes nothing when
    /// a newer search has started since.
    pub fn complete(&mut self, ticket: &SearchTicket, outcome: Result<SearchResponse, ApiError>) -> bool {
        if ticket.generation != self.generation {
            tracing::debug!(
                "Dropping stale response for generation {} (current {})",
                ticket.generation,
                self.generation
            );
            return false;
        }

        match outcome {
            Ok(resp) => {
                tracing::info!("Backend returned {} results", resp.results.len());
                let images = self.images_for(ticket.topic);
                let papers = deduplicate_papers(normalize_all(&resp.results, &images));
                self.error = papers.is_empty().then(|| NO_RESULTS.to_string());
                self.papers = papers;
            }
            Err(e) => {
                tracing::error!("Search failed: {}", e);
                self.error = Some(e.user_message());
                self.papers.clear();
            }
        }
        true
    }

    pub async fn run(&mut self, client: &BackendClient, query: &str) -> Option<&[Paper]> {
        let ticket = self.begin(query)?;
        let outcome = client.search(&ticket.request).await;
        self.complete(&ticket, outcome);
        Some(self.papers())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::RawPaper;
    use reqwest::StatusCode;

    fn response(titles: &[&str]) -> SearchResponse {
        SearchResponse {
            total: Some(titles.len() as u64),
            source: Some("crossref".to_string()),
            results: titles
                .iter()
                .map(|t| RawPaper {
                    title: Some(t.to_string()),
                    source: Some("crossref".to_string()),
                    ..Default::default()
                })
                .collect(),
        }
    }

    #[test]
    fn test_default_matches_new() {
        let session = SearchSession::default();
        assert_eq!(session.source, "all");
        assert_eq!(session.sort_by, "relevance");
        assert!(!session.filters.has_active_filters());
        assert!(!session.search_performed());
    }

    #[test]
    fn test_history_is_unique_and_capped() {
        let mut session = SearchSession::new();
        for i in 0..12 {
            session.begin(&format!("q{}", i));
        }
        session.begin("q5");
        assert_eq!(session.history().len(), HISTORY_LIMIT);
        assert_eq!(session.history()[0], "q5");
        assert_eq!(session.history().iter().filter(|q| *q == "q5").count(), 1);
        assert!(session.begin("   ").is_none());
    }

    #[test]
    fn test_stale_response_is_dropped() {
        let mut session = SearchSession::new();
        let first = session.begin("graphs").unwrap();
        let second = session.begin("graph neural networks").unwrap();

        assert!(session.complete(&second, Ok(response(&["GNN", "gnn!"]))));
        assert!(!session.complete(&first, Ok(response(&["Old"]))));

        let titles: Vec<_> = session.papers().iter().map(|p| p.title.as_str()).collect();
        assert_eq!(titles, vec!["GNN"]);
    }

    #[test]
    fn test_empty_and_failed_results_set_error() {
        let mut session = SearchSession::new();
        let ticket = session.begin("nothing").unwrap();
        session.complete(&ticket, Ok(response(&[])));
        assert_eq!(session.error(), Some(NO_RESULTS));

        let ticket = session.begin("boom").unwrap();
        let err = ApiError::Server {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            detail: Some("search backend down".to_string()),
        };
        session.complete(&ticket, Err(err));
        assert_eq!(session.error(), Some("search backend down"));
        assert_eq!(session.total_results(), 0);
    }

    #[test]
    fn test_topic_images_are_used() {
        let mut images = HashMap::new();
        images.insert(Topic::Biology, vec!["cell.jpg".to_string()]);
        let mut session = SearchSession::new().with_topic_images(images);
        let ticket = session.begin("bioinformatics").unwrap();
        assert_eq!(ticket.topic, Topic::Biology);
        session.complete(&ticket, Ok(response(&["A", "B"])));
        assert!(session.papers().iter().all(|p| p.image.as_deref() == Some("cell.jpg")));

        let ticket = session.begin("transformers").unwrap();
        session.complete(&ticket, Ok(response(&["C"])));
        assert_eq!(session.papers()[0].image.as_deref(), Some("/images/note1.jpg"));
    }

    #[test]
    fn test_filters_payload() {
        let mut filters = AdvancedFilters::default();
        assert!(!filters.has_active_filters());
        assert!(filters.to_payload().is_none());

        filters.keywords = " nlp, ,vision ".to_string();
        filters.year_from = "2019".to_string();
        filters.citation_min = "many".to_string();
        filters.open_access = true;
        assert!(filters.has_active_filters());

        let payload = filters.to_payload().unwrap();
        assert_eq!(payload.keywords, Some(vec!["nlp".to_string(), "vision".to_string()]));
        assert_eq!(payload.year_from, Some(2019));
        assert_eq!(payload.citation_min, None);
        assert_eq!(payload.open_access, Some(true));

        let json = serde_json::to_value(&payload).unwrap();
        assert!(json.get("author").is_none());
    }

    #[test]
    fn test_request_carries_session_choices() {
        let mut session = SearchSession::new();
        session.source = "arxiv".to_string();
        session.sort_by = "citations".to_string();
        let ticket = session.begin("diffusion").unwrap();
        assert_eq!(ticket.request.source, "arxiv");
        assert_eq!(ticket.request.sort_by, "citations");
        assert_eq!(ticket.request.limit, 50);
        assert!(ticket.request.filters.is_none());
        session.clear();
        assert!(!session.search_performed());
    }
}
