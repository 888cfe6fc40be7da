use once_cell::sync::Lazy;
use regex::Regex;

use crate::layers::{Paper, RawPaper};

static YEAR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d{4})").expect("valid year regex"));

const UNTITLED: &str = "Untitled";
pub const NO_ABSTRACT: &str = "No abstract available.";
const NO_YEAR: &str = "N/A";
const DEFAULT_CATEGORY: &str = "Research Paper";

/// Images used when no topic-specific list is available.
pub const FALLBACK_IMAGES: [&str; 3] = [
    "/images/note1.jpg",
    "/images/note2.jpg",
    "/images/note3.jpg",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    Ai,
    Economics,
    Biology,
    Physics,
    Environment,
    Medicine,
}

impl Topic {
    pub fn key(&self) -> &'static str {
        match self {
            Topic::Ai => "ai",
            Topic::Economics => "economics",
            Topic::Biology => "biology",
            Topic::Physics => "physics",
            Topic::Environment => "environment",
            Topic::Medicine => "medicine",
        }
    }
}

/// Picks the image topic for a search keyword. Falls back to AI.
pub fn detect_topic(keyword: &str) -> Topic {
    let kw = keyword.to_lowercase();

    if kw.contains("bio") {
        Topic::Biology
    } else if kw.contains("med") || kw.contains("health") {
        Topic::Medicine
    } else if kw.contains("eco") {
        Topic::Economics
    } else if kw.contains("phys") {
        Topic::Physics
    } else if kw.contains("env") || kw.contains("climate") || kw.contains("green") {
        Topic::Environment
    } else {
        Topic::Ai
    }
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}

pub fn extract_year(published_date: Option<&str>) -> Option<&str> {
    let date = published_date?;
    YEAR_RE.captures(date).and_then(|c| c.get(1)).map(|m| m.as_str())
}

pub fn citation_text(source: Option<&str>, citation_count: Option<u64>) -> String {
    // arXiv has no reliable citation feed, so its counts are never shown.
    if source == Some("arxiv") {
        return "Preprint (no citation data)".to_string();
    }
    match citation_count {
        Some(count) => format!("{} citations", count),
        None => "Citation data unavailable".to_string(),
    }
}

/// Builds the display record for the `index`-th hit of a response. Never fails;
/// missing fields degrade to fixed fallbacks.
pub fn normalize_paper<S: AsRef<str>>(raw: &RawPaper, index: usize, images: &[S]) -> Paper {
    let source = present(&raw.source);
    let doi = present(&raw.doi);
    let url = present(&raw.url);

    let year = extract_year(present(&raw.published_date)).unwrap_or(NO_YEAR);
    let citations = citation_text(source, raw.citation_count);

    let authors = raw
        .authors
        .as_ref()
        .map(|list| list.iter().filter_map(|a| a.name()).map(str::to_string).collect())
        .unwrap_or_default();

    let id = doi
        .or(url)
        .map(str::to_string)
        .unwrap_or_else(|| format!("paper-{}", index));

    let image = if images.is_empty() {
        None
    } else {
        Some(images[index % images.len()].as_ref().to_string())
    };

    Paper {
        id,
        title: present(&raw.title).unwrap_or(UNTITLED).to_string(),
        description: present(&raw.abstract_text).unwrap_or(NO_ABSTRACT).to_string(),
        image,
        category: present(&raw.journal)
            .or(source)
            .unwrap_or(DEFAULT_CATEGORY)
            .to_string(),
        metadata: format!("{} • {}", citations, year),
        authors,
        doi: doi.map(str::to_string),
        url: url.map(str::to_string),
        source: source.map(str::to_string),
        citation_count: raw.citation_count,
    }
}

pub fn normalize_all<S: AsRef<str>>(raws: &[RawPaper], images: &[S]) -> Vec<Paper> {
    raws.iter()
        .enumerate()
        .map(|(i, raw)| normalize_paper(raw, i, images))
        .collect()
}
