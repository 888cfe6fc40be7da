use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::layers::Paper;

static PUNCT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s]").expect("valid punctuation regex"));

/// Lowercases, turns punctuation into word breaks and collapses whitespace.
pub fn normalize_title(title: &str) -> String {
    let lowered = title.to_lowercase();
    let spaced = PUNCT_RE.replace_all(&lowered, " ");
    spaced.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Drops every paper whose DOI or normalized title was already seen.
/// First occurrence wins and nothing is merged.
pub fn deduplicate_papers(papers: Vec<Paper>) -> Vec<Paper> {
    let input_len = papers.len();
    let mut unique = Vec::with_capacity(input_len);
    let mut seen_dois: HashSet<String> = HashSet::new();
    let mut seen_titles: HashSet<String> = HashSet::new();

    for paper in papers {
        if let Some(doi) = paper.doi.as_deref().filter(|d| !d.is_empty()) {
            if !seen_dois.insert(doi.to_string()) {
                tracing::debug!("Skipping duplicate DOI: {}", doi);
                continue;
            }
        }

        // The DOI stays claimed even if the title check below drops the record.
        if !seen_titles.insert(normalize_title(&paper.title)) {
            tracing::debug!(
                "Skipping duplicate title: \"{}\"",
                paper.title.chars().take(50).collect::<String>()
            );
            continue;
        }

        unique.push(paper);
    }

    tracing::info!("Deduplicated {} -> {} unique papers", input_len, unique.len());
    unique
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paper(doi: Option<&str>, title: &str) -> Paper {
        Paper {
            id: doi.unwrap_or(title).to_string(),
            title: title.to_string(),
            description: String::new(),
            image: None,
            category: "Research Paper".to_string(),
            metadata: String::new(),
            authors: vec![],
            doi: doi.map(str::to_string),
            url: None,
            source: None,
            citation_count: None,
        }
    }

    #[test]
    fn test_normalize_title_ignores_case_and_punctuation() {
        assert_eq!(normalize_title("Deep-Learning!!"), normalize_title("deep learning"));
        assert_eq!(normalize_title("  Graph  Neural Nets. "), "graph neural nets");
        assert_eq!(normalize_title("snake_case stays"), "snake_case stays");
    }

    #[test]
    fn test_doi_and_title_collisions() {
        let input = vec![
            paper(Some("10.1/a"), "X"),
            paper(Some("10.1/a"), "Y"),
            paper(None, "x"),
        ];
        let out = deduplicate_papers(input);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].title, "X");
        assert_eq!(out[0].doi.as_deref(), Some("10.1/a"));
    }

    #[test]
    fn test_title_drop_still_claims_doi() {
        let input = vec![
            paper(Some("10.1/a"), "Same"),
            paper(Some("10.1/b"), "same!"),
            paper(Some("10.1/b"), "Different"),
        ];
        let out = deduplicate_papers(input);
        let titles: Vec<_> = out.iter().map(|p| p.title.as_str()).collect();
        assert_eq!(titles, vec!["Same"]);
    }

    #[test]
    fn test_preserves_first_seen_order() {
        let input = vec![
            paper(None, "B"),
            paper(Some("10.2/z"), "A"),
            paper(None, "b"),
            paper(None, "C"),
        ];
        let out = deduplicate_papers(input.clone());
        assert!(out.len() <= input.len());
        let titles: Vec<_> = out.iter().map(|p| p.title.as_str()).collect();
        assert_eq!(titles, vec!["B", "A", "C"]);
    }

    #[test]
    fn test_idempotent_on_self_concatenation() {
        let input = vec![
            paper(Some("10.1/a"), "One"),
            paper(Some("10.1/b"), "Two"),
            paper(Some("10.1/a"), "Three"),
        ];
        let once = deduplicate_papers(input);
        let mut doubled = once.clone();
        doubled.extend(once.clone());
        assert_eq!(deduplicate_papers(doubled), once);
        assert_eq!(deduplicate_papers(once.clone()), once);
    }
}
