use strsim::levenshtein;

use crate::layers::collections::CollectionItem;

/// Which part of the tree is being looked at. A group view wins over its subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    All,
    Subject(i64),
    Group(i64),
}

pub fn filter_view<'a>(items: &'a [CollectionItem], view: View) -> Vec<&'a CollectionItem> {
    items
        .iter()
        .filter(|item| match view {
            View::All => true,
            View::Subject(id) => item.subject_id == id,
            View::Group(id) => item.group_id == id,
        })
        .collect()
}

/// Case-insensitive substring match on title and author names. Blank text matches all.
pub fn filter_text<'a>(items: Vec<&'a CollectionItem>, text: &str) -> Vec<&'a CollectionItem> {
    let needle = text.trim().to_lowercase();
    if needle.is_empty() {
        return items;
    }
    items
        .into_iter()
        .filter(|item| {
            item.title.to_lowercase().contains(&needle)
                || item.authors.iter().any(|a| a.to_lowercase().contains(&needle))
        })
        .collect()
}

/// Items whose title is within `threshold` edits of `query_title`, closest first.
pub fn find_by_title<'a>(
    items: &'a [CollectionItem],
    query_title: &str,
    threshold: usize,
) -> Vec<(&'a CollectionItem, usize)> {
    let query = query_title.trim().to_lowercase();
    if query.is_empty() {
        return items.iter().map(|p| (p, 0)).collect();
    }

    let mut matches: Vec<_> = items
        .iter()
        .map(|p| {
            let dist = levenshtein(&query, &p.title.to_lowercase());
            tracing::debug!("Candidate: {} (Distance: {})", p.title, dist);
            (p, dist)
        })
        .filter(|(_, dist)| *dist <= threshold)
        .collect();
    matches.sort_by_key(|(_, dist)| *dist);
    matches
}

/// 1-based page cursor over a list of known length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Paginator {
    per_page: usize,
    current: usize,
}

impl Paginator {
    pub fn new(per_page: usize) -> Self {
        Self { per_page: per_page.max(1), current: 1 }
    }

    pub fn current_page(&self) -> usize {
        self.current
    }

    pub fn total_pages(&self, len: usize) -> usize {
        len.div_ceil(self.per_page)
    }

    pub fn set_page(&mut self, page: usize) {
        self.current = page.max(1);
    }

    pub fn reset(&mut self) {
        self.current = 1;
    }

    /// Half-open index range of the current page, clamped to `len`.
    pub fn bounds(&self, len: usize) -> (usize, usize) {
        let last = self.current.saturating_mul(self.per_page).min(len);
        let first = (self.current - 1).saturating_mul(self.per_page).min(last);
        (first, last)
    }

    pub fn page<'a, T>(&self, items: &'a [T]) -> &'a [T] {
        let (first, last) = self.bounds(items.len());
        &items[first..last]
    }
}

impl Default for Paginator {
    fn default() -> Self {
        Self::new(10)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: i64, subject_id: i64, group_id: i64, title: &str, authors: &[&str]) -> CollectionItem {
        CollectionItem {
            id,
            paper_id: format!("p{}", id),
            title: title.to_string(),
            url: None,
            authors: authors.iter().map(|a| a.to_string()).collect(),
            abstract_text: String::new(),
            source: None,
            date: String::new(),
            citation_count: 0,
            subject_id,
            group_id,
        }
    }

    fn sample() -> Vec<CollectionItem> {
        vec![
            item(1, 1, 101, "Attention Is All You Need", &["Vaswani"]),
            item(2, 1, 102, "BERT: Pre-training", &["Devlin"]),
            item(3, 2, 201, "Deep Residual Learning", &["He", "Zhang"]),
        ]
    }

    #[test]
    fn test_view_filters() {
        let items = sample();
        assert_eq!(filter_view(&items, View::All).len(), 3);
        assert_eq!(filter_view(&items, View::Subject(1)).len(), 2);
        let group: Vec<_> = filter_view(&items, View::Group(201)).iter().map(|i| i.id).collect();
        assert_eq!(group, vec![3]);
    }

    #[test]
    fn test_text_filter_checks_titles_and_authors() {
        let items = sample();
        let all = filter_view(&items, View::All);
        assert_eq!(filter_text(all.clone(), "  ").len(), 3);
        let by_title: Vec<_> = filter_text(all.clone(), "bert").iter().map(|i| i.id).collect();
        assert_eq!(by_title, vec![2]);
        let by_author: Vec<_> = filter_text(all, "zhang").iter().map(|i| i.id).collect();
        assert_eq!(by_author, vec![3]);
    }

    #[test]
    fn test_find_by_title_sorts_by_distance() {
        let items = sample();
        let hits = find_by_title(&items, "attention is all you need!", 5);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0.id, 1);
        assert_eq!(hits[0].1, 1);
        assert!(find_by_title(&items, "completely unrelated words", 3).is_empty());
    }

    #[test]
    fn test_paginator_slices_pages() {
        let data: Vec<u32> = (1..=23).collect();
        let mut pager = Paginator::new(10);
        assert_eq!(pager.total_pages(data.len()), 3);
        assert_eq!(pager.page(&data), &data[0..10]);
        pager.set_page(3);
        assert_eq!(pager.page(&data), &[21, 22, 23]);
        pager.set_page(7);
        assert!(pager.page(&data).is_empty());
        pager.reset();
        assert_eq!(pager.current_page(), 1);
        assert_eq!(pager.total_pages(0), 0);
    }

    #[test]
    fn test_paginator_huge_page_is_empty() {
        let mut pager = Paginator::new(usize::MAX);
        pager.set_page(usize::MAX);
        assert!(pager.page(&[1, 2, 3]).is_empty());
        assert_eq!(pager.bounds(3), (3, 3));

        let mut pager = Paginator::new(10);
        pager.set_page(usize::MAX);
        assert!(pager.page(&[1, 2, 3]).is_empty());
    }
}
