use anyhow::Result;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::layers::normalize::NO_ABSTRACT;
use crate::layers::storage::{LocalStorage, COLLECTIONS_KEY};
use crate::layers::subjects::{next_id, SubjectTree};
use crate::layers::Paper;

/// A paper saved into one group. The same paper may appear once per group.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CollectionItem {
    pub id: i64,
    pub paper_id: String,
    pub title: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default, rename = "abstract")]
    pub abstract_text: String,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub citation_count: u64,
    pub subject_id: i64,
    pub group_id: i64,
}

impl CollectionItem {
    fn matches(&self, key: &str) -> bool {
        self.paper_id == key || self.id.to_string() == key
    }
}

/// What to do when the paper already sits in another group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrossGroup {
    Ask,
    Allow,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AddOutcome {
    Added(CollectionItem),
    MissingTarget,
    AlreadyInGroup,
    NeedsConfirmation {
        existing_group_id: i64,
        existing_group_name: Option<String>,
    },
}

/// Local item ID or natural paper ID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemKey {
    Local(i64),
    Paper(String),
}

impl ItemKey {
    /// Numeric input is read as a local item ID, anything else as a paper ID.
    /// A numeric key still matches an item whose paper ID is that number.
    pub fn parse(input: &str) -> Self {
        match input.parse::<i64>() {
            Ok(id) => ItemKey::Local(id),
            Err(_) => ItemKey::Paper(input.to_string()),
        }
    }

    fn matches(&self, item: &CollectionItem) -> bool {
        match self {
            ItemKey::Local(id) => item.id == *id || item.paper_id == id.to_string(),
            ItemKey::Paper(pid) => item.paper_id == *pid,
        }
    }
}

/// Stable key of a paper inside collections: DOI, then display ID, then a
/// slug built from source and title.
pub fn paper_key(paper: &Paper) -> String {
    if let Some(doi) = paper.doi.as_deref().filter(|d| !d.is_empty()) {
        return doi.to_string();
    }
    if !paper.id.is_empty() {
        return paper.id.clone();
    }
    let slug: String = paper
        .title
        .chars()
        .take(50)
        .map(|c| if c.is_whitespace() { '-' } else { c })
        .collect();
    format!("{}-{}", paper.source.as_deref().unwrap_or("undefined"), slug)
}

pub struct CollectionStore {
    storage: LocalStorage,
    items: Vec<CollectionItem>,
}

impl CollectionStore {
    pub fn open(storage: LocalStorage) -> Result<Self> {
        let items: Vec<CollectionItem> = storage.get_json(COLLECTIONS_KEY)?.unwrap_or_default();
        Ok(Self { storage, items })
    }

    pub fn items(&self) -> &[CollectionItem] {
        &self.items
    }

    /// Replaces the in-memory view with what is stored now.
    pub fn fetch(&mut self) -> Result<()> {
        self.items = self.storage.get_json(COLLECTIONS_KEY)?.unwrap_or_default();
        Ok(())
    }

    fn save(&mut self, items: Vec<CollectionItem>) -> Result<()> {
        self.storage.set_json(COLLECTIONS_KEY, &items)?;
        self.items = items;
        Ok(())
    }

    fn group_name(&self, group_id: i64) -> Result<Option<String>> {
        let tree = SubjectTree::load(self.storage.clone())?;
        Ok(tree.group_name(group_id).map(str::to_string))
    }

    pub fn add_to_collection(
        &mut self,
        paper: &Paper,
        subject_id: Option<i64>,
        group_id: Option<i64>,
        policy: CrossGroup,
    ) -> Result<AddOutcome> {
        let (Some(subject_id), Some(group_id)) = (subject_id, group_id) else {
            tracing::warn!("Select a subject and group before adding \"{}\"", paper.title);
            return Ok(AddOutcome::MissingTarget);
        };

        let key = paper_key(paper);

        if self.items.iter().any(|c| c.matches(&key) && c.group_id == group_id) {
            tracing::info!("\"{}\" is already in group {}", paper.title, group_id);
            return Ok(AddOutcome::AlreadyInGroup);
        }

        if policy == CrossGroup::Ask {
            if let Some(other) = self.items.iter().find(|c| c.matches(&key) && c.group_id != group_id) {
                let existing_group_id = other.group_id;
                return Ok(AddOutcome::NeedsConfirmation {
                    existing_group_id,
                    existing_group_name: self.group_name(existing_group_id)?,
                });
            }
        }

        let item = CollectionItem {
            id: next_id(self.items.iter().map(|c| c.id).max()),
            paper_id: key,
            title: paper.title.clone(),
            url: paper.url.clone(),
            authors: paper.authors.clone(),
            abstract_text: if paper.description == NO_ABSTRACT {
                String::new()
            } else {
                paper.description.clone()
            },
            source: paper.source.clone(),
            date: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            citation_count: paper.citation_count.unwrap_or(0),
            subject_id,
            group_id,
        };

        let mut updated = self.items.clone();
        updated.push(item.clone());
        self.save(updated)?;
        tracing::info!("Added \"{}\" to group {}", paper.title, group_id);
        Ok(AddOutcome::Added(item))
    }

    /// Removes the first item matching `key`.
    pub fn remove_from_collection(&mut self, key: &ItemKey) -> Result<Option<CollectionItem>> {
        let Some(pos) = self.items.iter().position(|c| key.matches(c)) else {
            return Ok(None);
        };
        let mut updated = self.items.clone();
        let removed = updated.remove(pos);
        self.save(updated)?;
        tracing::info!("Removed \"{}\" from group {}", removed.title, removed.group_id);
        Ok(Some(removed))
    }

    pub fn check_collected(&self, paper_id: &str) -> bool {
        self.items.iter().any(|c| c.matches(paper_id))
    }

    pub fn batch_delete(&mut self, ids: &[i64]) -> Result<usize> {
        let updated: Vec<CollectionItem> = self
            .items
            .iter()
            .filter(|c| !ids.contains(&c.id))
            .cloned()
            .collect();
        let removed = self.items.len() - updated.len();
        self.save(updated)?;
        tracing::info!("Deleted {} papers", removed);
        Ok(removed)
    }
}
