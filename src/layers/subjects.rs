//! Subject → Group folder tree.
//!
//! # Invariants
//! - Subject IDs are unique; group IDs are unique within a subject.
//! - Names are stored trimmed and never blank.
//! - Papers are not stored in the tree; they point at it via `group_id`.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::layers::storage::{LocalStorage, SUBJECTS_KEY};

pub const DEFAULT_SUBJECT_ID: i64 = 1;
pub const DEFAULT_GROUP_ID: i64 = 101;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Group {
    pub id: i64,
    pub name: String,
    #[serde(rename = "type", default = "group_kind")]
    pub kind: String,
    /// Carried through untouched for compatibility with older blobs.
    #[serde(default)]
    pub items: Vec<serde_json::Value>,
}

fn group_kind() -> String {
    "group".to_string()
}

impl Group {
    fn new(id: i64, name: &str) -> Self {
        Self { id, name: name.to_string(), kind: group_kind(), items: Vec::new() }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Subject {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub expanded: bool,
    #[serde(default)]
    pub items: Vec<Group>,
}

fn default_tree() -> Vec<Subject> {
    vec![Subject {
        id: DEFAULT_SUBJECT_ID,
        name: "Default Subject".to_string(),
        expanded: true,
        items: vec![Group::new(DEFAULT_GROUP_ID, "My Papers")],
    }]
}

/// Millisecond timestamp, bumped past `floor` so IDs stay unique on fast callers.
pub(crate) fn next_id(floor: Option<i64>) -> i64 {
    let now = chrono::Utc::now().timestamp_millis();
    match floor {
        Some(max) if max >= now => max + 1,
        _ => now,
    }
}

fn clean_name(name: &str) -> Option<&str> {
    let trimmed = name.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

pub struct SubjectTree {
    storage: LocalStorage,
    subjects: Vec<Subject>,
}

impl SubjectTree {
    /// Loads the stored tree. Nothing stored yields the default tree; a stored
    /// blob that fails to parse yields an empty forest.
    pub fn load(storage: LocalStorage) -> Result<Self> {
        let subjects = match storage.get_raw(SUBJECTS_KEY)? {
            None => default_tree(),
            Some(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                tracing::warn!("Stored subjects are unreadable, starting empty: {}", e);
                Vec::new()
            }),
        };
        Ok(Self { storage, subjects })
    }

    pub fn subjects(&self) -> &[Subject] {
        &self.subjects
    }

    pub fn subject(&self, subject_id: i64) -> Option<&Subject> {
        self.subjects.iter().find(|s| s.id == subject_id)
    }

    pub fn group_name(&self, group_id: i64) -> Option<&str> {
        self.subjects
            .iter()
            .flat_map(|s| s.items.iter())
            .find(|g| g.id == group_id)
            .map(|g| g.name.as_str())
    }

    /// Subject that owns `group_id`, if any.
    pub fn subject_of_group(&self, group_id: i64) -> Option<i64> {
        self.subjects
            .iter()
            .find(|s| s.items.iter().any(|g| g.id == group_id))
            .map(|s| s.id)
    }

    fn max_id(&self) -> Option<i64> {
        self.subjects
            .iter()
            .flat_map(|s| std::iter::once(s.id).chain(s.items.iter().map(|g| g.id)))
            .max()
    }

    fn save(&self) -> Result<()> {
        self.storage.set_json(SUBJECTS_KEY, &self.subjects)
    }

    pub fn reload(&mut self) -> Result<()> {
        let fresh = Self::load(self.storage.clone())?;
        self.subjects = fresh.subjects;
        Ok(())
    }

    pub fn add_subject(&mut self, name: &str) -> Result<Option<i64>> {
        let Some(name) = clean_name(name) else {
            return Ok(None);
        };
        let id = next_id(self.max_id());
        self.subjects.push(Subject {
            id,
            name: name.to_string(),
            expanded: true,
            items: Vec::new(),
        });
        self.save()?;
        tracing::info!("Added subject {} ({})", name, id);
        Ok(Some(id))
    }

    /// Adds a group under `subject_id` and expands the subject. `None` when the
    /// subject is unknown or the name is blank.
    pub fn add_group(&mut self, subject_id: i64, name: &str) -> Result<Option<i64>> {
        let Some(name) = clean_name(name) else {
            return Ok(None);
        };
        let id = next_id(self.max_id());
        let Some(subject) = self.subjects.iter_mut().find(|s| s.id == subject_id) else {
            return Ok(None);
        };
        subject.expanded = true;
        subject.items.push(Group::new(id, name));
        self.save()?;
        tracing::info!("Added group {} ({}) to subject {}", name, id, subject_id);
        Ok(Some(id))
    }

    pub fn rename_subject(&mut self, subject_id: i64, name: &str) -> Result<bool> {
        let Some(name) = clean_name(name) else {
            return Ok(false);
        };
        let Some(subject) = self.subjects.iter_mut().find(|s| s.id == subject_id) else {
            return Ok(false);
        };
        subject.name = name.to_string();
        self.save()?;
        Ok(true)
    }

    pub fn rename_group(&mut self, subject_id: i64, group_id: i64, name: &str) -> Result<bool> {
        let Some(name) = clean_name(name) else {
            return Ok(false);
        };
        let group = self
            .subjects
            .iter_mut()
            .find(|s| s.id == subject_id)
            .and_then(|s| s.items.iter_mut().find(|g| g.id == group_id));
        let Some(group) = group else {
            return Ok(false);
        };
        group.name = name.to_string();
        self.save()?;
        Ok(true)
    }

    pub fn toggle_subject(&mut self, subject_id: i64) -> Result<Option<bool>> {
        let Some(subject) = self.subjects.iter_mut().find(|s| s.id == subject_id) else {
            return Ok(None);
        };
        subject.expanded = !subject.expanded;
        let expanded = subject.expanded;
        self.save()?;
        Ok(Some(expanded))
    }

    pub fn delete_subject(&mut self, subject_id: i64) -> Result<bool> {
        let before = self.subjects.len();
        self.subjects.retain(|s| s.id != subject_id);
        if self.subjects.len() == before {
            return Ok(false);
        }
        self.save()?;
        Ok(true)
    }

    pub fn delete_group(&mut self, subject_id: i64, group_id: i64) -> Result<bool> {
        let Some(subject) = self.subjects.iter_mut().find(|s| s.id == subject_id) else {
            return Ok(false);
        };
        let before = subject.items.len();
        subject.items.retain(|g| g.id != group_id);
        if subject.items.len() == before {
            return Ok(false);
        }
        self.save()?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn tree() -> (TempDir, SubjectTree) {
        let dir = TempDir::new().unwrap();
        let storage = LocalStorage::open(dir.path()).unwrap();
        let tree = SubjectTree::load(storage).unwrap();
        (dir, tree)
    }

    #[test]
    fn test_default_tree_when_nothing_stored() {
        let (_dir, tree) = tree();
        assert_eq!(tree.subjects().len(), 1);
        assert_eq!(tree.group_name(DEFAULT_GROUP_ID), Some("My Papers"));
        assert_eq!(tree.subject_of_group(DEFAULT_GROUP_ID), Some(DEFAULT_SUBJECT_ID));
    }

    #[test]
    fn test_unreadable_tree_loads_empty() {
        let dir = TempDir::new().unwrap();
        let storage = LocalStorage::open(dir.path()).unwrap();
        storage.set_raw(SUBJECTS_KEY, "[{oops").unwrap();
        let tree = SubjectTree::load(storage).unwrap();
        assert!(tree.subjects().is_empty());
    }

    #[test]
    fn test_add_rename_and_delete_persist() {
        let (dir, mut tree) = tree();
        let subject = tree.add_subject("  Thesis ").unwrap().unwrap();
        tree.toggle_subject(subject).unwrap();
        let group = tree.add_group(subject, "Related work").unwrap().unwrap();
        let second = tree.add_group(subject, "Methods").unwrap().unwrap();
        assert_ne!(group, second);
        assert!(tree.subject(subject).unwrap().expanded);

        assert!(tree.rename_group(subject, group, "Background").unwrap());
        assert!(!tree.rename_group(subject, group, "   ").unwrap());
        assert!(tree.rename_subject(subject, "PhD").unwrap());
        assert!(tree.delete_group(subject, second).unwrap());
        assert!(!tree.delete_group(subject, second).unwrap());

        let reopened = SubjectTree::load(LocalStorage::open(dir.path()).unwrap()).unwrap();
        let stored = reopened.subject(subject).unwrap();
        assert_eq!(stored.name, "PhD");
        assert_eq!(stored.items.len(), 1);
        assert_eq!(reopened.group_name(group), Some("Background"));
    }

    #[test]
    fn test_unknown_targets_are_no_ops() {
        let (_dir, mut tree) = tree();
        assert_eq!(tree.add_group(42, "Nope").unwrap(), None);
        assert_eq!(tree.add_subject("").unwrap(), None);
        assert_eq!(tree.toggle_subject(42).unwrap(), None);
        assert!(!tree.delete_subject(42).unwrap());
        assert!(tree.delete_subject(DEFAULT_SUBJECT_ID).unwrap());
        assert!(tree.subjects().is_empty());
    }

    #[test]
    fn test_stored_shape_keeps_group_type() {
        let (dir, tree) = tree();
        drop(tree);
        let mut tree = SubjectTree::load(LocalStorage::open(dir.path()).unwrap()).unwrap();
        tree.toggle_subject(DEFAULT_SUBJECT_ID).unwrap();
        let raw = std::fs::read_to_string(dir.path().join("subjects.json")).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value[0]["items"][0]["type"], "group");
        assert_eq!(value[0]["expanded"], false);
    }
}
