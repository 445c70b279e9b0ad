pub mod metadata;
pub mod scanner;

use serde::{Deserialize, Serialize};

pub use metadata::FileMetadata;

/// A change to one vault file, with vault-relative paths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IndexEvent {
    Created { path: String },
    Modified { path: String },
    Deleted { path: String },
    Renamed { from: String, to: String },
}

impl IndexEvent {
    pub fn created(path: impl Into<String>) -> Self {
        IndexEvent::Created { path: metadata::normalize_path(&path.into()) }
    }

    pub fn modified(path: impl Into<String>) -> Self {
        IndexEvent::Modified { path: metadata::normalize_path(&path.into()) }
    }

    pub fn deleted(path: impl Into<String>) -> Self {
        IndexEvent::Deleted { path: metadata::normalize_path(&path.into()) }
    }

    pub fn renamed(from: impl Into<String>, to: impl Into<String>) -> Self {
        IndexEvent::Renamed {
            from: metadata::normalize_path(&from.into()),
            to: metadata::normalize_path(&to.into()),
        }
    }

    /// Path whose current content must be read to apply the event.
    pub fn target_path(&self) -> Option<&str> {
        match self {
            IndexEvent::Created { path } | IndexEvent::Modified { path } => Some(path),
            IndexEvent::Renamed { to, .. } => Some(to),
            IndexEvent::Deleted { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexChange {
    Added,
    Updated,
    Unchanged,
    Removed,
    Renamed,
    Ignored,
}

impl IndexChange {
    pub fn is_mutation(&self) -> bool {
        !matches!(self, IndexChange::Unchanged | IndexChange::Ignored)
    }
}

/// An in-memory index kept in step with vault file events.
///
/// `upsert` must return `Unchanged` without touching state when the stored
/// record for the path has the same content hash.
pub trait Indexer {
    fn accepts(&self, path: &str) -> bool;
    fn contains_path(&self, path: &str) -> bool;
    fn upsert(&mut self, meta: FileMetadata) -> IndexChange;
    fn remove(&mut self, path: &str) -> IndexChange;
    fn clear(&mut self);
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Hold back derived data until `finish_bulk_load`; used by full scans.
    fn begin_bulk_load(&mut self) {}

    fn finish_bulk_load(&mut self) {}

    /// Default: drop the old record and index the new one.
    fn rename(&mut self, from: &str, meta: FileMetadata) -> IndexChange {
        if !self.contains_path(from) {
            return self.upsert(meta);
        }
        if !self.accepts(&meta.path) {
            return self.remove(from);
        }
        self.remove(from);
        match self.upsert(meta) {
            IndexChange::Ignored => IndexChange::Removed,
            _ => IndexChange::Renamed,
        }
    }
}

/// Apply an event to one indexer. `meta` is the parsed target file for
/// created/modified/renamed events.
pub fn apply_event<I: Indexer + ?Sized>(
    indexer: &mut I,
    event: &IndexEvent,
    meta: Option<FileMetadata>,
) -> IndexChange {
    match (event, meta) {
        (IndexEvent::Deleted { path }, _) => indexer.remove(path),
        (IndexEvent::Renamed { from, .. }, Some(meta)) => indexer.rename(from, meta),
        (IndexEvent::Renamed { from, .. }, None) => indexer.remove(from),
        (_, Some(meta)) => {
            if indexer.accepts(&meta.path) {
                indexer.upsert(meta)
            } else {
                IndexChange::Ignored
            }
        }
        (_, None) => IndexChange::Ignored,
    }
}

/// Is `path` inside any of `folders` (vault-relative)? An empty folder is the vault root.
pub fn in_folders(path: &str, folders: &[String]) -> bool {
    folders.iter().any(|folder| folder_contains(folder, path))
}

pub fn folder_contains(folder: &str, path: &str) -> bool {
    let folder = folder.trim_matches('/');
    folder.is_empty()
        || path
            .strip_prefix(folder)
            .map(|rest| rest.starts_with('/'))
            .unwrap_or(false)
}

/// `base`, or `base-2`, `base-3`... for the first candidate not held by someone else.
pub fn dedupe_id(base: &str, taken_by_other: impl Fn(&str) -> bool) -> String {
    if !taken_by_other(base) {
        return base.to_string();
    }
    let mut n = 2;
    loop {
        let candidate = format!("{}-{}", base, n);
        if !taken_by_other(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    /// Minimal indexer over a folder, to exercise the trait defaults.
    struct PathIndex {
        folder: String,
        hashes: HashMap<String, String>,
    }

    impl Indexer for PathIndex {
        fn accepts(&self, path: &str) -> bool {
            folder_contains(&self.folder, path)
        }
        fn contains_path(&self, path: &str) -> bool {
            self.hashes.contains_key(path)
        }
        fn upsert(&mut self, meta: FileMetadata) -> IndexChange {
            match self.hashes.insert(meta.path.clone(), meta.content_hash.clone()) {
                Some(old) if old == meta.content_hash => IndexChange::Unchanged,
                Some(_) => IndexChange::Updated,
                None => IndexChange::Added,
            }
        }
        fn remove(&mut self, path: &str) -> IndexChange {
            match self.hashes.remove(path) {
                Some(_) => IndexChange::Removed,
                None => IndexChange::Ignored,
            }
        }
        fn clear(&mut self) {
            self.hashes.clear();
        }
        fn len(&self) -> usize {
            self.hashes.len()
        }
    }

    fn meta(path: &str, body: &str) -> FileMetadata {
        FileMetadata::from_content(path, body, None)
    }

    #[test]
    fn test_apply_event_lifecycle() {
        let mut index = PathIndex { folder: "Quests".into(), hashes: HashMap::new() };
        let created = IndexEvent::created("Quests/a.md");
        assert_eq!(apply_event(&mut index, &created, Some(meta("Quests/a.md", "x"))), IndexChange::Added);
        assert_eq!(apply_event(&mut index, &created, Some(meta("Quests/a.md", "x"))), IndexChange::Unchanged);

        let outside = IndexEvent::created("Notes/b.md");
        assert_eq!(apply_event(&mut index, &outside, Some(meta("Notes/b.md", "x"))), IndexChange::Ignored);

        let renamed = IndexEvent::renamed("Quests/a.md", "Quests/c.md");
        assert_eq!(apply_event(&mut index, &renamed, Some(meta("Quests/c.md", "x"))), IndexChange::Renamed);
        assert!(index.contains_path("Quests/c.md"));

        let moved_out = IndexEvent::renamed("Quests/c.md", "Archive/c.md");
        assert_eq!(apply_event(&mut index, &moved_out, Some(meta("Archive/c.md", "x"))), IndexChange::Removed);
        assert!(index.is_empty());

        assert_eq!(apply_event(&mut index, &IndexEvent::deleted("Quests/zzz.md"), None), IndexChange::Ignored);
    }

    #[test]
    fn test_folder_matching() {
        assert!(folder_contains("Quests", "Quests/a.md"));
        assert!(folder_contains("/Quests/", "Quests/sub/a.md"));
        assert!(!folder_contains("Quests", "QuestsOld/a.md"));
        assert!(folder_contains("", "anything.md"));
        assert!(in_folders("Areas/x.md", &["Quests".into(), "Areas".into()]));
    }

    #[test]
    fn test_dedupe_id() {
        let taken = ["roof", "roof-2"];
        assert_eq!(dedupe_id("roof", |c| taken.contains(&c)), "roof-3");
        assert_eq!(dedupe_id("garden", |c| taken.contains(&c)), "garden");
    }

    #[test]
    fn test_event_paths_are_normalized() {
        assert_eq!(IndexEvent::modified("Quests\\a.md").target_path(), Some("Quests/a.md"));
        assert_eq!(IndexEvent::deleted("a.md").target_path(), None);
    }
}
