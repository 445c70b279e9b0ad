pub mod model;
pub mod review;
pub mod updater;

use std::collections::{BTreeSet, HashMap};

use crate::index::{dedupe_id, in_folders, FileMetadata, IndexChange, Indexer};
use crate::markdown::slugify;
use crate::markdown::tasks::Task;
use crate::settings::Settings;

pub use model::{QuestFile, QuestKind, QuestStatus};
pub use review::{ReviewDetector, ReviewItem, ReviewReason};
pub use updater::{QuestEdit, QuestUpdater};

/// Quest, project and area files keyed by vault-relative path.
#[derive(Debug, Default)]
pub struct QuestIndex {
    quest_folders: Vec<String>,
    area_folders: Vec<String>,
    quests: HashMap<String, QuestFile>,
    by_id: HashMap<String, String>,
    by_kind: HashMap<QuestKind, BTreeSet<String>>,
    by_status: HashMap<QuestStatus, BTreeSet<String>>,
    by_tag: HashMap<String, BTreeSet<String>>,
    // area id -> quest paths whose `area` points at it
    area_children: HashMap<String, BTreeSet<String>>,
    bulk_loading: bool,
}

impl QuestIndex {
    pub fn new(settings: &Settings) -> Self {
        Self::with_folders(settings.quest_folders.clone(), settings.area_folders.clone())
    }

    pub fn with_folders(quest_folders: Vec<String>, area_folders: Vec<String>) -> Self {
        Self {
            quest_folders,
            area_folders,
            ..Default::default()
        }
    }

    pub fn get(&self, path: &str) -> Option<&QuestFile> {
        self.quests.get(path)
    }

    /// Lookup by id, then by slug, then by slug of the stored id, then by
    /// case-insensitive note name.
    pub fn get_by_id(&self, id: &str) -> Option<&QuestFile> {
        let slug = slugify(id);
        if let Some(path) = self.by_id.get(id.trim()).or_else(|| self.by_id.get(&slug)) {
            return self.quests.get(path);
        }
        let quests = self.all();
        if let Some(quest) = quests.iter().copied().find(|q| !slug.is_empty() && slugify(&q.id) == slug) {
            return Some(quest);
        }
        let wanted = id.trim().to_lowercase();
        quests.into_iter().find(|q| q.name.to_lowercase() == wanted)
    }

    /// Every quest, sorted by path.
    pub fn all(&self) -> Vec<&QuestFile> {
        let mut quests: Vec<&QuestFile> = self.quests.values().collect();
        quests.sort_by(|a, b| a.path.cmp(&b.path));
        quests
    }

    pub fn by_kind(&self, kind: QuestKind) -> Vec<&QuestFile> {
        self.resolve_paths(self.by_kind.get(&kind))
    }

    pub fn by_status(&self, status: QuestStatus) -> Vec<&QuestFile> {
        self.resolve_paths(self.by_status.get(&status))
    }

    pub fn with_tag(&self, tag: &str) -> Vec<&QuestFile> {
        let tag = tag.trim_start_matches('#').to_lowercase();
        self.resolve_paths(self.by_tag.get(&tag))
    }

    /// Quests and projects filed under an area.
    pub fn children_of(&self, area_id: &str) -> Vec<&QuestFile> {
        self.resolve_paths(self.area_children.get(area_id))
    }

    /// Tasks carrying `tag` (or a nested `tag/...`), paired with their quest id.
    pub fn tasks_with_tag(&self, tag: &str) -> Vec<(&str, &Task)> {
        self.all()
            .into_iter()
            .flat_map(|q| {
                q.tasks
                    .iter()
                    .filter(|t| t.has_tag(tag))
                    .map(move |t| (q.id.as_str(), t))
            })
            .collect()
    }

    /// Every task, paired with its quest id.
    pub fn all_tasks(&self) -> Vec<(&str, &Task)> {
        self.all()
            .into_iter()
            .flat_map(|q| q.tasks.iter().map(move |t| (q.id.as_str(), t)))
            .collect()
    }

    pub fn open_task_count(&self) -> usize {
        self.quests.values().map(|q| q.open_tasks().count()).sum()
    }

    fn resolve_paths(&self, paths: Option<&BTreeSet<String>>) -> Vec<&QuestFile> {
        paths
            .map(|set| set.iter().filter_map(|p| self.quests.get(p)).collect())
            .unwrap_or_default()
    }

    fn is_area_path(&self, path: &str) -> bool {
        in_folders(path, &self.area_folders)
    }

    fn unindex(&mut self, path: &str) -> Option<QuestFile> {
        let quest = self.quests.remove(path)?;
        if self.by_id.get(&quest.id).map(|p| p == path).unwrap_or(false) {
            self.by_id.remove(&quest.id);
        }
        remove_from(&mut self.by_kind, &quest.kind, path);
        remove_from(&mut self.by_status, &quest.status, path);
        for tag in &quest.tags {
            remove_from(&mut self.by_tag, tag, path);
        }
        Some(quest)
    }

    fn index(&mut self, mut quest: QuestFile) {
        let path = quest.path.clone();
        let id = dedupe_id(&quest.id, |candidate| self.by_id.contains_key(candidate));
        if id != quest.id {
            log::warn!(
                "[QuestIndex] Id '{}' already used by {:?}, indexing {} as '{}'",
                quest.id,
                self.by_id.get(&quest.id),
                path,
                id
            );
            quest.id = id;
        }
        self.by_id.insert(quest.id.clone(), path.clone());
        self.by_kind.entry(quest.kind).or_default().insert(path.clone());
        self.by_status.entry(quest.status).or_default().insert(path.clone());
        for tag in &quest.tags {
            self.by_tag.entry(tag.clone()).or_default().insert(path.clone());
        }
        self.quests.insert(path, quest);
    }

    fn areas_changed(&mut self) {
        if !self.bulk_loading {
            self.rebuild_area_children();
        }
    }

    /// Area membership depends on both the quest and the area, so it is
    /// recomputed from scratch after every mutation.
    fn rebuild_area_children(&mut self) {
        let mut area_ids: HashMap<String, String> = HashMap::new();
        for quest in self.quests.values().filter(|q| q.kind == QuestKind::Area) {
            area_ids.insert(quest.name.to_lowercase(), quest.id.clone());
            area_ids.insert(quest.id.clone(), quest.id.clone());
        }

        let mut children: HashMap<String, BTreeSet<String>> = HashMap::new();
        for quest in self.quests.values() {
            let Some(area) = quest.area.as_deref() else {
                continue;
            };
            let key = crate::markdown::link_name(area).to_lowercase();
            let area_id = area_ids
                .get(&key)
                .or_else(|| area_ids.get(&slugify(&key)))
                .cloned()
                .unwrap_or_else(|| slugify(&key));
            children.entry(area_id).or_default().insert(quest.path.clone());
        }
        self.area_children = children;
    }
}

/// `id` is `base-N` as produced by `dedupe_id`.
pub(crate) fn is_suffixed(id: &str, base: &str) -> bool {
    id.strip_prefix(base)
        .and_then(|rest| rest.strip_prefix('-'))
        .map(|n| n.parse::<u32>().map(|n| n >= 2).unwrap_or(false))
        .unwrap_or(false)
}

fn remove_from<K: std::hash::Hash + Eq + Clone>(
    map: &mut HashMap<K, BTreeSet<String>>,
    key: &K,
    path: &str,
) {
    if let Some(set) = map.get_mut(key) {
        set.remove(path);
        if set.is_empty() {
            map.remove(key);
        }
    }
}

impl Indexer for QuestIndex {
    fn accepts(&self, path: &str) -> bool {
        path.to_lowercase().ends_with(".md")
            && (in_folders(path, &self.quest_folders) || self.is_area_path(path))
    }

    fn contains_path(&self, path: &str) -> bool {
        self.quests.contains_key(path)
    }

    fn upsert(&mut self, meta: FileMetadata) -> IndexChange {
        if !self.accepts(&meta.path) {
            return IndexChange::Ignored;
        }
        if let Some(existing) = self.quests.get(&meta.path) {
            if existing.content_hash == meta.content_hash {
                return IndexChange::Unchanged;
            }
        }

        let previous = self.unindex(&meta.path);
        let mut quest = QuestFile::from_metadata(&meta, self.is_area_path(&meta.path));
        // keep a suffixed id stable across edits
        if let Some(prev) = &previous {
            if is_suffixed(&prev.id, &quest.id) && !self.by_id.contains_key(&prev.id) {
                quest.id = prev.id.clone();
            }
        }
        log::debug!("[QuestIndex] Indexed {} as '{}'", meta.path, quest.id);
        self.index(quest);
        self.areas_changed();

        if previous.is_some() {
            IndexChange::Updated
        } else {
            IndexChange::Added
        }
    }

    fn remove(&mut self, path: &str) -> IndexChange {
        match self.unindex(path) {
            Some(quest) => {
                log::debug!("[QuestIndex] Removed {} ('{}')", path, quest.id);
                self.areas_changed();
                IndexChange::Removed
            }
            None => IndexChange::Ignored,
        }
    }

    fn clear(&mut self) {
        self.quests.clear();
        self.by_id.clear();
        self.by_kind.clear();
        self.by_status.clear();
        self.by_tag.clear();
        self.area_children.clear();
    }

    fn len(&self) -> usize {
        self.quests.len()
    }

    fn begin_bulk_load(&mut self) {
        self.bulk_loading = true;
    }

    fn finish_bulk_load(&mut self) {
        self.bulk_loading = false;
        self.rebuild_area_children();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{apply_event, IndexEvent};

    fn index() -> QuestIndex {
        QuestIndex::with_folders(vec!["Quests".into()], vec!["Areas".into()])
    }

    fn meta(path: &str, content: &str) -> FileMetadata {
        FileMetadata::from_content(path, content, None)
    }

    #[test]
    fn test_upsert_and_secondary_indexes() {
        let mut idx = index();
        assert_eq!(
            idx.upsert(meta("Quests/Roof.md", "---\nstatus: waiting\ntags: [house]\n---\n- [ ] call #next\n")),
            IndexChange::Added
        );
        assert_eq!(idx.upsert(meta("Areas/Home.md", "# Home\n")), IndexChange::Added);
        assert_eq!(idx.upsert(meta("Journal/day.md", "- [ ] x\n")), IndexChange::Ignored);

        assert_eq!(idx.len(), 2);
        assert_eq!(idx.by_status(QuestStatus::Waiting)[0].id, "roof");
        assert_eq!(idx.by_kind(QuestKind::Area)[0].id, "home");
        assert_eq!(idx.with_tag("#House").len(), 1);
        assert_eq!(idx.tasks_with_tag("next").len(), 1);
        assert_eq!(idx.open_task_count(), 1);
    }

    #[test]
    fn test_unchanged_content_is_skipped() {
        let mut idx = index();
        let content = "---\nstatus: active\n---\n";
        idx.upsert(meta("Quests/Roof.md", content));
        assert_eq!(idx.upsert(meta("Quests/Roof.md", content)), IndexChange::Unchanged);
        assert_eq!(
            idx.upsert(meta("Quests/Roof.md", "---\nstatus: someday\n---\n")),
            IndexChange::Updated
        );
        assert!(idx.by_status(QuestStatus::Active).is_empty());
        assert_eq!(idx.by_status(QuestStatus::Someday).len(), 1);
    }

    #[test]
    fn test_id_collision_gets_suffix() {
        let mut idx = index();
        idx.upsert(meta("Quests/A/Roof.md", "one"));
        idx.upsert(meta("Quests/B/Roof.md", "two"));
        assert_eq!(idx.get("Quests/A/Roof.md").unwrap().id, "roof");
        assert_eq!(idx.get("Quests/B/Roof.md").unwrap().id, "roof-2");

        // editing the second file keeps its suffixed id
        idx.upsert(meta("Quests/B/Roof.md", "three"));
        assert_eq!(idx.get("Quests/B/Roof.md").unwrap().id, "roof-2");
        assert_eq!(idx.get_by_id("roof-2").unwrap().path, "Quests/B/Roof.md");
    }

    #[test]
    fn test_get_by_id_falls_back_to_name() {
        let mut idx = index();
        idx.upsert(meta("Quests/Fix Roof.md", "---\nid: q-17\n---\n"));
        assert_eq!(idx.get_by_id("q-17").unwrap().name, "Fix Roof");
        assert_eq!(idx.get_by_id("fix roof").unwrap().id, "q-17");
        assert!(idx.get_by_id("missing").is_none());
    }

    #[test]
    fn test_frontmatter_id_is_stored_verbatim() {
        let mut idx = index();
        idx.upsert(meta("Quests/Taxes.md", "---\nid: Q-17\n---\n"));
        assert_eq!(idx.get("Quests/Taxes.md").unwrap().id, "Q-17");
        assert_eq!(idx.get_by_id("Q-17").unwrap().path, "Quests/Taxes.md");
        assert_eq!(idx.get_by_id("q-17").unwrap().path, "Quests/Taxes.md");

        idx.upsert(meta("Quests/Old/Taxes.md", "---\nid: Q-17\n---\n"));
        assert_eq!(idx.get("Quests/Old/Taxes.md").unwrap().id, "Q-17-2");
    }

    #[test]
    fn test_area_children_follow_changes() {
        let mut idx = index();
        idx.upsert(meta("Quests/Roof.md", "---\narea: \"[[Home]]\"\n---\n"));
        assert_eq!(idx.children_of("home").len(), 1, "dangling area still groups by slug");

        idx.upsert(meta("Areas/Home.md", "---\nid: area-home\n---\n"));
        assert!(idx.children_of("home").is_empty());
        assert_eq!(idx.children_of("area-home")[0].path, "Quests/Roof.md");

        idx.upsert(meta("Quests/Roof.md", "---\narea: Garden\n---\n"));
        assert!(idx.children_of("area-home").is_empty());
        assert_eq!(idx.children_of("garden").len(), 1);
    }

    #[test]
    fn test_bulk_load_defers_area_children() {
        let mut idx = index();
        idx.begin_bulk_load();
        idx.upsert(meta("Quests/Roof.md", "---\narea: \"[[Home]]\"\n---\n"));
        idx.upsert(meta("Quests/Fence.md", "---\narea: Home\n---\n"));
        idx.upsert(meta("Areas/Home.md", "---\nid: area-home\n---\n"));
        assert!(idx.children_of("area-home").is_empty(), "not rebuilt mid-load");

        idx.finish_bulk_load();
        let children: Vec<&str> = idx.children_of("area-home").iter().map(|q| q.path.as_str()).collect();
        assert_eq!(children, vec!["Quests/Fence.md", "Quests/Roof.md"]);

        idx.remove("Quests/Fence.md");
        assert_eq!(idx.children_of("area-home").len(), 1, "incremental updates rebuild again");
    }

    #[test]
    fn test_rename_and_delete_events() {
        let mut idx = index();
        idx.upsert(meta("Quests/Roof.md", "body"));

        let event = IndexEvent::renamed("Quests/Roof.md", "Quests/New Roof.md");
        let change = apply_event(&mut idx, &event, Some(meta("Quests/New Roof.md", "body")));
        assert_eq!(change, IndexChange::Renamed);
        assert!(idx.get("Quests/Roof.md").is_none());
        assert_eq!(idx.get_by_id("new-roof").unwrap().path, "Quests/New Roof.md");
        assert!(idx.get_by_id("roof").is_none());

        let deleted = IndexEvent::deleted("Quests/New Roof.md");
        assert_eq!(apply_event(&mut idx, &deleted, None), IndexChange::Removed);
        assert!(idx.is_empty());
        assert!(idx.with_tag("anything").is_empty());
    }
}
