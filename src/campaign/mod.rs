pub mod entity;
pub mod graph;

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::index::metadata::stem_of;
use crate::index::{dedupe_id, folder_contains, FileMetadata, IndexChange, Indexer};
use crate::markdown::link_name;
use crate::quest::is_suffixed;
use crate::settings::Settings;

pub use entity::{CampaignEntity, EntityDetails, EntityType};
pub use graph::{RelationKind, Relationship, ScopeGraph};

/// Derived data for one scope, rebuilt whenever an entity in it changes.
#[derive(Debug, Default)]
struct ScopeCache {
    // lowercase name, stem or alias -> id
    names: HashMap<String, String>,
    // target id -> ids of entities linking to it
    backlinks: HashMap<String, BTreeSet<String>>,
    graph: ScopeGraph,
}

/// Campaign entities keyed by id (`<scope>/<slug>`).
#[derive(Debug, Default)]
pub struct CampaignNotesIndex {
    campaign_folders: Vec<String>,
    entities: HashMap<String, CampaignEntity>,
    by_path: HashMap<String, String>,
    by_type: HashMap<EntityType, BTreeSet<String>>,
    by_tag: HashMap<String, BTreeSet<String>>,
    by_scope: BTreeMap<String, BTreeSet<String>>,
    caches: HashMap<String, ScopeCache>,
    // scopes awaiting a rebuild while a bulk load is running
    deferred_scopes: Option<BTreeSet<String>>,
}

impl CampaignNotesIndex {
    pub fn new(settings: &Settings) -> Self {
        Self::with_folders(settings.campaign_folders.clone())
    }

    pub fn with_folders(campaign_folders: Vec<String>) -> Self {
        Self {
            campaign_folders,
            ..Default::default()
        }
    }

    pub fn get(&self, id: &str) -> Option<&CampaignEntity> {
        self.entities.get(id)
    }

    pub fn get_by_path(&self, path: &str) -> Option<&CampaignEntity> {
        self.by_path.get(path).and_then(|id| self.entities.get(id))
    }

    /// Every entity, sorted by id.
    pub fn all(&self) -> Vec<&CampaignEntity> {
        let mut all: Vec<&CampaignEntity> = self.entities.values().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    pub fn by_type(&self, entity_type: EntityType) -> Vec<&CampaignEntity> {
        self.resolve_ids(self.by_type.get(&entity_type))
    }

    pub fn with_tag(&self, tag: &str) -> Vec<&CampaignEntity> {
        let tag = tag.trim_start_matches('#').to_lowercase();
        self.resolve_ids(self.by_tag.get(&tag))
    }

    pub fn in_scope(&self, scope: &str) -> Vec<&CampaignEntity> {
        self.resolve_ids(self.by_scope.get(scope))
    }

    pub fn scopes(&self) -> Vec<&str> {
        self.by_scope.keys().map(|s| s.as_str()).collect()
    }

    /// Resolve a link (name, alias or path form) within one scope.
    pub fn resolve(&self, scope: &str, name: &str) -> Option<&CampaignEntity> {
        let key = link_name(name).to_lowercase();
        self.caches
            .get(scope)
            .and_then(|cache| cache.names.get(&key))
            .and_then(|id| self.entities.get(id))
    }

    /// Entities in the same scope whose body or fields link to `id`.
    pub fn backlinks(&self, id: &str) -> Vec<&CampaignEntity> {
        let Some(entity) = self.entities.get(id) else {
            return Vec::new();
        };
        self.resolve_ids(
            self.caches
                .get(&entity.scope)
                .and_then(|cache| cache.backlinks.get(id)),
        )
    }

    pub fn relationships(&self, id: &str) -> Vec<&Relationship> {
        self.graph_of(id)
            .map(|graph| graph.relationships(id))
            .unwrap_or_default()
    }

    pub fn related(&self, id: &str, kind: RelationKind) -> Vec<&CampaignEntity> {
        self.graph_of(id)
            .map(|graph| {
                graph
                    .related(id, kind)
                    .into_iter()
                    .filter_map(|other| self.entities.get(other))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Entities with a `MemberOf` edge into the group.
    pub fn members_of(&self, group_id: &str) -> Vec<&CampaignEntity> {
        let Some(graph) = self.graph_of(group_id) else {
            return Vec::new();
        };
        let mut members: Vec<&CampaignEntity> = graph
            .incoming(group_id)
            .into_iter()
            .filter(|r| r.kind == RelationKind::MemberOf)
            .filter_map(|r| self.entities.get(&r.source))
            .collect();
        members.sort_by(|a, b| a.id.cmp(&b.id));
        members.dedup_by(|a, b| a.id == b.id);
        members
    }

    pub fn scope_graph(&self, scope: &str) -> Option<&ScopeGraph> {
        self.caches.get(scope).map(|cache| &cache.graph)
    }

    fn graph_of(&self, id: &str) -> Option<&ScopeGraph> {
        let entity = self.entities.get(id)?;
        self.scope_graph(&entity.scope)
    }

    fn resolve_ids(&self, ids: Option<&BTreeSet<String>>) -> Vec<&CampaignEntity> {
        ids.map(|set| set.iter().filter_map(|id| self.entities.get(id)).collect())
            .unwrap_or_default()
    }

    /// Deepest configured campaign folder holding `path`.
    fn campaign_folder_for(&self, path: &str) -> Option<&str> {
        self.campaign_folders
            .iter()
            .filter(|folder| folder_contains(folder, path))
            .max_by_key(|folder| folder.len())
            .map(|folder| folder.as_str())
    }

    fn unindex(&mut self, path: &str) -> Option<CampaignEntity> {
        let id = self.by_path.remove(path)?;
        let entity = self.entities.remove(&id)?;
        remove_from(&mut self.by_type, &entity.entity_type, &id);
        for tag in &entity.tags {
            remove_from(&mut self.by_tag, tag, &id);
        }
        if let Some(set) = self.by_scope.get_mut(&entity.scope) {
            set.remove(&id);
            if set.is_empty() {
                self.by_scope.remove(&entity.scope);
            }
        }
        Some(entity)
    }

    fn index(&mut self, mut entity: CampaignEntity, previous_id: Option<&str>) {
        let base = entity.id.clone();
        let reused = previous_id
            .filter(|prev| is_suffixed(prev, &base) && !self.entities.contains_key(*prev))
            .map(|prev| prev.to_string());
        let id = reused.unwrap_or_else(|| dedupe_id(&base, |c| self.entities.contains_key(c)));
        if id != base && previous_id != Some(id.as_str()) {
            log::warn!(
                "[CampaignIndex] Id '{}' already taken, indexing {} as '{}'",
                base,
                entity.path,
                id
            );
        }
        entity.id = id.clone();

        self.by_path.insert(entity.path.clone(), id.clone());
        self.by_type.entry(entity.entity_type).or_default().insert(id.clone());
        for tag in &entity.tags {
            self.by_tag.entry(tag.clone()).or_default().insert(id.clone());
        }
        self.by_scope.entry(entity.scope.clone()).or_default().insert(id.clone());
        self.entities.insert(id, entity);
    }

    fn build_scope_cache(&self, scope: &str) -> Option<ScopeCache> {
        let ids = self.by_scope.get(scope)?;
        let entities: Vec<&CampaignEntity> =
            ids.iter().filter_map(|id| self.entities.get(id)).collect();

        // names and stems claim a key before aliases; earlier ids win ties
        let mut names: HashMap<String, String> = HashMap::new();
        for entity in &entities {
            for key in [entity.name.to_lowercase(), stem_of(&entity.path).to_lowercase()] {
                names.entry(key).or_insert_with(|| entity.id.clone());
            }
        }
        for entity in &entities {
            for alias in &entity.aliases {
                names.entry(alias.to_lowercase()).or_insert_with(|| entity.id.clone());
            }
        }

        let resolve = |name: &str| names.get(&link_name(name).to_lowercase()).cloned();

        let mut backlinks: HashMap<String, BTreeSet<String>> = HashMap::new();
        for entity in &entities {
            let targets = entity
                .links
                .iter()
                .map(|l| l.as_str())
                .chain(entity.field_links().into_iter().map(|(_, name)| name));
            for target in targets.filter_map(|name| resolve(name)) {
                if target != entity.id {
                    backlinks.entry(target).or_default().insert(entity.id.clone());
                }
            }
        }

        let graph = ScopeGraph::build(scope, &entities, resolve);
        Some(ScopeCache {
            names,
            backlinks,
            graph,
        })
    }

    fn rebuild_scopes(&mut self, scopes: &BTreeSet<String>) {
        if let Some(pending) = self.deferred_scopes.as_mut() {
            pending.extend(scopes.iter().cloned());
            return;
        }
        for scope in scopes {
            match self.build_scope_cache(scope) {
                Some(cache) => {
                    log::debug!(
                        "[CampaignIndex] Rebuilt scope '{}': {} edges",
                        scope,
                        cache.graph.edge_count()
                    );
                    self.caches.insert(scope.clone(), cache);
                }
                None => {
                    self.caches.remove(scope);
                }
            }
        }
    }
}

fn remove_from<K: std::hash::Hash + Eq>(map: &mut HashMap<K, BTreeSet<String>>, key: &K, id: &str) {
    if let Some(set) = map.get_mut(key) {
        set.remove(id);
        if set.is_empty() {
            map.remove(key);
        }
    }
}

impl Indexer for CampaignNotesIndex {
    fn accepts(&self, path: &str) -> bool {
        path.to_lowercase().ends_with(".md") && self.campaign_folder_for(path).is_some()
    }

    fn contains_path(&self, path: &str) -> bool {
        self.by_path.contains_key(path)
    }

    fn upsert(&mut self, meta: FileMetadata) -> IndexChange {
        let Some(folder) = self.campaign_folder_for(&meta.path).map(|f| f.to_string()) else {
            return IndexChange::Ignored;
        };
        if !meta.path.to_lowercase().ends_with(".md") {
            return IndexChange::Ignored;
        }
        if let Some(existing) = self.get_by_path(&meta.path) {
            if existing.content_hash == meta.content_hash {
                return IndexChange::Unchanged;
            }
        }

        let built = CampaignEntity::from_metadata(&meta, &folder);
        let previous = self.unindex(&meta.path);
        let mut affected: BTreeSet<String> = BTreeSet::new();
        if let Some(prev) = &previous {
            affected.insert(prev.scope.clone());
        }

        let change = match built {
            Some(entity) => {
                affected.insert(entity.scope.clone());
                self.index(entity, previous.as_ref().map(|p| p.id.as_str()));
                if previous.is_some() {
                    IndexChange::Updated
                } else {
                    IndexChange::Added
                }
            }
            None if previous.is_some() => {
                log::debug!("[CampaignIndex] {} is no longer an entity", meta.path);
                IndexChange::Removed
            }
            None => IndexChange::Ignored,
        };

        self.rebuild_scopes(&affected);
        change
    }

    fn remove(&mut self, path: &str) -> IndexChange {
        match self.unindex(path) {
            Some(entity) => {
                log::debug!("[CampaignIndex] Removed {} ('{}')", path, entity.id);
                self.rebuild_scopes(&BTreeSet::from([entity.scope]));
                IndexChange::Removed
            }
            None => IndexChange::Ignored,
        }
    }

    fn clear(&mut self) {
        self.entities.clear();
        self.by_path.clear();
        self.by_type.clear();
        self.by_tag.clear();
        self.by_scope.clear();
        self.caches.clear();
    }

    fn len(&self) -> usize {
        self.entities.len()
    }

    fn begin_bulk_load(&mut self) {
        self.deferred_scopes.get_or_insert_with(BTreeSet::new);
    }

    fn finish_bulk_load(&mut self) {
        if let Some(pending) = self.deferred_scopes.take() {
            self.rebuild_scopes(&pending);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{apply_event, IndexEvent};

    fn meta(path: &str, content: &str) -> FileMetadata {
        FileMetadata::from_content(path, content, None)
    }

    fn saltmarsh() -> CampaignNotesIndex {
        let mut index = CampaignNotesIndex::with_folders(vec!["Campaign".into()]);
        index.upsert(meta(
            "Campaign/Saltmarsh/Mira Vane.md",
            "---\ntype: npc\naliases: [The Broker]\ngroups: [\"[[Iron Guild]]\"]\nlocation: \"[[Docks]]\"\n---\nDeals with [[Captain Hale]].\n",
        ));
        index.upsert(meta(
            "Campaign/Saltmarsh/Iron Guild.md",
            "---\ntype: faction\nleader: \"[[The Broker]]\"\nbase: Docks\n---\n",
        ));
        index.upsert(meta("Campaign/Saltmarsh/Docks.md", "---\ntype: place\n---\n#lore-heavy\n"));
        index.upsert(meta(
            "Campaign/Saltmarsh/Captain Hale.md",
            "---\ntype: npc\n---\nSails from [[Docks]]. Never met [[Strahd]].\n",
        ));
        index.upsert(meta("Campaign/Barovia/Strahd.md", "---\ntype: npc\n---\nRules [[Docks]]?\n"));
        index
    }

    fn ids(entities: Vec<&CampaignEntity>) -> Vec<&str> {
        entities.into_iter().map(|e| e.id.as_str()).collect()
    }

    #[test]
    fn test_secondary_indexes() {
        let index = saltmarsh();
        assert_eq!(index.len(), 5);
        assert_eq!(index.scopes(), vec!["barovia", "saltmarsh"]);
        assert_eq!(
            ids(index.by_type(EntityType::Npc)),
            vec!["barovia/strahd", "saltmarsh/captain-hale", "saltmarsh/mira-vane"]
        );
        assert_eq!(ids(index.with_tag("Lore-Heavy")), vec!["saltmarsh/docks"]);
        assert_eq!(index.in_scope("saltmarsh").len(), 4);
        assert_eq!(index.get_by_path("Campaign/Saltmarsh/Docks.md").unwrap().id, "saltmarsh/docks");
    }

    #[test]
    fn test_resolve_by_alias_and_scope() {
        let index = saltmarsh();
        assert_eq!(index.resolve("saltmarsh", "the broker").unwrap().id, "saltmarsh/mira-vane");
        assert_eq!(index.resolve("saltmarsh", "Campaign/Saltmarsh/Docks.md").unwrap().id, "saltmarsh/docks");
        assert!(index.resolve("saltmarsh", "Strahd").is_none(), "links do not cross scopes");
    }

    #[test]
    fn test_backlinks_and_relationships() {
        let index = saltmarsh();
        assert_eq!(
            ids(index.backlinks("saltmarsh/docks")),
            vec!["saltmarsh/captain-hale", "saltmarsh/iron-guild", "saltmarsh/mira-vane"]
        );
        assert!(index.backlinks("barovia/strahd").is_empty());
        assert_eq!(ids(index.members_of("saltmarsh/iron-guild")), vec!["saltmarsh/mira-vane"]);
        assert_eq!(
            ids(index.related("saltmarsh/iron-guild", RelationKind::Leads)),
            vec!["saltmarsh/mira-vane"]
        );
        assert!(index
            .relationships("saltmarsh/mira-vane")
            .iter()
            .any(|r| r.kind == RelationKind::Mentions && r.target == "saltmarsh/captain-hale"));
        assert_eq!(index.scope_graph("barovia").unwrap().edge_count(), 0);
    }

    #[test]
    fn test_modify_rebuilds_derived_caches() {
        let mut index = saltmarsh();
        let change = index.upsert(meta(
            "Campaign/Saltmarsh/Mira Vane.md",
            "---\ntype: npc\n---\nRetired.\n",
        ));
        assert_eq!(change, IndexChange::Updated);
        assert!(index.members_of("saltmarsh/iron-guild").is_empty());
        assert!(index.resolve("saltmarsh", "The Broker").is_none());
        assert_eq!(
            ids(index.backlinks("saltmarsh/docks")),
            vec!["saltmarsh/captain-hale", "saltmarsh/iron-guild"]
        );
    }

    #[test]
    fn test_bulk_load_builds_scopes_once_at_the_end() {
        let mut index = CampaignNotesIndex::with_folders(vec!["Campaign".into()]);
        index.begin_bulk_load();
        index.upsert(meta("Campaign/Saltmarsh/Iron Guild.md", "---\ntype: group\n---\n"));
        index.upsert(meta(
            "Campaign/Saltmarsh/Mira Vane.md",
            "---\ntype: npc\ngroups: [\"[[Iron Guild]]\"]\n---\n",
        ));
        assert!(index.scope_graph("saltmarsh").is_none());

        index.finish_bulk_load();
        assert_eq!(
            index.resolve("saltmarsh", "iron guild").map(|e| e.id.as_str()),
            Some("saltmarsh/iron-guild")
        );
        assert_eq!(
            index.backlinks("saltmarsh/iron-guild").iter().map(|e| e.id.as_str()).collect::<Vec<_>>(),
            vec!["saltmarsh/mira-vane"]
        );
    }

    #[test]
    fn test_unchanged_and_non_entity_files() {
        let mut index = saltmarsh();
        let docks = "---\ntype: place\n---\n#lore-heavy\n";
        assert_eq!(index.upsert(meta("Campaign/Saltmarsh/Docks.md", docks)), IndexChange::Unchanged);
        assert_eq!(index.upsert(meta("Campaign/Saltmarsh/todo.md", "just notes")), IndexChange::Ignored);
        assert_eq!(index.upsert(meta("Quests/x.md", "---\ntype: npc\n---\n")), IndexChange::Ignored);
        assert_eq!(
            index.upsert(meta("Campaign/Saltmarsh/Docks.md", "no longer typed")),
            IndexChange::Removed
        );
        assert!(index.get("saltmarsh/docks").is_none());
        assert!(index.relationships("saltmarsh/mira-vane").iter().all(|r| r.target != "saltmarsh/docks"));
    }

    #[test]
    fn test_delete_and_rename_events() {
        let mut index = saltmarsh();
        let deleted = IndexEvent::deleted("Campaign/Saltmarsh/Iron Guild.md");
        assert_eq!(apply_event(&mut index, &deleted, None), IndexChange::Removed);
        assert!(index.related("saltmarsh/mira-vane", RelationKind::MemberOf).is_empty());

        let renamed = IndexEvent::renamed("Campaign/Barovia/Strahd.md", "Campaign/Saltmarsh/Strahd.md");
        let change = apply_event(
            &mut index,
            &renamed,
            Some(meta("Campaign/Saltmarsh/Strahd.md", "---\ntype: npc\n---\nRules [[Docks]]?\n")),
        );
        assert_eq!(change, IndexChange::Renamed);
        assert!(index.get("barovia/strahd").is_none());
        assert_eq!(index.scopes(), vec!["saltmarsh"]);
        assert!(index.scope_graph("barovia").is_none());
        assert_eq!(
            ids(index.backlinks("saltmarsh/strahd")),
            vec!["saltmarsh/captain-hale"],
            "the old dangling link resolves once both are in one scope"
        );
    }

    #[test]
    fn test_id_collision_within_scope() {
        let mut index = CampaignNotesIndex::with_folders(vec!["Campaign".into()]);
        index.upsert(meta("Campaign/S/Old/Bob.md", "---\ntype: npc\n---\n"));
        index.upsert(meta("Campaign/S/People/Bob.md", "---\ntype: npc\n---\n"));
        assert_eq!(index.get_by_path("Campaign/S/Old/Bob.md").unwrap().id, "s/bob");
        assert_eq!(index.get_by_path("Campaign/S/People/Bob.md").unwrap().id, "s/bob-2");

        index.upsert(meta("Campaign/S/People/Bob.md", "---\ntype: npc\nrace: dwarf\n---\n"));
        assert_eq!(index.get_by_path("Campaign/S/People/Bob.md").unwrap().id, "s/bob-2");
    }
}
