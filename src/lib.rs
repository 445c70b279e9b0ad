pub mod api;
pub mod campaign;
pub mod frontmatter;
pub mod index;
pub mod markdown;
pub mod quest;
pub mod settings;
pub mod watcher;

use chrono::NaiveDate;
use rayon::prelude::*;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use std::sync::{Arc, RwLock, RwLockReadGuard};
use std::time::{Instant, SystemTime};

use campaign::CampaignNotesIndex;
use frontmatter::schemas::{get_schema_for_entity, QUEST_SCHEMA};
use frontmatter::FrontmatterParser;
use index::metadata::{self, checked_relative, relative_path};
use index::scanner::{VaultScanner, TEMP_SUFFIX};
use index::{FileMetadata, IndexChange, IndexEvent, Indexer};
use markdown::rename::LinkRewriter;
use quest::{QuestEdit, QuestFile, QuestIndex, QuestUpdater, ReviewDetector, ReviewItem};
use settings::Settings;
use watcher::{VaultNotice, VaultWatcher};

/// Atomic file write: write to a temp file in the same directory, then rename.
/// A watcher (or a sync client) never sees a half-written note.
pub(crate) fn atomic_write_file(path: &Path, content: &[u8]) -> Result<(), String> {
    use std::io::Write;

    let file_name = path.file_name().unwrap_or_default().to_string_lossy();
    let temp_path = path.with_file_name(format!("{}{}", file_name, TEMP_SUFFIX));

    let mut file = fs::File::create(&temp_path)
        .map_err(|e| format!("Failed to create temp file {:?}: {}", temp_path, e))?;
    file.write_all(content)
        .map_err(|e| format!("Failed to write temp file {:?}: {}", temp_path, e))?;
    file.sync_all()
        .map_err(|e| format!("Failed to sync temp file {:?}: {}", temp_path, e))?;
    drop(file);

    fs::rename(&temp_path, path)
        .map_err(|e| format!("Failed to rename {:?} -> {:?}: {}", temp_path, path, e))?;

    Ok(())
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexStats {
    pub files_scanned: usize,
    pub quests: usize,
    pub entities: usize,
    pub duration_ms: u128,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RefreshStats {
    pub scanned: usize,
    pub updated: usize,
    pub removed: usize,
}

/// What one event did to each index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EventOutcome {
    pub quest: IndexChange,
    pub campaign: IndexChange,
}

impl EventOutcome {
    pub fn is_mutation(&self) -> bool {
        self.quest.is_mutation() || self.campaign.is_mutation()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RenameReport {
    pub from: String,
    pub to: String,
    /// Notes whose links were rewritten (paths after the rename)
    pub rewritten: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationIssue {
    pub path: String,
    /// JSON pointer into the frontmatter; empty for file-level problems
    pub pointer: String,
    pub message: String,
}

/// An open vault: settings plus both indexes, shared between the caller and
/// the watcher thread.
#[derive(Clone)]
pub struct Vault {
    root: PathBuf,
    settings: Arc<Settings>,
    quests: Arc<RwLock<QuestIndex>>,
    campaign: Arc<RwLock<CampaignNotesIndex>>,
    // vault-relative path -> mtime at last index, for incremental refresh
    file_cache: Arc<RwLock<HashMap<String, SystemTime>>>,
}

impl Vault {
    /// Load settings and build both indexes.
    pub fn open(root: impl AsRef<Path>) -> Result<Self, String> {
        let root = root.as_ref();
        let settings = Settings::load(root)?;
        let vault = Self::with_settings(root, settings)?;
        vault.reindex_all()?;
        Ok(vault)
    }

    /// Empty indexes over `root`; call `reindex_all` to fill them.
    pub fn with_settings(root: impl AsRef<Path>, settings: Settings) -> Result<Self, String> {
        let root = fs::canonicalize(root.as_ref())
            .map_err(|e| format!("Failed to open vault {:?}: {}", root.as_ref(), e))?;
        if !root.is_dir() {
            return Err(format!("Vault path {:?} is not a directory", root));
        }
        Ok(Self {
            quests: Arc::new(RwLock::new(QuestIndex::new(&settings))),
            campaign: Arc::new(RwLock::new(CampaignNotesIndex::new(&settings))),
            settings: Arc::new(settings),
            file_cache: Arc::new(RwLock::new(HashMap::new())),
            root,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn quests(&self) -> Result<RwLockReadGuard<'_, QuestIndex>, String> {
        self.quests
            .read()
            .map_err(|e| format!("Failed to lock quest index: {}", e))
    }

    pub fn campaign(&self) -> Result<RwLockReadGuard<'_, CampaignNotesIndex>, String> {
        self.campaign
            .read()
            .map_err(|e| format!("Failed to lock campaign index: {}", e))
    }

    fn scanner(&self) -> VaultScanner {
        VaultScanner::new(&self.root, &self.settings.indexed_folders())
    }

    /// Drop everything and rebuild from disk. Files are indexed in path order,
    /// so the first path keeps a contested id.
    pub fn reindex_all(&self) -> Result<IndexStats, String> {
        let start = Instant::now();
        let parsed = self.scanner().scan();
        let files_scanned = parsed.len();

        let mut quests = self.quests.write().map_err(|e| e.to_string())?;
        let mut campaign = self.campaign.write().map_err(|e| e.to_string())?;
        let mut cache = self.file_cache.write().map_err(|e| e.to_string())?;
        quests.clear();
        campaign.clear();
        cache.clear();

        quests.begin_bulk_load();
        campaign.begin_bulk_load();
        for meta in parsed {
            if let Some(modified) = meta.modified {
                cache.insert(meta.path.clone(), modified);
            }
            index_both(&mut quests, &mut campaign, meta);
        }
        quests.finish_bulk_load();
        campaign.finish_bulk_load();

        let stats = IndexStats {
            files_scanned,
            quests: quests.len(),
            entities: campaign.len(),
            duration_ms: start.elapsed().as_millis(),
        };
        log::info!(
            "[Vault] Full reindex completed: {} files, {} quests, {} entities in {}ms",
            stats.files_scanned,
            stats.quests,
            stats.entities,
            stats.duration_ms
        );
        Ok(stats)
    }

    /// Incremental reindex: re-read files that are new or whose mtime moved
    /// in either direction, drop files that vanished.
    pub fn refresh(&self) -> Result<RefreshStats, String> {
        let files = self.scanner().collect_markdown_files();
        let cache = self.file_cache.read().map_err(|e| e.to_string())?;

        let current: Vec<(String, PathBuf)> = files
            .into_iter()
            .filter_map(|abs| relative_path(&self.root, &abs).ok().map(|rel| (rel, abs)))
            .collect();
        let seen: HashSet<&str> = current.iter().map(|(rel, _)| rel.as_str()).collect();
        let vanished: Vec<String> = cache
            .keys()
            .filter(|rel| !seen.contains(rel.as_str()))
            .cloned()
            .collect();

        let changed: Vec<FileMetadata> = current
            .par_iter()
            .filter(|(rel, abs)| {
                match fs::metadata(abs).and_then(|m| m.modified()) {
                    Ok(modified) => cache.get(rel).map(|cached| modified != *cached).unwrap_or(true),
                    Err(_) => false,
                }
            })
            .filter_map(|(_, abs)| match metadata::extract(&self.root, abs) {
                Ok(meta) => Some(meta),
                Err(e) => {
                    log::warn!("[Vault] Skipping {}: {}", abs.display(), e);
                    None
                }
            })
            .collect();
        drop(cache);

        let mut stats = RefreshStats {
            scanned: current.len(),
            ..Default::default()
        };

        let mut quests = self.quests.write().map_err(|e| e.to_string())?;
        let mut campaign = self.campaign.write().map_err(|e| e.to_string())?;
        let mut cache = self.file_cache.write().map_err(|e| e.to_string())?;

        for rel in &vanished {
            cache.remove(rel);
            let q = quests.remove(rel);
            let c = campaign.remove(rel);
            if q.is_mutation() || c.is_mutation() {
                stats.removed += 1;
            }
        }

        let mut changed = changed;
        changed.sort_by(|a, b| a.path.cmp(&b.path));
        for meta in changed {
            if let Some(modified) = meta.modified {
                cache.insert(meta.path.clone(), modified);
            }
            if index_both(&mut quests, &mut campaign, meta).is_mutation() {
                stats.updated += 1;
            }
        }

        if stats.updated > 0 || stats.removed > 0 {
            log::info!(
                "[Vault] Incremental reindex: {} updated, {} removed",
                stats.updated,
                stats.removed
            );
        }
        Ok(stats)
    }

    /// Apply one file event to both indexes, reading the target from disk.
    /// A created or modified file that no longer exists is treated as deleted.
    pub fn apply_event(&self, event: &IndexEvent) -> Result<EventOutcome, String> {
        let meta = match event.target_path() {
            Some(rel) => {
                let abs = self.root.join(rel);
                if abs.is_file() {
                    Some(metadata::extract(&self.root, &abs)?)
                } else {
                    None
                }
            }
            None => None,
        };
        let event = match (event, &meta) {
            (IndexEvent::Created { path } | IndexEvent::Modified { path }, None) => {
                IndexEvent::deleted(path.clone())
            }
            _ => event.clone(),
        };

        let mut quests = self.quests.write().map_err(|e| e.to_string())?;
        let mut campaign = self.campaign.write().map_err(|e| e.to_string())?;
        let mut cache = self.file_cache.write().map_err(|e| e.to_string())?;

        match &event {
            IndexEvent::Deleted { path } => {
                cache.remove(path);
            }
            IndexEvent::Renamed { from, .. } => {
                cache.remove(from);
            }
            _ => {}
        }
        if let Some(meta) = &meta {
            if let Some(modified) = meta.modified {
                cache.insert(meta.path.clone(), modified);
            }
        }

        let campaign_meta = match &meta {
            Some(m) if campaign.accepts(&m.path) => Some(m.clone()),
            _ => None,
        };
        let outcome = EventOutcome {
            quest: index::apply_event(&mut *quests, &event, meta),
            campaign: index::apply_event(&mut *campaign, &event, campaign_meta),
        };
        if outcome.is_mutation() {
            log::debug!("[Vault] {:?}: {:?}", event, outcome);
        }
        Ok(outcome)
    }

    pub fn review(&self, today: NaiveDate) -> Result<Vec<ReviewItem>, String> {
        let quests = self.quests()?;
        Ok(ReviewDetector::new(&self.settings.review)
            .with_next_action_tag(&self.settings.next_action_tag)
            .detect(&quests, today))
    }

    /// Edit a quest file in place and re-index it before returning.
    pub fn update_quest(&self, id: &str, edit: &QuestEdit) -> Result<QuestFile, String> {
        let path = {
            let quests = self.quests()?;
            quests
                .get_by_id(id)
                .map(|q| q.path.clone())
                .ok_or_else(|| format!("Quest not found: {}", id))?
        };
        QuestUpdater::new(self.root.join(&path)).apply(edit)?;
        self.apply_event(&IndexEvent::modified(path.clone()))?;
        self.quests()?
            .get(&path)
            .cloned()
            .ok_or_else(|| format!("Quest {} vanished after update", path))
    }

    /// Rename or move a note, rewrite links to it across the vault and
    /// re-index everything touched.
    pub fn rename_note(&self, from: &str, to: &str) -> Result<RenameReport, String> {
        let from = with_md_extension(&checked_relative(from)?);
        let to = with_md_extension(&checked_relative(to)?);
        let old_abs = self.root.join(&from);
        let new_abs = self.root.join(&to);

        if !old_abs.is_file() {
            return Err(format!("Note not found: {}", from));
        }
        if new_abs.exists() {
            return Err(format!("Target already exists: {}", to));
        }
        // symlinked folders can still lead out of the vault
        for path in [&old_abs, &new_abs] {
            if !self.resolves_inside(path) {
                return Err(format!("Path {:?} is outside the vault", path));
            }
        }
        if let Some(parent) = new_abs.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create folder {:?}: {}", parent, e))?;
        }
        fs::rename(&old_abs, &new_abs)
            .map_err(|e| format!("Failed to rename {} -> {}: {}", from, to, e))?;
        log::info!("[Vault] Renamed {} -> {}", from, to);

        // links can live anywhere in the vault, not only in indexed folders
        let rewriter = LinkRewriter::new(&from, &to);
        let updates: Vec<(PathBuf, String)> = VaultScanner::new(&self.root, &[])
            .collect_markdown_files()
            .par_iter()
            .filter_map(|path| {
                let content = fs::read_to_string(path).ok()?;
                rewriter.apply(&content).map(|updated| (path.clone(), updated))
            })
            .collect();

        let mut rewritten = Vec::new();
        for (path, content) in updates {
            if let Err(e) = atomic_write_file(&path, content.as_bytes()) {
                log::warn!("[Vault] Failed to rewrite links in {}: {}", path.display(), e);
                continue;
            }
            if let Ok(rel) = relative_path(&self.root, &path) {
                rewritten.push(rel);
            }
        }
        rewritten.sort();

        self.apply_event(&IndexEvent::renamed(from.clone(), to.clone()))?;
        for rel in &rewritten {
            self.apply_event(&IndexEvent::modified(rel.clone()))?;
        }
        log::info!("[Vault] Rewrote links in {} notes", rewritten.len());

        Ok(RenameReport { from, to, rewritten })
    }

    /// Canonicalize the deepest existing ancestor and check it is under the root.
    fn resolves_inside(&self, path: &Path) -> bool {
        path.ancestors()
            .find(|p| p.exists())
            .and_then(|p| fs::canonicalize(p).ok())
            .map(|p| p.starts_with(&self.root))
            .unwrap_or(false)
    }

    /// JSON-schema lint of quest and entity frontmatter.
    pub fn validate(&self) -> Result<Vec<ValidationIssue>, String> {
        let mut targets: Vec<(String, &'static serde_json::Value)> = Vec::new();
        {
            let quests = self.quests()?;
            targets.extend(quests.all().into_iter().map(|q| (q.path.clone(), &*QUEST_SCHEMA)));
            let campaign = self.campaign()?;
            targets.extend(
                campaign
                    .all()
                    .into_iter()
                    .map(|e| (e.path.clone(), get_schema_for_entity(e.entity_type))),
            );
        }
        targets.sort_by(|a, b| a.0.cmp(&b.0));

        let mut issues = Vec::new();
        for (rel, schema) in targets {
            let content = match fs::read_to_string(self.root.join(&rel)) {
                Ok(content) => content,
                Err(e) => {
                    log::warn!("[Vault] Skipping validation of {}: {}", rel, e);
                    continue;
                }
            };
            let Some(raw) = FrontmatterParser::split(&content).0 else {
                continue;
            };
            match FrontmatterParser::parse_yaml(&raw) {
                Ok(map) => {
                    for error in FrontmatterParser::validate(&map, schema)? {
                        issues.push(ValidationIssue {
                            path: rel.clone(),
                            pointer: error.path,
                            message: error.message,
                        });
                    }
                }
                Err(message) => issues.push(ValidationIssue {
                    path: rel.clone(),
                    pointer: String::new(),
                    message,
                }),
            }
        }
        Ok(issues)
    }

    /// Start a background watcher that keeps both indexes current.
    pub fn watch(&self, notices: Sender<VaultNotice>) -> Result<VaultWatcher, String> {
        VaultWatcher::start(self.clone(), notices)
    }
}

fn with_md_extension(path: &str) -> String {
    if path.to_lowercase().ends_with(".md") {
        path.to_string()
    } else {
        format!("{}.md", path)
    }
}

/// Feed one parsed file to both indexes; cloned only when both want it.
fn index_both(
    quests: &mut QuestIndex,
    campaign: &mut CampaignNotesIndex,
    meta: FileMetadata,
) -> EventOutcome {
    let to_campaign = campaign.accepts(&meta.path);
    let to_quests = quests.accepts(&meta.path);
    match (to_quests, to_campaign) {
        (true, true) => EventOutcome {
            quest: quests.upsert(meta.clone()),
            campaign: campaign.upsert(meta),
        },
        (true, false) => EventOutcome {
            quest: quests.upsert(meta),
            campaign: IndexChange::Ignored,
        },
        (false, true) => EventOutcome {
            quest: IndexChange::Ignored,
            campaign: campaign.upsert(meta),
        },
        (false, false) => EventOutcome {
            quest: IndexChange::Ignored,
            campaign: IndexChange::Ignored,
        },
    }
}
