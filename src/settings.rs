//! Vault-local settings stored at `<vault>/.vaultkeeper/settings.json`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const STATE_DIR: &str = ".vaultkeeper";
const SETTINGS_FILE: &str = "settings.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewSettings {
    pub quest_interval_days: i64,
    pub area_interval_days: i64,
    pub waiting_interval_days: i64,
}

impl Default for ReviewSettings {
    fn default() -> Self {
        Self {
            quest_interval_days: 7,
            area_interval_days: 30,
            waiting_interval_days: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherSettings {
    /// Quiet period before a changed path is re-indexed
    pub debounce_ms: u64,
    /// Quiet period while a burst (e.g. a sync catching up) is in progress
    pub burst_debounce_ms: u64,
    /// Events within the 2 s window that count as a burst
    pub burst_threshold: usize,
}

impl Default for WatcherSettings {
    fn default() -> Self {
        Self {
            debounce_ms: 500,
            burst_debounce_ms: 2000,
            burst_threshold: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub quest_folders: Vec<String>,
    pub area_folders: Vec<String>,
    pub campaign_folders: Vec<String>,
    pub next_action_tag: String,
    pub review: ReviewSettings,
    pub watcher: WatcherSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            quest_folders: vec!["Quests".to_string()],
            area_folders: vec!["Areas".to_string()],
            campaign_folders: vec!["Campaign".to_string()],
            next_action_tag: "next".to_string(),
            review: ReviewSettings::default(),
            watcher: WatcherSettings::default(),
        }
    }
}

impl Settings {
    pub fn path_for(vault_path: &Path) -> PathBuf {
        vault_path.join(STATE_DIR).join(SETTINGS_FILE)
    }

    /// Defaults when the file is missing; a malformed file is an error.
    pub fn load(vault_path: &Path) -> Result<Self, String> {
        let path = Self::path_for(vault_path);
        if !path.exists() {
            log::info!("[Settings] No settings at {:?}, using defaults", path);
            return Ok(Self::default());
        }
        let content = fs::read_to_string(&path)
            .map_err(|e| format!("Failed to read settings {:?}: {}", path, e))?;
        let settings: Settings = serde_json::from_str(&content)
            .map_err(|e| format!("Failed to parse settings {:?}: {}", path, e))?;
        Ok(settings.normalized())
    }

    pub fn save(&self, vault_path: &Path) -> Result<(), String> {
        let dir = vault_path.join(STATE_DIR);
        if !dir.exists() {
            fs::create_dir_all(&dir).map_err(|e| e.to_string())?;
        }
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize settings: {}", e))?;
        crate::atomic_write_file(&Self::path_for(vault_path), content.as_bytes())
    }

    fn normalized(mut self) -> Self {
        for folders in [
            &mut self.quest_folders,
            &mut self.area_folders,
            &mut self.campaign_folders,
        ] {
            for folder in folders.iter_mut() {
                *folder = folder.replace('\\', "/").trim_matches('/').to_string();
            }
        }
        self.next_action_tag = self.next_action_tag.trim_start_matches('#').to_lowercase();
        self
    }

    /// Every folder any index reads from.
    pub fn indexed_folders(&self) -> Vec<String> {
        let mut folders: Vec<String> = self
            .quest_folders
            .iter()
            .chain(&self.area_folders)
            .chain(&self.campaign_folders)
            .cloned()
            .collect();
        folders.sort();
        folders.dedup();
        folders
    }
}
