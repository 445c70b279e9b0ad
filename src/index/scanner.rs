use rayon::prelude::*;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

use super::metadata::{self, FileMetadata};

/// Suffix of temp files written by `atomic_write_file`.
pub const TEMP_SUFFIX: &str = ".vaultkeeper-tmp";

pub struct VaultScanner {
    root: PathBuf,
    folders: Vec<String>,
}

impl VaultScanner {
    /// `folders` are vault-relative; an empty list (or an empty entry) means the whole vault.
    pub fn new(root: impl Into<PathBuf>, folders: &[String]) -> Self {
        let mut folders: Vec<String> = folders
            .iter()
            .map(|f| f.replace('\\', "/").trim_matches('/').to_string())
            .collect();
        if folders.iter().any(|f| f.is_empty()) {
            folders.clear();
        }
        folders.sort();
        folders.dedup();
        Self {
            root: root.into(),
            folders,
        }
    }

    fn start_dirs(&self) -> Vec<PathBuf> {
        if self.folders.is_empty() {
            return vec![self.root.clone()];
        }
        // nested folders would be walked twice
        let mut dirs: Vec<&String> = Vec::new();
        for folder in &self.folders {
            if !dirs.iter().any(|d| folder.starts_with(&format!("{}/", d))) {
                dirs.push(folder);
            }
        }
        dirs.into_iter().map(|f| self.root.join(f)).collect()
    }

    /// Parallel file collection using walkdir, sorted by path
    pub fn collect_markdown_files(&self) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = self
            .start_dirs()
            .into_iter()
            .filter(|dir| dir.is_dir())
            .flat_map(|dir| {
                WalkDir::new(dir)
                    .into_iter()
                    .filter_entry(|entry| {
                        entry.depth() == 0 || !entry.file_name().to_string_lossy().starts_with('.')
                    })
                    .par_bridge()
                    .filter_map(|entry| entry.ok())
                    .filter(|entry| {
                        entry.file_type().is_file() && should_process_path(entry.path(), &self.root)
                    })
                    .map(|entry| entry.into_path())
                    .collect::<Vec<_>>()
            })
            .collect();
        files.sort();
        files
    }

    /// Collect and pre-parse every file in parallel. Unreadable files are logged and skipped.
    pub fn scan(&self) -> Vec<FileMetadata> {
        let files = self.collect_markdown_files();
        log::info!("[Scanner] Parsing {} markdown files", files.len());
        let mut parsed: Vec<FileMetadata> = files
            .par_iter()
            .filter_map(|path| match metadata::extract(&self.root, path) {
                Ok(meta) => Some(meta),
                Err(e) => {
                    log::warn!("[Scanner] Skipping {}: {}", path.display(), e);
                    None
                }
            })
            .collect();
        parsed.sort_by(|a, b| a.path.cmp(&b.path));
        parsed
    }
}

/// Markdown files only; hidden components and atomic-write temp files are skipped.
pub fn should_process_path(path: &Path, vault_path: &Path) -> bool {
    let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");

    if file_name.ends_with(TEMP_SUFFIX) {
        return false;
    }

    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    if !extension.eq_ignore_ascii_case("md") {
        return false;
    }

    let relative = path.strip_prefix(vault_path).unwrap_or(path);
    for component in relative.components() {
        if let Component::Normal(name) = component {
            if name.to_string_lossy().starts_with('.') {
                return false;
            }
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_processes_md_files() {
        let vault = PathBuf::from("/vault");
        assert!(should_process_path(&PathBuf::from("/vault/note.md"), &vault));
        assert!(should_process_path(&PathBuf::from("/vault/Quests/Roof.MD"), &vault));
    }

    #[test]
    fn test_skips_tmp_hidden_and_other_files() {
        let vault = PathBuf::from("/vault");
        assert!(!should_process_path(&PathBuf::from("/vault/note.md.vaultkeeper-tmp"), &vault));
        assert!(!should_process_path(&PathBuf::from("/vault/.obsidian/cache.md"), &vault));
        assert!(!should_process_path(&PathBuf::from("/vault/.hidden.md"), &vault));
        assert!(!should_process_path(&PathBuf::from("/vault/image.png"), &vault));
    }

    #[test]
    fn test_hidden_vault_root_is_allowed() {
        let vault = PathBuf::from("/home/me/.vault");
        assert!(should_process_path(&PathBuf::from("/home/me/.vault/a.md"), &vault));
    }

    #[test]
    fn test_collect_only_configured_folders() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir_all(root.join("Quests/Sub")).unwrap();
        fs::create_dir_all(root.join("Journal")).unwrap();
        fs::create_dir_all(root.join("Quests/.trash")).unwrap();
        fs::write(root.join("Quests/a.md"), "a").unwrap();
        fs::write(root.join("Quests/Sub/b.md"), "b").unwrap();
        fs::write(root.join("Quests/.trash/c.md"), "c").unwrap();
        fs::write(root.join("Journal/d.md"), "d").unwrap();

        let scanner = VaultScanner::new(
            root,
            &["Quests".to_string(), "Quests/Sub".to_string(), "Missing".to_string()],
        );
        let files = scanner.collect_markdown_files();
        assert_eq!(files, vec![root.join("Quests/Sub/b.md"), root.join("Quests/a.md")]);

        let all = VaultScanner::new(root, &[]).scan();
        let paths: Vec<&str> = all.iter().map(|m| m.path.as_str()).collect();
        assert_eq!(paths, vec!["Journal/d.md", "Quests/Sub/b.md", "Quests/a.md"]);
    }
}
