use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Component, Path};
use std::time::SystemTime;

use crate::frontmatter::{self, FrontmatterMap, FrontmatterParser};
use crate::markdown::{self, Heading, WikiLink};

/// Pre-parsed view of one markdown file: everything the entity builders need
/// without touching the disk again.
#[derive(Debug, Clone)]
pub struct FileMetadata {
    /// Vault-relative path with `/` separators
    pub path: String,
    pub stem: String,
    pub frontmatter: FrontmatterMap,
    pub headings: Vec<Heading>,
    pub links: Vec<WikiLink>,
    pub tags: Vec<String>,
    pub content_hash: String,
    pub modified: Option<SystemTime>,
    pub content: String,
}

impl FileMetadata {
    pub fn from_content(path: &str, content: &str, modified: Option<SystemTime>) -> Self {
        let path = normalize_path(path);
        let stem = stem_of(&path);

        let frontmatter = match FrontmatterParser::split(content).0 {
            Some(raw) => FrontmatterParser::parse_yaml(&raw).unwrap_or_else(|e| {
                log::warn!("[Metadata] Ignoring frontmatter of {}: {}", path, e);
                FrontmatterMap::new()
            }),
            None => FrontmatterMap::new(),
        };

        let mut tags = frontmatter::extract_tags(&frontmatter);
        for tag in markdown::extract_inline_tags(content) {
            if !tags.contains(&tag) {
                tags.push(tag);
            }
        }

        FileMetadata {
            stem,
            headings: markdown::extract_headings(content),
            links: markdown::extract_wiki_links(content),
            tags,
            content_hash: content_hash(content.as_bytes()),
            modified,
            content: content.to_string(),
            frontmatter,
            path,
        }
    }

    /// Folder part of the relative path ("" at the vault root).
    pub fn folder(&self) -> &str {
        self.path.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
    }

    pub fn body_start_line(&self) -> usize {
        FrontmatterParser::body_start_line(&self.content)
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        let tag = tag.trim_start_matches('#').to_lowercase();
        self.tags.iter().any(|t| *t == tag)
    }
}

pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

pub fn normalize_path(path: &str) -> String {
    path.replace('\\', "/").trim_start_matches("./").trim_start_matches('/').to_string()
}

/// Normalize a user-supplied vault-relative path, rejecting anything that
/// could point outside the vault (`..` or drive-prefixed paths).
pub fn checked_relative(path: &str) -> Result<String, String> {
    let normalized = normalize_path(path.trim());
    if normalized.is_empty() {
        return Err("Path is empty".to_string());
    }
    let escapes = Path::new(&normalized)
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if escapes {
        return Err(format!("Path {} is outside the vault", path));
    }
    Ok(normalized)
}

pub fn stem_of(path: &str) -> String {
    let name = path.rsplit('/').next().unwrap_or(path);
    name.strip_suffix(".md").unwrap_or(name).to_string()
}

/// Vault-relative `/`-separated path of `abs_path`.
pub fn relative_path(root: &Path, abs_path: &Path) -> Result<String, String> {
    let rel = abs_path
        .strip_prefix(root)
        .map_err(|_| format!("Path {:?} is outside the vault {:?}", abs_path, root))?;
    Ok(normalize_path(&rel.to_string_lossy()))
}

/// Read and pre-parse one file.
pub fn extract(root: &Path, abs_path: &Path) -> Result<FileMetadata, String> {
    let rel = relative_path(root, abs_path)?;
    let content = fs::read_to_string(abs_path)
        .map_err(|e| format!("Failed to read {:?}: {}", abs_path, e))?;
    let modified = fs::metadata(abs_path).and_then(|m| m.modified()).ok();
    Ok(FileMetadata::from_content(&rel, &content, modified))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_checked_relative_rejects_escapes() {
        assert_eq!(checked_relative("./Quests\\Roof.md").unwrap(), "Quests/Roof.md");
        assert!(checked_relative("../Stolen").is_err());
        assert!(checked_relative("Quests/../../Stolen.md").is_err());
        assert!(checked_relative("   ").is_err());
    }

    #[test]
    fn test_from_content_collects_everything() {
        let content = "---\ntags: [npc]\n---\n# Mira Vane\nMember of [[Iron Guild]]. #villain #NPC\n";
        let meta = FileMetadata::from_content("Campaign\\Saltmarsh\\Mira Vane.md", content, None);
        assert_eq!(meta.path, "Campaign/Saltmarsh/Mira Vane.md");
        assert_eq!(meta.stem, "Mira Vane");
        assert_eq!(meta.folder(), "Campaign/Saltmarsh");
        assert_eq!(meta.tags, vec!["npc".to_string(), "villain".to_string()]);
        assert_eq!(meta.links.len(), 1);
        assert_eq!(meta.headings[0].text, "Mira Vane");
        assert_eq!(meta.body_start_line(), 3);
    }

    #[test]
    fn test_bad_yaml_yields_empty_frontmatter() {
        let meta = FileMetadata::from_content("a.md", "---\nkey: [oops\n---\nbody #tag\n", None);
        assert!(meta.frontmatter.is_empty());
        assert!(meta.has_tag("tag"));
    }

    #[test]
    fn test_hash_changes_with_content() {
        let a = FileMetadata::from_content("a.md", "one", None);
        let b = FileMetadata::from_content("a.md", "two", None);
        let c = FileMetadata::from_content("a.md", "one", None);
        assert_ne!(a.content_hash, b.content_hash);
        assert_eq!(a.content_hash, c.content_hash);
        assert_eq!(a.content_hash.len(), 64);
    }

    #[test]
    fn test_relative_path() {
        let root = PathBuf::from("/vault");
        assert_eq!(
            relative_path(&root, &PathBuf::from("/vault/Quests/Roof.md")).unwrap(),
            "Quests/Roof.md"
        );
        assert!(relative_path(&root, &PathBuf::from("/elsewhere/x.md")).is_err());
    }
}
