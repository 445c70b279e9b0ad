pub mod rename;
pub mod sections;
pub mod tasks;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::frontmatter::FrontmatterParser;

static HEADING_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(#{1,6})[ \t]+(.*?)(?:[ \t]+#+)?[ \t]*$").unwrap());

// .+? = non-greedy, stops at the first ]] so names containing ] still work
static WIKI_LINK_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[\[(.+?)\]\]").unwrap());

static INLINE_TAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:^|\s)#([\p{L}][\p{L}\p{N}_/-]*)").unwrap());

static INLINE_CODE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"`[^`]*`").unwrap());

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heading {
    pub level: u8,
    pub text: String,
    /// 0-based line in the whole file
    pub line: usize,
}

/// A parsed `[[target#heading|alias]]` reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WikiLink {
    pub target: String,
    pub heading: Option<String>,
    pub alias: Option<String>,
}

impl WikiLink {
    pub fn parse(inner: &str) -> Option<Self> {
        let (reference, alias) = match inner.split_once('|') {
            Some((r, a)) => (r, Some(a.trim().to_string()).filter(|a| !a.is_empty())),
            None => (inner, None),
        };
        let (target, heading) = match reference.split_once('#') {
            Some((t, h)) => (t, Some(h.trim().to_string()).filter(|h| !h.is_empty())),
            None => (reference, None),
        };
        let target = target.trim();
        if target.is_empty() {
            return None;
        }
        Some(WikiLink {
            target: target.to_string(),
            heading,
            alias,
        })
    }

    /// Note name the link resolves against: last path component, no `.md`.
    pub fn name(&self) -> &str {
        link_name(&self.target)
    }
}

pub fn link_name(target: &str) -> &str {
    let last = target.rsplit('/').next().unwrap_or(target);
    last.strip_suffix(".md").unwrap_or(last).trim()
}

fn is_fence(line: &str) -> bool {
    let t = line.trim_start();
    t.starts_with("```") || t.starts_with("~~~")
}

/// Iterate `(line_no, line)` over the markdown body, skipping the frontmatter
/// block and fenced code blocks.
pub(crate) fn prose_lines(content: &str) -> impl Iterator<Item = (usize, &str)> {
    let start = FrontmatterParser::body_start_line(content);
    let mut in_fence = false;
    content
        .split('\n')
        .enumerate()
        .skip(start)
        .filter_map(move |(i, line)| {
            let line = line.trim_end_matches('\r');
            if is_fence(line) {
                in_fence = !in_fence;
                return None;
            }
            if in_fence {
                None
            } else {
                Some((i, line))
            }
        })
}

pub fn extract_headings(content: &str) -> Vec<Heading> {
    prose_lines(content)
        .filter_map(|(i, line)| {
            let cap = HEADING_RE.captures(line)?;
            Some(Heading {
                level: cap[1].len() as u8,
                text: cap[2].trim().to_string(),
                line: i,
            })
        })
        .collect()
}

/// Extract wiki-links ([[...]]) from the body, embeds included.
pub fn extract_wiki_links(content: &str) -> Vec<WikiLink> {
    let mut links = Vec::new();
    for (_, line) in prose_lines(content) {
        links.extend(wiki_links_in_line(line));
    }
    links
}

pub fn wiki_links_in_line(line: &str) -> Vec<WikiLink> {
    let line = INLINE_CODE_RE.replace_all(line, "");
    WIKI_LINK_RE
        .captures_iter(&line)
        .filter_map(|cap| WikiLink::parse(&cap[1]))
        .collect()
}

/// Inline `#tags` from the body, lowercased without `#`, deduplicated.
pub fn extract_inline_tags(content: &str) -> Vec<String> {
    let mut tags = Vec::new();
    for (_, line) in prose_lines(content) {
        for tag in tags_in_line(line) {
            if !tags.contains(&tag) {
                tags.push(tag);
            }
        }
    }
    tags
}

pub fn tags_in_line(line: &str) -> Vec<String> {
    if HEADING_RE.is_match(line) {
        // heading markers are not tags, but tags inside heading text are
        let text = line.trim_start_matches('#');
        return tags_in_text(text);
    }
    tags_in_text(line)
}

fn tags_in_text(text: &str) -> Vec<String> {
    let text = INLINE_CODE_RE.replace_all(text, "");
    INLINE_TAG_RE
        .captures_iter(&text)
        .map(|cap| cap[1].trim_end_matches('/').to_lowercase())
        .collect()
}

pub(crate) fn strip_inline_tags(text: &str) -> String {
    INLINE_TAG_RE.replace_all(text, " ").to_string()
}

/// Lowercase, runs of non-alphanumerics collapsed to `-`.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_dash = false;
    for ch in name.chars() {
        if ch.is_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.extend(ch.to_lowercase());
        } else {
            pending_dash = true;
        }
    }
    slug
}

/// `"[[Name#h|alias]]"` -> `"Name"`; plain strings are trimmed and returned.
pub fn strip_link_brackets(value: &str) -> String {
    let trimmed = value.trim();
    if let Some(inner) = trimmed
        .strip_prefix("[[")
        .and_then(|rest| rest.strip_suffix("]]"))
    {
        return WikiLink::parse(inner)
            .map(|link| link.target)
            .unwrap_or_default();
    }
    trimmed.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headings_skip_frontmatter_and_code() {
        let content = "---\n# yaml comment\ntitle: x\n---\n# Title\n\n```\n## not a heading\n```\n## Tasks ##\n";
        let headings = extract_headings(content);
        assert_eq!(headings.len(), 2);
        assert_eq!(headings[0].text, "Title");
        assert_eq!(headings[0].line, 4);
        assert_eq!(headings[1].level, 2);
        assert_eq!(headings[1].text, "Tasks");
    }

    #[test]
    fn test_wiki_link_parts() {
        let links = extract_wiki_links("See [[Folder/Mira Vane#Early life|Mira]] and ![[map.png]].");
        assert_eq!(links.len(), 2);
        assert_eq!(links[0].target, "Folder/Mira Vane");
        assert_eq!(links[0].name(), "Mira Vane");
        assert_eq!(links[0].heading.as_deref(), Some("Early life"));
        assert_eq!(links[0].alias.as_deref(), Some("Mira"));
        assert_eq!(links[1].target, "map.png");
    }

    #[test]
    fn test_wiki_link_with_bracket_in_name() {
        let links = extract_wiki_links("[[[Draft] plan]]");
        assert_eq!(links[0].target, "[Draft] plan");
    }

    #[test]
    fn test_links_in_code_are_ignored() {
        let content = "`[[Nope]]` but [[Yes]]\n```\n[[Fenced]]\n```\n";
        let names: Vec<String> = extract_wiki_links(content)
            .into_iter()
            .map(|l| l.target)
            .collect();
        assert_eq!(names, vec!["Yes".to_string()]);
    }

    #[test]
    fn test_inline_tags() {
        let tags = extract_inline_tags("# Heading #Project\nsome #Next thing, issue#12 and #2024 `#code`\n");
        assert_eq!(tags, vec!["project".to_string(), "next".to_string()]);
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Mira Vane"), "mira-vane");
        assert_eq!(slugify("  The  Iron--Guild! "), "the-iron-guild");
        assert_eq!(slugify("Café Noir"), "café-noir");
    }

    #[test]
    fn test_strip_link_brackets() {
        assert_eq!(strip_link_brackets("[[Health|my health]]"), "Health");
        assert_eq!(strip_link_brackets("  Health "), "Health");
        assert_eq!(strip_link_brackets("[[Places/Harbor#Docks]]"), "Places/Harbor");
    }
}
