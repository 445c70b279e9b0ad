//! Rewrites wiki-links after a note is renamed or moved.

use super::{is_fence, link_name, INLINE_CODE_RE, WIKI_LINK_RE};

/// Rewrites `[[old]]`, `[[old|alias]]`, `[[old#heading]]` and the path form
/// `[[folder/old]]` to point at the new note. Matching is case-insensitive,
/// like the link resolution it mirrors.
pub struct LinkRewriter {
    old_stem: String,
    old_path: String,
    new_stem: String,
    new_path: String,
}

fn without_md(path: &str) -> &str {
    path.strip_suffix(".md").unwrap_or(path)
}

impl LinkRewriter {
    /// Both paths vault-relative, with or without `.md`.
    pub fn new(old_path: &str, new_path: &str) -> Self {
        Self {
            old_stem: link_name(old_path).to_lowercase(),
            old_path: without_md(old_path).to_lowercase(),
            new_stem: link_name(new_path).to_string(),
            new_path: without_md(new_path).to_string(),
        }
    }

    fn rewrite_target(&self, target: &str) -> Option<String> {
        let had_ext = target.ends_with(".md");
        let bare = without_md(target.trim());
        let lower = bare.to_lowercase();
        let replacement = if lower.contains('/') {
            if lower != self.old_path {
                return None;
            }
            self.new_path.clone()
        } else {
            if lower != self.old_stem {
                return None;
            }
            self.new_stem.clone()
        };
        Some(if had_ext {
            format!("{}.md", replacement)
        } else {
            replacement
        })
    }

    /// `Some(updated)` when at least one link changed. Fenced code blocks and
    /// inline code spans are left as written.
    pub fn apply(&self, content: &str) -> Option<String> {
        let mut changed = false;
        let mut in_fence = false;
        let lines: Vec<String> = content
            .split('\n')
            .map(|line| {
                if is_fence(line) {
                    in_fence = !in_fence;
                    return line.to_string();
                }
                if in_fence {
                    return line.to_string();
                }
                self.rewrite_line(line, &mut changed)
            })
            .collect();
        if changed {
            Some(lines.join("\n"))
        } else {
            None
        }
    }

    fn rewrite_line(&self, line: &str, changed: &mut bool) -> String {
        let mut out = String::with_capacity(line.len());
        let mut last = 0;
        for code in INLINE_CODE_RE.find_iter(line) {
            out.push_str(&self.rewrite_links(&line[last..code.start()], changed));
            out.push_str(code.as_str());
            last = code.end();
        }
        out.push_str(&self.rewrite_links(&line[last..], changed));
        out
    }

    fn rewrite_links(&self, text: &str, changed: &mut bool) -> String {
        WIKI_LINK_RE
            .replace_all(text, |cap: &regex::Captures| {
                let inner = &cap[1];
                let split_at = inner.find(['#', '|']).unwrap_or(inner.len());
                let (target, rest) = inner.split_at(split_at);
                match self.rewrite_target(target) {
                    Some(new_target) => {
                        *changed = true;
                        format!("[[{}{}]]", new_target, rest)
                    }
                    None => cap[0].to_string(),
                }
            })
            .into_owned()
    }
}
