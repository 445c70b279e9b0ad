//! Line-based section splicing over markdown text.
//!
//! Every function takes the whole file and returns the whole rewritten file,
//! so callers can diff, test and atomically write the result.

use super::extract_headings;
use crate::frontmatter::FrontmatterParser;

/// Line span of a section: heading line, first body line, and the exclusive
/// end (next heading of the same or higher level, or end of file).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionSpan {
    pub heading_line: usize,
    pub level: u8,
    pub body_start: usize,
    pub end: usize,
}

pub fn find_section(content: &str, heading: &str) -> Option<SectionSpan> {
    let wanted = heading.trim().to_lowercase();
    let headings = extract_headings(content);
    let pos = headings
        .iter()
        .position(|h| h.text.to_lowercase() == wanted)?;
    let found = &headings[pos];
    let total_lines = content.split('\n').count();
    let end = headings[pos + 1..]
        .iter()
        .find(|h| h.level <= found.level)
        .map(|h| h.line)
        .unwrap_or(total_lines);
    Some(SectionSpan {
        heading_line: found.line,
        level: found.level,
        body_start: found.line + 1,
        end,
    })
}

/// First of `headings` that exists in the file.
pub fn find_any_section(content: &str, headings: &[&str]) -> Option<SectionSpan> {
    headings.iter().find_map(|h| find_section(content, h))
}

/// Section body with surrounding blank lines removed.
pub fn section_body(content: &str, heading: &str) -> Option<String> {
    let span = find_section(content, heading)?;
    let lines: Vec<&str> = content.split('\n').collect();
    let body = lines[span.body_start..span.end].join("\n");
    Some(body.trim_matches(|c| c == '\n' || c == '\r').trim_end().to_string())
}

fn body_lines(body: &str) -> Vec<&str> {
    let body = body.trim_end_matches('\n');
    if body.is_empty() {
        Vec::new()
    } else {
        body.split('\n').collect()
    }
}

fn append_new_section(content: &str, heading: &str, body: &str) -> String {
    let base = content.trim_end_matches('\n');
    let body = body.trim_end_matches('\n');
    let mut out = String::new();
    if !base.is_empty() {
        out.push_str(base);
        out.push_str("\n\n");
    }
    out.push_str("## ");
    out.push_str(heading.trim());
    out.push('\n');
    if !body.is_empty() {
        out.push_str(body);
        out.push('\n');
    }
    out
}

/// Replace the body of `heading`, appending a new `## heading` section when missing.
pub fn replace_section(content: &str, heading: &str, new_body: &str) -> String {
    let Some(span) = find_section(content, heading) else {
        return append_new_section(content, heading, new_body);
    };
    let lines: Vec<&str> = content.split('\n').collect();
    let mut out: Vec<&str> = lines[..span.body_start].to_vec();
    out.extend(body_lines(new_body));
    out.push("");
    if span.end < lines.len() {
        out.extend(&lines[span.end..]);
    }
    out.join("\n")
}

/// Insert `line` after the last non-blank line of the section.
pub fn append_to_section(content: &str, heading: &str, line: &str) -> String {
    let Some(span) = find_section(content, heading) else {
        return append_new_section(content, heading, line);
    };
    let mut lines: Vec<&str> = content.split('\n').collect();
    let insert_at = (span.body_start..span.end)
        .rev()
        .find(|&i| !lines[i].trim().is_empty())
        .map(|i| i + 1)
        .unwrap_or(span.body_start);
    lines.insert(insert_at, line);
    lines.join("\n")
}

/// Replace one line of the file by index.
pub fn replace_line(content: &str, index: usize, replacement: &str) -> Result<String, String> {
    let mut lines: Vec<&str> = content.split('\n').collect();
    if index >= lines.len() {
        return Err(format!("Line {} is out of range ({} lines)", index, lines.len()));
    }
    lines[index] = replacement;
    Ok(lines.join("\n"))
}

fn is_key_line(line: &str, key: &str) -> bool {
    line.strip_prefix(key)
        .map(|rest| rest.trim_start().starts_with(':'))
        .unwrap_or(false)
}

fn is_continuation(line: &str) -> bool {
    line.starts_with(' ') || line.starts_with('\t') || (line.starts_with('-') && !line.starts_with("---"))
}

/// Key line range `[start, end)` of a top-level frontmatter field.
fn field_range(lines: &[&str], close: usize, key: &str) -> Option<(usize, usize)> {
    let start = (1..close).find(|&i| is_key_line(lines[i], key))?;
    let mut end = start + 1;
    while end < close && is_continuation(lines[end]) {
        end += 1;
    }
    Some((start, end))
}

/// Set a top-level frontmatter field to a raw YAML value, keeping the rest of
/// the block byte-for-byte.
pub fn set_frontmatter_field(content: &str, key: &str, yaml_value: &str) -> String {
    let new_line = format!("{}: {}", key, yaml_value);
    let Some(close) = FrontmatterParser::closing_fence_line(content) else {
        return format!("---\n{}\n---\n{}", new_line, content);
    };
    let mut lines: Vec<&str> = content.split('\n').collect();
    match field_range(&lines, close, key) {
        Some((start, end)) => {
            lines.splice(start..end, [new_line.as_str()]);
        }
        None => lines.insert(close, &new_line),
    }
    lines.join("\n")
}

pub fn remove_frontmatter_field(content: &str, key: &str) -> String {
    let Some(close) = FrontmatterParser::closing_fence_line(content) else {
        return content.to_string();
    };
    let mut lines: Vec<&str> = content.split('\n').collect();
    if let Some((start, end)) = field_range(&lines, close, key) {
        lines.drain(start..end);
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUEST: &str = "---\nstatus: active\ntags:\n  - home\n---\n# Fix roof\n\n## Purpose\nKeep the rain out.\n\n## Tasks\n- [ ] buy shingles\n\n## Log\n- 2026-10-01 started\n";

    #[test]
    fn test_find_section_bounds() {
        let span = find_section(QUEST, "tasks").unwrap();
        assert_eq!(span.heading_line, 10);
        assert_eq!(span.body_start, 11);
        assert_eq!(span.end, 13);
        assert_eq!(span.level, 2);
    }

    #[test]
    fn test_section_stops_at_same_level_only() {
        let content = "## Tasks\n- [ ] a\n### Later\n- [ ] b\n## Log\n";
        let span = find_section(content, "Tasks").unwrap();
        assert_eq!(span.end, 4, "subheadings belong to the section");
    }

    #[test]
    fn test_section_body() {
        assert_eq!(section_body(QUEST, "Purpose").as_deref(), Some("Keep the rain out."));
        assert_eq!(section_body(QUEST, "Missing"), None);
    }

    #[test]
    fn test_replace_section_in_middle() {
        let out = replace_section(QUEST, "Purpose", "Stay dry.\nSave money.");
        assert!(out.contains("## Purpose\nStay dry.\nSave money.\n\n## Tasks\n"));
        assert!(!out.contains("Keep the rain out."));
    }

    #[test]
    fn test_replace_last_section_keeps_trailing_newline() {
        let out = replace_section(QUEST, "Log", "- 2026-10-02 done");
        assert!(out.ends_with("## Log\n- 2026-10-02 done\n"));
    }

    #[test]
    fn test_replace_missing_section_appends() {
        let out = replace_section("# Title\n", "Purpose", "Why.");
        assert_eq!(out, "# Title\n\n## Purpose\nWhy.\n");
    }

    #[test]
    fn test_append_to_section_skips_trailing_blank() {
        let out = append_to_section(QUEST, "Tasks", "- [ ] hire roofer");
        assert!(out.contains("- [ ] buy shingles\n- [ ] hire roofer\n\n## Log"));
    }

    #[test]
    fn test_append_to_empty_section() {
        let out = append_to_section("## Log\n", "Log", "- entry");
        assert_eq!(out, "## Log\n- entry\n");
    }

    #[test]
    fn test_set_existing_field_with_list_continuation() {
        let out = set_frontmatter_field(QUEST, "tags", "[garden]");
        assert!(out.starts_with("---\nstatus: active\ntags: [garden]\n---\n"));
    }

    #[test]
    fn test_set_new_field_and_without_frontmatter() {
        let out = set_frontmatter_field(QUEST, "reviewed", "2026-10-19");
        assert!(out.contains("  - home\nreviewed: 2026-10-19\n---\n"));

        let out = set_frontmatter_field("# Plain\n", "status", "active");
        assert_eq!(out, "---\nstatus: active\n---\n# Plain\n");
    }

    #[test]
    fn test_key_prefix_does_not_match() {
        let content = "---\nstatus_note: keep\nstatus: active\n---\n";
        let out = set_frontmatter_field(content, "status", "waiting");
        assert_eq!(out, "---\nstatus_note: keep\nstatus: waiting\n---\n");
    }

    #[test]
    fn test_remove_field() {
        let out = remove_frontmatter_field(QUEST, "tags");
        assert!(out.starts_with("---\nstatus: active\n---\n"));
    }
}
