use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::{strip_inline_tags, tags_in_line, wiki_links_in_line};

static TASK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([ \t]*)(?:[-*+]|\d+[.)])[ \t]+\[(.)\](?:[ \t]+(.*))?[ \t]*$").unwrap()
});

static DATE_MARKER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(📅|⏳|✅)️?\s*(\d{4}-\d{2}-\d{2})").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Open,
    Done,
    InProgress,
    Cancelled,
    Deferred,
    Question,
    Other(char),
}

impl TaskStatus {
    pub fn from_char(c: char) -> Self {
        match c {
            ' ' => TaskStatus::Open,
            'x' | 'X' => TaskStatus::Done,
            '/' => TaskStatus::InProgress,
            '-' => TaskStatus::Cancelled,
            '>' => TaskStatus::Deferred,
            '?' => TaskStatus::Question,
            other => TaskStatus::Other(other),
        }
    }

    pub fn as_char(&self) -> char {
        match self {
            TaskStatus::Open => ' ',
            TaskStatus::Done => 'x',
            TaskStatus::InProgress => '/',
            TaskStatus::Cancelled => '-',
            TaskStatus::Deferred => '>',
            TaskStatus::Question => '?',
            TaskStatus::Other(c) => *c,
        }
    }

    /// Still needs doing: open, in progress or a question.
    pub fn is_open(&self) -> bool {
        matches!(
            self,
            TaskStatus::Open | TaskStatus::InProgress | TaskStatus::Question
        )
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "open" | "todo" => Some(TaskStatus::Open),
            "done" | "complete" | "completed" => Some(TaskStatus::Done),
            "in-progress" | "in_progress" | "doing" => Some(TaskStatus::InProgress),
            "cancelled" | "canceled" => Some(TaskStatus::Cancelled),
            "deferred" => Some(TaskStatus::Deferred),
            "question" => Some(TaskStatus::Question),
            other => {
                let mut chars = other.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Some(TaskStatus::from_char(c)),
                    _ => None,
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub status: TaskStatus,
    pub text: String,
    pub raw: String,
    pub line: usize,
    pub indent: usize,
    pub tags: Vec<String>,
    pub due: Option<NaiveDate>,
    pub scheduled: Option<NaiveDate>,
    pub completed: Option<NaiveDate>,
    pub links: Vec<String>,
}

impl Task {
    pub fn has_tag(&self, tag: &str) -> bool {
        let tag = tag.trim_start_matches('#').to_lowercase();
        self.tags.iter().any(|t| *t == tag || t.starts_with(&format!("{}/", tag)))
    }

    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        self.status.is_open() && self.due.map(|d| d < today).unwrap_or(false)
    }
}

fn indent_level(whitespace: &str) -> usize {
    let tabs = whitespace.chars().filter(|c| *c == '\t').count();
    let spaces = whitespace.chars().filter(|c| *c == ' ').count();
    tabs + spaces / 2
}

/// Parse one checkbox line. `line` is its 0-based position in the file.
pub fn parse_task_line(raw: &str, line: usize) -> Option<Task> {
    let raw = raw.trim_end_matches('\r');
    let cap = TASK_RE.captures(raw)?;
    let status = TaskStatus::from_char(cap[2].chars().next()?);
    let rest = cap.get(3).map(|m| m.as_str()).unwrap_or("");

    let mut due = None;
    let mut scheduled = None;
    let mut completed = None;
    for marker in DATE_MARKER_RE.captures_iter(rest) {
        let date = NaiveDate::parse_from_str(&marker[2], "%Y-%m-%d").ok();
        match &marker[1] {
            "📅" => due = date,
            "⏳" => scheduled = date,
            _ => completed = date,
        }
    }

    let without_dates = DATE_MARKER_RE.replace_all(rest, " ");
    let text = strip_inline_tags(&without_dates)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");

    Some(Task {
        status,
        text,
        raw: raw.to_string(),
        line,
        indent: indent_level(&cap[1]),
        tags: tags_in_line(rest),
        due,
        scheduled,
        completed,
        links: wiki_links_in_line(rest)
            .into_iter()
            .map(|l| l.target)
            .collect(),
    })
}

/// Parse tasks in lines `[start, end)` of `content`, skipping fenced code.
pub fn parse_tasks(content: &str, start: usize, end: usize) -> Vec<Task> {
    let mut in_fence = false;
    let mut tasks = Vec::new();
    for (i, line) in content.split('\n').enumerate().skip(start).take(end.saturating_sub(start)) {
        let t = line.trim_start();
        if t.starts_with("```") || t.starts_with("~~~") {
            in_fence = !in_fence;
            continue;
        }
        if in_fence {
            continue;
        }
        if let Some(task) = parse_task_line(line, i) {
            tasks.push(task);
        }
    }
    tasks
}

/// Rewrite the checkbox character of a task line, keeping everything else.
pub fn with_status(raw: &str, status: TaskStatus) -> Option<String> {
    let cap = TASK_RE.captures(raw.trim_end_matches('\r'))?;
    let m = cap.get(2)?;
    let mut out = String::with_capacity(raw.len());
    out.push_str(&raw[..m.start()]);
    out.push(status.as_char());
    out.push_str(&raw[m.end()..]);
    Some(out)
}

/// Set or clear the `✅ date` marker on a task line.
pub fn with_completion(raw: &str, date: Option<NaiveDate>) -> String {
    let stripped = DATE_MARKER_RE.replace_all(raw, |cap: &regex::Captures| {
        if &cap[1] == "✅" {
            String::new()
        } else {
            cap[0].to_string()
        }
    });
    let trimmed = stripped.trim_end();
    match date {
        Some(d) => format!("{} ✅ {}", trimmed, d.format("%Y-%m-%d")),
        None => trimmed.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_open_task() {
        let task = parse_task_line("- [ ] foo #next", 3).unwrap();
        assert_eq!(task.status, TaskStatus::Open);
        assert_eq!(task.text, "foo");
        assert_eq!(task.tags, vec!["next".to_string()]);
        assert_eq!(task.line, 3);
        assert_eq!(task.indent, 0);
    }

    #[test]
    fn test_status_chars() {
        assert_eq!(parse_task_line("- [x] a", 0).unwrap().status, TaskStatus::Done);
        assert_eq!(parse_task_line("* [X] a", 0).unwrap().status, TaskStatus::Done);
        assert_eq!(parse_task_line("+ [/] a", 0).unwrap().status, TaskStatus::InProgress);
        assert_eq!(parse_task_line("1. [-] a", 0).unwrap().status, TaskStatus::Cancelled);
        assert_eq!(parse_task_line("- [>] a", 0).unwrap().status, TaskStatus::Deferred);
        assert_eq!(parse_task_line("- [!] a", 0).unwrap().status, TaskStatus::Other('!'));
    }

    #[test]
    fn test_not_a_task() {
        assert!(parse_task_line("- plain bullet", 0).is_none());
        assert!(parse_task_line("[ ] no marker", 0).is_none());
        assert!(parse_task_line("-[ ] no space", 0).is_none());
    }

    #[test]
    fn test_dates_links_and_indent() {
        let task = parse_task_line(
            "    - [ ] Call [[Mira Vane]] about the map #waiting 📅 2026-10-20 ⏳ 2026-10-18",
            7,
        )
        .unwrap();
        assert_eq!(task.indent, 2);
        assert_eq!(task.text, "Call [[Mira Vane]] about the map");
        assert_eq!(task.due, NaiveDate::from_ymd_opt(2026, 10, 20));
        assert_eq!(task.scheduled, NaiveDate::from_ymd_opt(2026, 10, 18));
        assert_eq!(task.links, vec!["Mira Vane".to_string()]);
        assert!(task.has_tag("#Waiting"));
        assert!(task.is_overdue(NaiveDate::from_ymd_opt(2026, 10, 21).unwrap()));
    }

    #[test]
    fn test_empty_task_text() {
        let task = parse_task_line("- [ ]", 0).unwrap();
        assert_eq!(task.text, "");
    }

    #[test]
    fn test_parse_tasks_skips_code() {
        let content = "- [ ] one\n```\n- [ ] fenced\n```\n- [x] two\n";
        let tasks = parse_tasks(content, 0, usize::MAX);
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[1].line, 4);
    }

    #[test]
    fn test_rewrite_status_and_completion() {
        let raw = "  - [ ] ship it 📅 2026-10-20";
        let done = with_status(raw, TaskStatus::Done).unwrap();
        assert_eq!(done, "  - [x] ship it 📅 2026-10-20");
        let stamped = with_completion(&done, NaiveDate::from_ymd_opt(2026, 10, 19));
        assert_eq!(stamped, "  - [x] ship it 📅 2026-10-20 ✅ 2026-10-19");
        assert_eq!(with_completion(&stamped, None), "  - [x] ship it 📅 2026-10-20");
    }
}
