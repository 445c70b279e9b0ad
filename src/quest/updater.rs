use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use super::model::{QuestStatus, LOG_HEADINGS, PURPOSE_HEADING, TASKS_HEADING};
use crate::markdown::sections::{
    append_to_section, find_any_section, replace_line, replace_section, set_frontmatter_field,
};
use crate::markdown::extract_headings;
use crate::markdown::tasks::{parse_task_line, with_completion, with_status, TaskStatus};

/// A single in-place change to a quest file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "edit", rename_all = "snake_case")]
pub enum QuestEdit {
    SetStatus { status: QuestStatus },
    MarkReviewed { date: NaiveDate },
    SetPurpose { text: String },
    AddTask { text: String },
    SetTaskStatus { line: usize, status: TaskStatus, today: NaiveDate },
    AddLogEntry { timestamp: NaiveDateTime, text: String },
}

impl QuestEdit {
    /// Rewrite `content`. Pure, so edits can be tested without a vault.
    pub fn apply(&self, content: &str) -> Result<String, String> {
        match self {
            QuestEdit::SetStatus { status } => {
                Ok(set_frontmatter_field(content, "status", status.as_str()))
            }
            QuestEdit::MarkReviewed { date } => Ok(set_frontmatter_field(
                content,
                "reviewed",
                &date.format("%Y-%m-%d").to_string(),
            )),
            QuestEdit::SetPurpose { text } => Ok(replace_section(content, PURPOSE_HEADING, text.trim())),
            QuestEdit::AddTask { text } => {
                let text = text.trim();
                if text.is_empty() {
                    return Err("Task text is empty".to_string());
                }
                Ok(append_to_section(content, TASKS_HEADING, &format!("- [ ] {}", text)))
            }
            QuestEdit::SetTaskStatus { line, status, today } => {
                set_task_status(content, *line, *status, *today)
            }
            QuestEdit::AddLogEntry { timestamp, text } => {
                // reuse the heading text as written, closing hashes stripped
                let heading = find_any_section(content, &LOG_HEADINGS)
                    .and_then(|span| {
                        extract_headings(content)
                            .into_iter()
                            .find(|h| h.line == span.heading_line)
                            .map(|h| h.text)
                    })
                    .unwrap_or_else(|| LOG_HEADINGS[0].to_string());
                let entry = format!("- {} {}", timestamp.format("%Y-%m-%d %H:%M"), text.trim());
                Ok(append_to_section(content, &heading, &entry))
            }
        }
    }
}

fn set_task_status(
    content: &str,
    line: usize,
    status: TaskStatus,
    today: NaiveDate,
) -> Result<String, String> {
    let raw = content
        .split('\n')
        .nth(line)
        .ok_or_else(|| format!("Line {} is out of range", line))?;
    if parse_task_line(raw, line).is_none() {
        return Err(format!("Line {} is not a task: {:?}", line, raw));
    }
    let rewritten = with_status(raw, status)
        .ok_or_else(|| format!("Failed to rewrite task on line {}", line))?;
    let completion = if status == TaskStatus::Done { Some(today) } else { None };
    let rewritten = with_completion(&rewritten, completion);
    replace_line(content, line, &rewritten)
}

/// Reads a quest file, applies edits and writes it back atomically.
pub struct QuestUpdater {
    path: PathBuf,
}

impl QuestUpdater {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Apply one edit. Returns the new content; the file is not touched when
    /// the edit changes nothing.
    pub fn apply(&self, edit: &QuestEdit) -> Result<String, String> {
        let content = fs::read_to_string(&self.path)
            .map_err(|e| format!("Failed to read quest {:?}: {}", self.path, e))?;
        let updated = edit.apply(&content)?;
        if updated != content {
            crate::atomic_write_file(&self.path, updated.as_bytes())?;
            log::info!("[QuestUpdater] Applied {:?} to {:?}", edit, self.path);
        }
        Ok(updated)
    }

    pub fn set_status(&self, status: QuestStatus) -> Result<String, String> {
        self.apply(&QuestEdit::SetStatus { status })
    }

    pub fn mark_reviewed(&self, date: NaiveDate) -> Result<String, String> {
        self.apply(&QuestEdit::MarkReviewed { date })
    }

    pub fn set_purpose(&self, text: &str) -> Result<String, String> {
        self.apply(&QuestEdit::SetPurpose { text: text.to_string() })
    }

    pub fn add_task(&self, text: &str) -> Result<String, String> {
        self.apply(&QuestEdit::AddTask { text: text.to_string() })
    }

    pub fn set_task_status(&self, line: usize, status: TaskStatus, today: NaiveDate) -> Result<String, String> {
        self.apply(&QuestEdit::SetTaskStatus { line, status, today })
    }

    pub fn add_log_entry(&self, timestamp: NaiveDateTime, text: &str) -> Result<String, String> {
        self.apply(&QuestEdit::AddLogEntry { timestamp, text: text.to_string() })
    }
}
