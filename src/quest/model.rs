use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::frontmatter;
use crate::index::FileMetadata;
use crate::markdown::sections::{find_any_section, find_section};
use crate::markdown::tasks::{parse_tasks, Task};
use crate::markdown::{slugify, strip_link_brackets};

pub const PURPOSE_HEADING: &str = "Purpose";
pub const TASKS_HEADING: &str = "Tasks";
pub const LOG_HEADINGS: [&str; 2] = ["Log", "Logs"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestKind {
    Quest,
    Project,
    Area,
}

impl QuestKind {
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "quest" => Some(QuestKind::Quest),
            "project" => Some(QuestKind::Project),
            "area" => Some(QuestKind::Area),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestStatus {
    Active,
    Waiting,
    Someday,
    Completed,
    Archived,
}

impl QuestStatus {
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "active" => Some(QuestStatus::Active),
            "waiting" => Some(QuestStatus::Waiting),
            "someday" => Some(QuestStatus::Someday),
            "completed" | "done" => Some(QuestStatus::Completed),
            "archived" => Some(QuestStatus::Archived),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QuestStatus::Active => "active",
            QuestStatus::Waiting => "waiting",
            QuestStatus::Someday => "someday",
            QuestStatus::Completed => "completed",
            QuestStatus::Archived => "archived",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestFile {
    pub id: String,
    pub name: String,
    pub path: String,
    pub kind: QuestKind,
    pub status: QuestStatus,
    pub priority: Option<u8>,
    pub area: Option<String>,
    pub reviewed: Option<NaiveDate>,
    pub tags: Vec<String>,
    pub purpose: String,
    pub tasks: Vec<Task>,
    pub log: Vec<String>,
    pub content_hash: String,
}

impl QuestFile {
    /// Build from metadata. The id is the base id; the index may suffix it.
    pub fn from_metadata(meta: &FileMetadata, in_area_folder: bool) -> Self {
        let fm = &meta.frontmatter;
        let kind = frontmatter::get_str(fm, "type")
            .and_then(|t| QuestKind::parse(&t))
            .unwrap_or(if in_area_folder { QuestKind::Area } else { QuestKind::Quest });

        let status = match frontmatter::get_str(fm, "status") {
            Some(raw) => QuestStatus::parse(&raw).unwrap_or_else(|| {
                log::warn!("[QuestIndex] Unknown status '{}' in {}, treating as active", raw, meta.path);
                QuestStatus::Active
            }),
            None => QuestStatus::Active,
        };

        let lines: Vec<&str> = meta.content.split('\n').collect();
        let section_text = |start: usize, end: usize| -> String {
            lines[start..end].join("\n").trim().to_string()
        };

        let purpose = find_section(&meta.content, PURPOSE_HEADING)
            .map(|span| section_text(span.body_start, span.end))
            .unwrap_or_default();

        let tasks = match find_section(&meta.content, TASKS_HEADING) {
            Some(span) => parse_tasks(&meta.content, span.body_start, span.end),
            None => parse_tasks(&meta.content, meta.body_start_line(), lines.len()),
        };

        let log = find_any_section(&meta.content, &LOG_HEADINGS)
            .map(|span| {
                lines[span.body_start..span.end]
                    .iter()
                    .map(|l| l.trim())
                    .filter_map(|l| l.strip_prefix("- ").or_else(|| l.strip_prefix("* ")))
                    .map(|l| l.trim().to_string())
                    .filter(|l| !l.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        QuestFile {
            id: base_id(meta),
            name: meta.stem.clone(),
            path: meta.path.clone(),
            kind,
            status,
            priority: frontmatter::get_u32(fm, "priority").and_then(|p| u8::try_from(p).ok()),
            area: frontmatter::get_str(fm, "area")
                .map(|a| strip_link_brackets(&a))
                .filter(|a| !a.is_empty()),
            reviewed: frontmatter::get_date(fm, "reviewed"),
            tags: meta.tags.clone(),
            purpose,
            tasks,
            log,
            content_hash: meta.content_hash.clone(),
        }
    }

    pub fn open_tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.iter().filter(|t| t.status.is_open())
    }

    pub fn next_actions<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = &'a Task> + 'a {
        self.open_tasks().filter(move |t| t.has_tag(tag))
    }

    pub fn is_live(&self) -> bool {
        matches!(self.status, QuestStatus::Active | QuestStatus::Waiting)
    }
}

/// The frontmatter `id` string as written, else the slug of the stem.
pub fn base_id(meta: &FileMetadata) -> String {
    meta.frontmatter
        .get("id")
        .and_then(|v| v.as_str())
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| slugify(&meta.stem))
}
