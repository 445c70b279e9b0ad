//! Finds quests that need a look during a weekly review.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::model::{QuestFile, QuestKind, QuestStatus};
use super::QuestIndex;
use crate::index::Indexer;
use crate::settings::ReviewSettings;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum ReviewReason {
    NeverReviewed,
    ReviewOverdue { days: i64 },
    NoNextAction,
    NoOpenTasks,
    OverdueTasks { count: usize },
    CompletedWithOpenTasks { count: usize },
    WaitingStale { days: i64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewItem {
    pub quest_id: String,
    pub name: String,
    pub path: String,
    pub kind: QuestKind,
    pub status: QuestStatus,
    pub priority: Option<u8>,
    pub reasons: Vec<ReviewReason>,
}

pub struct ReviewDetector<'a> {
    settings: &'a ReviewSettings,
    next_action_tag: String,
}

impl<'a> ReviewDetector<'a> {
    pub fn new(settings: &'a ReviewSettings) -> Self {
        Self {
            settings,
            next_action_tag: "next".to_string(),
        }
    }

    pub fn with_next_action_tag(mut self, tag: &str) -> Self {
        self.next_action_tag = tag.trim_start_matches('#').to_lowercase();
        self
    }

    /// One item per quest with at least one reason, by priority then name.
    pub fn detect(&self, index: &QuestIndex, today: NaiveDate) -> Vec<ReviewItem> {
        let mut items: Vec<ReviewItem> = index
            .all()
            .into_iter()
            .filter_map(|quest| {
                let reasons = self.reasons_for(quest, today);
                if reasons.is_empty() {
                    return None;
                }
                Some(ReviewItem {
                    quest_id: quest.id.clone(),
                    name: quest.name.clone(),
                    path: quest.path.clone(),
                    kind: quest.kind,
                    status: quest.status,
                    priority: quest.priority,
                    reasons,
                })
            })
            .collect();

        items.sort_by(|a, b| {
            let pa = a.priority.map(u16::from).unwrap_or(u16::MAX);
            let pb = b.priority.map(u16::from).unwrap_or(u16::MAX);
            pa.cmp(&pb)
                .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
                .then_with(|| a.path.cmp(&b.path))
        });
        log::debug!("[Review] {} of {} quests need review", items.len(), index.len());
        items
    }

    pub fn reasons_for(&self, quest: &QuestFile, today: NaiveDate) -> Vec<ReviewReason> {
        let mut reasons = Vec::new();
        let open = quest.open_tasks().count();
        let since_review = quest.reviewed.map(|r| (today - r).num_days());

        match quest.status {
            QuestStatus::Archived | QuestStatus::Someday => return reasons,
            QuestStatus::Completed => {
                if open > 0 {
                    reasons.push(ReviewReason::CompletedWithOpenTasks { count: open });
                }
                return reasons;
            }
            QuestStatus::Active => {
                let interval = match quest.kind {
                    QuestKind::Area => self.settings.area_interval_days,
                    QuestKind::Quest | QuestKind::Project => self.settings.quest_interval_days,
                };
                match since_review {
                    None => reasons.push(ReviewReason::NeverReviewed),
                    Some(days) if days > interval => {
                        reasons.push(ReviewReason::ReviewOverdue { days })
                    }
                    Some(_) => {}
                }
                if quest.kind != QuestKind::Area {
                    if open == 0 {
                        reasons.push(ReviewReason::NoOpenTasks);
                    } else if quest.next_actions(&self.next_action_tag).next().is_none() {
                        reasons.push(ReviewReason::NoNextAction);
                    }
                }
            }
            QuestStatus::Waiting => match since_review {
                None => reasons.push(ReviewReason::NeverReviewed),
                Some(days) if days > self.settings.waiting_interval_days => {
                    reasons.push(ReviewReason::WaitingStale { days })
                }
                Some(_) => {}
            },
        }

        let overdue = quest.tasks.iter().filter(|t| t.is_overdue(today)).count();
        if overdue > 0 {
            reasons.push(ReviewReason::OverdueTasks { count: overdue });
        }
        reasons
    }
}
