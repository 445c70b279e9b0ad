//! JSON read API for user scripts: `call("getQuest", {"id": "roof"})`.

use chrono::NaiveDate;
use serde::Serialize;
use serde_json::{json, Value};

use crate::campaign::{CampaignEntity, EntityType};
use crate::markdown::tasks::Task;
use crate::Vault;

pub const METHODS: [&str; 9] = [
    "getAllQuests",
    "getQuest",
    "getTasks",
    "getReviewItems",
    "getAllEntities",
    "getEntity",
    "getBacklinks",
    "getRelationships",
    "getScopes",
];

#[derive(Serialize)]
struct TaskRef<'a> {
    quest: &'a str,
    #[serde(flatten)]
    task: &'a Task,
}

pub struct ScriptApi<'a> {
    vault: &'a Vault,
}

impl<'a> ScriptApi<'a> {
    pub fn new(vault: &'a Vault) -> Self {
        Self { vault }
    }

    pub fn call(&self, method: &str, params: Value) -> Result<Value, String> {
        log::debug!("[ScriptApi] {} {}", method, params);
        match method {
            "getAllQuests" => {
                let quests = self.vault.quests()?;
                to_json(&quests.all())
            }
            "getQuest" => {
                let id = required(&params, "id")?;
                let quests = self.vault.quests()?;
                let quest = quests
                    .get_by_id(&id)
                    .ok_or_else(|| format!("quest not found: {}", id))?;
                to_json(quest)
            }
            "getTasks" => {
                let quests = self.vault.quests()?;
                let tasks = match optional(&params, "tag") {
                    Some(tag) => quests.tasks_with_tag(&tag),
                    None => quests.all_tasks(),
                };
                let refs: Vec<TaskRef> = tasks
                    .into_iter()
                    .map(|(quest, task)| TaskRef { quest, task })
                    .collect();
                to_json(&refs)
            }
            "getReviewItems" => {
                let today = match optional(&params, "today") {
                    Some(raw) => NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
                        .map_err(|e| format!("Invalid date '{}': {}", raw, e))?,
                    None => chrono::Local::now().date_naive(),
                };
                to_json(&self.vault.review(today)?)
            }
            "getAllEntities" => {
                let entity_type = match optional(&params, "type") {
                    Some(raw) => Some(
                        EntityType::parse(&raw).ok_or_else(|| format!("unknown entity type: {}", raw))?,
                    ),
                    None => None,
                };
                let scope = optional(&params, "scope");
                let tag = optional(&params, "tag").map(|t| t.trim_start_matches('#').to_lowercase());

                let campaign = self.vault.campaign()?;
                let entities: Vec<&CampaignEntity> = campaign
                    .all()
                    .into_iter()
                    .filter(|e| entity_type.map(|t| e.entity_type == t).unwrap_or(true))
                    .filter(|e| scope.as_ref().map(|s| e.scope == *s).unwrap_or(true))
                    .filter(|e| tag.as_ref().map(|t| e.tags.contains(t)).unwrap_or(true))
                    .collect();
                to_json(&entities)
            }
            "getEntity" => {
                let id = required(&params, "id")?;
                let campaign = self.vault.campaign()?;
                let entity = campaign
                    .get(&id)
                    .ok_or_else(|| format!("entity not found: {}", id))?;
                to_json(entity)
            }
            "getBacklinks" => {
                let id = required(&params, "id")?;
                let campaign = self.vault.campaign()?;
                if campaign.get(&id).is_none() {
                    return Err(format!("entity not found: {}", id));
                }
                let summaries: Vec<Value> = campaign
                    .backlinks(&id)
                    .into_iter()
                    .map(|e| json!({ "id": e.id, "name": e.name, "path": e.path, "type": e.entity_type }))
                    .collect();
                Ok(Value::Array(summaries))
            }
            "getRelationships" => {
                let id = required(&params, "id")?;
                let campaign = self.vault.campaign()?;
                if campaign.get(&id).is_none() {
                    return Err(format!("entity not found: {}", id));
                }
                to_json(&campaign.relationships(&id))
            }
            "getScopes" => {
                let campaign = self.vault.campaign()?;
                to_json(&campaign.scopes())
            }
            other => Err(format!("unknown method: {}", other)),
        }
    }
}

fn optional(params: &Value, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn required(params: &Value, key: &str) -> Result<String, String> {
    optional(params, key).ok_or_else(|| format!("missing parameter: {}", key))
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<Value, String> {
    serde_json::to_value(value).map_err(|e| format!("Failed to serialize result: {}", e))
}
