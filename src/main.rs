use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::process;
use std::sync::mpsc;

use vaultkeeper::api::ScriptApi;
use vaultkeeper::campaign::EntityType;
use vaultkeeper::markdown::tasks::TaskStatus;
use vaultkeeper::quest::{QuestEdit, QuestKind, QuestStatus};
use vaultkeeper::watcher::VaultNotice;
use vaultkeeper::Vault;

#[derive(Debug, Parser)]
#[command(name = "vaultkeeper", version, about = "Quest and campaign index for a markdown vault")]
struct Cli {
    /// Path to the vault.
    #[arg(long, env = "VAULTKEEPER_VAULT", global = true, default_value = ".")]
    vault: PathBuf,

    /// Log level when RUST_LOG is not set.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List quests, projects and areas.
    Quests {
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        kind: Option<String>,
    },
    /// Show one quest as JSON.
    Quest { id: String },
    /// List tasks, optionally only those with a tag.
    Tasks {
        #[arg(long)]
        tag: Option<String>,
    },
    /// Quests that need attention.
    Review {
        /// Review date (YYYY-MM-DD), defaults to today.
        #[arg(long)]
        today: Option<NaiveDate>,
    },
    /// List campaign entities.
    Entities {
        #[arg(long = "type")]
        entity_type: Option<String>,
        #[arg(long)]
        scope: Option<String>,
        #[arg(long)]
        tag: Option<String>,
    },
    /// Show one entity with backlinks and relationships.
    Entity { id: String },
    /// Append a timestamped entry to a quest's log.
    Log {
        id: String,
        #[arg(required = true, trailing_var_arg = true)]
        text: Vec<String>,
    },
    /// Mark the task on a line as done.
    Done { id: String, line: usize },
    /// Rename or move a note and rewrite links to it.
    Rename { from: String, to: String },
    /// Check frontmatter against the quest and entity schemas.
    Validate,
    /// Call a script API method with JSON params.
    Api {
        method: String,
        #[arg(default_value = "{}")]
        params: String,
    },
    /// Watch the vault and print index changes.
    Watch,
}

fn main() {
    let cli = Cli::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&cli.log_level)).init();

    if let Err(e) = run(cli) {
        log::error!("{}", e);
        eprintln!("error: {}", e);
        process::exit(1);
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), String> {
    let out = serde_json::to_string_pretty(value).map_err(|e| format!("Failed to serialize output: {}", e))?;
    println!("{}", out);
    Ok(())
}

fn run(cli: Cli) -> Result<(), String> {
    let vault = Vault::open(&cli.vault)?;

    match cli.command {
        Command::Quests { status, kind } => {
            let status = status
                .map(|s| QuestStatus::parse(&s).ok_or_else(|| format!("Unknown status: {}", s)))
                .transpose()?;
            let kind = kind
                .map(|k| QuestKind::parse(&k).ok_or_else(|| format!("Unknown kind: {}", k)))
                .transpose()?;
            let quests = vault.quests()?;
            for quest in quests.all() {
                if status.map(|s| quest.status != s).unwrap_or(false)
                    || kind.map(|k| quest.kind != k).unwrap_or(false)
                {
                    continue;
                }
                println!(
                    "{:<24} {:<8} {:<10} {} open  {}",
                    quest.id,
                    format!("{:?}", quest.kind).to_lowercase(),
                    quest.status.as_str(),
                    quest.open_tasks().count(),
                    quest.path
                );
            }
        }
        Command::Quest { id } => {
            let quests = vault.quests()?;
            let quest = quests.get_by_id(&id).ok_or_else(|| format!("Quest not found: {}", id))?;
            print_json(quest)?;
        }
        Command::Tasks { tag } => {
            let quests = vault.quests()?;
            let tasks = match &tag {
                Some(tag) => quests.tasks_with_tag(tag),
                None => quests.all_tasks(),
            };
            for (quest_id, task) in tasks {
                println!("{:<24} {:>4}  [{}] {}", quest_id, task.line, task.status.as_char(), task.text);
            }
        }
        Command::Review { today } => {
            let today = today.unwrap_or_else(|| Local::now().date_naive());
            print_json(&vault.review(today)?)?;
        }
        Command::Entities { entity_type, scope, tag } => {
            let mut params = serde_json::Map::new();
            if let Some(t) = entity_type {
                EntityType::parse(&t).ok_or_else(|| format!("Unknown entity type: {}", t))?;
                params.insert("type".into(), t.into());
            }
            if let Some(s) = scope {
                params.insert("scope".into(), s.into());
            }
            if let Some(t) = tag {
                params.insert("tag".into(), t.into());
            }
            let result = ScriptApi::new(&vault).call("getAllEntities", params.into())?;
            for entity in result.as_array().into_iter().flatten() {
                println!(
                    "{:<32} {:<8} {}",
                    entity["id"].as_str().unwrap_or_default(),
                    entity["entity_type"].as_str().unwrap_or_default(),
                    entity["path"].as_str().unwrap_or_default()
                );
            }
        }
        Command::Entity { id } => {
            let api = ScriptApi::new(&vault);
            let params = serde_json::json!({ "id": id });
            print_json(&serde_json::json!({
                "entity": api.call("getEntity", params.clone())?,
                "backlinks": api.call("getBacklinks", params.clone())?,
                "relationships": api.call("getRelationships", params)?,
            }))?;
        }
        Command::Log { id, text } => {
            let edit = QuestEdit::AddLogEntry {
                timestamp: Local::now().naive_local(),
                text: text.join(" "),
            };
            let quest = vault.update_quest(&id, &edit)?;
            println!("{}: {} log entries", quest.id, quest.log.len());
        }
        Command::Done { id, line } => {
            let edit = QuestEdit::SetTaskStatus {
                line,
                status: TaskStatus::Done,
                today: Local::now().date_naive(),
            };
            let quest = vault.update_quest(&id, &edit)?;
            println!("{}: {} open tasks", quest.id, quest.open_tasks().count());
        }
        Command::Rename { from, to } => {
            print_json(&vault.rename_note(&from, &to)?)?;
        }
        Command::Validate => {
            let issues = vault.validate()?;
            for issue in &issues {
                println!("{}{} {}", issue.path, issue.pointer, issue.message);
            }
            if !issues.is_empty() {
                return Err(format!("{} frontmatter issues", issues.len()));
            }
        }
        Command::Api { method, params } => {
            let params = serde_json::from_str(&params)
                .map_err(|e| format!("Failed to parse params: {}", e))?;
            print_json(&ScriptApi::new(&vault).call(&method, params)?)?;
        }
        Command::Watch => {
            let (tx, rx) = mpsc::channel();
            let _watcher = vault.watch(tx)?;
            for notice in rx {
                if let VaultNotice::Indexed { outcome, .. } = &notice {
                    if !outcome.is_mutation() {
                        continue;
                    }
                }
                println!(
                    "{}",
                    serde_json::to_string(&notice).map_err(|e| format!("Failed to serialize notice: {}", e))?
                );
            }
        }
    }
    Ok(())
}
