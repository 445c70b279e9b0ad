use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;

use crate::frontmatter::{self, FrontmatterMap};
use crate::index::FileMetadata;
use crate::markdown::{link_name, slugify, wiki_links_in_line};

pub const DEFAULT_SCOPE: &str = "default";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Npc,
    Pc,
    Group,
    Place,
    Item,
    Event,
    Session,
    Lore,
}

impl EntityType {
    pub const ALL: [EntityType; 8] = [
        EntityType::Npc,
        EntityType::Pc,
        EntityType::Group,
        EntityType::Place,
        EntityType::Item,
        EntityType::Event,
        EntityType::Session,
        EntityType::Lore,
    ];

    /// Case-insensitive, with the usual aliases.
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().trim_start_matches('#').to_lowercase().as_str() {
            "npc" | "character" => Some(EntityType::Npc),
            "pc" | "player" => Some(EntityType::Pc),
            "group" | "faction" | "organization" | "organisation" => Some(EntityType::Group),
            "place" | "location" => Some(EntityType::Place),
            "item" => Some(EntityType::Item),
            "event" => Some(EntityType::Event),
            "session" => Some(EntityType::Session),
            "lore" => Some(EntityType::Lore),
            _ => None,
        }
    }

    /// First tag naming a type; for nested tags only the last segment counts.
    pub fn from_tags(tags: &[String]) -> Option<Self> {
        tags.iter()
            .find_map(|t| Self::parse(t.rsplit('/').next().unwrap_or(t)))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Npc => "npc",
            EntityType::Pc => "pc",
            EntityType::Group => "group",
            EntityType::Place => "place",
            EntityType::Item => "item",
            EntityType::Event => "event",
            EntityType::Session => "session",
            EntityType::Lore => "lore",
        }
    }
}

/// Per-type fields. Link-valued fields hold note names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntityDetails {
    Npc {
        race: Option<String>,
        occupation: Option<String>,
        location: Option<String>,
        groups: Vec<String>,
        alive: Option<bool>,
    },
    Group {
        leader: Option<String>,
        members: Vec<String>,
        base: Option<String>,
    },
    Place {
        region: Option<String>,
    },
    Item {
        owner: Option<String>,
    },
    Session {
        number: Option<u32>,
        date: Option<NaiveDate>,
    },
    None,
}

impl EntityDetails {
    fn from_frontmatter(entity_type: EntityType, fm: &FrontmatterMap) -> Self {
        match entity_type {
            EntityType::Npc | EntityType::Pc => EntityDetails::Npc {
                race: frontmatter::get_str(fm, "race"),
                occupation: frontmatter::get_str(fm, "occupation"),
                location: first_link(fm, "location"),
                groups: link_values(fm, "groups"),
                alive: frontmatter::get_bool(fm, "alive"),
            },
            EntityType::Group => EntityDetails::Group {
                leader: first_link(fm, "leader"),
                members: link_values(fm, "members"),
                base: first_link(fm, "base"),
            },
            EntityType::Place => EntityDetails::Place {
                region: first_link(fm, "region"),
            },
            EntityType::Item => EntityDetails::Item {
                owner: first_link(fm, "owner"),
            },
            EntityType::Session => EntityDetails::Session {
                number: frontmatter::get_u32(fm, "session")
                    .or_else(|| frontmatter::get_u32(fm, "number")),
                date: frontmatter::get_date(fm, "date"),
            },
            EntityType::Event | EntityType::Lore => EntityDetails::None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignEntity {
    /// `<scope>/<slug(name)>`, possibly suffixed on collision
    pub id: String,
    pub name: String,
    pub path: String,
    pub entity_type: EntityType,
    pub scope: String,
    pub aliases: Vec<String>,
    pub tags: Vec<String>,
    /// Outgoing body link names, deduplicated
    pub links: Vec<String>,
    pub details: EntityDetails,
    pub content_hash: String,
}

impl CampaignEntity {
    /// `None` when the file names no entity type.
    pub fn from_metadata(meta: &FileMetadata, campaign_folder: &str) -> Option<Self> {
        let fm = &meta.frontmatter;
        let entity_type = match frontmatter::get_str(fm, "type") {
            Some(raw) => EntityType::parse(&raw).or_else(|| {
                log::debug!("[CampaignIndex] Unknown type '{}' in {}", raw, meta.path);
                EntityType::from_tags(&meta.tags)
            }),
            None => EntityType::from_tags(&meta.tags),
        }?;

        let name = frontmatter::get_str(fm, "name").unwrap_or_else(|| meta.stem.clone());
        let scope = frontmatter::get_str(fm, "campaign")
            .map(|c| slugify(&c))
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| scope_from_path(&meta.path, campaign_folder));

        let mut links: Vec<String> = Vec::new();
        for link in &meta.links {
            let name = link.name().to_string();
            if !name.is_empty() && !links.iter().any(|l| l.eq_ignore_ascii_case(&name)) {
                links.push(name);
            }
        }

        Some(CampaignEntity {
            id: format!("{}/{}", scope, slugify(&name)),
            details: EntityDetails::from_frontmatter(entity_type, fm),
            aliases: link_values(fm, "aliases"),
            tags: meta.tags.clone(),
            path: meta.path.clone(),
            content_hash: meta.content_hash.clone(),
            entity_type,
            scope,
            name,
            links,
        })
    }

    /// Link names from typed fields, with the relation each one implies.
    pub fn field_links(&self) -> Vec<(&'static str, &str)> {
        let mut out = Vec::new();
        match &self.details {
            EntityDetails::Npc { location, groups, .. } => {
                out.extend(location.as_deref().map(|l| ("location", l)));
                out.extend(groups.iter().map(|g| ("groups", g.as_str())));
            }
            EntityDetails::Group { leader, members, base } => {
                out.extend(leader.as_deref().map(|l| ("leader", l)));
                out.extend(members.iter().map(|m| ("members", m.as_str())));
                out.extend(base.as_deref().map(|b| ("base", b)));
            }
            EntityDetails::Place { region } => out.extend(region.as_deref().map(|r| ("region", r))),
            EntityDetails::Item { owner } => out.extend(owner.as_deref().map(|o| ("owner", o))),
            EntityDetails::Session { .. } | EntityDetails::None => {}
        }
        out
    }
}

/// First folder below the campaign folder, or `default` for top-level files.
pub fn scope_from_path(path: &str, campaign_folder: &str) -> String {
    let folder = campaign_folder.trim_matches('/');
    let rest = if folder.is_empty() {
        path
    } else {
        path.strip_prefix(folder)
            .and_then(|r| r.strip_prefix('/'))
            .unwrap_or(path)
    };
    match rest.split_once('/') {
        Some((first, _)) => {
            let scope = slugify(first);
            if scope.is_empty() {
                DEFAULT_SCOPE.to_string()
            } else {
                scope
            }
        }
        None => DEFAULT_SCOPE.to_string(),
    }
}

/// Link names of a field holding `"[[X]]"`, `"X"` or a list of either.
/// Unquoted `[[X]]` parses as a nested YAML list, so sequences are flattened.
pub fn link_values(fm: &FrontmatterMap, key: &str) -> Vec<String> {
    let mut out = Vec::new();
    if let Some(value) = fm.get(key) {
        collect_links(value, &mut out);
    }
    out
}

fn first_link(fm: &FrontmatterMap, key: &str) -> Option<String> {
    link_values(fm, key).into_iter().next()
}

fn collect_links(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::Sequence(seq) => {
            for item in seq {
                collect_links(item, out);
            }
        }
        Value::String(s) => {
            let links = wiki_links_in_line(s);
            let names: Vec<String> = if links.is_empty() {
                vec![link_name(s.trim()).to_string()]
            } else {
                links.iter().map(|l| l.name().to_string()).collect()
            };
            for name in names {
                if !name.is_empty() && !out.contains(&name) {
                    out.push(name);
                }
            }
        }
        Value::Number(n) => out.push(n.to_string()),
        _ => {}
    }
}
