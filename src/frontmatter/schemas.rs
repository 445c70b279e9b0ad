use lazy_static::lazy_static;
use serde_json::json;

use crate::campaign::entity::EntityType;

const DATE_PATTERN: &str = "^[0-9]{4}-[0-9]{2}-[0-9]{2}";

fn extend_schema(base: &serde_json::Value, extra: serde_json::Value) -> serde_json::Value {
    let mut schema = base.clone();
    if let (Some(props), Some(extra)) = (
        schema
            .get_mut("properties")
            .and_then(|p| p.as_object_mut()),
        extra.as_object(),
    ) {
        for (key, value) in extra {
            props.insert(key.clone(), value.clone());
        }
    }
    schema
}

lazy_static! {
    static ref TAGS_PROPERTY: serde_json::Value = json!({
        "type": ["array", "string", "object", "null"],
        "items": { "type": "string" }
    });

    static ref LINK_LIST_PROPERTY: serde_json::Value = json!({
        "type": ["array", "string", "null"],
        "items": { "type": "string" }
    });

    pub static ref QUEST_SCHEMA: serde_json::Value = json!({
        "$schema": "http://json-schema.org/draft-07/schema#",
        "title": "Quest Schema",
        "type": "object",
        "properties": {
            "id": { "type": "string", "minLength": 1 },
            "type": {
                "type": "string",
                "enum": ["quest", "project", "area"],
                "description": "Quest kind"
            },
            "status": {
                "type": "string",
                "enum": ["active", "waiting", "someday", "completed", "archived"]
            },
            "priority": {
                "type": "integer",
                "minimum": 1,
                "maximum": 5
            },
            "area": { "type": "string", "description": "Parent area link" },
            "reviewed": {
                "type": "string",
                "pattern": DATE_PATTERN,
                "description": "Last review date (YYYY-MM-DD)"
            },
            "tags": *TAGS_PROPERTY
        }
    });

    pub static ref ENTITY_BASE_SCHEMA: serde_json::Value = json!({
        "$schema": "http://json-schema.org/draft-07/schema#",
        "title": "Campaign Entity Schema",
        "type": "object",
        "properties": {
            "type": { "type": "string", "minLength": 1 },
            "name": { "type": "string", "minLength": 1 },
            "campaign": { "type": "string", "minLength": 1 },
            "aliases": *LINK_LIST_PROPERTY,
            "tags": *TAGS_PROPERTY
        }
    });

    pub static ref NPC_SCHEMA: serde_json::Value = extend_schema(&ENTITY_BASE_SCHEMA, json!({
        "race": { "type": "string" },
        "occupation": { "type": "string" },
        "location": { "type": "string", "description": "Place link" },
        "groups": *LINK_LIST_PROPERTY,
        "alive": { "type": ["boolean", "string"] }
    }));

    pub static ref GROUP_SCHEMA: serde_json::Value = extend_schema(&ENTITY_BASE_SCHEMA, json!({
        "leader": { "type": "string" },
        "members": *LINK_LIST_PROPERTY,
        "base": { "type": "string" }
    }));

    pub static ref PLACE_SCHEMA: serde_json::Value = extend_schema(&ENTITY_BASE_SCHEMA, json!({
        "region": { "type": "string" }
    }));

    pub static ref ITEM_SCHEMA: serde_json::Value = extend_schema(&ENTITY_BASE_SCHEMA, json!({
        "owner": { "type": "string" }
    }));

    pub static ref SESSION_SCHEMA: serde_json::Value = extend_schema(&ENTITY_BASE_SCHEMA, json!({
        "session": { "type": ["integer", "string"] },
        "date": { "type": "string", "pattern": DATE_PATTERN }
    }));
}

pub fn get_schema_for_entity(entity_type: EntityType) -> &'static serde_json::Value {
    match entity_type {
        EntityType::Npc | EntityType::Pc => &NPC_SCHEMA,
        EntityType::Group => &GROUP_SCHEMA,
        EntityType::Place => &PLACE_SCHEMA,
        EntityType::Item => &ITEM_SCHEMA,
        EntityType::Session => &SESSION_SCHEMA,
        _ => &ENTITY_BASE_SCHEMA,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontmatter::FrontmatterParser;

    #[test]
    fn test_valid_quest_frontmatter() {
        let fm = FrontmatterParser::parse_yaml(
            "type: project\nstatus: active\npriority: 2\nreviewed: 2026-10-01\ntags: [home]",
        )
        .unwrap();
        let errors = FrontmatterParser::validate(&fm, &QUEST_SCHEMA).unwrap();
        assert!(errors.is_empty(), "unexpected errors: {:?}", errors);
    }

    #[test]
    fn test_invalid_quest_frontmatter() {
        let fm = FrontmatterParser::parse_yaml("status: paused\npriority: 9").unwrap();
        let errors = FrontmatterParser::validate(&fm, &QUEST_SCHEMA).unwrap();
        let paths: Vec<&str> = errors.iter().map(|e| e.path.as_str()).collect();
        assert!(paths.contains(&"/status"));
        assert!(paths.contains(&"/priority"));
    }

    #[test]
    fn test_group_schema_extends_base() {
        let fm = FrontmatterParser::parse_yaml("type: group\nmembers: 3").unwrap();
        let errors = FrontmatterParser::validate(&fm, get_schema_for_entity(EntityType::Group)).unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].path, "/members");
    }
}
