use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

use super::entity::{CampaignEntity, EntityDetails};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    MemberOf,
    Leads,
    LocatedIn,
    BasedAt,
    PartOf,
    Owns,
    Mentions,
}

impl RelationKind {
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().replace(['-', ' '], "_").as_str() {
            "member_of" | "memberof" => Some(RelationKind::MemberOf),
            "leads" => Some(RelationKind::Leads),
            "located_in" | "locatedin" => Some(RelationKind::LocatedIn),
            "based_at" | "basedat" => Some(RelationKind::BasedAt),
            "part_of" | "partof" => Some(RelationKind::PartOf),
            "owns" => Some(RelationKind::Owns),
            "mentions" => Some(RelationKind::Mentions),
            _ => None,
        }
    }
}

/// A directed edge between two entity ids of the same scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Relationship {
    pub source: String,
    pub target: String,
    pub kind: RelationKind,
}

impl Relationship {
    fn new(source: &str, target: &str, kind: RelationKind) -> Self {
        Self {
            source: source.to_string(),
            target: target.to_string(),
            kind,
        }
    }

    /// The endpoint that is not `id`.
    pub fn other(&self, id: &str) -> &str {
        if self.source == id {
            &self.target
        } else {
            &self.source
        }
    }
}

fn add(source: &str, target: &str, kind: RelationKind, edges: &mut BTreeSet<Relationship>) {
    if source != target {
        edges.insert(Relationship::new(source, target, kind));
    }
}

/// Relationship graph of one scope with adjacency in both directions.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScopeGraph {
    pub scope: String,
    pub nodes: Vec<String>,
    pub edges: Vec<Relationship>,
    #[serde(skip)]
    outgoing: HashMap<String, Vec<usize>>,
    #[serde(skip)]
    incoming: HashMap<String, Vec<usize>>,
}

impl ScopeGraph {
    /// Build from the entities of one scope. `resolve` maps a link name to an
    /// entity id of the same scope; unresolved names produce no edge.
    pub fn build<F>(scope: &str, entities: &[&CampaignEntity], resolve: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut edges: BTreeSet<Relationship> = BTreeSet::new();

        for entity in entities {
            let id = entity.id.as_str();
            let mut typed_targets: BTreeSet<String> = BTreeSet::new();

            match &entity.details {
                EntityDetails::Npc { location, groups, .. } => {
                    for group in groups.iter().filter_map(|g| resolve(g)) {
                        add(id, &group, RelationKind::MemberOf, &mut edges);
                        typed_targets.insert(group);
                    }
                    if let Some(place) = location.as_deref().and_then(|l| resolve(l)) {
                        add(id, &place, RelationKind::LocatedIn, &mut edges);
                        typed_targets.insert(place);
                    }
                }
                EntityDetails::Group { leader, members, base } => {
                    if let Some(leader) = leader.as_deref().and_then(|l| resolve(l)) {
                        add(&leader, id, RelationKind::Leads, &mut edges);
                        typed_targets.insert(leader);
                    }
                    for member in members.iter().filter_map(|m| resolve(m)) {
                        add(&member, id, RelationKind::MemberOf, &mut edges);
                        typed_targets.insert(member);
                    }
                    if let Some(place) = base.as_deref().and_then(|b| resolve(b)) {
                        add(id, &place, RelationKind::BasedAt, &mut edges);
                        typed_targets.insert(place);
                    }
                }
                EntityDetails::Place { region } => {
                    if let Some(region) = region.as_deref().and_then(|r| resolve(r)) {
                        add(id, &region, RelationKind::PartOf, &mut edges);
                        typed_targets.insert(region);
                    }
                }
                EntityDetails::Item { owner } => {
                    if let Some(owner) = owner.as_deref().and_then(|o| resolve(o)) {
                        add(&owner, id, RelationKind::Owns, &mut edges);
                        typed_targets.insert(owner);
                    }
                }
                EntityDetails::Session { .. } | EntityDetails::None => {}
            }

            for target in entity.links.iter().filter_map(|l| resolve(l)) {
                if !typed_targets.contains(&target) {
                    add(id, &target, RelationKind::Mentions, &mut edges);
                }
            }
        }

        let mut nodes: Vec<String> = entities.iter().map(|e| e.id.clone()).collect();
        nodes.sort();

        let edges: Vec<Relationship> = edges.into_iter().collect();
        let mut outgoing: HashMap<String, Vec<usize>> = HashMap::new();
        let mut incoming: HashMap<String, Vec<usize>> = HashMap::new();
        for (i, edge) in edges.iter().enumerate() {
            outgoing.entry(edge.source.clone()).or_default().push(i);
            incoming.entry(edge.target.clone()).or_default().push(i);
        }

        Self {
            scope: scope.to_string(),
            nodes,
            edges,
            outgoing,
            incoming,
        }
    }

    pub fn outgoing(&self, id: &str) -> Vec<&Relationship> {
        self.edges_at(self.outgoing.get(id))
    }

    pub fn incoming(&self, id: &str) -> Vec<&Relationship> {
        self.edges_at(self.incoming.get(id))
    }

    /// Every edge touching `id`, outgoing first.
    pub fn relationships(&self, id: &str) -> Vec<&Relationship> {
        let mut all = self.outgoing(id);
        all.extend(self.incoming(id));
        all
    }

    /// Ids connected to `id` by an edge of `kind`, in either direction.
    pub fn related(&self, id: &str, kind: RelationKind) -> Vec<&str> {
        let mut ids: Vec<&str> = self
            .relationships(id)
            .into_iter()
            .filter(|r| r.kind == kind)
            .map(|r| r.other(id))
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    fn edges_at(&self, indices: Option<&Vec<usize>>) -> Vec<&Relationship> {
        indices
            .map(|idx| idx.iter().map(|&i| &self.edges[i]).collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::FileMetadata;
    use crate::markdown::slugify;

    fn entity(path: &str, content: &str) -> CampaignEntity {
        CampaignEntity::from_metadata(&FileMetadata::from_content(path, content, None), "Campaign").unwrap()
    }

    #[test]
    fn test_typed_edges_and_mentions() {
        let mira = entity(
            "Campaign/S/Mira.md",
            "---\ntype: npc\ngroups: [\"[[Guild]]\"]\nlocation: Docks\n---\nMira hates [[Guild]] and visits [[Tower]] and [[Nowhere]].\n",
        );
        let guild = entity("Campaign/S/Guild.md", "---\ntype: group\nleader: Mira\nbase: \"[[Docks]]\"\n---\n");
        let docks = entity("Campaign/S/Docks.md", "---\ntype: place\nregion: Saltmarsh\n---\n");
        let tower = entity("Campaign/S/Tower.md", "---\ntype: place\n---\nSee [[Docks]].\n");
        let entities = vec![&mira, &guild, &docks, &tower];

        let graph = ScopeGraph::build("s", &entities, |name| {
            let id = format!("s/{}", slugify(name));
            entities.iter().any(|e| e.id == id).then_some(id)
        });

        assert_eq!(graph.nodes.len(), 4);
        assert!(graph.edges.contains(&Relationship::new("s/mira", "s/guild", RelationKind::MemberOf)));
        assert!(graph.edges.contains(&Relationship::new("s/mira", "s/docks", RelationKind::LocatedIn)));
        assert!(graph.edges.contains(&Relationship::new("s/mira", "s/guild", RelationKind::Leads)));
        assert!(graph.edges.contains(&Relationship::new("s/guild", "s/docks", RelationKind::BasedAt)));
        assert!(graph.edges.contains(&Relationship::new("s/mira", "s/tower", RelationKind::Mentions)));
        assert!(graph.edges.contains(&Relationship::new("s/tower", "s/docks", RelationKind::Mentions)));
        assert!(
            !graph.edges.contains(&Relationship::new("s/mira", "s/guild", RelationKind::Mentions)),
            "a body link to a typed target is not a separate mention"
        );

        assert_eq!(graph.related("s/guild", RelationKind::MemberOf), vec!["s/mira"]);
        assert_eq!(graph.related("s/mira", RelationKind::Leads), vec!["s/guild"]);
        assert_eq!(graph.incoming("s/docks").len(), 3);
        assert_eq!(graph.edge_count(), 6);
    }

    #[test]
    fn test_kind_parse() {
        assert_eq!(RelationKind::parse("member-of"), Some(RelationKind::MemberOf));
        assert_eq!(RelationKind::parse("Located In"), Some(RelationKind::LocatedIn));
        assert_eq!(RelationKind::parse("friend"), None);
    }
}
