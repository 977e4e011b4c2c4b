use petgraph::{
    algo::is_cyclic_directed,
    graphmap::DiGraphMap,
    visit::{depth_first_search, Control, DfsEvent},
};
use std::collections::{BTreeMap, BTreeSet};

use crate::{
    error::DtsError,
    networks::{EquivalenceKey, Relationship},
    store::{FragmentStore, RelationshipQuery},
};

/// All relationships sharing one [EquivalenceKey], in insertion order.
#[derive(Debug, Clone, PartialEq)]
pub struct EquivalentRelationships {
    key: EquivalenceKey,
    members: Vec<Relationship>,
}

impl EquivalentRelationships {
    pub fn new(key: EquivalenceKey) -> EquivalentRelationships {
        EquivalentRelationships {
            key,
            members: Vec::new(),
        }
    }

    pub fn key(&self) -> &EquivalenceKey {
        &self.key
    }

    /// Add a member. Returns false if it belongs to another group or is already present.
    pub fn add(&mut self, relationship: Relationship) -> bool {
        if relationship.key() != self.key
            || self.members.iter().any(|m| m.index == relationship.index)
        {
            return false;
        }
        self.members.push(relationship);
        true
    }

    pub fn members(&self) -> &[Relationship] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// The member with the highest priority, the earliest inserted among equals. Prohibited
    /// members can win.
    pub fn winner(&self) -> Option<&Relationship> {
        let mut winner: Option<&Relationship> = None;
        for member in self.members.iter() {
            if winner.is_none_or(|w| member.priority > w.priority) {
                winner = Some(member);
            }
        }
        winner
    }

    /// The winner, unless it prohibits the relationship.
    pub fn active(&self) -> Option<&Relationship> {
        self.winner().filter(|w| !w.is_prohibited())
    }

    /// Every member except the winner.
    pub fn inactive(&self) -> Vec<&Relationship> {
        let winner = self.winner().map(|w| w.index.as_str());
        self.members
            .iter()
            .filter(|m| Some(m.index.as_str()) != winner)
            .collect()
    }
}

/// All relationships for one (link role, arcrole) pair, indexed by source and target.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Network {
    link_role: String,
    arcrole: String,
    groups: Vec<EquivalentRelationships>,
    by_key: BTreeMap<EquivalenceKey, usize>,
    by_source: BTreeMap<String, Vec<usize>>,
    by_target: BTreeMap<String, Vec<usize>>,
    indices: BTreeSet<String>,
}

impl Network {
    pub fn new(link_role: impl Into<String>, arcrole: impl Into<String>) -> Network {
        Network {
            link_role: link_role.into(),
            arcrole: arcrole.into(),
            ..Default::default()
        }
    }

    /// Load every stored relationship for the role pair.
    pub fn from_store<S: FragmentStore + ?Sized>(
        store: &S,
        link_role: &str,
        arcrole: &str,
    ) -> Result<Network, DtsError> {
        let mut network = Network::new(link_role, arcrole);
        for relationship in store.query_relationships(&RelationshipQuery::roles(link_role, arcrole)) {
            network.add_relationship(relationship)?;
        }
        Ok(network)
    }

    pub fn link_role(&self) -> &str {
        &self.link_role
    }

    pub fn arcrole(&self) -> &str {
        &self.arcrole
    }

    /// Add a relationship to its equivalence group. Returns false for an index already present.
    pub fn add_relationship(&mut self, relationship: Relationship) -> Result<bool, DtsError> {
        if relationship.link_role != self.link_role || relationship.arcrole != self.arcrole {
            return Err(DtsError::Validation(format!(
                "relationship {} has roles ({}, {}) but the network is ({}, {})",
                relationship.index,
                relationship.link_role,
                relationship.arcrole,
                self.link_role,
                self.arcrole
            )));
        }
        if self.indices.contains(&relationship.index) {
            return Ok(false);
        }
        let key = relationship.key();
        let group = match self.by_key.get(&key) {
            Some(group) => *group,
            None => {
                let group = self.groups.len();
                self.groups.push(EquivalentRelationships::new(key.clone()));
                self.by_source
                    .entry(key.source.clone())
                    .or_default()
                    .push(group);
                self.by_target
                    .entry(key.target.clone())
                    .or_default()
                    .push(group);
                self.by_key.insert(key, group);
                group
            }
        };
        self.indices.insert(relationship.index.clone());
        Ok(self.groups[group].add(relationship))
    }

    /// Add every relationship of `other`, returning how many were new.
    pub fn merge(&mut self, other: Network) -> Result<usize, DtsError> {
        let mut added = 0;
        for group in other.groups {
            for relationship in group.members {
                if self.add_relationship(relationship)? {
                    added += 1;
                }
            }
        }
        Ok(added)
    }

    fn active_in(&self, groups: Option<&Vec<usize>>) -> Vec<&Relationship> {
        let mut active: Vec<&Relationship> = groups
            .into_iter()
            .flatten()
            .filter_map(|g| self.groups[*g].active())
            .collect();
        // Stable, so equal orders keep group insertion order
        active.sort_by(|a, b| a.order.cmp(&b.order));
        active
    }

    /// Active relationships whose source is `index`, by ascending order.
    pub fn active_relationships_from(&self, index: &str) -> Vec<&Relationship> {
        self.active_in(self.by_source.get(index))
    }

    /// Active relationships whose target is `index`, by ascending order.
    pub fn active_relationships_to(&self, index: &str) -> Vec<&Relationship> {
        self.active_in(self.by_target.get(index))
    }

    pub fn children(&self, index: &str) -> Vec<&str> {
        self.active_relationships_from(index)
            .into_iter()
            .map(|r| r.target.index.as_str())
            .collect()
    }

    pub fn parents(&self, index: &str) -> Vec<&str> {
        self.active_relationships_to(index)
            .into_iter()
            .map(|r| r.source.index.as_str())
            .collect()
    }

    /// Has active children and no active parents.
    pub fn is_root(&self, index: &str) -> bool {
        !self.active_relationships_from(index).is_empty()
            && self.active_relationships_to(index).is_empty()
    }

    /// Has active parents and no active children.
    pub fn is_leaf(&self, index: &str) -> bool {
        self.active_relationships_from(index).is_empty()
            && !self.active_relationships_to(index).is_empty()
    }

    pub fn has_single_parent(&self, index: &str) -> bool {
        self.active_relationships_to(index).len() == 1
    }

    pub fn root_indices(&self) -> BTreeSet<&str> {
        self.by_source
            .keys()
            .map(|s| s.as_str())
            .filter(|s| self.is_root(s))
            .collect()
    }

    fn active_graph(&self) -> DiGraphMap<&str, ()> {
        let mut graph = DiGraphMap::new();
        for relationship in self.active_relationships() {
            graph.add_edge(
                relationship.source.index.as_str(),
                relationship.target.index.as_str(),
                (),
            );
        }
        graph
    }

    /// Every index reachable from `index` over active relationships, `index` excluded.
    pub fn descendants(&self, index: &str) -> BTreeSet<String> {
        let graph = self.active_graph();
        let mut found = BTreeSet::new();
        let Some(start) = graph.nodes().find(|n| *n == index) else {
            return found;
        };
        depth_first_search(&graph, Some(start), |event| {
            if let DfsEvent::Discover(node, _) = event {
                if node != start {
                    found.insert(node.to_string());
                }
            }
            Control::<()>::Continue
        });
        found
    }

    /// True if the active relationships form no cycle.
    pub fn is_acyclic(&self) -> bool {
        !is_cyclic_directed(&self.active_graph())
    }

    /// Number of relationships, active or not.
    pub fn len(&self) -> usize {
        self.groups.iter().map(|g| g.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Number of groups with an active relationship.
    pub fn active_len(&self) -> usize {
        self.groups.iter().filter(|g| g.active().is_some()).count()
    }

    pub fn relationships(&self) -> impl Iterator<Item = &Relationship> {
        self.groups.iter().flat_map(|g| g.members.iter())
    }

    /// Active relationships in group insertion order.
    pub fn active_relationships(&self) -> Vec<&Relationship> {
        self.groups.iter().filter_map(|g| g.active()).collect()
    }

    pub fn groups(&self) -> &[EquivalentRelationships] {
        &self.groups
    }

    /// Sources of at least one relationship, in index order.
    pub fn source_indices(&self) -> impl Iterator<Item = &str> {
        self.by_source.keys().map(|s| s.as_str())
    }

    pub fn target_indices(&self) -> impl Iterator<Item = &str> {
        self.by_target.keys().map(|s| s.as_str())
    }
}
