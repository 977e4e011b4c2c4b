use std::collections::{BTreeMap, BTreeSet};

use crate::{
    error::DtsError,
    networks::{Endpoint, Network, Relationship, RelationshipCompiler},
    properties::{FragmentKind, XLINK_NS},
    store::{FragmentQuery, FragmentStore, RelationshipQuery},
};

/// Networks indexed by arcrole, then by link role.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Networks {
    networks: BTreeMap<String, BTreeMap<String, Network>>,
}

impl Networks {
    pub fn new() -> Networks {
        Networks::default()
    }

    /// Every relationship in the store, grouped into networks.
    pub fn from_store<S: FragmentStore + ?Sized>(store: &S) -> Result<Networks, DtsError> {
        let mut networks = Networks::new();
        for relationship in store.query_relationships(&RelationshipQuery::new()) {
            networks.add_relationship(relationship)?;
        }
        Ok(networks)
    }

    pub fn add_relationship(&mut self, relationship: Relationship) -> Result<bool, DtsError> {
        self.networks
            .entry(relationship.arcrole.clone())
            .or_default()
            .entry(relationship.link_role.clone())
            .or_insert_with(|| Network::new(&relationship.link_role, &relationship.arcrole))
            .add_relationship(relationship)
    }

    /// Add a network, merging it into an existing one with the same roles.
    pub fn add_network(&mut self, network: Network) -> Result<usize, DtsError> {
        let by_link = self
            .networks
            .entry(network.arcrole().to_string())
            .or_default();
        match by_link.get_mut(network.link_role()) {
            Some(existing) => existing.merge(network),
            None => {
                let added = network.len();
                by_link.insert(network.link_role().to_string(), network);
                Ok(added)
            }
        }
    }

    /// Compile and add relationships for every stored arc with `arcrole`, in document then arc
    /// order. Arcs or pairs that fail to compile are logged and skipped.
    pub fn add_relationships_for_arcrole<S: FragmentStore + ?Sized>(
        &mut self,
        store: &S,
        arcrole: &str,
    ) -> Result<usize, DtsError> {
        let compiler = RelationshipCompiler::new(store);
        let arcs = store.query_fragments(
            &FragmentQuery::new()
                .kind(FragmentKind::Arc)
                .attribute(XLINK_NS, "arcrole", arcrole),
        );
        let mut added = 0;
        for arc in arcs.iter() {
            let pairs = match compiler.compile_arc(arc) {
                Ok(pairs) => pairs,
                Err(e) => {
                    tracing::warn!("[Networks] skipping arc {}: {}", arc.index, e);
                    continue;
                }
            };
            for pair in pairs {
                match pair {
                    Ok(relationship) => {
                        if self.add_relationship(relationship)? {
                            added += 1;
                        }
                    }
                    Err(e) => tracing::warn!("[Networks] skipping pair of arc {}: {}", arc.index, e),
                }
            }
        }
        Ok(added)
    }

    pub fn network(&self, link_role: &str, arcrole: &str) -> Option<&Network> {
        self.networks.get(arcrole).and_then(|n| n.get(link_role))
    }

    pub fn has_network(&self, link_role: &str, arcrole: &str) -> bool {
        self.network(link_role, arcrole).is_some()
    }

    pub fn networks_for_arcrole(&self, arcrole: &str) -> Vec<&Network> {
        self.networks
            .get(arcrole)
            .map(|n| n.values().collect())
            .unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Network> {
        self.networks.values().flat_map(|n| n.values())
    }

    pub fn arcroles(&self) -> Vec<&str> {
        self.networks.keys().map(|k| k.as_str()).collect()
    }

    /// Link roles in use, optionally restricted to one arcrole.
    pub fn link_roles(&self, arcrole: Option<&str>) -> BTreeSet<&str> {
        self.networks
            .iter()
            .filter(|(a, _)| arcrole.is_none_or(|r| r == a.as_str()))
            .flat_map(|(_, n)| n.keys().map(|k| k.as_str()))
            .collect()
    }

    /// Number of networks.
    pub fn len(&self) -> usize {
        self.networks.values().map(|n| n.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn restricted(&self, arcrole: &str, link_role: Option<&str>) -> Vec<&Network> {
        self.networks_for_arcrole(arcrole)
            .into_iter()
            .filter(|n| link_role.is_none_or(|r| r == n.link_role()))
            .collect()
    }

    /// Sources of active relationships to `target_index`.
    pub fn sources(
        &self,
        target_index: &str,
        arcrole: &str,
        link_role: Option<&str>,
    ) -> Vec<&Endpoint> {
        self.restricted(arcrole, link_role)
            .into_iter()
            .flat_map(|n| n.active_relationships_to(target_index))
            .map(|r| &r.source)
            .collect()
    }

    /// Targets of active relationships from `source_index`.
    pub fn targets(
        &self,
        source_index: &str,
        arcrole: &str,
        link_role: Option<&str>,
    ) -> Vec<&Endpoint> {
        self.restricted(arcrole, link_role)
            .into_iter()
            .flat_map(|n| n.active_relationships_from(source_index))
            .map(|r| &r.target)
            .collect()
    }

    /// Every active relationship across all networks.
    pub fn active_relationships(&self) -> Vec<&Relationship> {
        self.iter().flat_map(|n| n.active_relationships()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::properties::{ArcUse, FragmentKind};
    use rust_decimal::Decimal;
    use url::Url;

    fn endpoint(index: &str) -> Endpoint {
        Endpoint {
            index: index.to_string(),
            uri: Url::parse("file:///s.xsd").unwrap(),
            kind: FragmentKind::Concept,
            namespace: "http://www.w3.org/2001/XMLSchema".into(),
            local_name: "element".into(),
            language: None,
            role: None,
        }
    }

    fn rel(arc: &str, link_role: &str, arcrole: &str, source: &str, target: &str) -> Relationship {
        Relationship {
            index: format!("{arc}|{source}|{target}"),
            arc_index: arc.into(),
            arc_uri: Url::parse("file:///l.xml").unwrap(),
            arc_namespace: String::new(),
            arc_name: "arc".into(),
            arcrole: arcrole.into(),
            order: Decimal::ONE,
            priority: 1,
            arc_use: ArcUse::Optional,
            link_index: "l_2".into(),
            link_namespace: String::new(),
            link_name: "link".into(),
            link_role: link_role.into(),
            source: endpoint(source),
            target: endpoint(target),
            signature: "order=1".into(),
        }
    }

    #[test]
    fn test_networks_index_by_roles() {
        let mut networks = Networks::new();
        networks.add_relationship(rel("a", "r1", "parent-child", "x", "y")).unwrap();
        networks.add_relationship(rel("b", "r2", "parent-child", "x", "z")).unwrap();
        networks.add_relationship(rel("c", "r1", "label", "x", "lab")).unwrap();

        assert_eq!(networks.len(), 3);
        assert_eq!(networks.arcroles(), vec!["label", "parent-child"]);
        assert_eq!(networks.link_roles(Some("parent-child")), BTreeSet::from(["r1", "r2"]));
        assert_eq!(networks.link_roles(None).len(), 2);
        assert!(networks.has_network("r2", "parent-child"));
        assert!(!networks.has_network("r2", "label"));

        let targets: Vec<&str> = networks
            .targets("x", "parent-child", None)
            .into_iter()
            .map(|e| e.index.as_str())
            .collect();
        assert_eq!(targets, vec!["y", "z"]);
        assert_eq!(networks.targets("x", "parent-child", Some("r2")).len(), 1);
        assert_eq!(networks.sources("lab", "label", None)[0].index, "x");
        assert_eq!(networks.active_relationships().len(), 3);
    }

    #[test]
    fn test_add_network_merges() {
        let mut networks = Networks::new();
        networks.add_relationship(rel("a", "r1", "pc", "x", "y")).unwrap();
        let mut extra = Network::new("r1", "pc");
        extra.add_relationship(rel("a", "r1", "pc", "x", "y")).unwrap();
        extra.add_relationship(rel("b", "r1", "pc", "y", "z")).unwrap();
        assert_eq!(networks.add_network(extra).unwrap(), 1);
        assert_eq!(networks.network("r1", "pc").unwrap().len(), 2);
        assert_eq!(networks.add_network(Network::new("r9", "pc")).unwrap(), 0);
        assert_eq!(networks.networks_for_arcrole("pc").len(), 2);
    }
}
