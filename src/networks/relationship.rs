use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fmt::{Display, Formatter},
};
use url::Url;

use crate::{
    error::DtsError,
    properties::{ArcUse, Fragment, FragmentKind, XLINK_NS, XMLNS_NS},
    store::{FragmentQuery, FragmentStore},
};

/// One end of a [Relationship], flattened from the fragment it resolved to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub index: String,
    pub uri: Url,
    pub kind: FragmentKind,
    pub namespace: String,
    pub local_name: String,
    /// Only recorded for resources
    pub language: Option<String>,
    /// Only recorded for resources
    pub role: Option<String>,
}

impl From<&Fragment> for Endpoint {
    fn from(fragment: &Fragment) -> Self {
        let (language, role) = if fragment.kind.is_resource() {
            (
                fragment.language.clone(),
                fragment.role().map(|r| r.to_string()),
            )
        } else {
            (None, None)
        };
        Endpoint {
            index: fragment.index.clone(),
            uri: fragment.uri.clone(),
            kind: fragment.kind,
            namespace: fragment.namespace.clone(),
            local_name: fragment.local_name.clone(),
            language,
            role,
        }
    }
}

/// Grouping identity of a relationship. Relationships sharing a key are equivalent, whichever
/// document or arc element asserted them.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EquivalenceKey {
    pub source: String,
    pub target: String,
    pub link_role: String,
    pub arcrole: String,
    pub signature: String,
}

impl Display for EquivalenceKey {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "{} -> {} [{} {}] {{{}}}",
            self.source, self.target, self.link_role, self.arcrole, self.signature
        )
    }
}

/// A flattened record of one arc applied to one resolved (source, target) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    /// `arcIndex|sourceEndIndex|targetEndIndex`, unique per arc end pair
    pub index: String,
    pub arc_index: String,
    /// Document defining the arc
    pub arc_uri: Url,
    pub arc_namespace: String,
    pub arc_name: String,
    pub arcrole: String,
    pub order: Decimal,
    pub priority: i32,
    pub arc_use: ArcUse,
    pub link_index: String,
    pub link_namespace: String,
    pub link_name: String,
    pub link_role: String,
    pub source: Endpoint,
    pub target: Endpoint,
    pub signature: String,
}

impl Relationship {
    pub fn key(&self) -> EquivalenceKey {
        EquivalenceKey {
            source: self.source.index.clone(),
            target: self.target.index.clone(),
            link_role: self.link_role.clone(),
            arcrole: self.arcrole.clone(),
            signature: self.signature.clone(),
        }
    }

    pub fn is_prohibited(&self) -> bool {
        self.arc_use == ArcUse::Prohibited
    }
}

/// Canonical encoding of the attributes that decide whether two arcs are equivalent.
///
/// XLink attributes, `use` and `priority` are left out; `order` is included with its default
/// applied and its numeric form normalized. Entries are sorted by namespace-qualified name and
/// written as space-separated `key=value` pairs.
pub fn semantic_key(arc: &Fragment) -> Result<String, DtsError> {
    let mut entries: BTreeMap<String, String> = arc
        .attributes
        .iter()
        .filter(|a| a.namespace != XLINK_NS && a.namespace != XMLNS_NS)
        .filter(|a| {
            !(a.namespace.is_empty() && matches!(a.local_name.as_str(), "use" | "priority" | "order"))
        })
        .map(|a| (a.qualified_key(), a.value.trim().to_string()))
        .collect();
    entries.insert("order".to_string(), arc.order()?.to_string());
    Ok(entries
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(" ")
        .trim()
        .to_string())
}

/// Turns stored arcs and their arc ends into [Relationship]s.
pub struct RelationshipCompiler<'a, S: FragmentStore + ?Sized> {
    store: &'a S,
}

impl<'a, S: FragmentStore + ?Sized> RelationshipCompiler<'a, S> {
    pub fn new(store: &'a S) -> Self {
        RelationshipCompiler { store }
    }

    /// Arcs defined in `uri`, in document order.
    pub fn arcs(&self, uri: &Url) -> Vec<Fragment> {
        self.store.query_fragments(
            &FragmentQuery::new()
                .in_document(uri)
                .kind(FragmentKind::Arc),
        )
    }

    /// Locators and resources in the extended link `link_index` carrying `label`.
    pub fn arc_ends(&self, link_index: &str, label: &str) -> Vec<Fragment> {
        self.store.query_fragments(
            &FragmentQuery::new()
                .parent(link_index)
                .kinds(FragmentKind::arc_ends())
                .attribute(XLINK_NS, "label", label),
        )
    }

    /// The fragment an arc end stands for: a resource is its own endpoint, a locator is
    /// dereferenced through its target.
    pub fn resolve_endpoint(&self, end: &Fragment) -> Result<Fragment, DtsError> {
        if end.kind != FragmentKind::Locator {
            return Ok(end.clone());
        }
        let target = end.target.as_ref().ok_or_else(|| {
            DtsError::Resolution(format!("locator {} has no recorded target", end.index))
        })?;
        self.store
            .query_fragments(
                &FragmentQuery::new()
                    .in_document(&target.document)
                    .pointer(target.pointer.clone()),
            )
            .into_iter()
            .next()
            .ok_or_else(|| {
                DtsError::Resolution(format!(
                    "locator {} target {} is not in the store",
                    end.index, target.href
                ))
            })
    }

    /// Build one relationship per (from end, to end) pair of `arc`.
    ///
    /// The outer error means no pair could be attempted (malformed arc, missing link, unmatched
    /// label). Each inner result is one pair, so a single unresolvable locator does not take the
    /// other pairs down with it.
    pub fn compile_arc(&self, arc: &Fragment) -> Result<Vec<Result<Relationship, DtsError>>, DtsError> {
        let arcrole = arc
            .arcrole()
            .ok_or_else(|| DtsError::Validation(format!("arc {} has no arcrole", arc.index)))?
            .to_string();
        let from = arc
            .from_label()
            .ok_or_else(|| DtsError::Validation(format!("arc {} has no from label", arc.index)))?;
        let to = arc
            .to_label()
            .ok_or_else(|| DtsError::Validation(format!("arc {} has no to label", arc.index)))?;
        let order = arc.order()?;
        let priority = arc.priority()?;
        let arc_use = arc.arc_use()?;
        let signature = semantic_key(arc)?;
        let link = self.store.get_fragment(&arc.parent_index).ok_or_else(|| {
            DtsError::Resolution(format!(
                "extended link {} of arc {} is not in the store",
                arc.parent_index, arc.index
            ))
        })?;

        let sources = self.arc_ends(&link.index, from);
        if sources.is_empty() {
            return Err(DtsError::Resolution(format!(
                "arc {} from label '{from}' matches no locator or resource",
                arc.index
            )));
        }
        let targets = self.arc_ends(&link.index, to);
        if targets.is_empty() {
            return Err(DtsError::Resolution(format!(
                "arc {} to label '{to}' matches no locator or resource",
                arc.index
            )));
        }

        let link_role = arc
            .link_role
            .clone()
            .or_else(|| link.role().map(|r| r.to_string()))
            .unwrap_or_default();

        let mut results = Vec::with_capacity(sources.len() * targets.len());
        for source_end in sources.iter() {
            let source = self.resolve_endpoint(source_end);
            for target_end in targets.iter() {
                let pair = match (&source, self.resolve_endpoint(target_end)) {
                    (Ok(source), Ok(target)) => Ok(Relationship {
                        index: format!("{}|{}|{}", arc.index, source_end.index, target_end.index),
                        arc_index: arc.index.clone(),
                        arc_uri: arc.uri.clone(),
                        arc_namespace: arc.namespace.clone(),
                        arc_name: arc.local_name.clone(),
                        arcrole: arcrole.clone(),
                        order,
                        priority,
                        arc_use,
                        link_index: link.index.clone(),
                        link_namespace: link.namespace.clone(),
                        link_name: link.local_name.clone(),
                        link_role: link_role.clone(),
                        source: Endpoint::from(source),
                        target: Endpoint::from(&target),
                        signature: signature.clone(),
                    }),
                    (Err(e), _) => Err(e.clone()),
                    (_, Err(e)) => Err(e),
                };
                results.push(pair);
            }
        }
        Ok(results)
    }
}
