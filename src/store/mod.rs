//! Store and document-source collaborators.
//!
//! The discovery engine owns no persistent state of its own. Everything that must be shared
//! between crawlers (fragments, relationships, error markers, the document claim table, the
//! active-loader count and the pending-work map) lives behind [FragmentStore]. Document text is
//! fetched through [DocumentSource].
//!
//! [MemoryStore] and [MemorySource]/[FileSource] are the in-process implementations.

mod memory;
mod source;

pub use memory::MemoryStore;
pub use source::{FileSource, MemorySource};

use enumset::EnumSet;
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fmt::{Display, Formatter},
};
use tokio::sync::watch;
use url::Url;
use uuid::Uuid;

use crate::{
    error::DtsError,
    networks::Relationship,
    properties::{ErrorMarker, Fragment, FragmentKind},
    uri,
};

/// Identifies one crawler instance in the claim table and the loader registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CrawlerId(pub Uuid);

impl CrawlerId {
    pub fn new() -> CrawlerId {
        CrawlerId(Uuid::new_v4())
    }
}

impl Default for CrawlerId {
    fn default() -> Self {
        CrawlerId::new()
    }
}

impl Display for CrawlerId {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

/// The shared store. Implementations must be safe to use from several crawlers at once, and
/// [FragmentStore::claim] must never grant the same URI to two crawlers at the same time.
pub trait FragmentStore: Send + Sync {
    /// Prefix of every fragment index in `uri`.
    fn document_id(&self, uri: &Url) -> String {
        uri::document_id(uri)
    }

    /// True once the root fragment of `uri` has been persisted.
    fn has_document(&self, uri: &Url) -> bool;

    /// Every document with a persisted root fragment, in URI order.
    fn document_uris(&self) -> Vec<Url>;

    fn get_fragment(&self, index: &str) -> Option<Fragment>;

    fn persist_fragment(&self, fragment: Fragment) -> Result<(), DtsError>;

    /// Fragments matching `query`, ordered by document then by position in the document.
    fn query_fragments(&self, query: &FragmentQuery) -> Vec<Fragment>;

    /// Remove every fragment of `uri`, returning how many were removed.
    fn delete_document(&self, uri: &Url) -> Result<usize, DtsError>;

    /// Claim `uri` for `crawler`. First claimer wins; re-claiming an owned URI succeeds.
    fn claim(&self, crawler: CrawlerId, uri: &Url) -> bool;

    /// Release a claim. Releasing a claim owned by someone else is a no-op.
    fn release(&self, crawler: CrawlerId, uri: &Url);

    /// Register `crawler` as actively discovering documents.
    fn start_loading(&self, crawler: CrawlerId);

    fn stop_loading(&self, crawler: CrawlerId);

    /// Receiver observing the number of crawlers currently discovering.
    fn loader_monitor(&self) -> watch::Receiver<usize>;

    fn is_loading(&self) -> bool {
        *self.loader_monitor().borrow() > 0
    }

    /// Merge `pending` (URI to reason) into the persisted work state.
    fn persist_work_state(&self, pending: BTreeMap<Url, String>) -> Result<(), DtsError>;

    /// The persisted work state, left in place.
    fn work_state(&self) -> BTreeMap<Url, String>;

    /// The persisted work state, removed from the store.
    fn take_work_state(&self) -> Result<BTreeMap<Url, String>, DtsError>;

    fn has_relationship(&self, index: &str) -> bool;

    fn persist_relationship(&self, relationship: Relationship) -> Result<(), DtsError>;

    /// Relationships matching `query`, in the order they were persisted.
    fn query_relationships(&self, query: &RelationshipQuery) -> Vec<Relationship>;

    /// Returns whether a relationship was removed.
    fn remove_relationship(&self, index: &str) -> Result<bool, DtsError>;

    fn persist_error(&self, marker: ErrorMarker) -> Result<(), DtsError>;

    /// Error markers, optionally restricted to one document.
    fn errors(&self, document: Option<&Url>) -> Vec<ErrorMarker>;
}

/// A pattern over fragments. Unset fields match anything; an empty kind set matches every kind.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FragmentQuery {
    pub uri: Option<Url>,
    pub parent_index: Option<String>,
    pub kinds: EnumSet<FragmentKind>,
    /// (namespace, local name, value)
    pub attributes: Vec<(String, String, String)>,
    pub pointer: Option<String>,
}

impl FragmentQuery {
    pub fn new() -> FragmentQuery {
        FragmentQuery::default()
    }

    pub fn in_document(mut self, uri: &Url) -> Self {
        self.uri = Some(uri.clone());
        self
    }

    pub fn parent(mut self, parent_index: impl Into<String>) -> Self {
        self.parent_index = Some(parent_index.into());
        self
    }

    pub fn kind(mut self, kind: FragmentKind) -> Self {
        self.kinds |= kind;
        self
    }

    pub fn kinds(mut self, kinds: EnumSet<FragmentKind>) -> Self {
        self.kinds |= kinds;
        self
    }

    pub fn attribute(
        mut self,
        namespace: impl Into<String>,
        local_name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.attributes
            .push((namespace.into(), local_name.into(), value.into()));
        self
    }

    /// Match the fragment an href pointer identifies (see [Fragment::matches_pointer]).
    pub fn pointer(mut self, pointer: impl Into<String>) -> Self {
        self.pointer = Some(pointer.into());
        self
    }

    pub fn matches(&self, fragment: &Fragment) -> bool {
        self.uri.as_ref().is_none_or(|u| *u == fragment.uri)
            && self
                .parent_index
                .as_ref()
                .is_none_or(|p| *p == fragment.parent_index)
            && (self.kinds.is_empty() || self.kinds.contains(fragment.kind))
            && self
                .attributes
                .iter()
                .all(|(ns, local, value)| {
                    fragment.attributes.get(ns, local) == Some(value.as_str())
                })
            && self
                .pointer
                .as_ref()
                .is_none_or(|p| fragment.matches_pointer(p))
    }
}

/// A pattern over stored relationships. Unset fields match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelationshipQuery {
    pub link_role: Option<String>,
    pub arcrole: Option<String>,
    pub source: Option<String>,
    pub target: Option<String>,
    /// Document defining the arc
    pub document: Option<Url>,
}

impl RelationshipQuery {
    pub fn new() -> RelationshipQuery {
        RelationshipQuery::default()
    }

    pub fn roles(link_role: impl Into<String>, arcrole: impl Into<String>) -> RelationshipQuery {
        RelationshipQuery {
            link_role: Some(link_role.into()),
            arcrole: Some(arcrole.into()),
            ..Default::default()
        }
    }

    pub fn arcrole(mut self, arcrole: impl Into<String>) -> Self {
        self.arcrole = Some(arcrole.into());
        self
    }

    pub fn source(mut self, index: impl Into<String>) -> Self {
        self.source = Some(index.into());
        self
    }

    pub fn target(mut self, index: impl Into<String>) -> Self {
        self.target = Some(index.into());
        self
    }

    pub fn in_document(mut self, uri: &Url) -> Self {
        self.document = Some(uri.clone());
        self
    }

    pub fn matches(&self, relationship: &Relationship) -> bool {
        self.link_role
            .as_ref()
            .is_none_or(|r| *r == relationship.link_role)
            && self
                .arcrole
                .as_ref()
                .is_none_or(|r| *r == relationship.arcrole)
            && self
                .source
                .as_ref()
                .is_none_or(|s| *s == relationship.source.index)
            && self
                .target
                .as_ref()
                .is_none_or(|t| *t == relationship.target.index)
            && self
                .document
                .as_ref()
                .is_none_or(|d| *d == relationship.arc_uri)
    }
}

/// Supplies document text for a URI.
pub trait DocumentSource: Send + Sync {
    fn fetch(
        &self,
        uri: &Url,
    ) -> impl std::future::Future<Output = Result<String, DtsError>> + Send;
}
