use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, BTreeSet},
    path::Path,
};
use tokio::sync::watch;
use url::Url;

use crate::{
    error::DtsError,
    networks::Relationship,
    properties::{ErrorMarker, Fragment},
    store::{CrawlerId, FragmentQuery, FragmentStore, RelationshipQuery},
};

#[derive(Debug, Default)]
struct StoreState {
    fragments: BTreeMap<String, Fragment>,
    documents: BTreeMap<Url, BTreeSet<String>>,
    /// Document to root fragment index
    roots: BTreeMap<Url, String>,
    /// Index to (insertion sequence, relationship)
    relationships: BTreeMap<String, (u64, Relationship)>,
    next_relationship: u64,
    errors: Vec<ErrorMarker>,
    work_state: BTreeMap<Url, String>,
}

/// Serialized form of a [MemoryStore].
#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    fragments: Vec<Fragment>,
    relationships: Vec<Relationship>,
    errors: Vec<ErrorMarker>,
    work_state: BTreeMap<Url, String>,
}

/// An in-process [FragmentStore].
///
/// Content lives under one `RwLock`; the claim table and the loader registry each have their
/// own `Mutex`, so claims never wait behind bulk fragment writes. The number of active loaders is
/// published on a `watch` channel for crawlers waiting at the relationship barrier.
#[derive(Debug)]
pub struct MemoryStore {
    state: RwLock<StoreState>,
    claims: Mutex<BTreeMap<Url, CrawlerId>>,
    loaders: Mutex<BTreeSet<CrawlerId>>,
    monitor: watch::Sender<usize>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        let (monitor, _) = watch::channel(0usize);
        MemoryStore {
            state: RwLock::new(StoreState::default()),
            claims: Mutex::new(BTreeMap::new()),
            loaders: Mutex::new(BTreeSet::new()),
            monitor,
        }
    }
}

impl MemoryStore {
    pub fn new() -> MemoryStore {
        MemoryStore::default()
    }

    pub fn fragment_count(&self) -> usize {
        self.state.read().fragments.len()
    }

    pub fn relationship_count(&self) -> usize {
        self.state.read().relationships.len()
    }

    /// URIs currently claimed, with their owners.
    pub fn claims(&self) -> BTreeMap<Url, CrawlerId> {
        self.claims.lock().clone()
    }

    /// Serialize the content (not claims or loaders) to JSON.
    pub fn export_json(&self) -> Result<String, DtsError> {
        let state = self.state.read();
        let mut relationships: Vec<&(u64, Relationship)> = state.relationships.values().collect();
        relationships.sort_by_key(|(seq, _)| *seq);
        let snapshot = Snapshot {
            fragments: state.fragments.values().cloned().collect(),
            relationships: relationships.into_iter().map(|(_, r)| r.clone()).collect(),
            errors: state.errors.clone(),
            work_state: state.work_state.clone(),
        };
        Ok(serde_json::to_string_pretty(&snapshot)?)
    }

    pub fn import_json(json: &str) -> Result<MemoryStore, DtsError> {
        let snapshot: Snapshot = serde_json::from_str(json)?;
        let store = MemoryStore::new();
        for fragment in snapshot.fragments {
            store.persist_fragment(fragment)?;
        }
        for relationship in snapshot.relationships {
            store.persist_relationship(relationship)?;
        }
        {
            let mut state = store.state.write();
            state.errors = snapshot.errors;
            state.work_state = snapshot.work_state;
        }
        Ok(store)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), DtsError> {
        tracing::debug!("[MemoryStore] writing snapshot to {:?}", path.as_ref());
        std::fs::write(path, self.export_json()?)?;
        Ok(())
    }

    /// Load a snapshot, or start empty when `path` does not exist.
    pub fn load(path: impl AsRef<Path>) -> Result<MemoryStore, DtsError> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!("[MemoryStore] no snapshot at {:?}, starting empty", path);
            return Ok(MemoryStore::new());
        }
        MemoryStore::import_json(&std::fs::read_to_string(path)?)
    }

    fn publish_loaders(&self, count: usize) {
        self.monitor.send_replace(count);
    }
}

impl FragmentStore for MemoryStore {
    fn has_document(&self, uri: &Url) -> bool {
        self.state.read().roots.contains_key(uri)
    }

    fn document_uris(&self) -> Vec<Url> {
        self.state.read().roots.keys().cloned().collect()
    }

    fn get_fragment(&self, index: &str) -> Option<Fragment> {
        self.state.read().fragments.get(index).cloned()
    }

    fn persist_fragment(&self, fragment: Fragment) -> Result<(), DtsError> {
        let mut state = self.state.write();
        if fragment.is_root() {
            state
                .roots
                .insert(fragment.uri.clone(), fragment.index.clone());
        }
        state
            .documents
            .entry(fragment.uri.clone())
            .or_default()
            .insert(fragment.index.clone());
        state.fragments.insert(fragment.index.clone(), fragment);
        Ok(())
    }

    fn query_fragments(&self, query: &FragmentQuery) -> Vec<Fragment> {
        let state = self.state.read();
        let mut found: Vec<Fragment> = match query.uri.as_ref() {
            Some(uri) => state
                .documents
                .get(uri)
                .into_iter()
                .flatten()
                .filter_map(|index| state.fragments.get(index))
                .filter(|f| query.matches(f))
                .cloned()
                .collect(),
            None => state
                .fragments
                .values()
                .filter(|f| query.matches(f))
                .cloned()
                .collect(),
        };
        found.sort_by(|a, b| {
            a.uri
                .cmp(&b.uri)
                .then_with(|| a.sequence().cmp(&b.sequence()))
        });
        found
    }

    fn delete_document(&self, uri: &Url) -> Result<usize, DtsError> {
        let mut state = self.state.write();
        state.roots.remove(uri);
        let indices = state.documents.remove(uri).unwrap_or_default();
        for index in indices.iter() {
            state.fragments.remove(index);
        }
        Ok(indices.len())
    }

    fn claim(&self, crawler: CrawlerId, uri: &Url) -> bool {
        let mut claims = self.claims.lock();
        match claims.get(uri) {
            Some(owner) => *owner == crawler,
            None => {
                claims.insert(uri.clone(), crawler);
                true
            }
        }
    }

    fn release(&self, crawler: CrawlerId, uri: &Url) {
        let mut claims = self.claims.lock();
        if claims.get(uri) == Some(&crawler) {
            claims.remove(uri);
        }
    }

    fn start_loading(&self, crawler: CrawlerId) {
        let mut loaders = self.loaders.lock();
        loaders.insert(crawler);
        self.publish_loaders(loaders.len());
    }

    fn stop_loading(&self, crawler: CrawlerId) {
        let mut loaders = self.loaders.lock();
        loaders.remove(&crawler);
        self.publish_loaders(loaders.len());
    }

    fn loader_monitor(&self) -> watch::Receiver<usize> {
        self.monitor.subscribe()
    }

    fn persist_work_state(&self, pending: BTreeMap<Url, String>) -> Result<(), DtsError> {
        self.state.write().work_state.extend(pending);
        Ok(())
    }

    fn work_state(&self) -> BTreeMap<Url, String> {
        self.state.read().work_state.clone()
    }

    fn take_work_state(&self) -> Result<BTreeMap<Url, String>, DtsError> {
        Ok(std::mem::take(&mut self.state.write().work_state))
    }

    fn has_relationship(&self, index: &str) -> bool {
        self.state.read().relationships.contains_key(index)
    }

    fn persist_relationship(&self, relationship: Relationship) -> Result<(), DtsError> {
        let mut state = self.state.write();
        let seq = match state.relationships.get(&relationship.index) {
            Some((seq, _)) => *seq,
            None => {
                state.next_relationship += 1;
                state.next_relationship
            }
        };
        state
            .relationships
            .insert(relationship.index.clone(), (seq, relationship));
        Ok(())
    }

    fn query_relationships(&self, query: &RelationshipQuery) -> Vec<Relationship> {
        let state = self.state.read();
        let mut found: Vec<&(u64, Relationship)> = state
            .relationships
            .values()
            .filter(|(_, r)| query.matches(r))
            .collect();
        found.sort_by_key(|(seq, _)| *seq);
        found.into_iter().map(|(_, r)| r.clone()).collect()
    }

    fn remove_relationship(&self, index: &str) -> Result<bool, DtsError> {
        Ok(self.state.write().relationships.remove(index).is_some())
    }

    fn persist_error(&self, marker: ErrorMarker) -> Result<(), DtsError> {
        self.state.write().errors.push(marker);
        Ok(())
    }

    fn errors(&self, document: Option<&Url>) -> Vec<ErrorMarker> {
        self.state
            .read()
            .errors
            .iter()
            .filter(|e| document.is_none_or(|d| *d == e.document))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::properties::{Attribute, FragmentKind, XLINK_NS};
    use std::sync::Arc;
    use test_log::test;

    fn uri(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    fn fragment(index: &str, kind: FragmentKind, parent: &str, doc: &str) -> Fragment {
        Fragment::new(index, kind, parent, uri(doc))
    }

    #[test]
    fn test_document_presence_requires_root() {
        let store = MemoryStore::new();
        let doc = uri("file:///a.xml");
        store
            .persist_fragment(fragment("a_2", FragmentKind::Arc, "a_1", "file:///a.xml"))
            .unwrap();
        assert!(!store.has_document(&doc));
        store
            .persist_fragment(fragment("a_1", FragmentKind::Linkbase, "", "file:///a.xml"))
            .unwrap();
        assert!(store.has_document(&doc));
        assert_eq!(store.document_uris(), vec![doc.clone()]);
        assert_eq!(store.delete_document(&doc).unwrap(), 2);
        assert!(!store.has_document(&doc));
        assert_eq!(store.fragment_count(), 0);
    }

    #[test]
    fn test_query_orders_by_document_position() {
        let store = MemoryStore::new();
        for n in [10, 2, 1] {
            let mut f = fragment(
                &format!("a_{n}"),
                FragmentKind::Locator,
                "a_1",
                "file:///a.xml",
            );
            f.attributes.push(Attribute::new(XLINK_NS, "label", "L1"));
            store.persist_fragment(f).unwrap();
        }
        let found = store.query_fragments(
            &FragmentQuery::new()
                .in_document(&uri("file:///a.xml"))
                .kind(FragmentKind::Locator)
                .attribute(XLINK_NS, "label", "L1"),
        );
        let indices: Vec<&str> = found.iter().map(|f| f.index.as_str()).collect();
        assert_eq!(indices, vec!["a_1", "a_2", "a_10"]);
        assert!(store
            .query_fragments(&FragmentQuery::new().attribute(XLINK_NS, "label", "L2"))
            .is_empty());
    }

    #[test]
    fn test_claims_are_exclusive() {
        let store = MemoryStore::new();
        let (a, b) = (CrawlerId::new(), CrawlerId::new());
        let doc = uri("file:///a.xml");
        assert!(store.claim(a, &doc));
        assert!(store.claim(a, &doc));
        assert!(!store.claim(b, &doc));
        store.release(b, &doc);
        assert!(!store.claim(b, &doc));
        store.release(a, &doc);
        assert!(store.claim(b, &doc));
    }

    #[test]
    fn test_concurrent_claims_grant_one_winner() {
        let store = Arc::new(MemoryStore::new());
        let doc = uri("file:///contended.xml");
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                let doc = doc.clone();
                std::thread::spawn(move || store.claim(CrawlerId::new(), &doc))
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }

    #[test]
    fn test_loader_monitor() {
        let store = MemoryStore::new();
        let monitor = store.loader_monitor();
        let (a, b) = (CrawlerId::new(), CrawlerId::new());
        store.start_loading(a);
        store.start_loading(b);
        assert_eq!(*monitor.borrow(), 2);
        store.stop_loading(a);
        assert!(store.is_loading());
        store.stop_loading(b);
        assert!(!store.is_loading());
    }

    #[test]
    fn test_work_state_merges_and_takes() {
        let store = MemoryStore::new();
        store
            .persist_work_state(BTreeMap::from([(uri("file:///a.xml"), "pending".into())]))
            .unwrap();
        store
            .persist_work_state(BTreeMap::from([(uri("file:///b.xml"), "failed".into())]))
            .unwrap();
        assert_eq!(store.work_state().len(), 2);
        assert_eq!(store.take_work_state().unwrap().len(), 2);
        assert!(store.work_state().is_empty());
    }

    #[test]
    fn test_snapshot_round_trip() {
        let store = MemoryStore::new();
        store
            .persist_fragment(fragment("a_1", FragmentKind::Schema, "", "file:///a.xsd"))
            .unwrap();
        store
            .persist_error(ErrorMarker {
                index: "a_error_1".into(),
                document: uri("file:///a.xsd"),
                arc_index: None,
                reason: "missing".into(),
            })
            .unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        store.save(&path).unwrap();
        let restored = MemoryStore::load(&path).unwrap();
        assert!(restored.has_document(&uri("file:///a.xsd")));
        assert_eq!(restored.errors(None).len(), 1);
        assert_eq!(MemoryStore::load(dir.path().join("absent.json")).unwrap().fragment_count(), 0);
    }
}
