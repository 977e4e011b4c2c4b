use serde::{Deserialize, Serialize};
use std::ops::AddAssign;
use url::Url;

use crate::{
    error::DtsError,
    networks::{Network, Networks, Relationship, RelationshipCompiler},
    properties::ErrorMarker,
    store::{FragmentStore, RelationshipQuery},
};

/// Counts from one materialization pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreReport {
    /// Relationships newly persisted
    pub stored: usize,
    /// Relationships already present
    pub skipped: usize,
    /// Arcs or pairs recorded as error markers
    pub failed: usize,
}

impl AddAssign for StoreReport {
    fn add_assign(&mut self, other: StoreReport) {
        self.stored += other.stored;
        self.skipped += other.skipped;
        self.failed += other.failed;
    }
}

/// Materializes relationships in the store and removes the ones that are no longer needed.
pub struct RelationshipStorer<'a, S: FragmentStore + ?Sized> {
    store: &'a S,
}

impl<'a, S: FragmentStore + ?Sized> RelationshipStorer<'a, S> {
    pub fn new(store: &'a S) -> Self {
        RelationshipStorer { store }
    }

    /// Persist `relationship` unless one with the same index exists. Returns whether it was
    /// written.
    pub fn store_relationship(&self, relationship: Relationship) -> Result<bool, DtsError> {
        if self.store.has_relationship(&relationship.index) {
            return Ok(false);
        }
        self.store.persist_relationship(relationship)?;
        Ok(true)
    }

    fn record_error(&self, document: &Url, arc_index: Option<&str>, error: &DtsError) {
        let number = self.store.errors(Some(document)).len() + 1;
        let marker = ErrorMarker {
            index: format!("{}_error_{}", self.store.document_id(document), number),
            document: document.clone(),
            arc_index: arc_index.map(|a| a.to_string()),
            reason: error.to_string(),
        };
        tracing::warn!(
            "[Storer] {}: {}",
            arc_index.unwrap_or(document.as_str()),
            error
        );
        if let Err(e) = self.store.persist_error(marker) {
            tracing::warn!("[Storer] could not record error marker for {}: {}", document, e);
        }
    }

    /// Build and persist the relationships of every arc in `document`.
    ///
    /// Failures of single arcs or pairs become error markers for the document; the rest of the
    /// batch continues.
    pub fn store_relationships(&self, document: &Url) -> Result<StoreReport, DtsError> {
        if !self.store.has_document(document) {
            return Err(DtsError::NotFound(format!("{document} is not in the store")));
        }
        let compiler = RelationshipCompiler::new(self.store);
        let mut report = StoreReport::default();
        for arc in compiler.arcs(document) {
            let pairs = match compiler.compile_arc(&arc) {
                Ok(pairs) => pairs,
                Err(e) => {
                    self.record_error(document, Some(&arc.index), &e);
                    report.failed += 1;
                    continue;
                }
            };
            for pair in pairs {
                let outcome = pair.and_then(|relationship| self.store_relationship(relationship));
                match outcome {
                    Ok(true) => report.stored += 1,
                    Ok(false) => report.skipped += 1,
                    Err(e) => {
                        self.record_error(document, Some(&arc.index), &e);
                        report.failed += 1;
                    }
                }
            }
        }
        tracing::debug!(
            "[Storer] {}: {} stored, {} already present, {} failed",
            document,
            report.stored,
            report.skipped,
            report.failed
        );
        Ok(report)
    }

    /// [RelationshipStorer::store_relationships] for each document, in the order given.
    pub fn store_relationships_for<'d>(
        &self,
        documents: impl IntoIterator<Item = &'d Url>,
    ) -> StoreReport {
        let mut total = StoreReport::default();
        for document in documents {
            match self.store_relationships(document) {
                Ok(report) => total += report,
                Err(e) => tracing::warn!("[Storer] skipping {}: {}", document, e),
            }
        }
        tracing::info!(
            "[Storer] materialized {} relationships ({} already present, {} failed)",
            total.stored,
            total.skipped,
            total.failed
        );
        total
    }

    /// Relationships for every document in the store.
    pub fn store_all_relationships(&self) -> StoreReport {
        let documents = self.store.document_uris();
        self.store_relationships_for(documents.iter())
    }

    pub fn store_network(&self, network: &Network) -> Result<usize, DtsError> {
        let mut stored = 0;
        for relationship in network.relationships() {
            if self.store_relationship(relationship.clone())? {
                stored += 1;
            }
        }
        Ok(stored)
    }

    pub fn store_networks(&self, networks: &Networks) -> Result<usize, DtsError> {
        let mut stored = 0;
        for network in networks.iter() {
            stored += self.store_network(network)?;
        }
        Ok(stored)
    }

    fn delete_matching(&self, query: &RelationshipQuery) -> Result<usize, DtsError> {
        let mut removed = 0;
        for relationship in self.store.query_relationships(query) {
            if self.store.remove_relationship(&relationship.index)? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    pub fn delete_relationships_for_roles(
        &self,
        link_role: &str,
        arcrole: &str,
    ) -> Result<usize, DtsError> {
        self.delete_matching(&RelationshipQuery::roles(link_role, arcrole))
    }

    /// Remove the relationships defined by arcs in `document`.
    pub fn delete_relationships_for_document(&self, document: &Url) -> Result<usize, DtsError> {
        self.delete_matching(&RelationshipQuery::new().in_document(document))
    }

    pub fn delete_all_relationships(&self) -> Result<usize, DtsError> {
        self.delete_matching(&RelationshipQuery::new())
    }

    fn delete_inactive_in(&self, network: &Network) -> Result<usize, DtsError> {
        let mut removed = 0;
        for group in network.groups() {
            for relationship in group.inactive() {
                tracing::debug!("[Storer] removing inactive {}", relationship.index);
                if self.store.remove_relationship(&relationship.index)? {
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }

    /// Remove every stored relationship that loses its equivalence group. The winner stays, even
    /// when it is prohibited.
    pub fn delete_inactive_relationships(&self) -> Result<usize, DtsError> {
        let networks = Networks::from_store(self.store)?;
        let mut removed = 0;
        for network in networks.iter() {
            removed += self.delete_inactive_in(network)?;
        }
        tracing::info!("[Storer] removed {} inactive relationships", removed);
        Ok(removed)
    }

    pub fn delete_inactive_relationships_for(
        &self,
        link_role: &str,
        arcrole: &str,
    ) -> Result<usize, DtsError> {
        let network = Network::from_store(self.store, link_role, arcrole)?;
        self.delete_inactive_in(&network)
    }
}
