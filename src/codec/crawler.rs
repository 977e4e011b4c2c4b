use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, BTreeSet},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};
use tokio::sync::mpsc::UnboundedSender;
use url::Url;

use crate::{
    codec::{assembler::FragmentAssembler, ParseDiagnostic},
    config::{CrawlConfig, NOT_YET_ANALYSED},
    error::DtsError,
    event::{DtsEvent, SkipReason},
    networks::{RelationshipStorer, StoreReport},
    store::{CrawlerId, DocumentSource, FragmentStore},
    uri::normalize_document_uri,
};

/// Cloneable handle for stopping a crawl from another task or thread.
#[derive(Debug, Clone, Default)]
pub struct InterruptHandle(Arc<AtomicBool>);

impl InterruptHandle {
    /// Ask the crawler to stop after the document it is working on.
    pub fn request_interrupt(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_interrupted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// What happened to the one URI [DiscoveryCrawler::discover_next] took off the frontier.
#[derive(Debug, Clone, PartialEq)]
pub enum DocumentOutcome {
    Parsed {
        uri: Url,
        fragments: usize,
        /// URIs this document added to the frontier
        queued: Vec<Url>,
        diagnostics: Vec<ParseDiagnostic>,
    },
    Skipped(Url, SkipReason),
    Failed(Url, String),
}

impl DocumentOutcome {
    pub fn uri(&self) -> &Url {
        match self {
            DocumentOutcome::Parsed { uri, .. }
            | DocumentOutcome::Skipped(uri, _)
            | DocumentOutcome::Failed(uri, _) => uri,
        }
    }
}

/// Summary of one [DiscoveryCrawler::run].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CrawlReport {
    /// URIs parsed or found already present
    pub explored: usize,
    /// URIs left on the frontier
    pub pending: BTreeSet<Url>,
    /// URI to failure reason
    pub failed: BTreeMap<Url, String>,
    /// Documents this crawler parsed, in parse order
    pub newly_discovered: Vec<Url>,
    pub relationships: StoreReport,
    pub interrupted: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CrawlerStats {
    pub pending: usize,
    pub explored: usize,
    pub failed: usize,
    pub newly_discovered: usize,
    /// Documents handed to the assembler, successful or not
    pub parses: usize,
}

/// Turns seed URIs into the complete, deduplicated set of documents they reach.
///
/// ## Frontier
///
/// Pending URIs are kept in a sorted set and always taken smallest first, so a crawl over a fixed
/// document set visits documents in the same order every time. A URI leaves the frontier for
/// exactly one of `explored` or `failures` and is never queued again unless [Self::reset].
///
/// ## Per-document flow
///
/// 1. Claim the URI in the store. A denied claim means another crawler owns it: mark explored.
/// 2. If the store already holds the document, release and mark explored.
/// 3. Fetch the text through the [DocumentSource] and assemble it, persisting fragments as they
///    close.
/// 4. On success queue every discovered URI, mark explored and remember the document as newly
///    discovered.
/// 5. On failure purge the document's fragments and record the reason. URIs the document
///    referenced before it failed are still queued. The crawl continues.
/// 6. Release the claim.
///
/// ## Shared state
///
/// The frontier, explored set and failures are private to one crawler. Only the store is shared:
/// its claim table keeps two crawlers from parsing the same document, and its loader registry
/// lets [Self::run] wait until every crawler on the store has finished discovering before
/// relationships are materialized.
pub struct DiscoveryCrawler<S: FragmentStore, D: DocumentSource> {
    id: CrawlerId,
    store: Arc<S>,
    source: Arc<D>,
    config: CrawlConfig,
    frontier: BTreeSet<Url>,
    explored: BTreeSet<Url>,
    failures: BTreeMap<Url, String>,
    newly_discovered: Vec<Url>,
    parses: usize,
    interrupt: InterruptHandle,
    tx: Option<UnboundedSender<DtsEvent>>,
}

impl<S: FragmentStore, D: DocumentSource> DiscoveryCrawler<S, D> {
    pub fn new(store: Arc<S>, source: Arc<D>, config: CrawlConfig) -> Self {
        DiscoveryCrawler {
            id: CrawlerId::new(),
            store,
            source,
            config,
            frontier: BTreeSet::new(),
            explored: BTreeSet::new(),
            failures: BTreeMap::new(),
            newly_discovered: Vec::new(),
            parses: 0,
            interrupt: InterruptHandle::default(),
            tx: None,
        }
    }

    /// Send [DtsEvent]s to `tx` while crawling.
    pub fn with_events(mut self, tx: UnboundedSender<DtsEvent>) -> Self {
        self.tx = Some(tx);
        self
    }

    pub fn id(&self) -> CrawlerId {
        self.id
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn config(&self) -> &CrawlConfig {
        &self.config
    }

    /// Queue starting points. Every URI must be absolute and hierarchical; nothing is queued if
    /// one of them is not.
    pub fn seed<'u>(&mut self, uris: impl IntoIterator<Item = &'u Url>) -> Result<usize, DtsError> {
        let normalized = uris
            .into_iter()
            .map(normalize_document_uri)
            .collect::<Result<Vec<Url>, DtsError>>()?;
        let mut queued = 0;
        for uri in normalized {
            if self.stash(uri) {
                queued += 1;
            }
        }
        Ok(queued)
    }

    /// Queue a normalized URI unless it is already pending, explored or failed.
    pub fn stash(&mut self, uri: Url) -> bool {
        if self.explored.contains(&uri) || self.failures.contains_key(&uri) {
            return false;
        }
        let queued = self.frontier.insert(uri.clone());
        if queued {
            tracing::debug!("[Crawler] queued {}", uri);
        }
        queued
    }

    /// Forget what this crawler knows about `uri` and queue it again.
    pub fn reset(&mut self, uri: &Url) -> Result<bool, DtsError> {
        let uri = normalize_document_uri(uri)?;
        self.explored.remove(&uri);
        self.failures.remove(&uri);
        self.newly_discovered.retain(|u| *u != uri);
        Ok(self.stash(uri))
    }

    pub fn interrupt_handle(&self) -> InterruptHandle {
        self.interrupt.clone()
    }

    pub fn request_interrupt(&self) {
        self.interrupt.request_interrupt();
    }

    /// Pending URIs, in the order they will be visited.
    pub fn documents_still_to_analyse(&self) -> Vec<Url> {
        self.frontier.iter().cloned().collect()
    }

    pub fn failures(&self) -> &BTreeMap<Url, String> {
        &self.failures
    }

    pub fn explored(&self) -> &BTreeSet<Url> {
        &self.explored
    }

    pub fn newly_discovered(&self) -> &[Url] {
        &self.newly_discovered
    }

    pub fn stats(&self) -> CrawlerStats {
        CrawlerStats {
            pending: self.frontier.len(),
            explored: self.explored.len(),
            failed: self.failures.len(),
            newly_discovered: self.newly_discovered.len(),
            parses: self.parses,
        }
    }

    fn emit(&self, event: DtsEvent) {
        if let Some(tx) = self.tx.as_ref() {
            if let Err(e) = tx.send(event) {
                tracing::debug!("[Crawler] event receiver dropped: {}", e);
            }
        }
    }

    fn skip(&mut self, uri: Url, reason: SkipReason) -> DocumentOutcome {
        tracing::debug!("[Crawler] skipping {}: {:?}", uri, reason);
        self.explored.insert(uri.clone());
        self.emit(DtsEvent::DocumentSkipped(uri.clone(), reason));
        DocumentOutcome::Skipped(uri, reason)
    }

    fn fail(&mut self, uri: Url, error: DtsError) -> DocumentOutcome {
        let reason = error.to_string();
        tracing::warn!("[Crawler] failed to load {}: {}", uri, reason);
        match self.store.delete_document(&uri) {
            Ok(0) => {}
            Ok(n) => tracing::debug!("[Crawler] purged {} fragments of {}", n, uri),
            Err(e) => tracing::warn!("[Crawler] could not purge fragments of {}: {}", uri, e),
        }
        self.store.release(self.id, &uri);
        self.failures.insert(uri.clone(), reason.clone());
        self.emit(DtsEvent::DocumentFailed(uri.clone(), reason.clone()));
        DocumentOutcome::Failed(uri, reason)
    }

    /// Take the smallest pending URI and process it. Returns `None` once the frontier is empty.
    ///
    /// This never waits on other crawlers and never materializes relationships; see [Self::run].
    pub async fn discover_next(&mut self) -> Option<DocumentOutcome> {
        // 1. Take the next URI in lexical order
        let uri = self.frontier.pop_first()?;

        // 2. Claim it, or leave it to whoever owns it
        if !self.store.claim(self.id, &uri) {
            return Some(self.skip(uri, SkipReason::ClaimDenied));
        }

        // 3. Already loaded by an earlier run or another crawler
        if self.store.has_document(&uri) {
            self.store.release(self.id, &uri);
            return Some(self.skip(uri, SkipReason::AlreadyPresent));
        }
        self.emit(DtsEvent::DocumentClaimed(uri.clone()));
        self.parses += 1;

        // 4. Fetch
        let content = match self.source.fetch(&uri).await {
            Ok(content) => content,
            Err(e) => return Some(self.fail(uri, e)),
        };

        // 5. Assemble, persisting fragments as they close
        let store = self.store.clone();
        let assembler = FragmentAssembler::new(
            uri.clone(),
            store.document_id(&uri),
            self.config.use_schema_locations,
        );
        let outcome = match assembler.try_assemble(&content, |fragment| store.persist_fragment(fragment)) {
            Ok(outcome) => outcome,
            Err(failure) => {
                // References seen before the failure stay queued
                for document in failure.partial.discovered {
                    self.stash(document);
                }
                return Some(self.fail(uri, failure.error));
            }
        };

        // 6. Queue what the document references
        let queued: Vec<Url> = outcome
            .discovered
            .into_iter()
            .filter(|d| self.stash(d.clone()))
            .collect();

        self.store.release(self.id, &uri);
        self.explored.insert(uri.clone());
        self.newly_discovered.push(uri.clone());
        tracing::info!(
            "[Crawler] parsed {} ({} fragments, {} new references)",
            uri,
            outcome.fragment_count,
            queued.len()
        );
        self.emit(DtsEvent::DocumentParsed(uri.clone(), outcome.fragment_count));
        Some(DocumentOutcome::Parsed {
            uri,
            fragments: outcome.fragment_count,
            queued,
            diagnostics: outcome.diagnostics,
        })
    }

    /// Record the frontier and the failures in the store so a later run can resume.
    fn persist_work_state(&self) -> Result<(), DtsError> {
        let mut pending: BTreeMap<Url, String> = self
            .frontier
            .iter()
            .map(|uri| (uri.clone(), NOT_YET_ANALYSED.to_string()))
            .collect();
        pending.extend(self.failures.clone());
        if pending.is_empty() {
            return Ok(());
        }
        tracing::info!("[Crawler] recording {} unfinished documents", pending.len());
        self.store.persist_work_state(pending)
    }

    /// Drain the frontier, then materialize relationships for the documents this crawler parsed,
    /// in URI order.
    ///
    /// Work persisted by an earlier interrupted or failing run is queued first. The interrupt is
    /// checked between documents. Relationship materialization waits until no crawler sharing the
    /// store is still discovering.
    pub async fn run(&mut self) -> Result<CrawlReport, DtsError> {
        self.store.start_loading(self.id);
        match self.store.take_work_state() {
            Ok(resumed) => {
                for (uri, reason) in resumed {
                    tracing::debug!("[Crawler] resuming {} ({})", uri, reason);
                    self.stash(uri);
                }
            }
            Err(e) => tracing::warn!("[Crawler] could not read persisted work state: {}", e),
        }

        let mut interrupted = false;
        loop {
            if self.interrupt.is_interrupted() {
                tracing::info!(
                    "[Crawler] interrupted with {} documents pending",
                    self.frontier.len()
                );
                interrupted = true;
                self.interrupt.clear();
                break;
            }
            if self.discover_next().await.is_none() {
                break;
            }
        }

        let persisted = self.persist_work_state();
        self.store.stop_loading(self.id);
        persisted?;

        let mut relationships = StoreReport::default();
        if self.config.persist_relationships && !self.newly_discovered.is_empty() {
            let mut loaders = self.store.loader_monitor();
            if *loaders.borrow() > 0 {
                tracing::debug!("[Crawler] waiting for other crawlers to finish discovering");
            }
            loaders.wait_for(|active| *active == 0).await?;

            // URI order, so insertion order does not depend on the path discovery took
            let mut documents = self.newly_discovered.clone();
            documents.sort();
            let storer = RelationshipStorer::new(self.store.as_ref());
            for uri in documents.iter() {
                match storer.store_relationships(uri) {
                    Ok(report) => {
                        self.emit(DtsEvent::RelationshipsStored(uri.clone(), report.stored));
                        relationships += report;
                    }
                    Err(e) => tracing::warn!("[Crawler] no relationships for {}: {}", uri, e),
                }
            }
        }

        let report = CrawlReport {
            explored: self.explored.len(),
            pending: self.frontier.clone(),
            failed: self.failures.clone(),
            newly_discovered: self.newly_discovered.clone(),
            relationships,
            interrupted,
        };
        tracing::info!(
            "[Crawler] finished: {} explored, {} pending, {} failed",
            report.explored,
            report.pending.len(),
            report.failed.len()
        );
        self.emit(DtsEvent::CrawlFinished(
            report.explored,
            report.pending.len(),
            report.failed.len(),
        ));
        Ok(report)
    }
}
