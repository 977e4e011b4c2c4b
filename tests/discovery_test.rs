//! Integration tests for discovery against a shared store
//!
//! Covers claim exclusivity between crawlers, the loader barrier in front of relationship
//! materialization, resumption from persisted work state, and the event stream.

mod common;

use common::*;
use std::{sync::Arc, time::Duration};
use test_log::test;
use tokio::sync::mpsc::unbounded_channel;
use xbrl_dts::{
    codec::{DiscoveryCrawler, DocumentOutcome},
    config::CrawlConfig,
    event::{DtsEvent, SkipReason},
    store::{CrawlerId, FragmentStore, MemorySource, MemoryStore, RelationshipQuery},
};

#[test(tokio::test)]
async fn test_second_crawl_fetches_nothing() -> Result<(), Box<dyn std::error::Error>> {
    let store = Arc::new(MemoryStore::new());
    let source = source();

    let mut first = DiscoveryCrawler::new(store.clone(), source.clone(), CrawlConfig::default());
    first.seed([&uri("doc-a.xml")])?;
    let report = first.run().await?;
    assert_eq!(report.newly_discovered, vec![uri("doc-a.xml"), uri("schema.xsd")]);
    assert_eq!(source.total_fetches(), 2);
    let fragments = store.fragment_count();
    let relationships = store.relationship_count();
    assert_eq!(relationships, 1);

    let mut second = DiscoveryCrawler::new(store.clone(), source.clone(), CrawlConfig::default());
    second.seed([&uri("doc-a.xml")])?;
    let report = second.run().await?;
    assert!(report.newly_discovered.is_empty());
    assert_eq!(report.explored, 1);
    assert_eq!(source.total_fetches(), 2);
    assert_eq!(store.fragment_count(), fragments);
    assert_eq!(store.relationship_count(), relationships);
    Ok(())
}

#[test(tokio::test)]
async fn test_claimed_document_is_left_to_its_owner() -> Result<(), Box<dyn std::error::Error>> {
    let store = Arc::new(MemoryStore::new());
    let source = source();
    let owner = CrawlerId::new();
    assert!(store.claim(owner, &uri("schema.xsd")));

    let mut crawler = DiscoveryCrawler::new(store.clone(), source.clone(), CrawlConfig::default());
    crawler.seed([&uri("schema.xsd")])?;
    let outcome = crawler.discover_next().await;
    assert_eq!(
        outcome,
        Some(DocumentOutcome::Skipped(uri("schema.xsd"), SkipReason::ClaimDenied))
    );
    assert_eq!(source.fetch_count(&uri("schema.xsd")), 0);
    assert!(crawler.explored().contains(&uri("schema.xsd")));

    store.release(owner, &uri("schema.xsd"));
    assert!(store.claims().is_empty());
    Ok(())
}

#[test(tokio::test)]
async fn test_concurrent_crawlers_fetch_each_document_once() -> Result<(), Box<dyn std::error::Error>> {
    let store = Arc::new(MemoryStore::new());
    let source = source();
    let mut left = DiscoveryCrawler::new(store.clone(), source.clone(), CrawlConfig::default());
    let mut right = DiscoveryCrawler::new(store.clone(), source.clone(), CrawlConfig::default());
    left.seed([&uri("doc-a.xml"), &uri("doc-b.xml")])?;
    right.seed([&uri("doc-b.xml"), &uri("doc-c.xml")])?;

    let (left_report, right_report) = tokio::join!(left.run(), right.run());
    let (left_report, right_report) = (left_report?, right_report?);

    for name in ["schema.xsd", "doc-a.xml", "doc-b.xml", "doc-c.xml"] {
        assert_eq!(source.fetch_count(&uri(name)), 1, "{name} fetched more than once");
        assert!(store.has_document(&uri(name)));
    }
    let parsed = left_report.newly_discovered.len() + right_report.newly_discovered.len();
    assert_eq!(parsed, 4);
    assert_eq!(store.relationship_count(), 3);
    assert!(store.claims().is_empty());
    assert!(!store.is_loading());
    Ok(())
}

#[test(tokio::test)]
async fn test_relationships_wait_for_every_loader() -> Result<(), Box<dyn std::error::Error>> {
    let store = Arc::new(MemoryStore::new());
    let other = CrawlerId::new();
    store.start_loading(other);

    let mut crawler = DiscoveryCrawler::new(store.clone(), source(), CrawlConfig::default());
    crawler.seed([&uri("doc-a.xml")])?;
    let handle = tokio::spawn(async move { crawler.run().await });

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!handle.is_finished());
    assert!(store.has_document(&uri("schema.xsd")));
    assert_eq!(store.relationship_count(), 0);

    store.stop_loading(other);
    let report = handle.await??;
    assert_eq!(report.relationships.stored, 1);
    assert_eq!(store.relationship_count(), 1);
    Ok(())
}

#[test(tokio::test)]
async fn test_failed_document_is_retried_by_next_run() -> Result<(), Box<dyn std::error::Error>> {
    let store = Arc::new(MemoryStore::new());
    let partial = Arc::new(MemorySource::new());
    partial.insert(&uri("doc-a.xml"), DOC_A)?;

    let mut crawler = DiscoveryCrawler::new(store.clone(), partial.clone(), CrawlConfig::default());
    crawler.seed([&uri("doc-a.xml")])?;
    let report = crawler.run().await?;
    assert_eq!(report.failed.len(), 1);
    assert!(report.failed.contains_key(&uri("schema.xsd")));
    assert_eq!(report.relationships.stored, 0);
    assert_eq!(report.relationships.failed, 1);
    assert_eq!(store.errors(Some(&uri("doc-a.xml"))).len(), 1);
    assert!(store.work_state().contains_key(&uri("schema.xsd")));

    partial.insert(&uri("schema.xsd"), SCHEMA)?;
    let mut resumed = DiscoveryCrawler::new(store.clone(), partial.clone(), CrawlConfig::default());
    let report = resumed.run().await?;
    assert!(report.failed.is_empty());
    assert_eq!(report.newly_discovered, vec![uri("schema.xsd")]);
    assert!(store.work_state().is_empty());
    assert_eq!(partial.fetch_count(&uri("doc-a.xml")), 1);
    Ok(())
}

#[test(tokio::test)]
async fn test_events_follow_the_crawl() -> Result<(), Box<dyn std::error::Error>> {
    let store = Arc::new(MemoryStore::new());
    let (tx, mut rx) = unbounded_channel();
    let mut crawler =
        DiscoveryCrawler::new(store.clone(), source(), CrawlConfig::default()).with_events(tx);
    crawler.seed([&uri("doc-a.xml"), &uri("missing.xml")])?;
    crawler.run().await?;
    drop(crawler);

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    assert!(events.contains(&DtsEvent::DocumentClaimed(uri("doc-a.xml"))));
    assert!(events
        .iter()
        .any(|e| matches!(e, DtsEvent::DocumentParsed(u, n) if *u == uri("schema.xsd") && *n > 1)));
    assert!(events
        .iter()
        .any(|e| matches!(e, DtsEvent::DocumentFailed(u, _) if *u == uri("missing.xml"))));
    assert!(events.contains(&DtsEvent::RelationshipsStored(uri("doc-a.xml"), 1)));
    assert_eq!(events.last(), Some(&DtsEvent::CrawlFinished(2, 0, 1)));
    Ok(())
}

#[test(tokio::test)]
async fn test_references_before_a_parse_error_are_crawled() -> Result<(), Box<dyn std::error::Error>> {
    let store = Arc::new(MemoryStore::new());
    let source = source();
    source.insert(
        &uri("entry.xsd"),
        r#"<xsd:schema xmlns:xsd="http://www.w3.org/2001/XMLSchema">
  <xsd:import namespace="http://example.com/dts" schemaLocation="schema.xsd"/>
  <xsd:element name="broken"></xsd:schema>"#,
    )?;

    let mut crawler = DiscoveryCrawler::new(store.clone(), source.clone(), CrawlConfig::default());
    crawler.seed([&uri("entry.xsd")])?;
    let report = crawler.run().await?;

    assert_eq!(report.failed.keys().collect::<Vec<_>>(), vec![&uri("entry.xsd")]);
    assert_eq!(report.newly_discovered, vec![uri("schema.xsd")]);
    assert_eq!(source.fetch_count(&uri("schema.xsd")), 1);
    assert!(!store.has_document(&uri("entry.xsd")));
    Ok(())
}

#[test(tokio::test)]
async fn test_relationships_are_stored_in_document_order() -> Result<(), Box<dyn std::error::Error>> {
    let store = Arc::new(MemoryStore::new());
    let mut crawler = DiscoveryCrawler::new(store.clone(), source(), CrawlConfig::default());
    crawler.seed([&uri("doc-c.xml")])?;
    let report = crawler.run().await?;
    assert_eq!(
        report.newly_discovered,
        vec![uri("doc-c.xml"), uri("doc-a.xml"), uri("schema.xsd")]
    );

    let stored: Vec<_> = store
        .query_relationships(&RelationshipQuery::new())
        .into_iter()
        .map(|r| r.arc_uri)
        .collect();
    assert_eq!(stored, vec![uri("doc-a.xml"), uri("doc-c.xml")]);
    Ok(())
}
