//! # xbrl-dts
//!
//! A Rust library for discovering XBRL taxonomies and instances and compiling their XLink
//! structure into a queryable relationship graph.
//!
//! ## Overview
//!
//! A Discoverable Taxonomy Set (DTS) is the transitive closure of documents reachable from a set
//! of seed URIs through schema imports, linkbase references, locator hrefs and schema location
//! hints. xbrl-dts crawls that closure, splits every document into addressable **fragments**, and
//! turns the arcs of extended links into flattened **relationships**. Consumers then ask "what
//! points to what, with which role, and which relationship wins" without re-parsing anything.
//!
//! ### Key Features
//!
//! - **Deterministic crawling**: Lexically ordered frontier, first-claimer-wins document claims
//! - **Several crawlers, one store**: Claims keep documents from being parsed twice; a loader
//!   barrier holds back relationship materialization until discovery has finished everywhere
//! - **Validating XLink classification**: Nesting and attribute legality checked per link kind
//! - **Deferred locators**: Locator targets are resolved when relationships are compiled, so
//!   documents may be loaded in any order
//! - **Override and prohibition**: Equivalent relationships are grouped and the active one is
//!   chosen by priority, with prohibition vetoing the group
//! - **Resumable**: Pending and failed documents are persisted as work state for the next run
//!
//! ## Architecture
//!
//! - **[`xlink`]**: Link classifier (`XLinkProcessor`, `LinkKind`, `LinkHandler`)
//! - **[`codec`]**: XML events, fragment assembly and the `DiscoveryCrawler`
//! - **[`store`]**: The `FragmentStore` and `DocumentSource` collaborators, with in-memory and
//!   file-backed implementations
//! - **[`networks`]**: Relationship compilation, `Network`/`Networks` resolution and the
//!   `RelationshipStorer`
//! - **[`properties`]**: Fragments, fragment kinds and namespace constants
//! - **[`event`]**: Progress events
//! - **[`config`]**: Crawl switches, the TOML config file and work-state persistence
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use url::Url;
//! use xbrl_dts::{
//!     codec::DiscoveryCrawler,
//!     config::CrawlConfig,
//!     networks::Networks,
//!     store::{MemorySource, MemoryStore},
//! };
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), xbrl_dts::DtsError> {
//! let source = MemorySource::new().with_document(
//!     "http://example.com/entry.xsd",
//!     r#"<xsd:schema xmlns:xsd="http://www.w3.org/2001/XMLSchema"/>"#,
//! )?;
//! let store = Arc::new(MemoryStore::new());
//! let mut crawler = DiscoveryCrawler::new(store.clone(), Arc::new(source), CrawlConfig::default());
//! crawler.seed([&Url::parse("http://example.com/entry.xsd")?])?;
//!
//! let report = crawler.run().await?;
//! assert_eq!(report.explored, 1);
//!
//! let networks = Networks::from_store(store.as_ref())?;
//! assert!(networks.is_empty());
//! # Ok(())
//! # }
//! ```
//!
//! ## Features
//!
//! - **default**: The library
//! - **bin**: The `dts` command line crawler (`clap`, `walkdir`, `ctrlc`, `tracing-subscriber`)

pub mod codec;
pub mod config;
pub mod error;
pub mod event;
pub mod networks;
pub mod properties;
pub mod store;
pub mod uri;
pub mod xlink;

#[cfg(test)]
mod tests;

pub use error::*;
