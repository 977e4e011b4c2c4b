//! Document parsing and discovery.
//!
//! This module turns document text into persisted [Fragment](crate::properties::Fragment)s and
//! drives the crawl that finds every document a set of seeds reaches.
//!
//! ## Key Components
//!
//! - [`XmlEventReader`] - Namespace-resolved element and text events over quick-xml
//! - [`FragmentAssembler`] - Splits one document into fragments and collects the URIs it
//!   references
//! - [`identify`] - Recognizes the non-link elements that start a fragment
//! - [`DiscoveryCrawler`] - Claims, fetches and assembles documents until the frontier is empty
//! - [`ParseDiagnostic`] - Warnings reported while parsing
//!
//! ## Discovery
//!
//! References are collected from four places while a document is assembled:
//!
//! 1. `xlink:href` of simple links (`linkbaseRef`, `schemaRef`, ...)
//! 2. `xlink:href` of locators
//! 3. `schemaLocation` of `xsd:import` and `xsd:include`
//! 4. `xsi:schemaLocation` hints, when [CrawlConfig::use_schema_locations](crate::config::CrawlConfig)
//!    is set
//!
//! ```rust
//! use url::Url;
//! use xbrl_dts::codec::FragmentAssembler;
//!
//! let uri = Url::parse("http://example.com/entry.xsd").unwrap();
//! let content = r#"<xsd:schema xmlns:xsd="http://www.w3.org/2001/XMLSchema">
//!   <xsd:import namespace="urn:other" schemaLocation="other.xsd"/>
//! </xsd:schema>"#;
//! let mut fragments = Vec::new();
//! let outcome = FragmentAssembler::new(uri, "entry", false)
//!     .assemble(content, |f| {
//!         fragments.push(f);
//!         Ok(())
//!     })
//!     .unwrap();
//! assert_eq!(fragments[0].index, "entry_1");
//! assert!(outcome
//!     .discovered
//!     .contains(&Url::parse("http://example.com/other.xsd").unwrap()));
//! ```

pub mod assembler;
pub mod crawler;
pub mod diagnostic;
pub mod identifier;
pub mod reader;

pub use assembler::{AssemblyFailure, AssemblyOutcome, FragmentAssembler};
pub use crawler::{
    CrawlReport, CrawlerStats, DiscoveryCrawler, DocumentOutcome, InterruptHandle,
};
pub use diagnostic::ParseDiagnostic;
pub use identifier::{identify, resource_kind, SchemaImportRecogniser};
pub use reader::{ElementStart, XmlEvent, XmlEventReader};
