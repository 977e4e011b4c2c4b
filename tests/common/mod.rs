//! Shared test utilities for integration tests.
//!
//! Import from integration test files as:
//! ```ignore
//! mod common;
//! ```

use std::sync::Arc;
use url::Url;
use xbrl_dts::store::MemorySource;

/// Initialize tracing for tests, respecting RUST_LOG env var.
///
/// Safe to call multiple times; subsequent calls are no-ops.
#[allow(dead_code)]
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}

pub const BASE: &str = "http://example.com/dts/";
pub const LINK_ROLE: &str = "http://www.xbrl.org/2003/role/link";
pub const LABEL_ARCROLE: &str = "http://example.com/arcrole/label-role";
pub const LABEL_ROLE: &str = "http://www.xbrl.org/2003/role/label";

#[allow(dead_code)]
pub fn uri(relative: &str) -> Url {
    Url::parse(BASE).unwrap().join(relative).unwrap()
}

/// Schema declaring concept `C1`.
pub const SCHEMA: &str = r#"<xsd:schema xmlns:xsd="http://www.w3.org/2001/XMLSchema"
    xmlns:xbrli="http://www.xbrl.org/2003/instance" targetNamespace="http://example.com/dts">
  <xsd:element id="C1" name="C1" substitutionGroup="xbrli:item"/>
</xsd:schema>"#;

/// One extended link: locator `L1` to `C1`, label resource `L2` (id `R1`), and an arc from `L1`
/// to `L2`.
pub const DOC_A: &str = r#"<link:linkbase xmlns:link="http://www.xbrl.org/2003/linkbase"
    xmlns:xlink="http://www.w3.org/1999/xlink">
  <link:labelLink xlink:type="extended" xlink:role="http://www.xbrl.org/2003/role/link">
    <link:loc xlink:type="locator" xlink:href="schema.xsd#C1" xlink:label="L1"/>
    <link:label xlink:type="resource" xlink:label="L2" id="R1" xml:lang="en"
        xlink:role="http://www.xbrl.org/2003/role/label">Concept one</link:label>
    <link:labelArc xlink:type="arc" xlink:from="L1" xlink:to="L2"
        xlink:arcrole="http://example.com/arcrole/label-role"/>
  </link:labelLink>
</link:linkbase>"#;

/// Prohibits the relationship asserted by [DOC_A].
pub const DOC_B: &str = r#"<link:linkbase xmlns:link="http://www.xbrl.org/2003/linkbase"
    xmlns:xlink="http://www.w3.org/1999/xlink">
  <link:labelLink xlink:type="extended" xlink:role="http://www.xbrl.org/2003/role/link">
    <link:loc xlink:type="locator" xlink:href="schema.xsd#C1" xlink:label="concept"/>
    <link:loc xlink:type="locator" xlink:href="doc-a.xml#R1" xlink:label="label"/>
    <link:labelArc xlink:type="arc" xlink:from="concept" xlink:to="label"
        xlink:arcrole="http://example.com/arcrole/label-role" priority="2" use="prohibited"/>
  </link:labelLink>
</link:linkbase>"#;

/// Overrides the relationship asserted by [DOC_A] with an optional, higher priority arc.
#[allow(dead_code)]
pub const DOC_C: &str = r#"<link:linkbase xmlns:link="http://www.xbrl.org/2003/linkbase"
    xmlns:xlink="http://www.w3.org/1999/xlink">
  <link:labelLink xlink:type="extended" xlink:role="http://www.xbrl.org/2003/role/link">
    <link:loc xlink:type="locator" xlink:href="schema.xsd#C1" xlink:label="concept"/>
    <link:loc xlink:type="locator" xlink:href="doc-a.xml#R1" xlink:label="label"/>
    <link:labelArc xlink:type="arc" xlink:from="concept" xlink:to="label" order="1.0"
        xlink:arcrole="http://example.com/arcrole/label-role" priority="2"/>
  </link:labelLink>
</link:linkbase>"#;

/// A source holding the schema and documents A, B and C.
#[allow(dead_code)]
pub fn source() -> Arc<MemorySource> {
    let source = MemorySource::new();
    for (name, content) in [
        ("schema.xsd", SCHEMA),
        ("doc-a.xml", DOC_A),
        ("doc-b.xml", DOC_B),
        ("doc-c.xml", DOC_C),
    ] {
        source.insert(&uri(name), content).unwrap();
    }
    Arc::new(source)
}
