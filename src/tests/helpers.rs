//! Shared test utilities for in-crate tests

use crate::{
    codec::{AssemblyOutcome, FragmentAssembler},
    store::{FragmentStore, MemoryStore},
    uri::document_id,
};
use url::Url;

/// Initialize logging for tests
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}

pub const CONCEPT_ARCROLE: &str = "http://www.xbrl.org/2003/arcrole/concept-label";
pub const LABEL_ROLE: &str = "http://www.xbrl.org/2003/role/label";
pub const LINK_ROLE: &str = "http://www.xbrl.org/2003/role/link";

/// A schema declaring concepts `C1` and `C2` and referencing `lab.xml`.
pub const SCHEMA: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<xsd:schema xmlns:xsd="http://www.w3.org/2001/XMLSchema"
    xmlns:xbrli="http://www.xbrl.org/2003/instance"
    xmlns:link="http://www.xbrl.org/2003/linkbase"
    xmlns:xlink="http://www.w3.org/1999/xlink"
    targetNamespace="http://example.com/t">
  <xsd:annotation>
    <xsd:appinfo>
      <link:linkbaseRef xlink:type="simple" xlink:href="lab.xml"
          xlink:arcrole="http://www.w3.org/1999/xlink/properties/linkbase"/>
    </xsd:appinfo>
  </xsd:annotation>
  <xsd:element id="C1" name="C1" substitutionGroup="xbrli:item"/>
  <xsd:element id="C2" name="C2" substitutionGroup="xbrli:item"/>
</xsd:schema>"#;

/// A label linkbase labelling `C1` in English and French.
pub const LABELS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<link:linkbase xmlns:link="http://www.xbrl.org/2003/linkbase"
    xmlns:xlink="http://www.w3.org/1999/xlink" xml:lang="en">
  <link:labelLink xlink:type="extended" xlink:role="http://www.xbrl.org/2003/role/link">
    <link:loc xlink:type="locator" xlink:href="s.xsd#C1" xlink:label="L1"/>
    <link:label xlink:type="resource" xlink:label="L2"
        xlink:role="http://www.xbrl.org/2003/role/label">Assets</link:label>
    <link:label xlink:type="resource" xlink:label="L2"
        xlink:role="http://www.xbrl.org/2003/role/label" xml:lang="fr">Actifs</link:label>
    <link:labelArc xlink:type="arc" xlink:from="L1" xlink:to="L2"
        xlink:arcrole="http://www.xbrl.org/2003/arcrole/concept-label"/>
  </link:labelLink>
</link:linkbase>"#;

/// Assemble `content` as `uri` straight into `store`.
pub fn load_document(store: &MemoryStore, uri: &str, content: &str) -> (Url, AssemblyOutcome) {
    let uri = Url::parse(uri).unwrap();
    let outcome = FragmentAssembler::new(uri.clone(), document_id(&uri), false)
        .assemble(content, |fragment| store.persist_fragment(fragment))
        .unwrap();
    (uri, outcome)
}
