use std::collections::BTreeSet;
use url::Url;

use crate::{
    codec::{
        diagnostic::ParseDiagnostic,
        identifier::{identify, resource_kind, SchemaImportRecogniser},
        reader::{ElementStart, XmlEvent, XmlEventReader},
    },
    error::DtsError,
    properties::{Fragment, FragmentKind, LocatorTarget, XML_NS, XSI_NS},
    uri::{normalize_document_uri, split_href},
    xlink::{ElementRef, LinkHandler, XLinkAttributes, XLinkProcessor},
};

/// What a successful assembly produced besides the fragments themselves.
#[derive(Debug, Clone, Default)]
pub struct AssemblyOutcome {
    pub fragment_count: usize,
    /// Documents referenced by this one, normalized, excluding itself
    pub discovered: BTreeSet<Url>,
    pub diagnostics: Vec<ParseDiagnostic>,
}

/// A failed assembly together with what was collected before the failure.
#[derive(Debug, Clone)]
pub struct AssemblyFailure {
    pub error: DtsError,
    pub partial: AssemblyOutcome,
}

impl From<AssemblyFailure> for DtsError {
    fn from(failure: AssemblyFailure) -> DtsError {
        failure.error
    }
}

/// Splits one document into [Fragment]s.
///
/// The assembler drives an [XLinkProcessor] over the document's element events. Links found by
/// the processor, plus the elements recognized by [identify], each open a fragment that stays
/// on a build stack until its root element closes; it is then handed to the caller's `persist`
/// callback. Fragment indices are `documentId_n` with `n` counting from 1 in document order.
///
/// Any error aborts the document. The caller is responsible for purging fragments already
/// persisted. [Self::try_assemble] also hands back the references found before the error.
pub struct FragmentAssembler {
    processor: XLinkProcessor,
    builder: FragmentBuilder,
}

impl FragmentAssembler {
    pub fn new(uri: Url, document_id: impl Into<String>, use_schema_locations: bool) -> Self {
        FragmentAssembler {
            processor: XLinkProcessor::new().with_recogniser(SchemaImportRecogniser),
            builder: FragmentBuilder {
                uri,
                document_id: document_id.into(),
                use_schema_locations,
                sequence: 0,
                elements: Vec::new(),
                open: Vec::new(),
                completed: Vec::new(),
                link_role: None,
                position: (0, 0),
                outcome: AssemblyOutcome::default(),
            },
        }
    }

    pub fn assemble<F>(self, content: &str, persist: F) -> Result<AssemblyOutcome, DtsError>
    where
        F: FnMut(Fragment) -> Result<(), DtsError>,
    {
        Ok(self.try_assemble(content, persist)?)
    }

    /// Like [Self::assemble], but a failure keeps the partial outcome.
    pub fn try_assemble<F>(
        mut self,
        content: &str,
        persist: F,
    ) -> Result<AssemblyOutcome, AssemblyFailure>
    where
        F: FnMut(Fragment) -> Result<(), DtsError>,
    {
        match self.run(content, persist) {
            Ok(()) => Ok(self.builder.outcome),
            Err(error) => Err(AssemblyFailure {
                error,
                partial: self.builder.outcome,
            }),
        }
    }

    fn run<F>(&mut self, content: &str, mut persist: F) -> Result<(), DtsError>
    where
        F: FnMut(Fragment) -> Result<(), DtsError>,
    {
        for event in XmlEventReader::new(content) {
            match event? {
                XmlEvent::Start(element) => self.start_element(&element)?,
                XmlEvent::End(..) => self.end_element()?,
                XmlEvent::Text(text) => {
                    self.processor.characters(&mut self.builder, &text)?;
                    if let Some(fragment) = self.builder.open.last_mut() {
                        fragment.text.push_str(&text);
                    }
                }
            }
            for fragment in self.builder.completed.drain(..) {
                persist(fragment)?;
                self.builder.outcome.fragment_count += 1;
            }
        }
        if !self.builder.open.is_empty() {
            return Err(DtsError::Validation(format!(
                "{} fragment(s) left open at the end of {}",
                self.builder.open.len(),
                self.builder.uri
            )));
        }
        Ok(())
    }

    fn start_element(&mut self, element: &ElementStart) -> Result<(), DtsError> {
        self.builder.position = element.position;
        self.builder.push_element(element)?;
        if self.builder.use_schema_locations {
            self.builder.stash_schema_locations(element);
        }
        self.processor
            .start_element(&mut self.builder, element.as_ref())?;
        if !self.builder.current_element_opened_fragment() {
            let parent = self.builder.parent_name();
            let kind = identify(element, parent.as_ref().map(|(n, l)| (n.as_str(), l.as_str())));
            if let Some(kind) = kind {
                self.builder.open_fragment(kind, element.as_ref());
            }
        }
        Ok(())
    }

    fn end_element(&mut self) -> Result<(), DtsError> {
        self.processor.end_element(&mut self.builder)?;
        self.builder.pop_element()
    }
}

#[derive(Debug)]
struct ElementState {
    namespace: String,
    local_name: String,
    base: Url,
    language: Option<String>,
    /// Child sequence from the document element, used for `element()` pointers
    path: Vec<usize>,
    children: usize,
    opened_fragment: bool,
}

struct FragmentBuilder {
    uri: Url,
    document_id: String,
    use_schema_locations: bool,
    sequence: u64,
    elements: Vec<ElementState>,
    open: Vec<Fragment>,
    completed: Vec<Fragment>,
    link_role: Option<String>,
    position: (usize, usize),
    outcome: AssemblyOutcome,
}

impl FragmentBuilder {
    fn push_element(&mut self, element: &ElementStart) -> Result<(), DtsError> {
        let (parent_base, parent_language, path) = match self.elements.last_mut() {
            Some(parent) => {
                parent.children += 1;
                let mut path = parent.path.clone();
                path.push(parent.children);
                (parent.base.clone(), parent.language.clone(), path)
            }
            None => (self.uri.clone(), None, vec![1]),
        };
        let base = match element.attributes.get(XML_NS, "base") {
            Some(xml_base) => parent_base.join(xml_base).map_err(|e| {
                DtsError::Validation(format!(
                    "{}: xml:base '{xml_base}' cannot be resolved: {e}",
                    element.qname
                ))
            })?,
            None => parent_base,
        };
        let language = element
            .attributes
            .get(XML_NS, "lang")
            .map(String::from)
            .or(parent_language);
        self.elements.push(ElementState {
            namespace: element.namespace.clone(),
            local_name: element.local_name.clone(),
            base,
            language,
            path,
            children: 0,
            opened_fragment: false,
        });
        Ok(())
    }

    fn pop_element(&mut self) -> Result<(), DtsError> {
        let Some(state) = self.elements.pop() else {
            return Err(DtsError::Validation(format!(
                "unbalanced element end in {}",
                self.uri
            )));
        };
        if state.opened_fragment {
            if let Some(mut fragment) = self.open.pop() {
                let trimmed = fragment.text.trim();
                if trimmed.len() != fragment.text.len() {
                    fragment.text = trimmed.to_string();
                }
                self.completed.push(fragment);
            }
        }
        Ok(())
    }

    fn parent_name(&self) -> Option<(String, String)> {
        let n = self.elements.len();
        if n < 2 {
            return None;
        }
        let parent = &self.elements[n - 2];
        Some((parent.namespace.clone(), parent.local_name.clone()))
    }

    fn current_element_opened_fragment(&self) -> bool {
        self.elements.last().is_some_and(|e| e.opened_fragment)
    }

    fn base(&self) -> &Url {
        self.elements.last().map(|e| &e.base).unwrap_or(&self.uri)
    }

    fn open_fragment(&mut self, kind: FragmentKind, element: ElementRef<'_>) -> &mut Fragment {
        self.sequence += 1;
        let index = format!("{}_{}", self.document_id, self.sequence);
        let parent_index = self
            .open
            .last()
            .map(|f| f.index.clone())
            .unwrap_or_default();
        let mut fragment = Fragment::new(index, kind, parent_index, self.uri.clone());
        fragment.namespace = element.namespace.to_string();
        fragment.local_name = element.local_name.to_string();
        fragment.attributes = element.attributes.clone();
        if let Some(state) = self.elements.last_mut() {
            state.opened_fragment = true;
            fragment.language = state.language.clone();
            fragment.pointer = format!(
                "element({})",
                state
                    .path
                    .iter()
                    .map(|n| format!("/{n}"))
                    .collect::<String>()
            );
        }
        if kind == FragmentKind::Arc || FragmentKind::arc_ends().contains(kind) {
            fragment.link_role = self.link_role.clone();
        }
        tracing::trace!("[Assembler] opened {} {}", kind, fragment.index);
        self.open.push(fragment);
        let last = self.open.len() - 1;
        &mut self.open[last]
    }

    /// Resolve an href against the in-scope base and record its document for discovery.
    fn resolve_target(&mut self, qname: &str, href: &str) -> Result<LocatorTarget, DtsError> {
        let absolute = self.base().join(href.trim()).map_err(|e| {
            DtsError::LinkSyntax(format!("{qname}: href '{href}' cannot be resolved: {e}"))
        })?;
        let (document, pointer) = split_href(&absolute)?;
        self.stash(document.clone());
        Ok(LocatorTarget {
            href: absolute,
            document,
            pointer,
        })
    }

    fn stash(&mut self, document: Url) {
        if document != self.uri {
            self.outcome.discovered.insert(document);
        }
    }

    /// Queue every location named by an `xsi:schemaLocation` hint.
    fn stash_schema_locations(&mut self, element: &ElementStart) {
        let Some(hints) = element.attributes.get(XSI_NS, "schemaLocation") else {
            return;
        };
        let locations: Vec<String> = hints
            .split_whitespace()
            .skip(1)
            .step_by(2)
            .map(String::from)
            .collect();
        for location in locations {
            match self
                .base()
                .join(&location)
                .map_err(DtsError::from)
                .and_then(|u| normalize_document_uri(&u))
            {
                Ok(document) => self.stash(document),
                Err(e) => self.warning(&format!(
                    "{}: schemaLocation hint '{location}' ignored: {e}",
                    element.qname
                )),
            }
        }
    }

    fn open_targeted(
        &mut self,
        kind: FragmentKind,
        element: ElementRef<'_>,
        link: &XLinkAttributes,
    ) -> Result<(), DtsError> {
        let href = link.href.as_deref().unwrap_or_default();
        let target = self.resolve_target(element.qname, href)?;
        self.open_fragment(kind, element).target = Some(target);
        Ok(())
    }
}

impl LinkHandler for FragmentBuilder {
    fn start_simple_link(
        &mut self,
        element: ElementRef<'_>,
        link: &XLinkAttributes,
    ) -> Result<(), DtsError> {
        self.open_targeted(FragmentKind::SimpleLink, element, link)
    }

    fn start_extended_link(
        &mut self,
        element: ElementRef<'_>,
        link: &XLinkAttributes,
    ) -> Result<(), DtsError> {
        self.link_role = link.role.clone();
        self.open_fragment(FragmentKind::ExtendedLink, element);
        Ok(())
    }

    fn end_extended_link(&mut self) -> Result<(), DtsError> {
        self.link_role = None;
        Ok(())
    }

    fn start_locator(
        &mut self,
        element: ElementRef<'_>,
        link: &XLinkAttributes,
    ) -> Result<(), DtsError> {
        self.open_targeted(FragmentKind::Locator, element, link)
    }

    fn start_arc(&mut self, element: ElementRef<'_>, _link: &XLinkAttributes) -> Result<(), DtsError> {
        self.open_fragment(FragmentKind::Arc, element);
        Ok(())
    }

    fn start_resource(
        &mut self,
        element: ElementRef<'_>,
        _link: &XLinkAttributes,
    ) -> Result<(), DtsError> {
        let kind = resource_kind(element.namespace, element.local_name);
        self.open_fragment(kind, element);
        Ok(())
    }

    fn start_title(
        &mut self,
        element: ElementRef<'_>,
        _link: &XLinkAttributes,
    ) -> Result<(), DtsError> {
        self.open_fragment(FragmentKind::Title, element);
        Ok(())
    }

    fn warning(&mut self, message: &str) {
        tracing::warn!("[Assembler] {} ({}): {}", self.uri, self.position.0, message);
        self.outcome.diagnostics.push(
            ParseDiagnostic::warning(message).with_location(self.position.0, self.position.1),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::properties::{LINK_NS, XLINK_NS};
    use test_log::test;

    const LINKBASE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<link:linkbase xmlns:link="http://www.xbrl.org/2003/linkbase"
    xmlns:xlink="http://www.w3.org/1999/xlink"
    xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"
    xsi:schemaLocation="http://www.xbrl.org/2003/linkbase http://www.xbrl.org/2003/xbrl-linkbase-2003-12-31.xsd">
  <link:roleRef roleURI="http://example.com/role/x" xlink:type="simple" xlink:href="roles.xsd#x"/>
  <link:labelLink xlink:type="extended" xlink:role="http://www.xbrl.org/2003/role/link">
    <link:loc xlink:type="locator" xlink:href="concepts.xsd#C1" xlink:label="L1"/>
    <link:label xlink:type="resource" xlink:label="L2" xlink:role="http://www.xbrl.org/2003/role/label" xml:lang="en">
      Cash
    </link:label>
    <link:labelArc xlink:type="arc" xlink:from="L1" xlink:to="L2"
        xlink:arcrole="http://www.xbrl.org/2003/arcrole/concept-label"/>
  </link:labelLink>
</link:linkbase>"#;

    fn assemble(
        uri: &str,
        content: &str,
        use_schema_locations: bool,
    ) -> Result<(Vec<Fragment>, AssemblyOutcome), DtsError> {
        let mut fragments = Vec::new();
        let outcome = FragmentAssembler::new(Url::parse(uri).unwrap(), "doc", use_schema_locations)
            .assemble(content, |f| {
                fragments.push(f);
                Ok(())
            })?;
        fragments.sort_by_key(|f| f.sequence());
        Ok((fragments, outcome))
    }

    #[test]
    fn test_linkbase_fragments() {
        let (fragments, outcome) =
            assemble("http://example.com/dir/labels.xml", LINKBASE, false).unwrap();
        let kinds: Vec<FragmentKind> = fragments.iter().map(|f| f.kind).collect();
        assert_eq!(
            kinds,
            vec![
                FragmentKind::Linkbase,
                FragmentKind::SimpleLink,
                FragmentKind::ExtendedLink,
                FragmentKind::Locator,
                FragmentKind::LabelResource,
                FragmentKind::Arc,
            ]
        );
        assert_eq!(outcome.fragment_count, 6);
        assert_eq!(fragments[0].index, "doc_1");
        assert!(fragments[0].is_root());
        assert_eq!(fragments[2].parent_index, "doc_1");
        assert_eq!(fragments[3].parent_index, "doc_3");
        assert_eq!(fragments[5].parent_index, "doc_3");

        let locator = &fragments[3];
        let target = locator.target.as_ref().unwrap();
        assert_eq!(target.document.as_str(), "http://example.com/dir/concepts.xsd");
        assert_eq!(target.pointer, "C1");
        assert_eq!(
            locator.link_role.as_deref(),
            Some("http://www.xbrl.org/2003/role/link")
        );

        let label = &fragments[4];
        assert_eq!(label.text, "Cash");
        assert_eq!(label.language.as_deref(), Some("en"));
        assert_eq!(label.pointer, "element(/1/2/2)");
        assert_eq!(label.namespace, LINK_NS);

        let arc = &fragments[5];
        assert_eq!(arc.from_label(), Some("L1"));
        assert_eq!(
            arc.attributes.get(XLINK_NS, "arcrole"),
            Some("http://www.xbrl.org/2003/arcrole/concept-label")
        );

        let discovered: Vec<&str> = outcome.discovered.iter().map(|u| u.as_str()).collect();
        assert_eq!(
            discovered,
            vec![
                "http://example.com/dir/concepts.xsd",
                "http://example.com/dir/roles.xsd"
            ]
        );
        assert!(outcome.diagnostics.is_empty());
    }

    #[test]
    fn test_schema_locations_are_optional() {
        let (_, outcome) = assemble("http://example.com/dir/labels.xml", LINKBASE, true).unwrap();
        assert!(outcome.discovered.contains(
            &Url::parse("http://www.xbrl.org/2003/xbrl-linkbase-2003-12-31.xsd").unwrap()
        ));
    }

    #[test]
    fn test_schema_with_imports_and_xml_base() {
        let schema = r#"<xsd:schema xmlns:xsd="http://www.w3.org/2001/XMLSchema"
    xmlns:xbrli="http://www.xbrl.org/2003/instance" targetNamespace="http://example.com/c">
  <xsd:import namespace="http://www.xbrl.org/2003/instance" schemaLocation="http://www.xbrl.org/2003/xbrl-instance-2003-12-31.xsd"/>
  <xsd:annotation xml:base="sub/">
    <xsd:appinfo>
      <link:linkbaseRef xmlns:link="http://www.xbrl.org/2003/linkbase" xmlns:xlink="http://www.w3.org/1999/xlink"
          xlink:type="simple" xlink:href="labels.xml"/>
    </xsd:appinfo>
  </xsd:annotation>
  <xsd:element id="C1" name="Cash" substitutionGroup="xbrli:item"/>
  <xsd:element name="Plain"/>
</xsd:schema>"#;
        let (fragments, outcome) = assemble("file:///tax/concepts.xsd", schema, false).unwrap();
        let kinds: Vec<FragmentKind> = fragments.iter().map(|f| f.kind).collect();
        assert_eq!(
            kinds,
            vec![
                FragmentKind::Schema,
                FragmentKind::SimpleLink,
                FragmentKind::SimpleLink,
                FragmentKind::Concept,
                FragmentKind::ElementDeclaration,
            ]
        );
        assert!(fragments[3].matches_pointer("C1"));
        let discovered: Vec<&str> = outcome.discovered.iter().map(|u| u.as_str()).collect();
        assert_eq!(
            discovered,
            vec![
                "file:///tax/sub/labels.xml",
                "http://www.xbrl.org/2003/xbrl-instance-2003-12-31.xsd"
            ]
        );
    }

    #[test]
    fn test_illegal_link_is_warning() {
        let doc = r#"<root xmlns:xlink="http://www.w3.org/1999/xlink">
  <loc xlink:type="locator" xlink:href="a.xsd#x" xlink:label="x"/>
</root>"#;
        let (fragments, outcome) = assemble("file:///r.xml", doc, false).unwrap();
        assert_eq!(fragments.len(), 1);
        assert_eq!(fragments[0].kind, FragmentKind::Xml);
        assert_eq!(outcome.diagnostics.len(), 1);
        assert_eq!(outcome.diagnostics[0].location().map(|l| l.0), Some(2));
        assert!(outcome.discovered.is_empty());
    }

    #[test]
    fn test_link_syntax_error_aborts() {
        let doc = r#"<root xmlns:xlink="http://www.w3.org/1999/xlink">
  <link xlink:type="extended">
    <arc xlink:type="arc" xlink:from="a"/>
  </link>
</root>"#;
        assert!(matches!(
            assemble("file:///r.xml", doc, false),
            Err(DtsError::LinkSyntax(_))
        ));
    }

    #[test]
    fn test_persist_failure_aborts() {
        let result = FragmentAssembler::new(Url::parse("file:///r.xml").unwrap(), "doc", false)
            .assemble("<root/>", |_| Err(DtsError::Store("full".into())));
        assert!(matches!(result, Err(DtsError::Store(_))));
    }

    #[test]
    fn test_failure_keeps_references_found_so_far() {
        let doc = r#"<xsd:schema xmlns:xsd="http://www.w3.org/2001/XMLSchema">
  <xsd:import namespace="urn:other" schemaLocation="other.xsd"/>
  <xsd:element name="broken"></xsd:schema>"#;
        let failure = FragmentAssembler::new(Url::parse("file:///tax/entry.xsd").unwrap(), "doc", false)
            .try_assemble(doc, |_| Ok(()))
            .unwrap_err();
        assert!(matches!(failure.error, DtsError::Validation(_)));
        assert!(failure
            .partial
            .discovered
            .contains(&Url::parse("file:///tax/other.xsd").unwrap()));
    }

    #[test]
    fn test_large_document() {
        let mut schema = String::from(
            r#"<xsd:schema xmlns:xsd="http://www.w3.org/2001/XMLSchema"
    xmlns:xbrli="http://www.xbrl.org/2003/instance" targetNamespace="http://example.com/big">
"#,
        );
        for i in 0..20_000 {
            schema.push_str(&format!(
                "  <xsd:element id=\"C{i}\" name=\"C{i}\" substitutionGroup=\"xbrli:item\"/>\n"
            ));
        }
        schema.push_str("</xsd:schema>");

        let started = std::time::Instant::now();
        let (fragments, outcome) = assemble("file:///big.xsd", &schema, false).unwrap();
        assert_eq!(outcome.fragment_count, 20_001);
        assert!(fragments[20_000].matches_pointer("C19999"));
        assert!(
            started.elapsed() < std::time::Duration::from_secs(30),
            "assembling {} bytes took {:?}",
            schema.len(),
            started.elapsed()
        );
    }
}
