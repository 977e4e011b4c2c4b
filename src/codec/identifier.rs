//! Rules deciding which non-link elements start a new fragment.

use crate::{
    codec::reader::ElementStart,
    properties::{
        FragmentKind, GENERIC_LABEL_NS, GENERIC_REFERENCE_NS, LINK_NS, XBRLI_NS, XSD_NS,
    },
    xlink::{CustomLinkRecogniser, ElementRef},
};

/// Identify the fragment kind of an element that the link classifier did not claim.
///
/// `parent` is the (namespace, local name) of the enclosing element, `None` for the document
/// root.
pub fn identify(element: &ElementStart, parent: Option<(&str, &str)>) -> Option<FragmentKind> {
    let Some(parent) = parent else {
        return Some(root_kind(element));
    };
    match (element.namespace.as_str(), element.local_name.as_str()) {
        (LINK_NS, "roleType") => return Some(FragmentKind::RoleType),
        (LINK_NS, "arcroleType") => return Some(FragmentKind::ArcroleType),
        _ => {}
    }
    match parent {
        (XSD_NS, "schema") if element.is(XSD_NS, "element") => {
            if element.attributes.plain("substitutionGroup").is_some() {
                Some(FragmentKind::Concept)
            } else {
                Some(FragmentKind::ElementDeclaration)
            }
        }
        (XBRLI_NS, "xbrl") => match (element.namespace.as_str(), element.local_name.as_str()) {
            (XBRLI_NS, "context") => Some(FragmentKind::Context),
            (XBRLI_NS, "unit") => Some(FragmentKind::Unit),
            (XBRLI_NS, _) | (LINK_NS, _) => None,
            _ => Some(FragmentKind::Fact),
        },
        _ => None,
    }
}

fn root_kind(element: &ElementStart) -> FragmentKind {
    if element.is(XSD_NS, "schema") {
        FragmentKind::Schema
    } else if element.is(LINK_NS, "linkbase") {
        FragmentKind::Linkbase
    } else if element.is(XBRLI_NS, "xbrl") {
        FragmentKind::Instance
    } else {
        FragmentKind::Xml
    }
}

/// Specialise an XLink resource by its element name.
pub fn resource_kind(namespace: &str, local_name: &str) -> FragmentKind {
    match (namespace, local_name) {
        (LINK_NS, "label") | (GENERIC_LABEL_NS, "label") => FragmentKind::LabelResource,
        (LINK_NS, "reference") | (GENERIC_REFERENCE_NS, "reference") => {
            FragmentKind::ReferenceResource
        }
        (LINK_NS, "footnote") => FragmentKind::FootnoteResource,
        _ => FragmentKind::Resource,
    }
}

/// Treats `xsd:import` and `xsd:include` as simple links to their `schemaLocation`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SchemaImportRecogniser;

impl CustomLinkRecogniser for SchemaImportRecogniser {
    fn is_link(&self, element: ElementRef<'_>) -> bool {
        element.namespace == XSD_NS
            && matches!(element.local_name, "import" | "include")
            && element.attributes.plain("schemaLocation").is_some()
    }

    fn href(&self, element: ElementRef<'_>) -> Option<String> {
        element
            .attributes
            .plain("schemaLocation")
            .map(|s| s.trim().to_string())
    }
}
