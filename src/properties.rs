pub use enumset::EnumSet;
/// [crate::properties] contains the data model shared by the assembler, the store and the
/// relationship compiler: [Fragment]s, their [FragmentKind]s and the namespaces that give them
/// meaning.
use enumset::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Formatter},
    str::FromStr,
};
use url::Url;

use crate::error::DtsError;

pub const XLINK_NS: &str = "http://www.w3.org/1999/xlink";
pub const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";
pub const XMLNS_NS: &str = "http://www.w3.org/2000/xmlns/";
pub const XSI_NS: &str = "http://www.w3.org/2001/XMLSchema-instance";
pub const XSD_NS: &str = "http://www.w3.org/2001/XMLSchema";
pub const XBRLI_NS: &str = "http://www.xbrl.org/2003/instance";
pub const LINK_NS: &str = "http://www.xbrl.org/2003/linkbase";
pub const GENERIC_LABEL_NS: &str = "http://xbrl.org/2008/label";
pub const GENERIC_REFERENCE_NS: &str = "http://xbrl.org/2008/reference";

/// Default arc `order` when the attribute is absent.
pub const DEFAULT_ORDER: Decimal = Decimal::ONE;
/// Default arc `priority` when the attribute is absent.
pub const DEFAULT_PRIORITY: i32 = 1;

/// [FragmentKind] discriminates the recognized subtrees a document is split into.
#[derive(Debug, PartialOrd, Ord, Hash, EnumSetType, Serialize, Deserialize)]
#[enumset(serialize_repr = "list")]
pub enum FragmentKind {
    /// Root of a document that no other rule recognized
    Xml,
    Schema,
    ElementDeclaration,
    /// An element declaration placed in a substitution group
    Concept,
    RoleType,
    ArcroleType,
    Linkbase,
    Instance,
    Context,
    Unit,
    Fact,
    SimpleLink,
    ExtendedLink,
    Locator,
    Arc,
    /// An XLink resource with no more specific interpretation
    Resource,
    LabelResource,
    ReferenceResource,
    FootnoteResource,
    Title,
}

impl FragmentKind {
    /// Kinds that can carry an `xlink:label` and act as an arc end.
    pub fn arc_ends() -> EnumSet<FragmentKind> {
        FragmentKind::Locator | FragmentKind::resources()
    }

    pub fn resources() -> EnumSet<FragmentKind> {
        FragmentKind::Resource
            | FragmentKind::LabelResource
            | FragmentKind::ReferenceResource
            | FragmentKind::FootnoteResource
    }

    pub fn is_resource(&self) -> bool {
        FragmentKind::resources().contains(*self)
    }
}

impl Display for FragmentKind {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

/// A namespace-resolved attribute. Unqualified attributes carry an empty namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Attribute {
    pub namespace: String,
    pub local_name: String,
    pub value: String,
}

impl Attribute {
    pub fn new(
        namespace: impl Into<String>,
        local_name: impl Into<String>,
        value: impl Into<String>,
    ) -> Attribute {
        Attribute {
            namespace: namespace.into(),
            local_name: local_name.into(),
            value: value.into(),
        }
    }

    /// `local` for unqualified attributes, `namespace:local` otherwise.
    pub fn qualified_key(&self) -> String {
        if self.namespace.is_empty() {
            self.local_name.clone()
        } else {
            format!("{}:{}", self.namespace, self.local_name)
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attributes(pub Vec<Attribute>);

impl Attributes {
    pub fn get(&self, namespace: &str, local_name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|a| a.namespace == namespace && a.local_name == local_name)
            .map(|a| a.value.as_str())
    }

    /// Lookup of an attribute with no namespace.
    pub fn plain(&self, local_name: &str) -> Option<&str> {
        self.get("", local_name)
    }

    pub fn xlink(&self, local_name: &str) -> Option<&str> {
        self.get(XLINK_NS, local_name)
    }

    pub fn has_namespace(&self, namespace: &str) -> bool {
        self.0.iter().any(|a| a.namespace == namespace)
    }

    pub fn push(&mut self, attribute: Attribute) {
        self.0.push(attribute);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Attribute> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<Attribute> for Attributes {
    fn from_iter<T: IntoIterator<Item = Attribute>>(iter: T) -> Self {
        Attributes(iter.into_iter().collect())
    }
}

/// A deferred reference from a locator (or simple link) to the fragment it identifies. The
/// target document may not be loaded yet; it is dereferenced when relationships are compiled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocatorTarget {
    /// The href resolved against the in-scope base URI, pointer included
    pub href: Url,
    /// The normalized document URI the href points into
    pub document: Url,
    /// The href fragment: empty for the document root, a shorthand id, or an `element()`
    /// scheme pointer
    pub pointer: String,
}

/// The `use` attribute of an arc.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArcUse {
    #[default]
    Optional,
    Prohibited,
}

impl FromStr for ArcUse {
    type Err = DtsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "optional" => Ok(ArcUse::Optional),
            "prohibited" => Ok(ArcUse::Prohibited),
            other => Err(DtsError::Validation(format!(
                "arc use must be 'optional' or 'prohibited', found '{other}'"
            ))),
        }
    }
}

impl Display for ArcUse {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            ArcUse::Optional => write!(f, "optional"),
            ArcUse::Prohibited => write!(f, "prohibited"),
        }
    }
}

/// The persisted unit corresponding to one recognized subtree of a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fragment {
    /// `documentId_n`, assigned in document order starting at 1
    pub index: String,
    pub kind: FragmentKind,
    /// Index of the enclosing fragment, empty for document roots
    pub parent_index: String,
    /// The owning document
    pub uri: Url,
    pub namespace: String,
    pub local_name: String,
    /// Attributes of the fragment's root element, `xmlns` declarations excluded
    pub attributes: Attributes,
    /// Element-scheme pointer of the fragment root, e.g. `element(/1/3)`
    pub pointer: String,
    /// In-scope `xml:lang`
    pub language: Option<String>,
    /// Character data directly owned by the fragment
    pub text: String,
    /// Role of the containing extended link, for arcs and arc ends
    pub link_role: Option<String>,
    /// Deferred href target, for locators and simple links
    pub target: Option<LocatorTarget>,
}

impl Fragment {
    pub fn new(
        index: impl Into<String>,
        kind: FragmentKind,
        parent_index: impl Into<String>,
        uri: Url,
    ) -> Fragment {
        Fragment {
            index: index.into(),
            kind,
            parent_index: parent_index.into(),
            uri,
            namespace: String::new(),
            local_name: String::new(),
            attributes: Attributes::default(),
            pointer: String::new(),
            language: None,
            text: String::new(),
            link_role: None,
            target: None,
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent_index.is_empty()
    }

    /// The `n` of `documentId_n`, used to restore document order.
    pub fn sequence(&self) -> u64 {
        self.index
            .rsplit_once('_')
            .and_then(|(_, n)| n.parse().ok())
            .unwrap_or(0)
    }

    /// The shorthand pointer (`id` attribute) of the fragment root, if any.
    pub fn id(&self) -> Option<&str> {
        self.attributes.plain("id")
    }

    /// True if an href pointer into this fragment's document identifies this fragment.
    pub fn matches_pointer(&self, pointer: &str) -> bool {
        if pointer.is_empty() {
            return self.is_root();
        }
        if pointer.starts_with("element(") {
            return self.pointer == pointer;
        }
        self.id() == Some(pointer)
    }

    pub fn label(&self) -> Option<&str> {
        self.attributes.xlink("label")
    }

    pub fn role(&self) -> Option<&str> {
        self.attributes.xlink("role")
    }

    pub fn arcrole(&self) -> Option<&str> {
        self.attributes.xlink("arcrole")
    }

    pub fn from_label(&self) -> Option<&str> {
        self.attributes.xlink("from")
    }

    pub fn to_label(&self) -> Option<&str> {
        self.attributes.xlink("to")
    }

    /// Arc `order`, defaulting to 1.
    pub fn order(&self) -> Result<Decimal, DtsError> {
        match self.attributes.plain("order") {
            Some(value) => Ok(Decimal::from_str(value.trim())?.normalize()),
            None => Ok(DEFAULT_ORDER),
        }
    }

    /// Arc `priority`, defaulting to 1.
    pub fn priority(&self) -> Result<i32, DtsError> {
        match self.attributes.plain("priority") {
            Some(value) => Ok(value.trim().parse()?),
            None => Ok(DEFAULT_PRIORITY),
        }
    }

    /// Arc `use`, defaulting to optional.
    pub fn arc_use(&self) -> Result<ArcUse, DtsError> {
        match self.attributes.plain("use") {
            Some(value) => value.trim().parse(),
            None => Ok(ArcUse::Optional),
        }
    }
}

/// A document-scoped marker recording a relationship that could not be built or persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorMarker {
    pub index: String,
    pub document: Url,
    pub arc_index: Option<String>,
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arc(attributes: Vec<Attribute>) -> Fragment {
        let mut fragment = Fragment::new(
            "doc_7",
            FragmentKind::Arc,
            "doc_2",
            Url::parse("file:///a.xml").unwrap(),
        );
        fragment.attributes = Attributes(attributes);
        fragment
    }

    #[test]
    fn test_arc_defaults() {
        let arc = arc(vec![]);
        assert_eq!(arc.order().unwrap(), Decimal::ONE);
        assert_eq!(arc.priority().unwrap(), 1);
        assert_eq!(arc.arc_use().unwrap(), ArcUse::Optional);
        assert_eq!(arc.sequence(), 7);
    }

    #[test]
    fn test_order_is_normalized() {
        let a = arc(vec![Attribute::new("", "order", "2.0")]);
        let b = arc(vec![Attribute::new("", "order", "2")]);
        assert_eq!(a.order().unwrap(), b.order().unwrap());
        assert_eq!(a.order().unwrap().to_string(), "2");
    }

    #[test]
    fn test_invalid_arc_values() {
        assert!(arc(vec![Attribute::new("", "use", "sometimes")])
            .arc_use()
            .is_err());
        assert!(arc(vec![Attribute::new("", "priority", "high")])
            .priority()
            .is_err());
    }

    #[test]
    fn test_pointer_matching() {
        let mut concept = Fragment::new(
            "doc_3",
            FragmentKind::Concept,
            "doc_1",
            Url::parse("file:///s.xsd").unwrap(),
        );
        concept.attributes.push(Attribute::new("", "id", "C1"));
        concept.pointer = "element(/1/2)".to_string();
        assert!(concept.matches_pointer("C1"));
        assert!(concept.matches_pointer("element(/1/2)"));
        assert!(!concept.matches_pointer(""));
        assert!(!concept.matches_pointer("C2"));
    }
}
