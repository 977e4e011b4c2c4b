//! XLink 1.1 link classification.
//!
//! The [XLinkProcessor] is a nesting-aware state machine. It is fed element start and end
//! events, decides for each element whether it is one of the six XLink element kinds
//! ([LinkKind]) or not a link at all, validates the core XLink attributes, and reports what it
//! found to a [LinkHandler].
//!
//! ## Ancestor stack
//!
//! Every element start pushes exactly one entry (`None` for elements that are not links) and
//! every element end pops one. Legality depends on that stack:
//!
//! - locators, arcs and resources must be immediate children of an extended link
//! - simple and extended links have no meaning anywhere inside an extended link
//! - titles only have meaning under extended links, locators, arcs and resources
//!
//! Violating those rules, or carrying an XLink attribute the element kind does not allow,
//! produces a warning and the element is treated as not a link. Malformed attribute *values*
//! (relative roles, bad labels, unknown `show`/`actuate` tokens) and attributes the XLink
//! namespace does not define are hard [crate::DtsError::LinkSyntax] errors.

mod processor;

pub use processor::XLinkProcessor;

use enumset::{EnumSet, EnumSetType};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fmt::{Display, Formatter},
    str::FromStr,
};

use crate::{error::DtsError, properties::Attributes};

/// The six XLink element kinds.
#[derive(Debug, PartialOrd, Ord, Hash, EnumSetType, Serialize, Deserialize)]
#[enumset(serialize_repr = "list")]
pub enum LinkKind {
    SimpleLink,
    ExtendedLink,
    Locator,
    Arc,
    Resource,
    Title,
}

impl LinkKind {
    /// Parse an `xlink:type` value. `none` is not a link kind and yields `Ok(None)`.
    pub fn from_type_value(value: &str) -> Result<Option<LinkKind>, DtsError> {
        match value {
            "simple" => Ok(Some(LinkKind::SimpleLink)),
            "extended" => Ok(Some(LinkKind::ExtendedLink)),
            "locator" => Ok(Some(LinkKind::Locator)),
            "arc" => Ok(Some(LinkKind::Arc)),
            "resource" => Ok(Some(LinkKind::Resource)),
            "title" => Ok(Some(LinkKind::Title)),
            "none" => Ok(None),
            other => Err(DtsError::LinkSyntax(format!(
                "xlink:type '{other}' is not a legal XLink type"
            ))),
        }
    }
}

impl Display for LinkKind {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Link kinds each XLink attribute may appear on.
static LEGAL_ATTRIBUTES: Lazy<BTreeMap<&'static str, EnumSet<LinkKind>>> = Lazy::new(|| {
    BTreeMap::from([
        ("type", EnumSet::all()),
        ("href", LinkKind::SimpleLink | LinkKind::Locator),
        (
            "role",
            LinkKind::SimpleLink | LinkKind::ExtendedLink | LinkKind::Locator | LinkKind::Resource,
        ),
        ("arcrole", LinkKind::SimpleLink | LinkKind::Arc),
        (
            "title",
            LinkKind::SimpleLink
                | LinkKind::ExtendedLink
                | LinkKind::Arc
                | LinkKind::Locator
                | LinkKind::Resource,
        ),
        ("show", LinkKind::SimpleLink | LinkKind::Arc),
        ("actuate", LinkKind::SimpleLink | LinkKind::Arc),
        ("label", LinkKind::Locator | LinkKind::Resource),
        ("from", EnumSet::only(LinkKind::Arc)),
        ("to", EnumSet::only(LinkKind::Arc)),
    ])
});

/// The link kinds `attribute` is legal on, or `None` if the XLink namespace does not define it.
pub fn legal_kinds(attribute: &str) -> Option<EnumSet<LinkKind>> {
    LEGAL_ATTRIBUTES.get(attribute).copied()
}

static NCNAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[\p{L}\p{Nl}_][\p{L}\p{Nl}\p{Nd}\p{Mn}\p{Mc}\p{Pc}\x{B7}.\-]*$").unwrap()
});

/// True if `value` is a non-colonized XML name.
pub fn is_ncname(value: &str) -> bool {
    NCNAME.is_match(value)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Show {
    New,
    Replace,
    Embed,
    Other,
    None,
}

impl FromStr for Show {
    type Err = DtsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(Show::New),
            "replace" => Ok(Show::Replace),
            "embed" => Ok(Show::Embed),
            "other" => Ok(Show::Other),
            "none" => Ok(Show::None),
            other => Err(DtsError::LinkSyntax(format!(
                "xlink:show '{other}' must be one of new, replace, embed, other, none"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Actuate {
    OnLoad,
    OnRequest,
    Other,
    None,
}

impl FromStr for Actuate {
    type Err = DtsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "onLoad" => Ok(Actuate::OnLoad),
            "onRequest" => Ok(Actuate::OnRequest),
            "other" => Ok(Actuate::Other),
            "none" => Ok(Actuate::None),
            other => Err(DtsError::LinkSyntax(format!(
                "xlink:actuate '{other}' must be one of onLoad, onRequest, other, none"
            ))),
        }
    }
}

/// The core XLink attributes of a classified element.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct XLinkAttributes {
    pub href: Option<String>,
    pub role: Option<String>,
    pub arcrole: Option<String>,
    pub title: Option<String>,
    pub show: Option<Show>,
    pub actuate: Option<Actuate>,
    pub label: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
}

/// A borrowed view of an element start event.
#[derive(Debug, Clone, Copy)]
pub struct ElementRef<'a> {
    pub namespace: &'a str,
    pub local_name: &'a str,
    pub qname: &'a str,
    pub attributes: &'a Attributes,
}

/// Result of classifying one element start.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    /// `None` when the element is not a link
    pub kind: Option<LinkKind>,
    pub attributes: XLinkAttributes,
    /// Recoverable problems found while classifying
    pub warnings: Vec<String>,
}

impl Classification {
    fn not_a_link() -> Classification {
        Classification {
            kind: None,
            attributes: XLinkAttributes::default(),
            warnings: Vec::new(),
        }
    }
}

/// Callbacks issued by [XLinkProcessor]. Every method has a no-op default so handlers only
/// implement what they care about.
#[allow(unused_variables)]
pub trait LinkHandler {
    fn start_simple_link(
        &mut self,
        element: ElementRef<'_>,
        link: &XLinkAttributes,
    ) -> Result<(), DtsError> {
        Ok(())
    }

    fn end_simple_link(&mut self) -> Result<(), DtsError> {
        Ok(())
    }

    fn start_extended_link(
        &mut self,
        element: ElementRef<'_>,
        link: &XLinkAttributes,
    ) -> Result<(), DtsError> {
        Ok(())
    }

    fn end_extended_link(&mut self) -> Result<(), DtsError> {
        Ok(())
    }

    fn start_locator(
        &mut self,
        element: ElementRef<'_>,
        link: &XLinkAttributes,
    ) -> Result<(), DtsError> {
        Ok(())
    }

    fn end_locator(&mut self) -> Result<(), DtsError> {
        Ok(())
    }

    fn start_arc(&mut self, element: ElementRef<'_>, link: &XLinkAttributes) -> Result<(), DtsError> {
        Ok(())
    }

    fn end_arc(&mut self) -> Result<(), DtsError> {
        Ok(())
    }

    fn start_resource(
        &mut self,
        element: ElementRef<'_>,
        link: &XLinkAttributes,
    ) -> Result<(), DtsError> {
        Ok(())
    }

    fn end_resource(&mut self) -> Result<(), DtsError> {
        Ok(())
    }

    fn start_title(
        &mut self,
        element: ElementRef<'_>,
        link: &XLinkAttributes,
    ) -> Result<(), DtsError> {
        Ok(())
    }

    fn end_title(&mut self) -> Result<(), DtsError> {
        Ok(())
    }

    fn title_characters(&mut self, text: &str) -> Result<(), DtsError> {
        Ok(())
    }

    fn warning(&mut self, message: &str) {
        tracing::warn!("[XLink] {}", message);
    }
}

/// Lets elements outside the XLink vocabulary behave as simple links, e.g. schema imports
/// whose `schemaLocation` should be followed like an href.
pub trait CustomLinkRecogniser: Send + Sync {
    fn is_link(&self, element: ElementRef<'_>) -> bool;

    fn href(&self, element: ElementRef<'_>) -> Option<String>;

    fn role(&self, _element: ElementRef<'_>) -> Option<String> {
        None
    }

    fn arcrole(&self, _element: ElementRef<'_>) -> Option<String> {
        None
    }
}
