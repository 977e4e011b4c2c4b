use crate::{
    error::DtsError,
    properties::{Attributes, XLINK_NS},
    uri::is_absolute_uri,
    xlink::{
        is_ncname, legal_kinds, Classification, CustomLinkRecogniser, ElementRef, LinkHandler,
        LinkKind, XLinkAttributes,
    },
};

/// Nesting-aware XLink state machine. See the [module docs](crate::xlink) for the rules.
#[derive(Default)]
pub struct XLinkProcessor {
    ancestors: Vec<Option<LinkKind>>,
    recognisers: Vec<Box<dyn CustomLinkRecogniser>>,
}

impl std::fmt::Debug for XLinkProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("XLinkProcessor")
            .field("ancestors", &self.ancestors)
            .field("recognisers", &self.recognisers.len())
            .finish()
    }
}

impl XLinkProcessor {
    pub fn new() -> XLinkProcessor {
        XLinkProcessor::default()
    }

    pub fn with_recogniser(mut self, recogniser: impl CustomLinkRecogniser + 'static) -> Self {
        self.recognisers.push(Box::new(recogniser));
        self
    }

    /// Number of open elements.
    pub fn depth(&self) -> usize {
        self.ancestors.len()
    }

    /// Kind of the innermost open element.
    pub fn current(&self) -> Option<LinkKind> {
        self.ancestors.last().copied().flatten()
    }

    pub fn inside_extended_link(&self) -> bool {
        self.ancestors
            .iter()
            .any(|a| *a == Some(LinkKind::ExtendedLink))
    }

    /// Forget all open elements, e.g. after a document failed part way through.
    pub fn reset(&mut self) {
        self.ancestors.clear();
    }

    /// Classify an element against the current ancestor stack without changing it.
    pub fn classify(&self, element: ElementRef<'_>) -> Result<Classification, DtsError> {
        let attributes = element.attributes;
        let mut classification = Classification::not_a_link();

        if !attributes.has_namespace(XLINK_NS) {
            if !self.inside_extended_link() {
                if let Some(recogniser) = self.recognisers.iter().find(|r| r.is_link(element)) {
                    classification.kind = Some(LinkKind::SimpleLink);
                    classification.attributes = XLinkAttributes {
                        href: recogniser.href(element),
                        role: recogniser.role(element),
                        arcrole: recogniser.arcrole(element),
                        ..Default::default()
                    };
                }
            }
            return Ok(classification);
        }

        for attribute in attributes.iter().filter(|a| a.namespace == XLINK_NS) {
            if legal_kinds(&attribute.local_name).is_none() {
                return Err(DtsError::LinkSyntax(format!(
                    "{} carries xlink:{}, which is not defined in the XLink namespace",
                    element.qname, attribute.local_name
                )));
            }
        }

        let kind = match attributes.xlink("type") {
            Some(value) => match LinkKind::from_type_value(value)? {
                Some(kind) => kind,
                None => return Ok(classification),
            },
            None if attributes.xlink("href").is_some() => LinkKind::SimpleLink,
            None => {
                classification.warnings.push(format!(
                    "{} has XLink attributes but neither xlink:type nor xlink:href",
                    element.qname
                ));
                return Ok(classification);
            }
        };

        if let Some(problem) = self.nesting_problem(kind) {
            classification
                .warnings
                .push(format!("{} ignored: {problem}", element.qname));
            return Ok(classification);
        }

        for attribute in attributes.iter().filter(|a| a.namespace == XLINK_NS) {
            let allowed = legal_kinds(&attribute.local_name).unwrap_or_default();
            if !allowed.contains(kind) {
                classification.warnings.push(format!(
                    "{} ignored: xlink:{} is not allowed on a {kind}",
                    element.qname, attribute.local_name
                ));
                return Ok(classification);
            }
        }

        classification.attributes = validated_attributes(kind, element.qname, attributes)?;
        classification.kind = Some(kind);
        Ok(classification)
    }

    fn nesting_problem(&self, kind: LinkKind) -> Option<String> {
        let parent = self.current();
        match kind {
            LinkKind::SimpleLink | LinkKind::ExtendedLink if self.inside_extended_link() => {
                Some(format!("a {kind} has no meaning inside an extended link"))
            }
            LinkKind::Locator | LinkKind::Arc | LinkKind::Resource
                if parent != Some(LinkKind::ExtendedLink) =>
            {
                Some(format!("a {kind} must be a child of an extended link"))
            }
            LinkKind::Title
                if !matches!(
                    parent,
                    Some(
                        LinkKind::ExtendedLink
                            | LinkKind::Locator
                            | LinkKind::Arc
                            | LinkKind::Resource
                    )
                ) =>
            {
                Some("a title must be a child of an extended link, locator, arc or resource".into())
            }
            _ => None,
        }
    }

    /// Classify, push, and report the element to `handler`.
    pub fn start_element<H: LinkHandler>(
        &mut self,
        handler: &mut H,
        element: ElementRef<'_>,
    ) -> Result<Option<LinkKind>, DtsError> {
        let classification = self.classify(element)?;
        for warning in classification.warnings.iter() {
            handler.warning(warning);
        }
        self.ancestors.push(classification.kind);
        let link = &classification.attributes;
        match classification.kind {
            Some(LinkKind::SimpleLink) => handler.start_simple_link(element, link)?,
            Some(LinkKind::ExtendedLink) => handler.start_extended_link(element, link)?,
            Some(LinkKind::Locator) => handler.start_locator(element, link)?,
            Some(LinkKind::Arc) => handler.start_arc(element, link)?,
            Some(LinkKind::Resource) => handler.start_resource(element, link)?,
            Some(LinkKind::Title) => handler.start_title(element, link)?,
            None => {}
        }
        Ok(classification.kind)
    }

    /// Pop the innermost element and report its end to `handler`.
    pub fn end_element<H: LinkHandler>(
        &mut self,
        handler: &mut H,
    ) -> Result<Option<LinkKind>, DtsError> {
        let Some(kind) = self.ancestors.pop() else {
            return Err(DtsError::Validation(
                "element end without a matching element start".to_string(),
            ));
        };
        match kind {
            Some(LinkKind::SimpleLink) => handler.end_simple_link()?,
            Some(LinkKind::ExtendedLink) => handler.end_extended_link()?,
            Some(LinkKind::Locator) => handler.end_locator()?,
            Some(LinkKind::Arc) => handler.end_arc()?,
            Some(LinkKind::Resource) => handler.end_resource()?,
            Some(LinkKind::Title) => handler.end_title()?,
            None => {}
        }
        Ok(kind)
    }

    pub fn characters<H: LinkHandler>(&mut self, handler: &mut H, text: &str) -> Result<(), DtsError> {
        if self.current() == Some(LinkKind::Title) {
            handler.title_characters(text)?;
        }
        Ok(())
    }
}

fn validated_attributes(
    kind: LinkKind,
    qname: &str,
    attributes: &Attributes,
) -> Result<XLinkAttributes, DtsError> {
    let owned = |name: &str| attributes.xlink(name).map(|v| v.to_string());
    let mut link = XLinkAttributes {
        href: owned("href"),
        role: owned("role"),
        arcrole: owned("arcrole"),
        title: owned("title"),
        label: owned("label"),
        from: owned("from"),
        to: owned("to"),
        ..Default::default()
    };

    for (name, value) in [("role", &link.role), ("arcrole", &link.arcrole)] {
        if let Some(value) = value {
            if !is_absolute_uri(value) {
                return Err(DtsError::LinkSyntax(format!(
                    "{qname}: xlink:{name} '{value}' must be an absolute URI"
                )));
            }
        }
    }

    for (name, value) in [("label", &link.label), ("from", &link.from), ("to", &link.to)] {
        if let Some(value) = value {
            if !is_ncname(value) {
                return Err(DtsError::LinkSyntax(format!(
                    "{qname}: xlink:{name} '{value}' is not a valid NCName"
                )));
            }
        }
    }

    if let Some(show) = attributes.xlink("show") {
        link.show = Some(show.parse()?);
    }
    if let Some(actuate) = attributes.xlink("actuate") {
        link.actuate = Some(actuate.parse()?);
    }

    match kind {
        LinkKind::SimpleLink | LinkKind::Locator => match link.href.as_deref() {
            Some(href) if !href.trim().is_empty() => {}
            _ => {
                return Err(DtsError::LinkSyntax(format!(
                    "{qname}: a {kind} requires a non-empty xlink:href"
                )))
            }
        },
        LinkKind::Arc => {
            if link.from.is_none() || link.to.is_none() {
                return Err(DtsError::LinkSyntax(format!(
                    "{qname}: an arc requires both xlink:from and xlink:to"
                )));
            }
        }
        _ => {}
    }

    Ok(link)
}
