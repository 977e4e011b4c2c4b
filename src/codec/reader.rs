use quick_xml::{
    events::{BytesStart, Event},
    name::ResolveResult,
    reader::NsReader,
};
use std::str::from_utf8;

use crate::{
    error::DtsError,
    properties::{Attribute, Attributes, XML_NS},
    xlink::ElementRef,
};

/// An element start with namespace-resolved names.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementStart {
    pub namespace: String,
    pub local_name: String,
    pub qname: String,
    /// Attributes with namespace declarations removed
    pub attributes: Attributes,
    /// (line, column), both 1-based
    pub position: (usize, usize),
}

impl ElementStart {
    pub fn as_ref(&self) -> ElementRef<'_> {
        ElementRef {
            namespace: &self.namespace,
            local_name: &self.local_name,
            qname: &self.qname,
            attributes: &self.attributes,
        }
    }

    pub fn is(&self, namespace: &str, local_name: &str) -> bool {
        self.namespace == namespace && self.local_name == local_name
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum XmlEvent {
    Start(ElementStart),
    /// Namespace and local name of the closed element
    End(String, String),
    Text(String),
}

/// Streams [XmlEvent]s out of a document held in memory. Empty elements are reported as a
/// start immediately followed by an end. Malformed XML surfaces as [DtsError::Validation].
pub struct XmlEventReader<'a> {
    reader: NsReader<&'a [u8]>,
    content: &'a str,
    pending_end: Option<(String, String)>,
    lines: LineTracker,
    depth: usize,
    seen_root: bool,
    finished: bool,
}

/// Line and column bookkeeping that only ever scans forward.
#[derive(Debug, Default)]
struct LineTracker {
    scanned: usize,
    line: usize,
    line_start: usize,
}

impl LineTracker {
    /// (line, column) of `offset`, both 1-based. Offsets behind the last one rescan from the
    /// start.
    fn advance(&mut self, content: &str, offset: usize) -> (usize, usize) {
        let offset = offset.min(content.len());
        if offset < self.scanned {
            *self = LineTracker::default();
        }
        let bytes = &content.as_bytes()[self.scanned..offset];
        for (i, byte) in bytes.iter().enumerate() {
            if *byte == b'\n' {
                self.line += 1;
                self.line_start = self.scanned + i + 1;
            }
        }
        self.scanned = offset;
        (self.line + 1, offset - self.line_start + 1)
    }
}

impl<'a> XmlEventReader<'a> {
    pub fn new(content: &'a str) -> XmlEventReader<'a> {
        let mut reader = NsReader::from_str(content);
        reader.config_mut().trim_text(false);
        XmlEventReader {
            reader,
            content,
            pending_end: None,
            lines: LineTracker::default(),
            depth: 0,
            seen_root: false,
            finished: false,
        }
    }

    /// (line, column) of the reader's current byte offset.
    pub fn current_position(&mut self) -> (usize, usize) {
        let offset = self.reader.buffer_position() as usize;
        self.lines.advance(self.content, offset)
    }

    fn element_start(
        &mut self,
        namespace: String,
        start: &BytesStart<'_>,
    ) -> Result<ElementStart, DtsError> {
        let position = self.current_position();
        let local_name = utf8(start.local_name().as_ref())?.to_string();
        let qname = utf8(start.name().as_ref())?.to_string();
        let mut attributes = Attributes::default();
        for attribute in start.attributes() {
            let attribute = attribute?;
            if attribute.key.as_namespace_binding().is_some() {
                continue;
            }
            let (resolved, local) = self.reader.resolve_attribute(attribute.key);
            let attribute_namespace = match resolved {
                ResolveResult::Bound(ns) => utf8(ns.as_ref())?.to_string(),
                ResolveResult::Unbound => String::new(),
                ResolveResult::Unknown(prefix) if prefix == b"xml" => XML_NS.to_string(),
                ResolveResult::Unknown(prefix) => {
                    return Err(DtsError::Validation(format!(
                        "{qname}: attribute prefix '{}' is not bound to a namespace",
                        String::from_utf8_lossy(&prefix)
                    )))
                }
            };
            attributes.push(Attribute {
                namespace: attribute_namespace,
                local_name: utf8(local.as_ref())?.to_string(),
                value: attribute.unescape_value()?.into_owned(),
            });
        }
        Ok(ElementStart {
            namespace,
            local_name,
            qname,
            attributes,
            position,
        })
    }

    fn next_event(&mut self) -> Result<Option<XmlEvent>, DtsError> {
        if let Some((namespace, local_name)) = self.pending_end.take() {
            self.depth -= 1;
            return Ok(Some(XmlEvent::End(namespace, local_name)));
        }
        loop {
            let (resolved, event) = self.reader.read_resolved_event()?;
            let namespace = match resolved {
                ResolveResult::Bound(ns) => Some(utf8(ns.as_ref())?.to_string()),
                ResolveResult::Unbound => Some(String::new()),
                ResolveResult::Unknown(prefix) => {
                    let prefix = String::from_utf8_lossy(&prefix).to_string();
                    if matches!(event, Event::Start(_) | Event::Empty(_)) {
                        return Err(DtsError::Validation(format!(
                            "element prefix '{prefix}' is not bound to a namespace at {:?}",
                            self.current_position()
                        )));
                    }
                    None
                }
            };
            match event {
                Event::Start(start) => {
                    self.open_element()?;
                    let element = self.element_start(namespace.unwrap_or_default(), &start)?;
                    return Ok(Some(XmlEvent::Start(element)));
                }
                Event::Empty(start) => {
                    self.open_element()?;
                    let element = self.element_start(namespace.unwrap_or_default(), &start)?;
                    self.pending_end = Some((element.namespace.clone(), element.local_name.clone()));
                    return Ok(Some(XmlEvent::Start(element)));
                }
                Event::End(end) => {
                    self.depth = self.depth.saturating_sub(1);
                    let local_name = utf8(end.local_name().as_ref())?.to_string();
                    return Ok(Some(XmlEvent::End(namespace.unwrap_or_default(), local_name)));
                }
                Event::Text(text) if self.depth > 0 => {
                    return Ok(Some(XmlEvent::Text(text.unescape()?.into_owned())));
                }
                Event::CData(data) if self.depth > 0 => {
                    return Ok(Some(XmlEvent::Text(
                        String::from_utf8_lossy(&data.into_inner()).into_owned(),
                    )));
                }
                Event::Eof => {
                    if self.depth > 0 {
                        return Err(DtsError::Validation(format!(
                            "document ended with {} unclosed element(s)",
                            self.depth
                        )));
                    }
                    if !self.seen_root {
                        return Err(DtsError::Validation(
                            "document has no root element".to_string(),
                        ));
                    }
                    return Ok(None);
                }
                _ => continue,
            }
        }
    }

    fn open_element(&mut self) -> Result<(), DtsError> {
        if self.depth == 0 {
            if self.seen_root {
                return Err(DtsError::Validation(format!(
                    "a second root element starts at {:?}",
                    self.current_position()
                )));
            }
            self.seen_root = true;
        }
        self.depth += 1;
        Ok(())
    }
}

impl Iterator for XmlEventReader<'_> {
    type Item = Result<XmlEvent, DtsError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        let next = self.next_event();
        if !matches!(next, Ok(Some(_))) {
            self.finished = true;
        }
        next.transpose()
    }
}

fn utf8(bytes: &[u8]) -> Result<&str, DtsError> {
    from_utf8(bytes).map_err(|e| DtsError::Validation(format!("invalid UTF-8 in name: {e}")))
}
