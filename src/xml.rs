//! XML event stream: parsing, replay, and text generation.
//!
//! The transcoder works on a namespace-aware event stream. [`parse_document`]
//! pulls events out of quick-xml with an explicit prefix-scope stack;
//! [`XmlTextSink`] is the reverse direction, assembling document text from
//! events. Both speak [`XmlEvent`] / [`XmlHandler`].

use crate::error::{Error, Result};
use crate::facets::XSI_NS;
use crate::qname::QName;
use quick_xml::Reader;
use quick_xml::events::Event;

pub const XMLNS_NS: &str = "http://www.w3.org/2000/xmlns/";

#[derive(Debug, Clone, PartialEq)]
pub enum XmlEvent {
    StartDocument,
    StartPrefixMapping { prefix: String, uri: String },
    StartElement { name: QName, attributes: Vec<(QName, String)> },
    Characters(String),
    EndElement { name: QName },
    EndPrefixMapping { prefix: String },
    EndDocument,
}

/// Namespace-aware event sink.
#[allow(unused_variables)]
pub trait XmlHandler {
    fn start_document(&mut self) -> Result<()> {
        Ok(())
    }
    fn start_prefix_mapping(&mut self, prefix: &str, uri: &str) -> Result<()> {
        Ok(())
    }
    fn start_element(&mut self, name: &QName, attributes: &[(QName, String)]) -> Result<()>;
    fn characters(&mut self, text: &str) -> Result<()>;
    fn end_element(&mut self, name: &QName) -> Result<()>;
    fn end_prefix_mapping(&mut self, prefix: &str) -> Result<()> {
        Ok(())
    }
    fn end_document(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Feed a recorded event stream into a handler.
pub fn replay<H: XmlHandler>(events: &[XmlEvent], handler: &mut H) -> Result<()> {
    for event in events {
        match event {
            XmlEvent::StartDocument => handler.start_document()?,
            XmlEvent::StartPrefixMapping { prefix, uri } => {
                handler.start_prefix_mapping(prefix, uri)?
            }
            XmlEvent::StartElement { name, attributes } => {
                handler.start_element(name, attributes)?
            }
            XmlEvent::Characters(text) => handler.characters(text)?,
            XmlEvent::EndElement { name } => handler.end_element(name)?,
            XmlEvent::EndPrefixMapping { prefix } => handler.end_prefix_mapping(prefix)?,
            XmlEvent::EndDocument => handler.end_document()?,
        }
    }
    Ok(())
}

// ────────────────────────────────────────────────────────────────────────────
// Parsing
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct NsScope {
    /// Mappings introduced at this depth, in declaration order.
    added: Vec<(String, String)>,
}

struct NsStack {
    scopes: Vec<NsScope>,
}

impl NsStack {
    fn new() -> Self {
        NsStack { scopes: Vec::new() }
    }

    fn resolve(&self, prefix: &str) -> Option<&str> {
        for scope in self.scopes.iter().rev() {
            for (p, uri) in scope.added.iter().rev() {
                if p == prefix {
                    return Some(uri);
                }
            }
        }
        match prefix {
            "xml" => Some("http://www.w3.org/XML/1998/namespace"),
            "xmlns" => Some(XMLNS_NS),
            _ => None,
        }
    }
}

/// Parse a complete document into its event stream.
pub fn parse_document(text: &str) -> Result<Vec<XmlEvent>> {
    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(false);
    let mut events = vec![XmlEvent::StartDocument];
    let mut ns = NsStack::new();
    let mut open: Vec<QName> = Vec::new();

    loop {
        match reader.read_event()? {
            Event::Start(start) => {
                handle_start(&start, &mut ns, &mut events, &mut open)?;
            }
            Event::Empty(start) => {
                handle_start(&start, &mut ns, &mut events, &mut open)?;
                handle_end(&mut ns, &mut events, &mut open)?;
            }
            Event::End(_) => {
                handle_end(&mut ns, &mut events, &mut open)?;
            }
            Event::Text(t) => {
                let decoded = t.decode().map_err(|e| Error::Xml(e.to_string()))?;
                let text = quick_xml::escape::unescape(&decoded)
                    .map_err(|e| Error::Xml(e.to_string()))?
                    .into_owned();
                if !open.is_empty() && !text.is_empty() {
                    events.push(XmlEvent::Characters(text));
                }
            }
            Event::CData(c) => {
                let text = String::from_utf8_lossy(&c).into_owned();
                if !open.is_empty() && !text.is_empty() {
                    events.push(XmlEvent::Characters(text));
                }
            }
            Event::Decl(_) | Event::Comment(_) | Event::PI(_) | Event::DocType(_) => {}
            Event::Eof => break,
            Event::GeneralRef(r) => {
                let resolved = if let Some(ch) = r.resolve_char_ref().map_err(|e| Error::Xml(e.to_string()))? {
                    Some(ch.to_string())
                } else {
                    let name = r.decode().map_err(|e| Error::Xml(e.to_string()))?;
                    quick_xml::escape::resolve_predefined_entity(&name).map(str::to_string)
                };
                let text = resolved.ok_or_else(|| Error::Xml("unrecognized entity reference".to_string()))?;
                if !open.is_empty() && !text.is_empty() {
                    events.push(XmlEvent::Characters(text));
                }
            }
        }
    }
    if !open.is_empty() {
        return Err(Error::Xml(format!("unclosed element {}", open.pop().unwrap())));
    }
    events.push(XmlEvent::EndDocument);
    Ok(events)
}

fn handle_start(
    start: &quick_xml::events::BytesStart<'_>,
    ns: &mut NsStack,
    events: &mut Vec<XmlEvent>,
    open: &mut Vec<QName>,
) -> Result<()> {
    let mut scope = NsScope::default();
    let mut plain_attrs: Vec<(String, String)> = Vec::new();

    for attr in start.attributes() {
        let attr = attr.map_err(|e| Error::Xml(e.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| Error::Xml(e.to_string()))?
            .into_owned();
        if key == "xmlns" {
            scope.added.push((String::new(), value));
        } else if let Some(prefix) = key.strip_prefix("xmlns:") {
            scope.added.push((prefix.to_string(), value));
        } else {
            plain_attrs.push((key, value));
        }
    }

    for (prefix, uri) in &scope.added {
        events.push(XmlEvent::StartPrefixMapping {
            prefix: prefix.clone(),
            uri: uri.clone(),
        });
    }
    ns.scopes.push(scope);

    let raw = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let name = resolve_name(ns, &raw, true)?;

    let mut attributes = Vec::with_capacity(plain_attrs.len());
    for (key, value) in plain_attrs {
        // Attributes never take the default namespace.
        attributes.push((resolve_name(ns, &key, false)?, value));
    }

    open.push(name.clone());
    events.push(XmlEvent::StartElement { name, attributes });
    Ok(())
}

fn handle_end(ns: &mut NsStack, events: &mut Vec<XmlEvent>, open: &mut Vec<QName>) -> Result<()> {
    let name = open
        .pop()
        .ok_or_else(|| Error::Xml("end tag without open element".into()))?;
    events.push(XmlEvent::EndElement { name });
    let scope = ns.scopes.pop().unwrap_or_default();
    for (prefix, _) in scope.added.iter().rev() {
        events.push(XmlEvent::EndPrefixMapping {
            prefix: prefix.clone(),
        });
    }
    Ok(())
}

fn resolve_name(ns: &NsStack, raw: &str, use_default: bool) -> Result<QName> {
    match raw.split_once(':') {
        Some((prefix, local)) => {
            let uri = ns
                .resolve(prefix)
                .ok_or_else(|| Error::Xml(format!("undeclared prefix '{}'", prefix)))?;
            Ok(QName::new(uri, local).with_prefix(prefix))
        }
        None => {
            let uri = if use_default {
                ns.resolve("").unwrap_or("")
            } else {
                ""
            };
            Ok(QName::new(uri, raw))
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Text generation
// ────────────────────────────────────────────────────────────────────────────

/// Escape text content. Encodes `&`, `<`, and `>` everywhere.
fn xml_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Escape an attribute value. Like [`xml_escape`] but also encodes quotes
/// and literal newlines.
fn xml_escape_attr(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\n' => out.push_str("&#xA;"),
            '\r' => out.push_str("&#xD;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Assembles compact document text from events.
#[derive(Default)]
pub struct XmlTextSink {
    out: String,
    /// Prefix mappings waiting for the next start_element.
    pending: Vec<(String, String)>,
    /// (depth-scoped) prefix → uri stack for name printing.
    scopes: Vec<Vec<(String, String)>>,
    /// Start tags still open for self-closing collapse.
    unclosed: Option<String>,
}

impl XmlTextSink {
    pub fn new() -> Self {
        XmlTextSink {
            out: String::with_capacity(1024),
            ..XmlTextSink::default()
        }
    }

    pub fn into_string(self) -> String {
        self.out
    }

    fn prefix_for(&self, uri: &str) -> Option<String> {
        for scope in self.scopes.iter().rev() {
            for (p, u) in scope.iter().rev() {
                if u == uri {
                    return Some(p.clone());
                }
            }
        }
        None
    }

    fn printable_name(&mut self, name: &QName, extra_decls: &mut Vec<(String, String)>) -> String {
        if !name.has_namespace() {
            return name.local.clone();
        }
        if let Some(prefix) = self.prefix_for(&name.namespace) {
            return if prefix.is_empty() {
                name.local.clone()
            } else {
                format!("{}:{}", prefix, name.local)
            };
        }
        // Undeclared namespace: bind it as the default on this element.
        extra_decls.push((String::new(), name.namespace.clone()));
        if let Some(scope) = self.scopes.last_mut() {
            scope.push((String::new(), name.namespace.clone()));
        }
        name.local.clone()
    }

    fn close_pending_tag(&mut self) {
        if self.unclosed.take().is_some() {
            self.out.push('>');
        }
    }
}

impl XmlHandler for XmlTextSink {
    fn start_document(&mut self) -> Result<()> {
        self.out.push_str("<?xml version=\"1.0\" encoding=\"utf-8\"?>");
        Ok(())
    }

    fn start_prefix_mapping(&mut self, prefix: &str, uri: &str) -> Result<()> {
        self.pending.push((prefix.to_string(), uri.to_string()));
        Ok(())
    }

    fn start_element(&mut self, name: &QName, attributes: &[(QName, String)]) -> Result<()> {
        self.close_pending_tag();
        let mappings = std::mem::take(&mut self.pending);
        self.scopes.push(mappings.clone());

        let mut extra_decls = Vec::new();
        let tag = self.printable_name(name, &mut extra_decls);
        self.out.push('<');
        self.out.push_str(&tag);
        for (prefix, uri) in mappings.iter().chain(extra_decls.iter()) {
            if prefix.is_empty() {
                self.out
                    .push_str(&format!(" xmlns=\"{}\"", xml_escape_attr(uri)));
            } else {
                self.out
                    .push_str(&format!(" xmlns:{}=\"{}\"", prefix, xml_escape_attr(uri)));
            }
        }
        for (attr_name, value) in attributes {
            let mut attr_extra = Vec::new();
            let printable = if attr_name.has_namespace() {
                match self.prefix_for(&attr_name.namespace) {
                    Some(p) if !p.is_empty() => format!("{}:{}", p, attr_name.local),
                    _ => {
                        // Namespaced attributes need a prefix; invent one.
                        let p = format!("ans{}", self.scopes.len());
                        attr_extra.push((p.clone(), attr_name.namespace.clone()));
                        if let Some(scope) = self.scopes.last_mut() {
                            scope.push((p.clone(), attr_name.namespace.clone()));
                        }
                        format!("{}:{}", p, attr_name.local)
                    }
                }
            } else {
                attr_name.local.clone()
            };
            for (p, uri) in attr_extra {
                self.out
                    .push_str(&format!(" xmlns:{}=\"{}\"", p, xml_escape_attr(&uri)));
            }
            self.out
                .push_str(&format!(" {}=\"{}\"", printable, xml_escape_attr(value)));
        }
        self.unclosed = Some(tag);
        Ok(())
    }

    fn characters(&mut self, text: &str) -> Result<()> {
        self.close_pending_tag();
        self.out.push_str(&xml_escape(text));
        Ok(())
    }

    fn end_element(&mut self, name: &QName) -> Result<()> {
        if self.unclosed.take().is_some() {
            self.out.push_str("/>");
            self.scopes.pop();
            return Ok(());
        }
        let mut extra = Vec::new();
        let tag = self.printable_name(name, &mut extra);
        self.out.push_str(&format!("</{}>", tag));
        self.scopes.pop();
        Ok(())
    }

    fn end_prefix_mapping(&mut self, _prefix: &str) -> Result<()> {
        Ok(())
    }

    fn end_document(&mut self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_namespaces_and_attributes() {
        let events = parse_document(
            r#"<p:root xmlns:p="urn:x" id="7"><p:child/>text</p:root>"#,
        )
        .unwrap();
        assert_eq!(
            events[1],
            XmlEvent::StartPrefixMapping {
                prefix: "p".into(),
                uri: "urn:x".into()
            }
        );
        match &events[2] {
            XmlEvent::StartElement { name, attributes } => {
                assert_eq!(name, &QName::new("urn:x", "root"));
                assert_eq!(attributes, &[(QName::local("id"), "7".to_string())]);
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert!(events.contains(&XmlEvent::Characters("text".into())));
        assert_eq!(events.last(), Some(&XmlEvent::EndDocument));
    }

    #[test]
    fn default_namespace_applies_to_elements_only() {
        let events = parse_document(r#"<root xmlns="urn:d" a="1"/>"#).unwrap();
        match &events[2] {
            XmlEvent::StartElement { name, attributes } => {
                assert_eq!(name.namespace, "urn:d");
                assert_eq!(attributes[0].0, QName::local("a"));
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn sink_round_trips_events() {
        let text = r#"<root xmlns="urn:d"><a id="1">hi &amp; bye</a><b/></root>"#;
        let events = parse_document(text).unwrap();
        let mut sink = XmlTextSink::new();
        replay(&events, &mut sink).unwrap();
        let regenerated = sink.into_string();
        let events2 = parse_document(&regenerated).unwrap();
        assert_eq!(events, events2);
    }

    #[test]
    fn xsi_namespace_constant_matches() {
        let events =
            parse_document(r#"<r xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" xsi:nil="true"/>"#)
                .unwrap();
        match &events[2] {
            XmlEvent::StartElement { attributes, .. } => {
                assert_eq!(attributes[0].0, QName::new(XSI_NS, "nil"));
            }
            other => panic!("unexpected event {:?}", other),
        }
    }
}
