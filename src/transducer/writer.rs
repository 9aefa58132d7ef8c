//! Document → binary: replays the event stream over the annotated document
//! tree and path, emitting record values through the codec.
//!
//! The path chain supplies one element landing per non-wildcard start
//! event, in order; the events supply attributes and character data. Each
//! open element is a frame: attribute fields stream out at element start,
//! array content streams one item per child, simple content accumulates
//! until the element closes.

use crate::binary::Encoder;
use crate::doctree::{Direction, DocRef, NodePool, PathRef};
use crate::error::{Error, Result};
use crate::facets::XSI_NS;
use crate::machine::{ElementState, StateKind, StateMachine};
use crate::qname::QName;
use crate::record::{Field, RecordSchema, SchemaNode, SchemaRef, sanitized_name};
use crate::simpletype::{self, BaseSimpleType, SimpleTypeInfo, Value};
use crate::xml::XmlEvent;
use std::io::Write;

enum ContentKind {
    /// Mismatched subtree: admissible only while it stays empty.
    Dead,
    Null,
    Array { items: SchemaRef },
    Map,
    Simple { schema: SchemaRef },
}

struct Frame {
    doc: DocRef,
    elem: ElementState,
    content: ContentKind,
    text: String,
    got_text: bool,
    nil: bool,
    /// This element framed its own single-entry map around the record.
    inner_map: bool,
}

pub struct Writer<'a, W: Write> {
    machine: &'a StateMachine,
    pool: &'a NodePool,
    schema: &'a RecordSchema,
    enc: Encoder<W>,
    /// Element landings from the path chain, in document order.
    landings: Vec<DocRef>,
    next_landing: usize,
    frames: Vec<Frame>,
    /// Depth inside a wildcard subtree being dropped.
    skip_depth: Option<u32>,
    /// In-scope prefix mappings, innermost last; resolves QName-typed
    /// literals.
    ns: Vec<(String, String)>,
}

impl<'a, W: Write> Writer<'a, W> {
    pub fn new(
        machine: &'a StateMachine,
        pool: &'a NodePool,
        schema: &'a RecordSchema,
        head: PathRef,
        out: W,
    ) -> Self {
        let mut landings = Vec::new();
        let mut cursor = Some(head);
        while let Some(r) = cursor {
            let node = pool.path(r);
            if matches!(node.direction, Direction::Child | Direction::Sibling) {
                let kind = &machine.node(node.state).kind;
                if matches!(kind, StateKind::Element(_) | StateKind::Any { .. }) {
                    if let Some(doc) = node.doc {
                        landings.push(doc);
                    }
                }
            }
            cursor = node.next;
        }
        Writer {
            machine,
            pool,
            schema,
            enc: Encoder::new(out),
            landings,
            next_landing: 0,
            frames: Vec::new(),
            skip_depth: None,
            ns: Vec::new(),
        }
    }

    /// Replay the events and return the codec sink.
    pub fn write(mut self, events: &[XmlEvent]) -> Result<W> {
        for event in events {
            match event {
                XmlEvent::StartElement { name, attributes } => {
                    self.on_start(name, attributes)?;
                }
                XmlEvent::Characters(text) => self.on_characters(text)?,
                XmlEvent::EndElement { .. } => self.on_end()?,
                XmlEvent::StartPrefixMapping { prefix, uri } => {
                    self.ns.push((prefix.clone(), uri.clone()));
                }
                XmlEvent::EndPrefixMapping { prefix } => {
                    if let Some(i) = self.ns.iter().rposition(|(p, _)| p == prefix) {
                        self.ns.remove(i);
                    }
                }
                _ => {}
            }
        }
        Ok(self.enc.into_inner())
    }

    fn resolve_prefix(&self, prefix: &str) -> Option<String> {
        if prefix == "xml" {
            return Some("http://www.w3.org/XML/1998/namespace".to_string());
        }
        self.ns
            .iter()
            .rev()
            .find(|(p, _)| p == prefix)
            .map(|(_, uri)| uri.clone())
    }

    fn on_start(&mut self, name: &QName, attributes: &[(QName, String)]) -> Result<()> {
        if let Some(depth) = self.skip_depth.as_mut() {
            *depth += 1;
            return Ok(());
        }
        let doc = *self
            .landings
            .get(self.next_landing)
            .ok_or_else(|| Error::Codec("path chain exhausted before events".into()))?;
        self.next_landing += 1;

        let state = self.pool.doc(doc).state;
        if matches!(self.machine.node(state).kind, StateKind::Any { .. }) {
            // processContents="skip": the subtree is dropped from the output.
            self.skip_depth = Some(0);
            return Ok(());
        }
        let elem = self
            .machine
            .element(state)
            .expect("landing is an element")
            .clone();

        // A child inside a mismatched subtree is data the schema cannot hold.
        if let Some(top) = self.frames.last() {
            if matches!(top.content, ContentKind::Dead) {
                return Err(Error::RecordSchemaMismatch {
                    element: name.clone(),
                    detail: "child element inside unmatched subtree".into(),
                });
            }
        }

        let slot = self.pool.doc(doc).user_slot.clone();
        let member = slot.as_ref().and_then(|s| s.schema);
        let Some(member) = member else {
            if has_data_attrs(attributes) {
                return Err(Error::RecordSchemaMismatch {
                    element: name.clone(),
                    detail: slot
                        .and_then(|s| s.mismatch)
                        .unwrap_or_else(|| "element not covered by record schema".into()),
                });
            }
            self.frames.push(Frame {
                doc,
                elem,
                content: ContentKind::Dead,
                text: String::new(),
                got_text: false,
                nil: false,
                inner_map: false,
            });
            return Ok(());
        };
        let slot = slot.expect("slot present when member is");

        // Containing context: array item framing and union tag.
        let is_map_member = matches!(self.schema.node(member), SchemaNode::Map { .. });
        if let Some(parent) = self.frames.last() {
            match parent.content {
                ContentKind::Array { .. } | ContentKind::Map => {
                    self.enc.start_item()?;
                    if let Some(tag) = slot.union_index {
                        self.enc.write_index(tag)?;
                    }
                }
                _ => {
                    return Err(Error::RecordSchemaMismatch {
                        element: name.clone(),
                        detail: "parent content is not an array".into(),
                    });
                }
            }
        } else if let Some(tag) = slot.union_index {
            // Root inside a union-typed schema.
            self.enc.write_index(tag)?;
        }

        // Map entries are keyed by the element's ID attribute. A map member
        // outside a map-typed content field frames its single entry itself.
        let mut inner_map = false;
        if is_map_member {
            let key = attributes
                .iter()
                .find(|(q, _)| q.local.eq_ignore_ascii_case("id"))
                .map(|(_, v)| v.clone())
                .ok_or_else(|| Error::RecordSchemaMismatch {
                    element: name.clone(),
                    detail: "map-typed element without ID attribute".into(),
                })?;
            let parent_is_map = self
                .frames
                .last()
                .is_some_and(|f| matches!(f.content, ContentKind::Map));
            if !parent_is_map {
                self.enc.write_map_start()?;
                self.enc.set_item_count(1)?;
                self.enc.start_item()?;
                inner_map = true;
            }
            self.enc.write_string(&key)?;
        }

        let record = self
            .schema
            .record_of(member)
            .ok_or_else(|| Error::RecordSchemaMismatch {
                element: name.clone(),
                detail: "schema member is not a record".into(),
            })?
            .clone();
        let nil = attributes
            .iter()
            .any(|(q, v)| q.namespace == XSI_NS && q.local == "nil" && v == "true");

        // Attribute fields precede the content field.
        let (attr_fields, content_field) = match record.fields.split_last() {
            Some((content, attrs)) => (attrs, content),
            None => {
                return Err(Error::RecordSchemaMismatch {
                    element: name.clone(),
                    detail: "record without a content field".into(),
                });
            }
        };
        for field in attr_fields {
            self.write_attribute_field(&elem, field, attributes)?;
        }

        let content = self.open_content(&elem, content_field, slot.child_items, nil)?;
        self.frames.push(Frame {
            doc,
            elem,
            content,
            text: String::new(),
            got_text: false,
            nil,
            inner_map,
        });
        Ok(())
    }

    fn on_characters(&mut self, text: &str) -> Result<()> {
        if self.skip_depth.is_some() {
            return Ok(());
        }
        let Some(top) = self.frames.last_mut() else {
            return Ok(());
        };
        match &top.content {
            ContentKind::Simple { .. } => {
                top.text.push_str(text);
                top.got_text = true;
            }
            ContentKind::Dead => {
                if !text.trim().is_empty() {
                    return Err(Error::RecordSchemaMismatch {
                        element: top.elem.qname.clone(),
                        detail: "character data inside unmatched subtree".into(),
                    });
                }
            }
            ContentKind::Array { items } => {
                if top.elem.is_mixed() {
                    if text.trim().is_empty() {
                        return Ok(());
                    }
                    let items = *items;
                    let element = top.elem.qname.clone();
                    self.enc.start_item()?;
                    if let SchemaNode::Union { members } = self.schema.node(items) {
                        let tag = members
                            .iter()
                            .position(|&m| matches!(self.schema.node(m), SchemaNode::String))
                            .ok_or_else(|| Error::RecordSchemaMismatch {
                                element,
                                detail: "mixed content but no string member".into(),
                            })?;
                        self.enc.write_index(tag)?;
                    }
                    self.enc.write_string(text)?;
                }
                // Whitespace between children of a non-mixed type is dropped.
            }
            ContentKind::Null | ContentKind::Map => {}
        }
        Ok(())
    }

    fn on_end(&mut self) -> Result<()> {
        if let Some(depth) = self.skip_depth.as_mut() {
            if *depth > 0 {
                *depth -= 1;
            } else {
                self.skip_depth = None;
            }
            return Ok(());
        }
        let frame = self
            .frames
            .pop()
            .ok_or_else(|| Error::Codec("unbalanced end event".into()))?;
        match frame.content {
            ContentKind::Dead | ContentKind::Null => {}
            ContentKind::Array { .. } => self.enc.write_array_end()?,
            ContentKind::Map => self.enc.write_map_end()?,
            ContentKind::Simple { schema } => self.close_simple(&frame, schema)?,
        }
        if frame.inner_map {
            self.enc.write_map_end()?;
        }
        Ok(())
    }

    // ── Field writing ───────────────────────────────────────────────────

    fn write_attribute_field(
        &mut self,
        elem: &ElementState,
        field: &Field,
        attributes: &[(QName, String)],
    ) -> Result<()> {
        // Look the attribute up by qualified name first, then by local name,
        // then fall back to the declaration's fixed/default.
        let declared = elem.attributes.iter().find(|a| {
            sanitized_name(&a.name.local) == field.name || a.name.local == field.name
        });
        let value = declared
            .and_then(|a| {
                attributes
                    .iter()
                    .find(|(q, _)| q == &a.name)
                    .map(|(_, v)| v.clone())
            })
            .or_else(|| {
                attributes
                    .iter()
                    .find(|(q, _)| q.local == field.name || sanitized_name(&q.local) == field.name)
                    .map(|(_, v)| v.clone())
            })
            .or_else(|| declared.and_then(|a| a.fixed.clone().or_else(|| a.default.clone())));

        let type_info = declared.map(|a| a.type_info.clone());
        match value {
            Some(text) => self.write_text(field.schema, &text, type_info.as_ref(), &elem.qname),
            None => self.write_absent(field.schema, &elem.qname, &field.name),
        }
    }

    fn write_absent(&mut self, schema: SchemaRef, element: &QName, field: &str) -> Result<()> {
        match self.schema.node(schema) {
            SchemaNode::Union { members } => {
                let null = members
                    .iter()
                    .position(|&m| matches!(self.schema.node(m), SchemaNode::Null));
                match null {
                    Some(tag) => {
                        self.enc.write_index(tag)?;
                        self.enc.write_null()
                    }
                    None => Err(Error::UnwritableValue {
                        element: element.clone(),
                        value: format!("<missing attribute {}>", field),
                    }),
                }
            }
            SchemaNode::Null => self.enc.write_null(),
            SchemaNode::String => self.enc.write_string(""),
            _ => Err(Error::UnwritableValue {
                element: element.clone(),
                value: format!("<missing attribute {}>", field),
            }),
        }
    }

    fn open_content(
        &mut self,
        elem: &ElementState,
        field: &Field,
        child_items: u32,
        nil: bool,
    ) -> Result<ContentKind> {
        match self.schema.node(field.schema) {
            SchemaNode::Null => Ok(ContentKind::Null),
            SchemaNode::Array { items } => {
                let items = *items;
                if nil {
                    self.enc.write_array_start()?;
                    self.enc.set_item_count(0)?;
                    return Ok(ContentKind::Array { items });
                }
                self.enc.write_array_start()?;
                self.enc.set_item_count(child_items as u64)?;
                Ok(ContentKind::Array { items })
            }
            SchemaNode::Map { .. } => {
                self.enc.write_map_start()?;
                self.enc.set_item_count(child_items as u64)?;
                Ok(ContentKind::Map)
            }
            _ => {
                let _ = elem;
                Ok(ContentKind::Simple {
                    schema: field.schema,
                })
            }
        }
    }

    fn close_simple(&mut self, frame: &Frame, schema: SchemaRef) -> Result<()> {
        if frame.nil {
            return match self.schema.node(schema) {
                SchemaNode::Union { members } => {
                    let tag = members
                        .iter()
                        .position(|&m| matches!(self.schema.node(m), SchemaNode::Null))
                        .ok_or_else(|| Error::UnwritableValue {
                            element: frame.elem.qname.clone(),
                            value: "<nil>".into(),
                        })?;
                    self.enc.write_index(tag)?;
                    self.enc.write_null()
                }
                SchemaNode::Null => self.enc.write_null(),
                _ => Err(Error::UnwritableValue {
                    element: frame.elem.qname.clone(),
                    value: "<nil>".into(),
                }),
            };
        }
        let fallback = frame.elem.fixed.clone().or_else(|| frame.elem.default.clone());
        let text = if frame.got_text {
            frame.text.clone()
        } else if let Some(v) = fallback {
            // Defaults and fixed values stand in for absent content.
            v
        } else {
            // No content, no default: prefer a null member if there is one.
            if let SchemaNode::Union { members } = self.schema.node(schema) {
                if let Some(tag) = members
                    .iter()
                    .position(|&m| matches!(self.schema.node(m), SchemaNode::Null))
                {
                    self.enc.write_index(tag)?;
                    return self.enc.write_null();
                }
            }
            String::new()
        };
        self.write_text(schema, &text, Some(&frame.elem.type_info), &frame.elem.qname)
    }

    /// Write `text` against `schema`, resolving unions in declared order:
    /// structured members first, then bytes, then string.
    fn write_text(
        &mut self,
        schema: SchemaRef,
        text: &str,
        type_info: Option<&SimpleTypeInfo>,
        element: &QName,
    ) -> Result<()> {
        match self.schema.node(schema).clone() {
            SchemaNode::Union { members } => {
                let ordered = union_write_order(self.schema, &members);
                for (tag, member) in ordered {
                    if matches!(self.schema.node(member), SchemaNode::Null) {
                        // Null only stands in for nil/absent, handled earlier.
                        continue;
                    }
                    if let Ok(value) = self.convert(member, text, type_info) {
                        self.enc.write_index(tag)?;
                        return self.write_value(member, &value);
                    }
                }
                Err(Error::UnwritableValue {
                    element: element.clone(),
                    value: text.to_string(),
                })
            }
            _ => {
                let value = self
                    .convert(schema, text, type_info)
                    .map_err(|_| Error::UnwritableValue {
                        element: element.clone(),
                        value: text.to_string(),
                    })?;
                self.write_value(schema, &value)
            }
        }
    }

    /// Parse `text` into the shape `member` requires. When the element's
    /// simple type is known, the literal goes through it first so facet
    /// bounds are enforced; a string-typed element falls back to plain
    /// lexical parsing for non-string members.
    fn convert(
        &self,
        member: SchemaRef,
        text: &str,
        type_info: Option<&SimpleTypeInfo>,
    ) -> Result<Value> {
        let collapsed = text.trim();
        let fail = |detail: &str| Error::Codec(detail.to_string());
        let typed = type_info
            .filter(|i| !i.is_complex())
            .map(|i| simpletype::parse_literal(i, text));
        match self.schema.node(member) {
            SchemaNode::Boolean => {
                if let Some(r) = typed {
                    if let Value::Boolean(b) = r? {
                        return Ok(Value::Boolean(b));
                    }
                }
                match collapsed {
                    "true" | "1" => Ok(Value::Boolean(true)),
                    "false" | "0" => Ok(Value::Boolean(false)),
                    _ => Err(fail("not a boolean")),
                }
            }
            SchemaNode::Int => {
                if let Some(r) = typed {
                    match r? {
                        Value::Int(v) => return Ok(Value::Int(v)),
                        Value::Long(v) => {
                            return i32::try_from(v)
                                .map(Value::Int)
                                .map_err(|_| fail("value exceeds int range"));
                        }
                        _ => {}
                    }
                }
                collapsed
                    .parse::<i32>()
                    .map(Value::Int)
                    .map_err(|_| fail("not an int"))
            }
            SchemaNode::Long => {
                if let Some(r) = typed {
                    match r? {
                        Value::Int(v) => return Ok(Value::Long(v as i64)),
                        Value::Long(v) => return Ok(Value::Long(v)),
                        _ => {}
                    }
                }
                collapsed
                    .parse::<i64>()
                    .map(Value::Long)
                    .map_err(|_| fail("not a long"))
            }
            SchemaNode::Float => {
                if let Some(r) = typed {
                    match r? {
                        Value::Float(v) => return Ok(Value::Float(v)),
                        Value::Double(v) => return Ok(Value::Float(v as f32)),
                        _ => {}
                    }
                }
                collapsed
                    .parse::<f32>()
                    .map(Value::Float)
                    .map_err(|_| fail("not a float"))
            }
            SchemaNode::Double => {
                if let Some(r) = typed {
                    match r? {
                        Value::Float(v) => return Ok(Value::Double(v as f64)),
                        Value::Double(v) => return Ok(Value::Double(v)),
                        _ => {}
                    }
                }
                collapsed
                    .parse::<f64>()
                    .map(Value::Double)
                    .map_err(|_| fail("not a double"))
            }
            SchemaNode::Qname => {
                // Resolve the prefix against the bindings in scope at this
                // point of the document; the value form is Clark notation.
                simpletype::parse_qname_literal(collapsed, |p| self.resolve_prefix(p))
            }
            SchemaNode::Enum { symbols, .. } => symbols
                .iter()
                .position(|s| s == collapsed)
                .map(|i| Value::Int(i as i32))
                .ok_or_else(|| fail("not an enum symbol")),
            SchemaNode::Bytes => {
                // Hex or base64 per the element's base type.
                let base = match type_info {
                    Some(SimpleTypeInfo::Atomic { base, .. }) => *base,
                    _ => BaseSimpleType::Base64Binary,
                };
                let info = SimpleTypeInfo::atomic(match base {
                    BaseSimpleType::HexBinary => BaseSimpleType::HexBinary,
                    _ => BaseSimpleType::Base64Binary,
                });
                simpletype::parse_literal(&info, collapsed)
            }
            SchemaNode::String => Ok(Value::String(
                type_info
                    .filter(|i| !i.is_complex())
                    .map(|i| simpletype::normalize(i, text))
                    .unwrap_or_else(|| text.to_string()),
            )),
            SchemaNode::Array { items } => {
                // Simple-type list content.
                let items = *items;
                let mut values = Vec::new();
                for token in collapsed.split_whitespace() {
                    values.push(self.convert(items, token, None)?);
                }
                Ok(Value::List(values))
            }
            SchemaNode::Union { members } => {
                // List items can be unions; resolve like any other value.
                for (_, m) in union_write_order(self.schema, members) {
                    if matches!(self.schema.node(m), SchemaNode::Null) {
                        continue;
                    }
                    if let Ok(v) = self.convert(m, text, type_info) {
                        return Ok(v);
                    }
                }
                Err(fail("no union member accepts the value"))
            }
            SchemaNode::Null => {
                if collapsed.is_empty() {
                    Ok(Value::Null)
                } else {
                    Err(fail("null with content"))
                }
            }
            _ => Err(fail("unsupported member kind")),
        }
    }

    fn write_value(&mut self, schema: SchemaRef, value: &Value) -> Result<()> {
        match (self.schema.node(schema).clone(), value) {
            (SchemaNode::Null, _) => self.enc.write_null(),
            (SchemaNode::Boolean, Value::Boolean(b)) => self.enc.write_boolean(*b),
            (SchemaNode::Int, Value::Int(v)) => self.enc.write_int(*v),
            (SchemaNode::Int, Value::Long(v)) => self.enc.write_int(*v as i32),
            (SchemaNode::Long, Value::Long(v)) => self.enc.write_long(*v),
            (SchemaNode::Long, Value::Int(v)) => self.enc.write_long(*v as i64),
            (SchemaNode::Float, Value::Float(v)) => self.enc.write_float(*v),
            (SchemaNode::Double, Value::Double(v)) => self.enc.write_double(*v),
            (SchemaNode::Double, Value::Float(v)) => self.enc.write_double(*v as f64),
            (SchemaNode::Bytes, Value::Bytes(b)) => self.enc.write_bytes(b),
            (SchemaNode::String, Value::String(s)) => self.enc.write_string(s),
            (SchemaNode::Qname, Value::String(s)) => self.enc.write_string(s),
            (SchemaNode::Enum { .. }, Value::Int(ordinal)) => self.enc.write_enum(*ordinal),
            (SchemaNode::Array { items }, Value::List(values)) => {
                let items = items;
                self.enc.write_array_start()?;
                self.enc.set_item_count(values.len() as u64)?;
                for v in values {
                    self.enc.start_item()?;
                    self.write_value(items, v)?;
                }
                self.enc.write_array_end()
            }
            (SchemaNode::Union { members }, v) => {
                let tag = members
                    .iter()
                    .position(|&m| value_fits(self.schema.node(m), v))
                    .ok_or_else(|| {
                        Error::Codec(format!("no union member holds {:?}", v))
                    })?;
                self.enc.write_index(tag)?;
                self.write_value(members[tag], v)
            }
            (node, value) => Err(Error::Codec(format!(
                "cannot write {:?} as {}",
                value,
                node.type_name()
            ))),
        }
    }
}

/// Declared order with bytes and string demoted to last resorts.
fn union_write_order(schema: &RecordSchema, members: &[SchemaRef]) -> Vec<(usize, SchemaRef)> {
    let mut structured = Vec::new();
    let mut bytes = Vec::new();
    let mut strings = Vec::new();
    for (i, &m) in members.iter().enumerate() {
        match schema.node(m) {
            SchemaNode::Bytes => bytes.push((i, m)),
            SchemaNode::String => strings.push((i, m)),
            _ => structured.push((i, m)),
        }
    }
    structured.extend(bytes);
    structured.extend(strings);
    structured
}

/// Does a converted value fit a union member without re-parsing?
fn value_fits(node: &SchemaNode, value: &Value) -> bool {
    match (node, value) {
        (SchemaNode::Enum { symbols, .. }, Value::Int(i)) => (*i as usize) < symbols.len(),
        (SchemaNode::Null, Value::Null)
        | (SchemaNode::Boolean, Value::Boolean(_))
        | (SchemaNode::Int, Value::Int(_))
        | (SchemaNode::Long, Value::Long(_) | Value::Int(_))
        | (SchemaNode::Float, Value::Float(_))
        | (SchemaNode::Double, Value::Double(_) | Value::Float(_))
        | (SchemaNode::Bytes, Value::Bytes(_))
        | (SchemaNode::String, Value::String(_))
        | (SchemaNode::Qname, Value::String(_))
        | (SchemaNode::Array { .. }, Value::List(_)) => true,
        _ => false,
    }
}

fn has_data_attrs(attributes: &[(QName, String)]) -> bool {
    attributes
        .iter()
        .any(|(q, _)| q.namespace != XSI_NS)
}
