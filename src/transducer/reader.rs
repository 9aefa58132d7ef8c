//! Binary → document: decodes record values and replays them as XML events.
//!
//! Mirrors the writer. Records become elements named after the record, the
//! first N−1 fields become attributes, and the content field becomes child
//! items, character data, or nothing. Namespaces are introduced with a fresh
//! `ns0, ns1, …` prefix counter per document; each mapping opens before the
//! element that needs it and closes right after that element ends.

use crate::binary::Decoder;
use crate::error::{Error, Result};
use crate::qname::QName;
use crate::record::{RecordSchema, RecordType, SchemaNode, SchemaRef};
use crate::xml::XmlHandler;
use std::io::Read;

pub struct Reader<'a, R: Read, H: XmlHandler> {
    schema: &'a RecordSchema,
    dec: Decoder<R>,
    handler: &'a mut H,
    /// In-scope prefix mappings, innermost last.
    prefixes: Vec<(String, String)>,
    prefix_counter: usize,
}

/// Decode one record value into XML events. The schema must carry its
/// `xmlSchemas` linkage.
pub fn read_binary<R: Read, H: XmlHandler>(
    schema: &RecordSchema,
    input: R,
    handler: &mut H,
) -> Result<()> {
    if schema.xml_schemas.is_none() {
        return Err(Error::UnlinkedSchema);
    }
    let mut reader = Reader {
        schema,
        dec: Decoder::new(input),
        handler,
        prefixes: Vec::new(),
        prefix_counter: 0,
    };
    reader.run()
}

impl<'a, R: Read, H: XmlHandler> Reader<'a, R, H> {
    fn run(&mut self) -> Result<()> {
        self.handler.start_document()?;
        let root = match self.schema.node(self.schema.root()) {
            SchemaNode::Union { members } => {
                let tag = self.dec.read_index()?;
                *members.get(tag).ok_or_else(|| {
                    Error::Codec(format!("union tag {} out of range", tag))
                })?
            }
            _ => self.schema.root(),
        };
        self.read_element(root)?;
        self.handler.end_document()
    }

    fn read_element(&mut self, member: SchemaRef) -> Result<()> {
        // A map-typed member frames a single keyed entry around its record.
        if let SchemaNode::Map { values } = self.schema.node(member) {
            let values = *values;
            let mut remaining = self.dec.read_map_start()?;
            while remaining > 0 {
                for _ in 0..remaining {
                    let _key = self.dec.read_string()?;
                    self.read_record(values)?;
                }
                remaining = self.dec.read_map_next()?;
            }
            return Ok(());
        }
        self.read_record(member)
    }

    fn read_record(&mut self, member: SchemaRef) -> Result<()> {
        let record = match self.schema.node(member) {
            SchemaNode::Record(rec) => rec.clone(),
            other => {
                return Err(Error::Codec(format!(
                    "expected record, found {}",
                    other.type_name()
                )));
            }
        };
        let qname = element_name(&record);
        let (content_field, attr_fields) = record
            .fields
            .split_last()
            .ok_or_else(|| Error::Codec(format!("record {} has no fields", record.name)))?;

        // Prefixes opened for this element (its own namespace, plus any
        // namespaces introduced by QName-typed values); every mapping must
        // be emitted before start_element and closed after end_element.
        let mut introduced = Vec::new();
        let mut attributes = Vec::new();
        for field in attr_fields {
            if let Some(text) = self.read_simple_text(field.schema, &qname, &mut introduced)? {
                attributes.push((QName::local(field.name.clone()), text));
            }
        }

        // QName-typed content decodes ahead of start_element so its
        // namespace can open a fresh prefix in scope.
        let pending = if self.holds_qname(content_field.schema) {
            Some(self.read_simple_text(content_field.schema, &qname, &mut introduced)?)
        } else {
            None
        };

        self.open_namespace(&qname, &mut introduced)?;
        self.handler.start_element(&qname, &attributes)?;
        match pending {
            Some(Some(text)) => {
                if !text.is_empty() {
                    self.handler.characters(&text)?;
                }
            }
            Some(None) => {}
            None => self.read_content(content_field.schema, &qname)?,
        }
        self.handler.end_element(&qname)?;
        for prefix in introduced.iter().rev() {
            self.handler.end_prefix_mapping(prefix)?;
            self.prefixes.pop();
        }
        Ok(())
    }

    /// Does a simple-content schema carry a QName member anywhere?
    fn holds_qname(&self, schema: SchemaRef) -> bool {
        match self.schema.node(schema) {
            SchemaNode::Qname => true,
            SchemaNode::Union { members } => members
                .iter()
                .any(|&m| matches!(self.schema.node(m), SchemaNode::Qname)),
            _ => false,
        }
    }

    /// Decode one simple value into attribute/content text, rendering
    /// QName values with an in-scope (possibly freshly introduced) prefix.
    fn read_simple_text(
        &mut self,
        schema: SchemaRef,
        element: &QName,
        introduced: &mut Vec<String>,
    ) -> Result<Option<String>> {
        match self.schema.node(schema).clone() {
            SchemaNode::Qname => {
                let clark = self.dec.read_string()?;
                Ok(Some(self.render_qname(&clark, introduced)?))
            }
            SchemaNode::Union { members } => {
                let tag = self.dec.read_index()?;
                let member = *members.get(tag).ok_or_else(|| {
                    Error::Codec(format!("union tag {} out of range", tag))
                })?;
                self.read_simple_text(member, element, introduced)
            }
            SchemaNode::Null => {
                self.dec.read_null()?;
                Ok(None)
            }
            _ => self.read_field_text(schema, element),
        }
    }

    /// Turn a Clark-notation QName value back into `prefix:local`,
    /// allocating and emitting a fresh prefix mapping when the namespace is
    /// not yet in scope.
    fn render_qname(&mut self, clark: &str, introduced: &mut Vec<String>) -> Result<String> {
        let q = QName::parse(clark);
        if !q.has_namespace() {
            return Ok(q.local);
        }
        let prefix = match self
            .prefixes
            .iter()
            .rev()
            .find(|(_, uri)| uri == &q.namespace)
        {
            Some((p, _)) => p.clone(),
            None => {
                let p = format!("ns{}", self.prefix_counter);
                self.prefix_counter += 1;
                self.handler.start_prefix_mapping(&p, &q.namespace)?;
                self.prefixes.push((p.clone(), q.namespace.clone()));
                introduced.push(p.clone());
                p
            }
        };
        Ok(if prefix.is_empty() {
            q.local
        } else {
            format!("{}:{}", prefix, q.local)
        })
    }

    fn read_content(&mut self, schema: SchemaRef, element: &QName) -> Result<()> {
        match self.schema.node(schema).clone() {
            SchemaNode::Null => self.dec.read_null(),
            SchemaNode::Array { items } => {
                if self.holds_elements(items) {
                    let mut remaining = self.dec.read_array_start()?;
                    while remaining > 0 {
                        for _ in 0..remaining {
                            self.read_item(items, element)?;
                        }
                        remaining = self.dec.read_array_next()?;
                    }
                    return Ok(());
                }
                // Simple-type list: tokens joined by single spaces.
                let mut parts = Vec::new();
                let mut remaining = self.dec.read_array_start()?;
                while remaining > 0 {
                    for _ in 0..remaining {
                        if let Some(p) = self.read_field_text(items, element)? {
                            parts.push(p);
                        }
                    }
                    remaining = self.dec.read_array_next()?;
                }
                if !parts.is_empty() {
                    self.handler.characters(&parts.join(" "))?;
                }
                Ok(())
            }
            SchemaNode::Map { values } => {
                let mut remaining = self.dec.read_map_start()?;
                while remaining > 0 {
                    for _ in 0..remaining {
                        // Map keys restate the child's ID attribute.
                        let _key = self.dec.read_string()?;
                        self.read_record(values)?;
                    }
                    remaining = self.dec.read_map_next()?;
                }
                Ok(())
            }
            SchemaNode::Union { members } => {
                let tag = self.dec.read_index()?;
                let member = *members.get(tag).ok_or_else(|| {
                    Error::Codec(format!("union tag {} out of range", tag))
                })?;
                if matches!(self.schema.node(member), SchemaNode::Null) {
                    return self.dec.read_null();
                }
                self.read_content(member, element)
            }
            SchemaNode::Record(_) => self.read_record(schema),
            _ => {
                if let Some(text) = self.read_field_text(schema, element)? {
                    if !text.is_empty() {
                        self.handler.characters(&text)?;
                    }
                }
                Ok(())
            }
        }
    }

    /// Does an item set describe child elements (records, maps, mixed
    /// text) rather than a simple-type list?
    fn holds_elements(&self, items: SchemaRef) -> bool {
        self.schema
            .union_members(items)
            .iter()
            .any(|&m| matches!(self.schema.node(m), SchemaNode::Record(_) | SchemaNode::Map { .. }))
    }

    /// One item of a content array: interleaved text or a child element.
    fn read_item(&mut self, items: SchemaRef, element: &QName) -> Result<()> {
        match self.schema.node(items).clone() {
            SchemaNode::Union { members } => {
                let tag = self.dec.read_index()?;
                let member = *members.get(tag).ok_or_else(|| {
                    Error::Codec(format!("union tag {} out of range", tag))
                })?;
                match self.schema.node(member) {
                    SchemaNode::String => {
                        let text = self.dec.read_string()?;
                        self.handler.characters(&text)
                    }
                    SchemaNode::Null => self.dec.read_null(),
                    _ => self.read_element(member),
                }
            }
            SchemaNode::String => {
                let text = self.dec.read_string()?;
                self.handler.characters(&text)
            }
            _ => self.read_element(items),
        }
    }

    /// Decode a primitive field into text; `None` means a null branch was
    /// taken and the attribute is absent.
    fn read_field_text(&mut self, schema: SchemaRef, element: &QName) -> Result<Option<String>> {
        let unreadable = |kind: &SchemaNode, detail: String| Error::UnreadableValue {
            element: element.clone(),
            kind: kind.type_name().to_string(),
            detail,
        };
        match self.schema.node(schema).clone() {
            SchemaNode::Null => {
                self.dec.read_null()?;
                Ok(None)
            }
            SchemaNode::Boolean => Ok(Some(
                if self.dec.read_boolean()? { "true" } else { "false" }.to_string(),
            )),
            SchemaNode::Int => Ok(Some(self.dec.read_int()?.to_string())),
            SchemaNode::Long => Ok(Some(self.dec.read_long()?.to_string())),
            SchemaNode::Float => Ok(Some(print_float(self.dec.read_float()? as f64))),
            SchemaNode::Double => Ok(Some(print_float(self.dec.read_double()?))),
            SchemaNode::Bytes => {
                use base64::Engine as _;
                let bytes = self.dec.read_bytes()?;
                Ok(Some(
                    base64::engine::general_purpose::STANDARD.encode(bytes),
                ))
            }
            SchemaNode::String => Ok(Some(self.dec.read_string()?)),
            SchemaNode::Qname => Ok(Some(self.dec.read_string()?)),
            SchemaNode::Enum { symbols, .. } => {
                let ordinal = self.dec.read_enum()?;
                symbols
                    .get(ordinal as usize)
                    .cloned()
                    .map(Some)
                    .ok_or_else(|| {
                        unreadable(
                            &SchemaNode::Enum {
                                name: String::new(),
                                symbols: symbols.clone(),
                            },
                            format!("ordinal {} out of range", ordinal),
                        )
                    })
            }
            SchemaNode::Union { members } => {
                let tag = self.dec.read_index()?;
                let member = *members.get(tag).ok_or_else(|| {
                    Error::Codec(format!("union tag {} out of range", tag))
                })?;
                self.read_field_text(member, element)
            }
            SchemaNode::Array { items } => {
                // Simple-type list: space-joined tokens.
                let mut parts = Vec::new();
                let mut remaining = self.dec.read_array_start()?;
                while remaining > 0 {
                    for _ in 0..remaining {
                        if let Some(p) = self.read_field_text(items, element)? {
                            parts.push(p);
                        }
                    }
                    remaining = self.dec.read_array_next()?;
                }
                Ok(Some(parts.join(" ")))
            }
            node @ (SchemaNode::Record(_) | SchemaNode::Map { .. }) => Err(unreadable(
                &node,
                "structured value in attribute position".to_string(),
            )),
        }
    }

    /// Ensure the element's own namespace has a prefix in scope, allocating
    /// a fresh one when needed.
    fn open_namespace(&mut self, qname: &QName, introduced: &mut Vec<String>) -> Result<()> {
        if !qname.has_namespace() {
            return Ok(());
        }
        if self.prefixes.iter().any(|(_, uri)| uri == &qname.namespace) {
            return Ok(());
        }
        let prefix = format!("ns{}", self.prefix_counter);
        self.prefix_counter += 1;
        self.handler.start_prefix_mapping(&prefix, &qname.namespace)?;
        self.prefixes.push((prefix.clone(), qname.namespace.clone()));
        introduced.push(prefix);
        Ok(())
    }
}

fn element_name(record: &RecordType) -> QName {
    QName::new(record.namespace.clone(), record.name.clone())
}

fn print_float(v: f64) -> String {
    if v.is_nan() {
        "NaN".to_string()
    } else if v == f64::INFINITY {
        "INF".to_string()
    } else if v == f64::NEG_INFINITY {
        "-INF".to_string()
    } else {
        v.to_string()
    }
}
