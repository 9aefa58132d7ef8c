//! Record schema: the binary layout driving the transducer.
//!
//! Schemas form a possibly self-referential graph, so nodes live in an
//! arena and reference each other by index; named types parse once and are
//! reused by name. The JSON form is the usual record-schema notation
//! (`{"type":"record",...}`, unions as arrays, named references as plain
//! strings) plus an `xmlSchemas` property linking the schema back to the
//! XSD it was derived from.
//!
//! - [`gen`] – derive the default record schema from a state machine

pub mod r#gen;

use crate::error::{Error, Result};
use crate::qname::QName;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::collections::HashMap;

pub type SchemaRef = usize;

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub schema: SchemaRef,
    pub default: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordType {
    pub name: String,
    /// The XML namespace of the element this record mirrors.
    pub namespace: String,
    pub fields: Vec<Field>,
}

/// Collapse an XML name to a record-safe identifier.
pub fn sanitized_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for (i, ch) in name.chars().enumerate() {
        if ch.is_ascii_alphanumeric() || ch == '_' {
            if i == 0 && ch.is_ascii_digit() {
                out.push('_');
            }
            out.push(ch);
        } else {
            out.push('_');
        }
    }
    if out.is_empty() { "_".to_string() } else { out }
}

impl RecordType {
    pub fn matches_local(&self, local: &str) -> bool {
        self.name == local || self.name == sanitized_name(local)
    }

    pub fn matches(&self, qname: &QName) -> bool {
        self.matches_local(&qname.local) && self.namespace == qname.namespace
    }

    pub fn full_name(&self) -> String {
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}:{}", self.namespace, self.name)
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SchemaNode {
    Null,
    Boolean,
    Int,
    Long,
    Float,
    Double,
    Bytes,
    String,
    /// A string carrying an xs:QName value in Clark notation
    /// (`{namespace}local`). Same wire shape as a string; the transducer
    /// resolves prefixes on the way in and re-introduces them on the way
    /// out.
    Qname,
    Enum {
        name: String,
        symbols: Vec<String>,
    },
    Record(RecordType),
    Array {
        items: SchemaRef,
    },
    Map {
        values: SchemaRef,
    },
    Union {
        members: Vec<SchemaRef>,
    },
}

impl SchemaNode {
    pub fn type_name(&self) -> &'static str {
        match self {
            SchemaNode::Null => "null",
            SchemaNode::Boolean => "boolean",
            SchemaNode::Int => "int",
            SchemaNode::Long => "long",
            SchemaNode::Float => "float",
            SchemaNode::Double => "double",
            SchemaNode::Bytes => "bytes",
            SchemaNode::String => "string",
            SchemaNode::Qname => "qname",
            SchemaNode::Enum { .. } => "enum",
            SchemaNode::Record(_) => "record",
            SchemaNode::Array { .. } => "array",
            SchemaNode::Map { .. } => "map",
            SchemaNode::Union { .. } => "union",
        }
    }
}

/// The XSD linkage property the reader requires.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct XmlSchemasProp {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<String>,
    pub root_tag: RootTag,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RootTag {
    #[serde(default)]
    pub namespace: String,
    pub local_part: String,
}

impl RootTag {
    pub fn qname(&self) -> QName {
        QName::new(self.namespace.clone(), self.local_part.clone())
    }
}

/// A parsed record schema: node arena plus root handle.
#[derive(Debug, Clone, Default)]
pub struct RecordSchema {
    nodes: Vec<SchemaNode>,
    root: SchemaRef,
    pub xml_schemas: Option<XmlSchemasProp>,
}

impl RecordSchema {
    pub fn node(&self, r: SchemaRef) -> &SchemaNode {
        &self.nodes[r]
    }

    pub fn root(&self) -> SchemaRef {
        self.root
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn push(&mut self, node: SchemaNode) -> SchemaRef {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    pub fn set_root(&mut self, root: SchemaRef) {
        self.root = root;
    }

    pub fn node_mut(&mut self, r: SchemaRef) -> &mut SchemaNode {
        &mut self.nodes[r]
    }

    /// Union members of `r`; a non-union acts as a one-member union.
    pub fn union_members(&self, r: SchemaRef) -> Vec<SchemaRef> {
        match self.node(r) {
            SchemaNode::Union { members } => members.clone(),
            _ => vec![r],
        }
    }

    /// Find the union member whose record matches `qname`, with a
    /// local-name fallback. Returns (member index, member ref).
    pub fn find_member_record(&self, r: SchemaRef, qname: &QName) -> Option<(usize, SchemaRef)> {
        let members = self.union_members(r);
        let by_full = members.iter().enumerate().find(|&(_, &m)| {
            matches!(self.node(m), SchemaNode::Record(rec) if rec.matches(qname))
                || matches!(self.node(m), SchemaNode::Map { values }
                    if matches!(self.node(*values), SchemaNode::Record(rec) if rec.matches(qname)))
        });
        by_full
            .or_else(|| {
                members.iter().enumerate().find(|&(_, &m)| {
                    matches!(self.node(m), SchemaNode::Record(rec) if rec.matches_local(&qname.local))
                        || matches!(self.node(m), SchemaNode::Map { values }
                            if matches!(self.node(*values), SchemaNode::Record(rec) if rec.matches_local(&qname.local)))
                })
            })
            .map(|(i, &m)| (i, m))
    }

    /// The record behind `r`, unwrapping a map-of-record.
    pub fn record_of(&self, r: SchemaRef) -> Option<&RecordType> {
        match self.node(r) {
            SchemaNode::Record(rec) => Some(rec),
            SchemaNode::Map { values } => match self.node(*values) {
                SchemaNode::Record(rec) => Some(rec),
                _ => None,
            },
            _ => None,
        }
    }

    // ── JSON ────────────────────────────────────────────────────────────

    pub fn from_json_str(text: &str) -> Result<RecordSchema> {
        let value: Value = serde_json::from_str(text)?;
        RecordSchema::from_json(&value)
    }

    pub fn from_json(value: &Value) -> Result<RecordSchema> {
        let mut schema = RecordSchema::default();
        let mut named = HashMap::new();
        let root = schema.parse_value(value, &mut named)?;
        schema.root = root;
        if let Some(props) = value.get("xmlSchemas") {
            schema.xml_schemas = Some(serde_json::from_value(props.clone())?);
        }
        Ok(schema)
    }

    fn parse_value(
        &mut self,
        value: &Value,
        named: &mut HashMap<String, SchemaRef>,
    ) -> Result<SchemaRef> {
        match value {
            Value::String(s) => self.parse_type_name(s, named),
            Value::Array(members) => {
                let mut refs = Vec::with_capacity(members.len());
                for m in members {
                    refs.push(self.parse_value(m, named)?);
                }
                Ok(self.push(SchemaNode::Union { members: refs }))
            }
            Value::Object(obj) => self.parse_object(obj, named),
            other => Err(Error::Schema(format!("unexpected schema JSON: {}", other))),
        }
    }

    fn parse_type_name(
        &mut self,
        name: &str,
        named: &mut HashMap<String, SchemaRef>,
    ) -> Result<SchemaRef> {
        Ok(match name {
            "null" => self.push(SchemaNode::Null),
            "boolean" => self.push(SchemaNode::Boolean),
            "int" => self.push(SchemaNode::Int),
            "long" => self.push(SchemaNode::Long),
            "float" => self.push(SchemaNode::Float),
            "double" => self.push(SchemaNode::Double),
            "bytes" => self.push(SchemaNode::Bytes),
            "string" => self.push(SchemaNode::String),
            other => {
                return named
                    .get(other)
                    .copied()
                    .ok_or_else(|| Error::Schema(format!("unknown type name '{}'", other)));
            }
        })
    }

    fn parse_object(
        &mut self,
        obj: &Map<String, Value>,
        named: &mut HashMap<String, SchemaRef>,
    ) -> Result<SchemaRef> {
        let ty = obj
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Schema("schema object without type".into()))?;
        match ty {
            "string" if obj.get("logicalType").and_then(Value::as_str) == Some("xml-qname") => {
                Ok(self.push(SchemaNode::Qname))
            }
            "record" => {
                let name = obj
                    .get("name")
                    .and_then(Value::as_str)
                    .ok_or_else(|| Error::Schema("record without name".into()))?
                    .to_string();
                let namespace = obj
                    .get("namespace")
                    .and_then(Value::as_str)
                    .unwrap_or("")
                    .to_string();
                let rec = RecordType {
                    name: name.clone(),
                    namespace: namespace.clone(),
                    fields: Vec::new(),
                };
                let full = rec.full_name();
                // Insert before parsing fields so recursion resolves.
                let r = self.push(SchemaNode::Record(rec));
                named.insert(full, r);
                named.entry(name).or_insert(r);
                let mut fields = Vec::new();
                for f in obj
                    .get("fields")
                    .and_then(Value::as_array)
                    .ok_or_else(|| Error::Schema("record without fields".into()))?
                {
                    let fname = f
                        .get("name")
                        .and_then(Value::as_str)
                        .ok_or_else(|| Error::Schema("field without name".into()))?
                        .to_string();
                    let fschema = self.parse_value(
                        f.get("type")
                            .ok_or_else(|| Error::Schema("field without type".into()))?,
                        named,
                    )?;
                    fields.push(Field {
                        name: fname,
                        schema: fschema,
                        default: f.get("default").cloned(),
                    });
                }
                if let SchemaNode::Record(rec) = self.node_mut(r) {
                    rec.fields = fields;
                }
                Ok(r)
            }
            "enum" => {
                let name = obj
                    .get("name")
                    .and_then(Value::as_str)
                    .ok_or_else(|| Error::Schema("enum without name".into()))?
                    .to_string();
                let symbols = obj
                    .get("symbols")
                    .and_then(Value::as_array)
                    .ok_or_else(|| Error::Schema("enum without symbols".into()))?
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect();
                let r = self.push(SchemaNode::Enum {
                    name: name.clone(),
                    symbols,
                });
                named.insert(name, r);
                Ok(r)
            }
            "array" => {
                let items = self.parse_value(
                    obj.get("items")
                        .ok_or_else(|| Error::Schema("array without items".into()))?,
                    named,
                )?;
                Ok(self.push(SchemaNode::Array { items }))
            }
            "map" => {
                let values = self.parse_value(
                    obj.get("values")
                        .ok_or_else(|| Error::Schema("map without values".into()))?,
                    named,
                )?;
                Ok(self.push(SchemaNode::Map { values }))
            }
            primitive => self.parse_type_name(primitive, named),
        }
    }

    /// Render the schema as JSON, referencing named types after their first
    /// definition.
    pub fn to_json(&self) -> Value {
        let mut emitted = HashMap::new();
        let mut value = self.node_to_json(self.root, &mut emitted);
        if let (Some(props), Some(obj)) = (&self.xml_schemas, value.as_object_mut()) {
            obj.insert(
                "xmlSchemas".to_string(),
                serde_json::to_value(props).expect("xmlSchemas serializes"),
            );
        }
        value
    }

    fn node_to_json(&self, r: SchemaRef, emitted: &mut HashMap<String, SchemaRef>) -> Value {
        match self.node(r) {
            SchemaNode::Null => json!("null"),
            SchemaNode::Boolean => json!("boolean"),
            SchemaNode::Int => json!("int"),
            SchemaNode::Long => json!("long"),
            SchemaNode::Float => json!("float"),
            SchemaNode::Double => json!("double"),
            SchemaNode::Bytes => json!("bytes"),
            SchemaNode::String => json!("string"),
            SchemaNode::Qname => json!({ "type": "string", "logicalType": "xml-qname" }),
            SchemaNode::Enum { name, symbols } => {
                if emitted.contains_key(name) {
                    return json!(name);
                }
                emitted.insert(name.clone(), r);
                json!({ "type": "enum", "name": name, "symbols": symbols })
            }
            SchemaNode::Record(rec) => {
                let full = rec.full_name();
                if emitted.contains_key(&full) {
                    return json!(full);
                }
                emitted.insert(full, r);
                let fields: Vec<Value> = rec
                    .fields
                    .iter()
                    .map(|f| {
                        let mut obj = Map::new();
                        obj.insert("name".to_string(), json!(f.name));
                        obj.insert("type".to_string(), self.node_to_json(f.schema, emitted));
                        if let Some(d) = &f.default {
                            obj.insert("default".to_string(), d.clone());
                        }
                        Value::Object(obj)
                    })
                    .collect();
                let mut obj = Map::new();
                obj.insert("type".to_string(), json!("record"));
                obj.insert("name".to_string(), json!(rec.name));
                if !rec.namespace.is_empty() {
                    obj.insert("namespace".to_string(), json!(rec.namespace));
                }
                obj.insert("fields".to_string(), Value::Array(fields));
                Value::Object(obj)
            }
            SchemaNode::Array { items } => {
                json!({ "type": "array", "items": self.node_to_json(*items, emitted) })
            }
            SchemaNode::Map { values } => {
                json!({ "type": "map", "values": self.node_to_json(*values, emitted) })
            }
            SchemaNode::Union { members } => Value::Array(
                members
                    .iter()
                    .map(|&m| self.node_to_json(m, emitted))
                    .collect(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_record_with_union_and_array() {
        let schema = RecordSchema::from_json_str(
            r#"{
              "type": "record", "name": "root",
              "fields": [
                {"name": "id", "type": ["null", "string"]},
                {"name": "content", "type": {"type": "array", "items": "string"}}
              ]
            }"#,
        )
        .unwrap();
        let rec = match schema.node(schema.root()) {
            SchemaNode::Record(r) => r,
            other => panic!("expected record, got {:?}", other),
        };
        assert_eq!(rec.fields.len(), 2);
        assert!(matches!(
            schema.node(rec.fields[0].schema),
            SchemaNode::Union { .. }
        ));
    }

    #[test]
    fn named_reference_resolves_recursively() {
        let schema = RecordSchema::from_json_str(
            r#"{
              "type": "record", "name": "tree",
              "fields": [
                {"name": "content", "type": {"type": "array", "items": "tree"}}
              ]
            }"#,
        )
        .unwrap();
        let rec = match schema.node(schema.root()) {
            SchemaNode::Record(r) => r.clone(),
            other => panic!("expected record, got {:?}", other),
        };
        let items = match schema.node(rec.fields[0].schema) {
            SchemaNode::Array { items } => *items,
            other => panic!("expected array, got {:?}", other),
        };
        assert_eq!(items, schema.root());
    }

    #[test]
    fn xml_schemas_property_round_trips() {
        let schema = RecordSchema::from_json_str(
            r#"{
              "type": "record", "name": "root", "fields": [],
              "xmlSchemas": {"files": ["root.xsd"], "rootTag": {"namespace": "", "localPart": "root"}}
            }"#,
        )
        .unwrap();
        let props = schema.xml_schemas.clone().unwrap();
        assert_eq!(props.root_tag.qname(), QName::local("root"));
        let json = schema.to_json();
        let again = RecordSchema::from_json(&json).unwrap();
        assert_eq!(again.xml_schemas, schema.xml_schemas);
    }

    #[test]
    fn qname_logical_type_round_trips() {
        let schema = RecordSchema::from_json_str(
            r#"{
              "type": "record", "name": "r",
              "fields": [
                {"name": "content", "type": {"type": "string", "logicalType": "xml-qname"}}
              ]
            }"#,
        )
        .unwrap();
        let rec = match schema.node(schema.root()) {
            SchemaNode::Record(r) => r,
            other => panic!("expected record, got {:?}", other),
        };
        assert!(matches!(schema.node(rec.fields[0].schema), SchemaNode::Qname));
        let again = RecordSchema::from_json(&schema.to_json()).unwrap();
        let rec2 = match again.node(again.root()) {
            SchemaNode::Record(r) => r.clone(),
            other => panic!("expected record, got {:?}", other),
        };
        assert!(matches!(again.node(rec2.fields[0].schema), SchemaNode::Qname));
    }

    #[test]
    fn missing_linkage_is_none() {
        let schema =
            RecordSchema::from_json_str(r#"{"type":"record","name":"r","fields":[]}"#).unwrap();
        assert!(schema.xml_schemas.is_none());
    }
}
