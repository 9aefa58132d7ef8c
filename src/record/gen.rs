//! Default record schema derived from a state machine.
//!
//! Every element becomes a record: one field per attribute in declaration
//! order, then a final `content` field. Simple content maps to the matching
//! primitive (nillable content wraps it in `[null, T]`), complex content
//! maps to an array of the child records (a union when several child
//! elements are possible, with `string` appended for mixed content), and
//! childless non-mixed content maps to `null`. Enumeration facets whose
//! symbols are all name-safe become enums.

use crate::error::Result;
use crate::machine::{StateKind, StateMachine, StateRef};
use crate::qname::QName;
use crate::record::{Field, RecordSchema, RecordType, SchemaNode, SchemaRef, sanitized_name};
use crate::simpletype::{BaseSimpleType, SimpleTypeInfo};
use crate::xsd::AttrUseKind;
use serde_json::Value;
use std::collections::{HashMap, HashSet};

/// Generate the default record schema for a compiled state machine.
pub fn generate(machine: &StateMachine) -> Result<RecordSchema> {
    let mut g = Gen {
        machine,
        schema: RecordSchema::default(),
        by_element: HashMap::new(),
    };
    let root = g.element_record(machine.start())?;
    g.schema.set_root(root);
    Ok(g.schema)
}

struct Gen<'a> {
    machine: &'a StateMachine,
    schema: RecordSchema,
    by_element: HashMap<QName, SchemaRef>,
}

impl<'a> Gen<'a> {
    fn element_record(&mut self, state: StateRef) -> Result<SchemaRef> {
        let es = self
            .machine
            .element(state)
            .expect("element record for non-element state")
            .clone();
        if let Some(&r) = self.by_element.get(&es.qname) {
            return Ok(r);
        }
        // Register the record before building fields so recursive schemas
        // link back to it.
        let r = self.schema.push(SchemaNode::Record(RecordType {
            name: sanitized_name(&es.qname.local),
            namespace: es.qname.namespace.clone(),
            fields: Vec::new(),
        }));
        self.by_element.insert(es.qname.clone(), r);

        let mut fields = Vec::new();
        let mut used = HashSet::new();
        used.insert("content".to_string());
        for attr in &es.attributes {
            if attr.use_kind == AttrUseKind::Prohibited {
                continue;
            }
            let mut name = sanitized_name(&attr.name.local);
            while !used.insert(name.clone()) {
                name.push('_');
            }
            let value = self.simple_schema(&attr.type_info, &format!("{}_{}", es.qname.local, name))?;
            let (schema, default) = if attr.use_kind == AttrUseKind::Required {
                (value, None)
            } else {
                let null = self.schema.push(SchemaNode::Null);
                (
                    self.schema.push(SchemaNode::Union {
                        members: vec![null, value],
                    }),
                    Some(Value::Null),
                )
            };
            fields.push(Field {
                name,
                schema,
                default,
            });
        }

        let content = self.content_schema(state, &es.qname, &es.type_info, es.nillable)?;
        fields.push(Field {
            name: "content".to_string(),
            schema: content,
            default: None,
        });

        if let SchemaNode::Record(rec) = self.schema.node_mut(r) {
            rec.fields = fields;
        }
        Ok(r)
    }

    fn content_schema(
        &mut self,
        state: StateRef,
        qname: &QName,
        info: &SimpleTypeInfo,
        nillable: bool,
    ) -> Result<SchemaRef> {
        if !info.is_complex() {
            let value = self.simple_schema(info, &qname.local)?;
            return Ok(if nillable {
                let null = self.schema.push(SchemaNode::Null);
                self.schema.push(SchemaNode::Union {
                    members: vec![null, value],
                })
            } else {
                value
            });
        }

        let mut children = Vec::new();
        let mut seen = HashSet::new();
        self.collect_child_elements(state, &mut children, &mut seen);
        let mixed = info.is_mixed();

        if children.is_empty() && !mixed {
            return Ok(self.schema.push(SchemaNode::Null));
        }

        let mut members = Vec::with_capacity(children.len() + 1);
        for child in &children {
            members.push(self.element_record(*child)?);
        }
        if mixed {
            members.push(self.schema.push(SchemaNode::String));
        }
        let items = if members.len() == 1 {
            members[0]
        } else {
            self.schema.push(SchemaNode::Union { members })
        };
        Ok(self.schema.push(SchemaNode::Array { items }))
    }

    /// Element states reachable from `state` without crossing another
    /// element; group nesting flattens away.
    fn collect_child_elements(
        &self,
        state: StateRef,
        out: &mut Vec<StateRef>,
        seen: &mut HashSet<StateRef>,
    ) {
        for edge in &self.machine.node(state).next {
            let target = edge.target;
            match &self.machine.node(target).kind {
                StateKind::Element(_) => {
                    if seen.insert(target) {
                        out.push(target);
                    }
                }
                StateKind::Any { .. } => {
                    // Wildcard content carries no record structure.
                }
                _ => self.collect_child_elements(target, out, seen),
            }
        }
    }

    fn simple_schema(&mut self, info: &SimpleTypeInfo, name_hint: &str) -> Result<SchemaRef> {
        Ok(match info {
            SimpleTypeInfo::Atomic { base, facets, user_recognized } => {
                let symbols = facets.enumeration();
                if !symbols.is_empty() && symbols.iter().all(|s| is_name_safe(s)) {
                    let name = user_recognized
                        .as_ref()
                        .map(|q| sanitized_name(&q.local))
                        .unwrap_or_else(|| sanitized_name(name_hint));
                    self.schema.push(SchemaNode::Enum {
                        name,
                        symbols: symbols.to_vec(),
                    })
                } else {
                    let node = match base {
                        BaseSimpleType::Boolean => SchemaNode::Boolean,
                        BaseSimpleType::Float => SchemaNode::Float,
                        BaseSimpleType::Double | BaseSimpleType::Decimal => SchemaNode::Double,
                        BaseSimpleType::HexBinary | BaseSimpleType::Base64Binary => {
                            SchemaNode::Bytes
                        }
                        BaseSimpleType::QName => SchemaNode::Qname,
                        b if b.fits_int() => SchemaNode::Int,
                        b if b.is_integer() => SchemaNode::Long,
                        _ => SchemaNode::String,
                    };
                    self.schema.push(node)
                }
            }
            SimpleTypeInfo::List { item, .. } => {
                let items = self.simple_schema(item, name_hint)?;
                self.schema.push(SchemaNode::Array { items })
            }
            SimpleTypeInfo::Union { members, .. } => {
                let mut refs = Vec::new();
                let mut seen_kinds = HashSet::new();
                for (i, m) in members.iter().enumerate() {
                    let r = self.simple_schema(m, &format!("{}_{}", name_hint, i))?;
                    // A union cannot repeat an unnamed kind; named types are
                    // distinguished by their name.
                    let key = match self.schema.node(r) {
                        SchemaNode::Enum { name, .. } => format!("enum:{}", name),
                        other => other.type_name().to_string(),
                    };
                    if seen_kinds.insert(key) {
                        refs.push(r);
                    }
                }
                if refs.len() == 1 {
                    refs[0]
                } else {
                    self.schema.push(SchemaNode::Union { members: refs })
                }
            }
            SimpleTypeInfo::Complex { .. } => self.schema.push(SchemaNode::String),
        })
    }
}

fn is_name_safe(s: &str) -> bool {
    !s.is_empty()
        && s.chars().next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xsd::{MemSchemaSource, SchemaLoader, SchemaSet};

    fn schema_for(xsd: &str, root: &str) -> RecordSchema {
        let mut source = MemSchemaSource::new();
        source.insert("t.xsd", xsd);
        let mut set = SchemaSet::default();
        SchemaLoader::new(source).load(&mut set, "t.xsd").unwrap();
        let machine = StateMachine::build(&set, &QName::local(root)).unwrap();
        generate(&machine).unwrap()
    }

    #[test]
    fn childless_type_gets_null_content() {
        let s = schema_for(
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
                 <xs:element name="root"><xs:complexType/></xs:element>
               </xs:schema>"#,
            "root",
        );
        let rec = match s.node(s.root()) {
            SchemaNode::Record(r) => r,
            other => panic!("expected record, got {:?}", other),
        };
        assert_eq!(rec.fields.len(), 1);
        assert_eq!(rec.fields[0].name, "content");
        assert!(matches!(s.node(rec.fields[0].schema), SchemaNode::Null));
    }

    #[test]
    fn sequence_children_become_array_of_union() {
        let s = schema_for(
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
                 <xs:element name="root">
                   <xs:complexType>
                     <xs:sequence>
                       <xs:element name="a" type="xs:string"/>
                       <xs:element name="b" type="xs:int"/>
                     </xs:sequence>
                   </xs:complexType>
                 </xs:element>
               </xs:schema>"#,
            "root",
        );
        let rec = match s.node(s.root()) {
            SchemaNode::Record(r) => r,
            other => panic!("expected record, got {:?}", other),
        };
        let items = match s.node(rec.fields[0].schema) {
            SchemaNode::Array { items } => *items,
            other => panic!("expected array content, got {:?}", other),
        };
        let members = s.union_members(items);
        assert_eq!(members.len(), 2);
        assert!(matches!(s.node(members[0]), SchemaNode::Record(r) if r.name == "a"));
        assert!(matches!(s.node(members[1]), SchemaNode::Record(r) if r.name == "b"));
    }

    #[test]
    fn attributes_come_before_content() {
        let s = schema_for(
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
                 <xs:element name="item">
                   <xs:complexType>
                     <xs:simpleContent>
                       <xs:extension base="xs:string">
                         <xs:attribute name="id" type="xs:int" use="required"/>
                         <xs:attribute name="note" type="xs:string"/>
                       </xs:extension>
                     </xs:simpleContent>
                   </xs:complexType>
                 </xs:element>
               </xs:schema>"#,
            "item",
        );
        let rec = match s.node(s.root()) {
            SchemaNode::Record(r) => r,
            other => panic!("expected record, got {:?}", other),
        };
        let names: Vec<&str> = rec.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["id", "note", "content"]);
        assert!(matches!(s.node(rec.fields[0].schema), SchemaNode::Int));
        // Optional attribute is nullable.
        assert!(matches!(s.node(rec.fields[1].schema), SchemaNode::Union { .. }));
    }

    #[test]
    fn enumeration_becomes_enum() {
        let s = schema_for(
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
                 <xs:element name="color">
                   <xs:simpleType>
                     <xs:restriction base="xs:string">
                       <xs:enumeration value="red"/>
                       <xs:enumeration value="green"/>
                     </xs:restriction>
                   </xs:simpleType>
                 </xs:element>
               </xs:schema>"#,
            "color",
        );
        let rec = match s.node(s.root()) {
            SchemaNode::Record(r) => r,
            other => panic!("expected record, got {:?}", other),
        };
        match s.node(rec.fields[0].schema) {
            SchemaNode::Enum { symbols, .. } => {
                assert_eq!(symbols, &vec!["red".to_string(), "green".to_string()]);
            }
            other => panic!("expected enum, got {:?}", other),
        }
    }
}
