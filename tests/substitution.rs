use anyhow::Result;
use xmlrec::record::{RootTag, SchemaNode};
use xmlrec::xml::parse_document;
use xmlrec::xsd::MemSchemaSource;
use xmlrec::{Transcoder, TranscoderConfig};

const SUBSTITUTION_XSD: &str = r#"
<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
  <xs:element name="root">
    <xs:complexType>
      <xs:sequence>
        <xs:element ref="record" maxOccurs="unbounded"/>
      </xs:sequence>
    </xs:complexType>
  </xs:element>
  <xs:element name="record">
    <xs:complexType>
      <xs:sequence>
        <xs:element name="value" type="xs:string" minOccurs="0"/>
      </xs:sequence>
      <xs:attribute name="id" type="xs:string"/>
    </xs:complexType>
  </xs:element>
  <xs:element name="firstMap" substitutionGroup="record">
    <xs:complexType>
      <xs:sequence>
        <xs:element name="value" type="xs:string" minOccurs="0"/>
      </xs:sequence>
      <xs:attribute name="id" type="xs:string"/>
    </xs:complexType>
  </xs:element>
  <xs:element name="secondMap" substitutionGroup="record">
    <xs:complexType>
      <xs:sequence>
        <xs:element name="value" type="xs:string" minOccurs="0"/>
      </xs:sequence>
      <xs:attribute name="id" type="xs:string"/>
    </xs:complexType>
  </xs:element>
</xs:schema>"#;

fn transcoder() -> Transcoder {
    let config = TranscoderConfig {
        sources: vec![SUBSTITUTION_XSD.to_string()],
        root_tag: RootTag {
            namespace: String::new(),
            local_part: "root".to_string(),
        },
        ..TranscoderConfig::default()
    };
    config
        .build_with_source(MemSchemaSource::new())
        .expect("build transcoder")
}

#[test]
fn substitute_carries_its_own_union_tag() -> Result<()> {
    let t = transcoder();
    let head = t.encode(r#"<root><record id="x"><value/></record></root>"#)?;
    let first = t.encode(r#"<root><firstMap id="x"><value/></firstMap></root>"#)?;
    let second = t.encode(r#"<root><secondMap id="x"><value/></secondMap></root>"#)?;
    // Identical payloads, distinguished only by the union tag of the item.
    assert_ne!(head, first);
    assert_ne!(first, second);
    assert_eq!(head[1], 0x00);
    assert_eq!(first[1], 0x02);
    assert_eq!(second[1], 0x04);
    Ok(())
}

#[test]
fn substitutes_round_trip() -> Result<()> {
    let t = transcoder();
    let xml = r#"<root><firstMap id="a"><value>v</value></firstMap><secondMap id="b"/><record id="c"/></root>"#;
    let decoded = t.decode(&t.encode(xml)?)?;
    assert_eq!(parse_document(xml)?, parse_document(&decoded)?);
    Ok(())
}

#[test]
fn generated_schema_lists_every_member() {
    let t = transcoder();
    let schema = t.schema();
    let root = match schema.node(schema.root()) {
        SchemaNode::Record(r) => r.clone(),
        other => panic!("expected record, got {:?}", other),
    };
    let content = root.fields.last().expect("content field");
    let items = match schema.node(content.schema) {
        SchemaNode::Array { items } => *items,
        other => panic!("expected array content, got {:?}", other),
    };
    let names: Vec<String> = schema
        .union_members(items)
        .iter()
        .filter_map(|&m| match schema.node(m) {
            SchemaNode::Record(r) => Some(r.name.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(names, vec!["record", "firstMap", "secondMap"]);
}
