use anyhow::Result;
use xmlrec::record::{RootTag, SchemaNode};
use xmlrec::xml::{XmlEvent, parse_document};
use xmlrec::xsd::MemSchemaSource;
use xmlrec::{Transcoder, TranscoderConfig};

const QNAME_XSD: &str = r#"
<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
  <xs:element name="field">
    <xs:complexType>
      <xs:simpleContent>
        <xs:extension base="xs:QName">
          <xs:attribute name="ref" type="xs:QName"/>
        </xs:extension>
      </xs:simpleContent>
    </xs:complexType>
  </xs:element>
</xs:schema>"#;

fn transcoder() -> Transcoder {
    let config = TranscoderConfig {
        sources: vec![QNAME_XSD.to_string()],
        root_tag: RootTag {
            namespace: String::new(),
            local_part: "field".to_string(),
        },
        ..TranscoderConfig::default()
    };
    config
        .build_with_source(MemSchemaSource::new())
        .expect("build transcoder")
}

#[test]
fn generated_schema_marks_qname_content() {
    let t = transcoder();
    let schema = t.schema();
    let rec = match schema.node(schema.root()) {
        SchemaNode::Record(r) => r.clone(),
        other => panic!("expected record, got {:?}", other),
    };
    let content = rec.fields.last().expect("content field");
    assert!(matches!(schema.node(content.schema), SchemaNode::Qname));
}

/// QName values serialize in Clark notation, resolved against the prefixes
/// in scope where the value appears.
#[test]
fn qname_values_resolve_to_clark_notation() -> Result<()> {
    let t = transcoder();
    let xml = r#"<field xmlns:m="urn:models" ref="m:other">m:thing</field>"#;
    let bytes = t.encode(xml)?;
    let payload = String::from_utf8_lossy(&bytes);
    assert!(payload.contains("{urn:models}other"), "{}", payload);
    assert!(payload.contains("{urn:models}thing"), "{}", payload);
    Ok(())
}

/// The reader introduces a fresh prefix for the QName's namespace before
/// start_element, so the decoded document resolves to the same names.
#[test]
fn reader_reintroduces_a_prefix_for_qname_content() -> Result<()> {
    let t = transcoder();
    let xml = r#"<field xmlns:m="urn:models" ref="m:other">m:thing</field>"#;
    let bytes = t.encode(xml)?;
    let decoded = t.decode(&bytes)?;

    let events = parse_document(&decoded)?;
    let mapped = events.iter().any(|e| {
        matches!(e, XmlEvent::StartPrefixMapping { uri, .. } if uri == "urn:models")
    });
    assert!(mapped, "no prefix mapping in {}", decoded);
    // The re-read document resolves both QName values to the same names,
    // so re-encoding is byte-identical.
    assert_eq!(bytes, t.encode(&decoded)?);
    Ok(())
}

#[test]
fn unprefixed_qname_without_default_namespace_stays_local() -> Result<()> {
    let t = transcoder();
    let bytes = t.encode("<field>plain</field>")?;
    let decoded = t.decode(&bytes)?;
    assert!(decoded.contains(">plain<"), "{}", decoded);
    assert_eq!(bytes, t.encode(&decoded)?);
    Ok(())
}

#[test]
fn undeclared_prefix_is_unwritable() {
    let t = transcoder();
    let err = t.encode("<field>nowhere:thing</field>").unwrap_err();
    assert!(matches!(err, xmlrec::Error::UnwritableValue { .. }), "{}", err);
}
