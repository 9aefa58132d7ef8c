use anyhow::Result;
use xmlrec::record::{RecordSchema, RootTag};
use xmlrec::xml::parse_document;
use xmlrec::xsd::MemSchemaSource;
use xmlrec::{Transcoder, TranscoderConfig};

const XSD: &str = r#"
<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
  <xs:element name="table">
    <xs:complexType>
      <xs:sequence>
        <xs:element name="entry" minOccurs="0" maxOccurs="unbounded">
          <xs:complexType>
            <xs:simpleContent>
              <xs:extension base="xs:string">
                <xs:attribute name="id" type="xs:string" use="required"/>
              </xs:extension>
            </xs:simpleContent>
          </xs:complexType>
        </xs:element>
      </xs:sequence>
    </xs:complexType>
  </xs:element>
</xs:schema>"#;

/// Caller-supplied record schema mapping `entry` children onto a MAP keyed
/// by their ID attribute.
const MAP_SCHEMA: &str = r#"{
  "type": "record", "name": "table",
  "fields": [
    {"name": "content", "type": {"type": "map", "values": {
      "type": "record", "name": "entry",
      "fields": [
        {"name": "id", "type": "string"},
        {"name": "content", "type": "string"}
      ]
    }}}
  ],
  "xmlSchemas": {"files": ["table.xsd"], "rootTag": {"namespace": "", "localPart": "table"}}
}"#;

fn transcoder() -> Transcoder {
    let config = TranscoderConfig {
        sources: vec![XSD.to_string()],
        root_tag: RootTag {
            namespace: String::new(),
            local_part: "table".to_string(),
        },
        ..TranscoderConfig::default()
    };
    let schema = RecordSchema::from_json_str(MAP_SCHEMA).expect("map schema");
    config
        .build_with_record_schema(MemSchemaSource::new(), schema)
        .expect("build transcoder")
}

#[test]
fn map_entries_are_keyed_by_id() -> Result<()> {
    let t = transcoder();
    let xml = r#"<table><entry id="k1">v1</entry><entry id="k2">v2</entry></table>"#;
    let bytes = t.encode(xml)?;
    // Block count 2, then "k1" appears as the first key.
    assert_eq!(bytes[0], 0x04);
    assert_eq!(&bytes[2..4], b"k1");
    let decoded = t.decode(&bytes)?;
    assert_eq!(parse_document(xml)?, parse_document(&decoded)?);
    Ok(())
}

#[test]
fn map_without_id_attribute_is_a_mismatch() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let config = TranscoderConfig {
        sources: vec![
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
                 <xs:element name="table">
                   <xs:complexType>
                     <xs:sequence>
                       <xs:element name="entry" type="xs:string"
                                   minOccurs="0" maxOccurs="unbounded"/>
                     </xs:sequence>
                   </xs:complexType>
                 </xs:element>
               </xs:schema>"#
                .to_string(),
        ],
        root_tag: RootTag {
            namespace: String::new(),
            local_part: "table".to_string(),
        },
        ..TranscoderConfig::default()
    };
    let schema = RecordSchema::from_json_str(
        r#"{
          "type": "record", "name": "table",
          "fields": [
            {"name": "content", "type": {"type": "map", "values": {
              "type": "record", "name": "entry",
              "fields": [{"name": "content", "type": "string"}]
            }}}
          ],
          "xmlSchemas": {"files": [], "rootTag": {"namespace": "", "localPart": "table"}}
        }"#,
    )
    .unwrap();
    let t = config
        .build_with_record_schema(MemSchemaSource::new(), schema)
        .unwrap();
    let err = t.encode("<table><entry>v</entry></table>").unwrap_err();
    assert!(
        matches!(err, xmlrec::Error::RecordSchemaMismatch { .. }),
        "{}",
        err
    );
}
