use anyhow::Result;
use xmlrec::record::RootTag;
use xmlrec::xml::parse_document;
use xmlrec::xsd::MemSchemaSource;
use xmlrec::{Transcoder, TranscoderConfig};

const MIXED_XSD: &str = r#"
<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
  <xs:element name="note" type="mixedType"/>
  <xs:complexType name="mixedType" mixed="true">
    <xs:sequence>
      <xs:element name="em" type="xs:string" minOccurs="0" maxOccurs="unbounded"/>
      <xs:element name="count" type="xs:unsignedLong" minOccurs="0"/>
    </xs:sequence>
  </xs:complexType>
</xs:schema>"#;

fn transcoder() -> Transcoder {
    let config = TranscoderConfig {
        sources: vec![MIXED_XSD.to_string()],
        root_tag: RootTag {
            namespace: String::new(),
            local_part: "note".to_string(),
        },
        ..TranscoderConfig::default()
    };
    config
        .build_with_source(MemSchemaSource::new())
        .expect("build transcoder")
}

#[test]
fn interleaved_text_and_children_stay_ordered() -> Result<()> {
    let t = transcoder();
    let xml = "<note>hello <em>world</em> and <em>again</em><count>2</count></note>";
    let decoded = t.decode(&t.encode(xml)?)?;
    assert_eq!(parse_document(xml)?, parse_document(&decoded)?);
    Ok(())
}

#[test]
fn text_only_mixed_content() -> Result<()> {
    let t = transcoder();
    let xml = "<note>just text</note>";
    let decoded = t.decode(&t.encode(xml)?)?;
    assert_eq!(parse_document(xml)?, parse_document(&decoded)?);
    Ok(())
}

#[test]
fn text_chunks_become_string_items() -> Result<()> {
    let t = transcoder();
    // 2 text chunks + 2 elements = 4 items.
    let bytes = t.encode("<note>a<em>b</em>c<em>d</em></note>")?;
    assert_eq!(bytes[0], 0x08, "expected item count 4 in {:?}", bytes);
    Ok(())
}

#[test]
fn binary_round_trip_is_byte_stable() -> Result<()> {
    let t = transcoder();
    let xml = "<note>x<em>y</em>z</note>";
    let bytes = t.encode(xml)?;
    let bytes2 = t.encode(&t.decode(&bytes)?)?;
    assert_eq!(bytes, bytes2);
    Ok(())
}
