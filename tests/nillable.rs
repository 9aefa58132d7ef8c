use anyhow::Result;
use xmlrec::record::RootTag;
use xmlrec::xsd::MemSchemaSource;
use xmlrec::{Transcoder, TranscoderConfig};

const NILLABLE_XSD: &str = r#"
<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
  <xs:element name="doc">
    <xs:complexType>
      <xs:sequence>
        <xs:element name="defaulted" type="xs:string" default="hello" nillable="true"/>
        <xs:element name="strict" type="xs:string" minOccurs="0"/>
      </xs:sequence>
    </xs:complexType>
  </xs:element>
</xs:schema>"#;

fn transcoder() -> Transcoder {
    let config = TranscoderConfig {
        sources: vec![NILLABLE_XSD.to_string()],
        root_tag: RootTag {
            namespace: String::new(),
            local_part: "doc".to_string(),
        },
        ..TranscoderConfig::default()
    };
    config
        .build_with_source(MemSchemaSource::new())
        .expect("build transcoder")
}

const XSI: &str = r#"xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance""#;

#[test]
fn nil_writes_the_null_member() -> Result<()> {
    let t = transcoder();
    let xml = format!(r#"<doc><defaulted {} xsi:nil="true"/></doc>"#, XSI);
    let bytes = t.encode(&xml)?;
    // item count 1, union tag 0 (defaulted), then content tag 0 = null.
    assert_eq!(&bytes[..3], &[0x02, 0x00, 0x00]);
    Ok(())
}

#[test]
fn empty_element_falls_back_to_the_default() -> Result<()> {
    let t = transcoder();
    let bytes = t.encode("<doc><defaulted/></doc>")?;
    let decoded = t.decode(&bytes)?;
    assert!(decoded.contains(">hello<"), "{}", decoded);
    Ok(())
}

#[test]
fn explicit_content_overrides_the_default() -> Result<()> {
    let t = transcoder();
    let bytes = t.encode("<doc><defaulted>bye</defaulted></doc>")?;
    let decoded = t.decode(&bytes)?;
    assert!(decoded.contains(">bye<"), "{}", decoded);
    assert!(!decoded.contains("hello"), "{}", decoded);
    Ok(())
}

#[test]
fn nil_on_non_nillable_element_is_rejected() {
    let t = transcoder();
    let xml = format!(
        r#"<doc><defaulted/><strict {} xsi:nil="true"/></doc>"#,
        XSI
    );
    let err = t.encode(&xml).unwrap_err();
    assert!(
        matches!(err, xmlrec::Error::NilabilityConflict(_)),
        "{}",
        err
    );
}

#[test]
fn nil_produces_no_character_content() -> Result<()> {
    let t = transcoder();
    let xml = format!(r#"<doc><defaulted {} xsi:nil="true"/></doc>"#, XSI);
    let decoded = t.decode(&t.encode(&xml)?)?;
    // The nil occurrence decodes as an empty element, not as "hello".
    assert!(!decoded.contains("hello"), "{}", decoded);
    Ok(())
}
