use anyhow::Result;
use camino::Utf8PathBuf;
use std::io::Write as _;
use xmlrec::record::{RecordSchema, RootTag};
use xmlrec::{Transcoder, TranscoderConfig};

/// End-to-end through the filesystem source, the way the CLI drives it.
#[test]
fn builds_from_schema_files_on_disk() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let main = dir.path().join("main.xsd");
    let extra = dir.path().join("types.xsd");
    std::fs::write(
        &main,
        r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
             <xs:include schemaLocation="types.xsd"/>
             <xs:element name="root">
               <xs:complexType>
                 <xs:sequence>
                   <xs:element name="v" type="speed"/>
                 </xs:sequence>
               </xs:complexType>
             </xs:element>
           </xs:schema>"#,
    )?;
    std::fs::write(
        &extra,
        r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
             <xs:simpleType name="speed">
               <xs:restriction base="xs:int">
                 <xs:maxInclusive value="300"/>
               </xs:restriction>
             </xs:simpleType>
           </xs:schema>"#,
    )?;

    let config = TranscoderConfig {
        schema_files: vec![Utf8PathBuf::from_path_buf(main).expect("utf-8 temp path")],
        root_tag: RootTag {
            namespace: String::new(),
            local_part: "root".to_string(),
        },
        ..TranscoderConfig::default()
    };
    let t: Transcoder = config.build()?;

    let bytes = t.encode("<root><v>250</v></root>")?;
    assert!(!bytes.is_empty());
    // The included restriction participates in literal checking.
    let err = t.encode("<root><v>500</v></root>").unwrap_err();
    assert!(matches!(err, xmlrec::Error::UnwritableValue { .. }), "{}", err);
    Ok(())
}

#[test]
fn generated_schema_survives_a_json_round_trip() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let xsd = dir.path().join("doc.xsd");
    std::fs::write(
        &xsd,
        r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
             <xs:element name="doc">
               <xs:complexType>
                 <xs:sequence>
                   <xs:element name="v" type="xs:string"/>
                 </xs:sequence>
               </xs:complexType>
             </xs:element>
           </xs:schema>"#,
    )?;
    let config = TranscoderConfig {
        schema_files: vec![Utf8PathBuf::from_path_buf(xsd).expect("utf-8 temp path")],
        root_tag: RootTag {
            namespace: String::new(),
            local_part: "doc".to_string(),
        },
        ..TranscoderConfig::default()
    };
    let t = config.build()?;

    // Dump the generated schema, reload it, and decode with the reload.
    let mut file = tempfile::NamedTempFile::new()?;
    write!(file, "{}", serde_json::to_string_pretty(&t.schema().to_json())?)?;
    let reloaded = RecordSchema::from_json_str(&std::fs::read_to_string(file.path())?)?;
    assert!(reloaded.xml_schemas.is_some());

    let bytes = t.encode("<doc><v>hi</v></doc>")?;
    let mut sink = xmlrec::xml::XmlTextSink::new();
    xmlrec::transducer::read_binary(&reloaded, bytes.as_slice(), &mut sink)?;
    assert!(sink.into_string().contains(">hi<"));
    Ok(())
}
