use anyhow::Result;
use xmlrec::record::RootTag;
use xmlrec::xml::parse_document;
use xmlrec::xsd::MemSchemaSource;
use xmlrec::{Transcoder, TranscoderConfig};

fn transcoder(xsd: &str, root: &str) -> Transcoder {
    let config = TranscoderConfig {
        sources: vec![xsd.to_string()],
        root_tag: RootTag {
            namespace: String::new(),
            local_part: root.to_string(),
        },
        ..TranscoderConfig::default()
    };
    config
        .build_with_source(MemSchemaSource::new())
        .expect("build transcoder")
}

/// Two choice branches share a prefix of admissible elements; only the
/// longer branch admits the whole document, so the finder must abandon the
/// first branch mid-way.
const BACKTRACK_XSD: &str = r#"
<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
  <xs:element name="root">
    <xs:complexType>
      <xs:choice>
        <xs:sequence>
          <xs:element name="first" type="xs:string"/>
          <xs:element name="second" type="xs:string"/>
        </xs:sequence>
        <xs:sequence>
          <xs:element name="first" type="xs:string"/>
          <xs:element name="second" type="xs:string"/>
          <xs:element name="third" type="xs:unsignedLong"/>
          <xs:element name="fourth" type="xs:string" minOccurs="0"/>
        </xs:sequence>
      </xs:choice>
    </xs:complexType>
  </xs:element>
</xs:schema>"#;

#[test]
fn longer_choice_branch_wins_after_backtracking() -> Result<()> {
    let t = transcoder(BACKTRACK_XSD, "root");
    let xml = "<root><first>a</first><second>b</second><third>9</third><fourth>c</fourth></root>";
    let bytes = t.encode(xml)?;
    let decoded = t.decode(&bytes)?;
    assert_eq!(parse_document(xml)?, parse_document(&decoded)?);
    Ok(())
}

#[test]
fn short_branch_still_matches_short_documents() -> Result<()> {
    let t = transcoder(BACKTRACK_XSD, "root");
    let xml = "<root><first>a</first><second>b</second></root>";
    let bytes = t.encode(xml)?;
    let decoded = t.decode(&bytes)?;
    assert_eq!(parse_document(xml)?, parse_document(&decoded)?);
    Ok(())
}

#[test]
fn no_branch_admits_the_document() {
    let t = transcoder(BACKTRACK_XSD, "root");
    // `third` without `second` fits neither branch.
    let err = t
        .encode("<root><first>a</first><third>9</third></root>")
        .unwrap_err();
    assert!(matches!(err, xmlrec::Error::NoPathMatches(_)), "{}", err);
}

#[test]
fn choice_between_single_elements() -> Result<()> {
    let t = transcoder(
        r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
             <xs:element name="root">
               <xs:complexType>
                 <xs:choice maxOccurs="unbounded">
                   <xs:element name="a" type="xs:string"/>
                   <xs:element name="b" type="xs:int"/>
                 </xs:choice>
               </xs:complexType>
             </xs:element>
           </xs:schema>"#,
        "root",
    );
    let xml = "<root><b>1</b><a>x</a><b>2</b></root>";
    let decoded = t.decode(&t.encode(xml)?)?;
    assert_eq!(parse_document(xml)?, parse_document(&decoded)?);
    Ok(())
}

#[test]
fn missing_required_child_fails() {
    let t = transcoder(
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
    let err = t.encode("<root><a>hi</a></root>").unwrap_err();
    assert!(matches!(err, xmlrec::Error::NoPathMatches(_)), "{}", err);
}

/// The two branches share their leading elements and only the longer
/// sequence branch carries the trailing list-typed elements.
#[test]
fn shared_prefix_with_list_typed_tail() -> Result<()> {
    let t = transcoder(
        r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
             <xs:element name="root">
               <xs:complexType>
                 <xs:choice>
                   <xs:sequence>
                     <xs:element name="kind" type="xs:string"/>
                     <xs:element name="label" type="xs:string" maxOccurs="2"/>
                   </xs:sequence>
                   <xs:sequence>
                     <xs:element name="kind" type="xs:string"/>
                     <xs:element name="label" type="xs:string" maxOccurs="2"/>
                     <xs:element name="unsignedLongList">
                       <xs:simpleType>
                         <xs:list itemType="xs:unsignedLong"/>
                       </xs:simpleType>
                     </xs:element>
                     <xs:element name="listOfUnion">
                       <xs:simpleType>
                         <xs:list>
                           <xs:simpleType>
                             <xs:union memberTypes="xs:int xs:string"/>
                           </xs:simpleType>
                         </xs:list>
                       </xs:simpleType>
                     </xs:element>
                   </xs:sequence>
                 </xs:choice>
               </xs:complexType>
             </xs:element>
           </xs:schema>"#,
        "root",
    );
    let xml = "<root><kind>k</kind><label>a</label><label>b</label>\
               <unsignedLongList>1 2 3</unsignedLongList>\
               <listOfUnion>7 eight 9</listOfUnion></root>";
    let bytes = t.encode(xml)?;
    let decoded = t.decode(&bytes)?;
    assert!(decoded.contains("1 2 3"), "{}", decoded);
    assert!(decoded.contains("7 eight 9"), "{}", decoded);
    // Byte-stable once canonicalized.
    assert_eq!(bytes, t.encode(&decoded)?);
    Ok(())
}

#[test]
fn all_group_accepts_any_order() -> Result<()> {
    let t = transcoder(
        r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
             <xs:element name="root">
               <xs:complexType>
                 <xs:all>
                   <xs:element name="x" type="xs:string"/>
                   <xs:element name="y" type="xs:int"/>
                 </xs:all>
               </xs:complexType>
             </xs:element>
           </xs:schema>"#,
        "root",
    );
    for xml in [
        "<root><x>s</x><y>1</y></root>",
        "<root><y>1</y><x>s</x></root>",
    ] {
        let decoded = t.decode(&t.encode(xml)?)?;
        assert_eq!(parse_document(xml)?, parse_document(&decoded)?);
    }
    let err = t.encode("<root><y>1</y></root>").unwrap_err();
    assert!(matches!(err, xmlrec::Error::NoPathMatches(_)), "{}", err);
    Ok(())
}
