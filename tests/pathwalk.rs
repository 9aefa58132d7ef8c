use anyhow::Result;
use xmlrec::doctree::{Direction, NodePool};
use xmlrec::machine::StateMachine;
use xmlrec::pathfinder::PathFinder;
use xmlrec::qname::QName;
use xmlrec::xml::parse_document;
use xmlrec::xsd::{MemSchemaSource, SchemaLoader, SchemaSet};

fn machine(xsd: &str, root: &str) -> StateMachine {
    let mut source = MemSchemaSource::new();
    source.insert("t.xsd", xsd);
    let mut set = SchemaSet::default();
    SchemaLoader::new(source).load(&mut set, "t.xsd").unwrap();
    StateMachine::build(&set, &QName::local(root)).unwrap()
}

const XSD: &str = r#"
<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
  <xs:element name="root">
    <xs:complexType>
      <xs:sequence>
        <xs:element name="a" type="xs:string" maxOccurs="unbounded"/>
        <xs:element name="b" type="xs:int" minOccurs="0"/>
      </xs:sequence>
    </xs:complexType>
  </xs:element>
</xs:schema>"#;

/// Path well-formedness: CHILD edges follow the recorded edge index,
/// SIBLING repeats the same state one iteration later, PARENT steps to the
/// document parent. CONTENT nodes are transparent for the SIBLING/PARENT
/// rules.
#[test]
fn path_chain_is_well_formed() -> Result<()> {
    let m = machine(XSD, "root");
    let mut pool = NodePool::new();
    let events = parse_document("<root><a>x</a><a>y</a><b>3</b></root>")?;
    let found = PathFinder::find(&m, &mut pool, &events)?;

    let mut prev = None;
    let mut cursor = Some(found.head);
    let mut prev_solid = None;
    while let Some(r) = cursor {
        let q = pool.path(r);
        match q.direction {
            Direction::Child => {
                if let Some(p) = prev {
                    let p = pool.path(p);
                    let idx = p.next_state_index;
                    assert!(idx >= 0, "CHILD without recorded edge index");
                    assert_eq!(m.node(p.state).next[idx as usize].target, q.state);
                }
            }
            Direction::Sibling => {
                let p = pool.path(prev_solid.expect("SIBLING has a predecessor"));
                assert_eq!(p.state, q.state);
                assert_eq!(q.iteration, p.iteration + 1);
            }
            Direction::Parent => {
                let p = pool.path(prev_solid.expect("PARENT has a predecessor"));
                let p_doc = p.doc.expect("solid nodes carry documents");
                assert_eq!(q.doc, pool.doc(p_doc).parent);
            }
            Direction::Content => {}
        }
        if q.direction != Direction::Content {
            prev_solid = Some(r);
        }
        prev = Some(r);
        cursor = q.next;
    }
    Ok(())
}

#[test]
fn doc_iteration_matches_path_iteration() -> Result<()> {
    let m = machine(XSD, "root");
    let mut pool = NodePool::new();
    let events = parse_document("<root><a>x</a><a>y</a><a>z</a></root>")?;
    let found = PathFinder::find(&m, &mut pool, &events)?;
    let mut cursor = Some(found.head);
    while let Some(r) = cursor {
        let node = pool.path(r);
        if let Some(doc) = node.doc {
            assert_eq!(node.iteration, node.doc_iteration);
            if node.direction == Direction::Sibling {
                assert_eq!(pool.doc(doc).iteration, node.iteration);
            }
        }
        cursor = node.next;
    }
    Ok(())
}

#[test]
fn clear_reclaims_every_node() -> Result<()> {
    let m = machine(XSD, "root");
    let mut pool = NodePool::new();
    let events = parse_document("<root><a>x</a><b>1</b></root>")?;
    PathFinder::find(&m, &mut pool, &events)?;
    assert!(pool.live_docs() > 0);
    assert!(pool.live_paths() > 0);
    pool.clear();
    assert_eq!(pool.live_docs(), 0);
    assert_eq!(pool.live_paths(), 0);
    // The pool is reusable for the next transcode.
    PathFinder::find(&m, &mut pool, &events)?;
    assert!(pool.live_docs() > 0);
    Ok(())
}

/// A failed search releases everything it acquired beyond the surviving
/// prefix, so arena slots get recycled instead of accumulating.
#[test]
fn failed_search_releases_doc_nodes() {
    let m = machine(XSD, "root");
    let mut pool = NodePool::new();
    let events = parse_document("<root><b>1</b><a>x</a></root>").unwrap();
    assert!(PathFinder::find(&m, &mut pool, &events).is_err());
    pool.clear();
    let ok = parse_document("<root><a>x</a></root>").unwrap();
    let found = PathFinder::find(&m, &mut pool, &ok).unwrap();
    assert_eq!(pool.doc(found.root).parent, None);
}

#[test]
fn substitution_reaches_member_through_one_group() -> Result<()> {
    let m = machine(
        r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
             <xs:element name="root">
               <xs:complexType>
                 <xs:sequence><xs:element ref="head"/></xs:sequence>
               </xs:complexType>
             </xs:element>
             <xs:element name="head" type="xs:string"/>
             <xs:element name="sub" substitutionGroup="head" type="xs:string"/>
           </xs:schema>"#,
        "root",
    );
    let mut pool = NodePool::new();
    let events = parse_document("<root><sub>v</sub></root>")?;
    let found = PathFinder::find(&m, &mut pool, &events)?;

    // Exactly one SUBSTITUTION_GROUP state on the path to `sub`.
    let mut cursor = Some(found.head);
    let mut group_entries = 0;
    while let Some(r) = cursor {
        let node = pool.path(r);
        if node.direction == Direction::Child
            && matches!(
                m.node(node.state).kind,
                xmlrec::machine::StateKind::SubstitutionGroup
            )
        {
            group_entries += 1;
        }
        cursor = node.next;
    }
    assert_eq!(group_entries, 1);
    Ok(())
}
