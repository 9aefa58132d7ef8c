//! State machine: the reusable graph compiled from an XSD.
//!
//! Nodes live in an arena and reference each other by index, which lets the
//! graph contain cycles for recursive schemas and keeps it `Send + Sync` for
//! sharing across transcodes. Edge order is the order walker events arrived
//! in; that order is the authoritative tie-break at match time.

use crate::error::Result;
use crate::qname::QName;
use crate::scope::{Attribute, Scope};
use crate::simpletype::SimpleTypeInfo;
use crate::walker::{SchemaVisitor, SchemaWalker};
use crate::xsd::{AnyParticle, ElementDecl, Occurs, ProcessContents, SchemaSet};
use std::collections::HashMap;

pub type StateRef = usize;

#[derive(Debug, Clone)]
pub struct ElementState {
    pub qname: QName,
    pub type_info: SimpleTypeInfo,
    pub attributes: Vec<Attribute>,
    pub nillable: bool,
    pub default: Option<String>,
    pub fixed: Option<String>,
}

impl ElementState {
    /// True when the element's content is character data, not child elements.
    pub fn has_simple_content(&self) -> bool {
        !self.type_info.is_complex()
    }

    pub fn is_mixed(&self) -> bool {
        self.type_info.is_mixed()
    }

    pub fn attribute(&self, name: &QName) -> Option<&Attribute> {
        self.attributes.iter().find(|a| &a.name == name)
    }
}

#[derive(Debug, Clone)]
pub enum StateKind {
    Element(ElementState),
    Any {
        namespace: String,
        /// Target namespace of the declaring schema, for `##other` and
        /// `##targetNamespace` resolution.
        target_namespace: String,
        process_contents: ProcessContents,
    },
    SubstitutionGroup,
    Sequence,
    Choice,
    All,
}

/// An outgoing edge: the child position's occurrence bounds live here, so
/// a shared element node can be optional in one position and unbounded in
/// another.
#[derive(Debug, Clone, Copy)]
pub struct Edge {
    pub target: StateRef,
    pub occurs: Occurs,
}

#[derive(Debug, Clone)]
pub struct StateNode {
    pub kind: StateKind,
    /// Bounds of the node's own declaration; positional bounds are on the
    /// incoming edge.
    pub occurs: Occurs,
    /// Ordered outgoing edges.
    pub next: Vec<Edge>,
}

impl StateNode {
    pub fn is_element(&self) -> bool {
        matches!(self.kind, StateKind::Element(_))
    }

    pub fn is_group(&self) -> bool {
        matches!(
            self.kind,
            StateKind::Sequence | StateKind::Choice | StateKind::All | StateKind::SubstitutionGroup
        )
    }

    pub fn element(&self) -> Option<&ElementState> {
        match &self.kind {
            StateKind::Element(e) => Some(e),
            _ => None,
        }
    }
}

/// The compiled graph. Immutable once built; safe to share across threads.
#[derive(Debug, Clone)]
pub struct StateMachine {
    nodes: Vec<StateNode>,
    start: StateRef,
}

impl StateMachine {
    /// Compile the state machine for `root` against a schema set.
    pub fn build(set: &SchemaSet, root: &QName) -> Result<StateMachine> {
        let mut builder = MachineBuilder::new();
        SchemaWalker::new(set).walk(root, &mut builder)?;
        builder.finish()
    }

    pub fn node(&self, r: StateRef) -> &StateNode {
        &self.nodes[r]
    }

    pub fn start(&self) -> StateRef {
        self.start
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The element state for `r`, if `r` is an element node.
    pub fn element(&self, r: StateRef) -> Option<&ElementState> {
        self.nodes[r].element()
    }

    pub fn iter(&self) -> impl Iterator<Item = (StateRef, &StateNode)> {
        self.nodes.iter().enumerate()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Builder
// ────────────────────────────────────────────────────────────────────────────

struct StackEntry {
    node: StateRef,
    /// Entries for reused element nodes: their content is already built, so
    /// visitor events inside them must not mutate the node again.
    is_ignored: bool,
}

/// Consumes walker events and assembles the graph.
pub struct MachineBuilder {
    nodes: Vec<StateNode>,
    stack: Vec<StackEntry>,
    elements: HashMap<QName, StateRef>,
    start: Option<StateRef>,
}

impl MachineBuilder {
    pub fn new() -> Self {
        MachineBuilder {
            nodes: Vec::new(),
            stack: Vec::new(),
            elements: HashMap::new(),
            start: None,
        }
    }

    pub fn finish(self) -> Result<StateMachine> {
        let start = self
            .start
            .ok_or_else(|| crate::error::Error::Xsd("schema walk produced no element".into()))?;
        Ok(StateMachine {
            nodes: self.nodes,
            start,
        })
    }

    fn alloc(&mut self, kind: StateKind, occurs: Occurs) -> StateRef {
        let r = self.nodes.len();
        self.nodes.push(StateNode {
            kind,
            occurs,
            next: Vec::new(),
        });
        r
    }

    fn link(&mut self, target: StateRef, occurs: Occurs) {
        if let Some(top) = self.stack.last() {
            let parent = top.node;
            self.nodes[parent].next.push(Edge { target, occurs });
        }
    }

    fn push_group(&mut self, kind: StateKind, occurs: Occurs) {
        let node = self.alloc(kind, occurs);
        self.link(node, occurs);
        self.stack.push(StackEntry {
            node,
            is_ignored: false,
        });
    }

    fn pop_group(&mut self) {
        let entry = self.stack.pop().expect("group exit without enter");
        // A group that ended up with no outgoing edges recognizes nothing;
        // unlink it from its parent.
        if self.nodes[entry.node].next.is_empty() && self.nodes[entry.node].is_group() {
            if let Some(top) = self.stack.last() {
                let parent = top.node;
                if self.nodes[parent].next.last().map(|e| e.target) == Some(entry.node) {
                    self.nodes[parent].next.pop();
                }
            }
        }
    }
}

impl SchemaVisitor for MachineBuilder {
    fn on_enter_element(
        &mut self,
        elem: &ElementDecl,
        scope: &Scope,
        occurs: Occurs,
        previously_visited: bool,
    ) -> Result<()> {
        let node = match self.elements.get(&elem.name) {
            Some(&existing) => existing,
            None => {
                let state = ElementState {
                    qname: elem.name.clone(),
                    type_info: scope.simple.clone(),
                    attributes: Vec::new(),
                    nillable: elem.nillable,
                    default: elem.default.clone(),
                    fixed: elem.fixed.clone(),
                };
                let r = self.alloc(StateKind::Element(state), occurs);
                self.elements.insert(elem.name.clone(), r);
                r
            }
        };
        self.link(node, occurs);
        if self.start.is_none() {
            self.start = Some(node);
        }
        self.stack.push(StackEntry {
            node,
            is_ignored: previously_visited,
        });
        Ok(())
    }

    fn on_exit_element(&mut self, _elem: &ElementDecl, _previously_visited: bool) -> Result<()> {
        self.stack.pop().expect("element exit without enter");
        Ok(())
    }

    fn on_visit_attribute(&mut self, _elem: &ElementDecl, attr: &Attribute) -> Result<()> {
        let top = self.stack.last().expect("attribute outside element");
        if top.is_ignored {
            return Ok(());
        }
        let node = top.node;
        if let StateKind::Element(state) = &mut self.nodes[node].kind {
            state.attributes.push(attr.clone());
        }
        Ok(())
    }

    fn on_enter_substitution_group(&mut self, _head: &ElementDecl, occurs: Occurs) -> Result<()> {
        self.push_group(StateKind::SubstitutionGroup, occurs);
        Ok(())
    }

    fn on_exit_substitution_group(&mut self, _head: &ElementDecl) -> Result<()> {
        self.pop_group();
        Ok(())
    }

    fn on_enter_sequence_group(&mut self, occurs: Occurs) -> Result<()> {
        self.push_group(StateKind::Sequence, occurs);
        Ok(())
    }

    fn on_exit_sequence_group(&mut self) -> Result<()> {
        self.pop_group();
        Ok(())
    }

    fn on_enter_choice_group(&mut self, occurs: Occurs) -> Result<()> {
        self.push_group(StateKind::Choice, occurs);
        Ok(())
    }

    fn on_exit_choice_group(&mut self) -> Result<()> {
        self.pop_group();
        Ok(())
    }

    fn on_enter_all_group(&mut self, occurs: Occurs) -> Result<()> {
        self.push_group(StateKind::All, occurs);
        Ok(())
    }

    fn on_exit_all_group(&mut self) -> Result<()> {
        self.pop_group();
        Ok(())
    }

    fn on_visit_any(&mut self, any: &AnyParticle) -> Result<()> {
        let node = self.alloc(
            StateKind::Any {
                namespace: any.namespace.clone(),
                target_namespace: any.target_namespace.clone(),
                process_contents: any.process_contents,
            },
            any.occurs,
        );
        self.link(node, any.occurs);
        Ok(())
    }
}

impl Default for MachineBuilder {
    fn default() -> Self {
        MachineBuilder::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xsd::{MemSchemaSource, SchemaLoader, SchemaSet};

    fn machine_for(xsd: &str, root: &str) -> StateMachine {
        let mut source = MemSchemaSource::new();
        source.insert("test.xsd", xsd);
        let mut set = SchemaSet::default();
        SchemaLoader::new(source).load(&mut set, "test.xsd").unwrap();
        StateMachine::build(&set, &QName::local(root)).unwrap()
    }

    #[test]
    fn sequence_graph_shape() {
        let m = machine_for(
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
        let start = m.node(m.start());
        assert!(start.is_element());
        assert_eq!(start.next.len(), 1);
        let seq = m.node(start.next[0].target);
        assert!(matches!(seq.kind, StateKind::Sequence));
        assert_eq!(seq.next.len(), 2);
        assert_eq!(m.element(seq.next[0].target).unwrap().qname, QName::local("a"));
        assert_eq!(m.element(seq.next[1].target).unwrap().qname, QName::local("b"));
    }

    #[test]
    fn recursive_schema_reuses_element_node() {
        let m = machine_for(
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
                 <xs:element name="tree" type="treeType"/>
                 <xs:complexType name="treeType">
                   <xs:sequence>
                     <xs:element ref="tree" minOccurs="0" maxOccurs="unbounded"/>
                   </xs:sequence>
                 </xs:complexType>
               </xs:schema>"#,
            "tree",
        );
        let start = m.node(m.start());
        let seq = m.node(start.next[0].target);
        // The inner reference links back to the start node itself, with the
        // position's own bounds on the edge.
        assert_eq!(seq.next[0].target, m.start());
        assert_eq!(seq.next[0].occurs.min, 0);
        assert_eq!(seq.next[0].occurs.max, crate::xsd::MaxOccurs::Unbounded);
    }

    #[test]
    fn substitution_group_shape() {
        let m = machine_for(
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
                 <xs:element name="root">
                   <xs:complexType>
                     <xs:sequence>
                       <xs:element ref="record"/>
                     </xs:sequence>
                   </xs:complexType>
                 </xs:element>
                 <xs:element name="record" type="xs:string"/>
                 <xs:element name="firstMap" substitutionGroup="record" type="xs:string"/>
                 <xs:element name="secondMap" substitutionGroup="record" type="xs:string"/>
               </xs:schema>"#,
            "root",
        );
        let start = m.node(m.start());
        let seq = m.node(start.next[0].target);
        let sub = m.node(seq.next[0].target);
        assert!(matches!(sub.kind, StateKind::SubstitutionGroup));
        let names: Vec<String> = sub
            .next
            .iter()
            .map(|e| m.element(e.target).unwrap().qname.local.clone())
            .collect();
        assert_eq!(names, vec!["record", "firstMap", "secondMap"]);
    }
}
