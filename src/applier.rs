//! Schema applier: decorates the document tree with record-schema handles.
//!
//! Each element node's `user_slot` receives the record (or map-of-record)
//! schema it will serialize through, the union index of its containing
//! context, and the number of items its content array will hold. Structural
//! mismatches are attached to the offending subtree and logged, never
//! fatal; the writer fails later only if the mismatched subtree actually
//! carries data.

use crate::doctree::{DocRef, NodePool, UserContent};
use crate::error::Result;
use crate::machine::{StateKind, StateMachine};
use crate::record::{RecordSchema, SchemaNode, SchemaRef};
use tracing::warn;

pub struct Applier<'a> {
    pool: &'a mut NodePool,
    machine: &'a StateMachine,
    schema: &'a RecordSchema,
}

impl<'a> Applier<'a> {
    pub fn new(pool: &'a mut NodePool, machine: &'a StateMachine, schema: &'a RecordSchema) -> Self {
        Applier {
            pool,
            machine,
            schema,
        }
    }

    /// Decorate the tree under `root`.
    pub fn apply(mut self, root: DocRef) -> Result<()> {
        let qname = self
            .machine
            .element(self.pool.doc(root).state)
            .expect("document root is an element")
            .qname
            .clone();
        let (union_index, member) = match self.schema.node(self.schema.root()) {
            SchemaNode::Union { .. } => match self.schema.find_member_record(self.schema.root(), &qname) {
                Some((i, m)) => (Some(i), m),
                None => {
                    self.mismatch(root, None, format!("no union member matches root {}", qname));
                    return Ok(());
                }
            },
            _ => (None, self.schema.root()),
        };
        self.decorate(root, member, union_index);
        Ok(())
    }

    fn decorate(&mut self, doc: DocRef, member: SchemaRef, union_index: Option<usize>) {
        let state = self.pool.doc(doc).state;
        let elem = match self.machine.element(state) {
            Some(e) => e.clone(),
            None => return,
        };
        let Some(record) = self.schema.record_of(member).cloned() else {
            self.mismatch(
                doc,
                union_index,
                format!("schema for {} is not a record", elem.qname),
            );
            return;
        };
        if !record.matches_local(&elem.qname.local) {
            self.mismatch(
                doc,
                union_index,
                format!(
                    "record '{}' does not match element {}",
                    record.name, elem.qname
                ),
            );
            return;
        }

        // The content field's array member set, if content is an array.
        let items = record
            .fields
            .last()
            .map(|f| self.array_items(f.schema))
            .unwrap_or(None);

        let mut child_items: u32 = 0;
        let children = self.element_children(doc);
        for child in &children {
            let child_state = self.pool.doc(*child).state;
            match &self.machine.node(child_state).kind {
                StateKind::Element(ce) => {
                    let child_qname = ce.qname.clone();
                    let occurrences = self.pool.doc(*child).iteration + 1;
                    match items.and_then(|i| self.schema.find_member_record(i, &child_qname)) {
                        Some((idx, m)) => {
                            let idx = match items.map(|i| self.schema.node(i)) {
                                Some(SchemaNode::Union { .. }) => Some(idx),
                                _ => None,
                            };
                            child_items += occurrences;
                            self.decorate(*child, m, idx);
                        }
                        None => {
                            self.mismatch(
                                *child,
                                None,
                                format!("no content member matches {}", child_qname),
                            );
                        }
                    }
                }
                StateKind::Any { .. } => {
                    // Wildcard subtrees carry no record structure.
                }
                _ => {}
            }
        }
        if elem.is_mixed() {
            child_items += self.pool.doc(doc).content_chunks;
        }

        self.pool.doc_mut(doc).user_slot = Some(UserContent {
            schema: Some(member),
            union_index,
            child_items,
            mismatch: None,
        });
    }

    /// The item set of an array-typed content field, looking through an
    /// optional `[null, array]` union.
    fn array_items(&self, content: SchemaRef) -> Option<SchemaRef> {
        match self.schema.node(content) {
            SchemaNode::Array { items } => Some(*items),
            SchemaNode::Map { .. } => Some(content),
            SchemaNode::Union { members } => members.iter().find_map(|&m| {
                match self.schema.node(m) {
                    SchemaNode::Array { items } => Some(*items),
                    _ => None,
                }
            }),
            _ => None,
        }
    }

    /// Element and wildcard children of `doc` in document order, flattening
    /// group nodes away.
    fn element_children(&self, doc: DocRef) -> Vec<DocRef> {
        let mut out = Vec::new();
        self.collect_children(doc, &mut out);
        out
    }

    fn collect_children(&self, doc: DocRef, out: &mut Vec<DocRef>) {
        let node = self.pool.doc(doc);
        let mut refs = Vec::new();
        for (_, branches) in node.children_by_iteration.iter() {
            for (_, &child) in branches.iter() {
                refs.push(child);
            }
        }
        for child in refs {
            let kind = &self.machine.node(self.pool.doc(child).state).kind;
            match kind {
                StateKind::Element(_) | StateKind::Any { .. } => out.push(child),
                _ => self.collect_children(child, out),
            }
        }
    }

    fn mismatch(&mut self, doc: DocRef, union_index: Option<usize>, detail: String) {
        warn!(target: "xmlrec::applier", "{}", detail);
        self.pool.doc_mut(doc).user_slot = Some(UserContent {
            schema: None,
            union_index,
            child_items: 0,
            mismatch: Some(detail),
        });
    }
}
