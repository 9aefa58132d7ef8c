//! Streaming path finder: matches a document event stream against the state
//! machine, producing the path chain and document tree.
//!
//! Matching is greedy in graph order. Whenever more than one continuation
//! admits the current element, the finder pushes a checkpoint carrying the
//! untried alternatives and an undo mark; a later dead end rewinds the pool
//! and document tree to that mark and takes the next alternative. The undo
//! log records every tree mutation (node creation, iteration bump, content
//! flag, nil mark) so a rewind is exact.

use crate::doctree::{Direction, DocRef, NodePool, PathRef};
use crate::error::{Error, Result};
use crate::facets::XSI_NS;
use crate::machine::{Edge, StateKind, StateMachine, StateRef};
use crate::xsd::Occurs;
use crate::qname::QName;
use crate::xml::XmlEvent;
use std::collections::HashSet;

/// The result of a successful walk: the head of the path chain and the root
/// of the document tree. Handles stay valid until the pool is cleared.
#[derive(Debug, Clone, Copy)]
pub struct FoundPath {
    pub head: PathRef,
    pub tail: PathRef,
    pub root: DocRef,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum PlanStep {
    /// Re-enter the current node: iteration += 1, SIBLING path node.
    Again,
    /// Enter outgoing edge `branch` of the current node: new child
    /// DocumentNode, CHILD path node.
    Down(u32),
}

/// One admissible continuation for a start-element event. `anchor` is the
/// existing document node the first step applies to; reaching it from the
/// cursor may require climbing, which enumeration has already validated.
#[derive(Debug, Clone)]
struct Plan {
    anchor: DocRef,
    steps: Vec<PlanStep>,
    /// Wildcard landings lose ties against element landings.
    lands_on_any: bool,
}

#[derive(Debug)]
enum UndoOp {
    CreatedDoc(DocRef),
    BumpedIteration(DocRef),
    Content { doc: DocRef, prev_received: bool },
    NilMarked(DocRef, u32),
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Position {
    doc: DocRef,
    /// true: inside `doc` before any child; false: after `doc` completed.
    inside: bool,
}

struct Checkpoint {
    event_index: usize,
    tail: PathRef,
    pos: Position,
    undo_len: usize,
    /// Untried alternatives, best-first.
    alternatives: Vec<Plan>,
}

pub struct PathFinder<'a> {
    machine: &'a StateMachine,
    pool: &'a mut NodePool,
    head: Option<PathRef>,
    tail: Option<PathRef>,
    pos: Option<Position>,
    root_doc: Option<DocRef>,
    undo: Vec<UndoOp>,
    checkpoints: Vec<Checkpoint>,
    /// Depth counter while consuming a wildcard subtree.
    skip_depth: Option<u32>,
    /// (doc, iteration) pairs that carried xsi:nil="true".
    nil_marks: HashSet<(DocRef, u32)>,
    element_names: HashSet<QName>,
    /// Furthest event index a failure was observed at, for diagnostics.
    failed_at: usize,
}

impl<'a> PathFinder<'a> {
    pub fn new(machine: &'a StateMachine, pool: &'a mut NodePool) -> Self {
        let element_names = machine
            .iter()
            .filter_map(|(_, n)| n.element().map(|e| e.qname.clone()))
            .collect();
        PathFinder {
            machine,
            pool,
            head: None,
            tail: None,
            pos: None,
            root_doc: None,
            undo: Vec::new(),
            checkpoints: Vec::new(),
            skip_depth: None,
            nil_marks: HashSet::new(),
            element_names,
            failed_at: 0,
        }
    }

    /// Match the whole event stream. On success the path chain and document
    /// tree remain in the pool for the transducer.
    pub fn find(
        machine: &'a StateMachine,
        pool: &'a mut NodePool,
        events: &[XmlEvent],
    ) -> Result<FoundPath> {
        let mut finder = PathFinder::new(machine, pool);
        finder.run(events)
    }

    fn run(&mut self, events: &[XmlEvent]) -> Result<FoundPath> {
        let mut i = 0;
        while i < events.len() {
            match self.step(&events[i], i) {
                Ok(()) => i += 1,
                Err(err) => {
                    i = self.backtrack(err, events)?;
                }
            }
        }
        match (self.head, self.tail, self.root_doc) {
            (Some(head), Some(tail), Some(root)) => Ok(FoundPath { head, tail, root }),
            _ => Err(Error::NoPathMatches(0)),
        }
    }

    fn step(&mut self, event: &XmlEvent, index: usize) -> Result<()> {
        match event {
            XmlEvent::StartElement { name, attributes } => self.on_start(name, attributes, index),
            XmlEvent::Characters(text) => self.on_characters(text),
            XmlEvent::EndElement { name } => self.on_end(name),
            XmlEvent::EndDocument => self.on_end_document(),
            _ => Ok(()),
        }
    }

    // ── Event handling ──────────────────────────────────────────────────

    fn on_start(
        &mut self,
        name: &QName,
        attributes: &[(QName, String)],
        index: usize,
    ) -> Result<()> {
        if let Some(depth) = self.skip_depth.as_mut() {
            *depth += 1;
            return Ok(());
        }
        if self.pos.is_none() {
            return self.enter_root(name, attributes);
        }
        let mut plans = self.enumerate(name);
        if plans.is_empty() {
            return Err(if self.element_names.contains(name) {
                Error::NoPathMatches(index)
            } else {
                Error::UnknownElement(name.clone())
            });
        }
        let chosen = plans.remove(0);
        if !plans.is_empty() {
            self.checkpoints.push(Checkpoint {
                event_index: index,
                tail: self.tail.expect("tail exists after root"),
                pos: self.pos.expect("position exists after root"),
                undo_len: self.undo.len(),
                alternatives: plans,
            });
        }
        self.execute(&chosen, attributes)
    }

    fn enter_root(&mut self, name: &QName, attributes: &[(QName, String)]) -> Result<()> {
        let start = self.machine.start();
        let root_elem = self
            .machine
            .element(start)
            .ok_or(Error::NoPathMatches(0))?;
        if &root_elem.qname != name {
            return Err(Error::UnknownElement(name.clone()));
        }
        let nil = self.check_nil(start, attributes)?;
        let doc = self.pool.acquire_doc(start, None, 0, 0);
        if nil {
            self.nil_marks.insert((doc, 0));
            self.undo.push(UndoOp::NilMarked(doc, 0));
        }
        let path = self
            .pool
            .acquire_path(Direction::Child, start, Some(doc), 0, None);
        self.head = Some(path);
        self.tail = Some(path);
        self.root_doc = Some(doc);
        self.pos = Some(Position { doc, inside: true });
        Ok(())
    }

    fn on_characters(&mut self, text: &str) -> Result<()> {
        if self.skip_depth.is_some() {
            return Ok(());
        }
        let Some(open) = self.open_element() else {
            return Ok(());
        };
        let state = self.pool.doc(open).state;
        let simple = self
            .machine
            .element(state)
            .map(|e| e.has_simple_content())
            .unwrap_or(false);
        if text.trim().is_empty() && !simple {
            return Ok(());
        }
        let prev_received = self.pool.doc(open).received_content;
        {
            let d = self.pool.doc_mut(open);
            d.received_content = true;
            d.content_chunks += 1;
        }
        self.undo.push(UndoOp::Content {
            doc: open,
            prev_received,
        });
        let iteration = self.pool.doc(open).iteration;
        let node =
            self.pool
                .acquire_path(Direction::Content, state, Some(open), iteration, self.tail);
        self.pool.path_mut(node).text = Some(text.to_string());
        self.tail = Some(node);
        Ok(())
    }

    fn on_end(&mut self, name: &QName) -> Result<()> {
        if let Some(depth) = self.skip_depth.as_mut() {
            if *depth > 0 {
                *depth -= 1;
                return Ok(());
            }
            // The wildcard element itself closes.
            self.skip_depth = None;
            let pos = self.pos.expect("inside wildcard");
            self.pos = Some(Position {
                doc: pos.doc,
                inside: false,
            });
            return Ok(());
        }
        let pos = self
            .pos
            .ok_or_else(|| Error::Xml("end element outside document".into()))?;
        if pos.inside {
            // Empty element: every content edge must be optional, unless the
            // occurrence was nil.
            let doc = pos.doc;
            let state = self.pool.doc(doc).state;
            let iteration = self.pool.doc(doc).iteration;
            if !self.nil_marks.contains(&(doc, iteration)) {
                for &edge in &self.machine.node(state).next {
                    if !self.can_be_empty(edge) {
                        return Err(Error::NoPathMatches(0));
                    }
                }
            }
            debug_assert_eq!(
                self.machine.element(state).map(|e| &e.qname),
                Some(name),
                "parser guarantees matched tags"
            );
            self.pos = Some(Position { doc, inside: false });
            return Ok(());
        }

        // Climb from the completed child to the open element, verifying
        // min-occurs at every level and emitting PARENT path nodes.
        let mut cur = pos.doc;
        loop {
            let cur_node = self.pool.doc(cur);
            let occurrences = cur_node.iteration + 1;
            if occurrences < self.occurs_of(cur).min
                && !self.occurrence_completable(cur_node.state)
            {
                return Err(Error::NoPathMatches(0));
            }
            let parent = cur_node
                .parent
                .ok_or_else(|| Error::Xml("end element above document root".into()))?;
            self.verify_exitable(parent, cur)?;
            let parent_state = self.pool.doc(parent).state;
            let parent_iter = self.pool.doc(parent).iteration;
            let node = self.pool.acquire_path(
                Direction::Parent,
                parent_state,
                Some(parent),
                parent_iter,
                self.tail,
            );
            self.tail = Some(node);
            if self.machine.node(parent_state).is_element() {
                self.pos = Some(Position {
                    doc: parent,
                    inside: false,
                });
                return Ok(());
            }
            cur = parent;
        }
    }

    fn on_end_document(&mut self) -> Result<()> {
        match (self.pos, self.root_doc) {
            (Some(pos), Some(root)) if !pos.inside && pos.doc == root => Ok(()),
            _ => Err(Error::NoPathMatches(0)),
        }
    }

    // ── Candidate enumeration ───────────────────────────────────────────

    /// Admissible continuations for `start_element(name)`, best-first in
    /// graph order.
    fn enumerate(&self, name: &QName) -> Vec<Plan> {
        let mut plans = Vec::new();
        let pos = self.pos.expect("enumerate needs a position");
        if pos.inside {
            // Just inside an element: only its content edges are reachable.
            self.enter_edges(pos.doc, name, &mut plans);
            plans.sort_by_key(|p| p.lands_on_any);
            return plans;
        }

        // After a completed child: repeat it, advance within its ancestors,
        // or re-iterate them, innermost first.
        let mut cur = pos.doc;
        loop {
            let cur_node = self.pool.doc(cur);
            let cur_state = self.machine.node(cur_node.state);
            let cur_occurs = self.occurs_of(cur);
            let occurrences = cur_node.iteration + 1;

            let repeatable = match &cur_state.kind {
                StateKind::Element(es) => &es.qname == name,
                StateKind::Any { .. } => self.any_admits(cur_node.state, name),
                _ => false,
            };
            if repeatable && cur_occurs.max.admits(occurrences) {
                plans.push(Plan {
                    anchor: cur,
                    steps: vec![PlanStep::Again],
                    lands_on_any: matches!(cur_state.kind, StateKind::Any { .. }),
                });
            }

            if occurrences < cur_occurs.min && !self.occurrence_completable(cur_node.state) {
                // The child must repeat before anything else can happen.
                break;
            }
            let Some(parent) = cur_node.parent else { break };
            let parent_iter = self.pool.doc(parent).iteration;
            let parent_state = self.machine.node(self.pool.doc(parent).state);
            let cur_branch = self.pool.doc(cur).branch;

            match parent_state.kind {
                StateKind::Element(_) | StateKind::Sequence => {
                    let mut exitable = true;
                    for b in (cur_branch as usize + 1)..parent_state.next.len() {
                        let edge = parent_state.next[b];
                        self.enter_edge(parent, edge, b as u32, name, &[], &mut plans);
                        if !self.can_be_empty(edge) {
                            exitable = false;
                            break;
                        }
                    }
                    if matches!(parent_state.kind, StateKind::Sequence)
                        && exitable
                        && self.occurs_of(parent).max.admits(parent_iter + 1)
                    {
                        for (b, &edge) in parent_state.next.iter().enumerate() {
                            self.enter_edge(
                                parent,
                                edge,
                                b as u32,
                                name,
                                &[PlanStep::Again],
                                &mut plans,
                            );
                            if !self.can_be_empty(edge) {
                                break;
                            }
                        }
                    }
                    if matches!(parent_state.kind, StateKind::Element(_)) || !exitable {
                        break;
                    }
                    cur = parent;
                }
                StateKind::Choice | StateKind::SubstitutionGroup => {
                    if self.occurs_of(parent).max.admits(parent_iter + 1) {
                        for (b, &edge) in parent_state.next.iter().enumerate() {
                            self.enter_edge(
                                parent,
                                edge,
                                b as u32,
                                name,
                                &[PlanStep::Again],
                                &mut plans,
                            );
                        }
                    }
                    cur = parent;
                }
                StateKind::All => {
                    let used: HashSet<u32> = self
                        .pool
                        .doc(parent)
                        .children_by_iteration
                        .get(&parent_iter)
                        .map(|m| m.keys().copied().collect())
                        .unwrap_or_default();
                    for (b, &edge) in parent_state.next.iter().enumerate() {
                        if used.contains(&(b as u32)) {
                            continue;
                        }
                        self.enter_edge(parent, edge, b as u32, name, &[], &mut plans);
                    }
                    let complete = parent_state.next.iter().enumerate().all(|(b, &edge)| {
                        self.can_be_empty(edge) || used.contains(&(b as u32))
                    });
                    if !complete {
                        break;
                    }
                    cur = parent;
                }
                StateKind::Any { .. } => break,
            }
        }
        // A wildcard only wins when no element state admits the name.
        plans.sort_by_key(|p| p.lands_on_any);
        plans
    }

    /// Descend from `doc`'s own content edges (fresh iteration, no children
    /// yet). An element's content root behaves like a sequence: a required
    /// particle blocks everything after it.
    fn enter_edges(&self, doc: DocRef, name: &QName, plans: &mut Vec<Plan>) {
        let state = self.pool.doc(doc).state;
        let node = self.machine.node(state);
        for (b, &edge) in node.next.iter().enumerate() {
            self.enter_edge(doc, edge, b as u32, name, &[], plans);
            if !self.can_be_empty(edge) {
                break;
            }
        }
    }

    /// Try to reach `name` by entering `edge` (branch `branch` of `anchor`),
    /// descending through fresh groups.
    fn enter_edge(
        &self,
        anchor: DocRef,
        edge: Edge,
        branch: u32,
        name: &QName,
        prefix: &[PlanStep],
        plans: &mut Vec<Plan>,
    ) {
        let mut steps = prefix.to_vec();
        steps.push(PlanStep::Down(branch));
        self.descend(anchor, edge.target, steps, name, plans);
    }

    fn descend(
        &self,
        anchor: DocRef,
        state: StateRef,
        steps: Vec<PlanStep>,
        name: &QName,
        plans: &mut Vec<Plan>,
    ) {
        let node = self.machine.node(state);
        match &node.kind {
            StateKind::Element(es) => {
                if &es.qname == name {
                    plans.push(Plan {
                        anchor,
                        steps,
                        lands_on_any: false,
                    });
                }
            }
            StateKind::Any { .. } => {
                if self.any_admits(state, name) {
                    plans.push(Plan {
                        anchor,
                        steps,
                        lands_on_any: true,
                    });
                }
            }
            StateKind::Sequence => {
                for (b, &edge) in node.next.iter().enumerate() {
                    let mut s = steps.clone();
                    s.push(PlanStep::Down(b as u32));
                    self.descend(anchor, edge.target, s, name, plans);
                    if !self.can_be_empty(edge) {
                        break;
                    }
                }
            }
            StateKind::Choice | StateKind::SubstitutionGroup | StateKind::All => {
                for (b, &edge) in node.next.iter().enumerate() {
                    let mut s = steps.clone();
                    s.push(PlanStep::Down(b as u32));
                    self.descend(anchor, edge.target, s, name, plans);
                }
            }
        }
    }

    /// Can the child position `edge` be satisfied by zero input? True when
    /// its minOccurs is zero, or when one occurrence can itself match empty.
    fn can_be_empty(&self, edge: Edge) -> bool {
        edge.occurs.min == 0 || self.occurrence_completable(edge.target)
    }

    /// The occurrence bounds governing `doc`: the incoming edge's bounds,
    /// or the node's own for the root.
    fn occurs_of(&self, doc: DocRef) -> Occurs {
        let d = self.pool.doc(doc);
        match d.parent {
            Some(p) => {
                let parent_state = self.pool.doc(p).state;
                self.machine.node(parent_state).next[d.branch as usize].occurs
            }
            None => self.machine.node(d.state).occurs,
        }
    }

    /// Can a single occurrence of `state` match empty input? Elements and
    /// wildcards consume a tag; groups delegate to their children.
    fn occurrence_completable(&self, state: StateRef) -> bool {
        let node = self.machine.node(state);
        match node.kind {
            StateKind::Element(_) | StateKind::Any { .. } => false,
            StateKind::Sequence | StateKind::All => {
                node.next.iter().all(|&e| self.can_be_empty(e))
            }
            StateKind::Choice | StateKind::SubstitutionGroup => {
                node.next.iter().any(|&e| self.can_be_empty(e))
            }
        }
    }

    fn any_admits(&self, state: StateRef, name: &QName) -> bool {
        match &self.machine.node(state).kind {
            StateKind::Any {
                namespace,
                target_namespace,
                ..
            } => match namespace.as_str() {
                "##any" => true,
                // Anything except no-namespace and the declaring schema's
                // own target namespace.
                "##other" => {
                    !name.namespace.is_empty() && name.namespace != *target_namespace
                }
                "##local" => name.namespace.is_empty(),
                list => list.split_whitespace().any(|token| match token {
                    "##targetNamespace" => name.namespace == *target_namespace,
                    "##local" => name.namespace.is_empty(),
                    ns => ns == name.namespace,
                }),
            },
            _ => false,
        }
    }

    // ── Plan execution ──────────────────────────────────────────────────

    fn execute(&mut self, plan: &Plan, attributes: &[(QName, String)]) -> Result<()> {
        // Climb to the anchor, emitting PARENT nodes for each level left.
        let mut pos = self.pos.expect("execute needs a position");
        while pos.doc != plan.anchor {
            let parent = self
                .pool
                .doc(pos.doc)
                .parent
                .expect("plan anchor is an ancestor");
            let parent_state = self.pool.doc(parent).state;
            let parent_iter = self.pool.doc(parent).iteration;
            let node = self.pool.acquire_path(
                Direction::Parent,
                parent_state,
                Some(parent),
                parent_iter,
                self.tail,
            );
            self.tail = Some(node);
            pos = Position {
                doc: parent,
                inside: false,
            };
        }

        let mut cur = plan.anchor;
        for step in &plan.steps {
            match step {
                PlanStep::Again => {
                    self.pool.doc_mut(cur).iteration += 1;
                    self.undo.push(UndoOp::BumpedIteration(cur));
                    let state = self.pool.doc(cur).state;
                    let iteration = self.pool.doc(cur).iteration;
                    let node = self.pool.acquire_path(
                        Direction::Sibling,
                        state,
                        Some(cur),
                        iteration,
                        self.tail,
                    );
                    self.tail = Some(node);
                }
                PlanStep::Down(branch) => {
                    let parent_state = self.pool.doc(cur).state;
                    let parent_iter = self.pool.doc(cur).iteration;
                    let target = self.machine.node(parent_state).next[*branch as usize].target;
                    let child = self
                        .pool
                        .acquire_doc(target, Some(cur), parent_iter, *branch);
                    self.undo.push(UndoOp::CreatedDoc(child));
                    if let Some(tail) = self.tail {
                        self.pool.path_mut(tail).next_state_index = *branch as i32;
                    }
                    let node =
                        self.pool
                            .acquire_path(Direction::Child, target, Some(child), 0, self.tail);
                    self.tail = Some(node);
                    cur = child;
                }
            }
        }

        let landed_state = self.pool.doc(cur).state;
        if matches!(self.machine.node(landed_state).kind, StateKind::Any { .. }) {
            self.skip_depth = Some(0);
        } else if self.check_nil(landed_state, attributes)? {
            let iteration = self.pool.doc(cur).iteration;
            self.nil_marks.insert((cur, iteration));
            self.undo.push(UndoOp::NilMarked(cur, iteration));
        }
        self.pos = Some(Position {
            doc: cur,
            inside: true,
        });
        Ok(())
    }

    /// `xsi:nil="true"` is only admissible on nillable elements. Returns
    /// whether the occurrence is nil.
    fn check_nil(&self, state: StateRef, attributes: &[(QName, String)]) -> Result<bool> {
        let nil = attributes
            .iter()
            .any(|(q, v)| q.namespace == XSI_NS && q.local == "nil" && v == "true");
        if !nil {
            return Ok(false);
        }
        let elem = self.machine.element(state).expect("nil only on elements");
        if elem.nillable {
            Ok(true)
        } else {
            Err(Error::NilabilityConflict(elem.qname.clone()))
        }
    }

    /// Can the current iteration of `parent` end, given `cur` was its last
    /// entered child?
    fn verify_exitable(&self, parent: DocRef, cur: DocRef) -> Result<()> {
        let parent_node = self.pool.doc(parent);
        let parent_state = self.machine.node(parent_node.state);
        let cur_branch = self.pool.doc(cur).branch;
        match parent_state.kind {
            StateKind::Element(_) | StateKind::Sequence => {
                for b in (cur_branch as usize + 1)..parent_state.next.len() {
                    if !self.can_be_empty(parent_state.next[b]) {
                        return Err(Error::NoPathMatches(0));
                    }
                }
                Ok(())
            }
            StateKind::Choice | StateKind::SubstitutionGroup => Ok(()),
            StateKind::All => {
                let iter = parent_node.iteration;
                let used: HashSet<u32> = parent_node
                    .children_by_iteration
                    .get(&iter)
                    .map(|m| m.keys().copied().collect())
                    .unwrap_or_default();
                for (b, &edge) in parent_state.next.iter().enumerate() {
                    if !self.can_be_empty(edge) && !used.contains(&(b as u32)) {
                        return Err(Error::NoPathMatches(0));
                    }
                }
                Ok(())
            }
            StateKind::Any { .. } => Ok(()),
        }
    }

    // ── Backtracking ────────────────────────────────────────────────────

    fn backtrack(&mut self, err: Error, events: &[XmlEvent]) -> Result<usize> {
        // Only matching failures are search fuel; anything else propagates.
        let mut first_err = match err {
            Error::NoPathMatches(i) => {
                self.failed_at = self.failed_at.max(i);
                None
            }
            e @ (Error::UnknownElement(_) | Error::NilabilityConflict(_)) => Some(e),
            other => return Err(other),
        };
        loop {
            let snapshot = self
                .checkpoints
                .last()
                .map(|top| (top.event_index, top.tail, top.pos, top.undo_len, top.alternatives.is_empty()));
            let Some((event_index, tail, pos, undo_len, exhausted)) = snapshot else {
                return Err(match first_err.take() {
                    Some(e) => e,
                    None => Error::NoPathMatches(self.failed_at),
                });
            };
            if exhausted {
                self.checkpoints.pop();
                continue;
            }
            self.rewind(tail, pos, undo_len);
            let plan = self
                .checkpoints
                .last_mut()
                .expect("checkpoint present")
                .alternatives
                .remove(0);
            if self
                .checkpoints
                .last()
                .is_some_and(|c| c.alternatives.is_empty())
            {
                self.checkpoints.pop();
            }
            let (_, attributes) = match &events[event_index] {
                XmlEvent::StartElement { name, attributes } => (name, attributes),
                _ => unreachable!("checkpoints only mark start events"),
            };
            match self.execute(&plan, attributes) {
                Ok(()) => return Ok(event_index + 1),
                Err(e) => {
                    if let Error::NilabilityConflict(_) = &e {
                        first_err.get_or_insert(e);
                    }
                    continue;
                }
            }
        }
    }

    fn rewind(&mut self, tail: PathRef, pos: Position, undo_len: usize) {
        self.skip_depth = None;
        if let Some(next) = self.pool.path(tail).next {
            self.pool.release_path_tail(next);
        }
        self.tail = Some(tail);
        self.pos = Some(pos);
        while self.undo.len() > undo_len {
            match self.undo.pop().expect("undo length checked") {
                UndoOp::CreatedDoc(d) => self.pool.release_doc(d),
                UndoOp::BumpedIteration(d) => {
                    self.pool.doc_mut(d).iteration -= 1;
                }
                UndoOp::Content { doc, prev_received } => {
                    let d = self.pool.doc_mut(doc);
                    d.content_chunks -= 1;
                    d.received_content = prev_received;
                }
                UndoOp::NilMarked(d, iteration) => {
                    self.nil_marks.remove(&(d, iteration));
                }
            }
        }
    }

    /// The innermost open element for the current position.
    fn open_element(&self) -> Option<DocRef> {
        let pos = self.pos?;
        let mut cur = pos.doc;
        if pos.inside {
            return Some(cur);
        }
        loop {
            cur = self.pool.doc(cur).parent?;
            if self.machine.node(self.pool.doc(cur).state).is_element() {
                return Some(cur);
            }
        }
    }
}
