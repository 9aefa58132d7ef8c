//! Document tree, path nodes, and the recycling pool.
//!
//! DocumentNodes track how often each state was instantiated in one parse;
//! PathNodes form the doubly-linked walk the path finder produces. Both are
//! pool-owned: handles are indices into the pool's arenas and are valid only
//! for the current parse. Backtracking releases nodes back to free lists, so
//! identity is rebound on every acquisition.

use crate::machine::StateRef;
use indexmap::IndexMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DocRef(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PathRef(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Child,
    Sibling,
    Parent,
    Content,
}

/// Record-schema decoration set by the schema applier.
#[derive(Debug, Clone)]
pub struct UserContent {
    /// Handle into the record schema arena; `None` when the subtree did not
    /// match any schema member.
    pub schema: Option<usize>,
    /// Union branch of the containing context, if any.
    pub union_index: Option<usize>,
    /// Number of items the element's content array will hold.
    pub child_items: u32,
    /// Structural mismatch attached to this subtree, if any.
    pub mismatch: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DocumentNode {
    pub state: StateRef,
    pub parent: Option<DocRef>,
    /// Iteration of the parent under which this node was created.
    pub parent_iteration: u32,
    /// Outgoing-edge index of the parent state this node hangs under.
    pub branch: u32,
    /// How many times this state has been (re-)entered along the current
    /// path; occurrences = iteration + 1.
    pub iteration: u32,
    /// iteration → (branch index → child), both in insertion order.
    pub children_by_iteration: IndexMap<u32, IndexMap<u32, DocRef>>,
    pub received_content: bool,
    /// Number of CONTENT visits; sizes mixed-content arrays.
    pub content_chunks: u32,
    pub user_slot: Option<UserContent>,
    in_use: bool,
}

impl DocumentNode {
    /// Occurrences of `branch` within `iteration` of this node.
    pub fn child_occurrences(&self, pool: &NodePool, iteration: u32, branch: u32) -> u32 {
        self.children_by_iteration
            .get(&iteration)
            .and_then(|m| m.get(&branch))
            .map(|&child| pool.doc(child).iteration + 1)
            .unwrap_or(0)
    }

    pub fn child_at(&self, iteration: u32, branch: u32) -> Option<DocRef> {
        self.children_by_iteration
            .get(&iteration)
            .and_then(|m| m.get(&branch))
            .copied()
    }

    /// The most recently entered branch within `iteration`, if any.
    pub fn last_branch(&self, iteration: u32) -> Option<(u32, DocRef)> {
        self.children_by_iteration
            .get(&iteration)
            .and_then(|m| m.last())
            .map(|(&b, &d)| (b, d))
    }
}

#[derive(Debug, Clone)]
pub struct PathNode {
    pub direction: Direction,
    pub state: StateRef,
    pub doc: Option<DocRef>,
    pub iteration: u32,
    pub doc_iteration: u32,
    /// Which outgoing edge of `state` leads to the next path node; -1 when
    /// not applicable (CONTENT, PARENT, tail).
    pub next_state_index: i32,
    pub prev: Option<PathRef>,
    pub next: Option<PathRef>,
    /// Text carried by CONTENT nodes.
    pub text: Option<String>,
    in_use: bool,
}

/// Owns every DocumentNode and PathNode of a parse. Not thread-safe; one
/// pool per transcode.
#[derive(Debug, Default)]
pub struct NodePool {
    docs: Vec<DocumentNode>,
    paths: Vec<PathNode>,
    free_docs: Vec<DocRef>,
    free_paths: Vec<PathRef>,
}

impl NodePool {
    pub fn new() -> Self {
        NodePool::default()
    }

    // ── Accessors ───────────────────────────────────────────────────────

    pub fn doc(&self, r: DocRef) -> &DocumentNode {
        &self.docs[r.0 as usize]
    }

    pub fn doc_mut(&mut self, r: DocRef) -> &mut DocumentNode {
        &mut self.docs[r.0 as usize]
    }

    pub fn path(&self, r: PathRef) -> &PathNode {
        &self.paths[r.0 as usize]
    }

    pub fn path_mut(&mut self, r: PathRef) -> &mut PathNode {
        &mut self.paths[r.0 as usize]
    }

    // ── Acquisition ─────────────────────────────────────────────────────

    /// Acquire a DocumentNode bound under `parent` at (`parent_iteration`,
    /// `branch`), registering it in the parent's child map.
    pub fn acquire_doc(
        &mut self,
        state: StateRef,
        parent: Option<DocRef>,
        parent_iteration: u32,
        branch: u32,
    ) -> DocRef {
        let node = DocumentNode {
            state,
            parent,
            parent_iteration,
            branch,
            iteration: 0,
            children_by_iteration: IndexMap::new(),
            received_content: false,
            content_chunks: 0,
            user_slot: None,
            in_use: true,
        };
        let r = match self.free_docs.pop() {
            Some(r) => {
                self.docs[r.0 as usize] = node;
                r
            }
            None => {
                self.docs.push(node);
                DocRef((self.docs.len() - 1) as u32)
            }
        };
        if let Some(p) = parent {
            self.doc_mut(p)
                .children_by_iteration
                .entry(parent_iteration)
                .or_default()
                .insert(branch, r);
        }
        r
    }

    /// Acquire a PathNode and link it after `prev`.
    pub fn acquire_path(
        &mut self,
        direction: Direction,
        state: StateRef,
        doc: Option<DocRef>,
        iteration: u32,
        prev: Option<PathRef>,
    ) -> PathRef {
        let node = PathNode {
            direction,
            state,
            doc,
            iteration,
            doc_iteration: iteration,
            next_state_index: -1,
            prev,
            next: None,
            text: None,
            in_use: true,
        };
        let r = match self.free_paths.pop() {
            Some(r) => {
                self.paths[r.0 as usize] = node;
                r
            }
            None => {
                self.paths.push(node);
                PathRef((self.paths.len() - 1) as u32)
            }
        };
        if let Some(p) = prev {
            self.path_mut(p).next = Some(r);
        }
        r
    }

    // ── Release ─────────────────────────────────────────────────────────

    /// Release `from` and the whole tail of its chain, unlinking from the
    /// predecessor.
    pub fn release_path_tail(&mut self, from: PathRef) {
        if let Some(prev) = self.path(from).prev {
            self.path_mut(prev).next = None;
        }
        let mut cursor = Some(from);
        while let Some(r) = cursor {
            cursor = self.path(r).next;
            let node = self.path_mut(r);
            node.in_use = false;
            node.prev = None;
            node.next = None;
            node.text = None;
            self.free_paths.push(r);
        }
    }

    /// Release a DocumentNode and every descendant, unlinking it from its
    /// parent's child map.
    pub fn release_doc(&mut self, r: DocRef) {
        if let Some(parent) = self.doc(r).parent {
            let (it, branch) = {
                let d = self.doc(r);
                (d.parent_iteration, d.branch)
            };
            if self.docs[parent.0 as usize].in_use {
                let p = self.doc_mut(parent);
                if let Some(m) = p.children_by_iteration.get_mut(&it) {
                    m.shift_remove(&branch);
                    if m.is_empty() {
                        p.children_by_iteration.shift_remove(&it);
                    }
                }
            }
        }
        let mut stack = vec![r];
        while let Some(d) = stack.pop() {
            let node = self.doc_mut(d);
            if !node.in_use {
                continue;
            }
            node.in_use = false;
            for (_, m) in node.children_by_iteration.drain(..) {
                for (_, child) in m {
                    stack.push(child);
                }
            }
            node.user_slot = None;
            self.free_docs.push(d);
        }
    }

    /// Drop every node. Call between transcodes when reusing a pool.
    pub fn clear(&mut self) {
        self.docs.clear();
        self.paths.clear();
        self.free_docs.clear();
        self.free_paths.clear();
    }

    // ── Introspection ───────────────────────────────────────────────────

    pub fn live_docs(&self) -> usize {
        self.docs.iter().filter(|d| d.in_use).count()
    }

    pub fn live_paths(&self) -> usize {
        self.paths.iter().filter(|p| p.in_use).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doc_release_cascades_and_unlinks() {
        let mut pool = NodePool::new();
        let root = pool.acquire_doc(0, None, 0, 0);
        let child = pool.acquire_doc(1, Some(root), 0, 0);
        let _grandchild = pool.acquire_doc(2, Some(child), 0, 1);
        assert_eq!(pool.live_docs(), 3);
        pool.release_doc(child);
        assert_eq!(pool.live_docs(), 1);
        assert!(pool.doc(root).child_at(0, 0).is_none());
    }

    #[test]
    fn path_tail_release_recycles_chain() {
        let mut pool = NodePool::new();
        let a = pool.acquire_path(Direction::Child, 0, None, 0, None);
        let b = pool.acquire_path(Direction::Child, 1, None, 0, Some(a));
        let _c = pool.acquire_path(Direction::Sibling, 1, None, 1, Some(b));
        assert_eq!(pool.live_paths(), 3);
        pool.release_path_tail(b);
        assert_eq!(pool.live_paths(), 1);
        assert!(pool.path(a).next.is_none());
        // Recycled slots are reused before the arena grows.
        let d = pool.acquire_path(Direction::Child, 2, None, 0, Some(a));
        assert!(d.0 < 3);
    }

    #[test]
    fn clear_empties_the_pool() {
        let mut pool = NodePool::new();
        let root = pool.acquire_doc(0, None, 0, 0);
        pool.acquire_doc(1, Some(root), 0, 0);
        pool.acquire_path(Direction::Child, 0, Some(root), 0, None);
        pool.clear();
        assert_eq!(pool.live_docs(), 0);
        assert_eq!(pool.live_paths(), 0);
    }
}
