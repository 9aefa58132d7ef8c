//! Depth-first XSD traversal emitting visitor events.
//!
//! The walker starts at a named root element and descends through particles,
//! resolving element and group references as it goes. Substitution-group
//! heads expand to a group event wrapping the head and each substitute in
//! index order. A visited set keyed by QName stops recursion into elements
//! that were already walked; those are re-emitted with
//! `previously_visited = true` so the state machine can link the existing
//! node instead of rebuilding it.

use crate::error::{Error, Result};
use crate::qname::QName;
use crate::scope::{Attribute, Scope, Scoper};
use crate::xsd::{
    AnyAttribute, AnyParticle, ElementDecl, ElementRef, Occurs, Particle, SchemaSet,
};
use std::collections::HashSet;

/// Walk events, in document-model order. Event order is the contract; every
/// method has a no-op default so visitors implement only what they need.
#[allow(unused_variables)]
pub trait SchemaVisitor {
    fn on_enter_element(
        &mut self,
        elem: &ElementDecl,
        scope: &Scope,
        occurs: Occurs,
        previously_visited: bool,
    ) -> Result<()> {
        Ok(())
    }
    fn on_exit_element(&mut self, elem: &ElementDecl, previously_visited: bool) -> Result<()> {
        Ok(())
    }
    fn on_visit_attribute(&mut self, elem: &ElementDecl, attr: &Attribute) -> Result<()> {
        Ok(())
    }
    fn on_visit_any_attribute(&mut self, elem: &ElementDecl, any: &AnyAttribute) -> Result<()> {
        Ok(())
    }
    fn on_enter_substitution_group(&mut self, head: &ElementDecl, occurs: Occurs) -> Result<()> {
        Ok(())
    }
    fn on_exit_substitution_group(&mut self, head: &ElementDecl) -> Result<()> {
        Ok(())
    }
    fn on_enter_sequence_group(&mut self, occurs: Occurs) -> Result<()> {
        Ok(())
    }
    fn on_exit_sequence_group(&mut self) -> Result<()> {
        Ok(())
    }
    fn on_enter_choice_group(&mut self, occurs: Occurs) -> Result<()> {
        Ok(())
    }
    fn on_exit_choice_group(&mut self) -> Result<()> {
        Ok(())
    }
    fn on_enter_all_group(&mut self, occurs: Occurs) -> Result<()> {
        Ok(())
    }
    fn on_exit_all_group(&mut self) -> Result<()> {
        Ok(())
    }
    fn on_visit_any(&mut self, any: &AnyParticle) -> Result<()> {
        Ok(())
    }
}

pub struct SchemaWalker<'a> {
    set: &'a SchemaSet,
    scoper: Scoper<'a>,
    visited: HashSet<QName>,
}

impl<'a> SchemaWalker<'a> {
    pub fn new(set: &'a SchemaSet) -> Self {
        SchemaWalker {
            set,
            scoper: Scoper::new(set),
            visited: HashSet::new(),
        }
    }

    /// Walk the schema starting at the named root element.
    pub fn walk<V: SchemaVisitor>(&mut self, root: &QName, visitor: &mut V) -> Result<()> {
        let decl = self
            .set
            .element_by_qname(root)
            .ok_or_else(|| Error::UnresolvedReference {
                kind: "element",
                name: root.clone(),
            })?
            .clone();
        self.walk_element(&decl, Occurs::ONE, visitor, true)
    }

    fn walk_element<V: SchemaVisitor>(
        &mut self,
        decl: &ElementDecl,
        occurs: Occurs,
        visitor: &mut V,
        expand_substitution: bool,
    ) -> Result<()> {
        if expand_substitution && self.set.is_substitution_head(&decl.name) {
            visitor.on_enter_substitution_group(decl, occurs)?;
            self.walk_element(decl, Occurs::ONE, visitor, false)?;
            let substitutes: Vec<QName> = self.set.substitutes_of(&decl.name).to_vec();
            for name in substitutes {
                let sub = self
                    .set
                    .element_by_qname(&name)
                    .ok_or_else(|| Error::UnresolvedReference {
                        kind: "element",
                        name: name.clone(),
                    })?
                    .clone();
                self.walk_element(&sub, Occurs::ONE, visitor, true)?;
            }
            visitor.on_exit_substitution_group(decl)?;
            return Ok(());
        }

        let previously_visited = !self.visited.insert(decl.name.clone());
        let scope = self.scoper.scope_of_element(decl)?;
        visitor.on_enter_element(decl, &scope, occurs, previously_visited)?;
        if !previously_visited {
            for attr in scope.attributes.values() {
                visitor.on_visit_attribute(decl, attr)?;
            }
            if let Some(any) = &scope.any_attribute {
                visitor.on_visit_any_attribute(decl, any)?;
            }
            if let Some(particle) = &scope.particle {
                self.walk_particle(particle, None, visitor)?;
            }
        }
        visitor.on_exit_element(decl, previously_visited)
    }

    /// `occurs_override` replaces the particle's own bounds; used when a
    /// group reference carries its own minOccurs/maxOccurs.
    fn walk_particle<V: SchemaVisitor>(
        &mut self,
        particle: &Particle,
        occurs_override: Option<Occurs>,
        visitor: &mut V,
    ) -> Result<()> {
        let occurs = occurs_override.unwrap_or_else(|| particle.occurs());
        match particle {
            Particle::Element(ep) => {
                let decl = self.resolve_element_ref(&ep.decl)?;
                self.walk_element(&decl, occurs, visitor, true)
            }
            Particle::Sequence(g) => {
                visitor.on_enter_sequence_group(occurs)?;
                for item in &g.items {
                    self.walk_particle(item, None, visitor)?;
                }
                visitor.on_exit_sequence_group()
            }
            Particle::Choice(g) => {
                visitor.on_enter_choice_group(occurs)?;
                for item in &g.items {
                    self.walk_particle(item, None, visitor)?;
                }
                visitor.on_exit_choice_group()
            }
            Particle::All(g) => {
                visitor.on_enter_all_group(occurs)?;
                for item in &g.items {
                    self.walk_particle(item, None, visitor)?;
                }
                visitor.on_exit_all_group()
            }
            Particle::GroupRef { name, occurs } => {
                let def = self
                    .set
                    .group_by_qname(name)
                    .ok_or_else(|| Error::UnresolvedReference {
                        kind: "group",
                        name: name.clone(),
                    })?
                    .clone();
                self.walk_particle(&def.particle, Some(*occurs), visitor)
            }
            Particle::Any(any) => visitor.on_visit_any(any),
        }
    }

    /// Element references resolve to the global target; minOccurs/maxOccurs
    /// stay with the referencing particle.
    fn resolve_element_ref(&self, r: &ElementRef) -> Result<ElementDecl> {
        match r {
            ElementRef::Decl(d) => Ok((**d).clone()),
            ElementRef::Ref(name) => self
                .set
                .element_by_qname(name)
                .cloned()
                .ok_or_else(|| Error::UnresolvedReference {
                    kind: "element",
                    name: name.clone(),
                }),
        }
    }
}
