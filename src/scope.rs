//! Per-type scopes: the complete closure an element type contributes.
//!
//! Scoping a type yields its full attribute set (inherited and
//! group-expanded), the effective particle after extension/restriction, the
//! merged any-attribute wildcard, and the [`SimpleTypeInfo`] the transducer
//! consumes. Scopes for named types are cached by qualified name; anonymous
//! types are scoped inline and never cached.

use crate::error::{Error, Result};
use crate::facets::{FacetSet, XSD_NS};
use crate::qname::QName;
use crate::simpletype::{self, BaseSimpleType, SimpleTypeInfo};
use crate::xsd::{
    AnyAttribute, AttrItem, AttrUseKind, AttributeDecl, ContentModel, Derivation, ElementDecl,
    GroupParticle, Occurs, Particle, SchemaSet, SimpleTypeDef, SimpleTypeRef, SimpleVariety,
    TypeDef, TypeRef,
};
use indexmap::IndexMap;
use std::collections::{HashMap, HashSet};

/// A fully resolved attribute use.
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub name: QName,
    pub type_info: SimpleTypeInfo,
    pub use_kind: AttrUseKind,
    pub default: Option<String>,
    pub fixed: Option<String>,
}

/// The closure of one type: what an element of this type can carry.
#[derive(Debug, Clone)]
pub struct Scope {
    pub attributes: IndexMap<QName, Attribute>,
    pub particle: Option<Particle>,
    pub any_attribute: Option<AnyAttribute>,
    pub simple: SimpleTypeInfo,
}

impl Scope {
    fn complex(mixed: bool) -> Self {
        Scope {
            attributes: IndexMap::new(),
            particle: None,
            any_attribute: None,
            simple: SimpleTypeInfo::Complex { mixed },
        }
    }

    fn simple(info: SimpleTypeInfo) -> Self {
        Scope {
            attributes: IndexMap::new(),
            particle: None,
            any_attribute: None,
            simple: info,
        }
    }
}

/// Computes and caches scopes against one schema set.
pub struct Scoper<'a> {
    set: &'a SchemaSet,
    cache: HashMap<QName, Scope>,
    in_progress: HashSet<QName>,
}

impl<'a> Scoper<'a> {
    pub fn new(set: &'a SchemaSet) -> Self {
        Scoper {
            set,
            cache: HashMap::new(),
            in_progress: HashSet::new(),
        }
    }

    pub fn schema_set(&self) -> &'a SchemaSet {
        self.set
    }

    /// Scope of an element declaration's type.
    pub fn scope_of_element(&mut self, decl: &ElementDecl) -> Result<Scope> {
        match &decl.type_ref {
            None => Ok(Scope::simple(SimpleTypeInfo::atomic(BaseSimpleType::AnyType))),
            Some(TypeRef::Named(name)) => self.scope_of_named(name),
            Some(TypeRef::Inline(def)) => self.scope_of_typedef(def),
        }
    }

    /// Scope of a named type; built-ins resolve through the facet table.
    pub fn scope_of_named(&mut self, name: &QName) -> Result<Scope> {
        if let Some(cached) = self.cache.get(name) {
            return Ok(cached.clone());
        }
        if name.namespace == XSD_NS {
            if let Some(info) = SimpleTypeInfo::builtin(&name.namespace, &name.local) {
                let scope = Scope::simple(info);
                self.cache.insert(name.clone(), scope.clone());
                return Ok(scope);
            }
        }
        if !self.in_progress.insert(name.clone()) {
            return Err(Error::InvalidRestriction(format!(
                "circular derivation through type {}",
                name
            )));
        }
        let result = match self.set.type_by_qname(name) {
            Some(def) => {
                let def = def.clone();
                self.scope_of_typedef(&def)
            }
            None => Err(Error::UnresolvedReference {
                kind: "type",
                name: name.clone(),
            }),
        };
        self.in_progress.remove(name);
        let scope = result?;
        self.cache.insert(name.clone(), scope.clone());
        Ok(scope)
    }

    pub fn scope_of_typedef(&mut self, def: &TypeDef) -> Result<Scope> {
        match def {
            TypeDef::Simple(s) => Ok(Scope::simple(self.simple_info_of_def(s)?)),
            TypeDef::Complex(c) => {
                let mut scope = Scope::complex(c.mixed);
                match &c.content {
                    ContentModel::Empty => {}
                    ContentModel::Particle(p) => {
                        scope.particle = Some(p.clone());
                    }
                    ContentModel::Derived {
                        base,
                        derivation,
                        particle,
                    } => {
                        let base_scope = self.scope_of_base(base)?;
                        match derivation {
                            Derivation::Extension => {
                                scope.attributes = base_scope.attributes;
                                scope.any_attribute = merge_any_attributes(
                                    base_scope.any_attribute,
                                    None,
                                );
                                scope.particle = concat_particles(
                                    base_scope.particle,
                                    particle.clone(),
                                );
                            }
                            Derivation::Restriction => {
                                // Attributes inherit; the child may override
                                // below. The particle is replaced wholesale.
                                scope.attributes = base_scope.attributes;
                                scope.particle = particle.clone();
                                scope.any_attribute = None;
                            }
                        }
                    }
                    ContentModel::Simple {
                        base,
                        derivation,
                        facets,
                    } => {
                        let base_info = self.simple_info_of_ref(base)?;
                        let base_attrs = self.simple_content_base_attributes(base)?;
                        scope.attributes = base_attrs;
                        scope.simple = match derivation {
                            Derivation::Extension => base_info,
                            Derivation::Restriction => {
                                let merged = match base_info.facets() {
                                    Some(parent) => parent.merge(facets),
                                    None => facets.clone(),
                                };
                                simpletype::restrict(&base_info, merged)?
                            }
                        };
                    }
                }
                self.apply_attr_items(&c.attributes, &mut scope.attributes)?;
                if let Some(own) = &c.any_attribute {
                    scope.any_attribute =
                        merge_any_attributes(scope.any_attribute.take(), Some(own.clone()));
                }
                Ok(scope)
            }
        }
    }

    fn scope_of_base(&mut self, base: &QName) -> Result<Scope> {
        if base.namespace == XSD_NS && (base.local == "anyType" || base.local == "anySimpleType") {
            return Ok(Scope::complex(false));
        }
        self.scope_of_named(base)
    }

    /// Attributes contributed by a simpleContent base that is itself a
    /// complex type with simple content.
    fn simple_content_base_attributes(
        &mut self,
        base: &SimpleTypeRef,
    ) -> Result<IndexMap<QName, Attribute>> {
        if let SimpleTypeRef::Named(name) = base {
            if name.namespace != XSD_NS {
                if let Some(TypeDef::Complex(_)) = self.set.type_by_qname(name) {
                    return Ok(self.scope_of_named(name)?.attributes);
                }
            }
        }
        Ok(IndexMap::new())
    }

    // ── Simple-type info ────────────────────────────────────────────────

    pub fn simple_info_of_ref(&mut self, r: &SimpleTypeRef) -> Result<SimpleTypeInfo> {
        match r {
            SimpleTypeRef::Named(name) => self.simple_info_of_named(name),
            SimpleTypeRef::Inline(def) => self.simple_info_of_def(def),
        }
    }

    pub fn simple_info_of_named(&mut self, name: &QName) -> Result<SimpleTypeInfo> {
        if name.namespace == XSD_NS {
            return SimpleTypeInfo::builtin(&name.namespace, &name.local)
                .ok_or_else(|| Error::UnknownBaseType(name.clone()));
        }
        let scope = self.scope_of_named(name)?;
        // A simpleContent complex type still carries usable simple info;
        // element-only content does not.
        if scope.simple.is_complex() {
            return Err(Error::InvalidRestriction(format!(
                "type {} has complex content where simple content is required",
                name
            )));
        }
        Ok(scope.simple)
    }

    pub fn simple_info_of_def(&mut self, def: &SimpleTypeDef) -> Result<SimpleTypeInfo> {
        let info = match &def.variety {
            SimpleVariety::Restriction { base, facets } => {
                let base_info = self.simple_info_of_ref(base)?;
                let merged = match base_info.facets() {
                    Some(parent) => parent.merge(facets),
                    None => facets.clone(),
                };
                simpletype::restrict(&base_info, merged)?
            }
            SimpleVariety::List { item } => SimpleTypeInfo::List {
                item: Box::new(self.simple_info_of_ref(item)?),
                facets: FacetSet::new(),
            },
            SimpleVariety::Union { members } => {
                let mut infos = Vec::with_capacity(members.len());
                for m in members {
                    infos.push(self.simple_info_of_ref(m)?);
                }
                SimpleTypeInfo::Union {
                    members: infos,
                    facets: FacetSet::new(),
                }
            }
        };
        // A named user type becomes the recognized type of its atomic form
        // unless a parent already claimed it.
        Ok(match (info, &def.name) {
            (
                SimpleTypeInfo::Atomic {
                    base,
                    facets,
                    user_recognized: None,
                },
                Some(name),
            ) if name.namespace != XSD_NS => SimpleTypeInfo::Atomic {
                base,
                facets,
                user_recognized: Some(name.clone()),
            },
            (info, _) => info,
        })
    }

    // ── Attribute resolution ────────────────────────────────────────────

    /// Expand attribute items (uses, refs, group refs) into the flat map.
    /// Child entries override inherited entries of the same name in place;
    /// prohibited uses remove them.
    fn apply_attr_items(
        &mut self,
        items: &[AttrItem],
        out: &mut IndexMap<QName, Attribute>,
    ) -> Result<()> {
        let mut seen_groups = HashSet::new();
        self.apply_attr_items_inner(items, out, &mut seen_groups)
    }

    fn apply_attr_items_inner(
        &mut self,
        items: &[AttrItem],
        out: &mut IndexMap<QName, Attribute>,
        seen_groups: &mut HashSet<QName>,
    ) -> Result<()> {
        for item in items {
            match item {
                AttrItem::Use(decl) => {
                    self.apply_attribute(decl, decl.use_kind, out)?;
                }
                AttrItem::Ref { name, use_kind } => {
                    let global = self
                        .set
                        .attribute_by_qname(name)
                        .ok_or_else(|| Error::UnresolvedReference {
                            kind: "attribute",
                            name: name.clone(),
                        })?
                        .clone();
                    self.apply_attribute(&global, *use_kind, out)?;
                }
                AttrItem::GroupRef(name) => {
                    if !seen_groups.insert(name.clone()) {
                        continue;
                    }
                    let group = self
                        .set
                        .attribute_group_by_qname(name)
                        .ok_or_else(|| Error::UnresolvedReference {
                            kind: "attribute group",
                            name: name.clone(),
                        })?
                        .clone();
                    self.apply_attr_items_inner(&group.attributes, out, seen_groups)?;
                }
            }
        }
        Ok(())
    }

    fn apply_attribute(
        &mut self,
        decl: &AttributeDecl,
        use_kind: AttrUseKind,
        out: &mut IndexMap<QName, Attribute>,
    ) -> Result<()> {
        if use_kind == AttrUseKind::Prohibited {
            out.shift_remove(&decl.name);
            return Ok(());
        }
        let type_info = match &decl.type_ref {
            Some(r) => self.simple_info_of_ref(r)?,
            None => SimpleTypeInfo::atomic(BaseSimpleType::AnySimpleType),
        };
        let attr = Attribute {
            name: decl.name.clone(),
            type_info,
            use_kind,
            default: decl.default.clone(),
            fixed: decl.fixed.clone(),
        };
        // Preserve the inherited position on override.
        if let Some(slot) = out.get_mut(&decl.name) {
            *slot = attr;
        } else {
            out.insert(decl.name.clone(), attr);
        }
        Ok(())
    }
}

/// Concatenate a base particle and an extension particle as a synthetic
/// sequence, preserving order.
fn concat_particles(base: Option<Particle>, ext: Option<Particle>) -> Option<Particle> {
    match (base, ext) {
        (None, p) | (p, None) => p,
        (Some(b), Some(e)) => Some(Particle::Sequence(GroupParticle {
            items: vec![b, e],
            occurs: Occurs::ONE,
        })),
    }
}

/// Union of any-attribute wildcards across an extension chain.
fn merge_any_attributes(
    base: Option<AnyAttribute>,
    own: Option<AnyAttribute>,
) -> Option<AnyAttribute> {
    match (base, own) {
        (None, x) | (x, None) => x,
        (Some(b), Some(o)) => {
            let namespace = if b.namespace == o.namespace {
                o.namespace
            } else {
                format!("{} {}", b.namespace, o.namespace)
            };
            Some(AnyAttribute {
                namespace,
                process_contents: o.process_contents,
            })
        }
    }
}
