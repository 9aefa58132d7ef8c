//! XSD object model.
//!
//! A read-only representation of a parsed schema collection: global element,
//! type, attribute, and group declarations, plus the particles that make up
//! complex content models. Loaded by [`crate::xsd::reader`] and consumed by
//! the scoper and walker. Declaration order is preserved everywhere; it is
//! the authoritative tie-break for state machine construction.

use crate::facets::FacetSet;
use crate::qname::QName;
use indexmap::IndexMap;

// ────────────────────────────────────────────────────────────────────────────
// Occurrence bounds
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaxOccurs {
    Bounded(u32),
    Unbounded,
}

impl MaxOccurs {
    pub fn admits(&self, count: u32) -> bool {
        match self {
            MaxOccurs::Bounded(max) => count < *max,
            MaxOccurs::Unbounded => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Occurs {
    pub min: u32,
    pub max: MaxOccurs,
}

impl Occurs {
    pub const ONE: Occurs = Occurs {
        min: 1,
        max: MaxOccurs::Bounded(1),
    };

    pub fn new(min: u32, max: MaxOccurs) -> Self {
        Occurs { min, max }
    }

    pub fn optional(&self) -> bool {
        self.min == 0
    }
}

impl Default for Occurs {
    fn default() -> Self {
        Occurs::ONE
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Declarations
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ElementDecl {
    pub name: QName,
    /// `None` means no declared type: content is `xs:anyType`.
    pub type_ref: Option<TypeRef>,
    pub nillable: bool,
    pub default: Option<String>,
    pub fixed: Option<String>,
    pub substitution_group: Option<QName>,
    pub abstract_decl: bool,
}

impl ElementDecl {
    pub fn named(name: QName) -> Self {
        ElementDecl {
            name,
            type_ref: None,
            nillable: false,
            default: None,
            fixed: None,
            substitution_group: None,
            abstract_decl: false,
        }
    }
}

#[derive(Debug, Clone)]
pub enum TypeRef {
    Named(QName),
    Inline(Box<TypeDef>),
}

#[derive(Debug, Clone)]
pub enum TypeDef {
    Simple(SimpleTypeDef),
    Complex(ComplexTypeDef),
}

impl TypeDef {
    pub fn name(&self) -> Option<&QName> {
        match self {
            TypeDef::Simple(s) => s.name.as_ref(),
            TypeDef::Complex(c) => c.name.as_ref(),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Simple types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct SimpleTypeDef {
    pub name: Option<QName>,
    pub variety: SimpleVariety,
}

#[derive(Debug, Clone)]
pub enum SimpleVariety {
    Restriction {
        base: SimpleTypeRef,
        facets: FacetSet,
    },
    List {
        item: SimpleTypeRef,
    },
    Union {
        members: Vec<SimpleTypeRef>,
    },
}

#[derive(Debug, Clone)]
pub enum SimpleTypeRef {
    Named(QName),
    Inline(Box<SimpleTypeDef>),
}

// ────────────────────────────────────────────────────────────────────────────
// Complex types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ComplexTypeDef {
    pub name: Option<QName>,
    pub mixed: bool,
    pub content: ContentModel,
    /// Attribute uses and attribute-group references, in declaration order.
    pub attributes: Vec<AttrItem>,
    pub any_attribute: Option<AnyAttribute>,
}

#[derive(Debug, Clone)]
pub enum ContentModel {
    Empty,
    /// A particle directly under the type declaration.
    Particle(Particle),
    /// `complexContent` extension or restriction of a named base.
    Derived {
        base: QName,
        derivation: Derivation,
        particle: Option<Particle>,
    },
    /// `simpleContent` extension or restriction.
    Simple {
        base: SimpleTypeRef,
        derivation: Derivation,
        facets: FacetSet,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Derivation {
    Extension,
    Restriction,
}

// ────────────────────────────────────────────────────────────────────────────
// Particles
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub enum Particle {
    Element(ElementParticle),
    Sequence(GroupParticle),
    Choice(GroupParticle),
    All(GroupParticle),
    GroupRef { name: QName, occurs: Occurs },
    Any(AnyParticle),
}

impl Particle {
    pub fn occurs(&self) -> Occurs {
        match self {
            Particle::Element(e) => e.occurs,
            Particle::Sequence(g) | Particle::Choice(g) | Particle::All(g) => g.occurs,
            Particle::GroupRef { occurs, .. } => *occurs,
            Particle::Any(a) => a.occurs,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ElementParticle {
    pub decl: ElementRef,
    pub occurs: Occurs,
}

#[derive(Debug, Clone)]
pub enum ElementRef {
    /// Reference to a global element; occurrence bounds stay local.
    Ref(QName),
    Decl(Box<ElementDecl>),
}

#[derive(Debug, Clone)]
pub struct GroupParticle {
    pub items: Vec<Particle>,
    pub occurs: Occurs,
}

#[derive(Debug, Clone)]
pub struct AnyParticle {
    /// Raw namespace constraint (`##any`, `##other`, or a URI list that may
    /// include `##targetNamespace` / `##local`).
    pub namespace: String,
    /// Target namespace of the schema document declaring the wildcard;
    /// `##other` and `##targetNamespace` resolve against it.
    pub target_namespace: String,
    pub process_contents: ProcessContents,
    pub occurs: Occurs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProcessContents {
    #[default]
    Strict,
    Lax,
    Skip,
}

// ────────────────────────────────────────────────────────────────────────────
// Attributes
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AttrUseKind {
    Required,
    #[default]
    Optional,
    Prohibited,
}

#[derive(Debug, Clone)]
pub struct AttributeDecl {
    pub name: QName,
    /// `None` means `xs:anySimpleType`.
    pub type_ref: Option<SimpleTypeRef>,
    pub use_kind: AttrUseKind,
    pub default: Option<String>,
    pub fixed: Option<String>,
}

#[derive(Debug, Clone)]
pub enum AttrItem {
    /// A local attribute use or a resolved `ref` to a global attribute.
    Use(AttributeDecl),
    Ref { name: QName, use_kind: AttrUseKind },
    GroupRef(QName),
}

#[derive(Debug, Clone)]
pub struct AttributeGroup {
    pub name: QName,
    pub attributes: Vec<AttrItem>,
    pub any_attribute: Option<AnyAttribute>,
}

#[derive(Debug, Clone)]
pub struct AnyAttribute {
    pub namespace: String,
    pub process_contents: ProcessContents,
}

#[derive(Debug, Clone)]
pub struct ModelGroupDef {
    pub name: QName,
    pub particle: Particle,
}

// ────────────────────────────────────────────────────────────────────────────
// Schema set
// ────────────────────────────────────────────────────────────────────────────

/// A parsed collection of schema documents, indexed by qualified name.
#[derive(Debug, Clone, Default)]
pub struct SchemaSet {
    pub elements: IndexMap<QName, ElementDecl>,
    pub types: IndexMap<QName, TypeDef>,
    pub attributes: IndexMap<QName, AttributeDecl>,
    pub attribute_groups: IndexMap<QName, AttributeGroup>,
    pub groups: IndexMap<QName, ModelGroupDef>,
    /// Target namespaces of the loaded schema documents, in load order.
    pub namespaces: Vec<String>,
    /// Substitution-group head → substitute elements, in declaration order.
    substitution_index: IndexMap<QName, Vec<QName>>,
}

impl SchemaSet {
    pub fn element_by_qname(&self, name: &QName) -> Option<&ElementDecl> {
        self.elements.get(name)
    }

    pub fn type_by_qname(&self, name: &QName) -> Option<&TypeDef> {
        self.types.get(name)
    }

    pub fn attribute_by_qname(&self, name: &QName) -> Option<&AttributeDecl> {
        self.attributes.get(name)
    }

    pub fn attribute_group_by_qname(&self, name: &QName) -> Option<&AttributeGroup> {
        self.attribute_groups.get(name)
    }

    pub fn group_by_qname(&self, name: &QName) -> Option<&ModelGroupDef> {
        self.groups.get(name)
    }

    /// Substitute elements declared for a group head, in index order.
    pub fn substitutes_of(&self, head: &QName) -> &[QName] {
        self.substitution_index
            .get(head)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn is_substitution_head(&self, name: &QName) -> bool {
        self.substitution_index.contains_key(name)
    }

    /// Rebuild the head → substitutes index from element declarations.
    /// Called once after every schema document has been loaded.
    pub fn reindex_substitution_groups(&mut self) {
        self.substitution_index.clear();
        let pairs: Vec<(QName, QName)> = self
            .elements
            .values()
            .filter_map(|e| {
                e.substitution_group
                    .as_ref()
                    .map(|head| (head.clone(), e.name.clone()))
            })
            .collect();
        for (head, member) in pairs {
            self.substitution_index.entry(head).or_default().push(member);
        }
    }
}
