//! XSD document parsing.
//!
//! Walks a schema document with roxmltree and fills a [`SchemaSet`]. Each
//! `parse_*_node` function handles one schema construct; prefixed names in
//! attribute values are resolved against the in-scope namespaces of the node
//! that carries them.

use crate::error::{Error, Result};
use crate::facets::{FacetKind, FacetSet, XSD_NS};
use crate::qname::QName;
use crate::xsd::model::*;
use roxmltree::{Document, Node};

/// Per-document parsing context.
#[derive(Debug, Clone)]
struct Ctx {
    target_ns: String,
    qualified_elements: bool,
    qualified_attributes: bool,
}

/// Includes and imports discovered in a document, to be loaded by the caller.
#[derive(Debug, Clone, Default)]
pub struct PendingIncludes {
    pub locations: Vec<String>,
}

/// Parse one schema document into `set`, returning the include/import
/// locations it references.
pub fn parse_schema_text(set: &mut SchemaSet, text: &str) -> Result<PendingIncludes> {
    let doc = Document::parse(text)?;
    let root = doc.root_element();
    if root.tag_name().name() != "schema" || root.tag_name().namespace() != Some(XSD_NS) {
        return Err(Error::Xsd(format!(
            "expected xs:schema root, found <{}>",
            root.tag_name().name()
        )));
    }

    let ctx = Ctx {
        target_ns: root.attribute("targetNamespace").unwrap_or("").to_string(),
        qualified_elements: root.attribute("elementFormDefault") == Some("qualified"),
        qualified_attributes: root.attribute("attributeFormDefault") == Some("qualified"),
    };
    if !set.namespaces.iter().any(|ns| *ns == ctx.target_ns) {
        set.namespaces.push(ctx.target_ns.clone());
    }

    let mut pending = PendingIncludes::default();
    for child in root.children().filter(|c| c.is_element()) {
        match child.tag_name().name() {
            "element" => {
                let decl = parse_global_element_node(child, &ctx)?;
                set.elements.insert(decl.name.clone(), decl);
            }
            "complexType" => {
                let ct = parse_complex_type_node(child, &ctx)?;
                let name = ct
                    .name
                    .clone()
                    .ok_or_else(|| Error::Xsd("global complexType without name".into()))?;
                set.types.insert(name, TypeDef::Complex(ct));
            }
            "simpleType" => {
                let st = parse_simple_type_node(child, &ctx)?;
                let name = st
                    .name
                    .clone()
                    .ok_or_else(|| Error::Xsd("global simpleType without name".into()))?;
                set.types.insert(name, TypeDef::Simple(st));
            }
            "attribute" => {
                let decl = parse_attribute_node(child, &ctx, true)?;
                set.attributes.insert(decl.name.clone(), decl);
            }
            "attributeGroup" => {
                let group = parse_attribute_group_node(child, &ctx)?;
                set.attribute_groups.insert(group.name.clone(), group);
            }
            "group" => {
                let group = parse_group_def_node(child, &ctx)?;
                set.groups.insert(group.name.clone(), group);
            }
            "include" | "import" | "redefine" => {
                if let Some(loc) = child.attribute("schemaLocation") {
                    pending.locations.push(loc.to_string());
                }
            }
            "annotation" | "notation" => {}
            other => {
                tracing::debug!("ignoring top-level <{}> in schema", other);
            }
        }
    }
    Ok(pending)
}

// ────────────────────────────────────────────────────────────────────────────
// Name resolution
// ────────────────────────────────────────────────────────────────────────────

/// Resolve a possibly-prefixed name in an attribute value against the
/// namespaces in scope at `node`.
fn resolve_qname(node: Node, value: &str) -> QName {
    match value.split_once(':') {
        Some((prefix, local)) => {
            let ns = node.lookup_namespace_uri(Some(prefix)).unwrap_or("");
            QName::new(ns, local).with_prefix(prefix)
        }
        None => {
            let ns = node.lookup_namespace_uri(None).unwrap_or("");
            QName::new(ns, value)
        }
    }
}

fn occurs_of(node: Node) -> Result<Occurs> {
    let min = match node.attribute("minOccurs") {
        Some(v) => v
            .parse::<u32>()
            .map_err(|_| Error::Xsd(format!("bad minOccurs '{}'", v)))?,
        None => 1,
    };
    let max = match node.attribute("maxOccurs") {
        Some("unbounded") => MaxOccurs::Unbounded,
        Some(v) => MaxOccurs::Bounded(
            v.parse::<u32>()
                .map_err(|_| Error::Xsd(format!("bad maxOccurs '{}'", v)))?,
        ),
        None => MaxOccurs::Bounded(1),
    };
    Ok(Occurs::new(min, max))
}

// ────────────────────────────────────────────────────────────────────────────
// Elements
// ────────────────────────────────────────────────────────────────────────────

fn parse_global_element_node(node: Node, ctx: &Ctx) -> Result<ElementDecl> {
    let name = node
        .attribute("name")
        .ok_or_else(|| Error::Xsd("global element without name".into()))?;
    let mut decl = ElementDecl::named(QName::new(ctx.target_ns.clone(), name));
    fill_element_decl(&mut decl, node, ctx)?;
    Ok(decl)
}

fn fill_element_decl(decl: &mut ElementDecl, node: Node, ctx: &Ctx) -> Result<()> {
    if let Some(ty) = node.attribute("type") {
        decl.type_ref = Some(TypeRef::Named(resolve_qname(node, ty)));
    }
    decl.nillable = node.attribute("nillable") == Some("true");
    decl.default = node.attribute("default").map(str::to_string);
    decl.fixed = node.attribute("fixed").map(str::to_string);
    decl.abstract_decl = node.attribute("abstract") == Some("true");
    if let Some(sg) = node.attribute("substitutionGroup") {
        decl.substitution_group = Some(resolve_qname(node, sg));
    }
    for child in node.children().filter(|c| c.is_element()) {
        match child.tag_name().name() {
            "complexType" => {
                decl.type_ref = Some(TypeRef::Inline(Box::new(TypeDef::Complex(
                    parse_complex_type_node(child, ctx)?,
                ))));
            }
            "simpleType" => {
                decl.type_ref = Some(TypeRef::Inline(Box::new(TypeDef::Simple(
                    parse_simple_type_node(child, ctx)?,
                ))));
            }
            "annotation" | "unique" | "key" | "keyref" => {}
            other => {
                return Err(Error::Xsd(format!("unexpected <{}> inside element", other)));
            }
        }
    }
    Ok(())
}

fn parse_local_element_particle(node: Node, ctx: &Ctx) -> Result<ElementParticle> {
    let occurs = occurs_of(node)?;
    if let Some(r) = node.attribute("ref") {
        return Ok(ElementParticle {
            decl: ElementRef::Ref(resolve_qname(node, r)),
            occurs,
        });
    }
    let name = node
        .attribute("name")
        .ok_or_else(|| Error::Xsd("local element without name or ref".into()))?;
    let ns = if ctx.qualified_elements {
        ctx.target_ns.as_str()
    } else {
        ""
    };
    let mut decl = ElementDecl::named(QName::new(ns, name));
    fill_element_decl(&mut decl, node, ctx)?;
    Ok(ElementParticle {
        decl: ElementRef::Decl(Box::new(decl)),
        occurs,
    })
}

// ────────────────────────────────────────────────────────────────────────────
// Particles
// ────────────────────────────────────────────────────────────────────────────

fn parse_group_particle_node(node: Node, ctx: &Ctx) -> Result<GroupParticle> {
    let occurs = occurs_of(node)?;
    let mut items = Vec::new();
    for child in node.children().filter(|c| c.is_element()) {
        if let Some(p) = parse_particle_node(child, ctx)? {
            items.push(p);
        }
    }
    Ok(GroupParticle { items, occurs })
}

/// Parse a particle child; returns `None` for annotations.
fn parse_particle_node(node: Node, ctx: &Ctx) -> Result<Option<Particle>> {
    Ok(Some(match node.tag_name().name() {
        "element" => Particle::Element(parse_local_element_particle(node, ctx)?),
        "sequence" => Particle::Sequence(parse_group_particle_node(node, ctx)?),
        "choice" => Particle::Choice(parse_group_particle_node(node, ctx)?),
        "all" => Particle::All(parse_group_particle_node(node, ctx)?),
        "group" => {
            let name = node
                .attribute("ref")
                .ok_or_else(|| Error::Xsd("group particle without ref".into()))?;
            Particle::GroupRef {
                name: resolve_qname(node, name),
                occurs: occurs_of(node)?,
            }
        }
        "any" => Particle::Any(AnyParticle {
            namespace: node.attribute("namespace").unwrap_or("##any").to_string(),
            target_namespace: ctx.target_ns.clone(),
            process_contents: parse_process_contents(node),
            occurs: occurs_of(node)?,
        }),
        "annotation" => return Ok(None),
        other => {
            return Err(Error::Xsd(format!("unexpected particle <{}>", other)));
        }
    }))
}

fn parse_process_contents(node: Node) -> ProcessContents {
    match node.attribute("processContents") {
        Some("lax") => ProcessContents::Lax,
        Some("skip") => ProcessContents::Skip,
        _ => ProcessContents::Strict,
    }
}

fn parse_group_def_node(node: Node, ctx: &Ctx) -> Result<ModelGroupDef> {
    let name = node
        .attribute("name")
        .ok_or_else(|| Error::Xsd("group definition without name".into()))?;
    let mut particle = None;
    for child in node.children().filter(|c| c.is_element()) {
        match child.tag_name().name() {
            "sequence" | "choice" | "all" => {
                particle = parse_particle_node(child, ctx)?;
            }
            "annotation" => {}
            other => {
                return Err(Error::Xsd(format!("unexpected <{}> inside group", other)));
            }
        }
    }
    Ok(ModelGroupDef {
        name: QName::new(ctx.target_ns.clone(), name),
        particle: particle
            .ok_or_else(|| Error::Xsd("group definition without content model".into()))?,
    })
}

// ────────────────────────────────────────────────────────────────────────────
// Complex types
// ────────────────────────────────────────────────────────────────────────────

fn parse_complex_type_node(node: Node, ctx: &Ctx) -> Result<ComplexTypeDef> {
    let mut ct = ComplexTypeDef {
        name: node
            .attribute("name")
            .map(|n| QName::new(ctx.target_ns.clone(), n)),
        mixed: node.attribute("mixed") == Some("true"),
        content: ContentModel::Empty,
        attributes: Vec::new(),
        any_attribute: None,
    };

    for child in node.children().filter(|c| c.is_element()) {
        match child.tag_name().name() {
            "sequence" | "choice" | "all" | "group" => {
                if let Some(p) = parse_particle_node(child, ctx)? {
                    ct.content = ContentModel::Particle(p);
                }
            }
            "complexContent" => parse_complex_content_node(child, ctx, &mut ct)?,
            "simpleContent" => parse_simple_content_node(child, ctx, &mut ct)?,
            "attribute" | "attributeGroup" | "anyAttribute" => {
                parse_attr_item_node(child, ctx, &mut ct.attributes, &mut ct.any_attribute)?;
            }
            "annotation" => {}
            other => {
                return Err(Error::Xsd(format!(
                    "unexpected <{}> inside complexType",
                    other
                )));
            }
        }
    }
    Ok(ct)
}

fn parse_complex_content_node(node: Node, ctx: &Ctx, ct: &mut ComplexTypeDef) -> Result<()> {
    if node.attribute("mixed") == Some("true") {
        ct.mixed = true;
    }
    for child in node.children().filter(|c| c.is_element()) {
        let derivation = match child.tag_name().name() {
            "extension" => Derivation::Extension,
            "restriction" => Derivation::Restriction,
            "annotation" => continue,
            other => {
                return Err(Error::Xsd(format!(
                    "unexpected <{}> inside complexContent",
                    other
                )));
            }
        };
        let base = child
            .attribute("base")
            .ok_or_else(|| Error::Xsd("complexContent derivation without base".into()))?;
        let mut particle = None;
        for inner in child.children().filter(|c| c.is_element()) {
            match inner.tag_name().name() {
                "sequence" | "choice" | "all" | "group" => {
                    particle = parse_particle_node(inner, ctx)?;
                }
                "attribute" | "attributeGroup" | "anyAttribute" => {
                    parse_attr_item_node(inner, ctx, &mut ct.attributes, &mut ct.any_attribute)?;
                }
                "annotation" => {}
                other => {
                    return Err(Error::Xsd(format!(
                        "unexpected <{}> inside complexContent derivation",
                        other
                    )));
                }
            }
        }
        ct.content = ContentModel::Derived {
            base: resolve_qname(child, base),
            derivation,
            particle,
        };
    }
    Ok(())
}

fn parse_simple_content_node(node: Node, ctx: &Ctx, ct: &mut ComplexTypeDef) -> Result<()> {
    for child in node.children().filter(|c| c.is_element()) {
        let derivation = match child.tag_name().name() {
            "extension" => Derivation::Extension,
            "restriction" => Derivation::Restriction,
            "annotation" => continue,
            other => {
                return Err(Error::Xsd(format!(
                    "unexpected <{}> inside simpleContent",
                    other
                )));
            }
        };
        let base = child
            .attribute("base")
            .ok_or_else(|| Error::Xsd("simpleContent derivation without base".into()))?;
        let mut facets = FacetSet::new();
        for inner in child.children().filter(|c| c.is_element()) {
            let tag = inner.tag_name().name();
            match tag {
                "attribute" | "attributeGroup" | "anyAttribute" => {
                    parse_attr_item_node(inner, ctx, &mut ct.attributes, &mut ct.any_attribute)?;
                }
                "annotation" => {}
                _ => {
                    if let Some(kind) = FacetKind::from_xsd_name(tag) {
                        add_facet(&mut facets, kind, inner)?;
                    } else {
                        return Err(Error::Xsd(format!(
                            "unexpected <{}> inside simpleContent derivation",
                            tag
                        )));
                    }
                }
            }
        }
        ct.content = ContentModel::Simple {
            base: SimpleTypeRef::Named(resolve_qname(child, base)),
            derivation,
            facets,
        };
    }
    Ok(())
}

// ────────────────────────────────────────────────────────────────────────────
// Simple types
// ────────────────────────────────────────────────────────────────────────────

fn parse_simple_type_node(node: Node, ctx: &Ctx) -> Result<SimpleTypeDef> {
    let name = node
        .attribute("name")
        .map(|n| QName::new(ctx.target_ns.clone(), n));
    for child in node.children().filter(|c| c.is_element()) {
        match child.tag_name().name() {
            "restriction" => {
                let base = match child.attribute("base") {
                    Some(b) => SimpleTypeRef::Named(resolve_qname(child, b)),
                    None => {
                        let inline = child
                            .children()
                            .filter(|c| c.is_element())
                            .find(|c| c.tag_name().name() == "simpleType")
                            .ok_or_else(|| {
                                Error::Xsd("restriction without base or inline simpleType".into())
                            })?;
                        SimpleTypeRef::Inline(Box::new(parse_simple_type_node(inline, ctx)?))
                    }
                };
                let mut facets = FacetSet::new();
                for inner in child.children().filter(|c| c.is_element()) {
                    let tag = inner.tag_name().name();
                    if let Some(kind) = FacetKind::from_xsd_name(tag) {
                        add_facet(&mut facets, kind, inner)?;
                    }
                }
                return Ok(SimpleTypeDef {
                    name,
                    variety: SimpleVariety::Restriction { base, facets },
                });
            }
            "list" => {
                let item = match child.attribute("itemType") {
                    Some(t) => SimpleTypeRef::Named(resolve_qname(child, t)),
                    None => {
                        let inline = child
                            .children()
                            .filter(|c| c.is_element())
                            .find(|c| c.tag_name().name() == "simpleType")
                            .ok_or_else(|| {
                                Error::Xsd("list without itemType or inline simpleType".into())
                            })?;
                        SimpleTypeRef::Inline(Box::new(parse_simple_type_node(inline, ctx)?))
                    }
                };
                return Ok(SimpleTypeDef {
                    name,
                    variety: SimpleVariety::List { item },
                });
            }
            "union" => {
                let mut members = Vec::new();
                if let Some(list) = child.attribute("memberTypes") {
                    for m in list.split_whitespace() {
                        members.push(SimpleTypeRef::Named(resolve_qname(child, m)));
                    }
                }
                for inline in child
                    .children()
                    .filter(|c| c.is_element() && c.tag_name().name() == "simpleType")
                {
                    members.push(SimpleTypeRef::Inline(Box::new(parse_simple_type_node(
                        inline, ctx,
                    )?)));
                }
                return Ok(SimpleTypeDef {
                    name,
                    variety: SimpleVariety::Union { members },
                });
            }
            "annotation" => {}
            other => {
                return Err(Error::Xsd(format!(
                    "unexpected <{}> inside simpleType",
                    other
                )));
            }
        }
    }
    Err(Error::Xsd("simpleType without derivation".into()))
}

fn add_facet(facets: &mut FacetSet, kind: FacetKind, node: Node) -> Result<()> {
    let value = node
        .attribute("value")
        .ok_or_else(|| Error::Xsd(format!("facet {} without value", kind.as_str())))?;
    if kind == FacetKind::Enumeration {
        facets.add_enumeration(value);
    } else {
        facets.set(kind, value);
    }
    Ok(())
}

// ────────────────────────────────────────────────────────────────────────────
// Attributes
// ────────────────────────────────────────────────────────────────────────────

fn parse_attribute_node(node: Node, ctx: &Ctx, global: bool) -> Result<AttributeDecl> {
    let name = node
        .attribute("name")
        .ok_or_else(|| Error::Xsd("attribute without name".into()))?;
    let ns = if global || ctx.qualified_attributes {
        ctx.target_ns.as_str()
    } else {
        ""
    };
    let mut type_ref = node
        .attribute("type")
        .map(|t| SimpleTypeRef::Named(resolve_qname(node, t)));
    for child in node.children().filter(|c| c.is_element()) {
        if child.tag_name().name() == "simpleType" {
            type_ref = Some(SimpleTypeRef::Inline(Box::new(parse_simple_type_node(
                child, ctx,
            )?)));
        }
    }
    Ok(AttributeDecl {
        name: QName::new(ns, name),
        type_ref,
        use_kind: parse_use(node),
        default: node.attribute("default").map(str::to_string),
        fixed: node.attribute("fixed").map(str::to_string),
    })
}

fn parse_use(node: Node) -> AttrUseKind {
    match node.attribute("use") {
        Some("required") => AttrUseKind::Required,
        Some("prohibited") => AttrUseKind::Prohibited,
        _ => AttrUseKind::Optional,
    }
}

fn parse_attr_item_node(
    node: Node,
    ctx: &Ctx,
    items: &mut Vec<AttrItem>,
    any_attribute: &mut Option<AnyAttribute>,
) -> Result<()> {
    match node.tag_name().name() {
        "attribute" => {
            if let Some(r) = node.attribute("ref") {
                items.push(AttrItem::Ref {
                    name: resolve_qname(node, r),
                    use_kind: parse_use(node),
                });
            } else {
                items.push(AttrItem::Use(parse_attribute_node(node, ctx, false)?));
            }
        }
        "attributeGroup" => {
            let r = node
                .attribute("ref")
                .ok_or_else(|| Error::Xsd("attributeGroup use without ref".into()))?;
            items.push(AttrItem::GroupRef(resolve_qname(node, r)));
        }
        "anyAttribute" => {
            *any_attribute = Some(AnyAttribute {
                namespace: node.attribute("namespace").unwrap_or("##any").to_string(),
                process_contents: parse_process_contents(node),
            });
        }
        _ => {}
    }
    Ok(())
}

fn parse_attribute_group_node(node: Node, ctx: &Ctx) -> Result<AttributeGroup> {
    let name = node
        .attribute("name")
        .ok_or_else(|| Error::Xsd("attributeGroup without name".into()))?;
    let mut attributes = Vec::new();
    let mut any_attribute = None;
    for child in node.children().filter(|c| c.is_element()) {
        if child.tag_name().name() == "annotation" {
            continue;
        }
        parse_attr_item_node(child, ctx, &mut attributes, &mut any_attribute)?;
    }
    Ok(AttributeGroup {
        name: QName::new(ctx.target_ns.clone(), name),
        attributes,
        any_attribute,
    })
}
