//! Simple-type model: base types, type expressions, and literal conversion.
//!
//! [`SimpleTypeInfo`] is the canonical form the transducer consumes: an
//! atomic base plus merged facets, a list, a union, or a complex marker.
//! [`parse_literal`] / [`print_literal`] convert between lexical space and
//! typed values, honoring whitespace facets, enumerations, bounds, and
//! length facets. Pattern facets are carried through type derivation but not
//! enforced here.

use crate::error::{Error, Result};
use crate::facets::{self, FacetKind, FacetSet, WhiteSpace, XSD_NS};
use crate::qname::QName;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;

// ────────────────────────────────────────────────────────────────────────────
// Base simple types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BaseSimpleType {
    AnyType,
    AnySimpleType,
    String,
    Boolean,
    Decimal,
    Double,
    Float,
    Base64Binary,
    HexBinary,
    QName,
    Id,
    // Date/time family
    DateTime,
    Date,
    Time,
    GYearMonth,
    GYear,
    GMonthDay,
    GMonth,
    GDay,
    Duration,
    // Bounded integer family
    Byte,
    Short,
    Int,
    Long,
    Integer,
    NonPositiveInteger,
    NegativeInteger,
    NonNegativeInteger,
    PositiveInteger,
    UnsignedByte,
    UnsignedShort,
    UnsignedInt,
    UnsignedLong,
}

impl BaseSimpleType {
    /// Resolve an XSD built-in type name to its base. String-derived
    /// built-ins (token, NCName, …) resolve to `String`; their extra facets
    /// come from the facet table.
    pub fn from_xsd(namespace: &str, local: &str) -> Option<BaseSimpleType> {
        if namespace != XSD_NS {
            return None;
        }
        Some(match local {
            "anyType" => BaseSimpleType::AnyType,
            "anySimpleType" => BaseSimpleType::AnySimpleType,
            "string" | "normalizedString" | "token" | "language" | "Name" | "NCName"
            | "NMTOKEN" | "NMTOKENS" | "anyURI" | "NOTATION" | "ENTITY" | "ENTITIES"
            | "IDREF" | "IDREFS" => BaseSimpleType::String,
            "boolean" => BaseSimpleType::Boolean,
            "decimal" => BaseSimpleType::Decimal,
            "double" => BaseSimpleType::Double,
            "float" => BaseSimpleType::Float,
            "base64Binary" => BaseSimpleType::Base64Binary,
            "hexBinary" => BaseSimpleType::HexBinary,
            "QName" => BaseSimpleType::QName,
            "ID" => BaseSimpleType::Id,
            "dateTime" => BaseSimpleType::DateTime,
            "date" => BaseSimpleType::Date,
            "time" => BaseSimpleType::Time,
            "gYearMonth" => BaseSimpleType::GYearMonth,
            "gYear" => BaseSimpleType::GYear,
            "gMonthDay" => BaseSimpleType::GMonthDay,
            "gMonth" => BaseSimpleType::GMonth,
            "gDay" => BaseSimpleType::GDay,
            "duration" => BaseSimpleType::Duration,
            "byte" => BaseSimpleType::Byte,
            "short" => BaseSimpleType::Short,
            "int" => BaseSimpleType::Int,
            "long" => BaseSimpleType::Long,
            "integer" => BaseSimpleType::Integer,
            "nonPositiveInteger" => BaseSimpleType::NonPositiveInteger,
            "negativeInteger" => BaseSimpleType::NegativeInteger,
            "nonNegativeInteger" => BaseSimpleType::NonNegativeInteger,
            "positiveInteger" => BaseSimpleType::PositiveInteger,
            "unsignedByte" => BaseSimpleType::UnsignedByte,
            "unsignedShort" => BaseSimpleType::UnsignedShort,
            "unsignedInt" => BaseSimpleType::UnsignedInt,
            "unsignedLong" => BaseSimpleType::UnsignedLong,
            _ => return None,
        })
    }

    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            BaseSimpleType::Byte
                | BaseSimpleType::Short
                | BaseSimpleType::Int
                | BaseSimpleType::Long
                | BaseSimpleType::Integer
                | BaseSimpleType::NonPositiveInteger
                | BaseSimpleType::NegativeInteger
                | BaseSimpleType::NonNegativeInteger
                | BaseSimpleType::PositiveInteger
                | BaseSimpleType::UnsignedByte
                | BaseSimpleType::UnsignedShort
                | BaseSimpleType::UnsignedInt
                | BaseSimpleType::UnsignedLong
        )
    }

    /// True for the integer levels that fit a 32-bit value.
    pub fn fits_int(&self) -> bool {
        matches!(
            self,
            BaseSimpleType::Byte
                | BaseSimpleType::Short
                | BaseSimpleType::Int
                | BaseSimpleType::UnsignedByte
                | BaseSimpleType::UnsignedShort
        )
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Simple-type expressions
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum SimpleTypeInfo {
    Atomic {
        base: BaseSimpleType,
        facets: FacetSet,
        /// Named user type this atomic was derived from, if any.
        user_recognized: Option<QName>,
    },
    List {
        item: Box<SimpleTypeInfo>,
        facets: FacetSet,
    },
    Union {
        members: Vec<SimpleTypeInfo>,
        facets: FacetSet,
    },
    Complex {
        mixed: bool,
    },
}

impl SimpleTypeInfo {
    pub fn atomic(base: BaseSimpleType) -> Self {
        SimpleTypeInfo::Atomic {
            base,
            facets: FacetSet::new(),
            user_recognized: None,
        }
    }

    /// The info for an XSD built-in, with the built-in facet table applied.
    pub fn builtin(namespace: &str, local: &str) -> Option<Self> {
        let base = BaseSimpleType::from_xsd(namespace, local)?;
        Some(SimpleTypeInfo::Atomic {
            base,
            facets: facets::facet_set_for(namespace, local),
            user_recognized: None,
        })
    }

    pub fn facets(&self) -> Option<&FacetSet> {
        match self {
            SimpleTypeInfo::Atomic { facets, .. }
            | SimpleTypeInfo::List { facets, .. }
            | SimpleTypeInfo::Union { facets, .. } => Some(facets),
            SimpleTypeInfo::Complex { .. } => None,
        }
    }

    pub fn is_complex(&self) -> bool {
        matches!(self, SimpleTypeInfo::Complex { .. })
    }

    pub fn is_mixed(&self) -> bool {
        matches!(self, SimpleTypeInfo::Complex { mixed: true })
    }
}

/// Produce a restricted type preserving the parent's shape and recognized
/// user type. `merged` must already be the result of [`FacetSet::merge`]
/// over the parent and child facets.
pub fn restrict(parent: &SimpleTypeInfo, merged: FacetSet) -> Result<SimpleTypeInfo> {
    match parent {
        SimpleTypeInfo::Atomic {
            base,
            user_recognized,
            ..
        } => Ok(SimpleTypeInfo::Atomic {
            base: *base,
            facets: merged,
            user_recognized: user_recognized.clone(),
        }),
        SimpleTypeInfo::List { item, .. } => Ok(SimpleTypeInfo::List {
            item: item.clone(),
            facets: merged,
        }),
        SimpleTypeInfo::Union { members, .. } => Ok(SimpleTypeInfo::Union {
            members: members.clone(),
            facets: merged,
        }),
        SimpleTypeInfo::Complex { .. } => Err(Error::InvalidRestriction(
            "cannot restrict a complex type as a simple type".into(),
        )),
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Values
// ────────────────────────────────────────────────────────────────────────────

/// A parsed literal, aligned with the binary codec's primitive set.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Boolean(bool),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Bytes(Vec<u8>),
    String(String),
    List(Vec<Value>),
}

fn violation(value: &str, facet: FacetKind, detail: impl Into<String>) -> Error {
    Error::FacetViolation {
        value: value.to_string(),
        facet: facet.as_str().to_string(),
        detail: detail.into(),
    }
}

fn check_enumeration(facets: &FacetSet, text: &str) -> Result<()> {
    let symbols = facets.enumeration();
    if !symbols.is_empty() && !symbols.iter().any(|s| s == text) {
        return Err(violation(
            text,
            FacetKind::Enumeration,
            format!("expected one of {:?}", symbols),
        ));
    }
    Ok(())
}

fn check_length(facets: &FacetSet, text: &str) -> Result<()> {
    let len = text.chars().count();
    if let Some(v) = facets.get(FacetKind::Length) {
        if v.parse::<usize>().ok() != Some(len) {
            return Err(violation(text, FacetKind::Length, format!("length must be {}", v)));
        }
    }
    if let Some(v) = facets.get(FacetKind::MinLength) {
        if v.parse::<usize>().is_ok_and(|min| len < min) {
            return Err(violation(text, FacetKind::MinLength, format!("minimum length {}", v)));
        }
    }
    if let Some(v) = facets.get(FacetKind::MaxLength) {
        if v.parse::<usize>().is_ok_and(|max| len > max) {
            return Err(violation(text, FacetKind::MaxLength, format!("maximum length {}", v)));
        }
    }
    Ok(())
}

fn check_integer_bounds(facets: &FacetSet, text: &str, value: i128) -> Result<()> {
    let checks: [(FacetKind, fn(i128, i128) -> bool); 4] = [
        (FacetKind::MinInclusive, |v, b| v >= b),
        (FacetKind::MinExclusive, |v, b| v > b),
        (FacetKind::MaxInclusive, |v, b| v <= b),
        (FacetKind::MaxExclusive, |v, b| v < b),
    ];
    for (kind, ok) in checks {
        if let Some(bound) = facets.get(kind) {
            if let Ok(b) = bound.parse::<i128>() {
                if !ok(value, b) {
                    return Err(violation(text, kind, format!("bound {}", bound)));
                }
            }
        }
    }
    Ok(())
}

fn check_float_bounds(facets: &FacetSet, text: &str, value: f64) -> Result<()> {
    let checks: [(FacetKind, fn(f64, f64) -> bool); 4] = [
        (FacetKind::MinInclusive, |v, b| v >= b),
        (FacetKind::MinExclusive, |v, b| v > b),
        (FacetKind::MaxInclusive, |v, b| v <= b),
        (FacetKind::MaxExclusive, |v, b| v < b),
    ];
    for (kind, ok) in checks {
        if let Some(bound) = facets.get(kind) {
            if let Ok(b) = bound.parse::<f64>() {
                if !ok(value, b) {
                    return Err(violation(text, kind, format!("bound {}", bound)));
                }
            }
        }
    }
    Ok(())
}

fn parse_xsd_float(text: &str) -> Option<f64> {
    match text {
        "INF" | "+INF" => Some(f64::INFINITY),
        "-INF" => Some(f64::NEG_INFINITY),
        "NaN" => Some(f64::NAN),
        _ => text.parse::<f64>().ok(),
    }
}

fn decode_hex(text: &str) -> Option<Vec<u8>> {
    if text.len() % 2 != 0 {
        return None;
    }
    (0..text.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(text.get(i..i + 2)?, 16).ok())
        .collect()
}

fn encode_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{:02X}", b));
    }
    out
}

/// Normalize raw character data per the type's whitespace facet. Types
/// outside the string family collapse by default.
pub fn normalize(info: &SimpleTypeInfo, text: &str) -> String {
    let mode = match info {
        SimpleTypeInfo::Atomic { base, facets, .. } => {
            if facets.get(FacetKind::WhiteSpace).is_some() {
                facets.whitespace()
            } else if matches!(
                base,
                BaseSimpleType::String | BaseSimpleType::AnyType | BaseSimpleType::AnySimpleType
            ) {
                WhiteSpace::Preserve
            } else {
                WhiteSpace::Collapse
            }
        }
        SimpleTypeInfo::List { .. } => WhiteSpace::Collapse,
        SimpleTypeInfo::Union { .. } => WhiteSpace::Preserve,
        SimpleTypeInfo::Complex { .. } => WhiteSpace::Preserve,
    };
    facets::apply_whitespace(mode, text)
}

/// Parse a lexical literal into a typed [`Value`].
pub fn parse_literal(info: &SimpleTypeInfo, text: &str) -> Result<Value> {
    let text = normalize(info, text);
    match info {
        SimpleTypeInfo::Atomic { base, facets, .. } => {
            check_enumeration(facets, &text)?;
            parse_atomic(*base, facets, &text)
        }
        SimpleTypeInfo::List { item, facets } => {
            check_enumeration(facets, &text)?;
            let mut items = Vec::new();
            for token in text.split_whitespace() {
                items.push(parse_literal(item, token)?);
            }
            Ok(Value::List(items))
        }
        SimpleTypeInfo::Union { members, facets } => {
            check_enumeration(facets, &text)?;
            let mut last = None;
            for member in members {
                match parse_literal(member, &text) {
                    Ok(v) => return Ok(v),
                    Err(e) => last = Some(e),
                }
            }
            Err(last.unwrap_or_else(|| {
                Error::InvalidRestriction("union with no members".into())
            }))
        }
        SimpleTypeInfo::Complex { .. } => Err(Error::InvalidRestriction(
            "complex content has no literal form".into(),
        )),
    }
}

fn parse_atomic(base: BaseSimpleType, facets: &FacetSet, text: &str) -> Result<Value> {
    let bad = |detail: &str| Error::FacetViolation {
        value: text.to_string(),
        facet: "lexical".to_string(),
        detail: detail.to_string(),
    };
    match base {
        BaseSimpleType::Boolean => match text {
            "true" | "1" => Ok(Value::Boolean(true)),
            "false" | "0" => Ok(Value::Boolean(false)),
            _ => Err(bad("expected boolean")),
        },
        b if b.is_integer() => {
            let value: i128 = text.parse().map_err(|_| bad("expected integer"))?;
            check_integer_bounds(facets, text, value)?;
            if b.fits_int() {
                Ok(Value::Int(value as i32))
            } else {
                i64::try_from(value)
                    .map(Value::Long)
                    .map_err(|_| bad("integer exceeds 64 bits"))
            }
        }
        BaseSimpleType::Float => {
            let v = parse_xsd_float(text).ok_or_else(|| bad("expected float"))?;
            check_float_bounds(facets, text, v)?;
            Ok(Value::Float(v as f32))
        }
        BaseSimpleType::Double | BaseSimpleType::Decimal => {
            let v = parse_xsd_float(text).ok_or_else(|| bad("expected decimal"))?;
            check_float_bounds(facets, text, v)?;
            Ok(Value::Double(v))
        }
        BaseSimpleType::HexBinary => decode_hex(text)
            .map(Value::Bytes)
            .ok_or_else(|| bad("expected hex digits")),
        BaseSimpleType::Base64Binary => BASE64
            .decode(text.as_bytes())
            .map(Value::Bytes)
            .map_err(|_| bad("expected base64")),
        BaseSimpleType::QName => {
            // Without document bindings only the lexical shape can be
            // checked; [`parse_qname_literal`] resolves the prefix where
            // the in-scope namespaces are known.
            if text.is_empty() || text.split(':').count() > 2 {
                return Err(bad("expected QName"));
            }
            Ok(Value::String(text.to_string()))
        }
        _ => {
            check_length(facets, text)?;
            Ok(Value::String(text.to_string()))
        }
    }
}

/// Parse an `xs:QName` lexical value (`prefix:local` or `local`) against
/// in-scope prefix bindings, yielding its Clark-notation value form.
/// `resolve_prefix` maps a prefix (possibly `""` for the default namespace)
/// to a namespace URI; an undeclared prefix fails the literal, letting
/// union resolution move on to the next member.
pub fn parse_qname_literal(
    text: &str,
    resolve_prefix: impl Fn(&str) -> Option<String>,
) -> Result<Value> {
    let text = facets::apply_whitespace(WhiteSpace::Collapse, text);
    let bad = |detail: &str| Error::FacetViolation {
        value: text.clone(),
        facet: "lexical".to_string(),
        detail: detail.to_string(),
    };
    if text.is_empty() {
        return Err(bad("expected QName"));
    }
    let qname = match text.split_once(':') {
        Some((prefix, local)) => {
            if prefix.is_empty() || local.is_empty() || local.contains(':') {
                return Err(bad("expected QName"));
            }
            let ns = resolve_prefix(prefix).ok_or_else(|| bad("undeclared prefix"))?;
            QName::new(ns, local)
        }
        None => match resolve_prefix("") {
            Some(ns) => QName::new(ns, text.clone()),
            None => QName::local(text.clone()),
        },
    };
    Ok(Value::String(qname.to_string()))
}

/// Print a typed value in its canonical lexical form.
pub fn print_literal(info: &SimpleTypeInfo, value: &Value) -> Result<String> {
    match value {
        Value::Null => Ok(String::new()),
        Value::Boolean(b) => Ok(if *b { "true" } else { "false" }.to_string()),
        Value::Int(v) => Ok(v.to_string()),
        Value::Long(v) => Ok(v.to_string()),
        Value::Float(v) => Ok(print_float(*v as f64)),
        Value::Double(v) => Ok(print_float(*v)),
        Value::Bytes(bytes) => {
            let base = match info {
                SimpleTypeInfo::Atomic { base, .. } => *base,
                _ => BaseSimpleType::Base64Binary,
            };
            Ok(match base {
                BaseSimpleType::HexBinary => encode_hex(bytes),
                _ => BASE64.encode(bytes),
            })
        }
        Value::String(s) => Ok(s.clone()),
        Value::List(items) => {
            let item_info = match info {
                SimpleTypeInfo::List { item, .. } => item.as_ref().clone(),
                _ => SimpleTypeInfo::atomic(BaseSimpleType::String),
            };
            let mut parts = Vec::with_capacity(items.len());
            for item in items {
                parts.push(print_literal(&item_info, item)?);
            }
            Ok(parts.join(" "))
        }
    }
}

fn print_float(v: f64) -> String {
    if v.is_nan() {
        "NaN".to_string()
    } else if v == f64::INFINITY {
        "INF".to_string()
    } else if v == f64::NEG_INFINITY {
        "-INF".to_string()
    } else {
        v.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builtin(local: &str) -> SimpleTypeInfo {
        SimpleTypeInfo::builtin(XSD_NS, local).unwrap()
    }

    #[test]
    fn integer_bounds_enforced() {
        let byte = builtin("byte");
        assert_eq!(parse_literal(&byte, " 17 ").unwrap(), Value::Int(17));
        assert!(parse_literal(&byte, "200").is_err());
        let neg = builtin("negativeInteger");
        assert!(parse_literal(&neg, "0").is_err());
        assert_eq!(parse_literal(&neg, "-3").unwrap(), Value::Long(-3));
    }

    #[test]
    fn floats_with_special_values() {
        let d = builtin("double");
        assert_eq!(parse_literal(&d, "INF").unwrap(), Value::Double(f64::INFINITY));
        assert_eq!(print_literal(&d, &Value::Double(f64::NEG_INFINITY)).unwrap(), "-INF");
    }

    #[test]
    fn binary_forms() {
        let hex = builtin("hexBinary");
        assert_eq!(
            parse_literal(&hex, "0AFF").unwrap(),
            Value::Bytes(vec![0x0a, 0xff])
        );
        assert_eq!(
            print_literal(&hex, &Value::Bytes(vec![0x0a, 0xff])).unwrap(),
            "0AFF"
        );
        let b64 = builtin("base64Binary");
        assert_eq!(
            parse_literal(&b64, "aGk=").unwrap(),
            Value::Bytes(b"hi".to_vec())
        );
    }

    #[test]
    fn list_round_trip() {
        let list = SimpleTypeInfo::List {
            item: Box::new(builtin("unsignedLong")),
            facets: FacetSet::new(),
        };
        let v = parse_literal(&list, " 1  2 3 ").unwrap();
        assert_eq!(
            v,
            Value::List(vec![Value::Long(1), Value::Long(2), Value::Long(3)])
        );
        assert_eq!(print_literal(&list, &v).unwrap(), "1 2 3");
    }

    #[test]
    fn union_takes_first_accepting_member() {
        let u = SimpleTypeInfo::Union {
            members: vec![builtin("int"), builtin("string")],
            facets: FacetSet::new(),
        };
        assert_eq!(parse_literal(&u, "12").unwrap(), Value::Int(12));
        assert_eq!(
            parse_literal(&u, "twelve").unwrap(),
            Value::String("twelve".to_string())
        );
    }

    #[test]
    fn enumeration_restricts() {
        let mut f = FacetSet::new();
        f.add_enumeration("red");
        f.add_enumeration("green");
        let info = restrict(&builtin("string"), f).unwrap();
        assert!(parse_literal(&info, "red").is_ok());
        assert!(parse_literal(&info, "blue").is_err());
    }

    #[test]
    fn restricting_complex_fails() {
        let c = SimpleTypeInfo::Complex { mixed: false };
        assert!(restrict(&c, FacetSet::new()).is_err());
    }

    #[test]
    fn qname_literal_resolves_prefixes() {
        let resolve = |p: &str| match p {
            "m" => Some("urn:models".to_string()),
            "" => Some("urn:default".to_string()),
            _ => None,
        };
        assert_eq!(
            parse_qname_literal(" m:thing ", resolve).unwrap(),
            Value::String("{urn:models}thing".to_string())
        );
        assert_eq!(
            parse_qname_literal("bare", resolve).unwrap(),
            Value::String("{urn:default}bare".to_string())
        );
        assert!(parse_qname_literal("nope:thing", resolve).is_err());
        assert!(parse_qname_literal("a:b:c", resolve).is_err());
        // No default namespace: the name stays namespace-free.
        assert_eq!(
            parse_qname_literal("plain", |_| None).unwrap(),
            Value::String("plain".to_string())
        );
    }
}
