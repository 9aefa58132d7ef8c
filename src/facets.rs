//! Facet kinds, facet sets, and the built-in facet table.
//!
//! Each XSD built-in simple type carries implicit facets (whitespace
//! handling, numeric bounds, patterns). Until a schema library ships them
//! explicitly, [`facet_set_for`] enumerates them per XSD 1.0. The table is
//! built once per process and is read-only afterwards.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::OnceLock;

pub const XSD_NS: &str = "http://www.w3.org/2001/XMLSchema";
pub const XSI_NS: &str = "http://www.w3.org/2001/XMLSchema-instance";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FacetKind {
    Length,
    MinLength,
    MaxLength,
    Pattern,
    Enumeration,
    WhiteSpace,
    MaxInclusive,
    MaxExclusive,
    MinInclusive,
    MinExclusive,
    TotalDigits,
    FractionDigits,
}

impl FacetKind {
    /// Map an XSD facet element name to its kind.
    pub fn from_xsd_name(name: &str) -> Option<FacetKind> {
        Some(match name {
            "length" => FacetKind::Length,
            "minLength" => FacetKind::MinLength,
            "maxLength" => FacetKind::MaxLength,
            "pattern" => FacetKind::Pattern,
            "enumeration" => FacetKind::Enumeration,
            "whiteSpace" => FacetKind::WhiteSpace,
            "maxInclusive" => FacetKind::MaxInclusive,
            "maxExclusive" => FacetKind::MaxExclusive,
            "minInclusive" => FacetKind::MinInclusive,
            "minExclusive" => FacetKind::MinExclusive,
            "totalDigits" => FacetKind::TotalDigits,
            "fractionDigits" => FacetKind::FractionDigits,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FacetKind::Length => "length",
            FacetKind::MinLength => "minLength",
            FacetKind::MaxLength => "maxLength",
            FacetKind::Pattern => "pattern",
            FacetKind::Enumeration => "enumeration",
            FacetKind::WhiteSpace => "whiteSpace",
            FacetKind::MaxInclusive => "maxInclusive",
            FacetKind::MaxExclusive => "maxExclusive",
            FacetKind::MinInclusive => "minInclusive",
            FacetKind::MinExclusive => "minExclusive",
            FacetKind::TotalDigits => "totalDigits",
            FacetKind::FractionDigits => "fractionDigits",
        }
    }
}

/// Whitespace handling named by the `whiteSpace` facet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WhiteSpace {
    #[default]
    Preserve,
    Replace,
    Collapse,
}

/// A facet kind → restriction list map.
///
/// Enumeration may carry many values; every other kind carries exactly one.
/// Insertion order is preserved so enumeration ordinals are stable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FacetSet {
    facets: IndexMap<FacetKind, Vec<String>>,
}

impl FacetSet {
    pub fn new() -> Self {
        FacetSet::default()
    }

    pub fn is_empty(&self) -> bool {
        self.facets.is_empty()
    }

    /// Set a single-valued facet, replacing any previous restriction.
    pub fn set(&mut self, kind: FacetKind, value: impl Into<String>) {
        self.facets.insert(kind, vec![value.into()]);
    }

    /// Append an enumeration value.
    pub fn add_enumeration(&mut self, value: impl Into<String>) {
        self.facets
            .entry(FacetKind::Enumeration)
            .or_default()
            .push(value.into());
    }

    /// The single value of a non-enumeration facet, if restricted.
    pub fn get(&self, kind: FacetKind) -> Option<&str> {
        self.facets
            .get(&kind)
            .and_then(|v| v.first())
            .map(|s| s.as_str())
    }

    pub fn enumeration(&self) -> &[String] {
        self.facets
            .get(&FacetKind::Enumeration)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn whitespace(&self) -> WhiteSpace {
        match self.get(FacetKind::WhiteSpace) {
            Some("replace") => WhiteSpace::Replace,
            Some("collapse") => WhiteSpace::Collapse,
            Some(_) | None => WhiteSpace::Preserve,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (FacetKind, &[String])> {
        self.facets.iter().map(|(k, v)| (*k, v.as_slice()))
    }

    /// Merge `child` restrictions over `self`.
    ///
    /// Non-enumeration kinds: the child replaces the parent for the same
    /// kind. Enumeration: values append (duplicates are dropped so the merge
    /// stays idempotent). The result is the effective restriction.
    pub fn merge(&self, child: &FacetSet) -> FacetSet {
        let mut out = self.clone();
        for (kind, values) in child.facets.iter() {
            if *kind == FacetKind::Enumeration {
                let list = out.facets.entry(FacetKind::Enumeration).or_default();
                for v in values {
                    if !list.contains(v) {
                        list.push(v.clone());
                    }
                }
            } else {
                out.facets.insert(*kind, values.clone());
            }
        }
        out
    }
}

fn builtin_table() -> &'static HashMap<&'static str, FacetSet> {
    static TABLE: OnceLock<HashMap<&'static str, FacetSet>> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut t = HashMap::new();

        let ws = |mode: &str| {
            let mut f = FacetSet::new();
            f.set(FacetKind::WhiteSpace, mode);
            f
        };
        let collapse = || ws("collapse");

        // String family. Plain xs:string preserves whitespace and carries
        // no implicit facets at all.
        t.insert("normalizedString", ws("replace"));
        t.insert("token", collapse());
        for name in ["NMTOKEN", "Name", "NCName", "ID", "IDREF", "IDREFS", "ENTITY", "ENTITIES", "NMTOKENS", "language", "anyURI", "NOTATION", "QName"] {
            t.insert(name, collapse());
        }
        if let Some(f) = t.get_mut("language") {
            f.set(FacetKind::Pattern, "[a-zA-Z]{1,8}(-[a-zA-Z0-9]{1,8})*");
        }
        if let Some(f) = t.get_mut("NMTOKEN") {
            f.set(FacetKind::Pattern, r"\c+");
        }
        if let Some(f) = t.get_mut("Name") {
            f.set(FacetKind::Pattern, r"\i\c*");
        }
        if let Some(f) = t.get_mut("NCName") {
            f.set(FacetKind::Pattern, r"[\i-[:]][\c-[:]]*");
        }

        // Everything outside the string family collapses whitespace.
        for name in [
            "boolean", "decimal", "float", "double", "duration", "dateTime", "time", "date",
            "gYearMonth", "gYear", "gMonthDay", "gDay", "gMonth", "hexBinary", "base64Binary",
        ] {
            t.insert(name, collapse());
        }

        // The integer tower: each level narrows the bounds of its parent.
        let int_bounds = |min: Option<&str>, max: Option<&str>| {
            let mut f = collapse();
            f.set(FacetKind::FractionDigits, "0");
            f.set(FacetKind::Pattern, "[\\-+]?[0-9]+");
            if let Some(m) = min {
                f.set(FacetKind::MinInclusive, m);
            }
            if let Some(m) = max {
                f.set(FacetKind::MaxInclusive, m);
            }
            f
        };
        t.insert("integer", int_bounds(None, None));
        t.insert("nonPositiveInteger", int_bounds(None, Some("0")));
        t.insert("negativeInteger", int_bounds(None, Some("-1")));
        t.insert(
            "long",
            int_bounds(Some("-9223372036854775808"), Some("9223372036854775807")),
        );
        t.insert("int", int_bounds(Some("-2147483648"), Some("2147483647")));
        t.insert("short", int_bounds(Some("-32768"), Some("32767")));
        t.insert("byte", int_bounds(Some("-128"), Some("127")));
        t.insert("nonNegativeInteger", int_bounds(Some("0"), None));
        t.insert(
            "unsignedLong",
            int_bounds(Some("0"), Some("18446744073709551615")),
        );
        t.insert("unsignedInt", int_bounds(Some("0"), Some("4294967295")));
        t.insert("unsignedShort", int_bounds(Some("0"), Some("65535")));
        t.insert("unsignedByte", int_bounds(Some("0"), Some("255")));
        t.insert("positiveInteger", int_bounds(Some("1"), None));

        t
    })
}

/// The facets implicit in an XSD built-in type, keyed by its local name in
/// the XSD namespace. Unknown or facet-free built-ins (e.g. `string`,
/// `anySimpleType`) return an empty set.
pub fn facet_set_for(namespace: &str, local: &str) -> FacetSet {
    if namespace != XSD_NS {
        return FacetSet::new();
    }
    builtin_table().get(local).cloned().unwrap_or_default()
}

/// Apply a whitespace facet to raw character data.
pub fn apply_whitespace(mode: WhiteSpace, text: &str) -> String {
    match mode {
        WhiteSpace::Preserve => text.to_string(),
        WhiteSpace::Replace => text
            .chars()
            .map(|c| if matches!(c, '\t' | '\n' | '\r') { ' ' } else { c })
            .collect(),
        WhiteSpace::Collapse => text.split_whitespace().collect::<Vec<_>>().join(" "),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enums(values: &[&str]) -> FacetSet {
        let mut f = FacetSet::new();
        for v in values {
            f.add_enumeration(*v);
        }
        f
    }

    #[test]
    fn merge_replaces_bounds_and_appends_enums() {
        let mut parent = FacetSet::new();
        parent.set(FacetKind::MaxInclusive, "100");
        parent.add_enumeration("a");
        let mut child = FacetSet::new();
        child.set(FacetKind::MaxInclusive, "10");
        child.add_enumeration("b");
        let merged = parent.merge(&child);
        assert_eq!(merged.get(FacetKind::MaxInclusive), Some("10"));
        assert_eq!(merged.enumeration(), &["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn merge_is_associative_for_enumerations() {
        let a = enums(&["x"]);
        let b = enums(&["y"]);
        let c = enums(&["z", "x"]);
        assert_eq!(a.merge(&b).merge(&c), a.merge(&b.merge(&c)));
    }

    #[test]
    fn merge_is_idempotent() {
        let mut a = enums(&["x", "y"]);
        a.set(FacetKind::MinInclusive, "0");
        assert_eq!(a.merge(&a), a);
    }

    #[test]
    fn builtin_bounds() {
        let byte = facet_set_for(XSD_NS, "byte");
        assert_eq!(byte.get(FacetKind::MinInclusive), Some("-128"));
        assert_eq!(byte.get(FacetKind::MaxInclusive), Some("127"));
        assert_eq!(byte.whitespace(), WhiteSpace::Collapse);
        assert!(facet_set_for(XSD_NS, "string").is_empty());
        assert_eq!(
            facet_set_for(XSD_NS, "normalizedString").whitespace(),
            WhiteSpace::Replace
        );
    }

    #[test]
    fn whitespace_modes() {
        assert_eq!(apply_whitespace(WhiteSpace::Replace, "a\tb\nc"), "a b c");
        assert_eq!(apply_whitespace(WhiteSpace::Collapse, "  a \n b  "), "a b");
        assert_eq!(apply_whitespace(WhiteSpace::Preserve, " a "), " a ");
    }
}
