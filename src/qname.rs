//! Qualified names: a `(namespace URI, local name)` pair.
//!
//! Equality is pairwise string equality; an empty namespace is equivalent
//! to "no namespace". The optional prefix is carried for diagnostics only
//! and never participates in equality or hashing.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QName {
    pub namespace: String,
    pub local: String,
    /// Prefix as seen in the source document, if any. Ignored for equality.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
}

impl QName {
    pub fn new(namespace: impl Into<String>, local: impl Into<String>) -> Self {
        QName {
            namespace: namespace.into(),
            local: local.into(),
            prefix: None,
        }
    }

    /// A name with no namespace.
    pub fn local(local: impl Into<String>) -> Self {
        QName::new("", local)
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        let p = prefix.into();
        self.prefix = if p.is_empty() { None } else { Some(p) };
        self
    }

    pub fn has_namespace(&self) -> bool {
        !self.namespace.is_empty()
    }

    /// Parse Clark notation `{namespace}local`, or a bare local name.
    pub fn parse(s: &str) -> Self {
        if let Some(rest) = s.strip_prefix('{') {
            if let Some((ns, local)) = rest.split_once('}') {
                return QName::new(ns, local);
            }
        }
        QName::local(s)
    }
}

impl PartialEq for QName {
    fn eq(&self, other: &Self) -> bool {
        self.namespace == other.namespace && self.local == other.local
    }
}

impl Eq for QName {}

impl std::hash::Hash for QName {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.namespace.hash(state);
        self.local.hash(state);
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{}", self.local)
        } else {
            write!(f, "{{{}}}{}", self.namespace, self.local)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_ignores_prefix() {
        let a = QName::new("urn:x", "item").with_prefix("p");
        let b = QName::new("urn:x", "item");
        assert_eq!(a, b);
    }

    #[test]
    fn clark_notation_round_trip() {
        let q = QName::parse("{urn:example}root");
        assert_eq!(q.namespace, "urn:example");
        assert_eq!(q.local, "root");
        assert_eq!(QName::parse(&q.to_string()), q);
        assert_eq!(QName::parse("plain"), QName::local("plain"));
    }
}
