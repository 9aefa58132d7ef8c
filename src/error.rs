//! Crate-wide error type.
//!
//! The schema walker, state machine generator and simple-type engine are
//! strict and propagate these errors. The path finder consumes
//! [`Error::UnknownElement`] / [`Error::NoPathMatches`] internally to drive
//! backtracking and only surfaces them once every alternative is exhausted.

use crate::qname::QName;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("unknown base simple type: {0}")]
    UnknownBaseType(QName),

    #[error("invalid restriction: {0}")]
    InvalidRestriction(String),

    #[error("value '{value}' violates facet {facet}: {detail}")]
    FacetViolation {
        value: String,
        facet: String,
        detail: String,
    },

    #[error("unresolved {kind} reference: {name}")]
    UnresolvedReference { kind: &'static str, name: QName },

    #[error("element {0} does not occur in the state machine")]
    UnknownElement(QName),

    #[error("no path through the state machine matches the document (failed near event {0})")]
    NoPathMatches(usize),

    #[error("xsi:nil=\"true\" on non-nillable element {0}")]
    NilabilityConflict(QName),

    #[error("no union member accepts value '{value}' for element {element}")]
    UnwritableValue { element: QName, value: String },

    #[error("cannot decode {kind} value for element {element}: {detail}")]
    UnreadableValue {
        element: QName,
        kind: String,
        detail: String,
    },

    #[error("record schema carries no xmlSchemas linkage")]
    UnlinkedSchema,

    #[error("record schema mismatch at {element}: {detail}")]
    RecordSchemaMismatch { element: QName, detail: String },

    #[error("XML parse error: {0}")]
    Xml(String),

    #[error("XSD parse error: {0}")]
    Xsd(String),

    #[error("record schema error: {0}")]
    Schema(String),

    #[error("binary codec error: {0}")]
    Codec(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<quick_xml::Error> for Error {
    fn from(e: quick_xml::Error) -> Self {
        Error::Xml(e.to_string())
    }
}

impl From<roxmltree::Error> for Error {
    fn from(e: roxmltree::Error) -> Self {
        Error::Xsd(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Schema(e.to_string())
    }
}
