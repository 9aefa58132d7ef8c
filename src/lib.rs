//! Schema-aware transcoder between XML documents and record-oriented binary.
//!
//! An XSD supplies element grammar, cardinality, and simple-type facets; a
//! structurally matching record schema supplies the binary layout. A state
//! machine compiled from the XSD joins the two so documents stream through
//! without building a DOM:
//!
//! - [`xsd`] – schema model and loading
//! - [`scope`] / [`walker`] / [`machine`] – per-type closures, visitor
//!   traversal, and the compiled state graph
//! - [`pathfinder`] – streaming matcher with backtracking
//! - [`doctree`] – pooled document and path nodes
//! - [`record`] / [`applier`] – record schemas and their application to a
//!   parsed document
//! - [`transducer`] / [`binary`] – the two codec directions
//!
//! The `xmlrec` binary wraps [`TranscoderConfig`] for file-to-file use.

pub mod applier;
pub mod binary;
pub mod config;
pub mod doctree;
pub mod error;
pub mod facets;
pub mod machine;
pub mod pathfinder;
pub mod qname;
pub mod record;
pub mod scope;
pub mod simpletype;
pub mod transducer;
pub mod walker;
pub mod xml;
pub mod xsd;

pub use config::TranscoderConfig;
pub use error::{Error, Result};
pub use qname::QName;
pub use transducer::Transcoder;
