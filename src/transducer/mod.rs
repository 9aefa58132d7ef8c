//! Transducer: the two directions of the transcoder.
//!
//! - [`writer`] – document events + annotated path → binary record value
//! - [`reader`] – binary record value → document events
//!
//! [`Transcoder`] bundles a compiled state machine with a record schema and
//! runs one transcode per call with its own pool; it is immutable and can be
//! shared across threads.

pub mod reader;
pub mod writer;

pub use reader::read_binary;
pub use writer::Writer;

use crate::applier::Applier;
use crate::doctree::NodePool;
use crate::error::Result;
use crate::machine::StateMachine;
use crate::pathfinder::PathFinder;
use crate::record::RecordSchema;
use crate::xml::{self, XmlEvent, XmlHandler, XmlTextSink};

pub struct Transcoder {
    machine: StateMachine,
    schema: RecordSchema,
}

impl Transcoder {
    pub fn new(machine: StateMachine, schema: RecordSchema) -> Self {
        Transcoder { machine, schema }
    }

    pub fn machine(&self) -> &StateMachine {
        &self.machine
    }

    pub fn schema(&self) -> &RecordSchema {
        &self.schema
    }

    /// Document text → binary record value.
    pub fn encode(&self, xml_text: &str) -> Result<Vec<u8>> {
        let events = xml::parse_document(xml_text)?;
        self.encode_events(&events)
    }

    /// Pre-parsed events → binary record value.
    pub fn encode_events(&self, events: &[XmlEvent]) -> Result<Vec<u8>> {
        let mut pool = NodePool::new();
        let found = PathFinder::find(&self.machine, &mut pool, events)?;
        Applier::new(&mut pool, &self.machine, &self.schema).apply(found.root)?;
        let writer = Writer::new(&self.machine, &pool, &self.schema, found.head, Vec::new());
        let out = writer.write(events)?;
        pool.clear();
        Ok(out)
    }

    /// Binary record value → document text.
    pub fn decode(&self, bytes: &[u8]) -> Result<String> {
        let mut sink = XmlTextSink::new();
        read_binary(&self.schema, bytes, &mut sink)?;
        Ok(sink.into_string())
    }

    /// Binary record value → events into a caller-supplied handler.
    pub fn decode_into<H: XmlHandler>(&self, bytes: &[u8], handler: &mut H) -> Result<()> {
        read_binary(&self.schema, bytes, handler)
    }
}
