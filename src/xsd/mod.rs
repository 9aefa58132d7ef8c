//! XSD schema collection: model, parser, and loading.
//!
//! - [`model`] – read-only schema object model ([`SchemaSet`])
//! - [`reader`] – roxmltree-based parsing of schema documents
//!
//! [`SchemaLoader`] ties them together: it reads schema text through a
//! [`SchemaSource`], parses it, and follows `xs:include` / `xs:import`
//! locations relative to the including document and the configured base
//! directories.

pub mod model;
pub mod reader;

pub use model::*;

use crate::error::{Error, Result};
use camino::{Utf8Path, Utf8PathBuf};
use std::collections::{BTreeSet, HashMap};

/// Where schema text comes from. Implementations cover the filesystem and
/// in-memory documents; callers with remote schemas provide their own.
pub trait SchemaSource {
    fn read_to_string(&mut self, location: &Utf8Path) -> Result<String>;
}

/// Reads schema files from disk.
pub struct FsSchemaSource;

impl SchemaSource for FsSchemaSource {
    fn read_to_string(&mut self, location: &Utf8Path) -> Result<String> {
        std::fs::read_to_string(location.as_std_path()).map_err(Error::Io)
    }
}

/// In-memory schema documents keyed by location string.
#[derive(Default)]
pub struct MemSchemaSource {
    files: HashMap<String, String>,
}

impl MemSchemaSource {
    pub fn new() -> Self {
        MemSchemaSource::default()
    }

    pub fn insert(&mut self, location: impl Into<String>, text: impl Into<String>) {
        self.files.insert(location.into(), text.into());
    }
}

impl SchemaSource for MemSchemaSource {
    fn read_to_string(&mut self, location: &Utf8Path) -> Result<String> {
        self.files
            .get(location.as_str())
            .cloned()
            .ok_or_else(|| Error::Xsd(format!("schema not found: {}", location)))
    }
}

/// Loads a schema collection, resolving includes against multiple base
/// directories in order.
pub struct SchemaLoader<S: SchemaSource> {
    source: S,
    base_dirs: Vec<Utf8PathBuf>,
    loaded: BTreeSet<String>,
}

impl<S: SchemaSource> SchemaLoader<S> {
    pub fn new(source: S) -> Self {
        SchemaLoader {
            source,
            base_dirs: Vec::new(),
            loaded: BTreeSet::new(),
        }
    }

    pub fn with_base_dir(mut self, dir: impl AsRef<Utf8Path>) -> Self {
        self.base_dirs.push(dir.as_ref().to_path_buf());
        self
    }

    /// Load the schema document at `location` plus everything it includes.
    pub fn load(&mut self, set: &mut SchemaSet, location: impl AsRef<Utf8Path>) -> Result<()> {
        self.load_inner(set, location.as_ref(), None)?;
        set.reindex_substitution_groups();
        Ok(())
    }

    /// Parse schema text that did not come from a location. Includes are
    /// resolved against the configured base directories only.
    pub fn load_text(&mut self, set: &mut SchemaSet, text: &str) -> Result<()> {
        let pending = reader::parse_schema_text(set, text)?;
        for loc in pending.locations {
            self.load_inner(set, Utf8Path::new(&loc), None)?;
        }
        set.reindex_substitution_groups();
        Ok(())
    }

    fn load_inner(
        &mut self,
        set: &mut SchemaSet,
        location: &Utf8Path,
        relative_to: Option<&Utf8Path>,
    ) -> Result<()> {
        let resolved = self.resolve(location, relative_to)?;
        if !self.loaded.insert(resolved.as_str().to_string()) {
            return Ok(());
        }
        let text = self.source.read_to_string(&resolved)?;
        let pending = reader::parse_schema_text(set, &text)?;
        let parent = resolved.parent().map(|p| p.to_path_buf());
        for loc in pending.locations {
            self.load_inner(set, Utf8Path::new(&loc), parent.as_deref())?;
        }
        Ok(())
    }

    /// Try the including document's directory first, then each base
    /// directory, then the location as given.
    fn resolve(&mut self, location: &Utf8Path, relative_to: Option<&Utf8Path>) -> Result<Utf8PathBuf> {
        if location.is_absolute() {
            return Ok(location.to_path_buf());
        }
        let mut candidates = Vec::new();
        if let Some(dir) = relative_to {
            candidates.push(dir.join(location));
        }
        for base in &self.base_dirs {
            candidates.push(base.join(location));
        }
        candidates.push(location.to_path_buf());
        for candidate in &candidates {
            if self.source.read_to_string(candidate).is_ok() {
                return Ok(candidate.clone());
            }
        }
        Ok(candidates.pop().expect("at least one candidate"))
    }
}
