//! Transcoder configuration: where the XSD comes from and which element is
//! the document root.
//!
//! The same shape appears in two places: as the caller-facing configuration
//! object, and as the `xmlSchemas` property stamped into generated record
//! schemas so a reader can find its way back to the XSD.

use crate::error::{Error, Result};
use crate::machine::StateMachine;
use crate::qname::QName;
use crate::record::{self, RecordSchema, RootTag, XmlSchemasProp};
use crate::transducer::Transcoder;
use crate::xsd::{FsSchemaSource, SchemaLoader, SchemaSet, SchemaSource};
use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscoderConfig {
    /// Base directory for resolving includes and relative schema files.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_uri: Option<Utf8PathBuf>,
    /// Inline schema documents.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<String>,
    /// Schema locations resolved through the configured source.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub schema_urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub schema_files: Vec<Utf8PathBuf>,
    pub root_tag: RootTag,
}

impl TranscoderConfig {
    pub fn validate(&self) -> Result<()> {
        if self.sources.is_empty() && self.schema_urls.is_empty() && self.schema_files.is_empty() {
            return Err(Error::Xsd(
                "configuration names no schema sources, urls, or files".into(),
            ));
        }
        if self.root_tag.local_part.is_empty() {
            return Err(Error::Xsd("configuration has no root tag".into()));
        }
        Ok(())
    }

    pub fn root_qname(&self) -> QName {
        self.root_tag.qname()
    }

    /// Rebuild a configuration from the linkage property of a record schema.
    pub fn from_linkage(props: &XmlSchemasProp) -> Self {
        TranscoderConfig {
            base_uri: props.base_uri.clone().map(Utf8PathBuf::from),
            sources: Vec::new(),
            schema_urls: props.urls.clone(),
            schema_files: props
                .files
                .iter()
                .map(|f| Utf8PathBuf::from(f.as_str()))
                .collect(),
            root_tag: props.root_tag.clone(),
        }
    }

    /// The linkage property for record schemas generated from this
    /// configuration.
    pub fn linkage(&self) -> XmlSchemasProp {
        XmlSchemasProp {
            base_uri: self.base_uri.as_ref().map(|p| p.to_string()),
            urls: self.schema_urls.clone(),
            files: self.schema_files.iter().map(|p| p.to_string()).collect(),
            root_tag: self.root_tag.clone(),
        }
    }

    /// Load every configured schema document into one set.
    pub fn load_schema_set<S: SchemaSource>(&self, source: S) -> Result<SchemaSet> {
        self.validate()?;
        let mut loader = SchemaLoader::new(source);
        if let Some(base) = &self.base_uri {
            loader = loader.with_base_dir(base);
        }
        let mut set = SchemaSet::default();
        for file in &self.schema_files {
            loader.load(&mut set, file)?;
        }
        for url in &self.schema_urls {
            loader.load(&mut set, Utf8PathBuf::from(url.as_str()))?;
        }
        for text in &self.sources {
            loader.load_text(&mut set, text)?;
        }
        Ok(set)
    }

    /// Compile the state machine and generate the default record schema,
    /// reading schema files from disk.
    pub fn build(&self) -> Result<Transcoder> {
        self.build_with_source(FsSchemaSource)
    }

    pub fn build_with_source<S: SchemaSource>(&self, source: S) -> Result<Transcoder> {
        let set = self.load_schema_set(source)?;
        let machine = StateMachine::build(&set, &self.root_qname())?;
        let mut schema = record::r#gen::generate(&machine)?;
        schema.xml_schemas = Some(self.linkage());
        Ok(Transcoder::new(machine, schema))
    }

    /// Compile the state machine but keep a caller-supplied record schema.
    pub fn build_with_record_schema<S: SchemaSource>(
        &self,
        source: S,
        schema: RecordSchema,
    ) -> Result<Transcoder> {
        let set = self.load_schema_set(source)?;
        let machine = StateMachine::build(&set, &self.root_qname())?;
        Ok(Transcoder::new(machine, schema))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_configuration() {
        let empty = TranscoderConfig::default();
        assert!(empty.validate().is_err());
        let mut no_root = TranscoderConfig::default();
        no_root.sources.push("<xs:schema/>".to_string());
        assert!(no_root.validate().is_err());
    }

    #[test]
    fn linkage_round_trips() {
        let config = TranscoderConfig {
            base_uri: Some(Utf8PathBuf::from("schemas")),
            schema_files: vec![Utf8PathBuf::from("root.xsd")],
            root_tag: RootTag {
                namespace: "urn:x".into(),
                local_part: "root".into(),
            },
            ..TranscoderConfig::default()
        };
        let back = TranscoderConfig::from_linkage(&config.linkage());
        assert_eq!(back.schema_files, config.schema_files);
        assert_eq!(back.root_qname(), QName::new("urn:x", "root"));
    }
}
