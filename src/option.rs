//! Registered map options and the non-destructive `can_map` probe.

use std::{
    collections::HashSet,
    fmt,
    io::{Read, Seek, SeekFrom},
    sync::OnceLock,
};

use encoding_rs::Encoding;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    encoding::{EncodingNormalizer, Normalized},
    error::MapError,
    io_utils::{DEFAULT_CSV_DELIMITER, with_restored_position},
    mapper::{DEFAULT_PREFIX, RecordMapper},
    records::RecordSet,
    schema::{LabelSchema, label_key},
};

/// Shape of the source files an option accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    #[default]
    Delimited,
    /// Tag/attribute based documents. Declared but not implemented.
    Structured,
}

#[derive(Debug)]
pub struct MappingOption {
    kind: String,
    schema: LabelSchema,
    prefix: String,
    delimiter: u8,
    encoding: Option<&'static Encoding>,
    format: SourceFormat,
    required: OnceLock<Vec<String>>,
}

impl MappingOption {
    pub fn new(kind: impl Into<String>, schema: LabelSchema) -> Self {
        Self {
            kind: kind.into(),
            schema,
            prefix: DEFAULT_PREFIX.to_string(),
            delimiter: DEFAULT_CSV_DELIMITER,
            encoding: None,
            format: SourceFormat::Delimited,
            required: OnceLock::new(),
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Source encoding to assume instead of detecting one.
    pub fn with_encoding(mut self, encoding: Option<&'static Encoding>) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn with_format(mut self, format: SourceFormat) -> Self {
        self.format = format;
        self
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn schema(&self) -> &LabelSchema {
        &self.schema
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn delimiter(&self) -> u8 {
        self.delimiter
    }

    pub fn encoding(&self) -> Option<&'static Encoding> {
        self.encoding
    }

    pub fn format(&self) -> SourceFormat {
        self.format
    }

    /// Labels of the mandatory fields, computed on first use.
    pub fn required_labels(&self) -> &[String] {
        self.required.get_or_init(|| self.schema.required_labels())
    }

    /// Required labels absent from `fields`, compared as a set.
    pub fn missing_labels(&self, fields: &[String]) -> Vec<&str> {
        let present: HashSet<String> = fields.iter().map(|f| label_key(f)).collect();
        self.required_labels()
            .iter()
            .filter(|label| !present.contains(&label_key(label)))
            .map(String::as_str)
            .collect()
    }

    pub fn can_map_fields(&self, fields: &[String]) -> bool {
        self.missing_labels(fields).is_empty()
    }

    /// Whether every required label appears in the file's header.
    ///
    /// Read and decode failures count as "no": a file in the wrong shape must
    /// not stop other options from being tried. The stream position is the
    /// same afterwards whatever the outcome.
    pub fn can_map<S: Read + Seek>(&self, stream: &mut S) -> Result<bool, MapError> {
        match self.format {
            SourceFormat::Structured => Err(self.structured_unsupported()),
            SourceFormat::Delimited => Ok(self.probe_delimited(stream)),
        }
    }

    /// Builds a mapper for `stream`, refusing files this option cannot map.
    pub fn mapper<S: Read + Seek>(
        &self,
        mut stream: S,
    ) -> Result<RecordMapper<'_, Normalized<S>>, MapError> {
        if !self.can_map(&mut stream)? {
            return Err(MapError::PreconditionViolation(format!(
                "{} cannot map this file",
                self
            )));
        }
        self.build_mapper(stream)
    }

    /// Extracts every row and binds it as a record set of `kind` records.
    pub fn record_set<S: Read + Seek>(&self, stream: S) -> Result<RecordSet, MapError> {
        let mut mapper = self.mapper(stream)?;
        let flat = mapper.data()?.flatten();
        let records = RecordSet::bind(&self.kind, &self.prefix, &flat)?;
        debug!(
            "{} bound {} record(s) from {} row(s)",
            self,
            records.len(),
            mapper.n_forms()
        );
        Ok(records)
    }

    fn build_mapper<S: Read + Seek>(
        &self,
        stream: S,
    ) -> Result<RecordMapper<'_, Normalized<S>>, MapError> {
        if self.format == SourceFormat::Structured {
            return Err(self.structured_unsupported());
        }
        let normalized = EncodingNormalizer::new(self.encoding).normalize(stream)?;
        Ok(RecordMapper::new(normalized, &self.schema, self.prefix.clone())
            .with_delimiter(self.delimiter))
    }

    fn probe_delimited<S: Read + Seek>(&self, stream: &mut S) -> bool {
        let outcome = with_restored_position(stream, |s| -> Result<bool, MapError> {
            s.seek(SeekFrom::Start(0))?;
            let mut mapper = self.build_mapper(&mut *s)?;
            let fields = mapper.fieldnames()?;
            let missing = self.missing_labels(fields);
            if !missing.is_empty() {
                debug!("{} is missing required label(s) {:?}", self, missing);
            }
            Ok(missing.is_empty())
        });
        match outcome {
            Ok(can_map) => can_map,
            Err(err) => {
                debug!("{} could not read the file: {err}", self);
                false
            }
        }
    }

    fn structured_unsupported(&self) -> MapError {
        MapError::NotSupported(format!("{} uses structured source mapping", self))
    }
}

impl fmt::Display for MappingOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MapOption: {}", self.kind)
    }
}
