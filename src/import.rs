//! Upload-level orchestration: size limit, option resolution, extraction,
//! validation and re-export of the rows that failed.

use std::io::{Read, Seek};

use log::{info, warn};

use crate::{
    error::{FormatError, MapError},
    io_utils::stream_len,
    option::MappingOption,
    records::{BoundRecord, RecordSet},
    resolver::MappingResolver,
    serializer,
    validate::RecordValidator,
};

pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 100_000;
pub const DEFAULT_INVALID_FILENAME: &str = "invalid_rows";

/// Download body plus the headers a host needs to serve it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub content_type: &'static str,
    pub content_disposition: String,
    pub body: String,
}

impl Attachment {
    pub fn csv(name: &str, body: String) -> Self {
        let filename = format!("{name}.csv");
        Self {
            content_disposition: format!("attachment; filename={filename}"),
            filename,
            content_type: "text/csv",
            body,
        }
    }
}

#[derive(Debug)]
pub struct Importer {
    resolver: MappingResolver,
    max_upload_bytes: u64,
}

impl Importer {
    pub fn new(options: Vec<MappingOption>) -> Self {
        Self {
            resolver: MappingResolver::new(options),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }

    pub fn with_max_upload_bytes(mut self, max_upload_bytes: u64) -> Self {
        self.max_upload_bytes = max_upload_bytes;
        self
    }

    pub fn max_upload_bytes(&self) -> u64 {
        self.max_upload_bytes
    }

    pub fn options(&self) -> &[MappingOption] {
        self.resolver.options()
    }

    /// Checks the upload size, selects the first option that can map the
    /// file and extracts its records. The stream position is preserved.
    pub fn import<S: Read + Seek>(&self, stream: &mut S) -> Result<ImportOutcome<'_>, MapError> {
        let size = stream_len(stream)?;
        if size > self.max_upload_bytes {
            warn!(
                "Rejected upload of {size} bytes (limit {})",
                self.max_upload_bytes
            );
            return Err(MapError::FileTooLarge {
                size,
                limit: self.max_upload_bytes,
            });
        }
        let option = self.resolver.resolve(stream)?.into_result()?;
        let records = option.record_set(&mut *stream)?;
        info!("Imported {} row(s) as '{}'", records.len(), option.kind());
        Ok(ImportOutcome { option, records })
    }
}

#[derive(Debug)]
pub struct ImportOutcome<'a> {
    option: &'a MappingOption,
    records: RecordSet,
}

impl<'a> ImportOutcome<'a> {
    pub fn option(&self) -> &'a MappingOption {
        self.option
    }

    pub fn records(&self) -> &RecordSet {
        &self.records
    }

    pub fn into_records(self) -> RecordSet {
        self.records
    }

    pub fn validate<V>(&mut self, validator: &V)
    where
        V: RecordValidator + ?Sized,
    {
        self.records.validate(self.option.schema(), validator);
    }

    pub fn valid_records(&self) -> Vec<&BoundRecord> {
        self.records.valid_records()
    }

    pub fn invalid_records(&self) -> Vec<&BoundRecord> {
        self.records.invalid_records()
    }

    /// Failed rows as delimited text, or `None` when every row is valid.
    pub fn invalid_csv(&self) -> Result<Option<String>, FormatError> {
        let invalid = self.invalid_records();
        if invalid.is_empty() {
            return Ok(None);
        }
        serializer::dumps(self.option.schema(), invalid).map(Some)
    }

    pub fn invalid_csv_attachment(&self, name: &str) -> Result<Option<Attachment>, FormatError> {
        Ok(self
            .invalid_csv()?
            .map(|body| Attachment::csv(name, body)))
    }
}
