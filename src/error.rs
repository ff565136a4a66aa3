//! Error types for mapping resolution and record extraction.
//!
//! - [`FormatError`] - the file could not be read as the selected layout
//! - [`SchemaError`] - a map option was configured incorrectly
//! - [`MapError`] - top-level outcome surfaced to the host application
//!
//! `From` conversions let `?` cross from the lower-level errors into
//! [`MapError`].

use thiserror::Error;

/// User-facing message returned when no map option accepts a file.
pub const MAP_NOT_FOUND: &str =
    "The file could not be imported. Please check that the file is in a valid format.";

/// Failures reading tabular data once a layout has been chosen.
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("Invalid CSV data: {0}")]
    Csv(#[from] csv::Error),

    #[error("Failed to decode row {row}: {message}")]
    Decode { row: usize, message: String },

    #[error("Failed to read input: {0}")]
    Io(#[from] std::io::Error),

    /// The flattened record keys could not be turned back into rows.
    #[error("Invalid record management data: {0}")]
    ManagementData(String),

    #[error("Invalid structured data: {0}")]
    Subformat(String),
}

/// Configuration mistakes in a map option. Raised when options are built.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("Schema does not declare any fields")]
    EmptySchema,

    #[error("Field name cannot be empty")]
    EmptyFieldName,

    #[error("Field '{0}' is declared more than once")]
    DuplicateField(String),

    #[error("Label '{label}' is shared by fields '{first}' and '{second}'")]
    DuplicateLabel {
        label: String,
        first: String,
        second: String,
    },

    #[error("Unknown value parser '{parser}' on field '{field}'")]
    UnknownParser { field: String, parser: String },

    #[error("Unknown encoding '{0}'")]
    UnknownEncoding(String),

    #[error("Invalid delimiter '{0}'")]
    InvalidDelimiter(String),
}

#[derive(Debug, Error)]
pub enum MapError {
    #[error("{}", MAP_NOT_FOUND)]
    NoMappingMatched,

    #[error(transparent)]
    Format(#[from] FormatError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("Not supported: {0}")]
    NotSupported(String),

    #[error("Precondition violated: {0}")]
    PreconditionViolation(String),

    #[error("File is {size} bytes, larger than the {limit} byte limit")]
    FileTooLarge { size: u64, limit: u64 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl MapError {
    /// True for outcomes the uploader can fix by sending a different file.
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            MapError::NoMappingMatched | MapError::FileTooLarge { .. } | MapError::Format(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_mapping_matched_uses_fixed_message() {
        assert_eq!(MapError::NoMappingMatched.to_string(), MAP_NOT_FOUND);
    }

    #[test]
    fn programming_errors_are_not_user_facing() {
        assert!(!MapError::PreconditionViolation("x".into()).is_user_facing());
        assert!(!MapError::NotSupported("xml".into()).is_user_facing());
        assert!(MapError::FileTooLarge { size: 2, limit: 1 }.is_user_facing());
    }
}
