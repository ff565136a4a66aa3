//! YAML declaration of map options.
//!
//! ```yaml
//! max_upload_bytes: 100000
//! options:
//!   - kind: contact
//!     encoding: windows-1252
//!     fields:
//!       - { name: name, label: Full Name }
//!       - { name: email, label: Email Address, required: true }
//! ```

use std::{fs::File, io::BufReader, path::Path};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::{
    error::SchemaError,
    import::{DEFAULT_MAX_UPLOAD_BYTES, Importer},
    io_utils::{self, DEFAULT_CSV_DELIMITER},
    mapper::DEFAULT_PREFIX,
    option::{MappingOption, SourceFormat},
    schema::{FieldDef, LabelSchema, ParserRegistry, TargetSchema},
};

fn default_max_upload_bytes() -> u64 {
    DEFAULT_MAX_UPLOAD_BYTES
}

fn default_prefix() -> String {
    DEFAULT_PREFIX.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImportConfig {
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: u64,
    #[serde(default)]
    pub options: Vec<OptionConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OptionConfig {
    pub kind: String,
    #[serde(default = "default_prefix")]
    pub prefix: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
    #[serde(default)]
    pub format: SourceFormat,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delimiter: Option<String>,
    pub fields: Vec<FieldDef>,
}

impl OptionConfig {
    pub fn build(&self, registry: &ParserRegistry) -> Result<MappingOption, SchemaError> {
        let schema = LabelSchema::from_schema_with(&TargetSchema::new(self.fields.clone()), registry)?;
        let delimiter = match &self.delimiter {
            Some(value) => io_utils::parse_delimiter(value)
                .map_err(|_| SchemaError::InvalidDelimiter(value.clone()))?,
            None => DEFAULT_CSV_DELIMITER,
        };
        let encoding = io_utils::resolve_encoding(self.encoding.as_deref())?;
        Ok(MappingOption::new(self.kind.clone(), schema)
            .with_prefix(self.prefix.clone())
            .with_delimiter(delimiter)
            .with_encoding(encoding)
            .with_format(self.format))
    }
}

impl ImportConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Opening config file {path:?}"))?;
        let reader = BufReader::new(file);
        let config = serde_yaml::from_reader(reader).context("Parsing map option YAML")?;
        Ok(config)
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).context("Parsing map option YAML")
    }

    pub fn build_options(&self, registry: &ParserRegistry) -> Result<Vec<MappingOption>> {
        self.options
            .iter()
            .map(|option| {
                option
                    .build(registry)
                    .with_context(|| format!("Building map option '{}'", option.kind))
            })
            .collect()
    }

    pub fn importer(&self) -> Result<Importer> {
        self.importer_with(&ParserRegistry::default())
    }

    pub fn importer_with(&self, registry: &ParserRegistry) -> Result<Importer> {
        let options = self.build_options(registry)?;
        Ok(Importer::new(options).with_max_upload_bytes(self.max_upload_bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"
options:
  - kind: contact
    fields:
      - name: name
        label: Full Name
      - name: email
        label: Email Address
        required: true
  - kind: payment
    prefix: payments
    delimiter: ";"
    encoding: windows-1252
    fields:
      - name: amount
        parser: strip_currency
        required: true
"#;

    #[test]
    fn defaults_fill_optional_settings() {
        let config = ImportConfig::from_yaml(CONFIG).unwrap();
        assert_eq!(config.max_upload_bytes, DEFAULT_MAX_UPLOAD_BYTES);
        assert_eq!(config.options[0].prefix, "form");
        assert_eq!(config.options[0].format, SourceFormat::Delimited);
    }

    #[test]
    fn builds_options_in_declared_order() {
        let config = ImportConfig::from_yaml(CONFIG).unwrap();
        let options = config.build_options(&ParserRegistry::default()).unwrap();
        assert_eq!(options[0].kind(), "contact");
        assert_eq!(options[1].prefix(), "payments");
        assert_eq!(options[1].delimiter(), b';');
        assert_eq!(options[1].encoding(), Some(encoding_rs::WINDOWS_1252));
        assert_eq!(options[1].schema().label_for("amount"), Some("Amount"));
    }

    #[test]
    fn bad_option_fails_at_build_time() {
        let config = ImportConfig::from_yaml(
            r#"
options:
  - kind: broken
    fields:
      - { name: a, label: Same }
      - { name: b, label: Same }
"#,
        )
        .unwrap();
        let err = config.importer().unwrap_err();
        assert!(format!("{err:#}").contains("Label 'Same' is shared"));
    }

    #[test]
    fn unknown_encoding_is_rejected() {
        let option = OptionConfig {
            kind: "x".into(),
            prefix: "form".into(),
            encoding: Some("not-an-encoding".into()),
            format: SourceFormat::Delimited,
            delimiter: None,
            fields: vec![FieldDef::new("a")],
        };
        assert_eq!(
            option.build(&ParserRegistry::default()).unwrap_err(),
            SchemaError::UnknownEncoding("not-an-encoding".into())
        );
    }
}
