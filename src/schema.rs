//! Target record schemas and the field-name ↔ header-label correspondence.
//!
//! A [`TargetSchema`] is what the host application declares: ordered fields,
//! each with an optional display label, a required flag and an optional value
//! parser name. [`LabelSchema`] is the resolved, immutable form used while
//! mapping a file: every label is filled in, every parser name is bound to a
//! [`ValueParser`], and ambiguous labels have been rejected.

use std::{
    collections::{HashMap, HashSet},
    fmt,
    sync::{Arc, OnceLock},
};

use heck::ToTitleCase;
use regex::Regex;
use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;

use crate::error::SchemaError;

/// Comparison key for header labels, insensitive to Unicode composition so a
/// transcoded (NFKD) header still matches a precomposed label.
pub fn label_key(label: &str) -> String {
    label.nfkd().collect()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FieldDef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parser: Option<String>,
}

impl FieldDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn parser(mut self, parser: impl Into<String>) -> Self {
        self.parser = Some(parser.into());
        self
    }

    /// Declared label, or the title-cased field name when none was given.
    pub fn display_label(&self) -> String {
        match &self.label {
            Some(label) if !label.trim().is_empty() => label.clone(),
            _ => self.name.to_title_case(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct TargetSchema {
    pub fields: Vec<FieldDef>,
}

impl TargetSchema {
    pub fn new(fields: Vec<FieldDef>) -> Self {
        Self { fields }
    }

    pub fn field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }
}

type ParseFn = dyn Fn(&str) -> String + Send + Sync;

/// Named conversion applied to a raw cell before it is handed off.
#[derive(Clone)]
pub struct ValueParser {
    name: String,
    func: Arc<ParseFn>,
}

impl ValueParser {
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            func: Arc::new(func),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parse(&self, raw: &str) -> String {
        (self.func)(raw)
    }

    pub fn builtin(name: &str) -> Option<Self> {
        let parser = match name {
            "trim" => Self::new(name, |raw| raw.trim().to_string()),
            "lowercase" => Self::new(name, |raw| raw.to_lowercase()),
            "uppercase" => Self::new(name, |raw| raw.to_uppercase()),
            "strip_currency" => Self::new(name, strip_currency),
            "digits" => Self::new(name, |raw| {
                raw.chars().filter(|c| c.is_ascii_digit()).collect()
            }),
            "collapse_whitespace" => Self::new(name, |raw| {
                raw.split_whitespace().collect::<Vec<_>>().join(" ")
            }),
            _ => return None,
        };
        Some(parser)
    }
}

impl fmt::Debug for ValueParser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ValueParser").field(&self.name).finish()
    }
}

fn strip_currency(raw: &str) -> String {
    static CURRENCY: OnceLock<Option<Regex>> = OnceLock::new();
    match CURRENCY.get_or_init(|| Regex::new(r"[\p{Sc}\s]").ok()) {
        Some(pattern) => pattern.replace_all(raw, "").into_owned(),
        None => raw.trim().to_string(),
    }
}

/// Parsers available by name to schema declarations.
#[derive(Debug, Clone)]
pub struct ParserRegistry {
    parsers: HashMap<String, ValueParser>,
}

impl Default for ParserRegistry {
    fn default() -> Self {
        let parsers = [
            "trim",
            "lowercase",
            "uppercase",
            "strip_currency",
            "digits",
            "collapse_whitespace",
        ]
        .into_iter()
        .filter_map(|name| ValueParser::builtin(name).map(|p| (name.to_string(), p)))
        .collect();
        Self { parsers }
    }
}

impl ParserRegistry {
    pub fn register<F>(&mut self, name: &str, func: F) -> &mut Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        self.parsers
            .insert(name.to_string(), ValueParser::new(name, func));
        self
    }

    pub fn get(&self, name: &str) -> Option<&ValueParser> {
        self.parsers.get(name)
    }
}

/// How a mapped cell becomes a record value.
#[derive(Debug, Clone, Default)]
pub enum Conversion {
    #[default]
    Raw,
    Parser(ValueParser),
}

impl Conversion {
    pub fn apply(&self, raw: &str) -> String {
        match self {
            Conversion::Raw => raw.to_string(),
            Conversion::Parser(parser) => parser.parse(raw),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FieldLabel {
    pub name: String,
    pub label: String,
    pub required: bool,
    pub conversion: Conversion,
}

impl FieldLabel {
    pub fn has_parser(&self) -> bool {
        matches!(self.conversion, Conversion::Parser(_))
    }
}

#[derive(Debug, Clone)]
pub struct LabelSchema {
    fields: Vec<FieldLabel>,
}

impl LabelSchema {
    pub fn from_schema(schema: &TargetSchema) -> Result<Self, SchemaError> {
        Self::from_schema_with(schema, &ParserRegistry::default())
    }

    /// Binds parser names against `registry` and rejects duplicate names and
    /// labels. Two fields may share a label only when both carry a parser.
    pub fn from_schema_with(
        schema: &TargetSchema,
        registry: &ParserRegistry,
    ) -> Result<Self, SchemaError> {
        if schema.fields.is_empty() {
            return Err(SchemaError::EmptySchema);
        }
        let mut names = HashSet::new();
        let mut labels: HashMap<String, usize> = HashMap::new();
        let mut fields: Vec<FieldLabel> = Vec::with_capacity(schema.fields.len());

        for def in &schema.fields {
            let name = def.name.trim();
            if name.is_empty() {
                return Err(SchemaError::EmptyFieldName);
            }
            if !names.insert(name.to_string()) {
                return Err(SchemaError::DuplicateField(name.to_string()));
            }
            let conversion = match &def.parser {
                None => Conversion::Raw,
                Some(parser) => Conversion::Parser(registry.get(parser).cloned().ok_or_else(
                    || SchemaError::UnknownParser {
                        field: name.to_string(),
                        parser: parser.clone(),
                    },
                )?),
            };
            let field = FieldLabel {
                name: name.to_string(),
                label: def.display_label(),
                required: def.required,
                conversion,
            };
            let key = label_key(&field.label);
            if let Some(&existing) = labels.get(&key) {
                let first = &fields[existing];
                if !(first.has_parser() && field.has_parser()) {
                    return Err(SchemaError::DuplicateLabel {
                        label: field.label.clone(),
                        first: first.name.clone(),
                        second: field.name.clone(),
                    });
                }
            } else {
                labels.insert(key, fields.len());
            }
            fields.push(field);
        }
        Ok(Self { fields })
    }

    pub fn fields(&self) -> &[FieldLabel] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.label.as_str())
    }

    pub fn label_for(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.label.as_str())
    }

    pub fn name_for(&self, label: &str) -> Option<&str> {
        let key = label_key(label);
        self.fields
            .iter()
            .find(|f| label_key(&f.label) == key)
            .map(|f| f.name.as_str())
    }

    pub fn required_labels(&self) -> Vec<String> {
        self.fields
            .iter()
            .filter(|f| f.required)
            .map(|f| f.label.clone())
            .collect()
    }
}
