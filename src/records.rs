//! Extracted rows and the bound record set handed to validation.
//!
//! Extraction flattens every row into `"{prefix}-{index}-{name}"` keys plus
//! `"{prefix}-TOTAL_FORMS"`, `"{prefix}-INITIAL_FORMS"` and
//! `"{prefix}-MAX_NUM_FORMS"`. [`RecordSet::bind`] rebuilds one
//! [`BoundRecord`] per row from those keys, the same way a form-set layer
//! would from submitted data.

use std::collections::BTreeMap;

use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::{
    error::FormatError,
    schema::LabelSchema,
    serializer::FormRecord,
    validate::{FieldErrors, RecordValidator},
};

pub type RecordValues = BTreeMap<String, String>;

pub const TOTAL_FORMS: &str = "TOTAL_FORMS";
pub const INITIAL_FORMS: &str = "INITIAL_FORMS";
pub const MAX_NUM_FORMS: &str = "MAX_NUM_FORMS";

pub fn record_key(prefix: &str, index: usize, name: &str) -> String {
    format!("{prefix}-{index}-{name}")
}

pub fn management_key(prefix: &str, key: &str) -> String {
    format!("{prefix}-{key}")
}

/// One source row keyed by field name. `index` is zero-based over data rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowRecord {
    pub index: usize,
    pub values: RecordValues,
}

impl RowRecord {
    pub fn new(index: usize, values: RecordValues) -> Self {
        Self { index, values }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }
}

/// All rows extracted from one file under one key prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappedData {
    prefix: String,
    rows: Vec<RowRecord>,
}

impl MappedData {
    pub fn new(prefix: impl Into<String>, rows: Vec<RowRecord>) -> Self {
        Self {
            prefix: prefix.into(),
            rows,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn rows(&self) -> &[RowRecord] {
        &self.rows
    }

    pub fn total_forms(&self) -> usize {
        self.rows.len()
    }

    /// Every extracted row is a new record.
    pub fn initial_forms(&self) -> usize {
        0
    }

    /// No upper bound on rows.
    pub fn max_num_forms(&self) -> Option<usize> {
        None
    }

    pub fn flatten(&self) -> Map<String, Value> {
        let mut flat = Map::new();
        for row in &self.rows {
            for (name, value) in &row.values {
                flat.insert(
                    record_key(&self.prefix, row.index, name),
                    Value::String(value.clone()),
                );
            }
        }
        flat.insert(
            management_key(&self.prefix, TOTAL_FORMS),
            Value::from(self.total_forms()),
        );
        flat.insert(
            management_key(&self.prefix, INITIAL_FORMS),
            Value::from(self.initial_forms()),
        );
        flat.insert(
            management_key(&self.prefix, MAX_NUM_FORMS),
            self.max_num_forms().map_or(Value::Null, Value::from),
        );
        flat
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BoundRecord {
    pub index: usize,
    pub data: RecordValues,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cleaned: Option<RecordValues>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub errors: FieldErrors,
}

impl BoundRecord {
    pub fn new(index: usize, data: RecordValues) -> Self {
        Self {
            index,
            data,
            cleaned: None,
            errors: FieldErrors::new(),
        }
    }

    pub fn is_validated(&self) -> bool {
        self.cleaned.is_some() || !self.errors.is_empty()
    }

    pub fn is_valid(&self) -> bool {
        self.cleaned.is_some() && self.errors.is_empty()
    }
}

impl FormRecord for BoundRecord {
    fn initial(&self) -> &RecordValues {
        &self.data
    }

    fn cleaned(&self) -> Option<&RecordValues> {
        if self.is_valid() {
            self.cleaned.as_ref()
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordSet {
    kind: String,
    prefix: String,
    total_forms: usize,
    initial_forms: usize,
    max_num_forms: Option<usize>,
    records: Vec<BoundRecord>,
}

impl RecordSet {
    /// Rebuilds rows from flattened keys. `TOTAL_FORMS` decides how many
    /// records exist; a row with no keys binds as an empty record.
    pub fn bind(kind: &str, prefix: &str, flat: &Map<String, Value>) -> Result<Self, FormatError> {
        let total_forms = read_count(flat, prefix, TOTAL_FORMS)?.ok_or_else(|| {
            FormatError::ManagementData(format!(
                "missing {}",
                management_key(prefix, TOTAL_FORMS)
            ))
        })?;
        let initial_forms = read_count(flat, prefix, INITIAL_FORMS)?.unwrap_or(0);
        let max_num_forms = read_count(flat, prefix, MAX_NUM_FORMS)?;

        let pattern = Regex::new(&format!(r"^{}-(\d+)-(.+)$", regex::escape(prefix)))
            .map_err(|err| FormatError::ManagementData(err.to_string()))?;
        let mut records: Vec<BoundRecord> = (0..total_forms)
            .map(|index| BoundRecord::new(index, RecordValues::new()))
            .collect();
        for (key, value) in flat {
            let Some(captures) = pattern.captures(key) else {
                continue;
            };
            let Ok(index) = captures[1].parse::<usize>() else {
                continue;
            };
            if let Some(record) = records.get_mut(index) {
                record
                    .data
                    .insert(captures[2].to_string(), value_to_string(value));
            }
        }

        Ok(Self {
            kind: kind.to_string(),
            prefix: prefix.to_string(),
            total_forms,
            initial_forms,
            max_num_forms,
            records,
        })
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn total_forms(&self) -> usize {
        self.total_forms
    }

    pub fn initial_forms(&self) -> usize {
        self.initial_forms
    }

    pub fn max_num_forms(&self) -> Option<usize> {
        self.max_num_forms
    }

    pub fn records(&self) -> &[BoundRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn validate<V>(&mut self, schema: &LabelSchema, validator: &V)
    where
        V: RecordValidator + ?Sized,
    {
        for record in &mut self.records {
            match validator.validate(schema, &record.data) {
                Ok(cleaned) => {
                    record.cleaned = Some(cleaned);
                    record.errors.clear();
                }
                Err(errors) => {
                    record.cleaned = None;
                    record.errors = errors;
                }
            }
        }
    }

    pub fn is_valid(&self) -> bool {
        self.records.iter().all(BoundRecord::is_valid)
    }

    pub fn valid_records(&self) -> Vec<&BoundRecord> {
        self.records.iter().filter(|r| r.is_valid()).collect()
    }

    pub fn invalid_records(&self) -> Vec<&BoundRecord> {
        self.records.iter().filter(|r| !r.is_valid()).collect()
    }
}

fn read_count(
    flat: &Map<String, Value>,
    prefix: &str,
    key: &str,
) -> Result<Option<usize>, FormatError> {
    let full_key = management_key(prefix, key);
    match flat.get(&full_key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(number)) => number
            .as_u64()
            .and_then(|n| usize::try_from(n).ok())
            .map(Some)
            .ok_or_else(|| FormatError::ManagementData(format!("{full_key} is not a count"))),
        Some(Value::String(text)) if text.trim().is_empty() => Ok(None),
        Some(Value::String(text)) => text
            .trim()
            .parse::<usize>()
            .map(Some)
            .map_err(|_| FormatError::ManagementData(format!("{full_key} is not a count"))),
        Some(_) => Err(FormatError::ManagementData(format!(
            "{full_key} is not a count"
        ))),
    }
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
