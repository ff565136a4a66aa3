//! Validation seam between extraction and the host application.
//!
//! Extraction never judges values; a [`RecordValidator`] does. The built-in
//! [`RequiredFieldsValidator`] only enforces required fields. Hosts plug in
//! their own rules by implementing the trait or passing a closure.

use std::collections::BTreeMap;

use crate::{records::RecordValues, schema::LabelSchema};

pub type FieldErrors = BTreeMap<String, Vec<String>>;

pub trait RecordValidator {
    /// Returns cleaned values, or the errors keyed by field name.
    fn validate(&self, schema: &LabelSchema, values: &RecordValues)
    -> Result<RecordValues, FieldErrors>;
}

impl<F> RecordValidator for F
where
    F: Fn(&LabelSchema, &RecordValues) -> Result<RecordValues, FieldErrors>,
{
    fn validate(
        &self,
        schema: &LabelSchema,
        values: &RecordValues,
    ) -> Result<RecordValues, FieldErrors> {
        self(schema, values)
    }
}

/// Trims every value and rejects rows whose required fields are blank.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequiredFieldsValidator;

impl RecordValidator for RequiredFieldsValidator {
    fn validate(
        &self,
        schema: &LabelSchema,
        values: &RecordValues,
    ) -> Result<RecordValues, FieldErrors> {
        let mut cleaned = RecordValues::new();
        let mut errors = FieldErrors::new();
        for field in schema.fields() {
            let value = values
                .get(&field.name)
                .map(|v| v.trim())
                .unwrap_or_default();
            if field.required && value.is_empty() {
                errors
                    .entry(field.name.clone())
                    .or_default()
                    .push(format!("{} is required.", field.label));
                continue;
            }
            cleaned.insert(field.name.clone(), value.to_string());
        }
        if errors.is_empty() {
            Ok(cleaned)
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldDef, TargetSchema};

    fn schema() -> LabelSchema {
        LabelSchema::from_schema(
            &TargetSchema::default()
                .field(FieldDef::new("name").label("Full Name"))
                .field(FieldDef::new("email").label("Email Address").required()),
        )
        .unwrap()
    }

    #[test]
    fn blank_required_field_is_reported() {
        let values = RecordValues::from([
            ("name".to_string(), "Ada".to_string()),
            ("email".to_string(), "   ".to_string()),
        ]);
        let errors = RequiredFieldsValidator
            .validate(&schema(), &values)
            .unwrap_err();
        assert_eq!(errors["email"], vec!["Email Address is required."]);
    }

    #[test]
    fn cleaned_values_are_trimmed() {
        let values = RecordValues::from([
            ("name".to_string(), " Ada ".to_string()),
            ("email".to_string(), "ada@example.com".to_string()),
        ]);
        let cleaned = RequiredFieldsValidator.validate(&schema(), &values).unwrap();
        assert_eq!(cleaned["name"], "Ada");
    }

    #[test]
    fn closures_act_as_validators() {
        let reject_all = |_: &LabelSchema, _: &RecordValues| -> Result<RecordValues, FieldErrors> {
            Err(FieldErrors::from([("name".to_string(), vec!["nope".to_string()])]))
        };
        assert!(reject_all.validate(&schema(), &RecordValues::new()).is_err());
    }
}
