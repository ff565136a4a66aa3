//! Turns records back into delimited text, header first, for re-export of
//! rows that failed validation.

use csv::{QuoteStyle, Terminator, WriterBuilder};

use crate::{
    error::FormatError,
    records::{RecordValues, RowRecord},
    schema::LabelSchema,
};

/// A record that can be written back out.
pub trait FormRecord {
    /// Values as they were read from the file.
    fn initial(&self) -> &RecordValues;

    /// Validated values, present only when the record passed validation.
    fn cleaned(&self) -> Option<&RecordValues>;

    fn values(&self) -> &RecordValues {
        self.cleaned().unwrap_or_else(|| self.initial())
    }
}

impl FormRecord for RowRecord {
    fn initial(&self) -> &RecordValues {
        &self.values
    }

    fn cleaned(&self) -> Option<&RecordValues> {
        None
    }
}

impl<T: FormRecord + ?Sized> FormRecord for &T {
    fn initial(&self) -> &RecordValues {
        (**self).initial()
    }

    fn cleaned(&self) -> Option<&RecordValues> {
        (**self).cleaned()
    }
}

/// Header of labels followed by one row per record, in schema field order.
pub fn lines<I>(schema: &LabelSchema, records: I) -> Vec<Vec<String>>
where
    I: IntoIterator,
    I::Item: FormRecord,
{
    let mut lines = vec![schema.labels().map(str::to_string).collect::<Vec<_>>()];
    for record in records {
        let values = record.values();
        lines.push(
            schema
                .names()
                .map(|name| values.get(name).cloned().unwrap_or_default())
                .collect(),
        );
    }
    lines
}

/// Comma-delimited text, `\n` between rows and no trailing terminator.
/// Values are quoted only when they contain the delimiter, a quote or a
/// line break.
pub fn dumps<I>(schema: &LabelSchema, records: I) -> Result<String, FormatError>
where
    I: IntoIterator,
    I::Item: FormRecord,
{
    let mut writer = WriterBuilder::new()
        .delimiter(b',')
        .quote_style(QuoteStyle::Necessary)
        .double_quote(true)
        .terminator(Terminator::Any(b'\n'))
        .from_writer(Vec::new());
    for line in lines(schema, records) {
        writer.write_record(&line)?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|err| FormatError::Io(err.into_error()))?;
    let mut text = String::from_utf8(bytes).map_err(|err| FormatError::Decode {
        row: 0,
        message: err.to_string(),
    })?;
    if text.ends_with('\n') {
        text.pop();
    }
    Ok(text)
}
