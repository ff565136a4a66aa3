//! Per-file record extraction.
//!
//! A [`RecordMapper`] owns one seekable stream and borrows a [`LabelSchema`].
//! It reads the header once, matches each schema label against it and
//! extracts every data row into a [`RowRecord`]. Header and row data are
//! memoized, so repeated access never re-reads the file. Every read goes
//! through [`with_restored_position`], leaving the stream where it was.

use std::{
    collections::HashMap,
    io::{Read, Seek, SeekFrom},
};

use encoding_rs::Encoding;
use log::debug;

use crate::{
    error::FormatError,
    io_utils::{self, DEFAULT_CSV_DELIMITER, with_restored_position},
    records::{MappedData, RecordValues, RowRecord},
    schema::{LabelSchema, label_key},
    serializer::{self, FormRecord},
};

pub const DEFAULT_PREFIX: &str = "form";

pub struct RecordMapper<'s, R> {
    stream: R,
    schema: &'s LabelSchema,
    prefix: String,
    delimiter: u8,
    encoding: &'static Encoding,
    fieldnames: Option<Vec<String>>,
    data: Option<MappedData>,
    n_forms: usize,
}

impl<'s, R: Read + Seek> RecordMapper<'s, R> {
    pub fn new(stream: R, schema: &'s LabelSchema, prefix: impl Into<String>) -> Self {
        Self {
            stream,
            schema,
            prefix: prefix.into(),
            delimiter: DEFAULT_CSV_DELIMITER,
            encoding: io_utils::default_encoding(),
            fieldnames: None,
            data: None,
            n_forms: 0,
        }
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Encoding of the bytes the mapper reads; normalized input is UTF-8.
    pub fn with_encoding(mut self, encoding: &'static Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn schema(&self) -> &LabelSchema {
        self.schema
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Rows extracted so far; zero until [`RecordMapper::data`] runs.
    pub fn n_forms(&self) -> usize {
        self.n_forms
    }

    /// Header labels from the first row of the file.
    pub fn fieldnames(&mut self) -> Result<&[String], FormatError> {
        let fieldnames = match self.fieldnames.take() {
            Some(fieldnames) => fieldnames,
            None => self.read_fieldnames()?,
        };
        Ok(self.fieldnames.insert(fieldnames).as_slice())
    }

    /// Every data row, keyed by field name. Computed at most once.
    pub fn data(&mut self) -> Result<&MappedData, FormatError> {
        let data = match self.data.take() {
            Some(data) => data,
            None => self.extract()?,
        };
        Ok(&*self.data.insert(data))
    }

    pub fn lines<I>(&self, records: I) -> Vec<Vec<String>>
    where
        I: IntoIterator,
        I::Item: FormRecord,
    {
        serializer::lines(self.schema, records)
    }

    pub fn dumps<I>(&self, records: I) -> Result<String, FormatError>
    where
        I: IntoIterator,
        I::Item: FormRecord,
    {
        serializer::dumps(self.schema, records)
    }

    pub fn into_inner(self) -> R {
        self.stream
    }

    fn read_fieldnames(&mut self) -> Result<Vec<String>, FormatError> {
        let delimiter = self.delimiter;
        let encoding = self.encoding;
        with_restored_position(&mut self.stream, |s| {
            s.seek(SeekFrom::Start(0))?;
            let mut reader = io_utils::open_csv_reader(s, delimiter);
            io_utils::reader_headers(&mut reader, encoding)
        })
    }

    fn extract(&mut self) -> Result<MappedData, FormatError> {
        let fieldnames = self.fieldnames()?.to_vec();
        let header_index: HashMap<String, usize> = fieldnames
            .iter()
            .enumerate()
            .map(|(idx, header)| (label_key(header), idx))
            .collect();
        let columns: Vec<Option<usize>> = self
            .schema
            .fields()
            .iter()
            .map(|field| header_index.get(&label_key(&field.label)).copied())
            .collect();
        debug!(
            "Mapped {} of {} field(s) onto header {:?}",
            columns.iter().flatten().count(),
            columns.len(),
            fieldnames
        );

        let schema = self.schema;
        let delimiter = self.delimiter;
        let encoding = self.encoding;
        let rows = with_restored_position(&mut self.stream, |s| {
            s.seek(SeekFrom::Start(0))?;
            let mut reader = io_utils::open_csv_reader(s, delimiter);
            let mut record = csv::ByteRecord::new();
            let mut rows = Vec::new();
            while reader.read_byte_record(&mut record)? {
                let index = rows.len();
                let decoded = io_utils::decode_record(&record, encoding);
                let mut values = RecordValues::new();
                for (field, column) in schema.fields().iter().zip(&columns) {
                    let value = match column {
                        Some(idx) => {
                            let raw = decoded.get(*idx).map(String::as_str).unwrap_or("");
                            field.conversion.apply(raw)
                        }
                        None => String::new(),
                    };
                    values.insert(field.name.clone(), value);
                }
                rows.push(RowRecord::new(index, values));
            }
            Ok::<_, FormatError>(rows)
        })?;

        self.n_forms = rows.len();
        debug!("Extracted {} row(s) with prefix '{}'", self.n_forms, self.prefix);
        Ok(MappedData::new(self.prefix.clone(), rows))
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::Cell, io::Cursor, rc::Rc};

    use super::*;
    use crate::schema::{FieldDef, TargetSchema};

    fn schema() -> LabelSchema {
        LabelSchema::from_schema(
            &TargetSchema::default()
                .field(FieldDef::new("name").label("Full Name"))
                .field(FieldDef::new("email").label("Email Address").required())
                .field(FieldDef::new("amount").label("Amount").parser("strip_currency")),
        )
        .unwrap()
    }

    #[test]
    fn fieldnames_reads_header_without_moving_stream() {
        let schema = schema();
        let mut cursor = Cursor::new(b"Full Name,Email Address\nAda,ada@example.com\n".to_vec());
        cursor.seek(SeekFrom::Start(3)).unwrap();
        let mut mapper = RecordMapper::new(&mut cursor, &schema, DEFAULT_PREFIX);
        assert_eq!(
            mapper.fieldnames().unwrap(),
            ["Full Name".to_string(), "Email Address".to_string()]
        );
        drop(mapper);
        assert_eq!(cursor.stream_position().unwrap(), 3);
    }

    #[test]
    fn data_maps_labels_and_defaults_missing_columns() {
        let schema = schema();
        let input = "Email Address,Full Name\nada@example.com,Ada\ngrace@example.com,Grace\n";
        let mut mapper = RecordMapper::new(Cursor::new(input.as_bytes()), &schema, "form");
        let data = mapper.data().unwrap();
        assert_eq!(data.total_forms(), 2);
        let first = &data.rows()[0];
        assert_eq!(first.get("name"), Some("Ada"));
        assert_eq!(first.get("email"), Some("ada@example.com"));
        assert_eq!(first.get("amount"), Some(""));
        assert_eq!(mapper.n_forms(), 2);
    }

    #[test]
    fn parser_converts_mapped_values() {
        let schema = schema();
        let input = "Full Name,Email Address,Amount\nAda,ada@example.com,$12.50\n";
        let mut mapper = RecordMapper::new(Cursor::new(input.as_bytes()), &schema, "form");
        let data = mapper.data().unwrap();
        assert_eq!(data.rows()[0].get("amount"), Some("12.50"));
    }

    #[test]
    fn short_rows_read_as_empty_cells() {
        let schema = schema();
        let input = "Full Name,Email Address\nAda\n";
        let mut mapper = RecordMapper::new(Cursor::new(input.as_bytes()), &schema, "form");
        let data = mapper.data().unwrap();
        assert_eq!(data.rows()[0].get("email"), Some(""));
    }

    #[test]
    fn header_only_file_has_no_rows() {
        let schema = schema();
        let mut mapper =
            RecordMapper::new(Cursor::new(b"Full Name,Email Address\n".to_vec()), &schema, "form");
        assert_eq!(mapper.data().unwrap().total_forms(), 0);
        assert_eq!(mapper.n_forms(), 0);
    }

    struct CountingReader {
        inner: Cursor<Vec<u8>>,
        reads: Rc<Cell<usize>>,
    }

    impl Read for CountingReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.reads.set(self.reads.get() + 1);
            self.inner.read(buf)
        }
    }

    impl Seek for CountingReader {
        fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
            self.inner.seek(pos)
        }
    }

    #[test]
    fn data_is_memoized() {
        let schema = schema();
        let reads = Rc::new(Cell::new(0));
        let stream = CountingReader {
            inner: Cursor::new(b"Full Name,Email Address\nAda,ada@example.com\n".to_vec()),
            reads: Rc::clone(&reads),
        };
        let mut mapper = RecordMapper::new(stream, &schema, "form");
        mapper.data().unwrap();
        let after_first = reads.get();
        assert!(after_first > 0);
        mapper.data().unwrap();
        mapper.fieldnames().unwrap();
        assert_eq!(reads.get(), after_first);
    }

    #[test]
    fn repeated_data_calls_return_same_rows() {
        let schema = schema();
        let mut mapper = RecordMapper::new(
            Cursor::new(b"Full Name,Email Address\nAda,ada@example.com\n".to_vec()),
            &schema,
            "form",
        );
        let first = mapper.data().unwrap().clone();
        let second = mapper.data().unwrap().clone();
        assert_eq!(first, second);
        assert_eq!(mapper.n_forms(), 1);
    }

    #[test]
    fn undecodable_bytes_are_dropped_from_values() {
        let schema = schema();
        let mut bytes = b"Full Name,Email Address\n".to_vec();
        bytes.extend_from_slice(b"Caf\xe9,cafe@example.com\nGrace,grace@example.com\n");
        let mut mapper = RecordMapper::new(Cursor::new(bytes), &schema, "form");
        let data = mapper.data().unwrap();
        assert_eq!(data.total_forms(), 2);
        assert_eq!(data.rows()[0].get("name"), Some("Caf"));
        assert_eq!(data.rows()[0].get("email"), Some("cafe@example.com"));
        assert_eq!(data.rows()[1].get("name"), Some("Grace"));
    }

    #[test]
    fn explicit_encoding_decodes_legacy_bytes() {
        let schema = schema();
        let (bytes, _, _) = encoding_rs::WINDOWS_1252
            .encode("Full Name,Email Address\nCaf\u{e9},c@example.com\n");
        let mut mapper = RecordMapper::new(Cursor::new(bytes.into_owned()), &schema, "form")
            .with_encoding(encoding_rs::WINDOWS_1252);
        assert_eq!(mapper.data().unwrap().rows()[0].get("name"), Some("Caf\u{e9}"));
    }

    #[test]
    fn lines_and_dumps_delegate_to_serializer() {
        let schema = schema();
        let mut mapper = RecordMapper::new(
            Cursor::new(b"Full Name,Email Address\nAda,ada@example.com\n".to_vec()),
            &schema,
            "form",
        );
        let rows = mapper.data().unwrap().rows().to_vec();
        assert_eq!(mapper.lines(&rows)[1], vec!["Ada", "ada@example.com", ""]);
        assert_eq!(
            mapper.dumps(&rows).unwrap(),
            "Full Name,Email Address,Amount\nAda,ada@example.com,"
        );
    }
}
