//! I/O utilities shared by the mapper, normalizer and CLI.
//!
//! - **Stream discipline**: [`StreamCheckpoint`] and [`with_restored_position`]
//!   put a seekable stream back where they found it on every exit path, so the
//!   same upload can be sniffed, probed by each map option, and then extracted.
//! - **Reader construction**: `open_csv_reader` builds a header-aware reader.
//! - **Decoding**: per-field decoding drops bytes the encoding cannot map,
//!   so one stray byte never fails a whole import.
//! - **stdin/stdout**: the `-` path convention routes through standard streams.

use std::{
    fs::File,
    io::{self, BufWriter, Cursor, Read, Seek, SeekFrom, Write},
    ops::{Deref, DerefMut},
    path::Path,
};

use anyhow::{Context, Result};
use encoding_rs::{Encoding, UTF_8};
use log::warn;

use crate::error::{FormatError, SchemaError};

pub const DEFAULT_CSV_DELIMITER: u8 = b',';
pub const DEFAULT_TSV_DELIMITER: u8 = b'\t';

const UTF8_BOM: char = '\u{feff}';
const REPLACEMENT_CHARACTER: char = '\u{fffd}';

/// Object-safe combination of `Read` and `Seek` for uploaded files.
pub trait ReadSeek: Read + Seek {}

impl<T: Read + Seek> ReadSeek for T {}

/// Remembers a stream position and seeks back to it when dropped.
///
/// Derefs to the wrapped stream so probes can read through the guard.
pub struct StreamCheckpoint<'a, S: Seek> {
    stream: &'a mut S,
    position: u64,
}

impl<'a, S: Seek> StreamCheckpoint<'a, S> {
    pub fn new(stream: &'a mut S) -> io::Result<Self> {
        let position = stream.stream_position()?;
        Ok(Self { stream, position })
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    /// Seeks back now and reports failure instead of logging it on drop.
    pub fn restore(self) -> io::Result<()> {
        let position = self.position;
        let mut this = std::mem::ManuallyDrop::new(self);
        this.stream.seek(SeekFrom::Start(position)).map(|_| ())
    }
}

impl<S: Seek> Deref for StreamCheckpoint<'_, S> {
    type Target = S;

    fn deref(&self) -> &S {
        self.stream
    }
}

impl<S: Seek> DerefMut for StreamCheckpoint<'_, S> {
    fn deref_mut(&mut self) -> &mut S {
        self.stream
    }
}

impl<S: Seek> Drop for StreamCheckpoint<'_, S> {
    fn drop(&mut self) {
        if let Err(err) = self.stream.seek(SeekFrom::Start(self.position)) {
            warn!("Failed to restore stream position {}: {err}", self.position);
        }
    }
}

/// Runs `probe` against `stream` and restores the original position whether
/// the probe succeeds, fails or unwinds.
pub fn with_restored_position<S, T, E, F>(stream: &mut S, probe: F) -> Result<T, E>
where
    S: Seek,
    E: From<io::Error>,
    F: FnOnce(&mut S) -> Result<T, E>,
{
    let mut checkpoint = StreamCheckpoint::new(stream)?;
    let outcome = probe(&mut *checkpoint);
    let restored = checkpoint.restore();
    let value = outcome?;
    restored?;
    Ok(value)
}

/// Total byte length of a seekable stream, leaving its position untouched.
pub fn stream_len<S: Seek>(stream: &mut S) -> io::Result<u64> {
    with_restored_position(stream, |s| s.seek(SeekFrom::End(0)))
}

pub fn is_dash(path: &Path) -> bool {
    path == Path::new("-")
}

/// `None` means "detect from the file contents".
pub fn resolve_encoding(label: Option<&str>) -> Result<Option<&'static Encoding>, SchemaError> {
    match label.map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => Encoding::for_label(value.as_bytes())
            .map(Some)
            .ok_or_else(|| SchemaError::UnknownEncoding(value.to_string())),
    }
}

pub fn resolve_input_delimiter(path: &Path, provided: Option<u8>) -> u8 {
    provided.unwrap_or_else(|| match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("tsv") => DEFAULT_TSV_DELIMITER,
        _ => DEFAULT_CSV_DELIMITER,
    })
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "|" | "pipe" => Ok(b'|'),
        ";" | "semicolon" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err("Delimiter must be a single character".to_string());
            }
            if !first.is_ascii() {
                return Err("Delimiter must be ASCII".to_string());
            }
            Ok(first as u8)
        }
    }
}

/// Header-aware reader that tolerates ragged rows; short rows read as empty
/// trailing cells.
pub fn open_csv_reader<R>(reader: R, delimiter: u8) -> csv::Reader<R>
where
    R: Read,
{
    let mut builder = csv::ReaderBuilder::new();
    builder
        .has_headers(true)
        .delimiter(delimiter)
        .double_quote(true)
        .flexible(true);
    builder.from_reader(reader)
}

pub fn decode_bytes(bytes: &[u8], encoding: &'static Encoding) -> String {
    let (text, had_errors) = encoding.decode_without_bom_handling(bytes);
    if had_errors {
        text.chars().filter(|c| *c != REPLACEMENT_CHARACTER).collect()
    } else {
        text.into_owned()
    }
}

pub fn decode_record(record: &csv::ByteRecord, encoding: &'static Encoding) -> Vec<String> {
    record
        .iter()
        .map(|field| decode_bytes(field, encoding))
        .collect()
}

/// Decodes the header row, dropping a UTF-8 byte order mark from the first
/// label so spreadsheet exports still match.
pub fn decode_headers(record: &csv::ByteRecord, encoding: &'static Encoding) -> Vec<String> {
    let mut headers = decode_record(record, encoding);
    if let Some(first) = headers.first_mut() {
        if first.starts_with(UTF8_BOM) {
            first.remove(0);
        }
    }
    headers
}

pub fn reader_headers<R>(
    reader: &mut csv::Reader<R>,
    encoding: &'static Encoding,
) -> Result<Vec<String>, FormatError>
where
    R: Read,
{
    let headers = reader.byte_headers()?;
    Ok(decode_headers(headers, encoding))
}

pub fn default_encoding() -> &'static Encoding {
    UTF_8
}

/// Opens an uploaded file as a seekable stream. `-` buffers stdin in memory.
pub fn open_input(path: &Path) -> Result<Box<dyn ReadSeek>> {
    if is_dash(path) {
        let mut buffer = Vec::new();
        io::stdin()
            .lock()
            .read_to_end(&mut buffer)
            .context("Reading input from stdin")?;
        Ok(Box::new(Cursor::new(buffer)))
    } else {
        let file = File::open(path).with_context(|| format!("Opening input file {path:?}"))?;
        Ok(Box::new(file))
    }
}

pub fn open_output(path: Option<&Path>) -> Result<Box<dyn Write>> {
    let writer: Box<dyn Write> = match path {
        Some(p) if !is_dash(p) => Box::new(BufWriter::new(
            File::create(p).with_context(|| format!("Creating output file {p:?}"))?,
        )),
        _ => Box::new(io::stdout()),
    };
    Ok(writer)
}
