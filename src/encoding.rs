//! Encoding detection and normalization for uploaded files.
//!
//! A bounded leading sample is sniffed (BOM first, then UTF-8 validity, then
//! `chardet`). UTF-8 input is handed back untouched; anything else is
//! transcoded through `encoding_rs_io` into an in-memory UTF-8 buffer with
//! undecodable bytes dropped, NFKD applied and one `\n` per line.

use std::io::{self, Cursor, Read, Seek, SeekFrom};

use encoding_rs::{Encoding, UTF_16BE, UTF_16LE, UTF_8};
use encoding_rs_io::DecodeReaderBytesBuilder;
use log::debug;
use unicode_normalization::UnicodeNormalization;

use crate::io_utils::with_restored_position;

pub const DEFAULT_SAMPLE_BYTES: usize = 8 * 1024;

const REPLACEMENT: char = '\u{fffd}';
const BOM: char = '\u{feff}';

/// A stream that is either the caller's own (already UTF-8) or a transcoded
/// copy positioned at its start.
#[derive(Debug)]
pub enum Normalized<R> {
    Original(R),
    Transcoded(Cursor<Vec<u8>>),
}

impl<R> Normalized<R> {
    pub fn is_transcoded(&self) -> bool {
        matches!(self, Normalized::Transcoded(_))
    }
}

impl<R: Read> Read for Normalized<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Normalized::Original(inner) => inner.read(buf),
            Normalized::Transcoded(inner) => inner.read(buf),
        }
    }
}

impl<R: Seek> Seek for Normalized<R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match self {
            Normalized::Original(inner) => inner.seek(pos),
            Normalized::Transcoded(inner) => inner.seek(pos),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct EncodingNormalizer {
    hint: Option<&'static Encoding>,
    sample_bytes: usize,
}

impl Default for EncodingNormalizer {
    fn default() -> Self {
        Self::new(None)
    }
}

impl EncodingNormalizer {
    /// `hint` skips detection and forces the given source encoding.
    pub fn new(hint: Option<&'static Encoding>) -> Self {
        Self {
            hint,
            sample_bytes: DEFAULT_SAMPLE_BYTES,
        }
    }

    pub fn with_sample_bytes(mut self, sample_bytes: usize) -> Self {
        self.sample_bytes = sample_bytes.max(1);
        self
    }

    /// Sniffs the encoding from the start of the stream without moving it.
    pub fn detect<S: Read + Seek>(&self, stream: &mut S) -> io::Result<&'static Encoding> {
        if let Some(hint) = self.hint {
            return Ok(hint);
        }
        let limit = self.sample_bytes;
        let sample = with_restored_position(stream, |s| -> io::Result<Vec<u8>> {
            s.seek(SeekFrom::Start(0))?;
            let mut sample = Vec::with_capacity(limit);
            s.take(limit as u64).read_to_end(&mut sample)?;
            Ok(sample)
        })?;
        Ok(detect_encoding(&sample, sample.len() >= limit))
    }

    pub fn normalize<S: Read + Seek>(&self, mut stream: S) -> io::Result<Normalized<S>> {
        let encoding = self.detect(&mut stream)?;
        if encoding == UTF_8 {
            return Ok(Normalized::Original(stream));
        }
        debug!("Transcoding input from {} to UTF-8", encoding.name());
        let bytes = with_restored_position(&mut stream, |s| -> io::Result<Vec<u8>> {
            s.seek(SeekFrom::Start(0))?;
            transcode(s, encoding)
        })?;
        Ok(Normalized::Transcoded(Cursor::new(bytes)))
    }
}

/// Picks a source encoding for `sample`. `truncated` marks a sample cut at the
/// size limit, where a split multi-byte sequence at the tail is expected.
pub fn detect_encoding(sample: &[u8], truncated: bool) -> &'static Encoding {
    if let Some((encoding, _)) = Encoding::for_bom(sample) {
        return encoding;
    }
    if let Some(encoding) = sniff_utf16(sample) {
        return encoding;
    }
    // NUL bytes are valid UTF-8 but never appear in text exports.
    if !sample.contains(&0) {
        match std::str::from_utf8(sample) {
            Ok(_) => return UTF_8,
            Err(err) if truncated && err.error_len().is_none() => return UTF_8,
            Err(_) => {}
        }
    }
    let (charset, confidence, _) = chardet::detect(sample);
    debug!("chardet guessed '{charset}' with confidence {confidence:.2}");
    let label = chardet::charset2encoding(&charset);
    match Encoding::for_label(label.as_bytes()) {
        Some(encoding) => encoding,
        None => {
            debug!("No usable encoding for '{charset}', assuming UTF-8");
            UTF_8
        }
    }
}

/// BOM-less UTF-16 by NUL placement: mostly-ASCII text has a zero high byte
/// in most code units, odd offsets for little endian and even for big endian.
fn sniff_utf16(sample: &[u8]) -> Option<&'static Encoding> {
    let units = sample.len() / 2;
    if units == 0 {
        return None;
    }
    let (mut even, mut odd) = (0usize, 0usize);
    for (idx, _) in sample.iter().enumerate().filter(|(_, byte)| **byte == 0) {
        if idx % 2 == 0 {
            even += 1;
        } else {
            odd += 1;
        }
    }
    if odd * 2 > units && even * 4 <= odd {
        Some(UTF_16LE)
    } else if even * 2 > units && odd * 4 <= even {
        Some(UTF_16BE)
    } else {
        None
    }
}

/// Decodes `reader` from `encoding` and rewrites it as clean UTF-8 lines.
pub fn transcode<R: Read>(reader: R, encoding: &'static Encoding) -> io::Result<Vec<u8>> {
    let mut decoder = DecodeReaderBytesBuilder::new()
        .encoding(Some(encoding))
        .bom_override(true)
        .strip_bom(true)
        .build(reader);
    let mut text = String::new();
    decoder.read_to_string(&mut text)?;
    Ok(normalize_lines(&text).into_bytes())
}

/// NFKD-normalizes each line, drops replacement characters and stray
/// carriage returns, and terminates every line with a single `\n`.
pub fn normalize_lines(text: &str) -> String {
    let mut output = String::with_capacity(text.len() + 16);
    for line in text.lines() {
        output.extend(
            line.chars()
                .filter(|c| !matches!(*c, REPLACEMENT | BOM | '\r' | '\n' | '\0'))
                .nfkd(),
        );
        output.push('\n');
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use encoding_rs::WINDOWS_1252;

    fn utf16le_with_bom(text: &str) -> Vec<u8> {
        let mut bytes = vec![0xFF, 0xFE];
        for unit in text.encode_utf16() {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        bytes
    }

    #[test]
    fn utf8_input_is_returned_unchanged() {
        let mut cursor = Cursor::new(b"Full Name,Email Address\nAda,ada@example.com\n".to_vec());
        let normalized = EncodingNormalizer::default()
            .normalize(&mut cursor)
            .unwrap();
        assert!(!normalized.is_transcoded());
    }

    #[test]
    fn bom_identifies_utf16() {
        let bytes = utf16le_with_bom("a,b\n");
        assert_eq!(detect_encoding(&bytes, false), UTF_16LE);
    }

    #[test]
    fn nul_placement_identifies_utf16_without_bom() {
        let text = "Full Name,Email Address\r\nAda,ada@example.com\r\n";
        let le: Vec<u8> = text.encode_utf16().flat_map(u16::to_le_bytes).collect();
        let be: Vec<u8> = text.encode_utf16().flat_map(u16::to_be_bytes).collect();
        assert_eq!(detect_encoding(&le, false), UTF_16LE);
        assert_eq!(detect_encoding(&be, false), UTF_16BE);
    }

    #[test]
    fn bomless_utf16_is_transcoded() {
        let text = "Full Name,Email Address\r\nAda,ada@example.com\r\n";
        let le: Vec<u8> = text.encode_utf16().flat_map(u16::to_le_bytes).collect();
        let mut normalized = EncodingNormalizer::default()
            .normalize(Cursor::new(le))
            .unwrap();
        let mut decoded = String::new();
        normalized.read_to_string(&mut decoded).unwrap();
        assert_eq!(decoded, "Full Name,Email Address\nAda,ada@example.com\n");
    }

    #[test]
    fn utf16_input_is_transcoded_to_utf8_lines() {
        let bytes = utf16le_with_bom("Full Name,Email Address\r\nAda,ada@example.com\r\n");
        let mut normalized = EncodingNormalizer::default()
            .normalize(Cursor::new(bytes))
            .unwrap();
        assert!(normalized.is_transcoded());
        let mut text = String::new();
        normalized.read_to_string(&mut text).unwrap();
        assert_eq!(text, "Full Name,Email Address\nAda,ada@example.com\n");
    }

    #[test]
    fn hint_overrides_detection() {
        let (encoded, _, _) = WINDOWS_1252.encode("name\nCaf\u{e9}\n");
        let mut normalized = EncodingNormalizer::new(Some(WINDOWS_1252))
            .normalize(Cursor::new(encoded.into_owned()))
            .unwrap();
        let mut text = String::new();
        normalized.read_to_string(&mut text).unwrap();
        assert_eq!(text, "name\nCafe\u{301}\n");
    }

    #[test]
    fn normalize_preserves_caller_position() {
        let bytes = utf16le_with_bom("a,b\n1,2\n");
        let mut cursor = Cursor::new(bytes);
        cursor.seek(SeekFrom::Start(4)).unwrap();
        let normalized = EncodingNormalizer::default().normalize(&mut cursor).unwrap();
        assert!(normalized.is_transcoded());
        drop(normalized);
        assert_eq!(cursor.stream_position().unwrap(), 4);
    }

    #[test]
    fn truncated_multibyte_tail_still_counts_as_utf8() {
        let sample = "caf\u{e9}".as_bytes();
        let cut = &sample[..sample.len() - 1];
        assert_eq!(detect_encoding(cut, true), UTF_8);
    }

    #[test]
    fn normalize_lines_drops_replacement_characters() {
        assert_eq!(normalize_lines("a\u{fffd}b\r\nc"), "ab\nc\n");
    }
}
