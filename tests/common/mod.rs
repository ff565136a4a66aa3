#![allow(dead_code)]

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::{TempDir, tempdir};

/// Map options shared by the integration suites: a contact layout and a
/// payment layout with a currency parser on a semicolon-delimited file.
pub const CONTACT_CONFIG: &str = r#"
max_upload_bytes: 100000
options:
  - kind: contact
    fields:
      - { name: name, label: Full Name }
      - { name: email, label: Email Address, required: true }
  - kind: payment
    prefix: payments
    delimiter: ";"
    fields:
      - { name: payer, label: Payer, required: true }
      - { name: amount, label: Amount, parser: strip_currency, required: true }
"#;

/// Encodes `text` as UTF-16LE with a byte order mark.
pub fn utf16le(text: &str) -> Vec<u8> {
    let mut bytes = vec![0xFF, 0xFE];
    for unit in text.encode_utf16() {
        bytes.extend_from_slice(&unit.to_le_bytes());
    }
    bytes
}

/// Scratch directory helper that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        self.write_bytes(name, contents.as_bytes())
    }

    pub fn write_bytes(&self, name: &str, contents: &[u8]) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        let mut file = File::create(&path).expect("create temp file");
        file.write_all(contents).expect("write temp file contents");
        path
    }

    pub fn config(&self) -> PathBuf {
        self.write("options.yml", CONTACT_CONFIG)
    }
}
