//! Export archive reading.
//!
//! Credential exports come back as password protected archives, device
//! exports as plain CSV. Decryption is left to an [`ArchiveReader`]
//! implementation supplied by the deployment.

use std::collections::BTreeMap;

use thiserror::Error;

use super::DownloadedFile;

/// One exported row keyed by CSV header.
pub type ExportRow = BTreeMap<String, String>;

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";

/// Archive errors.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("export '{0}' is an encrypted archive and no decrypting reader is configured")]
    Encrypted(String),

    #[error("failed to parse export '{file}': {message}")]
    Parse { file: String, message: String },

    #[error("export '{0}' is not valid UTF-8")]
    Utf8(String),
}

pub type Result<T> = std::result::Result<T, ArchiveError>;

/// Turns a downloaded export into rows.
pub trait ArchiveReader: Send + Sync {
    fn read_rows(&self, file: &DownloadedFile, password: Option<&str>) -> Result<Vec<ExportRow>>;
}

/// Reader for unencrypted CSV exports.
///
/// Controllers deliver credential exports as password-protected zips, which
/// this reader refuses with [`ArchiveError::Encrypted`]. Credential updates
/// need a decrypting reader installed with `Reconciler::with_archive_reader`.
#[derive(Debug, Default, Clone, Copy)]
pub struct CsvArchiveReader;

impl CsvArchiveReader {
    pub fn new() -> Self {
        Self
    }
}

impl ArchiveReader for CsvArchiveReader {
    fn read_rows(&self, file: &DownloadedFile, _password: Option<&str>) -> Result<Vec<ExportRow>> {
        let name = file.name.clone().unwrap_or_else(|| "export".to_string());

        if file.bytes.starts_with(ZIP_MAGIC) {
            return Err(ArchiveError::Encrypted(name));
        }
        if std::str::from_utf8(&file.bytes).is_err() {
            return Err(ArchiveError::Utf8(name));
        }

        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(file.bytes.as_slice());

        let headers = reader
            .headers()
            .map_err(|e| ArchiveError::Parse {
                file: name.clone(),
                message: e.to_string(),
            })?
            .clone();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| ArchiveError::Parse {
                file: name.clone(),
                message: e.to_string(),
            })?;
            let row: ExportRow = headers
                .iter()
                .zip(record.iter())
                .map(|(h, v)| (h.to_string(), v.to_string()))
                .collect();
            rows.push(row);
        }
        Ok(rows)
    }
}

/// Serialize rows back to CSV, columns in header order of the first row.
pub fn write_rows(rows: &[ExportRow]) -> std::result::Result<Vec<u8>, csv::Error> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    if let Some(first) = rows.first() {
        writer.write_record(first.keys())?;
        for row in rows {
            writer.write_record(first.keys().map(|k| row.get(k).map(String::as_str).unwrap_or("")))?;
        }
    }
    writer
        .into_inner()
        .map_err(|e| csv::Error::from(e.into_error()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(bytes: &[u8]) -> DownloadedFile {
        DownloadedFile {
            name: Some("devices.csv".to_string()),
            bytes: bytes.to_vec(),
        }
    }

    #[test]
    fn test_read_plain_csv() {
        let rows = CsvArchiveReader::new()
            .read_rows(
                &file(b"ip_address,cli_username\n10.0.0.1, admin\n10.0.0.2,ops\n"),
                None,
            )
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["ip_address"], "10.0.0.1");
        assert_eq!(rows[0]["cli_username"], "admin");
        assert_eq!(rows[1]["cli_username"], "ops");
    }

    #[test]
    fn test_encrypted_archive_is_reported() {
        let err = CsvArchiveReader::new()
            .read_rows(&file(b"PK\x03\x04rest-of-zip"), Some("Str0ng!Pass"))
            .unwrap_err();
        assert!(matches!(err, ArchiveError::Encrypted(_)));
    }

    #[test]
    fn test_write_rows_keeps_columns() {
        let rows = CsvArchiveReader::new()
            .read_rows(&file(b"a,b\n1,2\n"), None)
            .unwrap();
        let out = write_rows(&rows).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "a,b\n1,2\n");
    }
}
