//! Snapshot parsing: UTF-16 tab-delimited text into ordered records.
//!
//! The snapshot format is whatever Excel writes for "Unicode text": UTF-16
//! with a BOM, tab delimiters, a header row, no quoting guarantees. Rows that
//! cannot be reconciled with the header become [`BadRow`] entries; the parse
//! itself is fully drained and never fails on row content.

use std::path::Path;

use tracing::debug;

use crate::error::{Error, Result};
use crate::record::{BadRow, ExportRecord};

/// Parse a snapshot file into `(records, bad_rows)`.
///
/// - the first row defines the field names (trimmed);
/// - rows where every field is blank or whitespace-only are skipped entirely
///   (not emitted, not bad);
/// - rows whose field count differs from the header count are captured as
///   [`BadRow`]s and excluded from the records;
/// - all values are trimmed of surrounding whitespace.
pub fn parse_snapshot(path: &Path) -> Result<(Vec<ExportRecord>, Vec<BadRow>)> {
    let bytes = std::fs::read(path).map_err(|e| Error::SnapshotRead {
        path: path.to_path_buf(),
        source: e,
    })?;
    let text = decode_unicode_text(&bytes);
    Ok(parse_str(&text))
}

/// Decode "Unicode text" bytes: UTF-16 via BOM sniffing, little-endian when
/// the BOM is absent (what Excel writes in practice).
fn decode_unicode_text(bytes: &[u8]) -> String {
    let (text, encoding, malformed) = encoding_rs::UTF_16LE.decode(bytes);
    if malformed {
        debug!(encoding = encoding.name(), "snapshot contained malformed sequences");
    }
    text.into_owned()
}

fn parse_str(text: &str) -> (Vec<ExportRecord>, Vec<BadRow>) {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut rows = reader.records();

    let headers: Vec<String> = match rows.next() {
        Some(Ok(header_row)) => header_row.iter().map(|h| h.trim().to_string()).collect(),
        _ => return (Vec::new(), Vec::new()),
    };

    let mut records = Vec::new();
    let mut bad_rows = Vec::new();

    for row in rows {
        let row = match row {
            Ok(row) => row,
            // The csv reader only errors here on malformed structure it
            // cannot recover a record from; keep draining.
            Err(e) => {
                bad_rows.push(BadRow {
                    raw: e.to_string(),
                    field: String::new(),
                });
                continue;
            }
        };

        if row.iter().all(|field| field.trim().is_empty()) {
            continue;
        }

        if row.len() != headers.len() {
            bad_rows.push(BadRow {
                raw: row.iter().collect::<Vec<_>>().join("\t"),
                field: row.get(headers.len()).unwrap_or_default().to_string(),
            });
            continue;
        }

        let fields = headers
            .iter()
            .cloned()
            .zip(row.iter().map(|v| v.trim().to_string()))
            .collect();
        records.push(ExportRecord::new(fields));
    }

    (records, bad_rows)
}
