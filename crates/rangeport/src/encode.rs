//! Output encoders: delimited text, structured text, compact binary.
//!
//! A small closed set of variants behind one encode entry point; all variants
//! consume the full in-memory record list (region sizes make streaming
//! unnecessary).

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::Serialize;

use crate::error::{Error, Result};
use crate::record::ExportRecord;

/// The output format for an exported region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// UTF-8 CSV without byte-order mark, standard quoting.
    Csv,
    /// Pretty-printed UTF-8 JSON; non-ASCII characters pass through unescaped.
    Json,
    /// MessagePack, one map per record; optionally zstd-compressed as a block.
    MessagePack { compress: bool },
}

impl OutputFormat {
    /// Conventional file extension for this format.
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Csv => "csv",
            OutputFormat::Json => "json",
            OutputFormat::MessagePack { .. } => "mpack",
        }
    }

    /// Encode the records to `dest`, mapping any I/O failure to
    /// [`Error::WriteFailed`] naming the destination.
    pub fn encode(&self, records: &[ExportRecord], dest: &Path) -> Result<()> {
        let write_failed = |e: std::io::Error| Error::WriteFailed {
            path: dest.to_path_buf(),
            source: e,
        };

        let file = File::create(dest).map_err(write_failed)?;
        let mut writer = BufWriter::new(file);

        match self {
            OutputFormat::Csv => encode_csv(records, &mut writer),
            OutputFormat::Json => encode_json(records, &mut writer),
            OutputFormat::MessagePack { compress: false } => encode_msgpack(records, &mut writer),
            OutputFormat::MessagePack { compress: true } => {
                let mut encoder = zstd::Encoder::new(&mut writer, 0).map_err(write_failed)?;
                encode_msgpack(records, &mut encoder)?;
                encoder.finish().map_err(write_failed)?;
                Ok(())
            }
        }
        .map_err(|e| match e {
            Error::WriteFailed { source, .. } => Error::WriteFailed {
                path: dest.to_path_buf(),
                source,
            },
            other => other,
        })?;

        writer.flush().map_err(write_failed)
    }
}

fn encode_csv<W: Write>(records: &[ExportRecord], writer: W) -> Result<()> {
    let mut csv_writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::CRLF)
        .from_writer(writer);

    let io_err = |e: csv::Error| Error::WriteFailed {
        path: Default::default(),
        source: std::io::Error::new(std::io::ErrorKind::Other, e),
    };

    if let Some(first) = records.first() {
        csv_writer
            .write_record(first.headers())
            .map_err(io_err)?;
        for record in records {
            csv_writer.write_record(record.values()).map_err(io_err)?;
        }
    }

    csv_writer
        .into_inner()
        .map(|_| ())
        .map_err(|e| Error::WriteFailed {
            path: Default::default(),
            source: std::io::Error::new(std::io::ErrorKind::Other, e.to_string()),
        })
}

fn encode_json<W: Write>(records: &[ExportRecord], writer: W) -> Result<()> {
    // serde_json never escapes non-ASCII; the full Unicode range passes
    // through as-is.
    serde_json::to_writer_pretty(writer, records).map_err(|e| Error::WriteFailed {
        path: Default::default(),
        source: std::io::Error::new(std::io::ErrorKind::Other, e),
    })
}

fn encode_msgpack<W: Write>(records: &[ExportRecord], writer: W) -> Result<()> {
    let mut serializer = rmp_serde::Serializer::new(writer);
    records
        .serialize(&mut serializer)
        .map_err(|e| Error::WriteFailed {
            path: Default::default(),
            source: std::io::Error::new(std::io::ErrorKind::Other, e),
        })
}
