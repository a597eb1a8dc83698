//! The per-region export pipeline: snapshot → parse → encode.

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::info;

use rangeport_protocol::RegionKind;

use crate::encode::OutputFormat;
use crate::error::{Error, Result};
use crate::parse::parse_snapshot;
use crate::predicate::NamePredicate;
use crate::record::{BadRow, ExportRecord};
use crate::region::RegionHandle;
use crate::session::Session;

/// The outcome of exporting one region: where it went, what it covered, and
/// every row that did or did not parse. Immutable once produced.
#[derive(Debug)]
pub struct ExportResult {
    /// The region's name.
    pub name: String,
    /// The region's address string at the moment of export ("A1:C10").
    pub address: String,
    /// Parsed data rows, in order.
    pub records: Vec<ExportRecord>,
    /// Rows that failed structural parsing; their presence does not fail the
    /// export.
    pub bad_rows: Vec<BadRow>,
    /// The written output file.
    pub dest_path: PathBuf,
}

/// Exports regions from one open [`Session`] in a fixed [`OutputFormat`].
pub struct Exporter<'s> {
    session: &'s Session,
    format: OutputFormat,
}

impl<'s> Exporter<'s> {
    pub fn new(session: &'s Session, format: OutputFormat) -> Self {
        Self { session, format }
    }

    /// Export the worksheet with this exact name to `dest`.
    pub fn export_sheet(&self, name: &str, dest: impl AsRef<Path>) -> Result<ExportResult> {
        let region = self
            .session
            .find_sheet(name)?
            .ok_or_else(|| Error::RegionNotFound {
                kind: RegionKind::Sheet,
                name: name.to_string(),
            })?;
        self.export_region(&region, dest.as_ref())
    }

    /// Export the table with this exact name to `dest`.
    pub fn export_table(&self, name: &str, dest: impl AsRef<Path>) -> Result<ExportResult> {
        let region = self
            .session
            .find_table(name)?
            .ok_or_else(|| Error::RegionNotFound {
                kind: RegionKind::Table,
                name: name.to_string(),
            })?;
        self.export_region(&region, dest.as_ref())
    }

    /// Export every worksheet the predicate admits (all of them when `None`)
    /// into `dest_dir`, one file per region named after it.
    ///
    /// An empty selection yields an empty list, not an error.
    pub fn export_sheets(
        &self,
        predicate: Option<&NamePredicate>,
        dest_dir: impl AsRef<Path>,
    ) -> Result<Vec<ExportResult>> {
        self.export_matching(RegionKind::Sheet, predicate, dest_dir.as_ref())
    }

    /// Export every table the predicate admits. Same semantics as
    /// [`Exporter::export_sheets`].
    pub fn export_tables(
        &self,
        predicate: Option<&NamePredicate>,
        dest_dir: impl AsRef<Path>,
    ) -> Result<Vec<ExportResult>> {
        self.export_matching(RegionKind::Table, predicate, dest_dir.as_ref())
    }

    fn export_matching(
        &self,
        kind: RegionKind,
        predicate: Option<&NamePredicate>,
        dest_dir: &Path,
    ) -> Result<Vec<ExportResult>> {
        let regions: Vec<RegionHandle> = match kind {
            RegionKind::Sheet => self.session.sheets(predicate)?.collect::<Result<_>>()?,
            RegionKind::Table => self.session.tables(predicate)?.collect::<Result<_>>()?,
        };

        let mut results = Vec::with_capacity(regions.len());
        for region in &regions {
            let dest = dest_dir.join(format!("{}.{}", region.name(), self.format.extension()));
            results.push(self.export_region(region, &dest)?);
        }
        Ok(results)
    }

    /// Run the pipeline for one already-located region.
    ///
    /// The snapshot lives in a temporary directory scope private to this one
    /// export; the scope is deleted when this returns, success or failure.
    pub fn export_region(&self, region: &RegionHandle, dest: &Path) -> Result<ExportResult> {
        let temp_scope = TempDir::new().map_err(|e| Error::SnapshotRead {
            path: std::env::temp_dir(),
            source: e,
        })?;
        let snapshot_path = temp_scope.path().join("snapshot.txt");

        let descriptor = self.session.snapshot_region(region, &snapshot_path)?;
        let (records, bad_rows) = parse_snapshot(&snapshot_path)?;

        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::WriteFailed {
                path: dest.to_path_buf(),
                source: e,
            })?;
        }
        self.format.encode(&records, dest)?;

        info!(
            region = descriptor.name,
            address = descriptor.address,
            records = records.len(),
            bad_rows = bad_rows.len(),
            dest = %dest.display(),
            "region exported"
        );

        Ok(ExportResult {
            name: descriptor.name,
            address: descriptor.address,
            records,
            bad_rows,
            dest_path: dest.to_path_buf(),
        })
    }
}
