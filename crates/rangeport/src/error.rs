//! Error types for rangeport

use std::path::PathBuf;

use thiserror::Error;

use crate::client::ClientError;
use rangeport_protocol::RegionKind;

/// Result type alias using [`Error`]
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while opening a session or exporting regions.
///
/// Malformed snapshot rows are deliberately *not* here: they accumulate as
/// [`crate::BadRow`] data inside [`crate::ExportResult`] and never abort a run.
#[derive(Debug, Error)]
pub enum Error {
    /// The workbook to export from does not exist. Raised before any native
    /// handle is acquired.
    #[error("Source workbook not found: {}", .0.display())]
    SourceNotFound(PathBuf),

    /// A reference workbook does not exist. Raised before any native handle
    /// is acquired; names the first missing file.
    #[error("Reference workbook not found: {}", .0.display())]
    ReferenceNotFound(PathBuf),

    /// Starting the application or opening a workbook failed partway through
    /// acquisition. Everything acquired so far has already been released.
    #[error("Failed to open automation session: {0}")]
    ApplicationOpenFailed(#[source] ClientError),

    /// An exact-name lookup missed. Enumeration-based exports simply yield
    /// nothing instead.
    #[error("{kind:?} region not found: {name}")]
    RegionNotFound { kind: RegionKind, name: String },

    /// A region handle from an earlier enumeration no longer resolves.
    #[error("Region vanished during export: {0}")]
    RegionVanished(String),

    /// Writing an output file failed.
    #[error("Failed to write {}: {source}", .path.display())]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Reading a snapshot back from the temporary scope failed.
    #[error("Failed to read snapshot {}: {source}", .path.display())]
    SnapshotRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The automation host rejected a command or the transport broke.
    #[error(transparent)]
    Client(#[from] ClientError),
}
