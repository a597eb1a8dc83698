//! Shared protocol types for communication between the native client and the
//! Windows automation host process running under WINE.
//!
//! The protocol is JSON-over-stdio: one JSON object per line in each direction.
//! The host owns the live COM objects; the client only ever sees opaque `u64`
//! workbook handles and plain region metadata, so every native resource can be
//! released by the host in the exact reverse of its acquisition order.

use serde::{Deserialize, Serialize};

/// A command sent from the client to the automation host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Monotonically increasing request ID for correlating responses.
    pub id: u64,
    /// The command to execute.
    #[serde(flatten)]
    pub command: Command,
}

/// Commands the client can send to the host.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "cmd", content = "params")]
pub enum Command {
    /// Initialize COM and create the Excel.Application instance with
    /// interactive alerts, screen redraw, and link-update prompts suppressed.
    Init,

    /// Acquire the application's Workbooks collection.
    ///
    /// A separate step from `Init` so the client-visible command log mirrors
    /// the full ownership tree: application, collection, then workbooks.
    AcquireWorkbooks,

    /// Open a workbook from a file path (Windows path as seen by WINE).
    /// Opened with `UpdateLinks:=0`; never updates cross-file links.
    OpenWorkbook { path: String, read_only: bool },

    /// Look up a worksheet by name or 1-based index.
    /// Returns `Region(None)` when absent; absence is not an error.
    FindSheet { workbook: u64, sheet: SheetRef },

    /// Look up a table by exact name, scanning worksheets in workbook order
    /// and each sheet's tables in declaration order.
    FindTable { workbook: u64, name: String },

    /// Count the regions of one kind in a workbook.
    RegionCount { workbook: u64, kind: RegionKind },

    /// Fetch the region of one kind at a 1-based position, with its name and
    /// rectangle resolved at the moment of access.
    RegionAt {
        workbook: u64,
        kind: RegionKind,
        index: u32,
    },

    /// Copy a region's values and number formats into a brand-new ephemeral
    /// workbook and save that copy as tab-delimited Unicode text at
    /// `dest_path`. The ephemeral workbook is discarded afterwards; the
    /// returned rectangle describes the *original* region.
    SnapshotRegion {
        workbook: u64,
        target: RegionTarget,
        dest_path: String,
    },

    /// Close a workbook without saving.
    CloseWorkbook { workbook: u64 },

    /// Release the Workbooks collection.
    ReleaseWorkbooks,

    /// Restore the application's interactive settings, quit Excel, release
    /// remaining COM state, and exit the host process.
    Shutdown,
}

/// Reference to a worksheet, by 1-based index or by exact name.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SheetRef {
    Index(u32),
    Name(String),
}

/// The two kinds of named region a workbook exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionKind {
    /// A worksheet; its exportable rectangle is the sheet's used range.
    Sheet,
    /// A table (Excel ListObject); its rectangle is the declared table range.
    Table,
}

/// A region to snapshot, re-resolved by the host at the moment of the copy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RegionTarget {
    Sheet { name: String },
    Table { name: String },
}

/// Name and 1-based value rectangle of a region at the moment of access.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionInfo {
    pub name: String,
    pub row: u32,
    pub column: u32,
    pub rows: u32,
    pub columns: u32,
}

/// A response sent from the host back to the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// The request ID this response corresponds to.
    pub id: u64,
    /// The result of the command.
    #[serde(flatten)]
    pub result: ResponseResult,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status")]
pub enum ResponseResult {
    #[serde(rename = "ok")]
    Ok {
        #[serde(skip_serializing_if = "Option::is_none")]
        data: Option<ResponseData>,
    },
    #[serde(rename = "error")]
    Error { message: String },
}

/// Data returned in successful responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponseData {
    /// Handle to a newly opened workbook.
    WorkbookHandle { workbook: u64 },
    /// A region count.
    Count { count: u32 },
    /// A resolved region, or `None` when the lookup missed.
    Region { region: Option<RegionInfo> },
}

/// Message prefix the host uses when a snapshot target no longer resolves.
///
/// The client maps errors carrying this prefix to its session-consistency
/// error rather than a generic host failure.
pub const VANISHED_PREFIX: &str = "vanished: ";
