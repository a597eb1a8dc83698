//! Region value types: rectangles, transient handles, range descriptors.

use serde::Serialize;

use rangeport_protocol::{RegionInfo, RegionKind, RegionTarget};

use crate::address::range_address;

/// A 1-based value rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub row: u32,
    pub column: u32,
    pub rows: u32,
    pub columns: u32,
}

impl Rect {
    /// The spreadsheet-style address string for this rectangle.
    pub fn address(&self) -> String {
        range_address(self.row, self.column, self.rows, self.columns)
    }
}

/// A transient reference to a worksheet or table region.
///
/// Handles are scoped to one lookup or one enumeration step: they carry the
/// name and rectangle resolved at the moment of access, not a live native
/// pointer, and are re-resolved by name if the region is later snapshotted.
#[derive(Debug, Clone)]
pub struct RegionHandle {
    kind: RegionKind,
    name: String,
    rect: Rect,
}

impl RegionHandle {
    pub(crate) fn from_info(kind: RegionKind, info: RegionInfo) -> Self {
        Self {
            kind,
            name: info.name,
            rect: Rect {
                row: info.row,
                column: info.column,
                rows: info.rows,
                columns: info.columns,
            },
        }
    }

    pub fn kind(&self) -> RegionKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rect(&self) -> Rect {
        self.rect
    }

    /// Name and address at the moment this handle was resolved.
    pub fn descriptor(&self) -> RangeDescriptor {
        RangeDescriptor {
            name: self.name.clone(),
            address: self.rect.address(),
        }
    }

    pub(crate) fn target(&self) -> RegionTarget {
        match self.kind {
            RegionKind::Sheet => RegionTarget::Sheet {
                name: self.name.clone(),
            },
            RegionKind::Table => RegionTarget::Table {
                name: self.name.clone(),
            },
        }
    }
}

/// Immutable name + computed address of a located region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RangeDescriptor {
    pub name: String,
    pub address: String,
}
