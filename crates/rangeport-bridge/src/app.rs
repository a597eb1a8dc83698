//! Excel automation layer built on top of the generic IDispatch wrapper:
//! the application instance, its workbooks collection, and the region
//! operations the client can ask for.

#![cfg(windows)]

use std::collections::HashMap;

use rangeport_protocol::{RegionInfo, RegionKind, RegionTarget, SheetRef, VANISHED_PREFIX};

use crate::dispatch::{
    variant_bool, variant_get_bool, variant_get_f64, variant_get_string, variant_i32, variant_str,
    DispatchObject,
};

/// xlPasteValuesAndNumberFormats
const PASTE_VALUES_AND_NUMBER_FORMATS: i32 = 12;
/// xlUnicodeText — tab-delimited UTF-16 text
const FILE_FORMAT_UNICODE_TEXT: i32 = 42;

/// Manages an Excel.Application COM instance, the Workbooks collection, and
/// the open workbooks. Handles are opaque IDs; the client decides ordering,
/// this type only acts on the commands it receives.
pub struct ExcelHost {
    app: DispatchObject,
    /// Interactive settings as they were before automation overrode them;
    /// restored right before Quit.
    saved: SavedSettings,
    workbooks_collection: Option<DispatchObject>,
    /// Map from our handle IDs to workbook dispatch objects.
    workbooks: HashMap<u64, DispatchObject>,
    next_handle: u64,
}

struct SavedSettings {
    display_alerts: bool,
    screen_updating: bool,
    ask_to_update_links: bool,
}

impl ExcelHost {
    /// Create a new Excel.Application instance via COM with the interactive
    /// surfaces (alerts, redraw, link-update prompts) suppressed.
    pub fn new() -> Result<Self, String> {
        let app = DispatchObject::create_from_progid("Excel.Application")?;

        let saved = SavedSettings {
            display_alerts: read_bool_or(&app, "DisplayAlerts", true),
            screen_updating: read_bool_or(&app, "ScreenUpdating", true),
            ask_to_update_links: read_bool_or(&app, "AskToUpdateLinks", true),
        };

        app.set_property("Visible", variant_bool(false))?;
        app.set_property("DisplayAlerts", variant_bool(false))?;
        app.set_property("ScreenUpdating", variant_bool(false))?;
        app.set_property("AskToUpdateLinks", variant_bool(false))?;

        Ok(Self {
            app,
            saved,
            workbooks_collection: None,
            workbooks: HashMap::new(),
            next_handle: 1,
        })
    }

    /// Take a reference to the application's Workbooks collection.
    pub fn acquire_workbooks(&mut self) -> Result<(), String> {
        if self.workbooks_collection.is_none() {
            self.workbooks_collection = Some(self.app.get_child("Workbooks")?);
        }
        Ok(())
    }

    fn collection(&self) -> Result<&DispatchObject, String> {
        self.workbooks_collection.as_ref().ok_or_else(|| {
            "Workbooks collection not acquired. Send 'AcquireWorkbooks' first.".to_string()
        })
    }

    /// Open a workbook from a file path. Returns the handle ID.
    /// `UpdateLinks:=0` so cross-file links are never rewritten on open.
    pub fn open_workbook(&mut self, path: &str, read_only: bool) -> Result<u64, String> {
        let wb = self.collection()?.invoke_child(
            "Open",
            &[variant_str(path), variant_i32(0), variant_bool(read_only)],
        )?;
        let handle = self.next_handle;
        self.next_handle += 1;
        self.workbooks.insert(handle, wb);
        Ok(handle)
    }

    fn workbook(&self, handle: u64) -> Result<&DispatchObject, String> {
        self.workbooks
            .get(&handle)
            .ok_or_else(|| format!("Unknown workbook handle: {handle}"))
    }

    /// Look up a worksheet by name or 1-based index. Absence is `None`, not
    /// an error.
    pub fn find_sheet(
        &self,
        wb_handle: u64,
        sheet: &SheetRef,
    ) -> Result<Option<RegionInfo>, String> {
        let sheets = self.workbook(wb_handle)?.get_child("Worksheets")?;
        let count = read_i32(&sheets, "Count")?;

        match sheet {
            SheetRef::Index(index) => {
                if *index < 1 || *index as i64 > count as i64 {
                    return Ok(None);
                }
                let ws = sheets.get_indexed("Item", &variant_i32(*index as i32))?;
                Ok(Some(sheet_info(&ws)?))
            }
            SheetRef::Name(name) => {
                // Indexing Worksheets by a missing name raises a COM
                // exception, so scan by position and compare names instead.
                for i in 1..=count {
                    let ws = sheets.get_indexed("Item", &variant_i32(i))?;
                    if read_string(&ws, "Name")? == *name {
                        return Ok(Some(sheet_info(&ws)?));
                    }
                }
                Ok(None)
            }
        }
    }

    /// Look up a table by exact name across all worksheets.
    pub fn find_table(&self, wb_handle: u64, name: &str) -> Result<Option<RegionInfo>, String> {
        for table in self.all_tables(wb_handle)? {
            if read_string(&table, "Name")? == name {
                return Ok(Some(table_info(&table)?));
            }
        }
        Ok(None)
    }

    pub fn region_count(&self, wb_handle: u64, kind: RegionKind) -> Result<u32, String> {
        match kind {
            RegionKind::Sheet => {
                let sheets = self.workbook(wb_handle)?.get_child("Worksheets")?;
                Ok(read_i32(&sheets, "Count")? as u32)
            }
            RegionKind::Table => Ok(self.all_tables(wb_handle)?.len() as u32),
        }
    }

    pub fn region_at(
        &self,
        wb_handle: u64,
        kind: RegionKind,
        index: u32,
    ) -> Result<Option<RegionInfo>, String> {
        if index < 1 {
            return Ok(None);
        }
        match kind {
            RegionKind::Sheet => self.find_sheet(wb_handle, &SheetRef::Index(index)),
            RegionKind::Table => match self.all_tables(wb_handle)?.get(index as usize - 1) {
                Some(table) => Ok(Some(table_info(table)?)),
                None => Ok(None),
            },
        }
    }

    /// Every table in the workbook: worksheets in workbook order, then each
    /// sheet's ListObjects in declaration order.
    fn all_tables(&self, wb_handle: u64) -> Result<Vec<DispatchObject>, String> {
        let sheets = self.workbook(wb_handle)?.get_child("Worksheets")?;
        let sheet_count = read_i32(&sheets, "Count")?;

        let mut tables = Vec::new();
        for s in 1..=sheet_count {
            let ws = sheets.get_indexed("Item", &variant_i32(s))?;
            let objects = ws.get_child("ListObjects")?;
            let table_count = read_i32(&objects, "Count")?;
            for t in 1..=table_count {
                tables.push(objects.get_indexed("Item", &variant_i32(t))?);
            }
        }
        Ok(tables)
    }

    /// Copy the region's values and number formats into a brand-new workbook
    /// and save that copy as tab-delimited Unicode text at `dest_path`. The
    /// source workbook is never saved, so it never holds a lock on the
    /// destination.
    pub fn snapshot_region(
        &self,
        wb_handle: u64,
        target: &RegionTarget,
        dest_path: &str,
    ) -> Result<RegionInfo, String> {
        let (info, source_range) = self.resolve_target(wb_handle, target)?;

        source_range.invoke_method("Copy", &[])?;
        let ephemeral = self.collection()?.invoke_child("Add", &[])?;

        let pasted = self.paste_and_save(&ephemeral, dest_path);
        // Discard the ephemeral workbook whether or not the save succeeded.
        let closed = ephemeral.invoke_method("Close", &[variant_bool(false)]);

        pasted?;
        closed.map_err(|e| format!("failed to discard snapshot workbook: {e}"))?;
        Ok(info)
    }

    fn paste_and_save(&self, ephemeral: &DispatchObject, dest_path: &str) -> Result<(), String> {
        let sheets = ephemeral.get_child("Worksheets")?;
        let ws = sheets.get_indexed("Item", &variant_i32(1))?;
        let anchor = ws.get_indexed("Range", &variant_str("A1"))?;

        anchor.invoke_method(
            "PasteSpecial",
            &[variant_i32(PASTE_VALUES_AND_NUMBER_FORMATS)],
        )?;
        // Drop the clipboard marquee so Close doesn't prompt.
        let _ = self.app.set_property("CutCopyMode", variant_bool(false));

        ephemeral.invoke_method(
            "SaveAs",
            &[variant_str(dest_path), variant_i32(FILE_FORMAT_UNICODE_TEXT)],
        )?;
        Ok(())
    }

    /// Re-resolve a snapshot target by name at the moment of the copy. A
    /// target that resolved earlier but is gone now gets the `vanished:`
    /// error prefix the client keys on.
    fn resolve_target(
        &self,
        wb_handle: u64,
        target: &RegionTarget,
    ) -> Result<(RegionInfo, DispatchObject), String> {
        match target {
            RegionTarget::Sheet { name } => {
                let sheets = self.workbook(wb_handle)?.get_child("Worksheets")?;
                let count = read_i32(&sheets, "Count")?;
                for i in 1..=count {
                    let ws = sheets.get_indexed("Item", &variant_i32(i))?;
                    if read_string(&ws, "Name")? == *name {
                        let range = ws.get_child("UsedRange")?;
                        let info = range_info(name, &range)?;
                        return Ok((info, range));
                    }
                }
                Err(format!("{VANISHED_PREFIX}{name}"))
            }
            RegionTarget::Table { name } => {
                for table in self.all_tables(wb_handle)? {
                    if read_string(&table, "Name")? == *name {
                        let range = table.get_child("Range")?;
                        let info = range_info(name, &range)?;
                        return Ok((info, range));
                    }
                }
                Err(format!("{VANISHED_PREFIX}{name}"))
            }
        }
    }

    /// Close a workbook without saving.
    pub fn close_workbook(&mut self, wb_handle: u64) -> Result<(), String> {
        let wb = self
            .workbooks
            .remove(&wb_handle)
            .ok_or_else(|| format!("Unknown workbook handle: {wb_handle}"))?;
        wb.invoke_method("Close", &[variant_bool(false)])?;
        Ok(())
    }

    /// Drop the Workbooks collection reference.
    pub fn release_workbooks(&mut self) {
        self.workbooks_collection = None;
    }

    /// Shut down: close remaining workbooks, release the collection, restore
    /// the interactive settings, and quit Excel.
    pub fn shutdown(mut self) -> Result<(), String> {
        let handles: Vec<u64> = self.workbooks.keys().copied().collect();
        for h in handles {
            let _ = self.close_workbook(h);
        }
        self.workbooks_collection = None;

        let _ = self
            .app
            .set_property("DisplayAlerts", variant_bool(self.saved.display_alerts));
        let _ = self
            .app
            .set_property("ScreenUpdating", variant_bool(self.saved.screen_updating));
        let _ = self.app.set_property(
            "AskToUpdateLinks",
            variant_bool(self.saved.ask_to_update_links),
        );

        self.app.invoke_method("Quit", &[])?;
        Ok(())
    }
}

fn read_bool_or(obj: &DispatchObject, name: &str, default: bool) -> bool {
    obj.get_property(name)
        .ok()
        .and_then(|v| variant_get_bool(&v))
        .unwrap_or(default)
}

fn read_i32(obj: &DispatchObject, name: &str) -> Result<i32, String> {
    let v = obj.get_property(name)?;
    variant_get_f64(&v)
        .map(|n| n as i32)
        .ok_or_else(|| format!("'{name}' is not numeric"))
}

fn read_string(obj: &DispatchObject, name: &str) -> Result<String, String> {
    let v = obj.get_property(name)?;
    variant_get_string(&v).ok_or_else(|| format!("'{name}' is not a string"))
}

fn sheet_info(ws: &DispatchObject) -> Result<RegionInfo, String> {
    let name = read_string(ws, "Name")?;
    let range = ws.get_child("UsedRange")?;
    range_info(&name, &range)
}

fn table_info(table: &DispatchObject) -> Result<RegionInfo, String> {
    let name = read_string(table, "Name")?;
    let range = table.get_child("Range")?;
    range_info(&name, &range)
}

fn range_info(name: &str, range: &DispatchObject) -> Result<RegionInfo, String> {
    Ok(RegionInfo {
        name: name.to_string(),
        row: read_i32(range, "Row")? as u32,
        column: read_i32(range, "Column")? as u32,
        rows: read_i32(&range.get_child("Rows")?, "Count")? as u32,
        columns: read_i32(&range.get_child("Columns")?, "Count")? as u32,
    })
}
