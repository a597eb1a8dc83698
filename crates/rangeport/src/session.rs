//! The resource session: ownership tree of native automation handles.
//!
//! A [`Session`] owns, in acquisition order: the application instance, its
//! workbooks collection, zero or more reference workbooks, and the primary
//! workbook. Release is the exact reverse of that order, on every exit path,
//! including partial acquisition failure — the host keeps the live COM
//! pointers, but it only ever acts on the commands this type issues, so the
//! ordering is decided (and observable) here.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{debug, warn};

use rangeport_protocol::{RegionKind, SheetRef};

use crate::client::{AutomationClient, ClientError};
use crate::error::{Error, Result};
use crate::predicate::NamePredicate;
use crate::region::{RangeDescriptor, RegionHandle};
use crate::transport::{linux_to_wine_path, Transport};

#[derive(Default)]
struct Handles {
    app_started: bool,
    collection_acquired: bool,
    /// Reference workbook handles in open order.
    references: Vec<u64>,
    primary: Option<u64>,
    closed: bool,
}

/// An open automation session against one primary workbook.
///
/// While a session is open the automated application is not usable
/// interactively; treat one session as exclusive use of the automation
/// endpoint for its lifetime. All operations are synchronous and serialized
/// through the session.
pub struct Session {
    client: AutomationClient,
    handles: Mutex<Handles>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session").finish_non_exhaustive()
    }
}

impl Session {
    /// Start the application and open `source` plus any `references`.
    ///
    /// Both paths are validated before any native handle is acquired.
    /// References are de-duplicated by canonical path and opened read-only
    /// *before* the primary workbook: a reference that is already open stops
    /// the application from rewriting broken cross-file links in the primary
    /// to `#REF!` while opening it.
    pub fn open(
        transport: impl Transport + 'static,
        source: impl AsRef<Path>,
        references: &[PathBuf],
    ) -> Result<Self> {
        let source = source.as_ref();
        if !source.is_file() {
            return Err(Error::SourceNotFound(source.to_path_buf()));
        }

        let mut reference_paths: Vec<PathBuf> = Vec::new();
        for reference in references {
            let canonical = reference
                .canonicalize()
                .map_err(|_| Error::ReferenceNotFound(reference.clone()))?;
            if !canonical.is_file() {
                return Err(Error::ReferenceNotFound(reference.clone()));
            }
            if !reference_paths.contains(&canonical) {
                reference_paths.push(canonical);
            }
        }

        let session = Self {
            client: AutomationClient::new(transport),
            handles: Mutex::new(Handles::default()),
        };

        if let Err(e) = session.acquire(source, &reference_paths) {
            // Unwind whatever was acquired before propagating.
            session.release_all();
            return Err(Error::ApplicationOpenFailed(e));
        }

        Ok(session)
    }

    fn acquire(&self, source: &Path, references: &[PathBuf]) -> std::result::Result<(), ClientError> {
        debug!(source = %source.display(), references = references.len(), "opening session");

        self.client.init()?;
        self.handles.lock().unwrap().app_started = true;

        self.client.acquire_workbooks()?;
        self.handles.lock().unwrap().collection_acquired = true;

        for reference in references {
            let handle = self
                .client
                .open_workbook(&linux_to_wine_path(reference), true)?;
            debug!(path = %reference.display(), handle, "opened reference workbook");
            self.handles.lock().unwrap().references.push(handle);
        }

        let primary = self.client.open_workbook(&linux_to_wine_path(source), true)?;
        debug!(path = %source.display(), handle = primary, "opened primary workbook");
        self.handles.lock().unwrap().primary = Some(primary);

        Ok(())
    }

    /// Release everything in reverse acquisition order.
    ///
    /// Idempotent: safe after partial construction and safe to call again
    /// after it has already run. Returns the first release error, after
    /// attempting every remaining release regardless.
    pub fn close(&self) -> Result<()> {
        self.release_all().map_err(Error::Client)
    }

    fn release_all(&self) -> std::result::Result<(), ClientError> {
        let mut handles = self.handles.lock().unwrap();
        if handles.closed {
            return Ok(());
        }
        handles.closed = true;

        let mut first_error: Option<ClientError> = None;
        let mut note = |result: std::result::Result<(), ClientError>| {
            if let Err(e) = result {
                warn!(error = %e, "release step failed");
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        };

        if let Some(primary) = handles.primary.take() {
            note(self.client.close_workbook(primary));
        }
        while let Some(reference) = handles.references.pop() {
            note(self.client.close_workbook(reference));
        }
        if std::mem::take(&mut handles.collection_acquired) {
            note(self.client.release_workbooks());
        }
        if std::mem::take(&mut handles.app_started) {
            // The host restores the interactive/alert settings before Quit;
            // waiting for it to exit forces pending native finalization.
            note(self.client.shutdown());
            self.client.wait_closed();
        }

        match first_error {
            None => Ok(()),
            Some(e) => Err(e),
        }
    }

    fn primary(&self) -> Result<u64> {
        let handles = self.handles.lock().unwrap();
        if handles.closed {
            return Err(Error::Client(ClientError::NotRunning));
        }
        handles.primary.ok_or(Error::Client(ClientError::NotRunning))
    }

    // -- Region lookup --

    /// Find a worksheet by exact, case-sensitive name. `None` when absent.
    pub fn find_sheet(&self, name: &str) -> Result<Option<RegionHandle>> {
        let info = self
            .client
            .find_sheet(self.primary()?, SheetRef::Name(name.to_string()))?;
        Ok(info.map(|i| RegionHandle::from_info(RegionKind::Sheet, i)))
    }

    /// Find a worksheet by 1-based index. `None` when out of range.
    pub fn find_sheet_at(&self, index: u32) -> Result<Option<RegionHandle>> {
        let info = self.client.find_sheet(self.primary()?, SheetRef::Index(index))?;
        Ok(info.map(|i| RegionHandle::from_info(RegionKind::Sheet, i)))
    }

    /// Find a table by exact name, scanning worksheets in workbook order and
    /// each sheet's tables in declaration order. `None` when absent.
    pub fn find_table(&self, name: &str) -> Result<Option<RegionHandle>> {
        let info = self.client.find_table(self.primary()?, name)?;
        Ok(info.map(|i| RegionHandle::from_info(RegionKind::Table, i)))
    }

    /// Enumerate worksheets in workbook order.
    ///
    /// The iterator borrows the session (it cannot outlive it) and makes one
    /// host round trip per step, resolving each sheet's name and rectangle
    /// eagerly whether or not the predicate filters it out. Re-calling
    /// `sheets` re-walks the workbook from scratch.
    pub fn sheets<'s>(&'s self, predicate: Option<&'s NamePredicate>) -> Result<RegionIter<'s>> {
        self.regions(RegionKind::Sheet, predicate)
    }

    /// Enumerate tables: worksheets in workbook order, then each sheet's
    /// tables in declaration order. Same semantics as [`Session::sheets`].
    pub fn tables<'s>(&'s self, predicate: Option<&'s NamePredicate>) -> Result<RegionIter<'s>> {
        self.regions(RegionKind::Table, predicate)
    }

    fn regions<'s>(
        &'s self,
        kind: RegionKind,
        predicate: Option<&'s NamePredicate>,
    ) -> Result<RegionIter<'s>> {
        let count = self.client.region_count(self.primary()?, kind)?;
        Ok(RegionIter {
            session: self,
            kind,
            predicate,
            count,
            next_index: 1,
        })
    }

    /// All worksheet names, in workbook order.
    pub fn sheet_names(&self) -> Result<Vec<String>> {
        self.sheets(None)?
            .map(|r| r.map(|h| h.name().to_string()))
            .collect()
    }

    /// All table names, in workbook order then declaration order.
    pub fn table_names(&self) -> Result<Vec<String>> {
        self.tables(None)?
            .map(|r| r.map(|h| h.name().to_string()))
            .collect()
    }

    // -- Snapshot export --

    /// Materialize a region's values as a tab-delimited Unicode text file.
    ///
    /// The host copies the region's values and number formats into a
    /// brand-new ephemeral workbook and saves *that* as Unicode text, so the
    /// primary workbook is never saved and never locks `dest`. Returns the
    /// name and address of the original region.
    pub fn snapshot_region(&self, region: &RegionHandle, dest: &Path) -> Result<RangeDescriptor> {
        let primary = self.primary()?;

        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::WriteFailed {
                path: dest.to_path_buf(),
                source: e,
            })?;
        }

        let info = self
            .client
            .snapshot_region(primary, region.target(), &linux_to_wine_path(dest))
            .map_err(|e| {
                if e.is_vanished() {
                    Error::RegionVanished(region.name().to_string())
                } else {
                    Error::Client(e)
                }
            })?;

        debug!(region = info.name, dest = %dest.display(), "snapshot written");
        Ok(RegionHandle::from_info(region.kind(), info).descriptor())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Err(e) = self.release_all() {
            warn!(error = %e, "session release during drop failed");
        }
    }
}

/// One enumeration pass over a workbook's regions of one kind.
///
/// Single-pass and finite; restart by asking the session for a new iterator.
pub struct RegionIter<'s> {
    session: &'s Session,
    kind: RegionKind,
    predicate: Option<&'s NamePredicate>,
    count: u32,
    next_index: u32,
}

impl Iterator for RegionIter<'_> {
    type Item = Result<RegionHandle>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.next_index <= self.count {
            let index = self.next_index;
            self.next_index += 1;

            let primary = match self.session.primary() {
                Ok(h) => h,
                Err(e) => return Some(Err(e)),
            };
            let info = match self.session.client.region_at(primary, self.kind, index) {
                Ok(Some(info)) => info,
                // A slot that no longer resolves is skipped, same as a
                // name-predicate miss.
                Ok(None) => continue,
                Err(e) => return Some(Err(Error::Client(e))),
            };

            if let Some(predicate) = self.predicate {
                if !predicate.matches(&info.name) {
                    continue;
                }
            }
            return Some(Ok(RegionHandle::from_info(self.kind, info)));
        }
        None
    }
}
