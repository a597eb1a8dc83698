//! Typed command client over a [`Transport`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use rangeport_protocol::{
    Command, RegionInfo, RegionKind, RegionTarget, Request, Response, ResponseData, ResponseResult,
    SheetRef, VANISHED_PREFIX,
};

use crate::transport::Transport;

/// Errors from talking to the automation host.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Failed to send command to host: {0}")]
    SendFailed(String),

    #[error("Failed to read response from host: {0}")]
    ReadFailed(String),

    #[error("Host process not running")]
    NotRunning,

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Host returned error: {0}")]
    Host(String),

    #[error("Response id {got} does not match request id {expected}")]
    IdMismatch { expected: u64, got: u64 },

    #[error("Unexpected response data")]
    UnexpectedResponse,
}

impl ClientError {
    /// Whether this is a host-side report that a snapshot target no longer
    /// resolves (stale enumeration, concurrent structural edit).
    pub fn is_vanished(&self) -> bool {
        matches!(self, ClientError::Host(msg) if msg.starts_with(VANISHED_PREFIX))
    }
}

/// The client half of the automation protocol: serializes commands onto the
/// transport one at a time and decodes the matching responses.
///
/// All methods take `&self`; the transport lock serializes command traffic,
/// which is also what makes one session exclusive use of the endpoint.
pub struct AutomationClient {
    transport: Mutex<Box<dyn Transport>>,
    next_id: AtomicU64,
}

impl AutomationClient {
    pub fn new(transport: impl Transport + 'static) -> Self {
        Self {
            transport: Mutex::new(Box::new(transport)),
            next_id: AtomicU64::new(1),
        }
    }

    /// Send a command and wait for its response.
    pub(crate) fn send_command(
        &self,
        command: Command,
    ) -> Result<Option<ResponseData>, ClientError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = Request { id, command };
        let json = serde_json::to_string(&request)?;

        let mut transport = self.transport.lock().unwrap();
        transport
            .send_line(&json)
            .map_err(|e| ClientError::SendFailed(e.to_string()))?;

        let line = transport
            .recv_line()
            .map_err(|e| ClientError::ReadFailed(e.to_string()))?
            .ok_or(ClientError::NotRunning)?;

        let response: Response = serde_json::from_str(&line)?;
        if response.id != id {
            return Err(ClientError::IdMismatch {
                expected: id,
                got: response.id,
            });
        }

        match response.result {
            ResponseResult::Ok { data } => Ok(data),
            ResponseResult::Error { message } => Err(ClientError::Host(message)),
        }
    }

    /// Block until the host has fully exited (used after `Shutdown`).
    pub(crate) fn wait_closed(&self) {
        self.transport.lock().unwrap().wait_closed();
    }

    // -- Typed wrappers, one per protocol command --

    pub(crate) fn init(&self) -> Result<(), ClientError> {
        self.send_command(Command::Init).map(|_| ())
    }

    pub(crate) fn acquire_workbooks(&self) -> Result<(), ClientError> {
        self.send_command(Command::AcquireWorkbooks).map(|_| ())
    }

    pub(crate) fn open_workbook(&self, path: &str, read_only: bool) -> Result<u64, ClientError> {
        match self.send_command(Command::OpenWorkbook {
            path: path.to_string(),
            read_only,
        })? {
            Some(ResponseData::WorkbookHandle { workbook }) => Ok(workbook),
            _ => Err(ClientError::UnexpectedResponse),
        }
    }

    pub(crate) fn find_sheet(
        &self,
        workbook: u64,
        sheet: SheetRef,
    ) -> Result<Option<RegionInfo>, ClientError> {
        match self.send_command(Command::FindSheet { workbook, sheet })? {
            Some(ResponseData::Region { region }) => Ok(region),
            _ => Err(ClientError::UnexpectedResponse),
        }
    }

    pub(crate) fn find_table(
        &self,
        workbook: u64,
        name: &str,
    ) -> Result<Option<RegionInfo>, ClientError> {
        match self.send_command(Command::FindTable {
            workbook,
            name: name.to_string(),
        })? {
            Some(ResponseData::Region { region }) => Ok(region),
            _ => Err(ClientError::UnexpectedResponse),
        }
    }

    pub(crate) fn region_count(
        &self,
        workbook: u64,
        kind: RegionKind,
    ) -> Result<u32, ClientError> {
        match self.send_command(Command::RegionCount { workbook, kind })? {
            Some(ResponseData::Count { count }) => Ok(count),
            _ => Err(ClientError::UnexpectedResponse),
        }
    }

    pub(crate) fn region_at(
        &self,
        workbook: u64,
        kind: RegionKind,
        index: u32,
    ) -> Result<Option<RegionInfo>, ClientError> {
        match self.send_command(Command::RegionAt {
            workbook,
            kind,
            index,
        })? {
            Some(ResponseData::Region { region }) => Ok(region),
            _ => Err(ClientError::UnexpectedResponse),
        }
    }

    pub(crate) fn snapshot_region(
        &self,
        workbook: u64,
        target: RegionTarget,
        dest_path: &str,
    ) -> Result<RegionInfo, ClientError> {
        match self.send_command(Command::SnapshotRegion {
            workbook,
            target,
            dest_path: dest_path.to_string(),
        })? {
            Some(ResponseData::Region {
                region: Some(region),
            }) => Ok(region),
            _ => Err(ClientError::UnexpectedResponse),
        }
    }

    pub(crate) fn close_workbook(&self, workbook: u64) -> Result<(), ClientError> {
        self.send_command(Command::CloseWorkbook { workbook })
            .map(|_| ())
    }

    pub(crate) fn release_workbooks(&self) -> Result<(), ClientError> {
        self.send_command(Command::ReleaseWorkbooks).map(|_| ())
    }

    pub(crate) fn shutdown(&self) -> Result<(), ClientError> {
        self.send_command(Command::Shutdown).map(|_| ())
    }
}
