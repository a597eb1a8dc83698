//! Scripted in-memory automation endpoint used by the e2e tests.

use std::collections::VecDeque;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use rangeport::Transport;
use rangeport_protocol::{
    Command, RegionInfo, RegionKind, RegionTarget, Request, Response, ResponseData,
    ResponseResult, SheetRef, VANISHED_PREFIX,
};

/// A table region: positioned grid inside a sheet, header row included.
#[derive(Debug, Clone)]
pub struct FakeTable {
    pub name: String,
    pub row: u32,
    pub column: u32,
    pub cells: Vec<Vec<String>>,
}

/// A worksheet: used-range grid anchored at A1, plus declared tables.
#[derive(Debug, Clone, Default)]
pub struct FakeSheet {
    pub name: String,
    pub cells: Vec<Vec<String>>,
    pub tables: Vec<FakeTable>,
}

impl FakeSheet {
    pub fn new(name: &str, cells: &[&[&str]]) -> Self {
        Self {
            name: name.to_string(),
            cells: grid(cells),
            tables: Vec::new(),
        }
    }

    pub fn with_table(mut self, name: &str, row: u32, column: u32, cells: &[&[&str]]) -> Self {
        self.tables.push(FakeTable {
            name: name.to_string(),
            row,
            column,
            cells: grid(cells),
        });
        self
    }
}

fn grid(cells: &[&[&str]]) -> Vec<Vec<String>> {
    cells
        .iter()
        .map(|row| row.iter().map(|c| c.to_string()).collect())
        .collect()
}

/// The in-memory workbook every opened path resolves to.
#[derive(Debug, Clone, Default)]
pub struct FakeBook {
    pub sheets: Vec<FakeSheet>,
}

/// An in-process [`Transport`] that implements the host side of the protocol.
///
/// Handles one command per line, appends each handled command to a shared
/// log (prefixed with `fail:` when scripted to fail), and writes real
/// UTF-16LE snapshot files for `SnapshotRegion`.
pub struct FakeEndpoint {
    book: FakeBook,
    log: Arc<Mutex<Vec<String>>>,
    /// 1-based ordinal of the command that should fail, if any.
    fail_at: Option<u64>,
    /// Region names that resolve during lookup but are gone by snapshot time.
    vanished: Vec<String>,
    handled: u64,
    open_handles: Vec<u64>,
    next_handle: u64,
    responses: VecDeque<String>,
}

impl FakeEndpoint {
    pub fn new(book: FakeBook) -> Self {
        Self {
            book,
            log: Arc::new(Mutex::new(Vec::new())),
            fail_at: None,
            vanished: Vec::new(),
            handled: 0,
            open_handles: Vec::new(),
            next_handle: 1,
            responses: VecDeque::new(),
        }
    }

    /// Fail the `ordinal`-th command (1-based) with a host error.
    pub fn fail_command(mut self, ordinal: u64) -> Self {
        self.fail_at = Some(ordinal);
        self
    }

    /// Make `name` resolve during lookup but vanish at snapshot time.
    pub fn vanish_at_snapshot(mut self, name: &str) -> Self {
        self.vanished.push(name.to_string());
        self
    }

    /// Shared view of the handled-command log.
    pub fn log(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.log)
    }

    fn handle(&mut self, request: Request) -> Response {
        self.handled += 1;
        let label = command_label(&request.command);

        if self.fail_at == Some(self.handled) {
            self.log.lock().unwrap().push(format!("fail:{label}"));
            return Response {
                id: request.id,
                result: ResponseResult::Error {
                    message: format!("scripted failure at {label}"),
                },
            };
        }
        self.log.lock().unwrap().push(label);

        let result = match request.command {
            Command::Init | Command::AcquireWorkbooks | Command::ReleaseWorkbooks
            | Command::Shutdown => ResponseResult::Ok { data: None },
            Command::OpenWorkbook { .. } => {
                let handle = self.next_handle;
                self.next_handle += 1;
                self.open_handles.push(handle);
                ResponseResult::Ok {
                    data: Some(ResponseData::WorkbookHandle { workbook: handle }),
                }
            }
            Command::CloseWorkbook { workbook } => {
                self.open_handles.retain(|&h| h != workbook);
                ResponseResult::Ok { data: None }
            }
            Command::FindSheet { sheet, .. } => ResponseResult::Ok {
                data: Some(ResponseData::Region {
                    region: self.find_sheet(&sheet),
                }),
            },
            Command::FindTable { name, .. } => ResponseResult::Ok {
                data: Some(ResponseData::Region {
                    region: self.find_table(&name),
                }),
            },
            Command::RegionCount { kind, .. } => ResponseResult::Ok {
                data: Some(ResponseData::Count {
                    count: self.region_count(kind),
                }),
            },
            Command::RegionAt { kind, index, .. } => ResponseResult::Ok {
                data: Some(ResponseData::Region {
                    region: self.region_at(kind, index),
                }),
            },
            Command::SnapshotRegion { target, dest_path, .. } => {
                match self.snapshot(&target, &dest_path) {
                    Ok(info) => ResponseResult::Ok {
                        data: Some(ResponseData::Region { region: Some(info) }),
                    },
                    Err(message) => ResponseResult::Error { message },
                }
            }
        };

        Response {
            id: request.id,
            result,
        }
    }

    fn sheet_info(sheet: &FakeSheet) -> RegionInfo {
        RegionInfo {
            name: sheet.name.clone(),
            row: 1,
            column: 1,
            rows: sheet.cells.len().max(1) as u32,
            columns: sheet
                .cells
                .iter()
                .map(|r| r.len())
                .max()
                .unwrap_or(1)
                .max(1) as u32,
        }
    }

    fn table_info(table: &FakeTable) -> RegionInfo {
        RegionInfo {
            name: table.name.clone(),
            row: table.row,
            column: table.column,
            rows: table.cells.len().max(1) as u32,
            columns: table
                .cells
                .iter()
                .map(|r| r.len())
                .max()
                .unwrap_or(1)
                .max(1) as u32,
        }
    }

    fn find_sheet(&self, sheet: &SheetRef) -> Option<RegionInfo> {
        match sheet {
            SheetRef::Name(name) => self
                .book
                .sheets
                .iter()
                .find(|s| &s.name == name)
                .map(Self::sheet_info),
            SheetRef::Index(index) => {
                if *index < 1 {
                    return None;
                }
                self.book
                    .sheets
                    .get(*index as usize - 1)
                    .map(Self::sheet_info)
            }
        }
    }

    fn find_table(&self, name: &str) -> Option<RegionInfo> {
        self.book
            .sheets
            .iter()
            .flat_map(|s| s.tables.iter())
            .find(|t| t.name == name)
            .map(Self::table_info)
    }

    fn region_count(&self, kind: RegionKind) -> u32 {
        match kind {
            RegionKind::Sheet => self.book.sheets.len() as u32,
            RegionKind::Table => self
                .book
                .sheets
                .iter()
                .map(|s| s.tables.len())
                .sum::<usize>() as u32,
        }
    }

    fn region_at(&self, kind: RegionKind, index: u32) -> Option<RegionInfo> {
        if index < 1 {
            return None;
        }
        match kind {
            RegionKind::Sheet => self
                .book
                .sheets
                .get(index as usize - 1)
                .map(Self::sheet_info),
            RegionKind::Table => self
                .book
                .sheets
                .iter()
                .flat_map(|s| s.tables.iter())
                .nth(index as usize - 1)
                .map(Self::table_info),
        }
    }

    fn snapshot(&self, target: &RegionTarget, dest_path: &str) -> Result<RegionInfo, String> {
        let target_name = match target {
            RegionTarget::Sheet { name } | RegionTarget::Table { name } => name,
        };
        if self.vanished.iter().any(|n| n == target_name) {
            return Err(format!("{VANISHED_PREFIX}{target_name}"));
        }

        let (info, cells) = match target {
            RegionTarget::Sheet { name } => {
                let sheet = self
                    .book
                    .sheets
                    .iter()
                    .find(|s| &s.name == name)
                    .ok_or_else(|| format!("{VANISHED_PREFIX}{name}"))?;
                (Self::sheet_info(sheet), &sheet.cells)
            }
            RegionTarget::Table { name } => {
                let table = self
                    .book
                    .sheets
                    .iter()
                    .flat_map(|s| s.tables.iter())
                    .find(|t| &t.name == name)
                    .ok_or_else(|| format!("{VANISHED_PREFIX}{name}"))?;
                (Self::table_info(table), &table.cells)
            }
        };

        let text: String = cells
            .iter()
            .map(|row| row.join("\t"))
            .collect::<Vec<_>>()
            .join("\r\n");

        let mut bytes = vec![0xFF, 0xFE];
        for unit in text.encode_utf16() {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }

        std::fs::write(wine_to_linux(dest_path), bytes).map_err(|e| e.to_string())?;
        Ok(info)
    }
}

impl Transport for FakeEndpoint {
    fn send_line(&mut self, line: &str) -> io::Result<()> {
        let request: Request = serde_json::from_str(line)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let response = self.handle(request);
        self.responses
            .push_back(serde_json::to_string(&response).unwrap());
        Ok(())
    }

    fn recv_line(&mut self) -> io::Result<Option<String>> {
        Ok(self.responses.pop_front())
    }
}

fn command_label(command: &Command) -> String {
    match command {
        Command::Init => "Init".to_string(),
        Command::AcquireWorkbooks => "AcquireWorkbooks".to_string(),
        Command::OpenWorkbook { path, .. } => {
            let file = path.rsplit('\\').next().unwrap_or(path);
            format!("OpenWorkbook:{file}")
        }
        Command::FindSheet { .. } => "FindSheet".to_string(),
        Command::FindTable { .. } => "FindTable".to_string(),
        Command::RegionCount { .. } => "RegionCount".to_string(),
        Command::RegionAt { .. } => "RegionAt".to_string(),
        Command::SnapshotRegion { .. } => "SnapshotRegion".to_string(),
        Command::CloseWorkbook { workbook } => format!("CloseWorkbook:{workbook}"),
        Command::ReleaseWorkbooks => "ReleaseWorkbooks".to_string(),
        Command::Shutdown => "Shutdown".to_string(),
    }
}

/// Undo [`rangeport::linux_to_wine_path`] so snapshots land on the real
/// filesystem during tests.
fn wine_to_linux(path: &str) -> PathBuf {
    let stripped = path.strip_prefix("Z:").unwrap_or(path);
    PathBuf::from(stripped.replace('\\', "/"))
}

/// A two-sheet book matching the end-to-end fixtures: "List" and "Ref",
/// with one table on each.
pub fn sample_book() -> FakeBook {
    FakeBook {
        sheets: vec![
            FakeSheet::new(
                "List",
                &[
                    &["Id", "Name"],
                    &["1", "Alice"],
                    &["2", "Bob"],
                ],
            )
            .with_table(
                "ListTable",
                2,
                4,
                &[&["Key", "Value"], &["a", "1"]],
            ),
            FakeSheet::new(
                "Ref",
                &[
                    &["Code", "Label"],
                    &["X", "Left"],
                ],
            )
            .with_table("RefTable", 1, 1, &[&["K"], &["v"]]),
        ],
    }
}

/// A source workbook file on disk (contents irrelevant; only existence is
/// validated client-side).
pub fn touch_workbook(dir: &std::path::Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, b"stub workbook").unwrap();
    path
}
