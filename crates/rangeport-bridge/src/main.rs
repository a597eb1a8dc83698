//! rangeport-bridge — a Windows process that drives Excel through late-bound
//! COM, controlled by JSON commands over stdin/stdout.
//!
//! Designed to be cross-compiled from Linux and run under WINE.
//!
//! Protocol: one JSON object per line (newline-delimited JSON).
//! - Reads `Request` objects from stdin
//! - Writes `Response` objects to stdout
//! - Diagnostic/log messages go to stderr (never stdout)

#[cfg(windows)]
mod app;
#[cfg(windows)]
mod dispatch;

#[cfg(not(windows))]
fn main() {
    eprintln!("rangeport-bridge must be compiled for Windows (--target x86_64-pc-windows-gnu)");
    eprintln!("and run under WINE on Linux.");
    std::process::exit(1);
}

#[cfg(windows)]
fn main() {
    use std::io::{self, BufRead, Write};

    use rangeport_protocol::*;

    // Use stderr for all diagnostic output so stdout stays clean for protocol
    eprintln!("[rangeport-bridge] Starting up...");

    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut out = stdout.lock();

    let mut host: Option<app::ExcelHost> = None;

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                eprintln!("[rangeport-bridge] stdin read error: {e}");
                break;
            }
        };

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let request: Request = match serde_json::from_str(line) {
            Ok(r) => r,
            Err(e) => {
                eprintln!("[rangeport-bridge] JSON parse error: {e}");
                eprintln!("[rangeport-bridge] Line was: {line}");
                // Send an error response with id=0 since we couldn't parse the request
                let resp = Response {
                    id: 0,
                    result: ResponseResult::Error {
                        message: format!("JSON parse error: {e}"),
                    },
                };
                let _ = writeln!(out, "{}", serde_json::to_string(&resp).unwrap());
                let _ = out.flush();
                continue;
            }
        };

        let response = handle_command(&mut host, &request);
        let json = serde_json::to_string(&response).unwrap();
        let _ = writeln!(out, "{json}");
        let _ = out.flush();

        // If it was a shutdown command and it succeeded, exit
        if matches!(request.command, Command::Shutdown) {
            if matches!(response.result, ResponseResult::Ok { .. }) {
                eprintln!("[rangeport-bridge] Shutdown complete, exiting.");
                break;
            }
        }
    }

    // If Excel is still running when stdin closes, try to clean up
    if let Some(excel) = host {
        eprintln!("[rangeport-bridge] stdin closed, shutting down Excel...");
        let _ = excel.shutdown();
    }

    eprintln!("[rangeport-bridge] Process exiting.");
}

#[cfg(windows)]
fn handle_command(
    host: &mut Option<app::ExcelHost>,
    request: &rangeport_protocol::Request,
) -> rangeport_protocol::Response {
    use rangeport_protocol::*;

    let id = request.id;

    let result = match &request.command {
        Command::Init => init_com_and_excel(host),
        Command::AcquireWorkbooks => with_host(host, |excel| {
            excel.acquire_workbooks()?;
            Ok(ResponseResult::Ok { data: None })
        }),
        Command::OpenWorkbook { path, read_only } => with_host(host, |excel| {
            let handle = excel.open_workbook(path, *read_only)?;
            Ok(ResponseResult::Ok {
                data: Some(ResponseData::WorkbookHandle { workbook: handle }),
            })
        }),
        Command::FindSheet { workbook, sheet } => with_host(host, |excel| {
            let region = excel.find_sheet(*workbook, sheet)?;
            Ok(ResponseResult::Ok {
                data: Some(ResponseData::Region { region }),
            })
        }),
        Command::FindTable { workbook, name } => with_host(host, |excel| {
            let region = excel.find_table(*workbook, name)?;
            Ok(ResponseResult::Ok {
                data: Some(ResponseData::Region { region }),
            })
        }),
        Command::RegionCount { workbook, kind } => with_host(host, |excel| {
            let count = excel.region_count(*workbook, *kind)?;
            Ok(ResponseResult::Ok {
                data: Some(ResponseData::Count { count }),
            })
        }),
        Command::RegionAt {
            workbook,
            kind,
            index,
        } => with_host(host, |excel| {
            let region = excel.region_at(*workbook, *kind, *index)?;
            Ok(ResponseResult::Ok {
                data: Some(ResponseData::Region { region }),
            })
        }),
        Command::SnapshotRegion {
            workbook,
            target,
            dest_path,
        } => with_host(host, |excel| {
            let info = excel.snapshot_region(*workbook, target, dest_path)?;
            Ok(ResponseResult::Ok {
                data: Some(ResponseData::Region { region: Some(info) }),
            })
        }),
        Command::CloseWorkbook { workbook } => with_host(host, |excel| {
            excel.close_workbook(*workbook)?;
            Ok(ResponseResult::Ok { data: None })
        }),
        Command::ReleaseWorkbooks => with_host(host, |excel| {
            excel.release_workbooks();
            Ok(ResponseResult::Ok { data: None })
        }),
        Command::Shutdown => match host.take() {
            Some(excel) => match excel.shutdown() {
                Ok(()) => {
                    uninit_com();
                    ResponseResult::Ok { data: None }
                }
                Err(e) => ResponseResult::Error {
                    message: format!("Shutdown failed: {e}"),
                },
            },
            None => ResponseResult::Ok { data: None },
        },
    };

    Response { id, result }
}

#[cfg(windows)]
fn init_com_and_excel(host: &mut Option<app::ExcelHost>) -> rangeport_protocol::ResponseResult {
    use rangeport_protocol::ResponseResult;
    use windows::Win32::System::Com::{CoInitializeEx, COINIT_APARTMENTTHREADED};

    if host.is_some() {
        return ResponseResult::Ok { data: None }; // Already initialized
    }

    // Initialize COM in Single-Threaded Apartment mode (required by Excel)
    unsafe {
        let hr = CoInitializeEx(None, COINIT_APARTMENTTHREADED);
        if let Err(e) = hr.ok() {
            return ResponseResult::Error {
                message: format!("CoInitializeEx failed: {e}"),
            };
        }
    }

    eprintln!("[rangeport-bridge] COM initialized (STA)");

    match app::ExcelHost::new() {
        Ok(excel) => {
            eprintln!("[rangeport-bridge] Excel.Application created successfully");
            *host = Some(excel);
            ResponseResult::Ok { data: None }
        }
        Err(e) => ResponseResult::Error {
            message: format!("Failed to create Excel.Application: {e}"),
        },
    }
}

#[cfg(windows)]
fn uninit_com() {
    unsafe {
        windows::Win32::System::Com::CoUninitialize();
    }
    eprintln!("[rangeport-bridge] COM uninitialized");
}

#[cfg(windows)]
fn with_host(
    host: &mut Option<app::ExcelHost>,
    f: impl FnOnce(&mut app::ExcelHost) -> Result<rangeport_protocol::ResponseResult, String>,
) -> rangeport_protocol::ResponseResult {
    match host.as_mut() {
        Some(excel) => match f(excel) {
            Ok(r) => r,
            Err(e) => rangeport_protocol::ResponseResult::Error { message: e },
        },
        None => rangeport_protocol::ResponseResult::Error {
            message: "Excel not initialized. Send 'Init' command first.".to_string(),
        },
    }
}
