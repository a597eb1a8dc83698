//! Export named Excel regions — worksheets and tables — into portable record
//! files by automating a real Excel instance.
//!
//! The heavy lifting happens in a separate Windows host process
//! (`rangeport-bridge`, run under WINE) that drives Excel through late-bound
//! COM. This crate owns the other half of that contract:
//!
//! - [`Session`] opens the application, the workbooks collection, any
//!   reference workbooks, and the primary workbook, and guarantees release in
//!   exact reverse acquisition order on every exit path;
//! - region lookup and enumeration resolve named worksheets and tables to
//!   transient handles with spreadsheet-style addresses ("A1:C10");
//! - [`Exporter`] routes each region through an ephemeral tab-delimited
//!   UTF-16 snapshot (avoiding Excel's single-document save lock), parses it
//!   into ordered header→value records while collecting malformed rows, and
//!   encodes the records as CSV, pretty JSON, or MessagePack.
//!
//! # Example
//!
//! ```rust,no_run
//! use rangeport::{BridgeConfig, Exporter, NamePredicate, OutputFormat, ProcessTransport, Session};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let transport = ProcessTransport::spawn(BridgeConfig::default())?;
//!     let session = Session::open(transport, "data/master.xlsx", &[])?;
//!
//!     let exporter = Exporter::new(&session, OutputFormat::Csv);
//!     let result = exporter.export_sheet("List", "out/list.csv")?;
//!     println!("{} ({}) -> {} records", result.name, result.address, result.records.len());
//!
//!     let matching = NamePredicate::new("^Li.*", true, false)?;
//!     for r in exporter.export_sheets(Some(&matching), "out")? {
//!         println!("{} -> {}", r.name, r.dest_path.display());
//!     }
//!
//!     session.close()?;
//!     Ok(())
//! }
//! ```

mod address;
mod client;
mod encode;
mod error;
mod export;
mod parse;
mod predicate;
mod record;
mod region;
mod session;
mod transport;

pub use address::{column_letters, range_address};
pub use client::{AutomationClient, ClientError};
pub use encode::OutputFormat;
pub use error::{Error, Result};
pub use export::{ExportResult, Exporter};
pub use parse::parse_snapshot;
pub use predicate::NamePredicate;
pub use record::{BadRow, ExportRecord};
pub use region::{RangeDescriptor, Rect, RegionHandle};
pub use session::{RegionIter, Session};
pub use transport::{linux_to_wine_path, BridgeConfig, ProcessTransport, Transport};

pub use rangeport_protocol::RegionKind;
