//! Rangeport CLI - export worksheets and tables from live Excel workbooks

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;

use rangeport::{
    BridgeConfig, Exporter, NamePredicate, OutputFormat, ProcessTransport, Session,
};

#[derive(Parser)]
#[command(name = "rangeport")]
#[command(
    author,
    version,
    about = "Export named regions from Excel workbooks via a live automation session"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the rangeport-bridge.exe host executable
    /// (default: next to this binary, then the cross-compile target dir)
    #[arg(long, global = true)]
    bridge_exe: Option<PathBuf>,

    /// WINE executable used to run the host
    #[arg(long, global = true, default_value = "wine")]
    wine: PathBuf,

    /// WINEPREFIX for an isolated WINE environment
    #[arg(long, global = true)]
    wine_prefix: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Export selected regions, one output file per region
    Export {
        /// Primary workbook file (xlsx, xlsm, xls)
        source: PathBuf,

        /// Workbook to hold open read-only before the source, so its links
        /// survive (repeatable)
        #[arg(short, long = "reference")]
        references: Vec<PathBuf>,

        /// Output directory
        #[arg(short, long, default_value = ".")]
        out_dir: PathBuf,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = Format::Csv)]
        format: Format,

        /// zstd-compress the output (mpack only)
        #[arg(long)]
        compress: bool,

        /// Export the worksheet with this exact name (repeatable)
        #[arg(long = "sheet")]
        sheets: Vec<String>,

        /// Export the table with this exact name (repeatable)
        #[arg(long = "table")]
        tables: Vec<String>,

        /// Export every worksheet, optionally filtered by --regex
        #[arg(long)]
        all_sheets: bool,

        /// Export every table, optionally filtered by --regex
        #[arg(long)]
        all_tables: bool,

        /// Regular expression filter for --all-sheets / --all-tables
        #[arg(long)]
        regex: Option<String>,

        /// Export the regions the regex does NOT match
        #[arg(long, requires = "regex")]
        invert: bool,
    },

    /// List worksheet names in a workbook
    Sheets {
        /// Primary workbook file
        source: PathBuf,

        /// Reference workbook to hold open (repeatable)
        #[arg(short, long = "reference")]
        references: Vec<PathBuf>,
    },

    /// List table names in a workbook
    Tables {
        /// Primary workbook file
        source: PathBuf,

        /// Reference workbook to hold open (repeatable)
        #[arg(short, long = "reference")]
        references: Vec<PathBuf>,
    },
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Csv,
    Json,
    Mpack,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let bridge = BridgeConfig {
        bridge_exe_path: cli.bridge_exe,
        wine_path: cli.wine,
        wine_prefix: cli.wine_prefix,
        ..BridgeConfig::default()
    };

    match cli.command {
        Commands::Export {
            source,
            references,
            out_dir,
            format,
            compress,
            sheets,
            tables,
            all_sheets,
            all_tables,
            regex,
            invert,
        } => export(
            bridge,
            &source,
            &references,
            &out_dir,
            to_output_format(format, compress)?,
            &Selection {
                sheets,
                tables,
                all_sheets,
                all_tables,
                regex,
                invert,
            },
        ),
        Commands::Sheets { source, references } => {
            let (session, _lock) = open_session(bridge, &source, &references)?;
            for name in session.sheet_names()? {
                println!("{name}");
            }
            session.close()?;
            Ok(())
        }
        Commands::Tables { source, references } => {
            let (session, _lock) = open_session(bridge, &source, &references)?;
            for name in session.table_names()? {
                println!("{name}");
            }
            session.close()?;
            Ok(())
        }
    }
}

fn to_output_format(format: Format, compress: bool) -> Result<OutputFormat> {
    if compress && format != Format::Mpack {
        bail!("--compress only applies to --format mpack");
    }
    Ok(match format {
        Format::Csv => OutputFormat::Csv,
        Format::Json => OutputFormat::Json,
        Format::Mpack => OutputFormat::MessagePack { compress },
    })
}

struct Selection {
    sheets: Vec<String>,
    tables: Vec<String>,
    all_sheets: bool,
    all_tables: bool,
    regex: Option<String>,
    invert: bool,
}

fn export(
    bridge: BridgeConfig,
    source: &Path,
    references: &[PathBuf],
    out_dir: &Path,
    format: OutputFormat,
    selection: &Selection,
) -> Result<()> {
    if selection.sheets.is_empty()
        && selection.tables.is_empty()
        && !selection.all_sheets
        && !selection.all_tables
    {
        bail!("nothing selected: pass --sheet, --table, --all-sheets or --all-tables");
    }

    let predicate = selection
        .regex
        .as_deref()
        .map(|pattern| NamePredicate::new(pattern, true, selection.invert))
        .transpose()
        .context("invalid --regex")?;

    let started = Instant::now();
    let (session, _lock) = open_session(bridge, source, references)?;
    let exporter = Exporter::new(&session, format);

    let mut results = Vec::new();
    for name in &selection.sheets {
        let dest = out_dir.join(format!("{name}.{}", format.extension()));
        results.push(
            exporter
                .export_sheet(name, dest)
                .with_context(|| format!("failed to export sheet '{name}'"))?,
        );
    }
    for name in &selection.tables {
        let dest = out_dir.join(format!("{name}.{}", format.extension()));
        results.push(
            exporter
                .export_table(name, dest)
                .with_context(|| format!("failed to export table '{name}'"))?,
        );
    }
    if selection.all_sheets {
        results.extend(
            exporter
                .export_sheets(predicate.as_ref(), out_dir)
                .context("failed to export worksheets")?,
        );
    }
    if selection.all_tables {
        results.extend(
            exporter
                .export_tables(predicate.as_ref(), out_dir)
                .context("failed to export tables")?,
        );
    }

    for result in &results {
        println!(
            "{}\t{}\t{} records\t{}",
            result.name,
            result.address,
            result.records.len(),
            result.dest_path.display()
        );
        if !result.bad_rows.is_empty() {
            eprintln!(
                "Warning: {} malformed row(s) skipped in '{}'",
                result.bad_rows.len(),
                result.name
            );
        }
    }

    session.close().context("session release failed")?;
    info!(
        regions = results.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "export complete"
    );
    Ok(())
}

fn open_session(
    bridge: BridgeConfig,
    source: &Path,
    references: &[PathBuf],
) -> Result<(Session, LockGuard)> {
    let lock = LockGuard::acquire(source)?;
    let transport = ProcessTransport::spawn(bridge).context("failed to start automation host")?;
    let session = Session::open(transport, source, references)
        .with_context(|| format!("failed to open '{}'", source.display()))?;
    Ok((session, lock))
}

/// Advisory lock beside the source workbook. Excel itself tolerates two
/// automation sessions on one file badly, so only one rangeport run per
/// workbook is allowed at a time.
struct LockGuard {
    path: PathBuf,
}

impl LockGuard {
    fn acquire(source: &Path) -> Result<Self> {
        let canonical = source
            .canonicalize()
            .with_context(|| format!("cannot access '{}'", source.display()))?;
        let name = canonical
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("workbook");
        let path = canonical.with_file_name(format!(".{name}.rangeport-lock"));

        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
        {
            Ok(mut file) => {
                let _ = writeln!(file, "{}", std::process::id());
                Ok(Self { path })
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => bail!(
                "'{}' is in use by another rangeport run (remove '{}' if it is stale)",
                source.display(),
                path.display()
            ),
            Err(e) => {
                Err(e).with_context(|| format!("cannot create lock file '{}'", path.display()))
            }
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}
