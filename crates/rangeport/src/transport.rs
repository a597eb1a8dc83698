//! Line-oriented transport to the automation host process.
//!
//! The production transport spawns the Windows `rangeport-bridge.exe` under
//! WINE with piped stdio. The [`Transport`] trait is the seam the session
//! tests use to script an in-memory endpoint instead.

use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Stdio};
use std::time::Duration;

/// One blocking JSON-line exchange channel to the automation host.
pub trait Transport: Send {
    /// Send one line (without trailing newline) and flush.
    fn send_line(&mut self, line: &str) -> io::Result<()>;

    /// Receive one line, stripped of the trailing newline.
    /// Returns `None` when the peer has closed the channel.
    fn recv_line(&mut self) -> io::Result<Option<String>>;

    /// Block until the peer has fully shut down.
    ///
    /// For a process transport this waits for the host to exit, which is what
    /// forces any pending native finalization to complete before the session
    /// close returns.
    fn wait_closed(&mut self) {}
}

/// Configuration for spawning the automation host.
pub struct BridgeConfig {
    /// Path to the `rangeport-bridge.exe` Windows executable.
    /// If None, searches in common locations relative to the current binary.
    pub bridge_exe_path: Option<PathBuf>,

    /// Path to the WINE executable. Defaults to "wine".
    pub wine_path: PathBuf,

    /// Optional WINEPREFIX to use (for isolating the WINE environment).
    pub wine_prefix: Option<PathBuf>,

    /// Timeout for waiting for host responses.
    pub timeout: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            bridge_exe_path: None,
            wine_path: PathBuf::from("wine"),
            wine_prefix: None,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Transport backed by a spawned `wine rangeport-bridge.exe` process.
pub struct ProcessTransport {
    child: Child,
    stdin: std::process::ChildStdin,
    stdout: BufReader<std::process::ChildStdout>,
}

impl ProcessTransport {
    /// Spawn the host process with piped stdio.
    ///
    /// Host diagnostics go to our stderr; stdout carries only protocol lines.
    pub fn spawn(config: BridgeConfig) -> io::Result<Self> {
        let exe_path = config.bridge_exe_path.unwrap_or_else(find_bridge_exe);

        if !exe_path.exists() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("bridge executable not found at: {}", exe_path.display()),
            ));
        }

        let mut cmd = std::process::Command::new(&config.wine_path);

        if let Some(prefix) = &config.wine_prefix {
            cmd.env("WINEPREFIX", prefix);
        }

        cmd.arg(&exe_path);
        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::inherit());

        let mut child = cmd.spawn().map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("WINE not found at '{}'", config.wine_path.display()),
                )
            } else {
                e
            }
        })?;

        let stdin = child.stdin.take().expect("stdin was piped");
        let stdout = child.stdout.take().expect("stdout was piped");

        Ok(Self {
            child,
            stdin,
            stdout: BufReader::new(stdout),
        })
    }
}

impl Transport for ProcessTransport {
    fn send_line(&mut self, line: &str) -> io::Result<()> {
        writeln!(self.stdin, "{line}")?;
        self.stdin.flush()
    }

    fn recv_line(&mut self) -> io::Result<Option<String>> {
        let mut line = String::new();
        let n = self.stdout.read_line(&mut line)?;
        if n == 0 {
            return Ok(None);
        }
        while line.ends_with('\n') || line.ends_with('\r') {
            line.pop();
        }
        Ok(Some(line))
    }

    fn wait_closed(&mut self) {
        let _ = self.child.wait();
    }
}

impl Drop for ProcessTransport {
    fn drop(&mut self) {
        // Closing stdin unblocks the host's read loop; it cleans up Excel and
        // exits on its own if it never saw a Shutdown command.
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Convert a Linux filesystem path to a WINE (Windows) path.
///
/// WINE maps `/` to `Z:\`, so `/home/user/file.xlsx` becomes
/// `Z:\home\user\file.xlsx`.
pub fn linux_to_wine_path(linux_path: &Path) -> String {
    let abs = if linux_path.is_absolute() {
        linux_path.to_path_buf()
    } else {
        std::env::current_dir().unwrap_or_default().join(linux_path)
    };

    format!("Z:{}", abs.display()).replace('/', "\\")
}

/// Attempt to locate the host exe relative to the current executable or in
/// common development paths.
fn find_bridge_exe() -> PathBuf {
    if let Ok(mut exe) = std::env::current_exe() {
        exe.pop();
        let candidate = exe.join("rangeport-bridge.exe");
        if candidate.exists() {
            return candidate;
        }
    }

    for profile in ["release", "debug"] {
        let candidate = PathBuf::from(format!(
            "target/x86_64-pc-windows-gnu/{profile}/rangeport-bridge.exe"
        ));
        if candidate.exists() {
            return candidate;
        }
    }

    PathBuf::from("rangeport-bridge.exe")
}
