//! Log line sources.
//!
//! Lines are pulled one at a time so a live `dmesg` stream never has to be
//! buffered as a whole.

use anyhow::{Context, Result, bail};
use std::fs::{self, File};
use std::io::{BufRead, BufReader, Cursor};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};
use tracing::debug;

/// Default location of the driver's debug level parameter.
pub const MM_DEBUG_PARAM: &str = "/sys/module/pscnv/parameters/mm_debug";

/// Sequential supplier of log lines.
pub trait LineSource {
    /// Human readable name used in diagnostics.
    fn name(&self) -> &str;

    /// Returns the next line without its terminator, or `None` at the end.
    fn next_line(&mut self) -> Result<Option<String>>;

    /// Releases the source once every line has been consumed.
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Line source over any buffered reader.
#[derive(Debug)]
pub struct ReaderSource<R> {
    name: String,
    reader: R,
    buf: Vec<u8>,
}

impl<R: BufRead> ReaderSource<R> {
    pub fn new(name: impl Into<String>, reader: R) -> Self {
        Self {
            name: name.into(),
            reader,
            buf: Vec::new(),
        }
    }
}

impl ReaderSource<BufReader<File>> {
    /// Opens a saved copy of the kernel log.
    pub fn open(path: &Path) -> Result<Self> {
        let file =
            File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
        Ok(Self::new(path.display().to_string(), BufReader::new(file)))
    }
}

impl ReaderSource<Cursor<String>> {
    /// Line source over an in-memory log.
    pub fn from_text(text: impl Into<String>) -> Self {
        Self::new("<memory>", Cursor::new(text.into()))
    }
}

impl<R: BufRead> LineSource for ReaderSource<R> {
    fn name(&self) -> &str {
        &self.name
    }

    fn next_line(&mut self) -> Result<Option<String>> {
        self.buf.clear();
        let read = self
            .reader
            .read_until(b'\n', &mut self.buf)
            .with_context(|| format!("Failed to read {}", self.name))?;
        if read == 0 {
            return Ok(None);
        }
        if self.buf.ends_with(b"\n") {
            self.buf.pop();
            if self.buf.ends_with(b"\r") {
                self.buf.pop();
            }
        }
        // Kernel logs are not guaranteed to be valid UTF-8.
        Ok(Some(String::from_utf8_lossy(&self.buf).into_owned()))
    }
}

/// Streams the output of the `dmesg` command.
#[derive(Debug)]
pub struct DmesgSource {
    child: Child,
    lines: ReaderSource<BufReader<ChildStdout>>,
    reaped: bool,
}

impl DmesgSource {
    pub fn spawn() -> Result<Self> {
        Self::spawn_command(Command::new("dmesg"))
    }

    /// Streams the standard output of an arbitrary command.
    pub fn spawn_command(mut command: Command) -> Result<Self> {
        let program = command.get_program().to_string_lossy().into_owned();
        let mut child = command
            .stdout(Stdio::piped())
            .spawn()
            .with_context(|| format!("Failed to run {}", program))?;
        let stdout = child
            .stdout
            .take()
            .with_context(|| format!("No output pipe for {}", program))?;
        debug!(program, pid = child.id(), "Spawned log source");
        Ok(Self {
            child,
            lines: ReaderSource::new(program, BufReader::new(stdout)),
            reaped: false,
        })
    }

    /// Process id of the command being read.
    pub fn id(&self) -> u32 {
        self.child.id()
    }
}

impl LineSource for DmesgSource {
    fn name(&self) -> &str {
        self.lines.name()
    }

    fn next_line(&mut self) -> Result<Option<String>> {
        self.lines.next_line()
    }

    fn finish(&mut self) -> Result<()> {
        let status = self
            .child
            .wait()
            .with_context(|| format!("Failed to wait for {}", self.name()))?;
        self.reaped = true;
        if !status.success() {
            bail!("{} exited with {}", self.name(), status);
        }
        Ok(())
    }
}

/// A scan that stops early leaves the command running with nobody reading
/// its pipe, so it is killed before being reaped.
impl Drop for DmesgSource {
    fn drop(&mut self) {
        if self.reaped {
            return;
        }
        if let Err(e) = self.child.kill() {
            debug!(pid = self.child.id(), "Failed to kill log source: {}", e);
        }
        if let Err(e) = self.child.wait() {
            debug!(pid = self.child.id(), "Failed to reap log source: {}", e);
        }
    }
}

/// Checks that the driver was loaded with `mm_debug=1`.
///
/// # Returns
/// * `None` - The parameter reads `1`
/// * `Some(String)` - Warning to show the user otherwise
pub fn mm_debug_warning(param: &Path) -> Option<String> {
    let value = fs::read_to_string(param)
        .map_err(|e| e.to_string())
        .and_then(|text| text.trim().parse::<i64>().map_err(|e| e.to_string()));
    match value {
        Ok(1) => None,
        Ok(level) => Some(format!("WARNING: pscnv.mm_debug={}", level)),
        Err(e) => {
            debug!(param = %param.display(), "Cannot read mm_debug: {}", e);
            Some(
                "WARNING: could not check pscnv.mm_debug parameter. Did you load pscnv?"
                    .to_string(),
            )
        }
    }
}

/// Where the log comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    File(PathBuf),
    Dmesg,
}

impl Input {
    pub fn open(&self) -> Result<Box<dyn LineSource>> {
        Ok(match self {
            Input::File(path) => Box::new(ReaderSource::open(path)?),
            Input::Dmesg => Box::new(DmesgSource::spawn()?),
        })
    }
}
