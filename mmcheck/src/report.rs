//! Reporting of detected anomalies.
//!
//! The tracker hands every finding to a [`ReportSink`]. [`TextReport`] prints
//! them in the human readable console format, while [`RecordingReport`] keeps
//! them around so they can be inspected afterwards.

use crate::range::PageRange;
use std::fmt;
use std::io::{self, Write};
use tracing::{debug, warn};

const SEPARATOR: &str = "---------------------------------------------";

/// An inconsistency found while replaying the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Anomaly {
    /// A new allocation overlaps a range that is still live.
    Conflict {
        domain: String,
        old: PageRange,
        new: PageRange,
    },
    /// A range was freed without a matching live allocation.
    NotAllocated { domain: String, range: PageRange },
}

impl fmt::Display for Anomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Anomaly::Conflict { domain, old, new } => {
                write!(f, "[{domain}] Range {old} and {new} intersect!")
            }
            Anomaly::NotAllocated { domain, range } => {
                write!(f, "[{domain}] Range {range} is not in domain!")
            }
        }
    }
}

/// Live ranges of one domain, sorted by start page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainSnapshot {
    pub domain: String,
    pub ranges: Vec<PageRange>,
}

impl DomainSnapshot {
    /// Ranges as a comma separated list.
    pub fn joined(&self) -> String {
        self.ranges
            .iter()
            .map(PageRange::to_string)
            .collect::<Vec<_>>()
            .join(",  ")
    }
}

/// Consumer of tracker findings.
pub trait ReportSink {
    fn anomaly(&mut self, anomaly: &Anomaly);

    /// Receives the full tracker state after an anomaly.
    fn dump(&mut self, snapshot: &[DomainSnapshot]);
}

/// Writes findings as plain text.
///
/// Write errors are logged and otherwise dropped, so a closed stdout does not
/// interrupt the scan.
#[derive(Debug)]
pub struct TextReport<W: Write> {
    out: W,
}

impl TextReport<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> TextReport<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_anomaly(&mut self, anomaly: &Anomaly) -> io::Result<()> {
        writeln!(self.out, "{anomaly}")?;
        if matches!(anomaly, Anomaly::Conflict { .. }) {
            writeln!(self.out)?;
        }
        Ok(())
    }

    fn write_dump(&mut self, snapshot: &[DomainSnapshot]) -> io::Result<()> {
        writeln!(self.out, "{SEPARATOR}")?;
        for domain in snapshot {
            writeln!(self.out, "==== [{}] ====", domain.domain)?;
            writeln!(self.out, "{}", domain.joined())?;
            writeln!(self.out)?;
        }
        writeln!(self.out, "{SEPARATOR}")?;
        self.out.flush()
    }
}

impl<W: Write> ReportSink for TextReport<W> {
    fn anomaly(&mut self, anomaly: &Anomaly) {
        match anomaly {
            Anomaly::Conflict { domain, old, new } => {
                debug!(%domain, %old, %new, "Overlapping allocation");
            }
            Anomaly::NotAllocated { domain, range } => {
                debug!(%domain, %range, "Free of a range that is not allocated");
            }
        }
        if let Err(e) = self.write_anomaly(anomaly) {
            warn!("Failed to write report: {}", e);
        }
    }

    fn dump(&mut self, snapshot: &[DomainSnapshot]) {
        if let Err(e) = self.write_dump(snapshot) {
            warn!("Failed to write state dump: {}", e);
        }
    }
}

/// Keeps every finding in memory.
#[derive(Debug, Default)]
pub struct RecordingReport {
    pub anomalies: Vec<Anomaly>,
    pub dumps: Vec<Vec<DomainSnapshot>>,
}

impl RecordingReport {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ReportSink for RecordingReport {
    fn anomaly(&mut self, anomaly: &Anomaly) {
        self.anomalies.push(anomaly.clone());
    }

    fn dump(&mut self, snapshot: &[DomainSnapshot]) {
        self.dumps.push(snapshot.to_vec());
    }
}
