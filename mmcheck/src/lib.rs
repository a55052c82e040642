//! mmcheck library
//!
//! Replays the debug log of the pscnv memory manager and reports double
//! allocations. With `mm_debug=1` the driver logs every allocation and release
//! of each of its address space domains; [`scan`] feeds those lines through an
//! [`EventExtractor`] into an [`AllocationTracker`], which reports overlapping
//! allocations and frees of ranges that were never allocated.
//!
//! # Example
//! ```
//! use mmcheck::report::RecordingReport;
//! use mmcheck::source::ReaderSource;
//! use mmcheck::tracker::AllocationTracker;
//!
//! let mut source = ReaderSource::from_text(
//!     "MM: [vram] Allocated size 1000 at 1000-2000\n\
//!      MM: [vram] Freeing node 1000..2000\n",
//! );
//! let mut tracker = AllocationTracker::new();
//! let mut report = RecordingReport::new();
//! mmcheck::scan(&mut source, &mut tracker, &mut report)?;
//! assert!(report.anomalies.is_empty());
//! assert!(tracker.live("vram").unwrap().is_empty());
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod event;
pub mod range;
pub mod report;
pub mod source;
pub mod tracker;

use crate::event::EventExtractor;
use crate::report::ReportSink;
use crate::source::LineSource;
use crate::tracker::{AllocationTracker, TrackerStats};
use anyhow::{Context, Result};
use tracing::{debug, info};

/// Replays every line of `source` into `tracker`.
///
/// Anomalies are delivered to `sink` as they are found and do not stop the
/// scan.
///
/// # Returns
/// * `Ok(TrackerStats)` - The whole source was consumed
/// * `Err(anyhow::Error)` - The source failed, or a free referenced a domain
///   that was never allocated into
pub fn scan(
    source: &mut dyn LineSource,
    tracker: &mut AllocationTracker,
    sink: &mut dyn ReportSink,
) -> Result<TrackerStats> {
    let extractor = EventExtractor::new()?;
    let mut lineno = 0usize;

    while let Some(line) = source.next_line()? {
        lineno += 1;
        let Some(event) = extractor.extract(&line) else {
            continue;
        };
        tracker
            .apply(&event, sink)
            .with_context(|| format!("{}:{}: {}", source.name(), lineno, line))?;
    }
    source.finish()?;

    debug!(lines = lineno, source = source.name(), "Reached end of input");
    let stats = tracker.stats();
    info!(
        allocations = stats.allocations,
        frees = stats.frees,
        conflicts = stats.conflicts,
        unmatched_frees = stats.unmatched_frees,
        "Scan finished"
    );
    Ok(stats)
}
