//! Allocation tracking.
//!
//! Keeps the set of live page ranges for every memory manager domain and
//! checks each new allocation against it. Overlapping allocations and frees
//! of ranges that were never handed out are reported to a [`ReportSink`]
//! together with a snapshot of the whole state.

use crate::event::{Event, EventKind};
use crate::range::PageRange;
use crate::report::{Anomaly, DomainSnapshot, ReportSink};
use anyhow::{Result, bail};
use std::collections::BTreeMap;
use tracing::debug;

/// Counters collected while replaying a log.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TrackerStats {
    pub allocations: usize,
    pub frees: usize,
    pub conflicts: usize,
    pub unmatched_frees: usize,
}

impl TrackerStats {
    pub fn anomalies(&self) -> usize {
        self.conflicts + self.unmatched_frees
    }
}

/// Tracks live allocations per domain.
///
/// Domains are created on their first allocation. Each domain owns an
/// unordered list of ranges; overlapping entries can exist, since the tracker
/// records what the memory manager did instead of refusing it.
#[derive(Debug, Default)]
pub struct AllocationTracker {
    /// Map from domain name to its live ranges
    domains: BTreeMap<String, Vec<PageRange>>,
    stats: TrackerStats,
}

impl AllocationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one log event.
    pub fn apply(&mut self, event: &Event, sink: &mut dyn ReportSink) -> Result<()> {
        match event.kind {
            EventKind::Allocate => {
                self.on_allocate(&event.domain, event.range, sink);
                Ok(())
            }
            EventKind::Free => self.on_free(&event.domain, event.range, sink),
        }
    }

    /// Records a new allocation.
    ///
    /// Every live range of the domain that overlaps `range` is reported as a
    /// conflict. The range is recorded even if it overlaps.
    pub fn on_allocate(&mut self, domain: &str, range: PageRange, sink: &mut dyn ReportSink) {
        debug!(domain, %range, "allocate");
        self.stats.allocations += 1;

        let conflicts: Vec<PageRange> = self
            .domains
            .get(domain)
            .map(|live| live.iter().filter(|old| old.overlaps(&range)).copied().collect())
            .unwrap_or_default();

        for old in conflicts {
            self.stats.conflicts += 1;
            sink.anomaly(&Anomaly::Conflict {
                domain: domain.to_string(),
                old,
                new: range,
            });
            sink.dump(&self.dump_state());
        }

        self.domains
            .entry(domain.to_string())
            .or_default()
            .push(range);
    }

    /// Removes an allocation record.
    ///
    /// # Returns
    /// * `Ok(())` - The range was removed, or was not live and got reported
    /// * `Err(anyhow::Error)` - If the domain has never been allocated into
    pub fn on_free(
        &mut self,
        domain: &str,
        range: PageRange,
        sink: &mut dyn ReportSink,
    ) -> Result<()> {
        debug!(domain, %range, "free");
        let Some(live) = self.domains.get_mut(domain) else {
            bail!("unknown mm domain \"{}\"", domain);
        };
        self.stats.frees += 1;

        if let Some(index) = live.iter().position(|r| *r == range) {
            live.swap_remove(index);
        } else {
            // Freeing something that has never been allocated
            self.stats.unmatched_frees += 1;
            sink.anomaly(&Anomaly::NotAllocated {
                domain: domain.to_string(),
                range,
            });
            sink.dump(&self.dump_state());
        }
        Ok(())
    }

    /// Snapshot of every domain with its ranges sorted by start page.
    pub fn dump_state(&self) -> Vec<DomainSnapshot> {
        self.domains
            .iter()
            .map(|(domain, live)| {
                let mut ranges = live.clone();
                ranges.sort();
                DomainSnapshot {
                    domain: domain.clone(),
                    ranges,
                }
            })
            .collect()
    }

    /// Live ranges of `domain`, or `None` if the domain is unknown.
    pub fn live(&self, domain: &str) -> Option<&[PageRange]> {
        self.domains.get(domain).map(Vec::as_slice)
    }

    /// Names of every domain seen so far.
    pub fn domains(&self) -> impl Iterator<Item = &str> {
        self.domains.keys().map(String::as_str)
    }

    pub fn stats(&self) -> TrackerStats {
        self.stats
    }
}
