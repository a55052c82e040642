//! Event extraction from memory manager log lines.
//!
//! With `mm_debug` enabled the driver logs one line per allocation and one
//! per release:
//!
//! ```text
//! [drm] MM: [vram] Allocated size 1000 at 20000-21000
//! [drm] MM: [vram] Freeing node 20000..21000 of type 1
//! ```
//!
//! Every other line is ignored.

use crate::range::PageRange;
use anyhow::{Context, Result};
use regex::{Captures, Regex};
use tracing::warn;

const ALLOCATE_PATTERN: &str =
    r"\[(?<domain>[[:word:]]+)\] Allocated size [[:xdigit:]]+ at (?<start>[[:xdigit:]]+)-(?<end>[[:xdigit:]]+)";
const FREE_PATTERN: &str =
    r"\[(?<domain>[[:word:]]+)\] Freeing node (?<start>[[:xdigit:]]+)\.\.(?<end>[[:xdigit:]]+)";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Allocate,
    Free,
}

/// A single allocation or release observed in the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub kind: EventKind,
    pub domain: String,
    pub range: PageRange,
}

impl Event {
    pub fn allocate(domain: impl Into<String>, range: PageRange) -> Self {
        Self {
            kind: EventKind::Allocate,
            domain: domain.into(),
            range,
        }
    }

    pub fn free(domain: impl Into<String>, range: PageRange) -> Self {
        Self {
            kind: EventKind::Free,
            domain: domain.into(),
            range,
        }
    }
}

#[derive(Debug)]
struct Matcher {
    kind: EventKind,
    pattern: Regex,
}

/// Converts log lines into events.
///
/// Matchers are tried in order and the first one that matches wins.
#[derive(Debug)]
pub struct EventExtractor {
    matchers: Vec<Matcher>,
}

impl EventExtractor {
    pub fn new() -> Result<Self> {
        let matchers = [
            (EventKind::Allocate, ALLOCATE_PATTERN),
            (EventKind::Free, FREE_PATTERN),
        ]
        .into_iter()
        .map(|(kind, pattern)| {
            let pattern = Regex::new(pattern)
                .with_context(|| format!("Invalid {:?} pattern `{}`", kind, pattern))?;
            Ok(Matcher { kind, pattern })
        })
        .collect::<Result<Vec<_>>>()?;
        Ok(Self { matchers })
    }

    /// Extracts the event carried by `line`, if any.
    pub fn extract(&self, line: &str) -> Option<Event> {
        let (kind, captures) = self.matchers.iter().find_map(|matcher| {
            matcher
                .pattern
                .captures(line)
                .map(|captures| (matcher.kind, captures))
        })?;

        let Some(range) = parse_range(&captures) else {
            warn!(line, "Ignoring line with an address wider than 64 bits");
            return None;
        };

        Some(Event {
            kind,
            domain: captures["domain"].to_string(),
            range,
        })
    }
}

fn parse_range(captures: &Captures<'_>) -> Option<PageRange> {
    let start = u64::from_str_radix(&captures["start"], 16).ok()?;
    let end = u64::from_str_radix(&captures["end"], 16).ok()?;
    Some(PageRange::from_addresses(start, end))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(line: &str) -> Option<Event> {
        EventExtractor::new().unwrap().extract(line)
    }

    #[test]
    fn test_allocation_line() {
        let event = extract("MM: [vram] Allocated size 1000 at 1000-2000").unwrap();
        assert_eq!(event, Event::allocate("vram", PageRange::new(1, 2)));
    }

    #[test]
    fn test_free_line() {
        let event = extract("MM: [vram] Freeing node 1000..2000").unwrap();
        assert_eq!(event, Event::free("vram", PageRange::new(1, 2)));
    }

    #[test]
    fn test_kernel_prefix_and_suffix() {
        let line = "[ 1234.567890] [drm] MM: [vspace1] Freeing node 7f0300000..7f0302000 of type 3";
        let event = extract(line).unwrap();
        assert_eq!(
            event,
            Event::free("vspace1", PageRange::new(0x7f0300, 0x7f0302))
        );
    }

    #[test]
    fn test_uppercase_hex() {
        let event = extract("MM: [vram] Allocated size 2000 at ABC000-ABE000").unwrap();
        assert_eq!(event.range, PageRange::new(0xabc, 0xabe));
    }

    #[test]
    fn test_address_is_page_shifted() {
        let event = extract("MM: [gart] Allocated size 1800 at 1800-3000").unwrap();
        assert_eq!(event.range, PageRange::new(1, 3));
    }

    #[test]
    fn test_delimiters_are_not_interchangeable() {
        assert_eq!(extract("MM: [vram] Allocated size 1000 at 1000..2000"), None);
        assert_eq!(extract("MM: [vram] Freeing node 1000-2000"), None);
    }

    #[test]
    fn test_unrelated_lines_are_ignored() {
        assert_eq!(extract(""), None);
        assert_eq!(extract("[drm] Initialized pscnv 0.0.1 20100514"), None);
        assert_eq!(extract("MM: [vram] Allocated size zz at 1000-2000"), None);
        assert_eq!(extract("MM: [my-domain] Freeing node 1000..2000"), None);
    }

    #[test]
    fn test_domain_is_ascii_word() {
        assert_eq!(extract("MM: [vräm] Allocated size 1000 at 1000-2000"), None);
        assert_eq!(extract("MM: [ドメイン] Freeing node 1000..2000"), None);
        let event = extract("MM: [vspace_12] Freeing node 1000..2000").unwrap();
        assert_eq!(event.domain, "vspace_12");
    }

    #[test]
    fn test_oversized_address_is_ignored() {
        assert_eq!(
            extract("MM: [vram] Allocated size 1000 at 10000000000000000-10000000000001000"),
            None
        );
    }
}
