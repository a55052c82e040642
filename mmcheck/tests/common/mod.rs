//! Common test utilities and macros

use mmcheck::report::RecordingReport;
use mmcheck::source::ReaderSource;
use mmcheck::tracker::AllocationTracker;
use std::path::Path;

#[derive(Debug)]
pub enum TestResult {
    /// Scan completed without findings
    Clean,
    /// Scan completed with the given rendered anomalies
    Anomalies(Vec<String>),
    Error(String),
    ErrorRegex(String),
}

impl PartialEq for TestResult {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (TestResult::Clean, TestResult::Clean) => true,
            (TestResult::Anomalies(a), TestResult::Anomalies(b)) => a == b,
            (TestResult::Error(a), TestResult::Error(b)) => a == b,
            (TestResult::ErrorRegex(pattern), TestResult::Error(msg)) => {
                regex::Regex::new(pattern).unwrap().is_match(msg)
            }
            (TestResult::Error(msg), TestResult::ErrorRegex(pattern)) => {
                regex::Regex::new(pattern).unwrap().is_match(msg)
            }
            _ => false,
        }
    }
}

pub fn input_path(input_file: &str) -> std::path::PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("inputs")
        .join(input_file)
}

pub fn run_scan_test(input_file: &Path) -> (TestResult, AllocationTracker) {
    let mut tracker = AllocationTracker::new();
    let mut report = RecordingReport::new();

    let result = ReaderSource::open(input_file)
        .and_then(|mut source| mmcheck::scan(&mut source, &mut tracker, &mut report));

    let result = match result {
        Ok(_) if report.anomalies.is_empty() => TestResult::Clean,
        Ok(_) => TestResult::Anomalies(report.anomalies.iter().map(ToString::to_string).collect()),
        Err(e) => TestResult::Error(format!("{:#}", e)),
    };
    (result, tracker)
}

#[macro_export]
macro_rules! check_scan {
    ($test_name:ident, input=$input_file:expr, result=$expected:expr) => {
        #[test]
        fn $test_name() {
            let input_path = crate::common::input_path($input_file);
            let (result, _) = crate::common::run_scan_test(&input_path);
            assert_eq!(result, $expected);
        }
    };
}
