//! mmcheck
//!
//! Detects double allocations by pscnv's memory manager.
//!
//! Load pscnv with `mm_debug=1`, then either point this tool at a saved copy
//! of the kernel log or let it read `dmesg` directly.

use anyhow::Result;
use clap::Parser;
use mmcheck::report::TextReport;
use mmcheck::source::{self, Input, MM_DEBUG_PARAM};
use mmcheck::tracker::AllocationTracker;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(version, about = "Detects double allocations by pscnv's memory manager")]
struct Args {
    /// Copy of the dmesg output to scan. Reads `dmesg` directly if omitted.
    filename: Option<PathBuf>,

    /// Parameter file holding the driver's mm_debug level.
    #[arg(long, value_name = "PATH", default_value = MM_DEBUG_PARAM)]
    mm_debug_param: PathBuf,

    /// Exit with a failure status if any anomaly is reported.
    #[arg(long)]
    strict: bool,
}

fn main() -> Result<ExitCode> {
    let log_level = std::env::var("MMCHECK_LOG").unwrap_or_else(|_| "warn".to_string());

    tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let input = match &args.filename {
        Some(filename) => {
            println!("reading {}", filename.display());
            Input::File(filename.clone())
        }
        None => {
            println!("reading dmesg");
            if let Some(warning) = source::mm_debug_warning(&args.mm_debug_param) {
                println!("{}", warning);
            }
            Input::Dmesg
        }
    };
    println!();

    let mut source = input.open()?;
    let mut tracker = AllocationTracker::new();
    let mut report = TextReport::stdout();
    let stats = mmcheck::scan(source.as_mut(), &mut tracker, &mut report)?;

    println!("done");

    if args.strict && stats.anomalies() > 0 {
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}
