//! Command line plumbing shared by the `perftest` binaries.

use std::process::ExitCode;

use clap::{Args, Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use crate::config::{BenchConfig, DEFAULT_BLOCKS, DEFAULT_QUEUE_DEPTH, SubmitMode};
use crate::report::{self, SummaryTable};
use crate::runner::{Runner, TestCase};

/// The exit status used for every failure, `-1` as an unsigned process status.
pub const FAILURE_STATUS: u8 = 255;

#[derive(Debug, Clone, Copy, ValueEnum, Eq, PartialEq)]
pub enum SubmitModeArg {
    /// Submit every write to the kernel on its own
    PerOperation,
    /// Fill the submission queue before submitting
    Batched,
}

impl From<SubmitModeArg> for SubmitMode {
    fn from(value: SubmitModeArg) -> Self {
        match value {
            SubmitModeArg::PerOperation => SubmitMode::PerOperation,
            SubmitModeArg::Batched => SubmitMode::Batched,
        }
    }
}

#[derive(Debug, Args)]
/// Options accepted by every benchmark binary.
pub struct CommonArgs {
    /// Number of blocks written per file
    #[arg(long, default_value_t = DEFAULT_BLOCKS)]
    pub blocks: u32,

    /// Queue depth requested from io_uring
    #[arg(long = "queue-depth", default_value_t = DEFAULT_QUEUE_DEPTH)]
    pub queue_depth: u32,

    /// How writes are submitted to the kernel
    #[arg(long = "submit-mode", value_enum, default_value = "per-operation")]
    pub submit_mode: SubmitModeArg,

    /// Open the files without O_DIRECT
    #[arg(long = "no-direct")]
    pub no_direct: bool,

    /// Keep running the remaining files after one fails
    #[arg(long = "keep-going")]
    pub keep_going: bool,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl CommonArgs {
    /// Build a config for the given block size from the shared options.
    pub fn config(&self, block_size: u32) -> BenchConfig {
        BenchConfig::builder()
            .with_block_size(block_size)
            .with_blocks(self.blocks)
            .with_queue_depth(self.queue_depth)
            .with_submit_mode(self.submit_mode.into())
            .with_direct_io(!self.no_direct)
            .with_keep_going(self.keep_going)
    }
}

/// Parse the command line, exiting with [FAILURE_STATUS] on usage errors.
///
/// `--help` and `--version` still exit successfully.
pub fn parse_or_exit<P: Parser>() -> Result<P, ExitCode> {
    match P::try_parse() {
        Ok(args) => Ok(args),
        Err(err) => {
            let _ = err.print();
            if err.use_stderr() {
                Err(ExitCode::from(FAILURE_STATUS))
            } else {
                Err(ExitCode::SUCCESS)
            }
        },
    }
}

/// Install the stderr log subscriber, `RUST_LOG` overrides the default level.
pub fn init_logging(verbose: bool) {
    let default_level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };

    let filter = EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env_lossy();

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Run the cases, print progress and the summary table, and map the outcome to an exit code.
pub fn run_cases(config: BenchConfig, cases: &[TestCase]) -> anyhow::Result<ExitCode> {
    let runner = Runner::new(config)?;
    let summary = runner.run_all(cases, report::print_progress);

    if !summary.reports.is_empty() {
        println!("{}", SummaryTable::from_summary(&summary));
    }

    if summary.is_success() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::from(FAILURE_STATUS))
    }
}

/// Report a top level failure and return the failure status.
pub fn fail(err: anyhow::Error) -> ExitCode {
    tracing::error!(error = ?err, "benchmark aborted");
    eprintln!("error: {err:#}");
    ExitCode::from(FAILURE_STATUS)
}
