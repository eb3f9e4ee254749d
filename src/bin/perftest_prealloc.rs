//! Compares a file preallocated by writing it out against one preallocated with
//! `fallocate(FALLOC_FL_ZERO_RANGE)`, using 512 byte direct IO writes through io_uring.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use perftest::cli::{self, CommonArgs};
use perftest::{MIN_BLOCK_SIZE, PreallocStrategy, TestCase};

#[derive(Debug, Parser)]
#[command(name = "perftest-prealloc", version)]
#[command(about = "Time io_uring direct IO writes on a written file versus a fallocated file")]
struct Cli {
    /// File preallocated by writing the whole extent
    regular_file: PathBuf,

    /// File preallocated with fallocate(FALLOC_FL_ZERO_RANGE)
    fallocated_file: PathBuf,

    #[command(flatten)]
    common: CommonArgs,
}

fn main() -> ExitCode {
    let args = match cli::parse_or_exit::<Cli>() {
        Ok(args) => args,
        Err(code) => return code,
    };

    cli::init_logging(args.common.verbose);

    let cases = [
        TestCase::new(args.regular_file.clone(), PreallocStrategy::SingleWrite),
        TestCase::new(
            args.fallocated_file.clone(),
            PreallocStrategy::FallocateZeroRange,
        ),
    ];

    match cli::run_cases(args.common.config(MIN_BLOCK_SIZE), &cases) {
        Ok(code) => code,
        Err(err) => cli::fail(err),
    }
}
