//! Compares fallocate, a single large write and many small writes as ways of
//! preallocating a file before timing a batch of direct IO writes through io_uring.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, bail};
use clap::Parser;
use perftest::cli::{self, CommonArgs};
use perftest::{PreallocStrategy, TestCase};

#[derive(Debug, Parser)]
#[command(name = "perftest", version)]
#[command(about = "Time io_uring direct IO writes after three preallocation strategies")]
struct Cli {
    /// Size of every write in bytes, a power of two of at least 512
    block_size: u32,

    /// File preallocated with fallocate
    file1: PathBuf,

    /// File preallocated with a single large write
    file2: PathBuf,

    /// File preallocated with many block sized writes
    file3: PathBuf,

    /// Override the strategy used for each file, e.g. `small-writes,fallocate,1`
    #[arg(long, value_delimiter = ',')]
    strategies: Option<Vec<PreallocStrategy>>,

    #[command(flatten)]
    common: CommonArgs,
}

impl Cli {
    fn cases(&self) -> anyhow::Result<Vec<TestCase>> {
        let strategies = match &self.strategies {
            None => PreallocStrategy::COMPARE_ORDER.to_vec(),
            Some(list) if list.len() == 3 => list.clone(),
            Some(list) => bail!("expected 3 strategies, one per file, got {}", list.len()),
        };

        let files = [&self.file1, &self.file2, &self.file3];
        Ok(files
            .into_iter()
            .zip(strategies)
            .map(|(path, strategy)| TestCase::new(path.clone(), strategy))
            .collect())
    }
}

fn main() -> ExitCode {
    let args = match cli::parse_or_exit::<Cli>() {
        Ok(args) => args,
        Err(code) => return code,
    };

    cli::init_logging(args.common.verbose);

    match run(&args) {
        Ok(code) => code,
        Err(err) => cli::fail(err),
    }
}

fn run(args: &Cli) -> anyhow::Result<ExitCode> {
    println!("using blockSize {}", args.block_size);

    let config = args.common.config(args.block_size);
    let cases = args.cases().context("invalid strategy list")?;

    cli::run_cases(config, &cases)
}
