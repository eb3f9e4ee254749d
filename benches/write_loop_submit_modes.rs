//! Compares per-operation and batched submission of the timed write loop at a range
//! of queue depths.
//!
//! Files are written under `./benchmark-data` so the run hits a real disk instead of
//! the tmpfs most systems mount at `/tmp`.

use std::fmt::{Display, Formatter};
use std::time::Duration;

use anyhow::Result;
use humansize::DECIMAL;
use perftest::runner::open_target;
use perftest::{BenchConfig, PreallocStrategy, SubmitMode, preallocate, run_write_loop};
use tabled::builder::Builder;
use tabled::settings::Style;

static BASE_PATH: &str = "./benchmark-data";
const BLOCK_SIZE: u32 = 4096;
const BLOCKS: u32 = 25_000;
const QUEUE_DEPTHS: [u32; 4] = [1, 32, 256, 32_768];

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    std::fs::create_dir_all(BASE_PATH)?;
    let dir = tempfile::tempdir_in(BASE_PATH)?;
    let mut results = SubmitModeResults::default();

    for mode in [SubmitMode::PerOperation, SubmitMode::Batched] {
        for depth in QUEUE_DEPTHS {
            tracing::info!(mode = ?mode, depth, "starting run");

            let config = BenchConfig::builder()
                .with_block_size(BLOCK_SIZE)
                .with_blocks(BLOCKS)
                .with_queue_depth(depth)
                .with_submit_mode(mode);

            let path = dir.path().join(format!("{mode:?}-{depth}"));
            let file = open_target(&path, config.direct_io())?;
            preallocate(&file, BLOCK_SIZE, BLOCKS, PreallocStrategy::Fallocate)?;

            let report = run_write_loop(&file, &config)?;
            results.push(
                mode,
                depth,
                report.elapsed.wall,
                report.elapsed.cpu,
                report.bytes_written,
            );
        }
    }

    tracing::info!("done!");

    println!("{results}");

    Ok(())
}

struct SubmitModeResults {
    builder: Builder,
}

impl Default for SubmitModeResults {
    fn default() -> Self {
        let mut builder = Builder::with_capacity(0, 5);
        builder.push_record(["Mode", "Queue Depth", "Elapsed", "CPU", "Bandwidth"]);

        Self { builder }
    }
}

impl SubmitModeResults {
    fn push(
        &mut self,
        mode: SubmitMode,
        depth: u32,
        elapsed: Duration,
        cpu: Duration,
        bytes_written: u64,
    ) {
        let bytes_per_sec = bytes_written as f32 / elapsed.as_secs_f32();

        self.builder.push_record([
            format!("{mode:?}"),
            depth.to_string(),
            format!("{:.2}ms", elapsed.as_secs_f32() * 1000.0),
            format!("{:.2}ms", cpu.as_secs_f32() * 1000.0),
            format!(
                "{}/sec",
                humansize::format_size(bytes_per_sec as u64, DECIMAL)
            ),
        ]);
    }
}

impl Display for SubmitModeResults {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut table = self.builder.clone().build();
        table.with(Style::rounded());
        write!(f, "{table}")
    }
}
