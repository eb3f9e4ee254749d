use std::fmt::{Display, Formatter};
use std::time::Duration;

use humansize::DECIMAL;
use tabled::builder::Builder;
use tabled::settings::Style;

use crate::runner::{RunEvent, RunSummary, TestReport};

const SEPARATOR: &str = "===================================";

/// Print the human readable progress line for a runner event to stderr.
pub fn print_progress(event: RunEvent<'_>) {
    match event {
        RunEvent::Started {
            index,
            case,
            config,
        } => {
            eprintln!("{SEPARATOR} test {index}");
            eprintln!("Opening file {} for test {index}", case.path.display());
            eprintln!(
                "preAlloc blockSize = {}, blocks = {}, strategy = {}",
                config.block_size(),
                config.blocks(),
                case.strategy,
            );
        },
        RunEvent::Preallocated { report, .. } => {
            eprintln!(
                "using {}...done in {}",
                report.strategy,
                format_duration(report.elapsed)
            );
        },
        RunEvent::WriteLoopDone { report, .. } => {
            eprintln!(
                "writing...done in {} clocks, {} milliseconds",
                report.elapsed.clocks(),
                report.elapsed.wall_millis(),
            );
        },
        RunEvent::Failed { index, error } => {
            eprintln!("test {index} failed: {error}");
        },
    }
}

/// A table of the completed iterations of a run.
pub struct SummaryTable {
    builder: Builder,
}

impl Default for SummaryTable {
    fn default() -> Self {
        let mut builder = Builder::with_capacity(0, 10);
        builder.push_record([
            "Test",
            "File",
            "Prealloc",
            "Block Size",
            "Blocks",
            "Prealloc Time",
            "Elapsed",
            "CPU",
            "Bandwidth",
            "IOPS",
        ]);

        Self { builder }
    }
}

impl SummaryTable {
    pub fn from_summary(summary: &RunSummary) -> Self {
        let mut table = Self::default();
        for report in &summary.reports {
            table.push(report);
        }
        table
    }

    pub fn push(&mut self, report: &TestReport) {
        let elapsed = report.write.elapsed.wall;
        let secs = elapsed.as_secs_f64();
        let (bytes_per_sec, iops) = if secs > 0.0 {
            (
                report.write.bytes_written as f64 / secs,
                report.write.completed as f64 / secs,
            )
        } else {
            (0.0, 0.0)
        };

        self.builder.push_record([
            report.index.to_string(),
            report.case.path.display().to_string(),
            report.case.strategy.to_string(),
            humansize::format_size(report.block_size, DECIMAL),
            report.blocks.to_string(),
            format_duration(report.prealloc.elapsed),
            format_duration(elapsed),
            format_duration(report.write.elapsed.cpu),
            format!(
                "{}/sec",
                humansize::format_size(bytes_per_sec as u64, DECIMAL)
            ),
            format!("{} op/sec", format_rate(iops)),
        ]);
    }
}

impl Display for SummaryTable {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut table = self.builder.clone().build();
        table.with(Style::rounded());
        write!(f, "{table}")
    }
}

fn format_duration(dur: Duration) -> String {
    match dur.as_secs() {
        0 => format!("{:.2}ms", dur.as_secs_f64() * 1_000.0),
        _ => format!("{:.2}s", dur.as_secs_f64()),
    }
}

/// Scale an operation rate to `k`/`m`, a rate of exactly one unit takes the suffix.
fn format_rate(per_sec: f64) -> String {
    const SCALES: [(f64, &str); 2] = [(1_000_000.0, "m"), (1_000.0, "k")];

    SCALES
        .iter()
        .find(|(scale, _)| per_sec >= *scale)
        .map(|(scale, suffix)| format!("{:.2}{suffix}", per_sec / scale))
        .unwrap_or_else(|| format!("{per_sec:.2}"))
}
