use std::fs::File;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use crate::config::BenchConfig;
use crate::error::{BenchError, BenchResult};
use crate::prealloc::{PreallocReport, PreallocStrategy, preallocate};
use crate::ring::{WriteLoopReport, run_write_loop};

/// The permission bits used when a target file is created.
pub const FILE_MODE: u32 = 0o666;

#[derive(Debug, Clone)]
/// A single test iteration: one file preallocated with one strategy.
pub struct TestCase {
    pub path: PathBuf,
    pub strategy: PreallocStrategy,
}

impl TestCase {
    pub fn new(path: impl Into<PathBuf>, strategy: PreallocStrategy) -> Self {
        Self {
            path: path.into(),
            strategy,
        }
    }
}

#[derive(Debug, Clone)]
/// The measurements of a completed test iteration.
pub struct TestReport {
    pub index: usize,
    pub case: TestCase,
    pub block_size: u32,
    pub blocks: u32,
    pub prealloc: PreallocReport,
    pub write: WriteLoopReport,
}

#[derive(Debug)]
/// A test iteration that did not complete.
pub struct TestFailure {
    pub index: usize,
    pub case: TestCase,
    pub error: BenchError,
}

#[derive(Debug, Default)]
/// The outcome of every iteration that was run.
pub struct RunSummary {
    pub reports: Vec<TestReport>,
    pub failures: Vec<TestFailure>,
}

impl RunSummary {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Progress notifications emitted while iterations run.
pub enum RunEvent<'a> {
    Started {
        index: usize,
        case: &'a TestCase,
        config: &'a BenchConfig,
    },
    Preallocated {
        index: usize,
        report: &'a PreallocReport,
    },
    WriteLoopDone {
        index: usize,
        report: &'a WriteLoopReport,
    },
    Failed {
        index: usize,
        error: &'a BenchError,
    },
}

/// Runs test iterations strictly one after another.
pub struct Runner {
    config: BenchConfig,
}

impl Runner {
    /// Create a runner after validating `config`.
    pub fn new(config: BenchConfig) -> BenchResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &BenchConfig {
        &self.config
    }

    /// Run every case in order.
    ///
    /// The first failure stops the run unless the config enables `keep_going`,
    /// in which case failures are collected and the remaining cases still run.
    /// Files are closed after each iteration regardless of the outcome.
    pub fn run_all<F>(&self, cases: &[TestCase], mut on_event: F) -> RunSummary
    where
        F: FnMut(RunEvent<'_>),
    {
        let mut summary = RunSummary::default();

        for (index, case) in cases.iter().enumerate() {
            match self.run_case(index, case, &mut on_event) {
                Ok(report) => summary.reports.push(report),
                Err(error) => {
                    tracing::error!(
                        index,
                        path = %case.path.display(),
                        error = %error,
                        "test iteration failed"
                    );
                    on_event(RunEvent::Failed {
                        index,
                        error: &error,
                    });
                    summary.failures.push(TestFailure {
                        index,
                        case: case.clone(),
                        error,
                    });

                    if !self.config.keep_going() {
                        break;
                    }
                },
            }
        }

        summary
    }

    /// Open, preallocate and write a single file.
    pub fn run_case<F>(
        &self,
        index: usize,
        case: &TestCase,
        on_event: &mut F,
    ) -> BenchResult<TestReport>
    where
        F: FnMut(RunEvent<'_>),
    {
        tracing::info!(
            index,
            path = %case.path.display(),
            strategy = %case.strategy,
            "starting test iteration"
        );
        on_event(RunEvent::Started {
            index,
            case,
            config: &self.config,
        });

        let file = open_target(&case.path, self.config.direct_io())?;

        let prealloc = preallocate(
            &file,
            self.config.block_size(),
            self.config.blocks(),
            case.strategy,
        )?;
        on_event(RunEvent::Preallocated {
            index,
            report: &prealloc,
        });

        let write = run_write_loop(&file, &self.config)?;
        on_event(RunEvent::WriteLoopDone {
            index,
            report: &write,
        });

        drop(file);

        Ok(TestReport {
            index,
            case: case.clone(),
            block_size: self.config.block_size(),
            blocks: self.config.blocks(),
            prealloc,
            write,
        })
    }
}

/// Open `path` for reading and writing, creating it with mode `0666` if missing.
///
/// Existing content is kept, only the offsets written by the benchmark change.
pub fn open_target(path: &Path, direct_io: bool) -> BenchResult<File> {
    let mut options = File::options();
    options.read(true).write(true).create(true).mode(FILE_MODE);

    if direct_io {
        options.custom_flags(libc::O_DIRECT);
    }

    options.open(path).map_err(|source| BenchError::Open {
        path: path.to_path_buf(),
        source,
    })
}
