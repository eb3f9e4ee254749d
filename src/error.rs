use std::io;
use std::path::PathBuf;

use crate::config::ConfigError;

/// A result alias for benchmark operations.
pub type BenchResult<T> = Result<T, BenchError>;

#[derive(Debug, thiserror::Error)]
/// Every way a benchmark iteration can fail.
pub enum BenchError {
    #[error("invalid configuration: {0}")]
    /// The provided [BenchConfig](crate::BenchConfig) cannot be used.
    Config(#[from] ConfigError),
    #[error("cannot allocate {size} bytes aligned to {align}")]
    /// The aligned buffer could not be allocated.
    Alloc { align: usize, size: usize },
    #[error("could not open file {path:?}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("can't use fallocate on {len} bytes: {source}")]
    Fallocate {
        len: u64,
        #[source]
        source: io::Error,
    },
    #[error("error on write at offset {offset}: {source}")]
    Write {
        offset: u64,
        #[source]
        source: io::Error,
    },
    #[error("short write at offset {offset}: wrote {written} of {expected} bytes")]
    /// A synchronous write returned fewer bytes than requested.
    ShortWrite {
        offset: u64,
        written: usize,
        expected: usize,
    },
    #[error("could not fsync: {0}")]
    Fsync(#[source] io::Error),
    #[error("error on seek: {0}")]
    Seek(#[source] io::Error),
    #[error("can't init queue with depth {depth}: {source}")]
    /// The io_uring instance could not be created.
    RingSetup {
        depth: u32,
        #[source]
        source: io::Error,
    },
    #[error("can't submit: {0}")]
    Submit(#[source] io::Error),
    #[error("failed waiting for completions: {0}")]
    Wait(#[source] io::Error),
    #[error("write at offset {offset} failed: {source}")]
    /// A submitted write completed with an error.
    WriteFailed {
        offset: u64,
        #[source]
        source: io::Error,
    },
    #[error("write at offset {offset} completed {written} of {expected} bytes")]
    /// A submitted write completed with fewer bytes than the block size.
    ShortCompletion {
        offset: u64,
        written: u32,
        expected: u32,
    },
    #[error("completion event referenced unknown slot {0}")]
    /// The ring returned a completion that does not belong to any in-flight write.
    UnknownCompletion(u64),
}

impl BenchError {
    /// Returns the underlying OS error code if the failure came from a syscall.
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            BenchError::Open { source, .. }
            | BenchError::Fallocate { source, .. }
            | BenchError::Write { source, .. }
            | BenchError::RingSetup { source, .. }
            | BenchError::WriteFailed { source, .. } => source.raw_os_error(),
            BenchError::Fsync(source)
            | BenchError::Seek(source)
            | BenchError::Submit(source)
            | BenchError::Wait(source) => source.raw_os_error(),
            _ => None,
        }
    }
}
