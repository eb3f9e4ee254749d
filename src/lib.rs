#![doc = include_str!("../README.md")]

mod buffer;
pub mod cli;
mod config;
mod error;
pub mod prealloc;
pub mod report;
pub mod ring;
pub mod runner;
#[cfg(test)]
mod tests;
pub mod timing;

pub use crate::buffer::AlignedBuffer;
pub use crate::config::{
    BenchConfig,
    ConfigError,
    DEFAULT_BLOCKS,
    DEFAULT_QUEUE_DEPTH,
    MIN_BLOCK_SIZE,
    SubmitMode,
};
pub use crate::error::{BenchError, BenchResult};
pub use crate::prealloc::{PreallocReport, PreallocStrategy, preallocate};
pub use crate::ring::{WriteLoopReport, ring_supported, run_write_loop};
pub use crate::runner::{RunSummary, Runner, TestCase, TestReport};

#[cfg(not(target_os = "linux"))]
compile_error!(
    "perftest only supports linux based operating systems, it relies on io_uring and fallocate(2)"
);

/// The file offset of write number `index` in a run of `block_size` byte writes.
pub const fn block_offset(block_size: u32, index: u32) -> u64 {
    index as u64 * block_size as u64
}

/// The file offsets written by `blocks` sequential writes of `block_size` bytes.
///
/// Offset `i` is `i * block_size`, so the ranges `[offset, offset + block_size)`
/// of distinct writes never overlap and together cover the whole extent.
pub fn write_offsets(block_size: u32, blocks: u32) -> impl Iterator<Item = u64> {
    (0..blocks).map(move |index| block_offset(block_size, index))
}
