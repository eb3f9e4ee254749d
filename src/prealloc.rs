use std::fmt::{Display, Formatter};
use std::fs::File;
use std::io::{Seek, SeekFrom};
use std::os::fd::AsRawFd;
use std::os::unix::fs::FileExt;
use std::str::FromStr;
use std::time::{Duration, Instant};

use crate::buffer::AlignedBuffer;
use crate::error::{BenchError, BenchResult};

/// The byte used to fill the file when preallocating by writing.
pub const PREALLOC_FILL: u8 = b'a';

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
/// How a file reserves its storage before the timed write loop runs.
pub enum PreallocStrategy {
    /// Reserve the full extent with a single `fallocate(2)` call.
    Fallocate,
    /// Reserve and zero the full extent with `fallocate(2)` and `FALLOC_FL_ZERO_RANGE`.
    FallocateZeroRange,
    /// Write the full extent with a single large positioned write, then `fsync`.
    SingleWrite,
    /// Write the extent one block at a time at sequential offsets, then `fsync`.
    SmallWrites,
}

impl PreallocStrategy {
    /// The strategies run by the three file comparison, in order.
    pub const COMPARE_ORDER: [PreallocStrategy; 3] = [
        PreallocStrategy::Fallocate,
        PreallocStrategy::SingleWrite,
        PreallocStrategy::SmallWrites,
    ];

    /// Select a strategy by its numeric test index.
    ///
    /// `0` is fallocate, `1` a single big write and `2` many small writes.
    pub fn from_index(index: usize) -> Option<Self> {
        Self::COMPARE_ORDER.get(index).copied()
    }

    pub fn name(&self) -> &'static str {
        match self {
            PreallocStrategy::Fallocate => "fallocate",
            PreallocStrategy::FallocateZeroRange => "fallocate-zero-range",
            PreallocStrategy::SingleWrite => "single-write",
            PreallocStrategy::SmallWrites => "small-writes",
        }
    }
}

impl Display for PreallocStrategy {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, thiserror::Error, Eq, PartialEq)]
#[error(
    "unknown preallocation strategy {0:?}, expected one of: fallocate, \
    fallocate-zero-range, single-write, small-writes, 0, 1, 2"
)]
pub struct UnknownStrategy(pub String);

impl FromStr for PreallocStrategy {
    type Err = UnknownStrategy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(index) = s.parse::<usize>() {
            return Self::from_index(index).ok_or_else(|| UnknownStrategy(s.to_string()));
        }

        match s {
            "fallocate" => Ok(PreallocStrategy::Fallocate),
            "fallocate-zero-range" | "zero-range" => Ok(PreallocStrategy::FallocateZeroRange),
            "single-write" => Ok(PreallocStrategy::SingleWrite),
            "small-writes" => Ok(PreallocStrategy::SmallWrites),
            other => Err(UnknownStrategy(other.to_string())),
        }
    }
}

#[derive(Debug, Clone)]
/// What a preallocation pass did.
pub struct PreallocReport {
    pub strategy: PreallocStrategy,
    /// The extent reserved or written in bytes.
    pub bytes: u64,
    /// The number of syscalls used to reserve or write the extent.
    pub calls: u64,
    pub elapsed: Duration,
}

/// Ensure `file` occupies `blocks * block_size` bytes using the given strategy.
///
/// On success the file cursor is positioned at offset `0` and any scratch
/// buffer has been released.
pub fn preallocate(
    file: &File,
    block_size: u32,
    blocks: u32,
    strategy: PreallocStrategy,
) -> BenchResult<PreallocReport> {
    let len = block_size as u64 * blocks as u64;

    tracing::info!(
        block_size,
        blocks,
        strategy = %strategy,
        "preallocating file"
    );

    let start = Instant::now();
    let calls = match strategy {
        PreallocStrategy::Fallocate => fallocate(file, 0, len)?,
        PreallocStrategy::FallocateZeroRange => {
            fallocate(file, libc::FALLOC_FL_ZERO_RANGE, len)?
        },
        PreallocStrategy::SingleWrite => {
            let buffer =
                AlignedBuffer::new(block_size as usize, len as usize, PREALLOC_FILL)?;
            let calls = write_all_at(file, buffer.as_slice(), 0)?;
            sync(file)?;
            calls
        },
        PreallocStrategy::SmallWrites => {
            let buffer =
                AlignedBuffer::new(block_size as usize, block_size as usize, PREALLOC_FILL)?;
            let mut calls = 0;
            for offset in crate::write_offsets(block_size, blocks) {
                calls += write_all_at(file, buffer.as_slice(), offset)?;
            }
            sync(file)?;
            calls
        },
    };

    rewind(file)?;
    let elapsed = start.elapsed();

    tracing::info!(
        strategy = %strategy,
        bytes = len,
        calls,
        elapsed = ?elapsed,
        "preallocation done"
    );

    Ok(PreallocReport {
        strategy,
        bytes: len,
        calls,
        elapsed,
    })
}

fn fallocate(file: &File, mode: libc::c_int, len: u64) -> BenchResult<u64> {
    // SAFETY: The descriptor is owned by `file` and stays open for the call.
    let result = unsafe { libc::fallocate(file.as_raw_fd(), mode, 0, len as libc::off_t) };
    if result < 0 {
        return Err(BenchError::Fallocate {
            len,
            source: std::io::Error::last_os_error(),
        });
    }
    Ok(1)
}

/// Write all of `buffer` at `offset`, returning the number of `pwrite(2)` calls.
///
/// The kernel caps a single write at `0x7ffff000` bytes, so large extents
/// take more than one call. A write of zero bytes is reported as short.
fn write_all_at<F: FileExt>(file: &F, buffer: &[u8], offset: u64) -> BenchResult<u64> {
    let mut done = 0;
    let mut calls = 0;

    while done < buffer.len() {
        let at = offset + done as u64;
        let written = match file.write_at(&buffer[done..], at) {
            Ok(n) => n,
            Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(source) => return Err(BenchError::Write { offset: at, source }),
        };
        calls += 1;

        if written == 0 {
            return Err(BenchError::ShortWrite {
                offset,
                written: done,
                expected: buffer.len(),
            });
        }
        done += written;
    }

    Ok(calls)
}

fn sync(file: &File) -> BenchResult<()> {
    file.sync_all().map_err(BenchError::Fsync)
}

fn rewind(mut file: &File) -> BenchResult<()> {
    file.seek(SeekFrom::Start(0)).map_err(BenchError::Seek)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::io;

    use super::*;

    /// Caps every positioned write at `limit` bytes, like the kernel does
    /// for writes past `0x7ffff000` bytes.
    struct CappedFile {
        inner: File,
        limit: usize,
        calls: Cell<u64>,
    }

    impl FileExt for CappedFile {
        fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
            self.inner.read_at(buf, offset)
        }

        fn write_at(&self, buf: &[u8], offset: u64) -> io::Result<usize> {
            self.calls.set(self.calls.get() + 1);
            let len = buf.len().min(self.limit);
            self.inner.write_at(&buf[..len], offset)
        }
    }

    #[rstest::rstest]
    #[case(4096, 4096, 1)]
    #[case(4096, 1000, 5)]
    #[case(4096 * 3, 4096, 3)]
    fn test_write_all_at_resumes_short_writes(
        #[case] len: usize,
        #[case] limit: usize,
        #[case] expected_calls: u64,
    ) {
        let file = CappedFile {
            inner: tempfile::tempfile().unwrap(),
            limit,
            calls: Cell::new(0),
        };
        let buffer = vec![PREALLOC_FILL; len];

        let calls = write_all_at(&file, &buffer, 512).expect("write whole buffer");
        assert_eq!(calls, expected_calls);
        assert_eq!(file.calls.get(), expected_calls);
        assert_eq!(file.inner.metadata().unwrap().len(), 512 + len as u64);

        let mut written = vec![0; len];
        file.inner.read_exact_at(&mut written, 512).unwrap();
        assert!(written.iter().all(|&b| b == PREALLOC_FILL));
    }

    #[test]
    fn test_write_all_at_zero_progress_is_short() {
        let file = CappedFile {
            inner: tempfile::tempfile().unwrap(),
            limit: 0,
            calls: Cell::new(0),
        };

        let err = write_all_at(&file, &[PREALLOC_FILL; 512], 0).expect_err("no progress");
        assert!(matches!(
            err,
            BenchError::ShortWrite {
                offset: 0,
                written: 0,
                expected: 512,
            }
        ));
    }

    #[rstest::rstest]
    #[case("fallocate", PreallocStrategy::Fallocate)]
    #[case("0", PreallocStrategy::Fallocate)]
    #[case("single-write", PreallocStrategy::SingleWrite)]
    #[case("1", PreallocStrategy::SingleWrite)]
    #[case("small-writes", PreallocStrategy::SmallWrites)]
    #[case("2", PreallocStrategy::SmallWrites)]
    #[case("zero-range", PreallocStrategy::FallocateZeroRange)]
    #[case("fallocate-zero-range", PreallocStrategy::FallocateZeroRange)]
    fn test_parse_strategy(#[case] input: &str, #[case] expected: PreallocStrategy) {
        assert_eq!(input.parse::<PreallocStrategy>(), Ok(expected));
    }

    #[rstest::rstest]
    #[case("3")]
    #[case("sparse")]
    #[case("")]
    fn test_parse_strategy_unknown(#[case] input: &str) {
        assert_eq!(
            input.parse::<PreallocStrategy>(),
            Err(UnknownStrategy(input.to_string()))
        );
    }

    #[test]
    fn test_display_round_trips_names() {
        for strategy in [
            PreallocStrategy::Fallocate,
            PreallocStrategy::FallocateZeroRange,
            PreallocStrategy::SingleWrite,
            PreallocStrategy::SmallWrites,
        ] {
            assert_eq!(strategy.to_string().parse::<PreallocStrategy>(), Ok(strategy));
        }
    }
}
