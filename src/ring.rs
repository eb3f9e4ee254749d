use std::fs::File;
use std::io;
use std::os::fd::AsRawFd;

use io_uring::{CompletionQueue, IoUring, SubmissionQueue, Submitter, opcode, types};

use crate::buffer::AlignedBuffer;
use crate::config::{BenchConfig, SubmitMode};
use crate::error::{BenchError, BenchResult};
use crate::timing::{Elapsed, Stopwatch};

/// The byte written by every operation of the timed loop.
pub const WRITE_FILL: u8 = b'd';
/// The largest number of submission entries the kernel accepts for one ring.
pub const MAX_RING_ENTRIES: u32 = 32_768;

/// Returns if an io_uring instance can be created in the current process.
///
/// Seccomp profiles in containers commonly reject `io_uring_setup(2)`.
pub fn ring_supported() -> bool {
    match IoUring::new(2) {
        Ok(_) => true,
        Err(e) => {
            tracing::warn!(error = %e, "io_uring is not available");
            false
        },
    }
}

#[derive(Debug, Clone)]
/// What the timed write loop did.
pub struct WriteLoopReport {
    /// The number of writes accepted by the kernel.
    pub submitted: u32,
    /// The number of completion events observed.
    pub completed: u32,
    pub bytes_written: u64,
    /// The number of submission entries the ring was created with.
    pub ring_entries: u32,
    /// The maximum number of writes allowed in flight at once.
    pub in_flight_limit: usize,
    /// The highest number of writes that were in flight at once.
    pub peak_in_flight: usize,
    /// The number of times the loop blocked waiting for completions.
    pub waits: u64,
    /// Time spent between the first submission and the last completion.
    pub elapsed: Elapsed,
}

/// Write `config.blocks()` blocks to `file` through a fresh io_uring instance
/// and time the submission and completion phase.
///
/// Every write targets a distinct offset `i * block_size` and shares one
/// read-only buffer. The call returns once every submitted write has completed.
pub fn run_write_loop(file: &File, config: &BenchConfig) -> BenchResult<WriteLoopReport> {
    config.validate()?;

    let mut ring = WriteRing::new(config.queue_depth())?;
    let buffer = AlignedBuffer::new(
        config.block_size() as usize,
        config.block_size() as usize,
        WRITE_FILL,
    )?;

    tracing::debug!(
        ring_entries = ring.entries(),
        blocks = config.blocks(),
        submit_mode = ?config.submit_mode(),
        "writing"
    );

    let outcome = ring.write_blocks(file, &buffer, config);

    if outcome.outstanding > 0 {
        // The kernel may still read from the buffer, it must outlive the ring.
        tracing::error!(
            outstanding = outcome.outstanding,
            "ring shut down with writes in flight, leaking write buffer"
        );
        drop(ring);
        std::mem::forget(buffer);
    }

    outcome.result
}

/// An io_uring instance used for a single write loop.
pub struct WriteRing {
    ring: IoUring,
    entries: u32,
}

impl WriteRing {
    /// Create a ring sized for `depth` in-flight operations.
    ///
    /// Depths above [MAX_RING_ENTRIES] are clamped.
    pub fn new(depth: u32) -> BenchResult<Self> {
        let entries = depth.clamp(1, MAX_RING_ENTRIES);
        if entries != depth {
            tracing::warn!(
                requested = depth,
                entries,
                "queue depth clamped to the kernel ring limit"
            );
        }

        let ring = IoUring::builder()
            .build(entries)
            .map_err(|source| BenchError::RingSetup { depth, source })?;

        let entries = ring.params().sq_entries();
        Ok(Self { ring, entries })
    }

    /// The number of submission entries the kernel allocated.
    pub fn entries(&self) -> u32 {
        self.entries
    }

    fn write_blocks(
        &mut self,
        file: &File,
        buffer: &AlignedBuffer,
        config: &BenchConfig,
    ) -> LoopOutcome {
        let (submitter, sq, cq) = self.ring.split();
        let in_flight_limit = cq.capacity().min(config.blocks() as usize).max(1);

        let mut runner = WriteRunner {
            submitter,
            sq,
            cq,
            target: types::Fd(file.as_raw_fd()),
            buf_ptr: buffer.as_ptr(),
            block_size: config.block_size(),
            blocks: config.blocks(),
            mode: config.submit_mode(),
            in_flight_limit,
            state: TrackedWrites::with_capacity(in_flight_limit, config.block_size()),
        };

        let watch = Stopwatch::start();
        let result = runner.run();
        let elapsed = watch.stop();

        let drained = runner.wait_for_remaining();
        let outstanding = runner.state.in_flight();

        let result = result.and(drained).and_then(|_| runner.state.take_error());
        let result = result.map(|_| {
            let state = &runner.state;
            WriteLoopReport {
                submitted: state.submitted,
                completed: state.completed,
                bytes_written: state.bytes_written,
                ring_entries: self.entries,
                in_flight_limit,
                peak_in_flight: state.peak_in_flight,
                waits: state.waits,
                elapsed,
            }
        });

        if let Ok(report) = &result {
            tracing::info!(
                submitted = report.submitted,
                completed = report.completed,
                clocks = report.elapsed.clocks(),
                millis = report.elapsed.wall_millis(),
                "write loop done"
            );
        }

        LoopOutcome {
            result,
            outstanding,
        }
    }
}

struct LoopOutcome {
    result: BenchResult<WriteLoopReport>,
    outstanding: usize,
}

struct WriteRunner<'ring> {
    submitter: Submitter<'ring>,
    sq: SubmissionQueue<'ring>,
    cq: CompletionQueue<'ring>,
    target: types::Fd,
    buf_ptr: *const u8,
    block_size: u32,
    blocks: u32,
    mode: SubmitMode,
    in_flight_limit: usize,
    state: TrackedWrites,
}

impl<'ring> WriteRunner<'ring> {
    /// Submit every block, waiting for completions whenever the
    /// in-flight limit is reached, then wait for the final completions.
    fn run(&mut self) -> BenchResult<()> {
        while self.state.next_index < self.blocks && !self.state.has_error() {
            if self.state.in_flight() >= self.in_flight_limit {
                self.flush()?;
                self.wait_for(1)?;
                continue;
            }

            if self.sq.is_full() {
                self.flush()?;
            }

            self.push_next();

            if self.mode == SubmitMode::PerOperation {
                self.flush()?;
            }
        }

        self.wait_for_remaining()
    }

    /// Wait for every write still in flight, used on both the success and error path.
    fn wait_for_remaining(&mut self) -> BenchResult<()> {
        if self.state.in_flight() == 0 {
            return Ok(());
        }

        self.flush()?;
        while self.state.in_flight() > 0 {
            let want = self.state.in_flight();
            self.wait_for(want)?;
        }
        Ok(())
    }

    fn push_next(&mut self) {
        let index = self.state.next_index;
        let offset = crate::block_offset(self.block_size, index);
        let key = self.state.register(index, offset);

        let entry = opcode::Write::new(self.target, self.buf_ptr, self.block_size)
            .offset(offset)
            .build()
            .user_data(key);

        #[cfg(feature = "trace-hotpath")]
        tracing::trace!(index, offset, slot = key, "push write");

        // SAFETY: The buffer outlives every in-flight write, `run_write_loop`
        //         does not release it until all completions are observed.
        if unsafe { self.sq.push(&entry).is_err() } {
            // The kernel has not consumed the queue yet, the next pass flushes
            // and retries the same index.
            self.state.release(key);
            return;
        }

        self.state.next_index += 1;
    }

    /// Hand every queued entry to the kernel.
    fn flush(&mut self) -> BenchResult<()> {
        self.sq.sync();
        if self.sq.is_empty() {
            return Ok(());
        }

        loop {
            match self.submitter.submit() {
                Ok(n) => {
                    self.state.submitted += n as u32;
                    break;
                },
                Err(ref err) if err.raw_os_error() == Some(libc::EINTR) => continue,
                Err(ref err) if err.raw_os_error() == Some(libc::EBUSY) => {
                    // The completion queue is backed up, make room and retry.
                    self.drain_completions()?;
                    continue;
                },
                Err(err) => return Err(BenchError::Submit(err)),
            }
        }

        self.sq.sync();
        Ok(())
    }

    /// Block until at least `want` completions are ready and reap them.
    fn wait_for(&mut self, want: usize) -> BenchResult<()> {
        #[cfg(feature = "trace-hotpath")]
        tracing::trace!(want, in_flight = self.state.in_flight(), "waiting for completions");

        self.state.waits += 1;
        loop {
            match self.submitter.submit_and_wait(want) {
                Ok(n) => {
                    // Anything a partial flush left queued goes in with this call.
                    self.state.submitted += n as u32;
                    break;
                },
                Err(ref err)
                    if matches!(err.raw_os_error(), Some(libc::EINTR) | Some(libc::EBUSY)) =>
                {
                    // Completions may already be waiting, reap them before blocking again.
                    if self.drain_completions()? > 0 {
                        return Ok(());
                    }
                },
                Err(err) => return Err(BenchError::Wait(err)),
            }
        }

        self.drain_completions()?;
        Ok(())
    }

    fn drain_completions(&mut self) -> BenchResult<usize> {
        self.cq.sync();

        let mut reaped = 0;
        for completion in &mut self.cq {
            self.state
                .acknowledge(completion.user_data(), completion.result())?;
            reaped += 1;
        }

        self.cq.sync();
        Ok(reaped)
    }
}

#[derive(Debug, Copy, Clone)]
/// The in-flight descriptor of a single write.
struct WriteSlot {
    index: u32,
    offset: u64,
}

/// Tracks every in-flight write and the totals of the loop.
///
/// Slots are recycled by the slab once their completion is observed, the
/// slab key is the `user_data` carried by the submission and completion.
struct TrackedWrites {
    slots: slab::Slab<WriteSlot>,
    block_size: u32,
    next_index: u32,
    submitted: u32,
    completed: u32,
    bytes_written: u64,
    peak_in_flight: usize,
    waits: u64,
    first_error: Option<BenchError>,
}

impl TrackedWrites {
    fn with_capacity(capacity: usize, block_size: u32) -> Self {
        Self {
            slots: slab::Slab::with_capacity(capacity),
            block_size,
            next_index: 0,
            submitted: 0,
            completed: 0,
            bytes_written: 0,
            peak_in_flight: 0,
            waits: 0,
            first_error: None,
        }
    }

    fn in_flight(&self) -> usize {
        self.slots.len()
    }

    fn has_error(&self) -> bool {
        self.first_error.is_some()
    }

    fn take_error(&mut self) -> BenchResult<()> {
        match self.first_error.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn register(&mut self, index: u32, offset: u64) -> u64 {
        let key = self.slots.insert(WriteSlot { index, offset });
        self.peak_in_flight = self.peak_in_flight.max(self.slots.len());
        key as u64
    }

    fn release(&mut self, key: u64) {
        drop(self.slots.try_remove(key as usize));
    }

    /// Record the completion of the write tied to `key`.
    ///
    /// A failed or short write is remembered and stops further submissions,
    /// an unknown key is returned as an error immediately.
    fn acknowledge(&mut self, key: u64, result: i32) -> BenchResult<()> {
        let Some(slot) = self.slots.try_remove(key as usize) else {
            return Err(BenchError::UnknownCompletion(key));
        };

        self.completed += 1;

        #[cfg(feature = "trace-hotpath")]
        tracing::trace!(index = slot.index, offset = slot.offset, result, "completion");

        if result < 0 {
            let source = io::Error::from_raw_os_error(-result);
            tracing::warn!(
                index = slot.index,
                offset = slot.offset,
                error = %source,
                "write failed"
            );
            self.first_error.get_or_insert(BenchError::WriteFailed {
                offset: slot.offset,
                source,
            });
        } else if (result as u32) < self.block_size {
            self.bytes_written += result as u64;
            self.first_error.get_or_insert(BenchError::ShortCompletion {
                offset: slot.offset,
                written: result as u32,
                expected: self.block_size,
            });
        } else {
            self.bytes_written += result as u64;
        }

        Ok(())
    }
}
