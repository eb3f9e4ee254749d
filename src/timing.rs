use std::time::{Duration, Instant};

/// `clock(3)` ticks per second, which POSIX fixes at one million.
pub const CLOCKS_PER_SEC: u64 = 1_000_000;

#[derive(Debug, Copy, Clone)]
/// A paired wall-clock and process CPU-clock timestamp.
pub struct Stopwatch {
    wall: Instant,
    cpu: Duration,
}

impl Stopwatch {
    /// Capture both clocks now.
    pub fn start() -> Self {
        Self {
            wall: Instant::now(),
            cpu: process_cpu_time(),
        }
    }

    /// Capture both clocks again and return the deltas since [Stopwatch::start].
    pub fn stop(&self) -> Elapsed {
        let cpu = process_cpu_time();
        let wall = self.wall.elapsed();
        Elapsed {
            wall,
            cpu: cpu.saturating_sub(self.cpu),
        }
    }
}

#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
/// Wall and CPU time spent between two [Stopwatch] readings.
pub struct Elapsed {
    pub wall: Duration,
    pub cpu: Duration,
}

impl Elapsed {
    /// The CPU time expressed in `clock(3)` ticks.
    pub fn clocks(&self) -> u64 {
        let micros = self.cpu.as_micros() as u64;
        micros * CLOCKS_PER_SEC / 1_000_000
    }

    pub fn wall_millis(&self) -> u64 {
        self.wall.as_millis() as u64
    }
}

/// The CPU time consumed by the whole process so far.
///
/// Falls back to zero if the clock is unavailable, which makes every
/// CPU delta zero rather than failing the run.
pub fn process_cpu_time() -> Duration {
    let mut ts = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };

    // SAFETY: `ts` is a valid, writable timespec.
    let result = unsafe { libc::clock_gettime(libc::CLOCK_PROCESS_CPUTIME_ID, &raw mut ts) };
    if result < 0 {
        tracing::warn!(
            error = %std::io::Error::last_os_error(),
            "cannot read process cpu clock"
        );
        return Duration::ZERO;
    }

    Duration::new(ts.tv_sec as u64, ts.tv_nsec as u32)
}
