mod write_loop;

use std::fs::File;
use std::io::{Read, Seek};
use std::path::Path;

fn try_init_logging() {
    let _ = tracing_subscriber::fmt::try_init();
}

/// Set to make tests fail instead of skipping when io_uring is unavailable.
const REQUIRE_RING_ENV: &str = "PERFTEST_REQUIRE_URING";

/// Returns `false` and logs a warning if io_uring cannot be used here.
///
/// Panics instead when `PERFTEST_REQUIRE_URING` is set.
fn ring_available() -> bool {
    check_ring(
        crate::ring_supported(),
        std::env::var_os(REQUIRE_RING_ENV).is_some(),
    )
}

fn check_ring(supported: bool, required: bool) -> bool {
    if !supported {
        assert!(!required, "io_uring is unavailable but {REQUIRE_RING_ENV} is set");
        tracing::warn!("io_uring is unavailable, skipping test");
    }
    supported
}

#[rstest::rstest]
#[case::supported(true, false)]
#[case::supported_and_required(true, true)]
#[case::skipped(false, false)]
fn test_check_ring_skips_unless_required(#[case] supported: bool, #[case] required: bool) {
    assert_eq!(check_ring(supported, required), supported);
}

#[test]
#[should_panic(expected = "io_uring is unavailable")]
fn test_check_ring_required_panics() {
    check_ring(false, true);
}

/// Open a file in the temp directory without `O_DIRECT`.
fn open_buffered(path: &Path) -> File {
    crate::runner::open_target(path, false).expect("open test file")
}

fn cursor(file: &File) -> u64 {
    let mut file = file;
    file.stream_position().expect("read cursor")
}

fn read_all(path: &Path) -> Vec<u8> {
    let mut content = Vec::new();
    File::open(path)
        .and_then(|mut f| f.read_to_end(&mut content))
        .expect("read test file");
    content
}
