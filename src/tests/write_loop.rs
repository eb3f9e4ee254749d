use std::os::unix::fs::OpenOptionsExt;

use crate::ring::WRITE_FILL;
use crate::{BenchConfig, BenchError, PreallocStrategy, SubmitMode, preallocate, run_write_loop};

fn small_config(blocks: u32, depth: u32, mode: SubmitMode) -> BenchConfig {
    BenchConfig::builder()
        .with_block_size(512)
        .with_blocks(blocks)
        .with_queue_depth(depth)
        .with_direct_io(false)
        .with_submit_mode(mode)
}

#[rstest::rstest]
#[case::per_op_deep_queue(64, 128, SubmitMode::PerOperation)]
#[case::batched_deep_queue(64, 128, SubmitMode::Batched)]
#[case::per_op_shallow_queue(100, 4, SubmitMode::PerOperation)]
#[case::batched_shallow_queue(100, 4, SubmitMode::Batched)]
#[case::depth_one(10, 1, SubmitMode::PerOperation)]
#[case::single_block(1, 1, SubmitMode::Batched)]
fn test_write_loop_counts(
    #[case] blocks: u32,
    #[case] depth: u32,
    #[case] mode: SubmitMode,
) {
    super::try_init_logging();
    if !super::ring_available() {
        return;
    }

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("target");
    let file = super::open_buffered(&path);
    let config = small_config(blocks, depth, mode);

    preallocate(&file, 512, blocks, PreallocStrategy::SmallWrites).unwrap();
    let report = run_write_loop(&file, &config).expect("write loop should succeed");

    assert_eq!(report.submitted, blocks);
    assert_eq!(report.completed, blocks);
    assert_eq!(report.bytes_written, config.extent_len());
    assert!(report.peak_in_flight <= report.in_flight_limit);
    assert!(report.elapsed.wall >= std::time::Duration::ZERO);

    let content = super::read_all(&path);
    assert_eq!(content.len() as u64, config.extent_len());
    assert!(content.iter().all(|b| *b == WRITE_FILL));
}

#[rstest::rstest]
#[case::batched(SubmitMode::Batched)]
#[case::per_op(SubmitMode::PerOperation)]
fn test_write_loop_shallow_queue_applies_backpressure(#[case] mode: SubmitMode) {
    super::try_init_logging();
    if !super::ring_available() {
        return;
    }

    let dir = tempfile::tempdir().unwrap();
    let file = super::open_buffered(&dir.path().join("target"));
    let config = small_config(256, 2, mode);

    let report = run_write_loop(&file, &config).unwrap();
    assert_eq!(report.completed, 256);
    // Entries submitted by the waiting call are counted as well.
    assert_eq!(report.submitted, report.completed);
    assert!(report.in_flight_limit < 256);
    assert!(report.waits > 1, "loop should wait for completions mid-run");
}

#[test]
fn test_write_loop_extends_empty_file() {
    super::try_init_logging();
    if !super::ring_available() {
        return;
    }

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("target");
    let file = super::open_buffered(&path);
    let config = small_config(32, 64, SubmitMode::PerOperation);

    let report = run_write_loop(&file, &config).unwrap();
    assert_eq!(report.completed, 32);
    assert_eq!(file.metadata().unwrap().len(), 32 * 512);
}

#[test]
fn test_write_loop_reports_failed_writes() {
    super::try_init_logging();
    if !super::ring_available() {
        return;
    }

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("target");
    std::fs::write(&path, b"").unwrap();

    let file = std::fs::File::open(&path).unwrap();
    let config = small_config(16, 32, SubmitMode::Batched);

    let err = run_write_loop(&file, &config).expect_err("file is read only");
    match err {
        BenchError::WriteFailed { source, .. } => {
            assert_eq!(source.raw_os_error(), Some(libc::EBADF));
        },
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_write_loop_rejects_invalid_config() {
    let dir = tempfile::tempdir().unwrap();
    let file = super::open_buffered(&dir.path().join("target"));
    let config = small_config(0, 32, SubmitMode::Batched);

    let err = run_write_loop(&file, &config).expect_err("zero blocks is invalid");
    assert!(matches!(err, BenchError::Config(_)));
}

#[test]
fn test_write_loop_direct_io() {
    super::try_init_logging();
    if !super::ring_available() {
        return;
    }

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("target");
    let file = match std::fs::File::options()
        .read(true)
        .write(true)
        .create(true)
        .custom_flags(libc::O_DIRECT)
        .open(&path)
    {
        Ok(file) => file,
        Err(e) if e.raw_os_error() == Some(libc::EINVAL) => {
            tracing::warn!("temp filesystem rejects O_DIRECT, skipping");
            return;
        },
        Err(e) => panic!("cannot open file: {e}"),
    };

    // 4096 covers the logical block size of every common device.
    let config = BenchConfig::builder()
        .with_block_size(4096)
        .with_blocks(64)
        .with_queue_depth(32);

    preallocate(&file, 4096, 64, PreallocStrategy::SingleWrite).unwrap();
    let report = run_write_loop(&file, &config).expect("direct io write loop");
    assert_eq!(report.completed, 64);
    assert_eq!(report.bytes_written, 64 * 4096);
}
