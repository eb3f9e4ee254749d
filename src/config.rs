/// The smallest block size accepted for direct IO.
pub const MIN_BLOCK_SIZE: u32 = 512;
/// The number of blocks written by each test iteration by default.
pub const DEFAULT_BLOCKS: u32 = 10_000;
/// The queue depth requested from the ring by default.
pub const DEFAULT_QUEUE_DEPTH: u32 = 20_000;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
/// How writes are handed to the kernel during the timed loop.
pub enum SubmitMode {
    #[default]
    /// Every write is submitted to the kernel on its own.
    PerOperation,
    /// Writes are queued until the submission queue is full and then submitted together.
    Batched,
}

#[derive(Debug, thiserror::Error, Eq, PartialEq)]
/// A configuration value that cannot be used for a benchmark run.
pub enum ConfigError {
    #[error("block size {0} must be a power of two of at least 512 bytes")]
    BlockSize(u32),
    #[error("block count must be at least 1")]
    ZeroBlocks,
    #[error("queue depth must be at least 1")]
    ZeroQueueDepth,
    #[error("{blocks} blocks of {block_size} bytes overflow the file offset range")]
    ExtentOverflow { block_size: u32, blocks: u32 },
}

#[derive(Debug, Clone, Eq, PartialEq)]
/// The knobs of a benchmark iteration.
///
/// ## Example
///
/// ```rust
/// use perftest::{BenchConfig, SubmitMode};
///
/// let config = BenchConfig::builder()
///     .with_block_size(4096)
///     .with_blocks(64)
///     .with_queue_depth(16)
///     .with_submit_mode(SubmitMode::Batched);
///
/// assert!(config.validate().is_ok());
/// assert_eq!(config.extent_len(), 64 * 4096);
/// ```
pub struct BenchConfig {
    block_size: u32,
    blocks: u32,
    queue_depth: u32,
    direct_io: bool,
    submit_mode: SubmitMode,
    keep_going: bool,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self::const_default()
    }
}

impl BenchConfig {
    pub(crate) const fn const_default() -> Self {
        Self {
            block_size: MIN_BLOCK_SIZE,
            blocks: DEFAULT_BLOCKS,
            queue_depth: DEFAULT_QUEUE_DEPTH,
            direct_io: true,
            submit_mode: SubmitMode::PerOperation,
            keep_going: false,
        }
    }

    /// Start from the default configuration.
    pub const fn builder() -> Self {
        Self::const_default()
    }

    /// Set the size of every write in bytes.
    ///
    /// This is also the alignment of every buffer used for direct IO.
    ///
    /// By default, this is `512`.
    pub const fn with_block_size(mut self, block_size: u32) -> Self {
        self.block_size = block_size;
        self
    }

    /// Set the number of writes issued by the timed loop.
    ///
    /// By default, this is `10000`.
    pub const fn with_blocks(mut self, blocks: u32) -> Self {
        self.blocks = blocks;
        self
    }

    /// Set the queue depth requested when creating the ring.
    ///
    /// The kernel rounds this up to a power of 2 and the ring clamps it
    /// to the kernel maximum. The number of in-flight writes never exceeds
    /// the resulting ring capacity.
    ///
    /// By default, this is `20000`.
    pub const fn with_queue_depth(mut self, depth: u32) -> Self {
        self.queue_depth = depth;
        self
    }

    /// Enable/disable opening the files with `O_DIRECT`.
    ///
    /// By default, this is `enabled`.
    pub const fn with_direct_io(mut self, enable: bool) -> Self {
        self.direct_io = enable;
        self
    }

    /// Set how writes are submitted to the kernel.
    ///
    /// By default, this is [SubmitMode::PerOperation].
    pub const fn with_submit_mode(mut self, mode: SubmitMode) -> Self {
        self.submit_mode = mode;
        self
    }

    /// Continue with the remaining iterations after one fails.
    ///
    /// By default, this is `disabled` and the first failure aborts the run.
    pub const fn with_keep_going(mut self, enable: bool) -> Self {
        self.keep_going = enable;
        self
    }

    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    pub fn blocks(&self) -> u32 {
        self.blocks
    }

    pub fn queue_depth(&self) -> u32 {
        self.queue_depth
    }

    pub fn direct_io(&self) -> bool {
        self.direct_io
    }

    pub fn submit_mode(&self) -> SubmitMode {
        self.submit_mode
    }

    pub fn keep_going(&self) -> bool {
        self.keep_going
    }

    /// The number of bytes covered by `blocks` writes of `block_size`.
    pub fn extent_len(&self) -> u64 {
        self.block_size as u64 * self.blocks as u64
    }

    /// Check the configuration can drive a direct IO run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.block_size < MIN_BLOCK_SIZE || !self.block_size.is_power_of_two() {
            return Err(ConfigError::BlockSize(self.block_size));
        }

        if self.blocks == 0 {
            return Err(ConfigError::ZeroBlocks);
        }

        if self.queue_depth == 0 {
            return Err(ConfigError::ZeroQueueDepth);
        }

        if self.extent_len() > i64::MAX as u64 {
            return Err(ConfigError::ExtentOverflow {
                block_size: self.block_size,
                blocks: self.blocks,
            });
        }

        Ok(())
    }
}
