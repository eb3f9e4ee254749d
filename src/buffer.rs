//! Aligned, exclusively owned byte buffers for direct IO.
//!
//! `O_DIRECT` requires the memory address, the length and the file offset of
//! every transfer to be aligned to the logical block size of the device, so
//! the buffers cannot come from a plain `Vec<u8>`.

use std::alloc::{Layout, alloc, dealloc};
use std::fmt::{Debug, Formatter};
use std::ptr::NonNull;

use crate::error::{BenchError, BenchResult};

/// A heap buffer aligned to a fixed boundary with every byte set to a fill value.
///
/// The memory is released when the buffer is dropped.
pub struct AlignedBuffer {
    ptr: NonNull<u8>,
    layout: Layout,
}

impl AlignedBuffer {
    /// Allocate `size` bytes aligned to `align`, with every byte set to `fill`.
    ///
    /// `align` must be a power of two and `size` a non-zero multiple of it.
    pub fn new(align: usize, size: usize, fill: u8) -> BenchResult<Self> {
        tracing::debug!(align, size, fill = %fill.escape_ascii(), "allocating buffer");

        if size == 0 || !align.is_power_of_two() || size % align != 0 {
            return Err(BenchError::Alloc { align, size });
        }

        let layout = Layout::from_size_align(size, align)
            .map_err(|_| BenchError::Alloc { align, size })?;

        // SAFETY: The layout has a non-zero size which was checked above.
        let ptr = unsafe { alloc(layout) };
        let Some(ptr) = NonNull::new(ptr) else {
            return Err(BenchError::Alloc { align, size });
        };

        // SAFETY: The allocation is `size` bytes long and exclusively owned by us.
        unsafe { ptr.as_ptr().write_bytes(fill, size) };

        Ok(Self { ptr, layout })
    }

    /// The length of the buffer in bytes.
    pub fn len(&self) -> usize {
        self.layout.size()
    }

    /// Always `false`, zero sized buffers are rejected on creation.
    pub fn is_empty(&self) -> bool {
        self.layout.size() == 0
    }

    /// The alignment the buffer was allocated with.
    pub fn alignment(&self) -> usize {
        self.layout.align()
    }

    /// A raw pointer to the start of the buffer.
    ///
    /// The pointer stays valid for as long as `self` is alive.
    pub fn as_ptr(&self) -> *const u8 {
        self.ptr.as_ptr()
    }

    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: The pointer is valid for `len` initialised bytes until drop.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len()) }
    }
}

impl Debug for AlignedBuffer {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "AlignedBuffer(len={}, align={})",
            self.len(),
            self.alignment()
        )
    }
}

impl Drop for AlignedBuffer {
    fn drop(&mut self) {
        // SAFETY: `ptr` was allocated with exactly this layout in `new`.
        unsafe { dealloc(self.ptr.as_ptr(), self.layout) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[rstest::rstest]
    #[case(512, 512, b'd')]
    #[case(512, 512 * 10, b'a')]
    #[case(4096, 4096, 0)]
    #[case(4096, 4096 * 3, 0xFF)]
    fn test_alloc_aligned_and_filled(
        #[case] align: usize,
        #[case] size: usize,
        #[case] fill: u8,
    ) {
        let buffer = AlignedBuffer::new(align, size, fill).expect("allocate buffer");
        assert_eq!(buffer.len(), size);
        assert_eq!(buffer.alignment(), align);
        assert_eq!(buffer.as_ptr() as usize % align, 0);
        assert!(buffer.as_slice().iter().all(|b| *b == fill));
    }

    #[rstest::rstest]
    #[case::zero_size(512, 0)]
    #[case::not_pow2_align(500, 1000)]
    #[case::size_not_multiple(512, 700)]
    fn test_alloc_rejects_bad_layout(#[case] align: usize, #[case] size: usize) {
        let err = AlignedBuffer::new(align, size, 0).expect_err("layout should be rejected");
        assert!(matches!(err, BenchError::Alloc { .. }), "unexpected error: {err}");
    }
}
