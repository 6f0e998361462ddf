//! Collaborator contracts for regioned buffers
//!
//! A [`RegionedBuffer`](super::RegionedBuffer) never talks to a graphics API
//! directly. It reads two limits from a [`DeviceAllocator`] once, asks it for
//! one linear allocation, and drives that allocation through the
//! [`LinearDeviceBuffer`] trait for the rest of its life.

use serde::{Deserialize, Serialize};

use crate::constants::alignment::WGPU_COHERENCE_ATOM_SIZE;
use crate::error::{BufferError, BufferResult};
use crate::memory::persistent_buffer::BufferUsage;

/// The two device limits that drive layout computation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DeviceLimits {
    /// Granularity host/device synchronization ranges must be aligned to.
    /// 0 means the device imposes none.
    pub coherence_atom_size: u64,

    /// Granularity a sub-range handle's start offset must be aligned to.
    /// 0 means the device imposes none.
    pub offset_alignment: u64,
}

impl DeviceLimits {
    pub fn new(coherence_atom_size: u64, offset_alignment: u64) -> Self {
        Self {
            coherence_atom_size,
            offset_alignment,
        }
    }

    /// Derive limits from wgpu's reported limits for buffers bound as `usage`.
    ///
    /// wgpu has no non-coherent atom; ranges we upload or read back must
    /// respect `MAP_ALIGNMENT`, which is a multiple of `COPY_BUFFER_ALIGNMENT`.
    pub fn from_wgpu(limits: &wgpu::Limits, usage: BufferUsage) -> Self {
        let offset_alignment = match usage {
            BufferUsage::Uniform => limits.min_uniform_buffer_offset_alignment,
            BufferUsage::Storage => limits.min_storage_buffer_offset_alignment,
        };
        Self {
            coherence_atom_size: WGPU_COHERENCE_ATOM_SIZE,
            offset_alignment: offset_alignment as u64,
        }
    }
}

/// An `(offset, size)` descriptor of a sub-range of a linear buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OpaqueRange {
    pub offset: u64,
    pub size: u64,
}

impl OpaqueRange {
    pub fn new(offset: u64, size: u64) -> Self {
        Self { offset, size }
    }

    /// One past the last byte of the range
    pub fn end(&self) -> u64 {
        self.offset + self.size
    }

    /// The offset as a bind group dynamic offset
    pub fn dynamic_offset(&self) -> BufferResult<u32> {
        u32::try_from(self.offset).map_err(|_| BufferError::DynamicOffsetOverflow(self.offset))
    }
}

/// Raw mapped memory with byte-range synchronization
///
/// Offsets and sizes are in bytes. Implementations must reject ranges that
/// escape the allocation rather than clamp them.
pub trait LinearDeviceBuffer {
    /// Consumer-facing reference to a sub-range
    type Handle;

    /// Total size of the allocation in bytes
    fn size(&self) -> u64;

    /// Make the memory host-accessible. Idempotent.
    fn map(&mut self) -> BufferResult<()>;

    fn unmap(&mut self);

    fn is_mapped(&self) -> bool;

    /// Host view of the whole allocation, `None` while unmapped
    fn mapped(&self) -> Option<&[u8]>;

    fn mapped_mut(&mut self) -> Option<&mut [u8]>;

    /// Copy `bytes` into mapped memory at `offset`
    fn write_bytes(&mut self, bytes: &[u8], offset: u64) -> BufferResult<()>;

    /// Make host writes in `[offset, offset + size)` visible to the device
    fn flush(&mut self, size: u64, offset: u64) -> BufferResult<()>;

    /// Make device writes in `[offset, offset + size)` visible to the host
    fn invalidate(&mut self, size: u64, offset: u64) -> BufferResult<()>;

    fn descriptor_handle(&self, size: u64, offset: u64) -> BufferResult<Self::Handle>;
}

/// The device side: reports limits and hands out linear allocations
pub trait DeviceAllocator {
    type Buffer: LinearDeviceBuffer;

    fn limits(&self, usage: BufferUsage) -> DeviceLimits;

    fn allocate(
        &self,
        size: u64,
        label: Option<&str>,
        usage: BufferUsage,
    ) -> BufferResult<Self::Buffer>;
}

/// Shared bounds check for byte ranges against an allocation of `capacity` bytes
pub(crate) fn check_byte_range(offset: u64, size: u64, capacity: u64) -> BufferResult<()> {
    match offset.checked_add(size) {
        Some(end) if end <= capacity => Ok(()),
        _ => Err(BufferError::ByteRangeOutOfBounds {
            offset,
            size,
            capacity,
        }),
    }
}
