//! In-memory device buffer
//!
//! Keeps separate host and device copies of every byte so the visibility
//! rules of non-coherent memory are observable without a GPU: host writes
//! reach the device copy only through `flush`, device writes reach the host
//! copy only through `invalidate`. Synchronization and handle ranges are
//! validated against the configured limits the way a strict driver would.

use crate::constants::alignment::{TYPICAL_COHERENCE_ATOM_SIZE, UNIFORM_BUFFER_ALIGNMENT};
use crate::error::{BufferError, BufferResult};
use crate::memory::alignment::is_aligned;
use crate::memory::device::{check_byte_range, DeviceAllocator, DeviceLimits, LinearDeviceBuffer, OpaqueRange};
use crate::memory::persistent_buffer::BufferUsage;

/// A synchronization call recorded by [`HostBuffer`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOp {
    Flush(OpaqueRange),
    Invalidate(OpaqueRange),
}

/// Device that allocates [`HostBuffer`]s with fixed limits
#[derive(Debug, Clone, Copy)]
pub struct HostDevice {
    limits: DeviceLimits,
}

impl HostDevice {
    pub fn new(limits: DeviceLimits) -> Self {
        Self { limits }
    }
}

impl Default for HostDevice {
    /// Limits of a typical discrete Vulkan device
    fn default() -> Self {
        Self::new(DeviceLimits::new(TYPICAL_COHERENCE_ATOM_SIZE, UNIFORM_BUFFER_ALIGNMENT))
    }
}

impl DeviceAllocator for HostDevice {
    type Buffer = HostBuffer;

    fn limits(&self, _usage: BufferUsage) -> DeviceLimits {
        self.limits
    }

    fn allocate(
        &self,
        size: u64,
        label: Option<&str>,
        _usage: BufferUsage,
    ) -> BufferResult<HostBuffer> {
        let len = usize::try_from(size).map_err(|_| BufferError::SizeOverflow)?;
        log::debug!(
            "[HostDevice] Allocating '{}' ({} bytes)",
            label.unwrap_or("unnamed"),
            size
        );
        Ok(HostBuffer::new(len, self.limits))
    }
}

/// Linear buffer backed by two byte vectors
#[derive(Debug)]
pub struct HostBuffer {
    host: Vec<u8>,
    device: Vec<u8>,
    limits: DeviceLimits,
    mapped: bool,
    sync_log: Vec<SyncOp>,
}

impl HostBuffer {
    pub fn new(size: usize, limits: DeviceLimits) -> Self {
        Self {
            host: vec![0; size],
            device: vec![0; size],
            limits,
            mapped: false,
            sync_log: Vec::new(),
        }
    }

    /// Bytes as the device currently sees them
    pub fn device_bytes(&self) -> &[u8] {
        &self.device
    }

    /// Simulate the device writing into its copy
    pub fn device_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.device
    }

    /// Every flush/invalidate issued so far, oldest first
    pub fn sync_log(&self) -> &[SyncOp] {
        &self.sync_log
    }

    pub fn clear_sync_log(&mut self) {
        self.sync_log.clear();
    }

    fn capacity(&self) -> u64 {
        self.host.len() as u64
    }

    /// Validate a synchronization range the way Vulkan validates mapped
    /// memory ranges: the offset must sit on an atom boundary and the size
    /// must be a whole number of atoms unless the range runs to the end.
    fn check_sync_range(&self, operation: &'static str, size: u64, offset: u64) -> BufferResult<()> {
        check_byte_range(offset, size, self.capacity())?;
        let atom = self.limits.coherence_atom_size;
        let reaches_end = offset + size == self.capacity();
        if !is_aligned(offset, atom) || !(is_aligned(size, atom) || reaches_end) {
            return Err(BufferError::MisalignedRange {
                operation,
                offset,
                size,
                alignment: atom,
            });
        }
        Ok(())
    }

    fn range(size: u64, offset: u64) -> std::ops::Range<usize> {
        offset as usize..(offset + size) as usize
    }
}

impl LinearDeviceBuffer for HostBuffer {
    type Handle = OpaqueRange;

    fn size(&self) -> u64 {
        self.capacity()
    }

    fn map(&mut self) -> BufferResult<()> {
        self.mapped = true;
        Ok(())
    }

    fn unmap(&mut self) {
        self.mapped = false;
    }

    fn is_mapped(&self) -> bool {
        self.mapped
    }

    fn mapped(&self) -> Option<&[u8]> {
        self.mapped.then_some(self.host.as_slice())
    }

    fn mapped_mut(&mut self) -> Option<&mut [u8]> {
        if self.mapped {
            Some(self.host.as_mut_slice())
        } else {
            None
        }
    }

    fn write_bytes(&mut self, bytes: &[u8], offset: u64) -> BufferResult<()> {
        let size = bytes.len() as u64;
        check_byte_range(offset, size, self.capacity())?;
        let mapped = self.mapped_mut().ok_or(BufferError::NotMapped)?;
        mapped[Self::range(size, offset)].copy_from_slice(bytes);
        Ok(())
    }

    fn flush(&mut self, size: u64, offset: u64) -> BufferResult<()> {
        self.check_sync_range("flush", size, offset)?;
        let range = Self::range(size, offset);
        self.device[range.clone()].copy_from_slice(&self.host[range]);
        self.sync_log.push(SyncOp::Flush(OpaqueRange::new(offset, size)));
        log::trace!("[HostBuffer] Flushed {} bytes at {}", size, offset);
        Ok(())
    }

    fn invalidate(&mut self, size: u64, offset: u64) -> BufferResult<()> {
        self.check_sync_range("invalidate", size, offset)?;
        let range = Self::range(size, offset);
        self.host[range.clone()].copy_from_slice(&self.device[range]);
        self.sync_log.push(SyncOp::Invalidate(OpaqueRange::new(offset, size)));
        log::trace!("[HostBuffer] Invalidated {} bytes at {}", size, offset);
        Ok(())
    }

    fn descriptor_handle(&self, size: u64, offset: u64) -> BufferResult<OpaqueRange> {
        check_byte_range(offset, size, self.capacity())?;
        let alignment = self.limits.offset_alignment;
        if !is_aligned(offset, alignment) {
            return Err(BufferError::MisalignedRange {
                operation: "descriptor_handle",
                offset,
                size,
                alignment,
            });
        }
        Ok(OpaqueRange::new(offset, size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer() -> HostBuffer {
        let mut buffer = HostBuffer::new(256, DeviceLimits::new(64, 128));
        buffer.map().expect("host map never fails");
        buffer
    }

    #[test]
    fn test_writes_need_flush_to_reach_device() {
        let mut buffer = buffer();
        buffer.write_bytes(&[1, 2, 3, 4], 64).expect("in range");

        assert_eq!(&buffer.mapped().expect("mapped")[64..68], &[1, 2, 3, 4]);
        assert_eq!(&buffer.device_bytes()[64..68], &[0, 0, 0, 0]);

        buffer.flush(64, 64).expect("aligned flush");
        assert_eq!(&buffer.device_bytes()[64..68], &[1, 2, 3, 4]);
        assert_eq!(buffer.sync_log(), &[SyncOp::Flush(OpaqueRange::new(64, 64))]);
    }

    #[test]
    fn test_invalidate_pulls_device_writes() {
        let mut buffer = buffer();
        buffer.device_bytes_mut()[130] = 9;
        assert_eq!(buffer.mapped().expect("mapped")[130], 0);

        buffer.invalidate(64, 128).expect("aligned invalidate");
        assert_eq!(buffer.mapped().expect("mapped")[130], 9);
    }

    #[test]
    fn test_sync_ranges_must_respect_atom() {
        let mut buffer = buffer();
        assert!(matches!(
            buffer.flush(64, 32),
            Err(BufferError::MisalignedRange { alignment: 64, .. })
        ));
        assert!(matches!(
            buffer.invalidate(48, 0),
            Err(BufferError::MisalignedRange { .. })
        ));
        assert!(matches!(
            buffer.flush(128, 192),
            Err(BufferError::ByteRangeOutOfBounds { .. })
        ));
        // A tail range may end on the allocation boundary instead of an atom.
        let mut odd = HostBuffer::new(100, DeviceLimits::new(64, 0));
        odd.map().expect("host map never fails");
        assert!(odd.flush(36, 64).is_ok());
    }

    #[test]
    fn test_handles_must_respect_offset_alignment() {
        let buffer = buffer();
        assert_eq!(buffer.descriptor_handle(64, 128).ok(), Some(OpaqueRange::new(128, 64)));
        assert!(matches!(
            buffer.descriptor_handle(64, 64),
            Err(BufferError::MisalignedRange { alignment: 128, .. })
        ));
    }

    #[test]
    fn test_default_device_limits() {
        let device = HostDevice::default();
        assert_eq!(device.limits(BufferUsage::Uniform), DeviceLimits::new(64, 256));
        let buffer = device
            .allocate(512, Some("default"), BufferUsage::Storage)
            .expect("host allocation");
        assert_eq!(buffer.size(), 512);
        assert!(!buffer.is_mapped());
    }

    #[test]
    fn test_unmapped_access_is_rejected() {
        let mut buffer = buffer();
        buffer.unmap();
        assert!(buffer.mapped().is_none());
        assert!(matches!(buffer.write_bytes(&[1], 0), Err(BufferError::NotMapped)));
    }
}
