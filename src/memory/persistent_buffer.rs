/// Persistent Mapped Buffer Implementation
///
/// wgpu buffers cannot stay mapped while the GPU uses them, so the
/// "mapping" here is a host shadow that lives as long as the buffer.
/// Flushing uploads a shadow range through the queue; invalidating copies a
/// device range into a staging buffer, maps it and pulls it into the shadow.

use std::sync::Arc;

use crate::error::{BufferError, BufferResult};
use crate::memory::alignment::is_aligned;
use crate::memory::device::{check_byte_range, DeviceAllocator, DeviceLimits, LinearDeviceBuffer, OpaqueRange};
use crate::memory::error::device_error;

/// Buffer usage patterns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BufferUsage {
    /// Uniform data updated per frame
    #[default]
    Uniform,
    /// Storage data read by shaders
    Storage,
}

impl BufferUsage {
    pub fn to_wgpu_usage(&self) -> wgpu::BufferUsages {
        let base = match self {
            BufferUsage::Uniform => wgpu::BufferUsages::UNIFORM,
            BufferUsage::Storage => wgpu::BufferUsages::STORAGE,
        };
        base | wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::COPY_SRC
    }

    fn binding_type(&self) -> wgpu::BufferBindingType {
        match self {
            BufferUsage::Uniform => wgpu::BufferBindingType::Uniform,
            BufferUsage::Storage => wgpu::BufferBindingType::Storage { read_only: true },
        }
    }
}

/// Bind group layout entry for a region or element handle of `usage`.
///
/// With `dynamic` set, one bind group can address every region (or every
/// element) by passing [`OpaqueRange::dynamic_offset`] at bind time.
pub fn buffer_entry(
    binding: u32,
    visibility: wgpu::ShaderStages,
    usage: BufferUsage,
    dynamic: bool,
    min_binding_size: u64,
) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: usage.binding_type(),
            has_dynamic_offset: dynamic,
            min_binding_size: wgpu::BufferSize::new(min_binding_size),
        },
        count: None,
    }
}

/// A handle to a sub-range of a [`PersistentBuffer`]
#[derive(Debug, Clone)]
pub struct BufferSliceHandle {
    pub buffer: Arc<wgpu::Buffer>,
    pub offset: u64,
    pub size: u64,
}

impl BufferSliceHandle {
    pub fn binding(&self) -> wgpu::BufferBinding<'_> {
        wgpu::BufferBinding {
            buffer: &self.buffer,
            offset: self.offset,
            size: wgpu::BufferSize::new(self.size),
        }
    }

    pub fn range(&self) -> OpaqueRange {
        OpaqueRange::new(self.offset, self.size)
    }
}

/// Allocates [`PersistentBuffer`]s on a wgpu device
#[derive(Clone)]
pub struct WgpuDevice {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
}

impl WgpuDevice {
    pub fn new(device: Arc<wgpu::Device>, queue: Arc<wgpu::Queue>) -> Self {
        Self { device, queue }
    }

    pub fn device(&self) -> &Arc<wgpu::Device> {
        &self.device
    }

    pub fn queue(&self) -> &Arc<wgpu::Queue> {
        &self.queue
    }
}

impl DeviceAllocator for WgpuDevice {
    type Buffer = PersistentBuffer;

    fn limits(&self, usage: BufferUsage) -> DeviceLimits {
        DeviceLimits::from_wgpu(&self.device.limits(), usage)
    }

    fn allocate(
        &self,
        size: u64,
        label: Option<&str>,
        usage: BufferUsage,
    ) -> BufferResult<PersistentBuffer> {
        let max = self.device.limits().max_buffer_size;
        if size > max {
            return Err(device_error(
                "allocate",
                format!("requested {} bytes, max {} bytes", size, max),
            ));
        }
        let len = usize::try_from(size).map_err(|_| BufferError::SizeOverflow)?;

        let label = label.unwrap_or("Regioned Buffer").to_string();
        log::debug!("[PersistentBuffer] Creating '{}' ({} bytes, {:?})", label, size, usage);

        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&label),
            size,
            usage: usage.to_wgpu_usage(),
            mapped_at_creation: false,
        });

        Ok(PersistentBuffer {
            device: self.device.clone(),
            queue: self.queue.clone(),
            buffer: Arc::new(buffer),
            shadow: vec![0; len],
            mapped: false,
            usage,
            label,
        })
    }
}

/// A wgpu buffer with a persistent host shadow
pub struct PersistentBuffer {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    buffer: Arc<wgpu::Buffer>,

    /// Host copy written by accessors and uploaded on flush
    shadow: Vec<u8>,

    mapped: bool,
    usage: BufferUsage,
    label: String,
}

impl PersistentBuffer {
    /// Get the underlying buffer
    pub fn raw(&self) -> &Arc<wgpu::Buffer> {
        &self.buffer
    }

    /// Get usage pattern
    pub fn usage(&self) -> BufferUsage {
        self.usage
    }

    fn check_copy_range(&self, operation: &'static str, size: u64, offset: u64) -> BufferResult<()> {
        check_byte_range(offset, size, self.shadow.len() as u64)?;
        let alignment = wgpu::COPY_BUFFER_ALIGNMENT;
        if !is_aligned(offset, alignment) || !is_aligned(size, alignment) {
            return Err(BufferError::MisalignedRange {
                operation,
                offset,
                size,
                alignment,
            });
        }
        Ok(())
    }

    fn read_back(&self, size: u64, offset: u64) -> BufferResult<Vec<u8>> {
        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Regioned Buffer Readback"),
            size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Regioned Buffer Invalidate"),
        });
        encoder.copy_buffer_to_buffer(&self.buffer, offset, &staging, 0, size);
        self.queue.submit(std::iter::once(encoder.finish()));

        let slice = staging.slice(..);
        let (tx, rx) = futures::channel::oneshot::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });

        self.device.poll(wgpu::Maintain::Wait);
        pollster::block_on(rx)
            .map_err(|_| device_error("invalidate", "Channel closed while waiting for buffer map"))?
            .map_err(|e| device_error("invalidate", format!("Failed to map buffer: {:?}", e)))?;

        let bytes = slice.get_mapped_range().to_vec();
        staging.unmap();
        Ok(bytes)
    }
}

impl LinearDeviceBuffer for PersistentBuffer {
    type Handle = BufferSliceHandle;

    fn size(&self) -> u64 {
        self.shadow.len() as u64
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
        self.mapped.then_some(self.shadow.as_slice())
    }

    fn mapped_mut(&mut self) -> Option<&mut [u8]> {
        if self.mapped {
            Some(self.shadow.as_mut_slice())
        } else {
            None
        }
    }

    fn write_bytes(&mut self, bytes: &[u8], offset: u64) -> BufferResult<()> {
        check_byte_range(offset, bytes.len() as u64, self.size())?;
        let mapped = self.mapped_mut().ok_or(BufferError::NotMapped)?;
        let start = offset as usize;
        mapped[start..start + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    fn flush(&mut self, size: u64, offset: u64) -> BufferResult<()> {
        self.check_copy_range("flush", size, offset)?;
        if size == 0 {
            return Ok(());
        }
        let start = offset as usize;
        self.queue
            .write_buffer(&self.buffer, offset, &self.shadow[start..start + size as usize]);
        log::trace!("[PersistentBuffer] '{}' flushed {} bytes at {}", self.label, size, offset);
        Ok(())
    }

    fn invalidate(&mut self, size: u64, offset: u64) -> BufferResult<()> {
        self.check_copy_range("invalidate", size, offset)?;
        if size == 0 {
            return Ok(());
        }
        let bytes = self.read_back(size, offset)?;
        let start = offset as usize;
        self.shadow[start..start + bytes.len()].copy_from_slice(&bytes);
        log::trace!("[PersistentBuffer] '{}' invalidated {} bytes at {}", self.label, size, offset);
        Ok(())
    }

    fn descriptor_handle(&self, size: u64, offset: u64) -> BufferResult<BufferSliceHandle> {
        check_byte_range(offset, size, self.size())?;
        Ok(BufferSliceHandle {
            buffer: self.buffer.clone(),
            offset,
            size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_flags() {
        let uniform = BufferUsage::Uniform.to_wgpu_usage();
        assert!(uniform.contains(wgpu::BufferUsages::UNIFORM));
        assert!(uniform.contains(wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::COPY_SRC));
        assert!(!uniform.contains(wgpu::BufferUsages::STORAGE));

        assert!(BufferUsage::Storage.to_wgpu_usage().contains(wgpu::BufferUsages::STORAGE));
    }

    #[test]
    fn test_buffer_entry() {
        let entry = buffer_entry(1, wgpu::ShaderStages::VERTEX, BufferUsage::Uniform, true, 64);
        assert_eq!(entry.binding, 1);
        match entry.ty {
            wgpu::BindingType::Buffer {
                ty,
                has_dynamic_offset,
                min_binding_size,
            } => {
                assert_eq!(ty, wgpu::BufferBindingType::Uniform);
                assert!(has_dynamic_offset);
                assert_eq!(min_binding_size.map(|s| s.get()), Some(64));
            }
            other => panic!("unexpected binding type {:?}", other),
        }
    }

    #[test]
    fn test_usage_deserialize() {
        #[derive(serde::Deserialize)]
        struct Wrapper {
            usage: BufferUsage,
        }
        let wrapper: Wrapper = toml::from_str("usage = \"storage\"").expect("valid usage");
        assert_eq!(wrapper.usage, BufferUsage::Storage);
    }
}
