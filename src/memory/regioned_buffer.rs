//! Typed, bounds-checked access to a regioned device buffer
//!
//! A [`RegionedBuffer`] owns one linear allocation holding
//! `num_regions × instances_per_region` payloads laid out by
//! [`RegionLayout`]. The allocation stays mapped for the buffer's whole
//! life. Writes land in host memory only; call one of the flush operations
//! before the device reads them, and one of the invalidate operations
//! before reading back what the device wrote.
//!
//! There is no internal locking. Callers that share a buffer between
//! execution contexts partition it by region index, one region per frame
//! in flight.

use std::any::type_name;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};

use bytemuck::Pod;

use crate::error::{BufferError, BufferResult, Capability};
use crate::memory::config::RegionedBufferDescriptor;
use crate::memory::device::{check_byte_range, DeviceAllocator, LinearDeviceBuffer};
use crate::memory::error::capability_disabled;
use crate::memory::layout::RegionLayout;

/// Exclusive access to one element of a [`RegionedBuffer`]
///
/// Derefs to a copy of the element; the copy is written back into mapped
/// memory when the guard drops.
pub struct ElementMut<'a, T: Pod> {
    bytes: &'a mut [u8],
    value: T,
}

impl<T: Pod> Deref for ElementMut<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T: Pod> DerefMut for ElementMut<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.value
    }
}

impl<T: Pod> Drop for ElementMut<'_, T> {
    fn drop(&mut self) {
        self.bytes.copy_from_slice(bytemuck::bytes_of(&self.value));
    }
}

/// `num_regions` replicas of `instances_per_region` payloads of type `T`
pub struct RegionedBuffer<T: Pod, B: LinearDeviceBuffer> {
    layout: RegionLayout,
    buffer: B,
    _phantom: PhantomData<T>,
}

impl<T: Pod, B: LinearDeviceBuffer> RegionedBuffer<T, B> {
    /// Compute the layout from `device`'s limits, allocate and map it.
    pub fn new<D>(device: &D, desc: &RegionedBufferDescriptor) -> BufferResult<Self>
    where
        D: DeviceAllocator<Buffer = B>,
    {
        let layout = RegionLayout::compute(
            std::mem::size_of::<T>() as u64,
            desc.instances_per_region,
            desc.num_regions,
            device.limits(desc.usage),
            desc.capabilities(),
        )?;
        let buffer = device.allocate(layout.total_size(), desc.label.as_deref(), desc.usage)?;

        log::info!(
            "[RegionedBuffer] Created '{}' for {}\n{}",
            desc.label.as_deref().unwrap_or("unnamed"),
            type_name::<T>(),
            layout
        );

        Self::from_parts(layout, buffer)
    }

    /// Wrap an existing allocation. The layout must describe `T` and the
    /// buffer must be at least `layout.total_size()` bytes.
    pub fn from_parts(layout: RegionLayout, mut buffer: B) -> BufferResult<Self> {
        if layout.instance_size() != std::mem::size_of::<T>() as u64 {
            return Err(BufferError::InvalidDimensions {
                what: "layout instance size does not match the payload type",
            });
        }
        check_byte_range(0, layout.total_size(), buffer.size())?;
        buffer.map()?;

        Ok(Self {
            layout,
            buffer,
            _phantom: PhantomData,
        })
    }

    pub fn layout(&self) -> &RegionLayout {
        &self.layout
    }

    pub fn num_regions(&self) -> usize {
        self.layout.num_regions()
    }

    pub fn instances_per_region(&self) -> usize {
        self.layout.instances_per_region()
    }

    pub fn alignment_per_instance(&self) -> u64 {
        self.layout.alignment_per_instance()
    }

    pub fn region_size(&self) -> u64 {
        self.layout.region_size()
    }

    pub fn buffer(&self) -> &B {
        &self.buffer
    }

    pub fn buffer_mut(&mut self) -> &mut B {
        &mut self.buffer
    }

    fn instance_size(&self) -> usize {
        self.layout.instance_size() as usize
    }

    fn element_bytes(&self, region: usize, element: usize) -> BufferResult<&[u8]> {
        let offset = self.layout.element_offset(region, element)?;
        let size = self.layout.instance_size();
        let mapped = self.buffer.mapped().ok_or(BufferError::NotMapped)?;
        check_byte_range(offset, size, mapped.len() as u64)?;
        let start = offset as usize;
        Ok(&mapped[start..start + size as usize])
    }

    fn element_bytes_mut(&mut self, region: usize, element: usize) -> BufferResult<&mut [u8]> {
        let offset = self.layout.element_offset(region, element)?;
        let size = self.layout.instance_size();
        let mapped = self.buffer.mapped_mut().ok_or(BufferError::NotMapped)?;
        check_byte_range(offset, size, mapped.len() as u64)?;
        let start = offset as usize;
        Ok(&mut mapped[start..start + size as usize])
    }

    /// Exclusive access to `(region, element)` in mapped memory
    pub fn get(&mut self, region: usize, element: usize) -> BufferResult<ElementMut<'_, T>> {
        let bytes = self.element_bytes_mut(region, element)?;
        let value = bytemuck::pod_read_unaligned(bytes);
        Ok(ElementMut { bytes, value })
    }

    /// Copy `(region, element)` out of mapped memory
    pub fn read(&self, region: usize, element: usize) -> BufferResult<T> {
        self.element_bytes(region, element)
            .map(bytemuck::pod_read_unaligned)
    }

    pub fn write(&mut self, item: &T, region: usize, element: usize) -> BufferResult<()> {
        let offset = self.layout.element_offset(region, element)?;
        self.buffer.write_bytes(bytemuck::bytes_of(item), offset)
    }

    /// Write `items` into consecutive elements of `region`, starting at 0
    pub fn write_region(&mut self, items: &[T], region: usize) -> BufferResult<()> {
        self.layout.check_region(region)?;
        if items.len() > self.instances_per_region() {
            return Err(BufferError::ElementOutOfBounds {
                index: items.len() - 1,
                count: self.instances_per_region(),
            });
        }
        for (element, item) in items.iter().enumerate() {
            self.write(item, region, element)?;
        }
        Ok(())
    }

    /// Iterate the elements of `region` in order
    pub fn iter_region(&self, region: usize) -> BufferResult<impl Iterator<Item = T> + '_> {
        let offset = self.layout.region_offset(region)?;
        let region_size = self.layout.region_size();
        let mapped = self.buffer.mapped().ok_or(BufferError::NotMapped)?;
        check_byte_range(offset, region_size, mapped.len() as u64)?;

        let start = offset as usize;
        let region_bytes = &mapped[start..start + region_size as usize];
        let instance_size = self.instance_size();

        Ok(region_bytes
            .chunks(self.layout.alignment_per_instance() as usize)
            .take(self.instances_per_region())
            .map(move |slot| bytemuck::pod_read_unaligned(&slot[..instance_size])))
    }

    fn require(&self, capability: Capability, operation: &'static str) -> BufferResult<()> {
        let caps = self.layout.capabilities();
        let enabled = match capability {
            Capability::FlushablePerElement => caps.flushable_per_element,
            Capability::DescriptorInfoPerElement => caps.descriptor_info_per_element,
        };
        if enabled {
            Ok(())
        } else {
            Err(capability_disabled(operation, capability))
        }
    }

    /// `(size, offset)` of the exclusive element range `[start, end)`
    fn range_extent(&self, region: usize, start: usize, end: usize) -> BufferResult<(u64, u64)> {
        self.layout.check_range(region, start, end)?;
        let offset = self.layout.element_offset(region, start)?;
        let size = (end - start) as u64 * self.layout.alignment_per_instance();
        Ok((size, offset))
    }

    /// Flush a whole region. Always allowed.
    pub fn flush_region(&mut self, region: usize) -> BufferResult<()> {
        let offset = self.layout.region_offset(region)?;
        log::trace!("[RegionedBuffer] Flushing region {}", region);
        self.buffer.flush(self.layout.region_size(), offset)
    }

    /// Flush elements `[start, end)` of `region`
    pub fn flush_range(&mut self, region: usize, start: usize, end: usize) -> BufferResult<()> {
        self.require(Capability::FlushablePerElement, "flush_range")?;
        let (size, offset) = self.range_extent(region, start, end)?;
        self.buffer.flush(size, offset)
    }

    pub fn flush_element(&mut self, region: usize, element: usize) -> BufferResult<()> {
        self.require(Capability::FlushablePerElement, "flush_element")?;
        let offset = self.layout.element_offset(region, element)?;
        self.buffer.flush(self.layout.alignment_per_instance(), offset)
    }

    /// Invalidate a whole region. Always allowed.
    pub fn invalidate_region(&mut self, region: usize) -> BufferResult<()> {
        let offset = self.layout.region_offset(region)?;
        log::trace!("[RegionedBuffer] Invalidating region {}", region);
        self.buffer.invalidate(self.layout.region_size(), offset)
    }

    /// Invalidate elements `[start, end)` of `region`
    pub fn invalidate_range(&mut self, region: usize, start: usize, end: usize) -> BufferResult<()> {
        self.require(Capability::FlushablePerElement, "invalidate_range")?;
        let (size, offset) = self.range_extent(region, start, end)?;
        self.buffer.invalidate(size, offset)
    }

    pub fn invalidate_element(&mut self, region: usize, element: usize) -> BufferResult<()> {
        self.require(Capability::FlushablePerElement, "invalidate_element")?;
        let offset = self.layout.element_offset(region, element)?;
        self.buffer.invalidate(self.layout.alignment_per_instance(), offset)
    }

    /// Handle covering a whole region. Always allowed.
    pub fn handle_for_region(&self, region: usize) -> BufferResult<B::Handle> {
        let offset = self.layout.region_offset(region)?;
        self.buffer.descriptor_handle(self.layout.region_size(), offset)
    }

    /// Handle covering one element slot (`alignment_per_instance` bytes)
    pub fn handle_for_element(&self, region: usize, element: usize) -> BufferResult<B::Handle> {
        self.require(Capability::DescriptorInfoPerElement, "handle_for_element")?;
        let offset = self.layout.element_offset(region, element)?;
        self.buffer
            .descriptor_handle(self.layout.alignment_per_instance(), offset)
    }
}
