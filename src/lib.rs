//! Dynamic region/element buffer layouts
//!
//! Lays out `num_regions × instances_per_region` fixed-size payloads in one
//! device allocation so that whole regions, and optionally single elements,
//! can be flushed, invalidated and bound independently.

pub mod constants;
pub mod error;
pub mod memory;

pub use error::{BufferError, BufferResult, Capability};
pub use memory::{
    BufferUsage, DeviceAllocator, DeviceLimits, ElementCapabilities, ElementMut, HostBuffer,
    HostDevice, HostRegionedBuffer, LayoutConfig, LinearDeviceBuffer, OpaqueRange,
    PersistentBuffer, RegionLayout, RegionedBuffer, RegionedBufferDescriptor, WgpuDevice,
    WgpuRegionedBuffer,
};
