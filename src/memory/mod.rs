/// Regioned Buffer Memory System
///
/// Packs per-frame, per-instance payloads into one persistently mapped
/// device allocation, honouring the device's coherence and offset
/// alignment limits, and exposes bounds-checked typed access plus
/// region/element granular synchronization and sub-range handles.

pub mod alignment;
pub mod config;
pub mod device;
pub mod error;
pub mod host_buffer;
pub mod layout;
pub mod persistent_buffer;
pub mod regioned_buffer;

pub use config::{LayoutConfig, RegionedBufferDescriptor};
pub use device::{DeviceAllocator, DeviceLimits, LinearDeviceBuffer, OpaqueRange};
pub use host_buffer::{HostBuffer, HostDevice, SyncOp};
pub use layout::{ElementCapabilities, RegionLayout};
pub use persistent_buffer::{buffer_entry, BufferSliceHandle, BufferUsage, PersistentBuffer, WgpuDevice};
pub use regioned_buffer::{ElementMut, RegionedBuffer};

/// Regioned buffer living in host memory only
pub type HostRegionedBuffer<T> = RegionedBuffer<T, HostBuffer>;

/// Regioned buffer backed by a wgpu buffer
pub type WgpuRegionedBuffer<T> = RegionedBuffer<T, PersistentBuffer>;
