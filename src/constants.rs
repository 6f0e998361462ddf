//! Shared constants for regioned buffers

/// Frame pacing defaults
pub mod frames {
    /// Regions allocated when a descriptor does not say otherwise.
    /// One region per frame that may be in flight on the device.
    pub const DEFAULT_FRAMES_IN_FLIGHT: usize = 2;
}

/// Alignment values used when no device reports its own
pub mod alignment {
    /// Vulkan's common `nonCoherentAtomSize`
    pub const TYPICAL_COHERENCE_ATOM_SIZE: u64 = 64;

    /// WGSL/wgpu default uniform offset alignment
    pub const UNIFORM_BUFFER_ALIGNMENT: u64 = 256;

    /// Granularity wgpu requires for mapped ranges and buffer copies
    pub const WGPU_COHERENCE_ATOM_SIZE: u64 = wgpu::MAP_ALIGNMENT;
}
