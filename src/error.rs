//! Crate-wide error type
//!
//! Every misuse of a regioned buffer (out-of-range indices, capability
//! mismatches, unmapped access) surfaces as a [`BufferError`] instead of
//! being clamped or ignored.

use thiserror::Error;

/// Per-element capability a [`crate::memory::RegionedBuffer`] is configured with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// Individual elements may be flushed/invalidated
    FlushablePerElement,
    /// Individual elements may produce a standalone descriptor handle
    DescriptorInfoPerElement,
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Capability::FlushablePerElement => write!(f, "flushable_per_element"),
            Capability::DescriptorInfoPerElement => write!(f, "descriptor_info_per_element"),
        }
    }
}

#[derive(Debug, Error)]
pub enum BufferError {
    #[error("Invalid buffer dimensions: {what}")]
    InvalidDimensions { what: &'static str },

    #[error("Region index {index} out of range (buffer has {count} regions)")]
    RegionOutOfBounds { index: usize, count: usize },

    #[error("Element index {index} out of range (region has {count} elements)")]
    ElementOutOfBounds { index: usize, count: usize },

    #[error("Empty element range: start {start} must be less than end {end}")]
    EmptyElementRange { start: usize, end: usize },

    #[error("Cannot call {operation} unless initialized with {capability}=true")]
    CapabilityDisabled {
        operation: &'static str,
        capability: Capability,
    },

    #[error("Cannot access elements while the buffer is not mapped")]
    NotMapped,

    #[error("Byte range {offset}+{size} exceeds buffer capacity {capacity}")]
    ByteRangeOutOfBounds { offset: u64, size: u64, capacity: u64 },

    #[error("{operation} range {offset}+{size} is not aligned to {alignment} bytes")]
    MisalignedRange {
        operation: &'static str,
        offset: u64,
        size: u64,
        alignment: u64,
    },

    #[error("Buffer layout size overflowed")]
    SizeOverflow,

    #[error("Offset {0} does not fit in a u32 dynamic offset")]
    DynamicOffsetOverflow(u64),

    #[error("Device operation '{operation}' failed: {error}")]
    Device { operation: String, error: String },

    #[error("Invalid configuration: {0}")]
    Config(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type used throughout the crate
pub type BufferResult<T> = Result<T, BufferError>;
