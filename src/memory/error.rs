//! Memory subsystem error helpers
//!
//! Constructors for the [`BufferError`] variants the memory subsystem raises
//! in more than one place.

use crate::error::{BufferError, Capability};

/// Create a capability mismatch error
pub fn capability_disabled(operation: &'static str, capability: Capability) -> BufferError {
    BufferError::CapabilityDisabled {
        operation,
        capability,
    }
}

/// Create a device operation error
pub fn device_error(operation: &str, error: impl std::fmt::Display) -> BufferError {
    BufferError::Device {
        operation: operation.to_string(),
        error: error.to_string(),
    }
}
