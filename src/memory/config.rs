//! Buffer descriptors and TOML configuration

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::constants::frames::DEFAULT_FRAMES_IN_FLIGHT;
use crate::error::BufferResult;
use crate::memory::device::DeviceLimits;
use crate::memory::layout::ElementCapabilities;
use crate::memory::persistent_buffer::BufferUsage;

/// How a [`RegionedBuffer`](super::RegionedBuffer) should be laid out
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegionedBufferDescriptor {
    pub label: Option<String>,

    /// Elements per region (e.g. one per instance)
    pub instances_per_region: usize,

    /// Number of regions (e.g. one per frame in flight)
    pub num_regions: usize,

    /// Allow flushing/invalidating single elements
    pub flushable_per_element: bool,

    /// Allow binding single elements as standalone handles
    pub descriptor_info_per_element: bool,

    pub usage: BufferUsage,
}

impl Default for RegionedBufferDescriptor {
    fn default() -> Self {
        Self {
            label: None,
            instances_per_region: 1,
            num_regions: DEFAULT_FRAMES_IN_FLIGHT,
            flushable_per_element: true,
            descriptor_info_per_element: true,
            usage: BufferUsage::Uniform,
        }
    }
}

impl RegionedBufferDescriptor {
    pub fn new(instances_per_region: usize) -> Self {
        Self {
            instances_per_region,
            ..Default::default()
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_regions(mut self, num_regions: usize) -> Self {
        self.num_regions = num_regions;
        self
    }

    pub fn with_capabilities(mut self, capabilities: ElementCapabilities) -> Self {
        self.flushable_per_element = capabilities.flushable_per_element;
        self.descriptor_info_per_element = capabilities.descriptor_info_per_element;
        self
    }

    pub fn with_usage(mut self, usage: BufferUsage) -> Self {
        self.usage = usage;
        self
    }

    pub fn capabilities(&self) -> ElementCapabilities {
        ElementCapabilities::new(self.flushable_per_element, self.descriptor_info_per_element)
    }

    pub fn from_toml_str(source: &str) -> BufferResult<Self> {
        Ok(toml::from_str(source)?)
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> BufferResult<Self> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }
}

/// Layout inspection settings read by the `check_region_layout` tool
///
/// ```toml
/// instance_size = 64
///
/// [limits]
/// coherence_atom_size = 64
/// offset_alignment = 256
///
/// [buffer]
/// instances_per_region = 8
/// num_regions = 3
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    pub instance_size: Option<u64>,
    pub limits: Option<DeviceLimits>,
    pub buffer: RegionedBufferDescriptor,
}

impl LayoutConfig {
    pub fn from_toml_str(source: &str) -> BufferResult<Self> {
        Ok(toml::from_str(source)?)
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> BufferResult<Self> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }
}
