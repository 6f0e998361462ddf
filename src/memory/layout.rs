//! Region/element packing
//!
//! A regioned buffer is `num_regions` replicas of a grid of
//! `instances_per_region` payload slots. Two device limits constrain where
//! slots may start:
//!
//! - the coherence atom, when an element must be flushed/invalidated on its
//!   own without touching its neighbours' bytes;
//! - the offset alignment, when an element must be bound on its own as a
//!   sub-range handle.
//!
//! Elements only pay for the constraints they opt into. Regions always pay
//! for both, since a whole region is always flushable and bindable.

use std::fmt;

use crate::error::{BufferError, BufferResult};
use crate::memory::alignment::{checked_align_up, checked_lcm};
use crate::memory::device::DeviceLimits;

/// Which per-element operations a buffer must support
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ElementCapabilities {
    pub flushable_per_element: bool,
    pub descriptor_info_per_element: bool,
}

impl ElementCapabilities {
    pub const NONE: Self = Self {
        flushable_per_element: false,
        descriptor_info_per_element: false,
    };

    pub const ALL: Self = Self {
        flushable_per_element: true,
        descriptor_info_per_element: true,
    };

    pub fn new(flushable_per_element: bool, descriptor_info_per_element: bool) -> Self {
        Self {
            flushable_per_element,
            descriptor_info_per_element,
        }
    }
}

/// Immutable byte layout of a regioned buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionLayout {
    instance_size: u64,
    num_regions: usize,
    instances_per_region: usize,
    alignment_per_instance: u64,
    region_size: u64,
    capabilities: ElementCapabilities,
    limits: DeviceLimits,
}

impl RegionLayout {
    /// Compute the packing for `instance_size`-byte payloads.
    pub fn compute(
        instance_size: u64,
        instances_per_region: usize,
        num_regions: usize,
        limits: DeviceLimits,
        capabilities: ElementCapabilities,
    ) -> BufferResult<Self> {
        if instance_size == 0 {
            return Err(BufferError::InvalidDimensions {
                what: "payload type must not be zero-sized",
            });
        }
        if instances_per_region == 0 {
            return Err(BufferError::InvalidDimensions {
                what: "instances_per_region must be at least 1",
            });
        }
        if num_regions == 0 {
            return Err(BufferError::InvalidDimensions {
                what: "num_regions must be at least 1",
            });
        }

        let DeviceLimits {
            coherence_atom_size,
            offset_alignment,
        } = limits;
        let combined = checked_lcm(coherence_atom_size, offset_alignment)
            .ok_or(BufferError::SizeOverflow)?;

        let element_alignment = match (
            capabilities.flushable_per_element,
            capabilities.descriptor_info_per_element,
        ) {
            (true, true) => combined,
            (true, false) => coherence_atom_size,
            (false, true) => offset_alignment,
            (false, false) => 0,
        };
        let alignment_per_instance =
            checked_align_up(instance_size, element_alignment).ok_or(BufferError::SizeOverflow)?;

        let packed = (instances_per_region as u64)
            .checked_mul(alignment_per_instance)
            .ok_or(BufferError::SizeOverflow)?;
        let region_size = checked_align_up(packed, combined).ok_or(BufferError::SizeOverflow)?;

        // The whole allocation must be addressable too.
        region_size
            .checked_mul(num_regions as u64)
            .ok_or(BufferError::SizeOverflow)?;

        Ok(Self {
            instance_size,
            num_regions,
            instances_per_region,
            alignment_per_instance,
            region_size,
            capabilities,
            limits,
        })
    }

    pub fn instance_size(&self) -> u64 {
        self.instance_size
    }

    pub fn num_regions(&self) -> usize {
        self.num_regions
    }

    pub fn instances_per_region(&self) -> usize {
        self.instances_per_region
    }

    /// Stride between consecutive elements of a region
    pub fn alignment_per_instance(&self) -> u64 {
        self.alignment_per_instance
    }

    /// Stride between consecutive regions
    pub fn region_size(&self) -> u64 {
        self.region_size
    }

    pub fn capabilities(&self) -> ElementCapabilities {
        self.capabilities
    }

    pub fn limits(&self) -> DeviceLimits {
        self.limits
    }

    /// Size of the backing allocation
    pub fn total_size(&self) -> u64 {
        self.region_size * self.num_regions as u64
    }

    pub fn check_region(&self, region: usize) -> BufferResult<()> {
        if region < self.num_regions {
            Ok(())
        } else {
            Err(BufferError::RegionOutOfBounds {
                index: region,
                count: self.num_regions,
            })
        }
    }

    pub fn check_element(&self, region: usize, element: usize) -> BufferResult<()> {
        self.check_region(region)?;
        if element < self.instances_per_region {
            Ok(())
        } else {
            Err(BufferError::ElementOutOfBounds {
                index: element,
                count: self.instances_per_region,
            })
        }
    }

    /// Check an exclusive element range `[start, end)` within a region
    pub fn check_range(&self, region: usize, start: usize, end: usize) -> BufferResult<()> {
        self.check_region(region)?;
        if start >= end {
            return Err(BufferError::EmptyElementRange { start, end });
        }
        if end > self.instances_per_region {
            return Err(BufferError::ElementOutOfBounds {
                index: end - 1,
                count: self.instances_per_region,
            });
        }
        Ok(())
    }

    /// Byte offset of the first byte of `region`
    pub fn region_offset(&self, region: usize) -> BufferResult<u64> {
        self.check_region(region)?;
        Ok(region as u64 * self.region_size)
    }

    /// Byte offset of `(region, element)`
    pub fn element_offset(&self, region: usize, element: usize) -> BufferResult<u64> {
        self.check_element(region, element)?;
        Ok(region as u64 * self.region_size + element as u64 * self.alignment_per_instance)
    }
}

impl fmt::Display for RegionLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "InstanceSize: {}", self.instance_size)?;
        writeln!(f, "AlignmentPerInstance: {}", self.alignment_per_instance)?;
        writeln!(f, "InstancesPerRegion: {}", self.instances_per_region)?;
        writeln!(f, "NumRegions: {}", self.num_regions)?;
        writeln!(f, "RegionSize: {}", self.region_size)?;
        writeln!(f, "CoherenceAtomSize: {}", self.limits.coherence_atom_size)?;
        write!(f, "OffsetAlignment: {}", self.limits.offset_alignment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::alignment::checked_lcm;

    const LIMITS: DeviceLimits = DeviceLimits {
        coherence_atom_size: 64,
        offset_alignment: 256,
    };

    fn all_capabilities() -> [ElementCapabilities; 4] {
        [
            ElementCapabilities::ALL,
            ElementCapabilities::new(true, false),
            ElementCapabilities::new(false, true),
            ElementCapabilities::NONE,
        ]
    }

    #[test]
    fn test_both_capabilities_pack_to_lcm() {
        let layout = RegionLayout::compute(16, 4, 2, LIMITS, ElementCapabilities::ALL)
            .expect("valid layout");
        assert_eq!(layout.alignment_per_instance(), 256);
        assert_eq!(layout.region_size(), 1024);
        assert_eq!(layout.total_size(), 2048);
    }

    #[test]
    fn test_no_capabilities_packs_densely() {
        let layout = RegionLayout::compute(16, 4, 2, LIMITS, ElementCapabilities::NONE)
            .expect("valid layout");
        assert_eq!(layout.alignment_per_instance(), 16);
        assert_eq!(layout.region_size(), 256);
    }

    #[test]
    fn test_single_capability_policies() {
        let flush_only = RegionLayout::compute(16, 4, 1, LIMITS, ElementCapabilities::new(true, false))
            .expect("valid layout");
        assert_eq!(flush_only.alignment_per_instance(), 64);
        assert_eq!(flush_only.region_size(), 256);

        let handle_only = RegionLayout::compute(16, 4, 1, LIMITS, ElementCapabilities::new(false, true))
            .expect("valid layout");
        assert_eq!(handle_only.alignment_per_instance(), 256);
        assert_eq!(handle_only.region_size(), 1024);
    }

    #[test]
    fn test_non_power_of_two_limits() {
        let limits = DeviceLimits::new(12, 8);
        let layout = RegionLayout::compute(10, 3, 2, limits, ElementCapabilities::ALL)
            .expect("valid layout");
        assert_eq!(layout.alignment_per_instance(), 24);
        assert_eq!(layout.region_size(), 72);
    }

    #[test]
    fn test_zero_limits_impose_nothing() {
        let layout = RegionLayout::compute(
            12,
            5,
            3,
            DeviceLimits::default(),
            ElementCapabilities::ALL,
        )
        .expect("valid layout");
        assert_eq!(layout.alignment_per_instance(), 12);
        assert_eq!(layout.region_size(), 60);
    }

    #[test]
    fn test_layout_invariants_hold_everywhere() {
        let limit_values = [0u64, 1, 4, 12, 64, 256];
        for instance_size in [1u64, 3, 16, 17, 100, 300] {
            for instances in [1usize, 2, 5] {
                for &coherence in &limit_values {
                    for &offset in &limit_values {
                        let limits = DeviceLimits::new(coherence, offset);
                        let combined = checked_lcm(coherence, offset).expect("small lcm");
                        for caps in all_capabilities() {
                            let layout = RegionLayout::compute(instance_size, instances, 2, limits, caps)
                                .expect("valid layout");
                            let stride = layout.alignment_per_instance();

                            assert!(stride >= instance_size);
                            if caps.flushable_per_element && coherence != 0 {
                                assert_eq!(stride % coherence, 0);
                            }
                            if caps.descriptor_info_per_element && offset != 0 {
                                assert_eq!(stride % offset, 0);
                            }
                            if combined != 0 {
                                assert_eq!(layout.region_size() % combined, 0);
                            }
                            assert!(layout.region_size() >= instances as u64 * stride);
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_element_ranges_never_overlap() {
        for caps in all_capabilities() {
            let layout = RegionLayout::compute(20, 3, 3, LIMITS, caps).expect("valid layout");
            let mut ranges = Vec::new();
            for r in 0..3 {
                for e in 0..3 {
                    let start = layout.element_offset(r, e).expect("in bounds");
                    ranges.push((start, start + layout.instance_size()));
                }
            }
            ranges.sort();
            for pair in ranges.windows(2) {
                assert!(pair[0].1 <= pair[1].0, "{:?} overlaps {:?}", pair[0], pair[1]);
            }
            assert!(ranges.last().map_or(0, |r| r.1) <= layout.total_size());
        }
    }

    #[test]
    fn test_rejects_degenerate_dimensions() {
        assert!(matches!(
            RegionLayout::compute(0, 1, 1, LIMITS, ElementCapabilities::ALL),
            Err(BufferError::InvalidDimensions { .. })
        ));
        assert!(matches!(
            RegionLayout::compute(4, 0, 1, LIMITS, ElementCapabilities::ALL),
            Err(BufferError::InvalidDimensions { .. })
        ));
        assert!(matches!(
            RegionLayout::compute(4, 1, 0, LIMITS, ElementCapabilities::ALL),
            Err(BufferError::InvalidDimensions { .. })
        ));
    }

    #[test]
    fn test_overflow_is_reported() {
        assert!(matches!(
            RegionLayout::compute(u64::MAX / 2, 4, 1, LIMITS, ElementCapabilities::ALL),
            Err(BufferError::SizeOverflow)
        ));
        assert!(matches!(
            RegionLayout::compute(256, 1, usize::MAX, LIMITS, ElementCapabilities::ALL),
            Err(BufferError::SizeOverflow)
        ));
    }

    #[test]
    fn test_bounds_checks() {
        let layout = RegionLayout::compute(16, 4, 2, LIMITS, ElementCapabilities::ALL)
            .expect("valid layout");

        assert_eq!(layout.element_offset(1, 3).ok(), Some(1024 + 3 * 256));
        assert!(matches!(
            layout.region_offset(2),
            Err(BufferError::RegionOutOfBounds { index: 2, count: 2 })
        ));
        assert!(matches!(
            layout.element_offset(0, 4),
            Err(BufferError::ElementOutOfBounds { index: 4, count: 4 })
        ));
        assert!(layout.check_range(0, 0, 4).is_ok());
        assert!(matches!(
            layout.check_range(0, 2, 2),
            Err(BufferError::EmptyElementRange { start: 2, end: 2 })
        ));
        assert!(matches!(
            layout.check_range(0, 1, 5),
            Err(BufferError::ElementOutOfBounds { .. })
        ));
    }

    #[test]
    fn test_display_reports_layout() {
        let layout = RegionLayout::compute(16, 4, 2, LIMITS, ElementCapabilities::ALL)
            .expect("valid layout");
        let report = layout.to_string();
        assert!(report.contains("AlignmentPerInstance: 256"));
        assert!(report.contains("RegionSize: 1024"));
        assert!(report.contains("OffsetAlignment: 256"));
    }
}
