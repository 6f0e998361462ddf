//! Alignment arithmetic
//!
//! A zero alignment means "no constraint" everywhere in this module, which
//! matches how devices report a limit they do not impose.

/// Greatest common divisor (Euclid)
#[inline]
pub fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

/// Least common multiple, treating 0 as "no constraint":
/// `lcm(0, x) == lcm(x, 0) == x` and `lcm(0, 0) == 0`.
///
/// Returns `None` on overflow.
#[inline]
pub fn checked_lcm(a: u64, b: u64) -> Option<u64> {
    if a == 0 {
        return Some(b);
    }
    if b == 0 {
        return Some(a);
    }
    (a / gcd(a, b)).checked_mul(b)
}

/// Smallest multiple of `align` that is `>= size`, or `size` itself when
/// `align == 0`. Returns `None` on overflow.
///
/// Power-of-two alignments take the bitmask path; anything else falls back
/// to ceiling division so odd device limits still produce correct results.
#[inline]
pub fn checked_align_up(size: u64, align: u64) -> Option<u64> {
    if align == 0 {
        return Some(size);
    }
    if align.is_power_of_two() {
        let mask = align - 1;
        return size.checked_add(mask).map(|s| s & !mask);
    }
    let blocks = size.checked_add(align - 1)? / align;
    blocks.checked_mul(align)
}

/// Non-checking variant of [`checked_align_up`] for sizes known to be small
#[inline]
pub fn align_up(size: u64, align: u64) -> u64 {
    if align == 0 {
        return size;
    }
    size.div_ceil(align) * align
}

/// Whether `value` is a multiple of `align` (always true for `align == 0`)
#[inline]
pub fn is_aligned(value: u64, align: u64) -> bool {
    align == 0 || value % align == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align_up_power_of_two() {
        assert_eq!(align_up(100, 16), 112);
        assert_eq!(align_up(128, 16), 128);
        assert_eq!(align_up(129, 16), 144);

        assert_eq!(align_up(100, 256), 256);
        assert_eq!(align_up(256, 256), 256);
        assert_eq!(align_up(257, 256), 512);
    }

    #[test]
    fn test_align_up_zero_is_identity() {
        assert_eq!(align_up(17, 0), 17);
        assert_eq!(checked_align_up(17, 0), Some(17));
        assert_eq!(checked_align_up(0, 0), Some(0));
    }

    #[test]
    fn test_align_up_non_power_of_two() {
        assert_eq!(checked_align_up(10, 12), Some(12));
        assert_eq!(checked_align_up(24, 12), Some(24));
        assert_eq!(checked_align_up(25, 12), Some(36));
        assert_eq!(align_up(25, 12), 36);
    }

    #[test]
    fn test_checked_paths_agree() {
        for size in 0..300u64 {
            for align in [0u64, 1, 3, 4, 6, 64, 100, 256] {
                assert_eq!(checked_align_up(size, align), Some(align_up(size, align)));
            }
        }
    }

    #[test]
    fn test_align_up_overflow() {
        assert_eq!(checked_align_up(u64::MAX, 256), None);
        assert_eq!(checked_align_up(u64::MAX - 2, 7), None);
        assert_eq!(checked_align_up(u64::MAX, 1), Some(u64::MAX));
    }

    #[test]
    fn test_lcm() {
        assert_eq!(checked_lcm(64, 256), Some(256));
        assert_eq!(checked_lcm(4, 6), Some(12));
        assert_eq!(checked_lcm(0, 256), Some(256));
        assert_eq!(checked_lcm(64, 0), Some(64));
        assert_eq!(checked_lcm(0, 0), Some(0));
        assert_eq!(checked_lcm(u64::MAX, u64::MAX - 1), None);
    }

    #[test]
    fn test_gcd() {
        assert_eq!(gcd(64, 256), 64);
        assert_eq!(gcd(12, 18), 6);
        assert_eq!(gcd(7, 0), 7);
    }

    #[test]
    fn test_is_aligned() {
        assert!(is_aligned(512, 256));
        assert!(!is_aligned(300, 256));
        assert!(is_aligned(300, 0));
    }
}
