//! Wraparound sequence-number arithmetic.
//!
//! Sequence numbers live in `0..wrap`. Comparisons split the circle in half:
//! a value less than `wrap / 2` steps ahead of a base is in its future, any
//! other value is in its past.

/// Next sequence number after `seq`.
pub fn next(seq: u32, wrap: u32) -> u32 {
    ((u64::from(seq) + 1) % u64::from(wrap)) as u32
}

/// Forward distance from `base` to `seq`, in `0..wrap`.
pub fn distance(base: u32, seq: u32, wrap: u32) -> u32 {
    let wrap = u64::from(wrap);
    ((u64::from(seq) + wrap - u64::from(base) % wrap) % wrap) as u32
}

/// Check whether `seq` lies before `base`, i.e. is old.
///
/// A forward distance of at least half the window means the value is
/// actually behind `base`.
pub fn is_before(seq: u32, base: u32, wrap: u32) -> bool {
    distance(base, seq, wrap) >= wrap / 2
}
