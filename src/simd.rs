// The capability surface shared by every engine variant. A backend supplies
// the vector width and the primitive set; the test schedules in tests.rs are
// written once against this trait and monomorphized per variant.

use std::sync::atomic::AtomicU64;

/// One engine variant: a lane width plus the primitive set the schedules
/// are composed from.
///
/// Every method is `unsafe` because the implementations issue ISA-specific
/// instructions and raw memory accesses; callers must have verified the
/// instruction set at startup and must only pass offsets that are
/// `VECTOR_BYTES`-aligned and in bounds.
pub trait Simd: Send + Sync + 'static {
    type Vector: Copy + Send + Sync;

    /// Lane width in bytes. Buffer sizes and offsets are multiples of this.
    const VECTOR_BYTES: usize;
    const LABEL: &'static str;

    unsafe fn splat8(&self, b: u8) -> Self::Vector;
    unsafe fn splat16(&self, w: u16) -> Self::Vector;
    unsafe fn splat32(&self, d: u32) -> Self::Vector;
    unsafe fn splat64(&self, q: u64) -> Self::Vector;

    /// Builds a vector from one 64-bit value per lane.
    /// `lanes.len()` must equal `VECTOR_BYTES / 8`.
    unsafe fn from_lanes(&self, lanes: &[u64]) -> Self::Vector;

    unsafe fn xor(&self, a: Self::Vector, b: Self::Vector) -> Self::Vector;

    /// Wrapping add in 64-bit lanes.
    unsafe fn add64(&self, a: Self::Vector, b: Self::Vector) -> Self::Vector;

    /// The byte offset of each 64-bit lane within the vector: {0, 8, 16, ...}.
    unsafe fn lane_offsets(&self) -> Self::Vector;

    // Logical shifts within fixed-width lanes. x86 shift intrinsics take the
    // count as an immediate, so implementations unroll the finite count range
    // into per-immediate dispatch rather than feeding `n` through a register.
    unsafe fn shl64(&self, v: Self::Vector, n: u32) -> Self::Vector;
    unsafe fn shr64(&self, v: Self::Vector, n: u32) -> Self::Vector;
    unsafe fn shr32(&self, v: Self::Vector, n: u32) -> Self::Vector;
    unsafe fn shl16(&self, v: Self::Vector, n: u32) -> Self::Vector;
    unsafe fn shr16(&self, v: Self::Vector, n: u32) -> Self::Vector;
    unsafe fn shl8(&self, v: Self::Vector, n: u32) -> Self::Vector;
    unsafe fn shr8(&self, v: Self::Vector, n: u32) -> Self::Vector;

    unsafe fn invert(&self, v: Self::Vector) -> Self::Vector {
        self.xor(v, self.splat8(0xFF))
    }

    /// Non-temporal, alignment-required store of `v` to `mem + off`.
    unsafe fn store(&self, mem: *mut u8, off: usize, v: Self::Vector);

    /// Aligned load of `mem + off` compared byte-wise against `expected`.
    /// On mismatch, reports the offset on stderr and adds the number of
    /// mismatched bytes to `errors`. Never fails.
    unsafe fn verify(&self, mem: *const u8, off: usize, expected: Self::Vector, errors: &AtomicU64);

    /// Drains the write-combining buffers. Each sweep worker executes this
    /// before leaving the sweep barrier so no later pass can observe
    /// non-temporal writes still in flight.
    unsafe fn fence(&self);
}

// Immediate-count shift dispatch. `$n` is matched against every legal count
// and each arm instantiates the intrinsic with that count as a constant.
macro_rules! shift_unroll {
    ($intr:ident, $v:expr, $n:expr, [$($k:literal)*]) => {
        match $n {
            $( $k => $intr::<$k>($v), )*
            other => unreachable!("lane shift count out of range: {}", other),
        }
    };
}
pub(crate) use shift_unroll;

macro_rules! unroll64 {
    ($intr:ident, $v:expr, $n:expr) => {
        crate::simd::shift_unroll!($intr, $v, $n,
            [0 1 2 3 4 5 6 7 8 9 10 11 12 13 14 15
             16 17 18 19 20 21 22 23 24 25 26 27 28 29 30 31
             32 33 34 35 36 37 38 39 40 41 42 43 44 45 46 47
             48 49 50 51 52 53 54 55 56 57 58 59 60 61 62 63])
    };
}
pub(crate) use unroll64;

macro_rules! unroll32 {
    ($intr:ident, $v:expr, $n:expr) => {
        crate::simd::shift_unroll!($intr, $v, $n,
            [0 1 2 3 4 5 6 7 8 9 10 11 12 13 14 15
             16 17 18 19 20 21 22 23 24 25 26 27 28 29 30 31])
    };
}
pub(crate) use unroll32;

macro_rules! unroll16 {
    ($intr:ident, $v:expr, $n:expr) => {
        crate::simd::shift_unroll!($intr, $v, $n,
            [0 1 2 3 4 5 6 7 8 9 10 11 12 13 14 15])
    };
}
pub(crate) use unroll16;
