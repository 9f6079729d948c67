// 32-byte engine variant on AVX2.

use std::arch::x86_64::*;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::simd::{unroll16, unroll32, unroll64, Simd};

pub struct Avx2;

impl Simd for Avx2 {
    type Vector = __m256i;

    const VECTOR_BYTES: usize = 32;
    const LABEL: &'static str = "AVX2";

    #[inline(always)]
    unsafe fn splat8(&self, b: u8) -> __m256i {
        _mm256_set1_epi8(b as i8)
    }

    #[inline(always)]
    unsafe fn splat16(&self, w: u16) -> __m256i {
        _mm256_set1_epi16(w as i16)
    }

    #[inline(always)]
    unsafe fn splat32(&self, d: u32) -> __m256i {
        _mm256_set1_epi32(d as i32)
    }

    #[inline(always)]
    unsafe fn splat64(&self, q: u64) -> __m256i {
        _mm256_set1_epi64x(q as i64)
    }

    #[inline(always)]
    unsafe fn from_lanes(&self, lanes: &[u64]) -> __m256i {
        debug_assert_eq!(lanes.len(), 4);
        _mm256_set_epi64x(
            lanes[3] as i64,
            lanes[2] as i64,
            lanes[1] as i64,
            lanes[0] as i64,
        )
    }

    #[inline(always)]
    unsafe fn xor(&self, a: __m256i, b: __m256i) -> __m256i {
        _mm256_xor_si256(a, b)
    }

    #[inline(always)]
    unsafe fn add64(&self, a: __m256i, b: __m256i) -> __m256i {
        _mm256_add_epi64(a, b)
    }

    #[inline(always)]
    unsafe fn lane_offsets(&self) -> __m256i {
        _mm256_set_epi64x(24, 16, 8, 0)
    }

    #[inline(always)]
    unsafe fn shl64(&self, v: __m256i, n: u32) -> __m256i {
        unroll64!(_mm256_slli_epi64, v, n)
    }

    #[inline(always)]
    unsafe fn shr64(&self, v: __m256i, n: u32) -> __m256i {
        unroll64!(_mm256_srli_epi64, v, n)
    }

    #[inline(always)]
    unsafe fn shr32(&self, v: __m256i, n: u32) -> __m256i {
        unroll32!(_mm256_srli_epi32, v, n)
    }

    #[inline(always)]
    unsafe fn shl16(&self, v: __m256i, n: u32) -> __m256i {
        unroll16!(_mm256_slli_epi16, v, n)
    }

    #[inline(always)]
    unsafe fn shr16(&self, v: __m256i, n: u32) -> __m256i {
        unroll16!(_mm256_srli_epi16, v, n)
    }

    // There is no 8-bit shift on x86; widen to 16-bit lanes and mask off the
    // bits dragged across byte boundaries.
    #[inline(always)]
    unsafe fn shl8(&self, v: __m256i, n: u32) -> __m256i {
        debug_assert!(n < 8);
        _mm256_and_si256(self.shl16(v, n), self.splat8(0xFFu8 << n))
    }

    #[inline(always)]
    unsafe fn shr8(&self, v: __m256i, n: u32) -> __m256i {
        debug_assert!(n < 8);
        _mm256_and_si256(self.shr16(v, n), self.splat8(0xFFu8 >> n))
    }

    #[inline(always)]
    unsafe fn store(&self, mem: *mut u8, off: usize, v: __m256i) {
        _mm256_stream_si256(mem.add(off).cast(), v);
    }

    #[inline(always)]
    unsafe fn verify(&self, mem: *const u8, off: usize, expected: __m256i, errors: &AtomicU64) {
        let actual = _mm256_load_si256(mem.add(off).cast());
        let eq = _mm256_cmpeq_epi8(expected, actual);
        let mask = _mm256_movemask_epi8(eq) as u32;

        if mask != u32::MAX {
            // One movemask bit per byte lane, so the zero count is the
            // number of mismatched bytes.
            let bad = (!mask).count_ones() as u64;
            eprintln!("errors detected at offset 0x{off:016x}");
            errors.fetch_add(bad, Ordering::Relaxed);
        }
    }

    #[inline(always)]
    unsafe fn fence(&self) {
        _mm_sfence();
    }
}
