// 64-byte engine variant on AVX-512F + BW. The byte-mask compare gives an
// exact per-byte mismatch mask, which the error report carries verbatim.

use std::arch::x86_64::*;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::simd::{unroll16, unroll32, unroll64, Simd};

pub struct Avx512;

impl Simd for Avx512 {
    type Vector = __m512i;

    const VECTOR_BYTES: usize = 64;
    const LABEL: &'static str = "AVX-512";

    #[inline(always)]
    unsafe fn splat8(&self, b: u8) -> __m512i {
        _mm512_set1_epi8(b as i8)
    }

    #[inline(always)]
    unsafe fn splat16(&self, w: u16) -> __m512i {
        _mm512_set1_epi16(w as i16)
    }

    #[inline(always)]
    unsafe fn splat32(&self, d: u32) -> __m512i {
        _mm512_set1_epi32(d as i32)
    }

    #[inline(always)]
    unsafe fn splat64(&self, q: u64) -> __m512i {
        _mm512_set1_epi64(q as i64)
    }

    #[inline(always)]
    unsafe fn from_lanes(&self, lanes: &[u64]) -> __m512i {
        debug_assert_eq!(lanes.len(), 8);
        _mm512_set_epi64(
            lanes[7] as i64,
            lanes[6] as i64,
            lanes[5] as i64,
            lanes[4] as i64,
            lanes[3] as i64,
            lanes[2] as i64,
            lanes[1] as i64,
            lanes[0] as i64,
        )
    }

    #[inline(always)]
    unsafe fn xor(&self, a: __m512i, b: __m512i) -> __m512i {
        _mm512_xor_si512(a, b)
    }

    #[inline(always)]
    unsafe fn add64(&self, a: __m512i, b: __m512i) -> __m512i {
        _mm512_add_epi64(a, b)
    }

    #[inline(always)]
    unsafe fn lane_offsets(&self) -> __m512i {
        _mm512_set_epi64(56, 48, 40, 32, 24, 16, 8, 0)
    }

    #[inline(always)]
    unsafe fn shl64(&self, v: __m512i, n: u32) -> __m512i {
        unroll64!(_mm512_slli_epi64, v, n)
    }

    #[inline(always)]
    unsafe fn shr64(&self, v: __m512i, n: u32) -> __m512i {
        unroll64!(_mm512_srli_epi64, v, n)
    }

    #[inline(always)]
    unsafe fn shr32(&self, v: __m512i, n: u32) -> __m512i {
        unroll32!(_mm512_srli_epi32, v, n)
    }

    #[inline(always)]
    unsafe fn shl16(&self, v: __m512i, n: u32) -> __m512i {
        unroll16!(_mm512_slli_epi16, v, n)
    }

    #[inline(always)]
    unsafe fn shr16(&self, v: __m512i, n: u32) -> __m512i {
        unroll16!(_mm512_srli_epi16, v, n)
    }

    #[inline(always)]
    unsafe fn shl8(&self, v: __m512i, n: u32) -> __m512i {
        debug_assert!(n < 8);
        _mm512_and_si512(self.shl16(v, n), self.splat8(0xFFu8 << n))
    }

    #[inline(always)]
    unsafe fn shr8(&self, v: __m512i, n: u32) -> __m512i {
        debug_assert!(n < 8);
        _mm512_and_si512(self.shr16(v, n), self.splat8(0xFFu8 >> n))
    }

    #[inline(always)]
    unsafe fn store(&self, mem: *mut u8, off: usize, v: __m512i) {
        _mm512_stream_si512(mem.add(off).cast(), v);
    }

    #[inline(always)]
    unsafe fn verify(&self, mem: *const u8, off: usize, expected: __m512i, errors: &AtomicU64) {
        let actual = _mm512_load_si512(mem.add(off).cast());
        // Serialize the load against the preceding store sweep before the
        // mask compare.
        _mm_lfence();
        let mask: __mmask64 = _mm512_cmpneq_epu8_mask(expected, actual);

        if mask != 0 {
            let bad = mask.count_ones() as u64;
            eprintln!("{bad} errors detected at offset 0x{off:016x} [error mask: 0x{mask:016x}]");
            errors.fetch_add(bad, Ordering::Relaxed);
        }
    }

    #[inline(always)]
    unsafe fn fence(&self) {
        _mm_sfence();
    }
}
