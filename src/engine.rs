// The block-iteration engine. The buffer is split into one chunk per
// worker; a sweep walks every chunk in parallel while each worker visits
// its own offsets strictly in order, ascending or descending. The join of
// the parallel iterator is the sweep barrier, and every worker drains its
// non-temporal writes with a store fence before reaching it.

use std::error::Error;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use rayon::prelude::*;

use crate::cpu_utils;
use crate::rng::SimdXorshift;
use crate::simd::Simd;

/// Shared view of the buffer under test. Workers turn the handle back into
/// a typed pointer at sweep entry; the disjoint chunk partition is what
/// keeps the concurrent accesses sound.
#[derive(Clone, Copy)]
pub struct MemHandle(*mut u8);

unsafe impl Send for MemHandle {}
unsafe impl Sync for MemHandle {}

impl MemHandle {
    pub fn new(ptr: *mut u8) -> Self {
        Self(ptr)
    }

    pub fn ptr(self) -> *mut u8 {
        self.0
    }
}

pub struct Engine<B: Simd> {
    backend: B,
    cpus: usize,
    errors: AtomicU64,
    rng: Mutex<SimdXorshift<B>>,
    pool: rayon::ThreadPool,
}

impl<B: Simd> Engine<B> {
    /// Builds the engine with its own worker pool, one worker per chunk,
    /// each pinned to a core where the OS allows it. The backend must match
    /// a previously detected instruction set.
    pub fn new(backend: B, cpus: usize, seed: (u64, u64)) -> Result<Self, Box<dyn Error>> {
        assert!(cpus > 0, "engine needs at least one worker");
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(cpus)
            .thread_name(|i| format!("sweep-{i}"))
            .start_handler(|i| {
                // Pinning is best effort; an unpinnable worker still sweeps
                // its chunk correctly.
                let _ = cpu_utils::bind_thread_to_core(i);
            })
            .build()?;
        let rng = unsafe { SimdXorshift::seeded(&backend, seed.0, seed.1) };
        Ok(Self {
            backend,
            cpus,
            errors: AtomicU64::new(0),
            rng: Mutex::new(rng),
            pool,
        })
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn cpus(&self) -> usize {
        self.cpus
    }

    /// Mismatched bytes observed so far, across all tests this process.
    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    pub fn error_counter(&self) -> &AtomicU64 {
        &self.errors
    }

    /// Draws the next random vector. Only called from pattern setup between
    /// sweeps, never inside one.
    pub fn next_random(&self) -> B::Vector {
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        unsafe { rng.next(&self.backend) }
    }

    fn chunk_len(&self, size: usize) -> usize {
        let chunk = size / self.cpus;
        debug_assert_eq!(chunk * self.cpus, size);
        debug_assert_eq!(chunk % B::VECTOR_BYTES, 0);
        chunk
    }

    /// One parallel pass over every aligned offset, ascending within each
    /// chunk. Returns only after all workers have fenced and finished.
    pub fn sweep_up<F>(&self, size: usize, f: F)
    where
        F: Fn(usize) + Sync,
    {
        let chunk = self.chunk_len(size);
        self.pool.install(|| {
            (0..self.cpus).into_par_iter().for_each(|i| {
                for j in (0..chunk).step_by(B::VECTOR_BYTES) {
                    f(i * chunk + j);
                }
                unsafe { self.backend.fence() };
            });
        });
    }

    /// The descending counterpart: chunks are claimed last-first and each
    /// worker visits its offsets high-to-low. Several tests depend on this
    /// observed order to catch directional coupling.
    pub fn sweep_down<F>(&self, size: usize, f: F)
    where
        F: Fn(usize) + Sync,
    {
        let chunk = self.chunk_len(size);
        self.pool.install(|| {
            (0..self.cpus).into_par_iter().rev().for_each(|i| {
                for j in (0..chunk).step_by(B::VECTOR_BYTES).rev() {
                    f(i * chunk + j);
                }
                unsafe { self.backend.fence() };
            });
        });
    }

    pub fn fill_up(&self, mem: MemHandle, size: usize, v: B::Vector) {
        let b = &self.backend;
        self.sweep_up(size, |off| unsafe { b.store(mem.ptr(), off, v) });
    }

    pub fn fill_down(&self, mem: MemHandle, size: usize, v: B::Vector) {
        let b = &self.backend;
        self.sweep_down(size, |off| unsafe { b.store(mem.ptr(), off, v) });
    }

    pub fn verify_up(&self, mem: MemHandle, size: usize, expected: B::Vector) {
        let b = &self.backend;
        self.sweep_up(size, |off| unsafe {
            b.verify(mem.ptr(), off, expected, &self.errors)
        });
    }

    pub fn verify_down(&self, mem: MemHandle, size: usize, expected: B::Vector) {
        let b = &self.backend;
        self.sweep_down(size, |off| unsafe {
            b.verify(mem.ptr(), off, expected, &self.errors)
        });
    }
}
