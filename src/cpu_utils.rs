// Hardware probing: instruction set selection, worker count from the CPU
// affinity mask, per-thread core binding, the RDRAND entropy source and the
// DMI RAM-speed lookup for the startup banner.

use std::fs;
use std::io::{Read, Seek, SeekFrom};

use rand::Rng;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstructionSet {
    Avx512,
    Avx2,
    Unsupported,
}

impl InstructionSet {
    pub fn label(self) -> &'static str {
        match self {
            InstructionSet::Avx512 => "AVX-512",
            InstructionSet::Avx2 => "AVX2",
            InstructionSet::Unsupported => "unsupported",
        }
    }
}

/// Picks the widest usable engine variant. AVX-512 needs both the
/// foundation and the byte/word instructions; the verify path masks and
/// counts individual bytes.
pub fn instruction_set() -> InstructionSet {
    if is_x86_feature_detected!("avx512f") && is_x86_feature_detected!("avx512bw") {
        InstructionSet::Avx512
    } else if is_x86_feature_detected!("avx2") {
        InstructionSet::Avx2
    } else {
        InstructionSet::Unsupported
    }
}

/// Number of worker threads: the size of the process affinity mask, capped
/// by the user's request when one was given.
pub fn worker_count(requested: Option<usize>) -> usize {
    let available = affinity_cpu_count().max(1);
    match requested {
        Some(n) if n > 0 => n.min(available),
        _ => available,
    }
}

fn affinity_cpu_count() -> usize {
    unsafe {
        let mut set: libc::cpu_set_t = std::mem::zeroed();
        if libc::sched_getaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &mut set) == 0 {
            let mut count = 0;
            for cpu in 0..libc::CPU_SETSIZE as usize {
                if libc::CPU_ISSET(cpu, &set) {
                    count += 1;
                }
            }
            if count > 0 {
                return count;
            }
        }
    }
    num_cpus::get()
}

/// Pins the current thread to one logical core. Fails when the core is not
/// present in the system's core list or the OS rejects the affinity change.
pub fn bind_thread_to_core(core_id: usize) -> Result<(), String> {
    let cores = core_affinity::get_core_ids()
        .ok_or_else(|| "could not enumerate logical cores".to_string())?;
    let core = cores
        .into_iter()
        .find(|c| c.id == core_id)
        .ok_or_else(|| format!("no logical core with id {core_id}"))?;
    if core_affinity::set_for_current(core) {
        Ok(())
    } else {
        Err(format!("OS rejected pinning to core {core_id}"))
    }
}

/// Two 64-bit seed words from the hardware entropy source. RDRAND output is
/// re-drawn while both words are zero (and on the instruction's transient
/// failure); CPUs without RDRAND fall back to the OS-seeded generator.
pub fn entropy_seed() -> (u64, u64) {
    if is_x86_feature_detected!("rdrand") {
        use std::arch::x86_64::_rdrand64_step;
        let (mut r1, mut r2) = (0u64, 0u64);
        for _ in 0..32 {
            let ok = unsafe { _rdrand64_step(&mut r1) == 1 && _rdrand64_step(&mut r2) == 1 };
            if ok && (r1 != 0 || r2 != 0) {
                return (r1, r2);
            }
        }
    }
    let mut rng = rand::thread_rng();
    loop {
        let (r1, r2) = (rng.gen::<u64>(), rng.gen::<u64>());
        if r1 != 0 || r2 != 0 {
            return (r1, r2);
        }
    }
}

/// Reads the DDR transfer rate in MT/s from the SMBIOS type-17 records
/// exposed under sysfs. `configured` selects the clocked speed (offset
/// 0x20) over the module's rated maximum (offset 0x15).
pub fn ram_speed(configured: bool) -> Option<u64> {
    let offset = if configured { 0x20 } else { 0x15 };
    let entries = glob::glob("/sys/firmware/dmi/entries/17-*/raw").ok()?;
    for path in entries.flatten() {
        let Ok(mut file) = fs::File::open(&path) else {
            continue;
        };
        if file.seek(SeekFrom::Start(offset)).is_err() {
            continue;
        }
        let mut buf = [0u8; 2];
        if file.read_exact(&mut buf).is_ok() {
            let speed = u16::from_le_bytes(buf);
            if speed > 0 {
                return Some(speed as u64);
            }
        }
    }
    None
}
