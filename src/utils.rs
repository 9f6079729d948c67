use clap::Parser;
use sysinfo::{System, SystemExt};

#[derive(Parser, Debug)]
#[command(version, about = "SIMD DRAM stress tester", long_about = None)]
pub struct Args {
    /// Percentage of total physical RAM to lock and test, e.g. "85%"
    #[clap(value_parser = parse_ram_spec, value_name = "RAM%")]
    pub ram_percent: u64,

    /// Number of full passes over the test catalog (0 = run until interrupted)
    #[clap(short = 'l', long = "loops", default_value = "0")]
    pub loops: u64,

    /// Number of logical cores to use (default: all cores in the affinity mask)
    #[clap(short = 'c', long = "cores")]
    pub cores: Option<usize>,

    /// Directory to also write ramstress.log into
    #[clap(short = 'L', long = "log-path", value_name = "DIR")]
    pub log_path: Option<String>,
}

/// Parses the positional RAM argument: a percentage of total physical RAM,
/// with an optional `%` suffix.
pub fn parse_ram_spec(s: &str) -> Result<u64, String> {
    let digits = s.trim().trim_end_matches('%');
    let percent = digits
        .parse::<u64>()
        .map_err(|_| format!("invalid RAM percentage: \"{s}\""))?;
    if percent == 0 || percent > 100 {
        return Err(format!("RAM percentage must be within 1-100, got {percent}"));
    }
    Ok(percent)
}

pub fn page_size() -> usize {
    let page = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if page > 0 {
        page as usize
    } else {
        4096
    }
}

/// Total and available physical memory in bytes.
pub fn memory_info() -> (u64, u64) {
    let mut system = System::new();
    system.refresh_memory();
    (system.total_memory(), system.available_memory())
}

pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes}B")
    } else {
        format!("{value:.2}{}", UNITS[unit])
    }
}

// ================================================================================================
// Locked buffer allocation
// ================================================================================================

use std::alloc::{alloc, dealloc, Layout};

/// A block of memory aligned to the page size and locked into physical RAM
/// with `mlock`. Unlocked and deallocated on drop.
pub struct LockedBuffer {
    ptr: *mut u8,
    layout: Layout,
}

impl LockedBuffer {
    /// Allocates and locks `size` bytes, rounded up to a page multiple.
    /// Locking may fail without CAP_IPC_LOCK or a raised RLIMIT_MEMLOCK.
    pub fn new(size: usize) -> Result<Self, String> {
        let page = page_size();
        let rounded = (size + page - 1) & !(page - 1);
        let layout = Layout::from_size_align(rounded, page)
            .map_err(|e| format!("bad buffer layout: {e}"))?;

        let ptr = unsafe { alloc(layout) };
        if ptr.is_null() {
            return Err(format!(
                "failed to allocate {} of test memory",
                format_bytes(rounded as u64)
            ));
        }

        let locked = unsafe { libc::mlock(ptr as *const libc::c_void, rounded) };
        if locked != 0 {
            let err = std::io::Error::last_os_error();
            unsafe { dealloc(ptr, layout) };
            return Err(format!(
                "failed to lock {} into RAM: {err} (needs CAP_IPC_LOCK or a raised RLIMIT_MEMLOCK)",
                format_bytes(rounded as u64)
            ));
        }

        Ok(Self { ptr, layout })
    }

    pub fn size(&self) -> usize {
        self.layout.size()
    }

    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.ptr
    }
}

impl Drop for LockedBuffer {
    fn drop(&mut self) {
        unsafe {
            // munlock cannot be usefully handled here; the deallocation
            // below releases the pages either way.
            let _ = libc::munlock(self.ptr as *const libc::c_void, self.layout.size());
            dealloc(self.ptr, self.layout);
        }
    }
}
