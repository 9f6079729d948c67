use std::error::Error;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use clap::Parser;

mod cpu_utils;
mod engine;
mod logger;
mod rng;
#[cfg(test)]
mod sim;
mod simd;
mod simd_avx2;
mod simd_avx512;
mod utils;

use cpu_utils::InstructionSet;
use engine::{Engine, MemHandle};
use simd::Simd;
use simd_avx2::Avx2;
use simd_avx512::Avx512;
use tests::TestCase;
use utils::{format_bytes, Args, LockedBuffer};

// Set from the signal handler; checked between passes so a pass in flight
// always completes before the driver exits the loop.
static STOP: AtomicBool = AtomicBool::new(false);

extern "C" fn on_stop_signal(_: libc::c_int) {
    STOP.store(true, Ordering::Relaxed);
}

fn install_stop_handler() {
    let handler = on_stop_signal as extern "C" fn(libc::c_int) as libc::sighandler_t;
    unsafe {
        libc::signal(libc::SIGINT, handler);
        libc::signal(libc::SIGTERM, handler);
    }
}

fn main() {
    let args = Args::parse();

    let log_file = args
        .log_path
        .as_deref()
        .map(|dir| format!("{}/ramstress.log", dir.trim_end_matches('/')));
    if let Err(e) = logger::init_logger(log_file.as_deref()) {
        eprintln!("failed to initialize logger: {e}");
    }

    if let Err(e) = run(args) {
        log_error_fmt!("{e}");
        process::exit(1);
    }
}

fn run(args: Args) -> Result<(), Box<dyn Error>> {
    install_stop_handler();

    log_info_fmt!("ramstress v{}", env!("CARGO_PKG_VERSION"));

    let isa = cpu_utils::instruction_set();
    if isa == InstructionSet::Unsupported {
        return Err("this CPU supports neither AVX-512 nor AVX2; nothing to run".into());
    }

    let cpus = cpu_utils::worker_count(args.cores);
    let (total_ram, available_ram) = utils::memory_info();

    log_info_fmt!("instruction set: {}", isa.label());
    log_info_fmt!("worker threads:  {cpus}");
    log_info_fmt!(
        "physical RAM:    {} total, {} available",
        format_bytes(total_ram),
        format_bytes(available_ram)
    );
    match cpu_utils::ram_speed(true).or_else(|| cpu_utils::ram_speed(false)) {
        Some(speed) => log_info_fmt!("DDR speed:       {speed} MT/s"),
        None => log_warn_fmt!("DDR speed not readable from DMI"),
    }

    // The buffer is partitioned into one page-multiple chunk per worker, so
    // every chunk is also a multiple of the vector width.
    let quantum = (cpus * utils::page_size()) as u64;
    let requested = total_ram.saturating_mul(args.ram_percent) / 100;
    let size = (requested - requested % quantum) as usize;
    if size == 0 {
        return Err(format!(
            "{}% of RAM is less than one page per worker; raise the percentage",
            args.ram_percent
        )
        .into());
    }

    log_info_fmt!(
        "locking {} ({}% of total RAM)",
        format_bytes(size as u64),
        args.ram_percent
    );
    let buffer = LockedBuffer::new(size)?;

    let seed = cpu_utils::entropy_seed();
    match isa {
        InstructionSet::Avx512 => run_loop(
            Engine::new(Avx512, cpus, seed)?,
            tests::avx512_catalog(),
            buffer,
            args.loops,
        ),
        InstructionSet::Avx2 => run_loop(
            Engine::new(Avx2, cpus, seed)?,
            tests::avx2_catalog(),
            buffer,
            args.loops,
        ),
        InstructionSet::Unsupported => unreachable!(),
    }
}

fn run_loop<B: Simd>(
    engine: Engine<B>,
    catalog: Vec<TestCase<B>>,
    mut buffer: LockedBuffer,
    loops: u64,
) -> Result<(), Box<dyn Error>> {
    let mem = MemHandle::new(buffer.as_mut_ptr());
    let size = buffer.size();
    log_info_fmt!(
        "engine: {} ({}-byte vectors, {} workers)",
        B::LABEL,
        B::VECTOR_BYTES,
        engine.cpus()
    );
    let started = Instant::now();
    let mut pass = 0u64;

    loop {
        pass += 1;
        log_info_fmt!("pass {pass}");
        for test in &catalog {
            let start = Instant::now();
            unsafe { (test.run)(&engine, mem, size) };
            let secs = start.elapsed().as_secs_f64();
            let bytes = (size as u64) * (test.passes as u64) * (test.iters as u64);
            let bandwidth = bytes as f64 / secs.max(f64::EPSILON);
            log_info_fmt!(
                "  {:<24} {:>10} in {:>7.1}s ({:>10}/s)  errors: {}",
                test.name,
                format_bytes(bytes),
                secs,
                format_bytes(bandwidth as u64),
                engine.errors()
            );
        }
        if STOP.load(Ordering::Relaxed) {
            log_warn_fmt!("stop signal received");
            break;
        }
        if loops != 0 && pass >= loops {
            break;
        }
    }

    let errors = engine.errors();
    let elapsed = started.elapsed().as_secs_f64();
    if errors == 0 {
        log_success_fmt!("{pass} pass(es) in {elapsed:.0}s, no errors detected");
    } else {
        log_error_fmt!("{pass} pass(es) in {elapsed:.0}s, {errors} corrupted bytes detected");
    }
    Ok(())
}
