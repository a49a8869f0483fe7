//! Demand-paging demo driver
//!
//! Usage: vmsim [OPTIONS]
//!
//! Allocates more simulated pages than the real-memory pool can hold,
//! writes a distinct pattern to each, reads everything back through
//! the page tables, and prints what the paging machinery did.
//!
//! Options:
//!   -v, --verbose        Log every fault, eviction, and load to stderr
//!   -p, --pages <N>      Number of simulated pages to exercise
//!       --real-bytes <N>   Real-memory region size in bytes
//!       --store-bytes <N>  Backing-store size in bytes
//!   -h, --help           Print help information

use std::env;
use std::process;

use vmsim::constants::PAGE_SIZE;
use vmsim::vm_manager::{VmConfig, VmSim};

/// Command-line configuration
struct Config {
    pages: usize,
    real_bytes: Option<usize>,
    store_bytes: Option<usize>,
    verbose: bool,
}

/// Minimal stderr logger behind the `log` facade
struct StderrLogger;

impl log::Log for StderrLogger {
    fn enabled(&self, _metadata: &log::Metadata) -> bool {
        true
    }

    fn log(&self, record: &log::Record) {
        eprintln!("{:>5}  {}", record.level(), record.args());
    }

    fn flush(&self) {}
}

static LOGGER: StderrLogger = StderrLogger;

fn main() {
    let config = match parse_args() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            process::exit(1);
        }
    };

    if config.verbose {
        log::set_logger(&LOGGER).expect("logger already installed");
        log::set_max_level(log::LevelFilter::Trace);
    }

    if let Err(e) = run(&config) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn print_help(program: &str) {
    eprintln!("Demand-paged virtual memory simulator demo");
    eprintln!();
    eprintln!("Usage: {} [OPTIONS]", program);
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -v, --verbose          Log every fault, eviction, and load");
    eprintln!("  -p, --pages <N>        Simulated pages to exercise (default: pool size + 2)");
    eprintln!("      --real-bytes <N>   Real-memory region size in bytes");
    eprintln!("      --store-bytes <N>  Backing-store size in bytes");
    eprintln!("  -h, --help             Print this help message");
    eprintln!();
    eprintln!("The VMSIM_REAL_MEM_SIZE and VMSIM_BS_SIZE environment variables");
    eprintln!("override the default region sizes; the flags override both.");
}

fn parse_args() -> Result<Config, String> {
    let args: Vec<String> = env::args().collect();
    let program = args[0].clone();

    let mut config = Config { pages: 0, real_bytes: None, store_bytes: None, verbose: false };

    let mut iter = args[1..].iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-v" | "--verbose" => config.verbose = true,
            "-h" | "--help" => {
                print_help(&program);
                process::exit(0);
            }
            "-p" | "--pages" => config.pages = parse_value(arg, iter.next())?,
            "--real-bytes" => config.real_bytes = Some(parse_value(arg, iter.next())?),
            "--store-bytes" => config.store_bytes = Some(parse_value(arg, iter.next())?),
            other => return Err(format!("Unknown argument: {} (try --help)", other)),
        }
    }

    Ok(config)
}

fn parse_value(flag: &str, value: Option<&String>) -> Result<usize, String> {
    let value = value.ok_or_else(|| format!("{} requires a value", flag))?;
    value.parse().map_err(|_| format!("{} requires a number, got {:?}", flag, value))
}

fn run(config: &Config) -> Result<(), String> {
    let mut sizes = VmConfig::from_env();
    if let Some(bytes) = config.real_bytes {
        sizes.real_memory_size = bytes;
    }
    if let Some(bytes) = config.store_bytes {
        sizes.backing_store_size = bytes;
    }

    let mut vm = VmSim::new(sizes);
    let pool = vm.pool_frames();
    let pages = if config.pages > 0 { config.pages } else { pool + 2 };
    println!(
        "real memory: {} bytes ({} pool frames), backing store: {} bytes, exercising {} pages",
        sizes.real_memory_size, pool, sizes.backing_store_size, pages
    );

    // Write a page-sized pattern to each simulated page.  Once the
    // pool fills, further writes run the clock and spill to the store.
    let base = vm.alloc(pages * PAGE_SIZE);
    for i in 0..pages {
        let data = page_pattern(i);
        vm.write(&data, base + (i * PAGE_SIZE) as u32);
    }

    // Read everything back, faulting the spilled pages in again.
    let mut mismatches = 0;
    let mut buf = vec![0u8; PAGE_SIZE];
    for i in 0..pages {
        vm.read(&mut buf, base + (i * PAGE_SIZE) as u32);
        if buf != page_pattern(i) {
            mismatches += 1;
            eprintln!("page {} read back wrong contents", i);
        }
    }

    let stats = vm.stats();
    println!(
        "faults: {}, tables: {}, pages created: {}, evictions: {}, loads: {}",
        stats.faults, stats.tables_allocated, stats.pages_created, stats.evictions, stats.loads
    );

    if mismatches > 0 {
        return Err(format!("{} of {} pages failed verification", mismatches, pages));
    }
    println!("all {} pages verified", pages);
    Ok(())
}

fn page_pattern(index: usize) -> Vec<u8> {
    (0..PAGE_SIZE).map(|i| ((index * 37 + i) % 251) as u8).collect()
}
