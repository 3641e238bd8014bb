//! Trace and listing tool for the 8051 / 80C552 simulator
//!
//! Usage:
//!   cargo run --release --example trace -- <command> <rom.bin> [options]
//!
//! Commands:
//!   listing <rom>          Print the recovered listing
//!   trace <rom> [steps]    Write a per-instruction trace log (default: 10000)
//!   run <rom> [steps]      Run and print the final register state (default: 100000)
//!   help                   Show this help message

use std::env;
use std::fs::{self, File};
use std::io::{BufWriter, Write};

use mcu51_core::{SimConfig, Simulator};

fn main() {
    let args: Vec<String> = env::args().collect();

    if args.len() < 3 {
        print_help();
        return;
    }

    let steps = |default: usize| args.get(3).and_then(|s| s.parse().ok()).unwrap_or(default);
    match args[1].as_str() {
        "listing" => cmd_listing(&args[2]),
        "trace" => cmd_trace(&args[2], steps(10_000)),
        "run" => cmd_run(&args[2], steps(100_000)),
        "help" | "--help" | "-h" => print_help(),
        _ => {
            eprintln!("Unknown command: {}", args[1]);
            print_help();
        }
    }
}

fn print_help() {
    println!(
        r#"8051 / 80C552 Simulator Trace Tool

Usage: cargo run --release --example trace -- <command> <rom.bin> [options]

Commands:
  listing <rom>          Print the recovered listing
  trace <rom> [steps]    Write a per-instruction trace log to traces/
                         Default: 10000 steps
  run <rom> [steps]      Run and print the final register state
                         Default: 100000 steps
  help                   Show this help message"#
    );
}

/// Load a raw binary image; a listing that stops early is reported, not fatal
fn create_sim(path: &str) -> Option<Simulator> {
    let image = match fs::read(path) {
        Ok(data) => data,
        Err(err) => {
            eprintln!("Cannot read {}: {}", path, err);
            return None;
        }
    };
    println!("Loaded {} bytes from {}", image.len(), path);

    let mut sim = match Simulator::new(
        SimConfig::default(),
        Box::new(mcu51_core::FlatBus::new(image.clone())),
        image,
    ) {
        Ok(sim) => sim,
        Err(err) => {
            eprintln!("Cannot create simulator: {}", err);
            return None;
        }
    };
    if let Err(err) = sim.build_listing() {
        eprintln!("Listing incomplete: {}", err);
    }
    Some(sim)
}

// === Listing ===

fn cmd_listing(path: &str) {
    let Some(sim) = create_sim(path) else {
        return;
    };
    println!("{}", sim.listing_text());
}

// === Trace Generation ===

fn cmd_trace(path: &str, max_steps: usize) {
    let Some(mut sim) = create_sim(path) else {
        return;
    };

    fs::create_dir_all("traces").ok();
    let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let output_path = format!("traces/mcu51_{}.log", timestamp);
    let file = File::create(&output_path).expect("Failed to create output file");
    let mut writer = BufWriter::new(file);

    println!("=== Trace Generation ({} steps) ===", max_steps);
    println!("Output: {}", output_path);

    log_trace_line(&mut writer, &sim, 0);

    let mut step = 0;
    while step < max_steps {
        if let Err(err) = sim.step() {
            eprintln!("Stopped at {:04X} after {} steps: {}", sim.pc(), step, err);
            break;
        }
        step += 1;
        log_trace_line(&mut writer, &sim, step);
    }

    writer.flush().expect("Failed to flush output");
    println!("Trace complete: {} steps / {} cycles", step, sim.cycles());
}

fn log_trace_line(writer: &mut BufWriter<File>, sim: &Simulator, step: usize) {
    let reg = |name: &str| sim.read_register(name).unwrap_or(0);
    let mnemonic = sim
        .listing()
        .get(sim.pc())
        .map(|entry| entry.mnemonic.as_str())
        .unwrap_or("???");
    writeln!(
        writer,
        "{:06} {:08} {:04X} A={:02X} B={:02X} PSW={:02X} SP={:02X} DPTR={:04X} {}",
        step,
        sim.cycles(),
        sim.pc(),
        reg("ACC"),
        reg("B"),
        reg("PSW"),
        reg("SP"),
        sim.read16("DPTR").unwrap_or(0),
        mnemonic
    )
    .expect("Failed to write trace line");
}

// === Run ===

fn cmd_run(path: &str, max_steps: usize) {
    let Some(mut sim) = create_sim(path) else {
        return;
    };

    match sim.run(max_steps) {
        Ok(executed) => println!("Ran {} steps", executed),
        Err(err) => eprintln!("Stopped at {:04X}: {}", sim.pc(), err),
    }

    println!("PC={:04X} cycles={}", sim.pc(), sim.cycles());
    for (address, row) in sim.bus.memory.rows() {
        let bytes: Vec<String> = row.iter().map(|b| format!("{:02X}", b)).collect();
        println!("{:03X}: {}", address, bytes.join(" "));
    }
    println!("\nRecent instructions:\n{}", sim.history().dump());
}
