// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! twsm-sim - simulated role handover between two earbuds
//!
//! Builds live A2DP, AVRCP and HFP state on a primary, marshals it in
//! chunks, feeds it to a secondary and commits the new role, with optional
//! fault injection at each phase.

mod device;

use anyhow::{bail, Context, Result};
use clap::Parser;
use device::Device;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use twsm::config::{CorruptStreamPolicy, HandoverConfig};
use twsm::handover::Outcome;
use twsm::logging::{flush_logger, init_logger, ConsoleOutput, FileOutput, LogLevel, Output};
use twsm::marshal::WireFormat;
use twsm::BdAddr;

#[derive(Parser, Debug)]
#[command(name = "twsm-sim")]
#[command(about = "Simulated A2DP/AVRCP/HFP role handover between two devices")]
#[command(version)]
struct Args {
    /// Phone address both devices are connected to
    #[arg(long, default_value = "00:02:5b:00:ea:01")]
    peer: BdAddr,

    /// Marshal buffer size in bytes
    #[arg(short, long, default_value = "64")]
    chunk: usize,

    /// Wire format (implicit, tagged); overrides the config file
    #[arg(short, long)]
    format: Option<WireFormat>,

    /// Handover configuration (YAML)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Reaction to a corrupt stream (panic, abort); overrides the config file
    #[arg(long)]
    corrupt_policy: Option<CorruptStreamPolicy>,

    /// Leave an A2DP transaction pending so the primary vetoes
    #[arg(long)]
    veto: bool,

    /// Invert the stream byte at this offset before delivery
    #[arg(long, value_name = "OFFSET")]
    corrupt: Option<usize>,

    /// Leave the RFCOMM channel closed on the secondary so HFP commit fails
    #[arg(long)]
    fail_commit: bool,

    /// Print the marshalled stream
    #[arg(short = 'x', long)]
    hex: bool,

    /// Log level (debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: LogLevel,

    /// Write the log to a file instead of the console
    #[arg(long, value_name = "FILE")]
    log_file: Option<PathBuf>,
}

fn main() {
    let args = Args::parse();

    if let Err(e) = init_logging(&args) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
    let result = run(&args);
    let _ = flush_logger();

    match result {
        Ok(Outcome::Completed) => {}
        Ok(_) => std::process::exit(2),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

fn init_logging(args: &Args) -> Result<()> {
    let output: Arc<dyn Output> = match &args.log_file {
        Some(path) => Arc::new(
            FileOutput::new(path, args.log_level)
                .with_context(|| format!("opening log file {}", path.display()))?,
        ),
        None => Arc::new(ConsoleOutput::new(args.log_level)),
    };
    init_logger(output, args.log_level);
    Ok(())
}

fn load_config(args: &Args) -> Result<HandoverConfig> {
    let mut config = match &args.config {
        Some(path) => HandoverConfig::from_yaml_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => HandoverConfig::default(),
    };
    if let Some(format) = args.format {
        config = config.with_wire_format(format);
    }
    if let Some(policy) = args.corrupt_policy {
        config = config.with_corrupt_stream(policy);
    }
    Ok(config)
}

fn run(args: &Args) -> Result<Outcome> {
    if args.chunk == 0 {
        bail!("chunk size must be at least 1 byte");
    }
    let config = load_config(args)?;
    println!(
        "=== twsm handover: format {}, chunk {} bytes ===\n",
        config.wire_format, args.chunk
    );

    let mut primary = Device::new("primary", 0x100, config.clone())?;
    let mut secondary = Device::new("secondary", 0x900, config)?;
    primary.connect(args.peer)?;
    secondary.open_links(args.peer, !args.fail_commit);

    if args.veto {
        if let Some(device) = primary.tables.a2dp.lock().remote_conn[0].as_mut() {
            device.signal.status.pending_issued_transaction = true;
        }
    }

    let now = Instant::now();
    for side in [&mut primary, &mut secondary] {
        if side.controller.veto(args.peer, now)? {
            println!("{} vetoed the handover", side.name);
            return Ok(Outcome::Vetoed);
        }
    }

    let mut stream = marshal_all(&mut primary, args.chunk)?;
    println!(
        "marshalled {} bytes in {} chunk(s)",
        stream.len(),
        stream.len().div_ceil(args.chunk)
    );

    if let Some(offset) = args.corrupt {
        match stream.get_mut(offset) {
            Some(byte) => {
                *byte = !*byte;
                println!("inverted byte {} (now {:#04x})", offset, *byte);
            }
            None => bail!("corrupt offset {} beyond stream of {} bytes", offset, stream.len()),
        }
    }
    if args.hex {
        print_hex(&stream);
    }

    for piece in stream.chunks(args.chunk) {
        if let Err(e) = secondary.controller.unmarshal(piece) {
            println!("secondary rejected the stream: {}", e);
            primary.controller.abort();
            return report(&primary, &secondary);
        }
    }

    primary.controller.commit(false)?;
    if let Err(e) = secondary.controller.commit(true) {
        println!("secondary commit failed: {}", e);
        primary.controller.abort();
        return report(&primary, &secondary);
    }
    primary.controller.complete()?;
    secondary.controller.complete()?;

    println!();
    secondary.print_streams();
    report(&primary, &secondary)
}

fn marshal_all(primary: &mut Device, chunk: usize) -> Result<Vec<u8>> {
    let mut stream = Vec::new();
    let mut buf = vec![0u8; chunk];
    loop {
        let progress = primary.controller.marshal(&mut buf)?;
        stream.extend_from_slice(&buf[..progress.bytes]);
        if progress.done {
            return Ok(stream);
        }
    }
}

fn report(primary: &Device, secondary: &Device) -> Result<Outcome> {
    let outcome = secondary
        .controller
        .last_outcome()
        .context("secondary finished without an outcome")?;
    println!();
    for side in [primary, secondary] {
        let last = side
            .controller
            .last_outcome()
            .map_or_else(|| "-".to_string(), |o| o.to_string());
        println!("{:<10} {}", side.name, last);
    }
    Ok(outcome)
}

fn print_hex(stream: &[u8]) {
    for (row, line) in stream.chunks(16).enumerate() {
        let bytes: Vec<String> = line.iter().map(|b| format!("{:02x}", b)).collect();
        println!("{:04x}  {}", row * 16, bytes.join(" "));
    }
}
