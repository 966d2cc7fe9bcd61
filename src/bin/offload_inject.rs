//! Offload injection driver.
//!
//! Reads a host pipeline in text form, offloads every loop tagged for the
//! device, and prints the rewritten pipeline.

use clap::Parser;
use offload::device::DeviceTarget;
use offload::ir::DeviceApi;
use offload::text::parse_program;
use offload::{OffloadConfig, OffloadPass};
use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "offload-inject")]
#[command(about = "Offload device-tagged loops of a host pipeline to a remote device", long_about = None)]
struct Args {
    /// Pipeline to transform (stdin when omitted)
    #[arg(value_name = "FILE")]
    input: Option<PathBuf>,

    /// Device whose loops are offloaded
    #[arg(long, default_value = "hexagon", value_parser = parse_device)]
    device: DeviceApi,

    /// Target the device image is compiled for
    #[arg(long, default_value = "x86-64-sim", value_parser = parse_target)]
    target: DeviceTarget,

    /// Host pointer width in bytes
    #[arg(long, default_value_t = 8)]
    pointer_bytes: u8,

    /// Write the compiled device code to this file
    #[arg(long, value_name = "PATH")]
    emit_blob: Option<PathBuf>,

    /// Print the device image after the pipeline
    #[arg(long)]
    print_image: bool,

    /// Print offload statistics to stderr
    #[arg(long)]
    stats: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn parse_device(name: &str) -> Result<DeviceApi, String> {
    DeviceApi::from_name(name).ok_or_else(|| format!("unknown device '{name}'"))
}

fn parse_target(name: &str) -> Result<DeviceTarget, String> {
    DeviceTarget::from_name(name).ok_or_else(|| format!("unknown target '{name}'"))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let level = match args.verbose {
        0 => log::LevelFilter::Info,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::from_default_env().filter_level(level).init();

    let text = match &args.input {
        Some(path) => fs::read_to_string(path)?,
        None => {
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer)?;
            buffer
        }
    };

    let program = match parse_program(&text) {
        Ok(program) => program,
        Err(e) => {
            let file = args.input.as_ref().map_or("<stdin>".into(), |p| p.display().to_string());
            eprintln!("{file}:{e}");
            std::process::exit(1);
        }
    };

    let config = OffloadConfig {
        device: args.device,
        target: args.target,
        pointer_bytes: args.pointer_bytes,
    };
    let injected = OffloadPass::new(config).run(program.body.clone())?;

    print!("{}", program.with_body(injected.body));
    if args.print_image {
        print!("{}", injected.image);
    }

    if let Some(path) = &args.emit_blob {
        match &injected.device_code {
            Some(blob) => {
                fs::write(path, blob.bytes())?;
                log::info!("Wrote {} bytes of device code to {}", blob.bytes().len(), path.display());
            }
            None => log::warn!("No device code to write to {}", path.display()),
        }
    }

    if args.stats {
        eprintln!("{}", injected.stats);
    }

    Ok(())
}
