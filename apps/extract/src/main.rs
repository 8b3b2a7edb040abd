use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use r5u87x_core::ihex::{self, ExtractError};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about = "Produces Intel HEX files from Ricoh webcam microcode dumps", long_about = None)]
struct Args {
    /// Raw microcode dump
    firmware: PathBuf,

    /// Write the hex image here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn extract(args: &Args) -> Result<usize> {
    let input = File::open(&args.firmware)
        .map_err(ExtractError::Io)
        .with_context(|| format!("open firmware {}", args.firmware.display()))?;
    let dump = ihex::read_dump(input)?;
    info!(bytes = dump.len(), "Read microcode dump");

    // Encode before touching the output so a bad dump leaves no partial image.
    let mut image = Vec::new();
    let records = ihex::write_hex(&dump, &mut image)?;

    match &args.output {
        Some(path) => {
            let file = File::create(path)
                .map_err(ExtractError::Write)
                .with_context(|| format!("create {}", path.display()))?;
            let mut out = BufWriter::new(file);
            out.write_all(&image)
                .and_then(|_| out.flush())
                .map_err(ExtractError::Write)
                .with_context(|| format!("write {}", path.display()))?;
        }
        None => {
            let mut out = io::stdout().lock();
            out.write_all(&image)
                .and_then(|_| out.flush())
                .map_err(ExtractError::Write)?;
        }
    }
    Ok(records)
}

fn main() {
    let args = Args::parse();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(if args.verbose {
                    tracing::Level::DEBUG.into()
                } else {
                    tracing::Level::WARN.into()
                })
                .from_env_lossy(),
        )
        .with_writer(io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    match extract(&args) {
        Ok(records) => info!(records, "Wrote hex image"),
        Err(e) => {
            error!("Error: {:#}", e);
            let code = e
                .downcast_ref::<ExtractError>()
                .map(ExtractError::exit_code)
                .unwrap_or(1);
            std::process::exit(code);
        }
    }
}
