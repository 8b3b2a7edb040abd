use anyhow::{Context, Result};
use clap::Parser;
use r5u87x_core::session::{LoaderConfig, LoaderSession, Outcome};
use r5u87x_core::transport::{NusbTransport, TransportError};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about = "Ricoh R5U87x series firmware loader", long_about = None)]
struct Args {
    /// Path to microcode. %vid% and %pid% are substituted in.
    #[arg(short, long)]
    firmware: Option<String>,

    /// Fallback microcode path, tried when --firmware does not exist
    #[arg(long)]
    ucode_path: Option<String>,

    /// Forcefully clear the device before uploading microcode
    #[arg(long)]
    force_clear: bool,

    /// Don't actually load any microcode on to the device
    #[arg(long)]
    pretend: bool,

    /// Dump uploaded microcode payload to a file
    #[arg(long)]
    dump_ucode: bool,

    /// Dump file path. %vid% and %pid% are substituted in.
    #[arg(long)]
    dump_path: Option<String>,

    /// Load settings from a TOML file; flags override it
    #[arg(short, long)]
    config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn load_config(args: &Args) -> Result<LoaderConfig> {
    let mut config = match &args.config {
        Some(path) => LoaderConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config {}", path))?,
        None => LoaderConfig::default(),
    };

    if let Some(firmware) = &args.firmware {
        config.firmware = firmware.clone();
    }
    if let Some(ucode_path) = &args.ucode_path {
        config.ucode_path = Some(ucode_path.clone());
    }
    if let Some(dump_path) = &args.dump_path {
        config.dump_path = dump_path.clone();
    }
    config.force_clear |= args.force_clear;
    config.pretend |= args.pretend;
    config.dump_ucode |= args.dump_ucode;
    Ok(config)
}

fn main() {
    let args = Args::parse();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(if args.verbose {
                    tracing::Level::DEBUG.into()
                } else {
                    tracing::Level::INFO.into()
                })
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    info!("r5u87x firmware loader v{}", env!("CARGO_PKG_VERSION"));

    let config = match load_config(&args) {
        Ok(c) => c,
        Err(e) => {
            error!("Error: {:#}", e);
            std::process::exit(1);
        }
    };

    info!("Searching for device...");
    let (transport, device) = match NusbTransport::open() {
        Ok(found) => found,
        Err(TransportError::DeviceNotFound) => {
            error!("Failed to find any supported webcams");
            std::process::exit(1);
        }
        Err(e) => {
            error!("Failed to open USB device: {}", e);
            std::process::exit(1);
        }
    };

    let mut session = LoaderSession::new(&transport, device, config);
    match session.run() {
        Ok(Outcome::AlreadyLoaded) => {
            info!("Camera already has the right microcode");
        }
        Ok(Outcome::Pretended) => {
            info!("Pretend run complete, nothing was loaded");
        }
        Ok(Outcome::Uploaded) => {
            info!(
                "Successfully uploaded firmware to device {:04x}:{:04x}",
                device.vendor_id, device.product_id
            );
        }
        Err(e) => {
            error!("Failed to upload firmware to device: {}", e);
            if e.is_device_error() {
                error!("Try running as root?");
            }
            std::process::exit(e.exit_code());
        }
    }
}
