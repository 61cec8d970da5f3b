//! XDL command line downloader
//!
//! Waits for a terminal in download mode, optionally sets config variables,
//! uploads each file and leaves download mode.
//!
//! Usage:
//!   xdl [OPTIONS] FILE...
//!
//! Set `RUST_LOG` to override the log filter chosen by `-v`.

use anyhow::{Context, Result};
use clap::Parser;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use xdl_core::protocol::{
    list_ports, open_port, FileKind, Session, SessionConfig, DEFAULT_BAUD_RATE, DEFAULT_DEVICE,
};
use xdl_core::transfer::{send_file, TransferOptions, UploadSource};

#[derive(Parser, Debug)]
#[command(name = "xdl", version, about = "Download files to a VFI terminal")]
struct Args {
    /// Enable logging (repeat for more detail)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// TTY device
    #[arg(short, long, env = "XDL_DEVICE", default_value = DEFAULT_DEVICE)]
    device: String,

    /// Baud rate
    #[arg(short, long, env = "XDL_BAUD", default_value_t = DEFAULT_BAUD_RATE)]
    baud: u32,

    /// Config variable and value
    #[arg(short = 'c', value_name = "VAR=VAL", value_parser = parse_config_var)]
    config: Vec<(String, String)>,

    /// Send files as data instead of code
    #[arg(long)]
    data: bool,

    /// Give up waiting for the terminal after this many seconds
    #[arg(long, value_name = "SECS")]
    connect_timeout: Option<u64>,

    /// Accept reply frames with a bad checksum
    #[arg(long)]
    no_verify: bool,

    /// List serial ports and exit
    #[arg(long)]
    list_ports: bool,

    /// Files to send
    #[arg(value_name = "FILE", required_unless_present = "list_ports")]
    files: Vec<PathBuf>,
}

impl Args {
    fn session_config(&self) -> SessionConfig {
        SessionConfig {
            connect_timeout: self.connect_timeout.map(Duration::from_secs),
            verify_checksums: !self.no_verify,
            ..SessionConfig::default()
        }
    }

    fn transfer_options(&self) -> TransferOptions {
        TransferOptions {
            kind: if self.data {
                FileKind::Data
            } else {
                FileKind::Code
            },
            ..TransferOptions::default()
        }
    }
}

/// Split `VAR=VAL` at the first `=`
fn parse_config_var(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((var, val)) if !var.is_empty() => Ok((var.to_string(), val.to_string())),
        _ => Err(format!("invalid config var: {s}")),
    }
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default.into()),
        )
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    if args.list_ports {
        for port in list_ports()? {
            match port.product {
                Some(product) => println!("{}\t{}", port.name, product),
                None => println!("{}", port.name),
            }
        }
        return Ok(());
    }

    let channel = open_port(&args.device, args.baud)
        .with_context(|| format!("failed to open {}", args.device))?;
    let port_name = channel.name().unwrap_or_else(|| args.device.clone());
    info!("opened {}:{}", port_name, args.baud);

    let mut session = Session::new(channel, args.session_config());
    info!("trying to connect...");
    session.connect().context("handshake failed")?;

    for (var, val) in &args.config {
        session
            .set_config_var(var, val)
            .with_context(|| format!("failed to set {var}={val}"))?;
    }

    let options = args.transfer_options();
    let show_progress = args.verbose > 0;
    for file in &args.files {
        let source = UploadSource::open(file)
            .with_context(|| format!("failed to open {}", file.display()))?;
        send_file(&mut session, source, &options, |progress| {
            if show_progress {
                eprint!("\rProgress: {}%", progress.percent());
                let _ = std::io::stderr().flush();
            }
        })
        .with_context(|| format!("failed to send {}", file.display()))?;
        if show_progress {
            eprintln!("\rProgress: 100%");
        }
    }

    session.stop()?;
    Ok(())
}
