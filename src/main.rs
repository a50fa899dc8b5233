//! airq_chords - Air-Quality Readings to CHORDS
//!
//! Reads the sensor cluster every report interval and forwards each reading
//! to a CHORDS portal through the background delivery queue.

use anyhow::Context;
use airq_chords::{
    start_status_server, AirqDevice, CollectionLoop, Config, DeliveryQueue, HttpTransport,
    WirelessProbe,
};
use clap::error::ErrorKind;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(name = "airq_chords")]
#[command(about = "Forward air-quality sensor readings to a CHORDS portal")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Configuration document; the built-in test configuration is used when omitted
    config_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) if matches!(err.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            err.exit()
        }
        Err(_) => {
            let program = std::env::args().next().unwrap_or_else(|| "airq_chords".to_string());
            eprintln!("Usage: {} [config_file]", program);
            std::process::exit(1);
        }
    };

    init_logging()?;
    print_banner();

    let config = load_config(&cli)?;
    println!("{}", serde_json::to_string(&config.airq)?);

    let transport = Arc::new(HttpTransport::new().context("cannot build HTTP client")?);
    let (queue, worker) = DeliveryQueue::spawn(transport, config.retry_policy());

    if let Some(status_config) = config.status.clone() {
        let status_queue = queue.clone();
        tokio::spawn(async move {
            if let Err(err) = start_status_server(status_config, status_queue).await {
                error!(error = %err, "status server exited");
            }
        });
    }

    let device = AirqDevice::new(&config.airq);
    let probe = WirelessProbe::new(config.airq.wireless_interface.clone());
    let collection = CollectionLoop::new(&config, device, probe, queue.clone())?;

    info!(
        host = %config.chords.host,
        inst_id = %config.chords.inst_id,
        interval_secs = config.airq.report_interval,
        delivery_enabled = config.chords.enabled,
        "collection loop starting"
    );

    tokio::select! {
        _ = collection.run() => {}
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
        }
    }

    match queue.shutdown().await {
        Ok(status) => info!(
            delivered = status.delivered,
            expired = status.expired,
            overflowed = status.overflowed,
            abandoned = status.pending(),
            "delivery queue stopped"
        ),
        Err(err) => error!(error = %err, "delivery queue already stopped"),
    }
    let _ = worker.await;

    Ok(())
}

fn init_logging() -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    Ok(())
}

fn print_banner() {
    let args: Vec<String> = std::env::args().collect();
    println!("airq_chords - air-quality readings to CHORDS");
    println!("   Version: {}", env!("CARGO_PKG_VERSION"));
    println!("   Starting {:?}", args);
    println!();
}

fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    match &cli.config_file {
        Some(path) => Config::load(path)
            .with_context(|| format!("invalid configuration {}", path.display())),
        None => Config::builtin().context("invalid built-in configuration"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::try_parse_from(["airq_chords", "/etc/airq.json"]).unwrap();
        assert_eq!(cli.config_file, Some(PathBuf::from("/etc/airq.json")));
    }

    #[test]
    fn test_default_values() {
        let cli = Cli::try_parse_from(["airq_chords"]).unwrap();
        assert!(cli.config_file.is_none());
        assert!(load_config(&cli).is_ok());
    }

    #[test]
    fn test_extra_arguments_rejected() {
        let err = Cli::try_parse_from(["airq_chords", "a.json", "b.json"]).unwrap_err();
        assert!(!matches!(err.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion));
    }
}
