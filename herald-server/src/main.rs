//! Herald notification service entry point.
//!
//! ```bash
//! # Run with default configuration
//! herald-server
//!
//! # Run with a configuration file
//! herald-server --config /etc/herald/herald.yaml
//!
//! # Override the bind address
//! HERALD_PORT=9000 herald-server
//! ```

use std::path::PathBuf;

use clap::Parser;
use tracing::error;

use herald_core::HeraldConfig;
use herald_server::{HeraldServer, init_logging};

/// Herald notification delivery service.
#[derive(Parser, Debug)]
#[command(name = "herald-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file.
    #[arg(short, long, default_value = "herald.yaml")]
    config: PathBuf,

    /// Override the bind host.
    #[arg(long, env = "HERALD_HOST")]
    host: Option<String>,

    /// Override the bind port.
    #[arg(long, env = "HERALD_PORT")]
    port: Option<u16>,

    /// Enable debug logging.
    #[arg(short, long)]
    debug: bool,

    /// Validate the configuration and exit.
    #[arg(long)]
    validate: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    if args.validate {
        println!("Configuration is valid");
        return;
    }

    init_logging(&config.logging);

    let server = match HeraldServer::new(config) {
        Ok(server) => server,
        Err(e) => {
            error!("Failed to build server: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = server.run().await {
        error!("Server error: {e}");
        std::process::exit(1);
    }
}

fn load_config(args: &Args) -> Result<HeraldConfig, Box<dyn std::error::Error>> {
    let mut config = if args.config.exists() {
        HeraldConfig::load(&args.config)?
    } else {
        eprintln!(
            "Configuration file not found: {}, using defaults",
            args.config.display()
        );
        HeraldConfig::default()
    };

    if let Some(host) = &args.host {
        config.server.host.clone_from(host);
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if args.debug {
        config.logging.level = "debug".to_string();
    }

    Ok(config)
}
