use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use wifi_manager::{
    config::Settings,
    console,
    diagnostics::{DEFAULT_PING_COUNT, DEFAULT_PING_HOST},
    scan, server, WifiManager,
};

#[derive(Parser)]
#[command(name = "wifi-manager")]
#[command(about = "Discover, join and forget wireless networks on a headless device")]
#[command(version)]
struct Cli {
    /// Config file (defaults to <config dir>/wifi-manager/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the web interface and HTTP API
    Serve {
        /// Address to bind (overrides the config file)
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (overrides the config file)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Interactive menu
    Console,

    /// List visible networks
    Scan {
        /// Ask the radio for a fresh scan first
        #[arg(short, long)]
        rescan: bool,
    },

    /// Show the current connection
    Current,

    /// List saved networks
    Saved,

    /// Connect to a network
    Connect {
        /// SSID of the network to connect to
        ssid: String,

        /// Password (omit for open networks or to reuse a stored profile)
        #[arg(short, long)]
        password: Option<String>,
    },

    /// Forget a saved network
    Forget {
        /// SSID of the network to forget
        ssid: String,
    },

    /// Show interface, route and DNS diagnostics
    Diagnostics,

    /// Ping a host
    Ping {
        #[arg(default_value = DEFAULT_PING_HOST)]
        host: String,

        #[arg(short, long, default_value_t = DEFAULT_PING_COUNT)]
        count: u32,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref())?;
    init_logging(&settings);

    let manager = WifiManager::from_settings(&settings)?;

    match cli.command {
        Commands::Serve { host, port } => cmd_serve(manager, &settings, host, port).await,
        Commands::Console => console::run_console(&manager, io::stdin().lock(), io::stdout()),
        Commands::Scan { rescan } => cmd_scan(&manager, rescan),
        Commands::Current => cmd_current(&manager),
        Commands::Saved => cmd_saved(&manager),
        Commands::Connect { ssid, password } => cmd_connect(&manager, &ssid, password.as_deref()),
        Commands::Forget { ssid } => cmd_forget(&manager, &ssid),
        Commands::Diagnostics => cmd_diagnostics(&manager),
        Commands::Ping { host, count } => cmd_ping(&manager, &host, count),
    }
}

fn init_logging(settings: &Settings) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let app_name = env!("CARGO_PKG_NAME").replace('-', "_");
        let level = settings.logger.level.as_str();

        format!("{app_name}={level},tower_http={level}").into()
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

async fn cmd_serve(
    manager: WifiManager,
    settings: &Settings,
    host: Option<String>,
    port: Option<u16>,
) -> Result<()> {
    let config = server::ServerConfig {
        host: host.unwrap_or_else(|| settings.server.host.clone()),
        port: port.unwrap_or(settings.server.port),
        auth: settings.auth.clone(),
    };
    server::run_server(Arc::new(manager), config).await
}

fn cmd_scan(manager: &WifiManager, rescan: bool) -> Result<()> {
    println!("Scanning on interface: {}", manager.client_interface());
    println!();

    let networks = if rescan { manager.rescan() } else { manager.scan() };
    scan::write_network_table(&mut io::stdout(), &networks)?;

    Ok(())
}

fn cmd_current(manager: &WifiManager) -> Result<()> {
    match manager.current() {
        Some(current) => {
            println!("Network:    {}", current.ssid);
            println!("Profile:    {}", current.connection_name);
            println!("IP Address: {}", current.ip_address);
        }
        None => println!("Not connected to any network"),
    }

    Ok(())
}

fn cmd_saved(manager: &WifiManager) -> Result<()> {
    let saved = manager.saved_networks()?;

    if saved.is_empty() {
        println!("No saved networks.");
        return Ok(());
    }

    println!("{:<32} {:<20} {}", "SSID", "FIRST CONNECTED", "LAST USED");
    println!("{}", "-".repeat(72));
    for network in saved {
        println!(
            "{:<32} {:<20} {}",
            scan::truncate_ssid(&network.ssid, 32),
            network.connected_at.format("%Y-%m-%d %H:%M"),
            network.last_used.format("%Y-%m-%d %H:%M")
        );
    }

    Ok(())
}

fn cmd_connect(manager: &WifiManager, ssid: &str, password: Option<&str>) -> Result<()> {
    println!("Connecting to '{}' on interface {}...", ssid, manager.client_interface());

    let outcome = manager.connect(ssid, password);
    if !outcome.success {
        anyhow::bail!("{}", outcome.message);
    }
    println!("{}", outcome.message);
    println!("IP Address: {}", manager.current_ip());

    Ok(())
}

fn cmd_forget(manager: &WifiManager, ssid: &str) -> Result<()> {
    let outcome = manager.forget(ssid);
    if !outcome.success {
        anyhow::bail!("{}", outcome.message);
    }
    println!("{}", outcome.message);

    Ok(())
}

fn cmd_diagnostics(manager: &WifiManager) -> Result<()> {
    let snapshot = manager.collect_diagnostics();
    println!("{}", serde_json::to_string_pretty(&snapshot)?);

    Ok(())
}

fn cmd_ping(manager: &WifiManager, host: &str, count: u32) -> Result<()> {
    let report = manager.ping(host, count);
    println!("{}", serde_json::to_string_pretty(&report)?);
    if !report.success {
        anyhow::bail!("Ping to {} failed", report.host);
    }

    Ok(())
}
