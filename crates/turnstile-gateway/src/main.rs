//! Turnstile - Entry point

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use turnstile_gateway::{GatewayConfig, GatewayServer};

/// Edge gateway for the expense tracker platform.
///
/// Environment variables (`TURNSTILE_LISTEN_PORT`, `TURNSTILE_LISTEN_ADDR`,
/// `TURNSTILE_UPSTREAM_TIMEOUT`, `TURNSTILE_JWT_SECRET`, `TURNSTILE_LOG_LEVEL`,
/// `TURNSTILE_METRICS_ADDR`) override the configuration file.
#[derive(Debug, Parser)]
#[command(name = "turnstile", version, about)]
struct Args {
    /// Path to configuration file (TOML or JSON)
    #[arg(short, long, env = "TURNSTILE_CONFIG")]
    config: Option<PathBuf>,

    /// Validate configuration, print the route table and exit
    #[arg(long)]
    check: bool,
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<GatewayConfig> {
    let config = match path {
        Some(path) => GatewayConfig::from_file(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => GatewayConfig::default(),
    }
    .with_env_overrides();

    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn print_routes(config: &GatewayConfig) -> anyhow::Result<()> {
    let table = config.route_table()?;
    println!("{} routes, first match wins:", table.len());
    for route in table.routes() {
        println!(
            "  {:<24} {:<36} -> {:<28} auth={} strip={}",
            route.name(),
            route.pattern(),
            route.upstream(),
            route.requires_auth(),
            route.strip_prefix_count(),
        );
    }
    for (shadowed, by) in table.shadowed() {
        println!("  warning: `{}` is unreachable behind `{}`", shadowed.name(), by.name());
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = load_config(args.config.as_ref())?;

    if args.check {
        return print_routes(&config);
    }

    turnstile_telemetry::init_telemetry(&config.telemetry_config())
        .context("failed to initialise telemetry")?;

    info!(
        version = turnstile_gateway::VERSION,
        config = ?args.config,
        "starting turnstile"
    );

    GatewayServer::new(&config)?.run().await?;

    info!("turnstile stopped");
    Ok(())
}
