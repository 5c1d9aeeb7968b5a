use clap::Parser;
use client::network::Console;
use log::info;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Bot address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:8080")]
    server: String,

    /// Operator id to authenticate as
    #[arg(short = 'o', long, env = "PANELBOT_OPERATOR")]
    operator: u64,

    /// Seconds between keep-alive packets
    #[arg(long, default_value = "10", value_parser = clap::value_parser!(u64).range(1..))]
    heartbeat_secs: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args = Args::parse();

    info!("Starting console...");
    info!("Connecting to: {} as operator {}", args.server, args.operator);

    let mut console = Console::new(
        &args.server,
        args.operator,
        Duration::from_secs(args.heartbeat_secs),
    )
    .await?;

    console.run().await?;

    Ok(())
}
