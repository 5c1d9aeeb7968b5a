use log::{error, info, warn};
use server::blacklist::BlacklistSet;
use server::bot::Bot;
use server::config::Config;
use server::fetch::HttpFetcher;
use server::gateway::PterodactylGateway;
use server::network::{Server, ServerMessage};
use server::paths::VolumeResolver;
use server::workflow::ProvisionContext;
use std::sync::Arc;
use tokio::sync::RwLock;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let config = Config::from_args();

    let client = reqwest::Client::builder()
        .timeout(config.request_timeout)
        .build()?;
    let gateway = PterodactylGateway::new(
        client.clone(),
        &config.panel_url,
        config.application_key.clone(),
        config.client_key.clone(),
        config.retry,
    )?;
    let fetcher = HttpFetcher::new(client, config.retry);
    let blacklist = BlacklistSet::load(config.blacklist_file.clone()).await;

    let resolver = VolumeResolver::new(config.volume_root.clone());
    match resolver.resolve_volume_root() {
        Ok(root) => info!("Using volume root {}", root.display()),
        Err(e) => warn!("{}; uploads stay unavailable until one appears", e),
    }

    let ctx = ProvisionContext {
        resolver,
        gateway: Arc::new(gateway),
        fetcher: Arc::new(fetcher),
        blacklist: Arc::new(RwLock::new(blacklist)),
        limits: config.limits,
        restart_delay: config.restart_delay,
    };
    let bot = Arc::new(Bot::new(ctx, config.operators.iter().copied()));

    info!(
        "Serving {} operator(s) for panel {}",
        config.operators.len(),
        config.panel_url
    );

    let mut server = Server::new(
        &config.bind_addr,
        bot,
        config.max_links,
        config.link_timeout,
    )
    .await?;
    let control = server.control();

    let mut server_handle = tokio::spawn(async move {
        if let Err(e) = server.run().await {
            error!("Bot stopped with an error: {}", e);
        }
    });

    tokio::select! {
        result = &mut server_handle => {
            if let Err(e) = result {
                error!("Network task panicked: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
            if control.send(ServerMessage::Shutdown).is_ok() {
                server_handle.await?;
            }
        }
    }

    Ok(())
}
