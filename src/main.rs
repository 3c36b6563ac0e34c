use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use rust_atlas::afk::SessionManager;
use rust_atlas::catalog::PlanCatalog;
use rust_atlas::config::AtlasConfig;
use rust_atlas::external::{DiscordWebhook, IdentityProvider, LogOnlySink, NotificationSink, PanelProvider};
use rust_atlas::ledger::LedgerService;
use rust_atlas::rpc::RpcServer;
use rust_atlas::storage::Store;

#[derive(Parser)]
#[command(name = "atlas")]
#[command(about = "Atlas dashboard ledger daemon", long_about = None)]
struct Cli {
    /// Path to the TOML config file
    #[arg(long, default_value = "atlas.toml")]
    config: String,
    /// Override the configured RPC port
    #[arg(long)]
    rpc_port: Option<u16>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = AtlasConfig::load_or_default(&cli.config);

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.server.log_level.clone())),
        )
        .init();

    let store = Arc::new(Store::open(&config.store.db_path).expect("Failed to open database"));
    let catalog = PlanCatalog::load_or_default(&config.store.plans_file);

    let identity: Arc<dyn IdentityProvider> = Arc::new(PanelProvider::new(
        config.provider.url.clone(),
        config.provider.api_key.clone(),
    ));
    let notifier: Arc<dyn NotificationSink> = match &config.notifications.discord_webhook_url {
        Some(url) => Arc::new(DiscordWebhook::new(url.clone())),
        None => Arc::new(LogOnlySink),
    };

    let ledger = Arc::new(LedgerService::new(
        store,
        catalog,
        identity,
        notifier,
        config.economy.costs.clone(),
    ));
    let sessions = SessionManager::spawn(ledger.clone(), config.economy.afk_interval_secs);

    let port = cli.rpc_port.unwrap_or(config.server.rpc_port);
    RpcServer::new(ledger, sessions, port).start().await;
}
