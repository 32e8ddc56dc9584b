use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use tenantbox::{
    container::{DockerEngine, RuntimeDriver},
    database::Database,
    network::PortAllocator,
    proxy::ProxyClient,
    server::Server,
    template::TemplateRegistry,
    Config, Orchestrator,
};

#[derive(Debug, Parser)]
#[command(name = "tenantbox", version, about = "Per-tenant instance orchestrator")]
struct Args {
    /// TOML configuration file; environment variables are used when absent
    #[arg(short, long, env = "TENANTBOX_CONFIG")]
    config: Option<PathBuf>,
}

fn init_logging(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("tenantbox=debug,{}", config.logging.level)));

    if config.logging.format == "json" {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::from_file(path).await?,
        None => Config::from_env()?,
    };
    init_logging(&config);

    config.validate().map_err(|e| {
        error!("Invalid configuration: {}", e);
        e
    })?;
    info!("Starting tenantbox {}", env!("CARGO_PKG_VERSION"));

    let db = Database::new(config.database.clone()).await?;

    let templates = TemplateRegistry::new(&config.runtime.templates_root);
    templates.sync(&db).await?;

    let allocator = PortAllocator::new(config.ports);
    allocator.seed(&db).await?;

    let engine = DockerEngine::connect(&config.runtime).await?;
    let driver = RuntimeDriver::new(Arc::new(engine), config.runtime.clone(), &config.proxy.base_domain);
    let proxy = ProxyClient::new(&config.proxy)?;

    let orchestrator = Orchestrator::new(db, allocator, driver, Arc::new(proxy), templates, &config.proxy);

    Server::new(config.server.clone(), Arc::new(orchestrator)).run().await?;

    info!("tenantbox stopped");
    Ok(())
}
