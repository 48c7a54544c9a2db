use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use zonedns::authority::Authority;
use zonedns::config::ZoneConfig;
use zonedns::error::ConfigError;
use zonedns::handler::QueryHandler;
use zonedns::host::resolve_host;
use zonedns::http_server::AdminServer;
use zonedns::records::RecordStore;
use zonedns::resolver::Recursor;
use zonedns::server::ListenerPool;

#[derive(Parser)]
#[command(name = "zonedns")]
#[command(version)]
#[command(about = "Authoritative nameserver for a single zone with upstream fallback")]
struct Cli {
    /// Configuration file path
    #[arg(short = 'c', long, value_name = "FILE", default_value = "config.json")]
    config: PathBuf,

    /// Address to bind and advertise, overrides the configuration and
    /// interface detection
    #[arg(long)]
    host: Option<String>,

    /// Admin API bind address
    #[arg(short = 'a', long)]
    admin_addr: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = ZoneConfig::from_file(&cli.config)?;
    let host = resolve_host(cli.host.as_deref(), config.host.as_deref(), &config.interface)?;
    let dns_addr = bind_address(&host, config.port).await?;
    let admin_addr = cli.admin_addr.unwrap_or(config.admin_addr);

    let store = Arc::new(RecordStore::with_records(config.records.clone()));
    let recursor = Arc::new(Recursor::new(config.nameservers.clone()));
    let authority = Arc::new(Authority::new(
        config.name.clone(),
        host.clone(),
        store.clone(),
        recursor.clone(),
    ));
    let handler = Arc::new(QueryHandler::new(authority, recursor));

    let pool = ListenerPool::bind(dns_addr, handler).await?;
    let admin = AdminServer::new(store, config.name.clone(), config.secret.clone(), admin_addr);

    tokio::select! {
        result = pool.run() => result?,
        result = admin.start() => {
            result?;
            return Err("admin server stopped".into());
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl-C, shutting down");
        }
    }

    Ok(())
}

async fn bind_address(host: &str, port: u16) -> Result<SocketAddr, ConfigError> {
    tokio::net::lookup_host((host, port))
        .await
        .ok()
        .and_then(|mut addrs| addrs.next())
        .ok_or_else(|| ConfigError::InvalidBindAddress(format!("{}:{}", host, port)))
}
