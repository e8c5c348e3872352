use clap::{Parser, ValueEnum};
use std::net::SocketAddr;
use tracing_subscriber::EnvFilter;

use split_specs::api::{self, ApiState};
use split_specs::config::{SchedulerConfig, ServerConfig};
use split_specs::scheduler::DurationEstimate;
use split_specs::shutdown::install_shutdown_handler;
use split_specs::SplitService;

#[derive(Parser, Debug)]
#[command(name = "split-specs")]
#[command(version)]
#[command(about = "Distributes test specs across parallel CI workers using past run times")]
#[command(propagate_version = true)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Start the HTTP API server
    Server(ServerArgs),
}

#[derive(Parser, Debug)]
struct ServerArgs {
    /// Address to bind
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on
    #[arg(long, default_value = "8080")]
    port: u16,

    /// Seconds before a running spec may be handed to another worker.
    /// Omit to keep claims for the whole session.
    #[arg(long)]
    lease_ttl_secs: Option<u64>,

    /// Duration statistic used to order specs
    #[arg(long, default_value = "latest")]
    estimate: EstimateArg,
}

#[derive(Debug, Clone, ValueEnum)]
enum EstimateArg {
    Latest,
    Mean,
}

impl From<EstimateArg> for DurationEstimate {
    fn from(arg: EstimateArg) -> Self {
        match arg {
            EstimateArg::Latest => DurationEstimate::Latest,
            EstimateArg::Mean => DurationEstimate::Mean,
        }
    }
}

async fn run_server(args: ServerArgs) -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let listen_addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let scheduler = SchedulerConfig {
        lease_ttl_secs: args.lease_ttl_secs,
        estimate: args.estimate.into(),
    };
    let config = ServerConfig::new(listen_addr).with_scheduler(scheduler);

    tracing::info!(
        listen_addr = %config.listen_addr,
        lease_ttl_secs = ?config.scheduler.lease_ttl_secs,
        estimate = %config.scheduler.estimate,
        "Starting split-specs server"
    );

    let shutdown = install_shutdown_handler();
    let state = ApiState {
        service: SplitService::in_memory(config.scheduler.clone()),
    };
    api::serve(config.listen_addr, state, shutdown).await?;

    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    match args.command {
        Commands::Server(server_args) => run_server(server_args).await,
    }
}
