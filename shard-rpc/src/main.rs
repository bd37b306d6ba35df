use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{info, warn};

use shard_rpc::{
    Client, MUX_HEADER, MemStore, Mux, MuxConfig, Point, ServerConfig, Service, StaticDirectory,
    cli::{Cli, Command, RemoteArgs, ServeArgs},
};

/// Node id the command-line client uses for its single target.
const TARGET_NODE: u64 = 1;

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    match cli.command {
        Command::Serve(args) => serve(args).await?,
        Command::Write(args) => {
            let points = args.points.iter().map(|line| Point::from(line.as_str())).collect();
            client(&args.remote)
                .write_shard(TARGET_NODE, args.shard, points)
                .await?
        }
        Command::CreateShard(args) => {
            client(&args.remote)
                .create_shard(TARGET_NODE, &args.database, &args.policy, args.shard)
                .await?
        }
        Command::DropDatabase(args) => {
            client(&args.remote)
                .delete_database(TARGET_NODE, &args.database)
                .await?
        }
        Command::DropMeasurement(args) => {
            client(&args.remote)
                .delete_measurement(TARGET_NODE, &args.database, &args.name)
                .await?
        }
        Command::DropSeries(args) => {
            client(&args.remote)
                .delete_series(TARGET_NODE, &args.database, args.sources, args.condition)
                .await?
        }
        Command::DropRetentionPolicy(args) => {
            client(&args.remote)
                .delete_retention_policy(TARGET_NODE, &args.database, &args.name)
                .await?
        }
    }

    Ok(())
}

fn client(remote: &RemoteArgs) -> Client<StaticDirectory> {
    let directory = StaticDirectory::new().with_node(TARGET_NODE, remote.server.clone());
    Client::new(directory, remote.client_config())
}

async fn serve(args: ServeArgs) -> Result<()> {
    let listener = TcpListener::bind(args.listen).await?;
    info!("data node listening on {}", listener.local_addr()?);

    let mut mux = Mux::new(MuxConfig::default());
    let rpc_listener = mux.listen(MUX_HEADER)?;

    let config = ServerConfig {
        handler_timeout: args.handler_timeout_ms.map(Duration::from_millis),
        ..ServerConfig::default()
    };
    let mut service = Service::new(MemStore::new(), config);
    service.open(rpc_listener)?;

    let result = mux
        .run_until(listener, async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = ?err, "failed to install ctrl-c handler");
            }
        })
        .await;
    service.close().await;

    if let Err(err) = &result {
        warn!("data node exited with error: {err:?}");
    }
    result
}
