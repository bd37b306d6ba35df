use std::{net::SocketAddr, time::Duration};

use clap::{Args, Parser, Subcommand};

use crate::config::{ClientConfig, MUX_HEADER};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a data node that stores shards in memory.
    Serve(ServeArgs),
    /// Append points to a shard on a remote node.
    Write(WriteArgs),
    /// Create a shard on a remote node.
    CreateShard(CreateShardArgs),
    /// Drop a database on a remote node.
    DropDatabase(DropDatabaseArgs),
    /// Drop a measurement on a remote node.
    DropMeasurement(DropMeasurementArgs),
    /// Drop series on a remote node.
    DropSeries(DropSeriesArgs),
    /// Drop a retention policy on a remote node.
    DropRetentionPolicy(DropRetentionPolicyArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    /// Socket address to bind. Use port 0 for an ephemeral port.
    #[arg(long, default_value = "127.0.0.1:8088")]
    pub listen: SocketAddr,

    /// Fail storage calls that run longer than this many milliseconds.
    #[arg(long)]
    pub handler_timeout_ms: Option<u64>,
}

#[derive(Args, Debug, Clone)]
pub struct RemoteArgs {
    /// Address of the node that owns the shard.
    #[arg(long, default_value = "127.0.0.1:8088")]
    pub server: String,

    /// Protocol header byte announced after connecting.
    #[arg(long, default_value_t = MUX_HEADER)]
    pub header: u8,

    /// Per-phase timeout in milliseconds.
    #[arg(long, default_value_t = 10_000)]
    pub timeout_ms: u64,
}

impl RemoteArgs {
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            header: self.header,
            timeout: Duration::from_millis(self.timeout_ms),
            ..ClientConfig::default()
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct WriteArgs {
    #[command(flatten)]
    pub remote: RemoteArgs,

    #[arg(long)]
    pub shard: u64,

    /// Line-protocol point; repeat for several points.
    #[arg(long = "point", required = true)]
    pub points: Vec<String>,
}

#[derive(Args, Debug, Clone)]
pub struct CreateShardArgs {
    #[command(flatten)]
    pub remote: RemoteArgs,

    #[arg(long)]
    pub database: String,

    #[arg(long, default_value = "autogen")]
    pub policy: String,

    #[arg(long)]
    pub shard: u64,
}

#[derive(Args, Debug, Clone)]
pub struct DropDatabaseArgs {
    #[command(flatten)]
    pub remote: RemoteArgs,

    #[arg(long)]
    pub database: String,
}

#[derive(Args, Debug, Clone)]
pub struct DropMeasurementArgs {
    #[command(flatten)]
    pub remote: RemoteArgs,

    #[arg(long)]
    pub database: String,

    #[arg(long)]
    pub name: String,
}

#[derive(Args, Debug, Clone)]
pub struct DropSeriesArgs {
    #[command(flatten)]
    pub remote: RemoteArgs,

    #[arg(long)]
    pub database: String,

    /// Source to match; repeat for several. Omit to match every series.
    #[arg(long = "source")]
    pub sources: Vec<String>,

    /// Filter expression forwarded verbatim to the remote node.
    #[arg(long = "where")]
    pub condition: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct DropRetentionPolicyArgs {
    #[command(flatten)]
    pub remote: RemoteArgs,

    #[arg(long)]
    pub database: String,

    #[arg(long)]
    pub name: String,
}
