//! Internode write forwarding and shard command RPC.
//!
//! A coordinator that accepts a write or an administrative command forwards
//! it to the node that owns the affected shard. The traffic shares one TCP
//! port with other cluster protocols through a one-byte protocol header.
//!
//! - [`message`] defines the request catalog and the single response shape.
//! - [`codec`] encodes and decodes frames without touching any I/O.
//! - [`frame`] moves whole frames across async byte streams.
//! - [`mux`] routes connections on a shared port by their header byte, and
//!   dials with the header already written.
//! - [`server`] accepts multiplexed connections and runs one
//!   request/response session per connection against a [`storage::ShardStore`].
//! - [`client`] sends exactly one request to one node resolved through a
//!   [`directory::NodeDirectory`].
//! - [`config`] holds the tunables and the protocol header constant.

pub mod cli;
pub mod client;
pub mod codec;
pub mod config;
pub mod directory;
pub mod error;
pub mod frame;
pub mod message;
pub mod mux;
pub mod server;
pub mod storage;

pub use client::{Client, RemoteError};
pub use config::{ClientConfig, MUX_HEADER, MuxConfig, ServerConfig};
pub use directory::{NodeDirectory, NodeInfo, StaticDirectory};
pub use error::CodecError;
pub use message::{NodeId, Point, Request, Response, ShardId};
pub use mux::{Mux, MuxListener};
pub use server::Service;
pub use storage::{MemStore, ShardStore};
