//! Sends one request to one remote shard owner and relays its outcome.
//!
//! Every call resolves the owner's address, dials a fresh connection, writes
//! the protocol header and a single request frame, then reads exactly one
//! response. There are no retries and no pooling; callers that want either
//! wrap [`Client`].

use std::future::Future;

use anyhow::{Context, Result, anyhow};
use thiserror::Error;
use tokio::{net::TcpStream, time::timeout};
use tracing::debug;

use crate::codec::{decode_response_payload, encode_request};
use crate::config::ClientConfig;
use crate::directory::NodeDirectory;
use crate::frame::{read_frame, write_frame};
use crate::message::{
    CreateShardRequest, DeleteDatabaseCommand, DeleteMeasurementCommand,
    DeleteRetentionPolicyCommand, DeleteSeriesCommand, NodeId, Point, Request, ShardId,
    WriteShardRequest,
};
use crate::mux;

/// The remote node answered with a failure response.
///
/// Displays as the remote message and nothing else.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct RemoteError(pub String);

pub struct Client<D> {
    directory: D,
    config: ClientConfig,
}

impl<D: NodeDirectory> Client<D> {
    pub fn new(directory: D, config: ClientConfig) -> Self {
        Self { directory, config }
    }

    /// Sends `request` to `owner` and waits for its single response.
    ///
    /// Every failure, local or remote, comes back as one error value. A
    /// failure response surfaces as a [`RemoteError`] whose text is exactly
    /// the remote message.
    pub async fn request(&self, owner: NodeId, request: Request) -> Result<()> {
        let node = self
            .directory
            .data_node(owner)
            .await
            .with_context(|| format!("failed to resolve node {owner}"))?;

        let frame = encode_request(&request)
            .with_context(|| format!("failed to encode {} request", request.message_type()))?;

        let mut stream = mux::dial(&node.tcp_addr, self.config.header, self.config.dial_timeout)
            .await
            .with_context(|| format!("failed to dial node {owner} at {}", node.tcp_addr))?;

        debug!(
            node = owner,
            addr = %node.tcp_addr,
            message_type = %request.message_type(),
            "sending request"
        );
        self.exchange(&mut stream, &frame).await
    }

    async fn exchange(&self, stream: &mut TcpStream, frame: &[u8]) -> Result<()> {
        within(self.config.timeout, "write request", write_frame(stream, frame))
            .await?
            .context("failed to write request")?;

        let response = within(
            self.config.timeout,
            "read response",
            read_frame(stream, self.config.max_frame_size),
        )
        .await?
        .context("failed to read response")?
        .ok_or_else(|| anyhow!("connection closed before response"))?;

        let response = decode_response_payload(response.message_type, &response.payload)
            .context("failed to decode response")?;
        if !response.is_success() {
            return Err(RemoteError(response.message).into());
        }
        Ok(())
    }

    pub async fn write_shard(
        &self,
        owner: NodeId,
        shard_id: ShardId,
        points: Vec<Point>,
    ) -> Result<()> {
        self.request(owner, Request::WriteShard(WriteShardRequest { shard_id, points }))
            .await
    }

    pub async fn create_shard(
        &self,
        owner: NodeId,
        database: &str,
        policy: &str,
        shard_id: ShardId,
    ) -> Result<()> {
        self.request(
            owner,
            Request::CreateShard(CreateShardRequest {
                database: database.to_string(),
                policy: policy.to_string(),
                shard_id,
            }),
        )
        .await
    }

    pub async fn delete_database(&self, owner: NodeId, database: &str) -> Result<()> {
        self.request(
            owner,
            Request::DeleteDatabase(DeleteDatabaseCommand {
                database: database.to_string(),
            }),
        )
        .await
    }

    pub async fn delete_measurement(
        &self,
        owner: NodeId,
        database: &str,
        name: &str,
    ) -> Result<()> {
        self.request(
            owner,
            Request::DeleteMeasurement(DeleteMeasurementCommand {
                database: database.to_string(),
                name: name.to_string(),
            }),
        )
        .await
    }

    pub async fn delete_series(
        &self,
        owner: NodeId,
        database: &str,
        sources: Vec<String>,
        condition: Option<String>,
    ) -> Result<()> {
        self.request(
            owner,
            Request::DeleteSeries(DeleteSeriesCommand {
                database: database.to_string(),
                sources,
                condition,
            }),
        )
        .await
    }

    pub async fn delete_retention_policy(
        &self,
        owner: NodeId,
        database: &str,
        name: &str,
    ) -> Result<()> {
        self.request(
            owner,
            Request::DeleteRetentionPolicy(DeleteRetentionPolicyCommand {
                database: database.to_string(),
                name: name.to_string(),
            }),
        )
        .await
    }
}

async fn within<F: Future>(limit: std::time::Duration, phase: &str, fut: F) -> Result<F::Output> {
    timeout(limit, fut)
        .await
        .map_err(|_| anyhow!("{phase} timed out after {limit:?}"))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::TcpListener,
    };

    use super::*;
    use crate::codec::{decode_request_payload, encode_response};
    use crate::directory::StaticDirectory;
    use crate::message::Response;

    fn quick_config() -> ClientConfig {
        ClientConfig {
            dial_timeout: Duration::from_millis(500),
            timeout: Duration::from_millis(200),
            ..ClientConfig::default()
        }
    }

    /// Accepts one raw connection, checks the header byte, and replies with `reply`.
    async fn one_shot_peer(reply: Option<Response>) -> (String, tokio::task::JoinHandle<Request>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let task = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut header = [0u8; 1];
            stream.read_exact(&mut header).await.unwrap();
            assert_eq!(header[0], crate::config::MUX_HEADER);

            let frame = read_frame(&mut stream, 1024).await.unwrap().unwrap();
            let request = decode_request_payload(frame.message_type, &frame.payload).unwrap();
            match reply {
                Some(response) => {
                    stream
                        .write_all(&encode_response(&response).unwrap())
                        .await
                        .unwrap();
                }
                None => tokio::time::sleep(Duration::from_secs(2)).await,
            }
            request
        });
        (addr, task)
    }

    #[tokio::test]
    async fn failure_response_text_is_relayed_verbatim() {
        let (addr, peer) = one_shot_peer(Some(Response::failure("failed to write"))).await;
        let client = Client::new(StaticDirectory::new().with_node(1, addr), quick_config());

        let err = client
            .delete_database(1, "db0")
            .await
            .expect_err("remote failure");
        assert_eq!(err.to_string(), "failed to write");
        assert!(err.downcast_ref::<RemoteError>().is_some());

        let request = peer.await.unwrap();
        assert_eq!(
            request,
            Request::DeleteDatabase(DeleteDatabaseCommand {
                database: "db0".into()
            })
        );
    }

    #[tokio::test]
    async fn unknown_node_fails_before_dialing() {
        let client = Client::new(StaticDirectory::new(), quick_config());
        let err = client.delete_database(5, "db0").await.unwrap_err();
        assert!(format!("{err:#}").contains("node not found: 5"));
    }

    #[tokio::test]
    async fn silent_peer_hits_read_timeout() {
        let (addr, _peer) = one_shot_peer(None).await;
        let client = Client::new(StaticDirectory::new().with_node(1, addr), quick_config());

        let err = client
            .create_shard(1, "db0", "autogen", 3)
            .await
            .unwrap_err();
        assert!(format!("{err:#}").contains("read response timed out"));
    }

    #[tokio::test]
    async fn refused_connection_is_an_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let client = Client::new(StaticDirectory::new().with_node(1, addr), quick_config());
        let err = client.delete_database(1, "db0").await.unwrap_err();
        assert!(format!("{err:#}").contains("failed to dial node 1"));
    }
}
