//! Message catalog exchanged between a write coordinator and a shard owner.
//!
//! Every request maps to exactly one [`MessageType`] tag, and every request is
//! answered with exactly one [`Response`]. Payload contents are carried
//! verbatim: points stay as opaque encoded bytes and delete-series sources and
//! conditions stay as opaque query text.

use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};

pub type ShardId = u64;
pub type NodeId = u64;

/// One-byte tag that precedes every frame on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    WriteShardRequest = 1,
    Response = 2,
    CreateShardRequest = 3,
    DeleteDatabaseCommand = 4,
    DeleteMeasurementCommand = 5,
    DeleteSeriesCommand = 6,
    DeleteRetentionPolicyCommand = 7,
}

impl MessageType {
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for MessageType {
    type Error = u8;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        match tag {
            1 => Ok(MessageType::WriteShardRequest),
            2 => Ok(MessageType::Response),
            3 => Ok(MessageType::CreateShardRequest),
            4 => Ok(MessageType::DeleteDatabaseCommand),
            5 => Ok(MessageType::DeleteMeasurementCommand),
            6 => Ok(MessageType::DeleteSeriesCommand),
            7 => Ok(MessageType::DeleteRetentionPolicyCommand),
            other => Err(other),
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MessageType::WriteShardRequest => "write-shard",
            MessageType::Response => "response",
            MessageType::CreateShardRequest => "create-shard",
            MessageType::DeleteDatabaseCommand => "delete-database",
            MessageType::DeleteMeasurementCommand => "delete-measurement",
            MessageType::DeleteSeriesCommand => "delete-series",
            MessageType::DeleteRetentionPolicyCommand => "delete-retention-policy",
        };
        f.write_str(name)
    }
}

/// A single encoded measurement sample.
///
/// The bytes are one line of line protocol and are never rewritten by this
/// crate. Only [`Point::measurement`] looks inside them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point(Vec<u8>);

impl Point {
    pub fn new(encoded: impl Into<Vec<u8>>) -> Self {
        Self(encoded.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Measurement name with line-protocol escapes removed.
    ///
    /// The name ends at the first unescaped comma or space; `\,`, `\ ` and
    /// `\\` inside it stand for the escaped character.
    pub fn measurement(&self) -> Cow<'_, [u8]> {
        let raw = self.raw_measurement();
        if !raw.contains(&b'\\') {
            return Cow::Borrowed(raw);
        }

        let mut name = Vec::with_capacity(raw.len());
        let mut bytes = raw.iter().copied().peekable();
        while let Some(byte) = bytes.next() {
            match (byte, bytes.peek()) {
                (b'\\', Some(&next @ (b',' | b' ' | b'\\'))) => {
                    name.push(next);
                    bytes.next();
                }
                _ => name.push(byte),
            }
        }
        Cow::Owned(name)
    }

    fn raw_measurement(&self) -> &[u8] {
        let bytes = self.as_bytes();
        let mut escaped = false;
        for (idx, byte) in bytes.iter().enumerate() {
            match byte {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b',' | b' ' => return &bytes[..idx],
                _ => {}
            }
        }
        bytes
    }
}

impl From<&str> for Point {
    fn from(line: &str) -> Self {
        Self::new(line.as_bytes())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteShardRequest {
    pub shard_id: ShardId,
    pub points: Vec<Point>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateShardRequest {
    pub database: String,
    pub policy: String,
    pub shard_id: ShardId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteDatabaseCommand {
    pub database: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteMeasurementCommand {
    pub database: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteSeriesCommand {
    pub database: String,
    /// Query-language source descriptors, passed through undecoded.
    pub sources: Vec<String>,
    /// Query-language filter expression, passed through undecoded.
    pub condition: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteRetentionPolicyCommand {
    pub database: String,
    pub name: String,
}

/// Every message a coordinator can send to a shard owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    WriteShard(WriteShardRequest),
    CreateShard(CreateShardRequest),
    DeleteDatabase(DeleteDatabaseCommand),
    DeleteMeasurement(DeleteMeasurementCommand),
    DeleteSeries(DeleteSeriesCommand),
    DeleteRetentionPolicy(DeleteRetentionPolicyCommand),
}

impl Request {
    pub fn message_type(&self) -> MessageType {
        match self {
            Request::WriteShard(_) => MessageType::WriteShardRequest,
            Request::CreateShard(_) => MessageType::CreateShardRequest,
            Request::DeleteDatabase(_) => MessageType::DeleteDatabaseCommand,
            Request::DeleteMeasurement(_) => MessageType::DeleteMeasurementCommand,
            Request::DeleteSeries(_) => MessageType::DeleteSeriesCommand,
            Request::DeleteRetentionPolicy(_) => MessageType::DeleteRetentionPolicyCommand,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseStatus {
    Ok,
    Error,
}

/// Outcome of exactly one request. `message` is empty on success.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub status: ResponseStatus,
    pub message: String,
}

impl Response {
    pub fn success() -> Self {
        Self {
            status: ResponseStatus::Ok,
            message: String::new(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Error,
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ResponseStatus::Ok
    }
}
