//! Pure encode/decode functions for the shard RPC wire format.
//!
//! ```text
//! ┌──────────┬────────────────┬──────────────────┐
//! │ Type tag │ Payload length │ Payload          │
//! │ 1 byte   │ 8 bytes u64 BE │ bincode (fixint) │
//! └──────────┴────────────────┴──────────────────┘
//! ```
//!
//! Payload integers are fixed-width little-endian; strings, byte blobs and
//! sequences carry a `u64` length prefix. Nothing here touches a socket.

use bincode::Options;
use serde::{Serialize, de::DeserializeOwned};

use crate::error::CodecError;
use crate::message::{MessageType, Request, Response};

/// Tag plus length prefix.
pub const FRAME_HEADER_LEN: usize = 9;

/// Default upper bound on a single frame's payload (1 GiB).
pub const DEFAULT_MAX_FRAME_SIZE: u64 = 1 << 30;

fn payload_options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .reject_trailing_bytes()
}

fn encode_payload<T: Serialize>(value: &T) -> Result<Vec<u8>, CodecError> {
    Ok(payload_options().serialize(value)?)
}

fn decode_payload<T: DeserializeOwned>(payload: &[u8]) -> Result<T, CodecError> {
    Ok(payload_options().deserialize(payload)?)
}

/// Parsed tag and length that open every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub message_type: MessageType,
    pub length: u64,
}

impl FrameHeader {
    /// Validates the tag and the declared length against `max`.
    pub fn parse(bytes: &[u8; FRAME_HEADER_LEN], max: u64) -> Result<Self, CodecError> {
        let message_type =
            MessageType::try_from(bytes[0]).map_err(CodecError::UnknownMessageType)?;

        let mut length = [0u8; 8];
        length.copy_from_slice(&bytes[1..]);
        let length = u64::from_be_bytes(length);
        if length > max {
            return Err(CodecError::FrameTooLarge { length, max });
        }

        Ok(Self {
            message_type,
            length,
        })
    }

    pub fn encode(&self) -> [u8; FRAME_HEADER_LEN] {
        let mut buf = [0u8; FRAME_HEADER_LEN];
        buf[0] = self.message_type.as_u8();
        buf[1..].copy_from_slice(&self.length.to_be_bytes());
        buf
    }
}

/// Prepends the frame header to an already-encoded payload.
pub fn encode_frame(message_type: MessageType, payload: &[u8]) -> Vec<u8> {
    let header = FrameHeader {
        message_type,
        length: payload.len() as u64,
    };
    let mut frame = Vec::with_capacity(FRAME_HEADER_LEN + payload.len());
    frame.extend_from_slice(&header.encode());
    frame.extend_from_slice(payload);
    frame
}

/// Splits a complete in-memory frame into its header and payload.
pub fn split_frame(bytes: &[u8]) -> Result<(FrameHeader, &[u8]), CodecError> {
    if bytes.len() < FRAME_HEADER_LEN {
        return Err(CodecError::Truncated {
            expected: FRAME_HEADER_LEN as u64,
            actual: bytes.len() as u64,
        });
    }

    let (head, payload) = bytes.split_at(FRAME_HEADER_LEN);
    let mut raw = [0u8; FRAME_HEADER_LEN];
    raw.copy_from_slice(head);
    let header = FrameHeader::parse(&raw, u64::MAX)?;

    let actual = payload.len() as u64;
    if actual < header.length {
        return Err(CodecError::Truncated {
            expected: header.length,
            actual,
        });
    }
    if actual > header.length {
        return Err(CodecError::TrailingBytes((actual - header.length) as usize));
    }

    Ok((header, payload))
}

pub fn encode_request(request: &Request) -> Result<Vec<u8>, CodecError> {
    let payload = match request {
        Request::WriteShard(req) => encode_payload(req)?,
        Request::CreateShard(req) => encode_payload(req)?,
        Request::DeleteDatabase(cmd) => encode_payload(cmd)?,
        Request::DeleteMeasurement(cmd) => encode_payload(cmd)?,
        Request::DeleteSeries(cmd) => encode_payload(cmd)?,
        Request::DeleteRetentionPolicy(cmd) => encode_payload(cmd)?,
    };
    Ok(encode_frame(request.message_type(), &payload))
}

pub fn decode_request(bytes: &[u8]) -> Result<Request, CodecError> {
    let (header, payload) = split_frame(bytes)?;
    decode_request_payload(header.message_type, payload)
}

/// Decodes a request payload whose tag has already been read.
pub fn decode_request_payload(
    message_type: MessageType,
    payload: &[u8],
) -> Result<Request, CodecError> {
    let request = match message_type {
        MessageType::WriteShardRequest => Request::WriteShard(decode_payload(payload)?),
        MessageType::CreateShardRequest => Request::CreateShard(decode_payload(payload)?),
        MessageType::DeleteDatabaseCommand => Request::DeleteDatabase(decode_payload(payload)?),
        MessageType::DeleteMeasurementCommand => {
            Request::DeleteMeasurement(decode_payload(payload)?)
        }
        MessageType::DeleteSeriesCommand => Request::DeleteSeries(decode_payload(payload)?),
        MessageType::DeleteRetentionPolicyCommand => {
            Request::DeleteRetentionPolicy(decode_payload(payload)?)
        }
        MessageType::Response => {
            return Err(CodecError::UnexpectedMessageType(MessageType::Response));
        }
    };
    Ok(request)
}

pub fn encode_response(response: &Response) -> Result<Vec<u8>, CodecError> {
    let payload = encode_payload(response)?;
    Ok(encode_frame(MessageType::Response, &payload))
}

pub fn decode_response(bytes: &[u8]) -> Result<Response, CodecError> {
    let (header, payload) = split_frame(bytes)?;
    decode_response_payload(header.message_type, payload)
}

pub fn decode_response_payload(
    message_type: MessageType,
    payload: &[u8],
) -> Result<Response, CodecError> {
    if message_type != MessageType::Response {
        return Err(CodecError::UnexpectedMessageType(message_type));
    }
    decode_payload(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{
        CreateShardRequest, DeleteDatabaseCommand, DeleteMeasurementCommand,
        DeleteRetentionPolicyCommand, DeleteSeriesCommand, Point, WriteShardRequest,
    };

    fn sample_requests() -> Vec<Request> {
        vec![
            Request::WriteShard(WriteShardRequest {
                shard_id: 7,
                points: vec![
                    Point::from("cpu,host=a value=1 10"),
                    Point::new(vec![0u8, 255, 10, 13]),
                ],
            }),
            Request::CreateShard(CreateShardRequest {
                database: "db0".into(),
                policy: "autogen".into(),
                shard_id: u64::MAX,
            }),
            Request::DeleteDatabase(DeleteDatabaseCommand {
                database: "db0".into(),
            }),
            Request::DeleteMeasurement(DeleteMeasurementCommand {
                database: "db0".into(),
                name: "cpu".into(),
            }),
            Request::DeleteSeries(DeleteSeriesCommand {
                database: "db0".into(),
                sources: vec!["cpu".into(), "\"mem\"".into()],
                condition: Some("host = 'a'".into()),
            }),
            Request::DeleteRetentionPolicy(DeleteRetentionPolicyCommand {
                database: "db0".into(),
                name: "autogen".into(),
            }),
        ]
    }

    #[test]
    fn every_request_survives_encoding() {
        for request in sample_requests() {
            let bytes = encode_request(&request).expect("encode");
            assert_eq!(bytes[0], request.message_type().as_u8());
            let decoded = decode_request(&bytes).expect("decode");
            assert_eq!(decoded, request);
        }
    }

    #[test]
    fn responses_survive_encoding() {
        for response in [Response::success(), Response::failure("failed to write")] {
            let bytes = encode_response(&response).expect("encode");
            assert_eq!(decode_response(&bytes).expect("decode"), response);
        }
    }

    #[test]
    fn header_is_big_endian_length_after_tag() {
        let frame = encode_frame(MessageType::DeleteDatabaseCommand, &[0xAA; 3]);
        assert_eq!(frame[..FRAME_HEADER_LEN], [4, 0, 0, 0, 0, 0, 0, 0, 3]);
        assert_eq!(&frame[FRAME_HEADER_LEN..], &[0xAA; 3]);
    }

    #[test]
    fn point_bytes_and_order_are_preserved() {
        let points: Vec<Point> = (0..50)
            .map(|i| Point::new(format!("m{i} v={i} {i}").into_bytes()))
            .collect();
        let request = Request::WriteShard(WriteShardRequest {
            shard_id: 1,
            points: points.clone(),
        });

        let decoded = decode_request(&encode_request(&request).unwrap()).unwrap();
        match decoded {
            Request::WriteShard(req) => assert_eq!(req.points, points),
            other => panic!("unexpected request: {other:?}"),
        }
    }

    #[test]
    fn unknown_tag_is_rejected() {
        let mut frame = encode_frame(MessageType::DeleteDatabaseCommand, &[]);
        frame[0] = 0x42;
        assert!(matches!(
            decode_request(&frame),
            Err(CodecError::UnknownMessageType(0x42))
        ));
    }

    #[test]
    fn oversized_length_is_rejected() {
        let header = FrameHeader {
            message_type: MessageType::WriteShardRequest,
            length: 1024,
        };
        let err = FrameHeader::parse(&header.encode(), 512).unwrap_err();
        assert!(matches!(
            err,
            CodecError::FrameTooLarge {
                length: 1024,
                max: 512
            }
        ));
    }

    #[test]
    fn short_and_long_buffers_are_rejected() {
        let request = &sample_requests()[2];
        let bytes = encode_request(request).unwrap();

        let short = &bytes[..bytes.len() - 1];
        assert!(matches!(
            decode_request(short),
            Err(CodecError::Truncated { .. })
        ));

        let mut long = bytes.clone();
        long.push(0);
        assert!(matches!(
            decode_request(&long),
            Err(CodecError::TrailingBytes(1))
        ));

        assert!(matches!(
            decode_request(&bytes[..4]),
            Err(CodecError::Truncated {
                expected: 9,
                actual: 4
            })
        ));
    }

    #[test]
    fn payload_that_does_not_match_tag_fails_to_decode() {
        let frame = encode_frame(MessageType::CreateShardRequest, &[1, 2, 3]);
        assert!(matches!(
            decode_request(&frame),
            Err(CodecError::Payload(_))
        ));
    }

    #[test]
    fn response_tag_is_not_a_request() {
        let bytes = encode_response(&Response::success()).unwrap();
        assert!(matches!(
            decode_request(&bytes),
            Err(CodecError::UnexpectedMessageType(MessageType::Response))
        ));

        let request = encode_request(&sample_requests()[0]).unwrap();
        assert!(matches!(
            decode_response(&request),
            Err(CodecError::UnexpectedMessageType(
                MessageType::WriteShardRequest
            ))
        ));
    }
}
