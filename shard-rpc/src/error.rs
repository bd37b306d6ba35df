//! Protocol-level error type.

use thiserror::Error;

use crate::message::MessageType;

/// Failure to frame, parse, or encode a message.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The leading tag byte does not name any message.
    #[error("unknown message type: {0}")]
    UnknownMessageType(u8),

    /// The declared payload length exceeds the configured limit.
    #[error("frame of {length} bytes exceeds maximum of {max}")]
    FrameTooLarge { length: u64, max: u64 },

    /// The stream or buffer ended before the declared length was reached.
    #[error("truncated frame: expected {expected} bytes, got {actual}")]
    Truncated { expected: u64, actual: u64 },

    /// A buffer held more bytes than the frame declared.
    #[error("frame followed by {0} trailing bytes")]
    TrailingBytes(usize),

    /// A well-formed message arrived where a different kind was expected.
    #[error("unexpected message type: {0}")]
    UnexpectedMessageType(MessageType),

    /// The payload did not match the shape declared by its tag.
    #[error("invalid payload: {0}")]
    Payload(#[from] bincode::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
