//! Async helpers that move whole frames across a byte stream.

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::codec::{FRAME_HEADER_LEN, FrameHeader};
use crate::error::CodecError;
use crate::message::MessageType;

/// A frame whose header has been validated but whose payload is still raw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub message_type: MessageType,
    pub payload: Vec<u8>,
}

/// Reads the next frame.
///
/// Returns `Ok(None)` when the peer closes the stream cleanly between frames.
/// An unknown tag or an oversized length fails before any payload is read.
pub async fn read_frame<R>(
    reader: &mut R,
    max_frame_size: u64,
) -> Result<Option<Frame>, CodecError>
where
    R: AsyncRead + Unpin,
{
    let mut raw = [0u8; FRAME_HEADER_LEN];
    if reader.read(&mut raw[..1]).await? == 0 {
        return Ok(None);
    }

    let mut filled = 1;
    while filled < FRAME_HEADER_LEN {
        let n = reader.read(&mut raw[filled..]).await?;
        if n == 0 {
            return Err(CodecError::Truncated {
                expected: FRAME_HEADER_LEN as u64,
                actual: filled as u64,
            });
        }
        filled += n;
    }

    let header = FrameHeader::parse(&raw, max_frame_size)?;

    // Grow the buffer as bytes arrive rather than trusting the declared length.
    let mut payload = Vec::new();
    (&mut *reader)
        .take(header.length)
        .read_to_end(&mut payload)
        .await?;
    if (payload.len() as u64) < header.length {
        return Err(CodecError::Truncated {
            expected: header.length,
            actual: payload.len() as u64,
        });
    }

    Ok(Some(Frame {
        message_type: header.message_type,
        payload,
    }))
}

/// Writes an encoded frame and flushes so the peer sees it immediately.
pub async fn write_frame<W>(writer: &mut W, frame: &[u8]) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(frame).await?;
    writer.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{encode_frame, encode_response};
    use crate::message::Response;

    #[tokio::test]
    async fn reads_frames_back_to_back() {
        let (mut writer, mut reader) = tokio::io::duplex(1024);
        let first = encode_response(&Response::success()).unwrap();
        let second = encode_frame(MessageType::DeleteDatabaseCommand, b"abc");

        write_frame(&mut writer, &first).await.expect("write first");
        write_frame(&mut writer, &second).await.expect("write second");
        drop(writer);

        let one = read_frame(&mut reader, 1024).await.unwrap().expect("frame");
        assert_eq!(one.message_type, MessageType::Response);
        let two = read_frame(&mut reader, 1024).await.unwrap().expect("frame");
        assert_eq!(two.message_type, MessageType::DeleteDatabaseCommand);
        assert_eq!(two.payload, b"abc");
        assert!(read_frame(&mut reader, 1024).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn eof_inside_header_is_truncation() {
        let (mut writer, mut reader) = tokio::io::duplex(64);
        writer.write_all(&[1, 0, 0]).await.unwrap();
        drop(writer);

        let err = read_frame(&mut reader, 1024).await.unwrap_err();
        assert!(matches!(
            err,
            CodecError::Truncated {
                expected: 9,
                actual: 3
            }
        ));
    }

    #[tokio::test]
    async fn eof_inside_payload_is_truncation() {
        let (mut writer, mut reader) = tokio::io::duplex(64);
        let frame = encode_frame(MessageType::WriteShardRequest, &[9; 10]);
        writer.write_all(&frame[..frame.len() - 4]).await.unwrap();
        drop(writer);

        let err = read_frame(&mut reader, 1024).await.unwrap_err();
        assert!(matches!(
            err,
            CodecError::Truncated {
                expected: 10,
                actual: 6
            }
        ));
    }

    #[tokio::test]
    async fn oversized_frame_fails_before_payload() {
        let (mut writer, mut reader) = tokio::io::duplex(64);
        let frame = encode_frame(MessageType::WriteShardRequest, &[0; 32]);
        writer.write_all(&frame[..FRAME_HEADER_LEN]).await.unwrap();

        let err = read_frame(&mut reader, 16).await.unwrap_err();
        assert!(matches!(err, CodecError::FrameTooLarge { length: 32, max: 16 }));
    }

    #[tokio::test]
    async fn unknown_tag_fails_immediately() {
        let (mut writer, mut reader) = tokio::io::duplex(64);
        writer.write_all(&[0xEE; FRAME_HEADER_LEN]).await.unwrap();

        let err = read_frame(&mut reader, 1024).await.unwrap_err();
        assert!(matches!(err, CodecError::UnknownMessageType(0xEE)));
    }
}
