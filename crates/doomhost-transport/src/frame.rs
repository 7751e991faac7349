//! Control frame reader.
//!
//! A control request is `[u16 length][length bytes of body][trailing...]`.
//! The length is in host byte order. Whatever arrived in the same reads
//! past the body is handed back as the start of the trailing payload
//! (upload data, for instance).

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::TransportError;

/// Size of each socket read while assembling a frame.
const READ_CHUNK: usize = 2048;

/// Largest body accepted unless the caller asks otherwise.
pub const DEFAULT_MAX_FRAME: usize = u16::MAX as usize;

/// One decoded control frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// The length-delimited body.
    pub body: Vec<u8>,
    /// Bytes received after the body in the same reads.
    pub trailing: Vec<u8>,
}

/// Reads one frame from `reader`.
///
/// # Errors
/// - [`TransportError::ConnectionClosed`] if the stream ends before the
///   header or body is complete.
/// - [`TransportError::FrameTooLarge`] if the header exceeds `max_len`.
/// - [`TransportError::ReceiveFailed`] on I/O errors.
pub async fn read_frame<R>(reader: &mut R, max_len: usize) -> Result<Frame, TransportError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::with_capacity(READ_CHUNK);
    fill_to(reader, &mut buf, 2).await?;

    let len = usize::from(u16::from_ne_bytes([buf[0], buf[1]]));
    if len > max_len {
        return Err(TransportError::FrameTooLarge { len, max: max_len });
    }

    fill_to(reader, &mut buf, 2 + len).await?;
    let trailing = buf.split_off(2 + len);
    buf.drain(..2);
    Ok(Frame {
        body: buf,
        trailing,
    })
}

/// Reads until `buf` holds at least `target` bytes.
async fn fill_to<R>(reader: &mut R, buf: &mut Vec<u8>, target: usize) -> Result<(), TransportError>
where
    R: AsyncRead + Unpin,
{
    let mut chunk = [0u8; READ_CHUNK];
    while buf.len() < target {
        let n = reader
            .read(&mut chunk)
            .await
            .map_err(TransportError::ReceiveFailed)?;
        if n == 0 {
            return Err(TransportError::ConnectionClosed(format!(
                "expected {target} bytes, got {}",
                buf.len()
            )));
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    Ok(())
}

/// Builds a frame the way a control client would. Used by clients and tests.
pub fn encode_frame(body: &[u8], trailing: &[u8]) -> Result<Vec<u8>, TransportError> {
    let len = u16::try_from(body.len()).map_err(|_| TransportError::FrameTooLarge {
        len: body.len(),
        max: DEFAULT_MAX_FRAME,
    })?;
    let mut out = Vec::with_capacity(2 + body.len() + trailing.len());
    out.extend_from_slice(&len.to_ne_bytes());
    out.extend_from_slice(body);
    out.extend_from_slice(trailing);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_frame_splits_body_and_trailing() {
        let bytes = encode_frame(br#"{"a":1}"#, b"WAD\0").unwrap();
        let mut reader = &bytes[..];
        let frame = read_frame(&mut reader, DEFAULT_MAX_FRAME).await.unwrap();
        assert_eq!(frame.body, br#"{"a":1}"#.to_vec());
        assert_eq!(frame.trailing, b"WAD\0".to_vec());
    }

    #[tokio::test]
    async fn test_read_frame_empty_body() {
        let bytes = encode_frame(b"", b"").unwrap();
        let mut reader = &bytes[..];
        let frame = read_frame(&mut reader, DEFAULT_MAX_FRAME).await.unwrap();
        assert!(frame.body.is_empty());
        assert!(frame.trailing.is_empty());
    }

    #[tokio::test]
    async fn test_read_frame_truncated_body_is_closed() {
        let mut bytes = encode_frame(b"0123456789", b"").unwrap();
        bytes.truncate(6);
        let mut reader = &bytes[..];
        let err = read_frame(&mut reader, DEFAULT_MAX_FRAME).await.unwrap_err();
        assert!(matches!(err, TransportError::ConnectionClosed(_)));
    }

    #[tokio::test]
    async fn test_read_frame_missing_header_is_closed() {
        let mut reader: &[u8] = &[7];
        let err = read_frame(&mut reader, DEFAULT_MAX_FRAME).await.unwrap_err();
        assert!(matches!(err, TransportError::ConnectionClosed(_)));
    }

    #[tokio::test]
    async fn test_read_frame_over_limit_is_rejected() {
        let bytes = encode_frame(&[b'x'; 100], b"").unwrap();
        let mut reader = &bytes[..];
        let err = read_frame(&mut reader, 10).await.unwrap_err();
        assert!(matches!(err, TransportError::FrameTooLarge { len: 100, max: 10 }));
    }

    #[test]
    fn test_encode_frame_uses_native_length() {
        let bytes = encode_frame(b"abc", b"").unwrap();
        assert_eq!(&bytes[..2], &3u16.to_ne_bytes());
    }
}
