//! DAP message codec: Content-Length based framing.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::CodecError;

/// Upper bound for a single message body (16 MiB).
pub const MAX_CONTENT_LENGTH: usize = 16 * 1024 * 1024;

const HEADER_NAME: &str = "content-length";

/// Encode a JSON value into a DAP wire-format message with Content-Length header.
///
/// The header carries the body length in bytes, not characters.
pub fn encode_message(value: &serde_json::Value) -> Result<Vec<u8>, CodecError> {
    let body = serde_json::to_vec(value)?;
    let header = format!("Content-Length: {}\r\n\r\n", body.len());
    let mut buf = Vec::with_capacity(header.len() + body.len());
    buf.extend_from_slice(header.as_bytes());
    buf.extend_from_slice(&body);
    Ok(buf)
}

/// Read one framed message from `reader`.
///
/// Suspends until a complete header and body are available. A clean end
/// of stream before the first header byte yields [`CodecError::Closed`];
/// any other truncation or a malformed header yields
/// [`CodecError::Framing`].
pub async fn read_message<R>(reader: &mut R) -> Result<serde_json::Value, CodecError>
where
    R: AsyncBufRead + Unpin,
{
    let mut content_length: Option<usize> = None;
    let mut header_started = false;

    loop {
        let mut line = String::new();
        let read_n = reader.read_line(&mut line).await?;
        if read_n == 0 {
            return Err(if header_started {
                framing("stream closed inside header")
            } else {
                CodecError::Closed
            });
        }
        header_started = true;

        let line = line.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            break;
        }
        if let Some(len) = parse_content_length(line)? {
            content_length = Some(len);
        }
    }

    let len = content_length
        .ok_or_else(|| framing("missing Content-Length header"))?;
    if len > MAX_CONTENT_LENGTH {
        return Err(framing(format!(
            "Content-Length {len} exceeds limit of {MAX_CONTENT_LENGTH} bytes"
        )));
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            framing(format!("stream closed mid-body: expected {len} bytes"))
        } else {
            CodecError::Io(e)
        }
    })?;

    serde_json::from_slice(&body)
        .map_err(|e| framing(format!("body is not valid JSON: {e}")))
}

/// Encode `value` and write it to `writer`, flushing afterwards.
pub async fn write_message<W>(writer: &mut W, value: &serde_json::Value) -> Result<(), CodecError>
where
    W: AsyncWrite + Unpin,
{
    let bytes = encode_message(value)?;
    writer.write_all(&bytes).await?;
    writer.flush().await?;
    Ok(())
}

fn framing(message: impl Into<String>) -> CodecError {
    let message = message.into();
    tracing::debug!(%message, "dap framing error");
    CodecError::Framing(message)
}

/// Parse a single header line. Returns `Ok(None)` for unrelated headers.
fn parse_content_length(line: &str) -> Result<Option<usize>, CodecError> {
    let Some((name, value)) = line.split_once(':') else {
        return Err(framing(format!("malformed header line '{line}'")));
    };
    if !name.trim().eq_ignore_ascii_case(HEADER_NAME) {
        return Ok(None);
    }
    let value = value.trim();
    value.parse::<usize>().map(Some).map_err(|e| {
        framing(format!("invalid Content-Length value '{value}': {e}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn decode(bytes: &[u8]) -> Result<serde_json::Value, CodecError> {
        let mut reader = bytes;
        read_message(&mut reader).await
    }

    #[test]
    fn codec_encode_header_uses_byte_length() {
        let msg = serde_json::json!({"text": "héllo"});
        let encoded = encode_message(&msg).unwrap();
        let body = serde_json::to_vec(&msg).unwrap();
        let expected_header = format!("Content-Length: {}\r\n\r\n", body.len());
        assert!(encoded.starts_with(expected_header.as_bytes()));
        assert_eq!(encoded.len(), expected_header.len() + body.len());
    }

    #[tokio::test]
    async fn codec_round_trip_request() {
        let req = serde_json::json!({
            "seq": 1,
            "type": "request",
            "command": "initialize",
            "arguments": { "adapterID": "dapbridge" }
        });
        let encoded = encode_message(&req).unwrap();
        assert_eq!(decode(&encoded).await.unwrap(), req);
    }

    #[tokio::test]
    async fn codec_reads_consecutive_messages() {
        let first = serde_json::json!({"seq": 1, "type": "request", "command": "threads"});
        let second = serde_json::json!({"seq": 0, "type": "event", "event": "stopped"});
        let mut buf = encode_message(&first).unwrap();
        buf.extend(encode_message(&second).unwrap());

        let mut reader = buf.as_slice();
        assert_eq!(read_message(&mut reader).await.unwrap(), first);
        assert_eq!(read_message(&mut reader).await.unwrap(), second);
        assert!(read_message(&mut reader).await.unwrap_err().is_closed());
    }

    #[tokio::test]
    async fn codec_ignores_other_headers_and_case() {
        let data = b"Content-Type: application/json\r\ncontent-length: 2\r\n\r\n{}";
        assert_eq!(decode(data).await.unwrap(), serde_json::json!({}));
    }

    #[tokio::test]
    async fn codec_missing_length_is_framing_error() {
        let err = decode(b"Bad-Header: 42\r\n\r\n{}").await.unwrap_err();
        assert!(matches!(err, CodecError::Framing(_)));
        assert!(err.to_string().contains("missing Content-Length"), "got: {err}");
    }

    #[tokio::test]
    async fn codec_truncated_body_is_framing_error() {
        let err = decode(b"Content-Length: 100\r\n\r\n{\"short\":true}")
            .await
            .unwrap_err();
        assert!(matches!(err, CodecError::Framing(_)));
        assert!(err.to_string().contains("mid-body"), "got: {err}");
    }

    #[tokio::test]
    async fn codec_malformed_header_line() {
        let err = decode(b"Content-Length 2\r\n\r\n{}").await.unwrap_err();
        assert!(matches!(
            err,
            CodecError::Framing(ref msg) if msg == "malformed header line 'Content-Length 2'"
        ));
    }

    #[tokio::test]
    async fn codec_truncated_header_is_framing_error() {
        let err = decode(b"Content-Length: 2\r\n").await.unwrap_err();
        assert!(matches!(err, CodecError::Framing(_)));
    }

    #[tokio::test]
    async fn codec_invalid_length_value() {
        let err = decode(b"Content-Length: abc\r\n\r\n{}").await.unwrap_err();
        assert!(err.to_string().contains("invalid Content-Length"), "got: {err}");
    }

    #[tokio::test]
    async fn codec_non_json_body() {
        let err = decode(b"Content-Length: 3\r\n\r\nabc").await.unwrap_err();
        assert!(matches!(err, CodecError::Framing(_)));
    }

    #[tokio::test]
    async fn codec_oversized_length_rejected() {
        let header = format!("Content-Length: {}\r\n\r\n", MAX_CONTENT_LENGTH + 1);
        let err = decode(header.as_bytes()).await.unwrap_err();
        assert!(err.to_string().contains("exceeds limit"), "got: {err}");
    }

    #[tokio::test]
    async fn codec_write_message_flushes_frame() {
        let evt = serde_json::json!({"seq": 0, "type": "event", "event": "terminated"});
        let mut out: Vec<u8> = Vec::new();
        write_message(&mut out, &evt).await.unwrap();
        assert_eq!(out, encode_message(&evt).unwrap());
    }
}
