//! Newline-delimited JSON framing.
//!
//! Every record on the wire is one compact JSON object terminated by `\n`.
//! JSON escapes newlines inside strings, so the delimiter never appears in a
//! payload. Framing is what makes partial reads (one record split over many
//! reads) and coalesced reads (many records in one read) decode correctly.
//!
//! Per-frame failures (bad JSON, invalid UTF-8, an over-long line) are
//! reported as `Err(DecodeError)` items rather than stream errors, so a
//! reader can log and drop the frame and keep the connection open.

use std::io;
use std::marker::PhantomData;

use bytes::{Bytes, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tokio_util::codec::{Decoder, LinesCodec, LinesCodecError};

/// Maximum frame size in bytes, excluding the delimiter (64 KiB).
pub const MAX_FRAME_LEN: usize = 64 * 1024;

/// Longest slice of a bad frame kept in a `DecodeError` for logging.
const PREVIEW_LEN: usize = 64;

// ============================================================================
// Errors
// ============================================================================

/// A single frame could not be decoded. The stream itself is still usable.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Malformed frame ({reason}): {preview}")]
    Malformed { reason: String, preview: String },

    #[error("Frame is not valid UTF-8")]
    InvalidUtf8,

    #[error("Frame too large (max: {max} bytes)")]
    TooLarge { max: usize },
}

/// A record could not be serialized into a frame.
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("Failed to encode frame: {0}")]
    Json(#[from] serde_json::Error),
}

/// Fatal stream error surfaced by the decoder.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

// ============================================================================
// Frame Codec
// ============================================================================

/// Outcome of one complete line: `None` for a blank line.
type Parsed<T> = Option<Result<T, DecodeError>>;

/// Decoder turning a byte stream into records of type `T`.
///
/// Wraps a length-limited [`LinesCodec`]; blank lines are skipped and a
/// trailing `\r` is tolerated.
#[derive(Debug)]
pub struct FrameCodec<T> {
    lines: LinesCodec,
    _record: PhantomData<fn() -> T>,
}

impl<T> FrameCodec<T> {
    /// Creates a codec with the default [`MAX_FRAME_LEN`].
    pub fn new() -> Self {
        Self::with_max_length(MAX_FRAME_LEN)
    }

    pub fn with_max_length(max_length: usize) -> Self {
        Self {
            lines: LinesCodec::new_with_max_length(max_length),
            _record: PhantomData,
        }
    }

    pub fn max_length(&self) -> usize {
        self.lines.max_length()
    }

    fn map_line(
        &self,
        result: Result<Option<String>, LinesCodecError>,
    ) -> Result<Option<Parsed<T>>, CodecError>
    where
        T: DeserializeOwned,
    {
        // None: no complete line buffered yet.
        match result {
            Ok(Some(line)) => Ok(Some(parse_line(&line))),
            Ok(None) => Ok(None),
            Err(LinesCodecError::MaxLineLengthExceeded) => Ok(Some(Some(Err(
                DecodeError::TooLarge {
                    max: self.max_length(),
                },
            )))),
            Err(LinesCodecError::Io(e)) if e.kind() == io::ErrorKind::InvalidData => {
                Ok(Some(Some(Err(DecodeError::InvalidUtf8))))
            }
            Err(LinesCodecError::Io(e)) => Err(CodecError::Io(e)),
        }
    }
}

impl<T> Default for FrameCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: DeserializeOwned> Decoder for FrameCodec<T> {
    type Item = Result<T, DecodeError>;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let line = self.lines.decode(src);
            match self.map_line(line)? {
                Some(Some(item)) => return Ok(Some(item)),
                Some(None) => continue,
                None => return Ok(None),
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let line = self.lines.decode_eof(src);
            match self.map_line(line)? {
                Some(Some(item)) => return Ok(Some(item)),
                Some(None) => continue,
                None => return Ok(None),
            }
        }
    }
}

fn parse_line<T: DeserializeOwned>(line: &str) -> Parsed<T> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }

    Some(
        serde_json::from_str(trimmed).map_err(|e| DecodeError::Malformed {
            reason: e.to_string(),
            preview: preview(trimmed),
        }),
    )
}

fn preview(line: &str) -> String {
    match line.char_indices().nth(PREVIEW_LEN) {
        Some((idx, _)) => format!("{}...", line.get(..idx).unwrap_or(line)),
        None => line.to_string(),
    }
}

/// Serializes `record` into one complete frame, delimiter included.
///
/// Encode once and write the same bytes to every recipient.
pub fn encode_frame<T: Serialize>(record: &T) -> Result<Bytes, EncodeError> {
    let mut encoded = serde_json::to_vec(record)?;
    encoded.push(b'\n');
    Ok(Bytes::from(encoded))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::ClientMessage;
    use futures::StreamExt;
    use tokio::io::AsyncWriteExt;
    use tokio_util::codec::FramedRead;

    fn decode_all(
        codec: &mut FrameCodec<ClientMessage>,
        buf: &mut BytesMut,
    ) -> Vec<Result<ClientMessage, DecodeError>> {
        let mut items = Vec::new();
        while let Some(item) = codec.decode(buf).unwrap() {
            items.push(item);
        }
        items
    }

    #[test]
    fn test_encode_appends_single_delimiter() {
        let frame = encode_frame(&ClientMessage::new("alice", "line one\nline two")).unwrap();
        assert_eq!(frame.iter().filter(|b| **b == b'\n').count(), 1);
        assert_eq!(frame.last(), Some(&b'\n'));
    }

    #[test]
    fn test_partial_frame_waits_for_delimiter() {
        let mut codec = FrameCodec::<ClientMessage>::new();
        let mut buf = BytesMut::from(&br#"{"username":"alice","con"#[..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(br#"tent":"hello"}"#);
        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(b"\n");
        let msg = codec.decode(&mut buf).unwrap().unwrap().unwrap();
        assert_eq!(msg, ClientMessage::new("alice", "hello"));
    }

    #[test]
    fn test_coalesced_frames_decode_separately() {
        let mut codec = FrameCodec::<ClientMessage>::new();
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&encode_frame(&ClientMessage::new("a", "one")).unwrap());
        buf.extend_from_slice(&encode_frame(&ClientMessage::new("a", "two")).unwrap());

        let items = decode_all(&mut codec, &mut buf);
        let contents: Vec<String> = items.into_iter().map(|m| m.unwrap().content).collect();
        assert_eq!(contents, vec!["one", "two"]);
    }

    #[test]
    fn test_blank_lines_and_crlf_are_tolerated() {
        let mut codec = FrameCodec::<ClientMessage>::new();
        let mut buf = BytesMut::from(&b"\n\r\n{\"content\":\"x\"}\r\n"[..]);
        let items = decode_all(&mut codec, &mut buf);
        assert_eq!(items.len(), 1);
        assert_eq!(items.into_iter().next().unwrap().unwrap().content, "x");
    }

    #[test]
    fn test_malformed_frame_does_not_poison_stream() {
        let mut codec = FrameCodec::<ClientMessage>::new();
        let mut buf = BytesMut::from(&b"not json\n{\"content\":\"ok\"}\n"[..]);
        let items = decode_all(&mut codec, &mut buf);
        assert_eq!(items.len(), 2);
        assert!(matches!(items[0], Err(DecodeError::Malformed { .. })));
        assert_eq!(items[1].as_ref().unwrap().content, "ok");
    }

    #[test]
    fn test_invalid_utf8_is_a_frame_error() {
        let mut codec = FrameCodec::<ClientMessage>::new();
        let mut buf = BytesMut::from(&b"\xff\xfe\n{\"content\":\"ok\"}\n"[..]);
        let items = decode_all(&mut codec, &mut buf);
        assert!(matches!(items[0], Err(DecodeError::InvalidUtf8)));
        assert_eq!(items[1].as_ref().unwrap().content, "ok");
    }

    #[test]
    fn test_oversized_frame_is_skipped() {
        let mut codec = FrameCodec::<ClientMessage>::with_max_length(16);
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&[b'a'; 40]);
        buf.extend_from_slice(b"\n{\"content\":\"x\"}\n");

        let items = decode_all(&mut codec, &mut buf);
        assert!(matches!(items[0], Err(DecodeError::TooLarge { max: 16 })));
        assert_eq!(items.last().unwrap().as_ref().unwrap().content, "x");
    }

    #[test]
    fn test_unterminated_final_frame_decodes_at_eof() {
        let mut codec = FrameCodec::<ClientMessage>::new();
        let mut buf = BytesMut::from(&b"{\"content\":\"tail\"}"[..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        let msg = codec.decode_eof(&mut buf).unwrap().unwrap().unwrap();
        assert_eq!(msg.content, "tail");
    }

    #[test]
    fn test_preview_truncates_long_lines() {
        let long = "x".repeat(200);
        let p = preview(&long);
        assert!(p.ends_with("..."));
        assert_eq!(p.len(), PREVIEW_LEN + 3);
    }

    #[tokio::test]
    async fn test_fragmented_stream_through_framed_read() {
        let (mut writer, reader) = tokio::io::duplex(8);
        let mut frames = FramedRead::new(reader, FrameCodec::<ClientMessage>::new());

        tokio::spawn(async move {
            let mut bytes = Vec::new();
            bytes.extend_from_slice(&encode_frame(&ClientMessage::new("alice", "first")).unwrap());
            bytes.extend_from_slice(&encode_frame(&ClientMessage::new("alice", "second")).unwrap());
            for chunk in bytes.chunks(3) {
                writer.write_all(chunk).await.unwrap();
            }
        });

        let first = frames.next().await.unwrap().unwrap().unwrap();
        let second = frames.next().await.unwrap().unwrap().unwrap();
        assert_eq!(first.content, "first");
        assert_eq!(second.content, "second");
        assert!(frames.next().await.is_none());
    }
}
