//! Line-oriented decoding of the `data:` event stream.

use std::collections::VecDeque;

use futures::StreamExt as _;
use futures::stream;
use tracing::warn;

use crate::errors::SessionError;
use crate::transport::ByteStream;

const DATA_MARKER: &str = "data:";
const DONE_SENTINEL: &str = "[DONE]";

/// One decoded unit of the wire stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Payload of a `data:` line with the marker removed.
    Data(String),
    /// The terminal `[DONE]` sentinel.
    Done,
}

/// Incremental splitter that tolerates arbitrary chunk boundaries.
#[derive(Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
}

impl FrameDecoder {
    /// Feeds raw bytes and returns every frame completed by them.
    pub fn push_chunk(&mut self, chunk: &[u8]) -> Vec<Frame> {
        self.buf.extend_from_slice(chunk);
        let mut frames = Vec::new();
        while let Some(idx) = self.buf.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=idx).collect();
            if let Some(frame) = decode_line(&line[..idx]) {
                frames.push(frame);
            }
        }
        frames
    }

    /// Flushes a trailing line that was not newline-terminated.
    pub fn finish(&mut self) -> Option<Frame> {
        if self.buf.is_empty() {
            return None;
        }
        let line = std::mem::take(&mut self.buf);
        decode_line(&line)
    }
}

fn decode_line(raw: &[u8]) -> Option<Frame> {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    let line = match std::str::from_utf8(raw) {
        Ok(line) => line,
        Err(e) => {
            warn!(len = raw.len(), error = %e, "dropping undecodable stream line");
            return None;
        }
    };
    let payload = line.strip_prefix(DATA_MARKER)?;
    let payload = payload.strip_prefix(' ').unwrap_or(payload);
    if payload.trim().is_empty() {
        return None;
    }
    if payload.trim() == DONE_SENTINEL {
        return Some(Frame::Done);
    }
    Some(Frame::Data(payload.to_string()))
}

/// Adapts a transport byte stream into a lazy stream of frames.
///
/// The stream ends right after `Frame::Done`, or when the transport closes.
/// A close without the sentinel simply ends the stream; callers treat it as
/// an implicit end. Transport read errors are yielded once and end the stream.
pub fn frame_stream(
    bytes: ByteStream,
) -> impl futures::Stream<Item = Result<Frame, SessionError>> + Send {
    struct State {
        bytes: ByteStream,
        decoder: FrameDecoder,
        pending: VecDeque<Frame>,
        done: bool,
    }

    stream::try_unfold(
        State {
            bytes,
            decoder: FrameDecoder::default(),
            pending: VecDeque::new(),
            done: false,
        },
        |mut state| async move {
            loop {
                if let Some(frame) = state.pending.pop_front() {
                    return Ok(Some((frame, state)));
                }
                if state.done {
                    return Ok(None);
                }

                match state.bytes.next().await {
                    Some(Ok(chunk)) => {
                        for frame in state.decoder.push_chunk(&chunk) {
                            let is_done = frame == Frame::Done;
                            state.pending.push_back(frame);
                            if is_done {
                                state.done = true;
                                break;
                            }
                        }
                    }
                    Some(Err(e)) => return Err(e),
                    None => {
                        state.pending.extend(state.decoder.finish());
                        state.done = true;
                    }
                }
            }
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn byte_stream(chunks: Vec<Result<&'static str, SessionError>>) -> ByteStream {
        Box::pin(stream::iter(
            chunks
                .into_iter()
                .map(|c| c.map(|s| bytes::Bytes::from_static(s.as_bytes()))),
        ))
    }

    #[test]
    fn decoder_handles_partial_chunk_boundaries() {
        let mut decoder = FrameDecoder::default();
        assert!(decoder.push_chunk(b"data: {\"choices\":[{\"del").is_empty());
        let frames = decoder.push_chunk(b"ta\":{}}]}\r\n");
        assert_eq!(
            frames,
            vec![Frame::Data("{\"choices\":[{\"delta\":{}}]}".into())]
        );
    }

    #[test]
    fn decoder_discards_padding_and_recognizes_sentinel() {
        let mut decoder = FrameDecoder::default();
        let frames = decoder.push_chunk(b"\n: keep-alive\nevent: x\ndata: {}\n\ndata:  [DONE] \n");
        assert_eq!(frames, vec![Frame::Data("{}".into()), Frame::Done]);
    }

    #[test]
    fn decoder_accepts_marker_without_space() {
        let mut decoder = FrameDecoder::default();
        let frames = decoder.push_chunk(b"data:{\"a\":1}\n");
        assert_eq!(frames, vec![Frame::Data("{\"a\":1}".into())]);
    }

    #[test]
    fn decoder_drops_invalid_utf8_lines() {
        let mut decoder = FrameDecoder::default();
        let frames = decoder.push_chunk(b"data: \xff\xfe\ndata: ok\n");
        assert_eq!(frames, vec![Frame::Data("ok".into())]);
    }

    #[test]
    fn finish_flushes_unterminated_line() {
        let mut decoder = FrameDecoder::default();
        assert!(decoder.push_chunk(b"data: tail").is_empty());
        assert_eq!(decoder.finish(), Some(Frame::Data("tail".into())));
        assert_eq!(decoder.finish(), None);
    }

    #[tokio::test]
    async fn frame_stream_stops_at_sentinel() {
        let frames: Vec<_> = frame_stream(byte_stream(vec![
            Ok("data: a\ndata: [DONE]\ndata: after\n"),
            Ok("data: never\n"),
        ]))
        .collect()
        .await;
        assert_eq!(
            frames,
            vec![Ok(Frame::Data("a".into())), Ok(Frame::Done)]
        );
    }

    #[tokio::test]
    async fn frame_stream_ends_on_close_without_sentinel() {
        let frames: Vec<_> = frame_stream(byte_stream(vec![Ok("data: a\n"), Ok("data: b")]))
            .collect()
            .await;
        assert_eq!(
            frames,
            vec![Ok(Frame::Data("a".into())), Ok(Frame::Data("b".into()))]
        );
    }

    #[tokio::test]
    async fn frame_stream_surfaces_read_errors() {
        let frames: Vec<_> = frame_stream(byte_stream(vec![
            Ok("data: a\n"),
            Err(SessionError::transport("connection reset")),
            Ok("data: b\n"),
        ]))
        .collect()
        .await;
        assert_eq!(
            frames,
            vec![
                Ok(Frame::Data("a".into())),
                Err(SessionError::transport("connection reset")),
            ]
        );
    }
}
