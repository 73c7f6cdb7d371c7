//! Lazy fragment sequence over an asynchronous byte source.

use std::collections::VecDeque;
use std::pin::Pin;

use futures::{Stream, StreamExt};
use thiserror::Error;

use super::decoder::{DecodedLine, FrameDecoder};
use super::frame::{FrameUsage, StreamFrame};

/// Boxed error type accepted from byte sources
pub type SourceError = Box<dyn std::error::Error + Send + Sync>;

/// Fatal errors that end a fragment stream
#[derive(Debug, Error)]
pub enum StreamError {
    /// The byte source failed (connection reset, body read error, ...)
    #[error("transport failure: {0}")]
    Transport(#[source] SourceError),

    /// The backend reported an error frame in-band
    #[error("backend error: {0}")]
    Backend(String),
}

impl StreamError {
    /// Whether the failure came from the byte source itself
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

/// One piece of generated text, in arrival order
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Fragment {
    /// Text to append (may be empty)
    pub text: String,
    /// The frame carried `done: true`
    pub done: bool,
    /// Usage statistics carried by the frame
    pub usage: Option<FrameUsage>,
}

impl From<StreamFrame> for Fragment {
    fn from(frame: StreamFrame) -> Self {
        let usage = frame.usage();
        Self {
            text: frame.response,
            done: frame.done,
            usage,
        }
    }
}

struct DecodeState<S> {
    source: Pin<Box<S>>,
    decoder: FrameDecoder,
    ready: VecDeque<Result<Fragment, StreamError>>,
    finished: bool,
}

impl<S> DecodeState<S> {
    fn absorb(&mut self, lines: impl IntoIterator<Item = DecodedLine>) {
        for line in lines {
            match line {
                DecodedLine::Frame(frame) => {
                    if let Some(error) = frame.error {
                        tracing::warn!(error = %error, "Backend reported error frame");
                        self.ready.push_back(Err(StreamError::Backend(error)));
                        self.terminate();
                        return;
                    }
                    if frame.done {
                        tracing::debug!(
                            done_reason = frame.done_reason.as_deref().unwrap_or("unknown"),
                            "Received done frame"
                        );
                    }
                    self.ready.push_back(Ok(Fragment::from(frame)));
                }
                DecodedLine::Malformed { line, error } => {
                    tracing::warn!(line = %line, error = %error, "Dropping malformed stream frame");
                }
            }
        }
    }

    fn terminate(&mut self) {
        self.finished = true;
        self.decoder.reset();
    }
}

/// Decode a byte source into an ordered stream of fragments.
///
/// The stream ends when the source ends; a `done: true` frame does not stop
/// decoding. A source error or an in-band error frame is yielded once as
/// `Err` and ends the stream. Dropping the returned stream drops the source.
pub fn decode_fragments<S, B, E>(source: S) -> impl Stream<Item = Result<Fragment, StreamError>>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: Into<SourceError>,
{
    let state = DecodeState {
        source: Box::pin(source),
        decoder: FrameDecoder::new(),
        ready: VecDeque::new(),
        finished: false,
    };

    futures::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.ready.pop_front() {
                return Some((item, state));
            }
            if state.finished {
                return None;
            }
            match state.source.next().await {
                Some(Ok(chunk)) => {
                    let lines = state.decoder.feed(chunk.as_ref());
                    tracing::trace!(
                        bytes = chunk.as_ref().len(),
                        lines = lines.len(),
                        "Decoded chunk"
                    );
                    state.absorb(lines);
                }
                Some(Err(e)) => {
                    let error = StreamError::Transport(e.into());
                    tracing::warn!(error = %error, "Byte source failed");
                    state.ready.push_back(Err(error));
                    state.terminate();
                }
                None => {
                    state.finished = true;
                    if let Some(line) = state.decoder.finish() {
                        state.absorb([line]);
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    type Chunk = Result<Vec<u8>, std::io::Error>;

    fn chunks(parts: &[&[u8]]) -> Vec<Chunk> {
        parts.iter().map(|p| Ok(p.to_vec())).collect()
    }

    async fn collect(source: Vec<Chunk>) -> Vec<Result<Fragment, StreamError>> {
        decode_fragments(stream::iter(source)).collect().await
    }

    fn texts(items: &[Result<Fragment, StreamError>]) -> Vec<String> {
        items
            .iter()
            .filter_map(|i| i.as_ref().ok().map(|f| f.text.clone()))
            .collect()
    }

    #[tokio::test]
    async fn test_emits_fragments_in_order() {
        let items = collect(chunks(&[
            b"{\"response\":\"Hel\"}\n{\"response\":\"lo\"}\n{\"response\":\"\",\"done\":true}\n",
        ]))
        .await;

        assert_eq!(texts(&items), vec!["Hel", "lo", ""]);
        assert!(items.iter().all(Result::is_ok));
        let last = items.last().unwrap().as_ref().unwrap();
        assert!(last.done);
    }

    #[tokio::test]
    async fn test_done_frame_does_not_stop_decoding() {
        let items = collect(chunks(&[
            b"{\"response\":\"a\",\"done\":true}\n",
            b"{\"response\":\"b\"}\n",
        ]))
        .await;
        assert_eq!(texts(&items), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_malformed_line_is_skipped() {
        let items = collect(chunks(&[
            b"{\"response\":\"x\"}\n{broken\n",
            b"{\"response\":\"y\"}\n",
        ]))
        .await;
        assert_eq!(texts(&items), vec!["x", "y"]);
        assert!(items.iter().all(Result::is_ok));
    }

    #[tokio::test]
    async fn test_trailing_line_without_newline() {
        let items = collect(chunks(&[b"{\"response\":\"a\"}\n{\"response\":\"b\"}"])).await;
        assert_eq!(texts(&items), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_transport_error_is_terminal() {
        let source: Vec<Chunk> = vec![
            Ok(b"{\"response\":\"par".to_vec()),
            Ok(b"tial\"}\n{\"response\":\"lost".to_vec()),
            Err(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "reset",
            )),
            Ok(b"\"}\n".to_vec()),
        ];
        let items = collect(source).await;

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap().text, "partial");
        assert!(matches!(&items[1], Err(e) if e.is_transport()));
    }

    #[tokio::test]
    async fn test_error_frame_is_terminal() {
        let items = collect(chunks(&[
            b"{\"response\":\"a\"}\n{\"error\":\"out of memory\"}\n{\"response\":\"b\"}\n",
        ]))
        .await;

        assert_eq!(items.len(), 2);
        assert!(matches!(&items[1], Err(StreamError::Backend(msg)) if msg == "out of memory"));
    }

    #[tokio::test]
    async fn test_empty_source() {
        assert!(collect(Vec::new()).await.is_empty());
    }

    #[tokio::test]
    async fn test_usage_on_final_fragment() {
        let items = collect(chunks(&[
            b"{\"response\":\"hi\"}\n{\"response\":\"\",\"done\":true,\"eval_count\":7}\n",
        ]))
        .await;
        let last = items.last().unwrap().as_ref().unwrap();
        assert_eq!(last.usage.and_then(|u| u.eval_count), Some(7));
    }
}
