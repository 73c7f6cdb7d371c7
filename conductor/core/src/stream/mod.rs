//! Incremental Stream Decoding
//!
//! Turns the raw byte stream of a generation endpoint into ordered text
//! fragments.
//!
//! # Wire format
//!
//! ```text
//! {"response":"Hel","done":false}\n
//! {"response":"lo","done":false}\n
//! {"response":"","done":true,"eval_count":2}\n
//! ```
//!
//! Chunks arrive with arbitrary boundaries: a line, or a single UTF-8
//! character, may be split across any number of chunks.
//!
//! # Layers
//!
//! - [`FrameDecoder`]: synchronous bytes-to-lines state machine. One per
//!   stream; call [`FrameDecoder::reset`] before reusing it.
//! - [`decode_fragments`]: wraps any `Stream<Item = Result<bytes, error>>`
//!   into a lazy `Stream<Item = Result<Fragment, StreamError>>`.
//!
//! # Example
//!
//! ```ignore
//! use futures::StreamExt;
//! use neurorad_core::stream::decode_fragments;
//!
//! let mut fragments = std::pin::pin!(decode_fragments(response.bytes_stream()));
//! while let Some(fragment) = fragments.next().await {
//!     print!("{}", fragment?.text);
//! }
//! ```

mod decoder;
mod fragments;
mod frame;

pub use decoder::{DecodedLine, FrameDecoder};
pub use fragments::{decode_fragments, Fragment, SourceError, StreamError};
pub use frame::{FrameUsage, StreamFrame};
