#![warn(missing_docs)]
//! # Zero-copy multipart decoding
//!
//! Decodes a fully buffered `multipart/form-data` body into a lazy sequence of [`Part`]s. A part
//! carries its headers and the offset and length of its content in the original buffer; content
//! is never copied.
//!
//! The boundary is read from the first line of the body, so no `Content-Type` header is needed:
//!
//! ```
//! use mpart_span::decode;
//!
//! let body: &[u8] = b"--B\nContent-Type: text/plain\n\nhello\n--B--\n";
//!
//! let parts = decode(body).collect::<Result<Vec<_>, _>>().unwrap();
//!
//! assert_eq!(parts[0].header("Content-Type").unwrap().first_value(), Some("text/plain"));
//! assert_eq!(parts[0].content(body), Some(&b"hello"[..]));
//! ```
//!
//! [`MultipartWriter`] writes bodies in the same framing, and [`BufferedMultipart`] buffers a
//! stream of `Bytes` chunks before decoding it.

/// The multipart state machine
pub mod decoder;
/// Decoding errors
pub mod error;
/// Writing multipart bodies
pub mod encoder;
/// Decoded headers and parts
pub mod part;
/// Decoding bodies that arrive as a stream
pub mod stream;

pub use decoder::{DecodeOptions, Decoder};
pub use encoder::{LineEnding, MultipartWriter};
pub use error::{DecodeError, MultipartError, Position, StateKind};
pub use part::{Header, InvalidHeader, Part};
pub use stream::{collect_parts, BufferedMultipart, BufferedPart};

/// Decode a complete multipart body.
///
/// Shorthand for [`Decoder::new`](decoder/struct.Decoder.html#method.new).
///
/// A body truncated inside part content ends the sequence without an error; use
/// [`DecodeOptions::require_final_boundary`](decoder/struct.DecodeOptions.html) with
/// `Decoder::with_options` to reject it.
pub fn decode(buffer: &[u8]) -> Decoder<&[u8]> {
    Decoder::new(buffer)
}
