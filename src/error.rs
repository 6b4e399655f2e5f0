use std::error::Error as StdError;
use std::fmt;

use memchr::{memchr_iter, memrchr};
use thiserror::Error;

pub(crate) type AnyStdError = Box<dyn StdError + Send + Sync + 'static>;

/// Where in the source buffer a problem was detected.
///
/// `line` and `column` are 1-based and derived from the number of `\n` bytes before `offset`
/// and the number of bytes since the last one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    /// Byte offset into the source buffer
    pub offset: usize,
    /// 1-based line number
    pub line: usize,
    /// 1-based column, counted in bytes
    pub column: usize,
}

impl Position {
    /// Locate `offset` within `buffer`.
    ///
    /// Offsets past the end of the buffer are clamped for the line/column count but reported as
    /// given.
    pub fn locate(buffer: &[u8], offset: usize) -> Self {
        let prefix = &buffer[..offset.min(buffer.len())];

        let line = memchr_iter(b'\n', prefix).count() + 1;
        let line_start = memrchr(b'\n', prefix).map_or(0, |idx| idx + 1);

        Position {
            offset,
            line,
            column: prefix.len() - line_start + 1,
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "offset {} (line {}, column {})",
            self.offset, self.line, self.column
        )
    }
}

/// The decoder state a failure was detected in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateKind {
    /// Reading a delimiter line
    Boundary,
    /// Reading the name of a part header
    HeaderName,
    /// Reading one `;` separated segment of a part header's value
    HeaderValue,
    /// Scanning part content for the next delimiter
    Content,
}

impl fmt::Display for StateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StateKind::Boundary => "boundary",
            StateKind::HeaderName => "header name",
            StateKind::HeaderValue => "header value",
            StateKind::Content => "content",
        };

        f.write_str(name)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
/// Fatal failures raised while decoding a multipart body.
///
/// There is no recovery: once one of these is returned the decoder yields nothing further.
pub enum DecodeError {
    /// Given if a `\r` is not immediately followed by `\n` where a line ending is expected
    #[error("Malformed newline: `\\r` not followed by `\\n` at {at}")]
    MalformedNewline {
        /// Position of the `\r`
        at: Position,
    },
    /// Given if a header line ends before a `:` was seen
    #[error("Malformed header name {name:?}: line ended without `:` at {at}")]
    MalformedHeaderName {
        /// The header name read so far
        name: String,
        /// Position of the line ending
        at: Position,
    },
    /// Given if anything other than a single line ending follows the final boundary
    #[error("Trailing content after final boundary at {at} (input is {len} bytes)")]
    TrailingContent {
        /// Position of the first byte after the final boundary
        at: Position,
        /// Total length of the input
        len: usize,
    },
    /// Given if the input runs out before the final boundary
    #[error("Unexpected end of input at {at} while reading {state}")]
    UnexpectedEndOfInput {
        /// Position of the end of the input
        at: Position,
        /// The state the decoder was left in
        state: StateKind,
    },
    /// Given if a part declares more headers than `DecodeOptions::max_headers` allows
    #[error("Too many headers in part (limit {limit}) at {at}")]
    TooManyHeaders {
        /// The configured limit
        limit: usize,
        /// Position of the line ending of the header over the limit
        at: Position,
    },
    /// Given if the body holds more parts than `DecodeOptions::max_parts` allows
    #[error("Too many parts (limit {limit}) at {at}")]
    TooManyParts {
        /// The configured limit
        limit: usize,
        /// Position of the delimiter closing the part over the limit
        at: Position,
    },
}

impl DecodeError {
    /// Where the failure was detected
    pub fn position(&self) -> Position {
        match self {
            DecodeError::MalformedNewline { at }
            | DecodeError::MalformedHeaderName { at, .. }
            | DecodeError::TrailingContent { at, .. }
            | DecodeError::UnexpectedEndOfInput { at, .. }
            | DecodeError::TooManyHeaders { at, .. }
            | DecodeError::TooManyParts { at, .. } => *at,
        }
    }

    /// The state the decoder was stuck in, for end of input failures
    pub fn state(&self) -> Option<StateKind> {
        match self {
            DecodeError::UnexpectedEndOfInput { state, .. } => Some(*state),
            _ => None,
        }
    }
}

#[derive(Error, Debug)]
/// Errors from [`BufferedMultipart`](../stream/struct.BufferedMultipart.html)
pub enum MultipartError {
    /// Given if the buffered body fails to decode
    #[error(transparent)]
    Decode(#[from] DecodeError),
    /// Given if there is an error in the underlying stream
    #[error(transparent)]
    Stream(#[from] AnyStdError),
    /// Given if the body grows past `DecodeOptions::max_body_size` while buffering
    #[error("Body exceeds the {limit} byte limit")]
    BodyTooLarge {
        /// The configured limit
        limit: usize,
    },
}
