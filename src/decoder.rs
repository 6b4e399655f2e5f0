use std::collections::VecDeque;
use std::iter::FusedIterator;

use log::{debug, trace};
use memchr::memchr;

use crate::error::{DecodeError, Position, StateKind};
use crate::part::{Header, Part};

/// Limits and strictness switches for a [`Decoder`](struct.Decoder.html)
///
/// The default imposes no limits.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DecodeOptions {
    /// Fail with `UnexpectedEndOfInput` if the input ends inside part content.
    ///
    /// When unset the sequence simply ends there and the unfinished part is not yielded.
    pub require_final_boundary: bool,
    /// Maximum number of parts in a body
    pub max_parts: Option<usize>,
    /// Maximum number of headers in a single part
    pub max_headers: Option<usize>,
    /// Maximum body size accepted by [`BufferedMultipart`](../stream/struct.BufferedMultipart.html)
    pub max_body_size: Option<usize>,
}

impl DecodeOptions {
    /// Creates a permissive configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `require_final_boundary`
    pub fn with_require_final_boundary(mut self, require: bool) -> Self {
        self.require_final_boundary = require;
        self
    }

    /// Sets the maximum number of parts
    pub fn with_max_parts(mut self, max_parts: usize) -> Self {
        self.max_parts = Some(max_parts);
        self
    }

    /// Sets the maximum number of headers per part
    pub fn with_max_headers(mut self, max_headers: usize) -> Self {
        self.max_headers = Some(max_headers);
        self
    }

    /// Sets the maximum buffered body size
    pub fn with_max_body_size(mut self, max_body_size: usize) -> Self {
        self.max_body_size = Some(max_body_size);
        self
    }
}

/// A lazy multipart decoder over a fully buffered body.
///
/// The boundary is not supplied: it is the first line of the body, taken verbatim (so usually
/// `--` followed by the token from the `Content-Type` header). Both `\n` and `\r\n` line endings
/// are accepted.
///
/// Each call to `next` scans just far enough to complete one [`Part`](../part/struct.Part.html).
/// Parts only describe where their content is, so the buffer has to outlive them if you want to
/// read it. Dropping the decoder half way through is fine, nothing is held but the buffer.
///
/// A body that is cut off inside part content is not an error by default: the sequence just ends
/// without the unfinished part. Set `DecodeOptions::require_final_boundary` to have it reported as
/// `UnexpectedEndOfInput`.
///
/// ```
/// use mpart_span::Decoder;
///
/// let body: &[u8] = b"--AaB03x\r\n\
///         Content-Disposition: form-data; name=\"field\"\r\n\
///         \r\n\
///         value\r\n\
///         --AaB03x--\r\n";
///
/// for part in Decoder::new(body) {
///     let part = part.unwrap();
///     assert_eq!(part.content(body), Some(&b"value"[..]));
/// }
/// ```
#[derive(Debug, Clone)]
pub struct Decoder<B> {
    buf: B,
    machine: Machine,
}

impl<B: AsRef<[u8]>> Decoder<B> {
    /// Construct a decoder over a complete multipart body
    pub fn new(buf: B) -> Self {
        Self::with_options(buf, DecodeOptions::default())
    }

    /// Construct a decoder with explicit limits
    pub fn with_options(buf: B, options: DecodeOptions) -> Self {
        Decoder {
            buf,
            machine: Machine::new(options),
        }
    }

    /// The boundary line, once the first line of the body has been read
    pub fn boundary(&self) -> Option<&[u8]> {
        self.machine.boundary.as_deref()
    }

    /// The current scan offset
    pub fn position(&self) -> usize {
        self.machine.pos
    }

    /// The buffer being decoded
    pub fn source(&self) -> &[u8] {
        self.buf.as_ref()
    }

    /// The buffer as it was given
    pub fn get_ref(&self) -> &B {
        &self.buf
    }

    /// Give back the buffer
    pub fn into_inner(self) -> B {
        self.buf
    }
}

impl<B: AsRef<[u8]>> Iterator for Decoder<B> {
    type Item = Result<Part, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.machine.next_part(self.buf.as_ref()).transpose()
    }
}

impl<B: AsRef<[u8]>> FusedIterator for Decoder<B> {}

#[derive(Debug, Clone)]
enum State {
    Boundary {
        line: Vec<u8>,
    },
    HeaderName {
        name: Vec<u8>,
        headers: VecDeque<Header>,
    },
    HeaderValue {
        value: Vec<u8>,
        values: Vec<String>,
        name: String,
        headers: VecDeque<Header>,
    },
    Content {
        start: usize,
        headers: VecDeque<Header>,
    },
}

impl State {
    fn kind(&self) -> StateKind {
        match self {
            State::Boundary { .. } => StateKind::Boundary,
            State::HeaderName { .. } => StateKind::HeaderName,
            State::HeaderValue { .. } => StateKind::HeaderValue,
            State::Content { .. } => StateKind::Content,
        }
    }
}

#[derive(Debug)]
enum Transition {
    Continue(State),
    /// A finished part, and the state to resume in (`None` after the final boundary)
    Yield(Part, Option<State>),
}

#[derive(Debug, Clone)]
struct Machine {
    options: DecodeOptions,
    pos: usize,
    boundary: Option<Vec<u8>>,
    // `None` once finished or failed
    state: Option<State>,
    // Reported on the pull after the last part was yielded
    pending: Option<DecodeError>,
    parts: usize,
}

impl Machine {
    fn new(options: DecodeOptions) -> Self {
        Machine {
            options,
            pos: 0,
            boundary: None,
            state: Some(State::Boundary { line: Vec::new() }),
            pending: None,
            parts: 0,
        }
    }

    fn next_part(&mut self, buf: &[u8]) -> Result<Option<Part>, DecodeError> {
        if let Some(err) = self.pending.take() {
            return Err(err);
        }

        let mut state = match self.state.take() {
            Some(state) => state,
            None => return Ok(None),
        };

        loop {
            if self.pos >= buf.len() {
                return self.end_of_input(buf, state);
            }

            match self.step(buf, state)? {
                Transition::Continue(next) => state = next,
                Transition::Yield(part, next) => {
                    self.parts += 1;
                    self.state = next;
                    return Ok(Some(part));
                }
            }
        }
    }

    fn end_of_input(&self, buf: &[u8], state: State) -> Result<Option<Part>, DecodeError> {
        if let State::Content { start, .. } = state {
            if !self.options.require_final_boundary {
                debug!(
                    "Input ended inside content starting at {} without a final boundary, dropping unfinished part",
                    start
                );
                return Ok(None);
            }
        }

        Err(DecodeError::UnexpectedEndOfInput {
            at: Position::locate(buf, buf.len()),
            state: state.kind(),
        })
    }

    fn step(&mut self, buf: &[u8], state: State) -> Result<Transition, DecodeError> {
        let pos = self.pos;

        match state {
            State::Boundary { mut line } => {
                if let Some(ending) = line_ending(buf, pos)? {
                    self.pos += ending;

                    if self.boundary.is_none() {
                        debug!("Boundary captured: {:?}", String::from_utf8_lossy(&line));
                        self.boundary = Some(line);
                    } else if !line.is_empty() {
                        debug!("Ignoring {} bytes after interior boundary", line.len());
                    }

                    return Ok(Transition::Continue(State::HeaderName {
                        name: Vec::new(),
                        headers: VecDeque::new(),
                    }));
                }

                line.push(buf[pos]);
                self.pos += 1;

                Ok(Transition::Continue(State::Boundary { line }))
            }
            State::HeaderName { mut name, headers } => {
                if let Some(ending) = line_ending(buf, pos)? {
                    if !name.is_empty() {
                        return Err(DecodeError::MalformedHeaderName {
                            name: String::from_utf8_lossy(&name).into_owned(),
                            at: Position::locate(buf, pos),
                        });
                    }

                    self.pos += ending;
                    trace!("Header block ended, content starts at {}", self.pos);

                    return Ok(Transition::Continue(State::Content {
                        start: self.pos,
                        headers,
                    }));
                }

                self.pos += 1;

                if buf[pos] == b':' {
                    return Ok(Transition::Continue(State::HeaderValue {
                        value: Vec::new(),
                        values: Vec::new(),
                        name: String::from_utf8_lossy(&name).into_owned(),
                        headers,
                    }));
                }

                name.push(buf[pos]);

                Ok(Transition::Continue(State::HeaderName { name, headers }))
            }
            State::HeaderValue {
                mut value,
                mut values,
                name,
                mut headers,
            } => {
                if let Some(ending) = line_ending(buf, pos)? {
                    values.push(String::from_utf8_lossy(&value).into_owned());
                    headers.push_front(Header::new(name, values));

                    if let Some(limit) = self.options.max_headers {
                        if headers.len() > limit {
                            return Err(DecodeError::TooManyHeaders {
                                limit,
                                at: Position::locate(buf, pos),
                            });
                        }
                    }

                    self.pos += ending;

                    return Ok(Transition::Continue(State::HeaderName {
                        name: Vec::new(),
                        headers,
                    }));
                }

                self.pos += 1;

                match buf[pos] {
                    b';' => {
                        values.push(String::from_utf8_lossy(&value).into_owned());
                        value.clear();
                    }
                    b' ' if value.is_empty() => (),
                    byte => value.push(byte),
                }

                Ok(Transition::Continue(State::HeaderValue {
                    value,
                    values,
                    name,
                    headers,
                }))
            }
            State::Content { start, headers } => self.scan_content(buf, start, headers),
        }
    }

    /// Scan content from the current position up to the next line ending, and check whether the
    /// boundary follows it.
    ///
    /// Only `\n` bytes can start a match, so everything in between is skipped with `memchr`.
    fn scan_content(
        &mut self,
        buf: &[u8],
        start: usize,
        headers: VecDeque<Header>,
    ) -> Result<Transition, DecodeError> {
        let newline = match memchr(b'\n', &buf[self.pos..]) {
            Some(idx) => self.pos + idx,
            None => {
                self.pos = buf.len();
                return Ok(Transition::Continue(State::Content { start, headers }));
            }
        };

        // The `\r` of a `\r\n` only belongs to the line ending if it is inside the content
        let ending_start = if newline > start && buf[newline - 1] == b'\r' {
            newline - 1
        } else {
            newline
        };

        let after_newline = newline + 1;
        self.pos = after_newline;

        let boundary = self.boundary.as_deref().unwrap_or_default();

        if !buf[after_newline..].starts_with(boundary) {
            return Ok(Transition::Continue(State::Content { start, headers }));
        }

        if let Some(limit) = self.options.max_parts {
            if self.parts >= limit {
                return Err(DecodeError::TooManyParts {
                    limit,
                    at: Position::locate(buf, ending_start),
                });
            }
        }

        let part = Part::new(headers.into(), start, ending_start - start);
        let after_boundary = after_newline + boundary.len();

        debug!(
            "Part {} decoded: offset {}, length {}, {} headers",
            self.parts,
            part.content_offset(),
            part.content_length(),
            part.headers().len()
        );

        if buf[after_boundary..].starts_with(b"--") {
            let trailer = after_boundary + 2;
            debug!("Final boundary reached at {}", after_newline);

            match &buf[trailer..] {
                b"" | b"\n" | b"\r\n" => self.pos = buf.len(),
                _ => {
                    self.pos = trailer;
                    self.pending = Some(DecodeError::TrailingContent {
                        at: Position::locate(buf, trailer),
                        len: buf.len(),
                    });
                }
            }

            Ok(Transition::Yield(part, None))
        } else {
            self.pos = after_boundary;

            Ok(Transition::Yield(
                part,
                Some(State::Boundary { line: Vec::new() }),
            ))
        }
    }
}

/// Length of the line ending at `pos` (`1` for `\n`, `2` for `\r\n`), if there is one
fn line_ending(buf: &[u8], pos: usize) -> Result<Option<usize>, DecodeError> {
    match buf[pos] {
        b'\n' => Ok(Some(1)),
        b'\r' if buf.get(pos + 1) == Some(&b'\n') => Ok(Some(2)),
        b'\r' => Err(DecodeError::MalformedNewline {
            at: Position::locate(buf, pos),
        }),
        _ => Ok(None),
    }
}
