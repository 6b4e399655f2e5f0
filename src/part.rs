use std::fmt;
use std::ops::Range;

use bytes::Bytes;
use http::header::{HeaderMap, HeaderName, HeaderValue};
use thiserror::Error;

/// A single part header, with its value split on `;`
///
/// `Content-Disposition: form-data; name="file"` is read as the name `Content-Disposition` and the
/// values `["form-data", "name=\"file\""]`. Leading spaces of each segment are dropped, nothing else
/// is interpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    name: String,
    values: Vec<String>,
}

impl Header {
    /// Construct a header from a name and its `;` separated segments
    pub fn new<I: Into<String>>(name: I, values: Vec<String>) -> Self {
        Header {
            name: name.into(),
            values,
        }
    }

    /// The header name, exactly as it appeared in the input
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The value segments, first to last
    pub fn values(&self) -> &[String] {
        &self.values
    }

    /// The first value segment, i.e `form-data` for a `Content-Disposition` header
    pub fn first_value(&self) -> Option<&str> {
        self.values.first().map(String::as_str)
    }
}

impl fmt::Display for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.values.join("; "))
    }
}

/// One part of a multipart body.
///
/// A part never holds its content. It records where in the decoded buffer the content lives, and
/// the caller slices it out with [`content`](#method.content) or [`content_bytes`](#method.content_bytes).
///
/// Headers are kept in the order the decoder collected them, which is the reverse of the order they
/// were declared in: the last header line of the part comes first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part {
    headers: Vec<Header>,
    content_offset: usize,
    content_length: usize,
}

impl Part {
    pub(crate) fn new(headers: Vec<Header>, content_offset: usize, content_length: usize) -> Self {
        Part {
            headers,
            content_offset,
            content_length,
        }
    }

    /// Return the headers for the part, last declared first
    pub fn headers(&self) -> &[Header] {
        &self.headers
    }

    /// Byte index into the source buffer where the content begins
    pub fn content_offset(&self) -> usize {
        self.content_offset
    }

    /// Number of content bytes
    pub fn content_length(&self) -> usize {
        self.content_length
    }

    /// The content span as a range into the source buffer
    pub fn content_range(&self) -> Range<usize> {
        self.content_offset..self.content_offset + self.content_length
    }

    /// Slice the content out of the buffer this part was decoded from.
    ///
    /// Returns `None` if `source` is too short to hold the span, which means it is not the buffer
    /// the part came from.
    pub fn content<'a>(&self, source: &'a [u8]) -> Option<&'a [u8]> {
        source.get(self.content_range())
    }

    /// Like [`content`](#method.content) but returns a zero-copy handle into `source`
    pub fn content_bytes(&self, source: &Bytes) -> Option<Bytes> {
        let range = self.content_range();

        if range.end > source.len() {
            return None;
        }

        Some(source.slice(range))
    }

    /// Return the first header (in stored order) whose name matches exactly.
    ///
    /// No case folding is done. With repeated headers this is the one declared last.
    pub fn header(&self, name: &str) -> Option<&Header> {
        self.headers.iter().find(|header| header.name == name)
    }

    /// All headers with a matching name, in stored order
    pub fn headers_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Header> + 'a {
        self.headers.iter().filter(move |header| header.name == name)
    }

    /// Convert the headers into an `http::HeaderMap`.
    ///
    /// Value segments are joined back with `"; "`. Repeated headers are appended in stored order.
    pub fn header_map(&self) -> Result<HeaderMap<HeaderValue>, InvalidHeader> {
        let mut header_map = HeaderMap::with_capacity(self.headers.len());

        for header in &self.headers {
            let name = HeaderName::from_bytes(header.name.as_bytes())
                .map_err(|_| InvalidHeader::Name(header.name.clone()))?;
            let value = HeaderValue::from_str(&header.values.join("; "))
                .map_err(|_| InvalidHeader::Value(header.name.clone()))?;

            header_map.append(name, value);
        }

        Ok(header_map)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
/// Given by [`Part::header_map`](struct.Part.html#method.header_map) for headers `http` will not accept
pub enum InvalidHeader {
    /// The header name is not a valid HTTP header name
    #[error("Invalid header name {0:?}")]
    Name(String),
    /// The value of the named header is not a valid HTTP header value
    #[error("Invalid value for header {0:?}")]
    Value(String),
}
