use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Bytes, BytesMut};
use futures_core::Stream;
use futures_util::StreamExt;
use log::debug;
use pin_project_lite::pin_project;

use crate::decoder::{DecodeOptions, Decoder};
use crate::error::{AnyStdError, MultipartError};
use crate::part::Part;

/// A decoded part together with its content
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferedPart {
    /// The decoded part, with offsets into the whole body
    pub part: Part,
    /// The part's content, a zero-copy slice of the buffered body
    pub content: Bytes,
}

pin_project! {
    /// Decode a multipart body arriving as a stream of byte chunks.
    ///
    /// The decoder works on complete bodies only, so the upstream stream is read to the end into a
    /// single buffer first (up to `DecodeOptions::max_body_size`). Parts are then decoded lazily from
    /// that buffer as this stream is polled.
    ///
    /// Once an error is returned, the stream is finished.
    #[project = BufferedProj]
    pub struct BufferedMultipart<S, E>
    where
        S: Stream<Item = Result<Bytes, E>>,
        E: Into<AnyStdError>,
    {
        #[pin]
        stream: S,
        body: BytesMut,
        options: Option<DecodeOptions>,
        decoder: Option<Decoder<Bytes>>,
        finished: bool,
    }
}

impl<S, E> BufferedMultipart<S, E>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: Into<AnyStdError>,
{
    /// Construct a BufferedMultipart over a stream of body chunks
    pub fn new(stream: S) -> Self {
        Self::with_options(stream, DecodeOptions::default())
    }

    /// Construct a BufferedMultipart with explicit limits
    pub fn with_options(stream: S, options: DecodeOptions) -> Self {
        Self {
            stream,
            body: BytesMut::new(),
            options: Some(options),
            decoder: None,
            finished: false,
        }
    }
}

impl<S, E> Stream for BufferedMultipart<S, E>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: Into<AnyStdError>,
{
    type Item = Result<BufferedPart, MultipartError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let BufferedProj {
            mut stream,
            body,
            options,
            decoder,
            finished,
        } = self.project();

        loop {
            if *finished {
                return Poll::Ready(None);
            }

            if let Some(decoder) = decoder.as_mut() {
                let next = match decoder.next() {
                    Some(Ok(part)) => part
                        .content_bytes(decoder.get_ref())
                        .map(|content| Ok(BufferedPart { part, content })),
                    Some(Err(err)) => Some(Err(MultipartError::Decode(err))),
                    None => None,
                };

                if !matches!(next, Some(Ok(_))) {
                    *finished = true;
                }

                return Poll::Ready(next);
            }

            match futures_core::ready!(stream.as_mut().poll_next(cx)) {
                Some(Ok(bytes)) => {
                    let limit = options.as_ref().and_then(|options| options.max_body_size);

                    if let Some(limit) = limit {
                        if body.len() + bytes.len() > limit {
                            *finished = true;
                            return Poll::Ready(Some(Err(MultipartError::BodyTooLarge { limit })));
                        }
                    }

                    body.extend_from_slice(&bytes);
                }
                Some(Err(e)) => {
                    *finished = true;
                    return Poll::Ready(Some(Err(MultipartError::Stream(e.into()))));
                }
                None => {
                    debug!("Body buffered, {} bytes", body.len());

                    let options = options.take().unwrap_or_default();
                    *decoder = Some(Decoder::with_options(body.split().freeze(), options));
                }
            }
        }
    }
}

/// Buffer `stream` and decode every part of it.
///
/// Stops at the first error, so no parts are returned for a body that does not decode fully.
pub async fn collect_parts<S, E>(
    stream: S,
    options: DecodeOptions,
) -> Result<Vec<BufferedPart>, MultipartError>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: Into<AnyStdError>,
{
    let mut parts = Vec::new();
    let mut multipart = Box::pin(BufferedMultipart::with_options(stream, options));

    while let Some(part) = multipart.next().await {
        parts.push(part?);
    }

    Ok(parts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DecodeError;
    use std::convert::Infallible;
    use std::io;

    //Used to feed a body in several chunks
    #[derive(Clone)]
    pub struct SplitStream {
        packets: Vec<Bytes>,
    }

    impl SplitStream {
        pub fn new() -> Self {
            SplitStream { packets: vec![] }
        }

        pub fn add_packet<P: Into<Bytes>>(&mut self, bytes: P) {
            self.packets.push(bytes.into());
        }
    }

    impl Stream for SplitStream {
        type Item = Result<Bytes, Infallible>;

        fn poll_next(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
            if self.as_mut().packets.is_empty() {
                return Poll::Ready(None);
            }

            Poll::Ready(Some(Ok(self.as_mut().packets.remove(0))))
        }
    }

    fn split_input(input: &'static [u8], size: usize) -> SplitStream {
        let mut stream = SplitStream::new();

        for chunk in input.chunks(size) {
            stream.add_packet(chunk);
        }

        stream
    }

    const INPUT: &[u8] = b"--AaB03x\r\n\
            Content-Disposition: form-data; name=\"file\"; filename=\"text.txt\"\r\n\
            Content-Type: text/plain\r\n\
            \r\n\
            Lorem Ipsum\n\r\n\
            --AaB03x\r\n\
            Content-Disposition: form-data; name=\"name1\"\r\n\
            \r\n\
            value1\r\n\
            --AaB03x--\r\n";

    #[tokio::test]
    async fn reads_chunked_body() {
        let mut read = BufferedMultipart::new(split_input(INPUT, 7));

        let first = read.next().await.unwrap().unwrap();
        assert_eq!(first.content, Bytes::from_static(b"Lorem Ipsum\n"));
        assert_eq!(
            first.part.header("Content-Type").and_then(|h| h.first_value()),
            Some("text/plain")
        );

        let second = read.next().await.unwrap().unwrap();
        assert_eq!(second.content, Bytes::from_static(b"value1"));

        assert!(read.next().await.is_none());
        assert!(read.next().await.is_none());
    }

    #[tokio::test]
    async fn collects_parts() {
        let parts = collect_parts(split_input(INPUT, 1), DecodeOptions::new())
            .await
            .unwrap();

        assert_eq!(parts.len(), 2);
        assert_eq!(parts[1].part.content_length(), 6);
    }

    #[tokio::test]
    async fn decode_error_ends_stream() {
        let input: &[u8] = b"--AaB03x\r\n\
                I am a bad header\r\n\
                \r\n";

        let mut read = BufferedMultipart::new(split_input(input, 4));

        match read.next().await {
            Some(Err(MultipartError::Decode(DecodeError::MalformedHeaderName { name, .. }))) => {
                assert_eq!(name, "I am a bad header");
            }
            val => panic!("Expecting Malformed Header Error, Instead got:{:?}", val),
        }

        assert!(read.next().await.is_none());
    }

    #[tokio::test]
    async fn enforces_body_limit() {
        let options = DecodeOptions::new().with_max_body_size(16);

        let mut read = BufferedMultipart::with_options(split_input(INPUT, 10), options);

        assert!(matches!(
            read.next().await,
            Some(Err(MultipartError::BodyTooLarge { limit: 16 }))
        ));
        assert!(read.next().await.is_none());
    }

    #[tokio::test]
    async fn passes_stream_errors() {
        let chunks: Vec<Result<Bytes, io::Error>> = vec![
            Ok(Bytes::from_static(b"--B\r\n")),
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset")),
        ];

        let err = collect_parts(futures_util::stream::iter(chunks), DecodeOptions::new())
            .await
            .unwrap_err();

        assert!(matches!(err, MultipartError::Stream(_)));
        assert_eq!(err.to_string(), "reset");
    }

    #[tokio::test]
    async fn empty_stream_is_unexpected_end() {
        let err = collect_parts(SplitStream::new(), DecodeOptions::new())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            MultipartError::Decode(DecodeError::UnexpectedEndOfInput { .. })
        ));
    }
}
