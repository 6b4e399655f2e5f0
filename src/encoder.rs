use bytes::{Bytes, BytesMut};
use log::debug;
use rand::{distributions::Alphanumeric, thread_rng, Rng};

use crate::part::{Header, Part};

/// Line ending used between the lines a [`MultipartWriter`](struct.MultipartWriter.html) emits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineEnding {
    /// `\r\n`, as browsers send it
    #[default]
    Crlf,
    /// A bare `\n`
    Lf,
}

impl LineEnding {
    fn as_bytes(self) -> &'static [u8] {
        match self {
            LineEnding::Crlf => b"\r\n",
            LineEnding::Lf => b"\n",
        }
    }
}

/// Writes a multipart body that [`Decoder`](../decoder/struct.Decoder.html) can read back.
///
/// Every part is written as a delimiter line, the header lines, an empty line and then the content
/// followed by a line ending. `finish` closes the body with the final delimiter.
pub struct MultipartWriter {
    delimiter: Vec<u8>,
    line_ending: LineEnding,
    buf: BytesMut,
    parts: usize,
}

impl MultipartWriter {
    /// Construct a new MultipartWriter with a given boundary
    ///
    /// Delimiter lines are `--` followed by the boundary. If you want a boundary generated
    /// automatically, then you can use `MultipartWriter::default()`
    pub fn new<I: Into<String>>(boundary: I) -> Self {
        let mut delimiter = b"--".to_vec();
        delimiter.extend_from_slice(boundary.into().as_bytes());

        Self::from_delimiter(delimiter)
    }

    /// Construct a MultipartWriter that uses `line` verbatim as the delimiter line
    ///
    /// This is what [`Decoder::boundary`](../decoder/struct.Decoder.html#method.boundary) returns,
    /// so decoded parts can be written back with the same framing.
    pub fn from_delimiter<I: Into<Vec<u8>>>(line: I) -> Self {
        MultipartWriter {
            delimiter: line.into(),
            line_ending: LineEnding::default(),
            buf: BytesMut::new(),
            parts: 0,
        }
    }

    /// Use `line_ending` for every line written from now on
    pub fn line_ending(mut self, line_ending: LineEnding) -> Self {
        self.line_ending = line_ending;
        self
    }

    /// Gets the delimiter line, i.e `--` and the boundary
    pub fn get_delimiter(&self) -> &[u8] {
        &self.delimiter
    }

    /// Number of parts written so far
    pub fn len(&self) -> usize {
        self.parts
    }

    /// Whether no parts were written yet
    pub fn is_empty(&self) -> bool {
        self.parts == 0
    }

    /// Add a part with `headers` written in the order given
    pub fn add_part<'a, H>(&mut self, headers: H, content: &[u8])
    where
        H: IntoIterator<Item = &'a Header>,
    {
        let line_ending = self.line_ending.as_bytes();

        self.buf.extend_from_slice(&self.delimiter);
        self.buf.extend_from_slice(line_ending);

        for header in headers {
            self.buf.extend_from_slice(header.to_string().as_bytes());
            self.buf.extend_from_slice(line_ending);
        }

        self.buf.extend_from_slice(line_ending);
        self.buf.extend_from_slice(content);
        self.buf.extend_from_slice(line_ending);

        self.parts += 1;
    }

    /// Write back a part decoded from `source`
    ///
    /// Decoded parts keep their last declared header first, so headers are written in reverse to
    /// restore the declaration order. Returns `false` if `source` does not hold the part's content.
    pub fn add_decoded(&mut self, part: &Part, source: &[u8]) -> bool {
        match part.content(source) {
            Some(content) => {
                self.add_part(part.headers().iter().rev(), content);
                true
            }
            None => false,
        }
    }

    /// Add a text field
    pub fn add_field<I: Into<String>>(&mut self, name: I, value: &[u8]) {
        let disposition = Header::new(
            "Content-Disposition",
            vec!["form-data".into(), format!("name=\"{}\"", name.into())],
        );

        self.add_part([&disposition], value);
    }

    /// Add a file with its filename and content type
    pub fn add_file<N, F, C>(&mut self, name: N, filename: F, content_type: C, content: &[u8])
    where
        N: Into<String>,
        F: Into<String>,
        C: Into<String>,
    {
        let disposition = Header::new(
            "Content-Disposition",
            vec![
                "form-data".into(),
                format!("name=\"{}\"", name.into()),
                format!("filename=\"{}\"", filename.into()),
            ],
        );
        let content_type = Header::new("Content-Type", vec![content_type.into()]);

        self.add_part([&disposition, &content_type], content);
    }

    /// Write the final delimiter and return the body
    pub fn finish(mut self) -> Bytes {
        self.buf.extend_from_slice(&self.delimiter);
        self.buf.extend_from_slice(b"--");
        self.buf.extend_from_slice(self.line_ending.as_bytes());

        debug!(
            "Finished writing {} parts, total bytes:{}",
            self.parts,
            self.buf.len()
        );

        self.buf.freeze()
    }
}

impl Default for MultipartWriter {
    fn default() -> Self {
        let boundary: String = thread_rng()
            .sample_iter(&Alphanumeric)
            .take(60)
            .map(char::from)
            .collect();

        MultipartWriter::new(boundary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode;

    #[test]
    fn sets_boundary() {
        let writer = MultipartWriter::new("AaB03x");
        assert_eq!(writer.get_delimiter(), b"--AaB03x");
    }

    #[test]
    fn generates_boundary() {
        let writer = MultipartWriter::default();

        assert_eq!(writer.get_delimiter().len(), 62);
        assert!(writer.get_delimiter()[2..]
            .iter()
            .all(u8::is_ascii_alphanumeric));
    }

    #[test]
    fn writes_fields() {
        let mut writer = MultipartWriter::new("AaB03x");

        writer.add_field("name1", b"value1");
        writer.add_field("name2", b"value2");

        let input: &[u8] = b"--AaB03x\r\n\
                Content-Disposition: form-data; name=\"name1\"\r\n\
                \r\n\
                value1\r\n\
                --AaB03x\r\n\
                Content-Disposition: form-data; name=\"name2\"\r\n\
                \r\n\
                value2\r\n\
                --AaB03x--\r\n";

        assert_eq!(writer.len(), 2);
        assert_eq!(&writer.finish()[..], input);
    }

    #[test]
    fn writes_files_and_fields() {
        let mut writer = MultipartWriter::new("AaB03x");

        writer.add_file("file", "text.txt", "text/plain", b"Lorem Ipsum\n");
        writer.add_field("name1", b"value1");

        let input: &[u8] = b"--AaB03x\r\n\
                Content-Disposition: form-data; name=\"file\"; filename=\"text.txt\"\r\n\
                Content-Type: text/plain\r\n\
                \r\n\
                Lorem Ipsum\n\r\n\
                --AaB03x\r\n\
                Content-Disposition: form-data; name=\"name1\"\r\n\
                \r\n\
                value1\r\n\
                --AaB03x--\r\n";

        assert_eq!(&writer.finish()[..], input);
    }

    #[test]
    fn writes_file_with_mixed_argument_types() {
        let mut writer = MultipartWriter::new("B").line_ending(LineEnding::Lf);

        writer.add_file(String::from("upload"), "a.txt", String::from("text/plain"), b"x");

        assert_eq!(
            &writer.finish()[..],
            &b"--B\n\
                Content-Disposition: form-data; name=\"upload\"; filename=\"a.txt\"\n\
                Content-Type: text/plain\n\
                \n\
                x\n\
                --B--\n"[..]
        );
    }

    #[test]
    fn writes_lf_endings() {
        let mut writer = MultipartWriter::new("B").line_ending(LineEnding::Lf);

        writer.add_field("a", b"x");

        assert_eq!(
            &writer.finish()[..],
            b"--B\nContent-Disposition: form-data; name=\"a\"\n\nx\n--B--\n"
        );
    }

    #[test]
    fn writes_empty_body() {
        let writer = MultipartWriter::new("B");

        assert!(writer.is_empty());
        assert_eq!(&writer.finish()[..], b"--B--\r\n");
    }

    #[test]
    fn round_trips_decoded_parts() {
        let input: &[u8] = b"--AaB03x\r\n\
                Content-Disposition: form-data; name=\"file\"; filename=\"text.txt\"\r\n\
                Content-Type: text/plain\r\n\
                \r\n\
                Lorem Ipsum\n\r\n\
                --AaB03x\r\n\
                \r\n\
                \r\n\
                --AaB03x\r\n\
                X-One: 1\r\n\
                X-Two: 2; 3\r\n\
                \r\n\
                value2\r\n\
                --AaB03x--\r\n";

        let mut decoder = decode(input);
        let parts = decoder.by_ref().collect::<Result<Vec<_>, _>>().unwrap();

        let mut writer = MultipartWriter::from_delimiter(decoder.boundary().unwrap());

        for part in &parts {
            assert!(writer.add_decoded(part, input));
        }

        assert_eq!(&writer.finish()[..], input);
    }

    #[test]
    fn round_trips_random_content() {
        let mut rng = thread_rng();

        for _ in 0..50 {
            let mut writer = MultipartWriter::new("zzBoundaryzz");
            let mut expected = Vec::new();

            for idx in 0..rng.gen_range(1..5) {
                let len = rng.gen_range(0..200);
                let content: Vec<u8> = (0..len)
                    .map(|_| b"ab\r\n- "[rng.gen_range(0..6)])
                    .collect();

                writer.add_field(format!("field{}", idx), &content);
                expected.push(content);
            }

            let body = writer.finish();

            let first = decode(&body[..]).collect::<Result<Vec<_>, _>>().unwrap();
            let second = decode(&body[..]).collect::<Result<Vec<_>, _>>().unwrap();
            assert_eq!(first, second);

            let decoded: Vec<&[u8]> = first
                .iter()
                .map(|part| part.content(&body).unwrap())
                .collect();

            assert_eq!(decoded.len(), expected.len());

            for (decoded, expected) in decoded.iter().zip(&expected) {
                assert_eq!(decoded, &expected.as_slice());
            }
        }
    }

    #[test]
    fn rejects_foreign_source() {
        let input: &[u8] = b"--B\n\nsome content\n--B--\n";
        let part = decode(input).next().unwrap().unwrap();

        let mut writer = MultipartWriter::new("B");

        assert!(!writer.add_decoded(&part, b"--B"));
        assert!(writer.is_empty());
    }
}
