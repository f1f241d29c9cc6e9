use crate::error::AdapterError;

/// Incremental parser for `multipart/x-mixed-replace` chunk framing (§4.8).
/// Each chunk is `--boundary`, headers ending in `\r\n\r\n` (must include
/// `Content-Length`), then exactly that many payload bytes. Bytes arrive in
/// arbitrary-sized pushes from the HTTP stream; `next_payload` drains
/// complete chunks as they become available and leaves a partial tail in
/// the buffer for the next push.
pub struct MultipartReader {
    boundary: Vec<u8>,
    buf: Vec<u8>,
}

impl MultipartReader {
    pub fn new(boundary: impl Into<String>) -> Self {
        MultipartReader {
            boundary: format!("--{}", boundary.into()).into_bytes(),
            buf: Vec::new(),
        }
    }

    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Returns the next complete payload, or `None` if the buffer doesn't
    /// yet hold one. Consumes the boundary marker, headers, and payload
    /// bytes of whatever it returns.
    pub fn next_payload(&mut self) -> Result<Option<Vec<u8>>, AdapterError> {
        let boundary_pos = match find_subslice(&self.buf, &self.boundary) {
            Some(p) => p,
            None => return Ok(None),
        };
        let after_boundary = boundary_pos + self.boundary.len();

        let header_end = match find_subslice(&self.buf[after_boundary..], b"\r\n\r\n") {
            Some(p) => after_boundary + p + 4,
            None => return Ok(None),
        };

        let headers = String::from_utf8_lossy(&self.buf[after_boundary..header_end - 4]).into_owned();
        let content_length = headers
            .lines()
            .find_map(|line| {
                let mut parts = line.splitn(2, ':');
                let key = parts.next()?.trim();
                if key.eq_ignore_ascii_case("content-length") {
                    parts.next()
                } else {
                    None
                }
            })
            .and_then(|v| v.trim().parse::<usize>().ok())
            .ok_or_else(|| AdapterError::FramingFailed("chunk missing Content-Length".into()))?;

        if self.buf.len() < header_end + content_length {
            return Ok(None);
        }

        let payload = self.buf[header_end..header_end + content_length].to_vec();
        self.buf.drain(..header_end + content_length);
        Ok(Some(payload))
    }
}

/// Parses the `boundary=` parameter out of a `Content-Type` header value.
pub fn extract_boundary(content_type: &str) -> Option<String> {
    content_type
        .split(';')
        .map(str::trim)
        .find_map(|part| part.strip_prefix("boundary="))
        .map(|b| b.trim_matches('"').to_string())
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_boundary_from_content_type() {
        let ct = "multipart/x-mixed-replace; boundary=mtconnect-boundary";
        assert_eq!(extract_boundary(ct).as_deref(), Some("mtconnect-boundary"));
    }

    #[test]
    fn waits_for_full_payload_before_returning() {
        let mut reader = MultipartReader::new("B");
        reader.push(b"--B\r\nContent-Length: 5\r\n\r\nhel");
        assert!(reader.next_payload().unwrap().is_none());
        reader.push(b"lo");
        let payload = reader.next_payload().unwrap().unwrap();
        assert_eq!(payload, b"hello");
    }

    #[test]
    fn reads_consecutive_chunks_off_the_same_buffer() {
        let mut reader = MultipartReader::new("B");
        reader.push(b"--B\r\nContent-Length: 3\r\n\r\none--B\r\nContent-Length: 3\r\n\r\ntwo");
        assert_eq!(reader.next_payload().unwrap().unwrap(), b"one");
        assert_eq!(reader.next_payload().unwrap().unwrap(), b"two");
        assert!(reader.next_payload().unwrap().is_none());
    }

    #[test]
    fn missing_content_length_is_a_framing_error() {
        let mut reader = MultipartReader::new("B");
        reader.push(b"--B\r\nX-Other: 1\r\n\r\nbody");
        assert!(matches!(reader.next_payload(), Err(AdapterError::FramingFailed(_))));
    }
}
