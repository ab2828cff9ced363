//! Header-framed messages over a byte stream.
//!
//! Each frame is a MIME-style header block followed by a body whose length
//! is declared by `Content-Length` (the framing used by LSP):
//!
//! ```text
//! Content-Length: 47\r\n
//! \r\n
//! {"jsonrpc":"2.0","method":"system.ping","id":1}
//! ```
//!
//! [`FrameReader`] and [`FrameWriter`] know nothing about JSON-RPC. They
//! only turn a stream into frames and back.

use std::collections::BTreeMap;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite,
    AsyncWriteExt, ReadBuf,
};

use crate::TransportError;

/// Canonical name of the length header.
pub const CONTENT_LENGTH: &str = "Content-Length";

/// Default cap on a declared body length (100 MiB).
pub const DEFAULT_MAX_MESSAGE_SIZE: u64 = 100 * 1024 * 1024;

/// Most memory reserved for a body before any of it has arrived.
const INITIAL_BODY_CAPACITY: u64 = 64 * 1024;

// ---------------------------------------------------------------------------
// Headers
// ---------------------------------------------------------------------------

/// A header block.
///
/// Keys are stored in canonical MIME form (`content-length` becomes
/// `Content-Length`), so lookups are case-insensitive and iteration is
/// sorted by key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers(BTreeMap<String, String>);

impl Headers {
    /// Creates an empty header block.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a header, replacing any previous value for the same key.
    pub fn insert(
        &mut self,
        key: impl AsRef<str>,
        value: impl Into<String>,
    ) -> Option<String> {
        self.0.insert(canonical_key(key.as_ref()), value.into())
    }

    /// Looks up a header by key, ignoring case.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(&canonical_key(key)).map(String::as_str)
    }

    /// Removes a header by key, ignoring case.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.0.remove(&canonical_key(key))
    }

    /// Number of headers.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if there are no headers.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates headers in sorted key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// The declared body length, or `None` if the header is absent or is
    /// not a non-negative decimal integer.
    pub fn content_length(&self) -> Option<u64> {
        self.get(CONTENT_LENGTH)?.trim().parse().ok()
    }

    /// Sets `Content-Length`.
    pub fn set_content_length(&mut self, len: u64) {
        self.insert(CONTENT_LENGTH, len.to_string());
    }
}

/// Canonicalizes a header key: first letter and every letter following a
/// hyphen upper-cased, the rest lower-cased.
pub fn canonical_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut upper = true;
    for c in key.chars() {
        if upper {
            out.push(c.to_ascii_uppercase());
        } else {
            out.push(c.to_ascii_lowercase());
        }
        upper = c == '-';
    }
    out
}

/// The parsed head of one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameHeader {
    /// All headers of the frame.
    pub headers: Headers,
    /// Declared body length. `None` means unknown: the header was absent
    /// or malformed and the caller is responsible for framing the body.
    pub content_length: Option<u64>,
}

// ---------------------------------------------------------------------------
// FrameReader
// ---------------------------------------------------------------------------

/// Reads frames from a buffered byte stream.
///
/// After [`next_message`](Self::next_message), the reader itself is an
/// [`AsyncRead`] over the frame body: reads return EOF once the declared
/// length has been consumed, even if the stream already holds bytes of
/// the next frame.
pub struct FrameReader<R> {
    inner: R,
    max_message_size: u64,
    /// Body bytes left in the current frame. `None` while the current
    /// frame has an unknown length.
    remaining: Option<u64>,
    pushback: Option<u8>,
    /// Last byte handed out by a body read, for `unread_byte`.
    last_read: Option<u8>,
}

impl<R: AsyncBufRead + Unpin> FrameReader<R> {
    /// Wraps a buffered stream.
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            remaining: Some(0),
            pushback: None,
            last_read: None,
        }
    }

    /// Sets the largest `Content-Length` this reader accepts.
    pub fn with_max_message_size(mut self, max: u64) -> Self {
        self.max_message_size = max;
        self
    }

    /// Returns a reference to the underlying stream.
    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    /// Consumes the reader, returning the underlying stream.
    pub fn into_inner(self) -> R {
        self.inner
    }

    /// Advances to the next frame and returns its header block.
    ///
    /// Any unread remainder of the previous body is discarded first. A
    /// body of unknown length is never discarded; the caller framed it.
    ///
    /// # Errors
    /// - `ConnectionClosed` if the stream ends cleanly before a new frame
    /// - `UnexpectedEof` if it ends inside a body or header block
    /// - `MalformedHeader` for a header line without a colon
    /// - `MessageTooLarge` if the declared length exceeds the maximum
    pub async fn next_message(
        &mut self,
    ) -> Result<FrameHeader, TransportError> {
        self.discard_body().await?;
        self.pushback = None;
        self.last_read = None;

        let headers = self.read_headers().await?;
        let content_length = headers.content_length();
        if let Some(size) = content_length {
            if size > self.max_message_size {
                self.remaining = Some(0);
                return Err(TransportError::MessageTooLarge {
                    size,
                    max: self.max_message_size,
                });
            }
        }
        self.remaining = content_length;

        tracing::trace!(?content_length, headers = headers.len(), "frame header read");
        Ok(FrameHeader {
            headers,
            content_length,
        })
    }

    /// Reads the rest of the current body into memory.
    ///
    /// # Errors
    /// `MissingContentLength` if the frame has no declared length,
    /// `UnexpectedEof` if the stream ends early.
    pub async fn read_body(&mut self) -> Result<Vec<u8>, TransportError> {
        let Some(len) = self.remaining else {
            return Err(TransportError::MissingContentLength);
        };
        let mut body = Vec::with_capacity(len.min(INITIAL_BODY_CAPACITY) as usize);
        self.read_to_end(&mut body).await.map_err(|e| {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                TransportError::UnexpectedEof(e.to_string())
            } else {
                TransportError::ReceiveFailed(e)
            }
        })?;
        Ok(body)
    }

    /// Pushes back the last byte returned by a body read, so the next read
    /// returns it again.
    ///
    /// # Errors
    /// `InvalidUnread` unless the previous operation was a successful
    /// body read. In particular a freshly read header block cannot be
    /// unread into.
    pub fn unread_byte(&mut self) -> Result<(), TransportError> {
        match self.last_read.take() {
            Some(byte) => {
                self.pushback = Some(byte);
                Ok(())
            }
            None => Err(TransportError::InvalidUnread),
        }
    }

    async fn discard_body(&mut self) -> Result<(), TransportError> {
        let Some(mut left) = self.remaining else {
            return Ok(());
        };
        while left > 0 {
            let buf = self
                .inner
                .fill_buf()
                .await
                .map_err(TransportError::ReceiveFailed)?;
            if buf.is_empty() {
                self.remaining = Some(left);
                return Err(TransportError::UnexpectedEof(format!(
                    "{left} body bytes missing"
                )));
            }
            let n = (buf.len() as u64).min(left) as usize;
            self.inner.consume(n);
            left -= n as u64;
        }
        self.remaining = Some(0);
        Ok(())
    }

    async fn read_headers(&mut self) -> Result<Headers, TransportError> {
        let mut headers = Headers::new();
        let mut line = Vec::new();
        let mut first = true;

        loop {
            line.clear();
            let n = self
                .inner
                .read_until(b'\n', &mut line)
                .await
                .map_err(TransportError::ReceiveFailed)?;
            if n == 0 {
                return Err(if first {
                    TransportError::ConnectionClosed("end of stream".into())
                } else {
                    TransportError::UnexpectedEof(
                        "stream ended inside a header block".into(),
                    )
                });
            }
            first = false;
            if !line.ends_with(b"\n") {
                return Err(TransportError::UnexpectedEof(
                    "stream ended inside a header line".into(),
                ));
            }

            let text = std::str::from_utf8(&line).map_err(|_| {
                TransportError::MalformedHeader(
                    String::from_utf8_lossy(&line).into_owned(),
                )
            })?;
            let text = text.trim_end_matches(['\r', '\n']);
            if text.is_empty() {
                return Ok(headers);
            }

            let (key, value) = text
                .split_once(':')
                .ok_or_else(|| TransportError::MalformedHeader(text.to_string()))?;
            let key = key.trim();
            if key.is_empty() {
                return Err(TransportError::MalformedHeader(text.to_string()));
            }
            headers.insert(key, value.trim());
        }
    }
}

impl<R: AsyncBufRead + Unpin> AsyncRead for FrameReader<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if buf.remaining() == 0 {
            return Poll::Ready(Ok(()));
        }

        if let Some(byte) = this.pushback.take() {
            buf.put_slice(&[byte]);
            this.last_read = Some(byte);
            return Poll::Ready(Ok(()));
        }

        let limit = match this.remaining {
            Some(0) => {
                this.last_read = None;
                return Poll::Ready(Ok(()));
            }
            Some(left) => left.min(buf.remaining() as u64) as usize,
            None => buf.remaining(),
        };

        let available = ready!(Pin::new(&mut this.inner).poll_fill_buf(cx))?;
        if available.is_empty() {
            this.last_read = None;
            if this.remaining.is_some() {
                return Poll::Ready(Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "stream ended before the declared body length",
                )));
            }
            return Poll::Ready(Ok(()));
        }

        let n = limit.min(available.len());
        buf.put_slice(&available[..n]);
        this.last_read = Some(available[n - 1]);
        Pin::new(&mut this.inner).consume(n);
        if let Some(left) = this.remaining.as_mut() {
            *left -= n as u64;
        }
        Poll::Ready(Ok(()))
    }
}

// ---------------------------------------------------------------------------
// FrameWriter
// ---------------------------------------------------------------------------

/// Writes frames to a byte stream.
///
/// Once a write fails the writer is poisoned, so a later message can never
/// land in the middle of a partially written one.
pub struct FrameWriter<W> {
    inner: W,
    poisoned: bool,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    /// Wraps a stream.
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            poisoned: false,
        }
    }

    /// Returns `true` after a failed write.
    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Returns a reference to the underlying stream.
    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    /// Consumes the writer, returning the underlying stream.
    pub fn into_inner(self) -> W {
        self.inner
    }

    /// Writes one frame.
    ///
    /// Headers go out sorted by key. With a valid `Content-Length`, exactly
    /// that many bytes are copied from `body`; otherwise all of `body` is.
    ///
    /// # Errors
    /// - `InvalidHeader` if a key or value contains a line break (nothing
    ///   is written and the writer stays usable)
    /// - `ShortWrite` if `body` ends before `Content-Length` bytes
    /// - `SendFailed` on I/O failure
    /// - `WriterPoisoned` if an earlier write failed
    pub async fn write_message<B>(
        &mut self,
        headers: &Headers,
        mut body: B,
    ) -> Result<(), TransportError>
    where
        B: AsyncRead + Unpin,
    {
        if self.poisoned {
            return Err(TransportError::WriterPoisoned);
        }
        validate_headers(headers)?;

        let result = self.write_frame(headers, &mut body).await;
        if result.is_err() {
            self.poisoned = true;
        }
        result
    }

    /// Writes `body` as one frame with `Content-Length` set.
    pub async fn send(&mut self, body: &[u8]) -> Result<(), TransportError> {
        let mut headers = Headers::new();
        headers.set_content_length(body.len() as u64);
        self.write_message(&headers, body).await
    }

    /// Shuts down the underlying stream.
    pub async fn shutdown(&mut self) -> Result<(), TransportError> {
        self.inner
            .shutdown()
            .await
            .map_err(TransportError::SendFailed)
    }

    async fn write_frame<B>(
        &mut self,
        headers: &Headers,
        body: &mut B,
    ) -> Result<(), TransportError>
    where
        B: AsyncRead + Unpin,
    {
        let mut head = String::new();
        for (key, value) in headers.iter() {
            head.push_str(key);
            head.push_str(": ");
            head.push_str(value);
            head.push_str("\r\n");
        }
        head.push_str("\r\n");
        self.inner
            .write_all(head.as_bytes())
            .await
            .map_err(TransportError::SendFailed)?;

        match headers.content_length() {
            Some(expected) => {
                let mut limited = body.take(expected);
                let written = tokio::io::copy(&mut limited, &mut self.inner)
                    .await
                    .map_err(TransportError::SendFailed)?;
                if written < expected {
                    return Err(TransportError::ShortWrite { expected, written });
                }
            }
            None => {
                tokio::io::copy(body, &mut self.inner)
                    .await
                    .map_err(TransportError::SendFailed)?;
            }
        }

        self.inner
            .flush()
            .await
            .map_err(TransportError::SendFailed)
    }
}

fn validate_headers(headers: &Headers) -> Result<(), TransportError> {
    for (key, value) in headers.iter() {
        if key.is_empty()
            || key.contains([':', '\r', '\n'])
            || value.contains(['\r', '\n'])
        {
            return Err(TransportError::InvalidHeader(key.to_string()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reader(input: &[u8]) -> FrameReader<&[u8]> {
        FrameReader::new(input)
    }

    #[test]
    fn test_canonical_key() {
        assert_eq!(canonical_key("content-length"), "Content-Length");
        assert_eq!(canonical_key("CONTENT-TYPE"), "Content-Type");
        assert_eq!(canonical_key("x"), "X");
    }

    #[test]
    fn test_headers_lookup_ignores_case() {
        let mut headers = Headers::new();
        headers.insert("content-length", "12");
        assert_eq!(headers.get("CONTENT-LENGTH"), Some("12"));
        assert_eq!(headers.content_length(), Some(12));
    }

    #[test]
    fn test_malformed_content_length_is_unknown() {
        let mut headers = Headers::new();
        headers.insert(CONTENT_LENGTH, "-4");
        assert_eq!(headers.content_length(), None);
        headers.insert(CONTENT_LENGTH, "abc");
        assert_eq!(headers.content_length(), None);
    }

    #[tokio::test]
    async fn test_round_trip_two_frames() {
        let mut writer = FrameWriter::new(Vec::new());
        let mut headers = Headers::new();
        headers.insert("X-Trace", "abc");
        headers.set_content_length(5);
        writer.write_message(&headers, &b"hello"[..]).await.unwrap();
        writer.send(b"{}").await.unwrap();

        let bytes = writer.into_inner();
        let mut reader = reader(&bytes);

        let first = reader.next_message().await.unwrap();
        assert_eq!(first.headers, headers);
        assert_eq!(first.content_length, Some(5));
        assert_eq!(reader.read_body().await.unwrap(), b"hello");

        let second = reader.next_message().await.unwrap();
        assert_eq!(second.content_length, Some(2));
        assert_eq!(reader.read_body().await.unwrap(), b"{}");
    }

    #[tokio::test]
    async fn test_large_declared_length_is_not_preallocated() {
        let mut input = b"Content-Length: 1048576\r\n\r\n".to_vec();
        input.extend_from_slice(b"short");
        let mut reader = reader(&input);
        reader.next_message().await.unwrap();

        let err = reader.read_body().await.unwrap_err();
        assert!(matches!(err, TransportError::UnexpectedEof(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn test_body_larger_than_initial_capacity() {
        let body = vec![b'x'; 3 * INITIAL_BODY_CAPACITY as usize];
        let mut writer = FrameWriter::new(Vec::new());
        writer.send(&body).await.unwrap();
        let bytes = writer.into_inner();

        let mut reader = reader(&bytes);
        reader.next_message().await.unwrap();
        assert_eq!(reader.read_body().await.unwrap(), body);
    }

    #[tokio::test]
    async fn test_body_read_stops_at_declared_length() {
        let input = b"Content-Length: 3\r\n\r\nabcContent-Length: 2\r\n\r\nde";
        let mut reader = reader(input);
        reader.next_message().await.unwrap();

        let mut body = Vec::new();
        reader.read_to_end(&mut body).await.unwrap();
        assert_eq!(body, b"abc");
    }

    #[tokio::test]
    async fn test_next_message_discards_unread_body() {
        let input = b"Content-Length: 3\r\n\r\nabcContent-Length: 2\r\n\r\nde";
        let mut reader = reader(input);
        reader.next_message().await.unwrap();

        let mut one = [0u8; 1];
        reader.read_exact(&mut one).await.unwrap();
        assert_eq!(&one, b"a");

        let header = reader.next_message().await.unwrap();
        assert_eq!(header.content_length, Some(2));
        assert_eq!(reader.read_body().await.unwrap(), b"de");
    }

    #[tokio::test]
    async fn test_lf_only_header_lines() {
        let mut reader = reader(b"content-length: 2\n\nok");
        let header = reader.next_message().await.unwrap();
        assert_eq!(header.content_length, Some(2));
        assert_eq!(reader.read_body().await.unwrap(), b"ok");
    }

    #[tokio::test]
    async fn test_short_body_is_unexpected_eof() {
        let mut reader = reader(b"Content-Length: 10\r\n\r\nabc");
        reader.next_message().await.unwrap();
        let result = reader.read_body().await;
        assert!(matches!(result, Err(TransportError::UnexpectedEof(_))));
    }

    #[tokio::test]
    async fn test_short_body_fails_discard() {
        let mut reader = reader(b"Content-Length: 10\r\n\r\nabc");
        reader.next_message().await.unwrap();
        let result = reader.next_message().await;
        assert!(matches!(result, Err(TransportError::UnexpectedEof(_))));
    }

    #[tokio::test]
    async fn test_clean_eof_is_connection_closed() {
        let mut reader = reader(b"");
        let err = reader.next_message().await.unwrap_err();
        assert!(err.is_closed());
    }

    #[tokio::test]
    async fn test_eof_inside_headers() {
        let mut reader = reader(b"Content-Length: 10\r\n");
        let result = reader.next_message().await;
        assert!(matches!(result, Err(TransportError::UnexpectedEof(_))));
    }

    #[tokio::test]
    async fn test_header_without_colon_is_malformed() {
        let mut reader = reader(b"Content-Length 10\r\n\r\n");
        let result = reader.next_message().await;
        assert!(matches!(result, Err(TransportError::MalformedHeader(_))));
    }

    #[tokio::test]
    async fn test_missing_length_passes_body_through() {
        let mut reader = reader(b"Content-Type: text/plain\r\n\r\nfree form");
        let header = reader.next_message().await.unwrap();
        assert_eq!(header.content_length, None);
        assert_eq!(header.headers.get("content-type"), Some("text/plain"));

        let mut body = String::new();
        reader.read_to_string(&mut body).await.unwrap();
        assert_eq!(body, "free form");
    }

    #[tokio::test]
    async fn test_read_body_requires_length() {
        let mut reader = reader(b"X-A: 1\r\n\r\n");
        reader.next_message().await.unwrap();
        let result = reader.read_body().await;
        assert!(matches!(result, Err(TransportError::MissingContentLength)));
    }

    #[tokio::test]
    async fn test_rejects_oversized_message() {
        let mut reader =
            reader(b"Content-Length: 11\r\n\r\n").with_max_message_size(10);
        let result = reader.next_message().await;
        assert!(matches!(
            result,
            Err(TransportError::MessageTooLarge { size: 11, max: 10 })
        ));
    }

    #[tokio::test]
    async fn test_unread_byte_after_body_read() {
        let mut reader = reader(b"Content-Length: 3\r\n\r\nxyz");
        reader.next_message().await.unwrap();

        let mut one = [0u8; 1];
        reader.read_exact(&mut one).await.unwrap();
        reader.unread_byte().unwrap();

        assert_eq!(reader.read_body().await.unwrap(), b"xyz");
    }

    #[tokio::test]
    async fn test_unread_byte_not_across_header_boundary() {
        let mut reader = reader(b"Content-Length: 1\r\n\r\nx");
        reader.next_message().await.unwrap();
        assert!(matches!(
            reader.unread_byte(),
            Err(TransportError::InvalidUnread)
        ));
    }

    #[tokio::test]
    async fn test_writer_sorts_headers() {
        let mut writer = FrameWriter::new(Vec::new());
        let mut headers = Headers::new();
        headers.insert("zeta", "1");
        headers.insert("alpha", "2");
        headers.set_content_length(2);
        writer.write_message(&headers, &b"hi"[..]).await.unwrap();

        assert_eq!(
            writer.get_ref().as_slice(),
            b"Alpha: 2\r\nContent-Length: 2\r\nZeta: 1\r\n\r\nhi"
        );
    }

    #[tokio::test]
    async fn test_writer_rejects_line_break_in_value() {
        let mut writer = FrameWriter::new(Vec::new());
        let mut headers = Headers::new();
        headers.insert("X-Evil", "a\r\nContent-Length: 0");
        let result = writer.write_message(&headers, &b""[..]).await;

        assert!(matches!(result, Err(TransportError::InvalidHeader(_))));
        assert!(writer.get_ref().is_empty());
        assert!(!writer.is_poisoned());
    }

    #[tokio::test]
    async fn test_short_write_poisons_writer() {
        let mut writer = FrameWriter::new(Vec::new());
        let mut headers = Headers::new();
        headers.set_content_length(10);

        let result = writer.write_message(&headers, &b"abc"[..]).await;
        assert!(matches!(
            result,
            Err(TransportError::ShortWrite { expected: 10, written: 3 })
        ));
        assert!(writer.is_poisoned());

        let written_before = writer.get_ref().len();
        let result = writer.send(b"next").await;
        assert!(matches!(result, Err(TransportError::WriterPoisoned)));
        assert_eq!(writer.get_ref().len(), written_before);
    }

    #[tokio::test]
    async fn test_writer_copies_whole_body_without_length() {
        let mut writer = FrameWriter::new(Vec::new());
        let mut headers = Headers::new();
        headers.insert("X-Mode", "raw");
        writer
            .write_message(&headers, &b"everything"[..])
            .await
            .unwrap();
        assert_eq!(
            writer.get_ref().as_slice(),
            b"X-Mode: raw\r\n\r\neverything"
        );
    }

    #[tokio::test]
    async fn test_writer_copies_only_declared_bytes() {
        let mut writer = FrameWriter::new(Vec::new());
        let mut headers = Headers::new();
        headers.set_content_length(3);
        writer.write_message(&headers, &b"abcdef"[..]).await.unwrap();
        assert!(writer.get_ref().ends_with(b"\r\n\r\nabc"));
    }
}
