//! [`Codec`] over any byte stream, framed with `Content-Length` headers.

use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};

use crate::framing::{DEFAULT_MAX_MESSAGE_SIZE, FrameReader, FrameWriter};
use crate::{Codec, MessageReader, MessageWriter, TransportError};

/// A header-framed codec over a pair of byte streams (TCP, pipes, stdio).
pub struct StreamCodec<R, W> {
    reader: R,
    writer: W,
    max_message_size: u64,
}

impl<R, W> StreamCodec<R, W>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    /// Creates a codec from a read half and a write half.
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader,
            writer,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }

    /// Sets the largest message body the reader accepts.
    pub fn with_max_message_size(mut self, max: u64) -> Self {
        self.max_message_size = max;
        self
    }
}

impl StreamCodec<OwnedReadHalf, OwnedWriteHalf> {
    /// Creates a codec over a TCP connection.
    pub fn from_tcp(stream: TcpStream) -> Self {
        let (reader, writer) = stream.into_split();
        Self::new(reader, writer)
    }

    /// Connects to `addr` and wraps the connection.
    pub async fn connect_tcp(addr: &str) -> Result<Self, TransportError> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(TransportError::ConnectFailed)?;
        tracing::debug!(addr, "tcp connection established");
        Ok(Self::from_tcp(stream))
    }
}

impl<R, W> Codec for StreamCodec<R, W>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    type Reader = StreamReader<R>;
    type Writer = StreamWriter<W>;

    fn split(self) -> (Self::Reader, Self::Writer) {
        let frames = FrameReader::new(BufReader::new(self.reader))
            .with_max_message_size(self.max_message_size);
        (
            StreamReader { frames },
            StreamWriter {
                frames: FrameWriter::new(self.writer),
            },
        )
    }
}

/// Receiving half of a [`StreamCodec`].
pub struct StreamReader<R> {
    frames: FrameReader<BufReader<R>>,
}

impl<R> MessageReader for StreamReader<R>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    async fn read_message(&mut self) -> Result<Vec<u8>, TransportError> {
        let header = self.frames.next_message().await?;
        if header.content_length.is_none() {
            return Err(TransportError::MissingContentLength);
        }
        self.frames.read_body().await
    }
}

/// Sending half of a [`StreamCodec`].
pub struct StreamWriter<W> {
    frames: FrameWriter<W>,
}

impl<W> MessageWriter for StreamWriter<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    async fn write_message(
        &mut self,
        message: &[u8],
    ) -> Result<(), TransportError> {
        self.frames.send(message).await
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.frames.shutdown().await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::io::{AsyncWriteExt, DuplexStream, ReadHalf, WriteHalf};
    use tokio::time::timeout;

    use super::*;

    const TEST_TIMEOUT: Duration = Duration::from_secs(5);

    type DuplexCodec = StreamCodec<ReadHalf<DuplexStream>, WriteHalf<DuplexStream>>;

    fn pair() -> (DuplexCodec, DuplexCodec) {
        let (a, b) = tokio::io::duplex(4096);
        let (a_read, a_write) = tokio::io::split(a);
        let (b_read, b_write) = tokio::io::split(b);
        (
            StreamCodec::new(a_read, a_write),
            StreamCodec::new(b_read, b_write),
        )
    }

    #[tokio::test]
    async fn test_write_read_roundtrip() {
        let (left, right) = pair();
        let (_left_reader, mut left_writer) = left.split();
        let (mut right_reader, _right_writer) = right.split();

        let message = br#"{"jsonrpc":"2.0","method":"test","id":1}"#;
        left_writer.write_message(message).await.unwrap();

        let received = timeout(TEST_TIMEOUT, right_reader.read_message())
            .await
            .expect("test timed out")
            .unwrap();
        assert_eq!(received, message);
    }

    #[tokio::test]
    async fn test_frame_without_length_is_rejected() {
        let (a, b) = tokio::io::duplex(4096);
        let (b_read, b_write) = tokio::io::split(b);
        let (mut reader, _writer) = StreamCodec::new(b_read, b_write).split();

        let (_a_read, mut a_write) = tokio::io::split(a);
        a_write.write_all(b"Content-Type: x\r\n\r\n{}").await.unwrap();

        let result = timeout(TEST_TIMEOUT, reader.read_message())
            .await
            .expect("test timed out");
        assert!(matches!(result, Err(TransportError::MissingContentLength)));
    }

    #[tokio::test]
    async fn test_close_ends_peer_stream() {
        let (left, right) = pair();
        let (_left_reader, mut left_writer) = left.split();
        let (mut right_reader, _right_writer) = right.split();

        left_writer.close().await.unwrap();

        let err = timeout(TEST_TIMEOUT, right_reader.read_message())
            .await
            .expect("test timed out")
            .unwrap_err();
        assert!(err.is_closed());
    }

    #[tokio::test]
    async fn test_oversized_message_rejected() {
        let (a, b) = tokio::io::duplex(4096);
        let (b_read, b_write) = tokio::io::split(b);
        let (mut reader, _writer) = StreamCodec::new(b_read, b_write)
            .with_max_message_size(4)
            .split();
        let (_a_read, a_write) = tokio::io::split(a);
        let (_, mut writer) = StreamCodec::new(tokio::io::empty(), a_write).split();

        writer.write_message(b"too long").await.unwrap();
        let result = timeout(TEST_TIMEOUT, reader.read_message())
            .await
            .expect("test timed out");
        assert!(matches!(
            result,
            Err(TransportError::MessageTooLarge { size: 8, max: 4 })
        ));
    }
}
