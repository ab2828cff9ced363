//! Temporary exclusive access to the connection's writer.

use tokio::sync::oneshot;
use wirecall_protocol::{Request, encode};
use wirecall_transport::MessageWriter;

use crate::ClientError;

/// The live connection's writer, lent out by [`Client::codec`].
///
/// While a guard is held the client keeps reading and routing responses,
/// but queued calls wait until the guard is released. Release with
/// [`release`](Self::release) or by dropping the guard; releasing twice
/// is harmless.
///
/// [`Client::codec`]: crate::Client::codec
pub struct CodecGuard<W> {
    writer: Option<W>,
    home: Option<oneshot::Sender<W>>,
}

impl<W: MessageWriter> CodecGuard<W> {
    pub(crate) fn new(writer: W, home: oneshot::Sender<W>) -> Self {
        Self {
            writer: Some(writer),
            home: Some(home),
        }
    }

    /// Writes one raw message, bypassing request bookkeeping.
    pub async fn write_message(&mut self, message: &[u8]) -> Result<(), ClientError> {
        let writer = self.writer.as_mut().ok_or(ClientError::Closed)?;
        writer.write_message(message).await?;
        Ok(())
    }

    /// Encodes and writes a notification, for example a
    /// `$/cancelRequest` for an earlier call.
    pub async fn notify(&mut self, request: &Request) -> Result<(), ClientError> {
        if !request.notification {
            return Err(ClientError::InvalidRequest(
                "only notifications can be sent through a codec guard".into(),
            ));
        }
        let bytes = encode(request)?;
        self.write_message(&bytes).await
    }
}

impl<W> CodecGuard<W> {
    /// Returns `true` once the guard has been released.
    pub fn is_released(&self) -> bool {
        self.writer.is_none()
    }

    /// Hands the writer back to the client. Only the first call has any
    /// effect.
    pub fn release(&mut self) {
        if let (Some(writer), Some(home)) = (self.writer.take(), self.home.take()) {
            // The owner is gone if this fails; the writer is dropped.
            let _ = home.send(writer);
        }
    }
}

impl<W> Drop for CodecGuard<W> {
    fn drop(&mut self) {
        self.release();
    }
}
