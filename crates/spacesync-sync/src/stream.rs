//! Object sync stream abstraction.
//!
//! A stream is a bidirectional sequence of [`ObjectSyncMessage`] frames.
//! Transports (QUIC, WebSocket, ...) implement [`ObjectStream`]; the
//! in-memory duplex here is used by tests and in-process embedding.

use async_trait::async_trait;

use spacesync_core::PeerId;

use crate::error::Result;
use crate::messages::ObjectSyncMessage;

/// What the transport knows about the remote end of a stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamContext {
    /// The authenticated peer, if the transport established one.
    pub peer: Option<PeerId>,
}

impl StreamContext {
    pub fn authenticated(peer: PeerId) -> Self {
        Self { peer: Some(peer) }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }
}

/// A bidirectional object sync stream.
///
/// The stream is owned by exactly one worker; methods take `&mut self`.
#[async_trait]
pub trait ObjectStream: Send + 'static {
    /// Wait for the next frame.
    ///
    /// Returns `None` once the remote end has closed the stream.
    async fn recv(&mut self) -> Result<Option<ObjectSyncMessage>>;

    /// Send a frame to the remote end.
    async fn send(&mut self, message: ObjectSyncMessage) -> Result<()>;

    /// Context established by the transport for this stream.
    fn context(&self) -> &StreamContext;
}

/// In-memory duplex streams over bounded channels.
pub mod memory {
    use super::*;
    use tokio::sync::mpsc;

    use crate::error::SyncError;

    /// One end of an in-memory duplex stream.
    pub struct MemoryObjectStream {
        tx: Option<mpsc::Sender<ObjectSyncMessage>>,
        rx: mpsc::Receiver<ObjectSyncMessage>,
        context: StreamContext,
    }

    /// Create a connected pair of streams.
    ///
    /// `server_context` is what the server end reports as its remote peer.
    /// Returns `(client, server)`.
    pub fn duplex(
        capacity: usize,
        server_context: StreamContext,
    ) -> (MemoryObjectStream, MemoryObjectStream) {
        let (client_tx, server_rx) = mpsc::channel(capacity);
        let (server_tx, client_rx) = mpsc::channel(capacity);

        let client = MemoryObjectStream {
            tx: Some(client_tx),
            rx: client_rx,
            context: StreamContext::anonymous(),
        };
        let server = MemoryObjectStream {
            tx: Some(server_tx),
            rx: server_rx,
            context: server_context,
        };
        (client, server)
    }

    impl MemoryObjectStream {
        /// Close the sending half. The remote end sees end-of-stream once it
        /// drains buffered frames.
        pub fn close(&mut self) {
            self.tx = None;
        }
    }

    #[async_trait]
    impl ObjectStream for MemoryObjectStream {
        async fn recv(&mut self) -> Result<Option<ObjectSyncMessage>> {
            Ok(self.rx.recv().await)
        }

        async fn send(&mut self, message: ObjectSyncMessage) -> Result<()> {
            let tx = self
                .tx
                .as_ref()
                .ok_or_else(|| SyncError::TransportError("stream closed".into()))?;
            tx.send(message)
                .await
                .map_err(|_| SyncError::TransportError("peer disconnected".into()))
        }

        fn context(&self) -> &StreamContext {
            &self.context
        }
    }
}
