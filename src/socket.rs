//! Client socket handles held in the shared registry.
//!
//! The wire transport is out of scope; the core only needs a handle it can
//! push outbound activity messages through, and a way to notice the
//! connection behind a handle is gone.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;

use crate::types::{ActivityMessage, SocketId};

/// Delivery failures for a socket handle.
#[derive(Debug, Error)]
pub enum SocketError {
    /// The connection behind this handle no longer exists.
    #[error("socket {0} is closed")]
    Closed(SocketId),
}

/// Handle to one live client connection.
///
/// Delivery is synchronous hand-off to the transport layer; a `Closed`
/// error is how the fan-out path discovers dead handles.
pub trait ClientSocket: Send + Sync {
    /// This connection's identifier.
    fn id(&self) -> &str;

    /// Push one outbound message to the client.
    ///
    /// # Errors
    ///
    /// Returns [`SocketError::Closed`] when the connection is gone.
    fn deliver(&self, message: ActivityMessage) -> Result<(), SocketError>;
}

/// Channel-backed [`ClientSocket`].
///
/// The transport layer (or a test) holds the receiving end; dropping the
/// receiver makes `deliver` fail, marking the handle dead.
pub struct ChannelSocket {
    id: SocketId,
    tx: mpsc::UnboundedSender<ActivityMessage>,
}

impl ChannelSocket {
    /// Create a socket handle and the receiver the transport drains.
    pub fn new(id: impl Into<SocketId>) -> (Arc<Self>, mpsc::UnboundedReceiver<ActivityMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { id: id.into(), tx }), rx)
    }
}

impl ClientSocket for ChannelSocket {
    fn id(&self) -> &str {
        &self.id
    }

    fn deliver(&self, message: ActivityMessage) -> Result<(), SocketError> {
        self.tx
            .send(message)
            .map_err(|_| SocketError::Closed(self.id.clone()))
    }
}
