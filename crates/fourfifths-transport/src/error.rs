/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The connection was closed.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// Sending data failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    /// Receiving data failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] std::io::Error),

    /// Binding or accepting connections failed.
    #[error("accept failed: {0}")]
    AcceptFailed(#[source] std::io::Error),

    /// The handshake carried an `Origin` that is not on the allow-list.
    #[error("origin not allowed: {0}")]
    OriginRejected(String),

    /// The client connected but did not finish the upgrade in time.
    #[error("handshake timed out: {0}")]
    HandshakeTimeout(std::net::SocketAddr),

    /// The transport was shut down.
    #[error("transport shut down")]
    Shutdown,
}
