// src/network_adapter/trait.rs
use crate::error::Result;
use async_trait::async_trait;

/// A message-based transport carrying one connection's frames.
#[async_trait]
pub trait NetworkAdapter: Send {
    /// Sends one complete frame.
    async fn send(&mut self, msg: &str) -> Result<()>;

    /// Receives one complete frame; `Ok(None)` means the peer went away.
    ///
    /// The session polls this inside `tokio::select!`, so implementations
    /// must be cancel-safe: a cancelled call may not lose buffered input.
    async fn recv(&mut self) -> Result<Option<String>>;

    /// Releases the underlying connection.
    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}
