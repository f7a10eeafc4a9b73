//! Listening endpoints for multi-session servers.

use super::ndjson::TcpAdapter;
use super::r#trait::NetworkAdapter;
use crate::error::Result;
use async_trait::async_trait;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::info;

/// Accepts connections and hands each one over as a transport.
#[async_trait]
pub trait Listener: Send + 'static {
    type Adapter: NetworkAdapter + 'static;

    /// Waits for the next connection. `Ok(None)` means no more will arrive.
    async fn accept(&mut self) -> Result<Option<Self::Adapter>>;
}

/// A TCP listening socket whose connections speak NDJSON.
pub struct TcpEndpoint {
    listener: TcpListener,
}

impl TcpEndpoint {
    pub async fn bind(addr: &str) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!(addr = %addr, "Listening for MCP connections");
        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }
}

#[async_trait]
impl Listener for TcpEndpoint {
    type Adapter = TcpAdapter;

    async fn accept(&mut self) -> Result<Option<Self::Adapter>> {
        let (stream, peer) = self.listener.accept().await?;
        info!(peer = %peer, "Accepted connection");
        Ok(Some(TcpAdapter::from(stream)))
    }
}
