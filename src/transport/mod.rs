//! Message transport contract.
//!
//! The connection core only needs an ordered, reliable channel of discrete
//! text frames. The write half implements [`FrameSink`], the read half
//! implements [`FrameSource`]; the dispatch loop is the only reader.
//!
//! # Implementations
//!
//! - [`crate::ws`] - WebSocket halves over `tokio-tungstenite`
//! - [`memory`] - in-process channel pair, used by tests and embedders

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

/// Write half of a frame transport.
#[async_trait]
pub trait FrameSink: Send + 'static {
    /// Send one text frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying connection can no longer accept
    /// frames.
    async fn send(&mut self, frame: String) -> Result<()>;

    /// Flush and close the write half. Further sends fail.
    ///
    /// # Errors
    ///
    /// Returns an error if closing the underlying connection fails.
    async fn close(&mut self) -> Result<()>;
}

/// Read half of a frame transport.
#[async_trait]
pub trait FrameSource: Send + 'static {
    /// Receive the next text frame.
    ///
    /// Returns `None` once the connection has ended; a read failure is
    /// terminal as well.
    async fn recv(&mut self) -> Option<Result<String>>;
}
