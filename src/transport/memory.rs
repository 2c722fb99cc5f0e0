//! In-process frame transport.
//!
//! [`pair`] returns the client's two halves plus a [`MemoryPeer`] playing the
//! device: everything the client sends shows up in [`MemoryPeer::recv`], and
//! every frame passed to [`MemoryPeer::send`] is read by the client's
//! dispatch loop. Dropping or [closing](MemoryPeer::close) the peer ends the
//! client's frame stream.
//!
//! ```text
//!   MemorySink ──frames──► MemoryPeer::recv
//! MemorySource ◄─frames── MemoryPeer::send
//! ```

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{FrameSink, FrameSource};

/// Create a connected in-process transport.
#[must_use]
pub fn pair() -> (MemorySink, MemorySource, MemoryPeer) {
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    (
        MemorySink {
            tx: Some(outbound_tx),
        },
        MemorySource { rx: inbound_rx },
        MemoryPeer {
            outbound: outbound_rx,
            inbound: Some(inbound_tx),
        },
    )
}

/// Client write half.
#[derive(Debug)]
pub struct MemorySink {
    tx: Option<mpsc::UnboundedSender<String>>,
}

#[async_trait]
impl FrameSink for MemorySink {
    async fn send(&mut self, frame: String) -> Result<()> {
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| anyhow!("memory transport closed"))?;
        tx.send(frame)
            .map_err(|e| anyhow!("memory peer dropped: {e}"))
    }

    async fn close(&mut self) -> Result<()> {
        self.tx = None;
        Ok(())
    }
}

/// Client read half.
#[derive(Debug)]
pub struct MemorySource {
    rx: mpsc::UnboundedReceiver<String>,
}

#[async_trait]
impl FrameSource for MemorySource {
    async fn recv(&mut self) -> Option<Result<String>> {
        self.rx.recv().await.map(Ok)
    }
}

/// The far end of an in-process transport.
#[derive(Debug)]
pub struct MemoryPeer {
    outbound: mpsc::UnboundedReceiver<String>,
    inbound: Option<mpsc::UnboundedSender<String>>,
}

impl MemoryPeer {
    /// Next frame sent by the client, or `None` once the client closed its
    /// write half.
    pub async fn recv(&mut self) -> Option<String> {
        self.outbound.recv().await
    }

    /// Next frame sent by the client, decoded as JSON.
    ///
    /// Returns `None` if the client closed its write half or sent something
    /// that is not JSON.
    pub async fn recv_json(&mut self) -> Option<serde_json::Value> {
        let frame = self.outbound.recv().await?;
        serde_json::from_str(&frame).ok()
    }

    /// Push a frame to the client. Returns `false` if the client's read half
    /// is gone or the peer was closed.
    pub fn send(&self, frame: impl Into<String>) -> bool {
        self.inbound
            .as_ref()
            .is_some_and(|tx| tx.send(frame.into()).is_ok())
    }

    /// Push a JSON value to the client as one frame.
    pub fn send_json(&self, value: &serde_json::Value) -> bool {
        self.send(value.to_string())
    }

    /// End the client's frame stream, as if the device hung up.
    pub fn close(&mut self) {
        self.inbound = None;
    }
}
