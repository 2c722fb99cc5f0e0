//! g3link - client protocol engine for the Glasses 3 device API.
//!
//! The device speaks JSON text frames over one WebSocket. This crate
//! multiplexes that socket: many concurrent requests are correlated with
//! their responses by message id, and signal subscriptions are reference
//! counted so each signal path costs one device-side subscription no matter
//! how many local consumers listen to it.
//!
//! # Modules
//!
//! - [`connection`] - Connection handle, request correlation, signal fan-out
//! - [`protocol`] - Frame encoding and classification
//! - [`endpoint`] - Property/action/signal URIs on API components
//! - [`transport`] - Frame transport traits and the in-memory transport
//! - [`ws`] - WebSocket transport
//! - [`config`] - Configuration loading
//! - [`error`] - Error types
//!
//! # Example
//!
//! ```no_run
//! # async fn run() -> anyhow::Result<()> {
//! use g3link::{Config, Connection};
//!
//! let config = Config {
//!     hostname: Some("192.168.75.51".to_string()),
//!     ..Config::default()
//! };
//! let conn = Connection::connect(&config).await?;
//!
//! let serial = conn.get("/system.recording-unit-serial", None).await?;
//! println!("serial: {serial}");
//!
//! let (mut events, handle) = conn.subscribe("/recorder:started").await?;
//! if let Some(body) = events.recv().await {
//!     println!("recording started: {body:?}");
//! }
//! handle.unsubscribe().await?;
//! conn.close().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod connection;
pub mod endpoint;
pub mod error;
pub mod protocol;
pub mod transport;
pub mod ws;

// Re-export commonly used types
pub use config::Config;
pub use connection::{Connection, SignalReceiver, UnsubscribeHandle};
pub use endpoint::{ApiComponent, EndpointKind};
pub use error::{Error, ProtocolViolation, Result};
pub use protocol::{Method, MessageId, Request, SignalBody, SignalId, SubscriptionId};
