//! Multiplexed device connection.
//!
//! A [`Connection`] owns one frame transport and lets any number of tasks
//! issue requests and subscribe to signals over it concurrently.
//!
//! # Architecture
//!
//! ```text
//!   caller tasks                                 dispatch loop (one task)
//!   ────────────                                 ────────────────────────
//!   request() ──register slot──► Correlator ◄──── Response {id, body}
//!       │                                              ▲
//!       └──── frame ───► FrameSink        FrameSource ─┤
//!                                                      ▼
//!   subscribe() ──attach channel──► SignalRegistry ◄── Signal {signal, body}
//!       │                              (fan-out)
//!       └─ device round trip only for the first subscriber of a path
//! ```
//!
//! # Locking
//!
//! - Correlator and registry sit behind `std::sync::Mutex`es that are never
//!   held across an `.await`.
//! - Whole subscribe/unsubscribe sequences (check-then-create,
//!   remove-then-clear) hold the async `control` lock, including the nested
//!   device request. The dispatch loop never takes it, so responses keep
//!   flowing while a subscribe waits on the device.
//!
//! # Lifecycle
//!
//! The dispatch loop ends when the transport ends, a read fails, or
//! [`Connection::close`] is called (or the last handle is dropped). On the
//! way out every pending request fails with [`Error::ConnectionClosed`] and
//! every delivery channel is closed.

// Rust guideline compliant 2026-02

mod correlator;
mod dispatch;
mod registry;
mod subscription;

pub use subscription::{SignalReceiver, UnsubscribeHandle};

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;
use tokio::sync::broadcast;
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::config::Config;
use crate::endpoint::ApiComponent;
use crate::error::{Error, ProtocolViolation, Result};
use crate::protocol::{MessageId, Request, SignalId, SubscriptionId};
use crate::transport::{FrameSink, FrameSource};

use correlator::Correlator;
use registry::SignalRegistry;

/// Backlog of protocol violations kept for slow observers.
const VIOLATION_BUFFER: usize = 64;

/// Lock a std mutex, recovering from poisoning. The guarded maps are only
/// mutated through single calls that leave them consistent.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// State shared by every handle and the dispatch loop.
struct Shared {
    sink: tokio::sync::Mutex<Box<dyn FrameSink>>,
    correlator: Mutex<Correlator>,
    registry: Mutex<SignalRegistry>,
    control: tokio::sync::Mutex<()>,
    violations: broadcast::Sender<ProtocolViolation>,
    shutdown: CancellationToken,
    terminated: CancellationToken,
}

impl Shared {
    async fn send(&self, frame: String) -> Result<()> {
        log::trace!("[G3] -> {}", frame);
        let mut sink = self.sink.lock().await;
        sink.send(frame).await.map_err(|e| Error::transport(&e))
    }
}

/// Handle to a multiplexed device connection.
///
/// Cheap to clone; all clones share one transport and one dispatch loop.
/// Dropping the last handle (including those held inside
/// [`UnsubscribeHandle`]s) shuts the connection down.
#[derive(Clone)]
pub struct Connection {
    shared: Arc<Shared>,
    _shutdown_on_drop: Arc<DropGuard>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("closed", &self.is_closed())
            .field("pending_requests", &self.pending_requests())
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Open a WebSocket to the device described by `config` and start the
    /// dispatch loop.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`] if no hostname is configured or the
    /// WebSocket handshake fails.
    pub async fn connect(config: &Config) -> Result<Self> {
        let url = config.websocket_url().map_err(|e| Error::transport(&e))?;
        log::info!("[G3] Connecting to {}", url);
        let (writer, reader) = crate::ws::connect(&url, &[config.subprotocol.as_str()])
            .await
            .map_err(|e| Error::transport(&e))?;
        log::info!("[G3] WebSocket connected");
        Ok(Self::start(writer, reader))
    }

    /// Start the dispatch loop over an already-established transport.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(sink: impl FrameSink, source: impl FrameSource) -> Self {
        let (violations, _) = broadcast::channel(VIOLATION_BUFFER);
        let shutdown = CancellationToken::new();
        let shared = Arc::new(Shared {
            sink: tokio::sync::Mutex::new(Box::new(sink)),
            correlator: Mutex::new(Correlator::new()),
            registry: Mutex::new(SignalRegistry::new()),
            control: tokio::sync::Mutex::new(()),
            violations,
            shutdown: shutdown.clone(),
            terminated: CancellationToken::new(),
        });

        tokio::spawn(dispatch::run(Arc::clone(&shared), Box::new(source)));

        Self {
            shared,
            _shutdown_on_drop: Arc::new(shutdown.drop_guard()),
        }
    }

    /// Send a request and wait for the matching response body.
    ///
    /// Any number of requests may be in flight at once. Dropping the returned
    /// future abandons the request locally; the device still executes it.
    /// No timeout is applied here.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionClosed`] if the connection ends before the
    ///   response arrives (or had already ended).
    /// - [`Error::Transport`] if the frame could not be sent.
    /// - [`Error::Encode`] if the request could not be serialized.
    pub async fn request(&self, request: Request) -> Result<Value> {
        let (id, slot) = lock(&self.shared.correlator).register()?;
        let _pending = PendingGuard {
            correlator: &self.shared.correlator,
            id,
        };

        let frame = request.encode(id)?;
        self.shared.send(frame).await?;

        // A dropped sender means teardown raced this caller.
        slot.await.unwrap_or(Err(Error::ConnectionClosed))
    }

    /// `GET` a path.
    ///
    /// # Errors
    ///
    /// See [`Self::request`].
    pub async fn get(&self, path: &str, params: Option<Value>) -> Result<Value> {
        let request = match params {
            Some(params) => Request::get(path).with_params(params),
            None => Request::get(path),
        };
        self.request(request).await
    }

    /// `POST` to a path. An absent body is sent as `null`.
    ///
    /// # Errors
    ///
    /// See [`Self::request`].
    pub async fn post(&self, path: &str, body: Option<Value>) -> Result<Value> {
        self.request(Request::post(path, body)).await
    }

    /// Subscribe to the signal at `path`.
    ///
    /// Only the first local subscriber of a path triggers a device-side
    /// subscribe; later ones share its signal identifier. Every event received
    /// after this returns, and before the handle's
    /// [`unsubscribe`](UnsubscribeHandle::unsubscribe) completes, lands on the
    /// returned receiver exactly once and in arrival order.
    ///
    /// # Errors
    ///
    /// - [`Error::Subscription`] if the device answers with anything but a
    ///   signal identifier.
    /// - [`Error::ConnectionClosed`] / [`Error::Transport`] from the nested
    ///   request, or if the connection is already torn down.
    pub async fn subscribe(&self, path: &str) -> Result<(SignalReceiver, UnsubscribeHandle)> {
        let _control = self.shared.control.lock().await;

        let (subscription_id, known) = {
            let mut registry = lock(&self.shared.registry);
            (registry.allocate_subscription_id(), registry.signal_for(path))
        };

        let signal_id = match known {
            Some(signal_id) => {
                log::debug!("[G3] Reusing signal {} for {}", signal_id, path);
                signal_id
            }
            None => {
                let signal_id = self.require_subscribe(path).await?;
                log::debug!("[G3] Device subscribed {} as signal {}", path, signal_id);
                signal_id
            }
        };

        let events = lock(&self.shared.registry).attach(path, &signal_id, subscription_id)?;

        Ok((
            SignalReceiver::new(signal_id.clone(), events),
            UnsubscribeHandle::new(self.clone(), path.to_string(), signal_id, subscription_id),
        ))
    }

    /// Release one local subscription; the device is told only when it was
    /// the last one for the path.
    ///
    /// On [`Error::Unsubscribe`] the local channel is already gone but the
    /// path stays mapped to the signal, so a later subscribe reuses it and a
    /// later unsubscribe retries the device request.
    async fn release(
        &self,
        path: &str,
        signal_id: &SignalId,
        subscription_id: SubscriptionId,
    ) -> Result<()> {
        let _control = self.shared.control.lock().await;

        let remaining = lock(&self.shared.registry).detach(signal_id, subscription_id);
        match remaining {
            // Torn down: the device-side subscription died with the connection.
            None => return Ok(()),
            Some(0) => {}
            Some(_) => return Ok(()),
        }

        let answer = self
            .post(path, Some(Value::String(signal_id.to_string())))
            .await?;
        match answer {
            Value::Bool(true) => {
                lock(&self.shared.registry).forget(path, signal_id);
                log::debug!("[G3] Device unsubscribed {} (signal {})", path, signal_id);
                Ok(())
            }
            other => {
                log::error!(
                    "[G3] Device refused unsubscribe from {} (signal {}): {}",
                    path,
                    signal_id,
                    other
                );
                Err(Error::Unsubscribe {
                    path: path.to_string(),
                    signal_id: signal_id.clone(),
                    reason: format!("device answered {other}"),
                })
            }
        }
    }

    async fn require_subscribe(&self, path: &str) -> Result<SignalId> {
        let answer = self.post(path, None).await?;
        SignalId::from_json(&answer).ok_or_else(|| Error::Subscription {
            path: path.to_string(),
            reason: format!("device answered {answer} instead of a signal id"),
        })
    }

    /// An API component rooted at `uri` on this connection.
    pub fn component(&self, uri: impl Into<String>) -> ApiComponent {
        ApiComponent::new(self.clone(), uri)
    }

    /// Observe protocol violations detected by the dispatch loop.
    ///
    /// Violations do not stop the loop; deciding whether to [`close`](Self::close)
    /// is up to the owner.
    pub fn protocol_violations(&self) -> broadcast::Receiver<ProtocolViolation> {
        self.shared.violations.subscribe()
    }

    /// Stop the dispatch loop, close the transport and wait for teardown.
    pub async fn close(&self) {
        self.shared.shutdown.cancel();
        self.shared.terminated.cancelled().await;
    }

    /// Wait until the connection has been torn down, for whatever reason.
    pub async fn closed(&self) {
        self.shared.terminated.cancelled().await;
    }

    /// Whether teardown has completed.
    pub fn is_closed(&self) -> bool {
        self.shared.terminated.is_cancelled()
    }

    /// Requests currently waiting for a response.
    pub fn pending_requests(&self) -> usize {
        lock(&self.shared.correlator).pending_count()
    }

    /// Local subscribers currently registered for `path`.
    pub fn subscriber_count(&self, path: &str) -> usize {
        lock(&self.shared.registry).subscriber_count(path)
    }

    /// Device-assigned signal identifier for `path`, if a device-side
    /// subscription is being tracked.
    pub fn signal_id(&self, path: &str) -> Option<SignalId> {
        lock(&self.shared.registry).signal_for(path)
    }
}

/// Removes an abandoned request's slot when the caller's future is dropped.
struct PendingGuard<'a> {
    correlator: &'a Mutex<Correlator>,
    id: MessageId,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        lock(self.correlator).cancel(self.id);
    }
}
