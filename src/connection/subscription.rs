//! Handles returned by [`Connection::subscribe`].

use tokio::sync::mpsc;

use super::Connection;
use crate::error::Result;
use crate::protocol::{SignalBody, SignalId, SubscriptionId};

/// Private delivery channel of one signal subscription.
///
/// Yields one [`SignalBody`] per event, in arrival order. After the
/// connection is torn down, already-queued events are still returned and
/// then [`recv`](Self::recv) yields `None`.
#[derive(Debug)]
pub struct SignalReceiver {
    signal_id: SignalId,
    events: mpsc::UnboundedReceiver<SignalBody>,
}

impl SignalReceiver {
    pub(super) fn new(signal_id: SignalId, events: mpsc::UnboundedReceiver<SignalBody>) -> Self {
        Self { signal_id, events }
    }

    /// Wait for the next event. `None` once no more events can arrive.
    pub async fn recv(&mut self) -> Option<SignalBody> {
        self.events.recv().await
    }

    /// Take the next queued event without waiting.
    pub fn try_recv(&mut self) -> Option<SignalBody> {
        self.events.try_recv().ok()
    }

    /// Device-assigned identifier shared by every subscriber of this path.
    #[must_use]
    pub fn signal_id(&self) -> &SignalId {
        &self.signal_id
    }
}

/// Ends exactly one local subscription.
///
/// Consuming [`unsubscribe`](Self::unsubscribe) makes a second call
/// impossible. Dropping the handle without calling it leaves the
/// subscription registered (and keeps the connection alive) until the
/// connection is torn down.
#[derive(Debug)]
#[must_use = "dropping the handle leaves the subscription active"]
pub struct UnsubscribeHandle {
    connection: Connection,
    path: String,
    signal_id: SignalId,
    subscription_id: SubscriptionId,
}

impl UnsubscribeHandle {
    pub(super) fn new(
        connection: Connection,
        path: String,
        signal_id: SignalId,
        subscription_id: SubscriptionId,
    ) -> Self {
        Self {
            connection,
            path,
            signal_id,
            subscription_id,
        }
    }

    /// Remove this subscription's channel. If it was the last subscriber of
    /// the path, the device-side subscription is released too.
    ///
    /// Succeeds without contacting the device once the connection has been
    /// torn down.
    ///
    /// # Errors
    ///
    /// - [`Error::Unsubscribe`](crate::Error::Unsubscribe) if the device
    ///   refuses. The channel is gone, but the path remains mapped to its
    ///   signal identifier; treat the path as needing attention.
    /// - [`Error::ConnectionClosed`](crate::Error::ConnectionClosed) /
    ///   [`Error::Transport`](crate::Error::Transport) from the device request.
    pub async fn unsubscribe(self) -> Result<()> {
        self.connection
            .release(&self.path, &self.signal_id, self.subscription_id)
            .await
    }

    /// Signal path this subscription was made on.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Device-assigned signal identifier.
    pub fn signal_id(&self) -> &SignalId {
        &self.signal_id
    }

    /// Local subscription identifier.
    pub fn subscription_id(&self) -> SubscriptionId {
        self.subscription_id
    }
}
