//! Request correlation.
//!
//! Hands out message identifiers and keeps one single-assignment slot per
//! in-flight request until the matching response (or teardown) resolves it.

use std::collections::HashMap;

use serde_json::Value;
use tokio::sync::oneshot;

use crate::error::{Error, ProtocolViolation, Result};
use crate::protocol::MessageId;

/// Receiving end of a pending request's result slot.
pub(crate) type ResponseSlot = oneshot::Receiver<Result<Value>>;

#[derive(Debug)]
pub(crate) struct Correlator {
    next_id: MessageId,
    pending: HashMap<MessageId, oneshot::Sender<Result<Value>>>,
    closed: bool,
}

impl Correlator {
    pub(crate) fn new() -> Self {
        Self {
            next_id: 1,
            pending: HashMap::new(),
            closed: false,
        }
    }

    /// Allocate the next identifier and register a slot under it.
    ///
    /// Fails with [`Error::ConnectionClosed`] once [`Self::fail_all`] ran, so
    /// no slot can be registered after teardown and left unresolved.
    pub(crate) fn register(&mut self) -> Result<(MessageId, ResponseSlot)> {
        if self.closed {
            return Err(Error::ConnectionClosed);
        }
        let id = self.next_id;
        self.next_id += 1;
        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);
        Ok((id, rx))
    }

    /// Resolve the slot registered under `id` with a response body.
    ///
    /// A response for an id this correlator issued but no longer tracks
    /// belongs to a request whose caller gave up, and is dropped. Only ids
    /// never issued are a violation. No per-id state outlives a request.
    pub(crate) fn resolve(
        &mut self,
        id: MessageId,
        body: Value,
    ) -> std::result::Result<(), ProtocolViolation> {
        if let Some(slot) = self.pending.remove(&id) {
            // The caller may have been cancelled between the response arriving
            // and this send; nothing is waiting then.
            let _ = slot.send(Ok(body));
            return Ok(());
        }
        if (1..self.next_id).contains(&id) {
            log::debug!("[G3] Dropping late response for request {}", id);
            return Ok(());
        }
        Err(ProtocolViolation::UnknownMessageId(id))
    }

    /// Forget the slot for a request whose caller stopped waiting.
    pub(crate) fn cancel(&mut self, id: MessageId) {
        self.pending.remove(&id);
    }

    /// Resolve every pending slot with [`Error::ConnectionClosed`] and refuse
    /// further registrations. Returns how many callers were woken.
    pub(crate) fn fail_all(&mut self) -> usize {
        self.closed = true;
        let pending = std::mem::take(&mut self.pending);
        let count = pending.len();
        for (_, slot) in pending {
            let _ = slot.send(Err(Error::ConnectionClosed));
        }
        count
    }

    pub(crate) fn pending_count(&self) -> usize {
        self.pending.len()
    }
}
