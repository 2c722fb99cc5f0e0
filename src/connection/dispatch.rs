//! The single reader of the transport.
//!
//! `Running` until the transport ends, a read fails or shutdown is
//! requested; then `Terminated`, after tearing down all pending state.

use std::sync::Arc;

use crate::protocol::InboundFrame;
use crate::transport::FrameSource;

use super::{lock, Shared};

/// Longest frame excerpt written to the log.
const LOG_EXCERPT: usize = 200;

/// Why the dispatch loop stopped.
#[derive(Debug)]
enum DispatchExit {
    /// [`super::Connection::close`] or last handle dropped.
    Shutdown,
    /// The transport's frame stream ended.
    TransportClosed,
    /// Reading a frame failed.
    ReadFailed(String),
}

pub(super) async fn run(shared: Arc<Shared>, mut source: Box<dyn FrameSource>) {
    log::debug!("[G3 dispatch] Started");

    let exit = loop {
        let next = tokio::select! {
            biased;
            () = shared.shutdown.cancelled() => break DispatchExit::Shutdown,
            next = source.recv() => next,
        };
        match next {
            Some(Ok(frame)) => route(&shared, &frame),
            Some(Err(e)) => break DispatchExit::ReadFailed(format!("{e:#}")),
            None => break DispatchExit::TransportClosed,
        }
    };

    match &exit {
        DispatchExit::Shutdown => log::info!("[G3 dispatch] Shutdown requested"),
        DispatchExit::TransportClosed => log::info!("[G3 dispatch] Transport closed"),
        DispatchExit::ReadFailed(e) => log::warn!("[G3 dispatch] Read failed: {}", e),
    }

    teardown(&shared).await;
}

/// Classify one frame and hand it to the correlator or the registry.
fn route(shared: &Shared, frame: &str) {
    log::trace!("[G3 dispatch] <- {}", excerpt(frame));

    let outcome = match InboundFrame::decode(frame) {
        InboundFrame::Response { id, body } => lock(&shared.correlator).resolve(id, body),
        InboundFrame::Signal { signal_id, body } => {
            let delivered = lock(&shared.registry).fan_out(&signal_id, &body);
            if delivered == 0 {
                log::debug!("[G3 dispatch] Event for signal {} has no subscribers", signal_id);
            }
            Ok(())
        }
        InboundFrame::Invalid(violation) => Err(violation),
    };

    if let Err(violation) = outcome {
        log::error!(
            "[G3 dispatch] Protocol violation: {} (frame: {})",
            violation,
            excerpt(frame)
        );
        // No observers is fine; the log line above is the fallback.
        let _ = shared.violations.send(violation);
    }
}

async fn teardown(shared: &Shared) {
    let failed = lock(&shared.correlator).fail_all();
    let dropped = lock(&shared.registry).close();
    log::debug!(
        "[G3 dispatch] Failed {} pending request(s), closed {} delivery channel(s)",
        failed,
        dropped
    );

    if let Err(e) = shared.sink.lock().await.close().await {
        log::debug!("[G3 dispatch] Closing transport: {:#}", e);
    }

    shared.terminated.cancel();
    log::info!("[G3] Connection terminated");
}

fn excerpt(frame: &str) -> &str {
    match frame.char_indices().nth(LOG_EXCERPT) {
        Some((end, _)) => &frame[..end],
        None => frame,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_excerpt_truncates_on_char_boundary() {
        let long = "é".repeat(LOG_EXCERPT + 10);
        assert_eq!(excerpt(&long).chars().count(), LOG_EXCERPT);
        assert_eq!(excerpt("short"), "short");
    }
}
