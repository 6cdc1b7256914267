//! In-memory correspondence between pending proposals and their
//! waiting callers (spec.md 4.2). Safe for concurrent `wait`/`call`
//! from any number of producers and consumers; `call` on an unknown
//! id is a no-op, never an error.

use dashmap::DashMap;
use tokio::sync::oneshot;

use crate::{RequestId, Response};

#[derive(Default)]
pub struct RequestLine {
    slots: DashMap<RequestId, oneshot::Sender<Response>>,
}

/// Handle returned by `wait`. Resolves to the delivered `Response`, or
/// to `None` if the line was torn down (node stopped) before a
/// response arrived.
pub type Wait = oneshot::Receiver<Response>;

impl RequestLine {
    pub fn new() -> Self {
        Self { slots: DashMap::new() }
    }

    /// Registers a single-use slot for `id`. Panics in debug builds if
    /// `id` is already registered — at most one `wait` per RequestID
    /// is an invariant the node itself must uphold by minting fresh
    /// ids.
    pub fn wait(&self, id: RequestId) -> Wait {
        let (tx, rx) = oneshot::channel();
        let prev = self.slots.insert(id, tx);
        debug_assert!(prev.is_none(), "duplicate wait() for {id}");
        rx
    }

    /// Delivers `resp` to the slot matching `resp.id`, then removes
    /// the registration. Discarded silently if the caller already gave
    /// up (the receiver was dropped) or never registered.
    pub fn call(&self, resp: Response) {
        if let Some((_, tx)) = self.slots.remove(&resp.id) {
            // The receiver may have been dropped (caller cancelled
            // concurrently); that is not this module's concern.
            let _ = tx.send(resp);
        } else {
            tracing::trace!(request_id = %resp.id, "response delivered with no waiter");
        }
    }

    /// Removes a slot without delivering anything, e.g. when a caller
    /// cancels and wants to free its registration immediately.
    pub fn cancel(&self, id: RequestId) {
        self.slots.remove(&id);
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn wait_then_call_delivers_response() {
        let line = RequestLine::new();
        let id = RequestId { node_id: 1, seq: 1 };
        let rx = line.wait(id);

        line.call(Response::ok(id, crate::CommandResult::Claimed));

        let resp = rx.await.unwrap();
        assert_eq!(resp.id, id);
        assert!(resp.err.is_none());
    }

    #[tokio::test]
    async fn call_on_unknown_id_is_a_no_op() {
        let line = RequestLine::new();
        let id = RequestId { node_id: 1, seq: 42 };
        // No wait() registered; call must not panic.
        line.call(Response::empty(id));
        assert!(line.is_empty());
    }

    #[tokio::test]
    async fn cancel_frees_the_slot_without_delivering() {
        let line = RequestLine::new();
        let id = RequestId { node_id: 1, seq: 7 };
        let rx = line.wait(id);
        line.cancel(id);
        assert!(line.is_empty());
        assert!(rx.await.is_err());
    }
}
