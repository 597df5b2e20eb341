//! Per-channel message dispatch.
//!
//! The router maps an envelope's declared type to the handlers registered
//! for it. Every inbound envelope gets two dispatch passes: first all
//! handlers registered for the exact type, then all wildcard handlers,
//! each pass in registration order. The router itself never fails for
//! routing reasons; an envelope with no matching handlers is simply not
//! delivered anywhere.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::envelope::Envelope;

/// The type tag that subscribes a handler to every envelope on a channel.
pub const WILDCARD: &str = "*";

type HandlerFn = Arc<dyn Fn(&Envelope) + Send + Sync + 'static>;

struct Entry {
    id: u64,
    handler: HandlerFn,
}

#[derive(Default)]
struct RouterInner {
    next_id: u64,
    exact: HashMap<String, Vec<Entry>>,
    wildcard: Vec<Entry>,
}

impl RouterInner {
    fn remove(&mut self, kind: &str, id: u64) {
        if kind == WILDCARD {
            self.wildcard.retain(|entry| entry.id != id);
        } else if let Some(entries) = self.exact.get_mut(kind) {
            entries.retain(|entry| entry.id != id);
            if entries.is_empty() {
                self.exact.remove(kind);
            }
        }
    }
}

/// Dispatch table for one channel.
///
/// Cloning the router clones a handle to the same table; the transport
/// channel and its subscribers share one instance.
#[derive(Clone, Default)]
pub struct MessageRouter {
    inner: Arc<Mutex<RouterInner>>,
}

impl std::fmt::Debug for MessageRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = lock(&self.inner);
        let exact: usize = inner.exact.values().map(Vec::len).sum();
        f.debug_struct("MessageRouter")
            .field("exact_subscriptions", &exact)
            .field("wildcard_subscriptions", &inner.wildcard.len())
            .finish()
    }
}

fn lock(inner: &Arc<Mutex<RouterInner>>) -> MutexGuard<'_, RouterInner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MessageRouter {
    /// Create an empty dispatch table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for a type tag.
    ///
    /// Passing [`WILDCARD`] subscribes to every envelope on the channel.
    /// The returned handle removes exactly this subscription when
    /// disposed.
    pub fn subscribe(
        &self,
        kind: &str,
        handler: impl Fn(&Envelope) + Send + Sync + 'static,
    ) -> SubscriptionHandle {
        let mut inner = lock(&self.inner);
        let id = inner.next_id;
        inner.next_id += 1;

        let entry = Entry {
            id,
            handler: Arc::new(handler),
        };
        if kind == WILDCARD {
            inner.wildcard.push(entry);
        } else {
            inner.exact.entry(kind.to_string()).or_default().push(entry);
        }

        SubscriptionHandle {
            id,
            kind: kind.to_string(),
            inner: self.inner.clone(),
        }
    }

    /// Register a wildcard handler that sees every envelope.
    pub fn subscribe_all(
        &self,
        handler: impl Fn(&Envelope) + Send + Sync + 'static,
    ) -> SubscriptionHandle {
        self.subscribe(WILDCARD, handler)
    }

    /// Deliver an envelope to all matching handlers, synchronously.
    ///
    /// Exact-type handlers run first, then wildcard handlers, each set in
    /// registration order. Both passes always run. An unknown type reaches
    /// only wildcard subscribers and is not an error.
    pub fn dispatch(&self, envelope: &Envelope) {
        // Snapshot the handler list before invoking, so handlers may
        // subscribe or dispose re-entrantly without deadlocking.
        let handlers: Vec<HandlerFn> = {
            let inner = lock(&self.inner);
            let exact = inner
                .exact
                .get(&envelope.kind)
                .into_iter()
                .flatten()
                .map(|entry| entry.handler.clone());
            let wildcard = inner.wildcard.iter().map(|entry| entry.handler.clone());
            exact.chain(wildcard).collect()
        };

        for handler in handlers {
            handler(envelope);
        }
    }

    /// Total number of live subscriptions, wildcard included.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        let inner = lock(&self.inner);
        inner.exact.values().map(Vec::len).sum::<usize>() + inner.wildcard.len()
    }
}

/// Handle to one (type, handler) subscription.
///
/// Disposing removes exactly that subscription. Disposing twice, or after
/// the channel has disconnected, is a no-op.
pub struct SubscriptionHandle {
    id: u64,
    kind: String,
    inner: Arc<Mutex<RouterInner>>,
}

impl std::fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .finish()
    }
}

impl SubscriptionHandle {
    /// Remove the subscription. Safe to call any number of times.
    pub fn dispose(&self) {
        lock(&self.inner).remove(&self.kind, self.id);
    }
}
