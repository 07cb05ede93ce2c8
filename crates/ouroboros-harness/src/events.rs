//! Lifecycle notifications
//!
//! Events flow bottom-up: a [`Test`](crate::Test) emits [`TestEvent`]s, its
//! [`Tester`] re-emits them as [`TesterEvent`]s, and a [`Suite`] re-emits those as
//! [`SuiteEvent`]s. Each layer adds its own identity to the payload.
//!
//! Delivery is synchronous and in emission order. Listeners are registered with
//! [`EventHub::subscribe`], which hands back a [`SubscriptionId`] used to unsubscribe.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::SharedError;
use crate::step::Step;
use crate::suite::Suite;
use crate::test::TestHandle;
use crate::tester::Tester;

/// Listener callback
pub type Listener<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// Token returned by [`EventHub::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Synchronous multicast list of listeners
pub struct EventHub<E> {
    next_id: AtomicU64,
    listeners: RwLock<Vec<(SubscriptionId, Listener<E>)>>,
}

impl<E> Default for EventHub<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> EventHub<E> {
    /// Create an empty hub
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            listeners: RwLock::new(Vec::new()),
        }
    }

    /// Register a listener
    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().push((id, Arc::new(listener)));
        id
    }

    /// Remove a listener. Returns false if the token was unknown.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    /// Deliver an event to every listener, in registration order
    pub fn emit(&self, event: &E) {
        // Snapshot so listeners may subscribe/unsubscribe or query state while we deliver
        let listeners: Vec<Listener<E>> = self
            .listeners
            .read()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        for listener in listeners {
            listener(event);
        }
    }

    /// Get number of registered listeners
    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }
}

impl<E> std::fmt::Debug for EventHub<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventHub")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

/// What happened to a test
#[derive(Debug, Clone)]
pub enum TestEventKind {
    /// Execution started
    Started,
    /// A step was appended to the log
    StepAdded(Step),
    /// The test reached `success`
    Succeeded,
    /// The test (or its cleanup) failed with this error
    Failed(SharedError),
    /// The run is complete, cleanup included
    Done,
}

impl TestEventKind {
    /// Get the event type as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            TestEventKind::Started => "started",
            TestEventKind::StepAdded(_) => "step_added",
            TestEventKind::Succeeded => "succeeded",
            TestEventKind::Failed(_) => "failed",
            TestEventKind::Done => "done",
        }
    }
}

/// Event emitted by a test
#[derive(Debug, Clone)]
pub struct TestEvent {
    pub test: TestHandle,
    pub kind: TestEventKind,
}

/// Test event re-emitted by its tester
#[derive(Debug, Clone)]
pub struct TesterEvent {
    pub tester: Tester,
    pub test: TestHandle,
    pub kind: TestEventKind,
}

/// Tester event re-emitted by its suite
#[derive(Debug, Clone)]
pub struct SuiteEvent {
    pub suite: Suite,
    pub tester: Tester,
    pub test: TestHandle,
    pub kind: TestEventKind,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_emit_in_registration_order() {
        let hub: EventHub<u32> = EventHub::new();
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));

        let first = Arc::clone(&seen);
        hub.subscribe(move |n| first.lock().push(("first", *n)));
        let second = Arc::clone(&seen);
        hub.subscribe(move |n| second.lock().push(("second", *n)));

        hub.emit(&7);
        assert_eq!(*seen.lock(), vec![("first", 7), ("second", 7)]);
    }

    #[test]
    fn test_unsubscribe_by_token() {
        let hub: EventHub<()> = EventHub::new();
        let counter = Arc::new(AtomicUsize::new(0));

        let c = Arc::clone(&counter);
        let id = hub.subscribe(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(hub.listener_count(), 1);

        hub.emit(&());
        assert!(hub.unsubscribe(id));
        assert!(!hub.unsubscribe(id));
        hub.emit(&());

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(hub.listener_count(), 0);
    }

    #[test]
    fn test_same_closure_twice_gets_distinct_tokens() {
        let hub: EventHub<()> = EventHub::new();
        let counter = Arc::new(AtomicUsize::new(0));

        let c = Arc::clone(&counter);
        let listener = move |_: &()| {
            c.fetch_add(1, Ordering::SeqCst);
        };
        let a = hub.subscribe(listener.clone());
        let b = hub.subscribe(listener);
        assert_ne!(a, b);

        hub.emit(&());
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_listener_may_unsubscribe_during_emit() {
        let hub: Arc<EventHub<()>> = Arc::new(EventHub::new());
        let slot = Arc::new(parking_lot::Mutex::new(None));

        let hub_ref = Arc::clone(&hub);
        let slot_ref = Arc::clone(&slot);
        let id = hub.subscribe(move |_| {
            if let Some(id) = slot_ref.lock().take() {
                hub_ref.unsubscribe(id);
            }
        });
        *slot.lock() = Some(id);

        hub.emit(&());
        assert_eq!(hub.listener_count(), 0);
    }
}
