//! Typed publish/subscribe hub.
//!
//! Subscribers register for a [`Topic`] and receive events in registration
//! order. Each handler invocation is isolated: an `Err` or a panic is logged
//! and delivery continues with the next handler.

use std::panic::{self, AssertUnwindSafe};

use tracing::warn;

/// Error a handler may return. Logged, never propagated.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Result of one handler invocation.
pub type HandlerResult = Result<(), HandlerError>;

type Handler<N> = Box<dyn FnMut(&N) -> HandlerResult + Send>;

/// What a subscriber listens to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// A single event kind, e.g. `"ai_stream_chunk"`
    Type(&'static str),
    /// Every event
    Message,
    /// Connection state and lifecycle events
    Connection,
    /// Errors
    Error,
}

/// Events that can be routed by the dispatcher.
pub trait Routable {
    /// Event kind, matched against [`Topic::Type`].
    fn kind(&self) -> &'static str;

    /// Channel topic (`Connection` or `Error`) this event also belongs to.
    fn channel(&self) -> Option<Topic> {
        None
    }
}

/// Token returned by [`EventDispatcher::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

struct Subscription<N> {
    id: SubscriptionId,
    topic: Topic,
    handler: Handler<N>,
}

/// Outcome of one [`EventDispatcher::dispatch`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Handlers that returned `Ok`
    pub delivered: usize,
    /// Handlers that returned `Err` or panicked
    pub failed: usize,
}

/// Publish/subscribe hub over events of type `N`.
pub struct EventDispatcher<N> {
    next_id: u64,
    subscriptions: Vec<Subscription<N>>,
}

impl<N> Default for EventDispatcher<N> {
    fn default() -> Self {
        Self { next_id: 1, subscriptions: Vec::new() }
    }
}

impl<N> std::fmt::Debug for EventDispatcher<N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("subscriptions", &self.subscriptions.len())
            .finish_non_exhaustive()
    }
}

impl<N: Routable> EventDispatcher<N> {
    /// Create a dispatcher with no subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `topic`.
    pub fn subscribe<F>(&mut self, topic: Topic, handler: F) -> SubscriptionId
    where
        F: FnMut(&N) -> HandlerResult + Send + 'static,
    {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.subscriptions.push(Subscription { id, topic, handler: Box::new(handler) });
        id
    }

    /// Remove a subscription. Returns false if it was already removed.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscriptions.len();
        self.subscriptions.retain(|sub| sub.id != id);
        self.subscriptions.len() != before
    }

    /// Number of live subscriptions.
    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    /// Whether there are no subscriptions.
    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    /// Deliver `event` to its type topic, then its channel topic, then the
    /// `Message` catch-all. Within a topic, registration order.
    pub fn dispatch(&mut self, event: &N) -> DispatchReport {
        let kind = event.kind();
        let topics = [Some(Topic::Type(kind)), event.channel(), Some(Topic::Message)];

        let mut report = DispatchReport::default();
        for topic in topics.into_iter().flatten() {
            for sub in self.subscriptions.iter_mut().filter(|sub| sub.topic == topic) {
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| (sub.handler)(event)));
                match outcome {
                    Ok(Ok(())) => report.delivered += 1,
                    Ok(Err(err)) => {
                        report.failed += 1;
                        let subscription = sub.id.0;
                        warn!(subscription, event = kind, error = %err, "handler failed");
                    },
                    Err(_) => {
                        report.failed += 1;
                        warn!(subscription = sub.id.0, event = kind, "handler panicked");
                    },
                }
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    #[derive(Debug)]
    enum Event {
        Chunk,
        StateChanged,
        Failure,
    }

    impl Routable for Event {
        fn kind(&self) -> &'static str {
            match self {
                Self::Chunk => "ai_stream_chunk",
                Self::StateChanged => "connection_state",
                Self::Failure => "error",
            }
        }

        fn channel(&self) -> Option<Topic> {
            match self {
                Self::Chunk => None,
                Self::StateChanged => Some(Topic::Connection),
                Self::Failure => Some(Topic::Error),
            }
        }
    }

    fn recorder(
        log: &Arc<Mutex<Vec<String>>>,
        name: &'static str,
    ) -> impl FnMut(&Event) -> HandlerResult + Send + 'static {
        let log = Arc::clone(log);
        move |event| {
            log.lock().unwrap().push(format!("{name}:{}", event.kind()));
            Ok(())
        }
    }

    #[test]
    fn type_then_channel_then_catch_all() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut dispatcher = EventDispatcher::new();
        dispatcher.subscribe(Topic::Message, recorder(&log, "all"));
        dispatcher.subscribe(Topic::Connection, recorder(&log, "conn"));
        dispatcher.subscribe(Topic::Type("connection_state"), recorder(&log, "typed"));

        let report = dispatcher.dispatch(&Event::StateChanged);
        assert_eq!(report.delivered, 3);
        assert_eq!(*log.lock().unwrap(), vec![
            "typed:connection_state",
            "conn:connection_state",
            "all:connection_state"
        ]);
    }

    #[test]
    fn registration_order_within_topic() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut dispatcher = EventDispatcher::new();
        dispatcher.subscribe(Topic::Type("ai_stream_chunk"), recorder(&log, "first"));
        dispatcher.subscribe(Topic::Type("ai_stream_chunk"), recorder(&log, "second"));

        dispatcher.dispatch(&Event::Chunk);
        assert_eq!(*log.lock().unwrap(), vec!["first:ai_stream_chunk", "second:ai_stream_chunk"]);
    }

    #[test]
    fn unrelated_topics_do_not_receive() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut dispatcher = EventDispatcher::new();
        dispatcher.subscribe(Topic::Error, recorder(&log, "err"));

        dispatcher.dispatch(&Event::Chunk);
        dispatcher.dispatch(&Event::Failure);
        assert_eq!(*log.lock().unwrap(), vec!["err:error"]);
    }

    #[test]
    fn failing_handlers_are_isolated() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut dispatcher = EventDispatcher::new();
        dispatcher.subscribe(Topic::Message, |_: &Event| Err("render failed".into()));
        dispatcher.subscribe(Topic::Message, |_: &Event| panic!("handler bug"));
        dispatcher.subscribe(Topic::Message, recorder(&log, "last"));

        let report = dispatcher.dispatch(&Event::Chunk);
        assert_eq!(report, DispatchReport { delivered: 1, failed: 2 });
        assert_eq!(*log.lock().unwrap(), vec!["last:ai_stream_chunk"]);

        // A panicking handler stays subscribed and keeps being isolated
        let report = dispatcher.dispatch(&Event::Chunk);
        assert_eq!(report.failed, 2);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut dispatcher = EventDispatcher::new();
        let id = dispatcher.subscribe(Topic::Message, recorder(&log, "a"));

        assert!(dispatcher.unsubscribe(id));
        assert!(!dispatcher.unsubscribe(id));
        assert!(dispatcher.is_empty());

        dispatcher.dispatch(&Event::Chunk);
        assert!(log.lock().unwrap().is_empty());
    }
}
