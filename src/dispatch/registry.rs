use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use log::{debug, trace};

use crate::protocol::decoder::DecodedEvent;

/// Sink for decoded events.
///
/// Implementors are shared between both feed consumers and are responsible
/// for their own synchronisation.
pub trait Dispatcher: Send + Sync {
    /// True when nothing at all is registered.
    fn is_empty(&self) -> bool;

    /// Whether at least one handler listens for `event`.
    fn has_handler(&self, event: &str) -> bool;

    /// Queues `fields` for the handlers of `event`.
    fn enqueue(&self, event: &str, fields: DecodedEvent);

    /// Runs every queued event through its handlers, to completion.
    fn process(&self);
}

pub type EventHandler = Box<dyn Fn(&DecodedEvent) + Send + Sync>;

/// Maps event names to handlers and runs them synchronously on [`Dispatcher::process`].
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Vec<EventHandler>>,
    queue: Mutex<VecDeque<(String, DecodedEvent)>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `event`. Several handlers may share one event.
    pub fn add<F>(&mut self, event: &str, handler: F)
    where
        F: Fn(&DecodedEvent) + Send + Sync + 'static,
    {
        debug!("Registering handler for {}", event);
        self.handlers
            .entry(event.to_string())
            .or_default()
            .push(Box::new(handler));
    }

    /// Number of handlers registered across all events.
    pub fn len(&self) -> usize {
        self.handlers.values().map(Vec::len).sum()
    }

    fn queue(&self) -> MutexGuard<'_, VecDeque<(String, DecodedEvent)>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Dispatcher for HandlerRegistry {
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn has_handler(&self, event: &str) -> bool {
        self.handlers.get(event).is_some_and(|h| !h.is_empty())
    }

    fn enqueue(&self, event: &str, fields: DecodedEvent) {
        trace!("Queued {} with {} fields", event, fields.len());
        self.queue().push_back((event.to_string(), fields));
    }

    fn process(&self) {
        // Drain first so handlers never run while the queue is locked.
        let drained: Vec<_> = self.queue().drain(..).collect();
        for (event, fields) in drained {
            if let Some(handlers) = self.handlers.get(&event) {
                for handler in handlers {
                    handler(&fields);
                }
            }
        }
    }
}
