//! Events and the two FIFO queues ("internal" and "external") that feed the
//! interpreter loop. Mirrors the W3C SCXML algorithm's `internalQueue` /
//! `externalQueue`, but without the blocking-queue/cross-thread machinery of
//! a long-running session: a [StateChart](crate::fsm::StateChart) is driven
//! synchronously by its owner, one call at a time.

use std::collections::VecDeque;

use crate::datamodel::Data;

/// Where an [Event] came from. Internal events are raised by `<raise>` and
/// `<send>` with an internal target, or generated by the interpreter itself
/// (`error.*` family). External events are whatever the embedding host passes
/// to [crate::fsm::StateChart::send_event].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOrigin {
    Internal,
    External,
}

/// A value object consumed one at a time by the interpreter. `name` is a
/// dotted token, matched against transition event descriptors by the prefix
/// rule described in [crate::document::EventDescriptor].
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub name: String,
    pub data: Data,
    pub origin: EventOrigin,
}

impl Event {
    pub fn external(name: impl Into<String>) -> Event {
        Event {
            name: name.into(),
            data: Data::Null,
            origin: EventOrigin::External,
        }
    }

    pub fn external_with_data(name: impl Into<String>, data: Data) -> Event {
        Event {
            name: name.into(),
            data,
            origin: EventOrigin::External,
        }
    }

    pub fn internal(name: impl Into<String>) -> Event {
        Event {
            name: name.into(),
            data: Data::Null,
            origin: EventOrigin::Internal,
        }
    }

    pub fn internal_with_data(name: impl Into<String>, data: Data) -> Event {
        Event {
            name: name.into(),
            data,
            origin: EventOrigin::Internal,
        }
    }

    /// Builds an `error.execution` event, per the error taxonomy: payload
    /// carries at least `type` and `reason`.
    pub fn execution_error(reason: impl Into<String>) -> Event {
        let mut fields = std::collections::HashMap::new();
        fields.insert("type".to_string(), Data::String("error.execution".to_string()));
        fields.insert("reason".to_string(), Data::String(reason.into()));
        Event::internal_with_data("error.execution", Data::Map(fields))
    }

    /// Builds an `error.communication` event (failed `<send>` delivery).
    pub fn communication_error(reason: impl Into<String>) -> Event {
        let mut fields = std::collections::HashMap::new();
        fields.insert(
            "type".to_string(),
            Data::String("error.communication".to_string()),
        );
        fields.insert("reason".to_string(), Data::String(reason.into()));
        Event::internal_with_data("error.communication", Data::Map(fields))
    }
}

/// A plain FIFO. Named to mirror the W3C pseudocode's `Queue` rather than
/// exposing `VecDeque` directly at call sites.
#[derive(Debug, Default, Clone)]
pub struct Queue<T> {
    items: VecDeque<T>,
}

impl<T> Queue<T> {
    pub fn new() -> Queue<T> {
        Queue { items: VecDeque::new() }
    }

    pub fn enqueue(&mut self, item: T) {
        self.items.push_back(item);
    }

    pub fn dequeue(&mut self) -> Option<T> {
        self.items.pop_front()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }
}

/// Holds the two event queues a [crate::fsm::StateChart] owns. Internal
/// events always drain before external ones (§4.E): "dequeue returns the
/// head of internal queue if non-empty, else external, else nothing".
#[derive(Debug, Default)]
pub struct EventQueues {
    internal: Queue<Event>,
    external: Queue<Event>,
}

impl EventQueues {
    pub fn new() -> EventQueues {
        EventQueues {
            internal: Queue::new(),
            external: Queue::new(),
        }
    }

    pub fn enqueue(&mut self, event: Event) {
        match event.origin {
            EventOrigin::Internal => self.internal.enqueue(event),
            EventOrigin::External => self.external.enqueue(event),
        }
    }

    /// Pops the next internal event, if any, without touching the external
    /// queue. Used to drive the microstep loop's internal-event branch.
    pub fn dequeue_internal(&mut self) -> Option<Event> {
        self.internal.dequeue()
    }

    pub fn dequeue_external(&mut self) -> Option<Event> {
        self.external.dequeue()
    }

    pub fn has_internal(&self) -> bool {
        !self.internal.is_empty()
    }
}

/// Matches an event name against a whitespace-separated descriptor list
/// (§4.E, §6 wire contract). A token `a.b` matches `a.b` exactly, or any name
/// beginning with `a.b.`; `*` matches anything.
pub fn event_matches(descriptors: &str, event_name: &str) -> bool {
    descriptors
        .split_whitespace()
        .any(|token| token_matches(token, event_name))
}

fn token_matches(token: &str, event_name: &str) -> bool {
    if token == "*" {
        return true;
    }
    if token == event_name {
        return true;
    }
    event_name
        .strip_prefix(token)
        .map(|rest| rest.starts_with('.'))
        .unwrap_or(false)
}
