//! Lifecycle events.
//!
//! Listeners are informational: they observe the exchange at fixed points but never take part
//! in routing decisions. They run synchronously on the request's task, in registration order.

use crate::answer::Answer;
use crate::asked::Asked;
use crate::body::ResponseBody;
use crate::config::AppConfig;
use crate::error::ExecError;
use http::Response;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    RequestReceived,
    PreRoute,
    PreAnswer,
    PostAnswer,
    RouteNotFound,
    BodyTooLarge,
    Error,
    ServerStart,
    ServerClose,
}

impl EventKind {
    pub const ALL: [EventKind; 9] = [
        Self::RequestReceived,
        Self::PreRoute,
        Self::PreAnswer,
        Self::PostAnswer,
        Self::RouteNotFound,
        Self::BodyTooLarge,
        Self::Error,
        Self::ServerStart,
        Self::ServerClose,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::RequestReceived => "request-received",
            Self::PreRoute => "pre-route",
            Self::PreAnswer => "pre-answer",
            Self::PostAnswer => "post-answer",
            Self::RouteNotFound => "route-not-found",
            Self::BodyTooLarge => "body-too-large",
            Self::Error => "error",
            Self::ServerStart => "server-start",
            Self::ServerClose => "server-close",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A lifecycle event with the state it was fired with.
#[derive(Debug)]
pub enum Event<'a> {
    /// a request arrived, before it is matched to a route
    RequestReceived { asked: &'a Asked },
    /// a route matched, before its pipeline runs
    PreRoute { asked: &'a Asked, answer: &'a Answer },
    /// the pipeline finished, before the answer becomes a response
    PreAnswer { asked: &'a Asked, answer: &'a Answer },
    PostAnswer { asked: &'a Asked, response: &'a Response<ResponseBody> },
    RouteNotFound { asked: &'a Asked, answer: &'a Answer },
    /// a body chunk went over the route's cap
    BodyTooLarge { asked: &'a Asked, answer: &'a Answer, received: usize, max_length: usize },
    Error { asked: &'a Asked, answer: &'a Answer, error: &'a ExecError },
    ServerStart { config: &'a AppConfig, routes: usize },
    ServerClose,
}

impl Event<'_> {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::RequestReceived { .. } => EventKind::RequestReceived,
            Self::PreRoute { .. } => EventKind::PreRoute,
            Self::PreAnswer { .. } => EventKind::PreAnswer,
            Self::PostAnswer { .. } => EventKind::PostAnswer,
            Self::RouteNotFound { .. } => EventKind::RouteNotFound,
            Self::BodyTooLarge { .. } => EventKind::BodyTooLarge,
            Self::Error { .. } => EventKind::Error,
            Self::ServerStart { .. } => EventKind::ServerStart,
            Self::ServerClose => EventKind::ServerClose,
        }
    }
}

pub type Listener = Arc<dyn Fn(&Event<'_>) + Send + Sync>;

#[derive(Clone, Default)]
pub struct EventBus {
    listeners: HashMap<EventKind, Vec<Listener>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on<F>(&mut self, kind: EventKind, listener: F) -> &mut Self
    where
        F: Fn(&Event<'_>) + Send + Sync + 'static,
    {
        self.listeners.entry(kind).or_default().push(Arc::new(listener));
        self
    }

    /// Calls the listeners registered for the event's kind.
    pub fn emit(&self, event: &Event<'_>) {
        if let Some(listeners) = self.listeners.get(&event.kind()) {
            for listener in listeners {
                listener(event);
            }
        }
    }

    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.listeners.get(&kind).map_or(0, Vec::len)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for kind in EventKind::ALL {
            let count = self.listener_count(kind);
            if count > 0 {
                map.entry(&kind.as_str(), &count);
            }
        }
        map.finish()
    }
}
