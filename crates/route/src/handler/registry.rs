use crate::error::{AppError, SetupError, StateError};
use crate::handler::HandlerDescriptor;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Name to handler mapping, read-only once sealed.
///
/// The registry is sealed when the application starts; from then on it is shared by every
/// compiled pipeline and never mutated again.
#[derive(Debug, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<HandlerDescriptor>>,
    sealed: bool,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a handler under its descriptor's name.
    ///
    /// With `safe` set, registering a name twice is a [`SetupError::DuplicateHandler`];
    /// otherwise the last registration wins.
    pub fn register(&mut self, descriptor: HandlerDescriptor, safe: bool) -> Result<(), AppError> {
        if self.sealed {
            return Err(StateError::AlreadyStarted.into());
        }

        let name = descriptor.name().to_string();
        if safe && self.handlers.contains_key(&name) {
            return Err(SetupError::DuplicateHandler { name }.into());
        }

        let handler_type = descriptor.handler_type();
        if self.handlers.insert(name.clone(), Arc::new(descriptor)).is_some() {
            warn!(handler = %name, "replacing an already registered handler");
        }
        info!(handler = %name, kind = %handler_type, "registered handler");
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<HandlerDescriptor>> {
        self.handlers.get(name).cloned()
    }

    /// Like [`lookup`](Self::lookup), but a missing handler is a setup error naming it.
    pub fn resolve(&self, name: &str) -> Result<Arc<HandlerDescriptor>, SetupError> {
        self.lookup(name).ok_or_else(|| SetupError::unregistered(name))
    }

    pub fn seal(&mut self) {
        self.sealed = true;
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
