//! Compiled execution plans.
//!
//! A [`Pipeline`] is built once per route mapping by the [`PipelineCompiler`] and then shared,
//! read-only, by every request matched to that route.

mod compiler;

pub use compiler::PipelineCompiler;

use crate::handler::{HandlerDescriptor, HandlerType, Stage};
use std::sync::Arc;

/// The ordered handlers of one route, grouped by stage.
#[derive(Debug, Clone)]
pub struct Pipeline {
    pub(crate) pre_handlers: Vec<Arc<HandlerDescriptor>>,
    pub(crate) streaming_handler: Option<Arc<HandlerDescriptor>>,
    pub(crate) streaming_is_main: bool,
    pub(crate) data_handlers: Vec<Arc<HandlerDescriptor>>,
    pub(crate) main_handler: Option<Arc<HandlerDescriptor>>,
    pub(crate) response_handlers: Vec<Arc<HandlerDescriptor>>,
    pub(crate) max_length: usize,
}

impl Pipeline {
    pub fn pre_handlers(&self) -> &[Arc<HandlerDescriptor>] {
        &self.pre_handlers
    }

    pub fn streaming_handler(&self) -> Option<&Arc<HandlerDescriptor>> {
        self.streaming_handler.as_ref()
    }

    pub fn data_handlers(&self) -> &[Arc<HandlerDescriptor>] {
        &self.data_handlers
    }

    pub fn main_handler(&self) -> Option<&Arc<HandlerDescriptor>> {
        self.main_handler.as_ref()
    }

    pub fn response_handlers(&self) -> &[Arc<HandlerDescriptor>] {
        &self.response_handlers
    }

    /// Body cap in bytes for this route.
    pub fn max_length(&self) -> usize {
        self.max_length
    }

    /// Whether the request body has to be read before the main handler runs.
    pub fn needs_body(&self) -> bool {
        self.streaming_handler.is_some()
            || !self.data_handlers.is_empty()
            || self.main_handler.as_ref().is_some_and(|main| main.handler_type() == HandlerType::RequestData)
    }

    /// The hook stage of the streaming handler: `Main` when it came from `to`.
    pub fn streaming_stage(&self) -> Stage {
        if self.streaming_is_main { Stage::Main } else { Stage::Pre }
    }
}
