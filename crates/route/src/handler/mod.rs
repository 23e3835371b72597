//! Named, typed units of request processing.
//!
//! A [`Handler`] is a closed sum type over the four stages a handler can take part in:
//!
//! | variant | wire tag | runs |
//! |---|---|---|
//! | [`Handler::Request`] | `request` | before the body is read |
//! | [`Handler::RequestDataStream`] | `requestDataStream` | once per body chunk, at most one per route |
//! | [`Handler::RequestData`] | `requestData` | after the whole body is buffered |
//! | [`Handler::Response`] | `response` | after the main handler |
//!
//! Handlers are registered by name into a [`HandlerRegistry`] wrapped in a
//! [`HandlerDescriptor`], and route mappings refer to them only by that name.

mod defaults;
mod registry;
mod runner;

pub use defaults::{internal_error, not_found, payload_too_large};
pub use registry::HandlerRegistry;
pub use runner::{HandlerHooks, HandlerRunner, HookFn, HookSlot, Stage};

use crate::answer::Answer;
use crate::asked::Asked;
use crate::context::RouteContext;
use crate::error::{BoxError, HandlerResult, SetupError};
use bytes::Bytes;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// A plain handler callable, shared by the request, request-data and response kinds.
pub type RequestFn = Arc<dyn Fn(&mut Asked, &mut Answer, &RouteContext) -> HandlerResult + Send + Sync>;

/// Receives one body chunk at a time.
pub type ChunkFn = Arc<dyn Fn(&mut Asked, &mut Answer, &RouteContext, Bytes) -> HandlerResult + Send + Sync>;

/// Designated handler with access to the answer only, used for errors and missing routes.
pub type AnswerFn = Arc<dyn Fn(&Asked, &mut Answer) + Send + Sync>;

/// Designated handler told about a body exceeding the route's cap.
pub type OverflowFn = Arc<dyn Fn(&Asked, &mut Answer, &RouteContext) + Send + Sync>;

/// The kind of a handler without its callable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandlerType {
    Request,
    RequestDataStream,
    RequestData,
    Response,
}

impl HandlerType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Request => "request",
            Self::RequestDataStream => "requestDataStream",
            Self::RequestData => "requestData",
            Self::Response => "response",
        }
    }

    /// Handlers of these kinds need the request body to be read.
    pub fn reads_body(self) -> bool {
        matches!(self, Self::RequestDataStream | Self::RequestData)
    }
}

impl fmt::Display for HandlerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HandlerType {
    type Err = SetupError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" | "request" => Ok(Self::Request),
            "requestDataStream" => Ok(Self::RequestDataStream),
            "requestData" => Ok(Self::RequestData),
            "response" => Ok(Self::Response),
            other => Err(SetupError::UnknownHandlerType { tag: other.to_string() }),
        }
    }
}

#[derive(Clone)]
pub enum Handler {
    Request(RequestFn),
    RequestDataStream(StreamHandler),
    RequestData(RequestFn),
    Response(RequestFn),
}

impl Handler {
    pub fn request<F>(f: F) -> Self
    where
        F: Fn(&mut Asked, &mut Answer, &RouteContext) -> HandlerResult + Send + Sync + 'static,
    {
        Self::Request(Arc::new(f))
    }

    pub fn request_data<F>(f: F) -> Self
    where
        F: Fn(&mut Asked, &mut Answer, &RouteContext) -> HandlerResult + Send + Sync + 'static,
    {
        Self::RequestData(Arc::new(f))
    }

    pub fn response<F>(f: F) -> Self
    where
        F: Fn(&mut Asked, &mut Answer, &RouteContext) -> HandlerResult + Send + Sync + 'static,
    {
        Self::Response(Arc::new(f))
    }

    pub fn stream(stream_handler: StreamHandler) -> Self {
        Self::RequestDataStream(stream_handler)
    }

    pub fn handler_type(&self) -> HandlerType {
        match self {
            Self::Request(_) => HandlerType::Request,
            Self::RequestDataStream(_) => HandlerType::RequestDataStream,
            Self::RequestData(_) => HandlerType::RequestData,
            Self::Response(_) => HandlerType::Response,
        }
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RequestDataStream(stream) => stream.fmt(f),
            other => write!(f, "Handler::{}", other.handler_type()),
        }
    }
}

/// The single handler of a route allowed to observe body chunks as they arrive.
///
/// The optional `before` hook runs before the first chunk is read and may answer to skip body
/// reading entirely; the optional `after` hook runs once the body has ended.
#[derive(Clone)]
pub struct StreamHandler {
    on_chunk: ChunkFn,
    before: Option<RequestFn>,
    after: Option<RequestFn>,
}

impl StreamHandler {
    pub fn new<F>(on_chunk: F) -> Self
    where
        F: Fn(&mut Asked, &mut Answer, &RouteContext, Bytes) -> HandlerResult + Send + Sync + 'static,
    {
        Self { on_chunk: Arc::new(on_chunk), before: None, after: None }
    }

    pub fn before<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut Asked, &mut Answer, &RouteContext) -> HandlerResult + Send + Sync + 'static,
    {
        self.before = Some(Arc::new(f));
        self
    }

    pub fn after<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut Asked, &mut Answer, &RouteContext) -> HandlerResult + Send + Sync + 'static,
    {
        self.after = Some(Arc::new(f));
        self
    }

    pub fn before_hook(&self) -> Option<&RequestFn> {
        self.before.as_ref()
    }

    pub fn after_hook(&self) -> Option<&RequestFn> {
        self.after.as_ref()
    }

    pub(crate) fn on_chunk(&self, asked: &mut Asked, answer: &mut Answer, route: &RouteContext, chunk: Bytes) -> HandlerResult {
        (self.on_chunk)(asked, answer, route, chunk)
    }
}

impl fmt::Debug for StreamHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamHandler")
            .field("before", &self.before.is_some())
            .field("after", &self.after.is_some())
            .finish_non_exhaustive()
    }
}

/// A handler registered under a name.
///
/// Handlers marked as parallel run without the global before/after instrumentation hooks.
#[derive(Clone)]
pub struct HandlerDescriptor {
    name: String,
    handler: Handler,
    parallel: bool,
}

impl HandlerDescriptor {
    pub fn new(name: impl Into<String>, handler: Handler) -> Self {
        Self { name: name.into(), handler, parallel: false }
    }

    pub fn in_parallel(mut self) -> Self {
        self.parallel = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn handler(&self) -> &Handler {
        &self.handler
    }

    pub fn handler_type(&self) -> HandlerType {
        self.handler.handler_type()
    }

    pub fn is_parallel(&self) -> bool {
        self.parallel
    }

    pub fn as_stream(&self) -> Option<&StreamHandler> {
        match &self.handler {
            Handler::RequestDataStream(stream) => Some(stream),
            _ => None,
        }
    }

    /// Calls the handler with the whole exchange.
    ///
    /// Streaming handlers only consume chunks, calling one this way is an error.
    pub(crate) fn invoke(&self, asked: &mut Asked, answer: &mut Answer, route: &RouteContext) -> HandlerResult {
        match &self.handler {
            Handler::Request(f) | Handler::RequestData(f) | Handler::Response(f) => f(asked, answer, route),
            Handler::RequestDataStream(_) => {
                let e: BoxError = format!("request stream handler `{}` can only consume body chunks", self.name).into();
                Err(e)
            }
        }
    }
}

impl fmt::Debug for HandlerDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerDescriptor")
            .field("name", &self.name)
            .field("type", &self.handler_type())
            .field("parallel", &self.parallel)
            .finish()
    }
}
