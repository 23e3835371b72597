use std::error::Error;
use thiserror::Error;

/// Error type returned by handlers and carried by the transport's body stream.
pub type BoxError = Box<dyn Error + Send + Sync>;

/// Result of a single handler invocation.
pub type HandlerResult = Result<(), BoxError>;

/// Structural problems found while registering handlers or compiling route mappings.
///
/// These are fatal to application startup and never occur once requests are served.
#[derive(Error, Debug)]
pub enum SetupError {
    #[error("Unregistered handler `{name}`")]
    UnregisteredHandler { name: String },

    #[error("handler `{name}` is already registered")]
    DuplicateHandler { name: String },

    #[error("unknown handler type `{tag}`")]
    UnknownHandlerType { tag: String },

    #[error("mapping error on {route}: request stream handler `{name}` must precede data handlers")]
    StreamAfterData { route: String, name: String },

    #[error("mapping error on {route}: only one request-stream handler per mapping allowed, `{name}` is another one")]
    DuplicateStreamHandler { route: String, name: String },

    #[error("mapping error on {route}: wrong stage for `{name}`; only response handlers allowed here")]
    NotResponseHandler { route: String, name: String },

    #[error(
        "mapping error on {route}: `{name}` reads the request body; set always_read_request_payload to read the payload of {method} requests"
    )]
    BodyOnBodilessMethod { route: String, name: String, method: String },

    #[error("invalid route {route}: {reason}")]
    InvalidRoute { route: String, reason: String },

    #[error("invalid route mappings: {source}")]
    InvalidMappings {
        #[from]
        source: serde_json::Error,
    },
}

impl SetupError {
    pub fn unregistered<S: ToString>(name: S) -> Self {
        Self::UnregisteredHandler { name: name.to_string() }
    }

    pub fn invalid_route<R: ToString, S: ToString>(route: R, reason: S) -> Self {
        Self::InvalidRoute { route: route.to_string(), reason: reason.to_string() }
    }
}

/// Misuse of the application lifecycle.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateError {
    #[error("application has already been started, complete the setup before starting it")]
    AlreadyStarted,

    #[error("application has not been started")]
    NotStarted,

    #[error("application has been closed")]
    Closed,
}

/// Error returned by the setup surface of [`App`](crate::App).
#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Setup(#[from] SetupError),

    #[error(transparent)]
    State(#[from] StateError),
}

/// A failure while executing a pipeline for one request.
///
/// It is attached to the [`Answer`](crate::Answer) before the error handler runs.
#[derive(Error, Debug)]
pub enum ExecError {
    #[error("handler `{name}` failed: {source}")]
    Handler { name: String, source: BoxError },

    #[error("transport error: {source}")]
    Transport { source: BoxError },

    #[error("handler panicked: {message}")]
    Panicked { message: String },
}

impl ExecError {
    pub fn handler<S: ToString>(name: S, source: BoxError) -> Self {
        Self::Handler { name: name.to_string(), source }
    }

    pub fn transport<E: Into<BoxError>>(e: E) -> Self {
        Self::Transport { source: e.into() }
    }

    pub fn panicked(payload: &(dyn std::any::Any + Send)) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic payload".to_string());
        Self::Panicked { message }
    }

    /// The error raised by the handler or transport, if any.
    pub fn cause(&self) -> Option<&(dyn Error + Send + Sync + 'static)> {
        match self {
            Self::Handler { source, .. } | Self::Transport { source } => Some(source.as_ref()),
            Self::Panicked { .. } => None,
        }
    }
}
