//! Declarative HTTP routing compiled into handler pipelines
//!
//! Routes are plain records: a method, a path, an optional environment allow-list and the
//! names of the handlers to run. Handlers are registered by name, and each route is compiled
//! once, when the application starts, into an immutable [`Pipeline`]. Every request matched to
//! the route then runs through the same plan:
//!
//! - pre-handlers (`after`)
//! - the request body, streamed chunk by chunk to a single streaming handler or buffered for
//!   buffered-data handlers, capped at the route's `maxLength`
//! - the main handler (`to`)
//! - response handlers (`then`)
//!
//! Any handler may answer the request, which ends the pipeline. Handler errors, panics and
//! transport errors are diverted to one error handler; bodies over the cap go to the overflow
//! handler.
//!
//! # Example
//!
//! ```no_run
//! use bytes::Bytes;
//! use http::Request;
//! use http_body_util::Full;
//! use micro_route::{App, Handler, RouteMapping};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     let mut app = App::from_env();
//!     app.handler("auth", Handler::request(|asked, answer, _| {
//!         if !asked.headers().contains_key(http::header::AUTHORIZATION) {
//!             answer.status(http::StatusCode::UNAUTHORIZED).send("who are you?");
//!         }
//!         Ok(())
//!     }))?
//!     .handler("echo", Handler::request_data(|asked, answer, _| {
//!         answer.send(asked.body().cloned().unwrap_or_default());
//!         Ok(())
//!     }))?;
//!     app.route(RouteMapping::new("/echo").when("POST").after(["auth"]).to("echo"))?;
//!
//!     let dispatcher = app.start()?;
//!     let request = Request::post("/echo").body(Full::new(Bytes::from("hello")))?;
//!     let response = dispatcher.handle(request).await;
//!     println!("{}", response.status());
//!     Ok(())
//! }
//! ```

mod answer;
mod app;
mod asked;
mod context;
mod dispatcher;
mod error;
mod executor;
mod mapping;
mod utils;

pub mod body;
pub mod config;
pub mod event;
pub mod handler;
pub mod pipeline;
pub mod router;

pub use answer::{Answer, AnswerData};
pub use app::{App, AppState};
pub use asked::{Asked, PathParams};
pub use body::{BodyReader, ChunkOutcome, ResponseBody};
pub use config::{AppConfig, OverflowNotify};
pub use context::{Flow, RequestContext, RouteContext};
pub use dispatcher::Dispatcher;
pub use error::{AppError, BoxError, ExecError, HandlerResult, SetupError, StateError};
pub use event::{Event, EventBus, EventKind};
pub use executor::RequestExecutor;
pub use handler::{Handler, HandlerDescriptor, HandlerRegistry, HandlerType, StreamHandler};
pub use mapping::{RouteMapping, load_routes_json};
pub use pipeline::{Pipeline, PipelineCompiler};
pub use router::Router;
