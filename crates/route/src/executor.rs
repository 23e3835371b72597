//! Runs a compiled [`Pipeline`] against one request.
//!
//! Stages run strictly in order and each one may end the request by answering it:
//!
//! 1. pre-handlers
//! 2. body reading, only when the pipeline needs the body: the streaming handler's `before`
//!    hook, the body chunks, its `after` hook, then the buffered-data handlers
//! 3. the main handler
//! 4. response handlers
//!
//! A handler error, a handler panic or a transport error while reading the body diverts the
//! request to the error handler; no further stage runs after that.

use crate::answer::Answer;
use crate::asked::Asked;
use crate::body::{BodyReader, ChunkOutcome, ResponseBody};
use crate::config::OverflowNotify;
use crate::context::{Flow, RequestContext, RouteContext};
use crate::error::{BoxError, ExecError};
use crate::event::{Event, EventBus};
use crate::handler::{AnswerFn, HandlerRunner, OverflowFn, Stage, StreamHandler};
use crate::pipeline::Pipeline;
use bytes::Bytes;
use futures::FutureExt;
use http::{Response, StatusCode};
use http_body::Body;
use http_body_util::BodyExt;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::pin::pin;
use std::sync::Arc;
use tracing::{debug, error};

pub struct RequestExecutor {
    runner: HandlerRunner,
    events: Arc<EventBus>,
    error_handler: AnswerFn,
    overflow_handler: OverflowFn,
    overflow_notify: OverflowNotify,
}

impl RequestExecutor {
    pub fn new(
        runner: HandlerRunner,
        events: Arc<EventBus>,
        error_handler: AnswerFn,
        overflow_handler: OverflowFn,
        overflow_notify: OverflowNotify,
    ) -> Self {
        Self { runner, events, error_handler, overflow_handler, overflow_notify }
    }

    /// Executes `pipeline` and converts the resulting answer into a response.
    ///
    /// Never fails: errors end up in the error handler, which decides what the client sees.
    pub async fn execute<B>(&self, pipeline: &Pipeline, route: RouteContext, asked: Asked, body: B) -> Response<ResponseBody>
    where
        B: Body<Data = Bytes> + Send,
        B::Error: Into<BoxError>,
    {
        let mut ctx = RequestContext::new(asked, route);

        let stages = async {
            self.events.emit(&Event::PreRoute { asked: &ctx.asked, answer: &ctx.answer });
            self.run_stages(pipeline, &mut ctx, body).await
        };
        let result = match AssertUnwindSafe(stages).catch_unwind().await {
            Ok(result) => result,
            Err(payload) => Err(ExecError::panicked(&*payload)),
        };

        if let Err(e) = result {
            self.fail(&mut ctx, e);
        }

        let (asked, answer) = ctx.into_parts();
        self.finish(&asked, answer)
    }

    async fn run_stages<B>(&self, pipeline: &Pipeline, ctx: &mut RequestContext, body: B) -> Result<(), ExecError>
    where
        B: Body<Data = Bytes>,
        B::Error: Into<BoxError>,
    {
        if self.runner.run_all(Stage::Pre, pipeline.pre_handlers(), ctx)?.is_answered() {
            debug!(request_id = ctx.asked.id(), "answered by a pre-handler");
            return Ok(());
        }

        if pipeline.needs_body() {
            if self.read_body(pipeline, ctx, body).await?.is_answered() {
                debug!(request_id = ctx.asked.id(), "answered while reading the body");
                return Ok(());
            }

            if self.runner.run_all(Stage::Pre, pipeline.data_handlers(), ctx)?.is_answered() {
                debug!(request_id = ctx.asked.id(), "answered by a data handler");
                return Ok(());
            }
        }

        if let Some(main) = pipeline.main_handler()
            && self.runner.run(Stage::Main, main, ctx)?.is_answered()
        {
            return Ok(());
        }

        self.runner.run_all(Stage::Post, pipeline.response_handlers(), ctx)?;
        Ok(())
    }

    async fn read_body<B>(&self, pipeline: &Pipeline, ctx: &mut RequestContext, body: B) -> Result<Flow, ExecError>
    where
        B: Body<Data = Bytes>,
        B::Error: Into<BoxError>,
    {
        let stage = pipeline.streaming_stage();
        let streaming = pipeline.streaming_handler().map(Arc::as_ref);

        if let Some(descriptor) = streaming
            && let Some(before) = descriptor.as_stream().and_then(StreamHandler::before_hook)
            && self.runner.run_with(stage, descriptor, ctx, before)?.is_answered()
        {
            debug!(request_id = ctx.asked.id(), handler = descriptor.name(), "answered before the body was read");
            return Ok(Flow::Answered);
        }

        let mut reader = BodyReader::new(pipeline.max_length(), streaming, &self.overflow_handler, self.overflow_notify);
        let mut body = pin!(body);

        while let Some(frame) = body.frame().await {
            let frame = frame.map_err(ExecError::transport)?;
            // trailers carry no payload
            let Ok(chunk) = frame.into_data() else {
                continue;
            };

            if reader.on_chunk(chunk, ctx)? == ChunkOutcome::Overflowed {
                self.events.emit(&Event::BodyTooLarge {
                    asked: &ctx.asked,
                    answer: &ctx.answer,
                    received: reader.received(),
                    max_length: pipeline.max_length(),
                });
            }

            if ctx.answer.answered() {
                debug!(request_id = ctx.asked.id(), seen = reader.seen(), "answered during body reading, dropping the rest");
                return Ok(Flow::Answered);
            }
        }

        reader.on_end(ctx, &self.runner, stage)
    }

    fn fail(&self, ctx: &mut RequestContext, e: ExecError) {
        debug!(request_id = ctx.asked.id(), route = %ctx.route.route(), cause = %e, "request failed");

        ctx.answer.set_route_context(ctx.route.clone());
        ctx.answer.set_error(e);

        if let Some(error) = ctx.answer.error() {
            self.notify(ctx.asked.id(), &Event::Error { asked: &ctx.asked, answer: &ctx.answer, error });
        }

        let handled = panic::catch_unwind(AssertUnwindSafe(|| (self.error_handler)(&ctx.asked, &mut ctx.answer)));
        if let Err(payload) = handled {
            error!(request_id = ctx.asked.id(), cause = %ExecError::panicked(&*payload), "error handler panicked");
        }

        if !ctx.answer.answered() {
            close_with_500(&mut ctx.answer);
        }
    }

    /// Emits `event`, logging a panicking listener instead of unwinding into the caller.
    pub(crate) fn notify(&self, request_id: u64, event: &Event<'_>) {
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| self.events.emit(event))) {
            error!(request_id, event = event.kind().as_str(), cause = %ExecError::panicked(&*payload), "event listener panicked");
        }
    }

    /// Fires the answer events around the conversion of `answer` into a response.
    pub(crate) fn finish(&self, asked: &Asked, answer: Answer) -> Response<ResponseBody> {
        self.notify(asked.id(), &Event::PreAnswer { asked, answer: &answer });
        let response = answer.into_response();
        self.notify(asked.id(), &Event::PostAnswer { asked, response: &response });

        debug!(request_id = asked.id(), status = %response.status(), "request finished");
        response
    }
}

/// The fallback answer of a request whose failure was not answered.
pub(crate) fn close_with_500(answer: &mut Answer) {
    answer.status(StatusCode::INTERNAL_SERVER_ERROR);
    answer.close("");
}

impl fmt::Debug for RequestExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestExecutor")
            .field("runner", &self.runner)
            .field("events", &self.events)
            .field("overflow_notify", &self.overflow_notify)
            .finish_non_exhaustive()
    }
}
