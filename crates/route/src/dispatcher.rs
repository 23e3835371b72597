use crate::answer::Answer;
use crate::asked::{Asked, PathParams};
use crate::body::ResponseBody;
use crate::error::{BoxError, ExecError};
use crate::event::{Event, EventBus};
use crate::executor::{RequestExecutor, close_with_500};
use crate::handler::AnswerFn;
use crate::router::Router;
use bytes::Bytes;
use http::{Request, Response};
use http_body::Body;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, error};

/// Entry point for requests once the application has started.
///
/// A transport hands every request to [`Dispatcher::handle`] and writes back the returned
/// response. The dispatcher is immutable and can be shared across connections.
pub struct Dispatcher {
    router: Router,
    executor: RequestExecutor,
    not_found: AnswerFn,
    events: Arc<EventBus>,
    next_id: AtomicU64,
}

impl Dispatcher {
    pub fn new(router: Router, executor: RequestExecutor, not_found: AnswerFn, events: Arc<EventBus>) -> Self {
        Self { router, executor, not_found, events, next_id: AtomicU64::new(1) }
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub async fn handle<B>(&self, request: Request<B>) -> Response<ResponseBody>
    where
        B: Body<Data = Bytes> + Send,
        B::Error: Into<BoxError>,
    {
        let (parts, body) = request.into_parts();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut asked = Asked::new(id, parts, PathParams::empty());

        debug!(request_id = id, method = %asked.method(), uri = %asked.uri(), "request received");
        self.executor.notify(id, &Event::RequestReceived { asked: &asked });

        match self.router.at(asked.method(), asked.uri().path()) {
            Some(matched) => {
                let route = matched.route();
                asked.set_path_params(matched.into_params());
                self.executor.execute(route.pipeline(), route.context().clone(), asked, body).await
            }
            None => {
                let answer = self.answer_not_found(&asked);
                self.executor.finish(&asked, answer)
            }
        }
    }

    fn answer_not_found(&self, asked: &Asked) -> Answer {
        let mut answer = Answer::new();
        let handled = panic::catch_unwind(AssertUnwindSafe(|| {
            self.events.emit(&Event::RouteNotFound { asked, answer: &answer });
            (self.not_found)(asked, &mut answer);
        }));

        if let Err(payload) = handled {
            error!(request_id = asked.id(), cause = %ExecError::panicked(&*payload), "route not found handler panicked");
            answer = Answer::new();
            close_with_500(&mut answer);
        }
        answer
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("router", &self.router)
            .field("executor", &self.executor)
            .field("next_id", &self.next_id)
            .finish_non_exhaustive()
    }
}
