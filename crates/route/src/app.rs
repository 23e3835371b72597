//! Application setup and lifecycle.
//!
//! An [`App`] collects handlers, route mappings, hooks and event listeners while it is being
//! set up. [`App::start`] compiles every route once, seals the registry and hands back the
//! [`Dispatcher`] serving requests; from then on the setup surface only returns
//! [`StateError::AlreadyStarted`].

use crate::answer::Answer;
use crate::asked::Asked;
use crate::config::AppConfig;
use crate::context::RouteContext;
use crate::dispatcher::Dispatcher;
use crate::error::{AppError, StateError};
use crate::event::{Event, EventBus, EventKind};
use crate::executor::RequestExecutor;
use crate::handler::{
    AnswerFn, Handler, HandlerDescriptor, HandlerHooks, HandlerRegistry, HandlerRunner, HookSlot, OverflowFn,
    internal_error, not_found, payload_too_large,
};
use crate::mapping::{RouteMapping, load_routes_json};
use crate::pipeline::PipelineCompiler;
use crate::router::{CompiledRoute, Router};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppState {
    Created,
    Started,
    Closed,
}

pub struct App {
    config: AppConfig,
    state: AppState,
    registry: HandlerRegistry,
    routes: Vec<RouteMapping>,
    hooks: HandlerHooks,
    events: EventBus,
    error_handler: AnswerFn,
    overflow_handler: OverflowFn,
    not_found_handler: AnswerFn,
    running: Option<Arc<EventBus>>,
}

impl App {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            state: AppState::Created,
            registry: HandlerRegistry::new(),
            routes: vec![],
            hooks: HandlerHooks::new(),
            events: EventBus::new(),
            error_handler: Arc::new(internal_error),
            overflow_handler: Arc::new(payload_too_large),
            not_found_handler: Arc::new(not_found),
            running: None,
        }
    }

    /// An application with default settings, its profile read from the environment.
    pub fn from_env() -> Self {
        Self::new(AppConfig::from_env())
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn state(&self) -> AppState {
        self.state
    }

    fn ensure_setup(&self) -> Result<(), StateError> {
        match self.state {
            AppState::Created => Ok(()),
            AppState::Started => Err(StateError::AlreadyStarted),
            AppState::Closed => Err(StateError::Closed),
        }
    }

    /// Registers `handler` under `name`, replacing any handler registered with that name.
    pub fn handler(&mut self, name: impl Into<String>, handler: Handler) -> Result<&mut Self, AppError> {
        self.register(HandlerDescriptor::new(name, handler), false)
    }

    /// Registers `handler` under `name`, failing if the name is taken.
    pub fn handler_safe(&mut self, name: impl Into<String>, handler: Handler) -> Result<&mut Self, AppError> {
        self.register(HandlerDescriptor::new(name, handler), true)
    }

    pub fn register(&mut self, descriptor: HandlerDescriptor, safe: bool) -> Result<&mut Self, AppError> {
        self.ensure_setup()?;
        self.registry.register(descriptor, safe)?;
        Ok(self)
    }

    /// Adds a route mapping, skipped when its environment list excludes the active profile.
    pub fn route(&mut self, mapping: RouteMapping) -> Result<&mut Self, StateError> {
        self.ensure_setup()?;
        if self.config.is_active_in(mapping.environments.as_deref()) {
            self.routes.push(mapping);
        } else {
            debug!(route = %mapping, profile = ?self.config.profile, "route not mapped in the active profile");
        }
        Ok(self)
    }

    pub fn routes<I>(&mut self, mappings: I) -> Result<&mut Self, StateError>
    where
        I: IntoIterator<Item = RouteMapping>,
    {
        for mapping in mappings {
            self.route(mapping)?;
        }
        Ok(self)
    }

    /// Adds the route mappings of a JSON document, see [`load_routes_json`].
    pub fn routes_from_json(&mut self, json: &str) -> Result<&mut Self, AppError> {
        self.ensure_setup()?;
        let mappings = load_routes_json(json)?;
        Ok(self.routes(mappings)?)
    }

    /// Calls `f` before every non-parallel handler of the stages covered by `slot`.
    pub fn before_handler<F>(&mut self, slot: HookSlot, f: F) -> Result<&mut Self, StateError>
    where
        F: Fn(&Asked, &str) + Send + Sync + 'static,
    {
        self.ensure_setup()?;
        self.hooks.before(slot, f);
        Ok(self)
    }

    /// Calls `f` after every non-parallel handler of the stages covered by `slot`.
    pub fn after_handler<F>(&mut self, slot: HookSlot, f: F) -> Result<&mut Self, StateError>
    where
        F: Fn(&Asked, &str) + Send + Sync + 'static,
    {
        self.ensure_setup()?;
        self.hooks.after(slot, f);
        Ok(self)
    }

    pub fn on<F>(&mut self, kind: EventKind, listener: F) -> Result<&mut Self, StateError>
    where
        F: Fn(&Event<'_>) + Send + Sync + 'static,
    {
        self.ensure_setup()?;
        self.events.on(kind, listener);
        Ok(self)
    }

    /// Replaces the handler told about failed requests.
    ///
    /// The failure is available through [`Answer::error`]. When the handler leaves the
    /// answer unanswered, an empty 500 is sent.
    pub fn set_error_handler<F>(&mut self, f: F) -> Result<&mut Self, StateError>
    where
        F: Fn(&Asked, &mut Answer) + Send + Sync + 'static,
    {
        self.ensure_setup()?;
        self.error_handler = Arc::new(f);
        Ok(self)
    }

    pub fn set_overflow_handler<F>(&mut self, f: F) -> Result<&mut Self, StateError>
    where
        F: Fn(&Asked, &mut Answer, &RouteContext) + Send + Sync + 'static,
    {
        self.ensure_setup()?;
        self.overflow_handler = Arc::new(f);
        Ok(self)
    }

    pub fn set_route_not_found_handler<F>(&mut self, f: F) -> Result<&mut Self, StateError>
    where
        F: Fn(&Asked, &mut Answer) + Send + Sync + 'static,
    {
        self.ensure_setup()?;
        self.not_found_handler = Arc::new(f);
        Ok(self)
    }

    /// Compiles every route and returns the dispatcher serving them.
    ///
    /// Any invalid mapping aborts the start and leaves the application in setup.
    pub fn start(&mut self) -> Result<Arc<Dispatcher>, AppError> {
        self.ensure_setup()?;

        let config = Arc::new(self.config.clone());
        let compiler = PipelineCompiler::new(&self.registry, &config);
        let mut builder = Router::builder();
        for mapping in &self.routes {
            let pipeline = compiler.compile(mapping)?;
            let context = RouteContext::new(Arc::clone(&config), Arc::new(mapping.clone()));
            builder = builder.route(CompiledRoute::new(context, pipeline));
        }
        let router = builder.build()?;

        self.registry.seal();
        self.state = AppState::Started;

        let events = Arc::new(self.events.clone());
        let executor = RequestExecutor::new(
            HandlerRunner::new(self.hooks.clone()),
            Arc::clone(&events),
            Arc::clone(&self.error_handler),
            Arc::clone(&self.overflow_handler),
            self.config.overflow_notify,
        );

        info!(routes = router.len(), handlers = self.registry.len(), profile = ?self.config.profile, "application started");
        events.emit(&Event::ServerStart { config: &self.config, routes: router.len() });
        self.running = Some(Arc::clone(&events));

        Ok(Arc::new(Dispatcher::new(router, executor, Arc::clone(&self.not_found_handler), events)))
    }

    /// Marks the application closed and fires the close event.
    pub fn close(&mut self) -> Result<(), StateError> {
        match self.state {
            AppState::Created => Err(StateError::NotStarted),
            AppState::Closed => Err(StateError::Closed),
            AppState::Started => {
                self.state = AppState::Closed;
                if let Some(events) = self.running.take() {
                    events.emit(&Event::ServerClose);
                }
                info!("application closed");
                Ok(())
            }
        }
    }
}

impl Default for App {
    fn default() -> Self {
        Self::new(AppConfig::default())
    }
}

impl fmt::Debug for App {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("App")
            .field("config", &self.config)
            .field("state", &self.state)
            .field("registry", &self.registry)
            .field("routes", &self.routes)
            .field("hooks", &self.hooks)
            .field("events", &self.events)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SetupError;
    use crate::handler::StreamHandler;
    use bytes::Bytes;
    use http::header::CONNECTION;
    use http::{Method, Request, Response, StatusCode};
    use http_body_util::{BodyExt, Empty, Full};
    use std::sync::Mutex;
    use tracing::Level;

    fn init_tracing() {
        let _ = tracing_subscriber::fmt().with_max_level(Level::DEBUG).with_test_writer().try_init();
    }

    fn noop() -> Handler {
        Handler::request(|_, _, _| Ok(()))
    }

    async fn body_of(response: Response<crate::ResponseBody>) -> Bytes {
        response.into_body().collect().await.unwrap().to_bytes()
    }

    #[test]
    fn setup_is_rejected_after_start() {
        let mut app = App::default();
        app.handler("pong", noop()).unwrap().route(RouteMapping::new("/ping").to("pong")).unwrap();
        app.start().unwrap();
        assert_eq!(app.state(), AppState::Started);

        assert!(matches!(app.handler("late", noop()), Err(AppError::State(StateError::AlreadyStarted))));
        assert_eq!(app.route(RouteMapping::new("/late")).unwrap_err(), StateError::AlreadyStarted);
        assert_eq!(app.before_handler(HookSlot::Each, |_, _| {}).unwrap_err(), StateError::AlreadyStarted);
        assert_eq!(app.on(EventKind::Error, |_| {}).unwrap_err(), StateError::AlreadyStarted);
        assert_eq!(app.set_error_handler(|_, _| {}).unwrap_err(), StateError::AlreadyStarted);
        assert!(matches!(app.start(), Err(AppError::State(StateError::AlreadyStarted))));
    }

    #[test]
    fn lifecycle_events_and_close() {
        let seen = Arc::new(Mutex::new(vec![]));
        let mut app = App::default();
        for kind in [EventKind::ServerStart, EventKind::ServerClose] {
            let seen = Arc::clone(&seen);
            app.on(kind, move |event| {
                let routes = match event {
                    Event::ServerStart { routes, .. } => *routes,
                    _ => 0,
                };
                seen.lock().unwrap().push((event.kind(), routes));
            })
            .unwrap();
        }
        assert_eq!(app.close().unwrap_err(), StateError::NotStarted);

        app.handler("pong", noop()).unwrap();
        app.routes([RouteMapping::new("/a").to("pong"), RouteMapping::new("/b").to("pong")]).unwrap();
        app.start().unwrap();
        app.close().unwrap();

        assert_eq!(app.state(), AppState::Closed);
        assert_eq!(app.close().unwrap_err(), StateError::Closed);
        assert!(matches!(app.start(), Err(AppError::State(StateError::Closed))));
        assert_eq!(*seen.lock().unwrap(), vec![(EventKind::ServerStart, 2), (EventKind::ServerClose, 0)]);
    }

    #[test]
    fn invalid_mapping_aborts_start() {
        let mut app = App::default();
        app.handler("auth", noop()).unwrap().route(RouteMapping::new("/x").after(["auth"]).to("missing")).unwrap();

        let err = app.start().unwrap_err();
        assert!(matches!(err, AppError::Setup(SetupError::UnregisteredHandler { ref name }) if name == "missing"));
        assert_eq!(app.state(), AppState::Created);
    }

    #[test]
    fn duplicate_safe_registration_fails() {
        let mut app = App::default();
        app.handler_safe("auth", noop()).unwrap();
        assert!(matches!(app.handler_safe("auth", noop()), Err(AppError::Setup(SetupError::DuplicateHandler { .. }))));
        assert!(app.handler("auth", noop()).is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn routes_follow_the_active_profile() {
        let mut app = App::new(AppConfig::default().profile("dev"));
        app.handler("pong", Handler::request(|_, answer, _| {
            answer.send("pong");
            Ok(())
        }))
        .unwrap();
        app.routes_from_json(
            r#"[
                {"route": {"uri": "/dev", "in": ["dev", "test"], "to": "pong"}},
                {"route": {"uri": "/prod", "in": ["prod"], "to": "pong"}},
                {"route": {"uri": "/all", "to": "pong"}}
            ]"#,
        )
        .unwrap();
        let dispatcher = app.start().unwrap();
        assert_eq!(dispatcher.router().len(), 2);

        let get = |uri: &str| Request::builder().uri(uri).body(Empty::<Bytes>::new()).unwrap();
        assert_eq!(dispatcher.handle(get("/dev")).await.status(), StatusCode::OK);
        assert_eq!(dispatcher.handle(get("/all")).await.status(), StatusCode::OK);
        assert_eq!(dispatcher.handle(get("/prod")).await.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn full_exchange_with_hooks() {
        init_tracing();
        let log = Arc::new(Mutex::new(Vec::<String>::new()));
        let mut app = App::default();

        let hook_log = Arc::clone(&log);
        app.before_handler(HookSlot::Each, move |_, name| hook_log.lock().unwrap().push(format!("> {name}"))).unwrap();

        let audit_log = Arc::clone(&log);
        app.register(
            HandlerDescriptor::new(
                "audit",
                Handler::request(move |_, _, _| {
                    audit_log.lock().unwrap().push("audit".into());
                    Ok(())
                }),
            )
            .in_parallel(),
            false,
        )
        .unwrap();
        app.handler("readJson", Handler::request_data(|asked, answer, _| {
            let body = asked.body().ok_or("body not read")?;
            let value: serde_json::Value = serde_json::from_slice(body)?;
            answer.set_data(value);
            Ok(())
        }))
        .unwrap()
        .handler("echo", Handler::request(|_, answer, _| {
            answer.status(StatusCode::CREATED);
            Ok(())
        }))
        .unwrap()
        .handler("finish", Handler::response(|_, answer, _| {
            answer.end();
            Ok(())
        }))
        .unwrap();
        app.route(RouteMapping::new("/echo").when("post").after(["audit", "readJson"]).to("echo").then(["finish"]))
            .unwrap();

        let dispatcher = app.start().unwrap();
        let response = dispatcher
            .handle(Request::builder().method(Method::POST).uri("/echo/").body(Full::new(Bytes::from(r#"{"x": 1}"#))).unwrap())
            .await;

        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(body_of(response).await, r#"{"x":1}"#);
        assert_eq!(*log.lock().unwrap(), vec!["audit", "> readJson", "> echo", "> finish"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn custom_designated_handlers() {
        let mut app = App::default();
        app.handler("fail", Handler::request(|_, _, _| Err("broken".into())))
            .unwrap()
            .handler("upload", Handler::stream(StreamHandler::new(|_, _, _, _| Ok(()))))
            .unwrap()
            .route(RouteMapping::new("/fail").to("fail"))
            .unwrap()
            .route(RouteMapping::new("/upload").when("PUT").to("upload").max_length(1))
            .unwrap();
        app.set_error_handler(|_, answer| {
            let message = answer.error().map(ToString::to_string).unwrap_or_default();
            answer.status(StatusCode::SERVICE_UNAVAILABLE).send(message);
        })
        .unwrap()
        .set_overflow_handler(|_, answer, route| {
            let message = format!("limit {}", route.route().max_length.unwrap_or_default());
            answer.status(StatusCode::PAYLOAD_TOO_LARGE).close(message);
        })
        .unwrap()
        .set_route_not_found_handler(|asked, answer| {
            answer.status(StatusCode::GONE).send(format!("{} is gone", asked.uri().path()));
        })
        .unwrap();
        let dispatcher = app.start().unwrap();

        let response = dispatcher.handle(Request::builder().uri("/fail").body(Empty::<Bytes>::new()).unwrap()).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body_of(response).await, "handler `fail` failed: broken");

        let response = dispatcher
            .handle(Request::builder().method(Method::PUT).uri("/upload").body(Full::new(Bytes::from("too big"))).unwrap())
            .await;
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(response.headers()[CONNECTION], "close");
        assert_eq!(body_of(response).await, "limit 1");

        let response = dispatcher.handle(Request::builder().uri("/old").body(Empty::<Bytes>::new()).unwrap()).await;
        assert_eq!(response.status(), StatusCode::GONE);
        assert_eq!(body_of(response).await, "/old is gone");
    }
}
