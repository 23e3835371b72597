use crate::config::AppConfig;
use crate::error::SetupError;
use crate::handler::{HandlerDescriptor, HandlerRegistry, HandlerType};
use crate::mapping::RouteMapping;
use crate::pipeline::Pipeline;
use crate::utils::ensure;
use http::Method;
use std::sync::Arc;
use tracing::debug;

/// Validates route mappings against the registered handlers.
#[derive(Debug, Clone, Copy)]
pub struct PipelineCompiler<'a> {
    registry: &'a HandlerRegistry,
    config: &'a AppConfig,
}

impl<'a> PipelineCompiler<'a> {
    pub fn new(registry: &'a HandlerRegistry, config: &'a AppConfig) -> Self {
        Self { registry, config }
    }

    /// Builds the execution plan of `mapping`.
    ///
    /// `after` handlers are split into pre-handlers, the streaming handler and buffered-data
    /// handlers; `then` only accepts response handlers; a streaming `to` handler takes the
    /// streaming slot and leaves the main handler unset.
    pub fn compile(&self, mapping: &RouteMapping) -> Result<Pipeline, SetupError> {
        let route = mapping.to_string();
        let mut pipeline = Pipeline {
            pre_handlers: vec![],
            streaming_handler: None,
            streaming_is_main: false,
            data_handlers: vec![],
            main_handler: None,
            response_handlers: vec![],
            // a zero cap counts as unset
            max_length: mapping.max_length.filter(|&max| max > 0).unwrap_or(self.config.max_length),
        };

        for name in &mapping.after {
            let descriptor = self.registry.resolve(name)?;
            self.check_body_allowed(mapping, &route, &descriptor)?;

            match descriptor.handler_type() {
                HandlerType::RequestDataStream => {
                    ensure!(
                        pipeline.data_handlers.is_empty(),
                        SetupError::StreamAfterData { route, name: name.clone() }
                    );
                    ensure!(
                        pipeline.streaming_handler.is_none(),
                        SetupError::DuplicateStreamHandler { route, name: name.clone() }
                    );
                    pipeline.streaming_handler = Some(descriptor);
                }
                HandlerType::RequestData => pipeline.data_handlers.push(descriptor),
                HandlerType::Request | HandlerType::Response => pipeline.pre_handlers.push(descriptor),
            }
        }

        for name in &mapping.then {
            let descriptor = self.registry.resolve(name)?;
            ensure!(
                descriptor.handler_type() == HandlerType::Response,
                SetupError::NotResponseHandler { route, name: name.clone() }
            );
            pipeline.response_handlers.push(descriptor);
        }

        if let Some(name) = &mapping.to {
            let descriptor = self.registry.resolve(name)?;
            self.check_body_allowed(mapping, &route, &descriptor)?;

            if descriptor.handler_type() == HandlerType::RequestDataStream {
                ensure!(
                    pipeline.streaming_handler.is_none(),
                    SetupError::DuplicateStreamHandler { route, name: name.clone() }
                );
                pipeline.streaming_handler = Some(descriptor);
                pipeline.streaming_is_main = true;
            } else {
                pipeline.main_handler = Some(descriptor);
            }
        }

        debug!(
            route = %route,
            pre = pipeline.pre_handlers.len(),
            streaming = pipeline.streaming_handler.as_deref().map(HandlerDescriptor::name),
            data = pipeline.data_handlers.len(),
            main = pipeline.main_handler.as_deref().map(HandlerDescriptor::name),
            response = pipeline.response_handlers.len(),
            max_length = pipeline.max_length,
            "compiled route"
        );
        Ok(pipeline)
    }

    fn check_body_allowed(
        &self,
        mapping: &RouteMapping,
        route: &str,
        descriptor: &Arc<HandlerDescriptor>,
    ) -> Result<(), SetupError> {
        let method = mapping.method();
        let bodiless = method == Method::GET.as_str() || method == Method::HEAD.as_str();
        ensure!(
            !bodiless || self.config.always_read_request_payload || !descriptor.handler_type().reads_body(),
            SetupError::BodyOnBodilessMethod { route: route.to_string(), name: descriptor.name().to_string(), method }
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{Handler, StreamHandler};

    fn registry() -> HandlerRegistry {
        let mut registry = HandlerRegistry::new();
        let descriptors = [
            HandlerDescriptor::new("auth", Handler::request(|_, _, _| Ok(()))),
            HandlerDescriptor::new("upload", Handler::stream(StreamHandler::new(|_, _, _, _| Ok(())))),
            HandlerDescriptor::new("upload2", Handler::stream(StreamHandler::new(|_, _, _, _| Ok(())))),
            HandlerDescriptor::new("readJson", Handler::request_data(|_, _, _| Ok(()))),
            HandlerDescriptor::new("echo", Handler::request(|_, _, _| Ok(()))),
            HandlerDescriptor::new("compress", Handler::response(|_, _, _| Ok(()))),
            HandlerDescriptor::new("sign", Handler::response(|_, _, _| Ok(()))),
        ];
        for descriptor in descriptors {
            registry.register(descriptor, true).unwrap();
        }
        registry
    }

    fn compile(mapping: &RouteMapping) -> Result<Pipeline, SetupError> {
        let registry = registry();
        let config = AppConfig::default();
        PipelineCompiler::new(&registry, &config).compile(mapping)
    }

    fn names(handlers: &[Arc<HandlerDescriptor>]) -> Vec<&str> {
        handlers.iter().map(|h| h.name()).collect()
    }

    #[test]
    fn classifies_handlers_by_kind() {
        let mapping = RouteMapping::new("/users")
            .when("post")
            .after(["auth", "upload", "readJson", "sign"])
            .to("echo")
            .then(["compress", "sign"]);
        let pipeline = compile(&mapping).unwrap();

        assert_eq!(names(pipeline.pre_handlers()), vec!["auth", "sign"]);
        assert_eq!(pipeline.streaming_handler().unwrap().name(), "upload");
        assert_eq!(pipeline.streaming_stage(), crate::handler::Stage::Pre);
        assert_eq!(names(pipeline.data_handlers()), vec!["readJson"]);
        assert_eq!(pipeline.main_handler().unwrap().name(), "echo");
        assert_eq!(names(pipeline.response_handlers()), vec!["compress", "sign"]);
        assert_eq!(pipeline.max_length(), 1_000_000);
        assert!(pipeline.needs_body());
    }

    #[test]
    fn two_stream_handlers_are_rejected() {
        let mapping = RouteMapping::new("/upload").when("POST").after(["upload", "upload2"]);
        let err = compile(&mapping).unwrap_err();

        assert!(matches!(err, SetupError::DuplicateStreamHandler { .. }));
        assert!(err.to_string().contains("only one request-stream handler"));
    }

    #[test]
    fn stream_handler_must_precede_data_handlers() {
        let mapping = RouteMapping::new("/upload").when("POST").after(["readJson", "upload"]);
        assert!(matches!(compile(&mapping), Err(SetupError::StreamAfterData { .. })));
    }

    #[test]
    fn unregistered_names_are_reported() {
        for mapping in [
            RouteMapping::new("/x").after(["auth", "X"]),
            RouteMapping::new("/x").then(["X"]),
            RouteMapping::new("/x").to("X"),
        ] {
            let err = compile(&mapping).unwrap_err();
            assert!(matches!(err, SetupError::UnregisteredHandler { ref name } if name == "X"));
            assert!(err.to_string().contains('X'));
        }
    }

    #[test]
    fn body_handlers_on_get_need_opt_in() {
        let mapping = RouteMapping::new("/data").after(["readJson"]);
        assert!(matches!(compile(&mapping), Err(SetupError::BodyOnBodilessMethod { .. })));

        let head = RouteMapping::new("/data").when("head").to("upload");
        assert!(matches!(compile(&head), Err(SetupError::BodyOnBodilessMethod { .. })));

        let registry = registry();
        let config = AppConfig::default().always_read_request_payload(true);
        let pipeline = PipelineCompiler::new(&registry, &config).compile(&mapping).unwrap();
        assert_eq!(names(pipeline.data_handlers()), vec!["readJson"]);
    }

    #[test]
    fn then_accepts_only_response_handlers() {
        let mapping = RouteMapping::new("/x").then(["compress", "auth"]);
        let err = compile(&mapping).unwrap_err();

        assert!(matches!(err, SetupError::NotResponseHandler { ref name, .. } if name == "auth"));
        assert!(err.to_string().contains("auth"));
    }

    #[test]
    fn streaming_main_handler_takes_the_streaming_slot() {
        let mapping = RouteMapping::new("/upload").when("PUT").to("upload");
        let pipeline = compile(&mapping).unwrap();

        assert!(pipeline.main_handler().is_none());
        assert_eq!(pipeline.streaming_handler().unwrap().name(), "upload");
        assert_eq!(pipeline.streaming_stage(), crate::handler::Stage::Main);
        assert!(pipeline.needs_body());

        let duplicate = RouteMapping::new("/upload").when("PUT").after(["upload"]).to("upload2");
        assert!(matches!(compile(&duplicate), Err(SetupError::DuplicateStreamHandler { .. })));
    }

    #[test]
    fn route_cap_overrides_default() {
        let pipeline = compile(&RouteMapping::new("/ping").to("echo").max_length(16)).unwrap();
        assert_eq!(pipeline.max_length(), 16);
        assert!(!pipeline.needs_body());

        let pipeline = compile(&RouteMapping::new("/ping").to("echo").max_length(0)).unwrap();
        assert_eq!(pipeline.max_length(), 1_000_000);
    }

    #[test]
    fn buffered_main_handler_needs_body() {
        let pipeline = compile(&RouteMapping::new("/echo").when("POST").to("readJson")).unwrap();
        assert_eq!(pipeline.main_handler().unwrap().name(), "readJson");
        assert!(pipeline.data_handlers().is_empty());
        assert!(pipeline.needs_body());
    }
}
