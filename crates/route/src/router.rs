//! Method and path matching over compiled routes.
//!
//! Each method gets its own `matchit` tree. Paths accept both the `matchit` syntax
//! (`/users/{id}`, `/files/{*path}`) and colon segments (`/users/:id`, `/files/*`), and a
//! trailing slash is ignored on both sides.

use crate::asked::PathParams;
use crate::context::RouteContext;
use crate::error::SetupError;
use crate::pipeline::Pipeline;
use http::Method;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

type InnerRouter = matchit::Router<Arc<CompiledRoute>>;

/// A route mapping together with its compiled pipeline.
#[derive(Debug)]
pub struct CompiledRoute {
    context: RouteContext,
    pipeline: Pipeline,
}

impl CompiledRoute {
    pub fn new(context: RouteContext, pipeline: Pipeline) -> Self {
        Self { context, pipeline }
    }

    pub fn context(&self) -> &RouteContext {
        &self.context
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }
}

/// A successful lookup.
#[derive(Debug)]
pub struct RouteMatch<'router> {
    route: &'router Arc<CompiledRoute>,
    params: PathParams,
}

impl<'router> RouteMatch<'router> {
    pub fn route(&self) -> &'router Arc<CompiledRoute> {
        self.route
    }

    pub fn params(&self) -> &PathParams {
        &self.params
    }

    pub fn into_params(self) -> PathParams {
        self.params
    }
}

pub struct Router {
    routes: HashMap<Method, InnerRouter>,
    len: usize,
}

impl Router {
    pub fn builder() -> RouterBuilder {
        RouterBuilder::default()
    }

    /// Finds the route registered for `method` and `path`.
    pub fn at(&self, method: &Method, path: &str) -> Option<RouteMatch<'_>> {
        let router = self.routes.get(method)?;
        let path = trim_trailing_slash(path);
        match router.at(path) {
            Ok(matched) => Some(RouteMatch { route: matched.value, params: matched.params.into() }),
            Err(e) => {
                debug!(%method, path, cause = %e, "no route matched");
                None
            }
        }
    }

    /// Number of routes, over all methods.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router").field("methods", &self.routes.keys().collect::<Vec<_>>()).field("len", &self.len).finish()
    }
}

#[derive(Debug, Default)]
pub struct RouterBuilder {
    routes: Vec<CompiledRoute>,
}

impl RouterBuilder {
    pub fn route(mut self, route: CompiledRoute) -> Self {
        self.routes.push(route);
        self
    }

    /// Builds the router, rejecting unknown methods and conflicting paths.
    pub fn build(self) -> Result<Router, SetupError> {
        let mut router = Router { routes: HashMap::new(), len: 0 };

        for route in self.routes {
            let mapping = route.context.route();
            let method = Method::from_bytes(mapping.method().as_bytes())
                .map_err(|e| SetupError::invalid_route(mapping, format!("invalid method: {e}")))?;
            let pattern = to_pattern(&mapping.uri);
            let display = mapping.to_string();

            router
                .routes
                .entry(method)
                .or_insert_with(InnerRouter::new)
                .insert(pattern, Arc::new(route))
                .map_err(|e| SetupError::invalid_route(display, e))?;
            router.len += 1;
        }

        Ok(router)
    }
}

fn trim_trailing_slash(path: &str) -> &str {
    match path.strip_suffix('/') {
        Some(trimmed) if !trimmed.is_empty() => trimmed,
        _ => path,
    }
}

/// Rewrites colon and star segments into the `matchit` syntax.
fn to_pattern(uri: &str) -> String {
    let uri = trim_trailing_slash(uri);
    if !uri.contains([':', '*']) {
        return uri.to_string();
    }

    uri.split('/')
        .map(|segment| {
            if let Some(name) = segment.strip_prefix(':') {
                format!("{{{name}}}")
            } else if segment == "*" {
                "{*wildcard}".to_string()
            } else {
                segment.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}
