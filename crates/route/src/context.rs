use crate::answer::Answer;
use crate::asked::Asked;
use crate::config::AppConfig;
use crate::mapping::RouteMapping;
use std::sync::Arc;

/// Application settings and the matched route mapping, handed to every handler.
#[derive(Debug, Clone)]
pub struct RouteContext {
    app: Arc<AppConfig>,
    route: Arc<RouteMapping>,
}

impl RouteContext {
    pub fn new(app: Arc<AppConfig>, route: Arc<RouteMapping>) -> Self {
        Self { app, route }
    }

    pub fn app(&self) -> &AppConfig {
        &self.app
    }

    pub fn route(&self) -> &RouteMapping {
        &self.route
    }
}

/// Whether the pipeline should go on after a handler or stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Answered,
}

impl Flow {
    #[inline]
    pub fn of(answer: &Answer) -> Self {
        if answer.answered() { Self::Answered } else { Self::Continue }
    }

    #[inline]
    pub fn is_answered(self) -> bool {
        self == Self::Answered
    }
}

/// Everything private to one request while its pipeline runs.
#[derive(Debug)]
pub struct RequestContext {
    pub(crate) asked: Asked,
    pub(crate) answer: Answer,
    pub(crate) route: RouteContext,
}

impl RequestContext {
    pub fn new(asked: Asked, route: RouteContext) -> Self {
        Self { asked, answer: Answer::new(), route }
    }

    pub fn asked(&self) -> &Asked {
        &self.asked
    }

    pub fn answer(&self) -> &Answer {
        &self.answer
    }

    pub fn route(&self) -> &RouteContext {
        &self.route
    }

    pub fn into_parts(self) -> (Asked, Answer) {
        (self.asked, self.answer)
    }
}
