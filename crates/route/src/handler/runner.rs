use crate::asked::Asked;
use crate::context::{Flow, RequestContext};
use crate::error::ExecError;
use crate::handler::{HandlerDescriptor, RequestFn};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Instrumentation callback, told which handler is about to run or just ran.
pub type HookFn = Arc<dyn Fn(&Asked, &str) + Send + Sync>;

/// The pipeline stage a handler is invoked in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// pre-handlers, the streaming handler and buffered-data handlers
    Pre,
    /// the route's `to` handler
    Main,
    /// response handlers
    Post,
}

/// Where a hook is registered; `Each` covers every stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookSlot {
    Pre,
    Main,
    Post,
    Each,
}

impl HookSlot {
    fn covers(self, stage: Stage) -> bool {
        matches!(
            (self, stage),
            (Self::Each, _) | (Self::Pre, Stage::Pre) | (Self::Main, Stage::Main) | (Self::Post, Stage::Post)
        )
    }
}

#[derive(Clone, Default)]
pub struct HandlerHooks {
    before: Vec<(HookSlot, HookFn)>,
    after: Vec<(HookSlot, HookFn)>,
}

impl HandlerHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn before<F>(&mut self, slot: HookSlot, f: F) -> &mut Self
    where
        F: Fn(&Asked, &str) + Send + Sync + 'static,
    {
        self.before.push((slot, Arc::new(f)));
        self
    }

    pub fn after<F>(&mut self, slot: HookSlot, f: F) -> &mut Self
    where
        F: Fn(&Asked, &str) + Send + Sync + 'static,
    {
        self.after.push((slot, Arc::new(f)));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.before.is_empty() && self.after.is_empty()
    }

    fn call(hooks: &[(HookSlot, HookFn)], stage: Stage, asked: &Asked, name: &str) {
        hooks.iter().filter(|(slot, _)| slot.covers(stage)).for_each(|(_, hook)| hook(asked, name));
    }
}

impl fmt::Debug for HandlerHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerHooks").field("before", &self.before.len()).field("after", &self.after.len()).finish()
    }
}

/// Invokes handlers, wrapping non-parallel ones with the registered hooks.
#[derive(Debug, Default)]
pub struct HandlerRunner {
    hooks: HandlerHooks,
}

impl HandlerRunner {
    pub fn new(hooks: HandlerHooks) -> Self {
        Self { hooks }
    }

    /// Runs one handler and reports whether the request has been answered.
    pub fn run(&self, stage: Stage, descriptor: &HandlerDescriptor, ctx: &mut RequestContext) -> Result<Flow, ExecError> {
        self.wrap(stage, descriptor, ctx, |ctx| descriptor.invoke(&mut ctx.asked, &mut ctx.answer, &ctx.route))
    }

    /// Runs `f` on behalf of `descriptor`, used for the body hooks of a streaming handler.
    pub fn run_with(
        &self,
        stage: Stage,
        descriptor: &HandlerDescriptor,
        ctx: &mut RequestContext,
        f: &RequestFn,
    ) -> Result<Flow, ExecError> {
        self.wrap(stage, descriptor, ctx, |ctx| f(&mut ctx.asked, &mut ctx.answer, &ctx.route))
    }

    /// Runs handlers in order, stopping at the first one that answers.
    pub fn run_all(
        &self,
        stage: Stage,
        descriptors: &[Arc<HandlerDescriptor>],
        ctx: &mut RequestContext,
    ) -> Result<Flow, ExecError> {
        for descriptor in descriptors {
            if self.run(stage, descriptor, ctx)?.is_answered() {
                return Ok(Flow::Answered);
            }
        }
        Ok(Flow::Continue)
    }

    fn wrap<F>(&self, stage: Stage, descriptor: &HandlerDescriptor, ctx: &mut RequestContext, f: F) -> Result<Flow, ExecError>
    where
        F: FnOnce(&mut RequestContext) -> crate::error::HandlerResult,
    {
        let name = descriptor.name();
        let instrumented = !descriptor.is_parallel();

        if instrumented {
            HandlerHooks::call(&self.hooks.before, stage, &ctx.asked, name);
        }

        debug!(request_id = ctx.asked.id(), handler = name, ?stage, "executing handler");
        f(ctx).map_err(|e| ExecError::handler(name, e))?;

        if instrumented {
            HandlerHooks::call(&self.hooks.after, stage, &ctx.asked, name);
        }

        Ok(Flow::of(&ctx.answer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::tests::request_context;
    use crate::handler::Handler;
    use std::sync::Mutex;

    fn recording_hooks(log: &Arc<Mutex<Vec<String>>>) -> HandlerHooks {
        let mut hooks = HandlerHooks::new();
        let before = Arc::clone(log);
        let after = Arc::clone(log);
        let main_only = Arc::clone(log);
        hooks
            .before(HookSlot::Each, move |_, name| before.lock().unwrap().push(format!("before {name}")))
            .after(HookSlot::Pre, move |_, name| after.lock().unwrap().push(format!("after {name}")))
            .before(HookSlot::Main, move |_, name| main_only.lock().unwrap().push(format!("main {name}")));
        hooks
    }

    #[test]
    fn hooks_wrap_handler_by_stage() {
        let log = Arc::new(Mutex::new(vec![]));
        let runner = HandlerRunner::new(recording_hooks(&log));
        let handler_log = Arc::clone(&log);
        let descriptor = HandlerDescriptor::new(
            "auth",
            Handler::request(move |_, _, _| {
                handler_log.lock().unwrap().push("auth".into());
                Ok(())
            }),
        );

        let mut ctx = request_context();
        assert_eq!(runner.run(Stage::Pre, &descriptor, &mut ctx).unwrap(), Flow::Continue);
        assert_eq!(*log.lock().unwrap(), vec!["before auth", "auth", "after auth"]);

        log.lock().unwrap().clear();
        runner.run(Stage::Main, &descriptor, &mut ctx).unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["before auth", "main auth", "auth"]);
    }

    #[test]
    fn parallel_handlers_skip_hooks() {
        let log = Arc::new(Mutex::new(vec![]));
        let runner = HandlerRunner::new(recording_hooks(&log));
        let descriptor = HandlerDescriptor::new("audit", Handler::request(|_, _, _| Ok(()))).in_parallel();

        let mut ctx = request_context();
        runner.run(Stage::Pre, &descriptor, &mut ctx).unwrap();
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn run_all_stops_at_first_answer() {
        let calls = Arc::new(Mutex::new(vec![]));
        let handlers = ["first", "second", "third"]
            .into_iter()
            .map(|name| {
                let calls = Arc::clone(&calls);
                Arc::new(HandlerDescriptor::new(
                    name,
                    Handler::response(move |_, answer, _| {
                        calls.lock().unwrap().push(name);
                        if name == "second" {
                            answer.end();
                        }
                        Ok(())
                    }),
                ))
            })
            .collect::<Vec<_>>();

        let mut ctx = request_context();
        let flow = HandlerRunner::default().run_all(Stage::Post, &handlers, &mut ctx).unwrap();
        assert_eq!(flow, Flow::Answered);
        assert_eq!(*calls.lock().unwrap(), vec!["first", "second"]);
    }

    #[test]
    fn errors_carry_handler_name() {
        let descriptor = HandlerDescriptor::new("auth", Handler::request(|_, _, _| Err("denied".into())));
        let mut ctx = request_context();

        let err = HandlerRunner::default().run(Stage::Pre, &descriptor, &mut ctx).unwrap_err();
        assert_eq!(err.to_string(), "handler `auth` failed: denied");
    }
}
