//! Named handler: a task plus the name it is addressed by.

use super::task::{BoxedTask, FnTask, PipelineTask};
use fclite_shared::errors::FcliteResult;

/// A named, orderable unit of work.
///
/// The name is fixed at construction and identifies the handler inside a
/// [`HandlerList`](super::HandlerList).
pub struct Handler<Ctx> {
    name: String,
    task: BoxedTask<Ctx>,
}

impl<Ctx: Send> Handler<Ctx> {
    pub fn new(name: impl Into<String>, task: impl PipelineTask<Ctx> + 'static) -> Self {
        Self {
            name: name.into(),
            task: Box::new(task),
        }
    }

    /// Build a handler from a synchronous closure.
    pub fn from_fn<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&mut Ctx) -> FcliteResult<()> + Send + Sync + 'static,
    {
        Self::new(name, FnTask(f))
    }

    pub(super) async fn run(&self, ctx: &mut Ctx) -> FcliteResult<()> {
        self.task.run(ctx).await
    }
}

impl<Ctx> Handler<Ctx> {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<Ctx> std::fmt::Debug for Handler<Ctx> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handler").field("name", &self.name).finish()
    }
}
