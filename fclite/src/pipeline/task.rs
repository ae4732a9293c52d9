//! Task trait for handler actions.

use async_trait::async_trait;
use fclite_shared::errors::FcliteResult;

/// Action performed by a handler.
///
/// Tasks run strictly one after another, each with exclusive access to the
/// shared context for the duration of its run.
#[async_trait]
pub trait PipelineTask<Ctx: Send>: Send + Sync {
    /// Execute the task against the shared context.
    async fn run(&self, ctx: &mut Ctx) -> FcliteResult<()>;
}

pub type BoxedTask<Ctx> = Box<dyn PipelineTask<Ctx>>;

/// Adapter turning a synchronous closure into a task.
pub struct FnTask<F>(pub F);

#[async_trait]
impl<Ctx, F> PipelineTask<Ctx> for FnTask<F>
where
    Ctx: Send,
    F: Fn(&mut Ctx) -> FcliteResult<()> + Send + Sync,
{
    async fn run(&self, ctx: &mut Ctx) -> FcliteResult<()> {
        (self.0)(ctx)
    }
}
