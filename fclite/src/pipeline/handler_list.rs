//! Ordered handler list.
//!
//! Holds uniquely named handlers and runs them front to back against a
//! shared context, stopping at the first failure.

use super::handler::Handler;
use super::metrics::{PipelineMetrics, StepMetrics};
use fclite_shared::errors::{FcliteError, FcliteResult};
use std::time::Instant;

/// Ordered, uniquely named sequence of handlers.
///
/// Structural operations address handlers by name. A failed operation never
/// modifies the list.
pub struct HandlerList<Ctx> {
    handlers: Vec<Handler<Ctx>>,
}

impl<Ctx> Default for HandlerList<Ctx> {
    fn default() -> Self {
        Self {
            handlers: Vec::new(),
        }
    }
}

impl<Ctx: Send> HandlerList<Ctx> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a list from handlers in order.
    ///
    /// Fails with `DuplicateName` if two handlers share a name.
    pub fn from_handlers(handlers: impl IntoIterator<Item = Handler<Ctx>>) -> FcliteResult<Self> {
        let mut list = Self::new();
        for handler in handlers {
            list.append(handler)?;
        }
        Ok(list)
    }

    /// Add a handler at the end.
    pub fn append(&mut self, handler: Handler<Ctx>) -> FcliteResult<()> {
        self.ensure_unique(handler.name(), None)?;
        self.handlers.push(handler);
        Ok(())
    }

    /// Add a handler at the front.
    pub fn prepend(&mut self, handler: Handler<Ctx>) -> FcliteResult<()> {
        self.ensure_unique(handler.name(), None)?;
        self.handlers.insert(0, handler);
        Ok(())
    }

    /// Insert a handler immediately after `anchor`.
    pub fn insert_after(&mut self, anchor: &str, handler: Handler<Ctx>) -> FcliteResult<()> {
        let index = self.position_of(anchor)?;
        self.ensure_unique(handler.name(), None)?;
        self.handlers.insert(index + 1, handler);
        Ok(())
    }

    /// Insert a handler immediately before `anchor`.
    pub fn insert_before(&mut self, anchor: &str, handler: Handler<Ctx>) -> FcliteResult<()> {
        let index = self.position_of(anchor)?;
        self.ensure_unique(handler.name(), None)?;
        self.handlers.insert(index, handler);
        Ok(())
    }

    /// Remove the named handler and hand it back to the caller.
    ///
    /// Removing a name that is not present fails, including a second removal
    /// of the same name.
    pub fn remove(&mut self, name: &str) -> FcliteResult<Handler<Ctx>> {
        let index = self.position_of(name)?;
        Ok(self.handlers.remove(index))
    }

    /// Replace the named handler in place, returning the old one.
    ///
    /// The replacement may carry a different name as long as it does not
    /// collide with any other handler in the list.
    pub fn swap(&mut self, name: &str, handler: Handler<Ctx>) -> FcliteResult<Handler<Ctx>> {
        let index = self.position_of(name)?;
        self.ensure_unique(handler.name(), Some(index))?;
        Ok(std::mem::replace(&mut self.handlers[index], handler))
    }

    pub fn has(&self, name: &str) -> bool {
        self.handlers.iter().any(|h| h.name() == name)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Handler names in execution order.
    pub fn names(&self) -> Vec<&str> {
        self.handlers.iter().map(|h| h.name()).collect()
    }

    pub fn clear(&mut self) {
        self.handlers.clear();
    }

    /// Run every handler in order.
    ///
    /// Stops at the first failing handler and returns
    /// `StepExecution` naming it; handlers after it do not run.
    pub async fn run(&self, ctx: &mut Ctx) -> FcliteResult<PipelineMetrics> {
        let total_start = Instant::now();
        let mut steps = Vec::with_capacity(self.handlers.len());

        for handler in &self.handlers {
            let name = handler.name();
            let step_start = Instant::now();
            tracing::debug!(handler = %name, "Running handler");

            handler.run(ctx).await.map_err(|e| {
                tracing::error!(handler = %name, "Handler failed: {}", e);
                FcliteError::StepExecution {
                    step: name.to_string(),
                    source: Box::new(e),
                }
            })?;

            steps.push(StepMetrics {
                name: name.to_string(),
                duration_ms: step_start.elapsed().as_millis(),
            });
        }

        Ok(PipelineMetrics {
            total_duration_ms: total_start.elapsed().as_millis(),
            steps,
        })
    }

    /// Run every handler in order, continuing past failures.
    ///
    /// Returns the failures in the order they happened.
    pub async fn run_all(&self, ctx: &mut Ctx) -> Vec<FcliteError> {
        let mut failures = Vec::new();

        for handler in &self.handlers {
            let name = handler.name();
            tracing::debug!(handler = %name, "Running handler");

            if let Err(e) = handler.run(ctx).await {
                tracing::warn!(handler = %name, "Handler failed, continuing: {}", e);
                failures.push(FcliteError::StepExecution {
                    step: name.to_string(),
                    source: Box::new(e),
                });
            }
        }

        failures
    }

    fn position_of(&self, name: &str) -> FcliteResult<usize> {
        self.handlers
            .iter()
            .position(|h| h.name() == name)
            .ok_or_else(|| FcliteError::AnchorNotFound(name.to_string()))
    }

    /// Check `name` is unused, ignoring the handler at `skip`.
    fn ensure_unique(&self, name: &str, skip: Option<usize>) -> FcliteResult<()> {
        let taken = self
            .handlers
            .iter()
            .enumerate()
            .any(|(i, h)| Some(i) != skip && h.name() == name);
        if taken {
            return Err(FcliteError::DuplicateName(name.to_string()));
        }
        Ok(())
    }
}

impl<Ctx> std::fmt::Debug for HandlerList<Ctx> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.handlers.iter().map(|h| h.name()))
            .finish()
    }
}
