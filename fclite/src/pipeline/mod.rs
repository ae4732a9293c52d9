//! Named, ordered handler pipeline.
//!
//! ## Architecture
//!
//! ```text
//! HandlerList → Handlers → Tasks
//!
//! - HandlerList: ordered, uniquely named handlers, run front to back
//! - Handler: a name plus the task it runs
//! - Task: atomic unit of work against the shared context
//! ```
//!
//! Handlers are addressed by name rather than index, so independent callers
//! can splice their own work next to a well-known anchor without knowing
//! what else was added to the list.
//!
//! ## Example
//!
//! ```ignore
//! use fclite::pipeline::{Handler, HandlerList};
//!
//! let mut list: HandlerList<Vec<&str>> = HandlerList::new();
//! list.append(Handler::from_fn("a", |v: &mut Vec<&str>| { v.push("a"); Ok(()) }))?;
//! list.insert_before("a", Handler::from_fn("first", |v: &mut Vec<&str>| { v.push("first"); Ok(()) }))?;
//!
//! let mut seen = Vec::new();
//! let metrics = list.run(&mut seen).await?;
//! assert_eq!(seen, ["first", "a"]);
//! ```

mod handler;
mod handler_list;
mod metrics;
mod task;

pub use handler::Handler;
pub use handler_list::HandlerList;
pub use metrics::{PipelineMetrics, StepMetrics};
pub use task::{BoxedTask, FnTask, PipelineTask};
