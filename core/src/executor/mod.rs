//! Task graph assembly and execution.
//!
//! # Architecture
//!
//! ```text
//! Builders + injected fragments
//!   ↓
//! Assembler::assemble() → key uniqueness, references, cycles
//!   ↓
//! TaskGraph { nodes, edges, reverse_edges }
//!   ↓
//! Scheduler::run() → ready set re-evaluated as tasks finish
//!   ↓
//! TargetBackend::execute() per task, TargetBackend::finish() once
//! ```

mod assembler;
mod context;
mod graph;
mod key;
mod scheduler;
pub mod traits;
pub mod types;

pub use assembler::Assembler;
pub use context::{ExecutionContext, ExecutionContextBuilder};
pub use graph::{Fragment, TaskGraph};
pub use key::TaskKey;
pub use scheduler::{Scheduler, TaskState, TaskStates};
pub use traits::{Builder, RetryStrategyPlugin};
pub use types::{
    Change, CheckOutcome, ExecutionConfig, ExecutionResult, NodeTask, RunTasksOptions,
    TaskContext, TaskOutcome, TaskResult, MAX_TASK_DURATION,
};
