//! Core domain primitives and orchestration for the batch executor.
//!
//! This crate contains the fundamental types and traits that define the
//! domain model: `Session`, `Batch`, `Task`, `Review`, the plan-document
//! parser, the [`Store`] and [`ForgeClient`] persistence/publishing
//! contracts, and the [`Orchestrator`]/[`Worker`]/[`TaskExecutor`] that
//! drive execution. Concrete storage and forge implementations live in
//! `bx-store` and `bx-forge` to keep this crate free of a database or HTTP
//! client dependency.

pub mod batch;
pub mod config;
pub mod error;
pub mod executor;
pub mod forge;
pub mod orchestrator;
pub mod plan_parser;
pub mod prompt;
pub mod review;
pub mod session;
pub mod store;
pub mod task;
pub mod worker;

pub use batch::{Batch, BatchStatus};
pub use config::Config;
pub use error::{CoreError, ExecError, OrchestratorError, PlanError};
pub use executor::{build_prompt, ExecutionOutcome, TaskExecutor};
pub use forge::{ChangeRequest, ForgeClient, ForgeError, MergeMethod, MergeResult};
pub use orchestrator::Orchestrator;
pub use plan_parser::{parse_plan, ParsedBatch, ParsedTask};
pub use prompt::{PromptRenderer, RenderContext, RenderError, StepOutputs};
pub use review::{Review, Verdict};
pub use session::{ExecutionMode, Session, SessionStatus};
pub use store::{NewSession, Store, StoreError, TaskResult};
pub use task::{task_sort_key, Task, TaskExtras, TaskStatus};
pub use worker::{Worker, WorkerStep};
