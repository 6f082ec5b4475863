//! Drives modules through the rewrite stages and hands the result to
//! several backends at once.

mod backend;
mod cancel;
mod module;
mod orchestrate;
mod output;
mod process;
mod scheduler;

pub use backend::{Backend, BackendError, BackendId, OutputFile, SiblingData, Tentative};
pub use cancel::{CancelGroup, InFlight, Phase};
pub use module::{Module, ModuleId, ModuleStatus};
pub use orchestrate::{BackendFailure, OrchestrationReport, orchestrate};
pub use output::{DirOutput, MemoryOutput, OutputArea, OutputSink};
pub use process::{CAPTURE_LIMIT, Captured, run_captured, run_captured_with_limit};
pub use scheduler::{RunSummary, Scheduler};
