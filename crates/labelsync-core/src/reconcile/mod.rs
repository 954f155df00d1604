//! Reconciliation engine: classify, resolve, orchestrate.

pub mod classifier;
pub mod orchestrator;
pub mod report;
pub mod resolver;

pub use classifier::{classify, classify_event};
pub use orchestrator::{PassStage, ReconcileOptions, Reconciler, Service};
pub use report::{CheckReport, EventOutcome, FixReport, RepoCheck, RepoFix, ServiceResults};
pub use resolver::{ResolutionOutcome, Resolver};
