//! The email workflow core — step graph, dispatcher, and run service.
//!
//! An inbound email becomes a *run*: Init opens the run's threads, Triage
//! extracts open questions, FAQ and RAG answer what they can in parallel,
//! and the Orchestrator merges their results. Anything still open goes to a
//! human operator — the run suspends, checkpointed by email id — and the
//! operator's answers later resume it. Once every question is answered the
//! Reply step composes the final text and the run completes.

pub mod engine;
pub mod events;
pub mod graph;
pub mod service;
pub mod steps;
pub mod trace;
pub mod types;

pub use engine::{DriveOutcome, RunState, WorkflowEngine, WorkflowSnapshot};
pub use graph::{ProcessGraph, StepId, support_graph};
pub use service::WorkflowService;
