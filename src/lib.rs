//! pipechain - typed, cancellable request pipelines
//!
//! Steps are chained outermost-first. Continuation steps only ever see
//! downstream success values; error-aware steps see the full [`Outcome`] and
//! are the only place a failure can be recovered.

pub mod cli;
pub mod core;
pub mod demo;
pub mod execution;

// Re-export commonly used types
pub use self::core::{
    continuation_fn, error_aware_fn, terminal_fn, BuildError, CancellationToken, Cancelled,
    ContinuationStep, ErrorAwareStep, ErrorPayload, Halt, Next, Outcome, PipelineSettings,
    ResultNext, TerminalStep,
};
pub use execution::{Pipeline, PipelineBuilder, Stage};
