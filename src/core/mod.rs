//! Core pipeline vocabulary
//!
//! Outcomes, the three step contracts and their continuation delegates,
//! cancellation, and settings.

pub mod cancellation;
pub mod config;
pub mod error;
pub mod outcome;
pub mod step;

pub use cancellation::CancellationToken;
pub use config::PipelineSettings;
pub use error::BuildError;
pub use outcome::{Cancelled, ErrorPayload, ErrorValue, Outcome};
pub use step::*;
