//! Pipeline execution engine

pub(crate) mod link;
pub mod pipeline;

pub use pipeline::{Pipeline, PipelineBuilder, Stage};
