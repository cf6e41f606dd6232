//! Service layer
//!
//! Services hold the guard's logic. They drive the runtime and registry
//! clients and decide what to update:
//! - Evaluation: gather candidate images from the registry mirrors
//! - Update: pull and recreate containers, one task per container
//! - Pipeline: one full run, from discovery to update
//!
//! Services sit behind traits where the scheduler or tests swap them out.

mod evaluation;
mod pipeline;
mod update;

#[cfg(test)]
pub(crate) mod testing;

// Re-export traits
pub use pipeline::Pipeline;

// Re-export implementations
pub use evaluation::MirrorEvaluator;
pub use pipeline::{PipelineDriver, RunReport};
pub use update::UpdateService;
