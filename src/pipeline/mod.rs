//! Launch pipeline: stages, events, per-run context

pub mod context;
pub mod engine;
pub mod input;

pub use context::ExecutionContext;
pub use engine::{
    EventHandler, LaunchEvent, LaunchPipeline, LaunchReport, PipelineSettings, Stage,
};
pub use input::LaunchInput;
