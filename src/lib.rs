//! launchpad - assemble, override, and launch clusters from registered templates

pub mod cli;
pub mod completion;
pub mod core;
pub mod notify;
pub mod pipeline;
pub mod provision;
pub mod registry;

// Re-export commonly used types
pub use crate::core::{
    Configuration, FieldPath, LaunchDocument, LaunchError, LaunchFunction, OverrideSpec, Profile,
    TemplateFile,
};
pub use pipeline::{LaunchEvent, LaunchInput, LaunchPipeline, LaunchReport, PipelineSettings};
pub use provision::{ClusterApi, ClusterStatus, LocalClusterApi};
pub use registry::{InMemoryRegistry, Registry, TemplateKind, TemplateStore};
