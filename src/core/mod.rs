//! Core domain models for launchpad
//!
//! This module defines the launch document, the reusable Profile and
//! Configuration templates, launch functions, and the override interface.

pub mod configuration;
pub mod document;
pub mod error;
pub mod function;
pub mod overrides;
pub mod profile;
pub mod template;

pub use configuration::{Configuration, ConfigurationBuilder, Topology};
pub use document::{FieldPath, LaunchDocument, PathSegment};
pub use error::LaunchError;
pub use function::{LaunchFunction, TemplateRef};
pub use overrides::OverrideSpec;
pub use profile::{Profile, S3EncryptionMode};
pub use template::TemplateFile;
