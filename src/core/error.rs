//! Error taxonomy for the launch pipeline
//!
//! Every failure mode is an explicit kind so the pipeline's Fail transition
//! can pattern-match on it instead of catching by type.

use thiserror::Error;

/// Errors raised by template assembly, override resolution, and the pipeline
#[derive(Debug, Error)]
pub enum LaunchError {
    /// A Profile, Configuration, or Launch Function is absent from the registry
    #[error("{kind} '{namespace}/{name}' not found")]
    NotFound {
        kind: &'static str,
        namespace: String,
        name: String,
    },

    /// Mutation attempted on an object rehydrated from the registry
    #[error("{kind} '{name}' is read-only once loaded from the registry")]
    ReadOnly { kind: &'static str, name: String },

    /// A caller override was rejected before any resource was created
    #[error("invalid override: {0}")]
    InvalidOverride(String),

    /// The running-guard found an active cluster with the same name
    #[error("cluster '{0}' is already running")]
    AlreadyRunning(String),

    /// The provisioning API failed (after retries, for transient kinds)
    #[error("provisioning error: {0}")]
    Provision(#[from] crate::provision::ProvisionError),

    /// The registry backend failed
    #[error("registry error: {0}")]
    Registry(String),

    /// Notification publish failed
    #[error("notification error: {0}")]
    Notify(String),

    /// The async completion wait resolved as failed
    #[error("completion failed ({code}): {cause}")]
    Completion { code: String, cause: String },

    /// A template file failed to parse or validate
    #[error("template error: {0}")]
    Template(String),
}

impl LaunchError {
    /// Convenience constructor for not-found errors
    pub fn not_found(kind: &'static str, namespace: &str, name: &str) -> Self {
        LaunchError::NotFound {
            kind,
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }

    /// Convenience constructor for read-only violations
    pub fn read_only(kind: &'static str, name: &str) -> Self {
        LaunchError::ReadOnly {
            kind,
            name: name.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = LaunchError::not_found("configuration", "default", "basic");
        assert_eq!(err.to_string(), "configuration 'default/basic' not found");

        let err = LaunchError::read_only("profile", "secure");
        assert!(err.to_string().contains("read-only"));

        let err = LaunchError::AlreadyRunning("basic".to_string());
        assert!(err.to_string().contains("already running"));
    }
}
