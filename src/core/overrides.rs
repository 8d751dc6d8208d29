//! Controlled-override resolution
//!
//! The allow-list is the only legal mutation surface exposed to launch
//! callers. Anything not listed is immutable at launch time, and numeric
//! entries can carry closed-interval bounds.

use crate::core::document::{FieldPath, LaunchDocument};
use crate::core::error::LaunchError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

/// One allow-list entry: where a caller-facing field lands, and its bounds
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OverrideSpec {
    /// Document path the caller field maps to
    pub path: FieldPath,

    /// Default value recorded on the override interface
    #[serde(default)]
    pub default: Option<Value>,

    /// Inclusive lower bound for numeric overrides
    #[serde(default)]
    pub minimum: Option<f64>,

    /// Inclusive upper bound for numeric overrides
    #[serde(default)]
    pub maximum: Option<f64>,
}

impl OverrideSpec {
    pub fn new(path: FieldPath) -> Self {
        Self {
            path,
            default: None,
            minimum: None,
            maximum: None,
        }
    }

    pub fn with_bounds(mut self, minimum: f64, maximum: f64) -> Self {
        self.minimum = Some(minimum);
        self.maximum = Some(maximum);
        self
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }
}

/// Validate and apply caller overrides against the allow-list
///
/// Fails fast on the first violation: unknown field names, paths absent
/// from the document, and out-of-bounds numeric values all abort before any
/// resource is created. On success the returned document is the canonical
/// one for the remainder of the run; on failure the input is untouched.
pub fn resolve(
    document: &LaunchDocument,
    requested: &HashMap<String, Value>,
    allowed: &BTreeMap<String, OverrideSpec>,
) -> Result<LaunchDocument, LaunchError> {
    if requested.is_empty() {
        return Ok(document.clone());
    }
    if allowed.is_empty() {
        return Err(LaunchError::InvalidOverride(
            "overrides not permitted: launch function has no override interface".to_string(),
        ));
    }

    let mut resolved = document.clone();

    // Deterministic application order for reproducible failures
    let mut names: Vec<&String> = requested.keys().collect();
    names.sort();

    for name in names {
        let value = &requested[name];
        let spec = allowed.get(name).ok_or_else(|| {
            LaunchError::InvalidOverride(format!("field '{}' is not overridable", name))
        })?;

        check_bounds(name, value, spec)?;
        resolved.set(&spec.path, value.clone())?;
    }

    Ok(resolved)
}

fn check_bounds(name: &str, value: &Value, spec: &OverrideSpec) -> Result<(), LaunchError> {
    if spec.minimum.is_none() && spec.maximum.is_none() {
        return Ok(());
    }
    let Some(number) = value.as_f64() else {
        // Bounds only constrain numeric values
        return Ok(());
    };
    if let Some(min) = spec.minimum {
        if number < min {
            return Err(LaunchError::InvalidOverride(format!(
                "field '{}' value {} is below the minimum of {}",
                name, number, min
            )));
        }
    }
    if let Some(max) = spec.maximum {
        if number > max {
            return Err(LaunchError::InvalidOverride(format!(
                "field '{}' value {} is above the maximum of {}",
                name, number, max
            )));
        }
    }
    Ok(())
}
