//! Launch document model and path addressing
//!
//! The launch document mirrors the full parameter surface of the cluster
//! creation API. Every field is present from the start (unset fields are
//! explicit JSON nulls) so later partial overlays and path-based overrides
//! never need to create keys.

use crate::core::error::LaunchError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// One segment of a dotted field path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    /// Object key
    Key(String),
    /// Sequence position
    Index(usize),
}

/// A dotted path into the launch document
///
/// Numeric segments address sequence positions, e.g.
/// `Instances.InstanceGroups.1.InstanceCount`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath(Vec<PathSegment>);

impl FromStr for FieldPath {
    type Err = LaunchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(LaunchError::InvalidOverride("empty path".to_string()));
        }
        let segments = s
            .split('.')
            .map(|seg| match seg.parse::<usize>() {
                Ok(idx) => PathSegment::Index(idx),
                Err(_) => PathSegment::Key(seg.to_string()),
            })
            .collect();
        Ok(FieldPath(segments))
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, seg) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ".")?;
            }
            match seg {
                PathSegment::Key(k) => write!(f, "{}", k)?,
                PathSegment::Index(n) => write!(f, "{}", n)?,
            }
        }
        Ok(())
    }
}

impl Serialize for FieldPath {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for FieldPath {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

impl FieldPath {
    /// Path segments in navigation order
    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }
}

/// The in-memory launch document
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LaunchDocument {
    root: Value,
}

impl LaunchDocument {
    /// Create the full-surface skeleton with every field present and null
    pub fn skeleton() -> Self {
        let root = json!({
            "Name": null,
            "LogUri": null,
            "ReleaseLabel": null,
            "Instances": {
                "InstanceGroups": null,
                "InstanceFleets": null,
                "Ec2KeyName": null,
                "KeepJobFlowAliveWhenNoSteps": null,
                "TerminationProtected": null,
                "Ec2SubnetId": null,
                "Ec2SubnetIds": null,
                "EmrManagedMasterSecurityGroup": null,
                "EmrManagedSlaveSecurityGroup": null,
                "ServiceAccessSecurityGroup": null,
                "AdditionalMasterSecurityGroups": null,
                "AdditionalSlaveSecurityGroups": null,
            },
            "Steps": null,
            "BootstrapActions": null,
            "Applications": null,
            "Configurations": null,
            "VisibleToAllUsers": null,
            "JobFlowRole": null,
            "ServiceRole": null,
            "SecurityConfiguration": null,
            "AutoScalingRole": null,
            "ScaleDownBehavior": null,
            "CustomAmiId": null,
            "EbsRootVolumeSize": null,
            "StepConcurrencyLevel": null,
            "ManagedScalingPolicy": null,
            "KerberosAttributes": null,
            "Tags": null,
        });
        LaunchDocument { root }
    }

    /// Wrap an existing document value (used when rehydrating)
    pub fn from_value(root: Value) -> Self {
        LaunchDocument { root }
    }

    /// Borrow the underlying JSON value
    pub fn as_value(&self) -> &Value {
        &self.root
    }

    /// Read a field by path; None when the path does not exist
    pub fn get(&self, path: &FieldPath) -> Option<&Value> {
        let mut current = &self.root;
        for segment in path.segments() {
            current = match (segment, current) {
                (PathSegment::Key(k), Value::Object(map)) => map.get(k)?,
                (PathSegment::Index(i), Value::Array(items)) => items.get(*i)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Overwrite the value at an existing path
    ///
    /// The prefix is navigated depth-first and the final segment is the
    /// target key. The target must already exist in its container; paths
    /// are never created here.
    pub fn set(&mut self, path: &FieldPath, value: Value) -> Result<(), LaunchError> {
        let segments = path.segments();
        let (target, prefix) = segments
            .split_last()
            .ok_or_else(|| LaunchError::InvalidOverride("empty path".to_string()))?;

        let mut current = &mut self.root;
        for segment in prefix {
            current = match (segment, current) {
                (PathSegment::Key(k), Value::Object(map)) => map.get_mut(k).ok_or_else(|| {
                    LaunchError::InvalidOverride(format!("update path not found: {}", path))
                })?,
                (PathSegment::Index(i), Value::Array(items)) => {
                    items.get_mut(*i).ok_or_else(|| {
                        LaunchError::InvalidOverride(format!("update path not found: {}", path))
                    })?
                }
                _ => {
                    return Err(LaunchError::InvalidOverride(format!(
                        "update path not found: {}",
                        path
                    )))
                }
            };
        }

        match (target, current) {
            (PathSegment::Key(k), Value::Object(map)) => {
                let slot = map.get_mut(k).ok_or_else(|| {
                    LaunchError::InvalidOverride(format!("update path not found: {}", path))
                })?;
                *slot = value;
                Ok(())
            }
            (PathSegment::Index(i), Value::Array(items)) => {
                let slot = items.get_mut(*i).ok_or_else(|| {
                    LaunchError::InvalidOverride(format!("update path not found: {}", path))
                })?;
                *slot = value;
                Ok(())
            }
            _ => Err(LaunchError::InvalidOverride(format!(
                "update path not found: {}",
                path
            ))),
        }
    }

    /// Merge a property block into the `Configurations` list by classification
    ///
    /// Upsert semantics: if a block with the same classification exists its
    /// properties are unioned (new values win on key collision); otherwise a
    /// new block is appended. Reapplying the same input is a no-op.
    pub fn merge_classification(
        &mut self,
        classification: &str,
        properties: &BTreeMap<String, String>,
    ) {
        let blocks = self
            .root
            .as_object_mut()
            .expect("document root is an object")
            .entry("Configurations")
            .or_insert(Value::Null);
        if !blocks.is_array() {
            *blocks = Value::Array(Vec::new());
        }
        let blocks = blocks.as_array_mut().expect("checked above");

        let existing = blocks.iter_mut().find(|b| {
            b.get("Classification").and_then(Value::as_str) == Some(classification)
        });

        match existing {
            Some(block) => {
                let props = block
                    .as_object_mut()
                    .expect("classification block is an object")
                    .entry("Properties")
                    .or_insert_with(|| Value::Object(Map::new()));
                if !props.is_object() {
                    *props = Value::Object(Map::new());
                }
                let props = props.as_object_mut().expect("checked above");
                for (key, value) in properties {
                    props.insert(key.clone(), Value::String(value.clone()));
                }
            }
            None => {
                let props: Map<String, Value> = properties
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                    .collect();
                blocks.push(json!({
                    "Classification": classification,
                    "Properties": Value::Object(props),
                    "Configurations": [],
                }));
            }
        }
    }

    /// Union caller tags into the document's `Tags` list, caller wins
    pub fn merge_tags(&mut self, tags: &BTreeMap<String, String>) {
        let list = self
            .root
            .as_object_mut()
            .expect("document root is an object")
            .entry("Tags")
            .or_insert(Value::Null);
        if !list.is_array() {
            *list = Value::Array(Vec::new());
        }
        let list = list.as_array_mut().expect("checked above");

        for (key, value) in tags {
            let existing = list
                .iter_mut()
                .find(|t| t.get("Key").and_then(Value::as_str) == Some(key.as_str()));
            match existing {
                Some(tag) => {
                    tag.as_object_mut()
                        .expect("tag is an object")
                        .insert("Value".to_string(), Value::String(value.clone()));
                }
                None => list.push(json!({ "Key": key, "Value": value })),
            }
        }
    }

    /// Copy of the document with null fields removed, ready for the create call
    pub fn stripped(&self) -> Value {
        strip_nulls(&self.root).unwrap_or(Value::Object(Map::new()))
    }
}

/// Recursively drop nulls; empty containers that only held nulls are dropped too
fn strip_nulls(value: &Value) -> Option<Value> {
    match value {
        Value::Null => None,
        Value::Object(map) => {
            let stripped: Map<String, Value> = map
                .iter()
                .filter_map(|(k, v)| strip_nulls(v).map(|v| (k.clone(), v)))
                .collect();
            if stripped.is_empty() {
                None
            } else {
                Some(Value::Object(stripped))
            }
        }
        Value::Array(items) => {
            let stripped: Vec<Value> = items.iter().filter_map(strip_nulls).collect();
            Some(Value::Array(stripped))
        }
        other => Some(other.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_parse_path() {
        let path: FieldPath = "Instances.InstanceGroups.1.InstanceCount".parse().unwrap();
        assert_eq!(path.segments().len(), 4);
        assert_eq!(path.segments()[2], PathSegment::Index(1));
        assert_eq!(path.to_string(), "Instances.InstanceGroups.1.InstanceCount");
    }

    #[test]
    fn test_skeleton_has_explicit_nulls() {
        let doc = LaunchDocument::skeleton();
        let path: FieldPath = "Instances.Ec2SubnetId".parse().unwrap();
        assert_eq!(doc.get(&path), Some(&Value::Null));
    }

    #[test]
    fn test_set_existing_path() {
        let mut doc = LaunchDocument::skeleton();
        let path: FieldPath = "Name".parse().unwrap();
        doc.set(&path, json!("basic")).unwrap();
        assert_eq!(doc.get(&path), Some(&json!("basic")));
    }

    #[test]
    fn test_set_missing_path_fails() {
        let mut doc = LaunchDocument::skeleton();
        let path: FieldPath = "Instances.NoSuchField".parse().unwrap();
        let err = doc.set(&path, json!(1)).unwrap_err();
        assert!(matches!(err, LaunchError::InvalidOverride(_)));
        assert!(err.to_string().contains("update path not found"));
    }

    #[test]
    fn test_set_sequence_position() {
        let mut doc = LaunchDocument::skeleton();
        let groups: FieldPath = "Instances.InstanceGroups".parse().unwrap();
        doc.set(
            &groups,
            json!([
                { "Name": "primary", "InstanceCount": 1 },
                { "Name": "core", "InstanceCount": 2 },
            ]),
        )
        .unwrap();

        let count: FieldPath = "Instances.InstanceGroups.1.InstanceCount".parse().unwrap();
        doc.set(&count, json!(4)).unwrap();
        assert_eq!(doc.get(&count), Some(&json!(4)));

        // Out-of-range index is a missing path, not an append
        let missing: FieldPath = "Instances.InstanceGroups.5.InstanceCount".parse().unwrap();
        assert!(doc.set(&missing, json!(1)).is_err());
    }

    #[test]
    fn test_merge_classification_appends_then_unions() {
        let mut doc = LaunchDocument::skeleton();
        doc.merge_classification("spark-defaults", &props(&[("spark.executor.cores", "2")]));
        doc.merge_classification(
            "spark-defaults",
            &props(&[("spark.executor.cores", "4"), ("spark.driver.memory", "2g")]),
        );

        let blocks = doc.as_value().get("Configurations").unwrap().as_array().unwrap();
        assert_eq!(blocks.len(), 1, "same classification must not duplicate");
        let properties = blocks[0].get("Properties").unwrap();
        assert_eq!(properties.get("spark.executor.cores"), Some(&json!("4")));
        assert_eq!(properties.get("spark.driver.memory"), Some(&json!("2g")));
    }

    #[test]
    fn test_merge_classification_idempotent() {
        let mut doc = LaunchDocument::skeleton();
        let input = props(&[("hive.metastore.warehouse.dir", "/warehouse")]);
        doc.merge_classification("hive-site", &input);
        let once = doc.clone();
        doc.merge_classification("hive-site", &input);
        assert_eq!(doc, once);
    }

    #[test]
    fn test_merge_tags_caller_wins() {
        let mut doc = LaunchDocument::skeleton();
        doc.merge_tags(&props(&[("team", "data"), ("env", "dev")]));
        doc.merge_tags(&props(&[("env", "prod")]));

        let tags = doc.as_value().get("Tags").unwrap().as_array().unwrap();
        assert_eq!(tags.len(), 2);
        let env = tags
            .iter()
            .find(|t| t.get("Key") == Some(&json!("env")))
            .unwrap();
        assert_eq!(env.get("Value"), Some(&json!("prod")));
    }

    #[test]
    fn test_stripped_removes_nulls() {
        let mut doc = LaunchDocument::skeleton();
        doc.set(&"Name".parse().unwrap(), json!("basic")).unwrap();
        doc.set(&"ServiceRole".parse().unwrap(), json!("service-role"))
            .unwrap();

        let stripped = doc.stripped();
        assert_eq!(stripped.get("Name"), Some(&json!("basic")));
        assert!(stripped.get("LogUri").is_none());
        assert!(stripped.get("Instances").is_none(), "all-null subtree dropped");
    }
}
