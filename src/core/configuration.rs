//! Resource-topology configuration template
//!
//! A Configuration is the reusable topology half of a launch: applications,
//! instance layout, property blocks, bootstrap actions, and the override
//! interface that names which document fields a caller may mutate.

use crate::core::document::{FieldPath, LaunchDocument};
use crate::core::error::LaunchError;
use crate::core::overrides::OverrideSpec;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;

/// Property the managed catalog injects into hive-site / spark-hive-site
const CATALOG_FACTORY_KEY: &str = "hive.metastore.client.factory.class";
const CATALOG_FACTORY_CLASS: &str =
    "com.amazonaws.glue.catalog.metastore.AWSGlueDataCatalogHiveClientFactory";
const CATALOG_CLASSIFICATIONS: [&str; 2] = ["hive-site", "spark-hive-site"];

/// One instance group in an instance-group topology
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InstanceGroupSpec {
    pub name: String,
    pub role: String,
    pub instance_type: String,
    pub instance_count: u32,
    #[serde(default)]
    pub market: Option<String>,
}

/// One fleet in an instance-fleet topology
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InstanceFleetSpec {
    pub name: String,
    pub role: String,
    #[serde(default)]
    pub target_on_demand_capacity: u32,
    #[serde(default)]
    pub target_spot_capacity: u32,
    #[serde(default)]
    pub instance_types: Vec<String>,
}

/// Ceiling and floor for managed scaling
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ManagedScaling {
    pub minimum_capacity_units: u32,
    pub maximum_capacity_units: u32,
}

/// Instance layout, as a tagged union rather than a builder hierarchy
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Topology {
    InstanceGroups {
        groups: Vec<InstanceGroupSpec>,
        #[serde(default)]
        scaling: Option<ManagedScaling>,
    },
    InstanceFleets {
        fleets: Vec<InstanceFleetSpec>,
    },
}

/// A bootstrap/init action, optionally bound to a code artifact
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BootstrapAction {
    pub name: String,
    pub script_path: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Artifact location the script is staged from, when it ships with the template
    #[serde(default)]
    pub artifact: Option<String>,
}

/// A secret the launched cluster needs resolved at runtime
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SecretBinding {
    pub name: String,
    pub secret_ref: String,
}

/// Reusable resource-topology template
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Configuration {
    pub name: String,
    pub namespace: String,
    #[serde(default)]
    pub description: Option<String>,

    document: LaunchDocument,

    #[serde(default)]
    pub bootstrap_actions: Vec<BootstrapAction>,
    #[serde(default)]
    pub secret_bindings: Vec<SecretBinding>,

    /// Caller-facing override interface
    #[serde(default)]
    override_interface: BTreeMap<String, OverrideSpec>,

    /// Set when rehydrated from the registry; mutation is then rejected
    #[serde(default)]
    read_only: bool,
}

impl Configuration {
    pub fn builder(namespace: &str, name: &str) -> ConfigurationBuilder {
        ConfigurationBuilder::new(namespace, name)
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub(crate) fn mark_read_only(&mut self) {
        self.read_only = true;
    }

    fn guard_mutable(&self) -> Result<(), LaunchError> {
        if self.read_only {
            Err(LaunchError::read_only("configuration", &self.name))
        } else {
            Ok(())
        }
    }

    /// The base launch document (read-only snapshot)
    pub fn document(&self) -> &LaunchDocument {
        &self.document
    }

    pub fn override_interface(&self) -> &BTreeMap<String, OverrideSpec> {
        &self.override_interface
    }

    /// Register an overridable field on the interface
    pub fn expose_override(&mut self, field: &str, spec: OverrideSpec) -> Result<(), LaunchError> {
        self.guard_mutable()?;
        self.override_interface.insert(field.to_string(), spec);
        Ok(())
    }

    /// Upsert a classification property block into the document
    pub fn append_classification(
        &mut self,
        classification: &str,
        properties: &BTreeMap<String, String>,
    ) -> Result<(), LaunchError> {
        self.guard_mutable()?;
        self.document.merge_classification(classification, properties);
        Ok(())
    }

    /// Append extra packages to the `spark-defaults` block
    pub fn append_packages(&mut self, packages: &[String]) -> Result<(), LaunchError> {
        self.append_list_property("spark-defaults", "spark.jars.packages", packages)
    }

    /// Append extra jars to the `spark-defaults` block
    pub fn append_jars(&mut self, jars: &[String]) -> Result<(), LaunchError> {
        self.append_list_property("spark-defaults", "spark.jars", jars)
    }

    fn append_list_property(
        &mut self,
        classification: &str,
        key: &str,
        items: &[String],
    ) -> Result<(), LaunchError> {
        self.guard_mutable()?;
        if items.is_empty() {
            return Ok(());
        }

        // Union with any already-listed entries, preserving order
        let blocks_path: FieldPath = "Configurations".parse().expect("static path");
        let mut merged: Vec<String> = Vec::new();
        if let Some(blocks) = self.document.get(&blocks_path).and_then(Value::as_array) {
            if let Some(existing) = blocks
                .iter()
                .find(|b| b.get("Classification").and_then(Value::as_str) == Some(classification))
                .and_then(|b| b.get("Properties"))
                .and_then(|p| p.get(key))
                .and_then(Value::as_str)
            {
                merged.extend(existing.split(',').map(str::to_string));
            }
        }
        for item in items {
            if !merged.contains(item) {
                merged.push(item.clone());
            }
        }

        let mut props = BTreeMap::new();
        props.insert(key.to_string(), merged.join(","));
        self.document.merge_classification(classification, &props);
        Ok(())
    }

    /// Append a bootstrap action to the template and its document
    pub fn append_bootstrap_action(&mut self, action: BootstrapAction) -> Result<(), LaunchError> {
        self.guard_mutable()?;
        let entry = json!({
            "Name": action.name,
            "ScriptBootstrapAction": {
                "Path": action.script_path,
                "Args": action.args,
            }
        });
        let actions = self
            .document
            .get(&"BootstrapActions".parse().expect("static path"))
            .cloned()
            .unwrap_or(Value::Null);
        let mut list = match actions {
            Value::Array(items) => items,
            _ => Vec::new(),
        };
        list.push(entry);
        self.document
            .set(&"BootstrapActions".parse().expect("static path"), Value::Array(list))?;
        self.bootstrap_actions.push(action);
        Ok(())
    }
}

/// Composition-based builder over the topology union
pub struct ConfigurationBuilder {
    namespace: String,
    name: String,
    description: Option<String>,
    applications: Vec<String>,
    release_label: Option<String>,
    topology: Option<Topology>,
    keep_alive: bool,
    classifications: Vec<(String, BTreeMap<String, String>)>,
    bootstrap_actions: Vec<BootstrapAction>,
    secret_bindings: Vec<SecretBinding>,
    override_interface: BTreeMap<String, OverrideSpec>,
    managed_catalog: bool,
}

impl ConfigurationBuilder {
    pub fn new(namespace: &str, name: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
            description: None,
            applications: Vec::new(),
            release_label: None,
            topology: None,
            keep_alive: true,
            classifications: Vec::new(),
            bootstrap_actions: Vec::new(),
            secret_bindings: Vec::new(),
            override_interface: BTreeMap::new(),
            managed_catalog: false,
        }
    }

    pub fn description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    pub fn applications(mut self, applications: &[&str]) -> Self {
        self.applications = applications.iter().map(|a| a.to_string()).collect();
        self
    }

    pub fn release_label(mut self, label: &str) -> Self {
        self.release_label = Some(label.to_string());
        self
    }

    pub fn topology(mut self, topology: Topology) -> Self {
        self.topology = Some(topology);
        self
    }

    /// Whether the cluster idles after provisioning instead of auto-terminating
    pub fn keep_alive(mut self, keep_alive: bool) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    pub fn classification(mut self, label: &str, properties: BTreeMap<String, String>) -> Self {
        self.classifications.push((label.to_string(), properties));
        self
    }

    pub fn bootstrap_action(mut self, action: BootstrapAction) -> Self {
        self.bootstrap_actions.push(action);
        self
    }

    pub fn secret_binding(mut self, binding: SecretBinding) -> Self {
        self.secret_bindings.push(binding);
        self
    }

    pub fn expose_override(mut self, field: &str, spec: OverrideSpec) -> Self {
        self.override_interface.insert(field.to_string(), spec);
        self
    }

    /// Wire the managed data catalog into hive-site and spark-hive-site
    pub fn managed_catalog(mut self, enabled: bool) -> Self {
        self.managed_catalog = enabled;
        self
    }

    pub fn build(self) -> Result<Configuration, LaunchError> {
        let topology = self
            .topology
            .ok_or_else(|| LaunchError::Template("configuration requires a topology".to_string()))?;

        let mut document = LaunchDocument::skeleton();

        let apps: Vec<Value> = self
            .applications
            .iter()
            .map(|a| json!({ "Name": a }))
            .collect();
        document.set(&path("Applications"), Value::Array(apps))?;
        if let Some(label) = &self.release_label {
            document.set(&path("ReleaseLabel"), json!(label))?;
        }
        document.set(&path("VisibleToAllUsers"), json!(true))?;
        document.set(
            &path("Instances.KeepJobFlowAliveWhenNoSteps"),
            json!(self.keep_alive),
        )?;

        match &topology {
            Topology::InstanceGroups { groups, scaling } => {
                let rendered: Vec<Value> = groups
                    .iter()
                    .map(|g| {
                        json!({
                            "Name": g.name,
                            "InstanceRole": g.role,
                            "InstanceType": g.instance_type,
                            "InstanceCount": g.instance_count,
                            "Market": g.market.as_deref().unwrap_or("ON_DEMAND"),
                        })
                    })
                    .collect();
                document.set(&path("Instances.InstanceGroups"), Value::Array(rendered))?;
                if let Some(scaling) = scaling {
                    document.set(
                        &path("ManagedScalingPolicy"),
                        json!({
                            "ComputeLimits": {
                                "UnitType": "Instances",
                                "MinimumCapacityUnits": scaling.minimum_capacity_units,
                                "MaximumCapacityUnits": scaling.maximum_capacity_units,
                            }
                        }),
                    )?;
                }
            }
            Topology::InstanceFleets { fleets } => {
                let rendered: Vec<Value> = fleets
                    .iter()
                    .map(|f| {
                        json!({
                            "Name": f.name,
                            "InstanceFleetType": f.role,
                            "TargetOnDemandCapacity": f.target_on_demand_capacity,
                            "TargetSpotCapacity": f.target_spot_capacity,
                            "InstanceTypeConfigs": f
                                .instance_types
                                .iter()
                                .map(|t| json!({ "InstanceType": t }))
                                .collect::<Vec<_>>(),
                        })
                    })
                    .collect();
                document.set(&path("Instances.InstanceFleets"), Value::Array(rendered))?;
            }
        }

        // Caller blocks first, so catalog injection merges into them
        for (label, properties) in &self.classifications {
            document.merge_classification(label, properties);
        }
        if self.managed_catalog {
            let mut catalog = BTreeMap::new();
            catalog.insert(CATALOG_FACTORY_KEY.to_string(), CATALOG_FACTORY_CLASS.to_string());
            for label in CATALOG_CLASSIFICATIONS {
                document.merge_classification(label, &catalog);
            }
        }

        let mut configuration = Configuration {
            name: self.name,
            namespace: self.namespace,
            description: self.description,
            document,
            bootstrap_actions: Vec::new(),
            secret_bindings: self.secret_bindings,
            override_interface: self.override_interface,
            read_only: false,
        };
        for action in self.bootstrap_actions {
            configuration.append_bootstrap_action(action)?;
        }
        Ok(configuration)
    }
}

fn path(s: &str) -> FieldPath {
    s.parse().expect("static path")
}
