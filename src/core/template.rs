//! Template authoring files
//!
//! Profiles, Configurations, and Launch Functions are authored as YAML
//! documents, validated, and converted into their domain types before being
//! published to the registry.

use crate::core::configuration::{
    BootstrapAction, Configuration, InstanceFleetSpec, InstanceGroupSpec, ManagedScaling,
    SecretBinding, Topology,
};
use crate::core::error::LaunchError;
use crate::core::function::{LaunchFunction, TemplateRef};
use crate::core::overrides::OverrideSpec;
use crate::core::profile::{FineGrainedAccess, KerberosSettings, Profile, S3EncryptionMode};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

const NAME_PATTERN: &str = r"^[A-Za-z0-9][A-Za-z0-9._-]{0,127}$";

fn validate_name(kind: &str, name: &str) -> Result<(), LaunchError> {
    let re = Regex::new(NAME_PATTERN).expect("static pattern");
    if re.is_match(name) {
        Ok(())
    } else {
        Err(LaunchError::Template(format!(
            "invalid {} name '{}': must match {}",
            kind, name, NAME_PATTERN
        )))
    }
}

/// A single authored template of any kind
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TemplateFile {
    Profile(ProfileTemplate),
    Configuration(ConfigurationTemplate),
    Function(FunctionTemplate),
}

impl TemplateFile {
    /// Load a template from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, LaunchError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| LaunchError::Template(format!("cannot read template file: {}", e)))?;
        Self::from_yaml(&content)
    }

    /// Parse a template from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, LaunchError> {
        let template: TemplateFile = serde_yaml::from_str(yaml)
            .map_err(|e| LaunchError::Template(format!("invalid template: {}", e)))?;
        template.validate()?;
        Ok(template)
    }

    pub fn validate(&self) -> Result<(), LaunchError> {
        match self {
            TemplateFile::Profile(t) => t.validate(),
            TemplateFile::Configuration(t) => t.validate(),
            TemplateFile::Function(t) => t.validate(),
        }
    }
}

/// Authored form of a Profile
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileTemplate {
    pub name: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub subnet_ids: Vec<String>,
    #[serde(default)]
    pub instance_role: Option<String>,
    #[serde(default)]
    pub service_role: Option<String>,
    #[serde(default)]
    pub autoscaling_role: Option<String>,
    #[serde(default)]
    pub log_destination: Option<String>,
    #[serde(default)]
    pub managed_primary_security_group: Option<String>,
    #[serde(default)]
    pub managed_core_security_group: Option<String>,
    #[serde(default)]
    pub service_access_security_group: Option<String>,
    #[serde(default)]
    pub in_transit_certificate: Option<String>,
    #[serde(default)]
    pub s3_encryption_mode: Option<S3EncryptionMode>,
    #[serde(default)]
    pub s3_encryption_key: Option<String>,
    #[serde(default)]
    pub local_disk_encryption_key: Option<String>,
    #[serde(default)]
    pub kerberos: Option<KerberosSettings>,
    #[serde(default)]
    pub fine_grained_access: Option<FineGrainedAccess>,
    #[serde(default)]
    pub custom_security_configuration: Option<Value>,
}

fn default_namespace() -> String {
    "default".to_string()
}

impl ProfileTemplate {
    pub fn validate(&self) -> Result<(), LaunchError> {
        validate_name("profile", &self.name)?;
        if self.custom_security_configuration.is_some()
            && (self.in_transit_certificate.is_some()
                || self.s3_encryption_mode.is_some()
                || self.local_disk_encryption_key.is_some()
                || self.kerberos.is_some()
                || self.fine_grained_access.is_some())
        {
            return Err(LaunchError::Template(
                "custom_security_configuration is mutually exclusive with field-by-field encryption settings"
                    .to_string(),
            ));
        }
        if self.s3_encryption_key.is_some() && self.s3_encryption_mode.is_none() {
            return Err(LaunchError::Template(
                "s3_encryption_key requires s3_encryption_mode".to_string(),
            ));
        }
        Ok(())
    }

    /// Convert into the domain Profile
    pub fn to_profile(&self) -> Result<Profile, LaunchError> {
        let mut profile = Profile::new(&self.namespace, &self.name);
        profile.description = self.description.clone();
        profile.subnet_ids = self.subnet_ids.clone();
        profile.instance_role = self.instance_role.clone();
        profile.service_role = self.service_role.clone();
        profile.autoscaling_role = self.autoscaling_role.clone();
        profile.log_destination = self.log_destination.clone();
        profile.security_groups.managed_primary = self.managed_primary_security_group.clone();
        profile.security_groups.managed_core = self.managed_core_security_group.clone();
        profile.security_groups.service_access = self.service_access_security_group.clone();

        if let Some(cert) = &self.in_transit_certificate {
            profile.set_in_transit_certificate(cert)?;
        }
        if let Some(mode) = self.s3_encryption_mode {
            profile.set_s3_encryption(mode, self.s3_encryption_key.as_deref())?;
        }
        if let Some(key) = &self.local_disk_encryption_key {
            profile.set_local_disk_encryption(key)?;
        }
        if let Some(kerberos) = &self.kerberos {
            profile.set_kerberos(kerberos.clone())?;
        }
        if let Some(access) = &self.fine_grained_access {
            profile.set_fine_grained_access(access.clone())?;
        }
        if let Some(descriptor) = &self.custom_security_configuration {
            profile.set_custom_security_configuration(descriptor.clone())?;
        }
        Ok(profile)
    }
}

/// Authored form of a Configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigurationTemplate {
    pub name: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub applications: Vec<String>,
    #[serde(default)]
    pub release_label: Option<String>,
    pub topology: TopologyTemplate,
    #[serde(default = "default_keep_alive")]
    pub keep_alive: bool,
    #[serde(default)]
    pub managed_catalog: bool,
    #[serde(default)]
    pub classifications: Vec<ClassificationTemplate>,
    #[serde(default)]
    pub bootstrap_actions: Vec<BootstrapAction>,
    #[serde(default)]
    pub secrets: Vec<SecretBinding>,
    #[serde(default)]
    pub overrides: BTreeMap<String, OverrideSpec>,
}

fn default_keep_alive() -> bool {
    true
}

/// One authored property block
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationTemplate {
    pub classification: String,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

/// Authored topology, mirroring the domain union
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TopologyTemplate {
    InstanceGroups {
        groups: Vec<InstanceGroupSpec>,
        #[serde(default)]
        scaling: Option<ManagedScaling>,
    },
    InstanceFleets {
        fleets: Vec<InstanceFleetSpec>,
    },
}

impl ConfigurationTemplate {
    pub fn validate(&self) -> Result<(), LaunchError> {
        validate_name("configuration", &self.name)?;

        let mut seen = std::collections::HashSet::new();
        for block in &self.classifications {
            if !seen.insert(&block.classification) {
                return Err(LaunchError::Template(format!(
                    "duplicate classification '{}'",
                    block.classification
                )));
            }
        }

        match &self.topology {
            TopologyTemplate::InstanceGroups { groups, .. } if groups.is_empty() => {
                return Err(LaunchError::Template(
                    "instance_groups topology requires at least one group".to_string(),
                ));
            }
            TopologyTemplate::InstanceFleets { fleets } if fleets.is_empty() => {
                return Err(LaunchError::Template(
                    "instance_fleets topology requires at least one fleet".to_string(),
                ));
            }
            _ => {}
        }
        Ok(())
    }

    /// Convert into the domain Configuration
    pub fn to_configuration(&self) -> Result<Configuration, LaunchError> {
        let topology = match &self.topology {
            TopologyTemplate::InstanceGroups { groups, scaling } => Topology::InstanceGroups {
                groups: groups.clone(),
                scaling: scaling.clone(),
            },
            TopologyTemplate::InstanceFleets { fleets } => Topology::InstanceFleets {
                fleets: fleets.clone(),
            },
        };

        let mut builder = Configuration::builder(&self.namespace, &self.name)
            .topology(topology)
            .keep_alive(self.keep_alive)
            .managed_catalog(self.managed_catalog)
            .applications(&self.applications.iter().map(String::as_str).collect::<Vec<_>>());
        if let Some(description) = &self.description {
            builder = builder.description(description);
        }
        if let Some(label) = &self.release_label {
            builder = builder.release_label(label);
        }
        for block in &self.classifications {
            builder = builder.classification(&block.classification, block.properties.clone());
        }
        for action in &self.bootstrap_actions {
            builder = builder.bootstrap_action(action.clone());
        }
        for secret in &self.secrets {
            builder = builder.secret_binding(secret.clone());
        }
        for (field, spec) in &self.overrides {
            builder = builder.expose_override(field, spec.clone());
        }
        builder.build()
    }
}

/// Authored form of a Launch Function
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionTemplate {
    pub name: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    pub profile: String,
    pub configuration: String,
    #[serde(default)]
    pub cluster_name_template: Option<String>,
    #[serde(default = "default_fail_if_running")]
    pub fail_if_running: bool,
    #[serde(default)]
    pub success_target: Option<String>,
    #[serde(default)]
    pub failure_target: Option<String>,
    #[serde(default)]
    pub overrides: BTreeMap<String, OverrideSpec>,
    #[serde(default)]
    pub wait_for_completion: bool,
}

fn default_fail_if_running() -> bool {
    true
}

impl FunctionTemplate {
    pub fn validate(&self) -> Result<(), LaunchError> {
        validate_name("launch function", &self.name)?;
        validate_name("profile", &self.profile)?;
        validate_name("configuration", &self.configuration)?;
        Ok(())
    }

    /// Convert into the domain Launch Function
    pub fn to_function(&self) -> LaunchFunction {
        let mut function = LaunchFunction::new(
            &self.namespace,
            &self.name,
            TemplateRef::new(&self.namespace, &self.profile),
            TemplateRef::new(&self.namespace, &self.configuration),
        );
        if let Some(template) = &self.cluster_name_template {
            function.cluster_name_template = template.clone();
        }
        function.fail_if_running = self.fail_if_running;
        function.success_target = self.success_target.clone();
        function.failure_target = self.failure_target.clone();
        function.allowed_overrides = self.overrides.clone();
        function.wait_for_completion = self.wait_for_completion;
        function
    }
}
