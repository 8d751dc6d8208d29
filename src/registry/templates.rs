//! Typed template store over the registry
//!
//! Saves and loads the three template kinds as JSON. Anything loaded back
//! out is marked read-only: rehydrated instances are frozen, and further
//! mutation must go through a fresh build + publish. The store-bound
//! handles write through to the registry after every mutation so the
//! persisted form never lags the in-memory one.

use crate::core::configuration::{BootstrapAction, Configuration};
use crate::core::error::LaunchError;
use crate::core::function::LaunchFunction;
use crate::core::overrides::OverrideSpec;
use crate::core::profile::Profile;
use crate::registry::{Registry, TemplateKind};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Typed save/load for Profiles, Configurations, and Launch Functions
#[derive(Clone)]
pub struct TemplateStore {
    registry: Arc<dyn Registry>,
}

impl TemplateStore {
    pub fn new(registry: Arc<dyn Registry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<dyn Registry> {
        &self.registry
    }

    fn encode<T: Serialize>(value: &T) -> Result<Value, LaunchError> {
        serde_json::to_value(value).map_err(|e| LaunchError::Registry(e.to_string()))
    }

    fn decode<T: DeserializeOwned>(value: Value) -> Result<T, LaunchError> {
        serde_json::from_value(value).map_err(|e| LaunchError::Registry(e.to_string()))
    }

    pub async fn save_profile(&self, profile: &Profile) -> Result<(), LaunchError> {
        debug!("publishing profile {}/{}", profile.namespace, profile.name);
        self.registry
            .put(
                TemplateKind::Profile,
                &profile.namespace,
                &profile.name,
                Self::encode(profile)?,
            )
            .await
    }

    /// Load a profile; the returned instance is frozen
    pub async fn load_profile(&self, namespace: &str, name: &str) -> Result<Profile, LaunchError> {
        let body = self.registry.get(TemplateKind::Profile, namespace, name).await?;
        let mut profile: Profile = Self::decode(body)?;
        profile.mark_read_only();
        Ok(profile)
    }

    pub async fn save_configuration(&self, configuration: &Configuration) -> Result<(), LaunchError> {
        debug!(
            "publishing configuration {}/{}",
            configuration.namespace, configuration.name
        );
        self.registry
            .put(
                TemplateKind::Configuration,
                &configuration.namespace,
                &configuration.name,
                Self::encode(configuration)?,
            )
            .await
    }

    /// Load a configuration; the returned instance is frozen
    pub async fn load_configuration(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Configuration, LaunchError> {
        let body = self
            .registry
            .get(TemplateKind::Configuration, namespace, name)
            .await?;
        let mut configuration: Configuration = Self::decode(body)?;
        configuration.mark_read_only();
        Ok(configuration)
    }

    pub async fn save_function(&self, function: &LaunchFunction) -> Result<(), LaunchError> {
        debug!("publishing function {}/{}", function.namespace, function.name);
        self.registry
            .put(
                TemplateKind::Function,
                &function.namespace,
                &function.name,
                Self::encode(function)?,
            )
            .await
    }

    /// Load a launch function; the returned instance is frozen
    pub async fn load_function(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<LaunchFunction, LaunchError> {
        let body = self.registry.get(TemplateKind::Function, namespace, name).await?;
        let mut function: LaunchFunction = Self::decode(body)?;
        function.mark_read_only();
        Ok(function)
    }

    /// All entry names of one kind in a namespace, following page tokens
    pub async fn list_names(
        &self,
        kind: TemplateKind,
        namespace: &str,
    ) -> Result<Vec<String>, LaunchError> {
        let mut names = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let page = self.registry.list(kind, namespace, token.as_deref()).await?;
            names.extend(page.names);
            match page.next_token {
                Some(next) => token = Some(next),
                None => break,
            }
        }
        Ok(names)
    }

    /// Open a write-through editing handle on a not-yet-frozen configuration
    pub fn edit_configuration(&self, configuration: Configuration) -> ConfigurationHandle {
        ConfigurationHandle {
            configuration,
            store: self.clone(),
        }
    }

    /// Open a write-through editing handle on a not-yet-frozen profile
    pub fn edit_profile(&self, profile: Profile) -> ProfileHandle {
        ProfileHandle {
            profile,
            store: self.clone(),
        }
    }
}

/// Write-through editor: every mutation republishes the configuration
pub struct ConfigurationHandle {
    configuration: Configuration,
    store: TemplateStore,
}

impl ConfigurationHandle {
    pub fn get(&self) -> &Configuration {
        &self.configuration
    }

    pub fn into_inner(self) -> Configuration {
        self.configuration
    }

    pub async fn append_classification(
        &mut self,
        classification: &str,
        properties: &BTreeMap<String, String>,
    ) -> Result<(), LaunchError> {
        self.configuration
            .append_classification(classification, properties)?;
        self.store.save_configuration(&self.configuration).await
    }

    pub async fn append_packages(&mut self, packages: &[String]) -> Result<(), LaunchError> {
        self.configuration.append_packages(packages)?;
        self.store.save_configuration(&self.configuration).await
    }

    pub async fn append_jars(&mut self, jars: &[String]) -> Result<(), LaunchError> {
        self.configuration.append_jars(jars)?;
        self.store.save_configuration(&self.configuration).await
    }

    pub async fn append_bootstrap_action(
        &mut self,
        action: BootstrapAction,
    ) -> Result<(), LaunchError> {
        self.configuration.append_bootstrap_action(action)?;
        self.store.save_configuration(&self.configuration).await
    }

    pub async fn expose_override(
        &mut self,
        field: &str,
        spec: OverrideSpec,
    ) -> Result<(), LaunchError> {
        self.configuration.expose_override(field, spec)?;
        self.store.save_configuration(&self.configuration).await
    }
}

/// Write-through editor: every setter republishes the profile
pub struct ProfileHandle {
    profile: Profile,
    store: TemplateStore,
}

impl ProfileHandle {
    pub fn get(&self) -> &Profile {
        &self.profile
    }

    pub fn into_inner(self) -> Profile {
        self.profile
    }

    pub async fn set_in_transit_certificate(&mut self, cert: &str) -> Result<(), LaunchError> {
        self.profile.set_in_transit_certificate(cert)?;
        self.store.save_profile(&self.profile).await
    }

    pub async fn set_s3_encryption(
        &mut self,
        mode: crate::core::profile::S3EncryptionMode,
        key_ref: Option<&str>,
    ) -> Result<(), LaunchError> {
        self.profile.set_s3_encryption(mode, key_ref)?;
        self.store.save_profile(&self.profile).await
    }

    pub async fn set_local_disk_encryption(&mut self, key_ref: &str) -> Result<(), LaunchError> {
        self.profile.set_local_disk_encryption(key_ref)?;
        self.store.save_profile(&self.profile).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::configuration::{InstanceGroupSpec, Topology};
    use crate::registry::InMemoryRegistry;

    fn store() -> TemplateStore {
        TemplateStore::new(Arc::new(InMemoryRegistry::new()))
    }

    fn basic_configuration() -> Configuration {
        Configuration::builder("default", "basic")
            .applications(&["Spark"])
            .topology(Topology::InstanceGroups {
                groups: vec![InstanceGroupSpec {
                    name: "primary".to_string(),
                    role: "MASTER".to_string(),
                    instance_type: "m5.xlarge".to_string(),
                    instance_count: 1,
                    market: None,
                }],
                scaling: None,
            })
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_rehydrated_configuration_is_frozen() {
        let store = store();
        let configuration = basic_configuration();
        assert!(!configuration.is_read_only());
        store.save_configuration(&configuration).await.unwrap();

        let mut loaded = store.load_configuration("default", "basic").await.unwrap();
        assert!(loaded.is_read_only());
        assert!(loaded.append_packages(&["a:b:1".to_string()]).is_err());
    }

    #[tokio::test]
    async fn test_rehydrated_profile_is_frozen() {
        let store = store();
        let profile = Profile::new("default", "secure");
        store.save_profile(&profile).await.unwrap();

        let mut loaded = store.load_profile("default", "secure").await.unwrap();
        assert!(loaded.is_read_only());
        assert!(loaded.set_local_disk_encryption("kms-key").is_err());
    }

    #[tokio::test]
    async fn test_write_through_handle_republishes() {
        let store = store();
        let configuration = basic_configuration();
        store.save_configuration(&configuration).await.unwrap();

        let mut handle = store.edit_configuration(configuration);
        handle
            .append_packages(&["io.delta:delta-core:2.4.0".to_string()])
            .await
            .unwrap();

        // The registry copy already carries the appended package
        let loaded = store.load_configuration("default", "basic").await.unwrap();
        let blocks = loaded
            .document()
            .as_value()
            .get("Configurations")
            .unwrap()
            .as_array()
            .unwrap();
        assert!(blocks.iter().any(|b| {
            b.get("Properties")
                .and_then(|p| p.get("spark.jars.packages"))
                .and_then(Value::as_str)
                .map(|s| s.contains("delta-core"))
                .unwrap_or(false)
        }));
    }

    #[tokio::test]
    async fn test_list_names() {
        let store = store();
        for name in ["alpha", "beta"] {
            let mut f = crate::core::function::LaunchFunction::new(
                "default",
                name,
                crate::core::function::TemplateRef::new("default", "p"),
                crate::core::function::TemplateRef::new("default", "c"),
            );
            f.cluster_name_template = "{name}".to_string();
            store.save_function(&f).await.unwrap();
        }

        let names = store
            .list_names(TemplateKind::Function, "default")
            .await
            .unwrap();
        assert_eq!(names, vec!["alpha", "beta"]);
    }
}
