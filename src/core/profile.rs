//! Security and network profile
//!
//! A Profile is the reusable security/network half of a launch: identity
//! roles, security groups, subnets, log destination, and encryption
//! settings. The derived security configuration is rebuilt after every
//! setter so the persisted form is always consistent with the declared
//! settings.

use crate::core::error::LaunchError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

/// At-rest encryption mode for object storage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum S3EncryptionMode {
    #[serde(rename = "SSE-S3")]
    SseS3,
    #[serde(rename = "SSE-KMS")]
    SseKms,
    #[serde(rename = "CSE-KMS")]
    CseKms,
}

impl S3EncryptionMode {
    fn as_str(&self) -> &'static str {
        match self {
            S3EncryptionMode::SseS3 => "SSE-S3",
            S3EncryptionMode::SseKms => "SSE-KMS",
            S3EncryptionMode::CseKms => "CSE-KMS",
        }
    }
}

/// Managed and additional security-group references
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SecurityGroups {
    pub managed_primary: Option<String>,
    pub managed_core: Option<String>,
    pub service_access: Option<String>,
    #[serde(default)]
    pub additional_primary: Vec<String>,
    #[serde(default)]
    pub additional_core: Vec<String>,
}

/// Kerberos / identity-broker settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KerberosSettings {
    pub realm: String,
    pub kdc_admin_password_secret: String,
    #[serde(default)]
    pub cross_realm_trust_principal_password_secret: Option<String>,
}

/// Fine-grained-access role mappings (identity -> role)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FineGrainedAccess {
    pub idp_arn: String,
    #[serde(default)]
    pub role_mappings: BTreeMap<String, String>,
}

/// Reusable security/network template for launches
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub name: String,
    pub namespace: String,
    #[serde(default)]
    pub description: Option<String>,

    /// Network identity: subnets the cluster may land in
    #[serde(default)]
    pub subnet_ids: Vec<String>,

    /// Role the provisioned instances assume
    pub instance_role: Option<String>,
    /// Role the provisioning service assumes
    pub service_role: Option<String>,
    /// Role used by autoscaling, when a topology scales
    pub autoscaling_role: Option<String>,

    #[serde(default)]
    pub security_groups: SecurityGroups,

    /// Log destination overlaid onto the launch document
    pub log_destination: Option<String>,

    // Encryption settings. Setters below keep the derived descriptor in sync.
    in_transit_certificate: Option<String>,
    s3_encryption_mode: Option<S3EncryptionMode>,
    s3_encryption_key: Option<String>,
    local_disk_encryption_key: Option<String>,
    kerberos: Option<KerberosSettings>,
    fine_grained_access: Option<FineGrainedAccess>,

    /// Opaque descriptor that fully overrides the derived one
    custom_security_configuration: Option<Value>,

    /// Derived encryption/authentication/authorization descriptor
    security_configuration: Option<Value>,

    /// Set when rehydrated from the registry; mutation is then rejected
    #[serde(default)]
    read_only: bool,
}

impl Profile {
    pub fn new(namespace: &str, name: &str) -> Self {
        Self {
            name: name.to_string(),
            namespace: namespace.to_string(),
            description: None,
            subnet_ids: Vec::new(),
            instance_role: None,
            service_role: None,
            autoscaling_role: None,
            security_groups: SecurityGroups::default(),
            log_destination: None,
            in_transit_certificate: None,
            s3_encryption_mode: None,
            s3_encryption_key: None,
            local_disk_encryption_key: None,
            kerberos: None,
            fine_grained_access: None,
            custom_security_configuration: None,
            security_configuration: None,
            read_only: false,
        }
    }

    /// Whether this profile has been frozen by rehydration
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Freeze the profile; called by the store on load
    pub(crate) fn mark_read_only(&mut self) {
        self.read_only = true;
    }

    fn guard_mutable(&self) -> Result<(), LaunchError> {
        if self.read_only {
            Err(LaunchError::read_only("profile", &self.name))
        } else {
            Ok(())
        }
    }

    /// The effective security configuration: custom wins over derived
    pub fn security_configuration(&self) -> Option<&Value> {
        self.custom_security_configuration
            .as_ref()
            .or(self.security_configuration.as_ref())
    }

    pub fn in_transit_certificate(&self) -> Option<&str> {
        self.in_transit_certificate.as_deref()
    }

    pub fn kerberos(&self) -> Option<&KerberosSettings> {
        self.kerberos.as_ref()
    }

    pub fn set_in_transit_certificate(&mut self, certificate_ref: &str) -> Result<(), LaunchError> {
        self.guard_mutable()?;
        self.in_transit_certificate = Some(certificate_ref.to_string());
        self.rebuild_security_configuration();
        Ok(())
    }

    pub fn set_s3_encryption(
        &mut self,
        mode: S3EncryptionMode,
        key_ref: Option<&str>,
    ) -> Result<(), LaunchError> {
        self.guard_mutable()?;
        self.s3_encryption_mode = Some(mode);
        self.s3_encryption_key = key_ref.map(str::to_string);
        self.rebuild_security_configuration();
        Ok(())
    }

    pub fn set_local_disk_encryption(&mut self, key_ref: &str) -> Result<(), LaunchError> {
        self.guard_mutable()?;
        self.local_disk_encryption_key = Some(key_ref.to_string());
        self.rebuild_security_configuration();
        Ok(())
    }

    pub fn set_kerberos(&mut self, settings: KerberosSettings) -> Result<(), LaunchError> {
        self.guard_mutable()?;
        self.kerberos = Some(settings);
        self.rebuild_security_configuration();
        Ok(())
    }

    pub fn set_fine_grained_access(&mut self, access: FineGrainedAccess) -> Result<(), LaunchError> {
        self.guard_mutable()?;
        self.fine_grained_access = Some(access);
        self.rebuild_security_configuration();
        Ok(())
    }

    /// Install an opaque descriptor, replacing the derived one entirely
    pub fn set_custom_security_configuration(&mut self, descriptor: Value) -> Result<(), LaunchError> {
        self.guard_mutable()?;
        self.custom_security_configuration = Some(descriptor);
        Ok(())
    }

    /// Recompute the derived descriptor from whichever settings are present
    ///
    /// Idempotent: the output depends only on the current settings, so
    /// re-running after every setter keeps the persisted form consistent.
    fn rebuild_security_configuration(&mut self) {
        let mut encryption = Map::new();

        if let Some(cert) = &self.in_transit_certificate {
            encryption.insert(
                "EnableInTransitEncryption".to_string(),
                Value::Bool(true),
            );
            encryption.insert(
                "InTransitEncryptionConfiguration".to_string(),
                json!({
                    "TLSCertificateConfiguration": {
                        "CertificateProviderType": "PEM",
                        "S3Object": cert,
                    }
                }),
            );
        }

        let mut at_rest = Map::new();
        if let Some(mode) = self.s3_encryption_mode {
            at_rest.insert(
                "S3EncryptionConfiguration".to_string(),
                json!({
                    "EncryptionMode": mode.as_str(),
                    "AwsKmsKey": self.s3_encryption_key,
                }),
            );
        }
        if let Some(key) = &self.local_disk_encryption_key {
            at_rest.insert(
                "LocalDiskEncryptionConfiguration".to_string(),
                json!({
                    "EncryptionKeyProviderType": "AwsKms",
                    "AwsKmsKey": key,
                }),
            );
        }
        if !at_rest.is_empty() {
            encryption.insert("EnableAtRestEncryption".to_string(), Value::Bool(true));
            encryption.insert(
                "AtRestEncryptionConfiguration".to_string(),
                Value::Object(at_rest),
            );
        }

        let mut descriptor = Map::new();
        if !encryption.is_empty() {
            descriptor.insert("EncryptionConfiguration".to_string(), Value::Object(encryption));
        }

        if let Some(kerberos) = &self.kerberos {
            descriptor.insert(
                "AuthenticationConfiguration".to_string(),
                json!({
                    "KerberosConfiguration": {
                        "Provider": "ClusterDedicatedKdc",
                        "ClusterDedicatedKdcConfiguration": {
                            "TicketLifetimeInHours": 24,
                            "Realm": kerberos.realm,
                        }
                    }
                }),
            );
        }

        if let Some(access) = &self.fine_grained_access {
            descriptor.insert(
                "AuthorizationConfiguration".to_string(),
                json!({
                    "IAMConfiguration": {
                        "EnableApplicationScopedIAMRole": true,
                        "ApplicationScopedIAMRoleConfiguration": {
                            "PropagateSourceIdentity": true,
                        },
                    },
                    "IdentityProviderArn": access.idp_arn,
                    "RoleMappings": access.role_mappings,
                }),
            );
        }

        self.security_configuration = if descriptor.is_empty() {
            None
        } else {
            Some(Value::Object(descriptor))
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_settings_no_descriptor() {
        let profile = Profile::new("default", "plain");
        assert!(profile.security_configuration().is_none());
    }

    #[test]
    fn test_descriptor_rebuilt_after_each_setter() {
        let mut profile = Profile::new("default", "secure");
        profile
            .set_s3_encryption(S3EncryptionMode::SseKms, Some("kms-key-1"))
            .unwrap();

        let first = profile.security_configuration().unwrap().clone();
        assert!(first.get("EncryptionConfiguration").is_some());
        assert!(first.get("AuthenticationConfiguration").is_none());

        profile
            .set_kerberos(KerberosSettings {
                realm: "EXAMPLE.COM".to_string(),
                kdc_admin_password_secret: "secret/kdc".to_string(),
                cross_realm_trust_principal_password_secret: None,
            })
            .unwrap();

        let second = profile.security_configuration().unwrap();
        assert!(second.get("EncryptionConfiguration").is_some());
        assert!(second.get("AuthenticationConfiguration").is_some());
    }

    #[test]
    fn test_derivation_idempotent() {
        let mut profile = Profile::new("default", "secure");
        profile.set_local_disk_encryption("kms-key-2").unwrap();
        let once = profile.security_configuration().unwrap().clone();

        // Re-applying the same setting yields the same descriptor
        profile.set_local_disk_encryption("kms-key-2").unwrap();
        assert_eq!(profile.security_configuration().unwrap(), &once);
    }

    #[test]
    fn test_custom_descriptor_overrides_derived() {
        let mut profile = Profile::new("default", "custom");
        profile
            .set_s3_encryption(S3EncryptionMode::SseS3, None)
            .unwrap();
        profile
            .set_custom_security_configuration(json!({"opaque": true}))
            .unwrap();

        assert_eq!(
            profile.security_configuration(),
            Some(&json!({"opaque": true}))
        );
    }

    #[test]
    fn test_read_only_rejects_mutation() {
        let mut profile = Profile::new("default", "frozen");
        profile.set_in_transit_certificate("s3://certs/a.pem").unwrap();
        profile.mark_read_only();

        let err = profile.set_in_transit_certificate("s3://certs/b.pem").unwrap_err();
        assert!(matches!(err, LaunchError::ReadOnly { .. }));
        assert_eq!(
            profile.in_transit_certificate(),
            Some("s3://certs/a.pem"),
            "frozen profile must keep its settings"
        );
    }
}
