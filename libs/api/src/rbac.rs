//! Builder RBAC prerequisites.

use serde::{Deserialize, Serialize};

use crate::meta::impl_resource;
use crate::{ObjectMeta, Resource};

/// Service account used by pod builds.
pub const BUILDER_SERVICE_ACCOUNT: &str = "kforge-builder";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceAccount {
    pub meta: ObjectMeta,
}

impl_resource!(ServiceAccount, "ServiceAccount");

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyRule {
    pub api_groups: Vec<String>,
    pub resources: Vec<String>,
    pub verbs: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub meta: ObjectMeta,
    #[serde(default)]
    pub rules: Vec<PolicyRule>,
}

impl_resource!(Role, "Role");

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    pub kind: String,
    pub name: String,
    pub namespace: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleBinding {
    pub meta: ObjectMeta,
    pub role_ref: String,
    #[serde(default)]
    pub subjects: Vec<Subject>,
}

impl_resource!(RoleBinding, "RoleBinding");

impl ServiceAccount {
    pub fn builder(namespace: &str) -> Self {
        Self {
            meta: ObjectMeta::new(namespace, BUILDER_SERVICE_ACCOUNT),
        }
    }
}

impl Role {
    /// Role granting the builder access to images and builds.
    pub fn builder(namespace: &str) -> Self {
        let rule = |groups: &[&str], resources: &[&str], verbs: &[&str]| PolicyRule {
            api_groups: groups.iter().map(|s| s.to_string()).collect(),
            resources: resources.iter().map(|s| s.to_string()).collect(),
            verbs: verbs.iter().map(|s| s.to_string()).collect(),
        };
        Self {
            meta: ObjectMeta::new(namespace, BUILDER_SERVICE_ACCOUNT),
            rules: vec![
                rule(&["kforge.dev"], &["builds"], &["get", "list", "watch", "update"]),
                rule(&["image.openshift.io"], &["imagestreams"], &["create", "get", "update"]),
                rule(&[""], &["pods", "configmaps"], &["create", "get", "delete"]),
            ],
        }
    }
}

impl RoleBinding {
    pub fn builder(namespace: &str) -> Self {
        Self {
            meta: ObjectMeta::new(namespace, BUILDER_SERVICE_ACCOUNT),
            role_ref: BUILDER_SERVICE_ACCOUNT.to_string(),
            subjects: vec![Subject {
                kind: <ServiceAccount as Resource>::KIND.to_string(),
                name: BUILDER_SERVICE_ACCOUNT.to_string(),
                namespace: namespace.to_string(),
            }],
        }
    }
}
