// src/resource.rs

//! The contract of the remote custom-resource API.
//!
//! The provider never talks HTTP to the resource API directly; it goes through
//! [`ResourceApi`], a namespaced object store. Optimistic concurrency is the
//! store's job: `update` carries the `resource_version` the caller last read and
//! the store rejects stale writes with [`ApiError::Conflict`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// A `namespace/name` key addressing one remote object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NamespacedName {
    pub namespace: String,
    pub name: String,
}

impl NamespacedName {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Rebuilds a key from a stored resource id.
    ///
    /// Ids are written as `namespace/name`. Older state stores only the name;
    /// anything that is not exactly two segments is taken as a bare name in
    /// `default_namespace`.
    pub fn from_id(id: &str, default_namespace: &str) -> Self {
        match id.split_once('/') {
            Some((namespace, name)) if !name.contains('/') => Self::new(namespace, name),
            _ => Self::new(default_namespace, id),
        }
    }
}

impl fmt::Display for NamespacedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// The lifecycle phase reported in a resource's status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    Provisioning,
    Upgrading,
    NoWinningBids,
    Error,
    Deleting,
    /// Any phase this crate does not know about, including an empty one.
    Unknown(String),
}

impl From<&str> for Phase {
    fn from(value: &str) -> Self {
        match value {
            "Provisioning" => Phase::Provisioning,
            "Upgrading" => Phase::Upgrading,
            "NoWinningBids" => Phase::NoWinningBids,
            "Error" => Phase::Error,
            "Deleting" => Phase::Deleting,
            other => Phase::Unknown(other.to_string()),
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Provisioning => f.write_str("Provisioning"),
            Phase::Upgrading => f.write_str("Upgrading"),
            Phase::NoWinningBids => f.write_str("NoWinningBids"),
            Phase::Error => f.write_str("Error"),
            Phase::Deleting => f.write_str("Deleting"),
            Phase::Unknown(other) => write!(f, "Unknown({other})"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_version: Option<String>,
}

/// The observed state of a remote object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceStatus {
    #[serde(default)]
    pub phase: Option<String>,
    /// Set by the remote API once the resource serves traffic.
    #[serde(default, alias = "apiServerEndpoint")]
    pub ready_endpoint: String,
}

impl ResourceStatus {
    pub fn with_phase(phase: &str) -> Self {
        Self {
            phase: Some(phase.to_string()),
            ready_endpoint: String::new(),
        }
    }

    pub fn ready(endpoint: &str) -> Self {
        Self {
            phase: None,
            ready_endpoint: endpoint.to_string(),
        }
    }

    pub fn phase(&self) -> Phase {
        Phase::from(self.phase.as_deref().unwrap_or_default())
    }

    pub fn is_ready(&self) -> bool {
        !self.ready_endpoint.is_empty()
    }
}

/// A custom resource as exchanged with the resource API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteResource {
    pub kind: String,
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: Value,
    #[serde(default)]
    pub status: ResourceStatus,
}

impl RemoteResource {
    pub fn new(kind: impl Into<String>, key: &NamespacedName, spec: Value) -> Self {
        Self {
            kind: kind.into(),
            metadata: ObjectMeta {
                name: key.name.clone(),
                namespace: key.namespace.clone(),
                resource_version: None,
            },
            spec,
            status: ResourceStatus::default(),
        }
    }

    pub fn key(&self) -> NamespacedName {
        NamespacedName::new(&self.metadata.namespace, &self.metadata.name)
    }
}

/// Errors reported by a [`ResourceApi`] implementation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApiError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("{0} already exists")]
    AlreadyExists(String),

    /// The write was based on a stale `resource_version`.
    #[error("conflict updating {resource}: expected version {expected:?}, found {actual:?}")]
    Conflict {
        resource: String,
        expected: Option<String>,
        actual: Option<String>,
    },

    #[error("resource API request failed: {0}")]
    Transport(String),
}

/// The namespaced object store backing every resource and data source.
#[async_trait]
pub trait ResourceApi: Send + Sync {
    async fn get(&self, key: &NamespacedName) -> Result<RemoteResource, ApiError>;

    async fn create(&self, resource: &RemoteResource) -> Result<RemoteResource, ApiError>;

    /// Replaces a resource. `resource.metadata.resource_version` must match the
    /// stored version.
    async fn update(&self, resource: &RemoteResource) -> Result<RemoteResource, ApiError>;

    async fn delete(&self, key: &NamespacedName) -> Result<(), ApiError>;

    /// Lists resources of `kind`, optionally restricted to one namespace.
    async fn list(
        &self,
        kind: &str,
        namespace: Option<&str>,
    ) -> Result<Vec<RemoteResource>, ApiError>;
}
