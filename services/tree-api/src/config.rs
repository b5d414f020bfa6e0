//! Service configuration loaded from a YAML file.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use access_policy::{AccessPolicy, AuthConfig, PolicyRule};
use adapters::{Adapter, AdapterRegistry, TreeEntry};
use codecs::{CodecConfig, CodecRegistry};
use data_service::{BackendConfig, DataService};
use result_cache::CacheConfig;

/// Top-level configuration file. Every section may be omitted.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub cache: CacheConfig,
    pub backend: BackendConfig,
    pub codecs: CodecConfig,
    pub auth: AuthConfig,
    /// Ordered access rules. None means nothing is allowed.
    pub policy: Vec<PolicyRule>,
    pub tree: TreeEntry,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            cache: CacheConfig::default(),
            backend: BackendConfig::default(),
            codecs: CodecConfig::default(),
            auth: AuthConfig::default(),
            policy: Vec::new(),
            tree: empty_tree(),
        }
    }
}

/// A root container with no children.
fn empty_tree() -> TreeEntry {
    TreeEntry {
        name: String::new(),
        family: "container".to_string(),
        args: serde_json::Value::Null,
        metadata: Default::default(),
        specs: Vec::new(),
        children: Vec::new(),
    }
}

impl ServiceConfig {
    /// Load from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {:?}", path))?;
        Self::from_yaml(&content).with_context(|| format!("Failed to parse config: {:?}", path))
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Build the adapter tree through the registry.
    pub fn build_tree(&self, registry: &AdapterRegistry) -> Result<Arc<dyn Adapter>> {
        registry
            .build_root(&self.tree)
            .context("Failed to build the node tree")
    }

    /// Assemble the data service from every section.
    pub fn build_service(&self, registry: &AdapterRegistry) -> Result<DataService> {
        let root = self.build_tree(registry)?;
        info!(
            rules = self.policy.len(),
            anonymous = self.auth.allow_anonymous,
            cache_entries = self.cache.max_entries,
            cache_mb = self.cache.max_bytes_mb,
            "Building data service"
        );
        Ok(DataService::builder(root)
            .policy(AccessPolicy::new(self.policy.clone()))
            .auth(self.auth.clone())
            .codecs(CodecRegistry::from_config(&self.codecs))
            .backend(self.backend.clone())
            .cache(self.cache.clone())
            .build())
    }
}
