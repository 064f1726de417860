//! Pipeline construction from configuration.

use super::graph::Pipeline;
use crate::config::{Config, section};
use crate::element::{Role, StageContext};
use crate::error::{Error, Result};
use crate::memory::RecordPool;
use crate::plugin::PluginRegistry;
use std::sync::Arc;

impl Pipeline {
    /// Build the pipeline described by `config`.
    ///
    /// Every configured plugin name is checked against `registry` first,
    /// so an unknown name is reported as a configuration error even when
    /// the chain is also incomplete. A role without exactly one plugin is
    /// then a topology error. Stages are built with a context sharing
    /// `pool`.
    pub fn from_config(
        config: &Config,
        registry: &PluginRegistry,
        pool: Arc<RecordPool>,
    ) -> Result<Self> {
        for role in Role::ALL {
            for (name, _) in config.plugins(role) {
                if !registry.contains(role, name) {
                    return Err(Error::Configuration(format!(
                        "undefined {} plugin '{name}'",
                        section(role)
                    )));
                }
            }
        }

        for role in Role::ALL {
            let count = config.plugins(role).count();
            if count != 1 {
                return Err(Error::Topology(format!(
                    "[{}] must configure exactly one plugin, found {count}",
                    section(role)
                )));
            }
        }

        let ctx = StageContext::new(config.pipeline.name.as_str(), pool.clone());
        let mut nodes = Vec::with_capacity(Role::ALL.len());
        for role in Role::ALL {
            for (name, settings) in config.plugins(role) {
                nodes.push(registry.create(role, name, settings, &ctx)?);
            }
        }

        Self::assemble(
            config.pipeline.name.clone(),
            nodes,
            config.pipeline.edge_capacity,
            pool,
        )
    }

    /// Build the pipeline described by `config` with a fresh record pool.
    pub fn from_config_with_new_pool(config: &Config, registry: &PluginRegistry) -> Result<Self> {
        let pool = Arc::new(RecordPool::with_max_idle(config.pipeline.pool_max_idle));
        Self::from_config(config, registry, pool)
    }
}
