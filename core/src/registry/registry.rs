use std::collections::BTreeMap;
use std::sync::Arc;

use lazy_static::lazy_static;
use regex::Regex;

use super::{Category, TaskDescriptor};
use crate::error::RegistryError;
use crate::task::{PluginSource, TaskPlugin};

lazy_static! {
    static ref TASK_NAME: Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap();
}

pub struct RegisteredTask {
    pub descriptor: TaskDescriptor,
    pub plugin: Arc<dyn TaskPlugin>,
}

/// Owns every `TaskDescriptor`. Populated by `discover`/`register`, then
/// shared read-only (behind an `Arc`) for the rest of the run.
#[derive(Default)]
pub struct ModuleRegistry {
    sources: Vec<Box<dyn PluginSource>>,
    entries: BTreeMap<String, RegisteredTask>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sources(sources: Vec<Box<dyn PluginSource>>) -> Self {
        Self {
            sources,
            entries: BTreeMap::new(),
        }
    }

    pub fn add_source(&mut self, source: Box<dyn PluginSource>) {
        self.sources.push(source);
    }

    /// Scan every source and register what loads. A candidate that fails to
    /// load or fails validation is logged and skipped.
    pub fn discover(&mut self) -> BTreeMap<String, TaskDescriptor> {
        tracing::info!("Discovering available modules...");
        let mut discovered = BTreeMap::new();
        let sources = std::mem::take(&mut self.sources);

        for source in &sources {
            let candidates = source.load();
            if candidates.is_empty() {
                tracing::debug!(
                    "no modules in {} ({})",
                    source.location(),
                    source.category()
                );
                continue;
            }

            for candidate in candidates {
                let plugin = match candidate {
                    Ok(plugin) => plugin,
                    Err(e) => {
                        tracing::warn!("skipping module from {}: {}", source.location(), e);
                        continue;
                    }
                };
                match self.register(plugin, source.category()) {
                    Ok(descriptor) => {
                        tracing::debug!(
                            "Discovered module: {} (priority {})",
                            descriptor.name,
                            descriptor.priority
                        );
                        discovered.insert(descriptor.name.clone(), descriptor.clone());
                    }
                    Err(e) => {
                        tracing::warn!("skipping module from {}: {}", source.location(), e)
                    }
                }
            }
        }

        self.sources = sources;
        tracing::info!("Discovered {} modules", discovered.len());
        discovered
    }

    /// Register one implementation explicitly.
    pub fn register(
        &mut self,
        plugin: Arc<dyn TaskPlugin>,
        category: Category,
    ) -> Result<&TaskDescriptor, RegistryError> {
        let descriptor = TaskDescriptor::from_metadata(plugin.metadata(), category, plugin.about());
        if !TASK_NAME.is_match(&descriptor.name) {
            return Err(RegistryError::InvalidName(descriptor.name));
        }
        if self.entries.contains_key(&descriptor.name) {
            return Err(RegistryError::DuplicateTask(descriptor.name));
        }

        let name = descriptor.name.clone();
        let entry = self
            .entries
            .entry(name)
            .or_insert(RegisteredTask { descriptor, plugin });
        Ok(&entry.descriptor)
    }

    pub fn get(&self, name: &str) -> Option<&TaskDescriptor> {
        self.entries.get(name).map(|e| &e.descriptor)
    }

    pub fn plugin(&self, name: &str) -> Option<Arc<dyn TaskPlugin>> {
        self.entries.get(name).map(|e| e.plugin.clone())
    }

    /// Enabled descriptors not on the blacklist, optionally for one category.
    pub fn list(&self, category: Option<Category>, blacklist: &[String]) -> Vec<&TaskDescriptor> {
        self.entries
            .values()
            .map(|e| &e.descriptor)
            .filter(|d| category.map_or(true, |c| d.category == c))
            .filter(|d| d.enabled && !blacklist.iter().any(|b| b == &d.name))
            .collect()
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &TaskDescriptor> {
        self.entries.values().map(|e| &e.descriptor)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
