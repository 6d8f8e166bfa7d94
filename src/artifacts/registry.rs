use std::any::type_name;
use std::collections::btree_map::{self, BTreeMap};
use std::collections::HashMap;
use std::fmt;

use clap::ValueEnum;
use lazy_static::lazy_static;
use log::{debug, info};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::artifacts::artifact::{Artifact, ArtifactDescriptor};
use crate::error::ArtifactError;

lazy_static! {
    /// One word of a camel-case type name
    static ref WORD: Regex = Regex::new(r"[A-Z][^A-Z]*|[^A-Z]+").unwrap();
}

/// Class of device an extraction comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    Ios,
    Android,
    Chromebook,
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceType::Ios => write!(f, "ios"),
            DeviceType::Android => write!(f, "android"),
            DeviceType::Chromebook => write!(f, "chromebook"),
        }
    }
}

/// Uppercase identifier for an artifact type: `AggDictPasscodeType` becomes
/// `AGG_DICT_PASSCODE_TYPE`
pub fn artifact_identifier<T: ?Sized>() -> String {
    identifier_from_type_name(type_name::<T>())
}

pub fn identifier_from_type_name(name: &str) -> String {
    WORD.find_iter(short_type_name(name))
        .map(|word| word.as_str().trim_matches('_'))
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>()
        .join("_")
        .to_uppercase()
}

/// Last path segment of a type name, without generic arguments
pub fn short_type_name(name: &str) -> &str {
    let base = name.split('<').next().unwrap_or(name);
    base.rsplit("::").next().unwrap_or(base)
}

type Factory = fn() -> Box<dyn Artifact>;

fn instantiate<T: Artifact + Default + 'static>() -> Box<dyn Artifact> {
    Box::new(T::default())
}

struct Registration {
    id: String,
    type_name: &'static str,
    factory: Factory,
}

/// Registration list of the artifacts one plugin crate or module supplies
/// for a device type
pub struct PluginSet {
    name: &'static str,
    device: DeviceType,
    plugins: Vec<Registration>,
}

impl PluginSet {
    pub fn new(name: &'static str, device: DeviceType) -> Self {
        PluginSet {
            name,
            device,
            plugins: Vec::new(),
        }
    }

    /// Register an artifact type under its derived identifier
    pub fn register<T: Artifact + Default + 'static>(mut self) -> Self {
        self.plugins.push(Registration {
            id: artifact_identifier::<T>(),
            type_name: short_type_name(type_name::<T>()),
            factory: instantiate::<T>,
        });
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn device(&self) -> DeviceType {
        self.device
    }

    pub fn identifiers(&self) -> impl Iterator<Item = &str> {
        self.plugins.iter().map(|plugin| plugin.id.as_str())
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

/// The closed set of artifacts available for one device type, keyed and
/// ordered by identifier.
///
/// Lookups also accept the plugin's type name (`AddressBook` for
/// `ADDRESS_BOOK`) and the identifier in any letter case.
#[derive(Debug)]
pub struct ArtifactRegistry {
    device: DeviceType,
    artifacts: BTreeMap<String, ArtifactDescriptor>,
    /// type name -> identifier
    aliases: HashMap<String, String>,
}

impl ArtifactRegistry {
    /// Instantiate one descriptor per registration in the sets for `device`
    pub fn build(device: DeviceType, sets: &[PluginSet]) -> Result<Self, ArtifactError> {
        let mut artifacts = BTreeMap::new();
        let mut aliases = HashMap::new();

        for set in sets.iter().filter(|set| set.device == device) {
            debug!("Loading {} artifacts from {}", set.len(), set.name);
            for plugin in &set.plugins {
                let artifact = (plugin.factory)();
                let info = artifact.info();
                let malformed = |reason: &str| ArtifactError::Malformed {
                    name: plugin.id.clone(),
                    reason: reason.to_string(),
                };

                if plugin.id.is_empty() {
                    return Err(malformed("empty identifier"));
                }
                if info.name.trim().is_empty() {
                    return Err(malformed("empty display name"));
                }
                if info.category.trim().is_empty() {
                    return Err(malformed("empty category"));
                }
                if artifact.patterns().is_empty() {
                    return Err(malformed("no search patterns"));
                }
                if artifacts.contains_key(&plugin.id) {
                    return Err(ArtifactError::Duplicate(plugin.id.clone()));
                }

                let descriptor = ArtifactDescriptor::new(plugin.id.clone(), artifact).with_type_name(plugin.type_name);
                aliases.insert(plugin.type_name.to_string(), plugin.id.clone());
                artifacts.insert(plugin.id.clone(), descriptor);
            }
        }

        info!("Registered {} artifacts for {}", artifacts.len(), device);
        Ok(ArtifactRegistry {
            device,
            artifacts,
            aliases,
        })
    }

    pub fn device(&self) -> DeviceType {
        self.device
    }

    /// Identifier an artifact is registered under, given its identifier
    /// or type name
    pub fn resolve(&self, name: &str) -> Option<&str> {
        if let Some((id, _)) = self.artifacts.get_key_value(name) {
            return Some(id.as_str());
        }
        if let Some(id) = self.aliases.get(name) {
            return Some(id.as_str());
        }
        self.artifacts
            .get_key_value(&name.to_uppercase())
            .map(|(id, _)| id.as_str())
    }

    pub fn get(&self, name: &str) -> Option<&ArtifactDescriptor> {
        let id = self.resolve(name)?;
        self.artifacts.get(id)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut ArtifactDescriptor> {
        let id = self.resolve(name)?.to_string();
        self.artifacts.get_mut(&id)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.resolve(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    pub fn iter(&self) -> btree_map::Values<'_, String, ArtifactDescriptor> {
        self.artifacts.values()
    }

    pub fn identifiers(&self) -> impl Iterator<Item = &str> {
        self.artifacts.keys().map(String::as_str)
    }

    /// Every registered artifact
    pub fn installed(&self) -> Vec<&ArtifactDescriptor> {
        self.artifacts.values().collect()
    }

    /// Artifacts that will run, core ones included
    pub fn selected(&self) -> Vec<&ArtifactDescriptor> {
        self.artifacts.values().filter(|a| a.is_selected()).collect()
    }

    /// Deselect everything that is not core
    pub fn reset(&mut self) {
        for artifact in self.artifacts.values_mut() {
            artifact.set_selected(false);
        }
    }

    /// Select or deselect artifacts by identifier or type name.
    ///
    /// Every name is checked before anything changes, so an unknown one
    /// leaves the selection untouched.
    pub fn select(&mut self, names: &[&str], selected: bool) -> Result<(), ArtifactError> {
        let mut ids = Vec::with_capacity(names.len());
        for name in names {
            match self.resolve(name) {
                Some(id) => ids.push(id.to_string()),
                None => return Err(ArtifactError::NotFound(name.to_string())),
            }
        }
        for id in ids {
            if let Some(artifact) = self.artifacts.get_mut(&id) {
                artifact.set_selected(selected);
            }
        }
        Ok(())
    }

    /// Select every optional artifact. Long running ones are only selected
    /// when `include_long_running` is set.
    pub fn select_all(&mut self, include_long_running: bool) {
        for artifact in self.artifacts.values_mut().filter(|a| !a.is_core()) {
            let selected = include_long_running || !artifact.is_long_running();
            artifact.set_selected(selected);
        }
    }
}

impl<'a> IntoIterator for &'a ArtifactRegistry {
    type Item = &'a ArtifactDescriptor;
    type IntoIter = btree_map::Values<'a, String, ArtifactDescriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.artifacts.values()
    }
}
