//! Declarative gateway configuration (SPEC_FULL.md ยง6).
//!
//! A configuration document has three ordered sections: loaders, modules,
//! and links. Unknown top-level keys are ignored (the default for
//! `serde_json` unless a struct opts into `deny_unknown_fields`, which none
//! of these do); duplicate module names reject the whole document.

pub mod error;

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use error::ConfigError;

/// One entry in the `loaders` section: a name and a type selector, plus
/// loader-specific configuration carried verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoaderEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub loader_type: LoaderType,
    #[serde(default)]
    pub configuration: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LoaderType {
    NativeDynamic,
    OutOfProcess,
}

/// One entry in the `modules` section. `entrypoint` and `args` are opaque
/// to the gateway and forwarded verbatim to the loader/module.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleEntry {
    pub name: String,
    pub loader: String,
    #[serde(default)]
    pub entrypoint: Value,
    #[serde(default)]
    pub args: Value,
}

/// One entry in the `links` section. `source` may be the wildcard `"*"`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkEntry {
    pub source: String,
    pub sink: String,
}

impl LinkEntry {
    pub fn is_wildcard_source(&self) -> bool {
        self.source == "*"
    }
}

/// A parsed, validated gateway configuration document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub loaders: Vec<LoaderEntry>,
    #[serde(default)]
    pub modules: Vec<ModuleEntry>,
    #[serde(default)]
    pub links: Vec<LinkEntry>,
}

impl GatewayConfig {
    /// Parse and validate a configuration document from JSON text.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject a document with two module entries sharing a name, or a link
    /// whose source/sink names an unknown module (the wildcard source is
    /// always allowed).
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for module in &self.modules {
            if !seen.insert(module.name.as_str()) {
                return Err(ConfigError::DuplicateModule(module.name.clone()));
            }
        }
        for link in &self.links {
            if !link.is_wildcard_source() && !seen.contains(link.source.as_str()) {
                return Err(ConfigError::UnknownModule(link.source.clone()));
            }
            if !seen.contains(link.sink.as_str()) {
                return Err(ConfigError::UnknownModule(link.sink.clone()));
            }
        }
        Ok(())
    }
}
