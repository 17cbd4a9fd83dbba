//! The JSON launch descriptor consumed at startup.

use crate::error::{FrameError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;

/// Top-level launch descriptor.
///
/// ```json
/// {
///   "app_id": "echo-daemon",
///   "log_level": "INFO",
///   "configs": [{ "key": "routes", "path": "/etc/echo/routes.json" }],
///   "components": [{ "component_type": "Echo", "kw": { "server_addr": "127.0.0.1:9000" } }]
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LaunchDescriptor {
    /// Application identity, also used to name the pid file
    pub app_id: String,
    /// Initial log level description (`INFO`, `DEBUG`, ...)
    pub log_level: String,
    /// Runtime tuning knobs, carried opaquely
    pub gc_control: Value,
    /// Configuration keys to watch
    pub configs: Vec<ConfigDescriptor>,
    /// Child processes to re-exec
    pub sub_process_list: SubProcessList,
    /// Components to import, in start order
    pub components: Vec<ComponentDeclaration>,
}

/// One watched configuration key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigDescriptor {
    /// Registered configuration key
    pub key: String,
    /// Path of the file backing the key
    pub path: String,
    /// Enable verbose watch logging for this key
    #[serde(rename = "enableWatchLog")]
    pub enable_watch_log: bool,
    /// Override of the retry interval in seconds, `0` keeps the registered value
    #[serde(rename = "retryWatchIntervalSec")]
    pub retry_watch_interval_sec: u64,
}

/// Sub-process section of the descriptor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubProcessList {
    /// Whether sub-processes are spawned at all
    pub enable: bool,
    /// One flag map per child process
    pub commands: Vec<Map<String, Value>>,
}

/// One declared component.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComponentDeclaration {
    /// Registered component type name
    pub component_type: String,
    /// Skip this entry entirely
    pub disable: bool,
    /// Free-form keyword arguments
    pub kw: Map<String, Value>,
}

impl ComponentDeclaration {
    /// Declare an enabled component of `component_type` without keyword arguments.
    pub fn new(component_type: impl Into<String>) -> Self {
        Self {
            component_type: component_type.into(),
            ..Self::default()
        }
    }

    /// Set the keyword arguments from a JSON object. Non-object values are ignored.
    pub fn with_kw(mut self, kw: Value) -> Self {
        if let Value::Object(map) = kw {
            self.kw = map;
        }
        self
    }

    /// Mark the declaration as disabled.
    pub fn disabled(mut self) -> Self {
        self.disable = true;
        self
    }
}

impl LaunchDescriptor {
    /// Read and parse a descriptor file.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::LaunchConfig`] if the file cannot be read or is not a
    /// valid descriptor.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path).map_err(|e| {
            FrameError::LaunchConfig(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_slice(&data)
            .map_err(|e| FrameError::LaunchConfig(format!("{}: {}", path.display(), e)))
    }

    /// Parse a descriptor from JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if `data` is not a valid descriptor.
    pub fn from_slice(data: &[u8]) -> Result<Self> {
        serde_json::from_slice(data).map_err(|e| FrameError::LaunchConfig(e.to_string()))
    }

    /// Components that will actually be imported.
    pub fn enabled_components(&self) -> impl Iterator<Item = &ComponentDeclaration> {
        self.components.iter().filter(|c| !c.disable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_full_descriptor() {
        let data = json!({
            "app_id": "echo",
            "log_level": "DEBUG",
            "gc_control": { "percent": 200 },
            "configs": [
                { "key": "routes", "path": "/etc/routes.json", "enableWatchLog": true, "retryWatchIntervalSec": 5 }
            ],
            "sub_process_list": { "enable": true, "commands": [ { "port": 9001 } ] },
            "components": [
                { "component_type": "Echo", "kw": { "server_addr": "127.0.0.1:9000" } },
                { "component_type": "Cache", "disable": true }
            ]
        });

        let descriptor = LaunchDescriptor::from_slice(data.to_string().as_bytes()).unwrap();
        assert_eq!(descriptor.app_id, "echo");
        assert_eq!(descriptor.configs[0].retry_watch_interval_sec, 5);
        assert!(descriptor.configs[0].enable_watch_log);
        assert!(descriptor.sub_process_list.enable);
        assert_eq!(descriptor.sub_process_list.commands[0]["port"], 9001);
        assert_eq!(descriptor.components.len(), 2);
        assert_eq!(descriptor.enabled_components().count(), 1);
        assert_eq!(descriptor.gc_control["percent"], 200);
    }

    #[test]
    fn test_missing_fields_default() {
        let descriptor = LaunchDescriptor::from_slice(br#"{"app_id":"bare"}"#).unwrap();
        assert!(descriptor.configs.is_empty());
        assert!(descriptor.components.is_empty());
        assert!(!descriptor.sub_process_list.enable);
        assert!(descriptor.gc_control.is_null());
    }

    #[test]
    fn test_malformed_descriptor() {
        let err = LaunchDescriptor::from_slice(br#"{"app_id":"#).unwrap_err();
        assert!(matches!(err, FrameError::LaunchConfig(_)));
    }

    #[test]
    fn test_declaration_builder() {
        let decl = ComponentDeclaration::new("Echo").with_kw(json!({"server_addr": "x"}));
        assert_eq!(decl.kw["server_addr"], "x");
        assert!(ComponentDeclaration::new("Echo").disabled().disable);
    }
}
