//! Configuration handlers: decode raw file bytes into a typed, shareable model.

use crate::core::Validate;
use crate::error::{FrameError, Result, ValidationError};
use arc_swap::ArcSwapOption;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::any::Any;
use std::sync::Arc;

/// Type alias for validator functions.
type Validator<T> = Arc<dyn Fn(&T) -> std::result::Result<(), ValidationError> + Send + Sync>;

/// Capability interface for a configuration key's payload.
///
/// A [`ConfigWatcher`](crate::watch::ConfigWatcher) is payload-agnostic: it reads
/// bytes, deduplicates them by hash and hands them to [`decode`](Self::decode).
/// Implementations must leave their previous model untouched when decoding fails.
pub trait ConfigHandler: Send + Sync + 'static {
    /// Decode `data` and replace the current model on success.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is malformed or rejected by validation.
    fn decode(&self, data: &[u8]) -> Result<()>;

    /// Called after a successful decode, before update callbacks run.
    fn on_update(&self) {}

    /// The payload format this handler expects, when it has a fixed one.
    fn payload_format(&self) -> Option<ConfigFormat> {
        None
    }

    /// Serialize the current model, for introspection.
    ///
    /// Returns an empty buffer when nothing has been loaded yet.
    fn serialize(&self) -> Result<Vec<u8>>;

    /// Access the concrete handler type.
    fn as_any(&self) -> &dyn Any;
}

/// Payload encoding understood by [`TypedConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// JSON (always available)
    Json,
    /// YAML
    #[cfg(feature = "yaml")]
    Yaml,
    /// TOML
    #[cfg(feature = "toml")]
    Toml,
}

impl ConfigFormat {
    /// Detect the format from a file suffix such as `json` or `yaml`.
    pub fn from_suffix(suffix: &str) -> Option<Self> {
        match suffix.to_ascii_lowercase().as_str() {
            "json" => Some(Self::Json),
            #[cfg(feature = "yaml")]
            "yaml" | "yml" => Some(Self::Yaml),
            #[cfg(feature = "toml")]
            "toml" => Some(Self::Toml),
            _ => None,
        }
    }

    /// Whether `suffix` names a payload format, enabled or not.
    pub fn is_data_suffix(suffix: &str) -> bool {
        matches!(
            suffix.to_ascii_lowercase().as_str(),
            "json" | "yaml" | "yml" | "toml"
        )
    }

    fn decode<T: DeserializeOwned>(self, data: &[u8]) -> std::result::Result<T, String> {
        match self {
            Self::Json => serde_json::from_slice(data).map_err(|e| e.to_string()),
            #[cfg(feature = "yaml")]
            Self::Yaml => serde_yaml::from_slice(data).map_err(|e| e.to_string()),
            #[cfg(feature = "toml")]
            Self::Toml => {
                let text = std::str::from_utf8(data).map_err(|e| e.to_string())?;
                toml::from_str(text).map_err(|e| e.to_string())
            }
        }
    }

    fn encode<T: Serialize>(self, value: &T) -> std::result::Result<Vec<u8>, String> {
        match self {
            Self::Json => serde_json::to_vec(value).map_err(|e| e.to_string()),
            #[cfg(feature = "yaml")]
            Self::Yaml => serde_yaml::to_string(value)
                .map(String::into_bytes)
                .map_err(|e| e.to_string()),
            #[cfg(feature = "toml")]
            Self::Toml => toml::to_string(value)
                .map(String::into_bytes)
                .map_err(|e| e.to_string()),
        }
    }
}

/// A typed configuration model published through `arc-swap`.
///
/// Readers on any task get a consistent snapshot with [`get`](Self::get); the
/// owning watcher swaps in a new model only after decoding and validation both
/// succeed. Clones share the same underlying model.
///
/// # Examples
///
/// ```rust
/// use hotswap_daemon::watch::{ConfigHandler, TypedConfig};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Default, Clone, Serialize, Deserialize)]
/// struct Routes {
///     addr: String,
/// }
///
/// let routes = TypedConfig::<Routes>::json();
/// routes.decode(br#"{"addr":"a"}"#).unwrap();
/// assert_eq!(routes.get().unwrap().addr, "a");
///
/// // Malformed payloads leave the previous model in place
/// assert!(routes.decode(br#"{"addr":"#).is_err());
/// assert_eq!(routes.get().unwrap().addr, "a");
/// ```
pub struct TypedConfig<T> {
    current: Arc<ArcSwapOption<T>>,
    format: ConfigFormat,
    validator: Option<Validator<T>>,
}

impl<T> TypedConfig<T>
where
    T: DeserializeOwned + Serialize + Send + Sync + 'static,
{
    /// Create an empty handler decoding `format`.
    pub fn new(format: ConfigFormat) -> Self {
        Self {
            current: Arc::new(ArcSwapOption::empty()),
            format,
            validator: None,
        }
    }

    /// Create an empty JSON handler.
    pub fn json() -> Self {
        Self::new(ConfigFormat::Json)
    }

    /// Seed the handler with an initial model.
    pub fn with_initial(self, initial: T) -> Self {
        self.current.store(Some(Arc::new(initial)));
        self
    }

    /// Add a validation function that must pass before a decoded model is published.
    pub fn with_validation<F>(mut self, validator: F) -> Self
    where
        F: Fn(&T) -> std::result::Result<(), ValidationError> + Send + Sync + 'static,
    {
        self.validator = Some(Arc::new(validator));
        self
    }

    /// Get the current model, if one has been loaded.
    ///
    /// This is lock-free and never observes a partially replaced model.
    pub fn get(&self) -> Option<Arc<T>> {
        self.current.load_full()
    }

    /// Whether a model has been loaded.
    pub fn is_loaded(&self) -> bool {
        self.current.load().is_some()
    }

    /// The payload format this handler decodes.
    pub fn format(&self) -> ConfigFormat {
        self.format
    }
}

impl<T> TypedConfig<T>
where
    T: DeserializeOwned + Serialize + Validate + Send + Sync + 'static,
{
    /// Validate every decoded model with its [`Validate`] implementation.
    pub fn validated(self) -> Self {
        self.with_validation(|config: &T| config.validate())
    }
}

impl<T> ConfigHandler for TypedConfig<T>
where
    T: DeserializeOwned + Serialize + Send + Sync + 'static,
{
    fn decode(&self, data: &[u8]) -> Result<()> {
        let model: T = self.format.decode(data).map_err(FrameError::Other)?;

        if let Some(validator) = &self.validator {
            validator(&model).map_err(|e| FrameError::ValidationError(e.to_string()))?;
        }

        self.current.store(Some(Arc::new(model)));
        Ok(())
    }

    fn payload_format(&self) -> Option<ConfigFormat> {
        Some(self.format)
    }

    fn serialize(&self) -> Result<Vec<u8>> {
        match self.current.load_full() {
            Some(model) => self.format.encode(model.as_ref()).map_err(FrameError::Other),
            None => Ok(Vec::new()),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl<T> Clone for TypedConfig<T> {
    fn clone(&self) -> Self {
        Self {
            current: Arc::clone(&self.current),
            format: self.format,
            validator: self.validator.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Routes {
        addr: String,
        #[serde(default)]
        weight: u32,
    }

    impl Validate for Routes {
        fn validate(&self) -> std::result::Result<(), ValidationError> {
            if self.addr.is_empty() {
                return Err(ValidationError::invalid_field("addr", "must not be empty"));
            }
            Ok(())
        }
    }

    #[test]
    fn test_decode_replaces_model() {
        let routes = TypedConfig::<Routes>::json();
        assert!(!routes.is_loaded());

        routes.decode(br#"{"addr":"a"}"#).unwrap();
        assert_eq!(routes.get().unwrap().addr, "a");

        routes.decode(br#"{"addr":"b","weight":3}"#).unwrap();
        let current = routes.get().unwrap();
        assert_eq!(current.addr, "b");
        assert_eq!(current.weight, 3);
    }

    #[test]
    fn test_decode_failure_keeps_previous_model() {
        let routes = TypedConfig::<Routes>::json();
        routes.decode(br#"{"addr":"a"}"#).unwrap();

        assert!(routes.decode(br#"{"addr":"#).is_err());
        assert_eq!(routes.get().unwrap().addr, "a");
    }

    #[test]
    fn test_validation_rejects_model() {
        let routes = TypedConfig::<Routes>::json().validated();
        routes.decode(br#"{"addr":"a"}"#).unwrap();

        let err = routes.decode(br#"{"addr":""}"#).unwrap_err();
        assert!(matches!(err, FrameError::ValidationError(_)));
        assert_eq!(routes.get().unwrap().addr, "a");
    }

    #[test]
    fn test_clones_share_model() {
        let routes = TypedConfig::<Routes>::json();
        let reader = routes.clone();
        routes.decode(br#"{"addr":"shared"}"#).unwrap();
        assert_eq!(reader.get().unwrap().addr, "shared");
    }

    #[test]
    fn test_serialize() {
        let routes = TypedConfig::<Routes>::json();
        assert!(routes.serialize().unwrap().is_empty());

        let routes = routes.with_initial(Routes {
            addr: "x".to_string(),
            weight: 1,
        });
        let data = routes.serialize().unwrap();
        assert_eq!(
            String::from_utf8(data).unwrap(),
            r#"{"addr":"x","weight":1}"#
        );
    }

    #[test]
    fn test_downcast_through_trait_object() {
        let handler: Arc<dyn ConfigHandler> = Arc::new(TypedConfig::<Routes>::json());
        assert!(
            handler
                .as_any()
                .downcast_ref::<TypedConfig<Routes>>()
                .is_some()
        );
    }

    #[test]
    fn test_format_from_suffix() {
        assert_eq!(ConfigFormat::from_suffix("JSON"), Some(ConfigFormat::Json));
        assert_eq!(ConfigFormat::from_suffix("ini"), None);
        assert!(ConfigFormat::is_data_suffix("YML"));
        assert!(!ConfigFormat::is_data_suffix("conf"));
    }
}
