//! Type-name keyed table of component factories.

use crate::core::component::{Component, ComponentPriority, ComponentType, KeywordArgs, KeywordModel};
use crate::error::{FrameError, Result};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

type NewComponentFn = Arc<dyn Fn() -> Box<dyn Component> + Send + Sync>;
type DecodeKeywordsFn = Arc<dyn Fn(&Map<String, Value>) -> Result<KeywordArgs> + Send + Sync>;

/// How to build one component type.
#[derive(Clone)]
pub struct ComponentDescriptor {
    component_type: ComponentType,
    priority: ComponentPriority,
    new_component: NewComponentFn,
    decode_keywords: DecodeKeywordsFn,
}

impl ComponentDescriptor {
    /// The registered type name.
    pub fn component_type(&self) -> &ComponentType {
        &self.component_type
    }

    /// Advisory priority.
    pub fn priority(&self) -> ComponentPriority {
        self.priority
    }

    /// Instantiate a fresh component.
    pub fn new_component(&self) -> Box<dyn Component> {
        (self.new_component)()
    }

    /// Decode a free-form keyword object into this type's keyword model.
    ///
    /// The map is laid over the model's `Default` value before decoding, so
    /// missing keys keep their defaults and unknown keys are dropped.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::KeywordDecode`] if the values do not fit the model.
    pub fn decode_keywords(&self, kw: &Map<String, Value>) -> Result<KeywordArgs> {
        (self.decode_keywords)(kw)
    }
}

impl fmt::Debug for ComponentDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentDescriptor")
            .field("component_type", &self.component_type)
            .field("priority", &self.priority)
            .finish_non_exhaustive()
    }
}

fn decode_keywords<K: KeywordModel>(kw: &Map<String, Value>) -> Result<KeywordArgs> {
    let mut seeded =
        serde_json::to_value(K::default()).map_err(|e| FrameError::KeywordDecode(e.to_string()))?;
    overlay(&mut seeded, kw);
    let model: K =
        serde_json::from_value(seeded).map_err(|e| FrameError::KeywordDecode(e.to_string()))?;
    Ok(KeywordArgs::new(model))
}

// Nested objects merge key by key; any other value replaces the default outright.
fn overlay(target: &mut Value, kw: &Map<String, Value>) {
    let Value::Object(fields) = target else {
        *target = Value::Object(kw.clone());
        return;
    };
    for (key, value) in kw {
        match (fields.get_mut(key), value) {
            (Some(existing @ Value::Object(_)), Value::Object(nested)) => overlay(existing, nested),
            _ => {
                fields.insert(key.clone(), value.clone());
            }
        }
    }
}

/// Table of every component type the process can instantiate.
///
/// Registering a type name twice replaces the earlier descriptor.
#[derive(Debug, Clone, Default)]
pub struct ComponentRegistry {
    descriptors: HashMap<ComponentType, ComponentDescriptor>,
}

impl ComponentRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `type_name`, built by `new_component` and configured with keyword model `K`.
    pub fn register<K, F>(&mut self, priority: ComponentPriority, type_name: &str, new_component: F)
    where
        K: KeywordModel,
        F: Fn() -> Box<dyn Component> + Send + Sync + 'static,
    {
        let component_type = ComponentType::new(type_name);
        self.descriptors.insert(
            component_type.clone(),
            ComponentDescriptor {
                component_type,
                priority,
                new_component: Arc::new(new_component),
                decode_keywords: Arc::new(decode_keywords::<K>),
            },
        );
    }

    /// Look up a descriptor by type name.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::ComponentTypeNotRegistered`] if the type is unknown.
    pub fn resolve(&self, type_name: &str) -> Result<&ComponentDescriptor> {
        self.descriptors
            .get(&ComponentType::new(type_name))
            .ok_or_else(|| FrameError::ComponentTypeNotRegistered(type_name.to_string()))
    }

    /// Whether `type_name` is registered.
    pub fn contains(&self, type_name: &str) -> bool {
        self.descriptors.contains_key(&ComponentType::new(type_name))
    }

    /// Number of registered types.
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// Whether no types are registered.
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::component::{InitContext, NoKeywordArgs};
    use async_trait::async_trait;
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    #[derive(Debug, Serialize, Deserialize)]
    struct EchoArgs {
        server_addr: String,
        workers: u32,
        pool: PoolArgs,
    }

    #[derive(Debug, Serialize, Deserialize)]
    struct PoolArgs {
        size: u32,
        idle_secs: u64,
    }

    impl Default for EchoArgs {
        fn default() -> Self {
            Self {
                server_addr: "0.0.0.0:7000".to_string(),
                workers: 4,
                pool: PoolArgs {
                    size: 16,
                    idle_secs: 30,
                },
            }
        }
    }

    struct Noop;

    #[async_trait]
    impl Component for Noop {
        async fn initialize(&mut self, _ctx: &InitContext<'_>, _kw: KeywordArgs) -> Result<()> {
            Ok(())
        }

        async fn start(&mut self) -> Result<()> {
            Ok(())
        }

        async fn stop(&mut self) -> Result<()> {
            Ok(())
        }
    }

    fn as_map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    #[test]
    fn test_resolve_unknown_type() {
        let registry = ComponentRegistry::new();
        assert!(matches!(
            registry.resolve("Echo"),
            Err(FrameError::ComponentTypeNotRegistered(name)) if name == "Echo"
        ));
    }

    #[test]
    fn test_reregistration_overwrites() {
        let mut registry = ComponentRegistry::new();
        registry.register::<NoKeywordArgs, _>(ComponentPriority::Low, "Echo", || Box::new(Noop));
        registry.register::<EchoArgs, _>(ComponentPriority::High, "Echo", || Box::new(Noop));

        assert_eq!(registry.len(), 1);
        assert_eq!(
            registry.resolve("Echo").unwrap().priority(),
            ComponentPriority::High
        );
    }

    #[test]
    fn test_keyword_round_trip_ignores_unknown_and_defaults_missing() {
        let mut registry = ComponentRegistry::new();
        registry.register::<EchoArgs, _>(ComponentPriority::General, "Echo", || Box::new(Noop));

        let descriptor = registry.resolve("Echo").unwrap();
        let kw = descriptor
            .decode_keywords(&as_map(json!({"server_addr": "127.0.0.1:9000", "extra": true})))
            .unwrap()
            .downcast::<EchoArgs>()
            .unwrap();
        assert_eq!(kw.server_addr, "127.0.0.1:9000");
        assert_eq!(kw.workers, 4);
        assert_eq!(kw.pool.size, 16);
    }

    #[test]
    fn test_missing_keywords_keep_model_defaults() {
        let mut registry = ComponentRegistry::new();
        registry.register::<EchoArgs, _>(ComponentPriority::General, "Echo", || Box::new(Noop));
        let descriptor = registry.resolve("Echo").unwrap();

        let kw = descriptor
            .decode_keywords(&Map::new())
            .unwrap()
            .downcast::<EchoArgs>()
            .unwrap();
        assert_eq!(kw.server_addr, "0.0.0.0:7000");
        assert_eq!(kw.workers, 4);

        // Nested objects are merged field by field
        let kw = descriptor
            .decode_keywords(&as_map(json!({"workers": 8, "pool": {"size": 2}})))
            .unwrap()
            .downcast::<EchoArgs>()
            .unwrap();
        assert_eq!(kw.server_addr, "0.0.0.0:7000");
        assert_eq!(kw.workers, 8);
        assert_eq!(kw.pool.size, 2);
        assert_eq!(kw.pool.idle_secs, 30);
    }

    #[test]
    fn test_keyword_type_mismatch() {
        let mut registry = ComponentRegistry::new();
        registry.register::<EchoArgs, _>(ComponentPriority::General, "Echo", || Box::new(Noop));

        let err = registry
            .resolve("Echo")
            .unwrap()
            .decode_keywords(&as_map(json!({"workers": "many"})))
            .unwrap_err();
        assert!(matches!(err, FrameError::KeywordDecode(_)));
    }
}
