//! The component capability interface and its identity types.

use crate::core::application::{ApplicationId, ProcessType};
use crate::error::{FrameError, Result};
use crate::watch::ConfigWatcherManager;
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::any::Any;
use std::fmt;

/// A pluggable unit with its own lifecycle.
///
/// The orchestrator calls [`initialize`](Self::initialize) once during import, then
/// [`start`](Self::start), and finally [`stop`](Self::stop) at shutdown. During
/// `initialize` a component may look up configuration watchers through
/// [`InitContext::configs`] and register change callbacks against them.
///
/// # Examples
///
/// ```rust
/// use async_trait::async_trait;
/// use hotswap_daemon::core::{Component, InitContext, KeywordArgs};
/// use hotswap_daemon::error::Result;
///
/// #[derive(Debug, Default, serde::Serialize, serde::Deserialize)]
/// struct EchoArgs {
///     server_addr: String,
/// }
///
/// #[derive(Default)]
/// struct Echo {
///     addr: String,
/// }
///
/// #[async_trait]
/// impl Component for Echo {
///     async fn initialize(&mut self, _ctx: &InitContext<'_>, kw: KeywordArgs) -> Result<()> {
///         self.addr = kw.downcast::<EchoArgs>()?.server_addr;
///         Ok(())
///     }
///
///     async fn start(&mut self) -> Result<()> {
///         Ok(())
///     }
///
///     async fn stop(&mut self) -> Result<()> {
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Component: Send + Sync {
    /// Prepare the component using its decoded keyword arguments.
    ///
    /// # Errors
    ///
    /// An error aborts the whole import.
    async fn initialize(&mut self, ctx: &InitContext<'_>, kw: KeywordArgs) -> Result<()>;

    /// Begin doing work.
    ///
    /// # Errors
    ///
    /// An error aborts the remaining starts.
    async fn start(&mut self) -> Result<()>;

    /// Stop doing work.
    ///
    /// # Errors
    ///
    /// Errors are logged and never prevent other components from stopping.
    async fn stop(&mut self) -> Result<()>;
}

/// A typed keyword model decoded from a declaration's free-form `kw` object.
///
/// Decoding starts from `Default::default()` with the declared keys laid on top.
/// Missing keys keep their default and unknown keys are ignored, so a model
/// needs no `#[serde(default)]` of its own.
pub trait KeywordModel: Serialize + DeserializeOwned + Default + Send + 'static {}

impl<T> KeywordModel for T where T: Serialize + DeserializeOwned + Default + Send + 'static {}

/// Keyword model for components that take no arguments.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct NoKeywordArgs {}

/// Decoded keyword arguments, passed to [`Component::initialize`].
pub struct KeywordArgs(Box<dyn Any + Send>);

impl KeywordArgs {
    /// Wrap a decoded keyword model.
    pub fn new<K: Send + 'static>(kw: K) -> Self {
        Self(Box::new(kw))
    }

    /// Take the model out as its concrete type.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::KeywordDecode`] if the model is not a `K`.
    pub fn downcast<K: 'static>(self) -> Result<K> {
        self.0.downcast::<K>().map(|kw| *kw).map_err(|_| {
            FrameError::KeywordDecode(format!(
                "keyword model is not a {}",
                std::any::type_name::<K>()
            ))
        })
    }

    /// Borrow the model as its concrete type.
    pub fn downcast_ref<K: 'static>(&self) -> Option<&K> {
        self.0.downcast_ref::<K>()
    }
}

impl fmt::Debug for KeywordArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("KeywordArgs").finish_non_exhaustive()
    }
}

/// Registered name of a component type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentType(String);

impl ComponentType {
    /// Create a type name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The type name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ComponentType {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Identity of a component within one application.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentId(String);

impl ComponentId {
    /// Derive the id of the `index`-th (1-based) declared component: `<type>_<index>`.
    pub fn derive(component_type: &ComponentType, index: usize) -> Self {
        Self(format!("{}_{}", component_type, index))
    }

    /// The id as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl PartialEq<str> for ComponentId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for ComponentId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// Lifecycle status of a component.
///
/// `Created` and `BaseInitialized` only exist while a declaration is being
/// imported. A component enters the application once `initialize` succeeds, so
/// [`Application::components`](crate::core::Application::components) never
/// reports them; they show up in the log line of a failed import.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentStatus {
    /// Instantiated from its descriptor.
    Created,
    /// Identity assigned, keyword arguments decoded.
    BaseInitialized,
    /// `initialize` succeeded.
    Initialized,
    /// `start` succeeded.
    Started,
    /// `stop` was attempted.
    Stopped,
}

impl ComponentStatus {
    /// Lowercase name of the status.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::BaseInitialized => "base_initialized",
            Self::Initialized => "initialized",
            Self::Started => "started",
            Self::Stopped => "stopped",
        }
    }
}

impl fmt::Display for ComponentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Advisory priority recorded at registration. It does not affect start order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ComponentPriority {
    /// Low priority
    Low,
    /// General priority
    #[default]
    General,
    /// High priority
    High,
}

/// What a component sees while it initializes.
pub struct InitContext<'a> {
    /// The component's own id
    pub id: &'a ComponentId,
    /// The component's registered type
    pub component_type: &'a ComponentType,
    /// Owning application
    pub app_id: &'a ApplicationId,
    /// Whether this is the main process or a sub-process
    pub process_type: ProcessType,
    /// Configuration watchers, for callback registration and typed reads
    pub configs: &'a ConfigWatcherManager,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[derive(Debug, Default, PartialEq, serde::Deserialize)]
    struct EchoArgs {
        server_addr: String,
    }

    #[test]
    fn test_component_id_derivation() {
        let echo = ComponentType::new("Echo");
        assert_eq!(ComponentId::derive(&echo, 1), "Echo_1");
        assert_eq!(ComponentId::derive(&echo, 2).as_str(), "Echo_2");
    }

    #[test]
    fn test_keyword_downcast() {
        let kw = KeywordArgs::new(EchoArgs {
            server_addr: "127.0.0.1:9000".to_string(),
        });
        assert!(kw.downcast_ref::<EchoArgs>().is_some());
        assert_eq!(kw.downcast::<EchoArgs>().unwrap().server_addr, "127.0.0.1:9000");

        let kw = KeywordArgs::new(NoKeywordArgs {});
        assert!(matches!(
            kw.downcast::<EchoArgs>(),
            Err(FrameError::KeywordDecode(_))
        ));
    }

    #[test]
    fn test_status_display() {
        assert_eq!(ComponentStatus::Initialized.to_string(), "initialized");
        assert_eq!(ComponentPriority::default(), ComponentPriority::General);
    }

    proptest! {
        #[test]
        fn prop_id_is_deterministic_and_injective(
            name in "[A-Za-z][A-Za-z0-9]{0,12}",
            a in 1usize..10_000,
            b in 1usize..10_000,
        ) {
            let component_type = ComponentType::new(name.clone());
            let id_a = ComponentId::derive(&component_type, a);
            prop_assert_eq!(&id_a, &ComponentId::derive(&component_type, a));
            prop_assert_eq!(id_a.as_str(), format!("{}_{}", name, a));
            prop_assert_eq!(a == b, id_a == ComponentId::derive(&component_type, b));
        }
    }
}
