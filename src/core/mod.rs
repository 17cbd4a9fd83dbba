//! Component lifecycle orchestration.

mod application;
mod component;
mod context;
mod registry;
mod signals;
mod validation;

pub use application::{
    AppHooks, AppState, Application, ApplicationId, ComponentInfo, NoHooks, ProcessType,
};
pub use component::{
    Component, ComponentId, ComponentPriority, ComponentStatus, ComponentType, InitContext,
    KeywordArgs, KeywordModel, NoKeywordArgs,
};
pub use context::{FrameContext, FrameContextBuilder};
pub use registry::{ComponentDescriptor, ComponentRegistry};
pub use signals::{Shutdown, ShutdownReason, install_signal_handlers};
pub use validation::Validate;
