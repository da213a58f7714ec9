//! Public API for the workflow system
//!
//! External modules should import from here rather than directly from the
//! internal modules.

pub use crate::workflow::application::Application;
pub use crate::workflow::config::{
    ApplicationConfig, ConfigError, ConsumerConfig, ProducerConfig, WorkflowConfig,
};
pub use crate::workflow::consumer::Consumer;
pub use crate::workflow::producer::Producer;
pub use crate::workflow::state::{ConsumerState, ConsumerStateMachine};
