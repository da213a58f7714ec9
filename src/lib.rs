pub mod app;
pub mod core;
pub mod metrics;
pub mod notifications;
pub mod store;
pub mod workflow;

include!(concat!(env!("OUT_DIR"), "/version.rs"));
