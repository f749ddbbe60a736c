pub mod catalog;
pub mod config;
pub mod types;

pub use catalog::{AsyncMode, ParameterDescriptor, Plan, Spec, SpecManifest};
pub use config::BrokerConfig;
pub use types::*;
