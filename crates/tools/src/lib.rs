//! Capability providers for wayfarer.
//!
//! - [`registry`]: fixed name → provider mapping the turn loop dispatches through
//! - [`catalog`]: argument schemas for the travel tools, advertised to the model
//! - [`http`]: a provider that forwards arguments to an HTTP endpoint
//! - [`dispatch`]: runs one tool call and always yields a result

pub mod catalog;
pub mod dispatch;
pub mod http;
pub mod registry;

pub use dispatch::ToolDispatcher;
pub use registry::{Capability, CapabilityRegistry};
