//! wayfarer: a streaming tool-orchestration loop for a travel assistant.

pub mod bootstrap;
pub mod cli;
pub mod runtime;
pub mod state;
