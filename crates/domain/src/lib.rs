//! Shared types for the wayfarer workspace: conversation messages, stream
//! fragments, sessions, configuration, and the common error type.

pub mod config;
pub mod error;
pub mod session;
pub mod stream;
pub mod tool;
pub mod trace;

pub use error::{Error, Result};
