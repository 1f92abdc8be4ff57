//! Live per-process timing monitor for code generator pipelines

pub mod config;
pub mod display;
pub mod error;
pub mod privilege;
pub mod protocol;
pub mod render;
pub mod resolver;
pub mod source;
pub mod store;
