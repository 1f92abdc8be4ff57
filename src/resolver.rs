//! Process name resolution (reads /proc on Linux)

pub mod linux;

pub use linux::ProcfsResolver;

use crate::error::Result;

/// Maps a pid to the name shown in the process header.
pub trait ProcessNameResolver: Send + Sync {
    /// Fails with `TracerError::ProcessGone` once the process has exited.
    fn resolve(&self, pid: u32) -> Result<String>;
}
