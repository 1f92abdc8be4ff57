use super::ProcessNameResolver;
use crate::error::{Result, TracerError};
use std::fs;
use std::path::{Path, PathBuf};

pub struct ProcfsResolver {
    root: PathBuf,
}

impl ProcfsResolver {
    pub fn new() -> Self {
        Self::with_root("/proc")
    }

    /// Reads from an alternate procfs mount.
    pub fn with_root(root: impl AsRef<Path>) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }

    fn read_comm(&self, pid: u32) -> Option<String> {
        let stat = fs::read_to_string(self.root.join(pid.to_string()).join("stat")).ok()?;
        // comm may itself contain parentheses, so take the outermost pair
        let open = stat.find('(')?;
        let close = stat.rfind(')')?;
        if close <= open {
            return None;
        }
        let name = stat[open + 1..close].to_string();
        if name.is_empty() { None } else { Some(name) }
    }
}

impl Default for ProcfsResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessNameResolver for ProcfsResolver {
    fn resolve(&self, pid: u32) -> Result<String> {
        self.read_comm(pid).ok_or(TracerError::ProcessGone { pid })
    }
}
