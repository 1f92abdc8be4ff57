//! Error taxonomy shared by the collaborators and the lifecycle

use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TracerError {
    #[error("To receive generator timing events you need elevated rights, please run as root.")]
    NotElevated,

    #[error("process {pid} is no longer running")]
    ProcessGone { pid: u32 },

    #[error("display error: {0}")]
    Sink(#[source] io::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, TracerError>;
