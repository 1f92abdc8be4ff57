//! Event sources feeding the aggregation store

use crate::error::Result;
use crate::privilege;
use crate::protocol::TimingEvent;
use crate::store::{AggregationStore, GeneratorId};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// The two callback kinds an event source delivers.
pub trait TimingObserver: Send + Sync {
    fn on_pipeline_run(&self, pid: u32, elapsed_ticks: i64);
    fn on_generator_run(
        &self,
        pid: u32,
        generator_name: String,
        assembly_path: String,
        elapsed_ticks: i64,
    );
}

impl TimingObserver for AggregationStore {
    fn on_pipeline_run(&self, pid: u32, elapsed_ticks: i64) {
        self.record_pipeline_run(pid, elapsed_ticks);
    }

    fn on_generator_run(
        &self,
        pid: u32,
        generator_name: String,
        assembly_path: String,
        elapsed_ticks: i64,
    ) {
        let id = GeneratorId::new(generator_name, assembly_path);
        self.record_generator_run(pid, id, elapsed_ticks);
    }
}

pub fn dispatch(observer: &dyn TimingObserver, event: TimingEvent) {
    match event {
        TimingEvent::GeneratorDriverRunTime { pid, elapsed_ticks } => {
            observer.on_pipeline_run(pid, elapsed_ticks)
        }
        TimingEvent::SingleGeneratorRunTime {
            pid,
            generator_name,
            assembly_path,
            elapsed_ticks,
        } => observer.on_generator_run(pid, generator_name, assembly_path, elapsed_ticks),
    }
}

#[async_trait::async_trait]
pub trait EventSource: Send + Sync {
    fn name(&self) -> &str;

    /// Delivers events to `observer` until `shutdown` flips to true.
    async fn run(
        &self,
        observer: Arc<dyn TimingObserver>,
        shutdown: watch::Receiver<bool>,
    ) -> Result<()>;
}

pub struct SocketSource {
    path: PathBuf,
    listener: UnixListener,
}

impl SocketSource {
    /// Checks rights first, then binds. A refused start leaves `path` untouched.
    pub async fn open(path: &Path, require_elevated: bool, elevated: bool) -> Result<Self> {
        privilege::ensure_can_subscribe(require_elevated, elevated)?;
        Ok(Self::bind(path).await?)
    }

    /// Binds without a rights check, replacing whatever is at `path`.
    pub async fn bind(path: &Path) -> std::io::Result<Self> {
        let _ = std::fs::remove_file(path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let listener = UnixListener::bind(path)?;
        info!("Socket source listening on {:?}", path);
        Ok(Self { path: path.to_path_buf(), listener })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn socket_path() -> PathBuf {
        let uid = unsafe { libc::getuid() };
        PathBuf::from(format!("/run/user/{}/generator-tracer.sock", uid))
    }
}

impl Drop for SocketSource {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

#[async_trait::async_trait]
impl EventSource for SocketSource {
    fn name(&self) -> &str {
        "unix-socket"
    }

    async fn run(
        &self,
        observer: Arc<dyn TimingObserver>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        while !*shutdown.borrow() {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, _)) => {
                        let observer = Arc::clone(&observer);
                        let shutdown = shutdown.clone();
                        tokio::spawn(async move {
                            handle_client(stream, observer, shutdown).await;
                        });
                    }
                    Err(e) => error!("Failed to accept connection: {}", e),
                },
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        info!("Socket source stopped");
        Ok(())
    }
}

pub async fn handle_client(
    stream: UnixStream,
    observer: Arc<dyn TimingObserver>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut lines = BufReader::new(stream).lines();

    loop {
        tokio::select! {
            result = lines.next_line() => {
                match result {
                    Ok(Some(line)) => {
                        if line.trim().is_empty() {
                            continue;
                        }
                        match TimingEvent::parse_line(&line) {
                            Ok(event) => dispatch(observer.as_ref(), event),
                            Err(e) => warn!("Dropping malformed event: {}", e),
                        }
                    }
                    Ok(None) => {
                        debug!("Event producer disconnected");
                        break;
                    }
                    Err(e) => {
                        error!("Read error: {}", e);
                        break;
                    }
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}
