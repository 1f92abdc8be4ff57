//! Per-process, per-generator timing aggregation

use crate::resolver::ProcessNameResolver;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use tracing::{debug, info};

/// Display name of the pipeline-level pseudo-generator held in slot 0.
pub const PIPELINE_GENERATOR_NAME: &str = "GeneratorDriver";

/// Identity of a generator within one process.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GeneratorId {
    pub name: String,
    pub assembly: String,
}

impl GeneratorId {
    pub fn new(name: impl Into<String>, assembly: impl Into<String>) -> Self {
        Self { name: name.into(), assembly: assembly.into() }
    }

    pub fn pipeline() -> Self {
        Self::new(PIPELINE_GENERATOR_NAME, "")
    }
}

#[derive(Debug, Clone)]
struct GeneratorRecord {
    id: GeneratorId,
    durations: Vec<i64>,
}

impl GeneratorRecord {
    fn new(id: GeneratorId) -> Self {
        Self { id, durations: Vec::new() }
    }
}

/// Slot 0 is the pipeline aggregate; later slots are generators in first-seen order.
#[derive(Debug)]
struct ProcessRecord {
    generators: Vec<GeneratorRecord>,
    index: HashMap<GeneratorId, usize>,
}

impl ProcessRecord {
    fn new() -> Self {
        Self {
            generators: vec![GeneratorRecord::new(GeneratorId::pipeline())],
            index: HashMap::new(),
        }
    }

    fn generator_mut(&mut self, id: GeneratorId) -> &mut GeneratorRecord {
        let slot = match self.index.get(&id) {
            Some(&slot) => slot,
            None => {
                let slot = self.generators.len();
                debug!(name = %id.name, assembly = %id.assembly, "new generator");
                self.index.insert(id.clone(), slot);
                self.generators.push(GeneratorRecord::new(id));
                slot
            }
        };
        &mut self.generators[slot]
    }
}

/// The name is filled in once, outside the table lock, by the first writer to see the pid.
struct ProcessSlot {
    pid: u32,
    name: OnceLock<String>,
    record: Mutex<ProcessRecord>,
}

impl ProcessSlot {
    fn new(pid: u32) -> Self {
        Self { pid, name: OnceLock::new(), record: Mutex::new(ProcessRecord::new()) }
    }

    /// `None` until the name lookup has finished.
    fn snapshot(&self) -> Option<ProcessSnapshot> {
        let name = self.name.get()?;
        let record = self.record.lock();
        Some(ProcessSnapshot {
            pid: self.pid,
            name: name.clone(),
            generators: record
                .generators
                .iter()
                .map(|g| GeneratorSnapshot { id: g.id.clone(), durations: g.durations.clone() })
                .collect(),
        })
    }
}

#[derive(Default)]
struct ProcessTable {
    order: Vec<Arc<ProcessSlot>>,
    by_pid: HashMap<u32, Arc<ProcessSlot>>,
}

/// Thread-safe home of all timing state.
///
/// The process table sits behind a read-write lock that is only taken for
/// writing on the first event of an unseen pid. Each process then has its
/// own mutex, so ingestion for different processes does not serialize.
/// Name lookups run after the table lock is released; a slow lookup only
/// holds up events for that one pid.
pub struct AggregationStore {
    processes: RwLock<ProcessTable>,
    resolver: Arc<dyn ProcessNameResolver>,
    placeholder_name: String,
}

impl AggregationStore {
    pub fn new(
        resolver: Arc<dyn ProcessNameResolver>,
        placeholder_name: impl Into<String>,
    ) -> Self {
        Self {
            processes: RwLock::new(ProcessTable::default()),
            resolver,
            placeholder_name: placeholder_name.into(),
        }
    }

    /// Appends a whole-pipeline duration to slot 0 of `pid`.
    pub fn record_pipeline_run(&self, pid: u32, ticks: i64) {
        let slot = self.ensure_process(pid);
        slot.record.lock().generators[0].durations.push(ticks);
    }

    /// Appends a duration to the generator `id` of `pid`, creating its record on first sight.
    pub fn record_generator_run(&self, pid: u32, id: GeneratorId, ticks: i64) {
        let slot = self.ensure_process(pid);
        slot.record.lock().generator_mut(id).durations.push(ticks);
    }

    /// Copies the current state. Later calls to `record_*` are not reflected in the result.
    ///
    /// A process whose first event is still resolving its name is omitted.
    pub fn snapshot(&self) -> StoreSnapshot {
        let slots = self.processes.read().order.clone();
        StoreSnapshot { processes: slots.iter().filter_map(|slot| slot.snapshot()).collect() }
    }

    pub fn is_empty(&self) -> bool {
        self.processes.read().order.is_empty()
    }

    pub fn process_count(&self) -> usize {
        self.processes.read().order.len()
    }

    fn ensure_process(&self, pid: u32) -> Arc<ProcessSlot> {
        let slot = self.find_or_insert(pid);
        // Concurrent first writers for the same pid wait here; only one resolves
        slot.name.get_or_init(|| {
            let name = match self.resolver.resolve(pid) {
                Ok(name) => name,
                Err(e) => {
                    debug!("Name lookup failed for pid {}: {}", pid, e);
                    self.placeholder_name.clone()
                }
            };
            info!("Tracking process {} ({})", name, pid);
            name
        });
        slot
    }

    fn find_or_insert(&self, pid: u32) -> Arc<ProcessSlot> {
        let existing = self.processes.read().by_pid.get(&pid).cloned();
        if let Some(slot) = existing {
            return slot;
        }

        let mut table = self.processes.write();
        // Another writer may have won the race between the two locks
        if let Some(slot) = table.by_pid.get(&pid) {
            return Arc::clone(slot);
        }

        let slot = Arc::new(ProcessSlot::new(pid));
        table.order.push(Arc::clone(&slot));
        table.by_pid.insert(pid, Arc::clone(&slot));
        slot
    }
}

/// Frozen copy of the store, processes in first-seen order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreSnapshot {
    pub processes: Vec<ProcessSnapshot>,
}

impl StoreSnapshot {
    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }

    pub fn process(&self, pid: u32) -> Option<&ProcessSnapshot> {
        self.processes.iter().find(|p| p.pid == pid)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProcessSnapshot {
    pub pid: u32,
    pub name: String,
    /// Never empty: index 0 is the pipeline aggregate.
    pub generators: Vec<GeneratorSnapshot>,
}

impl ProcessSnapshot {
    pub fn pipeline(&self) -> &GeneratorSnapshot {
        &self.generators[0]
    }

    /// Generator records after the pipeline slot, in first-seen order.
    pub fn generator_slots(&self) -> &[GeneratorSnapshot] {
        &self.generators[1..]
    }

    pub fn generator(&self, name: &str, assembly: &str) -> Option<&GeneratorSnapshot> {
        self.generator_slots()
            .iter()
            .find(|g| g.id.name == name && g.id.assembly == assembly)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeneratorSnapshot {
    pub id: GeneratorId,
    pub durations: Vec<i64>,
}

impl GeneratorSnapshot {
    pub fn count(&self) -> usize {
        self.durations.len()
    }

    pub fn last(&self) -> Option<i64> {
        self.durations.last().copied()
    }

    pub fn cumulative(&self) -> Option<i64> {
        if self.durations.is_empty() {
            return None;
        }
        Some(self.durations.iter().fold(0i64, |acc, &d| acc.saturating_add(d)))
    }

    pub fn average(&self) -> Option<f64> {
        if self.durations.is_empty() {
            return None;
        }
        let sum: i128 = self.durations.iter().map(|&d| d as i128).sum();
        Some(sum as f64 / self.durations.len() as f64)
    }
}
