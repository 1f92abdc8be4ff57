use generator_tracer::error::{Result, TracerError};
use generator_tracer::resolver::ProcessNameResolver;
use generator_tracer::store::{AggregationStore, GeneratorId, PIPELINE_GENERATOR_NAME};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Barrier, Mutex};
use std::thread;
use std::time::Duration;

/// Resolves from a fixed table and counts lookups.
struct TableResolver {
    names: HashMap<u32, String>,
    lookups: AtomicUsize,
    delay: Duration,
}

impl TableResolver {
    fn new(names: &[(u32, &str)]) -> Self {
        Self {
            names: names.iter().map(|(pid, n)| (*pid, n.to_string())).collect(),
            lookups: AtomicUsize::new(0),
            delay: Duration::ZERO,
        }
    }

    fn slow(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

impl ProcessNameResolver for TableResolver {
    fn resolve(&self, pid: u32) -> Result<String> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        thread::sleep(self.delay);
        self.names.get(&pid).cloned().ok_or(TracerError::ProcessGone { pid })
    }
}

/// Blocks lookups for one pid until released.
struct GatedResolver {
    gated_pid: u32,
    entered: Mutex<mpsc::Sender<()>>,
    release: Mutex<mpsc::Receiver<()>>,
}

impl ProcessNameResolver for GatedResolver {
    fn resolve(&self, pid: u32) -> Result<String> {
        if pid == self.gated_pid {
            self.entered.lock().unwrap().send(()).unwrap();
            self.release.lock().unwrap().recv().unwrap();
        }
        Ok(format!("proc{}", pid))
    }
}

fn store_with(resolver: Arc<TableResolver>) -> AggregationStore {
    AggregationStore::new(resolver, "<exited>")
}

#[test]
fn test_end_to_end_scenario() {
    let store = store_with(Arc::new(TableResolver::new(&[(111, "build.exe")])));

    store.record_pipeline_run(111, 50_000);
    store.record_generator_run(111, GeneratorId::new("MyGen", "my.dll"), 30_000);
    store.record_pipeline_run(111, 60_000);

    let snapshot = store.snapshot();
    assert_eq!(snapshot.processes.len(), 1);
    let process = snapshot.process(111).unwrap();
    assert_eq!(process.name, "build.exe");
    assert_eq!(process.generators.len(), 2);

    let pipeline = process.pipeline();
    assert_eq!(pipeline.id.name, PIPELINE_GENERATOR_NAME);
    assert_eq!(pipeline.id.assembly, "");
    assert_eq!(pipeline.durations, vec![50_000, 60_000]);
    assert_eq!(pipeline.average(), Some(55_000.0));
    assert_eq!(pipeline.last(), Some(60_000));
    assert_eq!(pipeline.count(), 2);

    let generator = process.generator("MyGen", "my.dll").unwrap();
    assert_eq!(generator.durations, vec![30_000]);
    assert_eq!(generator.count(), 1);
}

#[test]
fn test_derived_statistics() {
    let store = store_with(Arc::new(TableResolver::new(&[(1, "csc")])));
    for ticks in [100, 200, 300] {
        store.record_generator_run(1, GeneratorId::new("Gen", "gen.dll"), ticks);
    }

    let snapshot = store.snapshot();
    let generator = snapshot.process(1).unwrap().generator("Gen", "gen.dll").unwrap();
    assert_eq!(generator.average(), Some(200.0));
    assert_eq!(generator.cumulative(), Some(600));
    assert_eq!(generator.last(), Some(300));
    assert_eq!(generator.count(), 3);
}

#[test]
fn test_pipeline_slot_exists_before_any_pipeline_event() {
    let store = store_with(Arc::new(TableResolver::new(&[(7, "dotnet")])));
    store.record_generator_run(7, GeneratorId::new("Gen", "gen.dll"), 10);

    let snapshot = store.snapshot();
    let pipeline = snapshot.process(7).unwrap().pipeline();
    assert_eq!(pipeline.count(), 0);
    assert_eq!(pipeline.last(), None);
    assert_eq!(pipeline.average(), None);
    assert_eq!(pipeline.cumulative(), None);
}

#[test]
fn test_same_identity_appends_to_one_record() {
    let store = store_with(Arc::new(TableResolver::new(&[(5, "csc")])));
    store.record_generator_run(5, GeneratorId::new("A", "a.dll"), 1);
    store.record_generator_run(5, GeneratorId::new("B", "b.dll"), 2);
    store.record_generator_run(5, GeneratorId::new("A", "a.dll"), 3);
    // same name from another assembly is a different generator
    store.record_generator_run(5, GeneratorId::new("A", "other.dll"), 4);

    let snapshot = store.snapshot();
    let process = snapshot.process(5).unwrap();
    let names: Vec<(&str, &str)> = process
        .generator_slots()
        .iter()
        .map(|g| (g.id.name.as_str(), g.id.assembly.as_str()))
        .collect();
    assert_eq!(names, vec![("A", "a.dll"), ("B", "b.dll"), ("A", "other.dll")]);
    assert_eq!(process.generator("A", "a.dll").unwrap().durations, vec![1, 3]);
}

#[test]
fn test_counts_across_processes_and_generators() {
    let store = store_with(Arc::new(TableResolver::new(&[])));
    let mut expected: HashMap<(u32, String), usize> = HashMap::new();

    for i in 0..60u32 {
        let pid = 100 + i % 3;
        if i % 5 == 0 {
            store.record_pipeline_run(pid, i as i64);
        } else {
            let name = format!("Gen{}", i % 4);
            store.record_generator_run(pid, GeneratorId::new(name.clone(), "gens.dll"), i as i64);
            *expected.entry((pid, name)).or_default() += 1;
        }
    }

    let snapshot = store.snapshot();
    assert_eq!(snapshot.processes.len(), 3);
    for process in &snapshot.processes {
        let distinct = expected.keys().filter(|(pid, _)| *pid == process.pid).count();
        assert_eq!(process.generators.len(), 1 + distinct);
        assert_eq!(process.pipeline().count(), 4);
        for generator in process.generator_slots() {
            assert_eq!(generator.count(), expected[&(process.pid, generator.id.name.clone())]);
        }
    }
}

#[test]
fn test_unresolvable_process_gets_placeholder() {
    let store = store_with(Arc::new(TableResolver::new(&[])));
    store.record_pipeline_run(4242, 1);

    let snapshot = store.snapshot();
    assert_eq!(snapshot.process(4242).unwrap().name, "<exited>");
}

#[test]
fn test_processes_keep_first_seen_order() {
    let store = store_with(Arc::new(TableResolver::new(&[])));
    assert!(store.is_empty());
    for pid in [30, 10, 20, 10, 30] {
        store.record_pipeline_run(pid, 1);
    }

    let pids: Vec<u32> = store.snapshot().processes.iter().map(|p| p.pid).collect();
    assert_eq!(pids, vec![30, 10, 20]);
    assert!(!store.is_empty());
    assert_eq!(store.process_count(), 3);
}

#[test]
fn test_snapshot_is_isolated_from_later_records() {
    let store = store_with(Arc::new(TableResolver::new(&[(1, "csc")])));
    store.record_pipeline_run(1, 10);
    store.record_generator_run(1, GeneratorId::new("Gen", "gen.dll"), 20);

    let before = store.snapshot();

    store.record_pipeline_run(1, 11);
    store.record_generator_run(1, GeneratorId::new("Gen", "gen.dll"), 21);
    store.record_generator_run(1, GeneratorId::new("Late", "late.dll"), 30);
    store.record_pipeline_run(2, 40);

    assert_eq!(before.processes.len(), 1);
    let process = before.process(1).unwrap();
    assert_eq!(process.pipeline().durations, vec![10]);
    assert_eq!(process.generator("Gen", "gen.dll").unwrap().durations, vec![20]);
    assert!(process.generator("Late", "late.dll").is_none());
    assert_eq!(store.snapshot().processes.len(), 2);
}

#[test]
fn test_last_follows_appends_under_concurrent_writers() {
    let store = Arc::new(store_with(Arc::new(TableResolver::new(&[]))));
    let barrier = Arc::new(Barrier::new(4));

    let handles: Vec<_> = (0..4u32)
        .map(|pid| {
            let store = Arc::clone(&store);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for ticks in 1..=500 {
                    store.record_generator_run(pid, GeneratorId::new("Gen", "gen.dll"), ticks);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    for process in store.snapshot().processes {
        let generator = process.generator("Gen", "gen.dll").unwrap();
        assert_eq!(generator.last(), Some(500));
        assert_eq!(generator.durations, (1..=500).collect::<Vec<i64>>());
    }
}

#[test]
fn test_concurrent_first_sight_creates_one_record() {
    const WRITERS: usize = 16;
    let resolver = Arc::new(TableResolver::new(&[(9, "build")]).slow(Duration::from_millis(20)));
    let store = Arc::new(store_with(Arc::clone(&resolver)));
    let barrier = Arc::new(Barrier::new(WRITERS));

    let handles: Vec<_> = (0..WRITERS)
        .map(|i| {
            let store = Arc::clone(&store);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                store.record_generator_run(9, GeneratorId::new("Gen", "gen.dll"), i as i64);
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(resolver.lookups.load(Ordering::SeqCst), 1);
    let snapshot = store.snapshot();
    assert_eq!(snapshot.processes.len(), 1);
    let process = snapshot.process(9).unwrap();
    assert_eq!(process.generators.len(), 2);
    assert_eq!(process.generator("Gen", "gen.dll").unwrap().count(), WRITERS);
}

#[test]
fn test_snapshot_while_writing_is_consistent() {
    let store = Arc::new(store_with(Arc::new(TableResolver::new(&[]))));
    let writer = {
        let store = Arc::clone(&store);
        thread::spawn(move || {
            for ticks in 0..2_000 {
                store.record_pipeline_run(1, ticks);
            }
        })
    };

    let mut previous = 0;
    while !writer.is_finished() {
        let snapshot = store.snapshot();
        if let Some(process) = snapshot.process(1) {
            let durations = &process.pipeline().durations;
            assert!(durations.len() >= previous);
            assert_eq!(*durations, (0..durations.len() as i64).collect::<Vec<_>>());
            previous = durations.len();
        }
    }
    writer.join().unwrap();
    assert_eq!(store.snapshot().process(1).unwrap().pipeline().count(), 2_000);
}

#[test]
fn test_zero_and_negative_ticks_pass_through() {
    let store = store_with(Arc::new(TableResolver::new(&[])));
    store.record_pipeline_run(1, 0);
    store.record_pipeline_run(1, -5);

    let snapshot = store.snapshot();
    let pipeline = snapshot.process(1).unwrap().pipeline();
    assert_eq!(pipeline.durations, vec![0, -5]);
    assert_eq!(pipeline.cumulative(), Some(-5));
}

#[test]
fn test_slow_name_lookup_does_not_block_known_processes() {
    let (entered_tx, entered_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel();
    let store = Arc::new(AggregationStore::new(
        Arc::new(GatedResolver {
            gated_pid: 2,
            entered: Mutex::new(entered_tx),
            release: Mutex::new(release_rx),
        }),
        "<exited>",
    ));
    store.record_pipeline_run(1, 10);

    let newcomer = {
        let store = Arc::clone(&store);
        thread::spawn(move || store.record_pipeline_run(2, 20))
    };
    entered_rx.recv_timeout(Duration::from_secs(5)).unwrap();

    // pid 2 is stuck in its lookup; pid 1 must still ingest and snapshot
    let (done_tx, done_rx) = mpsc::channel();
    let known = {
        let store = Arc::clone(&store);
        thread::spawn(move || {
            store.record_pipeline_run(1, 11);
            let snapshot = store.snapshot();
            done_tx.send(snapshot).unwrap();
        })
    };
    let during = done_rx.recv_timeout(Duration::from_secs(5));
    release_tx.send(()).unwrap();
    newcomer.join().unwrap();
    known.join().unwrap();

    let during = during.expect("known pid was blocked by another pid's name lookup");
    assert_eq!(during.processes.len(), 1);
    assert_eq!(during.process(1).unwrap().pipeline().durations, vec![10, 11]);

    let after = store.snapshot();
    let pids: Vec<u32> = after.processes.iter().map(|p| p.pid).collect();
    assert_eq!(pids, vec![1, 2]);
    assert_eq!(after.process(2).unwrap().name, "proc2");
    assert_eq!(after.process(2).unwrap().pipeline().durations, vec![20]);
}
