//! Periodic rendering of store snapshots

use crate::display::{DisplaySink, Table};
use crate::error::{Result, TracerError};
use crate::store::{AggregationStore, GeneratorId, GeneratorSnapshot, StoreSnapshot};
use std::collections::HashMap;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

const HUNDRED_NS_PER_SECOND: i128 = 10_000_000;
const HUNDRED_NS_PER_DAY: i128 = HUNDRED_NS_PER_SECOND * 86_400;

/// Converts producer ticks into display units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickFormat {
    ticks_per_second: u64,
}

impl TickFormat {
    pub fn new(ticks_per_second: u64) -> Self {
        Self { ticks_per_second: ticks_per_second.max(1) }
    }

    pub fn millis(&self, ticks: i64) -> f64 {
        ticks as f64 / (self.ticks_per_second as f64 / 1000.0)
    }

    /// `[-][d.]hh:mm:ss[.fffffff]`, fraction in 100ns units.
    pub fn duration(&self, ticks: i64) -> String {
        let total = ticks as i128 * HUNDRED_NS_PER_SECOND / self.ticks_per_second as i128;
        let sign = if total < 0 { "-" } else { "" };
        let total = total.abs();

        let days = total / HUNDRED_NS_PER_DAY;
        let rem = total % HUNDRED_NS_PER_DAY;
        let seconds = rem / HUNDRED_NS_PER_SECOND;
        let fraction = rem % HUNDRED_NS_PER_SECOND;

        let mut out = String::from(sign);
        if days > 0 {
            out.push_str(&format!("{}.", days));
        }
        out.push_str(&format!(
            "{:02}:{:02}:{:02}",
            seconds / 3600,
            seconds / 60 % 60,
            seconds % 60
        ));
        if fraction > 0 {
            out.push_str(&format!(".{:07}", fraction));
        }
        out
    }
}

impl Default for TickFormat {
    fn default() -> Self {
        Self::new(HUNDRED_NS_PER_SECOND as u64)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameItem {
    Cursor { column: u16, row: u16 },
    Line(String),
    Table(Table),
}

/// One screenful, built entirely from a single snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Frame {
    pub items: Vec<FrameItem>,
}

impl Frame {
    pub fn build(snapshot: &StoreSnapshot, format: &TickFormat) -> Self {
        let mut items = vec![
            FrameItem::Cursor { column: 0, row: 0 },
            FrameItem::Line("Generators:".to_string()),
            FrameItem::Table(summary_table(snapshot)),
            FrameItem::Line(String::new()),
        ];

        for process in &snapshot.processes {
            items.push(FrameItem::Line(format!("{} (PID {}):", process.name, process.pid)));

            let mut table = Table::new(&[
                "Generator",
                "Last Run Time (ms)",
                "Average Time (ms)",
                "Cumulative Time",
                "Count",
            ]);
            push_timing_row(&mut table, process.pipeline(), format);
            table.add_empty_row();
            for generator in process.generator_slots() {
                push_timing_row(&mut table, generator, format);
            }
            items.push(FrameItem::Table(table));
        }

        Self { items }
    }

    pub fn draw(&self, sink: &mut dyn DisplaySink) -> io::Result<()> {
        for item in &self.items {
            match item {
                FrameItem::Cursor { column, row } => sink.set_cursor(*column, *row)?,
                FrameItem::Line(text) => sink.write_line(text)?,
                FrameItem::Table(table) => sink.render_table(table)?,
            }
        }
        sink.end_frame()
    }
}

/// One row per generator identity across all processes, with the pids emitting it.
fn summary_table(snapshot: &StoreSnapshot) -> Table {
    let mut groups: Vec<(&GeneratorId, Vec<u32>)> = Vec::new();
    let mut index: HashMap<&GeneratorId, usize> = HashMap::new();

    for process in &snapshot.processes {
        for generator in process.generator_slots() {
            match index.get(&generator.id) {
                Some(&i) => groups[i].1.push(process.pid),
                None => {
                    index.insert(&generator.id, groups.len());
                    groups.push((&generator.id, vec![process.pid]));
                }
            }
        }
    }

    let mut table = Table::new(&["Generator Name", "Assembly Path", "PIDs"]);
    for (id, pids) in groups {
        let pids: Vec<String> = pids.iter().map(|pid| pid.to_string()).collect();
        table.add_row(vec![id.name.clone(), id.assembly.clone(), pids.join(",")]);
    }
    table
}

fn push_timing_row(table: &mut Table, generator: &GeneratorSnapshot, format: &TickFormat) {
    let (Some(last), Some(average), Some(cumulative)) =
        (generator.last(), generator.average(), generator.cumulative())
    else {
        table.add_empty_row();
        return;
    };

    table.add_row(vec![
        generator.id.name.clone(),
        format.millis(last).to_string(),
        // whole ticks, as the producers report them
        format.millis(average as i64).to_string(),
        format.duration(cumulative),
        generator.count().to_string(),
    ]);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderState {
    /// No process has been observed; ticks draw nothing.
    Idle,
    Rendering,
}

pub struct RenderLoop<S: DisplaySink> {
    store: Arc<AggregationStore>,
    sink: S,
    period: Duration,
    format: TickFormat,
    state: RenderState,
}

impl<S: DisplaySink> RenderLoop<S> {
    pub fn new(
        store: Arc<AggregationStore>,
        sink: S,
        period: Duration,
        format: TickFormat,
    ) -> Self {
        Self { store, sink, period, format, state: RenderState::Idle }
    }

    pub fn state(&self) -> RenderState {
        self.state
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Draws one frame unless the store is still empty.
    pub fn tick(&mut self) -> Result<()> {
        if self.store.is_empty() {
            return Ok(());
        }
        let snapshot = self.store.snapshot();
        // a process still resolving its name is left out
        if snapshot.is_empty() {
            return Ok(());
        }
        if self.state == RenderState::Idle {
            info!("First timing event received, starting display");
            self.state = RenderState::Rendering;
        }

        Frame::build(&snapshot, &self.format)
            .draw(&mut self.sink)
            .map_err(TracerError::Sink)
    }

    /// Ticks every period until `shutdown` flips, then releases the sink and hands it back.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> S {
        let mut interval = tokio::time::interval_at(Instant::now() + self.period, self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while !*shutdown.borrow() {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.tick() {
                        warn!("Failed to render frame: {}", e);
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        debug!("Render loop stopped");
        if let Err(e) = self.sink.finish() {
            warn!("Failed to release display: {}", e);
        }
        self.sink
    }
}
