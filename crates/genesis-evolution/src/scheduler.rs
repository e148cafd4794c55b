//! Periodic rapid / standard / deep cycles on tokio.
//!
//! Each enabled cycle kind gets its own task ticking at its configured cadence.
//! A cycle runs on the blocking pool so the engine lock never sits on a runtime
//! worker. Stop is signaled through a `watch` channel; `shutdown` joins every task.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::engine::{CycleKind, EvolutionEngine};

pub struct SchedulerHandle {
    stop: watch::Sender<bool>,
    tasks: Vec<(CycleKind, JoinHandle<()>)>,
    engine: Arc<EvolutionEngine>,
}

/// Initialize the engine and start one task per cycle kind enabled by the
/// configured `EvolutionMode`.
pub fn spawn_scheduler(engine: Arc<EvolutionEngine>) -> SchedulerHandle {
    let (stop, stop_rx) = watch::channel(false);
    engine.initialize();

    let mode = engine.config().mode;
    let intervals = engine.config().intervals;
    if mode.is_disabled() {
        tracing::info!("Evolution disabled, no cycles scheduled");
    }

    let mut tasks = Vec::new();
    for (kind, enabled, period) in [
        (CycleKind::Rapid, mode.rapid_enabled(), intervals.rapid),
        (CycleKind::Standard, mode.standard_enabled(), intervals.standard),
        (CycleKind::Deep, mode.deep_enabled(), intervals.deep),
    ] {
        if !enabled {
            continue;
        }
        tracing::debug!(cycle = %kind, period_ms = period.as_millis() as u64, "Scheduling cycle");
        let task = tokio::spawn(cycle_loop(engine.clone(), kind, period, stop_rx.clone()));
        tasks.push((kind, task));
    }
    SchedulerHandle {
        stop,
        tasks,
        engine,
    }
}

async fn cycle_loop(
    engine: Arc<EvolutionEngine>,
    kind: CycleKind,
    period: Duration,
    mut stop: watch::Receiver<bool>,
) {
    let period = period.max(Duration::from_millis(1));
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    break;
                }
                continue;
            }
        }
        if *stop.borrow() {
            break;
        }

        let worker = engine.clone();
        match tokio::task::spawn_blocking(move || worker.run_cycle(kind)).await {
            Ok(Ok(report)) => {
                if !report.registered.is_empty() {
                    tracing::info!(
                        cycle = %kind,
                        registered = report.registered.len(),
                        "Cycle produced growth proposals"
                    );
                }
            }
            Ok(Err(e)) => tracing::warn!(cycle = %kind, error = %e, "Evolution cycle failed"),
            Err(e) => {
                engine.record_cycle_failure();
                tracing::warn!(cycle = %kind, error = %e, "Evolution cycle panicked");
            }
        }
    }
    tracing::debug!(cycle = %kind, "Cycle task stopped");
}

impl SchedulerHandle {
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    pub fn engine(&self) -> &Arc<EvolutionEngine> {
        &self.engine
    }

    /// Signal stop, wait for every cycle task to exit, then shut the engine down.
    /// A cycle already inside its critical section completes first.
    pub async fn shutdown(self) {
        let _ = self.stop.send(true);
        for (kind, task) in self.tasks {
            if let Err(e) = task.await {
                tracing::warn!(cycle = %kind, error = %e, "Cycle task ended abnormally");
            }
        }
        self.engine.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::{HistoryRecord, HistorySink};
    use crate::types::Interaction;
    use std::sync::atomic::{AtomicBool, Ordering};
    use genesis_core::config::{CycleIntervals, EvolutionConfig, EvolutionMode};
    use serde_json::json;

    fn engine(mode: EvolutionMode) -> Arc<EvolutionEngine> {
        let config = EvolutionConfig {
            mode,
            intervals: CycleIntervals {
                rapid: Duration::from_millis(20),
                standard: Duration::from_millis(30),
                deep: Duration::from_millis(40),
            },
            auto_apply: false,
            ..EvolutionConfig::default()
        };
        Arc::new(
            EvolutionEngine::builder(crate::seed::seed_profile().unwrap())
                .config(config)
                .build()
                .unwrap(),
        )
    }

    #[tokio::test]
    async fn test_scheduled_cycles_register_proposals() {
        let engine = engine(EvolutionMode::All);
        for i in 0..20 {
            let s = if i < 17 { 0.2 } else { 0.7 };
            engine.ingest(Interaction::new("chat", json!({ "satisfaction": s })));
        }
        let handle = spawn_scheduler(engine.clone());
        assert_eq!(handle.task_count(), 3);
        assert!(engine.is_active());

        tokio::time::sleep(Duration::from_millis(200)).await;
        handle.shutdown().await;

        assert!(!engine.is_active());
        assert!(engine.cycle_stats().completed >= 3);
        assert!(engine.check_evolution_triggers());

        let after = engine.cycle_stats().completed;
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(engine.cycle_stats().completed, after);
    }

    #[tokio::test]
    async fn test_mode_limits_tasks() {
        let handle = spawn_scheduler(engine(EvolutionMode::RapidOnly));
        assert_eq!(handle.task_count(), 1);
        handle.shutdown().await;

        let handle = spawn_scheduler(engine(EvolutionMode::Disabled));
        assert_eq!(handle.task_count(), 0);
        let engine = handle.engine().clone();
        handle.shutdown().await;
        assert!(!engine.status().active);
    }

    /// Panics on the first registration it sees, then records nothing.
    struct PanickingSink {
        tripped: AtomicBool,
    }

    impl HistorySink for PanickingSink {
        fn name(&self) -> &'static str {
            "panicking"
        }

        fn append(&self, record: &HistoryRecord) -> anyhow::Result<()> {
            if record.event_type == "proposal_registered" && !self.tripped.swap(true, Ordering::SeqCst)
            {
                panic!("sink failure");
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_failed_cycle_is_counted_and_ticks_continue() {
        let config = EvolutionConfig {
            mode: EvolutionMode::RapidOnly,
            intervals: CycleIntervals {
                rapid: Duration::from_millis(20),
                ..CycleIntervals::default()
            },
            auto_apply: false,
            ..EvolutionConfig::default()
        };
        let engine = Arc::new(
            EvolutionEngine::builder(crate::seed::seed_profile().unwrap())
                .config(config)
                .sink(Arc::new(PanickingSink {
                    tripped: AtomicBool::new(false),
                }))
                .build()
                .unwrap(),
        );
        for i in 0..20 {
            let s = if i < 17 { 0.2 } else { 0.7 };
            engine.ingest(Interaction::new("chat", json!({ "satisfaction": s })));
        }
        let handle = spawn_scheduler(engine.clone());
        tokio::time::sleep(Duration::from_millis(200)).await;
        handle.shutdown().await;

        let stats = engine.cycle_stats();
        assert_eq!(stats.failed, 1);
        assert!(stats.completed >= 1);
        assert_eq!(engine.list_active_proposals().len(), 1);
    }
}
