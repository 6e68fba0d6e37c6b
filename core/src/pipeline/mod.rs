//! The pipeline supervisor: owns collectors, strategies and executors,
//! connects them through the two durable queues and reports throughput.
//!
//! Data flows collector -> event queue -> strategy worker -> action queue
//! -> executor worker. Shutdown is cooperative; whatever is still queued
//! stays durable for the next start.

pub mod builder;
pub mod stats;

use std::{
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use futures::future::join_all;
use thiserror::Error;
use tokio::{sync::Mutex, task::JoinHandle, time::sleep};
use tokio_stream::StreamExt;
use tracing::{error, info, warn};

use crate::{
    collectors::{Collector, CollectorError},
    executors::Executor,
    queue::{DurableQueue, QueueError},
    strategies::Strategy,
    types::{Action, Event},
};
use stats::PipelineStats;

pub use builder::{BuildError, SentinelBuilder};

/// Stages idle longer than this get a warning in the stats log.
const IDLE_WARNING: Duration = Duration::from_secs(60);
/// Enqueue/process latencies above this are logged as slow.
const SLOW_OPERATION: Duration = Duration::from_secs(1);
/// Backoff before restarting a collector whose stream ended.
const COLLECTOR_RESTART_BACKOFF: Duration = Duration::from_secs(5);

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Collector(#[from] CollectorError),
}

pub struct Sentinel {
    collectors: Vec<Arc<dyn Collector>>,
    strategies: Arc<Mutex<Vec<Box<dyn Strategy>>>>,
    executors: Arc<Vec<Arc<dyn Executor>>>,
    running: Arc<AtomicBool>,
    queue_dir: PathBuf,
    group_name: String,
    stats_interval: Duration,
    stats: Arc<PipelineStats>,
    event_queue: Option<Arc<DurableQueue<Event>>>,
    action_queue: Option<Arc<DurableQueue<Action>>>,
    tasks: Vec<JoinHandle<()>>,
}

impl std::fmt::Debug for Sentinel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sentinel")
            .field("collectors", &self.collectors.len())
            .field("strategies", &"<strategies>")
            .field("executors", &self.executors.len())
            .field("running", &self.running)
            .field("queue_dir", &self.queue_dir)
            .field("group_name", &self.group_name)
            .field("stats_interval", &self.stats_interval)
            .field("event_queue", &self.event_queue.is_some())
            .field("action_queue", &self.action_queue.is_some())
            .field("tasks", &self.tasks.len())
            .finish()
    }
}

impl Sentinel {
    pub fn new(queue_dir: PathBuf, group_name: String, stats_interval_secs: u64) -> Self {
        Self {
            collectors: Vec::new(),
            strategies: Arc::new(Mutex::new(Vec::new())),
            executors: Arc::new(Vec::new()),
            running: Arc::new(AtomicBool::new(false)),
            queue_dir,
            group_name,
            stats_interval: Duration::from_secs(stats_interval_secs.max(1)),
            stats: Arc::new(PipelineStats::new()),
            event_queue: None,
            action_queue: None,
            tasks: Vec::new(),
        }
    }

    pub fn add_collector(&mut self, collector: Arc<dyn Collector>) {
        info!("Added collector: {}", collector.name());
        self.collectors.push(collector);
    }

    pub fn add_strategy(&mut self, strategy: Box<dyn Strategy>) {
        info!("Added strategy: {}", strategy.name());
        self.strategies
            .try_lock()
            .expect("strategies are only registered before start")
            .push(strategy);
    }

    pub fn add_executor(&mut self, executor: Arc<dyn Executor>) {
        info!("Added executor: {}", executor.name());
        Arc::get_mut(&mut self.executors)
            .expect("executors are only registered before start")
            .push(executor);
    }

    #[cfg(test)]
    pub(crate) fn stats(&self) -> Arc<PipelineStats> {
        Arc::clone(&self.stats)
    }

    /// Open the queues, start every collector and spawn the worker tasks.
    pub async fn start(&mut self) -> Result<(), PipelineError> {
        self.running.store(true, Ordering::SeqCst);

        let event_queue = Arc::new(
            DurableQueue::open(&self.queue_dir.join(format!("{}_events.db", self.group_name)))
                .await?,
        );
        let action_queue = Arc::new(
            DurableQueue::open(&self.queue_dir.join(format!("{}_actions.db", self.group_name)))
                .await?,
        );
        self.event_queue = Some(Arc::clone(&event_queue));
        self.action_queue = Some(Arc::clone(&action_queue));

        let start_results =
            join_all(self.collectors.iter().map(|collector| collector.start())).await;
        for result in start_results {
            if let Err(e) = result {
                error!("Error starting components: {e}");
                self.stop().await;
                return Err(e.into());
            }
        }

        for collector in &self.collectors {
            self.tasks.push(spawn_collector_driver(
                Arc::clone(collector),
                Arc::clone(&event_queue),
                Arc::clone(&self.running),
                Arc::clone(&self.stats),
            ));
        }
        self.tasks.push(spawn_strategy_worker(
            Arc::clone(&self.strategies),
            Arc::clone(&event_queue),
            Arc::clone(&action_queue),
            Arc::clone(&self.running),
            Arc::clone(&self.stats),
            self.stats_interval,
        ));
        self.tasks.push(spawn_executor_worker(
            Arc::clone(&self.executors),
            Arc::clone(&action_queue),
            Arc::clone(&self.running),
            Arc::clone(&self.stats),
            self.stats_interval,
        ));
        self.tasks.push(spawn_stats_reporter(
            Arc::clone(&self.stats),
            Arc::clone(&event_queue),
            Arc::clone(&action_queue),
            Arc::clone(&self.running),
            self.stats_interval,
        ));

        info!(
            "Started {} collectors, {} strategies, {} executors",
            self.collectors.len(),
            self.strategies.lock().await.len(),
            self.executors.len()
        );
        Ok(())
    }

    /// Wait for the worker tasks. Returns when the pipeline is stopped.
    pub async fn join(&mut self) {
        for task in &mut self.tasks {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    error!("Pipeline task failed: {e}");
                }
            }
        }
    }

    /// Stop all components gracefully. Queued items stay durable.
    pub async fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);

        let stop_results = join_all(self.collectors.iter().map(|collector| collector.stop())).await;
        for result in stop_results {
            if let Err(e) = result {
                error!("Error stopping collector: {e}");
            }
        }

        let events_remaining = match &self.event_queue {
            Some(queue) => queue.len().await.unwrap_or(0),
            None => 0,
        };
        let actions_remaining = match &self.action_queue {
            Some(queue) => queue.len().await.unwrap_or(0),
            None => 0,
        };
        info!(
            "Shutting down with {events_remaining} events and {actions_remaining} actions remaining"
        );

        for task in self.tasks.drain(..) {
            task.abort();
        }

        if let Some(queue) = self.event_queue.take() {
            queue.close();
        }
        if let Some(queue) = self.action_queue.take() {
            queue.close();
        }

        let window = self.stats.take_window();
        info!(
            "Final stats - Events: collected={}, processed={}, Actions: generated={}, executed={}",
            window.events_collected,
            window.events_processed,
            window.actions_generated,
            window.actions_executed
        );
    }
}

/// Drain one collector's event stream into the event queue, restarting the
/// stream with a backoff if it ends while the pipeline is running.
fn spawn_collector_driver(
    collector: Arc<dyn Collector>,
    event_queue: Arc<DurableQueue<Event>>,
    running: Arc<AtomicBool>,
    stats: Arc<PipelineStats>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("Starting collector driver: {}", collector.name());

        while running.load(Ordering::SeqCst) {
            let mut stream = collector.events();
            while let Some(event) = stream.next().await {
                if !running.load(Ordering::SeqCst) {
                    return;
                }

                let started = Instant::now();
                match event_queue.enqueue(&event).await {
                    Ok(()) => {
                        stats.record_collected();
                        if started.elapsed() > SLOW_OPERATION {
                            warn!(
                                "Slow event collection in {}: {:.2}s",
                                collector.name(),
                                started.elapsed().as_secs_f64()
                            );
                        }
                    }
                    Err(e) => error!("Error queueing event in {}: {e}", collector.name()),
                }
            }

            if running.load(Ordering::SeqCst) {
                warn!("Collector {} events stream ended, restarting...", collector.name());
                sleep(COLLECTOR_RESTART_BACKOFF).await;
            }
        }
    })
}

/// Feed dequeued events through every strategy in registration order; all
/// of one event's actions are enqueued before the next event is taken.
fn spawn_strategy_worker(
    strategies: Arc<Mutex<Vec<Box<dyn Strategy>>>>,
    event_queue: Arc<DurableQueue<Event>>,
    action_queue: Arc<DurableQueue<Action>>,
    running: Arc<AtomicBool>,
    stats: Arc<PipelineStats>,
    stats_interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("Starting strategy processor");
        let mut last_idle_log = Instant::now();

        while running.load(Ordering::SeqCst) {
            let event = match event_queue.dequeue(stats_interval).await {
                Ok(Some(event)) => event,
                Ok(None) => {
                    // Empty queue is normal idleness.
                    if last_idle_log.elapsed() > IDLE_WARNING {
                        info!("Strategy processor is idle - waiting for events...");
                        last_idle_log = Instant::now();
                    }
                    continue;
                }
                Err(e) => {
                    error!("Error reading from event queue: {e}");
                    sleep(Duration::from_secs(1)).await;
                    continue;
                }
            };

            let started = Instant::now();
            let mut action_count = 0usize;

            let mut strategies = strategies.lock().await;
            for strategy in strategies.iter_mut() {
                match strategy.process_event(&event).await {
                    Ok(actions) => {
                        for action in actions {
                            match action_queue.enqueue(&action).await {
                                Ok(()) => {
                                    action_count += 1;
                                    stats.record_generated();
                                }
                                Err(e) => error!("Error queueing action: {e}"),
                            }
                        }
                    }
                    Err(e) => error!("Error in strategy {}: {e}", strategy.name()),
                }
            }
            drop(strategies);

            stats.record_processed();
            if started.elapsed() > SLOW_OPERATION {
                warn!(
                    "Slow event processing: {:.2}s, generated {action_count} actions",
                    started.elapsed().as_secs_f64()
                );
            }
        }
    })
}

/// Deliver each dequeued action to every executor concurrently, collecting
/// failures without aborting the batch.
fn spawn_executor_worker(
    executors: Arc<Vec<Arc<dyn Executor>>>,
    action_queue: Arc<DurableQueue<Action>>,
    running: Arc<AtomicBool>,
    stats: Arc<PipelineStats>,
    stats_interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("Starting action executor");
        let mut last_idle_log = Instant::now();

        while running.load(Ordering::SeqCst) {
            let action = match action_queue.dequeue(stats_interval).await {
                Ok(Some(action)) => action,
                Ok(None) => {
                    if last_idle_log.elapsed() > IDLE_WARNING {
                        info!("Action executor is idle - waiting for actions...");
                        last_idle_log = Instant::now();
                    }
                    continue;
                }
                Err(e) => {
                    error!("Error reading from action queue: {e}");
                    sleep(Duration::from_secs(1)).await;
                    continue;
                }
            };

            let started = Instant::now();
            let results =
                join_all(executors.iter().map(|executor| executor.execute(&action))).await;
            for (executor, result) in executors.iter().zip(results) {
                if let Err(e) = result {
                    error!("Error in executor {}: {e}", executor.name());
                }
            }

            stats.record_executed();
            if started.elapsed() > SLOW_OPERATION {
                warn!("Slow action execution: {:.2}s", started.elapsed().as_secs_f64());
            }
        }
    })
}

/// Log totals, rates, queue depths and idle gaps every interval, then
/// reset the window counters.
fn spawn_stats_reporter(
    stats: Arc<PipelineStats>,
    event_queue: Arc<DurableQueue<Event>>,
    action_queue: Arc<DurableQueue<Action>>,
    running: Arc<AtomicBool>,
    stats_interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while running.load(Ordering::SeqCst) {
            sleep(stats_interval).await;
            if !running.load(Ordering::SeqCst) {
                break;
            }

            let window = stats.take_window();
            let elapsed = stats_interval.as_secs_f64();
            let events_queued = event_queue.len().await.unwrap_or(0);
            let actions_queued = action_queue.len().await.unwrap_or(0);
            let (collector_idle, strategy_idle, executor_idle) = stats.idle_times();

            info!(
                "Stats - Events: collected={} ({:.1}/s), processed={} ({:.1}/s), queued={events_queued} | \
                 Actions: generated={} ({:.1}/s), executed={} ({:.1}/s), queued={actions_queued} | \
                 Idle times: collector={:.1}s, strategy={:.1}s, executor={:.1}s",
                window.events_collected,
                window.events_collected as f64 / elapsed,
                window.events_processed,
                window.events_processed as f64 / elapsed,
                window.actions_generated,
                window.actions_generated as f64 / elapsed,
                window.actions_executed,
                window.actions_executed as f64 / elapsed,
                collector_idle.as_secs_f64(),
                strategy_idle.as_secs_f64(),
                executor_idle.as_secs_f64(),
            );

            if collector_idle > IDLE_WARNING {
                warn!("Collector has been idle for {:.1} seconds", collector_idle.as_secs_f64());
            }
            if strategy_idle > IDLE_WARNING {
                warn!(
                    "Strategy processor has been idle for {:.1} seconds",
                    strategy_idle.as_secs_f64()
                );
            }
            if executor_idle > IDLE_WARNING {
                warn!(
                    "Action executor has been idle for {:.1} seconds",
                    executor_idle.as_secs_f64()
                );
            }
        }
    })
}
