//! Job Coordinator
//!
//! Owns the background worker thread that drains the job queue. One worker
//! processes one job at a time: stem separation jobs are claimed before
//! analysis jobs so stems exist by the time their analysis runs. After
//! finishing a job the worker re-polls immediately; an empty queue puts it
//! to sleep for the poll interval, interruptible by `stop`.
//!
//! A processor failure marks the job failed and the loop keeps going; only
//! `stop` ends the worker.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use tracing::{error, info, warn};

use crate::config::CoordinatorConfig;
use crate::error::{CoreError, CoreResult};
use crate::job::{AnalysisJob, JobKind, JobStore};

/// Work executor the coordinator drives; one job at a time
pub trait JobProcessor: Send {
    fn process(&mut self, job: &AnalysisJob) -> CoreResult<()>;
}

/// Lifecycle notifications emitted by the worker thread
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoordinatorEvent {
    JobStarted { id: String, kind: JobKind },
    JobCompleted { id: String },
    JobFailed { id: String, error: String },
    Stopped,
}

/// Drains the job queue on a dedicated worker thread
pub struct JobCoordinator {
    config: CoordinatorConfig,
    store: Arc<dyn JobStore>,
    processor: Option<Box<dyn JobProcessor>>,
    running: Arc<AtomicBool>,
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
    event_tx: Sender<CoordinatorEvent>,
    event_rx: Receiver<CoordinatorEvent>,
}

impl JobCoordinator {
    pub fn new(
        config: CoordinatorConfig,
        store: Arc<dyn JobStore>,
        processor: Box<dyn JobProcessor>,
    ) -> CoreResult<Self> {
        config.validate()?;
        let (event_tx, event_rx) = unbounded();
        Ok(Self {
            config,
            store,
            processor: Some(processor),
            running: Arc::new(AtomicBool::new(false)),
            stop_tx: None,
            handle: None,
            event_tx,
            event_rx,
        })
    }

    /// Receiver for lifecycle events; clone-cheap, usable from any thread
    pub fn events(&self) -> Receiver<CoordinatorEvent> {
        self.event_rx.clone()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Spawn the worker thread. The processor moves into the thread, so a
    /// coordinator starts at most once.
    pub fn start(&mut self) -> CoreResult<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(CoreError::AlreadyRunning);
        }
        let processor = match self.processor.take() {
            Some(p) => p,
            None => {
                self.running.store(false, Ordering::SeqCst);
                return Err(CoreError::AlreadyRunning);
            }
        };

        let (stop_tx, stop_rx) = bounded::<()>(1);
        self.stop_tx = Some(stop_tx);

        let store = Arc::clone(&self.store);
        let running = Arc::clone(&self.running);
        let event_tx = self.event_tx.clone();
        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);

        let handle = thread::Builder::new()
            .name("lumen-job-worker".to_string())
            .spawn(move || {
                worker_loop(store, processor, running, stop_rx, event_tx, poll_interval);
            })?;
        self.handle = Some(handle);

        info!("job coordinator started");
        Ok(())
    }

    /// Signal the worker and wait for it to finish its current job
    pub fn stop(&mut self) -> CoreResult<()> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(CoreError::NotRunning);
        }
        self.running.store(false, Ordering::SeqCst);
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.try_send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("job worker thread panicked");
            }
        }
        info!("job coordinator stopped");
        Ok(())
    }
}

impl Drop for JobCoordinator {
    fn drop(&mut self) {
        if self.is_running() {
            let _ = self.stop();
        }
    }
}

fn worker_loop(
    store: Arc<dyn JobStore>,
    mut processor: Box<dyn JobProcessor>,
    running: Arc<AtomicBool>,
    stop_rx: Receiver<()>,
    event_tx: Sender<CoordinatorEvent>,
    poll_interval: Duration,
) {
    while running.load(Ordering::SeqCst) {
        match claim_next_prioritized(&store) {
            Ok(Some(job)) => {
                run_job(&store, processor.as_mut(), &event_tx, &job);
                // Re-poll right away while the queue has work
                continue;
            }
            Ok(None) => {}
            Err(e) => {
                error!("failed to poll job queue: {e}");
            }
        }
        // Idle sleep, cut short by a stop signal
        if stop_rx.recv_timeout(poll_interval).is_ok() {
            break;
        }
    }
    let _ = event_tx.send(CoordinatorEvent::Stopped);
}

/// Stem separation first so analysis jobs see their inputs
fn claim_next_prioritized(store: &Arc<dyn JobStore>) -> CoreResult<Option<AnalysisJob>> {
    if let Some(job) = store.claim_next(JobKind::StemSeparation)? {
        return Ok(Some(job));
    }
    store.claim_next(JobKind::AudioAnalysis)
}

fn run_job(
    store: &Arc<dyn JobStore>,
    processor: &mut dyn JobProcessor,
    event_tx: &Sender<CoordinatorEvent>,
    job: &AnalysisJob,
) {
    info!(id = %job.id, kind = ?job.kind, "processing job");
    let _ = event_tx.send(CoordinatorEvent::JobStarted {
        id: job.id.clone(),
        kind: job.kind,
    });

    match processor.process(job) {
        Ok(()) => {
            if let Err(e) = store.complete(&job.id) {
                error!(id = %job.id, "failed to record job completion: {e}");
            }
            let _ = event_tx.send(CoordinatorEvent::JobCompleted { id: job.id.clone() });
        }
        Err(e) => {
            let message = e.to_string();
            warn!(id = %job.id, "job failed: {message}");
            if let Err(e) = store.fail(&job.id, &message) {
                error!(id = %job.id, "failed to record job failure: {e}");
            }
            let _ = event_tx.send(CoordinatorEvent::JobFailed {
                id: job.id.clone(),
                error: message,
            });
        }
    }
}
