//! Background generator of synthetic incubator readings.
//!
//! Every tick reads the current device list and appends one reading per
//! device. Inserts are independent: a failure is logged and the rest of the
//! tick carries on.

pub mod generator;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use incubator_db::{Database, DbError};

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    pub interval: Duration,
    /// Stop on its own after this many ticks. `None` runs until stopped.
    pub max_ticks: Option<u64>,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            max_ticks: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimulatorState {
    Idle,
    Running,
    Stopped,
}

/// A single reading that could not be written this tick.
#[derive(Debug, Error)]
#[error("insert for {serial_number} failed: {source}")]
pub struct TransientInsertFailure {
    pub serial_number: String,
    #[source]
    pub source: DbError,
}

#[derive(Debug, Default)]
pub struct TickReport {
    pub devices: usize,
    pub inserted: usize,
    pub failures: Vec<TransientInsertFailure>,
}

/// One generation step. Blocking; call from a blocking context.
///
/// Only the device listing can fail the tick as a whole.
pub fn run_tick(db: &Database) -> Result<TickReport, DbError> {
    let serials = db.list_serial_numbers()?;
    let timestamp = generator::now();
    let mut rng = rand::rng();

    let mut report = TickReport {
        devices: serials.len(),
        ..Default::default()
    };
    for serial_number in serials {
        let reading = generator::synthesize(&serial_number, timestamp, &mut rng);
        match db.insert_reading(&reading) {
            Ok(_) => report.inserted += 1,
            Err(source) => {
                let failure = TransientInsertFailure {
                    serial_number,
                    source,
                };
                warn!("Skipping reading: {}", failure);
                report.failures.push(failure);
            }
        }
    }
    Ok(report)
}

/// A simulator that has been configured but not started.
pub struct Simulator {
    db: Arc<Database>,
    config: SimulatorConfig,
    state_tx: watch::Sender<SimulatorState>,
}

impl Simulator {
    pub fn new(db: Arc<Database>, config: SimulatorConfig) -> Self {
        let (state_tx, _) = watch::channel(SimulatorState::Idle);
        Self {
            db,
            config,
            state_tx,
        }
    }

    pub fn state(&self) -> SimulatorState {
        *self.state_tx.borrow()
    }

    /// Spawn the loop on the current tokio runtime.
    pub fn start(self) -> SimulatorHandle {
        let cancel = CancellationToken::new();
        let ticks = Arc::new(AtomicU64::new(0));
        let state = self.state_tx.subscribe();

        let task = tokio::spawn(run_loop(
            self.db,
            self.config,
            cancel.clone(),
            self.state_tx,
            ticks.clone(),
        ));

        SimulatorHandle {
            cancel,
            state,
            ticks,
            task,
        }
    }
}

/// Owner's handle on a running simulator. Dropping it does not stop the
/// task; call [`SimulatorHandle::stop`] before shutting down.
pub struct SimulatorHandle {
    cancel: CancellationToken,
    state: watch::Receiver<SimulatorState>,
    ticks: Arc<AtomicU64>,
    task: JoinHandle<()>,
}

impl SimulatorHandle {
    pub fn state(&self) -> SimulatorState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<SimulatorState> {
        self.state.clone()
    }

    /// Ticks completed so far.
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Acquire)
    }

    /// Cancel before the next tick and wait for the task to exit. A tick
    /// already in progress finishes its inserts first.
    pub async fn stop(self) -> Result<u64, JoinError> {
        self.cancel.cancel();
        self.join().await
    }

    /// Wait for a bounded run to finish. Returns the number of ticks run.
    pub async fn join(self) -> Result<u64, JoinError> {
        self.task.await?;
        Ok(self.ticks.load(Ordering::Acquire))
    }
}

async fn run_loop(
    db: Arc<Database>,
    config: SimulatorConfig,
    cancel: CancellationToken,
    state_tx: watch::Sender<SimulatorState>,
    ticks: Arc<AtomicU64>,
) {
    state_tx.send_replace(SimulatorState::Running);
    info!("Telemetry simulator running every {:?}", config.interval);

    let mut interval = tokio::time::interval(config.interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        if config
            .max_ticks
            .is_some_and(|max| ticks.load(Ordering::Acquire) >= max)
        {
            break;
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {}
        }

        let tick_db = db.clone();
        match tokio::task::spawn_blocking(move || run_tick(&tick_db)).await {
            Ok(Ok(report)) if report.failures.is_empty() => {
                debug!("Tick: {} readings appended", report.inserted);
            }
            Ok(Ok(report)) => {
                warn!(
                    "Tick: {} of {} readings appended, {} failed",
                    report.inserted,
                    report.devices,
                    report.failures.len()
                );
            }
            Ok(Err(e)) => warn!("Tick skipped, could not list devices: {}", e),
            Err(e) => error!("Tick task panicked: {}", e),
        }
        ticks.fetch_add(1, Ordering::AcqRel);
    }

    state_tx.send_replace(SimulatorState::Stopped);
    info!(
        "Telemetry simulator stopped after {} ticks",
        ticks.load(Ordering::Acquire)
    );
}
