use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::Timelike;
use tracing::{error, info, warn};

use crate::cancel::CancelToken;
use crate::config::Settings;
use crate::hardware::{
    Clock, HardwareError, IndicatorColor, Level, OutputBank, OutputLine, StatusIndicator,
};
use crate::types::OperationState;
use crate::window::{truncate_to_minute, TimeWindow};

/// Bound on how long `stop()` waits for the worker thread to observe
/// cancellation before forcing output cleanup anyway.
const JOIN_TIMEOUT: Duration = Duration::from_secs(3);

/// Sub-cycle stage durations, converted from the settings' minute values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CycleTiming {
    output2_on: Duration,
    output3_on: Duration,
    both_off: Duration,
}

impl CycleTiming {
    fn from_settings(settings: &Settings) -> Self {
        Self {
            output2_on: Duration::from_secs(u64::from(settings.interval_output2_on) * 60),
            output3_on: Duration::from_secs(u64::from(settings.interval_output3_on) * 60),
            both_off: Duration::from_secs(u64::from(settings.interval_both_off) * 60),
        }
    }
}

/// Lock-free cell for the externally observable operation state. Status
/// queries read it without taking the controller lock; a one-tick-stale
/// value is acceptable.
struct StateCell(AtomicU8);

impl StateCell {
    fn new(state: OperationState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    fn store(&self, state: OperationState) {
        self.0.store(state as u8, Ordering::Relaxed);
    }

    fn load(&self) -> OperationState {
        match self.0.load(Ordering::Relaxed) {
            value if value == OperationState::Waiting as u8 => OperationState::Waiting,
            value if value == OperationState::Running as u8 => OperationState::Running,
            _ => OperationState::Stopped,
        }
    }
}

/// State shared between the controller handle and its worker thread.
struct Shared {
    running: AtomicBool,
    control_enabled: AtomicBool,
    state: StateCell,
    cancel: CancelToken,
    outputs: Arc<dyn OutputBank>,
    indicator: Arc<dyn StatusIndicator>,
    clock: Arc<dyn Clock>,
}

struct WorkerHandle {
    handle: JoinHandle<()>,
    done: mpsc::Receiver<()>,
}

#[derive(Default)]
struct Lifecycle {
    worker: Option<WorkerHandle>,
    settings: Option<Settings>,
}

/// The scheduling/cycling state machine. Owns the background worker thread
/// that re-evaluates the time window once per minute and runs the nested
/// output sub-cycle while inside an active window.
///
/// Explicitly constructed and explicitly owned; hand it to the web layer by
/// `Arc`. Reconfiguration is a full `start()` (which supersedes any prior
/// run), never live mutation of a running worker.
pub struct Controller {
    shared: Arc<Shared>,
    lifecycle: Mutex<Lifecycle>,
}

impl Controller {
    pub fn new(
        outputs: Arc<dyn OutputBank>,
        indicator: Arc<dyn StatusIndicator>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                running: AtomicBool::new(false),
                control_enabled: AtomicBool::new(false),
                state: StateCell::new(OperationState::Stopped),
                cancel: CancelToken::new(),
                outputs,
                indicator,
                clock,
            }),
            lifecycle: Mutex::new(Lifecycle::default()),
        }
    }

    /// Launch the background loop with a fresh settings snapshot. A
    /// controller that is already running is fully stopped first, so at
    /// most one worker thread exists at a time and outputs only ever
    /// reflect one settings snapshot.
    pub fn start(&self, settings: Settings) {
        let mut lifecycle = self.lock_lifecycle();
        self.stop_locked(&mut lifecycle);

        self.shared.cancel.rearm();
        self.shared.running.store(true, Ordering::SeqCst);
        self.shared.control_enabled.store(true, Ordering::SeqCst);
        self.shared.state.store(OperationState::Waiting);

        let worker = Worker {
            shared: Arc::clone(&self.shared),
            window: TimeWindow::from_settings(&settings),
            timing: CycleTiming::from_settings(&settings),
        };
        let (done_tx, done_rx) = mpsc::channel();
        let handle = thread::spawn(move || {
            // Dropping the sender signals worker exit to stop()'s bounded join.
            let _exit_signal = done_tx;
            worker.run();
        });

        info!("controller started with settings: {settings:?}");
        lifecycle.settings = Some(settings);
        lifecycle.worker = Some(WorkerHandle {
            handle,
            done: done_rx,
        });
    }

    /// Idempotent; safe to call when not running. Outputs and the indicator
    /// are forced off regardless of whether the worker exits within the
    /// join bound.
    pub fn stop(&self) {
        let mut lifecycle = self.lock_lifecycle();
        self.stop_locked(&mut lifecycle);
    }

    pub fn operation_state(&self) -> OperationState {
        self.shared.state.load()
    }

    pub fn control_enabled(&self) -> bool {
        self.shared.control_enabled.load(Ordering::Relaxed)
    }

    /// The settings snapshot the current worker was launched with.
    pub fn current_settings(&self) -> Option<Settings> {
        self.lock_lifecycle().settings.clone()
    }

    fn stop_locked(&self, lifecycle: &mut Lifecycle) {
        if lifecycle.worker.is_some() {
            info!("controller stopping");
        }

        self.shared.running.store(false, Ordering::SeqCst);
        self.shared.control_enabled.store(false, Ordering::SeqCst);
        self.shared.state.store(OperationState::Stopped);
        self.shared.cancel.cancel();

        if let Some(worker) = lifecycle.worker.take() {
            match worker.done.recv_timeout(JOIN_TIMEOUT) {
                Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                    if worker.handle.join().is_err() {
                        warn!("control loop thread panicked");
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    // The thread observes cancellation within one timer wait;
                    // let it exit on its own rather than block any longer.
                    warn!("control loop did not exit within {JOIN_TIMEOUT:?}, detaching");
                }
            }
        }
        lifecycle.settings = None;

        if let Err(err) = self.shared.outputs.all_off() {
            warn!("failed to force outputs low on stop: {err}");
        }
        if let Err(err) = self.shared.indicator.set(IndicatorColor::Off) {
            warn!("failed to clear indicator on stop: {err}");
        }
        info!("controller stopped");
    }

    fn lock_lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        self.stop();
    }
}

struct Worker {
    shared: Arc<Shared>,
    window: TimeWindow,
    timing: CycleTiming,
}

impl Worker {
    fn run(&self) {
        while self.active() {
            if let Err(err) = self.iterate() {
                // Terminates without in-thread cleanup; the next explicit
                // start()/stop() reconciles output state.
                error!("control loop error: {err}");
                break;
            }
        }
    }

    fn active(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst) && !self.shared.cancel.is_cancelled()
    }

    /// One pass of the outer loop: evaluate the window, run the sub-cycle
    /// while inside it, then sleep until the next minute boundary.
    fn iterate(&self) -> Result<(), HardwareError> {
        let now = self.shared.clock.now();
        let minute = truncate_to_minute(now.time());

        if self.window.contains(minute) {
            self.shared.state.store(OperationState::Running);
            self.shared.indicator.set(IndicatorColor::Green)?;
            info!("main cycle started at {}", now.format("%H:%M:%S"));
            self.run_main_cycle()?;
            info!(
                "main cycle ended at {}",
                self.shared.clock.now().format("%H:%M:%S")
            );
            if self.shared.running.load(Ordering::SeqCst) {
                self.shared.state.store(OperationState::Waiting);
                self.shared.indicator.set(IndicatorColor::Blue)?;
            }
        } else {
            self.shared.outputs.all_off()?;
        }

        // Re-align to the next minute boundary so window evaluation and
        // exact-minute night matching never drift.
        self.shared.cancel.wait(self.until_next_minute());
        Ok(())
    }

    fn until_next_minute(&self) -> Duration {
        let now = self.shared.clock.now().time();
        let since_boundary = Duration::new(u64::from(now.second()), now.nanosecond());
        Duration::from_secs(60).saturating_sub(since_boundary)
    }

    /// The nested sub-cycle. Output1 stays high for the whole duration and
    /// is forced low on every exit path, including the error path.
    fn run_main_cycle(&self) -> Result<(), HardwareError> {
        self.shared.outputs.set(OutputLine::Output1, Level::High)?;
        let stages = self.cycle_stages();
        let lowered = self.shared.outputs.set(OutputLine::Output1, Level::Low);
        stages.and(lowered)
    }

    /// Pulse stages, repeated until the window closes or cancellation
    /// fires. A cancelled wait breaks immediately with the stage outputs
    /// left as they are; stop() forces everything low afterwards.
    fn cycle_stages(&self) -> Result<(), HardwareError> {
        let outputs = &self.shared.outputs;
        let cancel = &self.shared.cancel;

        while self.active() {
            let minute = truncate_to_minute(self.shared.clock.now().time());
            if !self.window.contains(minute) {
                break;
            }

            outputs.set(OutputLine::Output2, Level::High)?;
            if cancel.wait(self.timing.output2_on) {
                break;
            }
            outputs.set(OutputLine::Output2, Level::Low)?;

            outputs.set(OutputLine::Output3, Level::High)?;
            outputs.set(OutputLine::Output4, Level::High)?;
            if cancel.wait(self.timing.output3_on) {
                break;
            }
            outputs.set(OutputLine::Output3, Level::Low)?;
            outputs.set(OutputLine::Output4, Level::Low)?;

            // A night instant runs a single abbreviated pass.
            if self.window.is_night_instant(minute) {
                break;
            }

            if cancel.wait(self.timing.both_off) {
                break;
            }
        }

        Ok(())
    }
}
