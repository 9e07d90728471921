//! Graceful shutdown sequencing.
//!
//! Shutdown runs a fixed list of steps exactly once. A failing step is logged
//! and the sequence moves on. The last step arms a watchdog on a plain OS
//! thread: if the process is still alive when the grace period runs out,
//! the watchdog terminates it, so a hung runtime cannot keep the server up.

use async_trait::async_trait;
use crossbeam::channel::{self, RecvTimeoutError, Sender};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

use crate::error::ServerError;

pub const DEFAULT_GRACE: Duration = Duration::from_secs(5);
pub const WATCHDOG_EXIT_CODE: i32 = 1;
pub const WATCHDOG_THREAD_NAME: &str = "shutdown-watchdog";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownStep {
    DisconnectPlayers,
    CloseNetwork,
    SaveWorlds,
    StopScheduler,
    ArmWatchdog,
}

impl fmt::Display for ShutdownStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ShutdownStep::DisconnectPlayers => "disconnect players",
            ShutdownStep::CloseNetwork => "close network services",
            ShutdownStep::SaveWorlds => "save worlds",
            ShutdownStep::StopScheduler => "stop scheduler",
            ShutdownStep::ArmWatchdog => "arm watchdog",
        };
        f.write_str(name)
    }
}

/// Every step, in the order it runs.
pub const SHUTDOWN_STEPS: [ShutdownStep; 5] = [
    ShutdownStep::DisconnectPlayers,
    ShutdownStep::CloseNetwork,
    ShutdownStep::SaveWorlds,
    ShutdownStep::StopScheduler,
    ShutdownStep::ArmWatchdog,
];

/// The thing being shut down.
///
/// The sequencer arms the watchdog itself; targets only ever see the other
/// steps.
#[async_trait]
pub trait ShutdownTarget: Send + Sync {
    /// Called once, before the first step.
    fn shutdown_started(&self) {}

    async fn run_step(&self, step: ShutdownStep) -> Result<(), ServerError>;

    /// Called once, after the last step.
    fn shutdown_finished(&self) {}
}

/// Ends the process when the watchdog fires.
pub trait Terminator: Send + Sync + 'static {
    fn terminate(&self, code: i32);
}

/// Default [`Terminator`]: exits the process.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessExit;

impl Terminator for ProcessExit {
    fn terminate(&self, code: i32) {
        std::process::exit(code);
    }
}

/// Handle to an armed watchdog.
#[derive(Debug)]
pub struct Watchdog {
    disarm: Sender<()>,
    thread: thread::JoinHandle<()>,
}

impl Watchdog {
    /// Starts a thread that calls `terminator` once `grace` elapses.
    pub fn arm(grace: Duration, terminator: Arc<dyn Terminator>) -> std::io::Result<Self> {
        let (disarm, disarmed) = channel::bounded::<()>(1);
        let thread = thread::Builder::new()
            .name(WATCHDOG_THREAD_NAME.to_string())
            .spawn(move || {
                let deadline = Instant::now() + grace;
                match disarmed.recv_deadline(deadline) {
                    Ok(()) => return,
                    Err(RecvTimeoutError::Timeout) => {}
                    // only an explicit disarm cancels; a dropped handle keeps waiting
                    Err(RecvTimeoutError::Disconnected) => {
                        thread::sleep(deadline.saturating_duration_since(Instant::now()));
                    }
                }
                error!("Shutdown did not finish within {:?}, forcing exit", grace);
                terminator.terminate(WATCHDOG_EXIT_CODE);
            })?;
        Ok(Self { disarm, thread })
    }

    /// Cancels the watchdog and waits for its thread.
    pub fn disarm(self) {
        let _ = self.disarm.send(());
        let _ = self.thread.join();
    }
}

/// Runs the shutdown steps once.
pub struct ShutdownSequencer {
    started: AtomicBool,
    terminator: Arc<dyn Terminator>,
    watchdog: Mutex<Option<Watchdog>>,
}

impl ShutdownSequencer {
    pub fn new() -> Self {
        Self::with_terminator(Arc::new(ProcessExit))
    }

    pub fn with_terminator(terminator: Arc<dyn Terminator>) -> Self {
        Self {
            started: AtomicBool::new(false),
            terminator,
            watchdog: Mutex::new(None),
        }
    }

    /// Claims the shutdown. Only the first caller gets `true`.
    pub fn begin(&self) -> bool {
        !self.started.swap(true, Ordering::AcqRel)
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// Runs every step against `target`, arming the watchdog with `grace`
    /// last. Returns false without doing anything if shutdown had already
    /// begun.
    pub async fn run(&self, target: &dyn ShutdownTarget, grace: Duration) -> bool {
        if !self.begin() {
            return false;
        }
        info!("🛑 Shutting down");
        target.shutdown_started();

        for step in SHUTDOWN_STEPS {
            let result = match step {
                ShutdownStep::ArmWatchdog => self.arm_watchdog(grace),
                other => target.run_step(other).await,
            };
            if let Err(e) = result {
                warn!("Shutdown step '{step}' failed: {e}");
            }
        }

        target.shutdown_finished();
        true
    }

    fn arm_watchdog(&self, grace: Duration) -> Result<(), ServerError> {
        let watchdog = Watchdog::arm(grace, self.terminator.clone())?;
        *self.watchdog.lock().unwrap_or_else(|p| p.into_inner()) = Some(watchdog);
        Ok(())
    }

    /// Cancels the watchdog, for embedders that exit cleanly on their own.
    pub fn disarm_watchdog(&self) -> bool {
        let watchdog = self.watchdog.lock().unwrap_or_else(|p| p.into_inner()).take();
        match watchdog {
            Some(watchdog) => {
                watchdog.disarm();
                true
            }
            None => false,
        }
    }
}

impl Default for ShutdownSequencer {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ShutdownSequencer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShutdownSequencer")
            .field("started", &self.is_started())
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::AtomicI32;

    /// Terminator that records the exit code instead of exiting.
    #[derive(Default)]
    pub(crate) struct RecordingTerminator {
        pub code: AtomicI32,
        pub fired: AtomicBool,
    }

    impl Terminator for RecordingTerminator {
        fn terminate(&self, code: i32) {
            self.code.store(code, Ordering::SeqCst);
            self.fired.store(true, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    struct Recorder {
        steps: Mutex<Vec<ShutdownStep>>,
        started: AtomicBool,
        finished: AtomicBool,
    }

    #[async_trait]
    impl ShutdownTarget for Recorder {
        fn shutdown_started(&self) {
            self.started.store(true, Ordering::SeqCst);
        }

        async fn run_step(&self, step: ShutdownStep) -> Result<(), ServerError> {
            self.steps.lock().unwrap().push(step);
            if step == ShutdownStep::CloseNetwork {
                return Err(ServerError::Internal("socket already gone".into()));
            }
            Ok(())
        }

        fn shutdown_finished(&self) {
            self.finished.store(true, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_steps_run_in_order_once() {
        let terminator = Arc::new(RecordingTerminator::default());
        let sequencer = ShutdownSequencer::with_terminator(terminator);
        let target = Recorder::default();
        let grace = Duration::from_secs(30);

        assert!(sequencer.run(&target, grace).await);
        assert!(!sequencer.run(&target, grace).await);

        assert_eq!(
            *target.steps.lock().unwrap(),
            vec![
                ShutdownStep::DisconnectPlayers,
                ShutdownStep::CloseNetwork,
                ShutdownStep::SaveWorlds,
                ShutdownStep::StopScheduler,
            ]
        );
        assert!(target.started.load(Ordering::SeqCst));
        assert!(target.finished.load(Ordering::SeqCst));
        assert!(sequencer.disarm_watchdog());
    }

    #[test]
    fn test_watchdog_fires_after_grace() {
        let terminator = Arc::new(RecordingTerminator::default());
        let started = Instant::now();
        let watchdog = Watchdog::arm(Duration::from_millis(50), terminator.clone()).unwrap();
        watchdog.thread.join().unwrap();

        assert!(started.elapsed() >= Duration::from_millis(50));
        assert!(terminator.fired.load(Ordering::SeqCst));
        assert_eq!(terminator.code.load(Ordering::SeqCst), WATCHDOG_EXIT_CODE);
    }

    #[test]
    fn test_disarmed_watchdog_does_not_fire() {
        let terminator = Arc::new(RecordingTerminator::default());
        let watchdog = Watchdog::arm(Duration::from_secs(30), terminator.clone()).unwrap();
        watchdog.disarm();
        assert!(!terminator.fired.load(Ordering::SeqCst));
    }

    #[test]
    fn test_begin_is_claimed_once() {
        let sequencer = ShutdownSequencer::new();
        assert!(sequencer.begin());
        assert!(!sequencer.begin());
        assert!(sequencer.is_started());
    }
}
