//! Primary tick thread.
//!
//! World state is only ever advanced on one thread. The scheduler owns that
//! thread, runs queued tasks at the start of each tick and then pulses every
//! registered world.

use crate::world::WorldRegistry;
use crossbeam::channel::{self, Receiver, Sender};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

pub const TICK_THREAD_NAME: &str = "server-tick";

/// Work submitted to run on the primary thread.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Drives the primary thread.
pub trait TickScheduler: Send + Sync {
    fn start(&self) -> std::io::Result<()>;

    /// Stops ticking. Safe to call more than once, and from the tick thread.
    fn stop(&self);

    /// Whether the caller is running on the primary thread.
    fn is_primary_thread(&self) -> bool;

    /// Queues `task` for the next tick. Returns false once stopped.
    fn submit(&self, task: Task) -> bool;

    /// Ticks completed so far.
    fn current_tick(&self) -> u64;
}

/// [`TickScheduler`] running a dedicated thread at a fixed interval.
pub struct FixedRateScheduler {
    interval: Duration,
    worlds: Arc<WorldRegistry>,
    tasks: Sender<Task>,
    queue: Receiver<Task>,
    running: Arc<AtomicBool>,
    stopped: AtomicBool,
    ticks: Arc<AtomicU64>,
    primary: Arc<OnceLock<ThreadId>>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl FixedRateScheduler {
    pub fn new(interval: Duration, worlds: Arc<WorldRegistry>) -> Self {
        let (tasks, queue) = channel::unbounded();
        Self {
            interval,
            worlds,
            tasks,
            queue,
            running: Arc::new(AtomicBool::new(false)),
            stopped: AtomicBool::new(false),
            ticks: Arc::new(AtomicU64::new(0)),
            primary: Arc::new(OnceLock::new()),
            thread: Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl TickScheduler for FixedRateScheduler {
    fn start(&self) -> std::io::Result<()> {
        if self.stopped.load(Ordering::Acquire) || self.running.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let interval = self.interval;
        let worlds = self.worlds.clone();
        let queue = self.queue.clone();
        let running = self.running.clone();
        let ticks = self.ticks.clone();
        let primary = self.primary.clone();

        let handle = thread::Builder::new()
            .name(TICK_THREAD_NAME.to_string())
            .spawn(move || {
                let _ = primary.set(thread::current().id());
                debug!("Tick thread started at {:?} per tick", interval);

                while running.load(Ordering::Acquire) {
                    let started = Instant::now();

                    while let Ok(task) = queue.try_recv() {
                        if std::panic::catch_unwind(std::panic::AssertUnwindSafe(task)).is_err() {
                            error!("A scheduled task panicked");
                        }
                    }
                    for world in worlds.list_all() {
                        world.pulse();
                    }
                    ticks.fetch_add(1, Ordering::AcqRel);

                    let elapsed = started.elapsed();
                    if elapsed < interval {
                        thread::park_timeout(interval - elapsed);
                    } else if elapsed > interval * 20 {
                        warn!("Tick took {:?}, the server is overloaded", elapsed);
                    }
                }
                debug!("Tick thread exiting");
            })
            .inspect_err(|_| self.running.store(false, Ordering::Release))?;

        *self.thread.lock().unwrap_or_else(|p| p.into_inner()) = Some(handle);
        info!("⏱️ Tick scheduler started ({}ms interval)", self.interval.as_millis());
        Ok(())
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
        self.running.store(false, Ordering::Release);

        let handle = self.thread.lock().unwrap_or_else(|p| p.into_inner()).take();
        if let Some(handle) = handle {
            handle.thread().unpark();
            if self.is_primary_thread() {
                // joining ourselves would deadlock; the loop exits on its own
                return;
            }
            if handle.join().is_err() {
                error!("Tick thread panicked");
            }
            info!("Tick scheduler stopped");
        }
    }

    fn is_primary_thread(&self) -> bool {
        self.primary.get() == Some(&thread::current().id())
    }

    fn submit(&self, task: Task) -> bool {
        if self.stopped.load(Ordering::Acquire) {
            return false;
        }
        self.tasks.send(task).is_ok()
    }

    fn current_tick(&self) -> u64 {
        self.ticks.load(Ordering::Acquire)
    }
}

impl Drop for FixedRateScheduler {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
    }
}
