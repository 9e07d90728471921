//! Operator console intake.
//!
//! When enabled, a background thread reads standard input line by line and
//! forwards each line over a channel. Whoever owns the receiver decides what
//! the lines mean.

use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

pub const CONSOLE_THREAD_NAME: &str = "console-reader";

/// Line intake for the operator console.
#[derive(Debug)]
pub struct Console {
    stopped: Arc<AtomicBool>,
    started: AtomicBool,
    sender: Mutex<Option<mpsc::UnboundedSender<String>>>,
    receiver: Mutex<Option<mpsc::UnboundedReceiver<String>>>,
}

impl Console {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            stopped: Arc::new(AtomicBool::new(false)),
            started: AtomicBool::new(false),
            sender: Mutex::new(Some(sender)),
            receiver: Mutex::new(Some(receiver)),
        }
    }

    /// Hands out the line receiver. Only the first caller gets it.
    pub fn take_receiver(&self) -> Option<mpsc::UnboundedReceiver<String>> {
        self.receiver.lock().unwrap_or_else(|p| p.into_inner()).take()
    }

    /// Forwards a line as if it had been typed. Returns false once stopped.
    pub fn submit(&self, line: impl Into<String>) -> bool {
        if self.stopped.load(Ordering::Acquire) {
            return false;
        }
        match self.sender.lock().unwrap_or_else(|p| p.into_inner()).as_ref() {
            Some(sender) => sender.send(line.into()).is_ok(),
            None => false,
        }
    }

    /// Starts reading standard input on a background thread.
    pub fn start_stdin(&self) -> std::io::Result<()> {
        if self.started.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let Some(sender) = self.sender.lock().unwrap_or_else(|p| p.into_inner()).clone() else {
            return Ok(());
        };
        let stopped = self.stopped.clone();

        thread::Builder::new()
            .name(CONSOLE_THREAD_NAME.to_string())
            .spawn(move || {
                let stdin = std::io::stdin();
                for line in stdin.lock().lines() {
                    if stopped.load(Ordering::Acquire) {
                        break;
                    }
                    match line {
                        Ok(line) => {
                            let line = line.trim().to_string();
                            if line.is_empty() {
                                continue;
                            }
                            if sender.send(line).is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            warn!("Console input failed: {e}");
                            break;
                        }
                    }
                }
                debug!("Console reader exiting");
            })?;
        info!("Console input enabled");
        Ok(())
    }

    /// Stops forwarding lines. The reader thread stays blocked on stdin
    /// until the next line arrives, then exits.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
        self.sender.lock().unwrap_or_else(|p| p.into_inner()).take();
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }
}

impl Default for Console {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_submitted_lines_reach_receiver() {
        let console = Console::new();
        let mut rx = console.take_receiver().unwrap();
        assert!(console.take_receiver().is_none());

        assert!(console.submit("list"));
        assert_eq!(rx.try_recv().unwrap(), "list");
    }

    #[test]
    fn test_stop_drops_further_lines() {
        let console = Console::new();
        let mut rx = console.take_receiver().unwrap();
        console.stop();
        assert!(!console.submit("stop"));
        assert!(console.is_stopped());
        // sender is gone, so the channel reports closed
        assert!(matches!(
            rx.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
    }
}
