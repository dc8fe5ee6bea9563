//! # Periodic Scheduler
//!
//! Runs a tick function at a fixed cadence on a dedicated thread until it is
//! cancelled. Ticks never overlap; if one overruns its period, the missed
//! ticks are coalesced rather than queued.

use crossbeam_channel::{Sender, select};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// A cancellable periodic task.
#[derive(Debug)]
pub struct PeriodicScheduler {
    shutdown_tx: Option<Sender<()>>,
    thread_handle: Option<JoinHandle<()>>,
}

impl PeriodicScheduler {
    /// Starts calling `tick` every `period`. The first call happens after one
    /// period has elapsed.
    pub fn start<F>(name: &str, period: Duration, mut tick: F) -> std::io::Result<Self>
    where
        F: FnMut() + Send + 'static,
    {
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(1);
        let ticker = crossbeam_channel::tick(period);

        let thread_handle = thread::Builder::new().name(name.to_string()).spawn(move || {
            loop {
                // Shutdown wins over a pending tick.
                if !shutdown_rx.is_empty() {
                    break;
                }
                select! {
                    recv(shutdown_rx) -> _ => break,
                    recv(ticker) -> _ => tick(),
                }
            }
        })?;

        Ok(Self {
            shutdown_tx: Some(shutdown_tx),
            thread_handle: Some(thread_handle),
        })
    }

    pub fn is_running(&self) -> bool {
        self.thread_handle.is_some()
    }

    /// Stops the schedule and waits for an in-flight tick to finish.
    ///
    /// Idempotent. When called from inside the tick itself it only signals,
    /// since the thread cannot join itself.
    pub fn cancel(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.try_send(());
        }
        if let Some(handle) = self.thread_handle.take() {
            if handle.thread().id() == thread::current().id() {
                return;
            }
            if handle.join().is_err() {
                log::error!("[SCHEDULER] Tick thread panicked");
            }
        }
    }
}

impl Drop for PeriodicScheduler {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn ticks_until_cancelled() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let mut scheduler =
            PeriodicScheduler::start("test-tick", Duration::from_millis(2), move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        thread::sleep(Duration::from_millis(60));
        scheduler.cancel();
        let after_cancel = count.load(Ordering::SeqCst);
        assert!(after_cancel > 0);
        assert!(!scheduler.is_running());

        thread::sleep(Duration::from_millis(30));
        assert_eq!(count.load(Ordering::SeqCst), after_cancel);
    }

    #[test]
    fn cancel_is_idempotent_and_runs_on_drop() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let mut scheduler =
            PeriodicScheduler::start("test-tick", Duration::from_millis(1), move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        scheduler.cancel();
        scheduler.cancel();
        drop(scheduler);

        let settled = count.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(20));
        assert_eq!(count.load(Ordering::SeqCst), settled);
    }
}
