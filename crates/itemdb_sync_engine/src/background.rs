//! Periodic background pulls.

use crate::config::SyncConfig;
use itemdb_core::{CoreResult, Database, UserDatabase};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Something whose containers can pull remote changes.
pub trait Pull: Send + 'static {
    /// Pulls every container.
    fn pull_all(&mut self) -> CoreResult<()>;
}

impl Pull for Database {
    fn pull_all(&mut self) -> CoreResult<()> {
        self.update_all()
    }
}

impl Pull for UserDatabase {
    fn pull_all(&mut self) -> CoreResult<()> {
        self.database_mut().update_all()
    }
}

/// A thread that pulls a shared database every interval.
///
/// The database lock is held only for the duration of one pull, so
/// foreground calls interleave with it. Failed pulls are logged and retried
/// at the next tick. Dropping the handle stops the thread.
#[derive(Debug)]
pub struct BackgroundSync {
    stop: Option<mpsc::Sender<()>>,
    thread: Option<JoinHandle<()>>,
    pulls: Arc<AtomicU64>,
    failures: Arc<AtomicU64>,
}

impl BackgroundSync {
    /// Starts pulling `db` every `interval`.
    pub fn spawn<D: Pull>(db: Arc<Mutex<D>>, interval: Duration) -> std::io::Result<Self> {
        let (stop, stopped) = mpsc::channel::<()>();
        let pulls = Arc::new(AtomicU64::new(0));
        let failures = Arc::new(AtomicU64::new(0));
        let thread = {
            let pulls = Arc::clone(&pulls);
            let failures = Arc::clone(&failures);
            std::thread::Builder::new()
                .name("itemdb-background-sync".into())
                .spawn(move || loop {
                    match stopped.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                    match db.lock().pull_all() {
                        Ok(()) => {
                            pulls.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(err) => {
                            failures.fetch_add(1, Ordering::Relaxed);
                            tracing::warn!(error = %err, "background pull failed");
                        }
                    }
                })?
        };
        tracing::debug!(?interval, "background sync started");
        Ok(Self {
            stop: Some(stop),
            thread: Some(thread),
            pulls,
            failures,
        })
    }

    /// Starts pulling at `config.pull_interval`, or returns `None` when no
    /// interval is configured.
    pub fn from_config<D: Pull>(db: Arc<Mutex<D>>, config: &SyncConfig) -> std::io::Result<Option<Self>> {
        config
            .pull_interval
            .map(|interval| Self::spawn(db, interval))
            .transpose()
    }

    /// Successful pulls so far.
    pub fn pull_count(&self) -> u64 {
        self.pulls.load(Ordering::Relaxed)
    }

    /// Failed pulls so far.
    pub fn failure_count(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    /// Stops the thread and waits for a running pull to finish.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        drop(self.stop.take());
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::warn!("background sync thread panicked");
            }
        }
    }
}

impl Drop for BackgroundSync {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use itemdb_core::CoreError;
    use std::time::Instant;

    #[derive(Default)]
    struct Counter {
        calls: u32,
        fail: bool,
    }

    impl Pull for Counter {
        fn pull_all(&mut self) -> CoreResult<()> {
            self.calls += 1;
            if self.fail {
                Err(CoreError::access("database is not open"))
            } else {
                Ok(())
            }
        }
    }

    fn wait_until(mut done: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !done() {
            assert!(Instant::now() < deadline, "condition not reached in time");
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn pulls_repeatedly_until_stopped() {
        let db = Arc::new(Mutex::new(Counter::default()));
        let sync = BackgroundSync::spawn(Arc::clone(&db), Duration::from_millis(10)).unwrap();
        wait_until(|| sync.pull_count() >= 3);
        sync.stop();

        let calls = db.lock().calls;
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(db.lock().calls, calls);
    }

    #[test]
    fn failures_are_counted_and_do_not_stop_the_thread() {
        let db = Arc::new(Mutex::new(Counter {
            calls: 0,
            fail: true,
        }));
        let sync = BackgroundSync::spawn(Arc::clone(&db), Duration::from_millis(10)).unwrap();
        wait_until(|| sync.failure_count() >= 2);
        assert_eq!(sync.pull_count(), 0);

        db.lock().fail = false;
        wait_until(|| sync.pull_count() >= 1);
    }

    #[test]
    fn drop_stops_without_waiting_for_interval() {
        let db = Arc::new(Mutex::new(Counter::default()));
        let started = Instant::now();
        drop(BackgroundSync::spawn(db, Duration::from_secs(60)).unwrap());
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn no_interval_means_no_thread() {
        let db = Arc::new(Mutex::new(Counter::default()));
        assert!(BackgroundSync::from_config(db, &SyncConfig::default()).unwrap().is_none());
    }
}
