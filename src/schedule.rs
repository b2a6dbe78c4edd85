use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const STOP_WAIT: Duration = Duration::from_secs(5);
const STOP_POLL: Duration = Duration::from_millis(10);

/// Background ticker shared by refresh policies and the coordinator.
///
/// `start` is idempotent and spawns a single scheduler thread; `stop`
/// requests cooperative termination, waits up to five seconds, then
/// detaches the thread. The stop signal is observed before every tick and
/// at every sleep completion.
pub(crate) struct TickWorker {
    running: AtomicBool,
    signal: Arc<StopSignal>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

struct StopSignal {
    stopped: Mutex<bool>,
    condvar: Condvar,
}

impl StopSignal {
    /// Sleep for `timeout`, returning true when stop was requested.
    fn wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut stopped = self.stopped.lock().unwrap();
        loop {
            if *stopped {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _) = self
                .condvar
                .wait_timeout(stopped, deadline - now)
                .unwrap();
            stopped = guard;
        }
    }

    fn request_stop(&self) {
        *self.stopped.lock().unwrap() = true;
        self.condvar.notify_all();
    }

    fn reset(&self) {
        *self.stopped.lock().unwrap() = false;
    }
}

impl TickWorker {
    pub(crate) fn new() -> Self {
        Self {
            running: AtomicBool::new(false),
            signal: Arc::new(StopSignal {
                stopped: Mutex::new(false),
                condvar: Condvar::new(),
            }),
            handle: Mutex::new(None),
        }
    }

    /// Spawn the scheduler thread. The first tick runs after
    /// `initial_delay`, subsequent ticks every `interval`. Returns false
    /// when the worker was already running.
    pub(crate) fn start<F>(&self, initial_delay: Duration, interval: Duration, tick: F) -> bool
    where
        F: Fn() + Send + 'static,
    {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }

        self.signal.reset();
        let signal = Arc::clone(&self.signal);
        let handle = thread::spawn(move || {
            if signal.wait(initial_delay) {
                return;
            }
            loop {
                tick();
                if signal.wait(interval) {
                    return;
                }
            }
        });
        *self.handle.lock().unwrap() = Some(handle);
        true
    }

    /// Request termination and wait for the scheduler thread to finish.
    /// Returns false when the worker was not running.
    pub(crate) fn stop(&self) -> bool {
        if self
            .running
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }

        self.signal.request_stop();
        let handle = self.handle.lock().unwrap().take();
        if let Some(handle) = handle {
            let deadline = Instant::now() + STOP_WAIT;
            while !handle.is_finished() && Instant::now() < deadline {
                thread::sleep(STOP_POLL);
            }
            if handle.is_finished() {
                let _ = handle.join();
            } else {
                tracing::warn!(
                    "scheduler thread did not stop within {STOP_WAIT:?}; detaching"
                );
            }
        }
        true
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn ticks_until_stopped() {
        let worker = TickWorker::new();
        let ticks = Arc::new(AtomicUsize::new(0));

        let counted = Arc::clone(&ticks);
        assert!(worker.start(Duration::ZERO, Duration::from_millis(10), move || {
            counted.fetch_add(1, Ordering::SeqCst);
        }));
        assert!(worker.is_running());

        while ticks.load(Ordering::SeqCst) < 2 {
            thread::sleep(Duration::from_millis(5));
        }

        assert!(worker.stop());
        assert!(!worker.is_running());

        let after_stop = ticks.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(50));
        assert_eq!(ticks.load(Ordering::SeqCst), after_stop);
    }

    #[test]
    fn start_is_idempotent() {
        let worker = TickWorker::new();
        assert!(worker.start(Duration::from_secs(60), Duration::from_secs(60), || {}));
        assert!(!worker.start(Duration::from_secs(60), Duration::from_secs(60), || {}));
        assert!(worker.stop());
        assert!(!worker.stop());
    }

    #[test]
    fn restart_after_stop() {
        let worker = TickWorker::new();
        let ticks = Arc::new(AtomicUsize::new(0));

        assert!(worker.start(Duration::ZERO, Duration::from_secs(60), || {}));
        assert!(worker.stop());

        let counted = Arc::clone(&ticks);
        assert!(worker.start(Duration::ZERO, Duration::from_millis(5), move || {
            counted.fetch_add(1, Ordering::SeqCst);
        }));
        while ticks.load(Ordering::SeqCst) == 0 {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(worker.stop());
    }
}
