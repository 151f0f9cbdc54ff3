use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Interruptible wait primitive shared between the controller handle and its
/// worker thread. Cancellation is sticky: once raised it stays observable to
/// every waiter until [`CancelToken::rearm`] is called at the next start.
#[derive(Debug, Default)]
pub struct CancelToken {
    cancelled: Mutex<bool>,
    signal: Condvar,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the cancellation signal, waking every in-progress wait.
    pub fn cancel(&self) {
        *self.lock() = true;
        self.signal.notify_all();
    }

    /// Clear a previously raised signal so the token can be waited on again.
    pub fn rearm(&self) {
        *self.lock() = false;
    }

    pub fn is_cancelled(&self) -> bool {
        *self.lock()
    }

    /// Block for up to `timeout`, waking the instant the token is cancelled
    /// from any thread. Returns `true` when the wait ended by cancellation,
    /// `false` when the full duration elapsed.
    pub fn wait(&self, timeout: Duration) -> bool {
        let guard = self.lock();
        let (guard, _) = self
            .signal
            .wait_timeout_while(guard, timeout, |cancelled| !*cancelled)
            .unwrap_or_else(PoisonError::into_inner);
        *guard
    }

    fn lock(&self) -> MutexGuard<'_, bool> {
        self.cancelled.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;
    use std::time::Instant;

    use super::*;

    #[test]
    fn full_elapse_returns_false() {
        let token = CancelToken::new();
        assert!(!token.wait(Duration::from_millis(10)));
        assert!(!token.is_cancelled());
    }

    #[test]
    fn cancellation_is_sticky_before_any_wait() {
        let token = CancelToken::new();
        token.cancel();

        let started = Instant::now();
        assert!(token.wait(Duration::from_secs(5)));
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(token.is_cancelled());
    }

    #[test]
    fn rearm_clears_the_signal() {
        let token = CancelToken::new();
        token.cancel();
        token.rearm();

        assert!(!token.is_cancelled());
        assert!(!token.wait(Duration::from_millis(5)));
    }

    #[test]
    fn cross_thread_cancel_wakes_waiter_early() {
        let token = Arc::new(CancelToken::new());
        let canceller = Arc::clone(&token);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            canceller.cancel();
        });

        let started = Instant::now();
        assert!(token.wait(Duration::from_secs(10)));
        assert!(started.elapsed() < Duration::from_secs(5));
        handle.join().unwrap();
    }
}
