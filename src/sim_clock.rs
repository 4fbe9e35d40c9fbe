// Standard modules
use std::thread;
use std::time::Duration;

/*
 * Time source used for every fixed-interval wait in the library (readiness
 * polling, stop polling, retry backoff, tip convergence). Injectable so tests
 * can observe the waits without actually sleeping.
 */
pub trait Clock: Send + Sync {
    fn sleep(&self, duration: Duration);
}

// Wall-clock implementation used outside of tests
pub struct SystemClock;

impl Clock for SystemClock {
    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}
