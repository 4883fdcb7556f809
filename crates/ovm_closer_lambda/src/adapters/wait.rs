use std::time::Duration;

pub trait Waiter {
    fn wait(&self, duration: Duration);
}

/// Blocks the current thread for the full duration.
pub struct ThreadWaiter;

impl Waiter for ThreadWaiter {
    fn wait(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}
