// One-shot wait/signal pair. A waiter blocks until another thread signals;
// the signal is consumed by the wait that observes it.

use std::sync::atomic::{AtomicU32, Ordering};

use crossbeam_utils::CachePadded;

const EMPTY: u32 = 0;
const SIGNALED: u32 = 1;

pub struct Event {
    state: CachePadded<AtomicU32>,
}

impl Default for Event {
    fn default() -> Self {
        Self::new()
    }
}

impl Event {
    pub fn new() -> Self {
        Self {
            state: CachePadded::new(AtomicU32::new(EMPTY)),
        }
    }

    /// Wakes the waiter, or lets the next `wait` return immediately.
    pub fn signal(&self) {
        self.state.store(SIGNALED, Ordering::Release);
        futex_wake(&self.state);
    }

    /// Blocks until signalled, then consumes the signal.
    pub fn wait(&self) {
        loop {
            if self.try_wait() {
                return;
            }
            futex_wait(&self.state, EMPTY);
        }
    }

    /// Consumes a pending signal without blocking.
    pub fn try_wait(&self) -> bool {
        self.state
            .compare_exchange(SIGNALED, EMPTY, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    /// Drops a signal that nobody waited for.
    pub fn clear(&self) {
        self.state.store(EMPTY, Ordering::Release);
    }
}

#[cfg(target_os = "linux")]
fn futex_wait(atomic: &AtomicU32, expected: u32) {
    if atomic.load(Ordering::Relaxed) != expected {
        return;
    }
    // Spurious returns (EINTR, EAGAIN) are fine: the caller loops.
    unsafe {
        libc::syscall(
            libc::SYS_futex,
            atomic as *const AtomicU32 as *const u32,
            libc::FUTEX_WAIT | libc::FUTEX_PRIVATE_FLAG,
            expected,
            std::ptr::null::<libc::timespec>(),
            std::ptr::null::<u32>(),
            0u32,
        );
    }
}

#[cfg(target_os = "linux")]
fn futex_wake(atomic: &AtomicU32) {
    unsafe {
        libc::syscall(
            libc::SYS_futex,
            atomic as *const AtomicU32 as *const u32,
            libc::FUTEX_WAKE | libc::FUTEX_PRIVATE_FLAG,
            1,
            std::ptr::null::<libc::timespec>(),
            std::ptr::null::<u32>(),
            0u32,
        );
    }
}

#[cfg(not(target_os = "linux"))]
fn futex_wait(_atomic: &AtomicU32, _expected: u32) {
    std::thread::yield_now();
}

#[cfg(not(target_os = "linux"))]
fn futex_wake(_atomic: &AtomicU32) {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn signal_before_wait_is_not_lost() {
        let event = Event::new();
        event.signal();
        event.wait();
        assert!(!event.try_wait());
    }

    #[test]
    fn wait_blocks_until_other_thread_signals() {
        let event = Arc::new(Event::new());
        let signaller = Arc::clone(&event);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            signaller.signal();
        });
        event.wait();
        handle.join().unwrap();
    }
}
