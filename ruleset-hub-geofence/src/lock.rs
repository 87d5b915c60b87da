//! Named mutual-exclusion guard around a component's state

use parking_lot::Mutex;
use std::time::{Duration, Instant};

const DEFAULT_HOLD_WARNING: Duration = Duration::from_millis(100);

/// Owns a value that is only reachable inside [`NamedLock::with_lock`]
///
/// Every acquisition is traced with the lock and operation names; a
/// critical section held longer than the hold threshold is logged as a
/// warning.
pub struct NamedLock<T> {
    name: String,
    hold_warning: Duration,
    inner: Mutex<T>,
}

impl<T> NamedLock<T> {
    pub fn new(name: impl Into<String>, value: T) -> Self {
        Self {
            name: name.into(),
            hold_warning: DEFAULT_HOLD_WARNING,
            inner: Mutex::new(value),
        }
    }

    pub fn with_hold_warning(mut self, threshold: Duration) -> Self {
        self.hold_warning = threshold;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run `f` with exclusive access to the value
    ///
    /// `f` must not block on I/O.
    pub fn with_lock<R>(&self, operation: &str, f: impl FnOnce(&mut T) -> R) -> R {
        let mut guard = self.inner.lock();
        tracing::trace!(lock = %self.name, operation, "Acquired lock");
        let acquired = Instant::now();
        let result = f(&mut guard);
        drop(guard);

        let held = acquired.elapsed();
        if held > self.hold_warning {
            tracing::warn!(
                lock = %self.name,
                operation,
                held_ms = held.as_millis() as u64,
                "Lock held longer than expected"
            );
        }
        result
    }
}

impl<T> std::fmt::Debug for NamedLock<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NamedLock").field("name", &self.name).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_serializes_access() {
        let lock = Arc::new(NamedLock::new("counter", 0u32));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let lock = lock.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        lock.with_lock("increment", |n| *n += 1);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(lock.with_lock("read", |n| *n), 4000);
    }

    #[test]
    fn test_returns_closure_result() {
        let lock = NamedLock::new("names", vec!["a".to_string()]).with_hold_warning(Duration::ZERO);
        let len = lock.with_lock("push", |names| {
            names.push("b".to_string());
            names.len()
        });
        assert_eq!(len, 2);
        assert_eq!(lock.name(), "names");
    }
}
