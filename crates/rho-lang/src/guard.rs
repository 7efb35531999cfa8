use std::fmt::Debug;
use std::time::{Duration, Instant};

/// An externally supplied iteration/time budget consulted by loop nodes.
///
/// A loop node increments its own iteration counter on every pass and raises
/// a [`crate::RuntimeError::LoopViolation`] when the counter exceeds
/// [`LoopGuard::max_iterations`] or when [`LoopGuard::check`] fails.
pub trait LoopGuard: Debug {
    /// Upper bound on loop iterations. The default is effectively unbounded.
    fn max_iterations(&self) -> u64 {
        u64::MAX
    }

    /// Called before every iteration; returning `false` aborts the loop.
    fn check(&self) -> bool {
        true
    }
}

/// Guard that only caps the iteration count.
#[derive(Debug, Clone, Copy)]
pub struct CountLimit {
    max_iterations: u64,
}

impl CountLimit {
    pub fn new(max_iterations: u64) -> Self {
        Self { max_iterations }
    }
}

impl LoopGuard for CountLimit {
    fn max_iterations(&self) -> u64 {
        self.max_iterations
    }
}

/// Guard that aborts loops once a wall-clock budget is exhausted.
#[derive(Debug)]
pub struct Timeout {
    started: Instant,
    budget: Duration,
}

impl Timeout {
    pub fn new(budget: Duration) -> Self {
        Self {
            started: Instant::now(),
            budget,
        }
    }
}

impl LoopGuard for Timeout {
    fn check(&self) -> bool {
        self.started.elapsed() < self.budget
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_limit() {
        let guard = CountLimit::new(10);
        assert_eq!(guard.max_iterations(), 10);
        assert!(guard.check());
    }

    #[test]
    fn test_timeout_expires() {
        let guard = Timeout::new(Duration::from_secs(0));
        assert!(!guard.check());
        assert_eq!(guard.max_iterations(), u64::MAX);
    }
}
