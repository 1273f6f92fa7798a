//! CPU/GPU rendezvous over a monotonic fence.

use std::time::Duration;

use tracing::{debug, warn};

use crate::backend::TimelineFence;
use crate::error::{FrameError, FrameResult, ProtocolViolation};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FenceState {
    /// Nothing signaled yet.
    Idle,
    /// `value` enqueued, not yet observed complete.
    Signaled(u64),
    /// `value` observed complete.
    Completed(u64),
}

/// Owns the next fence value and decides when the CPU may proceed.
///
/// Values start at 1 and grow by exactly one per signal. A value is never
/// reused, and at most one is pending at a time.
#[derive(Debug)]
pub struct FenceGate {
    next_value: u64,
    state: FenceState,
    timeout: Duration,
}

impl FenceGate {
    pub fn new(timeout: Duration) -> Self {
        Self {
            next_value: 1,
            state: FenceState::Idle,
            timeout,
        }
    }

    /// Enqueues a signal of the next value and returns it.
    pub fn signal<F: TimelineFence>(&mut self, fence: &mut F) -> FrameResult<u64> {
        if let FenceState::Signaled(pending) = self.state {
            return Err(ProtocolViolation::FenceAlreadySignaled { pending }.into());
        }
        let value = self.next_value;
        fence.signal(value)?;
        self.next_value += 1;
        self.state = FenceState::Signaled(value);
        Ok(value)
    }

    /// Blocks until the pending value completes, bounded by the timeout.
    ///
    /// Returns immediately when nothing is pending or the GPU is already past
    /// the value.
    pub fn wait_for_completion<F: TimelineFence>(&mut self, fence: &mut F) -> FrameResult<()> {
        let FenceState::Signaled(value) = self.state else {
            return Ok(());
        };

        if fence.completed_value()? < value && !fence.wait(value, self.timeout)? {
            let completed = fence.completed_value()?;
            warn!(
                "Fence value {} not reached after {:?} (completed {})",
                value, self.timeout, completed
            );
            return Err(FrameError::DeviceHung { value, completed });
        }

        self.state = FenceState::Completed(value);
        Ok(())
    }

    /// Signals and waits; on return the GPU has finished all prior work.
    pub fn flush<F: TimelineFence>(&mut self, fence: &mut F) -> FrameResult<u64> {
        let value = self.signal(fence)?;
        self.wait_for_completion(fence)?;
        debug!("Fence flushed at value {}", value);
        Ok(value)
    }

    /// The most recently signaled value, 0 before the first signal.
    pub fn last_signaled(&self) -> u64 {
        self.next_value - 1
    }

    pub fn last_completed(&self) -> u64 {
        match self.state {
            FenceState::Completed(value) => value,
            _ => self.next_value.saturating_sub(2),
        }
    }

    pub fn pending(&self) -> Option<u64> {
        match self.state {
            FenceState::Signaled(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.pending().is_none()
    }

    #[inline]
    pub fn next_value(&self) -> u64 {
        self.next_value
    }

    #[inline]
    pub fn state(&self) -> FenceState {
        self.state
    }

    #[inline]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Call, MockBackend};

    fn gate() -> FenceGate {
        FenceGate::new(Duration::from_millis(50))
    }

    #[test]
    fn test_values_increase_by_one() {
        let mut fence = MockBackend::new(2);
        let mut gate = gate();
        assert_eq!(gate.state(), FenceState::Idle);
        assert_eq!(gate.last_signaled(), 0);

        for expected in 1..=5 {
            assert_eq!(gate.flush(&mut fence).unwrap(), expected);
            assert_eq!(gate.state(), FenceState::Completed(expected));
            assert_eq!(gate.next_value(), expected + 1);
        }
        assert_eq!(gate.last_signaled(), 5);
        assert_eq!(gate.last_completed(), 5);
    }

    #[test]
    fn test_wait_when_idle_is_noop() {
        let mut fence = MockBackend::new(2);
        let mut gate = gate();
        gate.wait_for_completion(&mut fence).unwrap();
        assert!(fence.calls.is_empty());
        assert!(gate.is_complete());
    }

    #[test]
    fn test_already_completed_does_not_block() {
        let mut fence = MockBackend::new(2);
        let mut gate = gate();
        gate.signal(&mut fence).unwrap();
        fence.completed = 1;

        gate.wait_for_completion(&mut fence).unwrap();
        assert!(!fence.calls.contains(&Call::Wait(1)));
        assert_eq!(gate.state(), FenceState::Completed(1));
    }

    #[test]
    fn test_waits_for_pending_value_behind_completed() {
        let mut fence = MockBackend::new(2);
        let mut gate = gate();
        for _ in 0..5 {
            gate.flush(&mut fence).unwrap();
        }
        assert_eq!(fence.completed, 5);

        assert_eq!(gate.signal(&mut fence).unwrap(), 6);
        gate.wait_for_completion(&mut fence).unwrap();

        assert_eq!(fence.calls.last(), Some(&Call::Wait(6)));
        assert_eq!(fence.completed, 6);
        assert_eq!(gate.state(), FenceState::Completed(6));
    }

    #[test]
    fn test_double_signal_rejected() {
        let mut fence = MockBackend::new(2);
        let mut gate = gate();
        gate.signal(&mut fence).unwrap();

        let err = gate.signal(&mut fence).unwrap_err();
        assert_eq!(
            err.violation(),
            Some(ProtocolViolation::FenceAlreadySignaled { pending: 1 })
        );
        assert_eq!(gate.next_value(), 2);
        assert!(!gate.is_complete());
    }

    #[test]
    fn test_timeout_is_device_hung() {
        let mut fence = MockBackend::new(2);
        fence.hang = true;
        let mut gate = gate();

        let err = gate.flush(&mut fence).unwrap_err();
        assert!(matches!(
            err,
            FrameError::DeviceHung {
                value: 1,
                completed: 0
            }
        ));
        assert_eq!(gate.pending(), Some(1));
    }

    #[test]
    fn test_device_lost_propagates() {
        let mut fence = MockBackend::new(2);
        fence.lost = true;
        let mut gate = gate();

        let err = gate.flush(&mut fence).unwrap_err();
        assert!(matches!(err, FrameError::DeviceLost));
    }
}
