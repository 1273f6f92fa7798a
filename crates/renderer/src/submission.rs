//! Command allocator and list lifecycle.

use tracing::trace;

use crate::backend::CommandContext;
use crate::error::{FrameResult, ProtocolViolation};
use crate::fence_gate::FenceGate;

/// State of the single command list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListState {
    Recording,
    Closed,
    Submitted,
}

/// Tracks the one allocator/list pair that every frame records into.
///
/// The pair is recycled only once the fence reports that the GPU has
/// consumed the previous submission. Closing, submitting and resetting out of
/// order fail with a [`ProtocolViolation`] before anything reaches the
/// backend.
#[derive(Debug)]
pub struct SubmissionUnit {
    state: ListState,
    submissions: u64,
    /// Fence value that must complete before the last submission is retired.
    fenced_by: Option<u64>,
}

impl SubmissionUnit {
    /// Resets the context and starts in [`ListState::Recording`].
    pub fn open<C: CommandContext>(ctx: &mut C) -> FrameResult<Self> {
        ctx.reset()?;
        Ok(Self {
            state: ListState::Recording,
            submissions: 0,
            fenced_by: None,
        })
    }

    pub fn ensure_recording(&self) -> FrameResult<()> {
        match self.state {
            ListState::Recording => Ok(()),
            actual => Err(ProtocolViolation::ListNotRecording { actual }.into()),
        }
    }

    /// The context, provided the list is open.
    pub fn record_into<'a, C: CommandContext>(&self, ctx: &'a mut C) -> FrameResult<&'a mut C> {
        self.ensure_recording()?;
        Ok(ctx)
    }

    pub fn close<C: CommandContext>(&mut self, ctx: &mut C) -> FrameResult<()> {
        self.ensure_recording()?;
        ctx.close()?;
        self.state = ListState::Closed;
        Ok(())
    }

    /// Executes the closed list.
    ///
    /// The submission is retired by the next value `gate` signals.
    pub fn submit<C: CommandContext>(&mut self, ctx: &mut C, gate: &FenceGate) -> FrameResult<()> {
        if self.state != ListState::Closed {
            return Err(ProtocolViolation::SubmitUnclosedList { actual: self.state }.into());
        }
        ctx.execute()?;
        self.state = ListState::Submitted;
        self.submissions += 1;
        self.fenced_by = Some(gate.next_value());
        trace!(
            "Submitted command list #{} (fenced by {})",
            self.submissions,
            gate.next_value()
        );
        Ok(())
    }

    /// Recycles the allocator and reopens the list.
    ///
    /// Refused while the fence still has a pending value, and refused until
    /// a value signaled after the last submission has completed: until then
    /// the GPU may be reading the recorded commands.
    pub fn reset_for_next_frame<C: CommandContext>(
        &mut self,
        ctx: &mut C,
        gate: &FenceGate,
    ) -> FrameResult<()> {
        if let Some(signaled) = gate.pending() {
            return Err(ProtocolViolation::ResetBeforeFenceComplete {
                signaled,
                completed: gate.last_completed(),
            }
            .into());
        }
        if let Some(required) = self.fenced_by
            && gate.last_completed() < required
        {
            return Err(ProtocolViolation::ResetUnfencedSubmission {
                required,
                completed: gate.last_completed(),
            }
            .into());
        }
        ctx.reset()?;
        self.state = ListState::Recording;
        self.fenced_by = None;
        Ok(())
    }

    #[inline]
    pub fn state(&self) -> ListState {
        self.state
    }

    #[inline]
    pub fn submissions(&self) -> u64 {
        self.submissions
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::testing::{Call, MockBackend};

    #[test]
    fn test_lifecycle() {
        let mut ctx = MockBackend::new(2);
        let mut gate = FenceGate::new(Duration::from_secs(1));
        let mut unit = SubmissionUnit::open(&mut ctx).unwrap();
        assert_eq!(unit.state(), ListState::Recording);

        unit.close(&mut ctx).unwrap();
        assert_eq!(unit.state(), ListState::Closed);
        unit.submit(&mut ctx, &gate).unwrap();
        assert_eq!(unit.state(), ListState::Submitted);

        gate.flush(&mut ctx).unwrap();
        unit.reset_for_next_frame(&mut ctx, &gate).unwrap();
        assert_eq!(unit.state(), ListState::Recording);
        assert_eq!(unit.submissions(), 1);
        assert_eq!(
            ctx.calls,
            vec![
                Call::Reset,
                Call::Close,
                Call::Execute,
                Call::Signal(1),
                Call::Wait(1),
                Call::Reset,
            ]
        );
    }

    #[test]
    fn test_submit_while_recording_rejected() {
        let mut ctx = MockBackend::new(2);
        let gate = FenceGate::new(Duration::from_secs(1));
        let mut unit = SubmissionUnit::open(&mut ctx).unwrap();

        let err = unit.submit(&mut ctx, &gate).unwrap_err();
        assert_eq!(
            err.violation(),
            Some(ProtocolViolation::SubmitUnclosedList {
                actual: ListState::Recording
            })
        );
        assert!(!ctx.calls.contains(&Call::Execute));
        assert_eq!(unit.state(), ListState::Recording);
    }

    #[test]
    fn test_double_close_rejected() {
        let mut ctx = MockBackend::new(2);
        let mut unit = SubmissionUnit::open(&mut ctx).unwrap();
        unit.close(&mut ctx).unwrap();

        let err = unit.close(&mut ctx).unwrap_err();
        assert_eq!(
            err.violation(),
            Some(ProtocolViolation::ListNotRecording {
                actual: ListState::Closed
            })
        );
        assert!(unit.record_into(&mut ctx).is_err());
    }

    #[test]
    fn test_reset_before_fence_complete_rejected() {
        let mut ctx = MockBackend::new(2);
        let mut gate = FenceGate::new(Duration::from_secs(1));
        let mut unit = SubmissionUnit::open(&mut ctx).unwrap();
        unit.close(&mut ctx).unwrap();
        unit.submit(&mut ctx, &gate).unwrap();
        gate.signal(&mut ctx).unwrap();

        let err = unit.reset_for_next_frame(&mut ctx, &gate).unwrap_err();
        assert_eq!(
            err.violation(),
            Some(ProtocolViolation::ResetBeforeFenceComplete {
                signaled: 1,
                completed: 0
            })
        );
        assert_eq!(unit.state(), ListState::Submitted);
        assert_eq!(ctx.calls.iter().filter(|c| **c == Call::Reset).count(), 1);
    }

    #[test]
    fn test_reset_without_covering_signal_rejected() {
        let mut ctx = MockBackend::new(2);
        let mut gate = FenceGate::new(Duration::from_secs(1));
        let mut unit = SubmissionUnit::open(&mut ctx).unwrap();
        unit.close(&mut ctx).unwrap();
        unit.submit(&mut ctx, &gate).unwrap();

        let err = unit.reset_for_next_frame(&mut ctx, &gate).unwrap_err();
        assert_eq!(
            err.violation(),
            Some(ProtocolViolation::ResetUnfencedSubmission {
                required: 1,
                completed: 0
            })
        );
        assert_eq!(unit.state(), ListState::Submitted);

        gate.flush(&mut ctx).unwrap();
        unit.reset_for_next_frame(&mut ctx, &gate).unwrap();
        assert_eq!(unit.state(), ListState::Recording);
    }

    #[test]
    fn test_signal_before_submit_does_not_cover_it() {
        let mut ctx = MockBackend::new(2);
        let mut gate = FenceGate::new(Duration::from_secs(1));
        let mut unit = SubmissionUnit::open(&mut ctx).unwrap();
        gate.flush(&mut ctx).unwrap();
        unit.close(&mut ctx).unwrap();
        unit.submit(&mut ctx, &gate).unwrap();

        let err = unit.reset_for_next_frame(&mut ctx, &gate).unwrap_err();
        assert_eq!(
            err.violation(),
            Some(ProtocolViolation::ResetUnfencedSubmission {
                required: 2,
                completed: 1
            })
        );
    }
}
