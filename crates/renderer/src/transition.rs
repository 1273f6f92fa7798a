//! Back-buffer state tracking and barrier emission.
//!
//! Every back buffer is either being shown ([`ResourceState::Present`]) or
//! being drawn into ([`ResourceState::RenderTarget`]). The controller keeps
//! one tag per buffer and only emits a barrier whose `before` matches the
//! tag, so a skipped or doubled transition is caught on the CPU instead of
//! surfacing as corruption on screen.

use tracing::trace;

use crate::backend::{CommandContext, TransitionBarrier};
use crate::error::{FrameResult, ProtocolViolation};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceState {
    Present,
    RenderTarget,
}

#[derive(Debug, Clone)]
pub struct TransitionController {
    states: Vec<ResourceState>,
    barriers_issued: u64,
}

impl TransitionController {
    /// All buffers start as [`ResourceState::Present`].
    pub fn new(buffer_count: u32) -> Self {
        Self {
            states: vec![ResourceState::Present; buffer_count as usize],
            barriers_issued: 0,
        }
    }

    pub fn transition_to_render_target<C: CommandContext>(
        &mut self,
        buffer: u32,
        ctx: &mut C,
    ) -> FrameResult<TransitionBarrier> {
        if let Some(current) = self.render_target()
            && current != buffer
        {
            return Err(ProtocolViolation::RenderTargetBusy {
                requested: buffer,
                current,
            }
            .into());
        }
        self.transition(
            TransitionBarrier {
                buffer,
                before: ResourceState::Present,
                after: ResourceState::RenderTarget,
            },
            ctx,
        )
    }

    pub fn transition_to_present<C: CommandContext>(
        &mut self,
        buffer: u32,
        ctx: &mut C,
    ) -> FrameResult<TransitionBarrier> {
        self.transition(
            TransitionBarrier {
                buffer,
                before: ResourceState::RenderTarget,
                after: ResourceState::Present,
            },
            ctx,
        )
    }

    fn transition<C: CommandContext>(
        &mut self,
        barrier: TransitionBarrier,
        ctx: &mut C,
    ) -> FrameResult<TransitionBarrier> {
        let count = self.states.len() as u32;
        let slot = self
            .states
            .get_mut(barrier.buffer as usize)
            .ok_or(ProtocolViolation::UnknownBuffer {
                buffer: barrier.buffer,
                count,
            })?;

        if *slot != barrier.before {
            return Err(ProtocolViolation::InvalidTransition {
                buffer: barrier.buffer,
                expected: barrier.before,
                actual: *slot,
            }
            .into());
        }

        ctx.barrier(barrier)?;
        *slot = barrier.after;
        self.barriers_issued += 1;

        trace!(
            "Back buffer {}: {:?} -> {:?}",
            barrier.buffer, barrier.before, barrier.after
        );
        Ok(barrier)
    }

    pub fn state(&self, buffer: u32) -> Option<ResourceState> {
        self.states.get(buffer as usize).copied()
    }

    /// The buffer currently in the render-target state.
    pub fn render_target(&self) -> Option<u32> {
        self.states
            .iter()
            .position(|&s| s == ResourceState::RenderTarget)
            .map(|i| i as u32)
    }

    #[inline]
    pub fn buffer_count(&self) -> u32 {
        self.states.len() as u32
    }

    #[inline]
    pub fn barriers_issued(&self) -> u64 {
        self.barriers_issued
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FrameError;
    use crate::testing::MockBackend;

    #[test]
    fn test_round_trip_restores_state() {
        let mut ctx = MockBackend::new(2);
        let mut transitions = TransitionController::new(2);

        for _ in 0..2 {
            let to_rt = transitions.transition_to_render_target(0, &mut ctx).unwrap();
            assert_eq!(transitions.state(0), Some(ResourceState::RenderTarget));
            let to_present = transitions.transition_to_present(0, &mut ctx).unwrap();
            assert_eq!(to_present, to_rt.inverse());
        }

        assert_eq!(transitions.state(0), Some(ResourceState::Present));
        assert_eq!(ctx.barriers().len(), 4);
        assert_eq!(transitions.barriers_issued(), 4);
    }

    #[test]
    fn test_double_transition_rejected() {
        let mut ctx = MockBackend::new(2);
        let mut transitions = TransitionController::new(2);

        transitions.transition_to_render_target(1, &mut ctx).unwrap();
        let err = transitions
            .transition_to_render_target(1, &mut ctx)
            .unwrap_err();

        assert_eq!(
            err.violation(),
            Some(ProtocolViolation::InvalidTransition {
                buffer: 1,
                expected: ResourceState::Present,
                actual: ResourceState::RenderTarget,
            })
        );
        // The rejected request emitted nothing.
        assert_eq!(ctx.barriers().len(), 1);
    }

    #[test]
    fn test_present_without_render_target_rejected() {
        let mut ctx = MockBackend::new(2);
        let mut transitions = TransitionController::new(2);

        let err = transitions.transition_to_present(0, &mut ctx).unwrap_err();
        assert!(matches!(
            err,
            FrameError::Protocol(ProtocolViolation::InvalidTransition { buffer: 0, .. })
        ));
        assert!(ctx.barriers().is_empty());
    }

    #[test]
    fn test_single_render_target() {
        let mut ctx = MockBackend::new(2);
        let mut transitions = TransitionController::new(2);

        transitions.transition_to_render_target(0, &mut ctx).unwrap();
        let err = transitions
            .transition_to_render_target(1, &mut ctx)
            .unwrap_err();

        assert_eq!(
            err.violation(),
            Some(ProtocolViolation::RenderTargetBusy {
                requested: 1,
                current: 0
            })
        );
        assert_eq!(transitions.render_target(), Some(0));
    }

    #[test]
    fn test_unknown_buffer() {
        let mut ctx = MockBackend::new(2);
        let mut transitions = TransitionController::new(2);

        let err = transitions
            .transition_to_render_target(2, &mut ctx)
            .unwrap_err();
        assert_eq!(
            err.violation(),
            Some(ProtocolViolation::UnknownBuffer {
                buffer: 2,
                count: 2
            })
        );
        assert_eq!(transitions.state(2), None);
    }
}
