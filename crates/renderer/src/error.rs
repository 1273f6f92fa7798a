//! Frame protocol errors.

use lumen_resources::ResourceError;
use lumen_rhi::RhiError;
use thiserror::Error;

use crate::submission::ListState;
use crate::transition::ResourceState;

/// A step of the frame protocol was requested out of order.
///
/// These are always checked, in every build profile.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolViolation {
    #[error("command list is {actual:?}, expected Recording")]
    ListNotRecording { actual: ListState },

    #[error("submitting a command list in state {actual:?}, it must be closed first")]
    SubmitUnclosedList { actual: ListState },

    #[error("resetting the command allocator while fence value {signaled} is pending (completed {completed})")]
    ResetBeforeFenceComplete { signaled: u64, completed: u64 },

    #[error("resetting the command allocator before fence value {required} covers the last submission (completed {completed})")]
    ResetUnfencedSubmission { required: u64, completed: u64 },

    #[error("back buffer {buffer} is {actual:?}, transition expected {expected:?}")]
    InvalidTransition {
        buffer: u32,
        expected: ResourceState,
        actual: ResourceState,
    },

    #[error("back buffer {buffer} does not exist ({count} buffers)")]
    UnknownBuffer { buffer: u32, count: u32 },

    #[error("back buffer {requested} cannot become a render target while {current} is one")]
    RenderTargetBusy { requested: u32, current: u32 },

    #[error("fence value {pending} is still pending")]
    FenceAlreadySignaled { pending: u64 },

    #[error("back buffer index changed from {expected} to {actual} within one frame")]
    BackBufferChanged { expected: u32, actual: u32 },
}

#[derive(Error, Debug)]
pub enum FrameError {
    #[error("Frame protocol violation: {0}")]
    Protocol(#[from] ProtocolViolation),

    #[error("Device lost")]
    DeviceLost,

    /// The bounded fence wait expired.
    #[error("Device hung: fence value {value} not reached within the timeout (completed {completed})")]
    DeviceHung { value: u64, completed: u64 },

    #[error(transparent)]
    Rhi(RhiError),

    #[error(transparent)]
    Resource(#[from] ResourceError),
}

impl From<RhiError> for FrameError {
    fn from(error: RhiError) -> Self {
        match error {
            RhiError::DeviceLost => FrameError::DeviceLost,
            other => FrameError::Rhi(other),
        }
    }
}

impl FrameError {
    /// Violation carried by this error, if any.
    pub fn violation(&self) -> Option<ProtocolViolation> {
        match self {
            FrameError::Protocol(violation) => Some(*violation),
            _ => None,
        }
    }
}

pub type FrameResult<T> = Result<T, FrameError>;

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_rhi::vk;

    #[test]
    fn test_device_lost_is_lifted() {
        assert!(matches!(
            FrameError::from(RhiError::DeviceLost),
            FrameError::DeviceLost
        ));
        assert!(matches!(
            FrameError::from(RhiError::from_vk(vk::Result::ERROR_DEVICE_LOST)),
            FrameError::DeviceLost
        ));
        assert!(matches!(
            FrameError::from(RhiError::SwapchainError("out of date".into())),
            FrameError::Rhi(RhiError::SwapchainError(_))
        ));
    }

    #[test]
    fn test_violation_accessor() {
        let err = FrameError::from(ProtocolViolation::FenceAlreadySignaled { pending: 3 });
        assert_eq!(
            err.violation(),
            Some(ProtocolViolation::FenceAlreadySignaled { pending: 3 })
        );
        assert_eq!(FrameError::DeviceLost.violation(), None);
    }
}
