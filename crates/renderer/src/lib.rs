//! Frame lifecycle and CPU/GPU synchronization.
//!
//! - [`submission`]: the single command allocator/list and its states
//! - [`transition`]: per-back-buffer state tags and barrier emission
//! - [`fence_gate`]: monotonic fence values and the bounded wait
//! - [`orchestrator`]: the per-frame sequence, enforced by typestate
//! - [`vulkan`]: the Vulkan implementation of the [`backend`] seams
//! - [`renderer`]: the scene pass driving all of the above

pub mod arena;
pub mod backend;
pub mod depth_buffer;
mod error;
pub mod fence_gate;
pub mod orchestrator;
pub mod renderer;
pub mod submission;
pub mod transition;
pub mod ubo;
pub mod vulkan;

#[cfg(test)]
mod testing;

pub use arena::{ObjectArena, ObjectHandle};
pub use backend::{CommandContext, FrameBackend, SwapChainOps, TimelineFence, TransitionBarrier};
pub use error::{FrameError, FrameResult, ProtocolViolation};
pub use fence_gate::{FenceGate, FenceState};
pub use orchestrator::{Frame, FrameConfig, FrameOrchestrator, FrameReport};
pub use renderer::{ObjectPass, Renderer};
pub use submission::{ListState, SubmissionUnit};
pub use transition::{ResourceState, TransitionController};
pub use vulkan::VulkanBackend;
