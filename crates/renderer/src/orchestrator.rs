//! Per-frame sequencing of acquire, transition, record, submit, present and
//! fence wait.
//!
//! A frame moves through a fixed chain of steps. Each step consumes the
//! [`Frame`] token of the previous one and returns the next, so calling
//! `present` before `submit`, or recording into a closed frame, does not
//! compile:
//!
//! ```text
//! begin_frame -> Frame<Recording>   acquire index, Present -> RenderTarget, clear
//! close       -> Frame<Closed>      RenderTarget -> Present, close list
//! submit      -> Frame<Submitted>   execute on the queue
//! present     -> Frame<Presented>   present the buffer
//! signal      -> Frame<Signaled>    enqueue fence value N
//! wait        -> Frame<Retired>     block (bounded) until N completes
//! reset       -> FrameReport        recycle allocator and list
//! ```
//!
//! Steps that the type system cannot rule out (a list reset while the fence
//! is pending, a back buffer index that moves mid-frame) are checked at
//! runtime and reported as [`ProtocolViolation`].
//!
//! # Example
//!
//! ```no_run
//! use lumen_renderer::{FrameBackend, FrameConfig, FrameOrchestrator, FrameResult};
//!
//! # fn example<B: FrameBackend>(backend: B) -> FrameResult<()> {
//! let mut orchestrator = FrameOrchestrator::new(backend, FrameConfig::default())?;
//!
//! let frame = orchestrator.begin_frame()?;
//! let _commands = orchestrator.commands(&frame)?;
//! // Record draws...
//! let report = orchestrator.end_frame(frame)?;
//! assert_eq!(report.fence_value, 1);
//!
//! orchestrator.shutdown()?;
//! # Ok(())
//! # }
//! ```

use std::marker::PhantomData;
use std::time::Duration;

use lumen_core::RendererConfig;
use lumen_core::config::{CLEAR_COLOR, CLEAR_DEPTH, FENCE_TIMEOUT, SYNC_INTERVAL};
use tracing::{debug, info, trace, warn};

use crate::backend::FrameBackend;
use crate::error::{FrameError, FrameResult, ProtocolViolation};
use crate::fence_gate::FenceGate;
use crate::submission::SubmissionUnit;
use crate::transition::TransitionController;

/// The subset of [`RendererConfig`] the frame loop consumes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameConfig {
    pub clear_color: [f32; 4],
    pub clear_depth: f32,
    pub sync_interval: u32,
    pub fence_timeout: Duration,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            clear_color: CLEAR_COLOR,
            clear_depth: CLEAR_DEPTH,
            sync_interval: SYNC_INTERVAL,
            fence_timeout: FENCE_TIMEOUT,
        }
    }
}

impl From<&RendererConfig> for FrameConfig {
    fn from(config: &RendererConfig) -> Self {
        Self {
            clear_color: config.clear_color,
            clear_depth: config.clear_depth,
            sync_interval: config.sync_interval,
            fence_timeout: config.fence_timeout,
        }
    }
}

/// Frame stage markers.
pub mod stage {
    #[derive(Debug)]
    pub enum Recording {}
    #[derive(Debug)]
    pub enum Closed {}
    #[derive(Debug)]
    pub enum Submitted {}
    #[derive(Debug)]
    pub enum Presented {}
    #[derive(Debug)]
    pub enum Signaled {}
    #[derive(Debug)]
    pub enum Retired {}
}

use stage::{Closed, Presented, Recording, Retired, Signaled, Submitted};

/// Token for one frame in flight.
///
/// Not `Clone`: each step takes it by value.
#[must_use = "a frame must be driven to completion with end_frame or the step methods"]
#[derive(Debug)]
pub struct Frame<S> {
    number: u64,
    buffer: u32,
    fence_value: u64,
    _stage: PhantomData<S>,
}

impl<S> Frame<S> {
    fn advance<T>(self) -> Frame<T> {
        Frame {
            number: self.number,
            buffer: self.buffer,
            fence_value: self.fence_value,
            _stage: PhantomData,
        }
    }

    /// 1-based frame number.
    #[inline]
    pub fn number(&self) -> u64 {
        self.number
    }

    /// Back buffer this frame renders into.
    #[inline]
    pub fn back_buffer(&self) -> u32 {
        self.buffer
    }
}

impl Frame<Signaled> {
    #[inline]
    pub fn fence_value(&self) -> u64 {
        self.fence_value
    }
}

impl Frame<Retired> {
    #[inline]
    pub fn fence_value(&self) -> u64 {
        self.fence_value
    }
}

/// Summary of a retired frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameReport {
    pub frame_number: u64,
    pub back_buffer: u32,
    pub fence_value: u64,
}

/// Drives the single command list, back-buffer states and the fence through
/// one frame at a time.
///
/// Once any step reports [`FrameError::DeviceHung`] or
/// [`FrameError::DeviceLost`] the orchestrator is marked failed, the backend is
/// told, and no later step waits on the GPU again.
pub struct FrameOrchestrator<B: FrameBackend> {
    backend: B,
    submission: SubmissionUnit,
    transitions: TransitionController,
    fence: FenceGate,
    config: FrameConfig,
    frame_count: u64,
    device_failed: bool,
}

impl<B: FrameBackend> FrameOrchestrator<B> {
    /// Takes ownership of the backend and opens the command list.
    ///
    /// # Errors
    ///
    /// Returns an error if the initial allocator reset fails.
    pub fn new(mut backend: B, config: FrameConfig) -> FrameResult<Self> {
        let submission = SubmissionUnit::open(&mut backend)?;
        let transitions = TransitionController::new(backend.buffer_count());
        let fence = FenceGate::new(config.fence_timeout);

        info!(
            "Frame orchestrator ready: {} back buffers, sync interval {}, fence timeout {:?}",
            transitions.buffer_count(),
            config.sync_interval,
            config.fence_timeout
        );

        Ok(Self {
            backend,
            submission,
            transitions,
            fence,
            config,
            frame_count: 0,
            device_failed: false,
        })
    }

    /// Runs `step`, latching device hangs and losses.
    fn checked<T>(&mut self, step: impl FnOnce(&mut Self) -> FrameResult<T>) -> FrameResult<T> {
        if self.device_failed {
            return Err(FrameError::DeviceLost);
        }
        let result = step(self);
        if let Err(FrameError::DeviceHung { .. } | FrameError::DeviceLost) = &result {
            warn!("GPU stopped responding after frame {}", self.frame_count);
            self.device_failed = true;
            self.backend.mark_device_failed();
        }
        result
    }

    /// Acquires the back buffer, makes it a render target and clears depth
    /// and color.
    ///
    /// # Errors
    ///
    /// - [`ProtocolViolation::ListNotRecording`] if the previous frame was
    ///   abandoned before `reset`.
    /// - [`FrameError::DeviceLost`] once the device has failed.
    /// - Backend errors from acquisition or recording.
    pub fn begin_frame(&mut self) -> FrameResult<Frame<Recording>> {
        self.checked(|this| {
            this.submission.ensure_recording()?;

            let buffer = this.backend.current_back_buffer_index()?;
            this.transitions
                .transition_to_render_target(buffer, &mut this.backend)?;

            this.backend.clear_depth(this.config.clear_depth)?;
            this.backend.clear_color(buffer, this.config.clear_color)?;

            this.frame_count += 1;
            trace!("Frame {} begins on back buffer {}", this.frame_count, buffer);

            Ok(Frame {
                number: this.frame_count,
                buffer,
                fence_value: 0,
                _stage: PhantomData,
            })
        })
    }

    /// The backend, for recording draws into an open frame.
    pub fn commands(&mut self, _frame: &Frame<Recording>) -> FrameResult<&mut B> {
        self.submission.record_into(&mut self.backend)
    }

    /// Returns the back buffer to the present state and closes the list.
    ///
    /// # Errors
    ///
    /// [`ProtocolViolation::BackBufferChanged`] if the swap chain reports a
    /// different index than the one the frame began on.
    pub fn close(&mut self, frame: Frame<Recording>) -> FrameResult<Frame<Closed>> {
        self.checked(|this| {
            let actual = this.backend.current_back_buffer_index()?;
            if actual != frame.buffer {
                return Err(ProtocolViolation::BackBufferChanged {
                    expected: frame.buffer,
                    actual,
                }
                .into());
            }

            this.transitions
                .transition_to_present(frame.buffer, &mut this.backend)?;
            this.submission.close(&mut this.backend)?;
            Ok(frame.advance())
        })
    }

    pub fn submit(&mut self, frame: Frame<Closed>) -> FrameResult<Frame<Submitted>> {
        self.checked(|this| {
            this.submission.submit(&mut this.backend, &this.fence)?;
            Ok(frame.advance())
        })
    }

    pub fn present(&mut self, frame: Frame<Submitted>) -> FrameResult<Frame<Presented>> {
        self.checked(|this| {
            this.backend
                .present(frame.buffer, this.config.sync_interval)?;
            Ok(frame.advance())
        })
    }

    /// Enqueues the next fence value behind this frame's work.
    pub fn signal(&mut self, frame: Frame<Presented>) -> FrameResult<Frame<Signaled>> {
        self.checked(|this| {
            let fence_value = this.fence.signal(&mut this.backend)?;
            let mut frame: Frame<Signaled> = frame.advance();
            frame.fence_value = fence_value;
            Ok(frame)
        })
    }

    /// Blocks until the GPU reaches the frame's fence value.
    ///
    /// # Errors
    ///
    /// [`FrameError::DeviceHung`] when the wait exceeds the configured timeout,
    /// [`FrameError::DeviceLost`] when the device is gone.
    pub fn wait(&mut self, frame: Frame<Signaled>) -> FrameResult<Frame<Retired>> {
        self.checked(|this| {
            this.fence.wait_for_completion(&mut this.backend)?;
            Ok(frame.advance())
        })
    }

    /// Recycles the allocator and list for the next frame.
    pub fn reset(&mut self, frame: Frame<Retired>) -> FrameResult<FrameReport> {
        self.checked(|this| {
            this.submission
                .reset_for_next_frame(&mut this.backend, &this.fence)?;
            Ok(FrameReport {
                frame_number: frame.number,
                back_buffer: frame.buffer,
                fence_value: frame.fence_value,
            })
        })
    }

    /// Runs every step from `close` through `reset`.
    pub fn end_frame(&mut self, frame: Frame<Recording>) -> FrameResult<FrameReport> {
        let frame = self.close(frame)?;
        let frame = self.submit(frame)?;
        let frame = self.present(frame)?;
        let frame = self.signal(frame)?;
        let frame = self.wait(frame)?;
        self.reset(frame)
    }

    /// Waits for all outstanding GPU work.
    ///
    /// Does nothing once the device has failed.
    pub fn shutdown(&mut self) -> FrameResult<()> {
        if self.device_failed {
            warn!("Skipping shutdown flush: device is hung or lost");
            return Ok(());
        }
        self.checked(|this| {
            if this.fence.pending().is_some() {
                this.fence.wait_for_completion(&mut this.backend)?;
            }
            let value = this.fence.flush(&mut this.backend)?;
            debug!(
                "Frame orchestrator shut down after {} frames (fence {})",
                this.frame_count, value
            );
            Ok(())
        })
    }

    /// Whether a step has reported a hung or lost device.
    #[inline]
    pub fn is_device_failed(&self) -> bool {
        self.device_failed
    }

    /// Frames begun so far.
    #[inline]
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    #[inline]
    pub fn fence(&self) -> &FenceGate {
        &self.fence
    }

    #[inline]
    pub fn transitions(&self) -> &TransitionController {
        &self.transitions
    }

    #[inline]
    pub fn submission(&self) -> &SubmissionUnit {
        &self.submission
    }

    #[inline]
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }

    #[inline]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    #[inline]
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }
}
