//! Frame protocol tests against a scripted backend.

use std::collections::VecDeque;
use std::time::Duration;

use lumen_renderer::{
    CommandContext, FenceGate, FrameConfig, FrameError, FrameOrchestrator, ListState,
    ProtocolViolation,
    ResourceState, SubmissionUnit, SwapChainOps, TimelineFence, TransitionBarrier,
};
use lumen_rhi::{RhiError, RhiResult};

#[derive(Debug, Clone, PartialEq)]
enum Event {
    Reset { completed: u64, signaled: u64 },
    Close,
    Execute,
    Barrier(TransitionBarrier),
    Acquire(u32),
    Present(u32),
    Signal(u64),
    Wait(u64),
}

/// GPU double. The GPU lags one value behind unless a wait catches it up,
/// or `auto_complete` is set.
#[derive(Default)]
struct ScriptedGpu {
    events: Vec<Event>,
    indices: VecDeque<u32>,
    acquired: Option<u32>,
    completed: u64,
    signaled: u64,
    auto_complete: bool,
    wait_result: Option<RhiResult<bool>>,
}

impl ScriptedGpu {
    fn with_indices(indices: &[u32]) -> Self {
        Self {
            indices: indices.iter().copied().collect(),
            ..Default::default()
        }
    }

    fn barriers_for(&self, buffer: u32) -> Vec<TransitionBarrier> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Event::Barrier(b) if b.buffer == buffer => Some(*b),
                _ => None,
            })
            .collect()
    }
}

impl CommandContext for ScriptedGpu {
    fn reset(&mut self) -> RhiResult<()> {
        self.events.push(Event::Reset {
            completed: self.completed,
            signaled: self.signaled,
        });
        Ok(())
    }

    fn close(&mut self) -> RhiResult<()> {
        self.events.push(Event::Close);
        Ok(())
    }

    fn execute(&mut self) -> RhiResult<()> {
        self.events.push(Event::Execute);
        Ok(())
    }

    fn barrier(&mut self, barrier: TransitionBarrier) -> RhiResult<()> {
        self.events.push(Event::Barrier(barrier));
        Ok(())
    }

    fn clear_depth(&mut self, _depth: f32) -> RhiResult<()> {
        Ok(())
    }

    fn clear_color(&mut self, _buffer: u32, _color: [f32; 4]) -> RhiResult<()> {
        Ok(())
    }
}

impl SwapChainOps for ScriptedGpu {
    fn buffer_count(&self) -> u32 {
        2
    }

    fn current_back_buffer_index(&mut self) -> RhiResult<u32> {
        if let Some(index) = self.acquired {
            return Ok(index);
        }
        let index = self
            .indices
            .pop_front()
            .ok_or_else(|| RhiError::SwapchainError("script exhausted".to_string()))?;
        self.acquired = Some(index);
        self.events.push(Event::Acquire(index));
        Ok(index)
    }

    fn present(&mut self, buffer: u32, _sync_interval: u32) -> RhiResult<()> {
        self.acquired = None;
        self.events.push(Event::Present(buffer));
        Ok(())
    }
}

impl TimelineFence for ScriptedGpu {
    fn completed_value(&self) -> RhiResult<u64> {
        Ok(self.completed)
    }

    fn signal(&mut self, value: u64) -> RhiResult<()> {
        self.signaled = value;
        if self.auto_complete {
            self.completed = value;
        }
        self.events.push(Event::Signal(value));
        Ok(())
    }

    fn wait(&mut self, value: u64, _timeout: Duration) -> RhiResult<bool> {
        self.events.push(Event::Wait(value));
        if let Some(result) = self.wait_result.take() {
            return result;
        }
        self.completed = value;
        Ok(true)
    }
}

fn config() -> FrameConfig {
    FrameConfig {
        fence_timeout: Duration::from_millis(10),
        ..FrameConfig::default()
    }
}

#[test]
fn test_interleaved_back_buffers_pair_transitions() {
    let gpu = ScriptedGpu::with_indices(&[0, 1, 1, 0]);
    let mut orch = FrameOrchestrator::new(gpu, config()).unwrap();

    for expected in [0, 1, 1, 0] {
        let frame = orch.begin_frame().unwrap();
        assert_eq!(frame.back_buffer(), expected);
        let report = orch.end_frame(frame).unwrap();
        assert_eq!(report.back_buffer, expected);
    }

    for buffer in 0..2 {
        let barriers = orch.backend().barriers_for(buffer);
        assert_eq!(barriers.len(), 4);
        for pair in barriers.chunks(2) {
            assert_eq!(pair[0].before, ResourceState::Present);
            assert_eq!(pair[0].after, ResourceState::RenderTarget);
            assert_eq!(pair[1], pair[0].inverse());
        }
        assert_eq!(
            orch.transitions().state(buffer),
            Some(ResourceState::Present)
        );
    }
}

#[test]
fn test_index_stable_within_frame() {
    let gpu = ScriptedGpu::with_indices(&[1, 0]);
    let mut orch = FrameOrchestrator::new(gpu, config()).unwrap();

    let frame = orch.begin_frame().unwrap();
    let index = orch
        .commands(&frame)
        .unwrap()
        .current_back_buffer_index()
        .unwrap();
    assert_eq!(index, frame.back_buffer());

    orch.end_frame(frame).unwrap();
    let acquires = orch
        .backend()
        .events
        .iter()
        .filter(|e| matches!(e, Event::Acquire(_)))
        .count();
    assert_eq!(acquires, 1);
}

#[test]
fn test_reset_only_after_fence_completes() {
    let gpu = ScriptedGpu::with_indices(&[0, 1, 0, 1, 0]);
    let mut orch = FrameOrchestrator::new(gpu, config()).unwrap();

    for _ in 0..5 {
        let frame = orch.begin_frame().unwrap();
        orch.end_frame(frame).unwrap();
    }

    for event in &orch.backend().events {
        if let Event::Reset {
            completed,
            signaled,
        } = *event
        {
            assert!(completed >= signaled, "reset at {completed} < {signaled}");
        }
    }
}

#[test]
fn test_wait_blocks_until_pending_value() {
    let gpu = ScriptedGpu::with_indices(&[0, 1, 0, 1, 0, 1]);
    let mut orch = FrameOrchestrator::new(gpu, config()).unwrap();
    for _ in 0..5 {
        let frame = orch.begin_frame().unwrap();
        orch.end_frame(frame).unwrap();
    }
    assert_eq!(orch.backend().completed, 5);

    let frame = orch.begin_frame().unwrap();
    let frame = orch.close(frame).unwrap();
    let frame = orch.submit(frame).unwrap();
    let frame = orch.present(frame).unwrap();
    let frame = orch.signal(frame).unwrap();
    assert_eq!(frame.fence_value(), 6);
    assert!(!orch.fence().is_complete());

    let frame = orch.wait(frame).unwrap();
    assert_eq!(orch.backend().events.last(), Some(&Event::Wait(6)));
    assert_eq!(orch.backend().completed, 6);

    let report = orch.reset(frame).unwrap();
    assert_eq!(report.fence_value, 6);
    assert_eq!(report.frame_number, 6);
}

#[test]
fn test_completed_fence_skips_wait() {
    let mut gpu = ScriptedGpu::with_indices(&[0]);
    gpu.auto_complete = true;
    let mut orch = FrameOrchestrator::new(gpu, config()).unwrap();

    let frame = orch.begin_frame().unwrap();
    orch.end_frame(frame).unwrap();

    assert!(
        !orch
            .backend()
            .events
            .iter()
            .any(|e| matches!(e, Event::Wait(_)))
    );
}

#[test]
fn test_submit_unclosed_list_is_violation() {
    let mut gpu = ScriptedGpu::default();
    let gate = FenceGate::new(Duration::from_secs(1));
    let mut unit = SubmissionUnit::open(&mut gpu).unwrap();

    let err = unit.submit(&mut gpu, &gate).unwrap_err();
    assert_eq!(
        err.violation(),
        Some(ProtocolViolation::SubmitUnclosedList {
            actual: ListState::Recording
        })
    );
    assert!(!gpu.events.contains(&Event::Execute));
}

#[test]
fn test_reset_after_unsignaled_submit_is_violation() {
    let mut gpu = ScriptedGpu::default();
    let mut gate = FenceGate::new(Duration::from_secs(1));
    let mut unit = SubmissionUnit::open(&mut gpu).unwrap();
    unit.close(&mut gpu).unwrap();
    unit.submit(&mut gpu, &gate).unwrap();

    let err = unit.reset_for_next_frame(&mut gpu, &gate).unwrap_err();
    assert_eq!(
        err.violation(),
        Some(ProtocolViolation::ResetUnfencedSubmission {
            required: 1,
            completed: 0
        })
    );
    assert_eq!(unit.state(), ListState::Submitted);
    let resets = |gpu: &ScriptedGpu| {
        gpu.events
            .iter()
            .filter(|e| matches!(e, Event::Reset { .. }))
            .count()
    };
    assert_eq!(resets(&gpu), 1);

    gate.flush(&mut gpu).unwrap();
    unit.reset_for_next_frame(&mut gpu, &gate).unwrap();
    assert_eq!(unit.state(), ListState::Recording);
    assert_eq!(resets(&gpu), 2);
}

#[test]
fn test_timeout_reports_device_hung() {
    let mut gpu = ScriptedGpu::with_indices(&[0]);
    gpu.wait_result = Some(Ok(false));
    let mut orch = FrameOrchestrator::new(gpu, config()).unwrap();

    let frame = orch.begin_frame().unwrap();
    match orch.end_frame(frame) {
        Err(FrameError::DeviceHung { value, completed }) => {
            assert_eq!(value, 1);
            assert_eq!(completed, 0);
        }
        other => panic!("expected DeviceHung, got {other:?}"),
    }
}

#[test]
fn test_device_lost_during_wait() {
    let mut gpu = ScriptedGpu::with_indices(&[0]);
    gpu.wait_result = Some(Err(RhiError::DeviceLost));
    let mut orch = FrameOrchestrator::new(gpu, config()).unwrap();

    let frame = orch.begin_frame().unwrap();
    assert!(matches!(orch.end_frame(frame), Err(FrameError::DeviceLost)));
}
