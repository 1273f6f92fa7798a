//! Recording backend for unit tests.

use std::collections::VecDeque;
use std::time::Duration;

use lumen_rhi::{RhiError, RhiResult};

use crate::backend::{CommandContext, SwapChainOps, TimelineFence, TransitionBarrier};

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Reset,
    Close,
    Execute,
    Barrier(TransitionBarrier),
    ClearDepth(f32),
    ClearColor(u32),
    Acquire(u32),
    Present(u32, u32),
    Signal(u64),
    Wait(u64),
    DeviceFailed,
}

/// Backend double: records every call, hands out scripted back-buffer
/// indices, and completes fence values only when waited on.
#[derive(Debug, Default)]
pub struct MockBackend {
    pub calls: Vec<Call>,
    pub buffers: u32,
    pub indices: VecDeque<u32>,
    pub acquired: Option<u32>,
    pub completed: u64,
    pub signaled: u64,
    /// `wait` returns a timeout instead of completing.
    pub hang: bool,
    /// `wait` reports device loss.
    pub lost: bool,
}

impl MockBackend {
    pub fn new(buffers: u32) -> Self {
        Self {
            buffers,
            ..Default::default()
        }
    }

    pub fn with_indices(mut self, indices: &[u32]) -> Self {
        self.indices = indices.iter().copied().collect();
        self
    }

    pub fn barriers(&self) -> Vec<TransitionBarrier> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                Call::Barrier(b) => Some(*b),
                _ => None,
            })
            .collect()
    }
}

impl CommandContext for MockBackend {
    fn reset(&mut self) -> RhiResult<()> {
        self.calls.push(Call::Reset);
        Ok(())
    }

    fn close(&mut self) -> RhiResult<()> {
        self.calls.push(Call::Close);
        Ok(())
    }

    fn execute(&mut self) -> RhiResult<()> {
        self.calls.push(Call::Execute);
        Ok(())
    }

    fn barrier(&mut self, barrier: TransitionBarrier) -> RhiResult<()> {
        self.calls.push(Call::Barrier(barrier));
        Ok(())
    }

    fn clear_depth(&mut self, depth: f32) -> RhiResult<()> {
        self.calls.push(Call::ClearDepth(depth));
        Ok(())
    }

    fn clear_color(&mut self, buffer: u32, _color: [f32; 4]) -> RhiResult<()> {
        self.calls.push(Call::ClearColor(buffer));
        Ok(())
    }
}

impl SwapChainOps for MockBackend {
    fn buffer_count(&self) -> u32 {
        self.buffers
    }

    fn current_back_buffer_index(&mut self) -> RhiResult<u32> {
        if let Some(index) = self.acquired {
            return Ok(index);
        }
        let index = self.indices.pop_front().unwrap_or(0);
        self.acquired = Some(index);
        self.calls.push(Call::Acquire(index));
        Ok(index)
    }

    fn present(&mut self, buffer: u32, sync_interval: u32) -> RhiResult<()> {
        self.acquired = None;
        self.calls.push(Call::Present(buffer, sync_interval));
        Ok(())
    }
}

impl TimelineFence for MockBackend {
    fn completed_value(&self) -> RhiResult<u64> {
        Ok(self.completed)
    }

    fn signal(&mut self, value: u64) -> RhiResult<()> {
        self.signaled = value;
        self.calls.push(Call::Signal(value));
        Ok(())
    }

    fn wait(&mut self, value: u64, _timeout: Duration) -> RhiResult<bool> {
        self.calls.push(Call::Wait(value));
        if self.lost {
            return Err(RhiError::DeviceLost);
        }
        if self.hang {
            return Ok(false);
        }
        self.completed = self.completed.max(value);
        Ok(true)
    }

    fn mark_device_failed(&mut self) {
        self.calls.push(Call::DeviceFailed);
    }
}
