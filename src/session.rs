//! Per-frame lifecycle: `Idle -> FrameOpen -> (zones)* -> Idle`.

use crate::{backend::PipelineStage, error::ProfilerError, zone::ZoneId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    Idle,
    FrameOpen,
}

impl FrameState {
    fn describe(self) -> &'static str {
        match self {
            FrameState::Idle => "idle",
            FrameState::FrameOpen => "inside a frame",
        }
    }
}

/// Token returned by a successful zone entry; pass it back to exit the zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZoneHandle {
    pub zone: ZoneId,
    pub depth: u32,
    pub(crate) frame_id: u64,
    pub(crate) generation: u32,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct OpenZone {
    pub handle: ZoneHandle,
    pub stream: usize,
    pub stage: PipelineStage,
    pub queries: [u32; 2],
}

pub struct FrameSession {
    state: FrameState,
    stack: Vec<OpenZone>,
    max_depth: u32,
    max_depth_ever_seen: u32,
    frame_id: u64,
    frame_label: String,
    /// Whether timestamps are written this frame; sampled at `begin`.
    recording: bool,
}

impl FrameSession {
    pub fn new(max_depth: u32) -> Self {
        Self {
            state: FrameState::Idle,
            stack: Vec::with_capacity(max_depth as usize),
            max_depth,
            max_depth_ever_seen: 0,
            frame_id: 0,
            frame_label: String::new(),
            recording: false,
        }
    }

    pub fn state(&self) -> FrameState {
        self.state
    }

    pub fn frame_id(&self) -> u64 {
        self.frame_id
    }

    pub fn frame_label(&self) -> &str {
        &self.frame_label
    }

    pub fn current_depth(&self) -> u32 {
        self.stack.len() as u32
    }

    pub fn max_depth_ever_seen(&self) -> u32 {
        self.max_depth_ever_seen
    }

    pub fn is_recording(&self) -> bool {
        self.state == FrameState::FrameOpen && self.recording
    }

    pub fn open_zones(&self) -> impl Iterator<Item = ZoneId> + '_ {
        self.stack.iter().map(|z| z.handle.zone)
    }

    pub(crate) fn top(&self) -> Option<&OpenZone> {
        self.stack.last()
    }

    /// Opens frame `frame_id + 1` and returns its id.
    pub fn begin(&mut self, label: &str, recording: bool) -> Result<u64, ProfilerError> {
        if self.state != FrameState::Idle {
            return Err(ProfilerError::InvalidState {
                operation: "begin_frame",
                state: self.state.describe(),
            });
        }
        self.state = FrameState::FrameOpen;
        self.stack.clear();
        self.frame_id += 1;
        self.frame_label.clear();
        self.frame_label.push_str(label);
        self.recording = recording;
        Ok(self.frame_id)
    }

    pub fn ensure_open(&self, operation: &'static str) -> Result<(), ProfilerError> {
        if self.state != FrameState::FrameOpen {
            return Err(ProfilerError::InvalidState {
                operation,
                state: self.state.describe(),
            });
        }
        Ok(())
    }

    /// Depth the next zone would be opened at, or an error when that would
    /// break the nesting limit.
    pub fn check_depth(&self) -> Result<u32, ProfilerError> {
        let depth = self.current_depth();
        if depth >= self.max_depth {
            return Err(ProfilerError::DepthExceeded {
                depth,
                max_depth: self.max_depth,
            });
        }
        Ok(depth)
    }

    pub(crate) fn push(&mut self, open: OpenZone) {
        self.stack.push(open);
        self.max_depth_ever_seen = self.max_depth_ever_seen.max(self.current_depth());
    }

    /// Pops `handle`, which must be the innermost open zone.
    pub(crate) fn pop(&mut self, handle: ZoneHandle) -> Result<OpenZone, ProfilerError> {
        let unbalanced = ProfilerError::UnbalancedZone {
            operation: "exit_zone",
            open_zones: self.stack.len(),
        };
        if self.stack.last().is_none_or(|top| top.handle != handle) {
            return Err(unbalanced);
        }
        self.stack.pop().ok_or(unbalanced)
    }

    /// Closes the frame, handing back any zones left open (innermost first).
    pub(crate) fn end(&mut self) -> Result<Vec<OpenZone>, ProfilerError> {
        self.ensure_open("end_frame")?;
        self.state = FrameState::Idle;
        let mut left_open: Vec<OpenZone> = self.stack.drain(..).collect();
        left_open.reverse();
        Ok(left_open)
    }
}
