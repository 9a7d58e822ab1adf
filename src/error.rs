use serde::Serialize;
use thiserror::Error;

/// Recoverable profiler conditions.
///
/// None of these are fatal: the offending zone or frame is skipped and the
/// error is reported through the log and the diagnostic hook.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProfilerError {
    #[error("`{operation}` called while the profiler is {state}")]
    InvalidState {
        operation: &'static str,
        state: &'static str,
    },

    #[error("unbalanced zone: {open_zones} zone(s) open at `{operation}`")]
    UnbalancedZone {
        operation: &'static str,
        open_zones: usize,
    },

    #[error("zone depth {depth} exceeds the maximum of {max_depth}")]
    DepthExceeded { depth: u32, max_depth: u32 },

    #[error("timestamp ring is full ({capacity} queries per frame)")]
    QueryCapacityExceeded { capacity: u32 },

    #[error("zone tree is full ({capacity} zones)")]
    ZoneCapacityExceeded { capacity: u32 },
}

impl ProfilerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProfilerError::InvalidState { .. } => ErrorKind::InvalidState,
            ProfilerError::UnbalancedZone { .. } => ErrorKind::UnbalancedZone,
            ProfilerError::DepthExceeded { .. } => ErrorKind::DepthExceeded,
            ProfilerError::QueryCapacityExceeded { .. } => ErrorKind::QueryCapacityExceeded,
            ProfilerError::ZoneCapacityExceeded { .. } => ErrorKind::ZoneCapacityExceeded,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    InvalidState,
    UnbalancedZone,
    DepthExceeded,
    QueryCapacityExceeded,
    ZoneCapacityExceeded,
}

/// Counters for every recoverable condition seen since the last `clear()`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostics {
    pub invalid_state: u64,
    pub unbalanced_zones: u64,
    pub depth_exceeded: u64,
    pub query_capacity_exceeded: u64,
    pub zone_capacity_exceeded: u64,
    /// Same zone entered more than once in one frame; the last entry wins.
    pub duplicate_entries: u64,
    /// `collect()` calls that found a submitted slot whose fence had not
    /// signaled yet.
    pub deferred_collections: u64,
    /// Frames whose results were abandoned because their slot was needed
    /// again before the GPU finished with it.
    pub dropped_frames: u64,
    /// Zone entries skipped because their stream's slot was still owned by
    /// an earlier, unfinished submission.
    pub skipped_zones: u64,
    pub frames_begun: u64,
    pub frames_collected: u64,
}

impl Diagnostics {
    pub fn record(&mut self, err: &ProfilerError) {
        match err.kind() {
            ErrorKind::InvalidState => self.invalid_state += 1,
            ErrorKind::UnbalancedZone => self.unbalanced_zones += 1,
            ErrorKind::DepthExceeded => self.depth_exceeded += 1,
            ErrorKind::QueryCapacityExceeded => self.query_capacity_exceeded += 1,
            ErrorKind::ZoneCapacityExceeded => self.zone_capacity_exceeded += 1,
        }
    }

    pub fn count(&self, kind: ErrorKind) -> u64 {
        match kind {
            ErrorKind::InvalidState => self.invalid_state,
            ErrorKind::UnbalancedZone => self.unbalanced_zones,
            ErrorKind::DepthExceeded => self.depth_exceeded,
            ErrorKind::QueryCapacityExceeded => self.query_capacity_exceeded,
            ErrorKind::ZoneCapacityExceeded => self.zone_capacity_exceeded,
        }
    }
}
