//! Device layer the profiler records into.

use std::ops::Range;

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Pipeline point at which a timestamp is taken.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PipelineStage {
    TopOfPipe,
    #[default]
    BottomOfPipe,
}

/// GPU operations needed to write and read back timestamp queries.
///
/// A `Recorder` is one command buffer plus the fence that tells when it has
/// finished executing. Each named stream owns two of them.
///
/// A `Target` is a command buffer owned by the caller. Timestamps written
/// into it are still resolved by the stream's recorder, so the caller must
/// submit it before the frame ends.
pub trait TimestampBackend {
    type Recorder;
    type Target;

    fn create_recorder(&mut self, stream: &str, slot: usize) -> Result<Self::Recorder>;

    /// Opens the recorder for a new frame. Called at most once per frame,
    /// before the first timestamp write.
    fn begin(&mut self, recorder: &mut Self::Recorder);

    fn write_timestamp(
        &mut self,
        recorder: &mut Self::Recorder,
        query_id: u32,
        stage: PipelineStage,
    );

    /// Writes a timestamp into a caller-owned command buffer.
    fn write_timestamp_into(
        &mut self,
        target: &mut Self::Target,
        query_id: u32,
        stage: PipelineStage,
    );

    /// Closes and submits the recorder; `queries` covers every id written
    /// since `begin`.
    fn submit(&mut self, recorder: &mut Self::Recorder, queries: Range<u32>);

    /// Non-blocking fence check for the last submission.
    fn results_ready(&self, recorder: &Self::Recorder) -> bool;

    /// Raw values for `queries`, in id order. Only valid after
    /// `results_ready` returned true.
    fn read_query_values(
        &mut self,
        recorder: &mut Self::Recorder,
        queries: Range<u32>,
    ) -> Result<Vec<u64>>;

    /// Throws away whatever the recorder holds so it can be begun again.
    /// Never called while a submission is executing: the recorder is either
    /// unsubmitted or `results_ready` has returned true for it. Must not
    /// block.
    fn discard(&mut self, recorder: &mut Self::Recorder);

    /// Nanoseconds per timestamp tick.
    fn timestamp_period_ns(&self) -> f32;
}
