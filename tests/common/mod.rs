//! In-memory timestamp backend shared by the integration tests.
#![allow(dead_code)]

use std::{collections::HashMap, ops::Range};

use anyhow::{Result, bail};
use gpuzones::{CallSite, GpuProfiler, PipelineStage, ProfilerConfig, TimestampBackend};

/// Every timestamp write advances the fake clock by this many ticks.
pub const TICK: u64 = 10;

#[derive(Debug, Default)]
pub struct FakeRecorder {
    pub stream: String,
    pub slot: usize,
    pub open: bool,
    pub begins: u32,
    written: Vec<(u32, u64)>,
    /// Range and values resolved at submission.
    submitted: Option<(Range<u32>, Vec<u64>)>,
}

impl FakeRecorder {
    pub fn written_ids(&self) -> Vec<u32> {
        self.written.iter().map(|&(id, _)| id).collect()
    }
}

/// Command buffer owned by a test rather than by a profiler stream.
#[derive(Debug, Default)]
pub struct FakeEncoder {
    pub writes: Vec<(u32, u64)>,
}

impl FakeEncoder {
    pub fn ids(&self) -> Vec<u32> {
        self.writes.iter().map(|&(id, _)| id).collect()
    }
}

pub struct FakeBackend {
    pub period_ns: f32,
    /// When false, submitted recorders never report their fence as signaled.
    pub gpu_idle: bool,
    pub fail_recorders: bool,
    pub clock: u64,
    pub writes: Vec<(String, u32, PipelineStage)>,
    pub submissions: Vec<(String, Range<u32>)>,
    pub discards: usize,
    /// Query values written by executed command buffers, by id.
    pub query_memory: HashMap<u32, u64>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self {
            period_ns: 1.0,
            gpu_idle: true,
            fail_recorders: false,
            clock: 0,
            writes: Vec::new(),
            submissions: Vec::new(),
            discards: 0,
            query_memory: HashMap::new(),
        }
    }

    /// Runs a test-owned command buffer, landing its timestamps in query
    /// memory.
    pub fn execute(&mut self, encoder: FakeEncoder) {
        self.query_memory.extend(encoder.writes);
    }
}

impl TimestampBackend for FakeBackend {
    type Recorder = FakeRecorder;
    type Target = FakeEncoder;

    fn create_recorder(&mut self, stream: &str, slot: usize) -> Result<FakeRecorder> {
        if self.fail_recorders {
            bail!("out of command buffers");
        }
        Ok(FakeRecorder {
            stream: stream.to_string(),
            slot,
            ..Default::default()
        })
    }

    fn begin(&mut self, recorder: &mut FakeRecorder) {
        assert!(!recorder.open, "recorder begun twice");
        recorder.open = true;
        recorder.begins += 1;
        recorder.written.clear();
    }

    fn write_timestamp(
        &mut self,
        recorder: &mut FakeRecorder,
        query_id: u32,
        stage: PipelineStage,
    ) {
        assert!(recorder.open, "timestamp written to a closed recorder");
        self.clock += TICK;
        recorder.written.push((query_id, self.clock));
        self.writes.push((recorder.stream.clone(), query_id, stage));
    }

    fn write_timestamp_into(
        &mut self,
        target: &mut FakeEncoder,
        query_id: u32,
        stage: PipelineStage,
    ) {
        self.clock += TICK;
        target.writes.push((query_id, self.clock));
        self.writes.push(("caller".to_string(), query_id, stage));
    }

    fn submit(&mut self, recorder: &mut FakeRecorder, queries: Range<u32>) {
        assert!(recorder.submitted.is_none(), "recorder submitted twice");
        recorder.open = false;
        self.submissions.push((recorder.stream.clone(), queries.clone()));
        self.query_memory.extend(recorder.written.drain(..));
        let values = queries
            .clone()
            .map(|id| self.query_memory.get(&id).copied().unwrap_or(0))
            .collect();
        recorder.submitted = Some((queries, values));
    }

    fn results_ready(&self, recorder: &FakeRecorder) -> bool {
        self.gpu_idle && recorder.submitted.is_some()
    }

    fn read_query_values(
        &mut self,
        recorder: &mut FakeRecorder,
        queries: Range<u32>,
    ) -> Result<Vec<u64>> {
        let Some((range, values)) = recorder.submitted.take() else {
            bail!("nothing submitted");
        };
        assert_eq!(range, queries);
        Ok(values)
    }

    fn discard(&mut self, recorder: &mut FakeRecorder) {
        assert!(
            recorder.submitted.is_none() || self.results_ready(recorder),
            "`{}` slot {} discarded while the device still owns it",
            recorder.stream,
            recorder.slot
        );
        recorder.open = false;
        recorder.written.clear();
        recorder.submitted = None;
        self.discards += 1;
    }

    fn timestamp_period_ns(&self) -> f32 {
        self.period_ns
    }
}

pub fn small_config() -> ProfilerConfig {
    ProfilerConfig {
        max_query_count: 64,
        max_depth: 8,
        averaging_window: 4,
        recursive_levels_tracked: 20,
        max_zone_count: 256,
    }
}

pub fn profiler(config: ProfilerConfig) -> GpuProfiler<FakeBackend> {
    GpuProfiler::new(config, Ok(FakeBackend::new()))
}

pub fn site(n: u64) -> CallSite {
    CallSite::from_raw(n)
}

pub fn fake(p: &mut GpuProfiler<FakeBackend>) -> &mut FakeBackend {
    p.backend_mut().expect("fake backend is always loaded")
}
