//! Hierarchical GPU timestamp profiler.
//!
//! Zones are opened and closed around GPU work inside a frame; each entry
//! writes a pair of timestamp queries into a double-banked pool, and once the
//! frame's command buffer has finished the pairs are read back into a
//! persistent call tree with rolling averages. See [`GpuProfiler`].

pub mod average;
pub mod backend;
pub mod config;
pub mod error;
pub mod gpu;
pub mod profiler;
pub mod registry;
pub mod ring;
pub mod session;
pub mod snapshot;
pub mod stream;
pub mod zone;

pub use average::{AverageValue, Sample};
pub use backend::{PipelineStage, TimestampBackend};
pub use config::ProfilerConfig;
pub use error::{Diagnostics, ErrorKind, ProfilerError};
pub use profiler::{DEFAULT_STREAM, GpuProfiler, ScopedZone};
pub use session::{FrameState, ZoneHandle};
pub use snapshot::{ProfilerSnapshot, ZoneSnapshot};
pub use zone::{CallSite, ZoneId};
