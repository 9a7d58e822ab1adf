//! Public entry point tying the zone tree, query ring and command streams
//! to one frame lifecycle.

use std::ops::{Deref, DerefMut};

use hashbrown::HashMap;

use crate::{
    backend::{PipelineStage, TimestampBackend},
    config::ProfilerConfig,
    error::{Diagnostics, ProfilerError},
    registry::ZoneRegistry,
    ring::TimestampRing,
    session::{FrameSession, FrameState, OpenZone, ZoneHandle},
    snapshot::ProfilerSnapshot,
    stream::{
        CommandStreamBinding, FinishedSlot, Readback, SLOTS_PER_STREAM, slot_for_frame,
    },
    zone::{CallSite, ZoneId, ZoneNode},
};

/// Stream used by [`GpuProfiler::enter_zone`] and [`GpuProfiler::scope`].
pub const DEFAULT_STREAM: &str = "main";

pub type DiagnosticHook = Box<dyn FnMut(&ProfilerError)>;

/// GPU zone profiler over a [`TimestampBackend`].
///
/// Single-threaded: one producer drives `begin_frame`, the zone calls,
/// `end_frame` and `collect`. Nothing here ever waits on the device; results
/// show up in the tree once `collect` sees the frame's fence signaled.
///
/// If the backend could not be created the profiler is "not loaded" and
/// every call is a no-op.
pub struct GpuProfiler<B: TimestampBackend> {
    config: ProfilerConfig,
    backend: Option<B>,
    registry: ZoneRegistry,
    ring: TimestampRing,
    streams: Vec<CommandStreamBinding<B::Recorder>>,
    stream_index: HashMap<String, usize>,
    session: FrameSession,
    diagnostics: Diagnostics,
    hook: Option<DiagnosticHook>,
    active: bool,
    paused: bool,
    generation: u32,
}

impl<B: TimestampBackend> GpuProfiler<B> {
    pub fn new(config: ProfilerConfig, backend: anyhow::Result<B>) -> Self {
        let config = match config.validate() {
            Ok(()) => config,
            Err(e) => {
                log::error!("{e:#}; falling back to the default profiler config");
                ProfilerConfig::default()
            }
        };
        let backend = match backend {
            Ok(b) => {
                log::debug!(
                    "profiler loaded: {} queries/frame, max depth {}, window {}",
                    config.max_query_count,
                    config.max_depth,
                    config.averaging_window
                );
                Some(b)
            }
            Err(e) => {
                log::error!("GPU profiler not loaded: {e:#}");
                None
            }
        };
        Self {
            registry: ZoneRegistry::new(
                config.max_depth,
                config.averaging_window,
                config.recursive_levels_tracked,
                config.max_zone_count,
            ),
            ring: TimestampRing::new(config.max_query_count),
            session: FrameSession::new(config.max_depth),
            config,
            backend,
            streams: Vec::new(),
            stream_index: HashMap::new(),
            diagnostics: Diagnostics::default(),
            hook: None,
            active: true,
            paused: false,
            generation: 0,
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.backend.is_some()
    }

    pub fn config(&self) -> &ProfilerConfig {
        &self.config
    }

    pub fn backend(&self) -> Option<&B> {
        self.backend.as_ref()
    }

    pub fn backend_mut(&mut self) -> Option<&mut B> {
        self.backend.as_mut()
    }

    pub fn registry(&self) -> &ZoneRegistry {
        &self.registry
    }

    pub fn ring(&self) -> &TimestampRing {
        &self.ring
    }

    pub fn session(&self) -> &FrameSession {
        &self.session
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn zone(&self, zone: ZoneId) -> Option<&ZoneNode> {
        self.registry.get(zone)
    }

    pub fn breadcrumb(&self, zone: ZoneId) -> Vec<ZoneId> {
        self.registry.breadcrumb(zone)
    }

    pub fn stream(&self, name: &str) -> Option<&CommandStreamBinding<B::Recorder>> {
        self.stream_index.get(name).map(|&i| &self.streams[i])
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Takes effect at the next `begin_frame`.
    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// While paused, `collect` still drains finished frames but leaves the
    /// zone timings untouched.
    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    pub fn set_diagnostic_hook(&mut self, hook: impl FnMut(&ProfilerError) + 'static) {
        self.hook = Some(Box::new(hook));
    }

    fn report(&mut self, err: ProfilerError) -> ProfilerError {
        log::warn!("gpu profiler: {err}");
        self.diagnostics.record(&err);
        if let Some(hook) = self.hook.as_mut() {
            hook(&err);
        }
        err
    }

    pub fn begin_frame(&mut self, label: &str) -> Result<u64, ProfilerError> {
        if self.backend.is_none() {
            return Ok(0);
        }
        let frame_id = match self.session.begin(label, self.active) {
            Ok(id) => id,
            Err(e) => return Err(self.report(e)),
        };
        self.diagnostics.frames_begun += 1;

        // The slot and ring bank about to be reused still belong to frame_id - 2.
        let slot = slot_for_frame(frame_id);
        let mut late = Vec::new();
        if let Some(backend) = self.backend.as_mut() {
            for stream in &mut self.streams {
                match stream.read_slot(backend, slot) {
                    Readback::Ready(done) => late.push(done),
                    Readback::Pending => {
                        log::warn!(
                            "stream `{}`: frame {} still in flight when frame {frame_id} \
                             began; dropping its timings",
                            stream.name(),
                            stream.slot(slot).frame_id()
                        );
                        stream.abandon_slot(backend, slot);
                        self.diagnostics.dropped_frames += 1;
                    }
                    Readback::Empty => {}
                }
            }
        }
        for done in late {
            self.apply_readback(done);
        }

        self.ring.reset_frame(frame_id);
        log::debug!("begin frame {frame_id} `{label}`");
        Ok(frame_id)
    }

    pub fn enter_zone(
        &mut self,
        call_site: CallSite,
        name: &str,
    ) -> Result<Option<ZoneHandle>, ProfilerError> {
        self.open_zone(DEFAULT_STREAM, call_site, name, PipelineStage::default(), None)
    }

    pub fn enter_zone_on(
        &mut self,
        stream: &str,
        call_site: CallSite,
        name: &str,
    ) -> Result<Option<ZoneHandle>, ProfilerError> {
        self.open_zone(stream, call_site, name, PipelineStage::default(), None)
    }

    /// Opens a zone as a child of the innermost open zone.
    ///
    /// Returns `Ok(None)` when nothing is recorded (profiler not loaded,
    /// inactive this frame, or the stream's slot still owned by the device).
    /// On error the zone is skipped for the frame and must not be exited.
    pub fn enter_zone_with_stage(
        &mut self,
        stream: &str,
        call_site: CallSite,
        name: &str,
        stage: PipelineStage,
    ) -> Result<Option<ZoneHandle>, ProfilerError> {
        self.open_zone(stream, call_site, name, stage, None)
    }

    /// Opens a zone whose start timestamp goes into `target`, a command
    /// buffer the caller records and submits itself.
    ///
    /// The results are still resolved by `stream` when the frame ends, so
    /// `target` must be submitted before [`end_frame`](Self::end_frame).
    /// Close the zone with [`exit_zone_in`](Self::exit_zone_in).
    pub fn enter_zone_in(
        &mut self,
        target: &mut B::Target,
        stream: &str,
        call_site: CallSite,
        name: &str,
    ) -> Result<Option<ZoneHandle>, ProfilerError> {
        self.open_zone(stream, call_site, name, PipelineStage::default(), Some(target))
    }

    fn open_zone(
        &mut self,
        stream: &str,
        call_site: CallSite,
        name: &str,
        stage: PipelineStage,
        target: Option<&mut B::Target>,
    ) -> Result<Option<ZoneHandle>, ProfilerError> {
        if self.backend.is_none() {
            return Ok(None);
        }
        if let Err(e) = self.session.ensure_open("enter_zone") {
            return Err(self.report(e));
        }
        if !self.session.is_recording() {
            return Ok(None);
        }
        let depth = match self.session.check_depth() {
            Ok(d) => d,
            Err(e) => return Err(self.report(e)),
        };
        let Some(stream_idx) = self.stream_for(stream) else {
            return Ok(None);
        };
        let frame_id = self.session.frame_id();
        if !self.streams[stream_idx].can_record(frame_id) {
            self.diagnostics.skipped_zones += 1;
            log::trace!("stream `{stream}` busy in frame {frame_id}; skipping `{name}`");
            return Ok(None);
        }
        let (start, end) = match self.ring.allocate() {
            Ok(pair) => pair,
            Err(e) => return Err(self.report(e)),
        };

        let parent = self.session.top().map(|open| open.handle.zone);
        let resolved = match self.registry.resolve(call_site, name, parent, frame_id) {
            Ok(resolved) => resolved,
            Err(e) => return Err(self.report(e)),
        };
        let zone = resolved.zone;

        if let Some(node) = self.registry.get_mut(zone) {
            if resolved.called_count > 1 {
                self.diagnostics.duplicate_entries += 1;
                log::debug!(
                    "zone `{name}` entered {} times in frame {frame_id}; keeping the last entry",
                    resolved.called_count
                );
                if let Some([old_start, old_end]) = node.pending_queries {
                    if self.ring.bank_range().contains(&old_start) {
                        self.ring.unbind(old_start);
                        self.ring.unbind(old_end);
                    }
                }
            }
            node.pending_queries = Some([start, end]);
        }
        self.ring.bind(start, zone);
        self.ring.bind(end, zone);

        if let Some(backend) = self.backend.as_mut() {
            let binding = &mut self.streams[stream_idx];
            match target {
                Some(target) => binding.write_into(backend, target, frame_id, start, stage, true),
                None => binding.write(backend, frame_id, start, stage, true),
            };
        }

        let handle = ZoneHandle {
            zone,
            depth,
            frame_id,
            generation: self.generation,
        };
        self.session.push(OpenZone {
            handle,
            stream: stream_idx,
            stage,
            queries: [start, end],
        });
        Ok(Some(handle))
    }

    /// Closes `handle`, which must be the innermost open zone.
    pub fn exit_zone(&mut self, handle: ZoneHandle) -> Result<(), ProfilerError> {
        self.close_zone(handle, None)
    }

    /// Closes a zone opened with [`enter_zone_in`](Self::enter_zone_in),
    /// writing its end timestamp into `target`.
    pub fn exit_zone_in(
        &mut self,
        target: &mut B::Target,
        handle: ZoneHandle,
    ) -> Result<(), ProfilerError> {
        self.close_zone(handle, Some(target))
    }

    fn close_zone(
        &mut self,
        handle: ZoneHandle,
        target: Option<&mut B::Target>,
    ) -> Result<(), ProfilerError> {
        if self.backend.is_none() {
            return Ok(());
        }
        if let Err(e) = self.session.ensure_open("exit_zone") {
            return Err(self.report(e));
        }
        let open = match self.session.pop(handle) {
            Ok(open) => open,
            Err(e) => return Err(self.report(e)),
        };
        self.write_end(open, target);
        Ok(())
    }

    fn write_end(&mut self, open: OpenZone, target: Option<&mut B::Target>) {
        let Some(backend) = self.backend.as_mut() else {
            return;
        };
        let binding = &mut self.streams[open.stream];
        let (frame_id, end) = (open.handle.frame_id, open.queries[1]);
        match target {
            Some(target) => binding.write_into(backend, target, frame_id, end, open.stage, false),
            None => binding.write(backend, frame_id, end, open.stage, false),
        };
    }

    /// Closes the frame and submits every stream that recorded into it.
    ///
    /// Zones still open are closed here and reported once as
    /// [`ProfilerError::UnbalancedZone`]; the frame is submitted regardless.
    pub fn end_frame(&mut self) -> Result<(), ProfilerError> {
        if self.backend.is_none() {
            return Ok(());
        }
        let left_open = match self.session.end() {
            Ok(open) => open,
            Err(e) => return Err(self.report(e)),
        };
        let forced = left_open.len();
        for open in left_open {
            self.write_end(open, None);
        }

        let frame_id = self.session.frame_id();
        if let Some(backend) = self.backend.as_mut() {
            for stream in &mut self.streams {
                stream.submit(backend, frame_id);
            }
        }

        if forced > 0 {
            return Err(self.report(ProfilerError::UnbalancedZone {
                operation: "end_frame",
                open_zones: forced,
            }));
        }
        Ok(())
    }

    /// Resolves every submitted frame whose fence has signaled and returns
    /// the number of zones updated. Frames still executing are left for a
    /// later call.
    pub fn collect(&mut self) -> usize {
        let Some(backend) = self.backend.as_mut() else {
            return 0;
        };
        let mut finished = Vec::new();
        for stream in &mut self.streams {
            for slot in 0..SLOTS_PER_STREAM {
                match stream.read_slot(backend, slot) {
                    Readback::Ready(done) => finished.push(done),
                    Readback::Pending => self.diagnostics.deferred_collections += 1,
                    Readback::Empty => {}
                }
            }
        }
        // oldest first so the averaged timestamps stay monotonic
        finished.sort_by_key(|done| done.frame_id);
        finished
            .into_iter()
            .map(|done| self.apply_readback(done))
            .sum()
    }

    fn apply_readback(&mut self, done: FinishedSlot) -> usize {
        let period_ns = self
            .backend
            .as_ref()
            .map_or(0.0, |b| b.timestamp_period_ns());
        self.diagnostics.frames_collected += 1;

        let mut resolved = 0;
        for pair in done.pairs {
            self.ring.store(pair.start_id, pair.start);
            self.ring.store(pair.start_id + 1, pair.end);
            let zone = self.ring.take(pair.start_id);
            self.ring.take(pair.start_id + 1);

            let Some(node) = zone.and_then(|z| self.registry.get_mut(z)) else {
                continue;
            };
            if node.pending_queries == Some([pair.start_id, pair.start_id + 1]) {
                node.pending_queries = None;
            }
            if self.paused {
                continue;
            }
            node.record_resolution(pair.start, pair.end, period_ns);
            resolved += 1;
        }
        log::trace!("frame {}: {resolved} zone(s) resolved", done.frame_id);
        resolved
    }

    fn stream_for(&mut self, name: &str) -> Option<usize> {
        if let Some(&idx) = self.stream_index.get(name) {
            return Some(idx);
        }
        let backend = self.backend.as_mut()?;
        match CommandStreamBinding::new(backend, name) {
            Ok(binding) => {
                let idx = self.streams.len();
                self.streams.push(binding);
                self.stream_index.insert(name.to_string(), idx);
                log::debug!("created command stream `{name}`");
                Some(idx)
            }
            Err(e) => {
                log::error!("could not create command stream `{name}`: {e:#}");
                None
            }
        }
    }

    /// Recorder of `stream` for the frame being recorded, so callers can put
    /// their own GPU work between the zone timestamps.
    pub fn recorder_mut(&mut self, stream: &str) -> Option<&mut B::Recorder> {
        let idx = *self.stream_index.get(stream)?;
        let frame_id = self.session.frame_id();
        self.streams[idx].recording_recorder_mut(frame_id)
    }

    /// Drops the zone tree and every in-flight result. Streams are kept.
    pub fn clear(&mut self) -> Result<(), ProfilerError> {
        if self.session.state() != FrameState::Idle {
            let err = ProfilerError::InvalidState {
                operation: "clear",
                state: "inside a frame",
            };
            return Err(self.report(err));
        }
        if let Some(backend) = self.backend.as_mut() {
            for stream in &mut self.streams {
                for slot in 0..SLOTS_PER_STREAM {
                    stream.abandon_slot(backend, slot);
                }
            }
        }
        self.registry.clear();
        self.ring.clear();
        self.diagnostics = Diagnostics::default();
        self.generation = self.generation.wrapping_add(1);
        log::debug!("profiler cleared");
        Ok(())
    }

    pub fn snapshot(&self) -> ProfilerSnapshot {
        let period_ns = self
            .backend
            .as_ref()
            .map_or(0.0, |b| b.timestamp_period_ns());
        ProfilerSnapshot::capture(
            &self.registry,
            &self.session,
            period_ns,
            self.diagnostics.clone(),
            self.is_loaded(),
        )
    }

    /// Opens a zone on the default stream that closes when the guard drops.
    pub fn scope(&mut self, call_site: CallSite, name: &str) -> ScopedZone<'_, B> {
        self.scope_on(DEFAULT_STREAM, call_site, name)
    }

    pub fn scope_on(
        &mut self,
        stream: &str,
        call_site: CallSite,
        name: &str,
    ) -> ScopedZone<'_, B> {
        let handle = self.enter_zone_on(stream, call_site, name).ok().flatten();
        let stream = handle.and(self.session.top().map(|open| open.stream));
        ScopedZone {
            profiler: self,
            handle,
            stream,
        }
    }
}

/// Zone guard returned by [`GpuProfiler::scope`].
///
/// Derefs to the profiler so nested scopes are opened through the guard.
/// Skipped zones (errors, inactive profiler) hold no handle and do nothing
/// on drop.
pub struct ScopedZone<'a, B: TimestampBackend> {
    profiler: &'a mut GpuProfiler<B>,
    handle: Option<ZoneHandle>,
    stream: Option<usize>,
}

impl<B: TimestampBackend> ScopedZone<'_, B> {
    pub fn handle(&self) -> Option<ZoneHandle> {
        self.handle
    }

    /// Recorder the zone's timestamps go to.
    pub fn recorder_mut(&mut self) -> Option<&mut B::Recorder> {
        let idx = self.stream?;
        let frame_id = self.profiler.session.frame_id();
        self.profiler.streams[idx].recording_recorder_mut(frame_id)
    }
}

impl<B: TimestampBackend> Deref for ScopedZone<'_, B> {
    type Target = GpuProfiler<B>;
    fn deref(&self) -> &Self::Target {
        self.profiler
    }
}

impl<B: TimestampBackend> DerefMut for ScopedZone<'_, B> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.profiler
    }
}

impl<B: TimestampBackend> Drop for ScopedZone<'_, B> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            // already logged and counted by the profiler
            let _ = self.profiler.exit_zone(handle);
        }
    }
}

/// Opens a [`ScopedZone`] named after a literal or `format!` arguments,
/// keyed by the macro's own source location.
///
/// Bind the result (`let _zone = zone!(...)`); `let _ = ...` closes the zone
/// immediately.
#[macro_export]
macro_rules! zone {
    ($profiler:expr, $name:literal) => {
        $profiler.scope($crate::CallSite::new(file!(), line!(), column!()), $name)
    };
    ($profiler:expr, $($fmt:tt)+) => {
        $profiler.scope(
            $crate::CallSite::new(file!(), line!(), column!()),
            &format!($($fmt)+),
        )
    };
}
