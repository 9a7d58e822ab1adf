//! wgpu implementation of [`TimestampBackend`].
//!
//! One timestamp query set covers both ring banks. Every recorder owns a
//! command encoder plus its own resolve/readback buffers, so two frames can
//! be in flight per stream without sharing staging memory. The map callback
//! flips an atomic flag that stands in for the fence.

use std::{
    ops::Range,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use anyhow::{Result, anyhow, bail};

use super::{
    buffers::{QueryBuffer, decode_timestamps, query_bytes, readback_buffer, resolve_buffer},
    device::GpuDeviceCtx,
};
use crate::backend::{PipelineStage, TimestampBackend};

pub struct WgpuBackend {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    query_set: wgpu::QuerySet,
    query_count: u32,
    period_in_nanoseconds: f32,
}

pub struct WgpuRecorder {
    label: String,
    encoder: Option<wgpu::CommandEncoder>,
    resolve: QueryBuffer,
    readback: QueryBuffer,
    mapped: Arc<AtomicBool>,
    map_failed: Arc<AtomicBool>,
    /// Range resolved by the last submission, until it is read or discarded.
    in_flight: Option<Range<u32>>,
}

impl WgpuRecorder {
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Encoder of the frame being recorded. Work encoded here lands between
    /// the zone's start and end timestamps.
    pub fn encoder_mut(&mut self) -> Option<&mut wgpu::CommandEncoder> {
        self.encoder.as_mut()
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }
}

impl WgpuBackend {
    /// `query_count` is the whole pool, both banks included.
    pub fn new(ctx: &GpuDeviceCtx, query_count: u32) -> Result<Self> {
        if !ctx.timers_supported {
            bail!(
                "adapter `{}` cannot write timestamps inside command encoders",
                ctx.adapter_name
            );
        }
        if query_count == 0 || query_count > wgpu::QUERY_SET_MAX_QUERIES {
            bail!(
                "query pool of {query_count} is outside 1..={}",
                wgpu::QUERY_SET_MAX_QUERIES
            );
        }

        ctx.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let query_set = ctx.device.create_query_set(&wgpu::QuerySetDescriptor {
            label: Some("gpuzones.timestamps"),
            ty: wgpu::QueryType::Timestamp,
            count: query_count,
        });
        if let Some(err) = pollster::block_on(ctx.device.pop_error_scope()) {
            return Err(anyhow!("creating timestamp query set failed: {err}"));
        }

        Ok(Self {
            device: ctx.device.clone(),
            queue: ctx.queue.clone(),
            query_set,
            query_count,
            period_in_nanoseconds: ctx.queue.get_timestamp_period(),
        })
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn query_count(&self) -> u32 {
        self.query_count
    }
}

impl TimestampBackend for WgpuBackend {
    type Recorder = WgpuRecorder;
    type Target = wgpu::CommandEncoder;

    fn create_recorder(&mut self, stream: &str, slot: usize) -> Result<WgpuRecorder> {
        let label = format!("gpuzones.{stream}.{slot}");
        let resolve_label = format!("{label}.resolve");
        let readback_label = format!("{label}.readback");
        Ok(WgpuRecorder {
            resolve: resolve_buffer(&self.device, &resolve_label, self.query_count),
            readback: readback_buffer(&self.device, &readback_label, self.query_count),
            label,
            encoder: None,
            mapped: Arc::new(AtomicBool::new(false)),
            map_failed: Arc::new(AtomicBool::new(false)),
            in_flight: None,
        })
    }

    fn begin(&mut self, recorder: &mut WgpuRecorder) {
        if recorder.encoder.is_none() {
            let desc = wgpu::CommandEncoderDescriptor {
                label: Some(&recorder.label),
            };
            recorder.encoder = Some(self.device.create_command_encoder(&desc));
        }
    }

    // wgpu only exposes end-of-previous-work timestamps between passes, so
    // both stages map to the same write.
    fn write_timestamp(
        &mut self,
        recorder: &mut WgpuRecorder,
        query_id: u32,
        _stage: PipelineStage,
    ) {
        match recorder.encoder.as_mut() {
            Some(enc) => enc.write_timestamp(&self.query_set, query_id),
            None => log::warn!(
                "{}: timestamp {query_id} written before begin",
                recorder.label
            ),
        }
    }

    fn write_timestamp_into(
        &mut self,
        target: &mut wgpu::CommandEncoder,
        query_id: u32,
        _stage: PipelineStage,
    ) {
        target.write_timestamp(&self.query_set, query_id);
    }

    fn submit(&mut self, recorder: &mut WgpuRecorder, queries: Range<u32>) {
        let Some(mut enc) = recorder.encoder.take() else {
            log::warn!("{}: submit without an open encoder", recorder.label);
            return;
        };
        let bytes = query_bytes(queries.len() as u32);
        enc.resolve_query_set(&self.query_set, queries.clone(), &recorder.resolve, 0);
        enc.copy_buffer_to_buffer(&recorder.resolve, 0, &recorder.readback, 0, bytes);
        self.queue.submit(Some(enc.finish()));

        // one pair of flags per submission
        recorder.mapped = Arc::new(AtomicBool::new(false));
        recorder.map_failed = Arc::new(AtomicBool::new(false));
        let mapped = recorder.mapped.clone();
        let failed = recorder.map_failed.clone();
        let label = recorder.label.clone();
        recorder
            .readback
            .slice(..bytes)
            .map_async(wgpu::MapMode::Read, move |res| {
                if let Err(e) = res {
                    log::error!("{label}: mapping timestamp readback failed: {e}");
                    failed.store(true, Ordering::Release);
                }
                mapped.store(true, Ordering::Release);
            });
        recorder.in_flight = Some(queries);
    }

    fn results_ready(&self, recorder: &WgpuRecorder) -> bool {
        if recorder.in_flight.is_none() {
            return false;
        }
        if !recorder.mapped.load(Ordering::Acquire) {
            let _ = self.device.poll(wgpu::PollType::Poll);
        }
        recorder.mapped.load(Ordering::Acquire)
    }

    fn read_query_values(
        &mut self,
        recorder: &mut WgpuRecorder,
        queries: Range<u32>,
    ) -> Result<Vec<u64>> {
        let Some(in_flight) = recorder.in_flight.take() else {
            bail!("{}: nothing was submitted", recorder.label);
        };
        recorder.mapped.store(false, Ordering::Release);
        if recorder.map_failed.swap(false, Ordering::AcqRel) {
            bail!("{}: readback buffer could not be mapped", recorder.label);
        }
        if in_flight != queries {
            recorder.readback.unmap();
            bail!(
                "{}: asked for {queries:?} but {in_flight:?} was resolved",
                recorder.label
            );
        }

        let bytes = query_bytes(in_flight.len() as u32);
        let data = recorder.readback.slice(..bytes).get_mapped_range();
        let vals = decode_timestamps(&data);
        drop(data);
        recorder.readback.unmap();
        Ok(vals)
    }

    fn discard(&mut self, recorder: &mut WgpuRecorder) {
        recorder.encoder = None;
        if recorder.in_flight.take().is_none() {
            return;
        }
        if !recorder.mapped.swap(false, Ordering::AcqRel) {
            log::warn!(
                "{}: discarded while its readback was still pending",
                recorder.label
            );
            return;
        }
        if !recorder.map_failed.swap(false, Ordering::AcqRel) {
            recorder.readback.unmap();
        }
    }

    fn timestamp_period_ns(&self) -> f32 {
        self.period_in_nanoseconds
    }
}
