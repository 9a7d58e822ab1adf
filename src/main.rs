// src/main.rs
//! Records a few nested zones around buffer clears and copies, then prints
//! the averaged tree. `gpuzones [frames]`; set `GPUZONES_DUMP_JSON=1` for
//! the snapshot as JSON.

use anyhow::Result;
use gpuzones::{
    CallSite,
    DEFAULT_STREAM,
    GpuProfiler,
    ProfilerConfig,
    gpu::{self, WgpuBackend},
    zone,
};

const SCRATCH_BYTES: u64 = 16 << 20;

fn scratch_buffer(device: &wgpu::Device, label: &str) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        size: SCRATCH_BYTES,
        usage: wgpu::BufferUsages::COPY_SRC | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let frames: u64 = std::env::args()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .unwrap_or(120);

    let config = ProfilerConfig::default().with_env_overrides();
    let ctx = gpu::request_context().await?;
    log::info!("adapter: {}", ctx.adapter_name);

    let src = scratch_buffer(&ctx.device, "gpuzones.demo.src");
    let dst = scratch_buffer(&ctx.device, "gpuzones.demo.dst");

    let backend = WgpuBackend::new(&ctx, config.query_pool_size());
    let mut profiler = GpuProfiler::new(config, backend);
    if !profiler.is_loaded() {
        log::warn!("timestamps unavailable on this adapter; zones will not be timed");
    }

    #[cfg(feature = "graphics_debugger")]
    unsafe {
        ctx.device.start_graphics_debugger_capture()
    };

    for frame in 0..frames {
        profiler.begin_frame(&format!("demo {frame}"))?;
        {
            let mut root = zone!(profiler, "frame");
            {
                let mut clear = zone!(root, "clear");
                if let Some(enc) = clear.recorder_mut().and_then(|r| r.encoder_mut()) {
                    enc.clear_buffer(&src, 0, None);
                }
            }
            for pass in 0..3 {
                let mut copy = zone!(root, "copy {}", pass);
                if let Some(enc) = copy.recorder_mut().and_then(|r| r.encoder_mut()) {
                    enc.copy_buffer_to_buffer(&src, 0, &dst, 0, SCRATCH_BYTES);
                }
            }
        }

        // work recorded and submitted by the application itself
        let mut upload = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("gpuzones.demo.upload"),
            });
        let handle =
            profiler.enter_zone_in(&mut upload, DEFAULT_STREAM, CallSite::caller(), "upload")?;
        upload.copy_buffer_to_buffer(&dst, 0, &src, 0, SCRATCH_BYTES);
        if let Some(handle) = handle {
            profiler.exit_zone_in(&mut upload, handle)?;
        }
        ctx.queue.submit(Some(upload.finish()));

        profiler.end_frame()?;
        profiler.collect();

        if frame % 30 == 29 {
            profiler.snapshot().log_summary();
        }
    }

    #[cfg(feature = "graphics_debugger")]
    unsafe {
        ctx.device.stop_graphics_debugger_capture()
    };

    let _ = ctx.device.poll(wgpu::PollType::Wait);
    profiler.collect();

    let snapshot = profiler.snapshot();
    snapshot.log_summary();
    let d = &snapshot.diagnostics;
    log::info!(
        "frames begun {} collected {} dropped {} deferred collects {} skipped zones {}",
        d.frames_begun,
        d.frames_collected,
        d.dropped_frames,
        d.deferred_collections,
        d.skipped_zones
    );
    if std::env::var("GPUZONES_DUMP_JSON").is_ok() {
        println!("{}", snapshot.to_json()?);
    }
    Ok(())
}
