//! Runs the real wgpu backend when an adapter with timestamp support exists.

use gpuzones::{
    CallSite,
    DEFAULT_STREAM,
    GpuProfiler,
    ProfilerConfig,
    gpu::{WgpuBackend, buffers::decode_timestamps, create_context},
    zone,
};

#[test]
fn decode_little_endian_timestamps() {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&1u64.to_le_bytes());
    bytes.extend_from_slice(&0x0102_0304_0506_0708u64.to_le_bytes());
    bytes.extend_from_slice(&[0xff; 3]);
    assert_eq!(decode_timestamps(&bytes), vec![1, 0x0102_0304_0506_0708]);
}

#[test]
fn wgpu_backend_resolves_nested_zones() {
    let ctx = match create_context() {
        Ok(ctx) => ctx,
        Err(e) => {
            eprintln!("skipping: {e:#}");
            return;
        }
    };
    if !ctx.timers_supported {
        eprintln!("skipping: `{}` has no encoder timestamps", ctx.adapter_name);
        return;
    }

    let config = ProfilerConfig {
        max_query_count: 16,
        ..Default::default()
    };
    let backend = WgpuBackend::new(&ctx, config.query_pool_size()).expect("wgpu backend");
    let mut p = GpuProfiler::new(config, Ok(backend));
    assert!(p.is_loaded());

    let scratch = ctx.device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("smoke.scratch"),
        size: 1 << 20,
        usage: wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });

    for _ in 0..3 {
        p.begin_frame("smoke").unwrap();
        {
            let mut root = zone!(p, "root");
            let mut clear = zone!(root, "clear");
            if let Some(enc) = clear.recorder_mut().and_then(|r| r.encoder_mut()) {
                enc.clear_buffer(&scratch, 0, None);
            }
        }
        let mut own = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor::default());
        let handle = p
            .enter_zone_in(&mut own, DEFAULT_STREAM, CallSite::from_raw(1), "own")
            .unwrap()
            .unwrap();
        own.clear_buffer(&scratch, 0, None);
        p.exit_zone_in(&mut own, handle).unwrap();
        ctx.queue.submit(Some(own.finish()));
        p.end_frame().unwrap();
        let _ = ctx.device.poll(wgpu::PollType::Wait);
        p.collect();
    }

    let snap = p.snapshot();
    let clear = snap.find(&["root", "clear"]).expect("clear zone");
    assert_eq!(clear.resolved_count, 3, "{snap:#?}");
    assert!(clear.end_timestamp >= clear.start_timestamp);
    let root = snap.find(&["root"]).unwrap();
    assert!(root.start_timestamp <= clear.start_timestamp);
    let own = snap.find(&["own"]).expect("caller encoder zone");
    assert_eq!(own.resolved_count, 3, "{snap:#?}");
    assert!(own.end_timestamp >= own.start_timestamp);
    assert_eq!(p.diagnostics().unbalanced_zones, 0);
    assert_eq!(p.diagnostics().dropped_frames, 0);
}
