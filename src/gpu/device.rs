use std::sync::Arc;

use anyhow::{Result, anyhow};

/// Device/queue pair the wgpu backend records into.
///
/// Owned by whoever owns the rendering context; there is no process-wide
/// instance.
pub struct GpuDeviceCtx {
    pub device: Arc<wgpu::Device>,
    pub queue: Arc<wgpu::Queue>,
    pub adapter_name: String,
    pub timers_supported: bool,
}

/// Features the wgpu backend needs to write timestamps between commands.
pub const TIMER_FEATURES: wgpu::Features =
    wgpu::Features::TIMESTAMP_QUERY.union(wgpu::Features::TIMESTAMP_QUERY_INSIDE_ENCODERS);

fn backends_from_env() -> wgpu::Backends {
    match std::env::var("GPUZONES_BACKEND")
        .unwrap_or_else(|_| "auto".into())
        .to_ascii_lowercase()
        .as_str()
    {
        "vulkan" | "vk" => wgpu::Backends::VULKAN,
        "dx12" => wgpu::Backends::DX12,
        "metal" | "mtl" => wgpu::Backends::METAL,
        "gl" => wgpu::Backends::GL,
        _ => wgpu::Backends::all(),
    }
}

pub async fn request_context() -> Result<GpuDeviceCtx> {
    let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends: backends_from_env(),
        ..Default::default()
    });

    let adapter = instance
        .request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        })
        .await
        .map_err(|e| anyhow!("no suitable GPU adapter: {e}"))?;

    let adapter_features = adapter.features();
    let timers_supported = adapter_features.contains(TIMER_FEATURES);
    // Only ask for what the adapter has so the device still comes up without
    // timers; the profiler then reports itself as not loaded.
    let required_features = adapter_features & TIMER_FEATURES;

    let (device, queue) = adapter
        .request_device(&wgpu::DeviceDescriptor {
            label: Some("gpuzones_device"),
            required_features,
            required_limits: wgpu::Limits::defaults(),
            memory_hints: wgpu::MemoryHints::default(),
            trace: wgpu::Trace::default(),
        })
        .await
        .map_err(|e| anyhow!("failed to create wgpu device: {e}"))?;

    device.on_uncaptured_error(Box::new(|e| {
        log::error!("[wgpu uncaptured] {e:?}");
    }));

    let adapter_name = adapter.get_info().name;
    log::debug!("using adapter `{adapter_name}` (timestamp queries: {timers_supported})");

    Ok(GpuDeviceCtx {
        device: Arc::new(device),
        queue: Arc::new(queue),
        adapter_name,
        timers_supported,
    })
}

pub fn create_context() -> Result<GpuDeviceCtx> {
    pollster::block_on(request_context())
}
