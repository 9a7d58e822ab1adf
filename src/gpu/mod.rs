//! wgpu device layer for the profiler

pub mod buffers;
pub mod device;
pub mod timer;

pub use device::{GpuDeviceCtx, create_context, request_context};
pub use timer::{WgpuBackend, WgpuRecorder};
