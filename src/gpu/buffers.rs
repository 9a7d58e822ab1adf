use std::ops::Deref;

/// A `wgpu::Buffer` sized for a number of 8-byte query results.
pub struct QueryBuffer {
    pub buffer: wgpu::Buffer,
    /// total allocated size in bytes
    pub byte_size: u64,
    /// number of query results it can hold
    pub count: u32,
}

impl Deref for QueryBuffer {
    type Target = wgpu::Buffer;
    fn deref(&self) -> &Self::Target {
        &self.buffer
    }
}

pub fn query_bytes(count: u32) -> u64 {
    count as u64 * wgpu::QUERY_SIZE as u64
}

fn query_buffer(
    device: &wgpu::Device,
    label: &str,
    count: u32,
    usage: wgpu::BufferUsages,
) -> QueryBuffer {
    let byte_size = query_bytes(count);
    let buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        size: byte_size,
        usage,
        mapped_at_creation: false,
    });
    QueryBuffer {
        buffer,
        byte_size,
        count,
    }
}

/// Destination of `resolve_query_set`; only ever copied from.
pub fn resolve_buffer(device: &wgpu::Device, label: &str, count: u32) -> QueryBuffer {
    query_buffer(
        device,
        label,
        count,
        wgpu::BufferUsages::QUERY_RESOLVE | wgpu::BufferUsages::COPY_SRC,
    )
}

/// CPU-mappable copy of a resolve buffer.
pub fn readback_buffer(device: &wgpu::Device, label: &str, count: u32) -> QueryBuffer {
    query_buffer(
        device,
        label,
        count,
        wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
    )
}

/// Little-endian u64 timestamps, one per 8 bytes; a trailing partial chunk is ignored.
pub fn decode_timestamps(bytes: &[u8]) -> Vec<u64> {
    let mut vals = Vec::with_capacity(bytes.len() / 8);
    for chunk in bytes.chunks_exact(8) {
        let mut arr = [0u8; 8];
        arr.copy_from_slice(chunk);
        vals.push(u64::from_le_bytes(arr));
    }
    vals
}
