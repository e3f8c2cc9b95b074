//! cubecl-backed device memory and FFT engine.

mod butterfly;
mod engine;

pub use butterfly::bit_reverse;
pub use engine::{CubeclBuffer, CubeclDescription, CubeclEngine, CubeclMemory};

// The general advice for WebGPU is to choose a workgroup size of 64
// Common sizes are 32, 64, 128, 256, or 512 threads per workgroup.
// Apple Metal supports a maximum workgroup size of 1024 threads.
pub(crate) const WORKGROUP_SIZE: u32 = 1024;

/// log2 of the elements one workgroup transforms in shared memory.
pub(crate) const TILE_BITS: usize = 10;
pub(crate) const TILE_SIZE: usize = 1 << TILE_BITS;

#[cfg(feature = "cuda")]
pub type DefaultRuntime = cubecl::cuda::CudaRuntime;

#[cfg(all(feature = "wgpu", not(feature = "cuda")))]
pub type DefaultRuntime = cubecl::wgpu::WgpuRuntime;

/// Engine on the default device of the enabled runtime.
///
/// ```no_run
/// use gpu_fft_accuracy::gpu::default_engine;
/// let engine = default_engine(1 << 30);
/// ```
#[must_use]
pub fn default_engine(capacity: u64) -> CubeclEngine<DefaultRuntime> {
    CubeclEngine::new(CubeclMemory::new(&Default::default(), capacity))
}
