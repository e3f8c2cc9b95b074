//! [`DeviceMemory`] and [`FftEngine`] over a cubecl compute client.
//!
//! Buffers live in cubecl-managed memory under a fixed byte budget. The engine
//! stages strided data into contiguous lines on the host, bit-reverses them and
//! runs the radix-2 kernels once per axis, single precision only.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use cubecl::client::ComputeClient;
use cubecl::prelude::*;
use cubecl::server::Handle;
use num_complex::Complex64;
use tracing::debug;

use super::butterfly::{bit_reverse, butterfly_lines_inner, butterfly_lines_stage};
use super::{TILE_BITS, TILE_SIZE, WORKGROUP_SIZE};
use crate::buffer::HostBufferSet;
use crate::device::{DeviceMemory, DeviceStatus, EngineStatus, FftEngine, PlanLayout, PlanRequest};
use crate::problem::{ArrayType, Placement, Precision, TransformKind};
use crate::staging::{check_buffer_count, StagedPlan};
use crate::transform::{hermitian_expand, hermitian_pack};

/// One allocation in cubecl-managed memory.
///
/// cubecl handles are immutable once created, so a host → device copy swaps
/// a fresh handle into the slot.
#[derive(Debug, Clone)]
pub struct CubeclBuffer {
    slot: Arc<Mutex<Handle>>,
    bytes: usize,
}

impl CubeclBuffer {
    fn handle(&self) -> Handle {
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).clone()
    }

    fn replace(&self, handle: Handle) {
        *self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = handle;
    }
}

/// [`DeviceMemory`] over a cubecl compute client, bounded by a byte budget.
pub struct CubeclMemory<R: Runtime> {
    client: ComputeClient<R>,
    capacity: u64,
    in_use: AtomicU64,
}

impl<R: Runtime> CubeclMemory<R> {
    /// Memory on `device` allowing at most `capacity` bytes of live buffers.
    pub fn new(device: &R::Device, capacity: u64) -> Self {
        CubeclMemory {
            client: R::client(device),
            capacity,
            in_use: AtomicU64::new(0),
        }
    }

    pub fn client(&self) -> &ComputeClient<R> {
        &self.client
    }
}

impl<R: Runtime> fmt::Debug for CubeclMemory<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CubeclMemory")
            .field("capacity", &self.capacity)
            .field("in_use", &self.in_use.load(Ordering::Relaxed))
            .finish()
    }
}

impl<R: Runtime> DeviceMemory for CubeclMemory<R> {
    type Handle = CubeclBuffer;

    fn allocate(&self, bytes: usize) -> Result<CubeclBuffer, DeviceStatus> {
        let requested = bytes as u64;
        self.in_use
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                (used + requested <= self.capacity).then_some(used + requested)
            })
            .map_err(|_| DeviceStatus::OutOfMemory { requested: bytes })?;
        Ok(CubeclBuffer {
            slot: Arc::new(Mutex::new(self.client.empty(bytes.max(1)))),
            bytes,
        })
    }

    fn copy_to_device(&self, dst: &CubeclBuffer, src: &[u8]) -> Result<(), DeviceStatus> {
        if src.len() != dst.bytes {
            return Err(DeviceStatus::SizeMismatch {
                buffer: dst.bytes,
                transfer: src.len(),
            });
        }
        dst.replace(self.client.create_from_slice(src));
        Ok(())
    }

    fn copy_to_host(&self, src: &CubeclBuffer, dst: &mut [u8]) -> Result<(), DeviceStatus> {
        if dst.len() != src.bytes {
            return Err(DeviceStatus::SizeMismatch {
                buffer: src.bytes,
                transfer: dst.len(),
            });
        }
        let bytes = self.client.read_one(src.handle());
        let contents = bytes.get(..src.bytes).ok_or(DeviceStatus::SizeMismatch {
            buffer: src.bytes,
            transfer: bytes.len(),
        })?;
        dst.copy_from_slice(contents);
        Ok(())
    }

    fn free(&self, handle: CubeclBuffer) {
        self.in_use.fetch_sub(handle.bytes as u64, Ordering::AcqRel);
    }

    fn available_bytes(&self) -> u64 {
        self.capacity.saturating_sub(self.in_use.load(Ordering::Acquire))
    }
}

#[derive(Debug, Default)]
pub struct CubeclDescription {
    layout: Option<PlanLayout>,
}

/// Radix-2 engine running the butterfly kernels along every axis.
///
/// Single precision, power-of-two lengths only; anything else is rejected at
/// plan creation with [`EngineStatus::InvalidArgValue`].
pub struct CubeclEngine<R: Runtime> {
    memory: CubeclMemory<R>,
}

impl<R: Runtime> CubeclEngine<R> {
    pub fn new(memory: CubeclMemory<R>) -> Self {
        CubeclEngine { memory }
    }

    fn load(
        &self,
        handles: &[CubeclBuffer],
        array_type: ArrayType,
    ) -> Result<HostBufferSet, EngineStatus> {
        check_buffer_count(handles, array_type)?;
        let mut set = HostBufferSet::zeroed(Precision::Single, array_type, 0, 0);
        for (i, handle) in handles.iter().enumerate() {
            let mut bytes = vec![0u8; handle.bytes];
            self.memory.copy_to_host(handle, &mut bytes)?;
            set.decode(i, &bytes);
        }
        Ok(set)
    }

    /// Unnormalized complex transform of `batch` contiguous row-major arrays, axis by axis.
    fn complex(
        &self,
        data: &mut [Complex64],
        shape: &[usize],
        forward: bool,
    ) -> Result<(), EngineStatus> {
        let total: usize = shape.iter().product();
        let count = data.len();
        for (axis, &n) in shape.iter().enumerate() {
            if n <= 1 {
                continue;
            }
            let bits = n.ilog2();
            let stride: usize = shape[axis + 1..].iter().product();
            let outer = total / (n * stride);
            let lines = count / n;

            // Gather each line contiguously in bit-reversed order.
            let mut real = vec![0.0f32; count];
            let mut imag = vec![0.0f32; count];
            let mut line = 0;
            for signal in 0..count / total {
                for o in 0..outer {
                    for inner in 0..stride {
                        let base = signal * total + o * n * stride + inner;
                        for k in 0..n {
                            let v = data[base + k * stride];
                            let at = line * n + bit_reverse(k, bits);
                            real[at] = v.re as f32;
                            imag[at] = v.im as f32;
                        }
                        line += 1;
                    }
                }
            }

            let (real, imag) = self.butterflies(&real, &imag, n, lines, forward)?;

            let mut line = 0;
            for signal in 0..count / total {
                for o in 0..outer {
                    for inner in 0..stride {
                        let base = signal * total + o * n * stride + inner;
                        for k in 0..n {
                            let at = line * n + k;
                            data[base + k * stride] =
                                Complex64::new(f64::from(real[at]), f64::from(imag[at]));
                        }
                        line += 1;
                    }
                }
            }
        }
        Ok(())
    }

    /// Runs all `log2(n)` stages over `lines` bit-reversed lines of length `n`.
    fn butterflies(
        &self,
        real: &[f32],
        imag: &[f32],
        n: usize,
        lines: usize,
        forward: bool,
    ) -> Result<(Vec<f32>, Vec<f32>), EngineStatus> {
        let client = &self.memory.client;
        let len = n * lines;
        let real_handle = client.create_from_slice(f32::as_bytes(real));
        let imag_handle = client.create_from_slice(f32::as_bytes(imag));
        let launch_error = |e: cubecl::server::LaunchError| {
            EngineStatus::Failure(format!("kernel launch failed: {e}"))
        };

        let m = n.ilog2() as usize;
        let inner_stages = m.min(TILE_BITS);
        let tile = TILE_SIZE.min(n);
        let slices = ((n / tile) * lines) as u32;
        debug!(n, lines, inner_stages, outer_stages = m - inner_stages, "launching butterflies");

        unsafe {
            butterfly_lines_inner::launch::<f32, R>(
                client,
                CubeCount::Static(slices, 1, 1),
                CubeDim::new_1d((tile / 2) as u32),
                ArrayArg::from_raw_parts::<f32>(&real_handle, len, 1),
                ArrayArg::from_raw_parts::<f32>(&imag_handle, len, 1),
                n,
                tile,
                inner_stages,
                forward,
            )
            .map_err(launch_error)?;
        }

        let outer_wg = (lines * n / 2).div_ceil(WORKGROUP_SIZE as usize) as u32;
        for s in inner_stages..m {
            unsafe {
                butterfly_lines_stage::launch::<f32, R>(
                    client,
                    CubeCount::Static(outer_wg, 1, 1),
                    CubeDim::new_1d(WORKGROUP_SIZE),
                    ArrayArg::from_raw_parts::<f32>(&real_handle, len, 1),
                    ArrayArg::from_raw_parts::<f32>(&imag_handle, len, 1),
                    n,
                    1_usize << s,
                    lines,
                    forward,
                )
                .map_err(launch_error)?;
            }
        }

        let real_out = f32::from_bytes(&client.read_one(real_handle)).to_vec();
        let imag_out = f32::from_bytes(&client.read_one(imag_handle)).to_vec();
        Ok((real_out, imag_out))
    }
}

impl<R: Runtime> FftEngine for CubeclEngine<R> {
    type Memory = CubeclMemory<R>;
    type Description = CubeclDescription;
    type Plan = StagedPlan;
    type ExecutionInfo = ();

    fn memory(&self) -> &CubeclMemory<R> {
        &self.memory
    }

    fn create_description(&self) -> Result<CubeclDescription, EngineStatus> {
        Ok(CubeclDescription::default())
    }

    fn set_data_layout(
        &self,
        description: &mut CubeclDescription,
        layout: &PlanLayout,
    ) -> Result<(), EngineStatus> {
        if layout.ioffset != [0, 0] || layout.ooffset != [0, 0] {
            return Err(EngineStatus::InvalidArgValue("non-zero buffer offsets".into()));
        }
        description.layout = Some(layout.clone());
        Ok(())
    }

    fn create_plan(
        &self,
        request: PlanRequest<'_>,
        description: &CubeclDescription,
    ) -> Result<StagedPlan, EngineStatus> {
        if request.precision != Precision::Single {
            return Err(EngineStatus::InvalidArgValue("only single precision is supported".into()));
        }
        if let Some(n) = request.lengths_cm.iter().find(|n| !n.is_power_of_two()) {
            return Err(EngineStatus::InvalidArgValue(format!("length {n} is not a power of two")));
        }
        StagedPlan::new(request, description.layout.as_ref())
    }

    fn work_buffer_size(&self, _plan: &StagedPlan) -> Result<usize, EngineStatus> {
        Ok(0)
    }

    fn create_execution_info(&self) -> Result<(), EngineStatus> {
        Ok(())
    }

    fn set_work_buffer(
        &self,
        _info: &mut (),
        _buffer: &CubeclBuffer,
        _bytes: usize,
    ) -> Result<(), EngineStatus> {
        Ok(())
    }

    fn execute(
        &self,
        plan: &StagedPlan,
        inputs: &[CubeclBuffer],
        outputs: &[CubeclBuffer],
        _info: &(),
    ) -> Result<(), EngineStatus> {
        let outputs = match plan.placement {
            Placement::InPlace => inputs,
            Placement::NotInPlace => outputs,
        };
        let input = self.load(inputs, plan.layout.itype)?;
        let mut output = self.load(outputs, plan.layout.otype)?;
        let mut data = plan.gather(&input)?;
        let shape = &plan.shape;

        let result = match plan.kind {
            TransformKind::ComplexForward | TransformKind::ComplexInverse => {
                self.complex(&mut data, shape, plan.kind == TransformKind::ComplexForward)?;
                data
            }
            TransformKind::RealForward => {
                self.complex(&mut data, shape, true)?;
                hermitian_pack(&data, shape, plan.batch)
            }
            TransformKind::RealInverse => {
                let mut full = hermitian_expand(&data, shape, plan.batch);
                self.complex(&mut full, shape, false)?;
                full.into_iter().map(|v| Complex64::new(v.re, 0.0)).collect()
            }
        };

        plan.scatter(&result, &mut output)?;
        for (i, handle) in outputs.iter().enumerate() {
            self.memory
                .copy_to_device(handle, &output.encode(i))
                .map_err(EngineStatus::Device)?;
        }
        Ok(())
    }

    fn destroy_plan(&self, _plan: StagedPlan) {}

    fn destroy_description(&self, _description: CubeclDescription) {}

    fn destroy_execution_info(&self, _info: ()) {}
}
