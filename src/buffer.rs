//! Host and device buffers for one accuracy-test invocation.
//!
//! A logical array lives in one buffer (interleaved complex, Hermitian or
//! real data) or two (planar: real components in buffer 0, imaginary in
//! buffer 1). Host buffers keep values as `f64` components and encode them at
//! the problem's precision only when crossing to the device, so single
//! precision data is rounded exactly once.
//!
//! Device buffers are guards: dropping a [`DeviceBuffer`] frees it, and a
//! [`DeviceBufferSet`] that fails halfway through allocation releases what it
//! already acquired.

use std::fmt::Write as _;

use num_complex::Complex64;

use crate::device::{DeviceMemory, DeviceStatus};
use crate::layout::{offset, walk};
use crate::problem::{ArrayType, Precision};

/// Byte size of every buffer of an array with `dist` elements per batch.
#[must_use]
pub fn buffer_sizes(
    precision: Precision,
    array_type: ArrayType,
    dist: usize,
    batch: usize,
) -> Vec<usize> {
    vec![dist * batch * array_type.element_bytes(precision); array_type.buffer_count()]
}

/// Elements per batch of `array_type` that fill a buffer of `bytes` exactly.
///
/// Sizes the host side of a buffer shared by an in-place transform, where the
/// input and output views can need different extents.
#[must_use]
pub fn covering_dist(
    precision: Precision,
    array_type: ArrayType,
    bytes: usize,
    batch: usize,
) -> usize {
    bytes / (batch * array_type.element_bytes(precision))
}

/// One logical array resident on the host.
#[derive(Debug, Clone, PartialEq)]
pub struct HostBufferSet {
    precision: Precision,
    array_type: ArrayType,
    buffers: Vec<Vec<f64>>,
}

impl HostBufferSet {
    /// Zero-filled storage for `batch` arrays spaced `dist` elements apart.
    #[must_use]
    pub fn zeroed(precision: Precision, array_type: ArrayType, dist: usize, batch: usize) -> Self {
        let components = if array_type.is_interleaved() { 2 } else { 1 };
        HostBufferSet {
            precision,
            array_type,
            buffers: vec![vec![0.0; dist * batch * components]; array_type.buffer_count()],
        }
    }

    pub fn precision(&self) -> Precision {
        self.precision
    }

    pub fn array_type(&self) -> ArrayType {
        self.array_type
    }

    pub fn buffer_count(&self) -> usize {
        self.buffers.len()
    }

    /// Raw components of buffer `index`.
    pub fn components(&self, index: usize) -> &[f64] {
        &self.buffers[index]
    }

    /// Byte size of each buffer at the set's precision.
    #[must_use]
    pub fn byte_sizes(&self) -> Vec<usize> {
        self.buffers
            .iter()
            .map(|b| b.len() * self.precision.real_bytes())
            .collect()
    }

    /// Element at `offset`; real arrays read back with a zero imaginary part.
    #[must_use]
    pub fn get(&self, offset: usize) -> Complex64 {
        match self.array_type {
            ArrayType::ComplexInterleaved | ArrayType::HermitianInterleaved => {
                Complex64::new(self.buffers[0][2 * offset], self.buffers[0][2 * offset + 1])
            }
            ArrayType::ComplexPlanar | ArrayType::HermitianPlanar => {
                Complex64::new(self.buffers[0][offset], self.buffers[1][offset])
            }
            ArrayType::Real | ArrayType::Unset => Complex64::new(self.buffers[0][offset], 0.0),
        }
    }

    /// Stores `value` at `offset`; real arrays keep only the real part.
    pub fn set(&mut self, offset: usize, value: Complex64) {
        match self.array_type {
            ArrayType::ComplexInterleaved | ArrayType::HermitianInterleaved => {
                self.buffers[0][2 * offset] = value.re;
                self.buffers[0][2 * offset + 1] = value.im;
            }
            ArrayType::ComplexPlanar | ArrayType::HermitianPlanar => {
                self.buffers[0][offset] = value.re;
                self.buffers[1][offset] = value.im;
            }
            ArrayType::Real | ArrayType::Unset => self.buffers[0][offset] = value.re,
        }
    }

    /// Native-endian bytes of buffer `index` at the set's precision.
    #[must_use]
    pub fn encode(&self, index: usize) -> Vec<u8> {
        encode(self.precision, &self.buffers[index])
    }

    /// Replaces buffer `index` with values decoded from `bytes`.
    pub fn decode(&mut self, index: usize, bytes: &[u8]) {
        self.buffers[index] = decode(self.precision, bytes);
    }
}

/// Encodes `values` as native-endian floats of `precision`.
#[must_use]
pub fn encode(precision: Precision, values: &[f64]) -> Vec<u8> {
    match precision {
        Precision::Single => values.iter().flat_map(|&v| (v as f32).to_ne_bytes()).collect(),
        Precision::Double => values.iter().flat_map(|&v| v.to_ne_bytes()).collect(),
    }
}

/// Decodes native-endian floats of `precision`; trailing partial values are ignored.
#[must_use]
pub fn decode(precision: Precision, bytes: &[u8]) -> Vec<f64> {
    match precision {
        Precision::Single => bytes
            .chunks_exact(4)
            .map(|c| f64::from(f32::from_ne_bytes([c[0], c[1], c[2], c[3]])))
            .collect(),
        Precision::Double => bytes
            .chunks_exact(8)
            .map(|c| f64::from_ne_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]))
            .collect(),
    }
}

/// Strided view of a host array: where each logical element of each batch lives.
#[derive(Debug, Clone, Copy)]
pub struct View<'a> {
    pub stride: &'a [usize],
    pub dist: usize,
}

impl View<'_> {
    #[must_use]
    pub fn offset(&self, batch: usize, index: &[usize]) -> usize {
        batch * self.dist + offset(index, self.stride)
    }
}

/// Copies every logical element of `length × batch` from `src` to `dst`,
/// translating stride, distance and array type. Pure data movement.
pub fn copy_buffers(
    src: &HostBufferSet,
    src_view: View<'_>,
    dst: &mut HostBufferSet,
    dst_view: View<'_>,
    length: &[usize],
    batch: usize,
) {
    for b in 0..batch {
        walk(length, |_, index| {
            let value = src.get(src_view.offset(b, index));
            dst.set(dst_view.offset(b, index), value);
        });
    }
}

/// Renders `buffer` batch by batch in row-major order.
#[must_use]
pub fn print_buffer(
    buffer: &HostBufferSet,
    view: View<'_>,
    length: &[usize],
    batch: usize,
) -> String {
    let mut out = String::new();
    let fastest = length.last().copied().unwrap_or(1);
    for b in 0..batch {
        let _ = writeln!(out, "batch {b}:");
        walk(length, |linear, index| {
            let v = buffer.get(view.offset(b, index));
            if buffer.array_type() == ArrayType::Real {
                let _ = write!(out, "{} ", v.re);
            } else {
                let _ = write!(out, "({},{}) ", v.re, v.im);
            }
            if (linear + 1) % fastest == 0 {
                out.push('\n');
            }
        });
    }
    out
}

/// Renders the raw components of every buffer, ignoring layout.
#[must_use]
pub fn print_buffer_flat(buffer: &HostBufferSet) -> String {
    let mut out = String::new();
    for i in 0..buffer.buffer_count() {
        let _ = write!(out, "buffer {i}:");
        for v in buffer.components(i) {
            let _ = write!(out, " {v}");
        }
        out.push('\n');
    }
    out
}

/// One device allocation, freed on drop.
pub struct DeviceBuffer<'m, M: DeviceMemory> {
    memory: &'m M,
    handle: M::Handle,
    bytes: usize,
}

impl<'m, M: DeviceMemory> DeviceBuffer<'m, M> {
    pub fn allocate(memory: &'m M, bytes: usize) -> Result<Self, DeviceStatus> {
        let handle = memory.allocate(bytes)?;
        Ok(DeviceBuffer {
            memory,
            handle,
            bytes,
        })
    }

    pub fn handle(&self) -> &M::Handle {
        &self.handle
    }

    pub fn bytes(&self) -> usize {
        self.bytes
    }
}

impl<M: DeviceMemory> Drop for DeviceBuffer<'_, M> {
    fn drop(&mut self) {
        self.memory.free(self.handle.clone());
    }
}

/// Failure of one buffer within a [`DeviceBufferSet`] operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferFailure {
    pub index: usize,
    pub bytes: usize,
    pub status: DeviceStatus,
}

/// The 1 or 2 device buffers of one logical array.
pub struct DeviceBufferSet<'m, M: DeviceMemory> {
    buffers: Vec<DeviceBuffer<'m, M>>,
}

impl<'m, M: DeviceMemory> DeviceBufferSet<'m, M> {
    /// Allocates one buffer per entry of `sizes`; on failure every buffer
    /// acquired so far is released before returning.
    pub fn allocate(memory: &'m M, sizes: &[usize]) -> Result<Self, BufferFailure> {
        let mut buffers = Vec::with_capacity(sizes.len());
        for (index, &bytes) in sizes.iter().enumerate() {
            let buffer = DeviceBuffer::allocate(memory, bytes).map_err(|status| BufferFailure {
                index,
                bytes,
                status,
            })?;
            buffers.push(buffer);
        }
        Ok(DeviceBufferSet { buffers })
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    pub fn sizes(&self) -> Vec<usize> {
        self.buffers.iter().map(DeviceBuffer::bytes).collect()
    }

    /// Device pointers in buffer order, as passed to the engine.
    pub fn handles(&self) -> Vec<M::Handle> {
        self.buffers.iter().map(|b| b.handle().clone()).collect()
    }

    /// Whole-buffer host → device copy of every buffer of `host`.
    pub fn upload(&self, host: &HostBufferSet) -> Result<(), BufferFailure> {
        for (index, buffer) in self.buffers.iter().enumerate().take(host.buffer_count()) {
            let bytes = host.encode(index);
            buffer
                .memory
                .copy_to_device(buffer.handle(), &bytes)
                .map_err(|status| BufferFailure {
                    index,
                    bytes: bytes.len(),
                    status,
                })?;
        }
        Ok(())
    }

    /// Whole-buffer device → host copy into every buffer of `host`.
    pub fn download(&self, host: &mut HostBufferSet) -> Result<(), BufferFailure> {
        let sizes = host.byte_sizes();
        for (index, buffer) in self.buffers.iter().enumerate().take(host.buffer_count()) {
            let mut bytes = vec![0u8; sizes[index]];
            buffer
                .memory
                .copy_to_host(buffer.handle(), &mut bytes)
                .map_err(|status| BufferFailure {
                    index,
                    bytes: sizes[index],
                    status,
                })?;
            host.decode(index, &bytes);
        }
        Ok(())
    }
}
