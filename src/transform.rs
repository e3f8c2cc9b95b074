//! Host N-D transforms over contiguous row-major data, built on rustfft.
//!
//! `shape` is the full (unpacked) row-major shape of one transform; `data`
//! holds whole batches back to back. Transforms are unnormalized in both
//! directions.

use num_complex::Complex64;
use rustfft::FftPlanner;

use crate::layout::{contiguous_stride, offset, packed_length, walk};

/// In-place complex transform along every axis of every batch.
pub fn complex_nd(data: &mut [Complex64], shape: &[usize], inverse: bool) {
    let total: usize = shape.iter().product();
    if total == 0 || data.is_empty() {
        return;
    }
    let mut planner = FftPlanner::<f64>::new();
    for (axis, &len) in shape.iter().enumerate() {
        if len <= 1 {
            continue;
        }
        let fft = if inverse {
            planner.plan_fft_inverse(len)
        } else {
            planner.plan_fft_forward(len)
        };
        let stride: usize = shape[axis + 1..].iter().product();
        let mut line = vec![Complex64::new(0.0, 0.0); len];
        for signal in data.chunks_exact_mut(total) {
            for outer in 0..total / (len * stride) {
                for inner in 0..stride {
                    let base = outer * len * stride + inner;
                    for (k, v) in line.iter_mut().enumerate() {
                        *v = signal[base + k * stride];
                    }
                    fft.process(&mut line);
                    for (k, v) in line.iter().enumerate() {
                        signal[base + k * stride] = *v;
                    }
                }
            }
        }
    }
}

/// Row-major shape of the Hermitian half: the fastest axis becomes `n/2 + 1`.
#[must_use]
pub fn packed_shape(shape: &[usize]) -> Vec<usize> {
    let mut packed = shape.to_vec();
    if let Some(last) = packed.last_mut() {
        *last = packed_length(*last);
    }
    packed
}

/// Keeps the non-redundant half of `batch` full spectra.
#[must_use]
pub fn hermitian_pack(full: &[Complex64], shape: &[usize], batch: usize) -> Vec<Complex64> {
    let total: usize = shape.iter().product();
    let packed = packed_shape(shape);
    let packed_total: usize = packed.iter().product();
    let full_stride = contiguous_stride(shape, &[], false);
    let mut out = vec![Complex64::new(0.0, 0.0); packed_total * batch];
    for b in 0..batch {
        walk(&packed, |linear, index| {
            out[b * packed_total + linear] = full[b * total + offset(index, &full_stride)];
        });
    }
    out
}

/// Rebuilds `batch` full spectra from their packed halves by conjugate symmetry.
#[must_use]
pub fn hermitian_expand(
    packed_data: &[Complex64],
    shape: &[usize],
    batch: usize,
) -> Vec<Complex64> {
    let total: usize = shape.iter().product();
    let packed = packed_shape(shape);
    let packed_total: usize = packed.iter().product();
    let packed_stride = contiguous_stride(&packed, &[], false);
    let dim = shape.len();

    let mut full = vec![Complex64::new(0.0, 0.0); total * batch];
    let mut mirror = vec![0usize; dim];
    for b in 0..batch {
        let src = &packed_data[b * packed_total..(b + 1) * packed_total];
        walk(shape, |linear, index| {
            let value = if index[dim - 1] < packed[dim - 1] {
                src[offset(index, &packed_stride)]
            } else {
                for (d, m) in mirror.iter_mut().enumerate() {
                    *m = (shape[d] - index[d]) % shape[d];
                }
                src[offset(&mirror, &packed_stride)].conj()
            };
            full[b * total + linear] = value;
        });
    }
    full
}

/// Real-to-Hermitian forward transform; returns `batch` packed spectra.
#[must_use]
pub fn real_forward(input: &[f64], shape: &[usize], batch: usize) -> Vec<Complex64> {
    let mut full: Vec<Complex64> = input.iter().map(|&v| Complex64::new(v, 0.0)).collect();
    complex_nd(&mut full, shape, false);
    hermitian_pack(&full, shape, batch)
}

/// Hermitian-to-real inverse transform of `batch` packed spectra.
///
/// The redundant half is rebuilt from conjugate symmetry before the complex
/// inverse; the imaginary residue is discarded.
#[must_use]
pub fn real_inverse(input: &[Complex64], shape: &[usize], batch: usize) -> Vec<f64> {
    let mut full = hermitian_expand(input, shape, batch);
    complex_nd(&mut full, shape, true);
    full.into_iter().map(|v| v.re).collect()
}
