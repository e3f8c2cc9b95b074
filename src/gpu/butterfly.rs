// Radix-2 Cooley-Tukey DIT butterflies over many independent lines at once.
// Every line has the same power-of-two length `n` and is stored contiguously,
// already in bit-reversed order; line `l` starts at element `l * n`.
// The inner kernel fuses the first stages in shared memory, the stage kernel
// runs one wider stage over global memory.
use cubecl::prelude::*;
use std::f32::consts::PI;

// ── Inner (shared-memory) stages ──────────────────────────────────────────────

/// Fused butterfly stages for every tile of every line.
///
/// One workgroup of `tile / 2` threads owns one `tile`-element slice of one
/// line and runs `stages` stages on it without leaving shared memory:
///
/// ```text
/// local  = ABSOLUTE_POS % (tile / 2)
/// slice  = ABSOLUTE_POS / (tile / 2)
/// line   = slice / (n / tile)
/// base   = line * n + (slice % (n / tile)) * tile
/// ```
///
/// ### Launch parameters
/// ```text
/// CubeCount = ((n / tile) * lines, 1, 1)
/// CubeDim   = (tile / 2, 1, 1)
/// ```
///
/// Shared memory: `2 * tile * sizeof(F)` bytes per workgroup.
#[cube(launch)]
pub fn butterfly_lines_inner<F: Float>(
    real: &mut Array<F>,
    imag: &mut Array<F>,
    #[comptime] n: usize,
    #[comptime] tile: usize,
    #[comptime] stages: usize,
    #[comptime] forward: bool,
) {
    let mut s_real = SharedMemory::<F>::new(tile);
    let mut s_imag = SharedMemory::<F>::new(tile);

    let half_tile = tile / 2;
    let slices_per_line = (n / tile).max(1);

    let tid = ABSOLUTE_POS;
    let local = tid % half_tile;
    let slice = tid / half_tile;
    let line = slice / slices_per_line;
    let base = line * n + (slice % slices_per_line) * tile;

    s_real[local] = real[base + local];
    s_real[local + half_tile] = real[base + local + half_tile];
    s_imag[local] = imag[base + local];
    s_imag[local + half_tile] = imag[base + local + half_tile];

    sync_cube();

    // `stages` is comptime, so the loop unrolls and `hs` is a literal per stage.
    for s in 0..stages {
        let hs = 1_usize << s;

        let k = local % hs;
        let i = (local / hs) * (hs * 2) + k;
        let j = i + hs;

        let sign = if forward { F::new(-1.0) } else { F::new(1.0) };
        let angle = sign * F::new(PI) * F::cast_from(k) / F::cast_from(hs);
        let cos_a = F::cos(angle);
        let sin_a = F::sin(angle);

        let ur = s_real[i];
        let ui = s_imag[i];
        let vr = cos_a * s_real[j] - sin_a * s_imag[j];
        let vi = sin_a * s_real[j] + cos_a * s_imag[j];

        s_real[i] = ur + vr;
        s_imag[i] = ui + vi;
        s_real[j] = ur - vr;
        s_imag[j] = ui - vi;

        sync_cube();
    }

    real[base + local] = s_real[local];
    real[base + local + half_tile] = s_real[local + half_tile];
    imag[base + local] = s_imag[local];
    imag[base + local + half_tile] = s_imag[local + half_tile];
}

// ── Outer (global-memory) stage ───────────────────────────────────────────────

/// One butterfly stage with half-stride `half_stride` over every line.
///
/// Thread `tid` owns one butterfly pair:
///
/// ```text
/// line = tid / (n / 2)
/// pos  = tid % (n / 2)
/// k    = pos % half_stride
/// i    = line * n + (pos / half_stride) * 2 * half_stride + k
/// j    = i + half_stride
///
/// W    = exp(∓ jπ · k / half_stride)      (− forward, + inverse)
/// x[i], x[j] = x[i] + W·x[j], x[i] − W·x[j]
/// ```
///
/// ### Launch parameters
/// ```text
/// CubeCount = (ceil(lines * n / 2 / WORKGROUP_SIZE), 1, 1)
/// CubeDim   = (WORKGROUP_SIZE, 1, 1)
/// ```
#[cube(launch)]
pub fn butterfly_lines_stage<F: Float>(
    real: &mut Array<F>,
    imag: &mut Array<F>,
    #[comptime] n: usize,
    #[comptime] half_stride: usize,
    #[comptime] lines: usize,
    #[comptime] forward: bool,
) {
    let tid = ABSOLUTE_POS;

    if tid < lines * (n / 2) {
        let line = tid / (n / 2);
        let pos = tid % (n / 2);
        let k = pos % half_stride;
        let i = line * n + (pos / half_stride) * (half_stride * 2) + k;
        let j = i + half_stride;

        let sign = if forward { F::new(-1.0) } else { F::new(1.0) };
        let angle = sign * F::new(PI) * F::cast_from(k) / F::cast_from(half_stride);
        let cos_a = F::cos(angle);
        let sin_a = F::sin(angle);

        let ur = real[i];
        let ui = imag[i];
        let vr = cos_a * real[j] - sin_a * imag[j];
        let vi = sin_a * real[j] + cos_a * imag[j];

        real[i] = ur + vr;
        imag[i] = ui + vi;
        real[j] = ur - vr;
        imag[j] = ui - vi;
    }
}

/// Reverses the lowest `bits` bits of `x`.
///
/// Lines are permuted with this on the host before upload; the DIT stages
/// then produce natural-order output.
#[inline]
pub fn bit_reverse(mut x: usize, bits: u32) -> usize {
    let mut r = 0usize;
    for _ in 0..bits {
        r = (r << 1) | (x & 1);
        x >>= 1;
    }
    r
}
