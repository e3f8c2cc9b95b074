//! Layout translation between the logical (row-major) problem shape and the
//! column-major description a device FFT engine consumes.
//!
//! ```text
//! ProblemDescription ──LogicalLayout::new──▶ LogicalLayout ──to_device──▶ DeviceLayout
//!      row-major           packing, strides,      row-major      reverse_dims     column-major
//!                          distances
//! ```
//!
//! Real-forward transforms pack the output's fastest dimension to `n/2 + 1`
//! Hermitian elements; real-inverse transforms pack the input instead. All
//! strides and distances are counted in elements of the side's array type
//! (reals for [`ArrayType::Real`](crate::problem::ArrayType::Real), complex
//! values otherwise).

use crate::problem::{Placement, ProblemContext, ProblemDescription, TransformKind};

/// Number of non-redundant Hermitian elements for a real length `n`.
#[must_use]
pub fn packed_length(n: usize) -> usize {
    n / 2 + 1
}

/// Reverses the dimension order of a length or stride vector.
///
/// Applying it twice yields the original vector.
#[must_use]
pub fn reverse_dims(values: &[usize]) -> Vec<usize> {
    values.iter().rev().copied().collect()
}

/// Row-major strides for `length`.
///
/// A non-empty `stride` is a caller constraint and is returned unchanged.
/// Otherwise the tightest packing is derived; with `rcpadding` the fastest
/// dimension's extent is padded to `2 * (n/2 + 1)` so an in-place real store
/// can also hold its Hermitian counterpart.
///
/// ```
/// # use gpu_fft_accuracy::layout::contiguous_stride;
/// assert_eq!(contiguous_stride(&[4, 8], &[], false), vec![8, 1]);
/// assert_eq!(contiguous_stride(&[4, 8], &[], true), vec![10, 1]);
/// assert_eq!(contiguous_stride(&[4, 8], &[16, 2], true), vec![16, 2]);
/// ```
#[must_use]
pub fn contiguous_stride(length: &[usize], stride: &[usize], rcpadding: bool) -> Vec<usize> {
    if !stride.is_empty() {
        return stride.to_vec();
    }
    let dim = length.len();
    let mut out = vec![1; dim];
    for i in (0..dim.saturating_sub(1)).rev() {
        let mut extent = length[i + 1];
        if rcpadding && i == dim - 2 {
            extent = 2 * packed_length(extent);
        }
        out[i] = out[i + 1] * extent;
    }
    out
}

fn max_extent(length: &[usize], stride: &[usize], fastest: usize) -> usize {
    let dim = length.len();
    (0..dim - 1)
        .map(|i| length[i] * stride[i])
        .fold(fastest * stride[dim - 1], usize::max)
}

/// Distance in elements between consecutive input batches.
///
/// `length` is the full logical length; `istride` the derived input stride.
#[must_use]
pub fn input_distance(
    placement: Placement,
    kind: TransformKind,
    length: &[usize],
    istride: &[usize],
) -> usize {
    let dim = length.len();
    let last = length[dim - 1];
    if dim == 1 {
        if kind == TransformKind::RealForward && placement == Placement::InPlace {
            return 2 * packed_length(last) * istride[0];
        }
        if kind == TransformKind::RealInverse {
            return packed_length(last) * istride[0];
        }
    }
    let fastest = if kind == TransformKind::RealInverse {
        packed_length(last)
    } else {
        last
    };
    max_extent(length, istride, fastest)
}

/// Distance in elements between consecutive output batches.
#[must_use]
pub fn output_distance(
    placement: Placement,
    kind: TransformKind,
    length: &[usize],
    ostride: &[usize],
) -> usize {
    let dim = length.len();
    let last = length[dim - 1];
    if dim == 1 {
        if kind == TransformKind::RealInverse && placement == Placement::InPlace {
            return 2 * packed_length(last) * ostride[0];
        }
        if kind == TransformKind::RealForward {
            return packed_length(last) * ostride[0];
        }
    }
    let fastest = if kind == TransformKind::RealForward {
        packed_length(last)
    } else {
        last
    };
    max_extent(length, ostride, fastest)
}

/// Visits every multi-index of `lengths` in row-major order, together with
/// its row-major linear position.
pub fn walk(lengths: &[usize], mut f: impl FnMut(usize, &[usize])) {
    if lengths.is_empty() || lengths.contains(&0) {
        return;
    }
    let mut index = vec![0usize; lengths.len()];
    let mut linear = 0usize;
    loop {
        f(linear, &index);
        linear += 1;
        let mut d = lengths.len();
        loop {
            if d == 0 {
                return;
            }
            d -= 1;
            index[d] += 1;
            if index[d] < lengths[d] {
                break;
            }
            index[d] = 0;
        }
    }
}

/// Element offset of `index` under `stride` (both in the same dimension order).
#[must_use]
pub fn offset(index: &[usize], stride: &[usize]) -> usize {
    index.iter().zip(stride).map(|(i, s)| i * s).sum()
}

/// Row-major layout derived from a problem: the shape the reference and the
/// host-side buffers are addressed with.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LogicalLayout {
    length: Vec<usize>,
    ilength: Vec<usize>,
    olength: Vec<usize>,
    istride: Vec<usize>,
    ostride: Vec<usize>,
    idist: usize,
    odist: usize,
}

impl LogicalLayout {
    #[must_use]
    pub fn new(problem: &ProblemDescription) -> Self {
        let kind = problem.kind();
        let place = problem.placement();
        let length = problem.lengths().to_vec();
        let dim = length.len();

        let mut olength = length.clone();
        if kind == TransformKind::RealForward {
            olength[dim - 1] = packed_length(olength[dim - 1]);
        }
        let mut ilength = length.clone();
        if kind == TransformKind::RealInverse {
            ilength[dim - 1] = packed_length(ilength[dim - 1]);
        }

        let in_place = place == Placement::InPlace;
        let istride = contiguous_stride(
            &ilength,
            problem.istride(),
            in_place && kind == TransformKind::RealForward,
        );
        let ostride = contiguous_stride(
            &olength,
            problem.ostride(),
            in_place && kind == TransformKind::RealInverse,
        );
        let idist = input_distance(place, kind, &length, &istride);
        let odist = output_distance(place, kind, &length, &ostride);

        LogicalLayout {
            length,
            ilength,
            olength,
            istride,
            ostride,
            idist,
            odist,
        }
    }

    /// Full (unpacked) transform lengths.
    pub fn length(&self) -> &[usize] {
        &self.length
    }

    pub fn ilength(&self) -> &[usize] {
        &self.ilength
    }

    pub fn olength(&self) -> &[usize] {
        &self.olength
    }

    pub fn istride(&self) -> &[usize] {
        &self.istride
    }

    pub fn ostride(&self) -> &[usize] {
        &self.ostride
    }

    pub fn idist(&self) -> usize {
        self.idist
    }

    pub fn odist(&self) -> usize {
        self.odist
    }

    /// Column-major view for the device engine.
    #[must_use]
    pub fn to_device(&self) -> DeviceLayout {
        DeviceLayout {
            length_cm: reverse_dims(&self.length),
            ilength_cm: reverse_dims(&self.ilength),
            olength_cm: reverse_dims(&self.olength),
            istride_cm: reverse_dims(&self.istride),
            ostride_cm: reverse_dims(&self.ostride),
            idist: self.idist,
            odist: self.odist,
        }
    }
}

/// Column-major layout registered with the device engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceLayout {
    length_cm: Vec<usize>,
    ilength_cm: Vec<usize>,
    olength_cm: Vec<usize>,
    istride_cm: Vec<usize>,
    ostride_cm: Vec<usize>,
    idist: usize,
    odist: usize,
}

impl DeviceLayout {
    #[must_use]
    pub fn from_problem(problem: &ProblemDescription) -> Self {
        LogicalLayout::new(problem).to_device()
    }

    pub fn length_cm(&self) -> &[usize] {
        &self.length_cm
    }

    pub fn ilength_cm(&self) -> &[usize] {
        &self.ilength_cm
    }

    pub fn olength_cm(&self) -> &[usize] {
        &self.olength_cm
    }

    pub fn istride_cm(&self) -> &[usize] {
        &self.istride_cm
    }

    pub fn ostride_cm(&self) -> &[usize] {
        &self.ostride_cm
    }

    pub fn idist(&self) -> usize {
        self.idist
    }

    pub fn odist(&self) -> usize {
        self.odist
    }

    /// Back to the row-major view; inverse of [`LogicalLayout::to_device`].
    #[must_use]
    pub fn to_logical(&self) -> LogicalLayout {
        LogicalLayout {
            length: reverse_dims(&self.length_cm),
            ilength: reverse_dims(&self.ilength_cm),
            olength: reverse_dims(&self.olength_cm),
            istride: reverse_dims(&self.istride_cm),
            ostride: reverse_dims(&self.ostride_cm),
            idist: self.idist,
            odist: self.odist,
        }
    }

    /// Diagnostic context for `problem` under this layout.
    #[must_use]
    pub fn context(&self, problem: &ProblemDescription) -> ProblemContext {
        ProblemContext {
            ilength_cm: self.ilength_cm.clone(),
            istride_cm: self.istride_cm.clone(),
            idist: self.idist,
            ostride_cm: self.ostride_cm.clone(),
            odist: self.odist,
            batch: problem.batch(),
            precision: problem.precision(),
            placement: problem.placement(),
            itype: problem.itype(),
            otype: problem.otype(),
        }
    }
}
