//! Plan checks and host-side staging shared by the shipped engines.
//!
//! Both engines accept the same plans and address device buffers the same
//! way; they differ only in how the contiguous transform is computed.

use num_complex::Complex64;

use crate::buffer::{HostBufferSet, View};
use crate::device::{EngineStatus, PlanLayout, PlanRequest};
use crate::layout::{packed_length, reverse_dims, walk};
use crate::problem::{ArrayType, Placement, Precision, TransformKind};

/// A validated plan, kept by the engine until it is destroyed.
#[derive(Debug, Clone)]
pub struct StagedPlan {
    pub(crate) placement: Placement,
    pub(crate) kind: TransformKind,
    pub(crate) precision: Precision,
    pub(crate) batch: usize,
    /// Full row-major transform shape.
    pub(crate) shape: Vec<usize>,
    ilength: Vec<usize>,
    olength: Vec<usize>,
    istride: Vec<usize>,
    ostride: Vec<usize>,
    pub(crate) layout: PlanLayout,
}

fn expected_types(kind: TransformKind, itype: ArrayType, otype: ArrayType) -> bool {
    use ArrayType::*;
    match kind {
        TransformKind::ComplexForward | TransformKind::ComplexInverse => {
            matches!(itype, ComplexInterleaved | ComplexPlanar)
                && matches!(otype, ComplexInterleaved | ComplexPlanar)
        }
        TransformKind::RealForward => itype == Real && otype.is_hermitian(),
        TransformKind::RealInverse => itype.is_hermitian() && otype == Real,
    }
}

/// Elements a strided batch of arrays spans.
fn extent(length: &[usize], stride: &[usize], dist: usize, batch: usize) -> usize {
    let last: usize = length.iter().zip(stride).map(|(l, s)| (l - 1) * s).sum();
    (batch - 1) * dist + last + 1
}

/// Elements one buffer of `set` can address.
fn capacity(set: &HostBufferSet) -> usize {
    let components = set.components(0).len();
    if set.array_type().is_interleaved() {
        components / 2
    } else {
        components
    }
}

impl StagedPlan {
    /// Checks a plan request against the registered layout.
    pub fn new(
        request: PlanRequest<'_>,
        layout: Option<&PlanLayout>,
    ) -> Result<Self, EngineStatus> {
        let layout = layout
            .cloned()
            .ok_or_else(|| EngineStatus::InvalidArgValue("description has no data layout".into()))?;
        let dims = request.lengths_cm.len();
        if dims == 0 || request.lengths_cm.contains(&0) {
            return Err(EngineStatus::InvalidDimensions);
        }
        if request.batch == 0 {
            return Err(EngineStatus::InvalidArgValue("batch must be at least 1".into()));
        }
        if layout.istride_cm.len() != dims || layout.ostride_cm.len() != dims {
            return Err(EngineStatus::InvalidStrides);
        }
        if layout.idist == 0 || layout.odist == 0 {
            return Err(EngineStatus::InvalidDistance);
        }
        if !expected_types(request.kind, layout.itype, layout.otype) {
            return Err(EngineStatus::InvalidArrayType(layout.itype, layout.otype));
        }

        let shape = reverse_dims(request.lengths_cm);
        let mut ilength = shape.clone();
        let mut olength = shape.clone();
        match request.kind {
            TransformKind::RealForward => olength[dims - 1] = packed_length(shape[dims - 1]),
            TransformKind::RealInverse => ilength[dims - 1] = packed_length(shape[dims - 1]),
            TransformKind::ComplexForward | TransformKind::ComplexInverse => {}
        }
        Ok(StagedPlan {
            placement: request.placement,
            kind: request.kind,
            precision: request.precision,
            batch: request.batch,
            shape,
            ilength,
            olength,
            istride: reverse_dims(&layout.istride_cm),
            ostride: reverse_dims(&layout.ostride_cm),
            layout,
        })
    }

    fn input_view(&self) -> View<'_> {
        View {
            stride: &self.istride,
            dist: self.layout.idist,
        }
    }

    fn output_view(&self) -> View<'_> {
        View {
            stride: &self.ostride,
            dist: self.layout.odist,
        }
    }

    /// Output elements per batch.
    pub fn output_elements(&self) -> usize {
        self.olength.iter().product()
    }

    /// Reads the input's logical elements into contiguous row-major order.
    pub fn gather(&self, input: &HostBufferSet) -> Result<Vec<Complex64>, EngineStatus> {
        if extent(&self.ilength, &self.istride, self.layout.idist, self.batch) > capacity(input) {
            return Err(EngineStatus::InvalidArgValue(
                "input buffer too small for data layout".into(),
            ));
        }
        let view = self.input_view();
        let mut data = Vec::with_capacity(self.ilength.iter().product::<usize>() * self.batch);
        for b in 0..self.batch {
            walk(&self.ilength, |_, index| data.push(input.get(view.offset(b, index))));
        }
        Ok(data)
    }

    /// Writes contiguous row-major results into the output's layout.
    pub fn scatter(
        &self,
        result: &[Complex64],
        output: &mut HostBufferSet,
    ) -> Result<(), EngineStatus> {
        if extent(&self.olength, &self.ostride, self.layout.odist, self.batch) > capacity(output) {
            return Err(EngineStatus::InvalidArgValue(
                "output buffer too small for data layout".into(),
            ));
        }
        let view = self.output_view();
        let per_batch = self.output_elements();
        for b in 0..self.batch {
            walk(&self.olength, |linear, index| {
                output.set(view.offset(b, index), result[b * per_batch + linear]);
            });
        }
        Ok(())
    }
}

/// Checks that `handles` match the buffer count of `array_type`.
pub fn check_buffer_count<H>(handles: &[H], array_type: ArrayType) -> Result<(), EngineStatus> {
    if handles.len() != array_type.buffer_count() {
        return Err(EngineStatus::InvalidArgValue(format!(
            "{array_type} needs {} buffers, got {}",
            array_type.buffer_count(),
            handles.len()
        )));
    }
    Ok(())
}
