//! Problem descriptions: what one accuracy-test invocation transforms.
//!
//! All shapes here are **row-major** (outermost dimension first), the
//! convention shared with the host reference. The device-facing column-major
//! view is derived by [`layout`](crate::layout) and never stored here.

use std::fmt;

use crate::error::{Error, Result};

/// Floating-point precision of a transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Precision {
    Single,
    Double,
}

impl Precision {
    /// Width in bytes of one real component.
    #[must_use]
    pub fn real_bytes(self) -> usize {
        match self {
            Precision::Single => 4,
            Precision::Double => 8,
        }
    }

    /// Machine epsilon of the precision.
    #[must_use]
    pub fn epsilon(self) -> f64 {
        match self {
            Precision::Single => f64::from(f32::EPSILON),
            Precision::Double => f64::EPSILON,
        }
    }

    /// Rounds `value` to the nearest representable value of this precision.
    #[must_use]
    pub fn round(self, value: f64) -> f64 {
        match self {
            Precision::Single => f64::from(value as f32),
            Precision::Double => value,
        }
    }
}

/// Transform direction and domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransformKind {
    ComplexForward,
    ComplexInverse,
    RealForward,
    RealInverse,
}

impl TransformKind {
    #[must_use]
    pub fn is_real(self) -> bool {
        matches!(self, TransformKind::RealForward | TransformKind::RealInverse)
    }

    #[must_use]
    pub fn is_forward(self) -> bool {
        matches!(self, TransformKind::ComplexForward | TransformKind::RealForward)
    }
}

/// Whether the output overwrites the input store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Placement {
    InPlace,
    NotInPlace,
}

/// Memory representation of one logical array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArrayType {
    ComplexInterleaved,
    ComplexPlanar,
    Real,
    HermitianInterleaved,
    HermitianPlanar,
    Unset,
}

impl ArrayType {
    /// Stable name used in diagnostics.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            ArrayType::ComplexInterleaved => "complex_interleaved",
            ArrayType::ComplexPlanar => "complex_planar",
            ArrayType::Real => "real",
            ArrayType::HermitianInterleaved => "hermitian_interleaved",
            ArrayType::HermitianPlanar => "hermitian_planar",
            ArrayType::Unset => "unset",
        }
    }

    #[must_use]
    pub fn is_planar(self) -> bool {
        matches!(self, ArrayType::ComplexPlanar | ArrayType::HermitianPlanar)
    }

    #[must_use]
    pub fn is_interleaved(self) -> bool {
        matches!(self, ArrayType::ComplexInterleaved | ArrayType::HermitianInterleaved)
    }

    #[must_use]
    pub fn is_hermitian(self) -> bool {
        matches!(self, ArrayType::HermitianInterleaved | ArrayType::HermitianPlanar)
    }

    /// Number of independently addressed buffers holding one array.
    #[must_use]
    pub fn buffer_count(self) -> usize {
        if self.is_planar() {
            2
        } else {
            1
        }
    }

    /// Bytes per element within one buffer of this type.
    ///
    /// Planar buffers hold a single component each, so only interleaved types
    /// pay for both components.
    #[must_use]
    pub fn element_bytes(self, precision: Precision) -> usize {
        if self.is_interleaved() {
            2 * precision.real_bytes()
        } else {
            precision.real_bytes()
        }
    }
}

impl fmt::Display for ArrayType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Immutable description of one transform configuration.
///
/// Stride vectors are either empty (unconstrained: the tightest packing is
/// derived) or have exactly one entry per dimension.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProblemDescription {
    lengths: Vec<usize>,
    istride: Vec<usize>,
    ostride: Vec<usize>,
    batch: usize,
    precision: Precision,
    kind: TransformKind,
    placement: Placement,
    itype: ArrayType,
    otype: ArrayType,
}

impl ProblemDescription {
    /// Starts a description with the default representation for `kind`:
    /// single precision, batch 1, out-of-place, unconstrained strides, and
    /// interleaved complex / Hermitian array types.
    #[must_use]
    pub fn builder(lengths: impl Into<Vec<usize>>, kind: TransformKind) -> ProblemBuilder {
        let (itype, otype) = match kind {
            TransformKind::ComplexForward | TransformKind::ComplexInverse => {
                (ArrayType::ComplexInterleaved, ArrayType::ComplexInterleaved)
            }
            TransformKind::RealForward => (ArrayType::Real, ArrayType::HermitianInterleaved),
            TransformKind::RealInverse => (ArrayType::HermitianInterleaved, ArrayType::Real),
        };
        ProblemBuilder {
            inner: ProblemDescription {
                lengths: lengths.into(),
                istride: Vec::new(),
                ostride: Vec::new(),
                batch: 1,
                precision: Precision::Single,
                kind,
                placement: Placement::NotInPlace,
                itype,
                otype,
            },
        }
    }

    pub fn lengths(&self) -> &[usize] {
        &self.lengths
    }

    pub fn istride(&self) -> &[usize] {
        &self.istride
    }

    pub fn ostride(&self) -> &[usize] {
        &self.ostride
    }

    pub fn batch(&self) -> usize {
        self.batch
    }

    pub fn precision(&self) -> Precision {
        self.precision
    }

    pub fn kind(&self) -> TransformKind {
        self.kind
    }

    pub fn placement(&self) -> Placement {
        self.placement
    }

    pub fn itype(&self) -> ArrayType {
        self.itype
    }

    pub fn otype(&self) -> ArrayType {
        self.otype
    }

    pub fn dims(&self) -> usize {
        self.lengths.len()
    }

    /// Number of logical elements in one transform (batch excluded). Cannot
    /// overflow: the builder rejects shapes whose element count does.
    #[must_use]
    pub fn total_length(&self) -> usize {
        self.lengths.iter().product()
    }

    pub fn is_in_place(&self) -> bool {
        self.placement == Placement::InPlace
    }

    fn validate(&self) -> Result<()> {
        if self.lengths.is_empty() {
            return Err(Error::invalid("length vector is empty"));
        }
        if self.lengths.contains(&0) {
            let message = format!("zero-sized dimension in lengths {:?}", self.lengths);
            return Err(Error::invalid(message));
        }
        if self.batch == 0 {
            return Err(Error::invalid("batch count must be at least 1"));
        }
        let elements = self
            .lengths
            .iter()
            .try_fold(self.batch, |acc, &l| acc.checked_mul(l));
        if elements.is_none() {
            return Err(Error::invalid(format!(
                "{:?} x {} elements overflow the address space",
                self.lengths, self.batch
            )));
        }
        for (name, stride) in [("istride", &self.istride), ("ostride", &self.ostride)] {
            if !stride.is_empty() && stride.len() != self.lengths.len() {
                return Err(Error::invalid(format!(
                    "{name} {stride:?} has {} entries for {} dimensions",
                    stride.len(),
                    self.lengths.len()
                )));
            }
            if stride.contains(&0) {
                return Err(Error::invalid(format!("{name} {stride:?} contains a zero stride")));
            }
        }

        use ArrayType::*;
        let legal = match self.kind {
            TransformKind::ComplexForward | TransformKind::ComplexInverse => {
                matches!(self.itype, ComplexInterleaved | ComplexPlanar)
                    && matches!(self.otype, ComplexInterleaved | ComplexPlanar)
            }
            TransformKind::RealForward => self.itype == Real && self.otype.is_hermitian(),
            TransformKind::RealInverse => self.itype.is_hermitian() && self.otype == Real,
        };
        if !legal {
            return Err(Error::invalid(format!(
                "array types {} -> {} do not match transform kind {:?}",
                self.itype, self.otype, self.kind
            )));
        }
        Ok(())
    }
}

/// Builder for [`ProblemDescription`]; [`build`](ProblemBuilder::build) checks the invariants.
#[derive(Debug, Clone)]
pub struct ProblemBuilder {
    inner: ProblemDescription,
}

impl ProblemBuilder {
    #[must_use]
    pub fn precision(mut self, precision: Precision) -> Self {
        self.inner.precision = precision;
        self
    }

    #[must_use]
    pub fn batch(mut self, batch: usize) -> Self {
        self.inner.batch = batch;
        self
    }

    #[must_use]
    pub fn placement(mut self, placement: Placement) -> Self {
        self.inner.placement = placement;
        self
    }

    #[must_use]
    pub fn array_types(mut self, itype: ArrayType, otype: ArrayType) -> Self {
        self.inner.itype = itype;
        self.inner.otype = otype;
        self
    }

    /// Row-major input strides, one per dimension.
    #[must_use]
    pub fn istride(mut self, stride: impl Into<Vec<usize>>) -> Self {
        self.inner.istride = stride.into();
        self
    }

    /// Row-major output strides, one per dimension.
    #[must_use]
    pub fn ostride(mut self, stride: impl Into<Vec<usize>>) -> Self {
        self.inner.ostride = stride.into();
        self
    }

    pub fn build(self) -> Result<ProblemDescription> {
        self.inner.validate()?;
        Ok(self.inner)
    }
}

/// Device-facing parameters of one configuration, attached to every hard
/// error and validation report so a failure can be reproduced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProblemContext {
    pub ilength_cm: Vec<usize>,
    pub istride_cm: Vec<usize>,
    pub idist: usize,
    pub ostride_cm: Vec<usize>,
    pub odist: usize,
    pub batch: usize,
    pub precision: Precision,
    pub placement: Placement,
    pub itype: ArrayType,
    pub otype: ArrayType,
}

fn join(values: &[usize]) -> String {
    values.iter().map(|v| format!(" {v}")).collect()
}

impl fmt::Display for ProblemContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "\nGPU params:")?;
        writeln!(f, "\tgpu_ilength_cm:{}", join(&self.ilength_cm))?;
        writeln!(f, "\tgpu_istride_cm:{}", join(&self.istride_cm))?;
        writeln!(f, "\tgpu_idist: {}", self.idist)?;
        writeln!(f, "\tgpu_ostride_cm:{}", join(&self.ostride_cm))?;
        writeln!(f, "\tgpu_odist: {}", self.odist)?;
        writeln!(f, "\tbatch: {}", self.batch)?;
        match self.placement {
            Placement::InPlace => writeln!(f, "\tin-place")?,
            Placement::NotInPlace => writeln!(f, "\tout-of-place")?,
        }
        writeln!(f, "\t{} -> {}", self.itype, self.otype)?;
        match self.precision {
            Precision::Single => writeln!(f, "\tsingle-precision"),
            Precision::Double => writeln!(f, "\tdouble-precision"),
        }
    }
}
