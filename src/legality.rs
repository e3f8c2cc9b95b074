//! Placement and layout legality, decided before any allocation.

use std::fmt;

use tracing::debug;

use crate::layout::{contiguous_stride, LogicalLayout};
use crate::problem::{ArrayType, ProblemDescription, TransformKind};

/// Whether an invocation proceeds, and if not, why it is skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SkipDecision {
    Proceed,
    SkipInsufficientHostMemory,
    SkipInsufficientDeviceMemory,
    SkipIllegalInPlaceStride,
    SkipIllegalInPlaceUnitStride,
    SkipIllegalInPlaceTypeMix,
}

impl SkipDecision {
    #[must_use]
    pub fn is_proceed(self) -> bool {
        self == SkipDecision::Proceed
    }
}

impl fmt::Display for SkipDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            SkipDecision::Proceed => "proceed",
            SkipDecision::SkipInsufficientHostMemory => "insufficient host memory",
            SkipDecision::SkipInsufficientDeviceMemory => "problem won't fit on device",
            SkipDecision::SkipIllegalInPlaceStride => {
                "in-place transforms require identical input and output strides"
            }
            SkipDecision::SkipIllegalInPlaceUnitStride => {
                "in-place real/complex transforms require unit strides"
            }
            SkipDecision::SkipIllegalInPlaceTypeMix => {
                "in-place transforms cannot mix interleaved and planar types"
            }
        };
        f.write_str(reason)
    }
}

/// Rejects placement/type combinations the device engine cannot execute.
///
/// Rules are checked in order and the first match wins. Out-of-place
/// configurations always proceed.
#[must_use]
pub fn check(problem: &ProblemDescription) -> SkipDecision {
    if !problem.is_in_place() {
        return SkipDecision::Proceed;
    }
    let istride = problem.istride();
    let ostride = problem.ostride();

    let shared = istride.len().min(ostride.len());
    if istride[..shared] != ostride[..shared] || !one_sided_matches_packing(problem) {
        debug!(?istride, ?ostride, "strides differ; skipped for in-place transforms");
        return SkipDecision::SkipIllegalInPlaceStride;
    }

    // Empty (unconstrained) strides are contiguous, hence unit on the fastest dimension.
    let unit = |stride: &[usize]| stride.last().map_or(true, |&s| s == 1);
    if problem.kind().is_real() && !(unit(istride) && unit(ostride)) {
        debug!(
            ?istride,
            ?ostride,
            "fastest stride must be unitary for in-place real/complex transforms"
        );
        return SkipDecision::SkipIllegalInPlaceUnitStride;
    }

    let (itype, otype) = (problem.itype(), problem.otype());
    use ArrayType::*;
    let complex_mix = matches!(
        (itype, otype),
        (ComplexInterleaved, ComplexPlanar) | (ComplexPlanar, ComplexInterleaved)
    );
    if complex_mix {
        debug!(%itype, %otype, "in-place c2c transforms require identical io types");
        return SkipDecision::SkipIllegalInPlaceTypeMix;
    }
    let planar_hermitian = matches!(
        (itype, otype),
        (Real, HermitianPlanar) | (HermitianPlanar, Real)
    );
    if planar_hermitian {
        debug!(%itype, %otype, "in-place real/complex transforms cannot use planar types");
        return SkipDecision::SkipIllegalInPlaceTypeMix;
    }

    SkipDecision::Proceed
}

/// With only one side constrained, the other side is packed contiguously; the
/// shared buffer is only consistent when the constrained side is that packing too.
fn one_sided_matches_packing(problem: &ProblemDescription) -> bool {
    let (istride, ostride) = (problem.istride(), problem.ostride());
    if istride.is_empty() == ostride.is_empty() {
        return true;
    }
    let layout = LogicalLayout::new(problem);
    let kind = problem.kind();
    if ostride.is_empty() {
        let padded = kind == TransformKind::RealForward;
        istride == contiguous_stride(layout.ilength(), &[], padded)
    } else {
        let padded = kind == TransformKind::RealInverse;
        ostride == contiguous_stride(layout.olength(), &[], padded)
    }
}
