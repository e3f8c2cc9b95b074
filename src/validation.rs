//! Statistical comparison of device output against the host reference.
//!
//! Rounding error in an FFT grows with the logarithm of the transform length,
//! so both acceptance thresholds are derived from the precision's machine
//! epsilon and the number of logical elements `N`:
//!
//! ```text
//! linf_cutoff  = eps · ‖ref‖∞ · ln(N)
//! l2_threshold = eps · sqrt(log2(N))      compared against ‖ref − dev‖₂ / ‖ref‖₂
//! ```

use std::fmt;

use tracing::{debug, warn};

use crate::buffer::{HostBufferSet, View};
use crate::layout::walk;
use crate::problem::{Precision, ProblemContext};

/// L2 and L-infinity norms of one array (or of a difference of two).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct VectorNorms {
    pub l_2: f64,
    pub l_inf: f64,
}

impl VectorNorms {
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.l_2.is_finite() && self.l_inf.is_finite()
    }
}

/// Running L2/L-inf accumulator; a NaN magnitude poisons both norms.
#[derive(Debug, Default)]
struct Accumulator {
    sum_sq: f64,
    max: f64,
}

impl Accumulator {
    fn push(&mut self, magnitude: f64) {
        self.sum_sq += magnitude * magnitude;
        if magnitude.is_nan() || magnitude > self.max {
            self.max = magnitude;
        }
    }

    fn finish(self) -> VectorNorms {
        VectorNorms {
            l_2: self.sum_sq.sqrt(),
            l_inf: self.max,
        }
    }
}

/// Norms of `buffer` over the logical `length × batch` index space.
#[must_use]
pub fn norm(buffer: &HostBufferSet, view: View<'_>, length: &[usize], batch: usize) -> VectorNorms {
    let mut acc = Accumulator::default();
    for b in 0..batch {
        walk(length, |_, index| acc.push(buffer.get(view.offset(b, index)).norm()));
    }
    acc.finish()
}

/// Normed distance between two arrays and the elements that exceed `cutoff`.
#[derive(Debug, Clone, PartialEq)]
pub struct Distance {
    pub norms: VectorNorms,
    /// `(batch, row-major linear index)` of each element whose difference
    /// exceeds the cutoff, sorted.
    pub failures: Vec<(usize, usize)>,
}

/// Element-wise `|reference − device|` accumulated into L2 and L-inf norms.
///
/// Failing coordinates are recorded for diagnostics only; the verdict is
/// decided by [`Thresholds::verdict`].
#[must_use]
pub fn distance(
    reference: &HostBufferSet,
    reference_view: View<'_>,
    device: &HostBufferSet,
    device_view: View<'_>,
    length: &[usize],
    batch: usize,
    cutoff: f64,
) -> Distance {
    let mut acc = Accumulator::default();
    let mut failures = Vec::new();
    for b in 0..batch {
        walk(length, |linear, index| {
            let expected = reference.get(reference_view.offset(b, index));
            let actual = device.get(device_view.offset(b, index));
            let diff = (expected - actual).norm();
            // NaN differences count as failures.
            if !(diff <= cutoff) {
                failures.push((b, linear));
            }
            acc.push(diff);
        });
    }
    failures.sort_unstable();
    Distance {
        norms: acc.finish(),
        failures,
    }
}

/// Acceptance thresholds for one problem size and precision.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub linf_cutoff: f64,
    pub l2_threshold: f64,
}

impl Thresholds {
    /// Thresholds for `total_length` logical elements (batch excluded).
    #[must_use]
    pub fn derive(precision: Precision, total_length: usize, reference: &VectorNorms) -> Self {
        let eps = precision.epsilon();
        let n = total_length as f64;
        Thresholds {
            linf_cutoff: eps * reference.l_inf * n.ln(),
            l2_threshold: n.log2().sqrt() * eps,
        }
    }

    /// Applies the acceptance rules to a computed distance.
    #[must_use]
    pub fn verdict(
        &self,
        diff: &VectorNorms,
        reference: &VectorNorms,
        device: &VectorNorms,
    ) -> Verdict {
        let l2_ratio = if reference.l_2 > 0.0 {
            diff.l_2 / reference.l_2
        } else {
            diff.l_2
        };
        // A difference that meets its cutoff fails, including a zero cutoff.
        // NaN fails as well.
        let linf_failed = !(diff.l_inf < self.linf_cutoff);
        let l2_failed = !(l2_ratio < self.l2_threshold);
        Verdict {
            linf_failed,
            l2_failed,
            device_norm_finite: device.is_finite(),
            reference_norm_finite: reference.is_finite(),
            l2_ratio,
        }
    }
}

/// Outcome of the threshold comparison.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Verdict {
    pub linf_failed: bool,
    pub l2_failed: bool,
    pub device_norm_finite: bool,
    pub reference_norm_finite: bool,
    /// `diff.l_2 / reference.l_2`, or the raw difference when the reference is zero.
    pub l2_ratio: f64,
}

impl Verdict {
    #[must_use]
    pub fn passed(&self) -> bool {
        !self.linf_failed
            && !self.l2_failed
            && self.device_norm_finite
            && self.reference_norm_finite
    }
}

/// Everything recorded about one validated invocation.
#[derive(Debug, Clone)]
pub struct ValidationReport {
    pub device_norms: VectorNorms,
    pub reference_norms: VectorNorms,
    pub diff: VectorNorms,
    pub thresholds: Thresholds,
    pub verdict: Verdict,
    pub failures: Vec<(usize, usize)>,
    pub context: ProblemContext,
}

impl ValidationReport {
    #[must_use]
    pub fn passed(&self) -> bool {
        self.verdict.passed()
    }

    /// Logs the report at debug level, or as a warning when it failed.
    pub fn log(&self) {
        if self.passed() {
            debug!(
                l2 = self.diff.l_2,
                linf = self.diff.l_inf,
                l2_ratio = self.verdict.l2_ratio,
                "validation passed"
            );
        } else {
            warn!("{self}");
        }
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let v = &self.verdict;
        if v.linf_failed {
            writeln!(
                f,
                "Linf test failed.  Linf: {}\tnormalized Linf: {}\tcutoff: {}",
                self.diff.l_inf,
                self.diff.l_inf / self.reference_norms.l_inf,
                self.thresholds.linf_cutoff
            )?;
        }
        if v.l2_failed {
            writeln!(
                f,
                "L2 test failed. L2: {}\tnormalized L2: {}\tepsilon: {}",
                self.diff.l_2, v.l2_ratio, self.thresholds.l2_threshold
            )?;
        }
        if !v.device_norm_finite {
            writeln!(
                f,
                "GPU output norm is not finite: L2 {} Linf {}",
                self.device_norms.l_2, self.device_norms.l_inf
            )?;
        }
        if !v.reference_norm_finite {
            writeln!(
                f,
                "reference output norm is not finite: L2 {} Linf {}",
                self.reference_norms.l_2, self.reference_norms.l_inf
            )?;
        }
        if self.passed() {
            writeln!(
                f,
                "passed: L2 diff {} (normalized {}), Linf diff {} (cutoff {})",
                self.diff.l_2, v.l2_ratio, self.diff.l_inf, self.thresholds.linf_cutoff
            )?;
        }
        if !self.failures.is_empty() {
            write!(f, "GPU linf norm failures:")?;
            for (batch, index) in &self.failures {
                write!(f, " ({batch},{index})")?;
            }
            writeln!(f)?;
        }
        write!(f, "{}", self.context)
    }
}
