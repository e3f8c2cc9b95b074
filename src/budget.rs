//! Host and device memory budgeting, evaluated before anything is allocated.

use tracing::{debug, info};

use crate::config::HarnessConfig;
use crate::layout::LogicalLayout;
use crate::legality::SkipDecision;
use crate::problem::ProblemDescription;

fn inner_product(length: &[usize], stride: &[usize]) -> Option<u64> {
    length.iter().zip(stride).try_fold(0u64, |acc, (&l, &s)| {
        (l as u64).checked_mul(s as u64).and_then(|e| acc.checked_add(e))
    })
}

fn product(values: impl IntoIterator<Item = usize>) -> Option<u64> {
    values
        .into_iter()
        .try_fold(1u64, |acc, v| acc.checked_mul(v as u64))
}

/// Conservative estimate of the host bytes one invocation needs.
///
/// Three contiguous copies (reference input, reference output and the
/// device-bound staging copy) plus the strided device-facing input and output
/// extents, doubled for complex components, scaled by precision and batch.
/// This is a heuristic upper bound, not an exact byte count. An estimate that
/// overflows saturates at `u64::MAX`, which exceeds every ceiling.
#[must_use]
pub fn host_bytes_estimate(problem: &ProblemDescription, layout: &LogicalLayout) -> u64 {
    let estimate = || {
        let contiguous = product(problem.lengths().iter().copied())?;
        let strided_in = inner_product(layout.ilength(), layout.istride())?;
        let strided_out = inner_product(layout.olength(), layout.ostride())?;
        // Every representation is budgeted as complex.
        3u64.checked_mul(contiguous)?
            .checked_add(strided_in)?
            .checked_add(strided_out)?
            .checked_mul(2)?
            .checked_mul(problem.precision().real_bytes() as u64)?
            .checked_mul(problem.batch() as u64)
    };
    estimate().unwrap_or(u64::MAX)
}

/// Skips when the host estimate exceeds the configured ceiling (0 = unlimited).
#[must_use]
pub fn check_host(
    problem: &ProblemDescription,
    layout: &LogicalLayout,
    config: &HarnessConfig,
) -> SkipDecision {
    if config.ram_ceiling_bytes == 0 {
        return SkipDecision::Proceed;
    }
    let needed = host_bytes_estimate(problem, layout);
    if config.verbose(1) {
        info!("required host memory (GB): {}", needed as f64 * 1e-9);
    }
    if needed > config.ram_ceiling_bytes {
        debug!(needed, ceiling = config.ram_ceiling_bytes, "host budget exceeded; skipped");
        return SkipDecision::SkipInsufficientHostMemory;
    }
    SkipDecision::Proceed
}

/// Early estimate made before the reference is computed: five contiguous
/// complex arrays (host input, output and staging copy, device input and output).
#[must_use]
pub fn precheck_host(problem: &ProblemDescription, config: &HarnessConfig) -> SkipDecision {
    if config.ram_ceiling_bytes == 0 {
        return SkipDecision::Proceed;
    }
    let needed = product(problem.lengths().iter().copied())
        .and_then(|n| n.checked_mul(5 * 2 * problem.precision().real_bytes() as u64))
        .unwrap_or(u64::MAX);
    if needed > config.ram_ceiling_bytes {
        debug!(needed, ceiling = config.ram_ceiling_bytes, "host pre-check exceeded; skipped");
        return SkipDecision::SkipInsufficientHostMemory;
    }
    SkipDecision::Proceed
}

/// Device bytes a configuration occupies: input, output (out-of-place only)
/// and work buffer. Saturates at `u64::MAX`.
#[must_use]
pub fn device_bytes(
    input_bytes: usize,
    output_bytes: usize,
    work_bytes: usize,
    in_place: bool,
) -> u64 {
    let output = if in_place { 0 } else { output_bytes };
    [input_bytes, output, work_bytes]
        .iter()
        .fold(0u64, |acc, &b| acc.saturating_add(b as u64))
}

/// Skips when the device cannot hold the configuration. Must run before any
/// device allocation.
#[must_use]
pub fn check_device(required: u64, available: u64) -> SkipDecision {
    if required > available {
        debug!(required, available, "problem won't fit on device; skipped");
        return SkipDecision::SkipInsufficientDeviceMemory;
    }
    SkipDecision::Proceed
}
