//! Shared test helpers compiled into every integration-test binary.
//! Items may not all be used in every binary, so dead_code is suppressed.
#![allow(dead_code)]

use gpu_fft_accuracy::sim::{SimDevice, SimEngine};
use gpu_fft_accuracy::{ProblemDescription, ReferenceCache, RustFftReference};
use num_complex::Complex64;

/// Maximum absolute error tolerated between f64 host results and analytical values.
pub const EPSILON: f64 = 1e-9;

/// Simulated device size used unless a test needs a tighter one.
pub const DEVICE_BYTES: u64 = 64 << 20;

pub fn sim_engine() -> SimEngine {
    SimEngine::new(SimDevice::new(DEVICE_BYTES))
}

pub fn cache() -> ReferenceCache<RustFftReference> {
    ReferenceCache::new(RustFftReference::default())
}

/// Routes harness logs to the test output; `RUST_LOG` selects the level.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn assert_approx(actual: f64, expected: f64, label: &str) {
    assert!(
        (actual - expected).abs() <= EPSILON,
        "{}: got {:.12}, expected {:.12}  (diff {:.2e})",
        label,
        actual,
        expected,
        (actual - expected).abs(),
    );
}

pub fn assert_complex_approx(actual: Complex64, expected: Complex64, label: &str) {
    assert_approx(actual.re, expected.re, &format!("{label}.re"));
    assert_approx(actual.im, expected.im, &format!("{label}.im"));
}

/// O(N²) DFT of one 1-D signal.
pub fn naive_dft(input: &[Complex64], inverse: bool) -> Vec<Complex64> {
    let n = input.len();
    let sign = if inverse { 1.0 } else { -1.0 };
    (0..n)
        .map(|k| {
            input
                .iter()
                .enumerate()
                .map(|(t, &x)| {
                    let angle = sign * 2.0 * std::f64::consts::PI * (k * t) as f64 / n as f64;
                    x * Complex64::from_polar(1.0, angle)
                })
                .sum()
        })
        .collect()
}

pub fn problem(lengths: &[usize], kind: gpu_fft_accuracy::TransformKind) -> ProblemDescription {
    ProblemDescription::builder(lengths.to_vec(), kind)
        .build()
        .expect("valid problem")
}
