use gpu_fft_accuracy::device::FftEngine;
use gpu_fft_accuracy::sim::{Corruption, EngineStage, SimDevice, SimEngine};
use gpu_fft_accuracy::{
    AccuracyTest, ArrayType, Error, HarnessConfig, Outcome, Placement, Precision,
    ProblemDescription, TransformKind,
};
use num_complex::Complex64;

mod common;

fn run(engine: &SimEngine, problem: &ProblemDescription) -> Outcome {
    common::init_tracing();
    AccuracyTest::new(engine, HarnessConfig::default())
        .run_cached(problem, &common::cache())
        .unwrap()
}

// ── End-to-end passes ─────────────────────────────────────────────────────────

#[test]
fn test_complex_forward_1d() {
    let engine = common::sim_engine();
    let outcome = run(&engine, &common::problem(&[8], TransformKind::ComplexForward));
    assert!(outcome.is_passed(), "{outcome:?}");

    let report = outcome.report().unwrap();
    assert!(report.failures.is_empty());
    assert!(report.diff.l_inf < report.thresholds.linf_cutoff);
    assert_eq!(report.context.ilength_cm, vec![8]);
    assert_eq!(engine.memory().allocations(), 2);
    assert_eq!(engine.memory().live(), 0);
    assert_eq!(engine.live_handles(), 0);
}

/// One buffer holds both the 16 reals and the 9 packed complex outputs.
#[test]
fn test_real_forward_in_place() {
    let engine = common::sim_engine();
    let p = ProblemDescription::builder([16], TransformKind::RealForward)
        .placement(Placement::InPlace)
        .build()
        .unwrap();
    let outcome = run(&engine, &p);
    assert!(outcome.is_passed(), "{outcome:?}");

    let context = &outcome.report().unwrap().context;
    assert_eq!(context.idist, 18);
    assert_eq!(context.odist, 9);
    assert_eq!(engine.memory().allocations(), 1);
    assert_eq!(engine.memory().frees(), 1);
}

#[test]
fn test_double_planar_2d_batched() {
    let engine = common::sim_engine();
    let p = ProblemDescription::builder([4, 4], TransformKind::ComplexForward)
        .precision(Precision::Double)
        .batch(3)
        .array_types(ArrayType::ComplexPlanar, ArrayType::ComplexPlanar)
        .build()
        .unwrap();
    let outcome = run(&engine, &p);
    assert!(outcome.is_passed(), "{outcome:?}");
    // 2 input + 2 output buffers of 4·4·3·8 bytes, all live at once
    assert_eq!(engine.memory().allocations(), 4);
    assert_eq!(engine.memory().frees(), 4);
    assert_eq!(engine.memory().live(), 0);
}

#[test]
fn test_real_inverse_double_in_place() {
    let engine = common::sim_engine();
    let p = ProblemDescription::builder([4, 8], TransformKind::RealInverse)
        .placement(Placement::InPlace)
        .precision(Precision::Double)
        .build()
        .unwrap();
    let outcome = run(&engine, &p);
    assert!(outcome.is_passed(), "{outcome:?}");
    assert_eq!(engine.memory().allocations(), 1);
}

/// With equal explicit strides the two sides of an in-place real transform
/// need different extents; the shared buffer covers the larger one.
#[test]
fn test_real_in_place_equal_strides() {
    let engine = common::sim_engine();
    let p = ProblemDescription::builder([4, 8], TransformKind::RealForward)
        .placement(Placement::InPlace)
        .istride([16, 1])
        .ostride([16, 1])
        .build()
        .unwrap();
    let outcome = run(&engine, &p);
    assert!(outcome.is_passed(), "{outcome:?}");
    assert_eq!(engine.memory().allocations(), 1);

    let engine = common::sim_engine();
    let p = ProblemDescription::builder([4, 8], TransformKind::RealInverse)
        .placement(Placement::InPlace)
        .precision(Precision::Double)
        .istride([16, 1])
        .ostride([16, 1])
        .build()
        .unwrap();
    let outcome = run(&engine, &p);
    assert!(outcome.is_passed(), "{outcome:?}");
    assert_eq!(engine.memory().allocations(), 1);
    assert_eq!(engine.memory().live(), 0);
}

#[test]
fn test_real_forward_strided_planar_output() {
    let engine = common::sim_engine();
    let p = ProblemDescription::builder([4, 8], TransformKind::RealForward)
        .ostride([12, 2])
        .array_types(ArrayType::Real, ArrayType::HermitianPlanar)
        .build()
        .unwrap();
    let outcome = run(&engine, &p);
    assert!(outcome.is_passed(), "{outcome:?}");
    assert_eq!(outcome.report().unwrap().context.ostride_cm, vec![2, 12]);
}

#[test]
fn test_complex_strided_batched_input() {
    let engine = common::sim_engine();
    let p = ProblemDescription::builder([16], TransformKind::ComplexForward)
        .istride([2])
        .batch(4)
        .build()
        .unwrap();
    let outcome = run(&engine, &p);
    assert!(outcome.is_passed(), "{outcome:?}");
    assert_eq!(outcome.report().unwrap().context.istride_cm, vec![2]);
}

#[test]
fn test_complex_inverse_mixed_types() {
    let engine = common::sim_engine();
    let p = ProblemDescription::builder([8, 4, 2], TransformKind::ComplexInverse)
        .array_types(ArrayType::ComplexInterleaved, ArrayType::ComplexPlanar)
        .build()
        .unwrap();
    assert!(run(&engine, &p).is_passed());
    assert_eq!(engine.memory().allocations(), 3);
}

/// Diagnostic dumps only render buffers; the verdict is unchanged.
#[test]
fn test_verbose_run() {
    common::init_tracing();
    let engine = common::sim_engine();
    let p = common::problem(&[4, 4], TransformKind::RealForward);
    let outcome = AccuracyTest::new(&engine, HarnessConfig::default().with_verbosity(6))
        .run_cached(&p, &common::cache())
        .unwrap();
    assert!(outcome.is_passed());
}

/// Problems of the same shape share a reference regardless of layout.
#[test]
fn test_layouts_share_reference() {
    let engine = common::sim_engine();
    let cache = common::cache();
    let test = AccuracyTest::new(&engine, HarnessConfig::default());
    for placement in [Placement::InPlace, Placement::NotInPlace] {
        for types in [ArrayType::ComplexInterleaved, ArrayType::ComplexPlanar] {
            let p = ProblemDescription::builder([32], TransformKind::ComplexForward)
                .placement(placement)
                .array_types(types, types)
                .build()
                .unwrap();
            assert!(test.run_cached(&p, &cache).unwrap().is_passed());
        }
    }
    assert_eq!(cache.len(), 1);
}

// ── Detected failures ─────────────────────────────────────────────────────────

#[test]
fn test_corrupted_output_fails() {
    common::init_tracing();
    let engine = common::sim_engine().with_corruption(Corruption {
        batch: 0,
        index: 3,
        delta: Complex64::new(1.0, 0.0),
    });
    let outcome = run(&engine, &common::problem(&[8], TransformKind::ComplexForward));
    let Outcome::Failed(report) = outcome else {
        panic!("expected a failed verdict, got {outcome:?}");
    };
    assert_eq!(report.failures, vec![(0, 3)]);
    assert!(report.verdict.linf_failed);
    assert!(report.verdict.device_norm_finite);

    let text = report.to_string();
    assert!(text.contains("Linf test failed"), "{text}");
    assert!(text.contains("GPU linf norm failures: (0,3)"), "{text}");
    assert!(text.contains("gpu_ilength_cm: 8"), "{text}");
    assert_eq!(engine.memory().live(), 0);
}

#[test]
fn test_nan_output_fails() {
    let engine = common::sim_engine().with_corruption(Corruption {
        batch: 1,
        index: 0,
        delta: Complex64::new(f64::NAN, 0.0),
    });
    let p = ProblemDescription::builder([8], TransformKind::ComplexForward)
        .batch(2)
        .build()
        .unwrap();
    let outcome = run(&engine, &p);
    let report = outcome.report().unwrap();
    assert!(!outcome.is_passed());
    assert!(!report.verdict.device_norm_finite);
    assert_eq!(report.failures, vec![(1, 0)]);
}

// ── Hard failures release everything ──────────────────────────────────────────

#[test]
fn test_transfer_failure() {
    let engine = SimEngine::new(SimDevice::new(common::DEVICE_BYTES).with_transfer_failures());
    let p = common::problem(&[8], TransformKind::ComplexForward);
    let err = AccuracyTest::new(&engine, HarnessConfig::default())
        .run_cached(&p, &common::cache())
        .unwrap_err();
    assert!(matches!(err, Error::Resource { .. }), "{err}");
    assert!(err.to_string().contains("host to device copy"), "{err}");
    assert!(err.to_string().contains("GPU params:"), "{err}");
    assert_eq!(engine.memory().live(), 0);
    assert_eq!(engine.live_handles(), 0);
}

#[test]
fn test_plan_failure() {
    let engine = common::sim_engine().with_failure_at(EngineStage::Plan);
    let p = common::problem(&[8], TransformKind::ComplexForward);
    let err = AccuracyTest::new(&engine, HarnessConfig::default())
        .run_cached(&p, &common::cache())
        .unwrap_err();
    match err {
        Error::Engine { op, .. } => assert_eq!(op, "plan creation"),
        other => panic!("expected an engine error, got {other}"),
    }
    assert_eq!(engine.memory().allocations(), 0);
    assert_eq!(engine.live_handles(), 0);
}

#[test]
fn test_execute_failure() {
    let engine = common::sim_engine().with_work_buffer(32).with_failure_at(EngineStage::Execute);
    let p = common::problem(&[8], TransformKind::ComplexForward);
    let err = AccuracyTest::new(&engine, HarnessConfig::default())
        .run_cached(&p, &common::cache())
        .unwrap_err();
    assert!(matches!(err, Error::Engine { op: "execution", .. }), "{err}");
    // work, input, output
    assert_eq!(engine.memory().allocations(), 3);
    assert_eq!(engine.memory().live(), 0);
    assert_eq!(engine.live_handles(), 0);
}

/// The second allocation fails; the first is released before the error surfaces.
#[test]
fn test_partial_allocation_failure() {
    let engine = SimEngine::new(SimDevice::new(common::DEVICE_BYTES).with_allocation_failure(2));
    let p = common::problem(&[8], TransformKind::ComplexForward);
    let err = AccuracyTest::new(&engine, HarnessConfig::default())
        .run_cached(&p, &common::cache())
        .unwrap_err();
    assert!(matches!(err, Error::Resource { .. }), "{err}");
    assert_eq!(engine.memory().allocations(), 1);
    assert_eq!(engine.memory().frees(), 1);
    assert_eq!(engine.memory().live(), 0);
    assert_eq!(engine.live_handles(), 0);
}
