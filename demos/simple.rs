use std::time::Instant;

use gpu_fft_accuracy::gpu::default_engine;
use gpu_fft_accuracy::{
    AccuracyTest, HarnessConfig, Outcome, Placement, ProblemDescription, ReferenceCache,
    TransformKind,
};
use tracing_subscriber::EnvFilter;

pub fn main() -> gpu_fft_accuracy::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = HarnessConfig::from_env();
    let engine = default_engine(1 << 30);
    let cache = ReferenceCache::default();
    let test = AccuracyTest::new(&engine, config);

    let problems = [
        ProblemDescription::builder([1_024], TransformKind::ComplexForward).build()?,
        ProblemDescription::builder([1_024], TransformKind::ComplexInverse)
            .batch(8)
            .build()?,
        ProblemDescription::builder([64, 64], TransformKind::ComplexForward)
            .placement(Placement::InPlace)
            .build()?,
        ProblemDescription::builder([4_096], TransformKind::RealForward).build()?,
        ProblemDescription::builder([128, 256], TransformKind::RealInverse)
            .placement(Placement::InPlace)
            .build()?,
        ProblemDescription::builder([1 << 16], TransformKind::ComplexForward).build()?,
    ];

    // Launch every reference up front; they compute while the device works.
    for p in &problems {
        cache.get(p);
    }

    println!("====================");
    println!("\tAccuracy");
    println!("====================");
    for p in &problems {
        let start_time = Instant::now();
        let outcome = test.run_cached(p, &cache)?;
        let elapsed_time = start_time.elapsed();
        let label = format!("{:?} {:?} batch {}", p.kind(), p.lengths(), p.batch());
        match outcome {
            Outcome::Skipped(reason) => println!("{label}: skipped ({reason:?})"),
            Outcome::Passed(report) => println!(
                "{label}: passed in {elapsed_time:?}, normalized L2 {:.3e}",
                report.verdict.l2_ratio
            ),
            Outcome::Failed(report) => println!("{label}: FAILED in {elapsed_time:?}\n{report}"),
        }
    }
    Ok(())
}
