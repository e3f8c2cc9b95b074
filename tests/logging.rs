use std::io;
use std::sync::{Arc, Mutex};

use gpu_fft_accuracy::{AccuracyTest, HarnessConfig, TransformKind};
use tracing_subscriber::fmt::MakeWriter;

mod common;

/// Collects formatted log lines in memory.
#[derive(Clone, Default)]
struct Captured(Arc<Mutex<Vec<u8>>>);

impl io::Write for Captured {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for Captured {
    type Writer = Captured;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

fn logged_run(verbosity: u32) -> String {
    let captured = Captured::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(captured.clone())
        .with_max_level(tracing::Level::INFO)
        .with_ansi(false)
        .finish();
    tracing::subscriber::with_default(subscriber, || {
        let engine = common::sim_engine();
        let p = common::problem(&[8], TransformKind::ComplexForward);
        let outcome = AccuracyTest::new(&engine, HarnessConfig::default().with_verbosity(verbosity))
            .run_cached(&p, &common::cache())
            .unwrap();
        assert!(outcome.is_passed(), "{outcome:?}");
    });
    let bytes = captured.0.lock().unwrap().clone();
    String::from_utf8(bytes).unwrap()
}

#[test]
fn test_device_params_need_verbosity_above_one() {
    for quiet in [0, 1] {
        let log = logged_run(quiet);
        assert!(!log.contains("GPU params:"), "verbosity {quiet}: {log}");
    }
    let log = logged_run(2);
    assert!(log.contains("GPU params:"), "{log}");
    assert!(log.contains("gpu_ilength_cm: 8"), "{log}");
}
