//! Accuracy verification for device FFT engines.
//!
//! One [`AccuracyTest`] invocation takes a [`ProblemDescription`], decides
//! whether it can run at all ([`legality`], [`budget`]), translates it into
//! the column-major layout the engine expects ([`layout`]), drives the engine
//! ([`driver`]) over guarded device buffers ([`buffer`]), and compares the
//! result against a shared host reference ([`reference`], [`validation`]).
//!
//! ```
//! use gpu_fft_accuracy::{
//!     AccuracyTest, HarnessConfig, ProblemDescription, ReferenceCache, RustFftReference,
//!     TransformKind,
//! };
//! use gpu_fft_accuracy::sim::{SimDevice, SimEngine};
//!
//! let engine = SimEngine::new(SimDevice::new(1 << 20));
//! let cache = ReferenceCache::new(RustFftReference::default());
//! let problem = ProblemDescription::builder([8], TransformKind::ComplexForward).build()?;
//! let outcome = AccuracyTest::new(&engine, HarnessConfig::default())
//!     .run_cached(&problem, &cache)?;
//! assert!(outcome.is_passed());
//! # Ok::<(), gpu_fft_accuracy::Error>(())
//! ```

pub mod budget;
pub mod buffer;
pub mod config;
pub mod deferred;
pub mod device;
pub mod driver;
pub mod error;
pub mod harness;
pub mod layout;
pub mod legality;
pub mod problem;
pub mod reference;
pub mod sim;
mod staging;
pub mod transform;
pub mod validation;

#[cfg(any(feature = "wgpu", feature = "cuda"))]
pub mod gpu;

pub use config::HarnessConfig;
pub use error::{Error, Result};
pub use harness::{AccuracyTest, Outcome};
pub use legality::SkipDecision;
pub use problem::{ArrayType, Placement, Precision, ProblemDescription, TransformKind};
pub use reference::{ReferenceBundle, ReferenceCache, RustFftReference};
pub use validation::{ValidationReport, VectorNorms};
