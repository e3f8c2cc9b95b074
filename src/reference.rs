//! Host reference transforms, computed once per problem shape and shared.
//!
//! A reference bundle depends only on `(lengths, batch, precision, kind)`:
//! every stride, placement and array-type variation of the same shape
//! compares against the same input and output. [`ReferenceCache`] launches
//! each bundle on a background thread the first time its shape is requested
//! and hands out the same [`Arc`] to every later caller.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use num_complex::Complex64;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::buffer::{HostBufferSet, View};
use crate::deferred::Deferred;
use crate::problem::{ArrayType, Precision, ProblemDescription, TransformKind};
use crate::transform::{complex_nd, packed_shape, real_forward, real_inverse};
use crate::validation::{norm, VectorNorms};

/// Identifies one reference computation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReferenceKey {
    pub lengths: Vec<usize>,
    pub batch: usize,
    pub precision: Precision,
    pub kind: TransformKind,
}

impl ReferenceKey {
    #[must_use]
    pub fn of(problem: &ProblemDescription) -> Self {
        ReferenceKey {
            lengths: problem.lengths().to_vec(),
            batch: problem.batch(),
            precision: problem.precision(),
            kind: problem.kind(),
        }
    }
}

/// Row-major, contiguous description of the reference arrays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceLayout {
    pub ilength: Vec<usize>,
    pub olength: Vec<usize>,
    pub istride: Vec<usize>,
    pub ostride: Vec<usize>,
    pub idist: usize,
    pub odist: usize,
    pub itype: ArrayType,
    pub otype: ArrayType,
}

impl ReferenceLayout {
    #[must_use]
    pub fn contiguous(lengths: &[usize], kind: TransformKind) -> Self {
        let (ilength, olength, itype, otype) = match kind {
            TransformKind::ComplexForward | TransformKind::ComplexInverse => (
                lengths.to_vec(),
                lengths.to_vec(),
                ArrayType::ComplexInterleaved,
                ArrayType::ComplexInterleaved,
            ),
            TransformKind::RealForward => (
                lengths.to_vec(),
                packed_shape(lengths),
                ArrayType::Real,
                ArrayType::HermitianInterleaved,
            ),
            TransformKind::RealInverse => (
                packed_shape(lengths),
                lengths.to_vec(),
                ArrayType::HermitianInterleaved,
                ArrayType::Real,
            ),
        };
        ReferenceLayout {
            istride: crate::layout::contiguous_stride(&ilength, &[], false),
            ostride: crate::layout::contiguous_stride(&olength, &[], false),
            idist: ilength.iter().product(),
            odist: olength.iter().product(),
            ilength,
            olength,
            itype,
            otype,
        }
    }

    pub fn input_view(&self) -> View<'_> {
        View {
            stride: &self.istride,
            dist: self.idist,
        }
    }

    pub fn output_view(&self) -> View<'_> {
        View {
            stride: &self.ostride,
            dist: self.odist,
        }
    }
}

/// Reference input and output of one shape, with their norms.
#[derive(Debug, Clone)]
pub struct ReferenceBundle {
    pub input: HostBufferSet,
    pub output: HostBufferSet,
    pub input_norms: VectorNorms,
    pub output_norms: VectorNorms,
    pub layout: ReferenceLayout,
}

/// A trusted host FFT implementation.
pub trait ReferenceProvider: Send + Sync {
    fn compute(&self, key: &ReferenceKey) -> ReferenceBundle;
}

/// f64 reference built on rustfft, fed with seeded pseudo-random input.
///
/// Inputs are rounded to the problem precision so the device consumes
/// exactly the values the reference transformed.
#[derive(Debug, Clone, Copy)]
pub struct RustFftReference {
    pub seed: u64,
}

impl Default for RustFftReference {
    fn default() -> Self {
        RustFftReference { seed: 0x5eed_f0f7 }
    }
}

impl ReferenceProvider for RustFftReference {
    fn compute(&self, key: &ReferenceKey) -> ReferenceBundle {
        let layout = ReferenceLayout::contiguous(&key.lengths, key.kind);
        let batch = key.batch;
        let precision = key.precision;
        let total: usize = key.lengths.iter().product();
        let seed = self.seed ^ (total as u64).rotate_left(17) ^ batch as u64;
        let mut rng = StdRng::seed_from_u64(seed);
        let mut sample = || precision.round(rng.gen_range(-1.0..1.0));

        let mut input = HostBufferSet::zeroed(precision, layout.itype, layout.idist, batch);
        let mut output = HostBufferSet::zeroed(precision, layout.otype, layout.odist, batch);

        match key.kind {
            TransformKind::ComplexForward | TransformKind::ComplexInverse => {
                let mut data: Vec<Complex64> =
                    (0..total * batch).map(|_| Complex64::new(sample(), sample())).collect();
                for (i, v) in data.iter().enumerate() {
                    input.set(i, *v);
                }
                complex_nd(&mut data, &key.lengths, key.kind == TransformKind::ComplexInverse);
                for (i, v) in data.iter().enumerate() {
                    output.set(i, *v);
                }
            }
            TransformKind::RealForward => {
                let data: Vec<f64> = (0..total * batch).map(|_| sample()).collect();
                for (i, &v) in data.iter().enumerate() {
                    input.set(i, Complex64::new(v, 0.0));
                }
                for (i, v) in real_forward(&data, &key.lengths, batch).into_iter().enumerate() {
                    output.set(i, v);
                }
            }
            TransformKind::RealInverse => {
                // Hermitian input is the spectrum of a real signal, so it is
                // symmetric by construction.
                let signal: Vec<f64> = (0..total * batch).map(|_| sample()).collect();
                let spectrum: Vec<Complex64> = real_forward(&signal, &key.lengths, batch)
                    .into_iter()
                    .map(|v| Complex64::new(precision.round(v.re), precision.round(v.im)))
                    .collect();
                for (i, v) in spectrum.iter().enumerate() {
                    input.set(i, *v);
                }
                for (i, v) in real_inverse(&spectrum, &key.lengths, batch).into_iter().enumerate() {
                    output.set(i, Complex64::new(v, 0.0));
                }
            }
        }

        let input_norms = norm(&input, layout.input_view(), &layout.ilength, batch);
        let output_norms = norm(&output, layout.output_view(), &layout.olength, batch);
        ReferenceBundle {
            input,
            output,
            input_norms,
            output_norms,
            layout,
        }
    }
}

/// Shared, lazily computed reference bundles keyed by problem shape.
pub struct ReferenceCache<P> {
    provider: Arc<P>,
    entries: Mutex<HashMap<ReferenceKey, Arc<Deferred<ReferenceBundle>>>>,
}

impl<P: ReferenceProvider + 'static> ReferenceCache<P> {
    pub fn new(provider: P) -> Self {
        ReferenceCache {
            provider: Arc::new(provider),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// The bundle for `problem`'s shape, launching its computation on first request.
    pub fn get(&self, problem: &ProblemDescription) -> Arc<Deferred<ReferenceBundle>> {
        let key = ReferenceKey::of(problem);
        let mut entries = self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        entries
            .entry(key)
            .or_insert_with_key(|key| {
                debug!(?key, "launching reference computation");
                let provider = Arc::clone(&self.provider);
                let key = key.clone();
                Arc::new(Deferred::spawn(move || provider.compute(&key)))
            })
            .clone()
    }

    /// Number of distinct shapes requested so far.
    pub fn len(&self) -> usize {
        self.entries.lock().map_or(0, |entries| entries.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ReferenceCache<RustFftReference> {
    fn default() -> Self {
        ReferenceCache::new(RustFftReference::default())
    }
}
