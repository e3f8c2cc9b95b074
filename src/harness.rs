//! One accuracy-test invocation, end to end.
//!
//! ```text
//! precheck ─▶ legality ─▶ host budget ─▶ layout ─▶ description/plan/work size
//!     ─▶ device budget ─▶ work buffer ─▶ allocate + upload ─▶ execute
//!     ─▶ download ─▶ norms ∥ distance ─▶ verdict
//! ```
//!
//! Every step before the first device allocation may end the invocation with
//! a [`SkipDecision`]. Hard failures after that point are [`Error`]s; every
//! resource acquired so far is released by its guard either way.

use std::sync::Arc;

use tracing::{debug, info};

use crate::budget;
use crate::buffer::{
    buffer_sizes, copy_buffers, covering_dist, print_buffer, print_buffer_flat, BufferFailure,
    DeviceBufferSet, HostBufferSet, View,
};
use crate::config::HarnessConfig;
use crate::deferred::Deferred;
use crate::device::{DeviceMemory, FftEngine, PlanLayout, PlanRequest};
use crate::driver::ExecutionDriver;
use crate::error::{Error, Result};
use crate::layout::LogicalLayout;
use crate::legality::{self, SkipDecision};
use crate::problem::{ProblemContext, ProblemDescription};
use crate::reference::{ReferenceBundle, ReferenceCache, ReferenceProvider};
use crate::validation::{distance, norm, Thresholds, ValidationReport};

/// Result of one invocation that did not fail hard.
#[derive(Debug, Clone)]
pub enum Outcome {
    Skipped(SkipDecision),
    Passed(ValidationReport),
    Failed(ValidationReport),
}

impl Outcome {
    pub fn is_skipped(&self) -> bool {
        matches!(self, Outcome::Skipped(_))
    }

    pub fn is_passed(&self) -> bool {
        matches!(self, Outcome::Passed(_))
    }

    pub fn report(&self) -> Option<&ValidationReport> {
        match self {
            Outcome::Skipped(_) => None,
            Outcome::Passed(report) | Outcome::Failed(report) => Some(report),
        }
    }

    pub fn skip_reason(&self) -> Option<SkipDecision> {
        match self {
            Outcome::Skipped(reason) => Some(*reason),
            _ => None,
        }
    }
}

fn transfer_error(op: &str, failure: BufferFailure, context: &ProblemContext) -> Error {
    Error::resource(
        format!("{op} of buffer {} ({} bytes)", failure.index, failure.bytes),
        failure.status,
        context,
    )
}

/// Runs accuracy tests against one engine.
pub struct AccuracyTest<'e, E> {
    engine: &'e E,
    config: HarnessConfig,
}

impl<'e, E: FftEngine> AccuracyTest<'e, E> {
    pub fn new(engine: &'e E, config: HarnessConfig) -> Self {
        AccuracyTest { engine, config }
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Runs `problem`, taking its reference from `cache`.
    ///
    /// The reference is only requested once the early host check passes, so
    /// a configuration that cannot fit never launches its reference computation.
    pub fn run_cached<P: ReferenceProvider + 'static>(
        &self,
        problem: &ProblemDescription,
        cache: &ReferenceCache<P>,
    ) -> Result<Outcome> {
        let decision = budget::precheck_host(problem, &self.config);
        if !decision.is_proceed() {
            return Ok(Outcome::Skipped(decision));
        }
        self.run(problem, &cache.get(problem))
    }

    /// Runs `problem` against a (possibly still computing) reference bundle.
    pub fn run(
        &self,
        problem: &ProblemDescription,
        reference: &Deferred<ReferenceBundle>,
    ) -> Result<Outcome> {
        let config = &self.config;
        for decision in [budget::precheck_host(problem, config), legality::check(problem)] {
            if !decision.is_proceed() {
                return Ok(Outcome::Skipped(decision));
            }
        }
        let logical = LogicalLayout::new(problem);
        let decision = budget::check_host(problem, &logical, config);
        if !decision.is_proceed() {
            return Ok(Outcome::Skipped(decision));
        }

        let device = logical.to_device();
        let context = device.context(problem);
        let precision = problem.precision();
        let batch = problem.batch();
        let (itype, otype) = (problem.itype(), problem.otype());
        if config.verbose(1) {
            info!("{context}");
        }

        let mut driver = ExecutionDriver::new(self.engine, context.clone());
        driver.bind_description(&PlanLayout {
            itype,
            otype,
            ioffset: [0, 0],
            ooffset: [0, 0],
            istride_cm: device.istride_cm().to_vec(),
            idist: device.idist(),
            ostride_cm: device.ostride_cm().to_vec(),
            odist: device.odist(),
        })?;
        driver.create_plan(PlanRequest {
            placement: problem.placement(),
            kind: problem.kind(),
            precision,
            lengths_cm: device.length_cm(),
            batch,
        })?;
        let work_bytes = driver.size_work_buffer()?;

        let in_place = problem.is_in_place();
        let mut input_sizes = buffer_sizes(precision, itype, device.idist(), batch);
        let output_sizes = buffer_sizes(precision, otype, device.odist(), batch);
        if in_place {
            // one buffer set holds both sides
            for (shared, &out) in input_sizes.iter_mut().zip(&output_sizes) {
                *shared = (*shared).max(out);
            }
        }
        let required = budget::device_bytes(
            input_sizes.iter().sum(),
            output_sizes.iter().sum(),
            work_bytes,
            in_place,
        );
        let memory = self.engine.memory();
        let decision = budget::check_device(required, memory.available_bytes());
        if !decision.is_proceed() {
            return Ok(Outcome::Skipped(decision));
        }
        driver.bind_work_buffer()?;

        let inputs = DeviceBufferSet::allocate(memory, &input_sizes)
            .map_err(|f| transfer_error("device allocation", f, &context))?;
        let outputs = if in_place {
            None
        } else {
            Some(
                DeviceBufferSet::allocate(memory, &output_sizes)
                    .map_err(|f| transfer_error("device allocation", f, &context))?,
            )
        };
        debug!(?input_sizes, ?output_sizes, work_bytes, "device buffers allocated");

        let reference = reference.get();
        let input_view = View {
            stride: logical.istride(),
            dist: logical.idist(),
        };
        let output_view = View {
            stride: logical.ostride(),
            dist: logical.odist(),
        };
        // host sets span whole device buffers so every transfer moves the full buffer
        let (host_idist, host_odist) = match input_sizes.first() {
            Some(&shared) if in_place => (
                covering_dist(precision, itype, shared, batch),
                covering_dist(precision, otype, shared, batch),
            ),
            _ => (logical.idist(), logical.odist()),
        };
        let mut host_input = HostBufferSet::zeroed(precision, itype, host_idist, batch);
        copy_buffers(
            &reference.input,
            reference.layout.input_view(),
            &mut host_input,
            input_view,
            logical.ilength(),
            batch,
        );
        if config.verbose(4) {
            let text = print_buffer(&host_input, input_view, logical.ilength(), batch);
            debug!("GPU input:\n{text}");
        }
        if config.verbose(5) {
            debug!("flat GPU input:\n{}", print_buffer_flat(&host_input));
        }
        inputs
            .upload(&host_input)
            .map_err(|f| transfer_error("host to device copy", f, &context))?;

        let output_set = outputs.as_ref().unwrap_or(&inputs);
        driver.execute(&inputs.handles(), &output_set.handles())?;

        let mut host_output = HostBufferSet::zeroed(precision, otype, host_odist, batch);
        output_set
            .download(&mut host_output)
            .map_err(|f| transfer_error("device to host copy", f, &context))?;
        drop(driver);
        drop(outputs);
        drop(inputs);

        if config.verbose(2) {
            let text = print_buffer(&host_output, output_view, logical.olength(), batch);
            debug!("GPU output:\n{text}");
        }
        if config.verbose(5) {
            debug!("flat GPU output:\n{}", print_buffer_flat(&host_output));
        }

        let host_output = Arc::new(host_output);
        let device_norms = {
            let buffer = Arc::clone(&host_output);
            let stride = logical.ostride().to_vec();
            let length = logical.olength().to_vec();
            let dist = logical.odist();
            Deferred::spawn(move || {
                let view = View { stride: &stride, dist };
                norm(&buffer, view, &length, batch)
            })
        };

        let thresholds =
            Thresholds::derive(precision, problem.total_length(), &reference.output_norms);
        let diff = distance(
            &reference.output,
            reference.layout.output_view(),
            &host_output,
            output_view,
            logical.olength(),
            batch,
            thresholds.linf_cutoff,
        );
        let device_norms = *device_norms.get();
        let verdict = thresholds.verdict(&diff.norms, &reference.output_norms, &device_norms);
        let report = ValidationReport {
            device_norms,
            reference_norms: reference.output_norms,
            diff: diff.norms,
            thresholds,
            verdict,
            failures: diff.failures,
            context,
        };
        report.log();
        if report.passed() {
            Ok(Outcome::Passed(report))
        } else {
            Ok(Outcome::Failed(report))
        }
    }
}
