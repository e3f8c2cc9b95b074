//! Sequencing of engine calls for one invocation.
//!
//! ```text
//! Created ─▶ DescriptionBound ─▶ PlanCreated ─▶ WorkBufferSized
//!     ─▶ WorkBufferBound ─▶ Executed
//! (any state) ─drop─▶ Destroyed
//! ```
//!
//! Every engine handle the driver creates is held in a [`Scoped`] guard and
//! the work buffer in a [`DeviceBuffer`], so dropping the driver from any
//! state releases whatever exists, in reverse order of creation.

use std::fmt;

use tracing::debug;

use crate::buffer::DeviceBuffer;
use crate::device::{EngineHandle, EngineStatus, FftEngine, PlanLayout, PlanRequest, Scoped};
use crate::error::{Error, Result};
use crate::problem::ProblemContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DriverState {
    Created,
    DescriptionBound,
    PlanCreated,
    WorkBufferSized,
    WorkBufferBound,
    Executed,
    Destroyed,
}

impl fmt::Display for DriverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Owns the engine-side resources of one invocation.
// Field order is drop order: work buffer, execution info, plan, description.
pub struct ExecutionDriver<'e, E: FftEngine> {
    work: Option<DeviceBuffer<'e, E::Memory>>,
    info: Option<Scoped<'e, E, E::ExecutionInfo>>,
    plan: Option<Scoped<'e, E, E::Plan>>,
    description: Option<Scoped<'e, E, E::Description>>,
    engine: &'e E,
    context: ProblemContext,
    work_bytes: usize,
    state: DriverState,
}

impl<'e, E: FftEngine> ExecutionDriver<'e, E> {
    pub fn new(engine: &'e E, context: ProblemContext) -> Self {
        ExecutionDriver {
            work: None,
            info: None,
            plan: None,
            description: None,
            engine,
            context,
            work_bytes: 0,
            state: DriverState::Created,
        }
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    /// Scratch bytes reported by the plan; zero until sized.
    pub fn work_bytes(&self) -> usize {
        self.work_bytes
    }

    fn require(&self, expected: DriverState, op: &'static str) -> Result<()> {
        if self.state != expected {
            let message = format!("called in state {}, expected {expected}", self.state);
            return Err(self.fail(op, EngineStatus::Failure(message)));
        }
        Ok(())
    }

    fn advance(&mut self, next: DriverState) {
        debug!(from = %self.state, to = %next, "driver transition");
        self.state = next;
    }

    fn fail(&self, op: &'static str, status: EngineStatus) -> Error {
        Error::engine(op, status, &self.context)
    }

    /// Creates the engine description and registers the device-facing layout on it.
    pub fn bind_description(&mut self, layout: &PlanLayout) -> Result<()> {
        self.require(DriverState::Created, "description creation")?;
        let engine = self.engine;
        let created = engine
            .create_description()
            .map_err(|status| self.fail("description creation", status))?;
        let mut description = Scoped::new(engine, created, E::destroy_description);
        engine
            .set_data_layout(description.get_mut(), layout)
            .map_err(|status| self.fail("data layout registration", status))?;
        self.description = Some(description);
        self.advance(DriverState::DescriptionBound);
        Ok(())
    }

    /// Builds the plan. Failure here is always a hard error.
    pub fn create_plan(&mut self, request: PlanRequest<'_>) -> Result<()> {
        self.require(DriverState::DescriptionBound, "plan creation")?;
        let engine = self.engine;
        let plan = match &self.description {
            Some(description) => engine.create_plan(request, description),
            None => Err(EngineStatus::Failure("no description bound".into())),
        }
        .map_err(|status| self.fail("plan creation", status))?;
        self.plan = Some(Scoped::new(engine, plan, E::destroy_plan));
        self.advance(DriverState::PlanCreated);
        Ok(())
    }

    /// Queries the plan's scratch requirement.
    pub fn size_work_buffer(&mut self) -> Result<usize> {
        self.require(DriverState::PlanCreated, "work buffer size query")?;
        let bytes = match &self.plan {
            Some(plan) => self.engine.work_buffer_size(plan),
            None => Err(EngineStatus::Failure("no plan created".into())),
        }
        .map_err(|status| self.fail("work buffer size query", status))?;
        debug!(bytes, "work buffer sized");
        self.work_bytes = bytes;
        self.advance(DriverState::WorkBufferSized);
        Ok(bytes)
    }

    /// Creates the execution info and, for a non-zero requirement, allocates
    /// and binds a scratch buffer.
    pub fn bind_work_buffer(&mut self) -> Result<()> {
        self.require(DriverState::WorkBufferSized, "execution info creation")?;
        let engine = self.engine;
        let created = engine
            .create_execution_info()
            .map_err(|status| self.fail("execution info creation", status))?;
        let mut info = Scoped::new(engine, created, E::destroy_execution_info);
        if self.work_bytes > 0 {
            let work = DeviceBuffer::allocate(engine.memory(), self.work_bytes).map_err(|status| {
                Error::resource("work buffer allocation", status, &self.context)
            })?;
            engine
                .set_work_buffer(info.get_mut(), work.handle(), self.work_bytes)
                .map_err(|status| self.fail("work buffer binding", status))?;
            self.work = Some(work);
        }
        self.info = Some(info);
        self.advance(DriverState::WorkBufferBound);
        Ok(())
    }

    /// Runs the plan once over the given device buffers.
    pub fn execute(
        &mut self,
        inputs: &[EngineHandle<E>],
        outputs: &[EngineHandle<E>],
    ) -> Result<()> {
        self.require(DriverState::WorkBufferBound, "execution")?;
        let result = match (&self.plan, &self.info) {
            (Some(plan), Some(info)) => self.engine.execute(plan, inputs, outputs, info),
            _ => Err(EngineStatus::Failure("plan or execution info missing".into())),
        };
        result.map_err(|status| self.fail("execution", status))?;
        self.advance(DriverState::Executed);
        Ok(())
    }
}

impl<E: FftEngine> Drop for ExecutionDriver<'_, E> {
    fn drop(&mut self) {
        self.advance(DriverState::Destroyed);
    }
}
