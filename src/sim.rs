//! In-process simulated device and FFT engine.
//!
//! [`SimDevice`] is byte-addressed memory with a fixed capacity, allocation
//! counters and fault injection. [`SimEngine`] honors every field of the plan
//! it is given (column-major strides, batch distances, planar and interleaved
//! array types, in-place aliasing, real/Hermitian packing), computes in `f64`
//! on the host and stores results at the plan's precision.

use std::collections::HashMap;
use std::sync::Mutex;

use num_complex::Complex64;
use tracing::trace;

use crate::buffer::HostBufferSet;
use crate::device::{DeviceMemory, DeviceStatus, EngineStatus, FftEngine, PlanLayout, PlanRequest};
use crate::problem::{ArrayType, Placement, Precision, TransformKind};
use crate::staging::{check_buffer_count, StagedPlan};
use crate::transform::{complex_nd, real_forward, real_inverse};

/// Handle to one simulated allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SimHandle(u64);

#[derive(Debug, Default)]
struct SimState {
    next: u64,
    slots: HashMap<u64, Vec<u8>>,
    in_use: u64,
    attempts: usize,
    allocations: usize,
    frees: usize,
    fail_allocation: Option<usize>,
    fail_transfers: bool,
}

/// Simulated device memory.
#[derive(Debug)]
pub struct SimDevice {
    capacity: u64,
    state: Mutex<SimState>,
}

impl SimDevice {
    /// Memory holding at most `capacity` bytes at once.
    pub fn new(capacity: u64) -> Self {
        SimDevice {
            capacity,
            state: Mutex::new(SimState::default()),
        }
    }

    /// Makes the `nth` allocation call (1-based) fail.
    #[must_use]
    pub fn with_allocation_failure(self, nth: usize) -> Self {
        self.lock().fail_allocation = Some(nth);
        self
    }

    /// Makes every host ↔ device copy fail.
    #[must_use]
    pub fn with_transfer_failures(self) -> Self {
        self.lock().fail_transfers = true;
        self
    }

    /// Successful allocations so far.
    pub fn allocations(&self) -> usize {
        self.lock().allocations
    }

    pub fn frees(&self) -> usize {
        self.lock().frees
    }

    /// Allocations not yet freed.
    pub fn live(&self) -> usize {
        self.lock().slots.len()
    }

    pub fn bytes_in_use(&self) -> u64 {
        self.lock().in_use
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn read_slot(&self, handle: &SimHandle) -> Result<Vec<u8>, DeviceStatus> {
        self.lock()
            .slots
            .get(&handle.0)
            .cloned()
            .ok_or(DeviceStatus::InvalidHandle)
    }

    fn write_slot(&self, handle: &SimHandle, bytes: &[u8]) -> Result<(), DeviceStatus> {
        let mut state = self.lock();
        let slot = state.slots.get_mut(&handle.0).ok_or(DeviceStatus::InvalidHandle)?;
        if bytes.len() != slot.len() {
            return Err(DeviceStatus::SizeMismatch {
                buffer: slot.len(),
                transfer: bytes.len(),
            });
        }
        slot.copy_from_slice(bytes);
        Ok(())
    }
}

impl DeviceMemory for SimDevice {
    type Handle = SimHandle;

    fn allocate(&self, bytes: usize) -> Result<SimHandle, DeviceStatus> {
        let mut state = self.lock();
        state.attempts += 1;
        if state.fail_allocation == Some(state.attempts) {
            return Err(DeviceStatus::Backend("injected allocation failure".into()));
        }
        if state.in_use + bytes as u64 > self.capacity {
            return Err(DeviceStatus::OutOfMemory { requested: bytes });
        }
        let id = state.next;
        state.next += 1;
        state.slots.insert(id, vec![0; bytes]);
        state.in_use += bytes as u64;
        state.allocations += 1;
        trace!(id, bytes, "sim allocate");
        Ok(SimHandle(id))
    }

    fn copy_to_device(&self, dst: &SimHandle, src: &[u8]) -> Result<(), DeviceStatus> {
        if self.lock().fail_transfers {
            return Err(DeviceStatus::Backend("injected transfer failure".into()));
        }
        self.write_slot(dst, src)
    }

    fn copy_to_host(&self, src: &SimHandle, dst: &mut [u8]) -> Result<(), DeviceStatus> {
        let state = self.lock();
        if state.fail_transfers {
            return Err(DeviceStatus::Backend("injected transfer failure".into()));
        }
        let slot = state.slots.get(&src.0).ok_or(DeviceStatus::InvalidHandle)?;
        if dst.len() != slot.len() {
            return Err(DeviceStatus::SizeMismatch {
                buffer: slot.len(),
                transfer: dst.len(),
            });
        }
        dst.copy_from_slice(slot);
        Ok(())
    }

    fn free(&self, handle: SimHandle) {
        let mut state = self.lock();
        if let Some(slot) = state.slots.remove(&handle.0) {
            state.in_use -= slot.len() as u64;
            state.frees += 1;
            trace!(id = handle.0, "sim free");
        }
    }

    fn available_bytes(&self) -> u64 {
        self.capacity.saturating_sub(self.lock().in_use)
    }
}

/// Engine call at which [`SimEngine`] injects a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineStage {
    Description,
    DataLayout,
    Plan,
    ExecutionInfo,
    Execute,
}

/// Perturbation applied to one output element after execution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Corruption {
    pub batch: usize,
    /// Row-major linear index in the output's logical index space.
    pub index: usize,
    pub delta: Complex64,
}

#[derive(Debug, Default)]
pub struct SimDescription {
    layout: Option<PlanLayout>,
}

#[derive(Debug, Default)]
pub struct SimExecutionInfo {
    work: Option<(SimHandle, usize)>,
}

#[derive(Debug, Default)]
struct LiveHandles {
    descriptions: usize,
    plans: usize,
    infos: usize,
}

/// Host-computed engine over [`SimDevice`] memory.
#[derive(Debug)]
pub struct SimEngine {
    memory: SimDevice,
    work_bytes: usize,
    fail_at: Option<EngineStage>,
    corruption: Option<Corruption>,
    live: Mutex<LiveHandles>,
}

impl SimEngine {
    pub fn new(memory: SimDevice) -> Self {
        SimEngine {
            memory,
            work_bytes: 0,
            fail_at: None,
            corruption: None,
            live: Mutex::new(LiveHandles::default()),
        }
    }

    /// Scratch bytes every plan reports.
    #[must_use]
    pub fn with_work_buffer(mut self, bytes: usize) -> Self {
        self.work_bytes = bytes;
        self
    }

    #[must_use]
    pub fn with_failure_at(mut self, stage: EngineStage) -> Self {
        self.fail_at = Some(stage);
        self
    }

    #[must_use]
    pub fn with_corruption(mut self, corruption: Corruption) -> Self {
        self.corruption = Some(corruption);
        self
    }

    /// Descriptions, plans and execution infos created but not destroyed.
    pub fn live_handles(&self) -> usize {
        let live = self.live.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        live.descriptions + live.plans + live.infos
    }

    fn track(&self, update: impl FnOnce(&mut LiveHandles)) {
        update(&mut self.live.lock().unwrap_or_else(|poisoned| poisoned.into_inner()));
    }

    fn inject(&self, stage: EngineStage) -> Result<(), EngineStatus> {
        if self.fail_at == Some(stage) {
            return Err(EngineStatus::Failure(format!("injected failure at {stage:?}")));
        }
        Ok(())
    }

    /// Reads `handles` into a host set of `array_type`.
    fn load(
        &self,
        handles: &[SimHandle],
        precision: Precision,
        array_type: ArrayType,
    ) -> Result<HostBufferSet, EngineStatus> {
        check_buffer_count(handles, array_type)?;
        let mut set = HostBufferSet::zeroed(precision, array_type, 0, 0);
        for (i, handle) in handles.iter().enumerate() {
            set.decode(i, &self.memory.read_slot(handle)?);
        }
        Ok(set)
    }
}

impl FftEngine for SimEngine {
    type Memory = SimDevice;
    type Description = SimDescription;
    type Plan = StagedPlan;
    type ExecutionInfo = SimExecutionInfo;

    fn memory(&self) -> &SimDevice {
        &self.memory
    }

    fn create_description(&self) -> Result<SimDescription, EngineStatus> {
        self.inject(EngineStage::Description)?;
        self.track(|live| live.descriptions += 1);
        Ok(SimDescription::default())
    }

    fn set_data_layout(
        &self,
        description: &mut SimDescription,
        layout: &PlanLayout,
    ) -> Result<(), EngineStatus> {
        self.inject(EngineStage::DataLayout)?;
        if layout.ioffset != [0, 0] || layout.ooffset != [0, 0] {
            return Err(EngineStatus::InvalidArgValue("non-zero buffer offsets".into()));
        }
        description.layout = Some(layout.clone());
        Ok(())
    }

    fn create_plan(
        &self,
        request: PlanRequest<'_>,
        description: &SimDescription,
    ) -> Result<StagedPlan, EngineStatus> {
        self.inject(EngineStage::Plan)?;
        let plan = StagedPlan::new(request, description.layout.as_ref())?;
        self.track(|live| live.plans += 1);
        Ok(plan)
    }

    fn work_buffer_size(&self, _plan: &StagedPlan) -> Result<usize, EngineStatus> {
        Ok(self.work_bytes)
    }

    fn create_execution_info(&self) -> Result<SimExecutionInfo, EngineStatus> {
        self.inject(EngineStage::ExecutionInfo)?;
        self.track(|live| live.infos += 1);
        Ok(SimExecutionInfo::default())
    }

    fn set_work_buffer(
        &self,
        info: &mut SimExecutionInfo,
        buffer: &SimHandle,
        bytes: usize,
    ) -> Result<(), EngineStatus> {
        info.work = Some((*buffer, bytes));
        Ok(())
    }

    fn execute(
        &self,
        plan: &StagedPlan,
        inputs: &[SimHandle],
        outputs: &[SimHandle],
        info: &SimExecutionInfo,
    ) -> Result<(), EngineStatus> {
        self.inject(EngineStage::Execute)?;
        if self.work_bytes > 0 && info.work.map_or(true, |(_, bytes)| bytes < self.work_bytes) {
            return Err(EngineStatus::InvalidWorkBuffer);
        }
        let outputs = match plan.placement {
            Placement::InPlace => inputs,
            Placement::NotInPlace => outputs,
        };

        let layout = &plan.layout;
        let input = self.load(inputs, plan.precision, layout.itype)?;
        let mut output = self.load(outputs, plan.precision, layout.otype)?;
        let data = plan.gather(&input)?;
        let (shape, batch) = (&plan.shape, plan.batch);
        let mut result: Vec<Complex64> = match plan.kind {
            TransformKind::ComplexForward | TransformKind::ComplexInverse => {
                let mut data = data;
                complex_nd(&mut data, shape, plan.kind == TransformKind::ComplexInverse);
                data
            }
            TransformKind::RealForward => {
                let real: Vec<f64> = data.iter().map(|v| v.re).collect();
                real_forward(&real, shape, batch)
            }
            TransformKind::RealInverse => real_inverse(&data, shape, batch)
                .into_iter()
                .map(|v| Complex64::new(v, 0.0))
                .collect(),
        };

        if let Some(c) = self.corruption {
            if let Some(v) = result.get_mut(c.batch * plan.output_elements() + c.index) {
                *v += c.delta;
            }
        }
        plan.scatter(&result, &mut output)?;
        for (i, handle) in outputs.iter().enumerate() {
            self.memory.write_slot(handle, &output.encode(i))?;
        }
        Ok(())
    }

    fn destroy_plan(&self, _plan: StagedPlan) {
        self.track(|live| live.plans -= 1);
    }

    fn destroy_description(&self, _description: SimDescription) {
        self.track(|live| live.descriptions -= 1);
    }

    fn destroy_execution_info(&self, _info: SimExecutionInfo) {
        self.track(|live| live.infos -= 1);
    }
}
