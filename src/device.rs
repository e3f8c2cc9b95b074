//! Contracts of the device-side collaborators: memory and the FFT engine.
//!
//! The harness never talks to a driver directly. Anything that can allocate,
//! copy and free device bytes implements [`DeviceMemory`]; anything that can
//! plan and execute a transform over those bytes implements [`FftEngine`].
//! Engine lengths, strides and distances are always **column-major**.

use std::fmt;
use std::ops::Deref;

use thiserror::Error;

use crate::problem::{ArrayType, Placement, Precision, TransformKind};

/// Non-success status of a device memory call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceStatus {
    #[error("out of device memory ({requested} bytes requested)")]
    OutOfMemory { requested: usize },
    #[error("invalid device handle")]
    InvalidHandle,
    #[error("size mismatch: buffer holds {buffer} bytes, transfer moves {transfer}")]
    SizeMismatch { buffer: usize, transfer: usize },
    #[error("device error: {0}")]
    Backend(String),
}

/// Non-success status of an engine call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineStatus {
    #[error("engine failure: {0}")]
    Failure(String),
    #[error("invalid argument value: {0}")]
    InvalidArgValue(String),
    #[error("invalid dimensions")]
    InvalidDimensions,
    #[error("invalid array type {0} -> {1}")]
    InvalidArrayType(ArrayType, ArrayType),
    #[error("invalid strides")]
    InvalidStrides,
    #[error("invalid distance")]
    InvalidDistance,
    #[error("invalid work buffer")]
    InvalidWorkBuffer,
    #[error("device call failed inside the engine: {0}")]
    Device(#[from] DeviceStatus),
}

/// Allocate/copy/free contract over device memory.
///
/// Transfers are synchronous and always move the whole buffer.
pub trait DeviceMemory {
    /// Device pointer equivalent.
    type Handle: Clone + fmt::Debug;

    fn allocate(&self, bytes: usize) -> Result<Self::Handle, DeviceStatus>;

    fn copy_to_device(&self, dst: &Self::Handle, src: &[u8]) -> Result<(), DeviceStatus>;

    fn copy_to_host(&self, src: &Self::Handle, dst: &mut [u8]) -> Result<(), DeviceStatus>;

    fn free(&self, handle: Self::Handle);

    /// Bytes currently available for new allocations.
    fn available_bytes(&self) -> u64;
}

/// Data layout registered on an engine description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanLayout {
    pub itype: ArrayType,
    pub otype: ArrayType,
    pub ioffset: [usize; 2],
    pub ooffset: [usize; 2],
    pub istride_cm: Vec<usize>,
    pub idist: usize,
    pub ostride_cm: Vec<usize>,
    pub odist: usize,
}

/// Parameters of a plan request, all column-major.
#[derive(Debug, Clone, Copy)]
pub struct PlanRequest<'a> {
    pub placement: Placement,
    pub kind: TransformKind,
    pub precision: Precision,
    pub lengths_cm: &'a [usize],
    pub batch: usize,
}

/// Handle type of an engine's memory.
pub type EngineHandle<E> = <<E as FftEngine>::Memory as DeviceMemory>::Handle;

/// A device FFT engine under test.
pub trait FftEngine {
    type Memory: DeviceMemory;
    type Description;
    type Plan;
    type ExecutionInfo;

    /// Memory the engine's buffers live in.
    fn memory(&self) -> &Self::Memory;

    fn create_description(&self) -> Result<Self::Description, EngineStatus>;

    fn set_data_layout(
        &self,
        description: &mut Self::Description,
        layout: &PlanLayout,
    ) -> Result<(), EngineStatus>;

    fn create_plan(
        &self,
        request: PlanRequest<'_>,
        description: &Self::Description,
    ) -> Result<Self::Plan, EngineStatus>;

    /// Scratch bytes the plan needs during execution; may be zero.
    fn work_buffer_size(&self, plan: &Self::Plan) -> Result<usize, EngineStatus>;

    fn create_execution_info(&self) -> Result<Self::ExecutionInfo, EngineStatus>;

    fn set_work_buffer(
        &self,
        info: &mut Self::ExecutionInfo,
        buffer: &<Self::Memory as DeviceMemory>::Handle,
        bytes: usize,
    ) -> Result<(), EngineStatus>;

    /// Runs the plan once; returns when the output is complete.
    fn execute(
        &self,
        plan: &Self::Plan,
        inputs: &[<Self::Memory as DeviceMemory>::Handle],
        outputs: &[<Self::Memory as DeviceMemory>::Handle],
        info: &Self::ExecutionInfo,
    ) -> Result<(), EngineStatus>;

    fn destroy_plan(&self, plan: Self::Plan);

    fn destroy_description(&self, description: Self::Description);

    fn destroy_execution_info(&self, info: Self::ExecutionInfo);
}

/// Owns one collaborator handle and releases it through `release` on drop.
pub struct Scoped<'a, O: ?Sized, H> {
    owner: &'a O,
    handle: Option<H>,
    release: fn(&O, H),
}

impl<'a, O: ?Sized, H> Scoped<'a, O, H> {
    pub fn new(owner: &'a O, handle: H, release: fn(&O, H)) -> Self {
        Scoped {
            owner,
            handle: Some(handle),
            release,
        }
    }

    /// Mutable access for calls that configure the handle in place.
    pub fn get_mut(&mut self) -> &mut H {
        self.handle.as_mut().expect("scoped handle is present until drop")
    }
}

impl<O: ?Sized, H> Deref for Scoped<'_, O, H> {
    type Target = H;

    fn deref(&self) -> &H {
        self.handle.as_ref().expect("scoped handle is present until drop")
    }
}

impl<O: ?Sized, H> Drop for Scoped<'_, O, H> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            (self.release)(self.owner, handle);
        }
    }
}
