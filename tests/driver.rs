use gpu_fft_accuracy::device::{DeviceMemory, EngineStatus, FftEngine, PlanLayout, PlanRequest};
use gpu_fft_accuracy::driver::{DriverState, ExecutionDriver};
use gpu_fft_accuracy::layout::DeviceLayout;
use gpu_fft_accuracy::sim::{EngineStage, SimDevice, SimEngine};
use gpu_fft_accuracy::{Error, ProblemDescription, TransformKind};

mod common;

fn plan_layout(device: &DeviceLayout, p: &ProblemDescription) -> PlanLayout {
    PlanLayout {
        itype: p.itype(),
        otype: p.otype(),
        ioffset: [0, 0],
        ooffset: [0, 0],
        istride_cm: device.istride_cm().to_vec(),
        idist: device.idist(),
        ostride_cm: device.ostride_cm().to_vec(),
        odist: device.odist(),
    }
}

fn request<'a>(device: &'a DeviceLayout, p: &ProblemDescription) -> PlanRequest<'a> {
    PlanRequest {
        placement: p.placement(),
        kind: p.kind(),
        precision: p.precision(),
        lengths_cm: device.length_cm(),
        batch: p.batch(),
    }
}

#[test]
fn test_state_progression() {
    let engine = common::sim_engine();
    let p = common::problem(&[8], TransformKind::ComplexForward);
    let device = DeviceLayout::from_problem(&p);
    let mut driver = ExecutionDriver::new(&engine, device.context(&p));
    assert_eq!(driver.state(), DriverState::Created);

    driver.bind_description(&plan_layout(&device, &p)).unwrap();
    assert_eq!(driver.state(), DriverState::DescriptionBound);
    driver.create_plan(request(&device, &p)).unwrap();
    assert_eq!(driver.state(), DriverState::PlanCreated);
    assert_eq!(driver.size_work_buffer().unwrap(), 0);
    assert_eq!(driver.state(), DriverState::WorkBufferSized);
    driver.bind_work_buffer().unwrap();
    assert_eq!(driver.state(), DriverState::WorkBufferBound);

    let memory = engine.memory();
    let input = memory.allocate(64).unwrap();
    let output = memory.allocate(64).unwrap();
    driver.execute(&[input], &[output]).unwrap();
    assert_eq!(driver.state(), DriverState::Executed);

    memory.free(input);
    memory.free(output);
}

#[test]
fn test_out_of_order_calls_fail() {
    let engine = common::sim_engine();
    let p = common::problem(&[8], TransformKind::ComplexForward);
    let device = DeviceLayout::from_problem(&p);
    let mut driver = ExecutionDriver::new(&engine, device.context(&p));

    assert!(driver.create_plan(request(&device, &p)).is_err());
    assert!(driver.bind_work_buffer().is_err());
    assert!(driver.execute(&[], &[]).is_err());
    assert_eq!(driver.state(), DriverState::Created);

    driver.bind_description(&plan_layout(&device, &p)).unwrap();
    let err = driver.bind_description(&plan_layout(&device, &p)).unwrap_err();
    assert!(matches!(err, Error::Engine { op: "description creation", .. }), "{err}");
    assert_eq!(driver.state(), DriverState::DescriptionBound);
}

/// Dropping the driver mid-sequence releases every engine handle it created.
#[test]
fn test_drop_releases_handles() {
    let engine = common::sim_engine();
    let p = common::problem(&[4, 4], TransformKind::RealForward);
    let device = DeviceLayout::from_problem(&p);
    {
        let mut driver = ExecutionDriver::new(&engine, device.context(&p));
        driver.bind_description(&plan_layout(&device, &p)).unwrap();
        driver.create_plan(request(&device, &p)).unwrap();
        driver.size_work_buffer().unwrap();
        driver.bind_work_buffer().unwrap();
        assert_eq!(engine.live_handles(), 3);
    }
    assert_eq!(engine.live_handles(), 0);
}

#[test]
fn test_work_buffer_lifetime() {
    let engine = common::sim_engine().with_work_buffer(128);
    let p = common::problem(&[8], TransformKind::ComplexForward);
    let device = DeviceLayout::from_problem(&p);
    {
        let mut driver = ExecutionDriver::new(&engine, device.context(&p));
        driver.bind_description(&plan_layout(&device, &p)).unwrap();
        driver.create_plan(request(&device, &p)).unwrap();
        assert_eq!(driver.size_work_buffer().unwrap(), 128);
        assert_eq!(driver.work_bytes(), 128);
        driver.bind_work_buffer().unwrap();
        assert_eq!(engine.memory().live(), 1);
        assert_eq!(engine.memory().bytes_in_use(), 128);
    }
    assert_eq!(engine.memory().live(), 0);
    assert_eq!(engine.live_handles(), 0);
}

#[test]
fn test_engine_rejections() {
    let p = common::problem(&[8], TransformKind::ComplexForward);
    let device = DeviceLayout::from_problem(&p);

    let engine = common::sim_engine().with_failure_at(EngineStage::DataLayout);
    let mut driver = ExecutionDriver::new(&engine, device.context(&p));
    let err = driver.bind_description(&plan_layout(&device, &p)).unwrap_err();
    assert!(matches!(err, Error::Engine { op: "data layout registration", .. }), "{err}");
    drop(driver);
    assert_eq!(engine.live_handles(), 0);

    // offsets are not supported by the simulated engine
    let engine = common::sim_engine();
    let mut driver = ExecutionDriver::new(&engine, device.context(&p));
    let mut layout = plan_layout(&device, &p);
    layout.ioffset = [4, 0];
    assert!(driver.bind_description(&layout).is_err());

    // a plan whose strides disagree with its lengths is refused
    let mut driver = ExecutionDriver::new(&engine, device.context(&p));
    let mut layout = plan_layout(&device, &p);
    layout.istride_cm = vec![1, 8];
    driver.bind_description(&layout).unwrap();
    let err = driver.create_plan(request(&device, &p)).unwrap_err();
    assert!(matches!(err, Error::Engine { op: "plan creation", .. }), "{err}");
}

/// An execution info without a large enough scratch buffer is refused.
#[test]
fn test_missing_work_buffer() {
    let engine = SimEngine::new(SimDevice::new(common::DEVICE_BYTES)).with_work_buffer(64);
    let p = common::problem(&[8], TransformKind::ComplexForward);
    let device = DeviceLayout::from_problem(&p);
    let info = engine.create_execution_info().unwrap();
    let plan_request = request(&device, &p);
    let mut description = engine.create_description().unwrap();
    engine.set_data_layout(&mut description, &plan_layout(&device, &p)).unwrap();
    let plan = engine.create_plan(plan_request, &description).unwrap();
    let handle = engine.memory().allocate(64).unwrap();
    let status = engine.execute(&plan, &[handle], &[handle], &info).unwrap_err();
    assert_eq!(status, EngineStatus::InvalidWorkBuffer);

    engine.memory().free(handle);
    engine.destroy_plan(plan);
    engine.destroy_description(description);
    engine.destroy_execution_info(info);
}
