use std::sync::Arc;

use anyhow::Result;
use kernel_fallback::legacy::{
    CollectiveExecutorHandle, Device, EagerContext, ModelMetadata, HOST_CPU_DEVICE_NAME,
};
use kernel_fallback::runtime::{RequestContextBuilder, ResourceContext, ResourceKey};
use kernel_fallback::{
    execute_op, get_device, setup_request_context, setup_request_context_from_eager, Code,
    DeviceManager, ErrorCode, ExecutionContext, FallbackConfig, FunctionLibraryRuntime,
    HostContext, KernelRegistry, Location, OpKernelRunnerTable, RequestStateOptions,
};

use crate::common::{self, Harness};

fn function_library(device_manager: &Arc<DeviceManager>) -> Arc<FunctionLibraryRuntime> {
    Arc::new(FunctionLibraryRuntime::new(
        Arc::clone(device_manager),
        KernelRegistry::with_builtin_kernels(),
    ))
}

#[test]
fn setup_attaches_fresh_state() -> Result<()> {
    let harness = Harness::new()?;
    let state = harness.request_state()?;
    assert_eq!(state.step_id(), common::REQUEST_ID);
    assert_eq!(state.step_container().step_id(), common::REQUEST_ID);
    assert!(state.rendezvous().is_none());
    assert!(state.collective_executor().is_none());
    assert!(state.custom_device().is_none());
    assert!(!state.log_device_placement());

    let table = harness
        .resource_context
        .get_or_create_resource::<OpKernelRunnerTable>(ResourceKey::RunnerTable)?;
    assert!(Arc::ptr_eq(&table, state.runner_table()));
    Ok(())
}

#[test]
fn setup_twice_is_rejected() -> Result<()> {
    let device_manager = Arc::new(DeviceManager::with_host_cpu());
    let mut builder = RequestContextBuilder::new(3, ResourceContext::new());
    setup_request_context(
        &mut builder,
        Arc::clone(&device_manager),
        function_library(&device_manager),
        RequestStateOptions::default(),
    )?;
    let err = setup_request_context(
        &mut builder,
        Arc::clone(&device_manager),
        function_library(&device_manager),
        RequestStateOptions::default(),
    )
    .unwrap_err();
    assert_eq!(err.code(), Code::AlreadyExists);
    Ok(())
}

#[test]
fn setup_requires_host_cpu() -> Result<()> {
    let device_manager = Arc::new(DeviceManager::new(vec![Arc::new(Device::new(
        "/job:localhost/replica:0/task:0/device:GPU:0",
        "GPU",
    ))]));
    let mut builder = RequestContextBuilder::new(4, ResourceContext::new());
    let err = setup_request_context(
        &mut builder,
        Arc::clone(&device_manager),
        function_library(&device_manager),
        RequestStateOptions::default(),
    )
    .unwrap_err();
    assert_eq!(err.code(), Code::FailedPrecondition);
    Ok(())
}

#[test]
fn requests_sharing_resources_share_runner_table() -> Result<()> {
    let device_manager = Arc::new(DeviceManager::with_host_cpu());
    let resources = ResourceContext::new();
    let mut first = RequestContextBuilder::new(10, Arc::clone(&resources));
    let mut second = RequestContextBuilder::new(11, Arc::clone(&resources));
    for builder in [&mut first, &mut second] {
        setup_request_context(
            builder,
            Arc::clone(&device_manager),
            function_library(&device_manager),
            RequestStateOptions::default(),
        )?;
    }
    let first = first.build();
    let second = second.build();
    let first_state = first
        .get_data_if_exists::<kernel_fallback::FallbackRequestState>()
        .expect("first state");
    let second_state = second
        .get_data_if_exists::<kernel_fallback::FallbackRequestState>()
        .expect("second state");
    assert!(Arc::ptr_eq(
        first_state.runner_table(),
        second_state.runner_table()
    ));
    assert!(Arc::ptr_eq(
        first_state.resource_array(),
        second_state.resource_array()
    ));
    assert!(!Arc::ptr_eq(
        first_state.step_container(),
        second_state.step_container()
    ));
    Ok(())
}

#[test]
fn eager_setup_reuses_step_resources() -> Result<()> {
    let device_manager = Arc::new(DeviceManager::with_host_cpu());
    let eager = EagerContext::new(
        Arc::clone(&device_manager),
        function_library(&device_manager),
        42,
    )?
    .with_collective_executor(CollectiveExecutorHandle::new(42));
    let mut builder = RequestContextBuilder::new(5, ResourceContext::new());
    setup_request_context_from_eager(&mut builder, &eager, RequestStateOptions::default())?;
    let request = builder.build();
    let state = request
        .get_data_if_exists::<kernel_fallback::FallbackRequestState>()
        .expect("state");
    assert!(Arc::ptr_eq(state.step_container(), eager.step_container()));
    let collective = state.collective_executor().expect("collective executor");
    assert_eq!(collective.step_id(), 42);
    assert!(state.rendezvous().is_some());
    Ok(())
}

#[test]
fn model_metadata_becomes_session_metadata() -> Result<()> {
    let options = RequestStateOptions {
        model_metadata: Some(ModelMetadata {
            name: "resnet".to_string(),
            version: 3,
        }),
        ..Default::default()
    };
    let harness = Harness::with_options(FallbackConfig::default(), options)?;
    let metadata = harness.request_state()?.session_metadata();
    assert_eq!(metadata.name, "resnet");
    assert_eq!(metadata.version, 3);
    Ok(())
}

#[test]
fn user_pool_installs_custom_device() -> Result<()> {
    let pool = Arc::new(rayon::ThreadPoolBuilder::new().num_threads(1).build()?);
    let options = RequestStateOptions {
        user_intra_op_pool: Some(pool),
        ..Default::default()
    };
    let harness = Harness::with_options(FallbackConfig::default(), options)?;
    let custom = harness
        .request_state()?
        .custom_device()
        .cloned()
        .expect("custom device");
    assert!(custom.intra_op_pool().is_some());
    assert_eq!(custom.name(), HOST_CPU_DEVICE_NAME);

    let device = get_device(&harness.exec_ctx, common::CPU)?;
    assert!(Arc::ptr_eq(&device, &custom));
    Ok(())
}

#[test]
fn get_device_without_custom_device() -> Result<()> {
    let harness = Harness::new()?;
    let device = get_device(&harness.exec_ctx, common::CPU)?;
    assert_eq!(device.name(), HOST_CPU_DEVICE_NAME);
    assert!(device.intra_op_pool().is_none());

    let err = get_device(&harness.exec_ctx, "/device:TPU:0").unwrap_err();
    assert_eq!(err.code(), ErrorCode::NotFound);
    Ok(())
}

#[test]
fn log_device_placement_toggles() -> Result<()> {
    let harness = Harness::new()?;
    let state = harness.request_state()?;
    state.set_log_device_placement(true);
    assert!(state.log_device_placement());
    state.set_log_device_placement(false);
    assert!(!state.log_device_placement());
    Ok(())
}

#[test]
fn missing_request_state_fails_every_result() -> Result<()> {
    let host = HostContext::new(&FallbackConfig::default())?;
    let request = RequestContextBuilder::new(9, ResourceContext::new()).build();
    let exec_ctx = ExecutionContext::new(host, request, Location::new(1));
    let results = execute_op(&exec_ctx, &[common::scalar_arg(1i32)], 2, 0, "AddV2");
    for result in &results {
        let err = common::expect_error(result)?;
        assert_eq!(err.code(), ErrorCode::NotFound);
        assert!(err
            .message()
            .contains("FallbackRequestState not found in RequestContext."));
    }
    Ok(())
}
