use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::time::Duration;

use anyhow::{anyhow, Result};
use kernel_fallback::legacy::{
    CancellationManager, LocalRendezvous, OpKernelContext, OpKernelParams, Rendezvous,
    ResourceMgr, ScopedStepContainer, DEVICE_TYPE_CPU, HOST_CPU_DEVICE_NAME,
};
use kernel_fallback::{
    Code, DType, DeviceManager, KernelRegistry, OpKernelRunner, Status, TensorValue,
};

use crate::common::{self, Harness};

#[test]
fn device_lookup_by_suffix() -> Result<()> {
    let devices = DeviceManager::with_host_cpu();
    assert_eq!(devices.lookup_device(common::CPU)?.name(), HOST_CPU_DEVICE_NAME);
    assert_eq!(
        devices.lookup_device(HOST_CPU_DEVICE_NAME)?.device_type(),
        DEVICE_TYPE_CPU
    );
    assert_eq!(devices.lookup_device("CPU:0").unwrap_err().code(), Code::NotFound);
    assert_eq!(devices.lookup_device("").unwrap_err().code(), Code::NotFound);
    assert_eq!(devices.list_devices().len(), 1);
    Ok(())
}

#[test]
fn registry_rejects_duplicates() -> Result<()> {
    let mut registry = KernelRegistry::with_builtin_kernels();
    assert!(registry.lookup("AddV2", DEVICE_TYPE_CPU).is_some());
    assert!(registry.lookup("AddV2", "GPU").is_none());
    let err = registry
        .register("Identity", DEVICE_TYPE_CPU, |_| Err(anyhow!("unused")))
        .unwrap_err();
    assert!(err.to_string().contains("already registered"));
    Ok(())
}

#[test]
fn step_container_cleans_up_on_drop() -> Result<()> {
    let manager = Arc::new(ResourceMgr::default());
    let container = ScopedStepContainer::new(8, Arc::clone(&manager));
    assert_eq!(container.name(), "__per_step_8");
    container.create("counter", AtomicUsize::new(3))?;
    assert_eq!(
        container.create("counter", AtomicUsize::new(0)).unwrap_err().code(),
        Code::AlreadyExists
    );
    let counter = container.lookup::<AtomicUsize>("counter")?;
    assert_eq!(counter.load(Ordering::SeqCst), 3);
    assert_eq!(
        container.lookup::<String>("counter").unwrap_err().code(),
        Code::InvalidArgument
    );

    drop(container);
    assert_eq!(
        manager
            .lookup::<AtomicUsize>("__per_step_8", "counter")
            .unwrap_err()
            .code(),
        Code::NotFound
    );
    Ok(())
}

#[test]
fn cancellation_runs_callbacks_once() -> Result<()> {
    let manager = CancellationManager::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let kept = manager.get_cancellation_token();
    let dropped = manager.get_cancellation_token();
    assert_ne!(kept, dropped);
    for token in [kept, dropped] {
        let calls = Arc::clone(&calls);
        assert!(manager.register_callback(token, move || {
            calls.fetch_add(1, Ordering::SeqCst);
        }));
    }
    assert!(manager.deregister_callback(dropped));

    manager.start_cancel();
    manager.start_cancel();
    assert!(manager.is_cancelled());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(!manager.register_callback(manager.get_cancellation_token(), || {}));
    Ok(())
}

#[test]
fn rendezvous_hands_values_across_threads() -> Result<()> {
    let rendezvous = Arc::new(LocalRendezvous::new(2));
    let sender = Arc::clone(&rendezvous);
    let handle = std::thread::spawn(move || sender.send("edge_0", TensorValue::scalar(5i32)));
    let value = rendezvous.recv("edge_0")?;
    handle
        .join()
        .map_err(|_| anyhow!("sender panicked"))??;
    assert_eq!(common::scalar_i32(&value)?, 5);

    assert!(rendezvous
        .recv_timeout("edge_1", Duration::from_millis(5))?
        .is_none());
    rendezvous.start_abort(Status::cancelled("step aborted"));
    let err = rendezvous.recv("edge_1").unwrap_err();
    assert_eq!(err.code(), Code::Cancelled);
    assert!(rendezvous.send("edge_1", TensorValue::scalar(1i32)).is_err());
    Ok(())
}

#[test]
fn sync_runner_supports_callback_entry() -> Result<()> {
    let harness = Harness::new()?;
    harness.create(0, "Add", 2, common::t_attr(DType::I32))?;
    let runner = harness
        .request_state()?
        .runner_table()
        .get(0)
        .ok_or_else(|| anyhow!("runner missing"))?;

    let ctx = OpKernelContext::with_owned(
        OpKernelParams::default(),
        vec![TensorValue::scalar(2i32), TensorValue::scalar(5i32)],
        1,
    );
    let (sender, receiver) = mpsc::channel();
    runner.run_async(
        ctx,
        Box::new(move |mut ctx: OpKernelContext<'static>| {
            let _ = sender.send((ctx.status().clone(), ctx.take_output(0)));
        }),
    );
    let (status, output) = receiver.recv_timeout(Duration::from_secs(5))?;
    assert!(status.is_ok());
    let output = output.ok_or_else(|| anyhow!("output missing"))?;
    assert_eq!(common::scalar_i32(&output)?, 7);
    Ok(())
}

#[test]
fn async_runner_rejects_blocking_entry() -> Result<()> {
    let harness = Harness::new()?;
    harness.create(0, "DeferredAddOne", 1, kernel_fallback::OpAttrs::none())?;
    let runner = harness
        .request_state()?
        .runner_table()
        .get(0)
        .ok_or_else(|| anyhow!("runner missing"))?;
    assert!(runner.is_async());

    let params = OpKernelParams::default();
    let mut ctx = OpKernelContext::with_scratch(&params, &[], &[], &[], 1);
    runner.run(&mut ctx);
    assert_eq!(ctx.status().code(), Code::Internal);
    assert_eq!(harness.kernels.pending_len(), 0);
    Ok(())
}

#[test]
fn intra_op_work_runs_on_user_pool() -> Result<()> {
    let pool = Arc::new(
        rayon::ThreadPoolBuilder::new()
            .num_threads(1)
            .thread_name(|_| "user-intra-op".to_string())
            .build()?,
    );
    let options = kernel_fallback::RequestStateOptions {
        user_intra_op_pool: Some(pool),
        ..Default::default()
    };
    let harness = Harness::with_options(kernel_fallback::FallbackConfig::default(), options)?;
    let runner = Arc::clone(harness.request_state()?.runner());
    let (sender, receiver) = mpsc::channel();
    runner(Box::new(move || {
        let _ = sender.send(std::thread::current().name().map(str::to_string));
    }));
    let name = receiver.recv_timeout(Duration::from_secs(5))?;
    assert_eq!(name.as_deref(), Some("user-intra-op"));
    Ok(())
}
