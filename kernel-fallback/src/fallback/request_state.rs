use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rayon::ThreadPool;

use crate::config::FallbackConfig;
use crate::error::Status;
use crate::legacy::{
    inline_intra_op_runner, CancellationManager, CollectiveExecutorHandle, Device, DeviceManager,
    EagerContext, FunctionLibraryRuntime, IntraOpRunner, ModelMetadata, Rendezvous, ResourceMgr,
    ScopedStepContainer, SessionMetadata,
};
use crate::runtime::{RequestContextBuilder, ResourceKey};

use super::{DtypeCheckExemption, FallbackResourceArray, OpKernelRunnerTable};

/// Optional inputs of request setup.
#[derive(Default)]
pub struct RequestStateOptions {
    /// Caller-supplied intra-op pool replacing inline execution.
    pub user_intra_op_pool: Option<Arc<ThreadPool>>,
    pub model_metadata: Option<ModelMetadata>,
    /// Overrides the exemption list of [`FallbackConfig::global`].
    pub dtype_check_exemption: Option<DtypeCheckExemption>,
}

/// Everything the fallback kernels of one request share.
pub struct FallbackRequestState {
    step_id: i64,
    runner: IntraOpRunner,
    step_container: Arc<ScopedStepContainer>,
    collective_executor: Option<Arc<CollectiveExecutorHandle>>,
    rendezvous: Option<Arc<dyn Rendezvous>>,
    device_manager: Arc<DeviceManager>,
    function_library: Arc<FunctionLibraryRuntime>,
    resource_manager: Arc<ResourceMgr>,
    cancellation_manager: Arc<CancellationManager>,
    session_metadata: Arc<SessionMetadata>,
    custom_device: Option<Arc<Device>>,
    runner_table: Arc<OpKernelRunnerTable>,
    resource_array: Arc<FallbackResourceArray>,
    dtype_check_exemption: DtypeCheckExemption,
    log_device_placement: AtomicBool,
}

struct StepResources {
    step_container: Option<Arc<ScopedStepContainer>>,
    collective_executor: Option<Arc<CollectiveExecutorHandle>>,
    rendezvous: Option<Arc<dyn Rendezvous>>,
}

impl FallbackRequestState {
    fn new(
        builder: &RequestContextBuilder,
        device_manager: Arc<DeviceManager>,
        function_library: Arc<FunctionLibraryRuntime>,
        step: StepResources,
        options: RequestStateOptions,
    ) -> Result<Self, Status> {
        let step_id = builder.id();
        let host_cpu = device_manager
            .host_cpu()
            .cloned()
            .ok_or_else(|| Status::failed_precondition("device manager has no host CPU device"))?;
        let resource_manager = Arc::clone(host_cpu.resource_manager());
        let (runner, custom_device) = match options.user_intra_op_pool {
            Some(pool) => {
                let custom_device = Arc::new(host_cpu.with_intra_op_pool(Arc::clone(&pool)));
                let runner: IntraOpRunner = Arc::new(move |work| pool.spawn(work));
                (runner, Some(custom_device))
            }
            None => (inline_intra_op_runner(), None),
        };
        let step_container = step.step_container.unwrap_or_else(|| {
            Arc::new(ScopedStepContainer::new(step_id, Arc::clone(&resource_manager)))
        });
        let session_metadata = Arc::new(
            options
                .model_metadata
                .as_ref()
                .map(SessionMetadata::from)
                .unwrap_or_default(),
        );
        let dtype_check_exemption = options
            .dtype_check_exemption
            .unwrap_or_else(|| exemption_from_config(FallbackConfig::global()));
        let resource_context = builder.resource_context();
        let runner_table = resource_context
            .get_or_create_resource::<OpKernelRunnerTable>(ResourceKey::RunnerTable)
            .map_err(Status::from)?;
        let resource_array = resource_context
            .get_or_create_resource::<FallbackResourceArray>(ResourceKey::ResourceArray)
            .map_err(Status::from)?;
        Ok(Self {
            step_id,
            runner,
            step_container,
            collective_executor: step.collective_executor,
            rendezvous: step.rendezvous,
            device_manager,
            function_library,
            resource_manager,
            cancellation_manager: Arc::new(CancellationManager::new()),
            session_metadata,
            custom_device,
            runner_table,
            resource_array,
            dtype_check_exemption,
            log_device_placement: AtomicBool::new(false),
        })
    }

    pub fn step_id(&self) -> i64 {
        self.step_id
    }

    pub fn runner(&self) -> &IntraOpRunner {
        &self.runner
    }

    pub fn step_container(&self) -> &Arc<ScopedStepContainer> {
        &self.step_container
    }

    pub fn collective_executor(&self) -> Option<&Arc<CollectiveExecutorHandle>> {
        self.collective_executor.as_ref()
    }

    pub fn rendezvous(&self) -> Option<&Arc<dyn Rendezvous>> {
        self.rendezvous.as_ref()
    }

    pub fn device_manager(&self) -> &Arc<DeviceManager> {
        &self.device_manager
    }

    pub fn function_library(&self) -> &Arc<FunctionLibraryRuntime> {
        &self.function_library
    }

    pub fn resource_manager(&self) -> &Arc<ResourceMgr> {
        &self.resource_manager
    }

    pub fn cancellation_manager(&self) -> &Arc<CancellationManager> {
        &self.cancellation_manager
    }

    pub fn session_metadata(&self) -> &Arc<SessionMetadata> {
        &self.session_metadata
    }

    /// Host CPU bound to the caller's intra-op pool, if one was supplied.
    pub fn custom_device(&self) -> Option<&Arc<Device>> {
        self.custom_device.as_ref()
    }

    pub fn runner_table(&self) -> &Arc<OpKernelRunnerTable> {
        &self.runner_table
    }

    pub fn resource_array(&self) -> &Arc<FallbackResourceArray> {
        &self.resource_array
    }

    pub fn is_dtype_check_exempt(&self, op_name: &str) -> bool {
        (self.dtype_check_exemption)(op_name)
    }

    pub fn log_device_placement(&self) -> bool {
        self.log_device_placement.load(Ordering::Relaxed)
    }

    pub fn set_log_device_placement(&self, enabled: bool) {
        self.log_device_placement.store(enabled, Ordering::Relaxed);
    }
}

fn attach(builder: &mut RequestContextBuilder, state: FallbackRequestState) -> Result<(), Status> {
    if builder.context_data().get::<FallbackRequestState>().is_some() {
        return Err(Status::already_exists(format!(
            "FallbackRequestState already set up for request {}",
            builder.id()
        )));
    }
    builder.context_data_mut().emplace(state);
    Ok(())
}

fn exemption_from_config(config: &FallbackConfig) -> DtypeCheckExemption {
    let names = config.dtype_check_exemptions.clone();
    Arc::new(move |op_name: &str| names.iter().any(|name| name == op_name))
}

/// Attach a [`FallbackRequestState`] with a fresh step container and no
/// rendezvous or collective executor.
pub fn setup_request_context(
    builder: &mut RequestContextBuilder,
    device_manager: Arc<DeviceManager>,
    function_library: Arc<FunctionLibraryRuntime>,
    options: RequestStateOptions,
) -> Result<(), Status> {
    let state = FallbackRequestState::new(
        builder,
        device_manager,
        function_library,
        StepResources {
            step_container: None,
            collective_executor: None,
            rendezvous: None,
        },
        options,
    )?;
    attach(builder, state)
}

/// Attach a [`FallbackRequestState`] that reuses the eager context's step
/// container and collective executor, with a new rendezvous for the step.
pub fn setup_request_context_from_eager(
    builder: &mut RequestContextBuilder,
    eager_context: &EagerContext,
    options: RequestStateOptions,
) -> Result<(), Status> {
    let rendezvous = eager_context.create_rendezvous(builder.id());
    let state = FallbackRequestState::new(
        builder,
        Arc::clone(eager_context.device_manager()),
        Arc::clone(eager_context.function_library()),
        StepResources {
            step_container: Some(Arc::clone(eager_context.step_container())),
            collective_executor: eager_context.collective_executor().cloned(),
            rendezvous: Some(rendezvous),
        },
        options,
    )?;
    attach(builder, state)
}
