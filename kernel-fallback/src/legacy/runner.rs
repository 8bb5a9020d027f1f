use std::sync::Arc;

use crate::error::Status;
use crate::logging::vlog_enabled;

use super::{
    attr_value_map_debug_string, AllocatorAttributes, AttrBuilder, AttrValueMap, BuiltKernel,
    Device, DeviceManager, FunctionLibraryRuntime, KernelConstruction, OpKernel, OpKernelContext,
    ResourceMgr, DEVICE_TYPE_CPU,
};

/// Completion callback of an asynchronous kernel. Receives the context back.
pub type AsyncDone = Box<dyn FnOnce(OpKernelContext<'static>) + Send>;

/// Kernel computed with a blocking call.
pub trait SyncOpKernel: Send + Sync {
    fn compute(&self, ctx: &mut OpKernelContext<'_>) -> Result<(), Status>;
}

/// Kernel that finishes by invoking `done`, possibly from another thread.
pub trait AsyncOpKernel: Send + Sync {
    fn compute_async(&self, ctx: OpKernelContext<'static>, done: AsyncDone);
}

pub enum KernelImpl {
    Sync(Box<dyn SyncOpKernel>),
    Async(Box<dyn AsyncOpKernel>),
}

/// The capability set the dispatch engine needs from a legacy kernel.
pub trait OpKernelRunner: Send + Sync {
    fn device(&self) -> &Arc<Device>;
    fn op_kernel(&self) -> &Arc<OpKernel>;
    fn resource_manager(&self) -> Option<&Arc<ResourceMgr>>;
    fn function_library_runtime(&self) -> Option<&Arc<FunctionLibraryRuntime>>;
    fn input_alloc_attrs(&self) -> &[AllocatorAttributes];
    fn output_alloc_attrs(&self) -> &[AllocatorAttributes];
    fn is_async(&self) -> bool;
    /// Blocking entry point. Failures land in `ctx.status()`.
    fn run(&self, ctx: &mut OpKernelContext<'_>);
    /// Callback entry point. `done` runs exactly once.
    fn run_async(&self, ctx: OpKernelContext<'static>, done: AsyncDone);
}

/// Runner over a kernel built by a registered factory.
pub struct LegacyKernelRunner {
    device: Arc<Device>,
    op_kernel: Arc<OpKernel>,
    function_library: Arc<FunctionLibraryRuntime>,
    input_alloc_attrs: Vec<AllocatorAttributes>,
    output_alloc_attrs: Vec<AllocatorAttributes>,
    kernel: KernelImpl,
}

impl LegacyKernelRunner {
    /// Resolve the device, build the attributes and construct the kernel.
    pub fn create(
        op_name: &str,
        device_name: &str,
        num_args: usize,
        attr_builder: AttrBuilder<'_>,
        device_manager: &DeviceManager,
        function_library: &Arc<FunctionLibraryRuntime>,
    ) -> Result<Self, Status> {
        let attrs = Self::build_attrs(op_name, attr_builder)?;
        Self::create_with_attrs(
            op_name,
            device_name,
            num_args,
            attrs,
            device_manager,
            function_library,
        )
    }

    /// Run `attr_builder` into a fresh map. Failures are `InvalidArgument`.
    pub fn build_attrs(op_name: &str, attr_builder: AttrBuilder<'_>) -> Result<AttrValueMap, Status> {
        let mut attrs = AttrValueMap::new();
        attr_builder(&mut attrs).map_err(|err| {
            Status::invalid_argument(format!(
                "failed to build attributes for {}: {:#}",
                op_name, err
            ))
        })?;
        Ok(attrs)
    }

    pub fn create_with_attrs(
        op_name: &str,
        device_name: &str,
        num_args: usize,
        attrs: AttrValueMap,
        device_manager: &DeviceManager,
        function_library: &Arc<FunctionLibraryRuntime>,
    ) -> Result<Self, Status> {
        let device = device_manager.lookup_device(device_name)?;
        let factory = function_library
            .kernel_registry()
            .lookup(op_name, device.device_type())
            .ok_or_else(|| {
                Status::not_found(format!(
                    "no kernel registered for {} on {}",
                    op_name,
                    device.device_type()
                ))
            })?;
        if vlog_enabled() {
            crate::trace!(
                "kernel.create op={} device={} args={} attrs=[{}]",
                op_name,
                device.name(),
                num_args,
                attr_value_map_debug_string(&attrs)
            );
        }
        let construction = KernelConstruction {
            op_name,
            device: &device,
            num_args,
            attrs: &attrs,
        };
        let BuiltKernel {
            input_types,
            output_types,
            kernel,
        } = factory(&construction).map_err(Status::from)?;
        let on_host = device.device_type() == DEVICE_TYPE_CPU;
        let input_alloc_attrs = vec![AllocatorAttributes { on_host }; input_types.len()];
        let output_alloc_attrs = vec![AllocatorAttributes { on_host }; output_types.len()];
        Ok(Self {
            device,
            op_kernel: Arc::new(OpKernel::new(op_name, input_types, output_types, attrs)),
            function_library: Arc::clone(function_library),
            input_alloc_attrs,
            output_alloc_attrs,
            kernel,
        })
    }
}

impl OpKernelRunner for LegacyKernelRunner {
    fn device(&self) -> &Arc<Device> {
        &self.device
    }

    fn op_kernel(&self) -> &Arc<OpKernel> {
        &self.op_kernel
    }

    fn resource_manager(&self) -> Option<&Arc<ResourceMgr>> {
        Some(self.device.resource_manager())
    }

    fn function_library_runtime(&self) -> Option<&Arc<FunctionLibraryRuntime>> {
        Some(&self.function_library)
    }

    fn input_alloc_attrs(&self) -> &[AllocatorAttributes] {
        &self.input_alloc_attrs
    }

    fn output_alloc_attrs(&self) -> &[AllocatorAttributes] {
        &self.output_alloc_attrs
    }

    fn is_async(&self) -> bool {
        matches!(self.kernel, KernelImpl::Async(_))
    }

    fn run(&self, ctx: &mut OpKernelContext<'_>) {
        match &self.kernel {
            KernelImpl::Sync(kernel) => {
                if let Err(status) = kernel.compute(ctx) {
                    ctx.set_status(status);
                }
            }
            KernelImpl::Async(_) => ctx.set_status(Status::internal(format!(
                "{} is asynchronous and cannot run synchronously",
                self.op_kernel.name()
            ))),
        }
    }

    fn run_async(&self, mut ctx: OpKernelContext<'static>, done: AsyncDone) {
        match &self.kernel {
            KernelImpl::Async(kernel) => kernel.compute_async(ctx, done),
            KernelImpl::Sync(kernel) => {
                if let Err(status) = kernel.compute(&mut ctx) {
                    ctx.set_status(status);
                }
                done(ctx);
            }
        }
    }
}
