use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, Result};

use crate::tensor::DType;

use super::{attr_dtype, AttrValueMap, Device, KernelImpl};

/// Inputs to a kernel factory.
pub struct KernelConstruction<'a> {
    pub op_name: &'a str,
    pub device: &'a Device,
    pub num_args: usize,
    pub attrs: &'a AttrValueMap,
}

impl KernelConstruction<'_> {
    pub fn attr_dtype(&self, name: &str) -> Result<DType> {
        attr_dtype(self.attrs, name).map_err(|err| anyhow!("{}: {}", self.op_name, err))
    }
}

/// A constructed kernel and its signature.
pub struct BuiltKernel {
    pub input_types: Vec<DType>,
    pub output_types: Vec<DType>,
    pub kernel: KernelImpl,
}

pub type KernelFactory = Arc<dyn Fn(&KernelConstruction<'_>) -> Result<BuiltKernel> + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct KernelKey {
    op_name: String,
    device_type: String,
}

/// Kernel factories by (op name, device type).
#[derive(Clone, Default)]
pub struct KernelRegistry {
    factories: HashMap<KernelKey, KernelFactory>,
}

impl KernelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the built-in CPU kernels.
    pub fn with_builtin_kernels() -> Self {
        let mut registry = Self::new();
        for (op_name, device_type, factory) in super::kernels::ENTRIES.iter() {
            registry.factories.insert(
                KernelKey {
                    op_name: op_name.to_string(),
                    device_type: device_type.to_string(),
                },
                Arc::clone(factory),
            );
        }
        registry
    }

    pub fn register<F>(&mut self, op_name: &str, device_type: &str, factory: F) -> Result<()>
    where
        F: Fn(&KernelConstruction<'_>) -> Result<BuiltKernel> + Send + Sync + 'static,
    {
        let key = KernelKey {
            op_name: op_name.to_string(),
            device_type: device_type.to_string(),
        };
        if self.factories.contains_key(&key) {
            return Err(anyhow!(
                "kernel already registered for {} on {}",
                op_name,
                device_type
            ));
        }
        self.factories.insert(key, Arc::new(factory));
        Ok(())
    }

    pub fn lookup(&self, op_name: &str, device_type: &str) -> Option<KernelFactory> {
        self.factories
            .get(&KernelKey {
                op_name: op_name.to_string(),
                device_type: device_type.to_string(),
            })
            .cloned()
    }
}
