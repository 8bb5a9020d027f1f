use super::TensorValue;

/// Tensor as it flows between fallback kernels.
///
/// An immutable tensor owns a buffer no kernel may forward or write into;
/// it can be shared freely without copying.
#[derive(Debug, Clone, PartialEq)]
pub struct FallbackTensor {
    tensor: TensorValue,
    is_immutable: bool,
}

impl FallbackTensor {
    pub fn new(tensor: TensorValue) -> Self {
        Self {
            tensor,
            is_immutable: false,
        }
    }

    pub fn tensor(&self) -> &TensorValue {
        &self.tensor
    }

    pub fn into_tensor(self) -> TensorValue {
        self.tensor
    }

    pub fn is_immutable(&self) -> bool {
        self.is_immutable
    }
}

impl From<TensorValue> for FallbackTensor {
    fn from(tensor: TensorValue) -> Self {
        FallbackTensor::new(tensor)
    }
}

pub struct ImmutableTensor;

impl ImmutableTensor {
    /// Copy `tensor` into a private buffer and mark the result immutable.
    pub fn create(tensor: &TensorValue) -> FallbackTensor {
        FallbackTensor {
            tensor: tensor.deep_copy(),
            is_immutable: true,
        }
    }
}
