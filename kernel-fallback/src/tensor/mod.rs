mod fallback;
mod host;
mod proto;
mod scalar;
mod shape;
mod tensor;
mod value;

pub use fallback::{FallbackTensor, ImmutableTensor};
pub use host::{DenseHostTensor, RuntimeTensor, StringHostTensor};
pub use proto::{TensorProto, MAX_FILL_ELEMENTS};
pub use scalar::{BF16, F16};
pub use shape::{checked_numel, numel, shape_debug_string};
pub use tensor::Tensor;
pub use value::{DType, TensorElement, TensorValue};
