use anyhow::Result;
use kernel_fallback::tensor::{checked_numel, DenseHostTensor, TensorProto, F16, MAX_FILL_ELEMENTS};
use kernel_fallback::{
    const_tensor, copy_if_small, DType, ErrorCode, FallbackTensor, ImmutableTensor, RuntimeTensor,
    Tensor, TensorValue,
};

use crate::common::Harness;

#[test]
fn const_tensor_from_proto() -> Result<()> {
    let harness = Harness::new()?;
    let tensor = const_tensor(
        &harness.exec_ctx,
        r#"{ "dtype": "int32", "shape": [2, 2], "int_val": [1, 2, 3, 4] }"#,
    )?;
    assert!(!tensor.is_immutable());
    assert_eq!(tensor.tensor().shape(), &[2, 2]);
    assert_eq!(tensor.tensor().as_typed::<i32>()?.data(), &[1, 2, 3, 4]);

    let filled = const_tensor(
        &harness.exec_ctx,
        r#"{ "dtype": "half", "shape": [3], "float_val": [1.5] }"#,
    )?;
    let halves = filled.tensor().as_typed::<F16>()?.data();
    assert!(halves.iter().all(|value| value.to_f32() == 1.5));
    Ok(())
}

#[test]
fn malformed_proto_is_invalid_argument() -> Result<()> {
    let harness = Harness::new()?;
    let err = const_tensor(&harness.exec_ctx, "{ not json").unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidArgument);

    let err = const_tensor(
        &harness.exec_ctx,
        r#"{ "dtype": "int32", "shape": [3], "int_val": [1, 2] }"#,
    )
    .unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidArgument);

    let proto = TensorProto::parse(r#"{ "shape": [1] }"#)?;
    assert!(proto.to_tensor_value().is_err());
    Ok(())
}

#[test]
fn oversized_proto_shapes_are_invalid_argument() -> Result<()> {
    let harness = Harness::new()?;
    let overflowing = const_tensor(
        &harness.exec_ctx,
        r#"{ "dtype": "int32", "shape": [4294967296, 4294967296], "int_val": [1] }"#,
    )
    .unwrap_err();
    assert_eq!(overflowing.code(), ErrorCode::InvalidArgument);
    assert!(overflowing.message().contains("overflows"));

    let huge_fill = const_tensor(
        &harness.exec_ctx,
        r#"{ "dtype": "int64", "shape": [4611686018427387904], "int_val": [1] }"#,
    )
    .unwrap_err();
    assert_eq!(huge_fill.code(), ErrorCode::InvalidArgument);
    assert!(huge_fill.message().contains("exceeds the limit"));

    let proto = TensorProto {
        dtype: Some("bool".to_string()),
        shape: vec![MAX_FILL_ELEMENTS + 1],
        bool_val: vec![true],
        ..Default::default()
    };
    assert!(proto.to_tensor_value().is_err());
    Ok(())
}

#[test]
fn dense_host_tensor_rejects_overflowing_shape() -> Result<()> {
    let dense = DenseHostTensor::new(DType::I64, vec![usize::MAX / 4, 2], Vec::new());
    let err = RuntimeTensor::DenseHost(dense).to_tensor_value().unwrap_err();
    assert!(err.to_string().contains("overflows the byte count"));
    assert!(checked_numel(&[usize::MAX, 2]).is_err());
    assert_eq!(checked_numel(&[3, 0, usize::MAX])?, 0);
    Ok(())
}

#[test]
fn copy_if_small_copies_mutable_tensors() -> Result<()> {
    let mutable = FallbackTensor::new(TensorValue::from(Tensor::from_vec(vec![1u8, 2, 3])));
    let copies = copy_if_small(&mutable, 2);
    assert_eq!(copies.len(), 2);
    for copy in &copies {
        assert!(copy.is_immutable());
        assert!(!copy.tensor().shares_buffer_with(mutable.tensor()));
        assert_eq!(copy.tensor().as_typed::<u8>()?.data(), &[1, 2, 3]);
    }
    assert!(!copies[0].tensor().shares_buffer_with(copies[1].tensor()));
    Ok(())
}

#[test]
fn copy_if_small_shares_immutable_tensors() -> Result<()> {
    let immutable = ImmutableTensor::create(&TensorValue::scalar(2.0f32));
    let copies = copy_if_small(&immutable, 3);
    assert_eq!(copies.len(), 3);
    for copy in &copies {
        assert!(copy.is_immutable());
        assert!(copy.tensor().shares_buffer_with(immutable.tensor()));
    }
    Ok(())
}

#[test]
fn dense_host_round_trip_keeps_layout() -> Result<()> {
    let value = TensorValue::from(Tensor::from_vec_with_shape(vec![1.0f64, -2.0], vec![2, 1])?);
    let dense = DenseHostTensor::from_tensor_value(&value);
    assert_eq!(dense.dtype(), DType::F64);
    assert_eq!(dense.shape(), &[2, 1]);
    let restored = RuntimeTensor::DenseHost(dense).to_tensor_value()?;
    assert_eq!(restored.as_typed::<f64>()?.data(), &[1.0, -2.0]);
    assert_eq!(restored.debug_string(), "double[2,1]");
    Ok(())
}

#[test]
fn scalar_and_shape_helpers() -> Result<()> {
    let scalar = TensorValue::scalar(true);
    assert_eq!(scalar.dtype(), DType::Bool);
    assert!(scalar.shape().is_empty());
    assert_eq!(scalar.len(), 1);
    assert_eq!(scalar.debug_string(), "bool[]");
    assert!(Tensor::from_vec_with_shape(vec![1i32, 2, 3], vec![2, 2]).is_err());
    assert_eq!(DType::from_ident("bfloat16")?, DType::BF16);
    Ok(())
}
