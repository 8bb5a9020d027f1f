use anyhow::{anyhow, Result};
use kernel_fallback::{convert_status_code, Code, ErrorCode, FallbackError, Status};

#[test]
fn status_codes_map_to_runtime_codes() -> Result<()> {
    let cases = [
        (Code::Cancelled, ErrorCode::Cancelled),
        (Code::Unknown, ErrorCode::Unknown),
        (Code::InvalidArgument, ErrorCode::InvalidArgument),
        (Code::DeadlineExceeded, ErrorCode::DeadlineExceeded),
        (Code::NotFound, ErrorCode::NotFound),
        (Code::AlreadyExists, ErrorCode::AlreadyExists),
        (Code::PermissionDenied, ErrorCode::PermissionDenied),
        (Code::ResourceExhausted, ErrorCode::ResourceExhausted),
        (Code::FailedPrecondition, ErrorCode::FailedPrecondition),
        (Code::Aborted, ErrorCode::Aborted),
        (Code::OutOfRange, ErrorCode::OutOfRange),
        (Code::Unimplemented, ErrorCode::Unimplemented),
        (Code::Internal, ErrorCode::Internal),
        (Code::Unavailable, ErrorCode::Unavailable),
        (Code::DataLoss, ErrorCode::DataLoss),
        (Code::Unauthenticated, ErrorCode::Unauthenticated),
    ];
    for (code, expected) in cases {
        assert_eq!(convert_status_code(code), expected, "{:?}", code);
    }
    assert_eq!(convert_status_code(Code::Ok), ErrorCode::Unknown);
    Ok(())
}

#[test]
fn anyhow_errors_keep_their_status() -> Result<()> {
    let wrapped: anyhow::Error = Status::failed_precondition("not initialized").into();
    let status = Status::from(wrapped);
    assert_eq!(status.code(), Code::FailedPrecondition);
    assert_eq!(status.message(), "not initialized");

    let plain = Status::from(anyhow!("disk full"));
    assert_eq!(plain.code(), Code::Internal);
    assert_eq!(plain.message(), "disk full");
    Ok(())
}

#[test]
fn fallback_error_from_status() -> Result<()> {
    let status = Status::unimplemented("no such kernel");
    let err = FallbackError::from(&status);
    assert_eq!(err.code(), ErrorCode::Unimplemented);
    assert_eq!(err.message(), "no such kernel");
    assert_eq!(err.to_string(), "Unimplemented: no such kernel");
    assert!(Status::ok().is_ok());
    assert!(!status.is_ok());
    Ok(())
}
