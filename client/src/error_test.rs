use super::*;

#[test]
fn retryable_covers_transport_failures_and_server_errors() {
    assert!(CrudError::from(NetworkError::Timeout("slow".into())).retryable());
    assert!(CrudError::from(NetworkError::Request("refused".into())).retryable());
    assert!(CrudError::from(NetworkError::Status { status: 503, message: String::new() }).retryable());
    assert!(CrudError::from(NetworkError::Status { status: 429, message: String::new() }).retryable());
    assert!(!CrudError::from(NetworkError::Status { status: 400, message: String::new() }).retryable());
    assert!(!CrudError::NotFound("message 3".into()).retryable());
    assert!(!CrudError::Conflict("in use".into()).retryable());
}

#[test]
fn validation_errors_are_local() {
    let err = CrudError::from(ValidationError::MissingSortKey);
    assert!(err.is_local());
    assert_eq!(err.error_code(), "E_VALIDATION");
    assert!(!CrudError::NotFound("x".into()).is_local());
}

#[test]
fn error_codes_distinguish_status_from_transport() {
    let status = CrudError::from(NetworkError::Status { status: 500, message: "boom".into() });
    assert_eq!(status.error_code(), "E_STATUS");
    assert_eq!(status.to_string(), "network error: unexpected status 500: boom");
    assert_eq!(CrudError::from(NetworkError::Request("x".into())).error_code(), "E_NETWORK");
}
