use bundlewire_util::errors::WiringError;

#[test]
fn test_io_error_display() {
    let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
    let err = WiringError::from(io_err);
    assert!(err.to_string().contains("I/O error"), "got: {err}");
}

#[test]
fn test_repository_error_display() {
    let err = WiringError::Repository {
        message: "unknown provider `b`".to_string(),
    };
    assert_eq!(err.to_string(), "Repository error: unknown provider `b`");
}

#[test]
fn test_filter_error_display() {
    let err = WiringError::Filter {
        filter: "(a=b".to_string(),
        message: "missing `)`".to_string(),
    };
    assert_eq!(err.to_string(), "Invalid filter `(a=b`: missing `)`");
}

#[test]
fn test_version_error_display() {
    let err = WiringError::Version {
        version: "1.x".to_string(),
        message: "minor component is not a number".to_string(),
    };
    assert_eq!(
        err.to_string(),
        "Invalid version `1.x`: minor component is not a number"
    );
}

#[test]
fn test_config_error_display() {
    let err = WiringError::Config {
        message: "bad value".to_string(),
    };
    assert_eq!(err.to_string(), "Configuration error: bad value");
}

#[test]
fn test_generic_error_display() {
    let err = WiringError::Generic {
        message: "something broke".to_string(),
    };
    assert_eq!(err.to_string(), "something broke");
}

#[test]
fn test_io_error_from_conversion() {
    let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
    let err: WiringError = io_err.into();
    assert!(matches!(err, WiringError::Io(_)));
}
