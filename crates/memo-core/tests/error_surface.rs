use memo_core::errors::{ErrorInfo, MemoError};

fn sample_info(code: &str, message: &str) -> ErrorInfo {
    ErrorInfo::new(code, message)
        .with_context("batch", "sweep")
        .with_context("index", "3")
}

#[test]
fn store_error_surface() {
    let err = MemoError::Store(sample_info("store-write", "disk full"));
    assert_eq!(err.info().code, "store-write");
    assert!(err.info().context.contains_key("batch"));
}

#[test]
fn computation_error_surface() {
    let err = MemoError::computation("solver-diverged", "residual exploded");
    assert!(err.is_computation());
    assert!(!err.is_reconstruction());
    assert_eq!(err.info().code, "solver-diverged");
}

#[test]
fn reconstruction_error_is_distinguishable() {
    let info = sample_info("specification-unavailable", "result-only run");
    let err = MemoError::Reconstruction(info);
    assert!(err.is_reconstruction());
    assert!(!err.is_computation());
}

#[test]
fn context_is_added_without_changing_family() {
    let err = MemoError::computation("boom", "failed").with_context("fingerprint", "abc");
    assert!(err.is_computation());
    assert_eq!(err.info().context.get("fingerprint").map(String::as_str), Some("abc"));
}

#[test]
fn display_includes_context_and_hint() {
    let err = MemoError::Selection(
        ErrorInfo::new("run-index", "index out of range")
            .with_context("index", "9")
            .with_hint("batch holds 4 runs"),
    );
    let rendered = err.to_string();
    assert!(rendered.starts_with("selection error: index out of range (code: run-index)"));
    assert!(rendered.contains("index=9"));
    assert!(rendered.contains("hint: batch holds 4 runs"));
}

#[test]
fn errors_serialize_with_family_tag() {
    let err = MemoError::Identity(ErrorInfo::new("unserializable", "opaque"));
    let json = serde_json::to_value(&err).expect("serialize");
    assert_eq!(json["family"], "Identity");
    assert_eq!(json["detail"]["code"], "unserializable");
}
