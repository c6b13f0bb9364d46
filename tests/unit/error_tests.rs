//! Unit tests for error categories, hints and wire mapping.

use acp_bridge::acp::connection::{
    error_from_object, error_object, AUTH_REQUIRED, INTERNAL_ERROR, INVALID_PARAMS,
};
use acp_bridge::errors::ErrorCategory;
use acp_bridge::AppError;
use serde_json::json;

#[test]
fn categories_cover_every_variant() {
    let cases = [
        (AppError::InvalidInput("x".into()), ErrorCategory::InvalidInput),
        (AppError::NotFound("x".into()), ErrorCategory::InvalidInput),
        (AppError::AuthRequired("x".into()), ErrorCategory::AuthRequired),
        (AppError::NotConfigured("x".into()), ErrorCategory::Internal),
        (AppError::Transient("x".into()), ErrorCategory::Internal),
        (AppError::Internal("x".into()), ErrorCategory::Internal),
        (AppError::Config("x".into()), ErrorCategory::Internal),
        (AppError::Acp("x".into()), ErrorCategory::Internal),
        (AppError::Engine("x".into()), ErrorCategory::Internal),
        (AppError::Io("x".into()), ErrorCategory::Internal),
    ];
    for (err, category) in cases {
        assert_eq!(err.category(), category, "{err}");
    }
}

#[test]
fn display_prefixes_variant() {
    assert_eq!(AppError::InvalidInput("bad id".into()).to_string(), "invalid input: bad id");
    assert_eq!(AppError::Transient("gone".into()).to_string(), "transient: gone");
    assert_eq!(AppError::Transient("gone".into()).reason(), "gone");
}

#[test]
fn retryable_errors() {
    assert!(AppError::Transient("x".into()).is_retryable());
    assert!(AppError::Engine("x".into()).is_retryable());
    assert!(!AppError::InvalidInput("x".into()).is_retryable());
    assert!(!AppError::NotConfigured("x".into()).is_retryable());
}

#[test]
fn error_object_codes_and_data() {
    let invalid = error_object(&AppError::InvalidInput("Invalid mode ID: x".into()));
    assert_eq!(invalid["code"], json!(INVALID_PARAMS));
    assert_eq!(invalid["data"]["reason"], json!("Invalid mode ID: x"));
    assert!(invalid["data"].get("help").is_none());

    let auth = error_object(&AppError::AuthRequired("no key".into()));
    assert_eq!(auth["code"], json!(AUTH_REQUIRED));
    assert!(auth["data"]["help"].is_string());

    let internal = error_object(&AppError::NotConfigured("Agent not configured".into()));
    assert_eq!(internal["code"], json!(INTERNAL_ERROR));
    assert_eq!(internal["data"]["reason"], json!("Agent not configured"));
    assert!(internal["data"]["details"].as_str().unwrap().contains("not configured"));
}

#[test]
fn error_from_object_prefers_reason() {
    let err = error_from_object(&json!({
        "code": INVALID_PARAMS,
        "message": "Invalid params",
        "data": {"reason": "bad policy"},
    }));
    assert!(matches!(err, AppError::InvalidInput(ref msg) if msg == "bad policy"));

    let err = error_from_object(&json!({"code": -1, "message": "kaput"}));
    assert!(matches!(err, AppError::Engine(ref msg) if msg == "kaput"));
}

#[test]
fn conversions_from_std_errors() {
    let io: AppError = std::io::Error::new(std::io::ErrorKind::NotFound, "missing").into();
    assert!(matches!(io, AppError::Io(_)));

    let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
    let json: AppError = json_err.into();
    assert!(matches!(json, AppError::Internal(_)));
}
