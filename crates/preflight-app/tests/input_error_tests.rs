//! Integration tests for the input-error taxonomy.

mod common;

use std::sync::Arc;

use common::{SOW, clean_csv_file, services_without_llm};
use preflight_analyzers::Utf8TextExtractor;
use preflight_app::{AppError, FailureClass, Services, classify_app_error};
use preflight_audit::UploadedFile;
use preflight_core::AuditConfig;

#[test]
fn input_error_tests_empty_audit_request_is_rejected() {
    let error = services_without_llm()
        .handle_audit(&[])
        .expect_err("no files rejected");
    assert!(matches!(error, AppError::Input(_)));
    assert_eq!(classify_app_error(&error), FailureClass::ClientError);
}

#[test]
fn input_error_tests_oversized_upload_is_rejected() {
    let config = AuditConfig {
        max_upload_bytes: 16,
        ..AuditConfig::default()
    };
    let services = Services::new(config, Arc::new(Utf8TextExtractor), None);

    let error = services
        .handle_audit(&[UploadedFile::new("big.txt", vec![b'x'; 64])])
        .expect_err("oversized rejected");
    assert!(matches!(error, AppError::Input(_)));
    assert!(error.to_string().contains("too large"));
}

#[test]
fn input_error_tests_blank_scope_request_is_rejected() {
    let error = services_without_llm()
        .handle_scope("sow.txt", SOW.as_bytes(), "   ", None, None)
        .expect_err("blank request rejected");
    assert!(matches!(error, AppError::Input(_)));
}

#[test]
fn input_error_tests_unsupported_sow_kind_is_rejected() {
    let error = services_without_llm()
        .handle_scope("sow.docx", SOW.as_bytes(), "add csv export", None, None)
        .expect_err("docx sow rejected");
    assert!(matches!(error, AppError::Sow(_)));
    assert_eq!(classify_app_error(&error), FailureClass::ClientError);
}

#[test]
fn input_error_tests_bad_analysis_json_is_rejected() {
    let error = services_without_llm()
        .handle_change_order(
            "sow.txt",
            SOW.as_bytes(),
            "add csv export",
            "Acme Corp",
            None,
            "{not json",
        )
        .expect_err("bad analysis rejected");
    assert!(matches!(error, AppError::Input(_)));
    assert!(error.to_string().contains("analysis"));
}

#[test]
fn input_error_tests_audit_file_list_still_accepts_valid_requests() {
    // Guard against the validation layer rejecting well-formed input.
    let response = services_without_llm()
        .handle_audit(&[clean_csv_file()])
        .expect("valid request passes");
    assert_eq!(response.files.len(), 1);
}
