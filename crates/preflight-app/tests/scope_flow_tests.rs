//! Integration tests for scope classification, change orders, and notes.

mod common;

use common::{SOW, services_with_script, services_without_llm};
use preflight_audit::ClientNoteRequest;
use preflight_core::ClientNoteType;
use preflight_scope::{ScopeBucket, ScopeVerdict};
use serde_json::json;

fn stage_a_change_request(hours: f64) -> String {
    json!({
        "engagement": "proceed",
        "relatedness": "in_project",
        "verdict": "in_scope",
        "bucket": "change_request",
        "estimate": {"size": "medium", "hours": hours, "rationale": "New endpoint plus UI."},
        "clauseCitation": {"section": null, "quote": "CSV export of any report"},
        "triageQuestions": [],
    })
    .to_string()
}

fn stage_b() -> String {
    json!({"subject": "Re: your request", "body": "Happy to scope this as a change order."})
        .to_string()
}

#[test]
fn scope_flow_tests_policy_overrides_verdict_in_development() {
    let response = services_with_script(vec![Ok(stage_a_change_request(15.0)), Ok(stage_b())])
        .handle_scope(
            "sow.txt",
            SOW.as_bytes(),
            "add csv export of any report",
            Some("Development"),
            Some("req-42"),
        )
        .expect("scope succeeds");

    assert_eq!(response.verdict, ScopeVerdict::OutOfScope);
    assert_eq!(response.bucket, ScopeBucket::ChangeRequest);
    assert_eq!(response.estimate.hours, 15.0);
    assert_eq!(response.model.as_deref(), Some("test-model"));
}

#[test]
fn scope_flow_tests_same_request_is_grey_area_in_design() {
    let response = services_with_script(vec![Ok(stage_a_change_request(15.0)), Ok(stage_b())])
        .handle_scope(
            "sow.txt",
            SOW.as_bytes(),
            "add csv export of any report",
            Some("Design"),
            None,
        )
        .expect("scope succeeds");

    assert_eq!(response.verdict, ScopeVerdict::GreyArea);
}

#[test]
fn scope_flow_tests_fallback_path_is_complete_without_llm() {
    let response = services_without_llm()
        .handle_scope(
            "sow.txt",
            SOW.as_bytes(),
            "please add slack integration",
            None,
            None,
        )
        .expect("fallback succeeds");

    assert_eq!(response.model, None);
    assert_eq!(response.verdict, ScopeVerdict::OutOfScope);
    assert_eq!(response.bucket, ScopeBucket::ChangeRequest);
    assert!(!response.diplomat_response.subject.is_empty());
    assert!(!response.diplomat_response.body.is_empty());
    assert!(!response.clause_citation.quote.is_empty());
    assert_eq!(
        response.extracted.exclusions,
        vec!["CSV export of any report", "Slack integration"]
    );
}

#[test]
fn scope_flow_tests_change_order_pack_falls_back_to_template() {
    let analysis = json!({
        "verdict": "out_of_scope",
        "bucket": "change_request",
        "estimate": {"size": "medium", "hours": 12.0, "rationale": "New endpoint plus UI."},
        "clauseCitation": {"section": null, "quote": "CSV export of any report"},
    })
    .to_string();

    let response = services_without_llm()
        .handle_change_order(
            "sow.txt",
            SOW.as_bytes(),
            "Add CSV export to the reporting page",
            "Acme Corp",
            Some("Development"),
            &analysis,
        )
        .expect("pack drafts");

    assert_eq!(response.model, None);
    assert_eq!(response.pack.client, "Acme Corp");
    assert_eq!(response.pack.estimate.engineering_hours, 12.0);
    assert_eq!(response.pack.estimate.total_usd, 1_800.0);
    assert_eq!(response.pack.clause_citation.quote, "CSV export of any report");
    assert!(!response.pack.timeline.milestones.is_empty());
    assert!(!response.pack.signature.client_line.is_empty());
}

#[test]
fn scope_flow_tests_client_note_template_without_llm() {
    let note = services_without_llm().handle_client_note(&ClientNoteRequest {
        note_type: ClientNoteType::Confirmation,
        overall_headline: "SAFE TO SIGN".to_string(),
        overall_rationale: "Minimal risk.".to_string(),
        top_issues: Vec::new(),
        estimated_extra_hours: 0.0,
        hourly_rate_usd: 150.0,
        consultation: None,
    });

    assert_eq!(note.model, None);
    assert!(note.diplomat_response.subject.contains("ready to proceed"));
    assert!(note.diplomat_response.body.contains("[Client Name]"));
}
