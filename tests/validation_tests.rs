use mail_dispatch::{
    error::DispatchError,
    models::{
        request::{
            SendBulkCachedRequest, SendDynamicTemplateRequest, SendEmailRequest,
            SendTemplateEmailRequest,
        },
        validation::{
            is_valid_email, validate_send_bulk_cached, validate_send_dynamic_template,
            validate_send_email, validate_send_template_email,
        },
    },
};
use serde_json::{Value as JsonValue, json};

fn field_names(err: DispatchError) -> Vec<String> {
    match err {
        DispatchError::Validation(errors) => errors.into_iter().map(|e| e.field).collect(),
        other => panic!("expected a validation error, got {:?}", other),
    }
}

fn bulk_cached(body: JsonValue) -> SendBulkCachedRequest {
    serde_json::from_value(body).unwrap()
}

#[test]
fn test_email_pattern() {
    assert!(is_valid_email("user@example.com"));
    assert!(is_valid_email("first.last+tag@sub.example.co"));
    assert!(!is_valid_email("user@localhost"));
    assert!(!is_valid_email("user example@example.com"));
    assert!(!is_valid_email("@example.com"));
    assert!(!is_valid_email(""));
}

#[test]
fn test_send_email_requires_a_body() {
    let request: SendEmailRequest = serde_json::from_value(json!({
        "to": ["a@example.com", "broken"],
        "subject": "",
    }))
    .unwrap();

    let err = validate_send_email(&request).unwrap_err();
    assert_eq!(field_names(err), vec!["to.1", "subject", "text"]);
}

#[test]
fn test_send_email_attachments_need_content_and_filename() {
    let request: SendEmailRequest = serde_json::from_value(json!({
        "to": "a@example.com",
        "subject": "Report",
        "text": "See attached",
        "attachments": [
            {"content": "aGVsbG8=", "filename": "ok.txt"},
            {"content": "aGVsbG8=", "filename": " "},
        ],
    }))
    .unwrap();

    let err = validate_send_email(&request).unwrap_err();
    assert_eq!(field_names(err), vec!["attachments.1.filename"]);
}

#[test]
fn test_dynamic_template_validation() {
    let request: SendDynamicTemplateRequest = serde_json::from_value(json!({
        "to": ["a@example.com"],
        "templateId": "d-1",
        "dynamicTemplateData": {"name": "Ada"},
    }))
    .unwrap();
    assert!(validate_send_dynamic_template(&request).is_ok());

    let request: SendDynamicTemplateRequest = serde_json::from_value(json!({
        "to": "broken",
        "templateId": "",
        "dynamicTemplateData": {},
    }))
    .unwrap();

    let err = validate_send_dynamic_template(&request).unwrap_err();
    assert_eq!(field_names(err), vec!["to.0", "templateId"]);
}

#[test]
fn test_template_email_accepts_single_address() {
    let request: SendTemplateEmailRequest = serde_json::from_value(json!({
        "to": "a@example.com",
        "templateName": "welcome",
    }))
    .unwrap();

    assert!(validate_send_template_email(&request).is_ok());
}

#[test]
fn test_bulk_cached_defaults() {
    let request = bulk_cached(json!({
        "recipients": [{"email": "a@example.com"}],
        "subject": "Hi",
    }));

    assert!(request.use_queue);
    assert_eq!(request.priority.to_string(), "normal");
    assert!(validate_send_bulk_cached(&request).is_ok());
}

#[test]
fn test_bulk_cached_subject_and_template_are_exclusive() {
    let request = bulk_cached(json!({
        "recipients": [{"email": "a@example.com"}],
        "subject": "Hi",
        "templateName": "welcome",
    }));

    let err = validate_send_bulk_cached(&request).unwrap_err();
    assert_eq!(field_names(err), vec!["subject"]);
}

#[test]
fn test_bulk_cached_rejects_oversized_subject() {
    let request = bulk_cached(json!({
        "recipients": [{"email": "a@example.com"}],
        "subject": "x".repeat(201),
    }));

    assert!(validate_send_bulk_cached(&request).is_err());
}

#[test]
fn test_bulk_cached_recipient_limit() {
    let recipients: Vec<JsonValue> = (0..10_001)
        .map(|i| json!({"email": format!("user{}@example.com", i)}))
        .collect();

    let request = bulk_cached(json!({
        "recipients": recipients,
        "templateName": "welcome",
    }));

    let err = validate_send_bulk_cached(&request).unwrap_err();
    assert_eq!(field_names(err), vec!["recipients"]);
}

#[test]
fn test_bulk_cached_batch_size_bounds() {
    for batch_size in [0, 1001] {
        let request = bulk_cached(json!({
            "recipients": [{"email": "a@example.com"}],
            "templateName": "welcome",
            "batchSize": batch_size,
        }));

        let err = validate_send_bulk_cached(&request).unwrap_err();
        assert_eq!(field_names(err), vec!["batchSize"]);
    }
}

#[test]
fn test_unknown_priority_is_rejected() {
    let result = serde_json::from_value::<SendBulkCachedRequest>(json!({
        "recipients": [{"email": "a@example.com"}],
        "subject": "Hi",
        "priority": "urgent",
    }));

    assert!(result.is_err());
}
