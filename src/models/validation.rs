use std::sync::LazyLock;

use regex::Regex;

use crate::{
    error::{DispatchError, FieldError},
    models::{
        message::Recipient,
        request::{
            Addresses, SendBulkCachedRequest, SendBulkRequest, SendDynamicTemplateRequest,
            SendEmailRequest, SendTemplateEmailRequest,
        },
    },
};

pub const MAX_CACHED_BULK_RECIPIENTS: usize = 10_000;
pub const MAX_BULK_RECIPIENTS: usize = 1_000;
pub const MAX_BATCH_SIZE: usize = 1_000;
pub const MAX_SUBJECT_LENGTH: usize = 200;

static EMAIL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email pattern"));

pub fn is_valid_email(address: &str) -> bool {
    EMAIL_PATTERN.is_match(address)
}

pub fn validate_send_email(request: &SendEmailRequest) -> Result<(), DispatchError> {
    let mut errors = Vec::new();

    check_addresses("to", &request.to, &mut errors);
    check_subject("subject", &request.subject, &mut errors);

    if request.text.is_none() && request.html.is_none() {
        errors.push(FieldError::new(
            "text",
            "at least one of \"text\" or \"html\" is required",
        ));
    }

    for (index, attachment) in request.attachments.iter().enumerate() {
        if attachment.content.is_empty() {
            errors.push(FieldError::new(
                format!("attachments.{}.content", index),
                "\"content\" is not allowed to be empty",
            ));
        }
        if attachment.filename.trim().is_empty() {
            errors.push(FieldError::new(
                format!("attachments.{}.filename", index),
                "\"filename\" is not allowed to be empty",
            ));
        }
    }

    finish(errors)
}

pub fn validate_send_dynamic_template(
    request: &SendDynamicTemplateRequest,
) -> Result<(), DispatchError> {
    let mut errors = Vec::new();

    check_addresses("to", &request.to, &mut errors);

    if request.template_id.trim().is_empty() {
        errors.push(FieldError::new("templateId", "\"templateId\" is required"));
    }

    finish(errors)
}

pub fn validate_send_template_email(
    request: &SendTemplateEmailRequest,
) -> Result<(), DispatchError> {
    let mut errors = Vec::new();

    check_addresses("to", &request.to, &mut errors);

    if request.template_name.trim().is_empty() {
        errors.push(FieldError::new("templateName", "\"templateName\" is required"));
    }
    if let Some(subject) = &request.subject {
        check_subject("subject", subject, &mut errors);
    }

    finish(errors)
}

pub fn validate_send_bulk(request: &SendBulkRequest) -> Result<(), DispatchError> {
    let mut errors = Vec::new();

    check_recipients(&request.recipients, MAX_BULK_RECIPIENTS, &mut errors);
    check_subject("subject", &request.subject, &mut errors);

    finish(errors)
}

pub fn validate_send_bulk_cached(request: &SendBulkCachedRequest) -> Result<(), DispatchError> {
    let mut errors = Vec::new();

    check_recipients(&request.recipients, MAX_CACHED_BULK_RECIPIENTS, &mut errors);

    match (&request.subject, &request.template_name) {
        (Some(subject), None) => check_subject("subject", subject, &mut errors),
        (None, Some(_)) => {}
        (Some(_), Some(_)) => errors.push(FieldError::new(
            "subject",
            "\"subject\" and \"templateName\" are mutually exclusive",
        )),
        (None, None) => errors.push(FieldError::new(
            "subject",
            "one of \"subject\" or \"templateName\" is required",
        )),
    }

    if let Some(batch_size) = request.batch_size {
        if !(1..=MAX_BATCH_SIZE).contains(&batch_size) {
            errors.push(FieldError::new(
                "batchSize",
                format!("\"batchSize\" must be between 1 and {}", MAX_BATCH_SIZE),
            ));
        }
    }

    finish(errors)
}

fn check_addresses(field: &str, addresses: &Addresses, errors: &mut Vec<FieldError>) {
    let addresses = addresses.as_slice();

    if addresses.is_empty() {
        errors.push(FieldError::new(field, format!("\"{}\" must contain at least 1 address", field)));
    }

    for (index, address) in addresses.iter().enumerate() {
        if !is_valid_email(address) {
            errors.push(FieldError::new(
                format!("{}.{}", field, index),
                "must be a valid email",
            ));
        }
    }
}

fn check_recipients(recipients: &[Recipient], max: usize, errors: &mut Vec<FieldError>) {
    if recipients.is_empty() {
        errors.push(FieldError::new(
            "recipients",
            "\"recipients\" must contain at least 1 item",
        ));
    } else if recipients.len() > max {
        errors.push(FieldError::new(
            "recipients",
            format!("\"recipients\" must contain less than or equal to {} items", max),
        ));
    }

    for (index, recipient) in recipients.iter().enumerate() {
        if !is_valid_email(&recipient.email) {
            errors.push(FieldError::new(
                format!("recipients.{}.email", index),
                "must be a valid email",
            ));
        }
    }
}

fn check_subject(field: &str, subject: &str, errors: &mut Vec<FieldError>) {
    let length = subject.chars().count();
    if length == 0 || length > MAX_SUBJECT_LENGTH {
        errors.push(FieldError::new(
            field,
            format!(
                "\"{}\" length must be between 1 and {} characters",
                field, MAX_SUBJECT_LENGTH
            ),
        ));
    }
}

fn finish(errors: Vec<FieldError>) -> Result<(), DispatchError> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(DispatchError::Validation(errors))
    }
}
