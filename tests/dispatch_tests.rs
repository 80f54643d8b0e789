use std::{collections::HashSet, sync::Arc, time::Duration};

use mail_dispatch::{
    error::DispatchError,
    models::{
        message::Recipient,
        status::{Priority, QueueItemStatus},
        template::EmailTemplate,
    },
    services::{
        cache::ExpiringCache,
        dispatch::{
            BulkDispatchOutcome, BulkDispatchRequest, BulkDispatcher, DispatchMode,
            DispatchSettings, template_cache_key,
        },
        queue::QueueConfig,
        templates::TemplateRegistry,
    },
};
use serde_json::{Map, Value as JsonValue, json};
use tokio::time::Instant;
use tokio_test::{assert_err, assert_ok};

use crate::common::{RecordingSender, SENDER, dispatcher_with, recipients};

fn data(value: JsonValue) -> Map<String, JsonValue> {
    value.as_object().cloned().unwrap_or_default()
}

fn template_request(recipients: Vec<Recipient>, mode: DispatchMode) -> BulkDispatchRequest {
    BulkDispatchRequest {
        recipients,
        subject: None,
        template_name: Some("welcome".to_string()),
        template_data: data(json!({"company": "Acme"})),
        from: None,
        mode,
        priority: Priority::Normal,
        batch_size: None,
    }
}

#[tokio::test]
async fn test_queued_send_returns_one_id_per_batch() {
    let sender = RecordingSender::new();
    let dispatcher = dispatcher_with(Arc::clone(&sender));

    let request = BulkDispatchRequest {
        batch_size: Some(1),
        ..template_request(
            recipients(&["ada@example.com", "grace@example.com"]),
            DispatchMode::Queued,
        )
    };

    let outcome = assert_ok!(dispatcher.send_bulk(request).await);

    let BulkDispatchOutcome::Queued {
        queued,
        batch_count,
        queue_ids,
        estimated_processing_time,
    } = outcome
    else {
        panic!("expected a queued outcome");
    };

    assert!(queued);
    assert_eq!(batch_count, 2);
    assert_eq!(queue_ids.len(), 2);
    assert_eq!(queue_ids.iter().collect::<HashSet<_>>().len(), 2);
    assert_eq!(estimated_processing_time, "3 seconds");

    assert_eq!(sender.calls(), 0, "queued sends must not hit the provider inline");
    assert_eq!(dispatcher.queue().len(), 2);
}

#[tokio::test]
async fn test_queued_items_are_delivered_by_the_queue() {
    let sender = RecordingSender::new();
    let dispatcher = dispatcher_with(Arc::clone(&sender));

    let outcome = dispatcher
        .send_bulk(template_request(
            vec![
                Recipient::new("ada@example.com").with_name("Ada"),
                Recipient::new("grace@example.com"),
            ],
            DispatchMode::Queued,
        ))
        .await
        .unwrap();

    let BulkDispatchOutcome::Queued { queue_ids, .. } = outcome else {
        panic!("expected a queued outcome");
    };

    let summary = dispatcher.queue().process_pending().await.unwrap();
    assert_eq!(summary.completed, 1);

    let report = dispatcher.queue_item_status(&queue_ids[0]).unwrap();
    assert_eq!(report.status, QueueItemStatus::Completed);

    let sent = sender.sent();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].subject, "Welcome to Acme!");
    assert!(sent[0].text.contains("Hi Ada,"));
    assert!(sent[1].text.contains("Hi grace@example.com,"));
    assert_eq!(sent[0].from, SENDER);
    assert_eq!(sent[0].custom_args.get("recipient_id").unwrap(), "ada@example.com");
    assert_eq!(
        sent[0].custom_args.get("batch_id"),
        sent[1].custom_args.get("batch_id"),
        "one batch shares one batch id"
    );
}

#[tokio::test]
async fn test_recipient_custom_data_fills_template() {
    let sender = RecordingSender::new();
    let dispatcher = dispatcher_with(Arc::clone(&sender));
    dispatcher.templates().add_template(
        "plan",
        EmailTemplate {
            subject: "Your {{plan}} plan".to_string(),
            text: "{{email}} is on {{plan}} at {{company}}".to_string(),
            html: "<p>{{plan}}</p>".to_string(),
        },
    );

    let mut vip = Recipient::new("vip@example.com");
    vip.custom_data = data(json!({"plan": "gold"}));

    let request = BulkDispatchRequest {
        template_name: Some("plan".to_string()),
        ..template_request(
            vec![vip, Recipient::new("std@example.com")],
            DispatchMode::Direct,
        )
    };

    assert_ok!(dispatcher.send_bulk(request).await);

    let sent = sender.sent();
    assert_eq!(sent[0].subject, "Your gold plan");
    assert_eq!(sent[0].text, "vip@example.com is on gold at Acme");
    assert_eq!(sent[1].subject, "Your {{plan}} plan");
    assert_eq!(sent[1].text, "std@example.com is on {{plan}} at Acme");
}

#[tokio::test]
async fn test_rendered_template_is_reused_from_cache() {
    let sender = RecordingSender::new();
    let dispatcher = dispatcher_with(Arc::clone(&sender));
    let replacement = EmailTemplate {
        subject: "Changed".to_string(),
        text: "changed".to_string(),
        html: "changed".to_string(),
    };

    dispatcher
        .send_bulk(template_request(
            recipients(&["a@example.com"]),
            DispatchMode::Direct,
        ))
        .await
        .unwrap();

    let key = template_cache_key("welcome", &data(json!({"company": "Acme"}))).unwrap();
    assert!(dispatcher.cache().has(&key));

    dispatcher.templates().add_template("welcome", replacement);

    dispatcher
        .send_bulk(template_request(
            recipients(&["b@example.com"]),
            DispatchMode::Direct,
        ))
        .await
        .unwrap();
    assert_eq!(sender.sent()[1].subject, "Welcome to Acme!");

    dispatcher.clear_cache();

    dispatcher
        .send_bulk(template_request(
            recipients(&["c@example.com"]),
            DispatchMode::Direct,
        ))
        .await
        .unwrap();
    assert_eq!(sender.sent()[2].subject, "Changed");
}

#[tokio::test]
async fn test_unknown_template_fails_before_sending() {
    let sender = RecordingSender::new();
    let dispatcher = dispatcher_with(Arc::clone(&sender));

    let request = BulkDispatchRequest {
        template_name: Some("missing".to_string()),
        ..template_request(recipients(&["a@example.com"]), DispatchMode::Queued)
    };

    let err = assert_err!(dispatcher.send_bulk(request).await);

    assert!(matches!(&err, DispatchError::TemplateNotFound(name) if name == "missing"));
    assert_eq!(err.to_string(), "Template \"missing\" not found");
    assert_eq!(sender.calls(), 0);
    assert!(dispatcher.queue().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_direct_send_isolates_failed_batches() {
    let sender = RecordingSender::failing_for(&["b@example.com"]);
    let dispatcher = BulkDispatcher::new(
        sender.clone(),
        Arc::new(TemplateRegistry::new()),
        Arc::new(ExpiringCache::new()),
        QueueConfig::default(),
        DispatchSettings::new(SENDER),
    );

    let request = BulkDispatchRequest {
        batch_size: Some(1),
        ..template_request(
            recipients(&["a@example.com", "b@example.com", "c@example.com"]),
            DispatchMode::Direct,
        )
    };

    let started = Instant::now();
    let outcome = dispatcher.send_bulk(request).await.unwrap();

    assert!(
        started.elapsed() >= Duration::from_millis(200),
        "batches are spaced by the inter-batch delay"
    );

    let BulkDispatchOutcome::Sent {
        queued,
        total_sent,
        batch_count,
        results,
    } = outcome
    else {
        panic!("expected a direct outcome");
    };

    assert!(!queued);
    assert_eq!(total_sent, 2);
    assert_eq!(batch_count, 3);
    assert_eq!(sender.calls(), 3);

    assert!(results[0].error.is_none());
    assert_eq!(results[0].sent, 1);
    assert_eq!(results[1].sent, 0);
    assert_eq!(
        results[1].error.as_deref(),
        Some("Service Unavailable - SendGrid maintenance")
    );
    assert!(results[2].error.is_none());
}

#[tokio::test]
async fn test_static_subject_uses_template_data_content() {
    let sender = RecordingSender::new();
    let dispatcher = dispatcher_with(Arc::clone(&sender));

    let request = BulkDispatchRequest {
        recipients: recipients(&["a@example.com"]),
        subject: Some("Maintenance tonight".to_string()),
        template_name: None,
        template_data: data(json!({"text": "Down at 10pm", "html": "<p>Down at 10pm</p>"})),
        from: Some("ops@example.com".to_string()),
        mode: DispatchMode::Direct,
        priority: Priority::Normal,
        batch_size: None,
    };

    dispatcher.send_bulk(request).await.unwrap();

    let sent = sender.sent();
    assert_eq!(sent[0].subject, "Maintenance tonight");
    assert_eq!(sent[0].text, "Down at 10pm");
    assert_eq!(sent[0].html, "<p>Down at 10pm</p>");
    assert_eq!(sent[0].from, "ops@example.com");
}

#[tokio::test]
async fn test_always_failing_item_ends_failed() {
    let sender = RecordingSender::failing_for(&["bad@example.com"]);
    let dispatcher = dispatcher_with(Arc::clone(&sender));

    let outcome = dispatcher
        .send_bulk(template_request(
            recipients(&["bad@example.com"]),
            DispatchMode::Queued,
        ))
        .await
        .unwrap();
    let BulkDispatchOutcome::Queued { queue_ids, .. } = outcome else {
        panic!("expected a queued outcome");
    };

    while dispatcher.queue().process_pending().await.is_some() {}

    let report = dispatcher.queue_item_status(&queue_ids[0]).unwrap();
    assert_eq!(report.status, QueueItemStatus::Failed);
    assert_eq!(report.attempts, 3);
    assert_eq!(sender.calls(), 3);
}

#[tokio::test]
async fn test_warm_up_reports_each_template() {
    let dispatcher = dispatcher_with(RecordingSender::new());
    let common = data(json!({"company": "Acme"}));

    let names = vec!["welcome".to_string(), "unknown".to_string()];
    let report = dispatcher.warm_up_cache(&names, &common).unwrap();
    assert_eq!(report.cached, vec!["welcome".to_string()]);
    assert_eq!(report.unknown, vec!["unknown".to_string()]);
    assert!(report.already_cached.is_empty());

    let report = dispatcher.warm_up_cache(&[], &common).unwrap();
    assert_eq!(
        report.cached,
        vec!["newsletter".to_string(), "passwordReset".to_string()]
    );
    assert_eq!(report.already_cached, vec!["welcome".to_string()]);

    assert_eq!(dispatcher.cache_stats().size, 3);
}
