mod common;

use docket_core::app::webhooks::signing;
use docket_core::app::{DocketConfig, EventCatalog};
use docket_core::domain::{
    DeliveryStatus, EndpointId, EndpointUpdate, NewEndpoint, WebhookEndpoint, WebhookEnvelope,
};
use docket_core::ports::{HttpResponse, TransportError};
use docket_core::{AppBuilder, DocketError, ValidationError};
use serde_json::json;

use common::{MockTransport, builder, wait_delivery_settled};

const CRM_URL: &str = "https://crm.example.com/hooks";

async fn endpoint(app: &docket_core::App, new: NewEndpoint) -> WebhookEndpoint {
    app.webhooks.create_endpoint(new).await.unwrap()
}

#[tokio::test]
async fn case_created_is_delivered_and_signed() {
    let transport = MockTransport::ok();
    let app = builder(2, transport.clone()).build().unwrap();
    let crm = endpoint(
        &app,
        NewEndpoint::new("crm", CRM_URL, &["case.created"])
            .with_secret("whsec_1")
            .with_header("X-Tenant", "acme"),
    )
    .await;

    let ids = app
        .webhooks
        .send_webhook("case.created", json!({"case_id": 42}), None)
        .await
        .unwrap();
    assert_eq!(ids.len(), 1);

    let delivery = wait_delivery_settled(&app, ids[0]).await;
    assert_eq!(delivery.status, DeliveryStatus::Delivered);
    assert_eq!(delivery.response_code, Some(200));
    assert!(delivery.delivered_at.is_some());
    assert_eq!(delivery.retry_count, 0);
    assert_eq!(delivery.endpoint_id, crm.id);
    assert_eq!(delivery.event_type.as_str(), "case.created");

    let requests = transport.requests();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert_eq!(request.url, CRM_URL);
    assert_eq!(request.headers["X-Tenant"], "acme");
    assert_eq!(request.headers["X-Webhook-Event"], "case.created");
    assert!(signing::verify(
        "whsec_1",
        &request.body,
        &request.headers["X-Webhook-Signature"]
    ));
    let sent: WebhookEnvelope = serde_json::from_slice(&request.body).unwrap();
    assert_eq!(sent.data, json!({"case_id": 42}));
    assert_eq!(sent, delivery.payload);

    let listed = app.webhooks.list_deliveries(crm.id, 10, 0).await.unwrap();
    assert_eq!(listed, vec![delivery]);

    app.shutdown().await;
}

#[tokio::test]
async fn fan_out_only_reaches_active_subscribers() {
    let app = builder(2, MockTransport::ok()).build().unwrap();
    let e1 = endpoint(&app, NewEndpoint::new("e1", CRM_URL, &["case.created"])).await;
    let e2 = endpoint(
        &app,
        NewEndpoint::new("e2", "https://billing.example.com/in", &["case.updated"]),
    )
    .await;
    let e3 = endpoint(
        &app,
        NewEndpoint::new("e3", "http://archive.internal/in", &["case.created"]).inactive(),
    )
    .await;

    let ids = app
        .webhooks
        .send_webhook("case.created", json!({"case_id": 7}), None)
        .await
        .unwrap();
    assert_eq!(ids.len(), 1);
    let delivery = wait_delivery_settled(&app, ids[0]).await;
    assert_eq!(delivery.endpoint_id, e1.id);

    assert!(app.webhooks.list_deliveries(e2.id, 10, 0).await.unwrap().is_empty());
    assert!(app.webhooks.list_deliveries(e3.id, 10, 0).await.unwrap().is_empty());

    let none = app
        .webhooks
        .send_webhook("document.uploaded", json!({}), None)
        .await
        .unwrap();
    assert!(none.is_empty());

    app.shutdown().await;
}

#[tokio::test]
async fn explicit_targets_skip_inactive_and_unknown_endpoints() {
    let app = builder(1, MockTransport::ok()).build().unwrap();
    let billing = endpoint(
        &app,
        NewEndpoint::new("billing", "https://billing.example.com/in", &["case.updated"]),
    )
    .await;
    let paused = endpoint(
        &app,
        NewEndpoint::new("paused", CRM_URL, &["case.closed"]).inactive(),
    )
    .await;
    let unknown = EndpointId::from_ulid(ulid::Ulid::new());

    let ids = app
        .webhooks
        .send_webhook(
            "case.closed",
            json!({"case_id": 1}),
            Some(&[billing.id, paused.id, unknown]),
        )
        .await
        .unwrap();
    assert_eq!(ids.len(), 1);
    let delivery = wait_delivery_settled(&app, ids[0]).await;
    assert_eq!(delivery.endpoint_id, billing.id);
    assert_eq!(delivery.status, DeliveryStatus::Delivered);

    app.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn failing_endpoint_is_retried_then_marked_failed() {
    let transport = MockTransport::status(500, "boom");
    let app = builder(1, transport.clone()).build().unwrap();
    let flaky = endpoint(
        &app,
        NewEndpoint::new("flaky", CRM_URL, &["case.created"]).with_retries(1, 5),
    )
    .await;

    let ids = app
        .webhooks
        .send_webhook("case.created", json!({"case_id": 3}), None)
        .await
        .unwrap();
    let delivery = wait_delivery_settled(&app, ids[0]).await;

    assert_eq!(delivery.status, DeliveryStatus::Failed);
    assert_eq!(delivery.retry_count, 1);
    assert_eq!(delivery.error_message.as_deref(), Some("HTTP 500: boom"));
    assert_eq!(delivery.response_code, None);
    assert_eq!(transport.requests().len(), 2);
    assert_eq!(delivery.endpoint_id, flaky.id);

    app.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn manual_retry_reopens_failed_delivery() {
    let transport = MockTransport::new(vec![
        Ok(HttpResponse {
            status: 503,
            body: "down".to_string(),
        }),
        Ok(HttpResponse {
            status: 200,
            body: "ok".to_string(),
        }),
    ]);
    let app = builder(1, transport.clone()).build().unwrap();
    endpoint(
        &app,
        NewEndpoint::new("crm", CRM_URL, &["case.created"]).with_retries(0, 1),
    )
    .await;

    let ids = app
        .webhooks
        .send_webhook("case.created", json!({}), None)
        .await
        .unwrap();
    let failed = wait_delivery_settled(&app, ids[0]).await;
    assert_eq!(failed.status, DeliveryStatus::Failed);

    assert!(app.scheduler.retry_job(failed.job_id).await);
    let reopened = app.webhooks.get_delivery(ids[0]).await.unwrap().unwrap();
    assert_eq!(reopened.status, DeliveryStatus::Pending);
    assert_eq!(reopened.retry_count, 1);

    let delivered = wait_delivery_settled(&app, ids[0]).await;
    assert_eq!(delivered.status, DeliveryStatus::Delivered);
    assert_eq!(delivered.response_code, Some(200));
    assert_eq!(delivered.retry_count, 1);
    assert_eq!(transport.requests().len(), 2);

    app.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn transient_failure_recovers_on_retry() {
    let transport = MockTransport::new(vec![
        Err(TransportError::Connect("connection refused".to_string())),
        Ok(HttpResponse {
            status: 202,
            body: "accepted".to_string(),
        }),
    ]);
    let app = builder(1, transport.clone()).build().unwrap();
    endpoint(
        &app,
        NewEndpoint::new("crm", CRM_URL, &["case.created"]).with_retries(3, 1),
    )
    .await;

    let ids = app
        .webhooks
        .send_webhook("case.created", json!({}), None)
        .await
        .unwrap();
    let delivery = wait_delivery_settled(&app, ids[0]).await;

    assert_eq!(delivery.status, DeliveryStatus::Delivered);
    assert_eq!(delivery.response_code, Some(202));
    assert_eq!(delivery.retry_count, 1);
    assert_eq!(transport.requests().len(), 2);

    app.shutdown().await;
}

#[tokio::test]
async fn test_endpoint_pings_synchronously() {
    let transport = MockTransport::ok();
    let app = builder(1, transport.clone()).build().unwrap();
    let crm = endpoint(&app, NewEndpoint::new("crm", CRM_URL, &["case.created"])).await;

    let result = app.webhooks.test_endpoint(crm.id).await.unwrap().unwrap();
    assert!(result.success);
    assert_eq!(result.status_code, Some(200));
    assert_eq!(result.response_body.as_deref(), Some("ok"));
    assert!(result.delivered_at.is_some());
    assert!(result.error.is_none());

    let requests = transport.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].headers["X-Webhook-Event"], "webhook.test");
    let sent: WebhookEnvelope = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(sent.data["endpoint_id"], json!(crm.id.to_string()));

    // no delivery row, no job
    assert!(app.webhooks.list_deliveries(crm.id, 10, 0).await.unwrap().is_empty());
    assert_eq!(app.scheduler.queue_counts().await.total(), 0);

    let unknown = EndpointId::from_ulid(ulid::Ulid::new());
    assert!(app.webhooks.test_endpoint(unknown).await.unwrap().is_none());

    app.shutdown().await;
}

#[tokio::test]
async fn test_endpoint_reports_http_errors() {
    let app = builder(1, MockTransport::status(404, "not found"))
        .build()
        .unwrap();
    let crm = endpoint(&app, NewEndpoint::new("crm", CRM_URL, &["case.created"])).await;

    let result = app.webhooks.test_endpoint(crm.id).await.unwrap().unwrap();
    assert!(!result.success);
    assert_eq!(result.status_code, Some(404));
    assert_eq!(result.error.as_deref(), Some("HTTP 404"));
    assert!(result.delivered_at.is_none());

    app.shutdown().await;
}

#[tokio::test]
async fn invalid_endpoints_are_rejected() {
    let app = builder(1, MockTransport::ok()).build().unwrap();

    let cases = [
        (
            NewEndpoint::new("crm", "ftp://crm.example.com", &["case.created"]),
            ValidationError::InvalidUrl("ftp://crm.example.com".to_string()),
        ),
        (NewEndpoint::new("crm", CRM_URL, &[]), ValidationError::EmptyEvents),
        (
            NewEndpoint::new("   ", CRM_URL, &["case.created"]),
            ValidationError::EmptyName,
        ),
        (
            NewEndpoint::new("crm", CRM_URL, &["case.created"]).with_header("X Tenant", "acme"),
            ValidationError::InvalidHeader("X Tenant".to_string()),
        ),
        (
            NewEndpoint::new("crm", CRM_URL, &["case.created"])
                .with_header("X-Tenant", "acme\nX-Injected: 1"),
            ValidationError::InvalidHeader("X-Tenant".to_string()),
        ),
    ];
    for (new, expected) in cases {
        match app.webhooks.create_endpoint(new).await {
            Err(DocketError::Validation(err)) => assert_eq!(err, expected),
            other => panic!("expected {expected:?}, got {other:?}"),
        }
    }

    let too_many = app
        .webhooks
        .create_endpoint(NewEndpoint::new("crm", CRM_URL, &["case.created"]).with_retries(11, 60))
        .await;
    assert!(matches!(
        too_many,
        Err(DocketError::Validation(ValidationError::OutOfBounds { field: "max_retries", .. }))
    ));

    assert!(app.webhooks.list_endpoints(false).await.unwrap().is_empty());
    app.shutdown().await;
}

#[tokio::test]
async fn restricted_catalog_rejects_unknown_events() {
    let mut config = DocketConfig::default();
    config.webhook.event_catalog =
        EventCatalog::restricted(["case.created", "case.updated"]).unwrap();
    let app = AppBuilder::new()
        .with_config(config)
        .with_transport(MockTransport::ok())
        .build()
        .unwrap();

    let rejected = app
        .webhooks
        .create_endpoint(NewEndpoint::new("crm", CRM_URL, &["case.created", "case.exploded"]))
        .await;
    assert!(matches!(
        rejected,
        Err(DocketError::Validation(ValidationError::UnknownEventType(ref e))) if e == "case.exploded"
    ));

    let send = app
        .webhooks
        .send_webhook("case.exploded", json!({}), None)
        .await;
    assert!(matches!(
        send,
        Err(DocketError::Validation(ValidationError::UnknownEventType(_)))
    ));

    app.shutdown().await;
}

#[tokio::test]
async fn endpoints_can_be_updated_listed_and_deleted() {
    let app = builder(1, MockTransport::ok()).build().unwrap();
    let first = endpoint(&app, NewEndpoint::new("crm", CRM_URL, &["case.created"])).await;
    let second = endpoint(
        &app,
        NewEndpoint::new("billing", "https://billing.example.com/in", &["invoice.paid"]),
    )
    .await;

    let updated = app
        .webhooks
        .update_endpoint(
            first.id,
            EndpointUpdate {
                events: Some(vec!["case.created".to_string(), "case.closed".to_string()]),
                active: Some(false),
                secret: Some(Some("rotated".to_string())),
                ..EndpointUpdate::default()
            },
        )
        .await
        .unwrap()
        .unwrap();
    assert!(!updated.active);
    assert_eq!(updated.events.len(), 2);
    assert_eq!(updated.secret.as_deref(), Some("rotated"));
    assert_eq!(updated.created_at, first.created_at);

    let bad = app
        .webhooks
        .update_endpoint(
            first.id,
            EndpointUpdate {
                url: Some("not a url".to_string()),
                ..EndpointUpdate::default()
            },
        )
        .await;
    assert!(matches!(
        bad,
        Err(DocketError::Validation(ValidationError::InvalidUrl(_)))
    ));
    let unchanged = app.webhooks.get_endpoint(first.id).await.unwrap().unwrap();
    assert_eq!(unchanged.url, CRM_URL);

    let all = app.webhooks.list_endpoints(false).await.unwrap();
    assert_eq!(
        all.iter().map(|e| e.id).collect::<Vec<_>>(),
        vec![first.id, second.id]
    );
    let active = app.webhooks.list_endpoints(true).await.unwrap();
    assert_eq!(active.iter().map(|e| e.id).collect::<Vec<_>>(), vec![second.id]);

    assert!(app.webhooks.delete_endpoint(second.id).await.unwrap());
    assert!(!app.webhooks.delete_endpoint(second.id).await.unwrap());
    assert!(app.webhooks.get_endpoint(second.id).await.unwrap().is_none());

    let missing = EndpointId::from_ulid(ulid::Ulid::new());
    assert!(
        app.webhooks
            .update_endpoint(missing, EndpointUpdate::default())
            .await
            .unwrap()
            .is_none()
    );

    app.shutdown().await;
}

#[tokio::test]
async fn delivery_statistics_count_outcomes() {
    let transport = MockTransport::new(vec![
        Ok(HttpResponse {
            status: 500,
            body: "boom".to_string(),
        }),
        Ok(HttpResponse {
            status: 200,
            body: "ok".to_string(),
        }),
    ]);
    let app = builder(1, transport).build().unwrap();
    let crm = endpoint(
        &app,
        NewEndpoint::new("crm", CRM_URL, &["case.created", "case.updated"]).with_retries(0, 60),
    )
    .await;

    let first = app
        .webhooks
        .send_webhook("case.created", json!({"case_id": 1}), None)
        .await
        .unwrap();
    wait_delivery_settled(&app, first[0]).await;
    let second = app
        .webhooks
        .send_webhook("case.updated", json!({"case_id": 1}), None)
        .await
        .unwrap();
    wait_delivery_settled(&app, second[0]).await;

    let stats = app.webhooks.get_delivery_statistics(None, 24).await.unwrap();
    assert_eq!(stats.total_deliveries, 2);
    assert_eq!(stats.by_status.get("failed"), Some(&1));
    assert_eq!(stats.by_status.get("delivered"), Some(&1));
    assert_eq!(stats.by_event.get("case.created"), Some(&1));
    assert_eq!(stats.by_event.get("case.updated"), Some(&1));
    assert!((stats.success_rate - 50.0).abs() < 1e-9);
    assert_eq!(stats.total_endpoints, 1);
    assert_eq!(stats.active_endpoints, 1);

    let scoped = app
        .webhooks
        .get_delivery_statistics(Some(crm.id), 24)
        .await
        .unwrap();
    assert_eq!(scoped.total_deliveries, 2);
    let other = EndpointId::from_ulid(ulid::Ulid::new());
    let empty = app
        .webhooks
        .get_delivery_statistics(Some(other), 24)
        .await
        .unwrap();
    assert_eq!(empty.total_deliveries, 0);
    assert_eq!(empty.success_rate, 0.0);

    app.shutdown().await;
}
