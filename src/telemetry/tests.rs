use super::*;

fn config() -> TelemetryConfig {
    TelemetryConfig {
        api_key: Some("api".to_string()),
        app_key: Some("app".to_string()),
        service_name: "booking".to_string(),
        version: "1.2.0".to_string(),
        function_name: "Booking-Create".to_string(),
        function_unique_code: "abc".to_string(),
        host: Some("booking-create-fn".to_string()),
        ..Default::default()
    }
}

fn telemetry() -> (Arc<RecordingSink>, Telemetry) {
    let sink = Arc::new(RecordingSink::new());
    let telemetry = Telemetry::new(&config(), sink.clone());
    (sink, telemetry)
}

#[tokio::test(start_paused = true)]
async fn test_metrics_are_batched_into_one_submission() {
    let (sink, telemetry) = telemetry();

    for _ in 0..5 {
        telemetry.queue_metric("dynamodb.get", 1.0, MetricKind::Count, &[]);
    }
    assert_eq!(telemetry.pending().0, 5);

    tokio::time::sleep(Duration::from_millis(350)).await;
    telemetry.flush().await;

    let batches = sink.metric_batches().await;
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].len(), 5);
}

#[tokio::test(start_paused = true)]
async fn test_metric_shape() {
    let (sink, telemetry) = telemetry();

    telemetry.queue_metric(
        "dynamodb.put",
        1.0,
        MetricKind::Count,
        &["Table:Users".to_string(), "service:booking".to_string()],
    );
    telemetry.flush().await;

    let metrics = sink.metrics().await;
    assert_eq!(metrics.len(), 1);
    let series = &metrics[0];
    assert_eq!(series.metric, "booking.dynamodb.put");
    assert_eq!(series.host, "booking-create-fn");
    assert_eq!(series.kind, MetricKind::Count);
    assert_eq!(series.points.len(), 1);
    assert_eq!(series.points[0].1, 1.0);
    assert_eq!(
        series.tags,
        vec![
            "function_name:booking-create",
            "function_unique_code:abc",
            "service:booking",
            "table:users",
            "version:1.2.0",
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_events_flush_as_one_batch() {
    let (sink, telemetry) = telemetry();

    telemetry.queue_event("first", "a", AlertType::Error, &[]);
    telemetry.queue_event("second", "b", AlertType::Warning, &["x:y".to_string()]);

    tokio::time::sleep(Duration::from_millis(350)).await;
    telemetry.flush().await;

    let batches = sink.event_batches().await;
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0][1].title, "second");
    assert_eq!(batches[0][1].tags, vec!["x:y".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_missing_credentials_disable_metrics_and_events() {
    let sink = Arc::new(RecordingSink::new());
    let config = TelemetryConfig {
        api_key: Some("placeholder".to_string()),
        ..config()
    };
    let telemetry = Telemetry::new(&config, sink.clone());

    assert!(!telemetry.is_enabled());
    telemetry.queue_metric("m", 1.0, MetricKind::Gauge, &[]);
    telemetry.queue_event("t", "x", AlertType::Info, &[]);
    telemetry.queue_log("still logged");
    assert_eq!(telemetry.pending(), (0, 0, 1));

    telemetry.flush().await;
    assert_eq!(sink.calls(), 0);
    assert_eq!(telemetry.pending(), (0, 0, 0));
}

#[tokio::test(start_paused = true)]
async fn test_sink_failure_is_swallowed() {
    let (sink, telemetry) = telemetry();
    sink.set_fail(true);

    telemetry.queue_metric("m", 1.0, MetricKind::Count, &[]);
    telemetry.flush().await;

    assert_eq!(sink.calls(), 1);
    assert!(sink.metrics().await.is_empty());
    // Nothing is re-queued after a failure
    assert_eq!(telemetry.pending(), (0, 0, 0));
}

#[tokio::test(start_paused = true)]
async fn test_log_lines_use_their_own_window() {
    let (_sink, telemetry) = telemetry();

    telemetry.queue_log("one");
    telemetry.queue_log("two");

    // Metrics window (300ms) elapsed, log window (1000ms) has not
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(telemetry.pending().2, 2);

    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(telemetry.pending().2, 0);
}

#[test]
fn test_disabled_telemetry_has_no_credentials() {
    let telemetry = Telemetry::disabled();
    assert!(!telemetry.is_enabled());
}
