use metrics_exporter_prometheus::PrometheusBuilder;

// NOTE: This is an integration test so it exercises the public API surface
// (`common::observability`) instead of reaching into private internals.

#[test]
fn tracing_error_events_counter_increments_on_error_event() {
    let recorder = PrometheusBuilder::new().build_recorder();
    let handle = recorder.handle();

    metrics::with_local_recorder(&recorder, || {
        let dispatch = common::observability::build_dispatch("info");

        tracing::dispatcher::with_default(&dispatch, || {
            tracing::error!(wallet = "0xabc", "boom");
        });
    });

    let rendered = handle.render();
    assert!(
        rendered.contains("tracing_error_events"),
        "expected tracing_error_events in rendered metrics, got:\n{rendered}"
    );
}

#[test]
fn warn_events_do_not_touch_error_counter() {
    let recorder = PrometheusBuilder::new().build_recorder();
    let handle = recorder.handle();

    metrics::with_local_recorder(&recorder, || {
        let dispatch = common::observability::build_dispatch("info");

        tracing::dispatcher::with_default(&dispatch, || {
            tracing::warn!(column = "sum_repay", "zero variance");
        });
    });

    assert!(!handle.render().contains("tracing_error_events"));
}
