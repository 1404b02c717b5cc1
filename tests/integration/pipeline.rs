//! End-to-end tick pipeline: sample → history → detect → dispatch → truncate

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use instance_monitor::actors::metric_monitor::KindMonitor;
use instance_monitor::actors::ticker::TickHandler;
use instance_monitor::dispatcher::DispatchKey;
use instance_monitor::monitors::trend;
use instance_monitor::{AlertSource, CheckStatus, MetricCheckResult, MetricKind};

use crate::helpers::*;

fn single_instance(kind: MetricKind, k: usize, values: &[f64]) -> (Harness, Arc<ScriptedSource>) {
    let source = Arc::new(ScriptedSource::default());
    source.push(
        "orders-1",
        &values.iter().copied().map(Some).collect::<Vec<_>>(),
    );
    let registry = Arc::new(MutableRegistry::new(vec![instance(
        "orders-1",
        "orders",
        "http://orders-1/actuator",
    )]));
    let harness = harness(
        registry,
        BTreeMap::from([(kind, settings(k, 0.0))]),
        HashMap::new(),
        source.clone(),
    );
    (harness, source)
}

#[tokio::test]
async fn test_sustained_increase_alerts_once() {
    let kind = MetricKind::HeapUsed;
    let (h, _source) = single_instance(kind, 3, &[100.0, 120.0, 140.0, 160.0, 170.0]);
    let monitor = KindMonitor::new(kind, h.ctx.clone());

    let mut dispatched = 0;
    let mut suppressed = 0;
    for tick in 0..4 {
        let report = monitor.run_tick(tick * 30 * SECOND_MS).await;
        dispatched += report.alerts_dispatched;
        suppressed += report.alerts_suppressed;
    }

    let config = h.ctx.policy.trend_config("orders", kind).unwrap();
    let window = h.ctx.history.window(kind, "orders-1");
    assert_eq!(
        trend::detect(&window, &config),
        MetricCheckResult::sustained_increase(160.0, 40.0)
    );

    let report = monitor.run_tick(120 * SECOND_MS).await;
    assert_eq!(report.alerts_dispatched, 0);
    assert_eq!(report.alerts_suppressed, 1);

    assert_eq!(dispatched, 1);
    assert_eq!(suppressed, 1);

    h.ctx.dispatcher.flush().await;
    let messages = h.notifier.messages();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].content.contains("orders-1"));
    assert!(messages[0].content.contains("heap_used"));

    let stats = h.counters.snapshot();
    assert_eq!(stats.alerts_dispatched, 1);
    assert_eq!(stats.alerts_suppressed, 2);
    assert_eq!(stats.notify_successes, 1);
}

#[tokio::test]
async fn test_noisy_spike_is_ignored() {
    let kind = MetricKind::ThreadCount;
    let (h, _source) = single_instance(kind, 3, &[100.0, 150.0, 140.0, 160.0]);
    let monitor = KindMonitor::new(kind, h.ctx.clone());

    for tick in 0..4 {
        let report = monitor.run_tick(tick * 30 * SECOND_MS).await;
        assert_eq!(report.alerts_dispatched, 0, "tick {tick}");
    }

    h.ctx.dispatcher.flush().await;
    assert!(h.notifier.messages().is_empty());
}

#[tokio::test]
async fn test_absolute_threshold_fires_while_warming_up() {
    let kind = MetricKind::CpuLoad;
    let source = Arc::new(ScriptedSource::default());
    source.push("api-1", &[Some(0.2), Some(0.95)]);

    let mut cpu = settings(3, 0.0);
    cpu.absolute_max = Some(0.9);
    let h = harness(
        Arc::new(MutableRegistry::new(vec![instance("api-1", "api", "http://api-1")])),
        BTreeMap::from([(kind, cpu)]),
        HashMap::new(),
        source,
    );
    let monitor = KindMonitor::new(kind, h.ctx.clone());

    assert_eq!(monitor.run_tick(0).await.alerts_dispatched, 0);
    assert_eq!(monitor.run_tick(30 * SECOND_MS).await.alerts_dispatched, 1);

    let key = DispatchKey {
        service_name: "api".to_string(),
        source: AlertSource::Metric(kind),
        instance_id: Some("api-1".to_string()),
        status: CheckStatus::Threshold,
    };
    assert_matches!(
        h.ctx.dispatcher.record(&key),
        Some(record) if record.last_sent_at_ms == 30_000
    );

    h.ctx.dispatcher.flush().await;
    assert!(h.notifier.messages()[0].content.contains("CPU load above limit"));
}

#[tokio::test]
async fn test_history_bounded_by_keep_increasing_count() {
    let kind = MetricKind::LoadedClasses;
    let values: Vec<f64> = (0..10).map(|i| (i % 3) as f64).collect();
    let (h, _source) = single_instance(kind, 4, &values);
    let monitor = KindMonitor::new(kind, h.ctx.clone());

    for tick in 0..10 {
        monitor.run_tick(tick * 30 * SECOND_MS).await;
        assert!(h.ctx.history.len(kind, "orders-1") <= 4);
    }
    assert_eq!(h.ctx.history.len(kind, "orders-1"), 4);
}

#[tokio::test]
async fn test_departed_instance_is_evicted_with_its_dispatch_records() {
    let kind = MetricKind::ThreadCount;
    let source = Arc::new(ScriptedSource::default());
    source.push("a", &[Some(1.0), Some(1.0), Some(1.0)]);
    source.push("b", &[Some(10.0), Some(20.0)]);

    let registry = Arc::new(MutableRegistry::new(vec![
        instance("a", "orders", "http://a"),
        instance("b", "orders", "http://b"),
    ]));
    let h = harness(
        registry.clone(),
        BTreeMap::from([(kind, settings(2, 5.0))]),
        HashMap::new(),
        source,
    );
    let monitor = KindMonitor::new(kind, h.ctx.clone());

    monitor.run_tick(0).await;
    let report = monitor.run_tick(30 * SECOND_MS).await;
    assert_eq!(report.alerts_dispatched, 1);

    let key = DispatchKey {
        service_name: "orders".to_string(),
        source: AlertSource::Metric(kind),
        instance_id: Some("b".to_string()),
        status: CheckStatus::SustainedIncrease,
    };
    assert!(h.ctx.dispatcher.record(&key).is_some());

    registry.set(vec![instance("a", "orders", "http://a")]);
    let report = monitor.run_tick(60 * SECOND_MS).await;

    assert_eq!(report.evicted, vec!["b".to_string()]);
    assert_eq!(h.ctx.history.len(kind, "b"), 0);
    assert_eq!(h.ctx.history.len(kind, "a"), 2);
    assert!(h.ctx.dispatcher.record(&key).is_none());
    assert_eq!(h.counters.snapshot().instances_evicted, 1);
}

#[tokio::test]
async fn test_eviction_clears_every_kind_of_departed_instance() {
    let heap = MetricKind::HeapUsed;
    let threads = MetricKind::ThreadCount;
    let source = Arc::new(ScriptedSource::default());
    source.push("a", &[Some(1.0); 5]);
    // heap and thread ticks alternate on the same queue
    source.push("b", &[Some(10.0), Some(10.0), Some(20.0), Some(20.0)]);

    let registry = Arc::new(MutableRegistry::new(vec![
        instance("a", "orders", "http://a"),
        instance("b", "orders", "http://b"),
    ]));
    let h = harness(
        registry.clone(),
        BTreeMap::from([(heap, settings(2, 5.0)), (threads, settings(2, 5.0))]),
        HashMap::new(),
        source,
    );
    let heap_monitor = KindMonitor::new(heap, h.ctx.clone());
    let thread_monitor = KindMonitor::new(threads, h.ctx.clone());

    for tick in 0..2 {
        heap_monitor.run_tick(tick * 30 * SECOND_MS).await;
        thread_monitor.run_tick(tick * 30 * SECOND_MS).await;
    }

    let key = |kind| DispatchKey {
        service_name: "orders".to_string(),
        source: AlertSource::Metric(kind),
        instance_id: Some("b".to_string()),
        status: CheckStatus::SustainedIncrease,
    };
    assert!(h.ctx.dispatcher.record(&key(heap)).is_some());
    assert!(h.ctx.dispatcher.record(&key(threads)).is_some());

    // only the heap monitor observes the departure
    registry.set(vec![instance("a", "orders", "http://a")]);
    let report = heap_monitor.run_tick(60 * SECOND_MS).await;
    assert_eq!(report.evicted, vec!["b".to_string()]);

    assert_eq!(h.ctx.history.len(heap, "b"), 0);
    assert_eq!(h.ctx.history.len(threads, "b"), 0);
    assert!(h.ctx.dispatcher.record(&key(heap)).is_none());
    assert!(h.ctx.dispatcher.record(&key(threads)).is_none());
    assert_eq!(h.ctx.history.len(threads, "a"), 2);
}

#[tokio::test]
async fn test_evict_instance_drops_history_and_dispatch_records() {
    let kind = MetricKind::CpuLoad;
    let (h, _source) = single_instance(kind, 2, &[0.1, 0.2]);
    let monitor = KindMonitor::new(kind, h.ctx.clone());

    monitor.run_tick(0).await;
    let report = monitor.run_tick(30 * SECOND_MS).await;
    assert_eq!(report.alerts_dispatched, 1);
    assert_eq!(h.ctx.dispatcher.record_count(), 1);

    h.ctx.evict_instance("orders-1");

    assert_eq!(h.ctx.history.len(kind, "orders-1"), 0);
    assert_eq!(h.ctx.dispatcher.record_count(), 0);
}

#[tokio::test]
async fn test_sample_error_skips_only_that_instance() {
    let kind = MetricKind::HeapUsed;
    let source = Arc::new(ScriptedSource::default());
    source.push("good", &[Some(1.0)]);
    source.push("bad", &[None]);

    let h = harness(
        Arc::new(MutableRegistry::new(vec![
            instance("good", "orders", "http://good"),
            instance("bad", "orders", "http://bad"),
        ])),
        BTreeMap::from([(kind, settings(3, 0.0))]),
        HashMap::new(),
        source,
    );

    let report = KindMonitor::new(kind, h.ctx.clone()).run_tick(0).await;

    assert_eq!(report.checked, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(h.ctx.history.len(kind, "good"), 1);
    assert_eq!(h.ctx.history.len(kind, "bad"), 0);

    let stats = h.counters.snapshot();
    assert_eq!(stats.samples_taken, 1);
    assert_eq!(stats.sample_errors, 1);
}

#[tokio::test]
async fn test_unhealthy_instances_are_not_sampled_but_keep_history() {
    let kind = MetricKind::HeapUsed;
    let source = Arc::new(ScriptedSource::default());
    source.push("a", &[Some(1.0)]);

    let registry = Arc::new(MutableRegistry::new(vec![instance("a", "orders", "http://a")]));
    let h = harness(
        registry.clone(),
        BTreeMap::from([(kind, settings(3, 0.0))]),
        HashMap::new(),
        source.clone(),
    );
    let monitor = KindMonitor::new(kind, h.ctx.clone());
    monitor.run_tick(0).await;

    let mut down = instance("a", "orders", "http://a");
    down.healthy = false;
    registry.set(vec![down]);

    let report = monitor.run_tick(30 * SECOND_MS).await;
    assert_eq!(report.checked, 0);
    assert!(report.evicted.is_empty());
    assert_eq!(source.calls().len(), 1);
    assert_eq!(h.ctx.history.len(kind, "a"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_unavailable_fleet_makes_tick_a_no_op() {
    let kind = MetricKind::HeapUsed;
    let source = Arc::new(ScriptedSource::default());
    source.push("a", &[Some(1.0), Some(2.0)]);

    let registry = Arc::new(MutableRegistry::new(vec![instance("a", "orders", "http://a")]));
    let h = harness(
        registry.clone(),
        BTreeMap::from([(kind, settings(3, 0.0))]),
        HashMap::new(),
        source.clone(),
    );
    let monitor = KindMonitor::new(kind, h.ctx.clone());
    monitor.run_tick(0).await;

    registry.set_down(true);

    // within fleet_stale_max the cached fleet is used
    let report = monitor.run_tick(30 * SECOND_MS).await;
    assert!(!report.fleet_unavailable);
    assert_eq!(h.ctx.history.len(kind, "a"), 2);

    tokio::time::advance(Duration::from_secs(61)).await;
    let report = monitor.run_tick(60 * SECOND_MS).await;

    assert!(report.fleet_unavailable);
    assert_eq!(report.checked, 0);
    assert_eq!(h.ctx.history.len(kind, "a"), 2);
    assert_eq!(source.calls().len(), 2);
    assert_eq!(h.counters.snapshot().fleet_unavailable, 1);
}

#[tokio::test]
async fn test_service_override_changes_detection() {
    let kind = MetricKind::HeapUsed;
    let source = Arc::new(ScriptedSource::default());
    source.push("a", &[Some(1.0), Some(2.0)]);
    source.push("b", &[Some(1.0), Some(2.0)]);

    let services = HashMap::from([(
        "tolerant".to_string(),
        instance_monitor::ServiceInfo {
            name: "tolerant".to_string(),
            metric_overrides: HashMap::from([(
                kind,
                instance_monitor::config::MetricOverride {
                    diff_threshold: Some(10.0),
                    ..Default::default()
                },
            )]),
            ..Default::default()
        },
    )]);

    let h = harness(
        Arc::new(MutableRegistry::new(vec![
            instance("a", "strict", "http://a"),
            instance("b", "tolerant", "http://b"),
        ])),
        BTreeMap::from([(kind, settings(2, 0.0))]),
        services,
        source,
    );
    let monitor = KindMonitor::new(kind, h.ctx.clone());

    monitor.run_tick(0).await;
    let report = monitor.run_tick(30 * SECOND_MS).await;

    assert_eq!(report.alerts_dispatched, 1);
    h.ctx.dispatcher.flush().await;
    assert!(h.notifier.messages()[0].content.contains("strict"));
}
