//! Helper types for integration tests

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use instance_monitor::actors::context::MonitorContext;
use instance_monitor::config::MetricSettings;
use instance_monitor::dispatcher::AlertDispatcher;
use instance_monitor::error::{FleetError, NotifyError, SampleError};
use instance_monitor::fleet::{FleetView, InstanceRegistry};
use instance_monitor::formatter::{MarkdownFormatter, RenderedMessage};
use instance_monitor::history::HistoryStore;
use instance_monitor::notifier::Notifier;
use instance_monitor::policy::MonitorPolicy;
use instance_monitor::sampler::MetricSource;
use instance_monitor::stats::MonitorCounters;
use instance_monitor::{Instance, MetricKind, ServiceInfo};

pub const SECOND_MS: i64 = 1000;

pub fn instance(id: &str, service: &str, endpoint: &str) -> Instance {
    Instance {
        instance_id: id.to_string(),
        service_name: service.to_string(),
        metrics_endpoint: endpoint.to_string(),
        healthy: true,
    }
}

pub fn settings(k: usize, d: f64) -> MetricSettings {
    MetricSettings {
        tick_interval_seconds: 30,
        keep_increasing_count: k,
        diff_threshold: d,
        absolute_max: None,
        suppression_ms: 600_000,
        ignore_flat: false,
    }
}

pub fn measurements(value: f64) -> serde_json::Value {
    serde_json::json!({
        "name": "jvm.threads.live",
        "measurements": [{"statistic": "VALUE", "value": value}],
        "availableTags": []
    })
}

/// Registry whose contents and availability can be changed mid-test
#[derive(Default)]
pub struct MutableRegistry {
    instances: Mutex<Vec<Instance>>,
    down: AtomicBool,
}

impl MutableRegistry {
    pub fn new(instances: Vec<Instance>) -> Self {
        Self {
            instances: Mutex::new(instances),
            down: AtomicBool::new(false),
        }
    }

    pub fn set(&self, instances: Vec<Instance>) {
        *self.instances.lock().unwrap() = instances;
    }

    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }
}

#[async_trait]
impl InstanceRegistry for MutableRegistry {
    async fn fetch_instances(&self) -> Result<Vec<Instance>, FleetError> {
        if self.down.load(Ordering::SeqCst) {
            return Err(FleetError::Unavailable("registry down".to_string()));
        }
        Ok(self.instances.lock().unwrap().clone())
    }
}

/// Serves queued values per instance id; `None` or an empty queue fails the sample
#[derive(Default)]
pub struct ScriptedSource {
    queues: Mutex<HashMap<String, VecDeque<Option<f64>>>>,
    calls: Mutex<Vec<(String, MetricKind)>>,
}

impl ScriptedSource {
    pub fn push(&self, instance_id: &str, values: &[Option<f64>]) {
        self.queues
            .lock()
            .unwrap()
            .entry(instance_id.to_string())
            .or_default()
            .extend(values.iter().copied());
    }

    pub fn calls(&self) -> Vec<(String, MetricKind)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl MetricSource for ScriptedSource {
    async fn sample(&self, instance: &Instance, kind: MetricKind) -> Result<f64, SampleError> {
        self.calls
            .lock()
            .unwrap()
            .push((instance.instance_id.clone(), kind));

        self.queues
            .lock()
            .unwrap()
            .get_mut(&instance.instance_id)
            .and_then(VecDeque::pop_front)
            .flatten()
            .ok_or_else(|| SampleError::Network("scripted failure".to_string()))
    }
}

/// Keeps every message it is asked to send
#[derive(Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<RenderedMessage>>,
}

impl RecordingNotifier {
    pub fn messages(&self) -> Vec<RenderedMessage> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    fn name(&self) -> &str {
        "recording"
    }

    async fn send(&self, message: &RenderedMessage) -> Result<(), NotifyError> {
        self.messages.lock().unwrap().push(message.clone());
        Ok(())
    }
}

pub struct Harness {
    pub ctx: Arc<MonitorContext>,
    pub notifier: Arc<RecordingNotifier>,
    pub counters: Arc<MonitorCounters>,
}

pub fn harness(
    registry: Arc<dyn InstanceRegistry>,
    metrics: BTreeMap<MetricKind, MetricSettings>,
    services: HashMap<String, ServiceInfo>,
    sampler: Arc<dyn MetricSource>,
) -> Harness {
    let fleet = Arc::new(FleetView::new(registry, services, Duration::from_secs(60)));
    let policy = Arc::new(MonitorPolicy::new(fleet.clone(), metrics, 86_400_000));
    let counters = Arc::new(MonitorCounters::new());
    let notifier = Arc::new(RecordingNotifier::default());

    let dispatcher = Arc::new(AlertDispatcher::new(
        policy.clone(),
        Arc::new(MarkdownFormatter::default()),
        vec![notifier.clone() as Arc<dyn Notifier>],
        counters.clone(),
    ));

    let ctx = Arc::new(MonitorContext {
        fleet,
        sampler,
        history: Arc::new(HistoryStore::new()),
        policy,
        dispatcher,
        counters: counters.clone(),
        parallelism: 4,
        evict_after_missing_ticks: 1,
    });

    Harness {
        ctx,
        notifier,
        counters,
    }
}

/// Collects the formatted log output of the current thread while its guard lives
#[derive(Clone, Default)]
pub struct LogCapture {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl LogCapture {
    pub fn install() -> (Self, tracing::subscriber::DefaultGuard) {
        let capture = Self::default();
        let writer = capture.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::TRACE)
            .finish();
        (capture, tracing::subscriber::set_default(subscriber))
    }

    pub fn lines_containing(&self, needle: &str) -> Vec<String> {
        String::from_utf8_lossy(&self.buf.lock().unwrap())
            .lines()
            .filter(|line| line.contains(needle))
            .map(str::to_string)
            .collect()
    }
}

impl io::Write for LogCapture {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.lock().unwrap().extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
