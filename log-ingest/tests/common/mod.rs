#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response};
use axum::Router;
use chrono::{TimeZone, Utc};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tower::ServiceExt;

use log_ingest::app::{create_router, AppState};
use log_ingest::fetch::{Fetcher, TimeRange};
use log_ingest::notify::{BusError, ErrorNotifier, MessageBus, NotifyMode};
use log_ingest::pipeline::IngestionPipeline;
use log_ingest::row::WarehouseRow;
use log_ingest::source::{EntryPage, ListEntriesRequest, LogSource, SourceError};
use log_ingest::warehouse::{BatchInserter, Warehouse, WarehouseError};

pub const PROJECT_ID: &str = "demo-project";
pub const DATASET: &str = "logs";
pub const TABLE: &str = "cloud_run";
pub const TOPIC: &str = "log_ingest_errors";

/// Every backend call the fakes receive, in order, across all three fakes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    ListEntries {
        service: String,
        page_token: Option<String>,
    },
    ResolveTopic(String),
    Publish {
        topic: String,
        service_name: String,
    },
    Insert {
        dataset: String,
        table: String,
        rows: usize,
    },
}

pub type Journal = Arc<Mutex<Vec<Call>>>;

fn service_from_filter(filter: &str) -> String {
    const MARKER: &str = r#"resource.labels.service_name=""#;
    filter
        .split_once(MARKER)
        .and_then(|(_, rest)| rest.split_once('"'))
        .map(|(service, _)| service.to_string())
        .unwrap_or_default()
}

/// Serves pre-baked pages per service. Page tokens are page indexes.
pub struct FakeLogSource {
    journal: Journal,
    pages: HashMap<String, Vec<Vec<Value>>>,
    failing_service: Option<String>,
}

impl FakeLogSource {
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            pages: HashMap::new(),
            failing_service: None,
        }
    }
}

#[async_trait]
impl LogSource for FakeLogSource {
    async fn list_entries(&self, request: &ListEntriesRequest) -> Result<EntryPage, SourceError> {
        let service = service_from_filter(&request.filter);
        self.journal.lock().push(Call::ListEntries {
            service: service.clone(),
            page_token: request.page_token.clone(),
        });

        if self.failing_service.as_deref() == Some(service.as_str()) {
            return Err(SourceError::Status {
                status: 503,
                body: "backend unavailable".to_string(),
            });
        }

        let index: usize = request
            .page_token
            .as_deref()
            .and_then(|t| t.parse().ok())
            .unwrap_or(0);
        let pages = self.pages.get(&service).cloned().unwrap_or_default();

        Ok(EntryPage {
            entries: pages.get(index).cloned().unwrap_or_default(),
            next_page_token: (index + 1 < pages.len()).then(|| (index + 1).to_string()),
        })
    }
}

pub struct FakeWarehouse {
    journal: Journal,
    reject: bool,
    healthy: bool,
    fail_reads: bool,
    inserted: Mutex<Vec<WarehouseRow>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeWarehouse {
    pub fn inserted(&self) -> Vec<WarehouseRow> {
        self.inserted.lock().clone()
    }

    /// The most inserts that were ever running at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Warehouse for FakeWarehouse {
    async fn insert_rows(
        &self,
        dataset: &str,
        table: &str,
        rows: &[WarehouseRow],
    ) -> Result<(), WarehouseError> {
        self.journal.lock().push(Call::Insert {
            dataset: dataset.to_string(),
            table: table.to_string(),
            rows: rows.len(),
        });

        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);
        for _ in 0..3 {
            tokio::task::yield_now().await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.reject {
            return Err(WarehouseError::Rejected(
                "Code: 60. DB::Exception: Table logs.cloud_run does not exist".to_string(),
            ));
        }

        self.inserted.lock().extend_from_slice(rows);
        Ok(())
    }

    async fn recent_rows(
        &self,
        _dataset: &str,
        _table: &str,
        limit: usize,
    ) -> Result<Vec<WarehouseRow>, WarehouseError> {
        if self.fail_reads {
            return Err(WarehouseError::Rejected(
                "Code: 241. DB::Exception: Memory limit exceeded".to_string(),
            ));
        }

        let mut rows = self.inserted();
        rows.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        rows.truncate(limit);
        Ok(rows)
    }

    async fn health_check(&self) -> Result<(), WarehouseError> {
        if self.healthy {
            Ok(())
        } else {
            Err(WarehouseError::Rejected("connection refused".to_string()))
        }
    }
}

pub struct FakeBus {
    journal: Journal,
    missing_topic: bool,
    fail_at: Option<usize>,
    published: Mutex<Vec<(Value, BTreeMap<String, String>)>>,
}

impl FakeBus {
    pub fn published(&self) -> Vec<(Value, BTreeMap<String, String>)> {
        self.published.lock().clone()
    }
}

#[async_trait]
impl MessageBus for FakeBus {
    async fn resolve_topic(&self, topic: &str) -> Result<(), BusError> {
        self.journal
            .lock()
            .push(Call::ResolveTopic(topic.to_string()));

        if self.missing_topic {
            return Err(BusError::UnknownTopic {
                topic: topic.to_string(),
                reason: "UnknownTopicOrPartition".to_string(),
            });
        }
        Ok(())
    }

    async fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        attributes: &BTreeMap<String, String>,
    ) -> Result<String, BusError> {
        self.journal.lock().push(Call::Publish {
            topic: topic.to_string(),
            service_name: attributes.get("service_name").cloned().unwrap_or_default(),
        });

        let mut published = self.published.lock();
        if self.fail_at == Some(published.len()) {
            return Err(BusError::UnknownTopic {
                topic: topic.to_string(),
                reason: "broker transport failure".to_string(),
            });
        }

        let payload: Value = serde_json::from_slice(&payload).unwrap();
        published.push((payload, attributes.clone()));
        Ok(format!("0:{}", published.len() - 1))
    }
}

pub fn default_range() -> TimeRange {
    TimeRange::new(
        Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap(),
        Utc.with_ymd_and_hms(2023, 12, 31, 23, 59, 59).unwrap(),
    )
    .unwrap()
}

pub struct TestHarness {
    pub journal: Journal,
    pub warehouse: Arc<FakeWarehouse>,
    pub bus: Arc<FakeBus>,
    pub state: AppState,
    app: Router,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::default()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.journal.lock().clone()
    }

    pub fn insert_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Insert { .. }))
            .count()
    }

    pub fn publish_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Publish { .. }))
            .count()
    }

    pub fn pipeline(&self) -> &IngestionPipeline {
        &self.state.pipeline
    }

    pub fn services(&self) -> &[String] {
        &self.state.services
    }

    pub async fn get(&self, uri: &str) -> Response<Body> {
        self.app
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    pub async fn request(&self, request: Request<Body>) -> Response<Body> {
        self.app.clone().oneshot(request).await.unwrap()
    }

    pub async fn post(&self, uri: &str) -> Response<Body> {
        self.app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap()
    }

    pub async fn body_json(response: Response<Body>) -> Value {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    pub async fn body_text(response: Response<Body>) -> String {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(body.to_vec()).unwrap()
    }
}

pub struct TestHarnessBuilder {
    services: Vec<String>,
    pages: HashMap<String, Vec<Vec<Value>>>,
    failing_service: Option<String>,
    reject_insert: bool,
    unhealthy_warehouse: bool,
    failing_reads: bool,
    missing_topic: bool,
    fail_publish_at: Option<usize>,
    notify_mode: NotifyMode,
    table: String,
}

impl Default for TestHarnessBuilder {
    fn default() -> Self {
        Self {
            services: vec!["checkout".to_string()],
            pages: HashMap::new(),
            failing_service: None,
            reject_insert: false,
            unhealthy_warehouse: false,
            failing_reads: false,
            missing_topic: false,
            fail_publish_at: None,
            notify_mode: NotifyMode::All,
            table: TABLE.to_string(),
        }
    }
}

impl TestHarnessBuilder {
    pub fn services(mut self, services: &[&str]) -> Self {
        self.services = services.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Adds one page of results for a service; pages are served in the order added.
    pub fn page(mut self, service: &str, entries: Vec<Value>) -> Self {
        self.pages
            .entry(service.to_string())
            .or_default()
            .push(entries);
        self
    }

    pub fn failing_service(mut self, service: &str) -> Self {
        self.failing_service = Some(service.to_string());
        self
    }

    pub fn reject_insert(mut self) -> Self {
        self.reject_insert = true;
        self
    }

    pub fn unhealthy_warehouse(mut self) -> Self {
        self.unhealthy_warehouse = true;
        self
    }

    pub fn failing_reads(mut self) -> Self {
        self.failing_reads = true;
        self
    }

    pub fn missing_topic(mut self) -> Self {
        self.missing_topic = true;
        self
    }

    pub fn fail_publish_at(mut self, index: usize) -> Self {
        self.fail_publish_at = Some(index);
        self
    }

    pub fn notify_mode(mut self, mode: NotifyMode) -> Self {
        self.notify_mode = mode;
        self
    }

    pub fn table(mut self, table: &str) -> Self {
        self.table = table.to_string();
        self
    }

    pub fn build(self) -> TestHarness {
        let journal: Journal = Arc::new(Mutex::new(Vec::new()));

        let source = Arc::new(FakeLogSource {
            journal: journal.clone(),
            pages: self.pages,
            failing_service: self.failing_service,
        });
        let warehouse = Arc::new(FakeWarehouse {
            journal: journal.clone(),
            reject: self.reject_insert,
            healthy: !self.unhealthy_warehouse,
            fail_reads: self.failing_reads,
            inserted: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        });
        let bus = Arc::new(FakeBus {
            journal: journal.clone(),
            missing_topic: self.missing_topic,
            fail_at: self.fail_publish_at,
            published: Mutex::new(Vec::new()),
        });

        let pipeline = IngestionPipeline::new(
            Fetcher::new(source, PROJECT_ID, Some(100)),
            ErrorNotifier::new(bus.clone(), TOPIC),
            BatchInserter::new(warehouse.clone(), DATASET, &self.table),
            self.notify_mode,
        );

        let state = AppState::new(pipeline, self.services, default_range());
        let app = create_router(state.clone());

        TestHarness {
            journal,
            warehouse,
            bus,
            state,
            app,
        }
    }
}

/// A Cloud Run request log entry as the REST API returns it.
pub fn text_entry(service: &str, timestamp: &str, text: &str) -> Value {
    json!({
        "timestamp": timestamp,
        "severity": "INFO",
        "logName": format!("projects/{PROJECT_ID}/logs/run.googleapis.com%2Fstdout"),
        "textPayload": text,
        "insertId": format!("{service}-{timestamp}"),
        "resource": {
            "type": "cloud_run_revision",
            "labels": {
                "service_name": service,
                "revision_name": format!("{service}-00001-abc"),
                "location": "us-central1"
            }
        }
    })
}

pub fn json_entry(service: &str, timestamp: &str, payload: Value) -> Value {
    json!({
        "timestamp": timestamp,
        "severity": "ERROR",
        "logName": format!("projects/{PROJECT_ID}/logs/run.googleapis.com%2Fstderr"),
        "jsonPayload": payload,
        "insertId": format!("{service}-{timestamp}"),
        "resource": {
            "type": "cloud_run_revision",
            "labels": {"service_name": service}
        },
        "httpRequest": {
            "requestMethod": "POST",
            "requestUrl": "https://example.run.app/checkout",
            "status": 500,
            "latency": "0.250s"
        },
        "trace": format!("projects/{PROJECT_ID}/traces/0af7651916cd43dd8448eb211c80319c"),
        "spanId": "b7ad6b7169203331",
        "labels": {"instanceId": "00bf4bf02d"}
    })
}
