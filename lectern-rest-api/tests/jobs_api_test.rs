use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use lectern_config::StorageConfig;
use lectern_core::{
    JobId, JobRegistry, JobStatus, JobUpdate, OutputFormat, ProgressChannels, ProgressEvent,
};
use lectern_execution::{ShutdownPolicy, SupervisorConfig, WorkerSupervisor};
use lectern_ipc::WorkerSettings;
use lectern_rest_api::{create_rest_app, AppConfig, JobsContext, StreamSettings};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

struct TestApp {
    app: Router,
    ctx: JobsContext,
    uploads: TempDir,
}

impl TestApp {
    /// Workers are `/bin/sh -c <script>`
    fn new(script: &str) -> Self {
        let uploads = tempfile::tempdir().unwrap();
        let supervisor = WorkerSupervisor::new(
            SupervisorConfig {
                program: PathBuf::from("/bin/sh"),
                args: vec!["-c".into(), script.into(), "lectern-worker".into()],
                policy: ShutdownPolicy {
                    grace_period: Duration::from_millis(500),
                    confirm_timeout: Duration::from_secs(2),
                },
                fail_on_worker_exit: false,
                settings: WorkerSettings::default(),
            },
            Arc::new(JobRegistry::new()),
            Arc::new(ProgressChannels::new()),
        );
        let storage = StorageConfig {
            upload_dir: uploads.path().to_path_buf(),
            ..StorageConfig::default()
        };
        let stream = StreamSettings {
            poll_interval: Duration::from_millis(20),
            keepalive_interval: Duration::from_secs(15),
        };
        let ctx = JobsContext::new(Arc::new(supervisor), storage, stream);
        let app = create_rest_app(ctx.clone(), AppConfig::default());
        Self { app, ctx, uploads }
    }

    fn upload(&self, file_id: &str, ext: &str) {
        std::fs::write(
            self.uploads.path().join(format!("{}{}", file_id, ext)),
            "page one\n---\npage two",
        )
        .unwrap();
    }

    fn job(&self, status: JobStatus) -> JobId {
        let job_id = JobId::new();
        let registry = self.ctx.registry();
        registry.create(job_id, "file", OutputFormat::Html).unwrap();
        if status != JobStatus::Pending {
            registry.update(&job_id, JobUpdate::status(status));
        }
        job_id
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, bytes.to_vec())
    }

    async fn get(&self, uri: &str) -> (StatusCode, Vec<u8>) {
        self.send(Request::get(uri).body(Body::empty()).unwrap()).await
    }

    async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        let (status, bytes) = self
            .send(
                Request::post(uri)
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await;
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }
}

fn json_body(bytes: &[u8]) -> Value {
    serde_json::from_slice(bytes).unwrap()
}

/// Parse an SSE body into `(event, data)` pairs
fn sse_events(bytes: &[u8]) -> Vec<(String, Value)> {
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    text.split("\n\n")
        .filter(|chunk| !chunk.trim().is_empty())
        .map(|chunk| {
            let mut name = String::new();
            let mut data = String::new();
            for line in chunk.lines() {
                if let Some(v) = line.strip_prefix("event:") {
                    name = v.trim().to_string();
                } else if let Some(v) = line.strip_prefix("data:") {
                    data.push_str(v.trim());
                }
            }
            (name, serde_json::from_str(&data).unwrap_or(Value::Null))
        })
        .collect()
}

#[tokio::test]
async fn test_health() {
    let t = TestApp::new("exit 0");
    t.job(JobStatus::Pending);
    let (status, body) = t.get("/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        json_body(&body),
        json!({"status": "ok", "active_workers": 0, "jobs": 1})
    );
}

#[tokio::test]
async fn test_submit_rejects_bad_input_without_creating_records() {
    let t = TestApp::new("exit 0");
    t.upload("doc1", ".txt");

    let (status, body) = t.post("/api/v1/jobs", json!({"file_id": "../doc1"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

    let (status, _) = t
        .post("/api/v1/jobs", json!({"file_id": "doc1", "output_format": "pdf"}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = t
        .post(
            "/api/v1/jobs",
            json!({"file_id": "doc1", "progress_webhook_url": "ftp://example.com/hook"}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = t.post("/api/v1/jobs", json!({"file_id": "nope"})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["message"], "File not found. Upload first.");

    let (status, body) = t.post("/api/v1/jobs", json!({"output_format": "html"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");

    assert!(t.ctx.registry().is_empty());
}

#[tokio::test]
async fn test_spawn_failure_records_failed_and_returns_503() {
    let mut t = TestApp::new("exit 0");
    let supervisor = WorkerSupervisor::new(
        SupervisorConfig {
            program: PathBuf::from("/nonexistent/lectern"),
            ..t.ctx.supervisor.config().clone()
        },
        t.ctx.registry().clone(),
        t.ctx.channels().clone(),
    );
    t.ctx.supervisor = Arc::new(supervisor);
    t.app = create_rest_app(t.ctx.clone(), AppConfig::default());
    t.upload("doc2", ".md");

    let (status, _) = t.post("/api/v1/jobs", json!({"file_id": "doc2"})).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(t.ctx.registry().len(), 1);
    let counts = t.ctx.registry().status_counts();
    assert_eq!(counts.get(&JobStatus::Failed), Some(&1));
}

#[tokio::test]
async fn test_get_job() {
    let t = TestApp::new("exit 0");
    let job_id = t.job(JobStatus::Processing);
    t.ctx
        .registry()
        .update(&job_id, JobUpdate::completed(json!({"html": "<p>hi</p>"})));

    let (status, body) = t.get(&format!("/api/v1/jobs/{}", job_id)).await;
    assert_eq!(status, StatusCode::OK);
    let body = json_body(&body);
    assert_eq!(body["status"], "completed");
    assert_eq!(body["result"]["html"], "<p>hi</p>");
    assert!(body.get("error").is_none());

    let (status, _) = t.get(&format!("/api/v1/jobs/{}", JobId::new())).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = t.get("/api/v1/jobs/not-a-uuid").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_cancel_finished_job_has_no_side_effects() {
    let t = TestApp::new("exit 0");
    let job_id = t.job(JobStatus::Failed);

    let (status, body) = t
        .post(&format!("/api/v1/jobs/{}/cancel", job_id), json!({}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({"job_id": job_id.to_string(), "status": "failed", "already_finished": true})
    );
    assert_eq!(t.ctx.registry().get(&job_id).unwrap().epoch, 0);
}

#[tokio::test]
async fn test_cancel_without_worker_conflicts() {
    let t = TestApp::new("exit 0");
    let job_id = t.job(JobStatus::Processing);

    let (status, body) = t
        .post(&format!("/api/v1/jobs/{}/cancel", job_id), json!({}))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["status"], 409);
}

#[tokio::test]
async fn test_stream_of_finished_job_emits_one_terminal_event() {
    let t = TestApp::new("exit 0");
    let job_id = t.job(JobStatus::Processing);
    t.ctx.registry().update(&job_id, JobUpdate::cancelled());

    let (status, body) = t.get(&format!("/api/v1/jobs/{}/stream", job_id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(sse_events(&body), vec![("cancelled".to_string(), json!({}))]);
}

#[tokio::test]
async fn test_stream_delivers_progress_then_completion() {
    let t = TestApp::new("exit 0");
    let job_id = t.job(JobStatus::Processing);
    let channel = t.ctx.channels().get_or_create(&job_id);
    let started_at = chrono::Utc::now();
    for current in 0..=3 {
        channel.push(ProgressEvent::new("Converting pages", current, 3, started_at));
    }
    t.ctx
        .registry()
        .update(&job_id, JobUpdate::completed(json!({"pages": 3})));

    let (_, body) = t.get(&format!("/api/v1/jobs/{}/stream", job_id)).await;
    let events = sse_events(&body);

    let names: Vec<&str> = events.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(
        names,
        vec!["progress", "progress", "progress", "progress", "completed"]
    );
    let currents: Vec<u64> = events[..4]
        .iter()
        .map(|(_, d)| d["current"].as_u64().unwrap())
        .collect();
    assert_eq!(currents, vec![0, 1, 2, 3]);
    assert!(events[0].1["elapsed"].is_number());
    assert_eq!(events[4].1, json!({"result": {"pages": 3}}));

    // The stream released the channel on its way out
    assert!(t.ctx.channels().get(&job_id).is_none());
}

#[tokio::test]
async fn test_stream_sends_html_ready_once() {
    let t = TestApp::new("exit 0");
    let job_id = t.job(JobStatus::Processing);
    t.ctx
        .registry()
        .update(&job_id, JobUpdate::html_ready("<p>draft</p>"));

    let registry = t.ctx.registry().clone();
    let finisher = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        registry.update(&job_id, JobUpdate::failed("Conversion failed: boom"));
    });

    let (_, body) = t.get(&format!("/api/v1/jobs/{}/stream", job_id)).await;
    finisher.await.unwrap();

    assert_eq!(
        sse_events(&body),
        vec![
            ("html_ready".to_string(), json!({"content": "<p>draft</p>"})),
            ("failed".to_string(), json!({"error": "Conversion failed: boom"})),
        ]
    );
}

#[tokio::test]
async fn test_stream_pings_while_job_is_quiet() {
    let mut t = TestApp::new("exit 0");
    t.ctx.stream = StreamSettings {
        poll_interval: Duration::from_millis(20),
        keepalive_interval: Duration::from_millis(50),
    };
    t.app = create_rest_app(t.ctx.clone(), AppConfig::default());
    let job_id = t.job(JobStatus::Processing);

    let registry = t.ctx.registry().clone();
    let finisher = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(400)).await;
        registry.update(&job_id, JobUpdate::completed(json!({"pages": 0})));
    });

    let (_, body) = tokio::time::timeout(
        Duration::from_secs(10),
        t.get(&format!("/api/v1/jobs/{}/stream", job_id)),
    )
    .await
    .expect("stream did not finish");
    finisher.await.unwrap();

    let events = sse_events(&body);
    let (last, pings) = events.split_last().unwrap();
    assert_eq!(last.0, "completed");
    assert!(pings.len() >= 2, "expected keepalives, got {:?}", events);
    assert!(pings
        .iter()
        .all(|(name, data)| name == "ping" && *data == json!({})));
}

#[tokio::test]
async fn test_stream_reports_vanished_job_once_and_ends() {
    let t = TestApp::new("exit 0");
    let job_id = t.job(JobStatus::Processing);

    let registry = t.ctx.registry().clone();
    let remover = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        registry.remove(&job_id);
    });

    let (status, body) = tokio::time::timeout(
        Duration::from_secs(10),
        t.get(&format!("/api/v1/jobs/{}/stream", job_id)),
    )
    .await
    .expect("stream did not end after the job vanished");
    remover.await.unwrap();

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        sse_events(&body),
        vec![("error".to_string(), json!({"message": "Job not found"}))]
    );
}

#[tokio::test]
async fn test_stream_unknown_job_is_404() {
    let t = TestApp::new("exit 0");
    let (status, _) = t.get(&format!("/api/v1/jobs/{}/stream", JobId::new())).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[cfg(unix)]
#[tokio::test]
async fn test_submit_then_cancel_running_worker() {
    let t = TestApp::new("read _l; exec sleep 30");
    t.upload("doc3", ".txt");

    let (status, body) = t
        .post(
            "/api/v1/jobs",
            json!({
                "file_id": "doc3",
                "output_format": "markdown",
                "options": {"page_delay_ms": 10},
            }),
        )
        .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let job_id: JobId = body["job_id"].as_str().unwrap().parse().unwrap();
    assert!(t.ctx.supervisor.is_active(&job_id));

    let (status, body) = t
        .post(&format!("/api/v1/jobs/{}/cancel", job_id), json!({}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "cancelled");
    assert!(body.get("already_finished").is_none());

    let (_, body) = t.get(&format!("/api/v1/jobs/{}", job_id)).await;
    assert_eq!(json_body(&body)["status"], "cancelled");

    // A second cancel reports the job as finished
    let (_, body) = t
        .post(&format!("/api/v1/jobs/{}/cancel", job_id), json!({}))
        .await;
    assert_eq!(body["already_finished"], true);
}
