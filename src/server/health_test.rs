//! Tests for the probes and the shutdown endpoint

use super::*;
use crate::power::{MockPowerOff, PowerOff, ShutdownCommandResult};
use crate::telemetry::{TelemetryError, Teardown};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;
use tracing_test::traced_test;

struct NoopTelemetry;

#[async_trait]
impl Teardown for NoopTelemetry {
    async fn teardown(self) -> Result<(), TelemetryError> {
        Ok(())
    }
}

struct PanickingPowerOff;

#[async_trait]
impl PowerOff for PanickingPowerOff {
    async fn execute(&self) -> ShutdownCommandResult {
        panic!("executor exploded");
    }
}

struct RunningServer {
    addr: SocketAddr,
    shutdown: CancellationToken,
    handle: JoinHandle<Result<(), SupervisorError>>,
}

impl RunningServer {
    async fn start(power: Arc<dyn PowerOff>) -> Self {
        let listener = bind_listener(SocketAddr::from(([127, 0, 0, 1], 0)))
            .await
            .expect("Failed to bind test listener");
        let supervisor = Supervisor::new(listener, build_router(AppState::new(power)), NoopTelemetry);
        let addr = supervisor.local_addr().unwrap();
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(supervisor.run(shutdown.clone()));
        Self {
            addr,
            shutdown,
            handle,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    async fn stop(self) {
        self.shutdown.cancel();
        let result = self.handle.await.expect("supervisor task panicked");
        assert!(result.is_ok(), "clean shutdown expected: {:?}", result);
    }
}

async fn call(power: Arc<dyn PowerOff>, method: &str, uri: &str) -> (StatusCode, String) {
    let response = build_router(AppState::new(power))
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, String::from_utf8(body.to_vec()).unwrap())
}

/// Test that /livez returns 200 "ok" from a real listener
#[tokio::test]
async fn test_livez_returns_200() {
    let server = RunningServer::start(Arc::new(MockPowerOff::succeeding())).await;

    let response = reqwest::Client::new()
        .get(server.url("/livez"))
        .timeout(Duration::from_secs(5))
        .send()
        .await
        .expect("Failed to connect to server");

    assert_eq!(response.status(), 200, "Liveness probe should return 200");
    assert_eq!(response.text().await.unwrap(), "ok");

    server.stop().await;
}

/// Test that /readyz returns 200 "ok" from a real listener
#[tokio::test]
async fn test_readyz_returns_200() {
    let server = RunningServer::start(Arc::new(MockPowerOff::succeeding())).await;

    let response = reqwest::Client::new()
        .get(server.url("/readyz"))
        .timeout(Duration::from_secs(5))
        .send()
        .await
        .expect("Failed to connect to server");

    assert_eq!(response.status(), 200, "Readiness probe should return 200");
    assert_eq!(response.text().await.unwrap(), "ok");

    server.stop().await;
}

/// Probes keep answering while many are in flight at once
#[tokio::test]
async fn test_health_checks_under_concurrent_load() {
    let server = RunningServer::start(Arc::new(MockPowerOff::succeeding())).await;
    let client = reqwest::Client::new();

    let mut probes = JoinSet::new();
    for i in 0..64 {
        let url = server.url(if i % 2 == 0 { "/livez" } else { "/readyz" });
        let client = client.clone();
        probes.spawn(async move {
            let response = client.get(url).send().await?;
            let status = response.status();
            Ok::<_, reqwest::Error>((status, response.text().await?))
        });
    }

    while let Some(joined) = probes.join_next().await {
        let (status, body) = joined.unwrap().expect("probe request failed");
        assert_eq!(status, 200);
        assert_eq!(body, PROBE_BODY);
    }

    server.stop().await;
}

#[tokio::test]
async fn test_shutdown_success_returns_200() {
    let (status, body) = call(Arc::new(MockPowerOff::succeeding()), "POST", "/shutdown").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "shutdown command executed");
}

#[tokio::test]
async fn test_shutdown_failure_returns_500() {
    let (status, body) = call(Arc::new(MockPowerOff::failing()), "POST", "/shutdown").await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, "failed to shutdown");
}

/// Diagnostics go to the log, never into the response body
#[tokio::test]
#[traced_test]
async fn test_shutdown_failure_is_logged_with_diagnostics() {
    let (_, body) = call(Arc::new(MockPowerOff::failing()), "POST", "/shutdown").await;

    assert!(logs_contain("Failed to shutdown"));
    assert!(logs_contain("non_zero_exit"));
    assert!(logs_contain("Access denied"));
    assert!(!body.contains("Access denied"));
}

/// A failed power-off does not take the agent down
#[tokio::test]
async fn test_failed_shutdown_keeps_serving() {
    let server = RunningServer::start(Arc::new(MockPowerOff::failing())).await;
    let client = reqwest::Client::new();

    let failed = client.post(server.url("/shutdown")).send().await.unwrap();
    assert_eq!(failed.status(), 500);

    let probe = client.get(server.url("/livez")).send().await.unwrap();
    assert_eq!(probe.status(), 200);

    let retry = client.post(server.url("/shutdown")).send().await.unwrap();
    assert_eq!(retry.status(), 500);

    server.stop().await;
}

/// Two concurrent triggers both run; neither waits for the other
#[tokio::test]
async fn test_concurrent_shutdown_requests_are_independent() {
    let delay = Duration::from_millis(300);
    let power = Arc::new(MockPowerOff::succeeding().with_delay(delay));
    let server = RunningServer::start(power.clone()).await;
    let client = reqwest::Client::new();

    let start = Instant::now();
    let (first, second) = tokio::join!(
        client.post(server.url("/shutdown")).send(),
        client.post(server.url("/shutdown")).send(),
    );
    let elapsed = start.elapsed();

    let (first, second) = (first.unwrap(), second.unwrap());
    assert_eq!(first.status(), 200);
    assert_eq!(second.status(), 200);
    assert_eq!(first.text().await.unwrap(), SHUTDOWN_OK_BODY);
    assert_eq!(second.text().await.unwrap(), SHUTDOWN_OK_BODY);
    assert_eq!(power.calls(), 2);
    assert!(
        elapsed < delay * 2,
        "requests were serialized: took {:?}",
        elapsed
    );

    server.stop().await;
}

#[tokio::test]
async fn test_panicking_handler_becomes_500() {
    let (status, _) = call(Arc::new(PanickingPowerOff), "POST", "/shutdown").await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_unknown_routes_and_methods() {
    let power: Arc<dyn PowerOff> = Arc::new(MockPowerOff::succeeding());

    let (status, _) = call(power.clone(), "GET", "/healthz").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = call(power.clone(), "GET", "/shutdown").await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);

    let (status, _) = call(power, "POST", "/livez").await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
}
