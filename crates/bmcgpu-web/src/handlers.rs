//! HTTP request handlers: landing page, health, metrics and reset.

use axum::extract::{Query, State};
use axum::http::{StatusCode, header};
use axum::response::{Html, IntoResponse, Response};
use serde::Deserialize;
use tracing::{debug, error};

use bmcgpu_core::redfish::Connector;

use crate::scrape_log::ScrapeRecord;
use crate::state::AppState;

/// Content type of the Prometheus text exposition format.
const METRICS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

#[derive(Deserialize)]
pub(crate) struct TargetQuery {
    target: Option<String>,
}

impl TargetQuery {
    fn target(&self) -> Option<&str> {
        self.target.as_deref().filter(|t| !t.is_empty())
    }
}

fn missing_target() -> Response {
    error!("request without 'target' parameter");
    (
        StatusCode::BAD_REQUEST,
        "Query parameter 'target' is mandatory",
    )
        .into_response()
}

pub(crate) async fn handle_root() -> Html<String> {
    Html(format!(
        r#"<html lang="en">
<head><title>GPU Exporter</title></head>
<body style="font-family: sans-serif">
<h2>GPU Exporter</h2>
<div>Build information: version={} revision={}</div>
<ul><li><a href="/metrics">Metrics</a> (needs <code>target</code> parameter)</li></ul>
</body>
</html>
"#,
        bmcgpu_core::VERSION,
        bmcgpu_core::REVISION
    ))
}

pub(crate) async fn handle_health() -> &'static str {
    "ok"
}

pub(crate) async fn handle_metrics<C: Connector>(
    State(registry): AppState<C>,
    Query(query): Query<TargetQuery>,
) -> Response {
    let Some(target) = query.target() else {
        return missing_target();
    };

    debug!(target, "collecting metrics");
    let coordinator = registry.resolve(target);
    let (record, mut response) = match coordinator.gather().await {
        Ok(text) => (
            ScrapeRecord::exposed(target, &text),
            ([(header::CONTENT_TYPE, METRICS_CONTENT_TYPE)], text).into_response(),
        ),
        Err(e) => {
            let msg = format!("Error collecting metrics for host {}: {}", target, e);
            error!(target, error = %e, "gather failed");
            (
                ScrapeRecord::failed(target, &e),
                (StatusCode::INTERNAL_SERVER_ERROR, msg).into_response(),
            )
        }
    };
    response.extensions_mut().insert(record);
    response
}

pub(crate) async fn handle_reset<C: Connector>(
    State(registry): AppState<C>,
    Query(query): Query<TargetQuery>,
) -> Response {
    let Some(target) = query.target() else {
        return missing_target();
    };
    let removed = registry.reset(target);
    debug!(target, removed, "reset requested");
    let mut response = (StatusCode::OK, "ok").into_response();
    response
        .extensions_mut()
        .insert(ScrapeRecord::reset(target, removed));
    response
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use base64::Engine;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use bmcgpu_core::config::{DEFAULT_HOST, HostConfig};
    use bmcgpu_core::redfish::MockBmc;
    use bmcgpu_core::redfish::mock::MOCK_PROCESSORS_PATH;
    use bmcgpu_core::{Config, TargetRegistry};

    use axum::extract::{Query, State};

    use super::{TargetQuery, handle_metrics};
    use crate::router;
    use crate::scrape_log::ScrapeRecord;
    use crate::state::SharedRegistry;

    fn registry(bmc: &MockBmc) -> SharedRegistry<MockBmc> {
        let mut config = Config::default();
        config
            .hosts
            .insert(DEFAULT_HOST.to_string(), HostConfig::default());
        Arc::new(TargetRegistry::new(bmc.clone(), Arc::new(config)))
    }

    async fn call(app: axum::Router, method: &str, uri: &str) -> (StatusCode, String, Option<String>) {
        let response = app
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
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .map(|v| v.to_str().unwrap().to_string());
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8(body.to_vec()).unwrap(), content_type)
    }

    #[tokio::test]
    async fn test_health() {
        let app = router(registry(&MockBmc::new()), None);
        let (status, body, _) = call(app, "GET", "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "ok");
    }

    #[tokio::test]
    async fn test_landing_page() {
        let app = router(registry(&MockBmc::new()), None);
        let (status, body, _) = call(app, "GET", "/").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains(bmcgpu_core::VERSION));
        assert!(body.contains("/metrics"));
    }

    #[tokio::test]
    async fn test_metrics_requires_target() {
        let app = router(registry(&MockBmc::new()), None);
        let (status, _, _) = call(app.clone(), "GET", "/metrics").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _, _) = call(app, "GET", "/metrics?target=").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_metrics_ok() {
        let app = router(registry(&MockBmc::dell_gpu_server()), None);
        let (status, body, content_type) =
            call(app, "GET", "/metrics?target=10.0.0.1:443").await;

        assert_eq!(status, StatusCode::OK);
        assert!(content_type.unwrap().starts_with("text/plain; version=0.0.4"));
        assert!(body.contains("idrac_gpu_info{"));
        assert!(body.contains("idrac_gpu_exporter_scrape_errors_total"));
    }

    #[tokio::test]
    async fn test_metrics_init_failure_is_500() {
        let bmc = MockBmc::dell_gpu_server().refusing_sessions();
        let app = router(registry(&bmc), None);
        let (status, body, _) = call(app, "GET", "/metrics?target=bmc-1").await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body.contains("bmc-1"));
    }

    #[tokio::test]
    async fn test_reset_forces_rediscovery() {
        let bmc = MockBmc::dell_gpu_server();
        let registry = registry(&bmc);
        let app = router(Arc::clone(&registry), None);

        call(app.clone(), "GET", "/metrics?target=bmc-1").await;
        assert_eq!(registry.len(), 1);

        let (status, _, _) = call(app.clone(), "POST", "/reset?target=bmc-1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(registry.len(), 0);

        let (status, _, _) = call(app.clone(), "GET", "/reset").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        call(app, "GET", "/metrics?target=bmc-1").await;
        assert_eq!(bmc.session_opens(), 2);
        assert_eq!(bmc.get_count(MOCK_PROCESSORS_PATH), 2);
    }

    #[tokio::test]
    async fn test_basic_auth() {
        let creds = Arc::new(("prom".to_string(), "s3cret".to_string()));
        let app = router(registry(&MockBmc::dell_gpu_server()), Some(creds));

        let (status, _, _) = call(app.clone(), "GET", "/metrics?target=bmc-1").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _, _) = call(app.clone(), "GET", "/health").await;
        assert_eq!(status, StatusCode::OK);

        let token = base64::engine::general_purpose::STANDARD.encode("prom:s3cret");
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/metrics?target=bmc-1")
                    .header(header::AUTHORIZATION, format!("Basic {}", token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_metrics_response_carries_scrape_record() {
        let query = || TargetQuery {
            target: Some("bmc-1".to_string()),
        };

        let ok = handle_metrics(State(registry(&MockBmc::dell_gpu_server())), Query(query())).await;
        let record = ok.extensions().get::<ScrapeRecord>().unwrap().clone();
        assert_eq!(record.target, "bmc-1");
        assert_eq!(record.outcome, "ok");
        let body = ok.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(record.bytes, body.len());

        let bmc = MockBmc::dell_gpu_server().refusing_sessions();
        let failed = handle_metrics(State(registry(&bmc)), Query(query())).await;
        let record = failed.extensions().get::<ScrapeRecord>().unwrap();
        assert_eq!(record.outcome, "init_failed");
        assert_eq!(record.bytes, 0);
    }
}
