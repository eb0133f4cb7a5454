//! HTTP API for the docmill service.
//!
//! REST endpoints for document upload and management plus a health probe.
//! Handlers stay thin; all behavior lives on `DocmillService`.

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, State},
    routing::{get, post},
};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::service::DocmillService;

pub mod documents;
use documents::{
    cancel_document_handler, delete_document_handler, get_document_content_handler,
    get_document_handler, get_document_status_handler, get_work_items_handler,
    list_documents_handler, reprocess_document_handler, upload_document_handler,
};

/// Per-request timeout for everything except uploads. An upload body may
/// legitimately take longer than this to stream in; it is bounded by the
/// body-size limit instead.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Application state
pub struct AppState {
    pub service: Arc<DocmillService>,
    pub start_time: Instant,
}

/// Build the API router
pub fn router(service: Arc<DocmillService>) -> Router {
    let max_body_size = service.config.pipeline.max_document_size_bytes as usize;

    let state = Arc::new(AppState {
        service,
        start_time: Instant::now(),
    });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let timeout = TimeoutLayer::new(REQUEST_TIMEOUT);

    let api_routes = Router::new()
        .route("/health", get(health_handler).layer(timeout.clone()))
        .route(
            "/documents",
            // Method-router layers wrap the methods added so far: the list
            // route gets the request timeout, the upload route stays
            // outside it and gets the body-size limit.
            get(list_documents_handler)
                .layer(timeout.clone())
                .post(upload_document_handler)
                .layer(DefaultBodyLimit::max(max_body_size)),
        )
        .route(
            "/documents/{id}",
            get(get_document_handler)
                .delete(delete_document_handler)
                .layer(timeout.clone()),
        )
        .route(
            "/documents/{id}/content",
            get(get_document_content_handler).layer(timeout.clone()),
        )
        .route(
            "/documents/{id}/status",
            get(get_document_status_handler).layer(timeout.clone()),
        )
        .route(
            "/documents/{id}/work-items",
            get(get_work_items_handler).layer(timeout.clone()),
        )
        .route(
            "/documents/{id}/cancel",
            post(cancel_document_handler).layer(timeout.clone()),
        )
        .route(
            "/documents/{id}/reprocess",
            post(reprocess_document_handler).layer(timeout),
        )
        .with_state(state);

    Router::new().nest("/api", api_routes).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(cors),
    )
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_secs: u64,
    pub queued_jobs: usize,
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: state.start_time.elapsed().as_secs(),
        queued_jobs: state.service.queue.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use bytes::Bytes;
    use tokio::sync::mpsc;
    use tokio_stream::wrappers::ReceiverStream;
    use tower::ServiceExt;

    use crate::service::test_support::canned_service;

    const BOUNDARY: &str = "docmill-test-boundary";

    fn multipart_body(file_name: &str, content: &[u8]) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; \
                 name=\"file\"; filename=\"{file_name}\"\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(content);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn upload_request(body: Body) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/documents")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(body)
            .unwrap()
    }

    #[tokio::test]
    async fn health_endpoint_reports_ok() {
        let app = router(canned_service());

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_upload_is_not_cut_off_by_the_request_timeout() {
        let app = router(canned_service());

        let bytes = multipart_body("slow.txt", b"arrived one chunk at a time");
        let (head, tail) = bytes.split_at(bytes.len() / 2);
        let head = Bytes::copy_from_slice(head);
        let tail = Bytes::copy_from_slice(tail);

        // Stream the body with a pause well past the request timeout
        let (tx, rx) = mpsc::channel::<Result<Bytes, std::io::Error>>(2);
        tokio::spawn(async move {
            let _ = tx.send(Ok(head)).await;
            tokio::time::sleep(REQUEST_TIMEOUT + Duration::from_secs(30)).await;
            let _ = tx.send(Ok(tail)).await;
        });

        let response = app
            .oneshot(upload_request(Body::from_stream(ReceiverStream::new(rx))))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn malformed_multipart_is_a_bad_request() {
        let app = router(canned_service());

        // Declared boundary never appears in the body
        let response = app
            .oneshot(upload_request(Body::from("this is not a multipart payload")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("Malformed multipart"));
    }
}
