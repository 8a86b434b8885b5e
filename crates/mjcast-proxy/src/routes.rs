use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    Json, Router,
    body::Body,
    extract::State,
    http::{Method, header},
    response::{Html, IntoResponse},
    routing::get,
};
use mjcast_hub::{Hub, HubStats, PART_TRAILER, STREAM_CONTENT_TYPE, part_header};
use mjcast_transport::{ReceiverStats, ReceiverStatsSnapshot};
use serde::Serialize;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

/// Shared application state for all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub hub: Hub,
    pub client_queue: usize,
    pub receiver_stats: Arc<ReceiverStats>,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub hub: HubStats,
    pub receiver: ReceiverStatsSnapshot,
}

const VIEWER_PAGE: &str = r#"<!doctype html>
<html>
<head>
	<meta name="viewport" content="width=device-width,initial-scale=1" />
	<style>
		html,body{height:100%;margin:0;background:#000}
		.frame{display:flex;align-items:center;justify-content:center;height:100%;}
		.frame img{max-width:100%;max-height:100%;width:auto;height:auto;object-fit:contain}
	</style>
</head>
<body>
	<div class="frame"><img src="/stream" alt="MJPEG stream"/></div>
</body>
</html>
"#;

pub fn router(state: AppState) -> Router {
    // Viewers may embed the stream from any origin.
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::any())
        .allow_methods([Method::GET])
        .allow_credentials(false);

    Router::new()
        .route("/", get(index))
        .route("/stream", get(stream))
        .route("/health", get(health))
        .route("/stats", get(stats))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /: viewer page.
pub async fn index() -> Html<&'static str> {
    Html(VIEWER_PAGE)
}

/// GET /stream: endless MJPEG multipart response.
///
/// The subscription lives inside the body stream: when the client goes away
/// the body is dropped and the subscriber unregisters with it.
pub async fn stream(State(state): State<AppState>) -> impl IntoResponse {
    let mut subscription = state.hub.register(state.client_queue);
    info!("viewer {} connected ({} live)", subscription.id(), state.hub.subscriber_count());

    let parts = async_stream::stream! {
        while let Some(frame) = subscription.recv().await {
            yield Ok::<_, Infallible>(part_header(frame.len()));
            yield Ok(frame);
            yield Ok(PART_TRAILER);
        }
        info!("viewer {} stream ended", subscription.id());
    };

    (
        [
            (header::CONTENT_TYPE, STREAM_CONTENT_TYPE),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(parts),
    )
}

/// GET /health
pub async fn health() -> &'static str {
    "ok"
}

/// GET /stats: hub and receiver counters.
pub async fn stats(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse {
        hub: state.hub.stats(),
        receiver: state.receiver_stats.snapshot(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{Request, StatusCode};
    use bytes::Bytes;
    use http_body_util::BodyExt;
    use std::time::Duration;
    use tower::ServiceExt;

    fn state() -> AppState {
        AppState {
            hub: Hub::new(),
            client_queue: 2,
            receiver_stats: Arc::new(ReceiverStats::new()),
        }
    }

    fn get_req(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_health_and_index() {
        let app = router(state());

        let res = app.clone().oneshot(get_req("/health")).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(&res.into_body().collect().await.unwrap().to_bytes()[..], b"ok");

        let res = app.oneshot(get_req("/")).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert!(
            res.headers()[header::CONTENT_TYPE]
                .to_str()
                .unwrap()
                .starts_with("text/html")
        );
        let page = res.into_body().collect().await.unwrap().to_bytes();
        assert!(String::from_utf8_lossy(&page).contains(r#"<img src="/stream""#));
    }

    #[tokio::test]
    async fn test_stats_json() {
        let state = state();
        state.hub.broadcast(Bytes::from_static(b"x"));
        let res = router(state).oneshot(get_req("/stats")).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);

        let body = res.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["hub"]["frames_broadcast"], 1);
        assert_eq!(json["hub"]["subscribers"], 0);
        assert_eq!(json["receiver"]["frames_completed"], 0);
    }

    #[tokio::test]
    async fn test_stream_writes_multipart_parts() {
        let state = state();
        let hub = state.hub.clone();
        let res = router(state).oneshot(get_req("/stream")).await.unwrap();

        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.headers()[header::CONTENT_TYPE], STREAM_CONTENT_TYPE);
        assert_eq!(res.headers()[header::CACHE_CONTROL], "no-cache");
        assert_eq!(hub.subscriber_count(), 1);

        let jpeg = Bytes::from_static(&[0xFF, 0xD8, 0x01, 0x02, 0xFF, 0xD9]);
        assert_eq!(hub.broadcast(jpeg.clone()).delivered, 1);
        hub.close();

        // Closing the hub ends the body after the queued part.
        let body = tokio::time::timeout(Duration::from_secs(2), res.into_body().collect())
            .await
            .expect("stream did not end")
            .unwrap()
            .to_bytes();
        let mut expected = b"--frame\r\nContent-Type: image/jpeg\r\nContent-Length: 6\r\n\r\n".to_vec();
        expected.extend_from_slice(&jpeg);
        expected.extend_from_slice(b"\r\n");
        assert_eq!(&body[..], &expected[..]);
    }

    #[tokio::test]
    async fn test_dropped_stream_unregisters() {
        let state = state();
        let hub = state.hub.clone();
        let res = router(state).oneshot(get_req("/stream")).await.unwrap();
        assert_eq!(hub.subscriber_count(), 1);

        drop(res);
        assert_eq!(hub.subscriber_count(), 0);
    }
}
