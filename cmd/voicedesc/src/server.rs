//! HTTP server.
//!
//! API endpoints:
//! - GET  /                          - liveness message
//! - POST /extract-voice-descriptor  - multipart `audio` -> {"descriptor": [...]}
//! - POST /compare-voice-descriptors - JSON {reference, candidate, threshold?}
//! - POST /verify-voice-descriptor   - multipart `audio` + `reference` [+ `threshold`]

use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        rejection::JsonRejection,
        DefaultBodyLimit, Multipart, State,
    },
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, info_span, warn};
use uuid::Uuid;
use voicedesc_descriptor::{compare, AudioUpload, Comparison, DescriptorError, Pipeline, VoiceDescriptor};

use crate::config::{parse_addr, ServerConfig};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    /// Threshold used when a request does not name one.
    pub threshold: f32,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    detail: String,
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    detail: String,
}

impl ApiError {
    fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }

    fn unprocessable(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, detail)
    }

    fn internal() -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal server error")
    }
}

impl From<DescriptorError> for ApiError {
    fn from(e: DescriptorError) -> Self {
        if e.is_client_error() {
            warn!(kind = e.kind(), error = %e, "rejected audio");
            Self::new(StatusCode::BAD_REQUEST, e.public_message())
        } else {
            error!(kind = e.kind(), error = %e, "descriptor extraction failed");
            Self::new(StatusCode::INTERNAL_SERVER_ERROR, e.public_message())
        }
    }
}

impl From<MultipartError> for ApiError {
    fn from(e: MultipartError) -> Self {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            return Self::new(StatusCode::PAYLOAD_TOO_LARGE, "upload too large");
        }
        Self::unprocessable(format!("invalid multipart body: {}", e.body_text()))
    }
}

impl From<MultipartRejection> for ApiError {
    fn from(e: MultipartRejection) -> Self {
        Self::unprocessable(e.body_text())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(e: JsonRejection) -> Self {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            return Self::new(StatusCode::PAYLOAD_TOO_LARGE, "request too large");
        }
        Self::unprocessable(e.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorResponse { detail: self.detail })).into_response()
    }
}

/// Builds the router with CORS, body limit and request tracing.
pub fn router(state: AppState, server: &ServerConfig) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/extract-voice-descriptor", post(extract))
        .route("/compare-voice-descriptors", post(compare_descriptors))
        .route("/verify-voice-descriptor", post(verify))
        .layer(DefaultBodyLimit::max(server.max_upload_bytes))
        .layer(cors_layer(&server.cors_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Allows the configured origins with credentials. Methods and headers are
/// mirrored from the preflight since credentials rule out wildcards.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.iter().any(|o| o == "*") {
        AllowOrigin::mirror_request()
    } else {
        let values: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|o| match HeaderValue::from_str(o) {
                Ok(v) => Some(v),
                Err(_) => {
                    warn!(origin = %o, "ignoring invalid CORS origin");
                    None
                }
            })
            .collect();
        AllowOrigin::list(values)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}

/// Binds `server.listen` and serves until Ctrl-C.
pub async fn serve(state: AppState, server: &ServerConfig) -> Result<()> {
    let addr = parse_addr(&server.listen)?;
    let app = router(state, server);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "voice descriptor API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "listen for shutdown signal");
    }
}

async fn root() -> impl IntoResponse {
    Json(serde_json::json!({ "message": "Voice descriptor API is live" }))
}

/// Fields collected from a multipart form.
#[derive(Default)]
struct Form {
    audio: Option<AudioUpload>,
    reference: Option<String>,
    threshold: Option<String>,
}

async fn read_form(mut multipart: Multipart) -> Result<Form, ApiError> {
    let mut form = Form::default();
    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "audio" => {
                let filename = field.file_name().map(str::to_owned);
                let content_type = field.content_type().map(str::to_owned);
                let mut upload = AudioUpload::new(field.bytes().await?);
                if let Some(name) = filename {
                    upload = upload.with_filename(name);
                }
                if let Some(ct) = content_type {
                    upload = upload.with_content_type(ct);
                }
                form.audio = Some(upload);
            }
            "reference" => form.reference = Some(field.text().await?),
            "threshold" => form.threshold = Some(field.text().await?),
            _ => {}
        }
    }
    Ok(form)
}

/// Runs the pipeline on the blocking pool inside a request span.
async fn run_pipeline(state: &AppState, upload: AudioUpload) -> Result<VoiceDescriptor, ApiError> {
    let pipeline = state.pipeline.clone();
    let span = info_span!("extract", request_id = %Uuid::new_v4());

    tokio::task::spawn_blocking(move || {
        let _enter = span.enter();
        pipeline.extract(&upload).map_err(ApiError::from)
    })
    .await
    .map_err(|e| {
        error!(error = %e, "extraction task failed");
        ApiError::internal()
    })?
}

async fn extract(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<VoiceDescriptor>, ApiError> {
    let form = read_form(multipart?).await?;
    let upload = form
        .audio
        .ok_or_else(|| ApiError::unprocessable("missing required field: audio"))?;
    Ok(Json(run_pipeline(&state, upload).await?))
}

#[derive(Debug, Deserialize)]
struct CompareRequest {
    reference: Vec<f32>,
    candidate: Vec<f32>,
    threshold: Option<f32>,
}

async fn compare_descriptors(
    State(state): State<AppState>,
    req: Result<Json<CompareRequest>, JsonRejection>,
) -> Result<Json<Comparison>, ApiError> {
    let Json(req) = req?;
    let threshold = req.threshold.unwrap_or(state.threshold);
    Ok(Json(compare(&req.reference, &req.candidate, threshold)?))
}

async fn verify(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Comparison>, ApiError> {
    let form = read_form(multipart?).await?;
    let upload = form
        .audio
        .ok_or_else(|| ApiError::unprocessable("missing required field: audio"))?;
    let reference = form
        .reference
        .ok_or_else(|| ApiError::unprocessable("missing required field: reference"))?;
    let reference: Vec<f32> = serde_json::from_str(&reference)
        .map_err(|e| ApiError::unprocessable(format!("reference must be a JSON array of numbers: {e}")))?;
    let threshold = match form.threshold {
        Some(t) => t
            .trim()
            .parse::<f32>()
            .map_err(|e| ApiError::unprocessable(format!("invalid threshold: {e}")))?,
        None => state.threshold,
    };

    let descriptor = run_pipeline(&state, upload).await?;
    Ok(Json(descriptor.compare(&reference, threshold)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request};
    use tower::ServiceExt;
    use voicedesc_audio::encode_wav;
    use voicedesc_descriptor::PipelineConfig;
    use voicedesc_voiceprint::{l2_normalize, VoiceEncoder, VoiceprintError};

    const BOUNDARY: &str = "voicedesc-test-boundary";

    /// Embeds a few signal statistics; fails when asked to embed a clip
    /// whose first sample is exactly 0.25.
    struct StatsEncoder;

    impl VoiceEncoder for StatsEncoder {
        fn dimension(&self) -> usize {
            3
        }

        fn preprocess(&self, samples: &[f32], _rate: u32) -> Result<Vec<f32>, VoiceprintError> {
            if samples.iter().all(|s| s.abs() < 1e-3) {
                return Ok(Vec::new());
            }
            Ok(samples.to_vec())
        }

        fn embed(&self, samples: &[f32]) -> Result<Vec<f32>, VoiceprintError> {
            if (samples[0] - 0.25).abs() < 1e-3 {
                return Err(VoiceprintError::Model("secret internal failure".into()));
            }
            let n = samples.len() as f32;
            let rms = (samples.iter().map(|s| s * s).sum::<f32>() / n).sqrt();
            let crossings = samples.windows(2).filter(|w| (w[0] < 0.0) != (w[1] < 0.0)).count() as f32;
            let mut v = vec![rms, crossings / n, 0.1];
            l2_normalize(&mut v);
            Ok(v)
        }
    }

    struct TestApp {
        router: Router,
        dir: tempfile::TempDir,
    }

    fn app_with(server: ServerConfig) -> TestApp {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = Pipeline::new(
            Arc::new(StatsEncoder),
            None,
            PipelineConfig {
                temp_dir: dir.path().to_path_buf(),
                ..Default::default()
            },
        );
        let state = AppState {
            pipeline: Arc::new(pipeline),
            threshold: 0.75,
        };
        TestApp {
            router: router(state, &server),
            dir,
        }
    }

    fn app() -> TestApp {
        app_with(ServerConfig::default())
    }

    fn tone_wav(rate: u32, freq: f32) -> Vec<u8> {
        let samples: Vec<f32> = (0..rate as usize)
            .map(|i| 0.5 * (2.0 * std::f32::consts::PI * freq * i as f32 / rate as f32).sin())
            .collect();
        encode_wav(&samples, rate).unwrap()
    }

    /// `(name, filename, bytes)` parts encoded as multipart/form-data.
    fn multipart(parts: &[(&str, Option<&str>, &[u8])]) -> Body {
        let mut body = Vec::new();
        for (name, filename, data) in parts {
            body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
            match filename {
                Some(f) => body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"{f}\"\r\n\
                         Content-Type: application/octet-stream\r\n\r\n"
                    )
                    .as_bytes(),
                ),
                None => body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
                ),
            }
            body.extend_from_slice(data);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        Body::from(body)
    }

    fn post_multipart(uri: &str, body: Body) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(body)
            .unwrap()
    }

    fn post_json(uri: &str, json: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap()
    }

    async fn send(app: &TestApp, req: Request<Body>) -> (StatusCode, serde_json::Value) {
        let resp = app.router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    fn temp_dir_is_empty(app: &TestApp) -> bool {
        std::fs::read_dir(app.dir.path()).unwrap().next().is_none()
    }

    async fn extract_descriptor(app: &TestApp, wav: &[u8]) -> Vec<f32> {
        let req = post_multipart(
            "/extract-voice-descriptor",
            multipart(&[("audio", Some("clip.wav"), wav)]),
        );
        let (status, json) = send(app, req).await;
        assert_eq!(status, StatusCode::OK, "{json}");
        serde_json::from_value(json["descriptor"].clone()).unwrap()
    }

    #[tokio::test]
    async fn liveness() {
        let app = app();
        let req = Request::builder().uri("/").body(Body::empty()).unwrap();
        let (status, json) = send(&app, req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["message"], "Voice descriptor API is live");
    }

    #[tokio::test]
    async fn extract_returns_descriptor() {
        let app = app();
        let d = extract_descriptor(&app, &tone_wav(16000, 220.0)).await;
        assert_eq!(d.len(), 3);
        let norm: f32 = d.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
        assert!(temp_dir_is_empty(&app));
    }

    #[tokio::test]
    async fn wrong_sample_rate_is_400() {
        let app = app();
        for rate in [8000, 44100] {
            let req = post_multipart(
                "/extract-voice-descriptor",
                multipart(&[("audio", Some("clip.wav"), &tone_wav(rate, 220.0)[..])]),
            );
            let (status, json) = send(&app, req).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert!(json["detail"].as_str().unwrap().starts_with("Audio must be 16kHz"));
        }
        assert!(temp_dir_is_empty(&app));
    }

    #[tokio::test]
    async fn silence_is_400() {
        let app = app();
        let wav = encode_wav(&vec![0.0; 16000], 16000).unwrap();
        let req = post_multipart("/extract-voice-descriptor", multipart(&[("audio", Some("s.wav"), &wav[..])]));
        let (status, json) = send(&app, req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["detail"].as_str().unwrap().contains("no usable audio"));
    }

    #[tokio::test]
    async fn corrupted_audio_is_400() {
        let app = app();
        let req = post_multipart(
            "/extract-voice-descriptor",
            multipart(&[("audio", Some("clip.wav"), &b"not a wav file at all"[..])]),
        );
        let (status, _) = send(&app, req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn container_without_transcoder_is_400() {
        let app = app();
        let req = post_multipart(
            "/extract-voice-descriptor",
            multipart(&[("audio", Some("clip.webm"), &b"\x1a\x45\xdf\xa3webm"[..])]),
        );
        let (status, _) = send(&app, req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(temp_dir_is_empty(&app));
    }

    #[tokio::test]
    async fn model_failure_is_generic_500() {
        let app = app();
        let mut samples = vec![0.25f32];
        samples.extend(std::iter::repeat_n(0.3, 1600));
        let wav = encode_wav(&samples, 16000).unwrap();
        let req = post_multipart("/extract-voice-descriptor", multipart(&[("audio", Some("c.wav"), &wav[..])]));
        let (status, json) = send(&app, req).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let detail = json["detail"].as_str().unwrap();
        assert!(!detail.contains("secret"), "leaked: {detail}");
        assert!(temp_dir_is_empty(&app));
    }

    #[tokio::test]
    async fn missing_audio_field_is_422() {
        let app = app();
        let req = post_multipart("/extract-voice-descriptor", multipart(&[("other", None, &b"x"[..])]));
        let (status, json) = send(&app, req).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(json["detail"].as_str().unwrap().contains("audio"));
    }

    #[tokio::test]
    async fn non_multipart_is_422() {
        let app = app();
        let req = post_json("/extract-voice-descriptor", serde_json::json!({"audio": "x"}));
        let (status, json) = send(&app, req).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(json["detail"].is_string());
    }

    #[tokio::test]
    async fn oversized_upload_is_413() {
        let app = app_with(ServerConfig {
            max_upload_bytes: 1024,
            ..Default::default()
        });
        let req = post_multipart(
            "/extract-voice-descriptor",
            multipart(&[("audio", Some("clip.wav"), &tone_wav(16000, 220.0)[..])]),
        );
        let (status, _) = send(&app, req).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn compare_endpoint() {
        let app = app();
        let (status, json) = send(
            &app,
            post_json(
                "/compare-voice-descriptors",
                serde_json::json!({"reference": [1.0, 0.0], "candidate": [1.0, 0.0]}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["match"], true);
        assert_eq!(json["threshold"], 0.75);

        let (status, json) = send(
            &app,
            post_json(
                "/compare-voice-descriptors",
                serde_json::json!({"reference": [1.0, 0.0], "candidate": [0.0, 1.0], "threshold": 0.5}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["match"], false);
        assert_eq!(json["threshold"], 0.5);
    }

    #[tokio::test]
    async fn compare_rejects_bad_input() {
        let app = app();
        let (status, _) = send(
            &app,
            post_json(
                "/compare-voice-descriptors",
                serde_json::json!({"reference": [1.0, 0.0], "candidate": [1.0]}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            &app,
            post_json("/compare-voice-descriptors", serde_json::json!({"reference": [1.0]})),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn verify_same_clip_matches() {
        let app = app();
        let wav = tone_wav(16000, 220.0);
        let reference = extract_descriptor(&app, &wav).await;
        let reference = serde_json::to_string(&reference).unwrap();

        let req = post_multipart(
            "/verify-voice-descriptor",
            multipart(&[
                ("audio", Some("clip.wav"), &wav[..]),
                ("reference", None, reference.as_bytes()),
            ]),
        );
        let (status, json) = send(&app, req).await;
        assert_eq!(status, StatusCode::OK, "{json}");
        assert_eq!(json["match"], true);
        assert!(json["similarity"].as_f64().unwrap() > 0.999);
        assert!(temp_dir_is_empty(&app));
    }

    #[tokio::test]
    async fn verify_requires_reference() {
        let app = app();
        let wav = tone_wav(16000, 220.0);
        let req = post_multipart("/verify-voice-descriptor", multipart(&[("audio", Some("c.wav"), &wav[..])]));
        let (status, _) = send(&app, req).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let req = post_multipart(
            "/verify-voice-descriptor",
            multipart(&[("audio", Some("c.wav"), &wav[..]), ("reference", None, &b"not json"[..])]),
        );
        let (status, _) = send(&app, req).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let req = post_multipart(
            "/verify-voice-descriptor",
            multipart(&[("audio", Some("c.wav"), &wav[..]), ("reference", None, &b"[1.0, 0.0]"[..])]),
        );
        let (status, _) = send(&app, req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn cors_allows_configured_origin() {
        let app = app();
        let req = Request::builder()
            .uri("/")
            .header(header::ORIGIN, "http://localhost:3000")
            .body(Body::empty())
            .unwrap();
        let resp = app.router.clone().oneshot(req).await.unwrap();
        let headers = resp.headers();
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "http://localhost:3000");
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_CREDENTIALS], "true");

        let req = Request::builder()
            .uri("/")
            .header(header::ORIGIN, "https://evil.example")
            .body(Body::empty())
            .unwrap();
        let resp = app.router.clone().oneshot(req).await.unwrap();
        assert!(resp.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).is_none());
    }

    #[tokio::test]
    async fn cors_preflight_mirrors_method() {
        let app = app();
        let req = Request::builder()
            .method("OPTIONS")
            .uri("/extract-voice-descriptor")
            .header(header::ORIGIN, "https://artconnect-frontend.onrender.com")
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
            .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "x-custom")
            .body(Body::empty())
            .unwrap();
        let resp = app.router.clone().oneshot(req).await.unwrap();
        assert!(resp.status().is_success());
        let headers = resp.headers();
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_METHODS], "POST");
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_HEADERS], "x-custom");
    }

    #[tokio::test]
    async fn cors_wildcard_mirrors_any_origin() {
        let app = app_with(ServerConfig {
            cors_origins: vec!["*".into()],
            ..Default::default()
        });
        let req = Request::builder()
            .uri("/")
            .header(header::ORIGIN, "https://anywhere.example")
            .body(Body::empty())
            .unwrap();
        let resp = app.router.clone().oneshot(req).await.unwrap();
        assert_eq!(
            resp.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "https://anywhere.example"
        );
    }
}
