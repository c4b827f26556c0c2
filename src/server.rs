use std::sync::Arc;

use axum::{
    extract::{
        multipart::MultipartError, rejection::QueryRejection, DefaultBodyLimit, Multipart, Query,
        State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing, Json, Router,
};
use celebmatch_vision::ImageSource;
use serde::{Deserialize, Serialize};

use crate::analyze::{AnalysisResponse, AnalyzeError, Analyzer};
use crate::ranking::RankError;

#[derive(Clone)]
pub struct AppState {
    pub analyzer: Arc<Analyzer>,
    pub default_num_results: i64,
}

#[derive(Debug, Deserialize)]
pub struct AnalyzeParams {
    pub num_results: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub detail: String,
}

/// Error returned to HTTP clients as `{"detail": ...}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    detail: String,
}

impl ApiError {
    fn bad_request(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            detail: detail.into(),
        }
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::bad_request(format!("Invalid query parameters: {}", rejection.body_text()))
    }
}

impl ApiError {
    /// Oversized uploads surface as 413, anything else as a malformed request.
    fn upload(err: MultipartError, context: &str) -> Self {
        let status = match err.status() {
            StatusCode::PAYLOAD_TOO_LARGE => StatusCode::PAYLOAD_TOO_LARGE,
            _ => StatusCode::BAD_REQUEST,
        };
        Self {
            status,
            detail: format!("{context}: {}", err.body_text()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorBody { detail: self.detail })).into_response()
    }
}

impl From<AnalyzeError> for ApiError {
    fn from(err: AnalyzeError) -> Self {
        let (status, detail) = match &err {
            AnalyzeError::NoFaceDetected => (
                StatusCode::BAD_REQUEST,
                "No face detected in the image.".to_string(),
            ),
            AnalyzeError::Rank(RankError::InvalidParameter(msg)) => {
                (StatusCode::BAD_REQUEST, msg.clone())
            }
            AnalyzeError::Rank(RankError::NoMatch) => (
                StatusCode::NOT_FOUND,
                "No matching celebrity records found.".to_string(),
            ),
            AnalyzeError::Rank(RankError::CountUnavailable(_)) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Error fetching record count: {err}"),
            ),
            AnalyzeError::Rank(RankError::PageFetch { .. }) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Error fetching celebrity data: {err}"),
            ),
            AnalyzeError::Embed(_) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
        };
        if status.is_server_error() {
            log::error!("{}", detail);
        } else {
            log::warn!("{}", detail);
        }
        Self { status, detail }
    }
}

pub fn app(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/", routing::get(index))
        .route("/analyze", routing::post(analyze))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(state)
}

pub async fn index() -> &'static str {
    "celebmatch"
}

pub async fn analyze(
    State(state): State<AppState>,
    params: Result<Query<AnalyzeParams>, QueryRejection>,
    mut multipart: Multipart,
) -> Result<Json<AnalysisResponse>, ApiError> {
    let Query(params) = params?;
    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::upload(e, "Malformed upload"))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let is_image = field
            .content_type()
            .map(|ct| ct.starts_with("image/"))
            .unwrap_or(false);
        if !is_image {
            return Err(ApiError::bad_request(
                "Invalid file type. Only image files are accepted.",
            ));
        }
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::upload(e, "Could not read upload"))?;
        upload = Some(bytes.to_vec());
        break;
    }

    let image = upload.ok_or_else(|| ApiError::bad_request("Missing form field 'file'."))?;
    let num_results = params.num_results.unwrap_or(state.default_num_results);

    let response = state
        .analyzer
        .analyze(ImageSource::InlineBytes(image), num_results)
        .await?;
    Ok(Json(response))
}

pub async fn serve(state: AppState, bind: &str, max_upload_bytes: usize) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    log::info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app(state, max_upload_bytes))
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            log::info!("shutting down");
        })
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyze::tests::{analyzer, catalog};
    use crate::corpus::Embedding;
    use axum::{body::Body, http::Request};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    const BOUNDARY: &str = "celebmatch-test-boundary";

    fn router(face: Option<Embedding>, entries: Vec<crate::corpus::CatalogEntry>) -> Router {
        router_with_limit(face, entries, 1024 * 1024)
    }

    fn router_with_limit(
        face: Option<Embedding>,
        entries: Vec<crate::corpus::CatalogEntry>,
        max_upload_bytes: usize,
    ) -> Router {
        let state = AppState {
            analyzer: Arc::new(analyzer(face, entries)),
            default_num_results: 8,
        };
        app(state, max_upload_bytes)
    }

    fn upload(uri: &str, field: &str, content_type: &str, data: &[u8]) -> Request<Body> {
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"face.png\"\r\nContent-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

        Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                "content-type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn json(response: Response) -> serde_json::Value {
        let body = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_index() {
        let response = router(None, vec![])
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"celebmatch");
    }

    #[tokio::test]
    async fn test_analyze_success() {
        let response = router(Some(vec![0.0, 0.0]), catalog())
            .oneshot(upload("/analyze?num_results=2", "file", "image/png", b"png"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            json(response).await,
            serde_json::json!({
                "results": [
                    {"rank": 1, "name": "A", "similarity": 10.0, "image_url": "https://cdn.example/A.png"},
                    {"rank": 2, "name": "B", "similarity": 5.0, "image_url": "https://cdn.example/B.png"}
                ]
            })
        );
    }

    #[tokio::test]
    async fn test_default_num_results() {
        let response = router(Some(vec![0.0, 0.0]), catalog())
            .oneshot(upload("/analyze", "file", "image/jpeg", b"jpg"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json(response).await["results"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_wrong_content_type() {
        let response = router(Some(vec![0.0, 0.0]), catalog())
            .oneshot(upload("/analyze", "file", "text/plain", b"hello"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            json(response).await["detail"],
            "Invalid file type. Only image files are accepted."
        );
    }

    #[tokio::test]
    async fn test_missing_file_field() {
        let response = router(Some(vec![0.0, 0.0]), catalog())
            .oneshot(upload("/analyze", "photo", "image/png", b"png"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_no_face() {
        let response = router(None, catalog())
            .oneshot(upload("/analyze", "file", "image/png", b"png"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json(response).await["detail"], "No face detected in the image.");
    }

    #[tokio::test]
    async fn test_invalid_num_results() {
        let response = router(Some(vec![0.0, 0.0]), catalog())
            .oneshot(upload("/analyze?num_results=0", "file", "image/png", b"png"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_empty_catalog_is_not_found() {
        let response = router(Some(vec![0.0, 0.0]), vec![])
            .oneshot(upload("/analyze", "file", "image/png", b"png"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            json(response).await["detail"],
            "No matching celebrity records found."
        );
    }

    #[tokio::test]
    async fn test_non_integer_num_results() {
        let response = router(Some(vec![0.0, 0.0]), catalog())
            .oneshot(upload("/analyze?num_results=abc", "file", "image/png", b"png"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let detail = json(response).await["detail"].as_str().unwrap().to_string();
        assert!(detail.starts_with("Invalid query parameters"), "{detail}");
    }

    #[tokio::test]
    async fn test_upload_too_large() {
        let response = router_with_limit(Some(vec![0.0, 0.0]), catalog(), 1024)
            .oneshot(upload("/analyze", "file", "image/png", &[0u8; 8192]))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert!(json(response).await["detail"].is_string());
    }
}
