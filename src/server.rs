//! HTTP upload service.
//!
//! `GET /` serves a minimal upload form, `POST /` accepts a multipart
//! upload in the field `file` and answers with the converted PDF as an
//! attachment. Generated files are removed from `output_dir` once sent
//! unless `keep_outputs` is set.

use crate::config::ConversionConfig;
use crate::convert::{convert_upload, download_name, UploadedFile};
use crate::error::{FailureKind, ToPdfError};
use axum::body::Body;
use axum::extract::multipart::MultipartRejection;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

const UPLOAD_FORM: &str = r#"<!doctype html>
<html>
<head><meta charset="utf-8"><title>Convert to PDF</title></head>
<body>
<h1>Convert to PDF</h1>
<p>Word documents (.docx), images (.png, .jpg, .jpeg) and spreadsheets (.xls, .xlsx).</p>
<form method="post" enctype="multipart/form-data">
  <input type="file" name="file" accept=".docx,.png,.jpg,.jpeg,.xls,.xlsx">
  <button type="submit">Convert</button>
</form>
</body>
</html>
"#;

#[derive(Clone)]
struct AppState {
    config: Arc<ConversionConfig>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

/// An error reply: status plus a short message.
#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn internal(detail: impl std::fmt::Display) -> Self {
        error!("Internal error: {}", detail);
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            FailureKind::Internal.user_message(),
        )
    }
}

impl From<ToPdfError> for ApiError {
    fn from(e: ToPdfError) -> Self {
        match e.kind() {
            FailureKind::UnsupportedFormat => Self::new(
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                FailureKind::UnsupportedFormat.user_message(),
            ),
            FailureKind::ConversionFailed => {
                warn!("Conversion failed: {}", e);
                Self::new(
                    StatusCode::UNPROCESSABLE_ENTITY,
                    format!(
                        "{}: {}",
                        FailureKind::ConversionFailed.user_message(),
                        e.public_detail()
                    ),
                )
            }
            FailureKind::Internal => Self::internal(e),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorBody {
                error: self.message,
            }),
        )
            .into_response()
    }
}

/// Build the service router.
pub fn router(config: ConversionConfig) -> Router {
    let limit = config.max_upload_bytes;
    let state = AppState {
        config: Arc::new(config),
    };
    Router::new()
        .route("/", get(upload_form).post(upload))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind `addr` and serve until Ctrl-C or SIGTERM.
pub async fn serve(addr: SocketAddr, config: ConversionConfig) -> std::io::Result<()> {
    tokio::fs::create_dir_all(&config.output_dir).await?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(
        "Listening on http://{} (outputs in {})",
        listener.local_addr()?,
        config.output_dir.display()
    );
    axum::serve(listener, router(config))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Cannot listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Cannot listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting graceful shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting graceful shutdown..."),
    }
}

async fn upload_form() -> Html<&'static str> {
    Html(UPLOAD_FORM)
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn upload(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, ApiError> {
    let Ok(mut multipart) = multipart else {
        return Err(ApiError::new(StatusCode::BAD_REQUEST, "No file part"));
    };

    let mut received = None;
    while let Some(field) = multipart.next_field().await.map_err(|e| {
        warn!("Failed to read multipart field: {}", e);
        ApiError::new(e.status(), e.body_text())
    })? {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::new(e.status(), e.body_text()))?;
        debug!("Received '{}' ({} bytes)", filename, bytes.len());
        received = Some(UploadedFile {
            filename,
            bytes: bytes.to_vec(),
        });
        break;
    }

    let Some(upload) = received else {
        return Err(ApiError::new(StatusCode::BAD_REQUEST, "No file part"));
    };
    if upload.filename.is_empty() {
        return Err(ApiError::new(StatusCode::BAD_REQUEST, "No selected file"));
    }

    let attachment = download_name(&upload.filename);
    let output = convert_upload(upload, &state.config).await?;
    let pdf = tokio::fs::read(&output.output_path)
        .await
        .map_err(ApiError::internal)?;
    if !state.config.keep_outputs {
        if let Err(e) = tokio::fs::remove_file(&output.output_path).await {
            warn!("Could not remove {}: {}", output.output_path.display(), e);
        }
    }

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/pdf")
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{attachment}\""),
        )
        .body(Body::from(pdf))
        .map_err(ApiError::internal)
}
