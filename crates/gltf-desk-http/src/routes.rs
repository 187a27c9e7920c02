//! POST handlers for the renderer-facing API.
//!
//! Bodies are parsed by hand from raw bytes so that malformed JSON turns into
//! a `{success:false, error}` response instead of an extractor rejection.

use std::sync::Arc;

use axum::{body::Bytes, extract::State, http::StatusCode, response::Json};
use gltf_desk_core::capture::{save_capture, CaptureRequest};
use gltf_desk_core::{
    DialogError, DialogMode, DialogPrompt, FileTypeFilter, LoadOrigin, ModelStats,
};
use serde::{Deserialize, Serialize};

use super::AppState;

const APP_UNAVAILABLE: &str = "Desktop app not available";

/// Response format for API routes.
#[derive(Serialize)]
pub struct ApiResponse {
    /// Whether the operation succeeded.
    pub success: bool,
    /// Route-specific fields, inlined next to `success`.
    #[serde(flatten)]
    pub data: Option<serde_json::Value>,
    /// Error message (if failed).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ApiResponse {
    pub fn ok(data: impl Serialize) -> Self {
        Self {
            success: true,
            data: serde_json::to_value(data).ok(),
            error: None,
        }
    }

    pub fn done() -> Self {
        Self {
            success: true,
            data: None,
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }
}

type ApiReply = (StatusCode, Json<ApiResponse>);

/// Request body for POST /api/add-model. Every field is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AddModelRequest {
    /// `[[label, "*.ext *.ext"], ...]`
    pub file_types: Option<Vec<(String, String)>>,
    pub title: Option<String>,
    /// Shorthand hint; `"csv"` selects a CSV-specific title.
    pub file_type: Option<String>,
}

impl AddModelRequest {
    fn prompt(self) -> DialogPrompt {
        let title = self.title.or_else(|| {
            (self.file_type.as_deref() == Some("csv")).then(|| "Select CSV File".to_string())
        });
        let filters = self.file_types.map(|types| {
            types
                .into_iter()
                .map(|(label, patterns)| FileTypeFilter::new(label, &patterns))
                .collect()
        });
        DialogPrompt::new(DialogMode::Add)
            .with_title(title)
            .with_filters(filters)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AddedModel {
    file_url: String,
    file_name: String,
    file_size: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SavedImage {
    file_path: String,
    file_name: String,
    message: String,
}

#[derive(Deserialize)]
struct ModelErrorReport {
    message: String,
}

/// Handler for POST /api/add-model
///
/// Asks the desktop UI for a file through the dialog broker. The wait happens
/// on a blocking thread so other connections keep being served.
pub async fn add_model(State(state): State<Arc<AppState>>, body: Bytes) -> ApiReply {
    // Unparseable bodies fall back to the defaults.
    let request: AddModelRequest = serde_json::from_slice(&body).unwrap_or_default();

    let Some(broker) = state.dialogs.clone().filter(|b| b.is_available()) else {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::failure(APP_UNAVAILABLE)),
        );
    };

    let prompt = request.prompt();
    let picked = tokio::task::spawn_blocking(move || broker.request_dialog(prompt)).await;

    match picked {
        Ok(Ok(Some(file))) => {
            let file = state.session.load_model(file, LoadOrigin::Renderer);
            (
                StatusCode::OK,
                Json(ApiResponse::ok(AddedModel {
                    file_url: file.url_path(),
                    file_name: file.display_name().to_string(),
                    file_size: file.size_bytes(),
                })),
            )
        }
        Ok(Ok(None)) => (StatusCode::OK, Json(ApiResponse::failure("No file selected"))),
        Ok(Err(DialogError::Unavailable)) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::failure(APP_UNAVAILABLE)),
        ),
        Err(e) => {
            log::error!("Dialog request task failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::failure(e.to_string())),
            )
        }
    }
}

/// Handler for POST /api/capture-image
pub async fn capture_image(State(state): State<Arc<AppState>>, body: Bytes) -> ApiReply {
    if body.is_empty() {
        return bad_request("No image data provided");
    }
    let request: CaptureRequest = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(e) => return bad_request(format!("Invalid JSON: {}", e)),
    };

    let export_folder = state.session.export_folder();
    let saved =
        tokio::task::spawn_blocking(move || save_capture(export_folder.as_deref(), &request)).await;

    match saved {
        Ok(Ok(saved)) => {
            state
                .session
                .publish_status(format!("Image saved: {}", saved.file_name));
            (
                StatusCode::OK,
                Json(ApiResponse::ok(SavedImage {
                    file_path: saved.file_path.to_string_lossy().into_owned(),
                    message: format!("Image saved to {}", saved.file_name),
                    file_name: saved.file_name,
                })),
            )
        }
        Ok(Err(e)) => {
            log::warn!("Capture failed: {}", e);
            let status =
                StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (status, Json(ApiResponse::failure(e.to_string())))
        }
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::failure(e.to_string())),
        ),
    }
}

/// Handler for POST /api/model-loaded
pub async fn model_loaded(State(state): State<Arc<AppState>>, body: Bytes) -> ApiReply {
    match serde_json::from_slice::<ModelStats>(&body) {
        Ok(stats) => {
            state.session.report_model_stats(stats);
            (StatusCode::OK, Json(ApiResponse::done()))
        }
        Err(e) => bad_request(format!("Invalid JSON: {}", e)),
    }
}

/// Handler for POST /api/model-error
pub async fn model_error(State(state): State<Arc<AppState>>, body: Bytes) -> ApiReply {
    match serde_json::from_slice::<ModelErrorReport>(&body) {
        Ok(report) => {
            state.session.report_model_error(report.message);
            (StatusCode::OK, Json(ApiResponse::done()))
        }
        Err(e) => bad_request(format!("Invalid JSON: {}", e)),
    }
}

/// Any other POST.
pub async fn not_found() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({ "error": "Not found" })),
    )
}

fn bad_request(error: impl Into<String>) -> ApiReply {
    (StatusCode::BAD_REQUEST, Json(ApiResponse::failure(error)))
}
