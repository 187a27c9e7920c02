//! GET/HEAD handlers: entry document, model bytes and static assets.

use std::sync::Arc;

use axum::{
    body::{Body, Bytes},
    extract::{Path, State},
    http::{header, HeaderValue, Method, StatusCode, Uri},
    response::{Html, IntoResponse, Response},
};
use futures::stream;
use tokio::io::AsyncReadExt;

use super::routes;
use super::AppState;

const VIEWER_NOT_FOUND: &str = "<html><body><h1>Viewer not found</h1></body></html>";
const MODEL_NOT_FOUND: &str = "Model file not found";

/// Handler for GET / and /index.html
///
/// The document is returned as-is; the active file reaches the renderer via
/// the `file` query parameter of the navigation URL.
pub async fn index(State(state): State<Arc<AppState>>) -> Html<String> {
    match tokio::fs::read_to_string(state.assets.index_path()).await {
        Ok(html) => Html(html),
        Err(e) => {
            log::warn!("Viewer entry document unavailable: {}", e);
            Html(VIEWER_NOT_FOUND.to_string())
        }
    }
}

/// Handler for GET /model/{name}
///
/// Looks the basename up among the session's known files and streams it.
pub async fn model(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    method: Method,
) -> Response {
    let Some(model) = state.session.registry().find_by_name(&name) else {
        return model_not_found();
    };

    let file = match tokio::fs::File::open(model.path()).await {
        Ok(f) => f,
        Err(e) => {
            log::warn!("Model {} unreadable: {}", model.path().display(), e);
            return model_not_found();
        }
    };
    let len = match file.metadata().await {
        Ok(m) => m.len(),
        Err(_) => return model_not_found(),
    };

    let body = if method == Method::HEAD {
        Body::empty()
    } else {
        Body::from_stream(chunked(file, len, state.chunk_size))
    };

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, model.format().content_type())
        .header(header::CONTENT_LENGTH, len)
        .body(body)
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

/// Read `len` bytes from `file` as a stream of chunks of at most
/// `chunk_size` bytes. Stops early if the file shrinks underneath us.
fn chunked(
    file: tokio::fs::File,
    len: u64,
    chunk_size: usize,
) -> impl futures::Stream<Item = std::io::Result<Bytes>> {
    stream::try_unfold((file, len), move |(mut file, remaining)| async move {
        if remaining == 0 {
            return Ok(None);
        }
        let want = remaining.min(chunk_size as u64) as usize;
        let mut buf = vec![0u8; want];
        let read = file.read(&mut buf).await?;
        if read == 0 {
            return Ok(None);
        }
        buf.truncate(read);
        Ok(Some((Bytes::from(buf), (file, remaining - read as u64))))
    })
}

fn model_not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        [(header::CONTENT_TYPE, "text/plain")],
        MODEL_NOT_FOUND,
    )
        .into_response()
}

/// Everything no route claims, dispatched on method.
pub async fn fallback(state: State<Arc<AppState>>, method: Method, uri: Uri) -> Response {
    match method {
        Method::GET | Method::HEAD => static_asset(state, method, uri).await,
        _ => routes::not_found().await.into_response(),
    }
}

async fn static_asset(State(state): State<Arc<AppState>>, method: Method, uri: Uri) -> Response {
    // Misses worth logging were already logged by the resolver.
    let asset = match state.assets.resolve(uri.path()) {
        Ok(asset) => asset,
        Err(_) => return StatusCode::NOT_FOUND.into_response(),
    };

    let bytes = if method == Method::HEAD {
        None
    } else if let Some(bytes) = asset.cacheable.then(|| state.cache.get(&asset.path)).flatten() {
        Some(bytes)
    } else {
        match tokio::fs::read(&asset.path).await {
            Ok(data) => {
                let bytes = Bytes::from(data);
                if asset.cacheable {
                    state.cache.insert(asset.path.clone(), bytes.clone());
                }
                Some(bytes)
            }
            Err(e) => {
                log::debug!("Failed reading {}: {}", asset.path.display(), e);
                return StatusCode::NOT_FOUND.into_response();
            }
        }
    };

    let len = match &bytes {
        Some(b) => b.len() as u64,
        None => match tokio::fs::metadata(&asset.path).await {
            Ok(m) => m.len(),
            Err(_) => return StatusCode::NOT_FOUND.into_response(),
        },
    };

    let mut response = Response::new(bytes.map(Body::from).unwrap_or_else(Body::empty));
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(asset.content_type));
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
    response
}
