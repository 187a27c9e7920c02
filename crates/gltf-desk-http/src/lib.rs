//! Local model server for the gltf-desk renderer.
//!
//! Serves the renderer's static front-end, the session's model files and the
//! small POST API the renderer uses to call back into the desktop. Session
//! events are streamed over `/ws/events`.

mod cache;
mod routes;
mod serve;
mod state;
mod websocket;

use std::future::IntoFuture;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;

use axum::{
    http::Method,
    routing::{get, post},
    Router,
};
use gltf_desk_core::{ServerConfig, ServerState, SessionError};
use thiserror::Error;
use tokio::sync::oneshot;
use tower_http::cors::{Any, CorsLayer};

pub use cache::StaticCache;
pub use routes::{AddModelRequest, ApiResponse};
pub use state::AppState;

/// In-flight handlers get this long to finish once the server stops.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

#[derive(Error, Debug)]
pub enum ServeError {
    #[error("No free port in {start}..={end}")]
    PortExhausted { start: u16, end: u16 },

    #[error("Failed to start server runtime: {0}")]
    Runtime(#[from] std::io::Error),

    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Build the router for the model server.
///
/// OPTIONS requests are answered by the CORS layer for every path.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(serve::index).fallback(serve::fallback))
        .route("/index.html", get(serve::index).fallback(serve::fallback))
        .route("/model/{name}", get(serve::model).fallback(serve::fallback))
        .route("/api/add-model", post(routes::add_model).fallback(serve::fallback))
        .route(
            "/api/capture-image",
            post(routes::capture_image).fallback(serve::fallback),
        )
        .route(
            "/api/model-loaded",
            post(routes::model_loaded).fallback(serve::fallback),
        )
        .route(
            "/api/model-error",
            post(routes::model_error).fallback(serve::fallback),
        )
        .route("/ws/events", get(websocket::ws_handler))
        .fallback(serve::fallback)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS, Method::HEAD])
                .allow_headers(Any),
        )
        .with_state(state)
}

struct RunningServer {
    port: u16,
    shutdown_tx: oneshot::Sender<()>,
    thread: std::thread::JoinHandle<()>,
}

/// The model server and its lifecycle.
///
/// Runs on its own thread with its own tokio runtime. Lifecycle transitions
/// are recorded in the session's server state
/// (Stopped -> Starting -> Running -> Stopped).
pub struct ViewerServer {
    config: ServerConfig,
    state: Arc<AppState>,
    running: Mutex<Option<RunningServer>>,
}

impl ViewerServer {
    pub fn new(config: ServerConfig, state: Arc<AppState>) -> Self {
        Self {
            config,
            state,
            running: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().unwrap().is_some()
    }

    pub fn port(&self) -> Option<u16> {
        self.running.lock().unwrap().as_ref().map(|r| r.port)
    }

    /// Start serving and return the bound port.
    ///
    /// Calling this while already running returns the current port. If no
    /// candidate port is free the server stays Stopped and
    /// [`ServeError::PortExhausted`] is returned.
    pub fn start(&self) -> Result<u16, ServeError> {
        let mut running = self.running.lock().unwrap();
        if let Some(server) = running.as_ref() {
            return Ok(server.port);
        }

        let (listener, port) = bind_first_free(&self.config)?;
        listener.set_nonblocking(true)?;

        let rt = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("gltf-desk-http")
            .build()?;
        let listener = {
            let _guard = rt.enter();
            tokio::net::TcpListener::from_std(listener)?
        };

        let app = router(Arc::clone(&self.state));
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let (ready_tx, ready_rx) = mpsc::channel();
        let host = self.config.host.clone();

        let thread = std::thread::Builder::new()
            .name("gltf-desk-server".to_string())
            .spawn(move || {
                rt.block_on(async move {
                    let _ = ready_tx.send(());
                    log::info!("Model server listening on http://{}:{}", host, port);

                    tokio::select! {
                        result = axum::serve(listener, app).into_future() => {
                            if let Err(e) = result {
                                log::error!("Model server failed: {}", e);
                            }
                        }
                        _ = shutdown_rx => {
                            log::info!("Model server shutting down");
                        }
                    }
                });
                // Abandon whatever is still in flight, including dialog waits.
                rt.shutdown_timeout(SHUTDOWN_GRACE);
            })?;

        let session = &self.state.session;
        if let Err(e) = session.transition_server(ServerState::Starting, Some(port)) {
            abandon(shutdown_tx, thread);
            return Err(e.into());
        }

        if ready_rx.recv_timeout(self.config.start_timeout).is_err() {
            log::warn!(
                "Model server did not confirm start within {:?}, continuing",
                self.config.start_timeout
            );
        }

        if let Err(e) = session.transition_server(ServerState::Running, Some(port)) {
            abandon(shutdown_tx, thread);
            return Err(e.into());
        }
        *running = Some(RunningServer {
            port,
            shutdown_tx,
            thread,
        });
        Ok(port)
    }

    /// Stop serving. Returns false if the server was not running.
    pub fn stop(&self) -> bool {
        let mut running = self.running.lock().unwrap();
        let Some(server) = running.take() else {
            return false;
        };

        let _ = server.shutdown_tx.send(());
        if server.thread.join().is_err() {
            log::error!("Model server thread panicked");
        }
        if let Err(e) = self
            .state
            .session
            .transition_server(ServerState::Stopped, None)
        {
            log::warn!("{}", e);
        }
        log::info!("Model server on port {} stopped", server.port);
        true
    }

    /// Probe the running server until it accepts connections.
    pub fn wait_until_ready(&self) -> bool {
        match self.port() {
            Some(port) => wait_until_reachable(
                &self.config.host,
                port,
                self.config.ready_attempts,
                self.config.ready_interval,
            ),
            None => false,
        }
    }
}

impl Drop for ViewerServer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Shut down a serving thread that never made it to Running.
fn abandon(shutdown_tx: oneshot::Sender<()>, thread: std::thread::JoinHandle<()>) {
    let _ = shutdown_tx.send(());
    if thread.join().is_err() {
        log::error!("Model server thread panicked");
    }
}

/// Take the first candidate port that binds.
fn bind_first_free(config: &ServerConfig) -> Result<(std::net::TcpListener, u16), ServeError> {
    for port in config.candidate_ports() {
        match std::net::TcpListener::bind((config.host.as_str(), port)) {
            Ok(listener) => return Ok((listener, port)),
            Err(e) => log::debug!("Port {} unavailable: {}", port, e),
        }
    }
    let end = config
        .start_port
        .saturating_add(config.port_span.saturating_sub(1));
    log::error!("No free port in {}..={}", config.start_port, end);
    Err(ServeError::PortExhausted {
        start: config.start_port,
        end,
    })
}

/// Try to connect to `host:port` up to `attempts` times, sleeping `interval`
/// between attempts.
pub fn wait_until_reachable(host: &str, port: u16, attempts: u32, interval: Duration) -> bool {
    let addrs: Vec<SocketAddr> = match (host, port).to_socket_addrs() {
        Ok(addrs) => addrs.collect(),
        Err(e) => {
            log::warn!("Cannot resolve {}: {}", host, e);
            return false;
        }
    };

    for attempt in 0..attempts {
        if addrs
            .iter()
            .any(|addr| TcpStream::connect_timeout(addr, interval).is_ok())
        {
            return true;
        }
        if attempt + 1 < attempts {
            std::thread::sleep(interval);
        }
    }
    false
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use gltf_desk_core::{
        BrokerConfig, DialogBroker, DialogPrompt, EventBus, FilePicker, LoadOrigin,
        SessionController, SessionEvent,
    };
    use std::fs;
    use std::io::{Read, Write};
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicBool, Ordering};
    use tempfile::{tempdir, TempDir};
    use tower::ServiceExt;

    struct Fixture {
        _dir: TempDir,
        assets: PathBuf,
        models: PathBuf,
        session: Arc<SessionController>,
        config: ServerConfig,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempdir().unwrap();
            let assets = dir.path().join("viewer");
            let models = dir.path().join("models");
            fs::create_dir_all(&assets).unwrap();
            fs::create_dir_all(&models).unwrap();
            fs::write(assets.join("index.html"), "<html>viewer</html>").unwrap();
            fs::write(assets.join("app.js"), "console.log(1)").unwrap();
            fs::write(assets.join("draco_decoder_gltf.js"), "// decoder").unwrap();
            fs::write(dir.path().join("secret.txt"), "secret").unwrap();

            let session = Arc::new(SessionController::new(Arc::new(EventBus::new())));
            let config = ServerConfig::new(&assets).chunk_size(64);
            Self {
                _dir: dir,
                assets,
                models,
                session,
                config,
            }
        }

        fn model(&self, name: &str, bytes: &[u8]) -> PathBuf {
            let path = self.models.join(name);
            fs::write(&path, bytes).unwrap();
            path
        }

        fn state(&self) -> Arc<AppState> {
            Arc::new(AppState::new(Arc::clone(&self.session), &self.config))
        }

        fn router(&self) -> Router {
            router(self.state())
        }
    }

    async fn send(app: Router, method: Method, uri: &str, body: Body) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::ORIGIN, "http://localhost:8765")
            .body(body)
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, headers, bytes.to_vec())
    }

    async fn get(app: Router, uri: &str) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
        send(app, Method::GET, uri, Body::empty()).await
    }

    async fn post_json(app: Router, uri: &str, json: serde_json::Value) -> (StatusCode, serde_json::Value) {
        let (status, _, body) = send(app, Method::POST, uri, Body::from(json.to_string())).await;
        (status, serde_json::from_slice(&body).unwrap())
    }

    mod pages {
        use super::*;

        #[tokio::test]
        async fn index_is_served_unmodified() {
            let fx = Fixture::new();
            for uri in ["/", "/index.html", "/index.html?file=%2Fmodel%2Fa.glb"] {
                let (status, headers, body) = get(fx.router(), uri).await;
                assert_eq!(status, StatusCode::OK);
                assert_eq!(body, b"<html>viewer</html>");
                assert!(headers[header::CONTENT_TYPE].to_str().unwrap().starts_with("text/html"));
            }
        }

        #[tokio::test]
        async fn index_is_read_fresh_each_time() {
            let fx = Fixture::new();
            let app = fx.router();
            get(app.clone(), "/").await;
            fs::write(fx.assets.join("index.html"), "<html>v2</html>").unwrap();
            let (_, _, body) = get(app, "/").await;
            assert_eq!(body, b"<html>v2</html>");
        }

        #[tokio::test]
        async fn missing_index_gets_placeholder() {
            let fx = Fixture::new();
            fs::remove_file(fx.assets.join("index.html")).unwrap();
            let (status, _, body) = get(fx.router(), "/").await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body, b"<html><body><h1>Viewer not found</h1></body></html>");
        }
    }

    mod models {
        use super::*;

        #[tokio::test]
        async fn round_trip_is_byte_identical() {
            let fx = Fixture::new();
            let bytes: Vec<u8> = (0..1000u32).map(|i| (i % 251) as u8).collect();
            let path = fx.model("car.glb", &bytes);
            fx.session.load_file(&path, LoadOrigin::Desktop).unwrap();

            let (status, headers, body) = get(fx.router(), "/model/car.glb").await;

            assert_eq!(status, StatusCode::OK);
            assert_eq!(headers[header::CONTENT_LENGTH], "1000");
            assert_eq!(headers[header::CONTENT_TYPE], "model/gltf-binary");
            assert_eq!(body, bytes);
        }

        #[tokio::test]
        async fn gltf_content_type() {
            let fx = Fixture::new();
            let path = fx.model("scene.gltf", b"{\"asset\":{\"version\":\"2.0\"}}");
            fx.session.load_file(&path, LoadOrigin::Desktop).unwrap();

            let (_, headers, _) = get(fx.router(), "/model/scene.gltf").await;
            assert_eq!(headers[header::CONTENT_TYPE], "model/gltf+json");
        }

        #[tokio::test]
        async fn non_active_known_file_is_served() {
            let fx = Fixture::new();
            let a = fx.model("a.glb", b"first");
            let b = fx.model("b.glb", b"second");
            fx.session.load_file(&a, LoadOrigin::Desktop).unwrap();
            fx.session.load_file(&b, LoadOrigin::Renderer).unwrap();

            let (status, _, body) = get(fx.router(), "/model/a.glb").await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body, b"first");
        }

        #[tokio::test]
        async fn head_has_headers_but_no_body() {
            let fx = Fixture::new();
            let path = fx.model("car.glb", &[1u8; 300]);
            fx.session.load_file(&path, LoadOrigin::Desktop).unwrap();

            let (status, headers, body) =
                send(fx.router(), Method::HEAD, "/model/car.glb", Body::empty()).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(headers[header::CONTENT_LENGTH], "300");
            assert!(body.is_empty());
        }

        #[tokio::test]
        async fn missing_model_is_plain_404() {
            let fx = Fixture::new();
            let (status, headers, body) = get(fx.router(), "/model/missing.glb").await;
            assert_eq!(status, StatusCode::NOT_FOUND);
            assert_eq!(body, b"Model file not found");
            assert_eq!(headers[header::CONTENT_TYPE], "text/plain");
        }

        #[tokio::test]
        async fn cleared_session_serves_nothing() {
            let fx = Fixture::new();
            let path = fx.model("car.glb", b"glTF");
            fx.session.load_file(&path, LoadOrigin::Desktop).unwrap();
            fx.session.clear();

            let (status, _, _) = get(fx.router(), "/model/car.glb").await;
            assert_eq!(status, StatusCode::NOT_FOUND);
        }
    }

    mod static_assets {
        use super::*;

        #[tokio::test]
        async fn serves_with_extension_content_type() {
            let fx = Fixture::new();
            let (status, headers, body) = get(fx.router(), "/app.js").await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(headers[header::CONTENT_TYPE], "application/javascript");
            assert_eq!(body, b"console.log(1)");
        }

        #[tokio::test]
        async fn cacheable_assets_are_memoized() {
            let fx = Fixture::new();
            let state = fx.state();
            let app = router(Arc::clone(&state));

            get(app.clone(), "/app.js").await;
            assert_eq!(state.cache.len(), 1);

            // Served from memory even after the file changes on disk.
            fs::write(fx.assets.join("app.js"), "changed").unwrap();
            let (_, _, body) = get(app, "/app.js").await;
            assert_eq!(body, b"console.log(1)");
        }

        #[tokio::test]
        async fn decoder_alias_is_served() {
            let fx = Fixture::new();
            let (status, _, body) = get(fx.router(), "/draco_decoder.js").await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body, b"// decoder");
        }

        #[tokio::test]
        async fn traversal_is_404() {
            let fx = Fixture::new();
            for uri in ["/../secret.txt", "/%2e%2e/secret.txt", "/..%5Csecret.txt"] {
                let (status, _, body) = get(fx.router(), uri).await;
                assert_eq!(status, StatusCode::NOT_FOUND, "{}", uri);
                assert!(body.is_empty());
            }
        }

        #[tokio::test]
        async fn probe_paths_are_404() {
            let fx = Fixture::new();
            let (status, _, _) =
                get(fx.router(), "/.well-known/appspecific/com.chrome.devtools.json").await;
            assert_eq!(status, StatusCode::NOT_FOUND);
        }
    }

    mod cors {
        use super::*;

        #[tokio::test]
        async fn responses_allow_any_origin() {
            let fx = Fixture::new();
            let (_, headers, _) = get(fx.router(), "/model/missing.glb").await;
            assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        }

        #[tokio::test]
        async fn options_is_answered_generically() {
            let fx = Fixture::new();
            for uri in ["/api/add-model", "/model/car.glb", "/anything/else"] {
                let (status, headers, _) =
                    send(fx.router(), Method::OPTIONS, uri, Body::empty()).await;
                assert_eq!(status, StatusCode::OK, "{}", uri);
                assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
                let methods = headers[header::ACCESS_CONTROL_ALLOW_METHODS].to_str().unwrap();
                assert!(methods.contains("POST"));
                assert!(methods.contains("HEAD"));
            }
        }
    }

    mod api {
        use super::*;

        /// Runs a fake UI thread that ticks the broker with a fixed answer.
        struct UiThread {
            stop: Arc<AtomicBool>,
            handle: Option<std::thread::JoinHandle<()>>,
        }

        struct FixedPicker(Option<PathBuf>);

        impl FilePicker for FixedPicker {
            fn pick_file(&self, _prompt: &DialogPrompt) -> Option<PathBuf> {
                self.0.clone()
            }
            fn confirm_large_file(&self, _path: &Path, _size_bytes: u64) -> bool {
                true
            }
        }

        impl UiThread {
            fn spawn(broker: Arc<DialogBroker>, answer: Option<PathBuf>) -> Self {
                broker.attach_consumer();
                let stop = Arc::new(AtomicBool::new(false));
                let flag = Arc::clone(&stop);
                let handle = std::thread::spawn(move || {
                    let picker = FixedPicker(answer);
                    while !flag.load(Ordering::SeqCst) {
                        broker.tick(&picker);
                        std::thread::sleep(Duration::from_millis(5));
                    }
                });
                Self {
                    stop,
                    handle: Some(handle),
                }
            }
        }

        impl Drop for UiThread {
            fn drop(&mut self) {
                self.stop.store(true, Ordering::SeqCst);
                if let Some(handle) = self.handle.take() {
                    let _ = handle.join();
                }
            }
        }

        fn broker() -> Arc<DialogBroker> {
            Arc::new(DialogBroker::new(
                BrokerConfig::default().request_timeout(Duration::from_secs(5)),
            ))
        }

        #[tokio::test]
        async fn add_model_without_app_is_500() {
            let fx = Fixture::new();
            let (status, json) = post_json(fx.router(), "/api/add-model", serde_json::json!({})).await;
            assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
            assert_eq!(
                json,
                serde_json::json!({"success": false, "error": "Desktop app not available"})
            );
        }

        #[tokio::test]
        async fn add_model_with_detached_ui_is_500() {
            let fx = Fixture::new();
            let state = Arc::new(AppState::new(Arc::clone(&fx.session), &fx.config).with_dialogs(broker()));
            let (status, _) = post_json(router(state), "/api/add-model", serde_json::json!({})).await;
            assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        }

        #[tokio::test(flavor = "multi_thread")]
        async fn add_model_registers_picked_file() {
            let fx = Fixture::new();
            let path = fx.model("wheel.glb", &[0u8; 123]);
            let broker = broker();
            let _ui = UiThread::spawn(Arc::clone(&broker), Some(path));
            let state = Arc::new(AppState::new(Arc::clone(&fx.session), &fx.config).with_dialogs(broker));
            let mut events = fx.session.events().subscribe();

            let (status, json) = post_json(router(state), "/api/add-model", serde_json::json!({})).await;

            assert_eq!(status, StatusCode::OK);
            assert_eq!(
                json,
                serde_json::json!({
                    "success": true,
                    "fileUrl": "/model/wheel.glb",
                    "fileName": "wheel.glb",
                    "fileSize": 123
                })
            );
            assert_eq!(fx.session.active_file().unwrap().display_name(), "wheel.glb");
            assert_eq!(
                events.try_recv().unwrap(),
                SessionEvent::SceneChanged {
                    file_name: "wheel.glb".into(),
                    origin: LoadOrigin::Renderer,
                }
            );
        }

        #[tokio::test(flavor = "multi_thread")]
        async fn add_model_cancel_is_200_failure() {
            let fx = Fixture::new();
            let broker = broker();
            let _ui = UiThread::spawn(Arc::clone(&broker), None);
            let state = Arc::new(AppState::new(Arc::clone(&fx.session), &fx.config).with_dialogs(broker));

            let (status, json) = post_json(router(state), "/api/add-model", serde_json::json!({})).await;

            assert_eq!(status, StatusCode::OK);
            assert_eq!(json, serde_json::json!({"success": false, "error": "No file selected"}));
            assert!(fx.session.active_file().is_none());
        }

        #[tokio::test]
        async fn capture_image_saves_under_part_folder() {
            let fx = Fixture::new();
            let export = fx._dir.path().join("export");
            fs::create_dir_all(&export).unwrap();
            fx.session.set_export_folder(&export).unwrap();

            let (status, json) = post_json(
                fx.router(),
                "/api/capture-image",
                serde_json::json!({
                    "imageData": "data:image/png;base64,iVBORw0KGgo=",
                    "partName": "Front Bumper"
                }),
            )
            .await;

            let expected = export.join("Front Bumper").join("Front.png");
            assert_eq!(status, StatusCode::OK);
            assert_eq!(json["success"], true);
            assert_eq!(json["filePath"], &*expected.to_string_lossy());
            assert_eq!(json["fileName"], "Front.png");
            assert_eq!(json["message"], "Image saved to Front.png");
            assert!(expected.is_file());
        }

        #[tokio::test]
        async fn capture_without_export_folder_is_400() {
            let fx = Fixture::new();
            let (status, json) = post_json(
                fx.router(),
                "/api/capture-image",
                serde_json::json!({"imageData": "iVBORw0KGgo="}),
            )
            .await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(json["error"], "Export folder not set or does not exist");
        }

        #[tokio::test]
        async fn capture_rejects_bad_bodies() {
            let fx = Fixture::new();
            let (status, _, body) =
                send(fx.router(), Method::POST, "/api/capture-image", Body::empty()).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
            assert_eq!(json["error"], "No image data provided");

            let (status, _, body) =
                send(fx.router(), Method::POST, "/api/capture-image", Body::from("{not json")).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
            assert!(json["error"].as_str().unwrap().starts_with("Invalid JSON"));
        }

        #[tokio::test]
        async fn renderer_reports_reach_the_session() {
            let fx = Fixture::new();
            let mut events = fx.session.events().subscribe();

            let (status, _) = post_json(
                fx.router(),
                "/api/model-loaded",
                serde_json::json!({"vertices": 12345, "faces": 6789, "isDraco": true}),
            )
            .await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(events.try_recv().unwrap().event_type(), "model:loaded");

            let (status, _) = post_json(
                fx.router(),
                "/api/model-error",
                serde_json::json!({"message": "Invalid GLB header"}),
            )
            .await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(
                fx.session.snapshot().last_error.as_deref(),
                Some("Invalid GLB header")
            );
        }

        #[tokio::test]
        async fn unknown_post_is_json_404() {
            let fx = Fixture::new();
            for uri in ["/api/nope", "/", "/model/a.glb"] {
                let (status, json) = post_json(fx.router(), uri, serde_json::json!({})).await;
                assert_eq!(status, StatusCode::NOT_FOUND, "{}", uri);
                assert_eq!(json, serde_json::json!({"error": "Not found"}));
            }
        }
    }

    mod lifecycle {
        use super::*;

        fn config(fx: &Fixture, start_port: u16, span: u16) -> ServerConfig {
            fx.config
                .clone()
                .ports(start_port, span)
                .host("127.0.0.1")
        }

        fn http_get(port: u16, path: &str) -> String {
            let mut stream = TcpStream::connect(("127.0.0.1", port)).unwrap();
            write!(
                stream,
                "GET {} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
                path
            )
            .unwrap();
            let mut response = String::new();
            stream.read_to_string(&mut response).unwrap();
            response
        }

        #[test]
        fn exhausted_ports_leave_server_stopped() {
            let fx = Fixture::new();
            let ports = 38765..38768u16;
            // Whatever we cannot bind is already taken by someone else.
            let _held: Vec<_> = ports
                .clone()
                .filter_map(|p| std::net::TcpListener::bind(("127.0.0.1", p)).ok())
                .collect();

            let server = ViewerServer::new(config(&fx, 38765, 3), fx.state());
            let err = server.start().unwrap_err();

            assert!(matches!(
                err,
                ServeError::PortExhausted {
                    start: 38765,
                    end: 38767
                }
            ));
            assert!(!server.is_running());
            assert_eq!(fx.session.server_state(), ServerState::Stopped);
        }

        #[test]
        fn skips_occupied_port() {
            let fx = Fixture::new();
            let busy = std::net::TcpListener::bind(("127.0.0.1", 0)).unwrap();
            let busy_port = busy.local_addr().unwrap().port();

            let server = ViewerServer::new(config(&fx, busy_port, 2), fx.state());
            match server.start() {
                Ok(port) => assert_eq!(port, busy_port + 1),
                // The neighbour may be taken too on a busy machine.
                Err(e) => assert!(matches!(e, ServeError::PortExhausted { .. })),
            }
        }

        #[test]
        fn start_serve_stop_restart() {
            let fx = Fixture::new();
            let path = fx.model("car.glb", b"0123456789");
            fx.session.load_file(&path, LoadOrigin::Desktop).unwrap();

            let server = ViewerServer::new(config(&fx, 39170, 10), fx.state());
            let port = server.start().unwrap();
            assert_eq!(fx.session.server_state(), ServerState::Running);
            assert_eq!(server.start().unwrap(), port);
            assert!(server.wait_until_ready());

            let response = http_get(port, "/model/car.glb");
            assert!(response.starts_with("HTTP/1.1 200"));
            assert!(response.to_ascii_lowercase().contains("content-length: 10"));
            assert!(response.ends_with("0123456789"));

            assert!(server.stop());
            assert!(!server.stop());
            assert_eq!(fx.session.server_state(), ServerState::Stopped);
            assert_eq!(fx.session.viewer_url(), None);

            let port = server.start().unwrap();
            assert_eq!(
                fx.session.viewer_url().unwrap(),
                format!("http://localhost:{}/index.html?file=%2Fmodel%2Fcar.glb", port)
            );
            assert!(server.stop());
        }

        #[test]
        fn clients_dropping_mid_stream_do_not_hurt_the_server() {
            let fx = Fixture::new();
            let path = fx.model("big.glb", &vec![0x5au8; 4 * 1024 * 1024]);
            fx.session.load_file(&path, LoadOrigin::Desktop).unwrap();

            let config = config(&fx, 39190, 10).chunk_size(1024);
            let state = Arc::new(AppState::new(Arc::clone(&fx.session), &config));
            let server = ViewerServer::new(config, state);
            let port = server.start().unwrap();
            assert!(server.wait_until_ready());

            for _ in 0..5 {
                let mut stream = TcpStream::connect(("127.0.0.1", port)).unwrap();
                write!(
                    stream,
                    "GET /model/big.glb HTTP/1.1\r\nHost: localhost\r\n\r\n"
                )
                .unwrap();
                let mut partial = [0u8; 4096];
                let read = stream.read(&mut partial).unwrap();
                assert!(read > 0);
                // Closing with unread data pending resets the connection.
                drop(stream);
            }

            let mut stream = TcpStream::connect(("127.0.0.1", port)).unwrap();
            write!(
                stream,
                "HEAD /model/big.glb HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n"
            )
            .unwrap();
            let mut response = String::new();
            stream.read_to_string(&mut response).unwrap();
            assert!(response.starts_with("HTTP/1.1 200 OK"));
            assert!(response
                .to_ascii_lowercase()
                .contains(&format!("content-length: {}", 4 * 1024 * 1024)));

            assert!(server.is_running());
            assert!(server.stop());
        }

        #[test]
        fn failed_start_releases_port_and_thread() {
            let fx = Fixture::new();
            // Another owner already moved the shared session along.
            fx.session
                .transition_server(ServerState::Starting, Some(1))
                .unwrap();
            fx.session
                .transition_server(ServerState::Running, Some(1))
                .unwrap();

            let server = ViewerServer::new(config(&fx, 39205, 1), fx.state());
            let err = server.start().unwrap_err();

            assert!(matches!(err, ServeError::Session(_)));
            assert!(!server.is_running());
            assert!(std::net::TcpListener::bind(("127.0.0.1", 39205)).is_ok());
        }

        #[test]
        fn unreachable_port_reports_false() {
            let probe = std::net::TcpListener::bind(("127.0.0.1", 0)).unwrap();
            let port = probe.local_addr().unwrap().port();
            drop(probe);
            assert!(!wait_until_reachable(
                "127.0.0.1",
                port,
                2,
                Duration::from_millis(10)
            ));
        }
    }
}
