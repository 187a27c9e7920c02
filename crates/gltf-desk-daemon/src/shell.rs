//! The desktop controller loop.
//!
//! Owns the main thread: services queued dialog requests, executes console
//! commands and echoes session events as status lines.

use std::sync::{mpsc, Arc};

use gltf_desk_core::external;
use gltf_desk_core::{
    BrowserRenderer, DialogBroker, DialogMode, DialogPrompt, LoadOrigin, ModelFile, RendererSession,
    SessionController, SessionEvent, TickOutcome,
};
use gltf_desk_http::ViewerServer;
use tokio::sync::broadcast::{self, error::TryRecvError};

use crate::console::{self, Command};
use crate::picker::DesktopPicker;

/// Whether the loop keeps going after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

pub struct Desktop<P: DesktopPicker> {
    session: Arc<SessionController>,
    broker: Arc<DialogBroker>,
    server: ViewerServer,
    renderer: Arc<BrowserRenderer>,
    picker: P,
    external_viewer: Option<String>,
    events: broadcast::Receiver<SessionEvent>,
    browser_open: bool,
}

impl<P: DesktopPicker> Desktop<P> {
    pub fn new(
        server: ViewerServer,
        broker: Arc<DialogBroker>,
        renderer: Arc<BrowserRenderer>,
        picker: P,
        external_viewer: Option<String>,
    ) -> Self {
        let session = Arc::clone(&server.state().session);
        let events = session.events().subscribe();
        session.attach_renderer(Arc::clone(&renderer) as Arc<dyn RendererSession>);
        Self {
            session,
            broker,
            server,
            renderer,
            picker,
            external_viewer,
            events,
            browser_open: false,
        }
    }

    pub fn session(&self) -> &Arc<SessionController> {
        &self.session
    }

    pub fn server(&self) -> &ViewerServer {
        &self.server
    }

    /// Run until `quit`. Input closing does not end the loop; the
    /// controller keeps serving dialogs for the renderer.
    pub fn run(mut self, commands: mpsc::Receiver<String>) {
        self.broker.attach_consumer();
        let tick_interval = self.broker.config().tick_interval;
        let mut input_open = true;

        'ui: loop {
            if let TickOutcome::Serviced { selected } = self.broker.tick(&self.picker) {
                log::debug!("Dialog serviced, file selected: {}", selected);
            }

            while input_open {
                match commands.try_recv() {
                    Ok(line) => {
                        if self.handle_line(&line) == Flow::Quit {
                            break 'ui;
                        }
                    }
                    Err(mpsc::TryRecvError::Empty) => break,
                    Err(mpsc::TryRecvError::Disconnected) => {
                        log::info!("Command input closed; still serving, stop with Ctrl-C");
                        input_open = false;
                    }
                }
            }

            self.drain_events();
            std::thread::sleep(tick_interval);
        }

        self.broker.detach_consumer();
        self.server.stop();
        self.drain_events();
    }

    fn handle_line(&mut self, line: &str) -> Flow {
        match console::parse(line) {
            Ok(Some(command)) => match self.execute(command) {
                Ok(flow) => flow,
                Err(message) => {
                    self.session.publish_status(format!("Error: {}", message));
                    Flow::Continue
                }
            },
            Ok(None) => Flow::Continue,
            Err(message) => {
                println!("{}", message);
                Flow::Continue
            }
        }
    }

    /// Execute one toolbar command on the UI thread.
    pub fn execute(&mut self, command: Command) -> Result<Flow, String> {
        match command {
            Command::Open(path) => {
                self.session
                    .load_file(&path, LoadOrigin::Desktop)
                    .map_err(|e| e.to_string())?;
                self.present()?;
            }
            Command::Browse => self.pick_and_load(DialogMode::Open)?,
            Command::Add => self.pick_and_load(DialogMode::Add)?,
            Command::Clear => self.session.clear(),
            Command::Browser => self.open_browser()?,
            Command::Stop => {
                if self.server.stop() {
                    self.browser_open = false;
                } else {
                    self.session.publish_status("Server is not running");
                }
            }
            Command::Export(folder) => {
                let folder = match folder {
                    Some(folder) => folder,
                    None => match self.picker.pick_folder("Select Export Folder") {
                        Some(folder) => folder,
                        None => return Ok(Flow::Continue),
                    },
                };
                self.session
                    .set_export_folder(&folder)
                    .map_err(|e| e.to_string())?;
            }
            Command::External => {
                let active = self
                    .session
                    .active_file()
                    .ok_or_else(|| "No model loaded".to_string())?;
                external::open_in_external_viewer(active.path(), self.external_viewer.as_deref())
                    .map_err(|e| e.to_string())?;
                self.session.publish_status(format!(
                    "Opened {} in external viewer",
                    active.display_name()
                ));
            }
            Command::Status => println!("{}", self.status_report()),
            Command::Reset => self.session.reset_view().map_err(|e| e.to_string())?,
            Command::Wireframe => self.session.toggle_wireframe().map_err(|e| e.to_string())?,
            Command::Help => println!("{}", console::HELP),
            Command::Quit => return Ok(Flow::Quit),
        }
        Ok(Flow::Continue)
    }

    /// Native dialog straight from the UI thread; no broker round trip.
    fn pick_and_load(&mut self, mode: DialogMode) -> Result<(), String> {
        let prompt = DialogPrompt::new(mode);
        let Some(path) = self.picker.pick_file(&prompt) else {
            return Ok(());
        };
        let file = ModelFile::from_path(&path).map_err(|e| format!("{}: {}", path.display(), e))?;
        if file.size_bytes() > self.broker.config().large_file_threshold
            && !self.picker.confirm_large_file(file.path(), file.size_bytes())
        {
            self.session.publish_status("Load cancelled");
            return Ok(());
        }
        self.session.load_model(file, LoadOrigin::Desktop);
        self.present()
    }

    /// Make sure a renderer shows the active file. An already open page
    /// follows the scene change over its event socket.
    fn present(&mut self) -> Result<(), String> {
        if self.browser_open && self.server.is_running() {
            return Ok(());
        }
        self.open_browser()
    }

    fn open_browser(&mut self) -> Result<(), String> {
        self.server.start().map_err(|e| e.to_string())?;
        if !self.server.wait_until_ready() {
            log::warn!("Model server not answering yet, opening the viewer anyway");
        }
        let url = self
            .session
            .viewer_url()
            .ok_or_else(|| "Server is not running".to_string())?;
        self.renderer.show(&url).map_err(|e| e.to_string())?;
        self.browser_open = true;
        Ok(())
    }

    fn status_report(&self) -> String {
        let snapshot = self.session.snapshot();
        let mut lines = Vec::new();
        lines.push(match snapshot.server_port {
            Some(port) => format!("Server: {} on port {}", snapshot.server_state, port),
            None => format!("Server: {}", snapshot.server_state),
        });
        lines.push(match &snapshot.active {
            Some(file) => format!(
                "Active: {} ({})",
                file.path().display(),
                gltf_desk_core::model::format_file_size(file.size_bytes())
            ),
            None => "Active: none".to_string(),
        });
        for entry in &snapshot.loaded {
            lines.push(format!(
                "  {} [{}]",
                entry.file.display_name(),
                entry.origin
            ));
        }
        lines.push(format!(
            "Export folder: {}",
            snapshot
                .export_folder
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "not set".to_string())
        ));
        if let Some(stats) = &snapshot.last_stats {
            lines.push(stats.summary());
        }
        if let Some(error) = &snapshot.last_error {
            lines.push(format!("Last error: {}", error));
        }
        lines.join("\n")
    }

    fn drain_events(&mut self) {
        loop {
            match self.events.try_recv() {
                Ok(event) => {
                    if let Some(line) = status_line(&event) {
                        println!("{}", line);
                    }
                }
                Err(TryRecvError::Lagged(count)) => {
                    log::warn!("Status line missed {} events", count);
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
    }
}

/// Status-line text for an event. Renderer commands are not shown.
pub fn status_line(event: &SessionEvent) -> Option<String> {
    let line = match event {
        SessionEvent::SceneChanged { file_name, origin } => {
            format!("Loaded: {} ({})", file_name, origin)
        }
        SessionEvent::ModelLoaded { stats, .. } => stats.summary(),
        SessionEvent::ModelError { message } => format!("Error loading model: {}", message),
        SessionEvent::SessionCleared => "Scene cleared".to_string(),
        SessionEvent::ServerState { state, port } => match port {
            Some(port) => format!("Server {} on port {}", state, port),
            None => format!("Server {}", state),
        },
        SessionEvent::Status { message } => message.clone(),
        SessionEvent::RendererCommand { .. } => return None,
    };
    Some(line)
}
