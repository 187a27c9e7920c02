mod console;
mod picker;
mod shell;

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use gltf_desk_core::{
    BrokerConfig, BrowserRenderer, DialogBroker, EventBus, LoadOrigin, ServerConfig,
    SessionController,
};
use gltf_desk_http::{AppState, ViewerServer};

use crate::console::Command;
use crate::picker::RfdPicker;
use crate::shell::Desktop;

#[derive(Parser, Debug)]
#[command(name = "gltf-desk")]
#[command(about = "Desktop controller and local model server for a browser GLTF/GLB viewer")]
struct Cli {
    /// Host to bind the model server to
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// First port to try
    #[arg(short, long, default_value = "8765")]
    port: u16,

    /// How many consecutive ports to try
    #[arg(long, default_value = "10")]
    port_span: u16,

    /// Directory holding the viewer page and its assets
    #[arg(long, default_value = "viewer")]
    assets: PathBuf,

    /// Folder captured images are written to
    #[arg(short, long)]
    export_folder: Option<PathBuf>,

    /// Open the viewer in the browser on startup
    #[arg(long)]
    open: bool,

    /// External viewer command line; `{file}` is replaced by the model path
    #[arg(long)]
    external_viewer: Option<String>,

    /// Append log output to this file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Models to load on startup
    models: Vec<PathBuf>,
}

fn init_logging(log_file: Option<&PathBuf>) -> std::io::Result<()> {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if let Some(path) = log_file {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }
    builder.init();
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(e) = init_logging(cli.log_file.as_ref()) {
        eprintln!("Cannot open log file: {}", e);
        return ExitCode::FAILURE;
    }

    let events = Arc::new(EventBus::new());
    let session = Arc::new(SessionController::new(Arc::clone(&events)));
    let broker = Arc::new(DialogBroker::new(BrokerConfig::default()));

    let config = ServerConfig::new(cli.assets.clone())
        .host(cli.host.as_str())
        .ports(cli.port, cli.port_span);
    if !config.asset_root.join("index.html").is_file() {
        log::warn!("No index.html under {}", config.asset_root.display());
    }
    let state = Arc::new(
        AppState::new(session, &config).with_dialogs(Arc::clone(&broker)),
    );

    let renderer = Arc::new(BrowserRenderer::new(events));
    let mut desktop = Desktop::new(
        ViewerServer::new(config, state),
        broker,
        renderer,
        RfdPicker,
        cli.external_viewer,
    );

    if let Some(folder) = &cli.export_folder {
        if let Err(e) = desktop.session().set_export_folder(folder) {
            log::error!("{}", e);
        }
    }

    // Serve for the whole session; renderers may connect at any time.
    if let Err(e) = desktop.server().start() {
        log::error!("Model server not started: {}", e);
    }

    let mut loaded_any = false;
    for model in &cli.models {
        match desktop.session().load_file(model, LoadOrigin::Desktop) {
            Ok(_) => loaded_any = true,
            Err(e) => log::error!("{}", e),
        }
    }
    if cli.open || loaded_any {
        if let Err(e) = desktop.execute(Command::Browser) {
            log::error!("{}", e);
        }
    }

    println!("gltf-desk ready. Type 'help' for commands.");
    desktop.run(console::spawn_stdin_reader());
    ExitCode::SUCCESS
}
