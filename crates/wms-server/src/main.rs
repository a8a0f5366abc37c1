//! Window management service entry point.
//!
//! Wires the application layer to its infrastructure and runs until Ctrl-C.
//!
//! # Architecture
//!
//! ```text
//! main()
//!  └─ load config (--config / WMS_CONFIG / platform dir)
//!  └─ HeadlessBackend           -- one screen per [[screens]] entry
//!  └─ serial queues             -- screen, session, focus
//!  └─ ScreenRegistry, SessionRegistry, FocusArbiter, ScreenRotationResolver
//!  └─ WindowManagerService      -- RPC facade
//!  └─ tokio pumps
//!       ├─ backend screen events  -> screen queue
//!       └─ sensor readings (stdin) -> screen queue
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::io::BufReader;
use tokio::sync::mpsc;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use wms_core::protocol::service::SceneSessionService;
use wms_core::{DisplayMode, SerialTaskQueue};
use wms_server::application::focus_arbiter::FocusArbiter;
use wms_server::application::rotation_resolver::ScreenRotationResolver;
use wms_server::application::screen_registry::ScreenRegistry;
use wms_server::application::session_persistence::SessionStateStore;
use wms_server::application::session_registry::{SessionRegistry, WindowInfoSnapshot};
use wms_server::infrastructure::backend::headless::HeadlessBackend;
use wms_server::infrastructure::event_pump::{
    read_sensor_lines, spawn_screen_event_pump, spawn_sensor_pump,
};
use wms_server::infrastructure::rpc::{FacadeConfig, WindowManagerService};
use wms_server::infrastructure::storage::config::{
    config_file_path, load_config_from, save_config_to, AppConfig,
};
use wms_server::infrastructure::storage::kv_store::{KeyValueStore, MemoryStore, TomlFileStore};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Window management service.
///
/// Tracks screens and window sessions and arbitrates input focus.
#[derive(Debug, Parser)]
#[command(name = "wms-server", about = "Window management service", version)]
struct Cli {
    /// Path to the TOML configuration file.
    ///
    /// Defaults to `config.toml` in the platform config directory.
    #[arg(long, env = "WMS_CONFIG")]
    config: Option<PathBuf>,

    /// Read sensor readings from stdin, one angle in degrees per line.
    #[arg(long)]
    sensor_stdin: bool,

    /// Write the effective configuration to the config path and exit.
    #[arg(long)]
    write_config: bool,
}

impl Cli {
    fn config_path(&self) -> anyhow::Result<PathBuf> {
        match &self.config {
            Some(path) => Ok(path.clone()),
            None => config_file_path().context("no --config given and no platform config dir"),
        }
    }
}

fn open_session_store(config: &AppConfig) -> anyhow::Result<Arc<dyn KeyValueStore>> {
    match &config.storage.session_state_path {
        Some(path) => {
            let store = TomlFileStore::open(path)
                .with_context(|| format!("opening session state {}", path.display()))?;
            Ok(Arc::new(store))
        }
        None => Ok(Arc::new(MemoryStore::new())),
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config_path()?;
    let config = load_config_from(&config_path)
        .with_context(|| format!("loading config {}", config_path.display()))?;

    // `RUST_LOG` wins over the configured level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.server.log_level)),
        )
        .init();

    if cli.write_config {
        save_config_to(&config_path, &config)
            .with_context(|| format!("writing config {}", config_path.display()))?;
        info!("configuration written to {}", config_path.display());
        return Ok(());
    }

    info!("window management service starting (config {})", config_path.display());

    // ── Backend ───────────────────────────────────────────────────────────────
    let backend = Arc::new(HeadlessBackend::new());
    for screen in &config.screens {
        let id = backend.connect_screen(
            screen.name.clone(),
            vec![DisplayMode::new(screen.width, screen.height, screen.refresh_rate)],
            screen.density,
        );
        debug!("headless screen {} is backend {id}", screen.name);
    }

    // ── Queues ────────────────────────────────────────────────────────────────
    let screen_queue = SerialTaskQueue::spawn("wms-screen").context("spawning screen queue")?;
    let session_queue = SerialTaskQueue::spawn("wms-session").context("spawning session queue")?;
    let focus_queue = SerialTaskQueue::spawn("wms-focus").context("spawning focus queue")?;

    // ── Application layer ─────────────────────────────────────────────────────
    let store = open_session_store(&config)?;
    let persisted = SessionStateStore::new(Arc::clone(&store)).persisted_ids();
    if !persisted.is_empty() {
        info!("{} session(s) have persisted state", persisted.len());
    }

    let screens = Arc::new(ScreenRegistry::new(backend.clone()));
    let sessions = SessionRegistry::new(
        session_queue.clone(),
        SessionStateStore::new(store),
        config.timing.dirty_flush(),
    );
    sessions
        .window_info()
        .subscribe(Arc::new(|snapshot: &WindowInfoSnapshot| {
            debug!("window info: {} visible window(s)", snapshot.windows.len());
        }));
    let focus = FocusArbiter::new(
        Arc::clone(&sessions),
        focus_queue.clone(),
        config.timing.focus_request_timeout(),
    );
    let resolver = Arc::new(ScreenRotationResolver::new(
        Arc::clone(&screens),
        config.server.device_type.clone(),
        config.server.rotation_offset_degrees,
    ));
    let service = WindowManagerService::new(
        Arc::clone(&screens),
        sessions,
        focus,
        screen_queue.clone(),
        FacadeConfig {
            virtual_screen_timeout: config.timing.virtual_screen_timeout(),
            default_density: config.server.default_density,
        },
    );

    // ── Event pumps ───────────────────────────────────────────────────────────
    let screen_pump = spawn_screen_event_pump(backend.subscribe(), screens, screen_queue.clone());

    let sensor_pump = if cli.sensor_stdin {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            let readings = read_sensor_lines(BufReader::new(tokio::io::stdin()), tx).await;
            info!("sensor input closed after {readings} reading(s)");
        });
        Some(spawn_sensor_pump(rx, resolver, screen_queue.clone()))
    } else {
        None
    };

    info!("window management service ready.  Press Ctrl-C to exit.");

    // ── Shutdown ──────────────────────────────────────────────────────────────
    tokio::signal::ctrl_c()
        .await
        .context("listening for Ctrl-C")?;
    info!("shutdown signal received");

    screen_pump.abort();
    if let Some(pump) = sensor_pump {
        pump.abort();
    }
    debug!("final session state: {}", service.dump_session_all());
    drop(service);
    for queue in [&screen_queue, &session_queue, &focus_queue] {
        queue.shutdown();
    }

    info!("window management service stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
