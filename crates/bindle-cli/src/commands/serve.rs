//! `bindle serve` command implementation.
//!
//! Development server that keeps the latest build output in memory and serves
//! it over HTTP. A file watcher triggers rebuilds; connected browsers are told
//! to reload over a WebSocket at `/ws`.
//!
//! ```text
//! file change -> debounced watcher -> rebuild (blocking task)
//!   ok  -> swap output set, broadcast {"type":"reload"}
//!   err -> keep last good output, broadcast {"type":"error",...}
//! ```

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::{StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use bindle_core::plugin::{DefinePlugin, HtmlTemplatePlugin, ReloadClientPlugin};
use bindle_core::{BuildConfig, BuildOutput, Bundler, Mode, SERVE_ENV_VAR};
use miette::{IntoDiagnostic, Result};
use notify::{Config, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, RwLock};

/// Dev server action.
#[derive(Debug, Clone)]
pub struct ServeAction {
    /// Working directory (project root).
    pub cwd: PathBuf,
    /// Entry point file (None = default `src/main.tsx`).
    pub entry: Option<PathBuf>,
    /// Host to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// Mode (e.g. "development", "production").
    pub mode: String,
}

/// Shared server state.
struct ServeState {
    /// Latest successful build output.
    output: RwLock<Option<BuildOutput>>,
    /// Message from the last failed build, shown as an overlay in the browser.
    last_error: RwLock<Option<String>>,
    /// Broadcast channel for reload messages.
    reload_tx: broadcast::Sender<ReloadMessage>,
}

/// Messages sent to connected browsers over `/ws`.
#[derive(Debug, Clone)]
enum ReloadMessage {
    /// Connected confirmation.
    Connected,
    /// Full page reload after a successful rebuild.
    Reload,
    /// Build error.
    Error { message: String },
}

impl ReloadMessage {
    fn to_json(&self) -> String {
        match self {
            ReloadMessage::Connected => r#"{"type":"connected"}"#.to_string(),
            ReloadMessage::Reload => r#"{"type":"reload"}"#.to_string(),
            ReloadMessage::Error { message } => {
                format!(
                    r#"{{"type":"error","message":"{}"}}"#,
                    message.replace('\\', "\\\\").replace('"', "\\\"")
                )
            }
        }
    }
}

/// Run the dev server.
pub async fn run(action: ServeAction) -> Result<()> {
    // Mode detection treats the serve environment variable as "development";
    // set it before any config is assembled so plugins agree.
    std::env::set_var(SERVE_ENV_VAR, "1");

    let cwd = dunce::canonicalize(&action.cwd).into_diagnostic()?;
    let mode = Mode::detect(Some(&action.mode));
    let config = super::project_config(&cwd, action.entry.as_ref(), mode, None);

    let mut bundler = Bundler::new(&config);
    bundler.add_plugin(Box::new(DefinePlugin::new(config.defines.clone())));
    bundler.add_plugin(Box::new(HtmlTemplatePlugin::default()));
    bundler.add_plugin(Box::new(ReloadClientPlugin::new(
        action.host.clone(),
        action.port,
    )));
    let bundler = Arc::new(bundler);

    let (reload_tx, _) = broadcast::channel::<ReloadMessage>(16);
    let state = Arc::new(ServeState {
        output: RwLock::new(None),
        last_error: RwLock::new(None),
        reload_tx: reload_tx.clone(),
    });

    // Initial build. A failure does not stop the server; the error is shown
    // in the browser and cleared on the next successful rebuild.
    match bundler.build(&config) {
        Ok(output) => {
            for warning in &output.warnings {
                eprintln!("  warning: {warning}");
            }
            println!("  Built {} modules", output.modules);
            *state.output.write().await = Some(output);
        }
        Err(e) => {
            eprintln!("  Build error: {e}");
            *state.last_error.write().await = Some(e.to_string());
        }
    }

    // File watcher on a dedicated thread; notify's watcher is not async.
    let (file_change_tx, mut file_change_rx) = mpsc::channel::<Vec<PathBuf>>(16);
    let watch_cwd = cwd.clone();
    std::thread::spawn(move || {
        if let Err(e) = watch_files(watch_cwd, file_change_tx) {
            eprintln!("  File watcher error: {e}");
        }
    });

    // Rebuild loop.
    let rebuild_state = state.clone();
    let rebuild_bundler = bundler.clone();
    let rebuild_config = config.clone();
    let rebuild_cwd = cwd.clone();
    tokio::spawn(async move {
        while let Some(changed) = file_change_rx.recv().await {
            for path in &changed {
                let shown = path.strip_prefix(&rebuild_cwd).unwrap_or(path);
                println!("  File changed: {}", shown.display());
            }

            let bundler = rebuild_bundler.clone();
            let config = rebuild_config.clone();
            let result = tokio::task::spawn_blocking(move || bundler.build(&config)).await;

            match result {
                Ok(Ok(output)) => {
                    for warning in &output.warnings {
                        eprintln!("  warning: {warning}");
                    }
                    println!("  Rebuilt {} modules", output.modules);
                    *rebuild_state.output.write().await = Some(output);
                    *rebuild_state.last_error.write().await = None;
                    let _ = rebuild_state.reload_tx.send(ReloadMessage::Reload);
                }
                Ok(Err(e)) => {
                    eprintln!("  Build error: {e}");
                    let message = e.to_string();
                    *rebuild_state.last_error.write().await = Some(message.clone());
                    let _ = rebuild_state.reload_tx.send(ReloadMessage::Error { message });
                }
                Err(e) => {
                    eprintln!("  Rebuild task failed: {e}");
                }
            }
        }
    });

    let app = Router::new()
        .route("/", get(serve_index))
        .route("/ws", get(reload_websocket))
        .fallback(serve_output)
        .layer(tower_http::cors::CorsLayer::permissive())
        .with_state(state);

    let addr = server_addr(&action.host, action.port).into_diagnostic()?;

    println!();
    println!("  Dev server running at http://{}:{}", action.host, action.port);
    println!("  Live reload enabled");
    println!();
    println!("  Press Ctrl+C to stop");
    println!();

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .into_diagnostic()?;
    axum::serve(listener, app).await.into_diagnostic()?;

    Ok(())
}

/// Resolve a host/port pair to a socket address. "localhost" binds loopback.
fn server_addr(host: &str, port: u16) -> std::result::Result<SocketAddr, std::net::AddrParseError> {
    let host_ip = if host == "localhost" { "127.0.0.1" } else { host };
    format!("{host_ip}:{port}").parse()
}

// ============================================================================
// Route Handlers
// ============================================================================

/// Serve the generated index page.
async fn serve_index(State(state): State<Arc<ServeState>>) -> Response {
    respond_with_file(&state, "index.html").await
}

/// Serve a file from the in-memory output set. Extensionless paths fall back
/// to index.html so client-side routing works on refresh.
async fn serve_output(State(state): State<Arc<ServeState>>, uri: Uri) -> Response {
    let path = uri.path().trim_start_matches('/');

    {
        let output = state.output.read().await;
        if let Some(output) = output.as_ref() {
            if let Some(file) = output.get(path) {
                return file_response(file.content_type(), file.contents.clone());
            }
        }
    }

    let has_extension = path
        .rsplit('/')
        .next()
        .is_some_and(|segment| segment.contains('.'));
    if !has_extension {
        return respond_with_file(&state, "index.html").await;
    }

    (StatusCode::NOT_FOUND, format!("Not found: /{path}")).into_response()
}

async fn respond_with_file(state: &ServeState, name: &str) -> Response {
    let output = state.output.read().await;
    match output.as_ref().and_then(|o| o.get(name)) {
        Some(file) => file_response(file.content_type(), file.contents.clone()),
        None => {
            let error = state.last_error.read().await;
            let detail = error.as_deref().unwrap_or("no build output yet");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                format!("Build not available: {detail}"),
            )
                .into_response()
        }
    }
}

fn file_response(content_type: &'static str, contents: Vec<u8>) -> Response {
    Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", content_type)
        .header("Cache-Control", "no-cache")
        .body(axum::body::Body::from(contents))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

// ============================================================================
// WebSocket Live Reload
// ============================================================================

/// Handle WebSocket connections for live reload.
async fn reload_websocket(
    ws: WebSocketUpgrade,
    State(state): State<Arc<ServeState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_reload_socket(socket, state))
}

async fn handle_reload_socket(mut socket: WebSocket, state: Arc<ServeState>) {
    let mut rx = state.reload_tx.subscribe();

    let _ = socket
        .send(Message::Text(ReloadMessage::Connected.to_json()))
        .await;

    // A page opened while the build is broken gets the error right away.
    let pending_error = state.last_error.read().await.clone();
    if let Some(message) = pending_error {
        let _ = socket
            .send(Message::Text(ReloadMessage::Error { message }.to_json()))
            .await;
    }

    loop {
        tokio::select! {
            Ok(msg) = rx.recv() => {
                if socket.send(Message::Text(msg.to_json())).await.is_err() {
                    break;
                }
            }
            incoming = socket.recv() => {
                // Clients only ever close the socket; no inbound protocol.
                match incoming {
                    Some(Ok(_)) => {}
                    _ => break,
                }
            }
        }
    }
}

// ============================================================================
// File Watching
// ============================================================================

/// Check if a path should be ignored by the file watcher.
fn should_ignore(path: &std::path::Path) -> bool {
    let path_str = path.to_string_lossy();

    if path_str.contains("/node_modules/")
        || path_str.contains("/target/")
        || path_str.contains("/.git/")
        || path_str.contains("/dist/")
        || path_str.contains("/build/")
    {
        return true;
    }

    if let Some(name) = path.file_name() {
        if name.to_string_lossy().starts_with('.') {
            return true;
        }
    }

    false
}

/// Extensions that trigger a rebuild when touched.
fn is_relevant_ext(path: &std::path::Path) -> bool {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    matches!(
        ext,
        "ts" | "tsx"
            | "js"
            | "jsx"
            | "mjs"
            | "cjs"
            | "css"
            | "scss"
            | "sass"
            | "json"
            | "html"
            | "png"
            | "jpg"
            | "jpeg"
            | "gif"
            | "svg"
            | "webp"
            | "ico"
            | "woff"
            | "woff2"
            | "ttf"
            | "otf"
    )
}

/// Watch files for changes, debounced.
fn watch_files(cwd: PathBuf, file_change_tx: mpsc::Sender<Vec<PathBuf>>) -> Result<()> {
    let (tx, rx) = std::sync::mpsc::channel();

    let mut watcher = RecommendedWatcher::new(tx, Config::default()).into_diagnostic()?;
    watcher
        .watch(&cwd, RecursiveMode::Recursive)
        .into_diagnostic()?;

    let mut debounce_set: HashSet<PathBuf> = HashSet::new();
    let mut last_change = std::time::Instant::now();

    loop {
        match rx.recv() {
            Ok(Ok(event)) => {
                for path in event.paths {
                    if !should_ignore(&path) && is_relevant_ext(&path) {
                        debounce_set.insert(path);
                    }
                }

                if debounce_set.is_empty() {
                    continue;
                }

                let now = std::time::Instant::now();
                if now.duration_since(last_change).as_millis() < 50 {
                    continue;
                }
                last_change = now;

                let changed: Vec<PathBuf> = debounce_set.drain().collect();
                if file_change_tx.blocking_send(changed).is_err() {
                    break;
                }
            }
            Ok(Err(e)) => {
                eprintln!("  Watch error: {e}");
            }
            Err(_) => break,
        }
    }

    Ok(())
}
