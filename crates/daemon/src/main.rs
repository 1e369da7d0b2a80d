//! dyndesk Daemon
//!
//! Main daemon process for dynamic virtual desktops.
//!
//! Responsibilities:
//! - Watch the window manager for window and desktop changes
//! - Run one reconciliation pass per change, never two at once
//! - Re-read configuration before every pass
//! - Handle IPC commands from the CLI

mod config;

use anyhow::{Context, Result};
use clap::Parser;
use config::Config;
use dyndesk_core::{plan_pass, DesktopHost, Dispatch, Dispatcher, HostError, ReconcileReport, Trigger};
use dyndesk_ipc::{
    encode_line, socket_path, DesktopInfo, IpcCommand, IpcResponse, PassSummary,
    MAX_IPC_MESSAGE_SIZE,
};
use dyndesk_platform_x11::{install_event_watch, X11Host};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Events that the daemon event loop processes.
enum DaemonEvent {
    /// An IPC command from a CLI client.
    IpcCommand {
        cmd: IpcCommand,
        responder: oneshot::Sender<IpcResponse>,
    },
    /// A change notification from the window manager.
    Host(Trigger),
    /// Shutdown signal.
    Shutdown,
}

/// IPC read timeout - clients must send within this period.
const IPC_READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Capacity of the daemon event channel.
const EVENT_CHANNEL_CAPACITY: usize = 100;

/// Fallback written when a response cannot be serialized.
const SERIALIZATION_ERROR_LINE: &str =
    "{\"status\":\"error\",\"message\":\"Internal serialization error\"}\n";

#[derive(Parser)]
#[command(name = "dyndesk")]
#[command(author, version, about = "Keep virtual desktops in step with open windows")]
struct Args {
    /// Read configuration from this file instead of the standard locations
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

/// Where configuration is re-read from before each pass.
#[derive(Debug, PartialEq)]
enum ConfigSource {
    /// Search the standard locations.
    Search,
    /// A specific file.
    File(PathBuf),
    /// A fixed configuration that never changes.
    #[cfg(test)]
    Fixed(Config),
}

impl ConfigSource {
    fn from_args(args: &Args) -> Self {
        match &args.config {
            Some(path) => ConfigSource::File(path.clone()),
            None => ConfigSource::Search,
        }
    }

    fn load(&self) -> Result<Config> {
        match self {
            ConfigSource::Search => Config::load(),
            ConfigSource::File(path) => Config::load_from_path(path),
            #[cfg(test)]
            ConfigSource::Fixed(config) => Ok(config.clone()),
        }
    }
}

/// Application state.
struct AppState<H: DesktopHost> {
    /// The window manager.
    host: H,
    /// Runs passes under the reentrancy lock.
    dispatcher: Dispatcher,
    /// Last successfully loaded and validated configuration.
    config: Config,
    config_source: ConfigSource,
    /// Summary of the most recent completed pass.
    last_pass: Option<PassSummary>,
    /// Daemon start time for uptime reporting.
    start_time: Instant,
}

fn summarize(trigger: Trigger, report: &ReconcileReport) -> PassSummary {
    PassSummary {
        trigger: trigger.to_string(),
        removed_gaps: report.removed_gaps,
        truncated: report.truncated,
        appended: report.appended,
        relabeled: report.relabeled,
        desktop_count: report.desktop_count,
    }
}

impl<H: DesktopHost> AppState<H> {
    fn new(host: H, dispatcher: Dispatcher, config: Config, config_source: ConfigSource) -> Self {
        Self {
            host,
            dispatcher,
            config,
            config_source,
            last_pass: None,
            start_time: Instant::now(),
        }
    }

    /// Re-read configuration, replacing the current one only if it loads.
    fn reload_config(&mut self) -> Result<()> {
        let mut config = self.config_source.load()?;
        let warnings = config.validate();

        if config != self.config {
            for w in &warnings {
                warn!("Config: {} - {}", w.field, w.message);
            }
            info!(
                "Configuration changed: minimum_desktops={}, label_template=\"{}\"",
                config.desktops.minimum_desktops, config.desktops.label_template
            );
            self.config = config;
        }
        Ok(())
    }

    /// Run one pass with freshly read configuration.
    fn run_pass(&mut self, trigger: Trigger) -> Result<Dispatch, HostError> {
        if let Err(e) = self.reload_config() {
            warn!("Failed to re-read configuration: {:#}. Keeping previous values.", e);
        }

        debug!("Pass triggered by {}", trigger);
        let outcome = self
            .dispatcher
            .dispatch(&mut self.host, &self.config.reconcile_config())?;

        match &outcome {
            Dispatch::Completed(report) => {
                if report.changed_structure() {
                    info!(
                        "Pass ({}): removed {} gap(s), truncated {}, appended {} -> {} desktops",
                        trigger,
                        report.removed_gaps,
                        report.truncated,
                        report.appended,
                        report.desktop_count
                    );
                } else {
                    debug!("Pass ({}): {} desktops unchanged", trigger, report.desktop_count);
                }
                self.last_pass = Some(summarize(trigger, report));
            }
            Dispatch::Suppressed => debug!("Dropped {}: a pass is already running", trigger),
        }
        Ok(outcome)
    }

    /// Handle a host notification.
    ///
    /// Failed passes are logged and skipped; only a lost connection is returned.
    fn handle_trigger(&mut self, trigger: Trigger) -> Result<(), HostError> {
        match self.run_pass(trigger) {
            Ok(_) => Ok(()),
            Err(e @ HostError::Disconnected(_)) => Err(e),
            Err(e) => {
                error!("Pass triggered by {} failed: {}", trigger, e);
                Ok(())
            }
        }
    }

    fn query_desktops(&mut self) -> Result<IpcResponse, HostError> {
        self.host.refresh()?;
        let desktops = self
            .host
            .desktop_labels()?
            .into_iter()
            .enumerate()
            .map(|(i, label)| DesktopInfo { index: i + 1, label })
            .collect();
        Ok(IpcResponse::Desktops {
            current: self.host.current_desktop()?,
            desktops,
        })
    }

    /// Handle an IPC command and return a response.
    fn handle_command(&mut self, cmd: IpcCommand) -> IpcResponse {
        match cmd {
            IpcCommand::Reconcile => match self.run_pass(Trigger::Manual) {
                Ok(Dispatch::Completed(report)) => IpcResponse::PassCompleted {
                    summary: summarize(Trigger::Manual, &report),
                },
                Ok(Dispatch::Suppressed) => IpcResponse::error("A pass is already running"),
                Err(e) => IpcResponse::error(format!("Pass failed: {}", e)),
            },
            IpcCommand::Plan => {
                if let Err(e) = self.reload_config() {
                    warn!("Failed to re-read configuration: {:#}. Keeping previous values.", e);
                }
                match plan_pass(&mut self.host, &self.config.reconcile_config()) {
                    Ok(plan) => IpcResponse::Plan {
                        noop: plan.is_noop(),
                        gap_removals: plan.gap_removals,
                        needed: plan.needed,
                        truncate: plan.truncate,
                        append: plan.append,
                    },
                    Err(e) => IpcResponse::error(format!("Failed to compute plan: {}", e)),
                }
            }
            IpcCommand::QueryDesktops => self
                .query_desktops()
                .unwrap_or_else(|e| IpcResponse::error(format!("Failed to query desktops: {}", e))),
            IpcCommand::QueryStatus => IpcResponse::Status {
                passes: self.dispatcher.passes(),
                suppressed: self.dispatcher.suppressed(),
                uptime_secs: self.start_time.elapsed().as_secs(),
                minimum_desktops: self.config.reconcile_config().minimum_desktops(),
                label_template: self.config.desktops.label_template.clone(),
                last_pass: self.last_pass.clone(),
            },
            IpcCommand::Reload => {
                if let Err(e) = self.reload_config() {
                    return IpcResponse::error(format!("Failed to reload config: {:#}", e));
                }
                match self.run_pass(Trigger::Manual) {
                    Ok(_) => IpcResponse::Ok,
                    Err(e) => IpcResponse::error(format!("Pass failed: {}", e)),
                }
            }
            IpcCommand::Stop => {
                // This is handled specially in the event loop
                IpcResponse::Ok
            }
        }
    }
}

/// Serialize a response line, falling back to a fixed error line.
fn response_line(response: &IpcResponse) -> String {
    encode_line(response).unwrap_or_else(|e| {
        warn!("Failed to serialize IPC response: {}", e);
        SERIALIZATION_ERROR_LINE.to_string()
    })
}

/// Remove a stale socket file and bind the listener.
fn bind_socket(path: &Path) -> Result<UnixListener> {
    if path.exists() {
        std::fs::remove_file(path)
            .with_context(|| format!("Failed to remove stale socket: {}", path.display()))?;
    }
    UnixListener::bind(path).with_context(|| format!("Failed to bind socket: {}", path.display()))
}

/// Run the IPC server, accepting connections and dispatching commands.
async fn run_ipc_server(listener: UnixListener, event_tx: mpsc::Sender<DaemonEvent>) {
    loop {
        let stream = match listener.accept().await {
            Ok((stream, _)) => stream,
            Err(e) => {
                error!("Failed to accept client connection: {}", e);
                tokio::time::sleep(Duration::from_secs(1)).await;
                continue;
            }
        };

        debug!("Client connected");

        // Handle this client
        let event_tx = event_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_client(stream, event_tx).await {
                warn!("Client handler error: {}", e);
            }
        });
    }
}

/// Handle a single client connection.
async fn handle_client(stream: UnixStream, event_tx: mpsc::Sender<DaemonEvent>) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let limited_reader = reader.take(MAX_IPC_MESSAGE_SIZE);
    let mut reader = BufReader::new(limited_reader);
    let mut line = String::new();

    // Read command (single line of JSON) with timeout and size bound
    let read_result = tokio::time::timeout(IPC_READ_TIMEOUT, reader.read_line(&mut line)).await;
    let bytes_read = match read_result {
        Ok(Ok(n)) => n,
        Ok(Err(e)) => return Err(e.into()),
        Err(_) => {
            // Timeout: client did not send in time, silently close
            return Ok(());
        }
    };
    if bytes_read == 0 {
        return Ok(()); // Client disconnected
    }

    let line = line.trim();
    debug!("Received command: {}", line);

    let cmd: IpcCommand = match serde_json::from_str(line) {
        Ok(cmd) => cmd,
        Err(e) => {
            let response = IpcResponse::error(format!("Invalid command: {}", e));
            writer.write_all(response_line(&response).as_bytes()).await?;
            return Ok(());
        }
    };

    let is_stop = matches!(cmd, IpcCommand::Stop);

    let (resp_tx, resp_rx) = oneshot::channel();
    if event_tx
        .send(DaemonEvent::IpcCommand {
            cmd,
            responder: resp_tx,
        })
        .await
        .is_err()
    {
        let response = IpcResponse::error("Daemon is shutting down");
        writer.write_all(response_line(&response).as_bytes()).await?;
        return Ok(());
    }

    let response = match resp_rx.await {
        Ok(resp) => resp,
        Err(_) => IpcResponse::error("Failed to get response from daemon"),
    };
    writer.write_all(response_line(&response).as_bytes()).await?;

    // If this was a stop command, signal shutdown
    if is_stop {
        let _ = event_tx.send(DaemonEvent::Shutdown).await;
    }

    Ok(())
}

/// Spawn a named forwarding thread that receives events from a std::sync::mpsc channel
/// and forwards them to a tokio mpsc sender. Returns the JoinHandle for graceful shutdown.
fn spawn_forwarding_thread<T: Send + 'static>(
    name: &str,
    receiver: std::sync::mpsc::Receiver<T>,
    sender: mpsc::Sender<DaemonEvent>,
    map_fn: impl Fn(T) -> DaemonEvent + Send + 'static,
) -> Result<std::thread::JoinHandle<()>> {
    let thread_name = name.to_string();
    std::thread::Builder::new()
        .name(thread_name.clone())
        .spawn(move || {
            while let Ok(event) = receiver.recv() {
                if sender.blocking_send(map_fn(event)).is_err() {
                    break; // Channel closed, daemon shutting down
                }
            }
        })
        .map_err(|e| anyhow::anyhow!("Failed to spawn {} thread: {}", thread_name, e))
}

/// Check if another daemon instance is already running by probing the socket.
async fn check_already_running(path: &Path) -> bool {
    UnixStream::connect(path).await.is_ok()
}

/// Initialize logging. `RUST_LOG` takes precedence over the configured level.
fn init_logging(log_level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config_source = ConfigSource::from_args(&args);

    // Load configuration first (needed for log level)
    let mut config = config_source.load().unwrap_or_else(|e| {
        // Can't use tracing yet, fall back to eprintln
        eprintln!("Failed to load configuration: {:#}. Using defaults.", e);
        Config::default()
    });
    let config_warnings = config.validate();

    init_logging(&config.behavior.log_level)?;
    for w in &config_warnings {
        warn!("Config: {} - {}", w.field, w.message);
    }

    info!("dyndesk daemon starting...");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let socket = socket_path();
    if check_already_running(&socket).await {
        error!("Another dyndesk instance is already running ({} is active)", socket.display());
        return Ok(());
    }

    info!(
        "Configuration loaded: minimum_desktops={}, label_template=\"{}\", log_level={}",
        config.desktops.minimum_desktops, config.desktops.label_template, config.behavior.log_level
    );

    let host = X11Host::connect().context("Failed to connect to the X server")?;
    let dispatcher = Dispatcher::new();
    let lock = dispatcher.lock();
    let mut state = AppState::new(host, dispatcher, config, config_source);

    // Bring the desktops into shape before any notification arrives
    state
        .handle_trigger(Trigger::Manual)
        .context("Initial pass failed")?;

    let (event_tx, mut event_rx) = mpsc::channel::<DaemonEvent>(EVENT_CHANNEL_CAPACITY);
    let mut thread_handles: Vec<std::thread::JoinHandle<()>> = Vec::new();

    let watch_handle = match install_event_watch(lock) {
        Ok((handle, trigger_receiver)) => {
            info!("Watching the window manager for changes");
            match spawn_forwarding_thread(
                "x11-fwd",
                trigger_receiver,
                event_tx.clone(),
                DaemonEvent::Host,
            ) {
                Ok(handle) => thread_handles.push(handle),
                Err(e) => warn!("{}", e),
            }
            Some(handle)
        }
        Err(e) => {
            warn!("Failed to watch the window manager: {}. Passes run only on request.", e);
            None
        }
    };

    let listener = bind_socket(&socket)?;
    let ipc_tx = event_tx.clone();
    tokio::spawn(async move {
        run_ipc_server(listener, ipc_tx).await;
    });

    info!("IPC server listening on {}", socket.display());

    // Install Ctrl+C handler so terminal kill triggers graceful shutdown
    {
        let shutdown_tx = event_tx.clone();
        tokio::spawn(async move {
            if let Ok(()) = tokio::signal::ctrl_c().await {
                info!("Ctrl+C received, initiating shutdown...");
                let _ = shutdown_tx.send(DaemonEvent::Shutdown).await;
            }
        });
    }
    drop(event_tx);

    info!("Ready. Use dyndesk-cli to send commands.");

    // Main event loop: one event at a time, so passes never overlap
    while let Some(event) = event_rx.recv().await {
        match event {
            DaemonEvent::IpcCommand { cmd, responder } => {
                let response = state.handle_command(cmd);
                if responder.send(response).is_err() {
                    debug!("Client disconnected before receiving IPC response");
                }
            }
            DaemonEvent::Host(trigger) => {
                if let Err(e) = state.handle_trigger(trigger) {
                    error!("{}", e);
                    break;
                }
            }
            DaemonEvent::Shutdown => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    // Close the channel first so a forwarder blocked on a full channel wakes up,
    // then stop the watcher so the forwarder's receiver disconnects.
    drop(event_rx);
    drop(watch_handle);

    info!("Waiting for forwarding threads to exit...");
    for handle in thread_handles {
        let _ = handle.join();
    }

    if let Err(e) = std::fs::remove_file(&socket) {
        debug!("Failed to remove socket {}: {}", socket.display(), e);
    }

    info!("dyndesk daemon shutting down.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use dyndesk_core::{MemoryHost, WindowInfo};
    use std::io::{Seek, SeekFrom, Write};

    fn state_with(host: MemoryHost, config: Config) -> AppState<MemoryHost> {
        AppState::new(
            host,
            Dispatcher::new(),
            config.clone(),
            ConfigSource::Fixed(config),
        )
    }

    fn gapped_host() -> MemoryHost {
        let mut host = MemoryHost::new(5);
        host.add_window(WindowInfo::new(1, [1]));
        host.add_window(WindowInfo::new(2, [3]));
        host
    }

    fn write_config(file: &mut tempfile::NamedTempFile, contents: &str) {
        let f = file.as_file_mut();
        f.set_len(0).unwrap();
        f.seek(SeekFrom::Start(0)).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f.flush().unwrap();
    }

    #[test]
    fn test_args_select_config_source() {
        Args::command().debug_assert();

        let args = Args::try_parse_from(["dyndesk"]).unwrap();
        assert_eq!(ConfigSource::from_args(&args), ConfigSource::Search);

        let args = Args::try_parse_from(["dyndesk", "--config", "/tmp/dyndesk.toml"]).unwrap();
        assert_eq!(
            ConfigSource::from_args(&args),
            ConfigSource::File(PathBuf::from("/tmp/dyndesk.toml"))
        );
    }

    #[test]
    fn test_config_file_source_loads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write_config(&mut file, "[desktops]\nminimum_desktops = 4\n");

        let path = file.path().to_str().unwrap();
        let args = Args::try_parse_from(["dyndesk", "--config", path]).unwrap();
        let config = ConfigSource::from_args(&args).load().unwrap();
        assert_eq!(config.desktops.minimum_desktops, 4);
    }

    #[test]
    fn test_plan_reports_noop_after_pass() {
        let mut state = state_with(gapped_host(), Config::default());
        state.handle_trigger(Trigger::Manual).unwrap();

        match state.handle_command(IpcCommand::Plan) {
            IpcResponse::Plan {
                gap_removals, noop, ..
            } => {
                assert!(gap_removals.is_empty());
                assert!(noop);
            }
            other => panic!("Expected Plan, got {:?}", other),
        }
    }

    #[test]
    fn test_initial_pass_reconciles() {
        let mut state = state_with(gapped_host(), Config::default());

        state.handle_trigger(Trigger::Manual).unwrap();

        assert_eq!(state.host.desktop_count().unwrap(), 3);
        assert_eq!(state.dispatcher.passes(), 1);
        let last = state.last_pass.as_ref().unwrap();
        assert_eq!(last.trigger, "manual");
        assert_eq!(last.removed_gaps, 1);
        assert_eq!(last.truncated, 1);
    }

    #[test]
    fn test_reconcile_command_returns_summary() {
        let mut state = state_with(gapped_host(), Config::default());

        match state.handle_command(IpcCommand::Reconcile) {
            IpcResponse::PassCompleted { summary } => {
                assert_eq!(summary.desktop_count, 3);
                assert_eq!(summary.relabeled, 3);
            }
            other => panic!("Expected PassCompleted, got {:?}", other),
        }
    }

    #[test]
    fn test_plan_command_does_not_mutate() {
        let mut state = state_with(gapped_host(), Config::default());

        match state.handle_command(IpcCommand::Plan) {
            IpcResponse::Plan {
                gap_removals,
                needed,
                truncate,
                append,
                noop,
            } => {
                assert_eq!(gap_removals, vec![2]);
                assert!(!noop);
                assert_eq!(needed, 3);
                assert_eq!(truncate, 1);
                assert_eq!(append, 0);
            }
            other => panic!("Expected Plan, got {:?}", other),
        }
        assert_eq!(state.host.desktop_count().unwrap(), 5);
        assert_eq!(state.dispatcher.passes(), 0);
    }

    #[test]
    fn test_query_desktops() {
        let mut host = MemoryHost::new(2);
        host.set_current_desktop(2).unwrap();
        let mut state = state_with(host, Config::default());

        match state.handle_command(IpcCommand::QueryDesktops) {
            IpcResponse::Desktops { current, desktops } => {
                assert_eq!(current, 2);
                assert_eq!(desktops.len(), 2);
                assert_eq!(desktops[1].index, 2);
                assert_eq!(desktops[1].label, "Desktop 2");
            }
            other => panic!("Expected Desktops, got {:?}", other),
        }
    }

    #[test]
    fn test_query_status() {
        let mut config = Config::default();
        config.desktops.minimum_desktops = 4;
        config.desktops.label_template = "Space #%n".to_string();
        let mut state = state_with(MemoryHost::new(1), config);

        state.handle_trigger(Trigger::WindowAdded).unwrap();

        match state.handle_command(IpcCommand::QueryStatus) {
            IpcResponse::Status {
                passes,
                minimum_desktops,
                label_template,
                last_pass,
                ..
            } => {
                assert_eq!(passes, 1);
                assert_eq!(minimum_desktops, 4);
                assert_eq!(label_template, "Space #%n");
                let last = last_pass.unwrap();
                assert_eq!(last.trigger, "window_added");
                assert_eq!(last.appended, 3);
            }
            other => panic!("Expected Status, got {:?}", other),
        }
    }

    #[test]
    fn test_config_is_reread_every_pass() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write_config(&mut file, "[desktops]\nlabel_template = \"Desktop %n\"\n");

        let mut host = MemoryHost::new(2);
        host.add_window(WindowInfo::new(1, [1]));
        let mut state = AppState::new(
            host,
            Dispatcher::new(),
            Config::default(),
            ConfigSource::File(file.path().to_path_buf()),
        );
        state.handle_trigger(Trigger::Manual).unwrap();
        assert_eq!(
            state.host.desktop_labels().unwrap(),
            vec!["Desktop 1", "Desktop 2"]
        );

        // No structural change, but the next event relabels everything.
        write_config(&mut file, "[desktops]\nlabel_template = \"Space #%n\"\n");
        state.handle_trigger(Trigger::CurrentDesktopChanged).unwrap();

        assert_eq!(state.host.desktop_count().unwrap(), 2);
        assert_eq!(
            state.host.desktop_labels().unwrap(),
            vec!["Space #1", "Space #2"]
        );
    }

    #[test]
    fn test_broken_config_keeps_last_good() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write_config(&mut file, "[desktops]\nminimum_desktops = 3\n");

        let mut state = AppState::new(
            MemoryHost::new(1),
            Dispatcher::new(),
            Config::default(),
            ConfigSource::File(file.path().to_path_buf()),
        );
        state.handle_trigger(Trigger::Manual).unwrap();
        assert_eq!(state.host.desktop_count().unwrap(), 3);

        write_config(&mut file, "[desktops\n");
        state.handle_trigger(Trigger::Manual).unwrap();
        assert_eq!(state.host.desktop_count().unwrap(), 3);
        assert_eq!(state.config.desktops.minimum_desktops, 3);

        match state.handle_command(IpcCommand::Reload) {
            IpcResponse::Error { message } => assert!(message.contains("Failed to reload config")),
            other => panic!("Expected Error, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_minimum_is_clamped() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write_config(&mut file, "[desktops]\nminimumDesktops = 0\n");

        let mut state = AppState::new(
            MemoryHost::new(4),
            Dispatcher::new(),
            Config::default(),
            ConfigSource::File(file.path().to_path_buf()),
        );
        state.handle_trigger(Trigger::Manual).unwrap();

        assert_eq!(state.config.desktops.minimum_desktops, 1);
        assert_eq!(state.host.desktop_count().unwrap(), 1);
    }

    #[test]
    fn test_reload_runs_a_pass() {
        let mut state = state_with(gapped_host(), Config::default());
        assert_eq!(state.handle_command(IpcCommand::Reload), IpcResponse::Ok);
        assert_eq!(state.host.desktop_count().unwrap(), 3);
    }

    #[test]
    fn test_stop_command_returns_ok() {
        let mut state = state_with(MemoryHost::new(1), Config::default());
        assert_eq!(state.handle_command(IpcCommand::Stop), IpcResponse::Ok);
    }

    #[test]
    fn test_failed_pass_is_not_fatal() {
        struct FailingHost(MemoryHost);

        impl DesktopHost for FailingHost {
            fn windows(&self) -> Result<Vec<WindowInfo>, HostError> {
                self.0.windows()
            }
            fn current_desktop(&self) -> Result<usize, HostError> {
                self.0.current_desktop()
            }
            fn desktop_count(&self) -> Result<usize, HostError> {
                self.0.desktop_count()
            }
            fn desktop_labels(&self) -> Result<Vec<String>, HostError> {
                self.0.desktop_labels()
            }
            fn create_desktop(&mut self, _: usize, _: &str) -> Result<(), HostError> {
                Err(HostError::Request("refused".to_string()))
            }
            fn remove_desktop(&mut self, index: usize) -> Result<(), HostError> {
                self.0.remove_desktop(index)
            }
            fn set_desktop_label(&mut self, index: usize, label: &str) -> Result<(), HostError> {
                self.0.set_desktop_label(index, label)
            }
        }

        let mut state = AppState::new(
            FailingHost(MemoryHost::new(1)),
            Dispatcher::new(),
            Config::default(),
            ConfigSource::Fixed(Config::default()),
        );

        assert!(state.handle_trigger(Trigger::WindowAdded).is_ok());
        assert!(state.last_pass.is_none());
        assert!(!state.dispatcher.lock().is_held());
        assert!(matches!(
            state.handle_command(IpcCommand::Reconcile),
            IpcResponse::Error { .. }
        ));
    }

    #[test]
    fn test_response_line_is_newline_terminated() {
        let line = response_line(&IpcResponse::Ok);
        assert_eq!(line, "{\"status\":\"ok\"}\n");
    }

    #[test]
    fn test_ipc_round_trip_over_socket() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dyndesk.sock");

        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        rt.block_on(async {
            let listener = bind_socket(&path).unwrap();
            let (event_tx, mut event_rx) = mpsc::channel(4);
            tokio::spawn(run_ipc_server(listener, event_tx));

            // Stand-in event loop answering one command
            let responder_task = tokio::spawn(async move {
                let mut state = state_with(gapped_host(), Config::default());
                if let Some(DaemonEvent::IpcCommand { cmd, responder }) = event_rx.recv().await {
                    let _ = responder.send(state.handle_command(cmd));
                }
            });

            let stream = UnixStream::connect(&path).await.unwrap();
            let (reader, mut writer) = stream.into_split();
            writer
                .write_all(encode_line(&IpcCommand::QueryDesktops).unwrap().as_bytes())
                .await
                .unwrap();

            let mut reader = BufReader::new(reader);
            let mut line = String::new();
            reader.read_line(&mut line).await.unwrap();
            let response: IpcResponse = serde_json::from_str(line.trim()).unwrap();
            match response {
                IpcResponse::Desktops { desktops, .. } => assert_eq!(desktops.len(), 5),
                other => panic!("Expected Desktops, got {:?}", other),
            }

            responder_task.await.unwrap();
            assert!(check_already_running(&path).await);
        });
    }

    #[test]
    fn test_bind_socket_replaces_stale_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stale.sock");
        std::fs::write(&path, b"").unwrap();

        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            assert!(!check_already_running(&path).await);
            let _listener = bind_socket(&path).unwrap();
            assert!(check_already_running(&path).await);
        });
    }
}
