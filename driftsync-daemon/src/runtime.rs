//! Daemon runtime: watcher, idle trigger, serialized cycle processor, poll
//! loop, control socket, and activity-log rotation, tied together with a
//! shutdown broadcast.
//!
//! The push side (watcher → idle trigger) and the pull side (poll loop)
//! share no state beyond the cycle context; upload cycles from any source
//! funnel through one processor task so two cycles can never overlap.

use std::fs;
use std::io::ErrorKind;
use std::os::unix::net::UnixStream as StdUnixStream;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use notify::{recommended_watcher, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc, oneshot, RwLock};
use tokio::task::JoinHandle;

use driftsync_core::{Consumer, Settings};
use driftsync_queue::SqsQueue;
use driftsync_transfer::cycle::{self, CycleContext, CycleSummary};
use driftsync_transfer::CliMirror;

use crate::debounce::{debounce_task, ActivityEvent};
use crate::error::{io_err, DaemonError};
use crate::paths::socket_path;
use crate::poll::{poll_task, PollConfig};
use crate::protocol::{DaemonRequest, DaemonResponse};

/// Unix seconds of the last successful sync, one slot per direction.
/// Zero means "never since this daemon started".
#[derive(Debug, Default, Clone, Copy)]
pub struct SyncTimes {
    pub upload_at_unix: u64,
    pub download_at_unix: u64,
}

/// A request for one upload cycle, queued to the processor task.
pub(crate) struct CycleJob {
    pub source: &'static str,
    /// Socket-initiated jobs report their outcome back; watcher jobs are
    /// logged by the processor.
    pub respond_to: Option<oneshot::Sender<Result<CycleSummary, String>>>,
}

/// Start the daemon runtime and block the current thread until it exits.
pub fn start_blocking(settings: Settings, home: &Path) -> Result<(), DaemonError> {
    init_tracing();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(settings, home.to_path_buf()))
}

/// Run the daemon runtime.
pub async fn run(settings: Settings, home: PathBuf) -> Result<(), DaemonError> {
    let data_dir = settings.data_dir_at(&home);
    ensure_runtime_dirs(&data_dir, &settings.local_dir)?;

    // Constructing the messaging client is the last fatal step; after this
    // point only an explicit stop terminates the daemon.
    let queue = Arc::new(SqsQueue::connect(&settings.region, settings.queue_url.clone()).await);

    let ctx = Arc::new(CycleContext {
        mirror: Arc::new(CliMirror::new()),
        publisher: queue.clone(),
        local_dir: settings.local_dir.clone(),
        bucket: settings.bucket.clone(),
        trigger_token: settings.trigger_token.clone(),
        data_dir: data_dir.clone(),
    });

    let times = Arc::new(RwLock::new(SyncTimes::default()));
    let started_at_unix = unix_seconds_now();
    let settings = Arc::new(settings);

    let (cycle_tx, cycle_rx) = mpsc::channel::<CycleJob>(64);
    let (shutdown_tx, _) = broadcast::channel::<()>(16);

    let mut tasks: Vec<(&'static str, JoinHandle<Result<(), DaemonError>>)> = Vec::new();

    if settings.mode.push_enabled() {
        let (activity_tx, activity_rx) = mpsc::channel::<ActivityEvent>(1024);

        tasks.push(("watcher", {
            let shutdown = shutdown_tx.clone();
            let local_dir = settings.local_dir.clone();
            tokio::spawn(async move {
                let result = watcher_task(local_dir, activity_tx, shutdown.subscribe()).await;
                let _ = shutdown.send(());
                result
            })
        }));

        tasks.push(("idle_trigger", {
            let shutdown = shutdown_tx.clone();
            let cycle_tx = cycle_tx.clone();
            let idle_window = settings.idle_window();
            tokio::spawn(async move {
                let result =
                    debounce_task(activity_rx, cycle_tx, idle_window, shutdown.subscribe()).await;
                let _ = shutdown.send(());
                result
            })
        }));
    } else {
        tracing::info!("push side disabled (mode=pull)");
    }

    if settings.mode.pull_enabled() {
        tasks.push(("poll_loop", {
            let shutdown = shutdown_tx.clone();
            let consumer: Arc<dyn Consumer> = queue.clone();
            let poll_config = PollConfig::from_settings(&settings);
            let ctx = ctx.clone();
            let times = times.clone();
            tokio::spawn(async move {
                let result =
                    poll_task(consumer, ctx, poll_config, times, shutdown.subscribe()).await;
                let _ = shutdown.send(());
                result
            })
        }));
    } else {
        tracing::info!("pull side disabled (mode=push)");
    }

    tasks.push(("cycle_processor", {
        let shutdown = shutdown_tx.clone();
        let ctx = ctx.clone();
        let times = times.clone();
        tokio::spawn(async move {
            let result = cycle_processor_task(ctx, times, cycle_rx, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    }));

    tasks.push(("socket_server", {
        let shutdown = shutdown_tx.clone();
        let settings = settings.clone();
        let data_dir = data_dir.clone();
        let times = times.clone();
        let cycle_tx = cycle_tx.clone();
        tokio::spawn(async move {
            let result = socket_server_task(
                settings,
                data_dir,
                times,
                cycle_tx,
                shutdown.clone(),
                started_at_unix,
            )
            .await;
            let _ = shutdown.send(());
            result
        })
    }));

    tasks.push(("log_rotation", {
        let shutdown = shutdown_tx.clone();
        let data_dir = data_dir.clone();
        tokio::spawn(async move {
            let result = rotation_task(data_dir, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    }));

    tasks.push(("signal_handler", {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            let mut shutdown_rx = shutdown.subscribe();
            tokio::select! {
                _ = shutdown_rx.recv() => Ok(()),
                signal = tokio::signal::ctrl_c() => {
                    match signal {
                        Ok(()) => {
                            tracing::info!("received ctrl-c, shutting down daemon");
                            let _ = shutdown.send(());
                            Ok(())
                        }
                        Err(err) => Err(DaemonError::Protocol(format!("ctrl-c handler failed: {err}"))),
                    }
                }
            }
        })
    }));

    tracing::info!(
        mode = %settings.mode,
        local_dir = %settings.local_dir.display(),
        bucket = %settings.bucket,
        "daemon started",
    );

    for (name, handle) in tasks {
        handle_join(name, handle.await)?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Watcher
// ---------------------------------------------------------------------------

async fn watcher_task(
    local_dir: PathBuf,
    activity_tx: mpsc::Sender<ActivityEvent>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<notify::Result<Event>>();
    let mut _watcher: RecommendedWatcher = recommended_watcher(move |event| {
        let _ = event_tx.send(event);
    })?;
    _watcher.watch(&local_dir, RecursiveMode::Recursive)?;
    tracing::info!(path = %local_dir.display(), "watching local replica");

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            event = event_rx.recv() => {
                let Some(event) = event else { break };
                let event = match event {
                    Ok(event) => event,
                    Err(err) => {
                        tracing::warn!(error = %err, "watcher event error");
                        continue;
                    }
                };
                if !is_relevant_event_kind(&event.kind) {
                    continue;
                }
                for path in event.paths {
                    if is_hidden(&path) {
                        continue;
                    }
                    if activity_tx.send(ActivityEvent { path }).await.is_err() {
                        return Err(DaemonError::ChannelClosed("activity queue"));
                    }
                }
            }
        }
    }

    Ok(())
}

/// Create, modify, and delete all count as activity; metadata-only noise
/// (access events) does not.
fn is_relevant_event_kind(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    )
}

/// Hidden/system entries (final path component starting with `.`) never
/// count as activity.
fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(|name| name.starts_with('.'))
        .unwrap_or(false)
}

// ---------------------------------------------------------------------------
// Cycle processor
// ---------------------------------------------------------------------------

/// Single consumer of cycle jobs: upload cycles never overlap, whatever
/// their source.
async fn cycle_processor_task(
    ctx: Arc<CycleContext>,
    times: Arc<RwLock<SyncTimes>>,
    mut cycle_rx: mpsc::Receiver<CycleJob>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            maybe_job = cycle_rx.recv() => {
                let Some(job) = maybe_job else { break };
                let source = job.source;

                let outcome = match cycle::run_upload(&ctx).await {
                    Ok(summary) => {
                        if summary.success {
                            times.write().await.upload_at_unix = unix_seconds_now();
                        }
                        Ok(summary)
                    }
                    Err(err) => Err(err.to_string()),
                };

                if let Some(respond_to) = job.respond_to {
                    let _ = respond_to.send(outcome);
                } else {
                    match outcome {
                        Ok(summary) if summary.success => tracing::info!(
                            source,
                            deletions_audited = summary.deletions_audited,
                            "upload sync completed",
                        ),
                        Ok(summary) => {
                            tracing::error!(source, "upload sync failed: {}", summary.detail)
                        }
                        Err(err) => tracing::error!(source, error = %err, "upload sync errored"),
                    }
                }
            }
        }
    }

    Ok(())
}

async fn enqueue_cycle(
    cycle_tx: &mpsc::Sender<CycleJob>,
    source: &'static str,
) -> Result<CycleSummary, DaemonError> {
    let (tx, rx) = oneshot::channel();
    cycle_tx
        .send(CycleJob {
            source,
            respond_to: Some(tx),
        })
        .await
        .map_err(|_| DaemonError::ChannelClosed("cycle queue"))?;

    let outcome = rx
        .await
        .map_err(|_| DaemonError::ChannelClosed("cycle response"))?;
    outcome.map_err(DaemonError::Protocol)
}

// ---------------------------------------------------------------------------
// Control socket
// ---------------------------------------------------------------------------

async fn socket_server_task(
    settings: Arc<Settings>,
    data_dir: PathBuf,
    times: Arc<RwLock<SyncTimes>>,
    cycle_tx: mpsc::Sender<CycleJob>,
    shutdown_tx: broadcast::Sender<()>,
    started_at_unix: u64,
) -> Result<(), DaemonError> {
    let socket = socket_path(&data_dir);
    prepare_socket_for_bind(&socket)?;

    let listener = UnixListener::bind(&socket).map_err(|e| io_err(&socket, e))?;
    set_socket_permissions(&socket)?;

    let mut shutdown_rx = shutdown_tx.subscribe();
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            accepted = listener.accept() => {
                let (stream, _) = accepted.map_err(|e| io_err(&socket, e))?;
                let settings = settings.clone();
                let data_dir = data_dir.clone();
                let times = times.clone();
                let cycle_tx = cycle_tx.clone();
                let shutdown_tx = shutdown_tx.clone();
                tokio::spawn(async move {
                    if let Err(err) = handle_socket_client(
                        stream,
                        settings,
                        data_dir,
                        times,
                        cycle_tx,
                        shutdown_tx,
                        started_at_unix,
                    ).await {
                        tracing::error!(error = %err, "socket client error");
                    }
                });
            }
        }
    }

    if socket.exists() {
        let _ = fs::remove_file(&socket);
    }
    Ok(())
}

async fn handle_socket_client(
    stream: UnixStream,
    settings: Arc<Settings>,
    data_dir: PathBuf,
    times: Arc<RwLock<SyncTimes>>,
    cycle_tx: mpsc::Sender<CycleJob>,
    shutdown_tx: broadcast::Sender<()>,
    started_at_unix: u64,
) -> Result<(), DaemonError> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| io_err("daemon socket read", e))?
    {
        if line.trim().is_empty() {
            continue;
        }

        let request: Result<DaemonRequest, _> = serde_json::from_str(&line);
        let request = match request {
            Ok(request) => request,
            Err(err) => {
                write_response(
                    &mut writer,
                    &DaemonResponse::error(format!("invalid request JSON: {err}")),
                )
                .await?;
                continue;
            }
        };

        let response = match request.cmd.as_str() {
            "status" => {
                let payload =
                    build_status_payload(&settings, &data_dir, times.clone(), started_at_unix)
                        .await;
                DaemonResponse::ok(payload)
            }
            "sync" => match enqueue_cycle(&cycle_tx, "socket").await {
                Ok(summary) => DaemonResponse::ok(json!(summary)),
                Err(err) => DaemonResponse::error(err.to_string()),
            },
            "stop" => {
                let _ = shutdown_tx.send(());
                DaemonResponse::ok(json!({ "stopping": true }))
            }
            other => DaemonResponse::error(format!("unknown command '{other}'")),
        };

        write_response(&mut writer, &response).await?;
        if request.cmd == "stop" {
            break;
        }
    }

    Ok(())
}

async fn build_status_payload(
    settings: &Settings,
    data_dir: &Path,
    times: Arc<RwLock<SyncTimes>>,
    started_at_unix: u64,
) -> Value {
    // Snapshot under a short read lock, then assemble.
    let snapshot = *times.read().await;

    json!({
        "running": true,
        "mode": settings.mode,
        "started_at_unix": started_at_unix,
        "last_upload_at_unix": snapshot.upload_at_unix,
        "last_download_at_unix": snapshot.download_at_unix,
        "local_dir": settings.local_dir.display().to_string(),
        "bucket": settings.bucket.0.as_str(),
        "socket": socket_path(data_dir).display().to_string(),
    })
}

async fn write_response(
    writer: &mut OwnedWriteHalf,
    response: &DaemonResponse,
) -> Result<(), DaemonError> {
    let payload = serde_json::to_string(response)?;
    writer
        .write_all(payload.as_bytes())
        .await
        .map_err(|e| io_err("daemon socket write", e))?;
    writer
        .write_all(b"\n")
        .await
        .map_err(|e| io_err("daemon socket write", e))?;
    writer
        .flush()
        .await
        .map_err(|e| io_err("daemon socket flush", e))?;
    Ok(())
}

fn prepare_socket_for_bind(socket: &Path) -> Result<(), DaemonError> {
    if !socket.exists() {
        return Ok(());
    }

    match StdUnixStream::connect(socket) {
        Ok(_) => {
            return Err(DaemonError::Protocol(format!(
                "daemon socket already in use: {}",
                socket.display()
            )));
        }
        Err(err) => {
            tracing::warn!(
                socket = %socket.display(),
                error = %err,
                "removing stale daemon socket before bind",
            );
        }
    }

    match fs::remove_file(socket) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(io_err(socket, err)),
    }
}

#[cfg(unix)]
fn set_socket_permissions(path: &Path) -> Result<(), DaemonError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|e| io_err(path, e))
}

#[cfg(not(unix))]
fn set_socket_permissions(_path: &Path) -> Result<(), DaemonError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Housekeeping
// ---------------------------------------------------------------------------

async fn rotation_task(
    data_dir: PathBuf,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let mut interval = tokio::time::interval(Duration::from_secs(60));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    interval.tick().await; // consume the immediate first tick

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = interval.tick() => {
                let data_dir = data_dir.clone();
                tokio::task::spawn_blocking(move || {
                    crate::log_rotation::rotate_activity_log(&data_dir);
                })
                .await
                .ok(); // rotation errors are logged inside; never crash the daemon
            }
        }
    }
    Ok(())
}

fn ensure_runtime_dirs(data_dir: &Path, local_dir: &Path) -> Result<(), DaemonError> {
    for dir in [data_dir, local_dir] {
        if !dir.exists() {
            fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
        }
    }
    Ok(())
}

fn handle_join(
    task: &str,
    result: Result<Result<(), DaemonError>, tokio::task::JoinError>,
) -> Result<(), DaemonError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(DaemonError::Protocol(format!(
            "{task} task join failure: {err}"
        ))),
    }
}

pub(crate) fn unix_seconds_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use serde_json::json;
    use tempfile::TempDir;

    use driftsync_core::{
        ActiveHours, BucketUri, Mirror, MirrorOutcome, MirrorRequest, Publisher, QueueUrl,
        RemoteError, RunMode, TriggerToken,
    };

    use super::*;

    fn test_settings() -> Settings {
        Settings {
            local_dir: PathBuf::from("/srv/replica"),
            bucket: BucketUri::from("s3://team-assets"),
            queue_url: QueueUrl::from("https://sqs.us-east-1.amazonaws.com/1234/team-assets"),
            region: "us-east-1".to_owned(),
            mode: RunMode::Both,
            idle_window_secs: 120,
            active_hours: ActiveHours::ALL_DAY,
            trigger_token: TriggerToken::default(),
            poll_wait_secs: 20,
            idle_poll_sleep_secs: 40,
            gated_sleep_secs: 300,
            backoff_base_secs: 10,
            backoff_cap_secs: 30,
            data_dir: None,
        }
    }

    #[test]
    fn hidden_paths_are_filtered() {
        assert!(is_hidden(Path::new("/sample/.DS_Store")));
        assert!(is_hidden(Path::new("/sample/.swp")));
        assert!(is_hidden(Path::new("/sample/.git")));
        assert!(!is_hidden(Path::new("/sample/report.txt")));
        assert!(!is_hidden(Path::new("/sample/.hidden/visible.txt")),
            "only the final component decides");
    }

    #[test]
    fn create_modify_and_remove_are_activity() {
        use notify::event::{AccessKind, CreateKind, ModifyKind, RemoveKind};

        assert!(is_relevant_event_kind(&EventKind::Create(CreateKind::File)));
        assert!(is_relevant_event_kind(&EventKind::Modify(ModifyKind::Any)));
        assert!(is_relevant_event_kind(&EventKind::Remove(RemoveKind::File)));
        assert!(!is_relevant_event_kind(&EventKind::Access(AccessKind::Any)));
        assert!(!is_relevant_event_kind(&EventKind::Any));
    }

    #[tokio::test]
    async fn status_payload_before_any_sync() {
        let data_dir = TempDir::new().expect("data dir");
        let times = Arc::new(RwLock::new(SyncTimes::default()));

        let payload =
            build_status_payload(&test_settings(), data_dir.path(), times, 1_000_000).await;

        assert_eq!(payload["running"], json!(true));
        assert_eq!(payload["mode"], json!("both"));
        assert_eq!(payload["started_at_unix"], json!(1_000_000u64));
        assert_eq!(payload["last_upload_at_unix"], json!(0u64));
        assert_eq!(payload["last_download_at_unix"], json!(0u64));
        assert_eq!(payload["bucket"], json!("s3://team-assets"));
    }

    #[tokio::test]
    async fn status_payload_reports_both_directions() {
        let data_dir = TempDir::new().expect("data dir");
        let times = Arc::new(RwLock::new(SyncTimes {
            upload_at_unix: 1_000_100,
            download_at_unix: 1_000_200,
        }));

        let payload =
            build_status_payload(&test_settings(), data_dir.path(), times, 1_000_000).await;

        assert_eq!(payload["last_upload_at_unix"], json!(1_000_100u64));
        assert_eq!(payload["last_download_at_unix"], json!(1_000_200u64));
    }

    #[tokio::test]
    async fn socket_protocol_status_and_stop_over_in_memory_channels() {
        let (request_tx, mut request_rx) = mpsc::channel::<Vec<u8>>(8);
        let (response_tx, mut response_rx) = mpsc::channel::<Vec<u8>>(8);
        let (shutdown_tx, mut shutdown_rx) = broadcast::channel::<()>(1);

        tokio::spawn(async move {
            while let Some(bytes) = request_rx.recv().await {
                let line = String::from_utf8(bytes).expect("utf8");
                let request: DaemonRequest = serde_json::from_str(line.trim()).expect("request");
                let response = match request.cmd.as_str() {
                    "status" => DaemonResponse::ok(json!({"running": true})),
                    "stop" => {
                        let _ = shutdown_tx.send(());
                        DaemonResponse::ok(json!({"stopping": true}))
                    }
                    other => DaemonResponse::error(format!("unknown command '{other}'")),
                };
                let encoded = serde_json::to_vec(&response).expect("encode response");
                if response_tx.send(encoded).await.is_err() {
                    break;
                }
            }
        });

        request_tx
            .send(br#"{"cmd":"status"}"#.to_vec())
            .await
            .expect("send status request");
        let status_response = response_rx.recv().await.expect("status response");
        let status_json: Value = serde_json::from_slice(&status_response).expect("decode status");
        assert_eq!(status_json["ok"], Value::Bool(true));

        request_tx
            .send(br#"{"cmd":"stop"}"#.to_vec())
            .await
            .expect("send stop request");
        let stop_response = response_rx.recv().await.expect("stop response");
        let stop_json: Value = serde_json::from_slice(&stop_response).expect("decode stop");
        assert_eq!(stop_json["ok"], Value::Bool(true));

        shutdown_rx.recv().await.expect("shutdown signal");
    }

    // ─── Cycle serialization ──────────────────────────────────────────────────

    /// Tracks how many transfers run at once; the processor must keep it at 1.
    struct GaugeMirror {
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Mirror for GaugeMirror {
        async fn mirror(&self, _request: &MirrorRequest) -> Result<MirrorOutcome, RemoteError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(MirrorOutcome {
                ok: true,
                stdout: String::new(),
                stderr: String::new(),
            })
        }
    }

    struct NullPublisher;

    #[async_trait]
    impl Publisher for NullPublisher {
        async fn publish(&self, _body: &str) -> Result<(), RemoteError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn concurrent_cycle_requests_are_serialized() {
        let data_dir = TempDir::new().expect("data dir");
        let mirror = Arc::new(GaugeMirror {
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        });
        let ctx = Arc::new(CycleContext {
            mirror: mirror.clone(),
            publisher: Arc::new(NullPublisher),
            local_dir: PathBuf::from("/srv/replica"),
            bucket: BucketUri::from("s3://team-assets"),
            trigger_token: TriggerToken::default(),
            data_dir: data_dir.path().to_path_buf(),
        });
        let times = Arc::new(RwLock::new(SyncTimes::default()));
        let (cycle_tx, cycle_rx) = mpsc::channel(8);
        let (shutdown_tx, _) = broadcast::channel(4);

        let processor = tokio::spawn(cycle_processor_task(
            ctx,
            times.clone(),
            cycle_rx,
            shutdown_tx.subscribe(),
        ));

        // Queue both jobs before either completes; each cycle runs two
        // transfers (dry + real).
        let (first_tx, first_rx) = oneshot::channel();
        let (second_tx, second_rx) = oneshot::channel();
        for respond_to in [first_tx, second_tx] {
            cycle_tx
                .send(CycleJob {
                    source: "socket",
                    respond_to: Some(respond_to),
                })
                .await
                .expect("enqueue job");
        }

        let first = first_rx.await.expect("first response").expect("first cycle");
        let second = second_rx
            .await
            .expect("second response")
            .expect("second cycle");

        assert!(first.success && second.success);
        assert_eq!(mirror.calls.load(Ordering::SeqCst), 4, "dry + real, twice");
        assert_eq!(
            mirror.max_in_flight.load(Ordering::SeqCst),
            1,
            "a cycle must never overlap another cycle"
        );
        assert!(times.read().await.upload_at_unix > 0);

        let _ = shutdown_tx.send(());
        processor.await.expect("join").expect("clean exit");
    }
}
