//! Request server: JSON-lines requests in, JSON-lines responses out.
//!
//! The server provides:
//! - A bounded worker pool (each request runs on the blocking pool while
//!   holding one of `workers` semaphore permits)
//! - Responses written in request order, whatever order the work finishes in
//! - The notification scan running alongside on its own timer
//!
//! With more than one worker, pipelined requests may execute concurrently;
//! clients that need one request to observe another must wait for its
//! response first.

use crate::error::{ErrorKind, Result};
use crate::notify::{DEFAULT_NOTIFY_INTERVAL, DEFAULT_UPCOMING_HOURS, run_notifier};
use crate::protocol::{Request, Response};
use crate::storage::{GraphStore, Storage};
use crate::store::Store;
use eyre::Context;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinHandle;

/// Default number of concurrent workers.
pub const DEFAULT_WORKERS: usize = 8;

/// Configuration for the server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Root directory containing .taskgraph
    pub root: PathBuf,

    /// Maximum requests executing at once
    pub workers: usize,

    /// Time between notification scans; zero disables them
    pub notify_interval: Duration,

    /// How far ahead a due date counts as upcoming
    pub upcoming_window: chrono::Duration,
}

impl ServerConfig {
    /// Create config with default settings.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            workers: DEFAULT_WORKERS,
            notify_interval: DEFAULT_NOTIFY_INTERVAL,
            upcoming_window: chrono::Duration::hours(DEFAULT_UPCOMING_HOURS),
        }
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn notify_interval(mut self, interval: Duration) -> Self {
        self.notify_interval = interval;
        self
    }

    pub fn upcoming_window(mut self, window: chrono::Duration) -> Self {
        self.upcoming_window = window;
        self
    }
}

/// The request server.
pub struct Server<S = Storage> {
    config: ServerConfig,
    store: Arc<Store<S>>,
    shutdown: Arc<AtomicBool>,
}

impl Server<Storage> {
    /// Open the store under `config.root` and create a server for it.
    pub fn new(config: ServerConfig) -> Result<Self> {
        let store = Store::open(&config.root)?;
        Ok(Self::with_store(config, Arc::new(store)))
    }
}

impl<S> Server<S>
where
    S: GraphStore + Send + Sync + 'static,
{
    pub fn with_store(config: ServerConfig, store: Arc<Store<S>>) -> Self {
        Self {
            config,
            store,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Get a shutdown handle that can be used to signal shutdown.
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    pub fn store(&self) -> &Arc<Store<S>> {
        &self.store
    }

    /// Serve requests from `reader` until EOF, a `Shutdown` request, or the
    /// shutdown flag is set.
    pub async fn run<R, W>(&self, reader: R, writer: W) -> eyre::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let workers = self.config.workers.max(1);
        let permits = Arc::new(Semaphore::new(workers));
        log::info!("Serving requests with {} worker(s)", workers);

        let notifier = tokio::spawn(run_notifier(
            Arc::clone(&self.store),
            self.config.notify_interval,
            self.config.upcoming_window,
            Arc::clone(&self.shutdown),
        ));

        // Pending work in request order; the writer awaits each in turn
        let (tx, rx) = mpsc::channel::<JoinHandle<Response>>(workers * 4);
        let writer_task = tokio::spawn(Self::write_responses(rx, writer));

        let mut lines = reader.lines();
        while !self.shutdown.load(Ordering::Relaxed) {
            let Some(line) = lines.next_line().await.context("Failed to read request")? else {
                break;
            };
            if line.trim().is_empty() {
                continue;
            }

            let pending = match serde_json::from_str::<Request>(&line) {
                Err(e) => ready(Response::bad_request(format!("malformed request: {}", e))),
                Ok(Request::Ping) => ready(Response::Pong),
                Ok(Request::Shutdown) => {
                    log::info!("Shutdown requested");
                    self.shutdown.store(true, Ordering::Relaxed);
                    ready(Response::Ok)
                }
                Ok(request) => {
                    let permit = Arc::clone(&permits)
                        .acquire_owned()
                        .await
                        .context("Worker pool closed")?;
                    let store = Arc::clone(&self.store);
                    tokio::task::spawn_blocking(move || {
                        let _permit = permit;
                        handle_request(&store, request)
                    })
                }
            };

            if tx.send(pending).await.is_err() {
                log::warn!("Response writer stopped early");
                break;
            }
        }

        drop(tx);
        let written = writer_task.await.context("Response writer panicked")?;

        self.shutdown.store(true, Ordering::Relaxed);
        notifier.abort();
        log::info!("Server shutting down");

        written
    }

    async fn write_responses<W>(mut rx: mpsc::Receiver<JoinHandle<Response>>, mut writer: W) -> eyre::Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        while let Some(pending) = rx.recv().await {
            let response = pending.await.unwrap_or_else(|e| {
                log::error!("Request worker failed: {}", e);
                Response::Error {
                    status: ErrorKind::Internal.status_code(),
                    kind: ErrorKind::Internal,
                    message: "internal error".to_string(),
                }
            });

            let json = serde_json::to_string(&response).context("Failed to serialize response")?;
            writer.write_all(json.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await?;
        }

        writer.shutdown().await?;
        Ok(())
    }
}

fn ready(response: Response) -> JoinHandle<Response> {
    tokio::spawn(async move { response })
}

/// Handle a single request against the store.
pub fn handle_request<S: GraphStore>(store: &Store<S>, request: Request) -> Response {
    match request {
        Request::CreateTask { fields } => respond(store.create_task(fields), |task| Response::Task { task }),

        Request::ListTasks {
            page,
            page_size,
            status,
        } => respond(store.list_tasks(page, page_size, status), |page| Response::Page { page }),

        Request::GetTask { id } => respond(store.get_task(id), |task| Response::Task { task }),

        Request::UpdateTask { id, fields } => respond(store.update_task(id, fields), |task| Response::Task { task }),

        Request::DeleteTask { id } => respond(store.delete_task(id), |()| Response::Ok),

        Request::AddDependency {
            task_id,
            depends_on_id,
        } => respond(store.add_dependency(task_id, depends_on_id), |edge| Response::Edge {
            edge,
        }),

        Request::GetDependencies { id } => respond(store.dependencies(id), |ids| Response::Dependencies { ids }),

        Request::Shutdown => Response::Ok,

        Request::Ping => Response::Pong,
    }
}

fn respond<T>(result: Result<T>, ok: impl FnOnce(T) -> Response) -> Response {
    match result {
        Ok(value) => ok(value),
        Err(e) if e.is_domain() => {
            log::debug!("Request rejected: {}", e);
            Response::from(e)
        }
        Err(e) => {
            log::error!("Request failed: {}", e);
            Response::from(e)
        }
    }
}
