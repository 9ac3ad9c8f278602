//! Lifecycle Controller (C10): construction, settings load, worker startup
//! and clean shutdown; the single entry point a GUI front-end and a
//! headless CLI both drive (spec §4.8).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{info, instrument};

use crate::action::Action;
use crate::active_set::ActiveSet;
use crate::cache::WorkCache;
use crate::client::ArchiveClient;
use crate::config::{ConfigError, Configuration};
use crate::error::ClientError;
use crate::handler::{self, EngineState};
use crate::observer::{EngineObserver, ObserverEvent, ObserverSlot, ObserverStage, Payload};
use crate::queue::ActionQueue;
use crate::resolver::{series_id_from_url, work_id_from_url};
use crate::retry::RetryTable;
use crate::session::Session;
use crate::Status;

const MIN_WORKERS: u32 = 1;
const MAX_WORKERS: u32 = 50;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to prepare data directory: {0}")]
    DataDir(#[source] std::io::Error),
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("failed to build archive client: {0}")]
    Client(#[from] ClientError),
}

/// The asynchronous job engine: action queue, worker pool, work cache,
/// retry subsystem and observer protocol, wired together.
pub struct DownloaderEngine {
    base_dir: PathBuf,
    config_path: PathBuf,
    cache: Arc<WorkCache>,
    active_set: Arc<ActiveSet>,
    queue: ActionQueue,
    retry: Arc<RetryTable>,
    session: Arc<RwLock<Session>>,
    config: Arc<RwLock<Configuration>>,
    client: Arc<ArchiveClient>,
    enqueue_observer: Arc<ObserverSlot>,
    action_observer: Arc<ObserverSlot>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl DownloaderEngine {
    /// Builds the engine rooted at `base_dir`, loading (or bootstrapping)
    /// `<base_dir>/settings.ini` and starting the worker pool. Does **not**
    /// auto-login (spec §4.8 step 7): the caller decides.
    #[instrument(skip_all, fields(base_dir = %base_dir.display()))]
    pub async fn new(base_dir: PathBuf) -> Result<Arc<Self>, EngineError> {
        let config = Self::load_config(&base_dir).await?;
        let client = ArchiveClient::new(config.should_rate_limit)?;
        Self::with_client(base_dir, config, client).await
    }

    /// Builds the engine with a caller-supplied [`ArchiveClient`] instead of
    /// the real archive, so tests can point every request at a `wiremock`
    /// server.
    pub async fn with_client(
        base_dir: PathBuf,
        config: Configuration,
        client: ArchiveClient,
    ) -> Result<Arc<Self>, EngineError> {
        tokio::fs::create_dir_all(base_dir.join("data"))
            .await
            .map_err(EngineError::DataDir)?;
        let config_path = base_dir.join(crate::config::CONFIGURATION_FILE);
        let client = Arc::new(client);
        let queue = ActionQueue::new();
        let retry = Arc::new(RetryTable::new(queue.clone()));

        let engine = Arc::new(Self {
            base_dir,
            config_path,
            cache: Arc::new(WorkCache::new()),
            active_set: Arc::new(ActiveSet::new()),
            queue,
            retry,
            session: Arc::new(RwLock::new(Session::Guest)),
            config: Arc::new(RwLock::new(config)),
            client,
            enqueue_observer: Arc::new(ObserverSlot::new()),
            action_observer: Arc::new(ObserverSlot::new()),
            workers: Mutex::new(Vec::new()),
        });

        engine.spawn_workers().await;
        info!(workers = engine.workers.lock().await.len(), "engine started");
        Ok(engine)
    }

    async fn load_config(base_dir: &Path) -> Result<Configuration, EngineError> {
        let data_dir = base_dir.join("data");
        tokio::fs::create_dir_all(&data_dir)
            .await
            .map_err(EngineError::DataDir)?;
        let config_path = base_dir.join(crate::config::CONFIGURATION_FILE);
        Ok(Configuration::load(&config_path)?)
    }

    async fn spawn_workers(self: &Arc<Self>) {
        let config = self.config.read().await;
        let worker_count = if !config.should_use_threading || config.concurrency_limit == 1 {
            1
        } else {
            config.concurrency_limit.clamp(MIN_WORKERS, MAX_WORKERS)
        };
        drop(config);

        let mut workers = self.workers.lock().await;
        for _ in 0..worker_count {
            let engine = Arc::clone(self);
            workers.push(tokio::spawn(async move { engine.worker_loop().await }));
        }
    }

    fn state(&self) -> EngineState {
        EngineState {
            client: Arc::clone(&self.client),
            cache: Arc::clone(&self.cache),
            active_set: Arc::clone(&self.active_set),
            queue: self.queue.clone(),
            session: Arc::clone(&self.session),
            config: Arc::clone(&self.config),
            config_path: self.config_path.clone(),
            action_observer: Arc::clone(&self.action_observer),
        }
    }

    /// One worker's loop (spec §4.4).
    async fn worker_loop(self: Arc<Self>) {
        let state = self.state();
        loop {
            let Some(action) = self.queue.pop().await else {
                break;
            };

            if matches!(action, Action::Sentinel) {
                // Re-enqueue so sibling workers also wake, then terminate.
                self.queue.push(Action::Sentinel);
                break;
            }

            if let Some(id) = action.work_id() {
                if !self.active_set.contains(id) {
                    continue;
                }
            }

            let identifier = action.identifier();
            let kind = action.kind();
            self.action_observer
                .fire(ObserverEvent {
                    stage: ObserverStage::BeforeAction,
                    kind,
                    identifier: identifier.clone(),
                    status: None,
                    payload: Payload::default(),
                })
                .await;

            let (status, mut payload) = handler::dispatch(&action, &state).await;

            if let Some(id) = action.work_id() {
                if !self.active_set.contains(id) {
                    continue;
                }
            }

            match status {
                Status::Retry => {
                    let delay = self.retry.schedule(action.clone()).await;
                    payload.error = Some(format!(
                        "Hit rate limit, trying again in {}s...",
                        delay.as_secs()
                    ));
                }
                Status::Ok => {
                    self.retry.cancel_key(&action.retry_key()).await;
                }
                Status::Error => {}
            }

            self.action_observer
                .fire(ObserverEvent {
                    stage: ObserverStage::AfterAction,
                    kind,
                    identifier,
                    status: Some(status),
                    payload,
                })
                .await;
        }
    }

    async fn enqueue(&self, action: Action) {
        let identifier = action.identifier();
        let kind = action.kind();
        self.enqueue_observer
            .fire(ObserverEvent {
                stage: ObserverStage::BeforeEnqueue,
                kind,
                identifier: identifier.clone(),
                status: None,
                payload: Payload::default(),
            })
            .await;
        self.queue.push(action);
        self.enqueue_observer
            .fire(ObserverEvent {
                stage: ObserverStage::AfterEnqueue,
                kind,
                identifier,
                status: None,
                payload: Payload::default(),
            })
            .await;
    }

    // ---- read-only public API (spec §6.3) ----

    pub async fn config(&self) -> Configuration {
        self.config.read().await.clone()
    }

    pub async fn session(&self) -> Session {
        self.session.read().await.clone()
    }

    pub async fn is_authed(&self) -> bool {
        self.session.read().await.is_authed()
    }

    // ---- commands (spec §6.3) ----

    pub async fn login(&self, username: impl Into<String>, password: impl Into<String>) {
        self.enqueue(Action::Login {
            username: username.into(),
            password: password.into(),
        })
        .await;
    }

    pub async fn logout(&self) {
        *self.session.write().await = Session::Guest;
        info!("logged out");
    }

    pub async fn get_settings(&self) -> Configuration {
        self.config().await
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn update_settings(
        &self,
        username: String,
        password: String,
        downloads_dir: PathBuf,
        filetype: crate::config::Filetype,
        should_use_threading: bool,
        concurrency_limit: u32,
        should_rate_limit: bool,
    ) -> Result<(), EngineError> {
        let mut config = self.config.write().await;
        config.username = username;
        config.password = password;
        config.downloads_dir = downloads_dir;
        config.filetype = filetype;
        config.should_use_threading = should_use_threading;
        config.concurrency_limit = concurrency_limit;
        config.should_rate_limit = should_rate_limit;
        config.write_to_file(&self.config_path)?;
        Ok(())
    }

    pub async fn remove(&self, work_id: u64) {
        self.active_set.remove(work_id);
        self.cache.remove(work_id);
        self.retry.cancel_for_work_id(work_id).await;
    }

    pub async fn remove_all(&self) {
        for id in self.active_set.snapshot() {
            self.remove(id).await;
        }
    }

    pub async fn download_work(&self, work_id: u64) {
        self.active_set.add(work_id);
        self.enqueue(Action::DownloadWork(work_id)).await;
    }

    pub async fn download_all(&self) {
        for id in self.active_set.snapshot() {
            self.enqueue(Action::DownloadWork(id)).await;
        }
    }

    pub async fn load_works_from_work_urls(&self, urls: &[String]) {
        for url in urls {
            let Some(id) = work_id_from_url(url) else {
                continue;
            };
            self.active_set.add(id);
            self.enqueue(Action::LoadWork(id)).await;
        }
    }

    pub async fn load_works_from_series_urls(&self, urls: &[String]) {
        for url in urls {
            let Some(id) = series_id_from_url(url) else {
                continue;
            };
            self.enqueue(Action::LoadSeries(id)).await;
        }
    }

    pub async fn load_works_by_usernames(&self, names: &[String]) {
        for name in names {
            self.enqueue(Action::LoadUserWorks(name.clone())).await;
        }
    }

    pub async fn load_bookmarks_by_usernames(&self, names: &[String]) {
        for name in names {
            self.enqueue(Action::LoadUserBookmarks(name.clone())).await;
        }
    }

    pub async fn load_works_from_generic_url(&self, url: impl Into<String>, start: u32, end: u32) {
        self.enqueue(Action::LoadResultsList {
            url: url.into(),
            start,
            end,
        })
        .await;
    }

    pub async fn set_enqueue_observer(&self, observer: Arc<dyn EngineObserver>) {
        self.enqueue_observer.set(observer).await;
    }

    pub async fn set_action_observer(&self, observer: Arc<dyn EngineObserver>) {
        self.action_observer.set(observer).await;
    }

    /// Drains all workers and cancels all armed timers (spec §4.8 shutdown).
    #[instrument(skip(self))]
    pub async fn stop(&self) {
        self.queue.push(Action::Sentinel);
        self.active_set.clear();
        self.cache.clear();

        let mut workers = self.workers.lock().await;
        for worker in workers.drain(..) {
            let _ = worker.await;
        }

        self.retry.cancel_all().await;
        info!("engine stopped");
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn constructs_and_stops_cleanly() {
        let dir = tempdir().expect("tempdir");
        let engine = DownloaderEngine::new(dir.path().to_path_buf())
            .await
            .expect("engine builds");
        assert!(!engine.is_authed().await);
        engine.stop().await;
    }

    #[tokio::test]
    async fn bootstraps_settings_file_on_first_run() {
        let dir = tempdir().expect("tempdir");
        let engine = DownloaderEngine::new(dir.path().to_path_buf())
            .await
            .expect("engine builds");
        assert!(dir.path().join(crate::config::CONFIGURATION_FILE).exists());
        engine.stop().await;
    }
}
