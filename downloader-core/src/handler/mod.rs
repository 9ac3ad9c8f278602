//! Action Handlers (C8): one handler per action kind, each returning
//! `(Status, payload)` per spec §4.6's table.

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::action::{Action, ActionKind, Identifier};
use crate::active_set::ActiveSet;
use crate::cache::WorkCache;
use crate::client::ArchiveClient;
use crate::config::Configuration;
use crate::error::ClientError;
use crate::observer::{ObserverEvent, ObserverSlot, ObserverStage, Payload};
use crate::queue::ActionQueue;
use crate::session::Session;
use crate::slug::slugify;
use crate::Status;

/// Shared state every handler needs. Cheap to clone (everything inside is
/// an `Arc`); handed to each worker.
#[derive(Clone)]
pub struct EngineState {
    pub client: Arc<ArchiveClient>,
    pub cache: Arc<WorkCache>,
    pub active_set: Arc<ActiveSet>,
    pub queue: ActionQueue,
    pub session: Arc<RwLock<Session>>,
    pub config: Arc<RwLock<Configuration>>,
    pub config_path: std::path::PathBuf,
    pub action_observer: Arc<ObserverSlot>,
}

impl EngineState {
    async fn session_snapshot(&self) -> Session {
        self.session.read().await.clone()
    }
}

/// Dispatches one action to its handler. Called by the worker loop after
/// the Active-Set gate (spec §4.4 steps 4-5).
pub async fn dispatch(action: &Action, state: &EngineState) -> (Status, Payload) {
    match action {
        Action::LoadWork(id) => handle_load_work(*id, state).await,
        Action::DownloadWork(id) => handle_download_work(*id, state).await,
        Action::LoadSeries(id) => handle_load_series(*id, state).await,
        Action::LoadUserWorks(user) => handle_load_user_works(user, state).await,
        Action::LoadUserBookmarks(user) => handle_load_user_bookmarks(user, state).await,
        Action::LoadResultsList { url, start, end } => {
            handle_load_results_list(url, *start, *end, state).await
        }
        Action::LoadResultsPage { url, page } => handle_load_results_page(url, *page, state).await,
        Action::Login { username, password } => handle_login(username, password, state).await,
        Action::Sentinel => (Status::Ok, Payload::default()),
    }
}

async fn handle_load_work(work_id: u64, state: &EngineState) -> (Status, Payload) {
    if let Some(item) = state.cache.get(work_id) {
        if item.is_loaded() {
            let mut payload = Payload::default();
            payload.work_title = item.metadata.map(|metadata| metadata.title);
            return (Status::Ok, payload);
        }
    }

    let session = state.session_snapshot().await;
    match state.client.reload_work(work_id, &session).await {
        Ok(metadata) => {
            let title = metadata.title.clone();
            state.cache.entry_with(work_id, |item| item.metadata = Some(metadata));
            let mut payload = Payload::default();
            payload.work_title = Some(title);
            (Status::Ok, payload)
        }
        Err(ClientError::RateLimited) => rate_limited_payload(),
        Err(ClientError::AuthRequired) => error_payload(
            "Work is only accessible to logged-in users.",
        ),
        Err(other) => error_payload(&other.to_string()),
    }
}

async fn handle_download_work(work_id: u64, state: &EngineState) -> (Status, Payload) {
    if let Some(item) = state.cache.get(work_id) {
        if let Some(path) = &item.download_path {
            if path.exists() {
                let mut payload = Payload::default();
                payload.download_path = Some(path.clone());
                return (Status::Ok, payload);
            }
        }
    }

    // Ensure loaded first, recursively invoking LoadWork's own observer
    // pair for continuity (spec §4.6) rather than silently reusing its
    // result.
    let loaded = state.cache.get(work_id).map(|item| item.is_loaded()).unwrap_or(false);
    if !loaded {
        let identifier = Identifier::WorkId(work_id);
        state
            .action_observer
            .fire(ObserverEvent {
                stage: ObserverStage::BeforeAction,
                kind: ActionKind::LoadWork,
                identifier: identifier.clone(),
                status: None,
                payload: Payload::default(),
            })
            .await;
        let (status, payload) = handle_load_work(work_id, state).await;
        state
            .action_observer
            .fire(ObserverEvent {
                stage: ObserverStage::AfterAction,
                kind: ActionKind::LoadWork,
                identifier,
                status: Some(status),
                payload: payload.clone(),
            })
            .await;
        if status != Status::Ok {
            return (status, payload);
        }
    }

    let Some(item) = state.cache.get(work_id) else {
        return error_payload("work vanished from cache before download");
    };
    let Some(metadata) = item.metadata else {
        return error_payload("work has no metadata after load");
    };

    let session = state.session_snapshot().await;
    let filetype = state.config.read().await.filetype;
    let bytes = match state.client.download_work(work_id, filetype, &session).await {
        Ok(bytes) => bytes,
        Err(ClientError::RateLimited) => return rate_limited_payload(),
        Err(other) => return error_payload(&other.to_string()),
    };

    let downloads_dir = state.config.read().await.downloads_dir.clone();
    let username = session.username().to_string();
    let target_dir = downloads_dir.join(&username);
    if let Err(source) = tokio::fs::create_dir_all(&target_dir).await {
        return error_payload(&format!("failed to create download directory: {source}"));
    }

    let filename = format!("{work_id}_{}.{}", slugify(&metadata.title), filetype.as_extension());
    let final_path = target_dir.join(filename);
    let temp_path = final_path.with_extension(format!("{}.part", filetype.as_extension()));

    if let Err(source) = tokio::fs::write(&temp_path, &bytes).await {
        return error_payload(&format!("failed to write download: {source}"));
    }
    if let Err(source) = tokio::fs::rename(&temp_path, &final_path).await {
        let _ = tokio::fs::remove_file(&temp_path).await;
        return error_payload(&format!("failed to finalize download: {source}"));
    }

    state
        .cache
        .entry_with(work_id, |item| item.download_path = Some(final_path.clone()));

    let mut payload = Payload::default();
    payload.download_path = Some(final_path);
    (Status::Ok, payload)
}

async fn handle_load_series(series_id: u64, state: &EngineState) -> (Status, Payload) {
    let session = state.session_snapshot().await;
    match state.client.get_series(series_id, &session).await {
        Ok(stubs) => {
            let ids: Vec<u64> = stubs.iter().map(|stub| stub.work_id).collect();
            for id in &ids {
                state.active_set.add(*id);
                state.queue.push(Action::LoadWork(*id));
            }
            let mut payload = Payload::default();
            payload.results = Some(ids);
            payload.series_id = Some(series_id);
            (Status::Ok, payload)
        }
        Err(ClientError::RateLimited) => rate_limited_payload(),
        Err(other) => error_payload(&other.to_string()),
    }
}

async fn handle_load_user_works(user: &str, state: &EngineState) -> (Status, Payload) {
    let session = state.session_snapshot().await;
    match state.client.user_exists(user, &session).await {
        Ok(false) => return error_payload("User does not exist"),
        Err(ClientError::RateLimited) => return rate_limited_payload(),
        Err(other) => return error_payload(&other.to_string()),
        Ok(true) => {}
    }

    match state.client.get_user_works(user, &session).await {
        Ok(stubs) => enqueue_loads(stubs, user, state),
        Err(ClientError::RateLimited) => rate_limited_payload(),
        Err(other) => error_payload(&other.to_string()),
    }
}

async fn handle_load_user_bookmarks(user: &str, state: &EngineState) -> (Status, Payload) {
    let session = state.session_snapshot().await;
    let is_own_bookmarks = session.is_authed() && session.username() == user;

    if !is_own_bookmarks {
        match state.client.user_exists(user, &session).await {
            Ok(false) => return error_payload("User does not exist"),
            Err(ClientError::RateLimited) => return rate_limited_payload(),
            Err(other) => return error_payload(&other.to_string()),
            Ok(true) => {}
        }
    }

    let result = if is_own_bookmarks {
        state.client.get_own_bookmarks(&session).await
    } else {
        state.client.get_user_bookmarks(user, &session).await
    };

    match result {
        Ok(stubs) => enqueue_loads(stubs, user, state),
        Err(ClientError::RateLimited) => rate_limited_payload(),
        Err(other) => error_payload(&other.to_string()),
    }
}

fn enqueue_loads(stubs: Vec<crate::client::WorkStub>, user: &str, state: &EngineState) -> (Status, Payload) {
    let ids: Vec<u64> = stubs.iter().map(|stub| stub.work_id).collect();
    for id in &ids {
        state.active_set.add(*id);
        state.queue.push(Action::LoadWork(*id));
    }
    let mut payload = Payload::default();
    payload.results = Some(ids);
    payload.user = Some(user.to_string());
    (Status::Ok, payload)
}

async fn handle_load_results_list(url: &str, start: u32, end: u32, state: &EngineState) -> (Status, Payload) {
    let Some(normalized) =
        crate::resolver::normalize_listing_url(url, None, state.client.archive_host())
    else {
        return error_payload("URL is not on the archive host");
    };

    let session = state.session_snapshot().await;
    let total_pages = match state.client.fetch_listing(&normalized, &session).await {
        Ok(total) => total,
        Err(ClientError::RateLimited) => return rate_limited_payload(),
        Err(other) => return error_payload(&other.to_string()),
    };

    // `end == 0` means "all pages" (spec §4.6 edge cases).
    let last_page = if end == 0 { total_pages } else { end.min(total_pages) };
    let first_page = start.max(1);
    for page in first_page..=last_page {
        state.queue.push(Action::LoadResultsPage {
            url: normalized.clone(),
            page,
        });
    }

    (Status::Ok, Payload::default())
}

async fn handle_load_results_page(url: &str, page: u32, state: &EngineState) -> (Status, Payload) {
    let session = state.session_snapshot().await;
    match state.client.fetch_listing_page(url, page, &session).await {
        Ok(ids) => {
            for id in &ids {
                state.active_set.add(*id);
                state.queue.push(Action::LoadWork(*id));
            }
            let mut payload = Payload::default();
            payload.results = Some(ids);
            payload.results_page = Some(page);
            (Status::Ok, payload)
        }
        Err(ClientError::RateLimited) => rate_limited_payload(),
        Err(other) => error_payload(&other.to_string()),
    }
}

async fn handle_login(username: &str, password: &str, state: &EngineState) -> (Status, Payload) {
    {
        let mut session = state.session.write().await;
        *session = Session::Guest;
    }

    match state.client.login(username, password).await {
        Ok(authenticated) => {
            let data_dir = state.config_path.parent().map(|dir| dir.join("data").join(username));
            if let Some(dir) = data_dir {
                if let Err(source) = tokio::fs::create_dir_all(&dir).await {
                    warn!(error = %source, "failed to create user data directory");
                }
            }
            *state.session.write().await = authenticated;
            info!(user = username, "authenticated");
            let mut payload = Payload::default();
            payload.user = Some(username.to_string());
            (Status::Ok, payload)
        }
        Err(ClientError::RateLimited) => error_payload("rate limited"),
        Err(ClientError::InvalidCredentials) => error_payload("Invalid username or password."),
        Err(other) => error_payload(&other.to_string()),
    }
}

fn rate_limited_payload() -> (Status, Payload) {
    (Status::Retry, Payload::default())
}

fn error_payload(message: &str) -> (Status, Payload) {
    let mut payload = Payload::default();
    payload.error = Some(message.to_string());
    (Status::Error, payload)
}

