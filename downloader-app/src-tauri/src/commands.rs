//! Tauri commands bridging the frontend to [`downloader_core::DownloaderEngine`].
//!
//! Core types stay serde-free; every value crossing the IPC boundary gets a
//! small DTO here instead.

use std::path::PathBuf;
use std::sync::Arc;

use downloader_core::config::Filetype;
use downloader_core::{
    ActionKind, DownloaderEngine, EngineObserver, Identifier, ObserverEvent, ObserverStage, Session,
    Status,
};
use serde::Serialize;
use tauri::{AppHandle, Emitter};

/// Managed Tauri state: the one engine instance backing this app.
pub struct AppState {
    pub engine: Arc<DownloaderEngine>,
}

/// Emits every observer event to the frontend as `"engine://event"`, so the
/// UI can drive a live progress view without polling.
pub struct TauriObserver {
    app: AppHandle,
}

impl TauriObserver {
    pub fn new(app: AppHandle) -> Self {
        Self { app }
    }
}

impl EngineObserver for TauriObserver {
    fn on_event(&self, event: ObserverEvent) {
        let _ = self.app.emit("engine://event", EngineEventDto::from(event));
    }
}

#[derive(Debug, Serialize, Clone)]
pub struct EngineEventDto {
    pub stage: &'static str,
    pub kind: &'static str,
    pub identifier: String,
    pub status: Option<&'static str>,
    pub work_title: Option<String>,
    pub download_path: Option<String>,
    pub error: Option<String>,
}

impl From<ObserverEvent> for EngineEventDto {
    fn from(event: ObserverEvent) -> Self {
        Self {
            stage: match event.stage {
                ObserverStage::BeforeEnqueue => "before_enqueue",
                ObserverStage::AfterEnqueue => "after_enqueue",
                ObserverStage::BeforeAction => "before_action",
                ObserverStage::AfterAction => "after_action",
            },
            kind: match event.kind {
                ActionKind::LoadWork => "load_work",
                ActionKind::DownloadWork => "download_work",
                ActionKind::LoadSeries => "load_series",
                ActionKind::LoadUserWorks => "load_user_works",
                ActionKind::LoadUserBookmarks => "load_user_bookmarks",
                ActionKind::LoadResultsList => "load_results_list",
                ActionKind::LoadResultsPage => "load_results_page",
                ActionKind::Login => "login",
                ActionKind::Sentinel => "sentinel",
            },
            identifier: match event.identifier {
                Identifier::WorkId(id) => id.to_string(),
                Identifier::SeriesId(id) => id.to_string(),
                Identifier::Username(name) => name,
                Identifier::ListingUrl(url) => url,
                Identifier::None => String::new(),
            },
            status: event.status.map(|status| match status {
                Status::Ok => "ok",
                Status::Error => "error",
                Status::Retry => "retry",
            }),
            work_title: event.payload.work_title,
            download_path: event.payload.download_path.map(|path| path.display().to_string()),
            error: event.payload.error,
        }
    }
}

#[derive(Debug, Serialize, Clone)]
pub struct SessionDto {
    pub is_authed: bool,
    pub username: String,
}

#[derive(Debug, Serialize, Clone)]
pub struct SettingsDto {
    pub username: String,
    pub downloads_dir: String,
    pub filetype: String,
    pub should_use_threading: bool,
    pub concurrency_limit: u32,
    pub should_rate_limit: bool,
}

impl From<downloader_core::Configuration> for SettingsDto {
    fn from(config: downloader_core::Configuration) -> Self {
        Self {
            username: config.username,
            downloads_dir: config.downloads_dir.display().to_string(),
            filetype: config.filetype.as_upper_str().to_string(),
            should_use_threading: config.should_use_threading,
            concurrency_limit: config.concurrency_limit,
            should_rate_limit: config.should_rate_limit,
        }
    }
}

fn session_dto(session: &Session) -> SessionDto {
    SessionDto {
        is_authed: session.is_authed(),
        username: session.username().to_string(),
    }
}

fn parse_filetype(raw: &str) -> Result<Filetype, String> {
    match raw.to_ascii_uppercase().as_str() {
        "AZW3" => Ok(Filetype::Azw3),
        "EPUB" => Ok(Filetype::Epub),
        "HTML" => Ok(Filetype::Html),
        "MOBI" => Ok(Filetype::Mobi),
        "PDF" => Ok(Filetype::Pdf),
        other => Err(format!("unknown filetype {other:?}")),
    }
}

#[tauri::command]
pub async fn get_session(state: tauri::State<'_, AppState>) -> Result<SessionDto, String> {
    Ok(session_dto(&state.engine.session().await))
}

#[tauri::command]
pub async fn login(
    state: tauri::State<'_, AppState>,
    username: String,
    password: String,
) -> Result<(), String> {
    state.engine.login(username, password).await;
    Ok(())
}

#[tauri::command]
pub async fn logout(state: tauri::State<'_, AppState>) -> Result<(), String> {
    state.engine.logout().await;
    Ok(())
}

#[tauri::command]
pub async fn get_settings(state: tauri::State<'_, AppState>) -> Result<SettingsDto, String> {
    Ok(state.engine.get_settings().await.into())
}

#[allow(clippy::too_many_arguments)]
#[tauri::command]
pub async fn update_settings(
    state: tauri::State<'_, AppState>,
    username: String,
    password: String,
    downloads_dir: String,
    filetype: String,
    should_use_threading: bool,
    concurrency_limit: u32,
    should_rate_limit: bool,
) -> Result<(), String> {
    let filetype = parse_filetype(&filetype)?;
    state
        .engine
        .update_settings(
            username,
            password,
            PathBuf::from(downloads_dir),
            filetype,
            should_use_threading,
            concurrency_limit,
            should_rate_limit,
        )
        .await
        .map_err(|error| error.to_string())
}

#[tauri::command]
pub async fn load_works_from_work_urls(state: tauri::State<'_, AppState>, urls: Vec<String>) -> Result<(), String> {
    state.engine.load_works_from_work_urls(&urls).await;
    Ok(())
}

#[tauri::command]
pub async fn load_works_from_series_urls(
    state: tauri::State<'_, AppState>,
    urls: Vec<String>,
) -> Result<(), String> {
    state.engine.load_works_from_series_urls(&urls).await;
    Ok(())
}

#[tauri::command]
pub async fn load_works_by_usernames(state: tauri::State<'_, AppState>, usernames: Vec<String>) -> Result<(), String> {
    state.engine.load_works_by_usernames(&usernames).await;
    Ok(())
}

#[tauri::command]
pub async fn load_bookmarks_by_usernames(
    state: tauri::State<'_, AppState>,
    usernames: Vec<String>,
) -> Result<(), String> {
    state.engine.load_bookmarks_by_usernames(&usernames).await;
    Ok(())
}

#[tauri::command]
pub async fn load_works_from_generic_url(
    state: tauri::State<'_, AppState>,
    url: String,
    start: u32,
    end: u32,
) -> Result<(), String> {
    state.engine.load_works_from_generic_url(url, start, end).await;
    Ok(())
}

#[tauri::command]
pub async fn download_work(state: tauri::State<'_, AppState>, work_id: u64) -> Result<(), String> {
    state.engine.download_work(work_id).await;
    Ok(())
}

#[tauri::command]
pub async fn download_all(state: tauri::State<'_, AppState>) -> Result<(), String> {
    state.engine.download_all().await;
    Ok(())
}

#[tauri::command]
pub async fn remove(state: tauri::State<'_, AppState>, work_id: u64) -> Result<(), String> {
    state.engine.remove(work_id).await;
    Ok(())
}

#[tauri::command]
pub async fn remove_all(state: tauri::State<'_, AppState>) -> Result<(), String> {
    state.engine.remove_all().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use downloader_core::{Payload, Status as CoreStatus};

    #[test]
    fn event_dto_maps_stage_and_kind_to_stable_strings() {
        let dto = EngineEventDto::from(ObserverEvent {
            stage: ObserverStage::AfterAction,
            kind: ActionKind::DownloadWork,
            identifier: Identifier::WorkId(42),
            status: Some(CoreStatus::Ok),
            payload: Payload::default(),
        });
        assert_eq!(dto.stage, "after_action");
        assert_eq!(dto.kind, "download_work");
        assert_eq!(dto.identifier, "42");
        assert_eq!(dto.status, Some("ok"));
    }
}
