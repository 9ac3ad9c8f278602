// Tauri desktop app for the archive downloader.
// Commands wire the frontend to `downloader_core` via Tauri IPC.

mod commands;

use std::path::PathBuf;
use std::sync::Arc;

use commands::{AppState, TauriObserver};
use downloader_core::DownloaderEngine;
use tauri::Manager;

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".downloader")
}

#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    tauri::Builder::default()
        .plugin(tauri_plugin_opener::init())
        .setup(|app| {
            let handle = app.handle().clone();
            let engine = tauri::async_runtime::block_on(DownloaderEngine::new(default_data_dir()))
                .expect("failed to start the download engine");

            let observer = Arc::new(TauriObserver::new(handle));
            tauri::async_runtime::block_on(async {
                engine.set_enqueue_observer(observer.clone()).await;
                engine.set_action_observer(observer).await;
            });

            app.manage(AppState { engine });
            Ok(())
        })
        .invoke_handler(tauri::generate_handler![
            commands::get_session,
            commands::login,
            commands::logout,
            commands::get_settings,
            commands::update_settings,
            commands::load_works_from_work_urls,
            commands::load_works_from_series_urls,
            commands::load_works_by_usernames,
            commands::load_bookmarks_by_usernames,
            commands::load_works_from_generic_url,
            commands::download_work,
            commands::download_all,
            commands::remove,
            commands::remove_all,
        ])
        .run(tauri::generate_context!())
        .expect("error while running tauri application");
}
