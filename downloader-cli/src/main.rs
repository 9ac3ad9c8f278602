mod cli;
mod logging;
mod progress;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use downloader_core::config::Filetype;
use downloader_core::DownloaderEngine;

use cli::{Cli, Command, SettingsAction};
use progress::CliObserver;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("error: {error:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let data_dir = cli.data_dir.clone().unwrap_or_else(default_data_dir);
    tokio::fs::create_dir_all(&data_dir)
        .await
        .context("failed to prepare the data directory")?;
    let _log_guard = logging::init(&data_dir, cli.verbose, cli.quiet)?;

    let engine = DownloaderEngine::new(data_dir)
        .await
        .context("failed to start the download engine")?;

    let observer = Arc::new(CliObserver::new());
    engine.set_enqueue_observer(observer.clone()).await;
    engine.set_action_observer(observer.clone()).await;

    match cli.command {
        Command::Login { username, password } => {
            engine.login(username, password).await;
            observer.wait_until_idle().await;
            if engine.is_authed().await {
                println!("logged in");
            } else {
                println!("login failed");
            }
        }
        Command::Logout => {
            engine.logout().await;
            println!("logged out");
        }
        Command::Settings { action } => handle_settings(&engine, action).await?,
        Command::Fetch {
            work_urls,
            series_urls,
            usernames,
            bookmark_usernames,
            generic_url,
            start,
            end,
            download,
        } => {
            engine.load_works_from_work_urls(&work_urls).await;
            engine.load_works_from_series_urls(&series_urls).await;
            engine.load_works_by_usernames(&usernames).await;
            engine.load_bookmarks_by_usernames(&bookmark_usernames).await;
            if let Some(url) = generic_url {
                engine.load_works_from_generic_url(url, start, end).await;
            }
            observer.wait_until_idle().await;
            if download {
                engine.download_all().await;
                observer.wait_until_idle().await;
            }
        }
        Command::Download { ids, all } => {
            if all {
                engine.download_all().await;
            } else {
                for id in ids {
                    engine.download_work(id).await;
                }
            }
            observer.wait_until_idle().await;
        }
        Command::Remove { ids, all } => {
            if all {
                engine.remove_all().await;
            } else {
                for id in ids {
                    engine.remove(id).await;
                }
            }
        }
    }

    engine.stop().await;
    Ok(())
}

async fn handle_settings(engine: &DownloaderEngine, action: SettingsAction) -> Result<()> {
    match action {
        SettingsAction::Show => {
            let settings = engine.get_settings().await;
            println!("username: {}", settings.username);
            println!("downloads_dir: {}", settings.downloads_dir.display());
            println!("filetype: {}", settings.filetype.as_upper_str());
            println!("should_use_threading: {}", settings.should_use_threading);
            println!("concurrency_limit: {}", settings.concurrency_limit);
            println!("should_rate_limit: {}", settings.should_rate_limit);
        }
        SettingsAction::Set {
            username,
            password,
            downloads_dir,
            filetype,
            concurrency_limit,
            rate_limit,
            threading,
        } => {
            let current = engine.get_settings().await;
            let filetype = match filetype {
                Some(raw) => parse_filetype(&raw)?,
                None => current.filetype,
            };
            engine
                .update_settings(
                    username.unwrap_or(current.username),
                    password.unwrap_or(current.password),
                    downloads_dir.unwrap_or(current.downloads_dir),
                    filetype,
                    threading.unwrap_or(current.should_use_threading),
                    concurrency_limit.unwrap_or(current.concurrency_limit),
                    rate_limit.unwrap_or(current.should_rate_limit),
                )
                .await
                .context("failed to persist settings")?;
            println!("settings updated");
        }
    }
    Ok(())
}

fn parse_filetype(raw: &str) -> Result<Filetype> {
    match raw.to_ascii_uppercase().as_str() {
        "AZW3" => Ok(Filetype::Azw3),
        "EPUB" => Ok(Filetype::Epub),
        "HTML" => Ok(Filetype::Html),
        "MOBI" => Ok(Filetype::Mobi),
        "PDF" => Ok(Filetype::Pdf),
        other => anyhow::bail!("unknown filetype {other:?}, expected one of AZW3/EPUB/HTML/MOBI/PDF"),
    }
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".downloader")
}
