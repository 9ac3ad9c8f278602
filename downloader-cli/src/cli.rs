//! Command-line surface. Every subcommand maps directly onto a
//! [`downloader_core::DownloaderEngine`] public method.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "downloader", version, about = "Bulk-download works from an online fiction archive")]
pub struct Cli {
    /// Directory holding `settings.ini` and downloaded files. Defaults to
    /// `~/.downloader`.
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Increase log verbosity (-v for debug, -vv for trace). Ignored if `--quiet` is set.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress all but error-level logging.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Authenticates and persists the session for subsequent commands in this run.
    Login { username: String, password: String },

    /// Drops back to a guest session.
    Logout,

    /// Reads or edits `settings.ini`.
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },

    /// Enqueues works for loading (and optionally downloading) from any mix
    /// of work URLs, series URLs, usernames, bookmark usernames, or a
    /// generic search/listing URL.
    Fetch {
        #[arg(long = "work-url")]
        work_urls: Vec<String>,

        #[arg(long = "series-url")]
        series_urls: Vec<String>,

        #[arg(long = "username")]
        usernames: Vec<String>,

        #[arg(long = "bookmark-username")]
        bookmark_usernames: Vec<String>,

        /// Any listing/search-results URL on the archive, paged from `start`
        /// to `end` (`end = 0` means every page).
        #[arg(long)]
        generic_url: Option<String>,

        #[arg(long, default_value_t = 1)]
        start: u32,

        #[arg(long, default_value_t = 0)]
        end: u32,

        /// Also download every work once it's loaded.
        #[arg(long)]
        download: bool,
    },

    /// Downloads works already in the active set.
    Download {
        ids: Vec<u64>,

        #[arg(long, conflicts_with = "ids")]
        all: bool,
    },

    /// Drops works from the active set (and cancels any pending retries for them).
    Remove {
        ids: Vec<u64>,

        #[arg(long, conflicts_with = "ids")]
        all: bool,
    },
}

#[derive(Subcommand)]
pub enum SettingsAction {
    Show,
    Set {
        #[arg(long)]
        username: Option<String>,
        #[arg(long)]
        password: Option<String>,
        #[arg(long)]
        downloads_dir: Option<PathBuf>,
        #[arg(long)]
        filetype: Option<String>,
        #[arg(long)]
        concurrency_limit: Option<u32>,
        #[arg(long)]
        rate_limit: Option<bool>,
        #[arg(long)]
        threading: Option<bool>,
    },
}
