//! Terminal progress reporting: a single [`EngineObserver`] registered as
//! both the enqueue and action observer, tracking in-flight work so `main`
//! knows when to stop the engine and driving an `indicatif` bar.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use downloader_core::{ActionKind, EngineObserver, ObserverEvent, ObserverStage, Status};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::Notify;
use tracing::warn;

pub struct CliObserver {
    bar: ProgressBar,
    pending: AtomicI64,
    idle: Notify,
}

impl CliObserver {
    pub fn new() -> Self {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template("{spinner} {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        Self {
            bar,
            pending: AtomicI64::new(0),
            idle: Notify::new(),
        }
    }

    /// Waits for every enqueued action to finish (retries don't count as
    /// pending a second time; they're still "the same" unit of work).
    pub async fn wait_until_idle(&self) {
        while self.pending.load(Ordering::SeqCst) > 0 {
            tokio::select! {
                () = self.idle.notified() => {}
                () = tokio::time::sleep(Duration::from_millis(200)) => {}
            }
        }
        self.bar.finish_and_clear();
    }
}

impl Default for CliObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineObserver for CliObserver {
    fn on_event(&self, event: ObserverEvent) {
        match event.stage {
            ObserverStage::BeforeEnqueue => {
                self.pending.fetch_add(1, Ordering::SeqCst);
                self.bar.inc_length(1);
            }
            ObserverStage::AfterAction => {
                if !matches!(event.status, Some(Status::Retry)) {
                    self.pending.fetch_sub(1, Ordering::SeqCst);
                    self.bar.inc(1);
                    self.idle.notify_waiters();
                }
                report(&self.bar, &event);
            }
            ObserverStage::BeforeAction | ObserverStage::AfterEnqueue => {}
        }
    }
}

fn report(bar: &ProgressBar, event: &ObserverEvent) {
    match (event.kind, &event.status, &event.payload.error) {
        (_, Some(Status::Error), Some(message)) => warn!(kind = ?event.kind, "{message}"),
        (ActionKind::DownloadWork, Some(Status::Ok), _) => {
            if let Some(path) = &event.payload.download_path {
                bar.set_message(format!("saved {}", path.display()));
            }
        }
        (ActionKind::LoadWork, Some(Status::Ok), _) => {
            if let Some(title) = &event.payload.work_title {
                bar.set_message(title.clone());
            }
        }
        _ => {}
    }
}
