//! Observer Protocol (C9), redesigned per spec §9 "Dynamic callback
//! dispatch": instead of a `HashMap` of per-action-kind closures, a single
//! trait method receives a discriminated `ObserverEvent`. Two registration
//! points (`set_enqueue_observer`, `set_action_observer`) preserve the two
//! logically distinct callback families the source's `enqueue_callbacks`
//! and `action_callbacks` maps provided.

use std::sync::Arc;

use tokio::sync::RwLock;

use crate::action::{ActionKind, Identifier};
use crate::Status;

/// Which of the four before/after × enqueue/action hook points fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObserverStage {
    BeforeEnqueue,
    AfterEnqueue,
    BeforeAction,
    AfterAction,
}

/// Named result fields a handler may report. Only the fields relevant to
/// the firing action kind are populated; everything else is `None`/empty.
#[derive(Debug, Clone, Default)]
pub struct Payload {
    pub work_title: Option<String>,
    pub user: Option<String>,
    pub series_id: Option<u64>,
    pub results: Option<Vec<u64>>,
    pub results_page: Option<u32>,
    pub download_path: Option<std::path::PathBuf>,
    pub error: Option<String>,
}

/// One observer notification. `status` is only populated for
/// `BeforeAction`/`AfterAction` stages (an enqueue has no status).
#[derive(Debug, Clone)]
pub struct ObserverEvent {
    pub stage: ObserverStage,
    pub kind: ActionKind,
    pub identifier: Identifier,
    pub status: Option<Status>,
    pub payload: Payload,
}

/// Implemented by a UI (or test harness) to observe every stage of every
/// job. Callbacks run on the worker thread that drove the action; an
/// implementation that touches a UI must marshal to the UI thread itself
/// (spec §4.7).
pub trait EngineObserver: Send + Sync {
    fn on_event(&self, event: ObserverEvent);
}

/// An observer that does nothing; the default before any UI registers one.
pub struct NullObserver;

impl EngineObserver for NullObserver {
    fn on_event(&self, _event: ObserverEvent) {}
}

/// Adapts a plain closure into an [`EngineObserver`], for tests and simple
/// CLI progress bars that don't need a dedicated type.
pub struct FnObserver<F>(pub F)
where
    F: Fn(ObserverEvent) + Send + Sync;

impl<F> EngineObserver for FnObserver<F>
where
    F: Fn(ObserverEvent) + Send + Sync,
{
    fn on_event(&self, event: ObserverEvent) {
        (self.0)(event);
    }
}

/// A swappable observer slot: `set_enqueue_observer`/`set_action_observer`
/// replace the registered observer at runtime (spec §6.3); readers clone
/// out the current `Arc` rather than holding the lock across a callback.
pub struct ObserverSlot {
    inner: RwLock<Arc<dyn EngineObserver>>,
}

impl ObserverSlot {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Arc::new(NullObserver)),
        }
    }

    pub async fn set(&self, observer: Arc<dyn EngineObserver>) {
        *self.inner.write().await = observer;
    }

    pub async fn current(&self) -> Arc<dyn EngineObserver> {
        self.inner.read().await.clone()
    }

    pub async fn fire(&self, event: ObserverEvent) {
        self.current().await.on_event(event);
    }
}

impl Default for ObserverSlot {
    fn default() -> Self {
        Self::new()
    }
}
