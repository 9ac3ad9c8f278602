//! Action Queue (C5): an unbounded MPMC FIFO. Built on a cloneable
//! `tokio::mpsc` sender and one receiver shared behind a mutex so a fixed
//! pool of workers can all `recv` from it — the standard tokio idiom for
//! turning an MPSC channel into MPMC.

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};

use crate::action::Action;

#[derive(Clone)]
pub struct ActionQueue {
    sender: mpsc::UnboundedSender<Action>,
    receiver: Arc<Mutex<mpsc::UnboundedReceiver<Action>>>,
}

impl ActionQueue {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender,
            receiver: Arc::new(Mutex::new(receiver)),
        }
    }

    pub fn push(&self, action: Action) {
        // An unbounded sender only errors once every receiver half has been
        // dropped, which happens solely during engine teardown; dropping a
        // late enqueue on the floor at that point is correct.
        let _ = self.sender.send(action);
    }

    /// Blocking pop shared by every worker (spec §4.4 step 1).
    pub async fn pop(&self) -> Option<Action> {
        self.receiver.lock().await.recv().await
    }
}

impl Default for ActionQueue {
    fn default() -> Self {
        Self::new()
    }
}
