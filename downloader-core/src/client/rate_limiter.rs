//! Process-wide request pacing: caps outbound requests to the Archive at
//! <= 12/minute, shared by every worker via an `Arc`-shared limiter
//! consulted before each request. A single bucket, since the engine only
//! ever talks to one host.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

const MAX_REQUESTS_PER_WINDOW: usize = 12;
const WINDOW: Duration = Duration::from_secs(60);

pub struct RequestPacer {
    timestamps: Mutex<VecDeque<Instant>>,
}

impl RequestPacer {
    pub fn new() -> Self {
        Self {
            timestamps: Mutex::new(VecDeque::with_capacity(MAX_REQUESTS_PER_WINDOW)),
        }
    }

    /// Blocks until issuing another request would not exceed the window's
    /// budget, then records the request.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut timestamps = self.timestamps.lock().await;
                let now = Instant::now();
                while let Some(&oldest) = timestamps.front() {
                    if now.duration_since(oldest) >= WINDOW {
                        timestamps.pop_front();
                    } else {
                        break;
                    }
                }
                if timestamps.len() < MAX_REQUESTS_PER_WINDOW {
                    timestamps.push_back(now);
                    None
                } else {
                    timestamps
                        .front()
                        .map(|&oldest| WINDOW - now.duration_since(oldest))
                }
            };

            match wait {
                None => return,
                Some(duration) => tokio::time::sleep(duration).await,
            }
        }
    }
}

impl Default for RequestPacer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn allows_burst_up_to_budget() {
        let pacer = RequestPacer::new();
        for _ in 0..MAX_REQUESTS_PER_WINDOW {
            pacer.acquire().await;
        }
        // the 13th call must wait for the window to roll over.
        let started = Instant::now();
        let pacer_task = tokio::spawn(async move {
            pacer.acquire().await;
        });
        tokio::time::advance(WINDOW).await;
        pacer_task.await.expect("join");
        assert!(Instant::now().duration_since(started) >= WINDOW);
    }
}
