//! Idle trigger: collapses watcher activity into one upload per quiet window.
//!
//! A single task owns the pending deadline, so "cancel the old timer, arm a
//! new one" is atomic with respect to concurrent activity — there is never
//! more than one live deadline, and a fire that already enqueued a cycle job
//! is never retracted by later activity (the new activity simply arms the
//! next window). Cycle failures are not retried here; the next event re-arms
//! normally.

use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::time::{sleep_until, Instant};

use crate::error::DaemonError;
use crate::runtime::CycleJob;

/// One qualifying filesystem event forwarded by the watcher.
#[derive(Debug, Clone)]
pub(crate) struct ActivityEvent {
    pub path: PathBuf,
}

pub(crate) async fn debounce_task(
    mut activity_rx: mpsc::Receiver<ActivityEvent>,
    cycle_tx: mpsc::Sender<CycleJob>,
    idle_window: Duration,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let mut deadline: Option<Instant> = None;

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            event = activity_rx.recv() => {
                let Some(event) = event else { break };
                tracing::debug!(path = %event.path.display(), "activity; idle window re-armed");
                deadline = Some(Instant::now() + idle_window);
            }
            _ = fire_at(deadline), if deadline.is_some() => {
                deadline = None;
                tracing::info!(
                    idle_secs = idle_window.as_secs(),
                    "idle window elapsed; queueing upload sync",
                );
                if cycle_tx
                    .send(CycleJob {
                        source: "watcher",
                        respond_to: None,
                    })
                    .await
                    .is_err()
                {
                    return Err(DaemonError::ChannelClosed("cycle queue"));
                }
            }
        }
    }

    Ok(())
}

async fn fire_at(deadline: Option<Instant>) {
    match deadline {
        Some(at) => sleep_until(at).await,
        // Unreachable: the select! guard only polls this with a deadline.
        None => std::future::pending().await,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use tokio::time::advance;

    use super::*;

    const WINDOW: Duration = Duration::from_secs(120);

    struct Harness {
        activity_tx: mpsc::Sender<ActivityEvent>,
        cycle_rx: mpsc::Receiver<CycleJob>,
        shutdown_tx: broadcast::Sender<()>,
        task: tokio::task::JoinHandle<Result<(), DaemonError>>,
    }

    impl Harness {
        fn spawn() -> Self {
            let (activity_tx, activity_rx) = mpsc::channel(64);
            let (cycle_tx, cycle_rx) = mpsc::channel(64);
            let (shutdown_tx, _) = broadcast::channel(4);
            let task = tokio::spawn(debounce_task(
                activity_rx,
                cycle_tx,
                WINDOW,
                shutdown_tx.subscribe(),
            ));
            Self {
                activity_tx,
                cycle_rx,
                shutdown_tx,
                task,
            }
        }

        async fn touch(&self, path: &str) {
            self.activity_tx
                .send(ActivityEvent {
                    path: PathBuf::from(path),
                })
                .await
                .expect("send activity");
            drain().await;
        }

        fn fired(&mut self) -> usize {
            let mut count = 0;
            while self.cycle_rx.try_recv().is_ok() {
                count += 1;
            }
            count
        }

        async fn stop(self) {
            let _ = self.shutdown_tx.send(());
            self.task.await.expect("join").expect("task result");
        }
    }

    /// Let the debounce task observe everything sent so far.
    async fn drain() {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true, flavor = "current_thread")]
    async fn events_inside_the_window_coalesce_to_one_cycle() {
        let mut harness = Harness::spawn();

        // Example from the contract: created at t=0, modified at t=30,
        // window 120 → a single fire at t=150.
        harness.touch("/sample/a.txt").await;
        advance(Duration::from_secs(30)).await;
        harness.touch("/sample/a.txt").await;

        // t=120 passed the first deadline, which the second event cancelled.
        advance(Duration::from_secs(119)).await;
        drain().await;
        assert_eq!(harness.fired(), 0, "must wait out the re-armed window");

        advance(Duration::from_secs(2)).await;
        drain().await;
        assert_eq!(harness.fired(), 1, "exactly one cycle, timed from the last event");

        harness.stop().await;
    }

    #[tokio::test(start_paused = true, flavor = "current_thread")]
    async fn rapid_burst_fires_once() {
        let mut harness = Harness::spawn();

        for n in 0..5 {
            harness.touch(&format!("/sample/file-{n}.txt")).await;
            advance(Duration::from_secs(1)).await;
        }
        advance(WINDOW).await;
        drain().await;

        assert_eq!(harness.fired(), 1);
        harness.stop().await;
    }

    #[tokio::test(start_paused = true, flavor = "current_thread")]
    async fn events_spaced_beyond_the_window_fire_independently() {
        let mut harness = Harness::spawn();

        for _ in 0..3 {
            harness.touch("/sample/a.txt").await;
            advance(WINDOW + Duration::from_secs(1)).await;
            drain().await;
        }

        assert_eq!(harness.fired(), 3, "one cycle per quiet window");
        harness.stop().await;
    }

    #[tokio::test(start_paused = true, flavor = "current_thread")]
    async fn activity_after_a_fire_arms_a_fresh_window_without_duplicates() {
        let mut harness = Harness::spawn();

        harness.touch("/sample/a.txt").await;
        advance(WINDOW + Duration::from_secs(1)).await;
        drain().await;
        assert_eq!(harness.fired(), 1);

        // New activity right after the fire must not produce a second job
        // until its own window elapses.
        harness.touch("/sample/b.txt").await;
        advance(Duration::from_secs(60)).await;
        drain().await;
        assert_eq!(harness.fired(), 0);

        advance(WINDOW).await;
        drain().await;
        assert_eq!(harness.fired(), 1);

        harness.stop().await;
    }

    #[tokio::test(start_paused = true, flavor = "current_thread")]
    async fn no_activity_means_no_cycles() {
        let mut harness = Harness::spawn();

        advance(WINDOW * 10).await;
        drain().await;

        assert_eq!(harness.fired(), 0);
        harness.stop().await;
    }

    #[tokio::test(start_paused = true, flavor = "current_thread")]
    async fn closing_the_activity_channel_stops_the_task() {
        let (activity_tx, activity_rx) = mpsc::channel::<ActivityEvent>(4);
        let (cycle_tx, _cycle_rx) = mpsc::channel(4);
        let (shutdown_tx, _) = broadcast::channel(4);
        let task = tokio::spawn(debounce_task(
            activity_rx,
            cycle_tx,
            WINDOW,
            shutdown_tx.subscribe(),
        ));

        drop(activity_tx);
        task.await.expect("join").expect("clean exit");
    }
}
