//! Notification poll loop.
//!
//! Long-polls the queue while inside the active-hours window, runs one
//! download cycle per trigger message, and backs off on transport errors.
//! Nothing short of the shutdown signal terminates the loop: receive
//! failures, acknowledge failures, and failed download cycles are all
//! logged and survived.
//!
//! Every sleep and the long-poll itself race the shutdown broadcast, so the
//! daemon stops promptly instead of waiting out a gating interval.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, Timelike};
use tokio::sync::{broadcast, RwLock};

use driftsync_core::{ActiveHours, Consumer, QueueMessage, Settings, TriggerToken};
use driftsync_transfer::cycle::{self, CycleContext};

use crate::error::DaemonError;
use crate::runtime::{unix_seconds_now, SyncTimes};

/// Timing knobs for the poll loop, lifted out of [`Settings`].
#[derive(Debug, Clone)]
pub(crate) struct PollConfig {
    pub active_hours: ActiveHours,
    pub trigger_token: TriggerToken,
    pub poll_wait: Duration,
    pub idle_sleep: Duration,
    pub gated_sleep: Duration,
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
}

impl PollConfig {
    pub(crate) fn from_settings(settings: &Settings) -> Self {
        Self {
            active_hours: settings.active_hours,
            trigger_token: settings.trigger_token.clone(),
            poll_wait: settings.poll_wait(),
            idle_sleep: settings.idle_poll_sleep(),
            gated_sleep: settings.gated_sleep(),
            backoff_base: settings.backoff_base(),
            backoff_cap: settings.backoff_cap(),
        }
    }
}

/// Explicit loop states. `Stopped` is terminal; everything else cycles
/// forever until the shutdown broadcast fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PollState {
    /// Outside the active-hours window; sleeping coarsely before re-checking.
    Gated,
    /// Long-polling the queue (and processing whatever arrives). Carries the
    /// current transport-error streak so a failure right after a backoff
    /// keeps growing the delay; any successful receive resets it.
    Polling { consecutive_errors: u32 },
    /// Recovering from a transport error.
    Backoff { consecutive_errors: u32 },
    /// Shutdown observed.
    Stopped,
}

pub(crate) async fn poll_task(
    consumer: Arc<dyn Consumer>,
    ctx: Arc<CycleContext>,
    config: PollConfig,
    times: Arc<RwLock<SyncTimes>>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let mut state = PollState::Polling {
        consecutive_errors: 0,
    };

    loop {
        state = match state {
            PollState::Stopped => break,

            PollState::Gated => {
                tracing::debug!(
                    recheck_secs = config.gated_sleep.as_secs(),
                    "outside active hours; polling gated",
                );
                if !sleep_or_shutdown(config.gated_sleep, &mut shutdown_rx).await {
                    PollState::Stopped
                } else {
                    PollState::Polling {
                        consecutive_errors: 0,
                    }
                }
            }

            PollState::Backoff { consecutive_errors } => {
                let backoff =
                    backoff_delay(config.backoff_base, config.backoff_cap, consecutive_errors);
                tracing::warn!(
                    backoff_secs = backoff.as_secs(),
                    consecutive_errors,
                    "queue transport error; backing off",
                );
                if !sleep_or_shutdown(backoff, &mut shutdown_rx).await {
                    PollState::Stopped
                } else {
                    PollState::Polling { consecutive_errors }
                }
            }

            PollState::Polling { consecutive_errors } => {
                // The window is re-checked on every pass, so leaving it
                // takes effect at the next receive boundary.
                if !config.active_hours.contains(Local::now().hour()) {
                    PollState::Gated
                } else {
                    let received = tokio::select! {
                        _ = shutdown_rx.recv() => break,
                        received = consumer.receive(config.poll_wait) => received,
                    };

                    match received {
                        Ok(messages) if messages.is_empty() => {
                            if !sleep_or_shutdown(config.idle_sleep, &mut shutdown_rx).await {
                                PollState::Stopped
                            } else {
                                PollState::Polling {
                                    consecutive_errors: 0,
                                }
                            }
                        }
                        Ok(messages) => {
                            for message in messages {
                                process_message(
                                    consumer.as_ref(),
                                    &ctx,
                                    &config.trigger_token,
                                    &times,
                                    message,
                                )
                                .await;
                            }
                            PollState::Polling {
                                consecutive_errors: 0,
                            }
                        }
                        Err(err) => {
                            tracing::warn!(error = %err, "queue receive failed");
                            PollState::Backoff {
                                consecutive_errors: consecutive_errors + 1,
                            }
                        }
                    }
                }
            }
        };
    }

    Ok(())
}

async fn process_message(
    consumer: &dyn Consumer,
    ctx: &CycleContext,
    trigger_token: &TriggerToken,
    times: &RwLock<SyncTimes>,
    message: QueueMessage,
) {
    if trigger_token.matches(&message.body) {
        tracing::info!("sync trigger received; starting download sync");
        match cycle::run_download(ctx).await {
            Ok(summary) if summary.success => {
                times.write().await.download_at_unix = unix_seconds_now();
                tracing::info!("download sync completed");
            }
            Ok(summary) => {
                tracing::error!("download sync failed: {}", summary.detail);
            }
            Err(err) => {
                tracing::error!(error = %err, "download sync could not be recorded");
            }
        }
    } else {
        tracing::debug!(body = %message.body, "ignoring non-trigger message");
    }

    // At-least-once: the handle is removed even for non-trigger and failed
    // bodies, so the queue does not redeliver them forever. A failed
    // acknowledge is the queue's problem to redeliver, not ours to retry.
    if let Err(err) = consumer.acknowledge(&message.ack_handle).await {
        tracing::warn!(error = %err, "failed to acknowledge message");
    }
}

fn backoff_delay(base: Duration, cap: Duration, consecutive_errors: u32) -> Duration {
    base.saturating_mul(consecutive_errors.max(1)).min(cap)
}

/// Returns `false` when shutdown arrived during the sleep.
async fn sleep_or_shutdown(delay: Duration, shutdown_rx: &mut broadcast::Receiver<()>) -> bool {
    tokio::select! {
        _ = shutdown_rx.recv() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
