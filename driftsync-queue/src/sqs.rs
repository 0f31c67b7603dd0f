//! SQS implementation of the notification seams.
//!
//! Credentials and endpoints come from the ambient AWS environment
//! (environment variables, profile, instance role) via `aws-config`; only
//! the region and queue URL are driftsync settings.

use std::time::Duration;

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_sqs::types::Message;
use aws_sdk_sqs::Client;

use driftsync_core::{Consumer, Publisher, QueueMessage, QueueUrl, RemoteError};

/// SQS bounds long-poll waits at 20 seconds.
const MAX_WAIT_SECS: u64 = 20;

/// A single SQS queue acting as both publisher and consumer seam.
#[derive(Debug, Clone)]
pub struct SqsQueue {
    client: Client,
    queue_url: QueueUrl,
}

impl SqsQueue {
    /// Build a client against the ambient AWS environment.
    pub async fn connect(region: &str, queue_url: QueueUrl) -> Self {
        let config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_owned()))
            .load()
            .await;
        Self {
            client: Client::new(&config),
            queue_url,
        }
    }
}

#[async_trait]
impl Publisher for SqsQueue {
    async fn publish(&self, body: &str) -> Result<(), RemoteError> {
        self.client
            .send_message()
            .queue_url(&self.queue_url.0)
            .message_body(body)
            .send()
            .await
            .map_err(|err| RemoteError::Transport(err.to_string()))?;
        tracing::debug!(queue = %self.queue_url, "notification published");
        Ok(())
    }
}

#[async_trait]
impl Consumer for SqsQueue {
    async fn receive(&self, wait: Duration) -> Result<Vec<QueueMessage>, RemoteError> {
        let response = self
            .client
            .receive_message()
            .queue_url(&self.queue_url.0)
            .max_number_of_messages(1)
            .wait_time_seconds(wait.as_secs().min(MAX_WAIT_SECS) as i32)
            .send()
            .await
            .map_err(|err| RemoteError::Transport(err.to_string()))?;

        Ok(response
            .messages
            .unwrap_or_default()
            .into_iter()
            .filter_map(from_sdk_message)
            .collect())
    }

    async fn acknowledge(&self, handle: &str) -> Result<(), RemoteError> {
        self.client
            .delete_message()
            .queue_url(&self.queue_url.0)
            .receipt_handle(handle)
            .send()
            .await
            .map_err(|err| RemoteError::Transport(err.to_string()))?;
        Ok(())
    }
}

/// A message without a body or receipt handle cannot be processed or
/// acknowledged; skip it rather than crash the loop.
fn from_sdk_message(message: Message) -> Option<QueueMessage> {
    let body = message.body?;
    let ack_handle = message.receipt_handle?;
    Some(QueueMessage { body, ack_handle })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
