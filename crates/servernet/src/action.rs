use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::types::{Action, ActionFailure, ActionStatus};
use crate::{CloudApi, Error, Operation, Result};

/// How to wait for an asynchronous action to finish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionWait {
    pub poll_interval: Duration,
    pub timeout: Duration,
}

impl Default for ActionWait {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            timeout: Duration::from_secs(600),
        }
    }
}

/// Poll `action` until it succeeds or fails.
///
/// Cancellation and timeout stop the wait only; the action keeps running on
/// the cloud side.
pub async fn wait_for_action(
    cloud: &dyn CloudApi,
    action: Action,
    network_id: i64,
    op: Operation,
    wait: &ActionWait,
    cancel: &CancellationToken,
) -> Result<()> {
    let action_id = action.id;
    debug!(action_id, network_id, %op, "server network: waiting for action");

    let poll = async {
        let mut action = action;
        loop {
            match action.status {
                ActionStatus::Success => return Ok(()),
                ActionStatus::Error => {
                    let failure = action.error.unwrap_or_else(|| ActionFailure {
                        code: "unknown".into(),
                        message: "action failed without error details".into(),
                    });
                    return Err(Error::ActionFailed {
                        op,
                        action_id,
                        failure,
                    });
                }
                ActionStatus::Running => {}
            }

            tokio::time::sleep(wait.poll_interval).await;
            action = cloud
                .get_action(action_id)
                .await
                .map_err(|source| Error::Api { op, source })?;
        }
    };

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled { op }),
        result = tokio::time::timeout(wait.timeout, poll) => {
            result.unwrap_or_else(|_| Err(Error::ActionTimeout { op, action_id }))
        }
    }
}
