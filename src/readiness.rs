// src/readiness.rs

//! Waiting for an asynchronously provisioned resource to become ready.
//!
//! Provisioning passes through a handful of phases before the remote API
//! publishes a ready endpoint. Some of them are expected waypoints
//! (`Provisioning`, `Upgrading`, `NoWinningBids`); `Deleting` is terminal; and
//! `Error` is tolerated for a while because early bring-up reports it while
//! dependent infrastructure catches up.
//!
//! The decision policy lives in [`PollState::observe`], a pure transition that
//! takes the elapsed time as an argument. [`ReadinessPoller`] drives it on a
//! constant-interval schedule.

use crate::config::ReadinessSettings;
use crate::error::SpotError;
use crate::resource::{NamespacedName, Phase, RemoteResource, ResourceApi};
use std::time::Duration;
use thiserror::Error;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Why a readiness wait ended without a ready resource.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ReadinessError {
    /// Polling stopped because the resource can no longer become ready.
    #[error("{resource} will not become ready: {reason}")]
    PermanentFailure { resource: String, reason: String },

    /// The attempt budget ran out while the resource was still transitioning.
    #[error("{resource} is not ready after {attempts} attempts: {last_reason}")]
    RetriesExhausted {
        resource: String,
        attempts: u64,
        last_reason: String,
    },

    /// The caller cancelled the wait.
    #[error("waiting for {resource} to become ready was cancelled")]
    Cancelled { resource: String },
}

/// The outcome of one observation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollDecision {
    /// The resource exposes this endpoint and is ready.
    Ready(String),
    /// Not ready yet; poll again.
    Retry(String),
    /// Stop polling; the resource will not become ready.
    Fail(String),
}

/// The mutable state of one readiness wait.
#[derive(Debug, Clone)]
pub struct PollState {
    consecutive_errors: u32,
    started_at: Instant,
    grace_period: Duration,
    error_threshold: u32,
}

impl PollState {
    /// Starts a new wait now.
    pub fn new(settings: &ReadinessSettings) -> Self {
        Self {
            consecutive_errors: 0,
            started_at: Instant::now(),
            grace_period: settings.grace_period,
            error_threshold: settings.error_threshold,
        }
    }

    /// Number of `Error` observations since the last expected waypoint,
    /// ignoring those inside the grace period.
    pub fn consecutive_errors(&self) -> u32 {
        self.consecutive_errors
    }

    /// Time since the wait started.
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Classifies one observation of the resource.
    pub fn observe(&mut self, resource: &RemoteResource, elapsed: Duration) -> PollDecision {
        let status = &resource.status;
        if status.is_ready() {
            return PollDecision::Ready(status.ready_endpoint.clone());
        }

        match status.phase() {
            Phase::Deleting => PollDecision::Fail("resource is being deleted".to_string()),
            Phase::Error if elapsed < self.grace_period => {
                debug!(
                    ?elapsed,
                    "Resource reported Error phase within the grace period"
                );
                PollDecision::Retry("resource is in Error phase (within grace period)".to_string())
            }
            Phase::Error => {
                self.consecutive_errors += 1;
                if self.consecutive_errors >= self.error_threshold {
                    PollDecision::Fail(format!(
                        "resource is persistently in Error phase ({} consecutive observations)",
                        self.consecutive_errors
                    ))
                } else {
                    PollDecision::Retry(format!(
                        "resource is in Error phase ({} of {})",
                        self.consecutive_errors, self.error_threshold
                    ))
                }
            }
            phase @ (Phase::Provisioning | Phase::Upgrading | Phase::NoWinningBids) => {
                self.consecutive_errors = 0;
                PollDecision::Retry(format!("resource is in {phase} phase"))
            }
            Phase::Unknown(phase) => {
                PollDecision::Retry(format!("resource is in unrecognized phase '{phase}'"))
            }
        }
    }
}

/// Polls a resource until it is ready, fails permanently, or time runs out.
pub struct ReadinessPoller<'a> {
    api: &'a dyn ResourceApi,
    settings: ReadinessSettings,
}

impl<'a> ReadinessPoller<'a> {
    /// # Errors
    ///
    /// Returns [`SpotError::InvalidConfiguration`] for a zero interval or a
    /// zero error threshold.
    pub fn new(api: &'a dyn ResourceApi, settings: ReadinessSettings) -> Result<Self, SpotError> {
        settings.validate()?;
        Ok(Self { api, settings })
    }

    /// Overrides the overall timeout, typically from a resource's own
    /// create timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.settings = self.settings.with_timeout(timeout);
        self
    }

    pub fn settings(&self) -> &ReadinessSettings {
        &self.settings
    }

    /// Waits for the resource at `key` and returns its ready endpoint.
    ///
    /// Fetch errors end the wait immediately; only logical readiness is
    /// retried here. `cancel` is checked before every attempt and raced against
    /// every sleep.
    #[instrument(skip(self, cancel), fields(resource = %key), err)]
    pub async fn wait_until_ready(
        &self,
        key: &NamespacedName,
        cancel: &CancellationToken,
    ) -> Result<String, ReadinessError> {
        let max_attempts = self.settings.max_attempts();
        let mut state = PollState::new(&self.settings);
        let mut last_reason = String::new();

        for attempt in 1..=max_attempts {
            if cancel.is_cancelled() {
                return Err(ReadinessError::Cancelled {
                    resource: key.to_string(),
                });
            }

            let resource = self.api.get(key).await.map_err(|e| {
                warn!("Failed to fetch resource while waiting for readiness: {}", e);
                ReadinessError::PermanentFailure {
                    resource: key.to_string(),
                    reason: format!("failed to fetch resource: {e}"),
                }
            })?;

            match state.observe(&resource, state.elapsed()) {
                PollDecision::Ready(endpoint) => {
                    info!(attempt, endpoint = %endpoint, "Resource is ready");
                    return Ok(endpoint);
                }
                PollDecision::Fail(reason) => {
                    warn!(attempt, reason = %reason, "Resource will not become ready");
                    return Err(ReadinessError::PermanentFailure {
                        resource: key.to_string(),
                        reason,
                    });
                }
                PollDecision::Retry(reason) => {
                    debug!(attempt, max_attempts, reason = %reason, "Resource not ready yet");
                    last_reason = reason;
                }
            }

            if attempt == max_attempts {
                break;
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(ReadinessError::Cancelled {
                        resource: key.to_string(),
                    });
                }
                _ = sleep(self.settings.interval) => {}
            }
        }

        Err(ReadinessError::RetriesExhausted {
            resource: key.to_string(),
            attempts: max_attempts,
            last_reason,
        })
    }
}
