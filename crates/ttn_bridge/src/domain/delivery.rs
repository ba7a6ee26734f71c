use crate::domain::{
    DeliveryError, DownlinkPushRequest, DownlinkTransport, ErrorRecorder, HttpReply, Sleeper,
    TransportFailure,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, instrument, warn};

/// Bounded attempt count with exponential backoff (2s, 4s, 8s, ...)
///
/// There is no jitter and no cap on the delay: raising the bound far above the
/// default makes the last waits very long and synchronises retries across
/// devices that fail together.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
}

impl RetryPolicy {
    /// At least one attempt is always made
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Wait after the failed attempt with 0-based index `attempt`
    pub fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_secs(2u64.saturating_pow(attempt.saturating_add(1)))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(crate::domain::DEFAULT_MAX_ATTEMPTS)
    }
}

/// How one attempt ended
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome {
    Delivered,
    Retryable(DeliveryError),
    Fatal(DeliveryError),
}

/// Map a response, or the lack of one, to an [`AttemptOutcome`]
pub fn classify(
    ttn_device_id: &str,
    result: Result<HttpReply, TransportFailure>,
) -> AttemptOutcome {
    let error = match result {
        Ok(reply) if reply.is_success() => return AttemptOutcome::Delivered,
        Ok(reply) => match reply.status {
            401 => DeliveryError::Unauthorized,
            404 => DeliveryError::NotFound {
                device_id: ttn_device_id.to_string(),
            },
            429 => DeliveryError::RateLimited { body: reply.body },
            status if status >= 500 => DeliveryError::ServerError {
                status,
                body: reply.body,
            },
            status => DeliveryError::ClientError {
                status,
                device_id: ttn_device_id.to_string(),
                body: reply.body,
            },
        },
        Err(failure) => DeliveryError::Transport(failure.message),
    };

    if error.is_retryable() {
        AttemptOutcome::Retryable(error)
    } else {
        AttemptOutcome::Fatal(error)
    }
}

/// Progress of a single downlink delivery
///
/// `attempt` is 0-based; `attempts` counts requests actually made.
#[derive(Debug, Clone, PartialEq)]
pub enum DeliveryState {
    Attempting {
        attempt: u32,
    },
    RetryWait {
        attempt: u32,
        delay: Duration,
        error: DeliveryError,
    },
    Success {
        attempts: u32,
    },
    PermanentFailure {
        attempts: u32,
        error: DeliveryError,
    },
    Exhausted {
        attempts: u32,
        last_error: DeliveryError,
    },
}

impl DeliveryState {
    pub fn start() -> Self {
        DeliveryState::Attempting { attempt: 0 }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DeliveryState::Success { .. }
                | DeliveryState::PermanentFailure { .. }
                | DeliveryState::Exhausted { .. }
        )
    }

    /// Apply the outcome of the current attempt. Only `Attempting` reacts.
    pub fn on_outcome(self, outcome: AttemptOutcome, policy: &RetryPolicy) -> Self {
        let DeliveryState::Attempting { attempt } = self else {
            return self;
        };
        let attempts = attempt + 1;

        match outcome {
            AttemptOutcome::Delivered => DeliveryState::Success { attempts },
            AttemptOutcome::Fatal(error) => DeliveryState::PermanentFailure { attempts, error },
            AttemptOutcome::Retryable(error) if attempts >= policy.max_attempts() => {
                DeliveryState::Exhausted {
                    attempts,
                    last_error: error,
                }
            }
            AttemptOutcome::Retryable(error) => DeliveryState::RetryWait {
                attempt,
                delay: policy.backoff(attempt),
                error,
            },
        }
    }

    /// Leave `RetryWait` for the next attempt. Other states are unchanged.
    pub fn on_wait_elapsed(self) -> Self {
        match self {
            DeliveryState::RetryWait { attempt, .. } => DeliveryState::Attempting {
                attempt: attempt + 1,
            },
            other => other,
        }
    }
}

/// Successful delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryReceipt {
    pub attempts: u32,
}

/// Drives [`DeliveryState`] against a transport and a sleeper.
///
/// Terminal and exhausted failures are recorded through the [`ErrorRecorder`]
/// before they are returned; callers must not record them again.
pub struct DownlinkDeliverer {
    transport: Arc<dyn DownlinkTransport>,
    sleeper: Arc<dyn Sleeper>,
    policy: RetryPolicy,
    errors: ErrorRecorder,
}

impl DownlinkDeliverer {
    pub fn new(
        transport: Arc<dyn DownlinkTransport>,
        sleeper: Arc<dyn Sleeper>,
        policy: RetryPolicy,
        errors: ErrorRecorder,
    ) -> Self {
        Self {
            transport,
            sleeper,
            policy,
            errors,
        }
    }

    #[instrument(skip(self, request), fields(max_attempts = self.policy.max_attempts()))]
    pub async fn deliver(
        &self,
        ttn_device_id: &str,
        request: &DownlinkPushRequest,
    ) -> Result<DeliveryReceipt, DeliveryError> {
        let mut state = DeliveryState::start();

        loop {
            match &state {
                DeliveryState::Attempting { attempt } => {
                    debug!(attempt = attempt + 1, "pushing downlink");
                    let result = self.transport.push_downlink(ttn_device_id, request).await;
                    state = state.on_outcome(classify(ttn_device_id, result), &self.policy);
                }
                DeliveryState::RetryWait {
                    attempt,
                    delay,
                    error,
                } => {
                    let delay = *delay;
                    warn!(
                        attempt = attempt + 1,
                        max_attempts = self.policy.max_attempts(),
                        retry_in_secs = delay.as_secs(),
                        error = %error,
                        "downlink attempt failed, retrying"
                    );
                    self.sleeper.sleep(delay).await;
                    state = state.on_wait_elapsed();
                }
                DeliveryState::Success { attempts } => {
                    return Ok(DeliveryReceipt {
                        attempts: *attempts,
                    });
                }
                DeliveryState::PermanentFailure { attempts, error } => {
                    error!(attempts = *attempts, error = %error, "downlink rejected");
                    self.errors.record_or_log(&error.to_string()).await;
                    return Err(error.clone());
                }
                DeliveryState::Exhausted {
                    attempts,
                    last_error,
                } => {
                    let error = DeliveryError::Exhausted {
                        device_id: ttn_device_id.to_string(),
                        attempts: *attempts,
                        last_error: Box::new(last_error.clone()),
                    };
                    error!(attempts = *attempts, error = %last_error, "downlink retries exhausted");
                    self.errors.record_or_log(&error.to_string()).await;
                    return Err(error);
                }
            }
        }
    }
}
