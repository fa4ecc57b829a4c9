//! Deadline and retry policy for calls to external capability providers.
//!
//! Each call gets one deadline. Transient failures may be retried inside the
//! remaining budget; a call that hit its deadline is never retried.

use std::future::Future;
use std::time::Duration;

use tokio::time::{timeout_at, Instant};
use tracing::{debug, warn};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallPolicy {
    pub timeout: Duration,
    pub retries: u32,
}

impl CallPolicy {
    pub fn new(timeout: Duration, retries: u32) -> Self {
        Self { timeout, retries }
    }
}

/// Run `op` under `policy`. `label` only feeds the logs.
pub async fn guarded<T, F, Fut>(label: &str, policy: CallPolicy, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let deadline = Instant::now() + policy.timeout;
    let mut attempt = 0u32;
    loop {
        match timeout_at(deadline, op()).await {
            Err(_) => {
                warn!(call = label, timeout_ms = policy.timeout.as_millis() as u64, "external call timed out");
                return Err(Error::Timeout(policy.timeout));
            }
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) if e.is_transient() && attempt < policy.retries && Instant::now() < deadline => {
                attempt += 1;
                debug!(call = label, attempt, error = %e, "retrying transient failure");
            }
            Ok(Err(e)) => return Err(e),
        }
    }
}
